use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current skill scores for a user across all five dimensions, each in [0,1].
///
/// A brand-new user has no evidence of weakness, so every dimension defaults
/// to 1.0 ("healthy").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillScores {
    pub clarity_avg: f64,
    pub tradeoff_avg: f64,
    pub adaptability_avg: f64,
    pub failure_awareness_avg: f64,
    pub dsa_predict_skill: f64,
}

impl Default for SkillScores {
    fn default() -> Self {
        Self {
            clarity_avg: 1.0,
            tradeoff_avg: 1.0,
            adaptability_avg: 1.0,
            failure_awareness_avg: 1.0,
            dsa_predict_skill: 1.0,
        }
    }
}

impl SkillScores {
    /// All five dimensions as `(name, value)` pairs, in the stable field order
    /// used for iteration, aggregation, and snapshotting.
    pub fn as_pairs(&self) -> [(&'static str, f64); 5] {
        [
            ("clarity_avg", self.clarity_avg),
            ("tradeoff_avg", self.tradeoff_avg),
            ("adaptability_avg", self.adaptability_avg),
            ("failure_awareness_avg", self.failure_awareness_avg),
            ("dsa_predict_skill", self.dsa_predict_skill),
        ]
    }

    pub fn get(&self, dimension: &str) -> Option<f64> {
        self.as_pairs()
            .into_iter()
            .find(|(name, _)| *name == dimension)
            .map(|(_, v)| v)
    }

    /// The weakest dimension below `threshold`, or `None` if all are healthy.
    /// Ties are broken by field order (the first one encountered).
    pub fn weakest_dimension(&self, threshold: f64) -> Option<&'static str> {
        self.as_pairs()
            .into_iter()
            .filter(|(_, v)| *v < threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(name, _)| name)
    }

    pub fn all_healthy(&self, threshold: f64) -> bool {
        self.as_pairs().iter().all(|(_, v)| *v >= threshold)
    }

    /// Clamps every dimension into [0,1] and replaces non-finite values with
    /// the healthy default, preserving the invariant in SPEC_FULL.md §3.2.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 1.0 };
        Self {
            clarity_avg: clamp(self.clarity_avg),
            tradeoff_avg: clamp(self.tradeoff_avg),
            adaptability_avg: clamp(self.adaptability_avg),
            failure_awareness_avg: clamp(self.failure_awareness_avg),
            dsa_predict_skill: clamp(self.dsa_predict_skill),
        }
    }
}

/// Full user-state snapshot assembled by the state manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    pub scores: SkillScores,
    pub next_module: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub target_role: Option<String>,
    pub primary_focus: Option<String>,
    /// Most-recent-first, bounded to at most 10 entries.
    pub recent_modules: Vec<String>,
    pub module_visit_counts: HashMap<String, u64>,
}

impl UserState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scores: SkillScores::default(),
            next_module: None,
            last_update: None,
            target_role: None,
            primary_focus: None,
            recent_modules: Vec::new(),
            module_visit_counts: HashMap::new(),
        }
    }
}

/// Urgency classification of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionDepth {
    Normal,
    Remediation,
    Critical,
    Onboarding,
}

impl DecisionDepth {
    /// Integer encoding persisted in `orchestrator_decisions.depth`.
    pub fn as_i32(self) -> i32 {
        match self {
            DecisionDepth::Onboarding => 0,
            DecisionDepth::Normal => 1,
            DecisionDepth::Remediation => 2,
            DecisionDepth::Critical => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionDepth::Normal => "normal",
            DecisionDepth::Remediation => "remediation",
            DecisionDepth::Critical => "critical",
            DecisionDepth::Onboarding => "onboarding",
        }
    }
}

/// Full scoring breakdown for one candidate module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleScore {
    pub module: String,
    pub total_score: f64,
    pub weakness_severity_score: f64,
    pub rate_of_change_score: f64,
    pub recency_score: f64,
    pub goal_alignment_score: f64,
    pub pattern_score: f64,
    pub cooldown_penalty: f64,
    pub diversity_bonus: f64,
}

/// The engine's routing decision with full explainability, persisted to the
/// append-only decision audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub next_module: String,
    pub reason: String,
    pub rule_reason: String,
    pub description: String,
    pub depth: DecisionDepth,
    pub weakness_trigger: Option<String>,
    pub scores: SkillScores,
    pub confidence: f64,
    /// Top-5 ranked candidates, highest `total_score` first.
    pub candidate_scores: Vec<ModuleScore>,
    pub decision_id: Option<String>,
}

/// A single long-term-memory event, used by the rate-of-change signal.
/// Only the substrings "weakness"/"strength" in `event_type` are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub event_type: String,
    pub module: String,
}

/// A detected behavioral pattern, used by the pattern signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPattern {
    pub description: String,
    pub pattern_type: String,
    #[serde(default = "default_pattern_confidence")]
    pub confidence: f64,
}

fn default_pattern_confidence() -> f64 {
    0.5
}

/// Optional caller-supplied context enriching a decision beyond raw scores.
/// See SPEC_FULL.md §10 for the rationale behind this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    pub weakness_summary: Option<String>,
    #[serde(default)]
    pub recent_events: Vec<MemoryEvent>,
    #[serde(default)]
    pub patterns: Vec<MemoryPattern>,
}
