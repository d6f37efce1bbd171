use std::collections::HashMap;
use std::env;

/// Static definition of a single remediation module.
///
/// The registry built from these is process-wide and immutable after
/// startup — nothing in the engine mutates a `ModuleDefinition` at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDefinition {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub route: &'static str,
    pub port: Option<u16>,
    pub base_url: Option<&'static str>,
    pub remediation_skills: &'static [&'static str],
    pub prerequisite_modules: &'static [&'static str],
    pub weight: f64,
    pub cooldown_minutes: u32,
}

/// The six remediation modules the orchestrator can route to.
pub static MODULES: &[ModuleDefinition] = &[
    ModuleDefinition {
        name: "onboarding",
        label: "Onboarding",
        description: "Set up your goals, preferences, and learning profile.",
        route: "/onboarding",
        port: None,
        base_url: None,
        remediation_skills: &[],
        prerequisite_modules: &[],
        weight: 0.5,
        cooldown_minutes: 1440,
    },
    ModuleDefinition {
        name: "production_interview",
        label: "Mock Interview",
        description: "Practice production thinking, clarity, and adaptability in realistic mock interviews.",
        route: "/mock-interview",
        port: Some(8002),
        base_url: Some("http://127.0.0.1:8002"),
        remediation_skills: &["clarity_avg", "adaptability_avg"],
        prerequisite_modules: &[],
        weight: 1.2,
        cooldown_minutes: 15,
    },
    ModuleDefinition {
        name: "interactive_course",
        label: "Interactive Course",
        description: "Learn system design, tradeoffs, and failure analysis through AI-powered courses.",
        route: "/course-generator",
        port: Some(8008),
        base_url: Some("http://127.0.0.1:8008"),
        remediation_skills: &["tradeoff_avg", "failure_awareness_avg"],
        prerequisite_modules: &[],
        weight: 1.0,
        cooldown_minutes: 20,
    },
    ModuleDefinition {
        name: "dsa_practice",
        label: "DSA Practice",
        description: "Strengthen algorithm fundamentals with AI-guided problem solving.",
        route: "/dsa-sheet",
        port: Some(8004),
        base_url: Some("http://127.0.0.1:8004"),
        remediation_skills: &["dsa_predict_skill"],
        prerequisite_modules: &[],
        weight: 1.0,
        cooldown_minutes: 10,
    },
    ModuleDefinition {
        name: "resume_builder",
        label: "Resume Builder",
        description: "Optimize your resume for target roles with AI analysis.",
        route: "/resume-analyzer",
        port: Some(8003),
        base_url: Some("http://127.0.0.1:8003"),
        remediation_skills: &[],
        prerequisite_modules: &[],
        weight: 0.7,
        cooldown_minutes: 60,
    },
    ModuleDefinition {
        name: "project_studio",
        label: "Project Studio",
        description: "Apply your skills to a real project with multi-agent AI collaboration.",
        route: "/project-studio",
        port: Some(8012),
        base_url: Some("http://127.0.0.1:8012"),
        remediation_skills: &[],
        prerequisite_modules: &["production_interview", "interactive_course"],
        weight: 0.9,
        cooldown_minutes: 30,
    },
];

pub fn module(name: &str) -> Option<&'static ModuleDefinition> {
    MODULES.iter().find(|m| m.name == name)
}

/// Human-readable metadata for a skill dimension, used when building reason strings
/// and matching memory patterns.
pub struct SkillDimensionMeta {
    pub label: &'static str,
}

pub fn skill_dimension(name: &str) -> Option<SkillDimensionMeta> {
    let label = match name {
        "clarity_avg" => "Clarity",
        "tradeoff_avg" => "Tradeoff Analysis",
        "adaptability_avg" => "Adaptability",
        "failure_awareness_avg" => "Failure Awareness",
        "dsa_predict_skill" => "DSA Skills",
        _ => return None,
    };
    Some(SkillDimensionMeta { label })
}

/// Per-role weighting of the five skill dimensions, 0.7-1.5 range.
/// Unknown roles fall back to `"default"`.
pub fn goal_skill_weights(role_key: &str) -> HashMap<&'static str, f64> {
    let table: &[(&str, f64)] = match role_key {
        "backend_engineer" => &[
            ("clarity_avg", 1.0),
            ("tradeoff_avg", 1.3),
            ("adaptability_avg", 1.0),
            ("failure_awareness_avg", 1.3),
            ("dsa_predict_skill", 1.2),
        ],
        "frontend_engineer" => &[
            ("clarity_avg", 1.2),
            ("tradeoff_avg", 1.0),
            ("adaptability_avg", 1.3),
            ("failure_awareness_avg", 0.8),
            ("dsa_predict_skill", 0.9),
        ],
        "fullstack_engineer" => &[
            ("clarity_avg", 1.1),
            ("tradeoff_avg", 1.2),
            ("adaptability_avg", 1.1),
            ("failure_awareness_avg", 1.1),
            ("dsa_predict_skill", 1.1),
        ],
        "ml_engineer" => &[
            ("clarity_avg", 1.0),
            ("tradeoff_avg", 1.3),
            ("adaptability_avg", 1.0),
            ("failure_awareness_avg", 1.2),
            ("dsa_predict_skill", 1.4),
        ],
        "devops_engineer" => &[
            ("clarity_avg", 0.9),
            ("tradeoff_avg", 1.2),
            ("adaptability_avg", 1.1),
            ("failure_awareness_avg", 1.5),
            ("dsa_predict_skill", 0.7),
        ],
        _ => &[
            ("clarity_avg", 1.0),
            ("tradeoff_avg", 1.0),
            ("adaptability_avg", 1.0),
            ("failure_awareness_avg", 1.0),
            ("dsa_predict_skill", 1.0),
        ],
    };
    table.iter().copied().collect()
}

/// Normalizes a free-text target role into a goal-profile lookup key.
pub fn normalize_role_key(target_role: &str) -> String {
    target_role.to_lowercase().replace(' ', "_").replace('-', "_")
}

/// Tuning knobs for the weighted decision engine, circuit breakers, health
/// monitor, and metrics collector. Loaded once at startup via [`EngineConfig::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub weakness_threshold: f64,
    pub strength_threshold: f64,
    pub critical_threshold: f64,

    pub decay_alpha: f64,
    pub score_window_days: i64,

    pub weakness_severity_weight: f64,
    pub rate_of_change_weight: f64,
    pub recency_weight: f64,
    pub goal_alignment_weight: f64,
    pub pattern_weight: f64,

    pub max_consecutive_same_module: u32,
    pub min_modules_before_repeat: usize,

    pub llm_timeout_seconds: f64,
    pub llm_max_tokens: u32,
    pub llm_temperature: f64,

    pub cb_failure_threshold: u32,
    pub cb_recovery_timeout_s: u64,
    pub cb_half_open_max_calls: u32,

    pub health_check_interval_s: u64,
    pub health_check_timeout_s: f64,

    pub metrics_buffer_size: usize,
    pub metrics_flush_interval_s: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weakness_threshold: 0.4,
            strength_threshold: 0.75,
            critical_threshold: 0.2,
            decay_alpha: 0.3,
            score_window_days: 30,
            weakness_severity_weight: 0.40,
            rate_of_change_weight: 0.15,
            recency_weight: 0.15,
            goal_alignment_weight: 0.15,
            pattern_weight: 0.15,
            max_consecutive_same_module: 3,
            min_modules_before_repeat: 1,
            llm_timeout_seconds: 10.0,
            llm_max_tokens: 200,
            llm_temperature: 0.3,
            cb_failure_threshold: 5,
            cb_recovery_timeout_s: 60,
            cb_half_open_max_calls: 2,
            health_check_interval_s: 30,
            health_check_timeout_s: 5.0,
            metrics_buffer_size: 1000,
            metrics_flush_interval_s: 60,
        }
    }
}

impl EngineConfig {
    /// Loads defaults, then applies any `ORCH_*` environment variable overrides.
    /// An override that fails to parse is silently ignored, matching the
    /// permissive behavior of the system this was adapted from.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_env("ORCH_WEAKNESS_THRESHOLD") {
            cfg.weakness_threshold = v;
        }
        if let Some(v) = parse_env("ORCH_STRENGTH_THRESHOLD") {
            cfg.strength_threshold = v;
        }
        if let Some(v) = parse_env("ORCH_DECAY_ALPHA") {
            cfg.decay_alpha = v;
        }
        if let Some(v) = parse_env::<i64>("ORCH_SCORE_WINDOW_DAYS") {
            cfg.score_window_days = v;
        }
        if let Some(v) = parse_env("ORCH_LLM_TIMEOUT") {
            cfg.llm_timeout_seconds = v;
        }
        if let Some(v) = parse_env::<u32>("ORCH_CB_FAILURE_THRESHOLD") {
            cfg.cb_failure_threshold = v;
        }
        if let Some(v) = parse_env::<u64>("ORCH_CB_RECOVERY_TIMEOUT") {
            cfg.cb_recovery_timeout_s = v;
        }
        if let Some(v) = parse_env::<u64>("ORCH_HEALTH_CHECK_INTERVAL") {
            cfg.health_check_interval_s = v;
        }

        cfg
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
