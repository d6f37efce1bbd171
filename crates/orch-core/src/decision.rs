use std::collections::HashMap;

use crate::config::{self, goal_skill_weights, normalize_role_key, skill_dimension, EngineConfig, ModuleDefinition, MODULES};
use crate::models::{Decision, DecisionDepth, MemoryContext, ModuleScore, UserState};

/// Weighted multi-signal routing engine. Stateless beyond its config; every
/// call to [`decide`](DecisionEngine::decide) is a pure function of its
/// arguments, so fallback decisions never need to reach back into this type.
pub struct DecisionEngine {
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn decide(
        &self,
        state: &UserState,
        memory_context: Option<&MemoryContext>,
        service_health: &HashMap<String, bool>,
    ) -> Decision {
        let depth = self.determine_depth(state);
        let candidates = self.get_candidates(state, service_health);

        if candidates.is_empty() {
            let fallback = config::module("project_studio").expect("project_studio is registered");
            return Decision {
                next_module: fallback.name.to_string(),
                reason: "All modules are available. Apply your skills freely!".to_string(),
                rule_reason: "No candidates matched — fallback".to_string(),
                description: fallback.description.to_string(),
                depth,
                weakness_trigger: None,
                scores: state.scores,
                confidence: 0.5,
                candidate_scores: Vec::new(),
                decision_id: None,
            };
        }

        let mut scored: Vec<ModuleScore> = candidates
            .iter()
            .map(|mod_def| self.score_candidate(mod_def, state, memory_context))
            .collect();
        scored.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());

        let winner_idx = self.apply_diversity_filter(&scored, state);
        let winner = scored[winner_idx].clone();

        let mod_def = config::module(&winner.module).unwrap_or(fallback_module());
        let weakness_trigger = state.scores.weakest_dimension(self.config.weakness_threshold);
        let rule_reason = self.build_rule_reason(&winner, state, weakness_trigger);
        let confidence = self.calculate_confidence(&scored);

        Decision {
            next_module: winner.module.clone(),
            reason: rule_reason.clone(),
            rule_reason,
            description: mod_def.description.to_string(),
            depth,
            weakness_trigger: weakness_trigger.map(|s| s.to_string()),
            scores: state.scores,
            confidence,
            candidate_scores: scored.into_iter().take(5).collect(),
            decision_id: None,
        }
    }

    fn determine_depth(&self, state: &UserState) -> DecisionDepth {
        let pairs = state.scores.as_pairs();
        if pairs.iter().any(|(_, v)| *v < self.config.critical_threshold) {
            return DecisionDepth::Critical;
        }
        if pairs.iter().any(|(_, v)| *v < self.config.weakness_threshold) {
            return DecisionDepth::Remediation;
        }
        if pairs.iter().all(|(_, v)| *v >= 0.99) && state.recent_modules.is_empty() {
            return DecisionDepth::Onboarding;
        }
        DecisionDepth::Normal
    }

    fn get_candidates(
        &self,
        state: &UserState,
        service_health: &HashMap<String, bool>,
    ) -> Vec<&'static ModuleDefinition> {
        MODULES
            .iter()
            .filter(|m| {
                if m.base_url.is_some() && service_health.get(m.name) == Some(&false) {
                    return false;
                }
                if m.name == "onboarding" && !state.recent_modules.is_empty() {
                    return false;
                }
                true
            })
            .collect()
    }

    fn score_candidate(
        &self,
        mod_def: &ModuleDefinition,
        state: &UserState,
        memory_context: Option<&MemoryContext>,
    ) -> ModuleScore {
        let weakness_severity = self.calc_weakness_severity(mod_def, state);
        let rate_of_change = self.calc_rate_of_change(memory_context);
        let recency = self.calc_recency_score(mod_def.name, state);
        let goal_alignment = self.calc_goal_alignment(mod_def, state);
        let pattern = self.calc_pattern_signal(mod_def, memory_context);
        let cooldown_penalty = self.calc_cooldown_penalty(mod_def.name, state);
        let diversity_bonus = self.calc_diversity_bonus(mod_def.name, state);

        let cfg = &self.config;
        let total = (weakness_severity * cfg.weakness_severity_weight
            + rate_of_change * cfg.rate_of_change_weight
            + recency * cfg.recency_weight
            + goal_alignment * cfg.goal_alignment_weight
            + pattern * cfg.pattern_weight
            + diversity_bonus * 0.05
            - cooldown_penalty)
            * mod_def.weight;

        ModuleScore {
            module: mod_def.name.to_string(),
            total_score: total,
            weakness_severity_score: weakness_severity,
            rate_of_change_score: rate_of_change,
            recency_score: recency,
            goal_alignment_score: goal_alignment,
            pattern_score: pattern,
            cooldown_penalty,
            diversity_bonus,
        }
    }

    fn calc_weakness_severity(&self, mod_def: &ModuleDefinition, state: &UserState) -> f64 {
        if mod_def.remediation_skills.is_empty() {
            return if state.scores.all_healthy(self.config.weakness_threshold) {
                0.6
            } else {
                0.1
            };
        }

        mod_def
            .remediation_skills
            .iter()
            .map(|skill| {
                let val = state.scores.get(skill).unwrap_or(1.0);
                if val < self.config.critical_threshold {
                    1.0
                } else if val < self.config.weakness_threshold {
                    (1.0 - val / self.config.weakness_threshold).max(0.4)
                } else {
                    0.0
                }
            })
            .fold(0.0_f64, f64::max)
    }

    fn calc_rate_of_change(&self, memory_context: Option<&MemoryContext>) -> f64 {
        let Some(ctx) = memory_context else {
            return 0.5;
        };
        if ctx.recent_events.is_empty() {
            return 0.5;
        }

        let mut weakness_count = 0u32;
        let mut strength_count = 0u32;
        for event in &ctx.recent_events {
            if event.event_type.contains("weakness") {
                weakness_count += 1;
            } else if event.event_type.contains("strength") {
                strength_count += 1;
            }
        }

        let total = weakness_count + strength_count;
        if total == 0 {
            return 0.5;
        }
        weakness_count as f64 / total as f64
    }

    fn calc_recency_score(&self, mod_name: &str, state: &UserState) -> f64 {
        if state.recent_modules.is_empty() {
            return 0.5;
        }
        match state.recent_modules.iter().position(|m| m == mod_name) {
            Some(idx) => (idx as f64 / state.recent_modules.len().max(1) as f64).min(1.0),
            None => 0.8,
        }
    }

    fn calc_goal_alignment(&self, mod_def: &ModuleDefinition, state: &UserState) -> f64 {
        let Some(target_role) = state.target_role.as_deref().filter(|s| !s.is_empty()) else {
            return 0.5;
        };
        if mod_def.remediation_skills.is_empty() {
            return 0.5;
        }

        let role_key = normalize_role_key(target_role);
        let weights = goal_skill_weights(&role_key);

        let values: Vec<f64> = mod_def
            .remediation_skills
            .iter()
            .map(|skill| *weights.get(skill).unwrap_or(&1.0))
            .collect();
        if values.is_empty() {
            return 0.5;
        }

        let avg = values.iter().sum::<f64>() / values.len() as f64;
        ((avg - 0.7) / 0.8).clamp(0.0, 1.0)
    }

    fn calc_pattern_signal(&self, mod_def: &ModuleDefinition, memory_context: Option<&MemoryContext>) -> f64 {
        let Some(ctx) = memory_context else {
            return if mod_def.remediation_skills.is_empty() { 0.3 } else { 0.5 };
        };
        if ctx.patterns.is_empty() {
            return if mod_def.remediation_skills.is_empty() { 0.3 } else { 0.5 };
        }
        if mod_def.remediation_skills.is_empty() {
            return 0.3;
        }

        let mut relevance = 0.0;
        for pattern in &ctx.patterns {
            let desc = pattern.description.to_lowercase();
            for skill in mod_def.remediation_skills {
                if let Some(meta) = skill_dimension(skill) {
                    if desc.contains(&meta.label.to_lowercase()) {
                        relevance += pattern.confidence;
                    }
                }
            }
        }
        relevance.min(1.0)
    }

    fn calc_cooldown_penalty(&self, mod_name: &str, state: &UserState) -> f64 {
        if state.recent_modules.is_empty() {
            return 0.0;
        }
        if state.recent_modules[0] == mod_name {
            return 0.3;
        }
        let window_len = (self.config.min_modules_before_repeat + 1).min(state.recent_modules.len());
        if state.recent_modules[..window_len].iter().any(|m| m == mod_name) {
            return 0.15;
        }
        0.0
    }

    fn calc_diversity_bonus(&self, mod_name: &str, state: &UserState) -> f64 {
        let visit_count = *state.module_visit_counts.get(mod_name).unwrap_or(&0);
        let total_visits = state.module_visit_counts.values().sum::<u64>().max(1);
        let visit_ratio = visit_count as f64 / total_visits as f64;
        (1.0 - visit_ratio * 3.0).max(0.0)
    }

    fn apply_diversity_filter(&self, scored: &[ModuleScore], state: &UserState) -> usize {
        if state.recent_modules.is_empty() {
            return 0;
        }

        let last_module = &state.recent_modules[0];
        let consecutive = state
            .recent_modules
            .iter()
            .take_while(|m| *m == last_module)
            .count();

        if consecutive as u32 >= self.config.max_consecutive_same_module
            && scored[0].module == *last_module
            && scored.len() > 1
        {
            tracing::info!(
                module = %last_module,
                consecutive,
                switch_to = %scored[1].module,
                "diversity filter triggered"
            );
            return 1;
        }
        0
    }

    fn calculate_confidence(&self, scored: &[ModuleScore]) -> f64 {
        if scored.len() < 2 {
            return 1.0;
        }
        let top = scored[0].total_score;
        let second = scored[1].total_score;
        if top <= 0.0 {
            return 0.5;
        }
        let gap_ratio = (top - second) / top;
        (0.5 + gap_ratio).clamp(0.3, 1.0)
    }

    fn build_rule_reason(
        &self,
        winner: &ModuleScore,
        state: &UserState,
        weakness_trigger: Option<&'static str>,
    ) -> String {
        let mod_def = config::module(&winner.module).unwrap_or(fallback_module());

        if let Some(trigger) = weakness_trigger {
            let val = state.scores.get(trigger).unwrap_or(1.0);
            let label = skill_dimension(trigger).map(|m| m.label).unwrap_or(trigger);

            if val < self.config.critical_threshold {
                return format!(
                    "Your {label} score ({val:.2}) is critically low. Urgent practice in {} is recommended.",
                    mod_def.label
                );
            }
            return format!(
                "Your {label} score ({val:.2}) is below {:.1}. {} will help you improve through targeted practice.",
                self.config.weakness_threshold, mod_def.label
            );
        }

        if state.scores.all_healthy(self.config.weakness_threshold) {
            return format!(
                "All your skills are healthy (>= {:.1}). {} is recommended to apply and reinforce your knowledge.",
                self.config.weakness_threshold, mod_def.label
            );
        }

        format!("{} is your best next step based on your current skill profile.", mod_def.label)
    }
}

fn fallback_module() -> &'static ModuleDefinition {
    config::module("project_studio").expect("project_studio is registered")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryEvent, MemoryPattern};
    use proptest::prelude::*;

    fn all_healthy(engine: &DecisionEngine) -> UserState {
        let _ = engine;
        UserState::new("u1")
    }

    fn empty_health_map() -> HashMap<String, bool> {
        HashMap::new()
    }

    #[test]
    fn fresh_user_gets_onboarding_depth_and_a_module() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let state = all_healthy(&engine);
        let decision = engine.decide(&state, None, &empty_health_map());
        assert_eq!(decision.depth, DecisionDepth::Onboarding);
        assert!(config::module(&decision.next_module).is_some());
        assert!(decision.confidence >= 0.3);
    }

    #[test]
    fn critical_weakness_drives_depth_and_trigger() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut state = UserState::new("u2");
        state.scores.clarity_avg = 0.15;
        state.scores.tradeoff_avg = 0.8;
        state.scores.adaptability_avg = 0.8;
        state.scores.failure_awareness_avg = 0.8;
        state.scores.dsa_predict_skill = 0.8;

        let decision = engine.decide(&state, None, &empty_health_map());
        assert_eq!(decision.depth, DecisionDepth::Critical);
        assert_eq!(decision.weakness_trigger.as_deref(), Some("clarity_avg"));
        assert!(decision.rule_reason.contains("critically low"));
        let picked = config::module(&decision.next_module).unwrap();
        assert!(picked.remediation_skills.contains(&"clarity_avg") || picked.name == "project_studio" && picked.remediation_skills.is_empty());
    }

    #[test]
    fn candidate_scores_are_sorted_descending() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut state = UserState::new("u3");
        state.scores.tradeoff_avg = 0.3;
        let decision = engine.decide(&state, None, &empty_health_map());
        for pair in decision.candidate_scores.windows(2) {
            assert!(pair[0].total_score >= pair[1].total_score);
        }
        assert!(decision.candidate_scores.len() <= 5);
    }

    #[test]
    fn diversity_filter_avoids_hammering_same_module() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut state = UserState::new("u4");
        state.scores.clarity_avg = 0.3;
        state.recent_modules = vec![
            "production_interview".to_string(),
            "production_interview".to_string(),
            "production_interview".to_string(),
        ];
        let decision = engine.decide(&state, None, &empty_health_map());
        assert_ne!(decision.next_module, "production_interview");
    }

    #[test]
    fn unhealthy_service_excludes_module_from_candidates() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let state = UserState::new("u5");
        let mut health = HashMap::new();
        for m in MODULES {
            health.insert(m.name.to_string(), m.name != "production_interview");
        }
        let decision = engine.decide(&state, None, &health);
        assert!(decision.candidate_scores.iter().all(|c| c.module != "production_interview"));
    }

    #[test]
    fn every_service_unhealthy_still_returns_a_module() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let state = UserState::new("u6");
        let mut health = HashMap::new();
        for m in MODULES {
            health.insert(m.name.to_string(), false);
        }
        let decision = engine.decide(&state, None, &health);
        assert!(config::module(&decision.next_module).is_some());
    }

    #[test]
    fn pattern_signal_boosts_relevant_module() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut state = UserState::new("u7");
        state.scores.tradeoff_avg = 0.3;
        let ctx = MemoryContext {
            weakness_summary: None,
            recent_events: vec![MemoryEvent {
                event_type: "weakness_detected".to_string(),
                module: "interactive_course".to_string(),
            }],
            patterns: vec![MemoryPattern {
                description: "Repeated struggles with Tradeoff Analysis in system design".to_string(),
                pattern_type: "recurring_weakness".to_string(),
                confidence: 0.9,
            }],
        };
        let score = engine.score_candidate(
            config::module("interactive_course").unwrap(),
            &state,
            Some(&ctx),
        );
        assert!(score.pattern_score > 0.5);
        assert!(score.rate_of_change_score > 0.5);
    }

    proptest::proptest! {
        /// The ranking produced by `decide` is always maximal: its winner's
        /// score is never less than any other candidate's, and the full
        /// candidate list is sorted descending, for any skill-score profile.
        #[test]
        fn ranking_is_maximal_for_any_skill_profile(
            clarity_avg in 0.0f64..=1.0,
            tradeoff_avg in 0.0f64..=1.0,
            adaptability_avg in 0.0f64..=1.0,
            failure_awareness_avg in 0.0f64..=1.0,
            dsa_predict_skill in 0.0f64..=1.0,
        ) {
            let engine = DecisionEngine::new(EngineConfig::default());
            let mut state = UserState::new("proptest-user");
            state.scores = crate::models::SkillScores {
                clarity_avg,
                tradeoff_avg,
                adaptability_avg,
                failure_awareness_avg,
                dsa_predict_skill,
            };

            let decision = engine.decide(&state, None, &HashMap::new());

            for pair in decision.candidate_scores.windows(2) {
                prop_assert!(pair[0].total_score >= pair[1].total_score);
            }
            if let Some(top) = decision.candidate_scores.first() {
                for candidate in &decision.candidate_scores {
                    prop_assert!(top.total_score >= candidate.total_score);
                }
            }
        }
    }
}
