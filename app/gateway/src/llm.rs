use std::env;
use std::time::Duration;

use orch_db::ParsedScores;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{instrument, warn};

const SCORING_PROMPT_TEMPLATE: &str = "You are evaluating a user's answer to a technical reasoning question. Your job is to judge the user's thinking quality, not correctness. Question: {question} User Answer: {answer} Evaluate across 5 dimensions (clarity, tradeoffs, adaptability, failure_awareness, dsa_predict). Each in [0,1] to two decimals. dsa_predict is null if irrelevant. Output JSON only: {\"clarity\":0.00,\"tradeoffs\":0.00,\"adaptability\":0.00,\"failure_awareness\":0.00,\"dsa_predict\":null}";

const SCORING_TEMPERATURE: f64 = 0.1;
const SCORING_MAX_TOKENS: u32 = 500;
const SCORING_TIMEOUT_SECS: u64 = 20;
const FALLBACK_TIMEOUT_SECS: u64 = 25;

struct Provider {
    name: &'static str,
    base_url: String,
    api_key: String,
    model: String,
}

/// OpenAI-chat-completions-compatible client with a primary and fallback
/// provider. Any failure (missing key, transport error, non-200) on the
/// primary is retried on the fallback; if neither is configured or both
/// fail, callers receive `None`/null scores rather than an error.
pub struct LlmClient {
    http: reqwest::Client,
    primary: Option<Provider>,
    fallback: Option<Provider>,
    reasoning_timeout: Duration,
    reasoning_max_tokens: u32,
    reasoning_temperature: f64,
}

impl LlmClient {
    pub fn from_env(reasoning_timeout_seconds: f64) -> Self {
        let primary = env::var("GROQ_API_KEY").ok().map(|key| Provider {
            name: "groq",
            base_url: env::var("GROQ_API_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1/chat/completions".to_string()),
            api_key: key,
            model: env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
        });

        let fallback = env::var("OPENROUTER_API_KEY").ok().map(|key| Provider {
            name: "openrouter",
            base_url: env::var("OPENROUTER_API_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string()),
            api_key: key,
            model: env::var("OPENROUTER_MODEL").unwrap_or_else(|_| "meta-llama/llama-3.1-8b-instruct".to_string()),
        });

        Self {
            http: reqwest::Client::new(),
            primary,
            fallback,
            reasoning_timeout: Duration::from_secs_f64(reasoning_timeout_seconds),
            reasoning_max_tokens: 200,
            reasoning_temperature: 0.3,
        }
    }

    #[instrument(skip(self, question, answer))]
    pub async fn score_answer(&self, question: &str, answer: &str) -> ParsedScores {
        let prompt = SCORING_PROMPT_TEMPLATE
            .replace("{question}", question)
            .replace("{answer}", answer);

        let content = self
            .completion_with_fallback(
                &prompt,
                SCORING_TEMPERATURE,
                SCORING_MAX_TOKENS,
                Duration::from_secs(SCORING_TIMEOUT_SECS),
                Duration::from_secs(FALLBACK_TIMEOUT_SECS),
            )
            .await;

        match content {
            Some(text) => parse_scores(&text),
            None => ParsedScores::default(),
        }
    }

    /// Decorates a rule-based reason with a short LLM-generated sentence.
    /// Returns `None` on any failure so the caller keeps the rule reason.
    #[instrument(skip(self, rule_reason))]
    pub async fn decorate_reason(&self, rule_reason: &str, module_label: &str) -> Option<String> {
        let prompt = format!(
            "Rewrite this system-generated recommendation reason as one or two warm, encouraging sentences for the user. \
             Do not invent facts. Module: {module_label}. Reason: {rule_reason}"
        );
        self.completion_with_fallback(
            &prompt,
            self.reasoning_temperature,
            self.reasoning_max_tokens,
            self.reasoning_timeout,
            self.reasoning_timeout,
        )
        .await
    }

    async fn completion_with_fallback(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
        primary_timeout: Duration,
        fallback_timeout: Duration,
    ) -> Option<String> {
        if let Some(provider) = &self.primary {
            match self
                .chat_completion(provider, prompt, temperature, max_tokens, primary_timeout)
                .await
            {
                Ok(text) => return Some(text),
                Err(e) => warn!(provider = provider.name, error = %e, "primary llm provider failed"),
            }
        }
        if let Some(provider) = &self.fallback {
            match self
                .chat_completion(provider, prompt, temperature, max_tokens, fallback_timeout)
                .await
            {
                Ok(text) => return Some(text),
                Err(e) => warn!(provider = provider.name, error = %e, "fallback llm provider failed"),
            }
        }
        None
    }

    async fn chat_completion(
        &self,
        provider: &Provider,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        let body = json!({
            "model": provider.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(&provider.base_url)
            .bearer_auth(&provider.api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned status {}", provider.name, response.status());
        }

        let payload: Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("{} response missing message content", provider.name))
    }
}

fn parse_scores(raw: &str) -> ParsedScores {
    let trimmed = raw.trim();
    if let Some(scores) = try_parse_json_object(trimmed) {
        return scores;
    }

    if let Ok(clarity_block) = Regex::new(r#"\{[^{}]*"clarity"[^{}]*\}"#) {
        if let Some(m) = clarity_block.find(trimmed) {
            if let Some(scores) = try_parse_json_object(m.as_str()) {
                return scores;
            }
        }
    }

    if let Ok(any_block) = Regex::new(r"\{[\s\S]*?\}") {
        if let Some(m) = any_block.find(trimmed) {
            if let Some(scores) = try_parse_json_object(m.as_str()) {
                return scores;
            }
        }
    }

    ParsedScores::default()
}

fn try_parse_json_object(text: &str) -> Option<ParsedScores> {
    let value: Value = serde_json::from_str(text).ok()?;
    Some(ParsedScores {
        clarity: value.get("clarity").and_then(Value::as_f64),
        tradeoffs: value.get("tradeoffs").and_then(Value::as_f64),
        adaptability: value.get("adaptability").and_then(Value::as_f64),
        failure_awareness: value.get("failure_awareness").and_then(Value::as_f64),
        dsa_predict: value.get("dsa_predict").and_then(Value::as_f64),
    })
}
