use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use truffle_core::config::ClassifierConfig;
use truffle_core::types::{ExpertiseLabel, SkillEvaluation};

use crate::error::{ClassifierError, Result};
use crate::types::{ExpertiseClassifier, MessageCandidate, MessageEvaluation};

const SYSTEM_PROMPT: &str = "You are an expert annotator. For each listed skill, classify whether the \
author demonstrates knowledge in THIS message.\n\
Label rules:\n\
- positive_expertise: the author provides guidance/solution/clear prior use \
or explains the concept/tool.\n\
- negative_expertise: the author states they don't know / are unsure / are \
new to the skill.\n\
- neutral: question asking, quoting others, off-topic mentions.\n\
Consider negation and quotes; do not attribute quoted text to the author.";

/// Stateless wrapper over an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClassifier {
    /// Fails with a config error when the credential is missing — callers
    /// decide whether that degrades the service or aborts it.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClassifierError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    async fn classify_one(&self, candidate: &MessageCandidate) -> Result<MessageEvaluation> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(candidate)},
            ],
            "temperature": 0.0,
        });

        debug!(message_id = %candidate.message_id, skills = candidate.skill_keys.len(),
            "classifying message");

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ClassifierError::RateLimited);
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "classifier API error");
            return Err(ClassifierError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(ClassifierError::Http)?;
        let raw = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string());

        Ok(MessageEvaluation {
            message_id: candidate.message_id.clone(),
            author_id: candidate.author_id.clone(),
            results: parse_results(&raw),
        })
    }
}

#[async_trait]
impl ExpertiseClassifier for OpenAiClassifier {
    async fn classify(&self, candidates: &[MessageCandidate]) -> Result<Vec<MessageEvaluation>> {
        let mut evaluations = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            evaluations.push(self.classify_one(candidate).await?);
        }
        Ok(evaluations)
    }
}

/// A classifier stand-in used when no credential was configured at
/// startup: the service stays up and every classification fails per task.
pub struct UnconfiguredClassifier;

#[async_trait]
impl ExpertiseClassifier for UnconfiguredClassifier {
    async fn classify(&self, _candidates: &[MessageCandidate]) -> Result<Vec<MessageEvaluation>> {
        Err(ClassifierError::Config(
            "classifier credential missing".to_string(),
        ))
    }
}

pub(crate) fn build_user_prompt(candidate: &MessageCandidate) -> String {
    let mut prompt = format!("Message:\n{}\n\n", candidate.text);
    if let Some(parent) = candidate.parent_text.as_deref().filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("Parent:\n{parent}\n\n"));
    }
    prompt.push_str(&format!(
        "Classify these skills: {}\n",
        candidate.skill_keys.join(", ")
    ));
    prompt.push_str(
        "Return strict JSON: {\"results\": [{\"skill_key\": str, \"label\": one of \
         [positive_expertise, negative_expertise, neutral], \
         \"confidence\": float 0..1, \"rationale\": str} ... ]}",
    );
    prompt
}

/// Parse the completion. Malformed JSON yields an empty list; missing
/// fields fall back to neutral / 0.5 / empty rationale; confidence is
/// clamped into [0, 1]; entries without a skill key are dropped.
pub(crate) fn parse_results(raw: &str) -> Vec<SkillEvaluation> {
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let items = match parsed.get("results").and_then(|r| r.as_array()) {
        Some(items) => items,
        None => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let skill_key = item
                .get("skill_key")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if skill_key.is_empty() {
                return None;
            }
            let label = item
                .get("label")
                .and_then(|v| v.as_str())
                .and_then(|s| s.trim().parse::<ExpertiseLabel>().ok())
                .unwrap_or(ExpertiseLabel::Neutral);
            let confidence = item
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            let rationale = item
                .get("rationale")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            Some(SkillEvaluation {
                skill_key,
                label,
                confidence,
                rationale,
            })
        })
        .collect()
}

// OpenAI chat completions response shape (the part we read)

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
