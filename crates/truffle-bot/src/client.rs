use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Expert API error ({status})")]
    Status { status: u16 },
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiExpert {
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub evidence_count: i64,
    #[serde(default)]
    pub total_messages: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<ApiExpert>,
    #[serde(default)]
    pub total_found: usize,
    #[serde(default)]
    pub search_strategy: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSkill {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub expert_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillsResponse {
    #[serde(default)]
    pub skills: Vec<ApiSkill>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// HTTP client for the Expert API service.
pub struct ExpertApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExpertApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn search_experts(
        &self,
        skills: &[String],
        limit: i64,
        min_confidence: f64,
    ) -> Result<SearchResponse> {
        let body = serde_json::json!({
            "skills": skills,
            "limit": limit,
            "min_confidence": min_confidence,
            "include_confidence": true,
        });

        let resp = self
            .client
            .post(format!("{}/experts/search", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(ApiError::Status { status });
        }

        let result: SearchResponse = resp.json().await?;
        info!(skills = ?skills, found = result.total_found, "expert search via API");
        Ok(result)
    }

    pub async fn list_skills(&self) -> Result<SkillsResponse> {
        let resp = self
            .client
            .get(format!("{}/skills", self.base_url))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(ApiError::Status { status });
        }
        Ok(resp.json().await?)
    }
}
