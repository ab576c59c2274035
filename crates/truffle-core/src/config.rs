use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (truffle.toml + TRUFFLE_* env overrides).
///
/// A handful of externally-specified variable names (SLACK_BOT_AUTH_TOKEN,
/// OPENAI_API_KEY, …) are applied on top of the figment merge so existing
/// deployments keep working without the TRUFFLE_ prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruffleConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub ingestor: IngestorServerConfig,
    #[serde(default)]
    pub expert_api: ExpertApiConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

impl Default for TruffleConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            slack: SlackConfig::default(),
            classifier: ClassifierConfig::default(),
            pipeline: PipelineConfig::default(),
            ingestion: IngestionConfig::default(),
            ingestor: IngestorServerConfig::default(),
            expert_api: ExpertApiConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path, or ":memory:" for tests.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub auth_token: String,
    /// At most this many API calls per batch window.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Sleep this long once the batch budget is spent.
    #[serde(default = "default_batch_wait_seconds")]
    pub batch_wait_seconds: u64,
    /// Small delay before every call.
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            batch_size: default_batch_size(),
            batch_wait_seconds: default_batch_wait_seconds(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_classifier_model(),
            base_url: default_openai_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Gate for the skill-extraction stage (EXTRACT_SKILLS=1).
    #[serde(default)]
    pub extract_skills: bool,
    /// Gate for the classification stage (CLASSIFY_EXPERTISE=1).
    #[serde(default)]
    pub classify_expertise: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_skills: false,
            classify_expertise: false,
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Seconds between scheduled ingestion runs.
    #[serde(default = "default_ingestion_interval")]
    pub interval_secs: u64,
    /// Look-back window for the first run (30 days).
    #[serde(default = "default_first_run_hours")]
    pub first_run_hours: u64,
    /// Look-back window for periodic runs.
    #[serde(default = "default_periodic_hours")]
    pub periodic_hours: u64,
    /// Queue-stat polling cadence while waiting for the first run to drain.
    #[serde(default = "default_drain_poll_secs")]
    pub drain_poll_secs: u64,
    /// Give up waiting for the drain after this long (60 min).
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Directory of taxonomy JSON files imported when the skills table is empty.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ingestion_interval(),
            first_run_hours: default_first_run_hours(),
            periodic_hours: default_periodic_hours(),
            drain_poll_secs: default_drain_poll_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            skills_dir: default_skills_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorServerConfig {
    #[serde(default = "default_bind")]
    pub host: String,
    #[serde(default = "default_ingestor_port")]
    pub port: u16,
}

impl Default for IngestorServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind(),
            port: default_ingestor_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertApiConfig {
    #[serde(default = "default_bind")]
    pub host: String,
    #[serde(default = "default_expert_api_port")]
    pub port: u16,
    /// Base URL the bot uses to reach this service.
    #[serde(default = "default_expert_api_url")]
    pub url: String,
}

impl Default for ExpertApiConfig {
    fn default() -> Self {
        Self {
            host: default_bind(),
            port: default_expert_api_port(),
            url: default_expert_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bind")]
    pub host: String,
    #[serde(default = "default_bot_port")]
    pub port: u16,
    /// Slack signing secret; request signatures are only checked when set.
    pub signing_secret: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            host: default_bind(),
            port: default_bot_port(),
            signing_secret: None,
            client_id: None,
            client_secret: None,
        }
    }
}

fn default_db_path() -> String {
    "truffle.db".to_string()
}
fn default_batch_size() -> u32 {
    50
}
fn default_batch_wait_seconds() -> u64 {
    61
}
fn default_inter_call_delay_ms() -> u64 {
    100
}
fn default_page_size() -> u32 {
    200
}
fn default_classifier_model() -> String {
    "gpt-4o".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_workers() -> usize {
    3
}
fn default_ingestion_interval() -> u64 {
    60
}
fn default_first_run_hours() -> u64 {
    24 * 30
}
fn default_periodic_hours() -> u64 {
    1
}
fn default_drain_poll_secs() -> u64 {
    10
}
fn default_drain_timeout_secs() -> u64 {
    3600
}
fn default_skills_dir() -> String {
    "skills".to_string()
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_ingestor_port() -> u16 {
    8001
}
fn default_expert_api_port() -> u16 {
    8002
}
fn default_expert_api_url() -> String {
    format!("http://localhost:{}", default_expert_api_port())
}
fn default_bot_port() -> u16 {
    8003
}

impl TruffleConfig {
    /// Load config from a TOML file with TRUFFLE_* env var overrides,
    /// then the externally-specified variable names on top.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("truffle.toml");

        let mut config: TruffleConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TRUFFLE_").split("_"))
            .extract()
            .map_err(|e| crate::error::TruffleError::Config(e.to_string()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Overrides for the variable names the deployment environment uses.
    /// Flags are truthy only when exactly "1".
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRUFFLE_DB_URL") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("SLACK_BOT_AUTH_TOKEN") {
            self.slack.auth_token = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.classifier.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("CLASSIFIER_MODEL") {
            self.classifier.model = v;
        }
        if let Ok(v) = std::env::var("EXTRACT_SKILLS") {
            self.pipeline.extract_skills = v == "1";
        }
        if let Ok(v) = std::env::var("CLASSIFY_EXPERTISE") {
            self.pipeline.classify_expertise = v == "1";
        }
        if let Some(v) = parse_env("SLACK_BATCH_SIZE") {
            self.slack.batch_size = v;
        }
        if let Some(v) = parse_env("SLACK_BATCH_WAIT_SECONDS") {
            self.slack.batch_wait_seconds = v;
        }
        if let Ok(v) = std::env::var("INGESTOR_HOST") {
            self.ingestor.host = v;
        }
        if let Some(v) = parse_env("INGESTOR_PORT") {
            self.ingestor.port = v;
        }
        if let Ok(v) = std::env::var("EXPERT_API_HOST") {
            self.expert_api.host = v;
        }
        if let Some(v) = parse_env("EXPERT_API_PORT") {
            self.expert_api.port = v;
        }
        if let Ok(v) = std::env::var("EXPERT_API_URL") {
            self.expert_api.url = v;
        }
        if let Ok(v) = std::env::var("SLACK_BOT_HOST") {
            self.bot.host = v;
        }
        if let Some(v) = parse_env("SLACK_BOT_PORT") {
            self.bot.port = v;
        }
        if let Ok(v) = std::env::var("SLACK_SIGNING_SECRET") {
            if !v.is_empty() {
                self.bot.signing_secret = Some(v);
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = TruffleConfig::default();
        assert_eq!(cfg.slack.batch_size, 50);
        assert_eq!(cfg.slack.batch_wait_seconds, 61);
        assert_eq!(cfg.slack.inter_call_delay_ms, 100);
        assert_eq!(cfg.pipeline.workers, 3);
        assert_eq!(cfg.ingestion.first_run_hours, 720);
        assert_eq!(cfg.ingestion.periodic_hours, 1);
        assert!(!cfg.pipeline.extract_skills);
        assert!(!cfg.pipeline.classify_expertise);
    }
}
