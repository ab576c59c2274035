use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sort order for the ranked expert query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Score,
    Recent,
    EvidenceCount,
    Alphabetical,
}

impl std::str::FromStr for SortBy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Self::Score),
            "recent" => Ok(Self::Recent),
            "evidence_count" => Ok(Self::EvidenceCount),
            "alphabetical" => Ok(Self::Alphabetical),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Parameters for the ranked expert query (§ ranked search).
#[derive(Debug, Clone)]
pub struct ExpertQuery {
    pub skill_keys: Vec<String>,
    pub min_confidence: f64,
    pub min_evidence_count: i64,
    /// 0 disables the time-window filter.
    pub window_days: i64,
    pub include_negative: bool,
    pub exclude_neutral: bool,
    pub sort_by: SortBy,
    /// Per-day multiplier applied to a row's confidence.
    pub time_decay_factor: f64,
    /// How much a negative signal penalises the average.
    pub negative_weight: f64,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ExpertQuery {
    fn default() -> Self {
        Self {
            skill_keys: Vec::new(),
            min_confidence: 0.1,
            min_evidence_count: 1,
            window_days: 180,
            include_negative: false,
            exclude_neutral: true,
            sort_by: SortBy::Score,
            time_decay_factor: 0.95,
            negative_weight: 0.5,
            limit: 10,
            offset: 0,
        }
    }
}

/// One (user, skill) row from the ranked expert query.
#[derive(Debug, Clone, Serialize)]
pub struct ExpertHit {
    pub external_id: String,
    pub display_name: String,
    pub timezone: Option<String>,
    pub skill_key: String,
    pub skill_name: String,
    pub expertise_score: f64,
    pub confidence_level: &'static str,
    pub evidence_count: i64,
    pub positive_count: i64,
    pub negative_count: i64,
    pub neutral_count: i64,
    pub last_activity: Option<NaiveDate>,
}

/// Bucket a decayed score into the coarse label surfaced to users.
pub fn confidence_level(score: f64) -> &'static str {
    if score >= 0.8 {
        "high"
    } else if score >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

/// A skill as stored, aliases already parsed out of the JSON column.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSkill {
    pub skill_id: i64,
    pub skill_key: String,
    pub name: String,
    pub domain: String,
    pub aliases: Vec<String>,
}

/// An evidence row that was actually inserted (duplicates are skipped and
/// do not appear here). Feeds the incremental score update.
#[derive(Debug, Clone)]
pub struct InsertedEvidence {
    pub user_id: i64,
    pub skill_id: i64,
    pub label: truffle_core::types::ExpertiseLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationStats {
    pub total_evidence: i64,
    pub total_scores: i64,
    pub users_with_scores: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthTotals {
    pub users: i64,
    pub skills: i64,
    pub evidence: i64,
    pub scores: i64,
}
