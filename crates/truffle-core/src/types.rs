use serde::{Deserialize, Serialize};

/// Classifier verdict on a (message, skill) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLabel {
    PositiveExpertise,
    NegativeExpertise,
    Neutral,
}

impl std::fmt::Display for ExpertiseLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PositiveExpertise => write!(f, "positive_expertise"),
            Self::NegativeExpertise => write!(f, "negative_expertise"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for ExpertiseLabel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive_expertise" => Ok(Self::PositiveExpertise),
            "negative_expertise" => Ok(Self::NegativeExpertise),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown expertise label: {other}")),
        }
    }
}

/// One classified observation for a single skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEvaluation {
    pub skill_key: String,
    pub label: ExpertiseLabel,
    /// 0.0–1.0, clamped at parse time and again at the store boundary.
    pub confidence: f64,
    pub rationale: String,
}

/// A public channel the bot is a member of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    pub name: String,
}

/// A workspace member, normalized from the chat platform's user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    /// Opaque platform identifier (e.g. "U0123ABCD"). Unique per workspace.
    pub external_id: String,
    pub display_name: String,
    /// The short handle used in mention rewriting.
    pub handle: String,
    pub timezone: Option<String>,
}

/// A single channel message (top-level or thread reply).
///
/// `ts` doubles as the message identifier; `thread_ts` is set on replies
/// (and on parents, where it equals `ts`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel_id: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Author's external id. Absent for some system messages.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl ChatMessage {
    /// True for replies inside a thread (parents carry `thread_ts == ts`).
    pub fn is_thread_reply(&self) -> bool {
        match &self.thread_ts {
            Some(parent) => *parent != self.ts,
            None => false,
        }
    }

    /// Key identifying the thread this message belongs to.
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}
