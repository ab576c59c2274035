use serde::Deserialize;

use truffle_core::types::ChatMessage;

/// Wire shapes for the handful of Web API responses the client reads.
/// Everything else in the payloads is ignored.

#[derive(Debug, Deserialize)]
pub struct ChannelsResponse {
    #[serde(default)]
    pub channels: Vec<ApiChannel>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct ApiChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub members: Vec<ApiMember>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_app_user: bool,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub profile: Option<ApiProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
}

impl ApiMember {
    /// Best available human-readable name: profile display name, then
    /// real name, then the handle, then the raw id.
    pub fn best_display_name(&self) -> String {
        let profile = self.profile.as_ref();
        [
            profile.map(|p| p.display_name.as_str()).unwrap_or(""),
            profile.map(|p| p.real_name.as_str()).unwrap_or(""),
            self.name.as_str(),
            self.id.as_str(),
        ]
        .iter()
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
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

impl ApiMessage {
    /// Attach the channel id (history payloads do not carry it).
    pub fn into_message(self, channel_id: &str) -> ChatMessage {
        ChatMessage {
            channel_id: channel_id.to_string(),
            ts: self.ts,
            thread_ts: self.thread_ts,
            user: self.user,
            text: self.text,
            subtype: self.subtype,
            reply_count: self.reply_count,
            bot_id: self.bot_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ResponseMetadata {
    /// End-of-pagination is a null or empty cursor.
    pub fn cursor(meta: &Option<Self>) -> Option<String> {
        meta.as_ref()
            .and_then(|m| m.next_cursor.clone())
            .filter(|c| !c.is_empty())
    }
}
