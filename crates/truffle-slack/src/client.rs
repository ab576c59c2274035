use std::collections::HashMap;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use truffle_core::config::SlackConfig;
use truffle_core::types::{ChatChannel, ChatMessage, ChatUser};

use crate::error::{Result, SlackError};
use crate::limiter::BatchLimiter;
use crate::mentions::mentions_bot;
use crate::types::{
    ChannelsResponse, HistoryResponse, ResponseMetadata, UsersResponse,
};

const SLACK_API_BASE: &str = "https://slack.com/api";
/// Total attempts per logical call, counting the first one.
const MAX_ATTEMPTS: u32 = 3;
/// The workspace system user is not a real member.
const WORKSPACE_SYSTEM_USER: &str = "USLACKBOT";

/// Transport seam for the Web API: POST one method with form parameters,
/// get the raw JSON envelope back. The production implementation is
/// reqwest; tests substitute a scripted stub.
#[async_trait]
pub trait SlackTransport: Send + Sync {
    async fn call(&self, method: &str, params: &[(String, String)]) -> Result<Value>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            token,
            base_url: SLACK_API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl SlackTransport for HttpTransport {
    async fn call(&self, method: &str, params: &[(String, String)]) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?;

        if resp.status().as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(SlackError::RateLimited { retry_after });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| SlackError::Parse(e.to_string()))?;

        if !body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let error = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown_error")
                .to_string();
            if error == "ratelimited" {
                return Err(SlackError::RateLimited { retry_after: None });
            }
            return Err(SlackError::Api { error });
        }

        Ok(body)
    }
}

/// Paginated, rate-limited read access to channels, users, history, and
/// thread replies, plus the bot's own reply posting.
pub struct SlackClient {
    transport: Box<dyn SlackTransport>,
    limiter: BatchLimiter,
    page_size: u32,
    retry_base_delay: Duration,
    bot_id: tokio::sync::Mutex<Option<String>>,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Self {
        Self::with_transport(
            Box::new(HttpTransport::new(config.auth_token.clone())),
            BatchLimiter::new(
                config.batch_size,
                Duration::from_secs(config.batch_wait_seconds),
                Duration::from_millis(config.inter_call_delay_ms),
            ),
            config.page_size,
            Duration::from_secs(1),
        )
    }

    pub fn with_transport(
        transport: Box<dyn SlackTransport>,
        limiter: BatchLimiter,
        page_size: u32,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            page_size,
            retry_base_delay,
            bot_id: tokio::sync::Mutex::new(None),
        }
    }

    /// Start a fresh rate-limit batch (called between logical operations,
    /// e.g. before each channel's history walk).
    pub fn reset_batch_counter(&self) {
        self.limiter.reset();
    }

    /// One Web API call through the batch limiter, retrying rate-limit
    /// errors with the server's hint (+1 s) or exponential backoff.
    async fn call(&self, method: &str, params: &[(String, String)]) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;
            attempt += 1;
            match self.transport.call(method, params).await {
                Err(SlackError::RateLimited { retry_after }) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(SlackError::RateLimited { retry_after });
                    }
                    let wait = retry_backoff(retry_after, attempt, self.retry_base_delay);
                    warn!(method, attempt, wait_secs = wait.as_secs(), "rate limited, backing off");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    /// All public channels the bot is a member of, following the cursor
    /// until exhausted.
    pub async fn list_public_channels(&self, exclude_archived: bool) -> Result<Vec<ChatChannel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("types".to_string(), "public_channel".to_string()),
                ("exclude_archived".to_string(), exclude_archived.to_string()),
                ("limit".to_string(), "1000".to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor".to_string(), c.clone()));
            }

            let body = self.call("users.conversations", &params).await?;
            let page: ChannelsResponse =
                serde_json::from_value(body).map_err(|e| SlackError::Parse(e.to_string()))?;

            channels.extend(page.channels.into_iter().map(|c| ChatChannel {
                id: c.id,
                name: c.name,
            }));

            cursor = ResponseMetadata::cursor(&page.response_metadata);
            if cursor.is_none() {
                break;
            }
        }

        debug!(count = channels.len(), "listed public channels");
        Ok(channels)
    }

    /// Workspace members keyed by external id, minus deleted users, bots,
    /// and the workspace system user.
    pub async fn list_users(
        &self,
        exclude_deleted: bool,
        exclude_bots: bool,
    ) -> Result<HashMap<String, ChatUser>> {
        let mut users = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("limit".to_string(), "1000".to_string())];
            if let Some(c) = &cursor {
                params.push(("cursor".to_string(), c.clone()));
            }

            let body = self.call("users.list", &params).await?;
            let page: UsersResponse =
                serde_json::from_value(body).map_err(|e| SlackError::Parse(e.to_string()))?;

            for member in page.members {
                if exclude_deleted && member.deleted {
                    continue;
                }
                if exclude_bots
                    && (member.is_bot || member.is_app_user || member.id == WORKSPACE_SYSTEM_USER)
                {
                    continue;
                }
                let user = ChatUser {
                    external_id: member.id.clone(),
                    display_name: member.best_display_name(),
                    handle: member.name.clone(),
                    timezone: member.tz.clone(),
                };
                users.insert(member.id, user);
            }

            cursor = ResponseMetadata::cursor(&page.response_metadata);
            if cursor.is_none() {
                break;
            }
        }

        debug!(count = users.len(), "listed workspace users");
        Ok(users)
    }

    /// The bot's own external id, cached after the first `auth.test`.
    pub async fn bot_external_id(&self) -> Result<String> {
        let mut cached = self.bot_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let body = self.call("auth.test", &[]).await?;
        let id = body
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SlackError::Parse("auth.test missing user_id".to_string()))?
            .to_string();
        *cached = Some(id.clone());
        Ok(id)
    }

    /// Lazy stream of channel messages newer than `since_hours`: top-level
    /// messages in channel order, each parent followed by its thread
    /// replies. Messages with a subtype and messages mentioning the bot
    /// are dropped; thread walks skip the parent duplicate.
    pub fn recent_messages<'a>(
        &'a self,
        channel_id: &str,
        since_hours: u64,
    ) -> impl Stream<Item = Result<ChatMessage>> + 'a {
        let channel_id = channel_id.to_string();
        try_stream! {
            let bot_id = self.bot_external_id().await?;
            let oldest = (chrono::Utc::now()
                - chrono::Duration::hours(since_hours as i64))
                .timestamp()
                .to_string();

            let mut cursor: Option<String> = None;
            loop {
                let mut params = vec![
                    ("channel".to_string(), channel_id.clone()),
                    ("oldest".to_string(), oldest.clone()),
                    ("limit".to_string(), self.page_size.to_string()),
                ];
                if let Some(c) = &cursor {
                    params.push(("cursor".to_string(), c.clone()));
                }

                let body = self.call("conversations.history", &params).await?;
                let page: HistoryResponse = serde_json::from_value(body)
                    .map_err(|e| SlackError::Parse(e.to_string()))?;

                for msg in page.messages {
                    if msg.subtype.is_some() {
                        continue;
                    }
                    if mentions_bot(&msg.text, &bot_id) {
                        continue;
                    }

                    let has_replies = msg.reply_count > 0;
                    let parent_ts = msg
                        .thread_ts
                        .clone()
                        .unwrap_or_else(|| msg.ts.clone());

                    yield msg.into_message(&channel_id);

                    if !has_replies {
                        continue;
                    }

                    let mut thread_cursor: Option<String> = None;
                    loop {
                        let mut params = vec![
                            ("channel".to_string(), channel_id.clone()),
                            ("ts".to_string(), parent_ts.clone()),
                            ("limit".to_string(), self.page_size.to_string()),
                        ];
                        if let Some(c) = &thread_cursor {
                            params.push(("cursor".to_string(), c.clone()));
                        }

                        let body = self.call("conversations.replies", &params).await?;
                        let thread: HistoryResponse = serde_json::from_value(body)
                            .map_err(|e| SlackError::Parse(e.to_string()))?;

                        for reply in thread.messages {
                            if reply.ts == parent_ts {
                                continue;
                            }
                            if mentions_bot(&reply.text, &bot_id) {
                                continue;
                            }
                            yield reply.into_message(&channel_id);
                        }

                        thread_cursor = ResponseMetadata::cursor(&thread.response_metadata);
                        if thread_cursor.is_none() {
                            break;
                        }
                    }
                }

                cursor = ResponseMetadata::cursor(&page.response_metadata);
                if cursor.is_none() {
                    break;
                }
            }
        }
    }

    /// Post a message, threaded when `thread_ts` is given.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let mut params = vec![
            ("channel".to_string(), channel.to_string()),
            ("text".to_string(), text.to_string()),
        ];
        if let Some(ts) = thread_ts {
            params.push(("thread_ts".to_string(), ts.to_string()));
        }
        self.call("chat.postMessage", &params).await?;
        Ok(())
    }
}

/// Wait before retrying a rate-limited call: the server's hint plus a one
/// second buffer when present, else `2^attempt × base`.
fn retry_backoff(retry_after: Option<u64>, attempt: u32, base: Duration) -> Duration {
    match retry_after {
        Some(secs) => Duration::from_secs(secs + 1),
        None => base * 2u32.saturating_pow(attempt),
    }
}
