use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use truffle_core::types::{ChatChannel, ChatMessage, ChatUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// One message waiting for (or moving through) the processing pipeline.
///
/// The user map is shared per scheduler run, so tasks hold an Arc rather
/// than a copy of the whole workspace directory.
#[derive(Debug, Clone)]
pub struct MessageTask {
    pub task_id: String,
    pub message: ChatMessage,
    pub channel: ChatChannel,
    pub users: Arc<HashMap<String, ChatUser>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_processed: usize,
}

impl QueueStats {
    /// Drained means nothing left to do and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}
