use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use truffle_core::types::{ChatChannel, ChatMessage, ChatUser};

use crate::types::{MessageTask, QueueStats, TaskStatus};

/// A task gets this many retries before it is archived as failed
/// (so at most MAX_RETRIES + 1 attempts in total).
const MAX_RETRIES: u32 = 3;
/// Terminal archives keep at most this many tasks; the oldest are evicted.
const MAX_ARCHIVE: usize = 1000;

/// In-memory FIFO of message tasks.
///
/// All state lives behind one mutex; holders never perform I/O. New tasks
/// queue FIFO; retried tasks go back to the front so a transient failure
/// does not amplify tail latency.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    pending: VecDeque<MessageTask>,
    processing: HashMap<String, MessageTask>,
    completed: VecDeque<MessageTask>,
    failed: VecDeque<MessageTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                processing: HashMap::new(),
                completed: VecDeque::new(),
                failed: VecDeque::new(),
            }),
        }
    }

    /// Append a message task; returns its id.
    pub fn enqueue(
        &self,
        message: ChatMessage,
        channel: ChatChannel,
        users: Arc<HashMap<String, ChatUser>>,
    ) -> String {
        let task = MessageTask {
            task_id: Uuid::new_v4().to_string(),
            message,
            channel,
            users,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
        };
        let task_id = task.task_id.clone();

        let mut inner = self.inner.lock().unwrap();
        inner.pending.push_back(task);
        debug!(task_id = %task_id, "enqueued message task");
        task_id
    }

    /// Pop the next task and move it into the processing set. The worker
    /// gets its own copy; the queue keeps one for retry bookkeeping.
    pub fn dequeue(&self) -> Option<MessageTask> {
        let mut inner = self.inner.lock().unwrap();
        let mut task = inner.pending.pop_front()?;
        task.status = TaskStatus::Processing;
        task.started_at = Some(Utc::now());
        inner.processing.insert(task.task_id.clone(), task.clone());
        debug!(task_id = %task.task_id, "dequeued message task");
        Some(task)
    }

    pub fn mark_completed(&self, task_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut task) = inner.processing.remove(task_id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            push_archived(&mut inner.completed, task);
            debug!(task_id, "task completed");
        }
    }

    /// Record a failure: retry (to the front of pending) while the budget
    /// lasts, otherwise archive as failed.
    pub fn mark_failed(&self, task_id: &str, error_message: &str) {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut task) = inner.processing.remove(task_id) else {
            return;
        };
        task.error_message = Some(error_message.to_string());
        task.retry_count += 1;

        if task.retry_count <= MAX_RETRIES {
            task.status = TaskStatus::Retrying;
            warn!(task_id, attempt = task.retry_count, "retrying task");
            inner.pending.push_front(task);
        } else {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            error!(task_id, attempts = task.retry_count, error = %error_message,
                "task failed permanently");
            push_archived(&mut inner.failed, task);
        }
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            pending: inner.pending.len(),
            processing: inner.processing.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
            total_processed: inner.completed.len() + inner.failed.len(),
        }
    }

    /// Drop the completed archive to free memory; returns how many were
    /// dropped.
    pub fn clear_completed(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.completed.len();
        inner.completed.clear();
        info!(count, "cleared completed tasks");
        count
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn push_archived(archive: &mut VecDeque<MessageTask>, task: MessageTask) {
    if archive.len() >= MAX_ARCHIVE {
        archive.pop_front();
    }
    archive.push_back(task);
}
