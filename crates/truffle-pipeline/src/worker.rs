use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use truffle_queue::TaskQueue;

use crate::processor::MessageProcessor;

/// Sleep when the queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(500);

struct WorkerState {
    id: String,
    running: AtomicBool,
    processed: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub is_running: bool,
    pub processed_count: u64,
    pub error_count: u64,
}

/// N concurrent consumers running the per-message pipeline.
///
/// `stop` cancels the shared token and awaits every worker; a worker
/// finishes its in-flight task before exiting.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    processor: Arc<MessageProcessor>,
    num_workers: usize,
    cancel: CancellationToken,
    workers: Mutex<Vec<Arc<WorkerState>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<TaskQueue>, processor: Arc<MessageProcessor>, num_workers: usize) -> Self {
        Self {
            queue,
            processor,
            num_workers,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        info!(workers = self.num_workers, "starting message workers");
        let mut workers = self.workers.lock().unwrap();
        let mut handles = self.handles.lock().unwrap();

        for i in 0..self.num_workers {
            let state = Arc::new(WorkerState {
                id: format!("worker-{}", i + 1),
                running: AtomicBool::new(true),
                processed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            });
            workers.push(state.clone());

            let queue = self.queue.clone();
            let processor = self.processor.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                run_worker(state, queue, processor, cancel).await;
            }));
        }
    }

    /// Signal shutdown and wait for every worker to exit.
    pub async fn stop(&self) {
        info!("stopping all workers");
        self.cancel.cancel();
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task join error: {e}");
            }
        }
        info!("all workers stopped");
    }

    pub fn stats(&self) -> Vec<WorkerStats> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .map(|w| WorkerStats {
                worker_id: w.id.clone(),
                is_running: w.running.load(Ordering::Relaxed),
                processed_count: w.processed.load(Ordering::Relaxed),
                error_count: w.errors.load(Ordering::Relaxed),
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.running.load(Ordering::Relaxed))
    }
}

async fn run_worker(
    state: Arc<WorkerState>,
    queue: Arc<TaskQueue>,
    processor: Arc<MessageProcessor>,
    cancel: CancellationToken,
) {
    info!(worker = %state.id, "worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let task = match queue.dequeue() {
            Some(task) => task,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_SLEEP) => continue,
                }
            }
        };

        debug!(worker = %state.id, task_id = %task.task_id, "processing task");
        match processor.process(&task).await {
            Ok(_) => {
                queue.mark_completed(&task.task_id);
                state.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                queue.mark_failed(&task.task_id, &e.to_string());
                state.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    state.running.store(false, Ordering::Relaxed);
    info!(
        worker = %state.id,
        processed = state.processed.load(Ordering::Relaxed),
        errors = state.errors.load(Ordering::Relaxed),
        "worker stopped"
    );
}
