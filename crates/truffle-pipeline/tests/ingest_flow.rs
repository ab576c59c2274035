// End-to-end pipeline scenarios: queue -> workers -> matcher -> classifier
// stub -> store, against an in-memory database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;

use truffle_classifier::{ClassifierError, ExpertiseClassifier, MessageCandidate, MessageEvaluation};
use truffle_core::config::PipelineConfig;
use truffle_core::types::{ChatChannel, ChatMessage, ChatUser, ExpertiseLabel, SkillEvaluation};
use truffle_pipeline::processor::ProcessOutcome;
use truffle_pipeline::{MessageProcessor, WorkerPool};
use truffle_queue::{MessageTask, TaskQueue};
use truffle_store::{ExpertQuery, Store};
use truffle_taxonomy::{Skill, SkillMatcher};

/// Scripted classifier: optionally fails the first N calls, then labels
/// every requested skill found in its verdict table. Records the
/// candidates it saw.
struct StubClassifier {
    verdicts: HashMap<String, (ExpertiseLabel, f64)>,
    fail_first: AtomicU32,
    seen: Mutex<Vec<MessageCandidate>>,
}

impl StubClassifier {
    fn new(verdicts: &[(&str, ExpertiseLabel, f64)]) -> Self {
        Self {
            verdicts: verdicts
                .iter()
                .map(|(k, l, c)| (k.to_string(), (*l, *c)))
                .collect(),
            fail_first: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    fn seen(&self) -> Vec<MessageCandidate> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExpertiseClassifier for StubClassifier {
    async fn classify(
        &self,
        candidates: &[MessageCandidate],
    ) -> Result<Vec<MessageEvaluation>, ClassifierError> {
        self.seen.lock().unwrap().extend(candidates.iter().cloned());

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(ClassifierError::Api {
                status: 500,
                message: "stub failure".to_string(),
            });
        }

        Ok(candidates
            .iter()
            .map(|candidate| MessageEvaluation {
                message_id: candidate.message_id.clone(),
                author_id: candidate.author_id.clone(),
                results: candidate
                    .skill_keys
                    .iter()
                    .filter_map(|key| {
                        self.verdicts.get(key).map(|(label, confidence)| {
                            SkillEvaluation {
                                skill_key: key.clone(),
                                label: *label,
                                confidence: *confidence,
                                rationale: "stubbed".to_string(),
                            }
                        })
                    })
                    .collect(),
            })
            .collect())
    }
}

fn skill(key: &str, name: &str) -> Skill {
    Skill {
        key: key.to_string(),
        name: name.to_string(),
        domain: "engineering".to_string(),
        aliases: vec![key.to_string()],
    }
}

fn seeded_store() -> Arc<Store> {
    let store = Store::new(Connection::open_in_memory().unwrap()).unwrap();
    let users: HashMap<String, ChatUser> = ["U1", "U2"]
        .iter()
        .map(|id| {
            (
                id.to_string(),
                ChatUser {
                    external_id: id.to_string(),
                    display_name: format!("User {id}"),
                    handle: id.to_lowercase(),
                    timezone: None,
                },
            )
        })
        .collect();
    store.upsert_users(&users).unwrap();
    store
        .upsert_skills(&[
            skill("python", "Python"),
            skill("react", "React"),
            skill("redis", "Redis"),
        ])
        .unwrap();
    Arc::new(store)
}

fn processor(store: Arc<Store>, classifier: Arc<StubClassifier>) -> Arc<MessageProcessor> {
    let matcher = Arc::new(SkillMatcher::new(store.taxonomy_skills().unwrap()));
    Arc::new(MessageProcessor::new(
        matcher,
        store,
        classifier,
        PipelineConfig {
            extract_skills: true,
            classify_expertise: true,
            workers: 2,
        },
    ))
}

fn task(message: ChatMessage) -> MessageTask {
    let queue = TaskQueue::new();
    queue.enqueue(
        message,
        ChatChannel {
            id: "C1".into(),
            name: "general".into(),
        },
        Arc::new(HashMap::new()),
    );
    queue.dequeue().unwrap()
}

fn message(ts: &str, user: Option<&str>, text: &str) -> ChatMessage {
    ChatMessage {
        channel_id: "C1".into(),
        ts: ts.into(),
        thread_ts: None,
        user: user.map(|u| u.to_string()),
        text: text.into(),
        subtype: None,
        reply_count: 0,
        bot_id: None,
    }
}

async fn drain(queue: &TaskQueue) {
    for _ in 0..200 {
        if queue.stats().is_drained() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("queue did not drain: {:?}", queue.stats());
}

#[tokio::test]
async fn first_run_produces_one_score_row() {
    let store = seeded_store();
    let classifier = Arc::new(StubClassifier::new(&[(
        "python",
        ExpertiseLabel::PositiveExpertise,
        0.9,
    )]));
    let processor = processor(store.clone(), classifier);
    let queue = Arc::new(TaskQueue::new());
    let pool = WorkerPool::new(queue.clone(), processor, 2);

    queue.enqueue(
        message("100.1", Some("U1"), "I can help with Python and Django"),
        ChatChannel {
            id: "C1".into(),
            name: "general".into(),
        },
        Arc::new(HashMap::new()),
    );

    pool.start();
    drain(&queue).await;
    pool.stop().await;

    store.aggregate_all_scores().unwrap();

    let stats = store.aggregation_stats().unwrap();
    assert_eq!(stats.total_scores, 1);
    assert_eq!(stats.users_with_scores, 1);

    let hits = store
        .search_experts(&ExpertQuery {
            skill_keys: vec!["python".into()],
            min_confidence: 0.0,
            ..ExpertQuery::default()
        })
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id, "U1");
    assert_eq!(hits[0].evidence_count, 1);
    // today's evidence decays by delta^0 = 1
    assert!((hits[0].expertise_score - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn processing_the_same_message_twice_stores_one_row() {
    let store = seeded_store();
    let classifier = Arc::new(StubClassifier::new(&[(
        "python",
        ExpertiseLabel::PositiveExpertise,
        0.9,
    )]));
    let processor = processor(store.clone(), classifier);
    let queue = Arc::new(TaskQueue::new());
    let pool = WorkerPool::new(queue.clone(), processor, 2);

    for _ in 0..2 {
        queue.enqueue(
            message("100.1", Some("U1"), "python tips"),
            ChatChannel {
                id: "C1".into(),
                name: "general".into(),
            },
            Arc::new(HashMap::new()),
        );
    }

    pool.start();
    drain(&queue).await;
    pool.stop().await;

    assert_eq!(store.health_totals().unwrap().evidence, 1);
    assert_eq!(queue.stats().completed, 2);
}

#[tokio::test]
async fn task_retries_until_classifier_recovers() {
    let store = seeded_store();
    let classifier = Arc::new(
        StubClassifier::new(&[("python", ExpertiseLabel::PositiveExpertise, 0.8)])
            .failing_first(2),
    );
    let processor = processor(store.clone(), classifier);
    let queue = TaskQueue::new();

    queue.enqueue(
        message("100.1", Some("U1"), "python question answered"),
        ChatChannel {
            id: "C1".into(),
            name: "general".into(),
        },
        Arc::new(HashMap::new()),
    );

    let mut attempts = 0;
    let mut last_retry_count = 0;
    while let Some(task) = queue.dequeue() {
        attempts += 1;
        last_retry_count = task.retry_count;
        match processor.process(&task).await {
            Ok(_) => queue.mark_completed(&task.task_id),
            Err(e) => queue.mark_failed(&task.task_id, &e.to_string()),
        }
    }

    assert_eq!(attempts, 3);
    assert_eq!(last_retry_count, 2);
    let stats = queue.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.health_totals().unwrap().evidence, 1);
}

#[tokio::test]
async fn exhausted_retries_archive_the_task_as_failed() {
    let store = seeded_store();
    let classifier = Arc::new(
        StubClassifier::new(&[("python", ExpertiseLabel::PositiveExpertise, 0.8)])
            .failing_first(10),
    );
    let processor = processor(store.clone(), classifier);
    let queue = TaskQueue::new();

    queue.enqueue(
        message("100.1", Some("U1"), "python"),
        ChatChannel {
            id: "C1".into(),
            name: "general".into(),
        },
        Arc::new(HashMap::new()),
    );

    let mut attempts = 0;
    while let Some(task) = queue.dequeue() {
        attempts += 1;
        match processor.process(&task).await {
            Ok(_) => queue.mark_completed(&task.task_id),
            Err(e) => queue.mark_failed(&task.task_id, &e.to_string()),
        }
    }

    assert_eq!(attempts, 4);
    assert_eq!(queue.stats().failed, 1);
    assert_eq!(store.health_totals().unwrap().evidence, 0);
}

#[tokio::test]
async fn reply_inherits_parent_skills_when_parent_seen_first() {
    let store = seeded_store();
    let classifier = Arc::new(StubClassifier::new(&[(
        "redis",
        ExpertiseLabel::PositiveExpertise,
        0.7,
    )]));
    let processor = processor(store.clone(), classifier.clone());

    let mut parent = message("100.1", Some("U1"), "Redis question: how do I shard?");
    parent.thread_ts = Some("100.1".into());
    parent.reply_count = 1;

    // The reply itself mentions no skill; the topic comes from the parent
    let mut reply = message("100.2", Some("U2"), "I've run it for years");
    reply.thread_ts = Some("100.1".into());

    processor.process(&task(parent)).await.unwrap();
    let outcome = processor.process(&task(reply)).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Classified { .. }));

    let seen = classifier.seen();
    assert_eq!(seen.len(), 2);
    let reply_candidate = &seen[1];
    assert_eq!(reply_candidate.skill_keys, vec!["redis".to_string()]);
    assert_eq!(
        reply_candidate.parent_text.as_deref(),
        Some("Redis question: how do I shard?")
    );
}

#[tokio::test]
async fn skill_less_reply_processed_first_drops_out() {
    let store = seeded_store();
    let classifier = Arc::new(StubClassifier::new(&[(
        "redis",
        ExpertiseLabel::PositiveExpertise,
        0.7,
    )]));
    let processor = processor(store.clone(), classifier.clone());

    // No taxonomy hit in the reply text itself
    let mut reply = message("100.2", Some("U2"), "I've run it for years");
    reply.thread_ts = Some("100.1".into());

    let outcome = processor.process(&task(reply)).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::NoSkills);
    assert!(classifier.seen().is_empty());
}

#[tokio::test]
async fn gate_drops_messages_without_author_or_text() {
    let store = seeded_store();
    let classifier = Arc::new(StubClassifier::new(&[]));
    let processor = processor(store.clone(), classifier.clone());

    let no_author = processor
        .process(&task(message("1.0", None, "python")))
        .await
        .unwrap();
    let no_text = processor
        .process(&task(message("2.0", Some("U1"), "")))
        .await
        .unwrap();

    assert_eq!(no_author, ProcessOutcome::Skipped);
    assert_eq!(no_text, ProcessOutcome::Skipped);
    assert!(classifier.seen().is_empty());
}
