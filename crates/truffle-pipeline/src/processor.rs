use std::sync::{Arc, Mutex};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use truffle_classifier::{ExpertiseClassifier, MessageCandidate};
use truffle_core::config::PipelineConfig;
use truffle_queue::MessageTask;
use truffle_store::Store;
use truffle_taxonomy::SkillMatcher;

use crate::context::{ParentContext, ThreadContextCache};
use crate::error::{PipelineError, Result};

/// What happened to a task. Skips are silent successes; only classifier
/// and persistence failures bubble up to the worker as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No author, no text, or the extraction stage is disabled.
    Skipped,
    /// Extraction ran but nothing in the taxonomy matched.
    NoSkills,
    /// Classified and persisted this many new evidence rows.
    Classified { stored: usize },
}

/// The two-stage per-message pipeline: alias matching, thread-context
/// enrichment, LLM classification, deduplicated evidence persistence.
pub struct MessageProcessor {
    matcher: Arc<SkillMatcher>,
    store: Arc<Store>,
    classifier: Arc<dyn ExpertiseClassifier>,
    config: PipelineConfig,
    thread_context: Mutex<ThreadContextCache>,
}

impl MessageProcessor {
    pub fn new(
        matcher: Arc<SkillMatcher>,
        store: Arc<Store>,
        classifier: Arc<dyn ExpertiseClassifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            matcher,
            store,
            classifier,
            config,
            thread_context: Mutex::new(ThreadContextCache::default()),
        }
    }

    pub async fn process(&self, task: &MessageTask) -> Result<ProcessOutcome> {
        let message = &task.message;

        let author = match message.user.as_deref() {
            Some(author) if !message.text.is_empty() => author,
            _ => return Ok(ProcessOutcome::Skipped),
        };
        if !self.config.extract_skills {
            return Ok(ProcessOutcome::Skipped);
        }

        let matched = self.matcher.match_text(&message.text);
        // Replies get one more chance below: a cached parent can lend
        // them its skills
        if matched.is_empty() && !message.is_thread_reply() {
            debug!(ts = %message.ts, "no skills matched in message");
            return Ok(ProcessOutcome::NoSkills);
        }

        // Thread handling under the cache lock, dropped before any I/O
        let (combined, parent_text) = {
            let mut cache = self.thread_context.lock().unwrap();

            if message.reply_count > 0 && !matched.is_empty() {
                cache.insert(
                    message.thread_key(),
                    ParentContext {
                        text: message.text.clone(),
                        skills: matched.clone(),
                    },
                );
            }

            if message.is_thread_reply() {
                match cache.get(message.thread_key()) {
                    Some(parent) => {
                        let mut combined = matched.clone();
                        for key in &parent.skills {
                            if !combined.contains(key) {
                                combined.push(key.clone());
                            }
                        }
                        (combined, Some(parent.text.clone()))
                    }
                    // Reply arrived before its parent: only its own
                    // matches count
                    None => (matched, None),
                }
            } else {
                (matched, None)
            }
        };

        if combined.is_empty() {
            debug!(ts = %message.ts, "no skills matched in message or thread");
            return Ok(ProcessOutcome::NoSkills);
        }
        debug!(ts = %message.ts, skills = ?combined, "matched skills");

        if !self.config.classify_expertise {
            return Ok(ProcessOutcome::Skipped);
        }

        let hash = message_hash(&message.channel_id, &message.ts, &message.text);
        let candidate = MessageCandidate {
            message_id: format!("{}:{}", message.channel_id, message.ts),
            author_id: author.to_string(),
            channel_id: message.channel_id.clone(),
            text: message.text.clone(),
            parent_text,
            skill_keys: combined,
        };

        let evaluations = self.classifier.classify(&[candidate]).await?;
        let results = match evaluations.into_iter().next() {
            Some(eval) if !eval.results.is_empty() => eval.results,
            _ => return Err(PipelineError::NoEvaluations),
        };

        let today = Utc::now().date_naive();
        let inserted = self
            .store
            .store_evidence(author, &results, today, Some(&hash))?;
        for row in &inserted {
            self.store
                .update_skill_score(row.user_id, row.skill_id, row.label, row.confidence, today)?;
        }

        if !inserted.is_empty() {
            info!(author, stored = inserted.len(), "stored expertise evidence");
        }
        Ok(ProcessOutcome::Classified {
            stored: inserted.len(),
        })
    }
}

/// Deduplication key: first 16 hex chars of SHA-256("channel:ts:text").
pub fn message_hash(channel_id: &str, ts: &str, text: &str) -> String {
    let digest = Sha256::digest(format!("{channel_id}:{ts}:{text}").as_bytes());
    hex::encode(digest)[..16].to_string()
}
