use async_trait::async_trait;

use truffle_core::types::SkillEvaluation;

use crate::error::Result;

/// One message to classify, with the skills to evaluate and the thread
/// parent's text when the message is a reply.
#[derive(Debug, Clone)]
pub struct MessageCandidate {
    pub message_id: String,
    pub author_id: String,
    pub channel_id: String,
    pub text: String,
    pub parent_text: Option<String>,
    pub skill_keys: Vec<String>,
}

/// Per-candidate classifier output.
#[derive(Debug, Clone)]
pub struct MessageEvaluation {
    pub message_id: String,
    pub author_id: String,
    pub results: Vec<SkillEvaluation>,
}

/// Seam between the pipeline and the LLM. Implementations are stateless;
/// each call stands alone.
#[async_trait]
pub trait ExpertiseClassifier: Send + Sync {
    async fn classify(&self, candidates: &[MessageCandidate]) -> Result<Vec<MessageEvaluation>>;
}
