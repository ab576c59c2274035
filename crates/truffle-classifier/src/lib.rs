pub mod error;
pub mod openai;
pub mod types;

pub use error::ClassifierError;
pub use openai::{OpenAiClassifier, UnconfiguredClassifier};
pub use types::{ExpertiseClassifier, MessageCandidate, MessageEvaluation};
