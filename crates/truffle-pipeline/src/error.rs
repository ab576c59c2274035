use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("classification failed: {0}")]
    Classifier(#[from] truffle_classifier::ClassifierError),

    #[error("persistence failed: {0}")]
    Store(#[from] truffle_store::StoreError),

    #[error("classifier returned no evaluations")]
    NoEvaluations,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
