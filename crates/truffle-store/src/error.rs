use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("empty skill key list")]
    EmptySkillKeys,
}

pub type Result<T> = std::result::Result<T, StoreError>;
