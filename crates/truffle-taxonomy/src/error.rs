use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid taxonomy file {file}: {reason}")]
    Invalid { file: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;
