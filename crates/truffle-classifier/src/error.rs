use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
