use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Failed to load country data: {0}")]
    Fetch(String),

    #[error("Not enough countries in {region} to play.")]
    UnplayableRegion { region: String },

    #[error("High score store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Quiz session is closed")]
    SessionClosed,
}

impl From<reqwest::Error> for QuizError {
    fn from(err: reqwest::Error) -> Self {
        QuizError::Fetch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuizError>;
