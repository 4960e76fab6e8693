use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session busy: a run or capabilities reload is already in progress")]
    Busy,

    #[error("Unknown test: {0}")]
    UnknownTest(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Duplicate test id in catalog: {0}")]
    DuplicateTestId(String),

    #[error("Capabilities unavailable: {0}")]
    Capabilities(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<config::ConfigError> for ProbeError {
    fn from(e: config::ConfigError) -> Self {
        ProbeError::Config(e.to_string())
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;
