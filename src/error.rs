use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Could not decode response at `{path}`: {message}")]
    Decoding { path: String, message: String },

    #[error("Server responded with {status}: {body}")]
    BadStatus { status: StatusCode, body: String },

    #[error("Response is missing `{0}`")]
    MissingData(&'static str),
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        ApiError::InvalidUrl(e.to_string())
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ApiError {
    fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
        ApiError::Decoding {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
