use reqwest::{Response, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColendarError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {context} {status}: {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Request timed out")]
    Timeout,
}

impl ColendarError {
    /// Whether retrying the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ColendarError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ColendarError::Timeout => true,
            ColendarError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ColendarError>;

/// Check a backend response status and return the body text on success
pub async fn check_response(response: Response, context: &str) -> Result<String> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ColendarError::Api {
            context: context.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.text().await?)
}

/// Check a DELETE response, allowing NO_CONTENT and NOT_FOUND
pub async fn check_response_no_body(response: Response, context: &str) -> Result<()> {
    // 404 means already deleted
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(());
    }

    if !response.status().is_success() && response.status() != StatusCode::NO_CONTENT {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ColendarError::Api {
            context: context.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}
