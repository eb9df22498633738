use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstoxError {
    #[error("UPSTOX_ACCESS_TOKEN is not set")]
    MissingToken,

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Non-JSON response: {0}")]
    NonJson(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read master file {path}: {source}")]
    MasterFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UpstoxError {
    /// Network failures, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstoxError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            UpstoxError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |s: u16| UpstoxError::Status { status: s, body: String::new() };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!UpstoxError::MissingToken.is_retryable());
        assert!(!UpstoxError::NonJson("<html>".into()).is_retryable());
    }
}
