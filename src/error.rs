use thiserror::Error;

/// Why a single poll tick was skipped. Never fatal to the poll loop.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("request to {url} failed with status code {status}")]
    Network { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed JSON body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed scalar body: {0:?}")]
    Scalar(String),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("render callback panicked")]
    Panicked,
}

impl PollError {
    pub fn is_network(&self) -> bool {
        matches!(self, PollError::Network { .. } | PollError::Transport(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, PollError::Parse(_) | PollError::Scalar(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("no metric named {0} in payload")]
    MissingMetric(String),

    #[error("page is no longer listening for updates")]
    Disconnected,

    #[error("could not save {path}: {reason}")]
    Save { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("admin URL must be http or https, got {0}")]
    Scheme(String),

    #[error("unknown plot format {0:?}, expected plot_cdf or plot_pdf")]
    InvalidFormat(String),

    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("could not open log file: {0}")]
    LogFile(#[from] std::io::Error),

    #[error("could not set up logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_taxonomy() {
        let err = PollError::Network {
            url: "http://localhost/admin/metrics".into(),
            status: 503,
        };
        assert!(err.is_network());
        assert!(!err.is_parse());
        assert_eq!(
            err.to_string(),
            "request to http://localhost/admin/metrics failed with status code 503"
        );

        let err: PollError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(err.is_parse());

        let err: PollError = RenderError::MissingMetric("requests".into()).into();
        assert_eq!(err.to_string(), "render failed: no metric named requests in payload");
    }
}
