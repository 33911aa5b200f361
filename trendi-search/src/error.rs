use chrono::NaiveDate;

/// Rejections raised while validating a trends query. No network call is made
/// once one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Please provide at least one keyword.")]
    NoKeywords,

    #[error("At most {max} keywords can be compared, got {got}.")]
    TooManyKeywords { max: usize, got: usize },

    #[error("End Date cannot be in the future.")]
    FutureEndDate { end: NaiveDate, today: NaiveDate },

    #[error("Start Date must be before End Date.")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Failures talking to the trends provider.
#[derive(Debug, thiserror::Error)]
pub enum TrendsError {
    /// The provider answered with HTTP 429.
    #[error("trends provider is rate limiting requests (HTTP 429)")]
    RateLimited,

    #[error("trends provider returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected trends response: {0}")]
    Parse(String),

    /// Direct and every proxied attempt failed. Terminal.
    #[error("trends provider unreachable after trying {tried} proxies")]
    ProxiesExhausted { tried: usize },
}

impl TrendsError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ProxiesExhausted { .. })
    }
}

impl From<reqwest::Error> for TrendsError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Transport(err.to_string()),
        }
    }
}

/// Why a page could not be turned into summarizable text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to fetch the content.")]
    FetchFailed { status: u16 },

    #[error("The linked content is not HTML and cannot be summarized.")]
    NotHtml { content_type: String },

    #[error("No content to summarize.")]
    NoContent,

    #[error("Error during summarization: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("invalid summarizer endpoint: {0}")]
    Endpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("model request failed: {0}")]
    Request(String),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_render_user_messages() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            QueryError::FutureEndDate { end: day, today: day }.to_string(),
            "End Date cannot be in the future."
        );
        assert_eq!(
            QueryError::InvertedRange { start: day, end: day }.to_string(),
            "Start Date must be before End Date."
        );
        assert_eq!(
            QueryError::NoKeywords.to_string(),
            "Please provide at least one keyword."
        );
    }

    #[test]
    fn only_exhaustion_is_terminal() {
        assert!(TrendsError::ProxiesExhausted { tried: 3 }.is_terminal());
        assert!(!TrendsError::RateLimited.is_terminal());
        assert!(!TrendsError::Status(500).is_terminal());
    }

    #[test]
    fn rate_limit_is_classified_by_variant() {
        assert!(TrendsError::RateLimited.is_rate_limited());
        // A message mentioning 429 is not a rate limit signal on its own.
        assert!(!TrendsError::Transport("upstream said 429".into()).is_rate_limited());
    }

    #[test]
    fn extraction_errors_match_dashboard_wording() {
        assert_eq!(
            ExtractionError::FetchFailed { status: 404 }.to_string(),
            "Failed to fetch the content."
        );
        assert_eq!(ExtractionError::NoContent.to_string(), "No content to summarize.");
        assert_eq!(
            ExtractionError::Other("boom".into()).to_string(),
            "Error during summarization: boom"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrendsError>();
        assert_send_sync::<ExtractionError>();
        assert_send_sync::<SummarizerError>();
    }
}
