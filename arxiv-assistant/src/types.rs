use interfaces::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use interfaces::{Digest, Paper, RunState};

/// What to do when one category (or one filter batch) runs out of retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abandon the whole operation and report nothing.
    #[default]
    AllOrNothing,
    /// Skip the failed unit and keep what the others produced.
    KeepPartial,
}

/// How model selections that point outside their batch are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Drop out-of-range and repeated indexes, logging each one.
    #[default]
    DropAndLog,
    /// Treat the whole response as malformed and ask again.
    RejectAndRetry,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub categories: Vec<String>,
    pub max_results_per_category: usize,
    pub page_size: usize,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            max_results_per_category: 500,
            page_size: 100,
            retry: RetryPolicy::new(5, Duration::from_secs(2)),
            failure_policy: FailurePolicy::AllOrNothing,
        }
    }
}

/// HTTP settings for the arXiv export API.
#[derive(Debug, Clone)]
pub struct ArxivApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: Option<u64>,
    pub request_interval: Duration,
}

impl Default for ArxivApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://export.arxiv.org/api/query".to_string(),
            user_agent: "arxiv-assistant/0.1".to_string(),
            timeout_seconds: None,
            request_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
    pub selection_policy: SelectionPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            failure_policy: FailurePolicy::AllOrNothing,
            selection_policy: SelectionPolicy::DropAndLog,
        }
    }
}

/// What the reader cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestProfile {
    pub keywords: Vec<String>,
    pub negative_keywords: Option<Vec<String>>,
    pub target_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Malformed model response ({reason}): {response}")]
    MalformedResponse { response: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run state error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

impl AssistantError {
    /// Network hiccups and unparseable payloads are retried; everything else
    /// is a bug or a misconfiguration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::Http(_)
                | AssistantError::Api { .. }
                | AssistantError::Parse(_)
                | AssistantError::MalformedResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
