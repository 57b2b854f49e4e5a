use crate::llm_adapter::LlmConfig;
use crate::types::{
    ArxivApiConfig, AssistantError, FailurePolicy, FetchConfig, FilterConfig, InterestProfile, Result, SelectionPolicy,
};
use email_delivery::{MailSecurity, MailerConfig};
use interfaces::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MAIL_PASS_ENV: &str = "ARXIV_ASSISTANT_MAIL_PASS";

/// Everything the assistant reads from its JSON config file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub mail_host: String,
    pub mail_user: String,
    pub mail_pass: String,
    /// Defaults to `[mail_user]` when absent.
    pub mail_receivers: Option<Vec<String>>,
    pub mail_port: u16,
    pub mail_security: MailSecurity,

    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub negative_keywords: Option<Vec<String>>,
    pub save_dir: PathBuf,
    pub max_results_per_category: usize,
    pub page_size: usize,
    pub routine_interval_hours: f64,

    pub gpt_filter: bool,
    pub max_papers_per_query: usize,
    pub num_filtered_papers: usize,
    pub stream: bool,
    pub response_max_tokens: u32,
    pub temperature: f32,
    pub gpt_model: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_key_file: Option<PathBuf>,

    pub fetch_max_attempts: u32,
    pub filter_max_attempts: u32,
    pub mail_max_attempts: u32,
    pub retry_base_delay_seconds: u64,
    pub request_interval_seconds: u64,
    pub request_timeout_seconds: Option<u64>,

    pub failure_policy: FailurePolicy,
    pub selection_policy: SelectionPolicy,
    pub state_file: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            mail_host: String::new(),
            mail_user: String::new(),
            mail_pass: String::new(),
            mail_receivers: None,
            mail_port: 25,
            mail_security: MailSecurity::None,
            categories: Vec::new(),
            keywords: Vec::new(),
            negative_keywords: None,
            save_dir: PathBuf::from("./papers/"),
            max_results_per_category: 500,
            page_size: 100,
            routine_interval_hours: 6.0,
            gpt_filter: true,
            max_papers_per_query: 50,
            num_filtered_papers: 10,
            stream: false,
            response_max_tokens: 512,
            temperature: 0.7,
            gpt_model: "gpt-3.5-turbo-16k".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            openai_key_file: None,
            fetch_max_attempts: 5,
            filter_max_attempts: 3,
            mail_max_attempts: 5,
            retry_base_delay_seconds: 2,
            request_interval_seconds: 3,
            request_timeout_seconds: None,
            failure_policy: FailurePolicy::AllOrNothing,
            selection_policy: SelectionPolicy::DropAndLog,
            state_file: None,
        }
    }
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("mail_host", &self.mail_host)
            .field("mail_user", &self.mail_user)
            .field("mail_receivers", &self.receivers())
            .field("categories", &self.categories)
            .field("keywords", &self.keywords)
            .field("negative_keywords", &self.negative_keywords)
            .field("gpt_filter", &self.gpt_filter)
            .field("gpt_model", &self.gpt_model)
            .field("routine_interval_hours", &self.routine_interval_hours)
            .field("state_file", &self.state_file)
            .finish_non_exhaustive()
    }
}

impl AssistantConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AssistantError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: AssistantConfig = serde_json::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `OPENAI_API_KEY` and `ARXIV_ASSISTANT_MAIL_PASS` from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(OPENAI_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.openai_api_key = Some(key);
        }
        if let Some(pass) = lookup(MAIL_PASS_ENV) {
            self.mail_pass = pass;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(AssistantError::Config(msg.to_string()));

        if self.categories.is_empty() {
            return fail("at least one category is required");
        }
        if self.mail_host.trim().is_empty() {
            return fail("mail_host is required");
        }
        if self.mail_user.trim().is_empty() {
            return fail("mail_user is required");
        }
        if self.max_papers_per_query == 0 {
            return fail("max_papers_per_query must be positive");
        }
        if self.page_size == 0 {
            return fail("page_size must be positive");
        }
        if self.fetch_max_attempts == 0 || self.filter_max_attempts == 0 || self.mail_max_attempts == 0 {
            return fail("max attempts must be positive");
        }
        if !(self.routine_interval_hours > 0.0) || !self.routine_interval_hours.is_finite() {
            return fail("routine_interval_hours must be positive");
        }
        if self.gpt_filter && self.keywords.is_empty() {
            return fail("keywords are required when gpt_filter is on");
        }
        Ok(())
    }

    pub fn receivers(&self) -> Vec<String> {
        match &self.mail_receivers {
            Some(receivers) if !receivers.is_empty() => receivers.clone(),
            _ => vec![self.mail_user.clone()],
        }
    }

    /// The API key from the config, or else from `openai_key_file`.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self.openai_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        if let Some(path) = &self.openai_key_file {
            let key = fs::read_to_string(path)
                .map_err(|e| AssistantError::Config(format!("cannot read key file {}: {}", path.display(), e)))?;
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
        Err(AssistantError::Config(format!(
            "no OpenAI API key: set openai_api_key, openai_key_file or {}",
            OPENAI_API_KEY_ENV
        )))
    }

    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.routine_interval_hours * 3600.0).unwrap_or(Duration::from_secs(6 * 3600))
    }

    fn retry(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(self.retry_base_delay_seconds))
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            categories: self.categories.clone(),
            max_results_per_category: self.max_results_per_category,
            page_size: self.page_size,
            retry: self.retry(self.fetch_max_attempts),
            failure_policy: self.failure_policy,
        }
    }

    pub fn arxiv_config(&self) -> ArxivApiConfig {
        ArxivApiConfig {
            timeout_seconds: self.request_timeout_seconds,
            request_interval: Duration::from_secs(self.request_interval_seconds),
            ..ArxivApiConfig::default()
        }
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            batch_size: self.max_papers_per_query,
            retry: self.retry(self.filter_max_attempts),
            failure_policy: self.failure_policy,
            selection_policy: self.selection_policy,
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            base_url: self.openai_base_url.clone(),
            model: self.gpt_model.clone(),
            temperature: self.temperature,
            max_tokens: self.response_max_tokens,
            stream: self.stream,
            timeout_seconds: self.request_timeout_seconds,
        }
    }

    pub fn mailer_config(&self) -> MailerConfig {
        MailerConfig {
            port: self.mail_port,
            security: self.mail_security,
            ..MailerConfig::new(&self.mail_host, &self.mail_user, &self.mail_pass)
        }
    }

    pub fn mail_retry(&self) -> RetryPolicy {
        self.retry(self.mail_max_attempts)
    }

    pub fn interest_profile(&self) -> InterestProfile {
        InterestProfile {
            keywords: self.keywords.clone(),
            negative_keywords: self.negative_keywords.clone(),
            target_count: self.num_filtered_papers,
        }
    }
}
