use crate::parser::FeedParser;
use crate::traits::PaperSource;
use crate::types::{ArxivApiConfig, AssistantError, Paper, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Pages through the arXiv export API, newest submissions first.
pub struct ArxivClient {
    client: Client,
    config: ArxivApiConfig,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivClient {
    pub fn new(config: ArxivApiConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .brotli(true);
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    pub fn query_url(&self, category: &str, start: usize, page_size: usize) -> Result<Url> {
        let url = Url::parse_with_params(
            &self.config.base_url,
            &[
                ("search_query", format!("cat:{}", category)),
                ("start", start.to_string()),
                ("max_results", page_size.to_string()),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
            ],
        )?;
        Ok(url)
    }

    /// arXiv asks clients to leave a few seconds between calls.
    async fn apply_rate_limit(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.config.request_interval {
                let wait_time = self.config.request_interval - elapsed;
                debug!("Rate limiting arXiv API: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn source_name(&self) -> String {
        match Url::parse(&self.config.base_url) {
            Ok(url) => format!("arXiv ({})", url.host_str().unwrap_or("unknown host")),
            Err(_) => "arXiv".to_string(),
        }
    }

    async fn fetch_page(&self, category: &str, start: usize, page_size: usize) -> Result<Vec<Paper>> {
        let url = self.query_url(category, start, page_size)?;
        self.apply_rate_limit().await;

        debug!("Fetching arXiv page: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let content = response.text().await?;
        let papers = FeedParser::parse_papers(&content)?;
        info!("Fetched {} papers for {} (offset {})", papers.len(), category, start);
        Ok(papers)
    }
}
