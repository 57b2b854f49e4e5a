use crate::snapshot::{SnapshotKind, SnapshotStore};
use crate::traits::PaperSource;
use crate::types::{AssistantError, FailurePolicy, FetchConfig, Paper, Result, RunState};
use chrono::NaiveDate;
use interfaces::{date_key, retry_with_backoff};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one `fetch_latest` call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Papers published on `target_date`, every category concatenated in
    /// configuration order.
    Fresh { target_date: NaiveDate, papers: Vec<Paper> },
    /// The newest day on the feed has already been delivered.
    AlreadyProcessed { target_date: NaiveDate },
    /// Every category came back empty.
    NoPapers,
    /// A category ran out of retries.
    Failed { category: String, error: String },
}

impl FetchOutcome {
    pub fn papers(&self) -> &[Paper] {
        match self {
            FetchOutcome::Fresh { papers, .. } => papers,
            _ => &[],
        }
    }

    pub fn target_date(&self) -> Option<NaiveDate> {
        match self {
            FetchOutcome::Fresh { target_date, .. } | FetchOutcome::AlreadyProcessed { target_date } => {
                Some(*target_date)
            }
            _ => None,
        }
    }
}

enum CategoryFetch {
    Papers { papers: Vec<Paper>, target: Option<NaiveDate> },
    AlreadyProcessed(NaiveDate),
}

pub struct FeedClient {
    source: Arc<dyn PaperSource>,
    config: FetchConfig,
    snapshots: Option<SnapshotStore>,
}

impl FeedClient {
    pub fn new(source: Arc<dyn PaperSource>, config: FetchConfig) -> Self {
        Self {
            source,
            config,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Collect the newest day's papers across all configured categories.
    ///
    /// The first paper seen fixes the target date for the whole run; each
    /// category is read until its first paper from another day.
    pub async fn fetch_latest(&self, state: &RunState) -> FetchOutcome {
        let mut target: Option<NaiveDate> = None;
        let mut per_category: BTreeMap<String, Vec<Paper>> = BTreeMap::new();
        let mut papers_all = Vec::new();

        for category in &self.config.categories {
            let operation = format!("querying {} for {}", self.source.source_name(), category);
            let known_target = target;
            let result = retry_with_backoff(
                &self.config.retry,
                &operation,
                |_| self.collect_category(category, known_target, state),
                AssistantError::is_retryable,
            )
            .await;

            match result {
                Ok(CategoryFetch::AlreadyProcessed(date)) => {
                    info!("Not a new day: {} was already processed", date_key(date));
                    return FetchOutcome::AlreadyProcessed { target_date: date };
                }
                Ok(CategoryFetch::Papers { papers, target: seen }) => {
                    if target.is_none() {
                        target = seen;
                    }
                    if let Some(date) = target {
                        info!("Num of papers for {} {}: {}", category, date_key(date), papers.len());
                    }
                    papers_all.extend(papers.iter().cloned());
                    per_category.insert(category.clone(), papers);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::AllOrNothing => {
                        warn!("Abandoning fetch: {}", e);
                        return FetchOutcome::Failed {
                            category: category.clone(),
                            error: e.to_string(),
                        };
                    }
                    FailurePolicy::KeepPartial => {
                        warn!("Skipping category {}: {}", category, e);
                        per_category.insert(category.clone(), Vec::new());
                    }
                },
            }
        }

        let Some(target_date) = target else {
            return FetchOutcome::NoPapers;
        };

        if let Some(snapshots) = &self.snapshots {
            if let Err(e) = snapshots.write(target_date, SnapshotKind::All, &per_category) {
                warn!("Failed to write snapshot for {}: {}", date_key(target_date), e);
            }
        }

        FetchOutcome::Fresh {
            target_date,
            papers: papers_all,
        }
    }

    /// One attempt at reading a category. Every attempt starts from an empty
    /// list so a retry never duplicates papers.
    async fn collect_category(
        &self,
        category: &str,
        known_target: Option<NaiveDate>,
        state: &RunState,
    ) -> Result<CategoryFetch> {
        let mut target = known_target;
        let mut papers = Vec::new();
        let mut start = 0;
        let max_results = self.config.max_results_per_category;
        let page_size = self.config.page_size.max(1);

        'pages: while start < max_results {
            let size = page_size.min(max_results - start);
            let page = self.source.fetch_page(category, start, size).await?;
            let received = page.len();

            // Reaching a later page means the previous one was full and all on
            // the target day, so an empty page here is arXiv dropping results.
            if received == 0 && start > 0 {
                return Err(AssistantError::Parse(format!(
                    "unexpected empty page for {} at offset {}",
                    category, start
                )));
            }

            for paper in page {
                let date = match target {
                    Some(date) => date,
                    None => {
                        if state.contains(paper.date) {
                            return Ok(CategoryFetch::AlreadyProcessed(paper.date));
                        }
                        target = Some(paper.date);
                        paper.date
                    }
                };

                if paper.date != date {
                    break 'pages;
                }
                papers.push(paper);
            }

            if received < size {
                break;
            }
            start += received;
        }

        Ok(CategoryFetch::Papers { papers, target })
    }
}
