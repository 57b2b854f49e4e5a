use crate::llm_adapter::{ChatMessage, CompletionClient};
use crate::prompts::filter_prompt;
use crate::snapshot::{SnapshotKind, SnapshotStore};
use crate::types::{AssistantError, FailurePolicy, FilterConfig, InterestProfile, Paper, Result, SelectionPolicy};
use chrono::NaiveDate;
use interfaces::{date_key, paper_batches, retry_with_backoff, PaperBatch};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Papers split by the model's verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Selected papers, most relevant first (round-robin over batches).
    pub filtered: Vec<Paper>,
    /// Everything else, in input order.
    pub removed: Vec<Paper>,
    /// 0-based indexes into the input, in merged order.
    pub merged_indexes: Vec<usize>,
}

/// Asks a language model to pick the relevant papers, one batch at a time.
pub struct RelevanceFilter {
    client: Arc<dyn CompletionClient>,
    config: FilterConfig,
    snapshots: Option<SnapshotStore>,
}

impl RelevanceFilter {
    pub fn new(client: Arc<dyn CompletionClient>, config: FilterConfig) -> Self {
        Self {
            client,
            config,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn build_prompt(&self, batch: &PaperBatch<'_>, profile: &InterestProfile) -> Vec<ChatMessage> {
        vec![ChatMessage::user(filter_prompt(batch.papers, profile))]
    }

    /// Filter `papers`, returning an empty list if any batch fails under the
    /// all-or-nothing policy.
    pub async fn filter(&self, papers: &[Paper], profile: &InterestProfile, target_date: NaiveDate) -> Vec<Paper> {
        match self.try_filter(papers, profile, target_date).await {
            Ok(outcome) => outcome.filtered,
            Err(e) => {
                warn!("Relevance filter failed for {}: {}", date_key(target_date), e);
                Vec::new()
            }
        }
    }

    pub async fn try_filter(
        &self,
        papers: &[Paper],
        profile: &InterestProfile,
        target_date: NaiveDate,
    ) -> Result<FilterOutcome> {
        if papers.is_empty() {
            debug!("No papers to filter");
            return Ok(FilterOutcome::default());
        }

        let mut columns: Vec<Vec<usize>> = Vec::new();

        for batch in paper_batches(papers, self.config.batch_size) {
            let messages = self.build_prompt(&batch, profile);
            let operation = format!(
                "filtering batch {} ({} papers) with {}",
                batch.number + 1,
                batch.papers.len(),
                self.client.model_name()
            );

            let result = retry_with_backoff(
                &self.config.retry,
                &operation,
                |_| self.query_batch(&messages, batch.papers.len()),
                AssistantError::is_retryable,
            )
            .await;

            match result {
                Ok(selection) => {
                    let globals: Vec<usize> = selection
                        .into_iter()
                        .map(|local| batch.global_index(local) as usize)
                        .collect();
                    debug!("Batch {} selected {:?}", batch.number + 1, globals);
                    columns.push(globals);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::AllOrNothing => {
                        return Err(AssistantError::General(e.to_string()));
                    }
                    FailurePolicy::KeepPartial => {
                        warn!("Skipping batch {}: {}", batch.number + 1, e);
                    }
                },
            }
        }

        let merged_indexes = merge_round_robin(&columns);
        let selected: HashSet<usize> = merged_indexes.iter().copied().collect();

        let filtered: Vec<Paper> = merged_indexes.iter().filter_map(|&i| papers.get(i).cloned()).collect();
        let removed: Vec<Paper> = papers
            .iter()
            .enumerate()
            .filter(|(i, _)| !selected.contains(i))
            .map(|(_, p)| p.clone())
            .collect();

        info!("{} papers filtered from {} papers", filtered.len(), papers.len());

        if let Some(snapshots) = &self.snapshots {
            for (kind, list) in [(SnapshotKind::Filtered, &filtered), (SnapshotKind::Removed, &removed)] {
                if let Err(e) = snapshots.write(target_date, kind, list) {
                    warn!("Failed to write {} snapshot: {}", kind.suffix(), e);
                }
            }
        }

        Ok(FilterOutcome {
            filtered,
            removed,
            merged_indexes,
        })
    }

    /// One attempt at a batch: ask, parse, then validate.
    async fn query_batch(&self, messages: &[ChatMessage], batch_len: usize) -> Result<Vec<i64>> {
        let response = self.client.complete(messages).await?;
        let selection = parse_selection(&response)?;
        validate_selection(&response, selection, batch_len, self.config.selection_policy)
    }
}

/// The whole response must be a JSON array of integers.
pub fn parse_selection(response: &str) -> Result<Vec<i64>> {
    let malformed = |reason: &str| AssistantError::MalformedResponse {
        response: response.to_string(),
        reason: reason.to_string(),
    };

    let value: Value = serde_json::from_str(response.trim()).map_err(|e| malformed(&e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON list"));
    };

    items
        .iter()
        .map(|item| item.as_i64().ok_or_else(|| malformed(&format!("non-integer element {}", item))))
        .collect()
}

/// Keep indexes inside `1..=batch_len`, first occurrence only.
pub fn validate_selection(
    response: &str,
    selection: Vec<i64>,
    batch_len: usize,
    policy: SelectionPolicy,
) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(selection.len());

    for local in selection {
        let problem = if local < 1 || local > batch_len as i64 {
            Some("out of range")
        } else if !seen.insert(local) {
            Some("repeated")
        } else {
            None
        };

        match (problem, policy) {
            (None, _) => valid.push(local),
            (Some(problem), SelectionPolicy::DropAndLog) => {
                warn!("Dropping {} index {} (batch of {})", problem, local, batch_len);
            }
            (Some(problem), SelectionPolicy::RejectAndRetry) => {
                return Err(AssistantError::MalformedResponse {
                    response: response.to_string(),
                    reason: format!("{} index {} for a batch of {}", problem, local, batch_len),
                });
            }
        }
    }

    Ok(valid)
}

/// Read the per-batch rankings column by column: every batch's first pick,
/// then every batch's second pick, and so on.
pub fn merge_round_robin<T: Copy>(columns: &[Vec<T>]) -> Vec<T> {
    let depth = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut merged = Vec::with_capacity(columns.iter().map(Vec::len).sum());

    for rank in 0..depth {
        merged.extend(columns.iter().filter_map(|column| column.get(rank).copied()));
    }
    merged
}
