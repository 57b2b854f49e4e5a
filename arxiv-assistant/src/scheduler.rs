use crate::config::AssistantConfig;
use crate::digest::DigestFormatter;
use crate::feed_client::{FeedClient, FetchOutcome};
use crate::fetcher::ArxivClient;
use crate::filter::RelevanceFilter;
use crate::llm_adapter::OpenAiCompletionClient;
use crate::snapshot::SnapshotStore;
use crate::types::{AssistantError, InterestProfile, Result, RunState};
use chrono::{Local, NaiveDate};
use email_delivery::{DeliveryReport, MailSender, SmtpMailTransport};
use interfaces::{date_key, JsonFileStateStore, MemoryStateStore, RunStateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

/// What one pass of fetch, filter, format and send achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The newest day was already delivered, or the feed was empty.
    NothingNew,
    FetchFailed,
    /// The model kept none of the fetched papers (or the filter failed).
    FilterEmpty,
    Delivered {
        target_date: NaiveDate,
        fetched: usize,
        selected: usize,
        report: DeliveryReport,
    },
}

/// Owns the pipeline and the run state; drives one cycle every interval.
pub struct Assistant {
    feed: FeedClient,
    filter: Option<(RelevanceFilter, InterestProfile)>,
    mailer: MailSender,
    recipients: Vec<String>,
    store: Box<dyn RunStateStore>,
    state: RunState,
    interval: Duration,
    phase: watch::Sender<Phase>,
}

impl Assistant {
    /// Build an assistant whose run state starts from `store.load()`.
    pub fn new(
        feed: FeedClient,
        mailer: MailSender,
        recipients: Vec<String>,
        store: Box<dyn RunStateStore>,
    ) -> Result<Self> {
        let state = store.load().map_err(|e| AssistantError::State(format!("{:#}", e)))?;
        if !state.is_empty() {
            info!("Resuming with {} processed dates", state.len());
        }

        Ok(Self {
            feed,
            filter: None,
            mailer,
            recipients,
            store,
            state,
            interval: Duration::from_secs(6 * 3600),
            phase: watch::channel(Phase::Idle).0,
        })
    }

    pub fn with_filter(mut self, filter: RelevanceFilter, profile: InterestProfile) -> Self {
        self.filter = Some((filter, profile));
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wire the production collaborators from a validated config.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let snapshots = SnapshotStore::new(&config.save_dir)?;

        let source = Arc::new(ArxivClient::new(config.arxiv_config())?);
        let feed = FeedClient::new(source, config.fetch_config()).with_snapshots(snapshots.clone());

        let transport = SmtpMailTransport::new(&config.mailer_config())
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        let mailer = MailSender::new(Arc::new(transport), config.mail_user.clone()).with_retry(config.mail_retry());

        let store: Box<dyn RunStateStore> = match &config.state_file {
            Some(path) => Box::new(JsonFileStateStore::new(path)),
            None => Box::new(MemoryStateStore),
        };

        let mut assistant = Self::new(feed, mailer, config.receivers(), store)?.with_interval(config.interval());

        if config.gpt_filter {
            let client = Arc::new(OpenAiCompletionClient::new(config.llm_config(), config.api_key()?)?);
            let filter = RelevanceFilter::new(client, config.filter_config()).with_snapshots(snapshots);
            assistant = assistant.with_filter(filter, config.interest_profile());
        }

        Ok(assistant)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase changes from another task while a cycle runs.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle, dating the digest with the local calendar day.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.run_cycle_on(Local::now().date_naive()).await
    }

    pub async fn run_cycle_on(&mut self, today: NaiveDate) -> CycleOutcome {
        self.phase.send_replace(Phase::Running);
        let outcome = self.cycle(today).await;
        self.phase.send_replace(Phase::Idle);
        outcome
    }

    /// Loop forever: one cycle, then sleep for the interval.
    pub async fn run_forever(&mut self) {
        info!("Starting routine, interval {:?}", self.interval);
        loop {
            let outcome = self.run_cycle().await;
            info!("Cycle finished: {:?}; sleeping {:?}", outcome, self.interval);
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn cycle(&mut self, today: NaiveDate) -> CycleOutcome {
        let (target_date, papers) = match self.feed.fetch_latest(&self.state).await {
            FetchOutcome::Fresh { target_date, papers } => (target_date, papers),
            FetchOutcome::AlreadyProcessed { .. } | FetchOutcome::NoPapers => {
                info!("No new papers found at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
                return CycleOutcome::NothingNew;
            }
            FetchOutcome::Failed { category, error } => {
                error!("Fetching {} failed: {}", category, error);
                return CycleOutcome::FetchFailed;
            }
        };
        let fetched = papers.len();

        let selected = match &self.filter {
            Some((filter, profile)) => {
                let selected = filter.filter(&papers, profile, target_date).await;
                if selected.is_empty() {
                    info!("No filtered papers for {}", date_key(target_date));
                    return CycleOutcome::FilterEmpty;
                }
                selected
            }
            None => papers,
        };

        let digest = DigestFormatter::format(&selected, today);
        let report = self.mailer.send_digest(&digest, &self.recipients).await;
        info!(
            "{} papers filtered from {} papers; delivered to {}/{} recipients",
            selected.len(),
            fetched,
            report.delivered.len(),
            self.recipients.len()
        );

        self.state.record(target_date);
        if let Err(e) = self.store.save(&self.state) {
            warn!("Failed to save run state: {:#}", e);
        }

        CycleOutcome::Delivered {
            target_date,
            fetched,
            selected: selected.len(),
            report,
        }
    }
}
