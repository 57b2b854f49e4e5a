use arxiv_assistant::{
    Assistant, AssistantError, ChatMessage, CompletionClient, CycleOutcome, FeedClient, FetchConfig, FilterConfig,
    InterestProfile, Paper, PaperSource, Phase, RelevanceFilter, Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use email_delivery::{MailError, MailSender, MailTransport, OutgoingMail};
use interfaces::{JsonFileStateStore, MemoryStateStore, RetryPolicy, RunState, RunStateStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::watch;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

/// One category whose listing can be swapped between cycles.
struct SwappableSource {
    listing: Mutex<Vec<Paper>>,
    fail: bool,
}

impl SwappableSource {
    fn new(papers: Vec<Paper>) -> Self {
        Self {
            listing: Mutex::new(papers),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            listing: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl PaperSource for SwappableSource {
    fn source_name(&self) -> String {
        "swappable".to_string()
    }

    async fn fetch_page(&self, _category: &str, start: usize, page_size: usize) -> Result<Vec<Paper>> {
        if self.fail {
            return Err(AssistantError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let listing = self.listing.lock().unwrap().clone();
        Ok(listing.into_iter().skip(start).take(page_size).collect())
    }
}

/// Records the assistant's phase each time a page is requested.
#[derive(Default)]
struct PhaseRecordingSource {
    phase: Mutex<Option<watch::Receiver<Phase>>>,
    seen: Mutex<Vec<Phase>>,
}

#[async_trait]
impl PaperSource for PhaseRecordingSource {
    fn source_name(&self) -> String {
        "phase-recording".to_string()
    }

    async fn fetch_page(&self, _category: &str, start: usize, page_size: usize) -> Result<Vec<Paper>> {
        if let Some(phase) = self.phase.lock().unwrap().as_ref() {
            self.seen.lock().unwrap().push(*phase.borrow());
        }
        Ok(vec![paper("p", day(2))].into_iter().skip(start).take(page_size).collect())
    }
}

struct FixedReply(&'static str);

#[async_trait]
impl CompletionClient for FixedReply {
    fn model_name(&self) -> String {
        "fixed".to_string()
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl MailTransport for Outbox {
    async fn deliver(&self, mail: &OutgoingMail) -> std::result::Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Counts saves and keeps the last saved state in memory. Clones share
/// their counters.
#[derive(Clone, Default)]
struct CountingStore {
    saves: Arc<AtomicUsize>,
    last: Arc<Mutex<RunState>>,
}

impl RunStateStore for CountingStore {
    fn load(&self) -> anyhow::Result<RunState> {
        Ok(self.last.lock().unwrap().clone())
    }

    fn save(&self, state: &RunState) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = state.clone();
        Ok(())
    }
}

fn paper(id: &str, date: NaiveDate) -> Paper {
    Paper {
        title: format!("Paper {}", id),
        authors: vec!["Alan Turing".to_string()],
        abstract_text: format!("About {}", id),
        date,
        pdf_link: format!("http://arxiv.org/pdf/{}v2", id),
        abs_link: format!("http://arxiv.org/abs/{}v2", id),
        categories: vec!["cs.LG".to_string()],
    }
}

fn feed(source: Arc<dyn PaperSource>) -> FeedClient {
    let config = FetchConfig {
        categories: vec!["cs.LG".to_string()],
        retry: RetryPolicy::immediate(2),
        ..FetchConfig::default()
    };
    FeedClient::new(source, config)
}

fn mailer(outbox: Arc<Outbox>) -> MailSender {
    MailSender::new(outbox, "bot@example.com").with_retry(RetryPolicy::immediate(2))
}

fn recipients() -> Vec<String> {
    vec!["a@example.com".to_string(), "b@example.com".to_string()]
}

fn filter(reply: &'static str) -> RelevanceFilter {
    let config = FilterConfig {
        retry: RetryPolicy::immediate(2),
        ..FilterConfig::default()
    };
    RelevanceFilter::new(Arc::new(FixedReply(reply)), config)
}

fn profile() -> InterestProfile {
    InterestProfile {
        keywords: vec!["learning".to_string()],
        negative_keywords: None,
        target_count: 5,
    }
}

#[tokio::test]
async fn delivers_then_skips_the_same_day() {
    init_tracing();

    let source = Arc::new(SwappableSource::new(vec![paper("x", day(2)), paper("y", day(2)), paper("z", day(1))]));
    let outbox = Arc::new(Outbox::default());
    let store = CountingStore::default();

    let mut assistant =
        Assistant::new(feed(source.clone()), mailer(outbox.clone()), recipients(), Box::new(store.clone()))
            .unwrap()
            .with_filter(filter("[2]"), profile());

    let outcome = assistant.run_cycle_on(day(3)).await;
    match &outcome {
        CycleOutcome::Delivered {
            target_date,
            fetched,
            selected,
            report,
        } => {
            assert_eq!(*target_date, day(2));
            assert_eq!(*fetched, 2);
            assert_eq!(*selected, 1);
            assert!(report.all_delivered());
        }
        other => panic!("expected delivery, got {:?}", other),
    }
    assert_eq!(assistant.phase(), Phase::Idle);
    assert!(assistant.state().contains(day(2)));
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);

    let sent = outbox.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, "Daily papers 2024-05-03 - Arxiv Assistant");
    assert!(sent[0].html_body.contains("Paper y"));
    assert!(!sent[0].html_body.contains("Paper x"));
    assert!(sent[0].html_body.contains("http://arxiv.org/pdf/y"));

    assert_eq!(assistant.run_cycle_on(day(3)).await, CycleOutcome::NothingNew);
    assert_eq!(outbox.sent.lock().unwrap().len(), 2);
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);

    *source.listing.lock().unwrap() = vec![paper("v", day(3)), paper("w", day(3)), paper("x", day(2))];
    assert!(matches!(
        assistant.run_cycle_on(day(4)).await,
        CycleOutcome::Delivered { target_date, .. } if target_date == day(3)
    ));
}

#[tokio::test]
async fn empty_selection_records_nothing() {
    init_tracing();

    let source = Arc::new(SwappableSource::new(vec![paper("x", day(2))]));
    let outbox = Arc::new(Outbox::default());
    let mut assistant = Assistant::new(feed(source), mailer(outbox.clone()), recipients(), Box::new(MemoryStateStore))
        .unwrap()
        .with_filter(filter("[]"), profile());

    assert_eq!(assistant.run_cycle_on(day(3)).await, CycleOutcome::FilterEmpty);
    assert!(assistant.state().is_empty());
    assert!(outbox.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetch_failure_is_reported() {
    init_tracing();

    let outbox = Arc::new(Outbox::default());
    let mut assistant = Assistant::new(
        feed(Arc::new(SwappableSource::failing())),
        mailer(outbox.clone()),
        recipients(),
        Box::new(MemoryStateStore),
    )
    .unwrap();

    assert_eq!(assistant.run_cycle_on(day(3)).await, CycleOutcome::FetchFailed);
    assert!(outbox.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn without_filter_every_paper_is_mailed() {
    init_tracing();

    let source = Arc::new(SwappableSource::new(vec![paper("x", day(2)), paper("y", day(2))]));
    let outbox = Arc::new(Outbox::default());
    let mut assistant =
        Assistant::new(feed(source), mailer(outbox.clone()), recipients(), Box::new(MemoryStateStore)).unwrap();

    let outcome = assistant.run_cycle_on(day(3)).await;
    assert!(matches!(outcome, CycleOutcome::Delivered { selected: 2, .. }));
    let body = outbox.sent.lock().unwrap()[0].html_body.clone();
    assert!(body.contains("Paper x") && body.contains("Paper y"));
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("run_state.json");
    let listing = vec![paper("x", day(2))];

    let outbox = Arc::new(Outbox::default());
    let mut first = Assistant::new(
        feed(Arc::new(SwappableSource::new(listing.clone()))),
        mailer(outbox.clone()),
        recipients(),
        Box::new(JsonFileStateStore::new(&path)),
    )
    .unwrap();
    assert!(matches!(first.run_cycle_on(day(3)).await, CycleOutcome::Delivered { .. }));

    let mut second = Assistant::new(
        feed(Arc::new(SwappableSource::new(listing))),
        mailer(outbox.clone()),
        recipients(),
        Box::new(JsonFileStateStore::new(&path)),
    )
    .unwrap();
    assert!(second.state().contains(day(2)));
    assert_eq!(second.run_cycle_on(day(3)).await, CycleOutcome::NothingNew);
    assert_eq!(outbox.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn phase_is_running_only_during_a_cycle() {
    init_tracing();

    let source = Arc::new(PhaseRecordingSource::default());
    let outbox = Arc::new(Outbox::default());
    let mut assistant = Assistant::new(feed(source.clone()), mailer(outbox), recipients(), Box::new(MemoryStateStore))
        .unwrap();

    let mut phases = assistant.subscribe_phase();
    *source.phase.lock().unwrap() = Some(assistant.subscribe_phase());
    assert_eq!(assistant.phase(), Phase::Idle);

    assert!(matches!(assistant.run_cycle_on(day(3)).await, CycleOutcome::Delivered { .. }));

    assert_eq!(*source.seen.lock().unwrap(), vec![Phase::Running]);
    assert_eq!(assistant.phase(), Phase::Idle);
    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), Phase::Idle);
}
