pub mod types;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod feed_client;
pub mod snapshot;
pub mod llm_adapter;
pub mod prompts;
pub mod filter;
pub mod digest;
pub mod config;
pub mod scheduler;

pub use types::*;
pub use traits::PaperSource;
pub use fetcher::ArxivClient;
pub use parser::FeedParser;
pub use feed_client::{FeedClient, FetchOutcome};
pub use snapshot::{SnapshotKind, SnapshotStore};
pub use llm_adapter::{ChatMessage, CompletionClient, LlmConfig, OpenAiCompletionClient};
pub use filter::{merge_round_robin, FilterOutcome, RelevanceFilter};
pub use digest::{normalize_pdf_link, DigestFormatter};
pub use config::AssistantConfig;
pub use scheduler::{Assistant, CycleOutcome, Phase};
