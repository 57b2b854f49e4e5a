pub mod defs;
pub mod retry;
pub mod state;

pub use defs::{date_key, paper_batches, Digest, Paper, PaperBatch};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
pub use state::{JsonFileStateStore, MemoryStateStore, RunState, RunStateStore};
