// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cache;
pub mod config;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod shutdown;
pub mod summarizer;

// ---- Re-exports for stable public API ----
pub use crate::cache::{dedup_key, SeenCache};
pub use crate::filter::{passes, TermFilters};
pub use crate::ingest::types::{Product, SourceProvider};
pub use crate::notify::{Destination, Dispatcher, SummaryMode, WebhookPayload, WebhookTransport};
pub use crate::poller::{CycleReport, Poller};
