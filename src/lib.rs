// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::cache::{cached_fetch, CacheStore, MemoryStore, Namespace, TtlPolicy};
pub use crate::error::{FetchError, PollError, SinkDeliveryError, StoreUnavailable};
pub use crate::ingest::types::{Fetched, Fetcher, Record};
pub use crate::notify::{Notifier, NotifierMux, RecordEvent};
pub use crate::scheduler::{
    CycleReport, PollScheduler, PollSettings, ReadySignal, SchedulerHandle, SourceStatus,
    WatchContext,
};
pub use crate::tracker::SeenLog;
