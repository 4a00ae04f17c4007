// src/lib.rs
// Public library surface for the service binary, the CLI and integration tests.

pub mod ai_bootstrap;
pub mod analyze;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod research;
pub mod store;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::router;
pub use crate::research::{BatchReport, CompetitorMap, ResearchPipeline};
pub use crate::store::{FileStore, MemoryStore, ResearchStore};
