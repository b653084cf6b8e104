// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod enrich;
pub mod fetch;
pub mod filter;
pub mod pipeline;
pub mod store;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::config::RadarConfig;
pub use crate::enrich::{enrich, Enrichment, EnrichmentResult, ReasoningClient, RemoteConfig};
pub use crate::fetch::{fetch_all, FetchError, FetcherConfig, Transport};
pub use crate::filter::{filter, FilterConfig, FilterOutcome};
pub use crate::pipeline::{run_pipeline, PipelineInput};
pub use crate::store::{MemoryStore, ReliabilityStore};
pub use crate::types::{
    FetchOutcome, NormalizedCard, PipelineReport, RawItem, ReasoningPath, Source,
};
