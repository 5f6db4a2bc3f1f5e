//! mgt-genre - multi-source genre aggregation
//!
//! Given an album identity, queries several rate-limited metadata
//! providers concurrently, normalizes their genre vocabularies onto one
//! taxonomy, reconciles them into a confidence-scored genre list, decides
//! a disposition and caches the outcome.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod policy;
pub mod providers;
pub mod scorer;
pub mod taxonomy;
pub mod types;

pub use crate::config::EngineConfig;
pub use crate::engine::{EngineBuilder, GenreEngine};
pub use crate::error::{GenreError, Result};
pub use crate::types::{
    AggregationResult, AlbumIdentity, Disposition, FailureKind, GenreScore, ProviderFailure,
    ProviderId, ProviderResponse, Urgency,
};
