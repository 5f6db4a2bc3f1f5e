//! Genre engine runtime
//!
//! Owns the process-wide state: validated configuration, taxonomy and
//! normalizer, provider adapters (with their rate limiters), the response
//! cache and the optional cache sweeper. Built once at startup, torn down
//! with `shutdown`.

use crate::aggregator::Aggregator;
use crate::cache::{CacheStore, CacheSweeper, MemoryStore, ResponseCache, SqliteStore};
use crate::config::{EngineConfig, ThresholdConfig};
use crate::error::{GenreError, Result};
use crate::normalizer::VocabularyNormalizer;
use crate::policy::DecisionPolicy;
use crate::providers::{build_providers, GenreProvider};
use crate::scorer::ConfidenceScorer;
use crate::taxonomy::Taxonomy;
use crate::types::{AggregationResult, AlbumIdentity, ProviderId, Urgency};
use mgt_common::time::{Clock, SystemClock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Assembles a `GenreEngine`, allowing injected providers, store and clock
pub struct EngineBuilder {
    config: EngineConfig,
    providers: Option<Vec<Arc<dyn GenreProvider>>>,
    store: Option<Arc<dyn CacheStore>>,
    taxonomy: Option<Taxonomy>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            providers: None,
            store: None,
            taxonomy: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use these adapters instead of building them from configuration
    pub fn providers(mut self, providers: Vec<Arc<dyn GenreProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Use this cache store instead of the configured one
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this taxonomy instead of the configured one
    pub fn taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = Some(taxonomy);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate everything and start the engine
    pub async fn build(self) -> Result<GenreEngine> {
        let config = self.config;
        config.validate()?;

        let taxonomy = match self.taxonomy {
            Some(taxonomy) => taxonomy,
            None => Taxonomy::load(&config.taxonomy)?,
        };
        let normalizer = Arc::new(VocabularyNormalizer::new(Arc::new(taxonomy), &config.scoring));

        let providers = match self.providers {
            Some(providers) => providers,
            None => build_providers(&config)?,
        };
        if providers.is_empty() {
            return Err(GenreError::Config(
                "No providers enabled; enable at least one under [providers]".to_string(),
            ));
        }

        let store: Arc<dyn CacheStore> = match (self.store, &config.cache.database_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::open(path).await?),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let cache = ResponseCache::new(
            store,
            self.clock,
            config.cache.provider_ttl(),
            config.cache.aggregate_ttl(),
        );

        let sweeper = config
            .cache
            .sweep_interval()
            .map(|interval| CacheSweeper::spawn(cache.clone(), interval));

        let policy = DecisionPolicy::new(config.thresholds)?;
        let aggregator = Aggregator::new(
            providers,
            normalizer.clone(),
            ConfidenceScorer::new(&config.scoring),
            policy.clone(),
            cache.clone(),
            config.resolution_timeout(),
        );
        let enabled = aggregator.provider_ids();

        info!(
            providers = ?enabled,
            persistent_cache = config.cache.database_path.is_some(),
            sweeper = sweeper.is_some(),
            "Genre engine started"
        );

        Ok(GenreEngine {
            config,
            normalizer,
            aggregator,
            policy,
            cache,
            enabled,
            sweeper: Mutex::new(sweeper),
        })
    }
}

/// Process-wide genre aggregation engine
pub struct GenreEngine {
    config: EngineConfig,
    normalizer: Arc<VocabularyNormalizer>,
    aggregator: Aggregator,
    policy: DecisionPolicy,
    cache: ResponseCache,
    enabled: BTreeSet<ProviderId>,
    sweeper: Mutex<Option<CacheSweeper>>,
}

impl GenreEngine {
    /// Start from configuration alone
    pub async fn start(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build().await
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Resolve with every enabled provider and the configured urgency
    pub async fn resolve(&self, album: &AlbumIdentity) -> AggregationResult {
        self.aggregator
            .resolve(album, &self.enabled, self.config.rate_limit_mode)
            .await
    }

    /// Resolve with an explicit provider subset and urgency
    pub async fn resolve_with(
        &self,
        album: &AlbumIdentity,
        providers: &BTreeSet<ProviderId>,
        urgency: Urgency,
    ) -> AggregationResult {
        self.aggregator.resolve(album, providers, urgency).await
    }

    /// Replace decision thresholds; applies from the next resolution
    pub fn update_thresholds(&self, thresholds: ThresholdConfig) -> Result<()> {
        self.policy.update(thresholds)
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.policy.snapshot()
    }

    pub fn normalizer(&self) -> &VocabularyNormalizer {
        &self.normalizer
    }

    pub fn enabled_providers(&self) -> &BTreeSet<ProviderId> {
        &self.enabled
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the sweeper, then flush and close the cache store
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.stop().await;
        }
        self.cache.close().await?;
        info!("Genre engine stopped");
        Ok(())
    }
}
