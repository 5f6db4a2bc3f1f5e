//! Aggregator
//!
//! Resolves one album against the enabled providers:
//! 1. Aggregate cache check (key covers the enabled provider set); a hit is
//!    re-decided under the current thresholds
//! 2. Per-provider cache check; misses fetched concurrently in a `JoinSet`
//! 3. Providers still running at the deadline are aborted and recorded as
//!    `Timeout` (only this resolution's tasks)
//! 4. Successful responses → normalizer → scorer → decision policy
//! 5. Provider responses and the final result are written to the cache
//!
//! Provider failures are recorded in the result, never propagated. When
//! every provider fails the result is empty with confidence 0 and Skip,
//! and it is not cached.

use crate::cache::ResponseCache;
use crate::normalizer::VocabularyNormalizer;
use crate::policy::{decide, DecisionPolicy};
use crate::providers::GenreProvider;
use crate::scorer::ConfidenceScorer;
use crate::types::{
    AggregationResult, AlbumIdentity, FailureKind, ProviderFailure, ProviderId, ProviderResponse,
    Urgency,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Deadline used when the configured timeout overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

type FetchOutcome = (ProviderId, Result<ProviderResponse, ProviderFailure>);

/// Concurrent, partial-failure tolerant resolution pipeline
pub struct Aggregator {
    providers: Vec<Arc<dyn GenreProvider>>,
    normalizer: Arc<VocabularyNormalizer>,
    scorer: ConfidenceScorer,
    policy: DecisionPolicy,
    cache: ResponseCache,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn GenreProvider>>,
        normalizer: Arc<VocabularyNormalizer>,
        scorer: ConfidenceScorer,
        policy: DecisionPolicy,
        cache: ResponseCache,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            normalizer,
            scorer,
            policy,
            cache,
            timeout,
        }
    }

    /// Ids of every provider this aggregator can query
    pub fn provider_ids(&self) -> BTreeSet<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Resolve `album` against the providers in `enabled`
    pub async fn resolve(
        &self,
        album: &AlbumIdentity,
        enabled: &BTreeSet<ProviderId>,
        urgency: Urgency,
    ) -> AggregationResult {
        let thresholds = self.policy.snapshot();
        let selected: Vec<Arc<dyn GenreProvider>> = self
            .providers
            .iter()
            .filter(|p| enabled.contains(&p.id()))
            .cloned()
            .collect();
        let queried: BTreeSet<ProviderId> = selected.iter().map(|p| p.id()).collect();

        // Step 1: aggregate cache
        // The key ignores year and thresholds: answer for the requested
        // identity and decide under this resolution's thresholds.
        if let Some(mut cached) = self.cache.get_aggregate(album, &queried).await {
            debug!(album = %album, "Aggregate cache hit");
            cached.album = album.clone();
            cached.disposition = decide(&thresholds, cached.overall_confidence);
            return cached;
        }

        // Step 2: per-provider cache, spawn misses
        let mut responses: BTreeMap<ProviderId, ProviderResponse> = BTreeMap::new();
        let mut failures: BTreeMap<ProviderId, FailureKind> = BTreeMap::new();
        let mut pending: BTreeSet<ProviderId> = BTreeSet::new();
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();

        for provider in selected {
            let id = provider.id();
            if let Some(mut response) = self.cache.get_provider(album, id).await {
                debug!(provider = %id, album = %album, "Provider cache hit");
                response.weight = provider.weight();
                responses.insert(id, response);
                continue;
            }

            pending.insert(id);
            let album = album.clone();
            tasks.spawn(async move {
                debug!(provider = %id, album = %album, "Querying provider");
                let outcome = provider.fetch(&album, urgency).await;
                (id, outcome)
            });
        }

        // Step 3: collect outcomes until done or deadline
        let now = Instant::now();
        let deadline = now
            .checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((id, outcome)))) => {
                    pending.remove(&id);
                    match outcome {
                        Ok(response) => {
                            self.cache.put_provider(album, &response).await;
                            responses.insert(id, response);
                        }
                        Err(failure) => {
                            log_failure(id, album, &failure);
                            failures.insert(id, failure.kind());
                        }
                    }
                }
                Ok(Some(Err(join_error))) => {
                    warn!(album = %album, error = %join_error, "Provider task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    for id in &pending {
                        log_failure(*id, album, &ProviderFailure::Timeout);
                        failures.insert(*id, FailureKind::Timeout);
                    }
                    pending.clear();
                    break;
                }
            }
        }

        // Tasks that panicked never reported an outcome
        for id in pending {
            failures.insert(id, FailureKind::NetworkError);
        }

        let resolved_at = self.cache.now();
        if responses.is_empty() {
            info!(
                album = %album,
                queried = queried.len(),
                failed = failures.len(),
                "All providers failed; no genres"
            );
            return AggregationResult::empty(album.clone(), queried, failures, resolved_at);
        }

        // Step 4: normalize, score, decide
        let responding_weight: f64 = responses.values().map(|r| r.weight).sum();
        let observations: Vec<_> = responses
            .values()
            .flat_map(|response| self.normalizer.observe(response))
            .collect();
        let outcome = self.scorer.score(&observations, responding_weight);
        let disposition = decide(&thresholds, outcome.overall_confidence);

        let result = AggregationResult {
            album: album.clone(),
            ranked_genres: outcome.ranked_genres,
            overall_confidence: outcome.overall_confidence,
            disposition,
            sources_queried: queried.clone(),
            sources_failed: failures.keys().copied().collect(),
            failures,
            resolved_at,
        };

        info!(
            album = %album,
            genres = ?result.genre_names(),
            confidence = result.overall_confidence,
            disposition = %result.disposition,
            responded = responses.len(),
            failed = result.sources_failed.len(),
            "Genres resolved"
        );

        // Step 5: write through
        if !result.is_empty() {
            let ttl = if result.sources_failed.is_empty() {
                self.cache.aggregate_ttl()
            } else {
                self.cache.provider_ttl()
            };
            self.cache.put_aggregate(&queried, &result, ttl).await;
        }

        result
    }
}

fn log_failure(id: ProviderId, album: &AlbumIdentity, failure: &ProviderFailure) {
    match failure {
        ProviderFailure::NotFound(_) => {
            debug!(provider = %id, album = %album, error = %failure, "Provider has no match")
        }
        _ => warn!(provider = %id, album = %album, error = %failure, "Provider failed"),
    }
}
