//! Shared test fixtures: scripted providers and engine construction

#![allow(dead_code)]

pub mod log_capture;

use async_trait::async_trait;
use mgt_common::time::{Clock, ManualClock};
use mgt_genre::cache::MemoryStore;
use mgt_genre::providers::GenreProvider;
use mgt_genre::{
    AlbumIdentity, EngineConfig, GenreEngine, ProviderFailure, ProviderId, ProviderResponse,
    Urgency,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted provider does when fetched
#[derive(Debug, Clone)]
pub enum Outcome {
    Genres(Vec<String>),
    Fail(ProviderFailure),
    /// Never answers within any sane deadline
    Hang,
}

/// Provider returning a fixed outcome, counting calls
pub struct MockProvider {
    id: ProviderId,
    weight: f64,
    outcome: Outcome,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: ProviderId, weight: f64, outcome: Outcome) -> Self {
        Self {
            id,
            weight,
            outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn genres(id: ProviderId, weight: f64, genres: &[&str]) -> Arc<Self> {
        Arc::new(Self::new(
            id,
            weight,
            Outcome::Genres(genres.iter().map(|g| g.to_string()).collect()),
        ))
    }

    pub fn failing(id: ProviderId, weight: f64, failure: ProviderFailure) -> Arc<Self> {
        Arc::new(Self::new(id, weight, Outcome::Fail(failure)))
    }

    pub fn hanging(id: ProviderId, weight: f64) -> Arc<Self> {
        Arc::new(Self::new(id, weight, Outcome::Hang))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenreProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn fetch(
        &self,
        _album: &AlbumIdentity,
        _urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            Outcome::Genres(genres) => Ok(ProviderResponse::new(self.id, genres.clone(), self.weight)),
            Outcome::Fail(failure) => Err(failure.clone()),
            Outcome::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ProviderFailure::NetworkError("hang ended".to_string()))
            }
        }
    }
}

pub fn as_dyn(providers: &[Arc<MockProvider>]) -> Vec<Arc<dyn GenreProvider>> {
    providers
        .iter()
        .map(|p| p.clone() as Arc<dyn GenreProvider>)
        .collect()
}

/// Engine over scripted providers, in-memory cache and a manual clock
pub async fn engine_with(
    config: EngineConfig,
    providers: &[Arc<MockProvider>],
    clock: Arc<ManualClock>,
) -> GenreEngine {
    GenreEngine::builder(config)
        .providers(as_dyn(providers))
        .store(Arc::new(MemoryStore::new()))
        .clock(clock as Arc<dyn Clock>)
        .build()
        .await
        .expect("engine should build")
}

pub fn album() -> AlbumIdentity {
    AlbumIdentity::new("Opeth", "Blackwater Park").with_year(2001)
}
