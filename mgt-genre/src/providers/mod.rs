//! Provider adapters
//!
//! One adapter per external metadata source, all behind the
//! `GenreProvider` trait. Adapters never return errors to the aggregator:
//! every failure is a `ProviderFailure` value meaning "this provider
//! abstained".

pub mod deezer;
pub mod discogs;
pub mod http;
pub mod lastfm;
pub mod musicbrainz;
pub mod spotify;

use crate::config::EngineConfig;
use crate::error::{GenreError, Result};
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use deezer::DeezerProvider;
pub use discogs::DiscogsProvider;
pub use http::HttpSource;
pub use lastfm::LastFmProvider;
pub use musicbrainz::MusicBrainzProvider;
pub use spotify::SpotifyProvider;

/// Shared contract for all genre sources
#[async_trait]
pub trait GenreProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Static reliability weight in (0, 1]
    fn weight(&self) -> f64;

    /// Raw genre strings for an album
    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> std::result::Result<ProviderResponse, ProviderFailure>;
}

/// Per-provider token bucket
///
/// One instance per adapter, shared by every resolution in the process.
pub struct ProviderRateLimiter {
    limiter: DefaultDirectRateLimiter,
    per_minute: u32,
}

impl ProviderRateLimiter {
    pub fn per_minute(per_minute: u32) -> Self {
        let quota = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(quota)),
            per_minute: quota.get(),
        }
    }

    pub fn quota_per_minute(&self) -> u32 {
        self.per_minute
    }

    /// Take one token
    ///
    /// `Wait` blocks until a token is available; `FailFast` reports
    /// `RateLimited` when the bucket is empty.
    pub async fn acquire(&self, urgency: Urgency) -> std::result::Result<(), ProviderFailure> {
        match urgency {
            Urgency::Wait => {
                self.limiter.until_ready().await;
                Ok(())
            }
            Urgency::FailFast => self
                .limiter
                .check()
                .map_err(|_| ProviderFailure::RateLimited),
        }
    }
}

impl std::fmt::Debug for ProviderRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRateLimiter")
            .field("per_minute", &self.per_minute)
            .finish()
    }
}

/// Build the shared HTTP client
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(mgt_common::config::get_user_agent())
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| GenreError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Adapters for every provider enabled in configuration
pub fn build_providers(config: &EngineConfig) -> Result<Vec<Arc<dyn GenreProvider>>> {
    let client = build_http_client()?;
    let mut providers: Vec<Arc<dyn GenreProvider>> = Vec::new();

    for id in config.enabled_providers() {
        let settings = config.provider_settings(id);
        let source = HttpSource::new(&settings, client.clone());
        let provider: Arc<dyn GenreProvider> = match id {
            ProviderId::Spotify => Arc::new(SpotifyProvider::new(source)),
            ProviderId::MusicBrainz => Arc::new(MusicBrainzProvider::new(source)),
            ProviderId::Discogs => Arc::new(DiscogsProvider::new(source)),
            ProviderId::Deezer => Arc::new(DeezerProvider::new(source)),
            ProviderId::LastFm => Arc::new(LastFmProvider::new(source)),
        };
        info!(
            provider = %id,
            weight = settings.weight,
            rate_limit_per_minute = settings.rate_limit_per_minute,
            "Provider enabled"
        );
        providers.push(provider);
    }

    Ok(providers)
}
