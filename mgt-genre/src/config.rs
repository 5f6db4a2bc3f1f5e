//! Engine configuration
//!
//! Fixed, validated structure loaded from TOML. Unknown keys are rejected
//! at startup. Every section is optional and falls back to compiled
//! defaults, so an empty file (or no file) is a valid configuration.
//!
//! Credential priority per provider: ENV → TOML.

use crate::error::{GenreError, Result};
use crate::types::{ProviderId, Urgency};
use mgt_common::config::{load_toml, resolve_config_path, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MGT_CONFIG";

/// Module name used for the per-user config file (`~/.config/mgt/genre.toml`)
pub const CONFIG_MODULE_NAME: &str = "genre";

/// Upper bound for `resolution_timeout_secs` (one hour)
pub const MAX_RESOLUTION_TIMEOUT_SECS: u64 = 3600;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on one resolution, including rate-limit waits
    #[serde(default = "default_resolution_timeout_secs")]
    pub resolution_timeout_secs: u64,

    /// Caller urgency used when `resolve` is called without one
    #[serde(default)]
    pub rate_limit_mode: Urgency,

    /// Delimiter for multi-value genre tags
    #[serde(default = "default_genre_delimiter")]
    pub genre_delimiter: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub taxonomy: TaxonomyConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_timeout_secs: default_resolution_timeout_secs(),
            rate_limit_mode: Urgency::default(),
            genre_delimiter: default_genre_delimiter(),
            logging: LoggingConfig::default(),
            thresholds: ThresholdConfig::default(),
            scoring: ScoringConfig::default(),
            cache: CacheConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

fn default_resolution_timeout_secs() -> u64 {
    20
}

fn default_genre_delimiter() -> String {
    "; ".to_string()
}

/// Disposition thresholds (`[thresholds]`), percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    #[serde(default = "default_auto_apply_at")]
    pub auto_apply_at: f64,
    #[serde(default = "default_review_at")]
    pub review_at: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            auto_apply_at: default_auto_apply_at(),
            review_at: default_review_at(),
        }
    }
}

fn default_auto_apply_at() -> f64 {
    95.0
}

fn default_review_at() -> f64 {
    80.0
}

impl ThresholdConfig {
    pub fn new(auto_apply_at: f64, review_at: f64) -> Self {
        Self {
            auto_apply_at,
            review_at,
        }
    }

    /// Require 0 <= review_at <= auto_apply_at <= 100
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.review_at
            && self.review_at <= self.auto_apply_at
            && self.auto_apply_at <= 100.0;
        if !ordered {
            return Err(GenreError::Config(format!(
                "Invalid thresholds: need 0 <= review_at ({}) <= auto_apply_at ({}) <= 100",
                self.review_at, self.auto_apply_at
            )));
        }
        Ok(())
    }
}

/// Scoring and normalization parameters (`[scoring]`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weight multiplier per ancestor step, in (0, 1)
    #[serde(default = "default_ancestor_discount")]
    pub ancestor_discount: f64,

    /// Minimum normalized Levenshtein similarity for a fuzzy alias match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Ranked genres kept in a result
    #[serde(default = "default_max_genres")]
    pub max_genres: usize,

    /// Weighted support required for full confidence
    #[serde(default = "default_agreement_weight")]
    pub agreement_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ancestor_discount: default_ancestor_discount(),
            fuzzy_threshold: default_fuzzy_threshold(),
            max_genres: default_max_genres(),
            agreement_weight: default_agreement_weight(),
        }
    }
}

fn default_ancestor_discount() -> f64 {
    0.6
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_max_genres() -> usize {
    5
}

fn default_agreement_weight() -> f64 {
    1.8
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.ancestor_discount > 0.0 && self.ancestor_discount < 1.0) {
            return Err(GenreError::Config(format!(
                "scoring.ancestor_discount must be in (0, 1), got {}",
                self.ancestor_discount
            )));
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(GenreError::Config(format!(
                "scoring.fuzzy_threshold must be in (0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.max_genres == 0 {
            return Err(GenreError::Config(
                "scoring.max_genres must be at least 1".to_string(),
            ));
        }
        if !(self.agreement_weight > 0.0 && self.agreement_weight.is_finite()) {
            return Err(GenreError::Config(format!(
                "scoring.agreement_weight must be positive, got {}",
                self.agreement_weight
            )));
        }
        Ok(())
    }
}

/// Response cache (`[cache]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_provider_ttl_secs")]
    pub provider_ttl_secs: u64,

    #[serde(default = "default_aggregate_ttl_secs")]
    pub aggregate_ttl_secs: u64,

    /// Background purge of expired entries; 0 disables the sweeper
    #[serde(default)]
    pub sweep_interval_secs: u64,

    /// SQLite file for a persistent cache; in-memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider_ttl_secs: default_provider_ttl_secs(),
            aggregate_ttl_secs: default_aggregate_ttl_secs(),
            sweep_interval_secs: 0,
            database_path: None,
        }
    }
}

fn default_provider_ttl_secs() -> u64 {
    15 * 60
}

fn default_aggregate_ttl_secs() -> u64 {
    60 * 60
}

impl CacheConfig {
    pub fn provider_ttl(&self) -> Duration {
        Duration::from_secs(self.provider_ttl_secs)
    }

    pub fn aggregate_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_ttl_secs == 0 || self.aggregate_ttl_secs == 0 {
            return Err(GenreError::Config(
                "cache TTLs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Taxonomy source (`[taxonomy]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonomyConfig {
    /// Custom taxonomy TOML; built-in taxonomy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// One `[providers.<name>]` table; unset fields take per-provider defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
    /// Bearer token or API key, depending on provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// `[providers]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub spotify: ProviderConfig,
    #[serde(default)]
    pub musicbrainz: ProviderConfig,
    #[serde(default)]
    pub discogs: ProviderConfig,
    #[serde(default)]
    pub deezer: ProviderConfig,
    #[serde(default)]
    pub lastfm: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::Spotify => &self.spotify,
            ProviderId::MusicBrainz => &self.musicbrainz,
            ProviderId::Discogs => &self.discogs,
            ProviderId::Deezer => &self.deezer,
            ProviderId::LastFm => &self.lastfm,
        }
    }

    pub fn get_mut(&mut self, id: ProviderId) -> &mut ProviderConfig {
        match id {
            ProviderId::Spotify => &mut self.spotify,
            ProviderId::MusicBrainz => &mut self.musicbrainz,
            ProviderId::Discogs => &mut self.discogs,
            ProviderId::Deezer => &mut self.deezer,
            ProviderId::LastFm => &mut self.lastfm,
        }
    }
}

/// Fully resolved settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub id: ProviderId,
    pub enabled: bool,
    pub weight: f64,
    pub rate_limit_per_minute: u32,
    pub credentials: Option<String>,
    pub base_url: String,
}

/// Compiled defaults per provider
struct ProviderDefaults {
    enabled: bool,
    weight: f64,
    rate_limit_per_minute: u32,
    base_url: &'static str,
    needs_credentials: bool,
    credential_env: Option<&'static str>,
}

fn provider_defaults(id: ProviderId) -> ProviderDefaults {
    match id {
        ProviderId::Spotify => ProviderDefaults {
            enabled: false,
            weight: 1.0,
            rate_limit_per_minute: 180,
            base_url: "https://api.spotify.com/v1",
            needs_credentials: true,
            credential_env: Some("MGT_SPOTIFY_TOKEN"),
        },
        ProviderId::MusicBrainz => ProviderDefaults {
            enabled: true,
            weight: 0.85,
            rate_limit_per_minute: 50,
            base_url: "https://musicbrainz.org/ws/2",
            needs_credentials: false,
            credential_env: None,
        },
        ProviderId::Discogs => ProviderDefaults {
            enabled: false,
            weight: 0.8,
            rate_limit_per_minute: 60,
            base_url: "https://api.discogs.com",
            needs_credentials: true,
            credential_env: Some("MGT_DISCOGS_TOKEN"),
        },
        ProviderId::Deezer => ProviderDefaults {
            enabled: true,
            weight: 0.75,
            rate_limit_per_minute: 300,
            base_url: "https://api.deezer.com",
            needs_credentials: false,
            credential_env: None,
        },
        ProviderId::LastFm => ProviderDefaults {
            enabled: false,
            weight: 0.7,
            rate_limit_per_minute: 300,
            base_url: "https://ws.audioscrobbler.com/2.0",
            needs_credentials: true,
            credential_env: Some("MGT_LASTFM_API_KEY"),
        },
    }
}

/// Environment variable carrying a provider's credentials, if it takes any
pub fn credential_env_var(id: ProviderId) -> Option<&'static str> {
    provider_defaults(id).credential_env
}

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

impl EngineConfig {
    /// Resolve, load, apply ENV credentials and validate
    ///
    /// File priority: `cli_path` → `MGT_CONFIG` → `~/.config/mgt/genre.toml`
    /// → compiled defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_MODULE_NAME) {
            Some(path) => load_toml::<EngineConfig>(&path)?,
            None => {
                info!("No configuration file found, using compiled defaults");
                EngineConfig::default()
            }
        };

        config.apply_env_credentials();
        config.validate()?;
        Ok(config)
    }

    /// Overlay credentials from the environment (ENV wins over TOML)
    pub fn apply_env_credentials(&mut self) {
        for id in ProviderId::ALL {
            let Some(var) = credential_env_var(id) else {
                continue;
            };
            let env_key = std::env::var(var).ok().filter(|k| is_valid_key(k));
            let provider = self.providers.get_mut(id);
            let toml_key_present = provider
                .credentials
                .as_deref()
                .map(is_valid_key)
                .unwrap_or(false);

            if let Some(key) = env_key {
                if toml_key_present {
                    warn!(
                        "{} credentials found in multiple sources: environment, TOML. Using environment (highest priority).",
                        id
                    );
                }
                info!("{} credentials loaded from {}", id, var);
                provider.credentials = Some(key);
            }
        }
    }

    /// Resolved settings for one provider
    pub fn provider_settings(&self, id: ProviderId) -> ProviderSettings {
        let defaults = provider_defaults(id);
        let config = self.providers.get(id);
        ProviderSettings {
            id,
            enabled: config.enabled.unwrap_or(defaults.enabled),
            weight: config.weight.unwrap_or(defaults.weight),
            rate_limit_per_minute: config
                .rate_limit_per_minute
                .unwrap_or(defaults.rate_limit_per_minute),
            credentials: config.credentials.clone().filter(|k| is_valid_key(k)),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| defaults.base_url.to_string()),
        }
    }

    /// Providers enabled by configuration, in `ProviderId::ALL` order
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.provider_settings(*id).enabled)
            .collect()
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout_secs)
    }

    /// Check every section; any violation is a configuration error
    pub fn validate(&self) -> Result<()> {
        self.logging.validate()?;
        self.thresholds.validate()?;
        self.scoring.validate()?;
        self.cache.validate()?;

        if self.resolution_timeout_secs == 0
            || self.resolution_timeout_secs > MAX_RESOLUTION_TIMEOUT_SECS
        {
            return Err(GenreError::Config(format!(
                "resolution_timeout_secs must be in 1..={}, got {}",
                MAX_RESOLUTION_TIMEOUT_SECS, self.resolution_timeout_secs
            )));
        }
        if self.genre_delimiter.is_empty() {
            return Err(GenreError::Config(
                "genre_delimiter must not be empty".to_string(),
            ));
        }

        for id in ProviderId::ALL {
            let settings = self.provider_settings(id);
            if !(settings.weight > 0.0 && settings.weight <= 1.0) {
                return Err(GenreError::Config(format!(
                    "providers.{}.weight must be in (0, 1], got {}",
                    id, settings.weight
                )));
            }
            if settings.rate_limit_per_minute == 0 {
                return Err(GenreError::Config(format!(
                    "providers.{}.rate_limit_per_minute must be greater than zero",
                    id
                )));
            }
            let defaults = provider_defaults(id);
            if settings.enabled && defaults.needs_credentials && settings.credentials.is_none() {
                return Err(GenreError::Config(format!(
                    "{} is enabled but has no credentials. Configure using one of:\n\
                     1. Environment: {}=<value>\n\
                     2. TOML config: [providers.{}] credentials = \"<value>\"",
                    id,
                    defaults.credential_env.unwrap_or("-"),
                    id
                )));
            }
        }

        Ok(())
    }
}
