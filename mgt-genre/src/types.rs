//! Core Types for the Genre Aggregation Engine
//!
//! Defines the values that flow through a resolution:
//! - **AlbumIdentity**: lookup key supplied by the caller
//! - **ProviderResponse / RawGenreObservation**: provider output
//! - **NormalizedObservation**: taxonomy-mapped evidence
//! - **GenreScore / AggregationResult**: scored, ranked decision
//!
//! Provider failures are plain data (`ProviderFailure`), recorded in the
//! result rather than propagated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Provider identity
// ============================================================================

/// External metadata source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Spotify,
    MusicBrainz,
    Discogs,
    Deezer,
    LastFm,
}

impl ProviderId {
    /// Every supported provider, in configuration order
    pub const ALL: [ProviderId; 5] = [
        ProviderId::Spotify,
        ProviderId::MusicBrainz,
        ProviderId::Discogs,
        ProviderId::Deezer,
        ProviderId::LastFm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Spotify => "spotify",
            ProviderId::MusicBrainz => "musicbrainz",
            ProviderId::Discogs => "discogs",
            ProviderId::Deezer => "deezer",
            ProviderId::LastFm => "lastfm",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

// ============================================================================
// Album identity
// ============================================================================

/// Album lookup key
///
/// Equality and hashing ignore case and collapse whitespace, so
/// `"Pink  Floyd"` and `"pink floyd"` name the same album.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumIdentity {
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl AlbumIdentity {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            year: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn normalized_artist(&self) -> String {
        normalize_text(&self.artist)
    }

    pub fn normalized_title(&self) -> String {
        normalize_text(&self.title)
    }

    /// Normalized (artist, title) material used for cache keys
    ///
    /// Year is not part of the key.
    pub fn key_material(&self) -> String {
        format!("{}\u{1f}{}", self.normalized_artist(), self.normalized_title())
    }
}

impl PartialEq for AlbumIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_artist() == other.normalized_artist()
            && self.normalized_title() == other.normalized_title()
            && self.year == other.year
    }
}

impl Eq for AlbumIdentity {}

impl Hash for AlbumIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_artist().hash(state);
        self.normalized_title().hash(state);
        self.year.hash(state);
    }
}

impl fmt::Display for AlbumIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} - {} ({})", self.artist, self.title, year),
            None => write!(f, "{} - {}", self.artist, self.title),
        }
    }
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Provider output
// ============================================================================

/// One raw genre string as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct RawGenreObservation {
    pub provider_id: ProviderId,
    pub raw_genre: String,
    /// Provider reliability weight, in (0, 1]
    pub provider_weight: f64,
}

/// Successful provider answer (also the per-provider cache value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider_id: ProviderId,
    pub genres: Vec<String>,
    pub weight: f64,
}

impl ProviderResponse {
    pub fn new(provider_id: ProviderId, genres: Vec<String>, weight: f64) -> Self {
        Self {
            provider_id,
            genres,
            weight,
        }
    }

    /// Raw observations, produced lazily
    pub fn observations(&self) -> impl Iterator<Item = RawGenreObservation> + '_ {
        self.genres.iter().map(move |genre| RawGenreObservation {
            provider_id: self.provider_id,
            raw_genre: genre.clone(),
            provider_weight: self.weight,
        })
    }
}

/// Why a provider abstained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    NotFound,
    ParseError,
    RateLimited,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkError => "network_error",
            FailureKind::NotFound => "not_found",
            FailureKind::ParseError => "parse_error",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Timeout => "timeout",
        }
    }
}

/// Provider failure (never fatal)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderFailure {
    /// Connection failure or unexpected HTTP status
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Provider has no usable match for the album
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response did not have the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Token bucket empty and caller asked to fail fast
    #[error("Rate limited")]
    RateLimited,

    /// Provider did not answer before the resolution deadline
    #[error("Timed out")]
    Timeout,
}

impl ProviderFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderFailure::NetworkError(_) => FailureKind::NetworkError,
            ProviderFailure::NotFound(_) => FailureKind::NotFound,
            ProviderFailure::ParseError(_) => FailureKind::ParseError,
            ProviderFailure::RateLimited => FailureKind::RateLimited,
            ProviderFailure::Timeout => FailureKind::Timeout,
        }
    }
}

/// How a caller wants to treat an empty token bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Wait for a token (bounded by the resolution timeout)
    #[default]
    Wait,
    /// Report `RateLimited` immediately
    FailFast,
}

// ============================================================================
// Scoring output
// ============================================================================

/// Taxonomy-mapped evidence from one provider
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub provider_id: ProviderId,
    pub canonical_genre: String,
    pub provider_weight: f64,
    /// 1.0 for a direct match, discounted per ancestor step
    pub observation_weight: f64,
}

impl NormalizedObservation {
    pub fn contribution(&self) -> f64 {
        self.provider_weight * self.observation_weight
    }
}

/// Aggregate evidence for one canonical genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreScore {
    pub canonical_genre: String,
    pub aggregate_score: f64,
    pub supporting_providers: BTreeSet<ProviderId>,
}

/// Automation decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoApply,
    NeedsReview,
    Skip,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::AutoApply => "auto_apply",
            Disposition::NeedsReview => "needs_review",
            Disposition::Skip => "skip",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal artifact of one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub album: AlbumIdentity,
    /// Descending by score, ties by genre name
    pub ranked_genres: Vec<GenreScore>,
    /// 0-100
    pub overall_confidence: f64,
    pub disposition: Disposition,
    pub sources_queried: BTreeSet<ProviderId>,
    pub sources_failed: BTreeSet<ProviderId>,
    #[serde(default)]
    pub failures: BTreeMap<ProviderId, FailureKind>,
    pub resolved_at: DateTime<Utc>,
}

impl AggregationResult {
    /// Result for a resolution where no provider succeeded
    pub fn empty(
        album: AlbumIdentity,
        sources_queried: BTreeSet<ProviderId>,
        failures: BTreeMap<ProviderId, FailureKind>,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            album,
            ranked_genres: Vec::new(),
            overall_confidence: 0.0,
            disposition: Disposition::Skip,
            sources_queried,
            sources_failed: failures.keys().copied().collect(),
            failures,
            resolved_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranked_genres.is_empty()
    }

    pub fn genre_names(&self) -> Vec<&str> {
        self.ranked_genres
            .iter()
            .map(|g| g.canonical_genre.as_str())
            .collect()
    }

    /// Ranked genres joined for a multi-value genre tag
    pub fn tag_value(&self, delimiter: &str) -> String {
        self.genre_names().join(delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_album_identity_equality_ignores_case_and_spacing() {
        let a = AlbumIdentity::new("Pink  Floyd", " The Dark Side of the Moon");
        let b = AlbumIdentity::new("pink floyd", "the dark side OF the moon ");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        assert_ne!(a, b.with_year(1973));
    }

    #[test]
    fn test_key_material_excludes_year() {
        let a = AlbumIdentity::new("Radiohead", "OK Computer");
        let b = AlbumIdentity::new("RADIOHEAD", "ok  computer").with_year(1997);
        assert_eq!(a.key_material(), b.key_material());
    }

    #[test]
    fn test_provider_id_round_trip_names() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!("LastFM".parse::<ProviderId>().unwrap(), ProviderId::LastFm);
        assert!("allmusic".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_provider_response_observations_carry_weight() {
        let response = ProviderResponse::new(
            ProviderId::Discogs,
            vec!["Rock".to_string(), "Blues Rock".to_string()],
            0.8,
        );
        let observations: Vec<_> = response.observations().collect();
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .all(|o| o.provider_id == ProviderId::Discogs && o.provider_weight == 0.8));
        assert_eq!(observations[1].raw_genre, "Blues Rock");
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            ProviderFailure::NetworkError("x".into()).kind(),
            FailureKind::NetworkError
        );
        assert_eq!(ProviderFailure::Timeout.kind(), FailureKind::Timeout);
        assert_eq!(ProviderFailure::RateLimited.kind(), FailureKind::RateLimited);
    }

    #[test]
    fn test_empty_result_is_skip() {
        let mut failures = BTreeMap::new();
        failures.insert(ProviderId::Deezer, FailureKind::NotFound);
        let queried: BTreeSet<_> = [ProviderId::Deezer].into_iter().collect();

        let result = AggregationResult::empty(
            AlbumIdentity::new("a", "b"),
            queried,
            failures,
            Utc::now(),
        );

        assert!(result.is_empty());
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.disposition, Disposition::Skip);
        assert!(result.sources_failed.contains(&ProviderId::Deezer));
    }

    #[test]
    fn test_result_serializes_with_provider_map_keys() {
        let mut failures = BTreeMap::new();
        failures.insert(ProviderId::LastFm, FailureKind::Timeout);
        let result = AggregationResult::empty(
            AlbumIdentity::new("a", "b"),
            [ProviderId::LastFm].into_iter().collect(),
            failures,
            Utc::now(),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["disposition"], "skip");
        assert_eq!(json["failures"]["lastfm"], "timeout");

        let back: AggregationResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
