//! HTTP plumbing shared by the provider adapters
//!
//! Maps transport errors, HTTP status codes and malformed bodies onto
//! `ProviderFailure` kinds, and selects the best search hit for an album.

use super::ProviderRateLimiter;
use crate::config::ProviderSettings;
use crate::types::{normalize_text, AlbumIdentity, ProviderFailure, ProviderId, Urgency};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Minimum average artist/title similarity for a search hit
pub const MIN_MATCH_SCORE: f64 = 0.7;

/// Connection, rate limit and identity shared by one adapter's requests
#[derive(Debug)]
pub struct HttpSource {
    id: ProviderId,
    weight: f64,
    base_url: String,
    credentials: Option<String>,
    client: Client,
    limiter: ProviderRateLimiter,
}

impl HttpSource {
    pub fn new(settings: &ProviderSettings, client: Client) -> Self {
        Self {
            id: settings.id,
            weight: settings.weight,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credentials: settings.credentials.clone(),
            client,
            limiter: ProviderRateLimiter::per_minute(settings.rate_limit_per_minute),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    /// Absolute URL for a path below the provider's base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET request builder
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    /// Take a rate-limit token, send, check status and decode JSON
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        urgency: Urgency,
    ) -> Result<T, ProviderFailure> {
        self.limiter.acquire(urgency).await?;

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();
        debug!(provider = %self.id, status = status.as_u16(), "Provider response");

        if let Some(failure) = status_failure(status) {
            return Err(failure);
        }

        let body = response.text().await.map_err(transport_failure)?;
        parse_json(&body)
    }
}

/// Classify a reqwest error
pub fn transport_failure(error: reqwest::Error) -> ProviderFailure {
    if error.is_timeout() {
        ProviderFailure::Timeout
    } else if error.is_decode() {
        ProviderFailure::ParseError(error.to_string())
    } else {
        ProviderFailure::NetworkError(error.to_string())
    }
}

/// Failure for a non-success HTTP status
pub fn status_failure(status: StatusCode) -> Option<ProviderFailure> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND => ProviderFailure::NotFound(format!("HTTP {}", status)),
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderFailure::Timeout,
        _ => ProviderFailure::NetworkError(format!("HTTP {}", status)),
    })
}

/// Decode a JSON body, mapping shape errors to `ParseError`
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ProviderFailure> {
    serde_json::from_str(body).map_err(|e| ProviderFailure::ParseError(e.to_string()))
}

/// Average Jaro-Winkler similarity of artist and title
pub fn match_score(album: &AlbumIdentity, artist: &str, title: &str) -> f64 {
    let artist_similarity =
        strsim::jaro_winkler(&album.normalized_artist(), &normalize_text(artist));
    let title_similarity = strsim::jaro_winkler(&album.normalized_title(), &normalize_text(title));
    (artist_similarity + title_similarity) / 2.0
}

/// Best-scoring candidate at or above `MIN_MATCH_SCORE`
///
/// Earlier candidates win ties (providers return hits by relevance).
pub fn best_match<'a, T, F>(
    album: &AlbumIdentity,
    candidates: &'a [T],
    fields: F,
) -> Result<&'a T, ProviderFailure>
where
    F: Fn(&T) -> (&str, &str),
{
    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let (artist, title) = fields(candidate);
        let score = match_score(album, artist, title);
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }

    match best {
        Some((candidate, score)) if score >= MIN_MATCH_SCORE => Ok(candidate),
        Some((_, score)) => Err(ProviderFailure::NotFound(format!(
            "No search hit for '{}' (best score {:.2})",
            album, score
        ))),
        None => Err(ProviderFailure::NotFound(format!(
            "No search results for '{}'",
            album
        ))),
    }
}

/// Trim, drop empties and case-insensitive duplicates, keep order
pub fn dedupe_genres<I, S>(genres: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for genre in genres {
        let trimmed = genre.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            result.push(trimmed.to_string());
        }
    }
    result
}

/// Empty genre list means the provider knows the album but has no genres
pub fn require_genres(
    genres: Vec<String>,
    album: &AlbumIdentity,
) -> Result<Vec<String>, ProviderFailure> {
    if genres.is_empty() {
        Err(ProviderFailure::NotFound(format!("No genres for '{}'", album)))
    } else {
        Ok(genres)
    }
}
