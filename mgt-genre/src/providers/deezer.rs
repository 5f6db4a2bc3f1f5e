//! Deezer adapter (no credentials)
//!
//! Album search, then album lookup for its genre list. Deezer reports
//! errors inside a 200 response as an `error` object.

use super::http::{best_match, dedupe_genres, require_genres, HttpSource};
use super::GenreProvider;
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Deezer error code for "no data"
const DATA_NOT_FOUND: i64 = 800;

/// Deezer error code for "quota exceeded"
const QUOTA_EXCEEDED: i64 = 4;

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumSearch {
    #[serde(default)]
    pub data: Vec<AlbumHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumHit {
    pub id: u64,
    pub title: String,
    pub artist: ArtistRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Album {
    #[serde(default)]
    pub genres: GenreList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenreList {
    #[serde(default)]
    pub data: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Genre {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Decode a Deezer body, surfacing embedded errors as failures
pub(crate) fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ProviderFailure> {
    if let Some(error) = body.get("error") {
        let error: ErrorBody = serde_json::from_value(error.clone())
            .map_err(|e| ProviderFailure::ParseError(e.to_string()))?;
        return Err(match error.code {
            DATA_NOT_FOUND => ProviderFailure::NotFound(error.message),
            QUOTA_EXCEEDED => ProviderFailure::RateLimited,
            _ => ProviderFailure::NetworkError(format!("Deezer error {}: {}", error.code, error.message)),
        });
    }
    serde_json::from_value(body).map_err(|e| ProviderFailure::ParseError(e.to_string()))
}

/// Deezer adapter
pub struct DeezerProvider {
    source: HttpSource,
}

impl DeezerProvider {
    pub fn new(source: HttpSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl GenreProvider for DeezerProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Deezer
    }

    fn weight(&self) -> f64 {
        self.source.weight()
    }

    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let query = format!("artist:\"{}\" album:\"{}\"", album.artist, album.title);
        let body: Value = self
            .source
            .send_json(
                self.source
                    .get("search/album")
                    .query(&[("q", query.as_str()), ("limit", "10")]),
                urgency,
            )
            .await?;
        let search: AlbumSearch = decode(body)?;

        let hit = best_match(album, &search.data, |hit| {
            (hit.artist.name.as_str(), hit.title.as_str())
        })?;
        debug!(provider = "deezer", album_id = hit.id, "Matched album");

        let body: Value = self
            .source
            .send_json(self.source.get(&format!("album/{}", hit.id)), urgency)
            .await?;
        let details: Album = decode(body)?;

        let genres = require_genres(
            dedupe_genres(details.genres.data.iter().map(|g| g.name.as_str())),
            album,
        )?;
        Ok(ProviderResponse::new(self.id(), genres, self.weight()))
    }
}
