//! Spotify Web API adapter
//!
//! Album search, then the primary artist's genres (Spotify does not
//! populate album genres). Requires a pre-issued bearer token.

use super::http::{best_match, dedupe_genres, require_genres, HttpSource};
use super::GenreProvider;
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const SEARCH_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub albums: AlbumPage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumPage {
    #[serde(default)]
    pub items: Vec<AlbumItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumItem {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Artist {
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Spotify adapter
pub struct SpotifyProvider {
    source: HttpSource,
}

impl SpotifyProvider {
    pub fn new(source: HttpSource) -> Self {
        Self { source }
    }

    fn token(&self) -> Result<&str, ProviderFailure> {
        self.source
            .credentials()
            .ok_or_else(|| ProviderFailure::NetworkError("Spotify token not configured".into()))
    }
}

/// Primary artist id of the best-matching album
pub(crate) fn select_artist_id(
    album: &AlbumIdentity,
    search: &SearchResponse,
) -> Result<String, ProviderFailure> {
    let candidates: Vec<&AlbumItem> = search
        .albums
        .items
        .iter()
        .filter(|item| !item.artists.is_empty())
        .collect();
    let best = best_match(album, &candidates, |item| {
        (item.artists[0].name.as_str(), item.name.as_str())
    })?;
    Ok(best.artists[0].id.clone())
}

#[async_trait]
impl GenreProvider for SpotifyProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Spotify
    }

    fn weight(&self) -> f64 {
        self.source.weight()
    }

    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let token = self.token()?;
        let query = format!("album:\"{}\" artist:\"{}\"", album.title, album.artist);

        let search: SearchResponse = self
            .source
            .send_json(
                self.source
                    .get("search")
                    .bearer_auth(token)
                    .query(&[("q", query.as_str()), ("type", "album"), ("limit", SEARCH_LIMIT)]),
                urgency,
            )
            .await?;

        let artist_id = select_artist_id(album, &search)?;
        debug!(provider = "spotify", artist_id = %artist_id, "Matched album");

        let artist: Artist = self
            .source
            .send_json(
                self.source
                    .get(&format!("artists/{}", artist_id))
                    .bearer_auth(token),
                urgency,
            )
            .await?;

        let genres = require_genres(dedupe_genres(artist.genres), album)?;
        Ok(ProviderResponse::new(self.id(), genres, self.weight()))
    }
}
