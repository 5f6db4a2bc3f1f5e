//! Discogs adapter
//!
//! Database search for releases; genres and styles of the best hit.
//! Requires a personal access token.

use super::http::{best_match, dedupe_genres, require_genres, HttpSource};
use super::GenreProvider;
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    /// "Artist - Title"
    pub title: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub style: Vec<String>,
}

impl SearchHit {
    /// Split the combined "Artist - Title" field
    pub fn artist_and_title(&self) -> (&str, &str) {
        match self.title.split_once(" - ") {
            Some((artist, title)) => (artist.trim(), title.trim()),
            None => ("", self.title.trim()),
        }
    }
}

/// Genres then styles of the best-matching hit
pub(crate) fn select_genres(
    album: &AlbumIdentity,
    search: &SearchResponse,
) -> Result<Vec<String>, ProviderFailure> {
    let best = best_match(album, &search.results, SearchHit::artist_and_title)?;
    Ok(dedupe_genres(best.genre.iter().chain(best.style.iter())))
}

/// Discogs adapter
pub struct DiscogsProvider {
    source: HttpSource,
}

impl DiscogsProvider {
    pub fn new(source: HttpSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl GenreProvider for DiscogsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Discogs
    }

    fn weight(&self) -> f64 {
        self.source.weight()
    }

    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let token = self
            .source
            .credentials()
            .ok_or_else(|| ProviderFailure::NetworkError("Discogs token not configured".into()))?;

        let search: SearchResponse = self
            .source
            .send_json(
                self.source
                    .get("database/search")
                    .header("Authorization", format!("Discogs token={}", token))
                    .query(&[
                        ("artist", album.artist.as_str()),
                        ("release_title", album.title.as_str()),
                        ("type", "release"),
                        ("per_page", "10"),
                    ]),
                urgency,
            )
            .await?;

        let genres = require_genres(select_genres(album, &search)?, album)?;
        Ok(ProviderResponse::new(self.id(), genres, self.weight()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::parse_json;
    use crate::types::FailureKind;

    const SEARCH_FIXTURE: &str = r#"{
        "pagination": {"page": 1, "pages": 1, "items": 2},
        "results": [
            {"title": "Portishead - Dummy", "year": "1994",
             "genre": ["Electronic"], "style": ["Trip Hop", "Downtempo"]},
            {"title": "Portishead - Third", "genre": ["Electronic", "Rock"], "style": []}
        ]
    }"#;

    #[test]
    fn test_genres_and_styles_of_best_hit() {
        let search: SearchResponse = parse_json(SEARCH_FIXTURE).unwrap();
        let album = AlbumIdentity::new("Portishead", "Dummy");
        assert_eq!(
            select_genres(&album, &search).unwrap(),
            vec!["Electronic", "Trip Hop", "Downtempo"]
        );
    }

    #[test]
    fn test_title_split() {
        let hit = SearchHit {
            title: "Sigur Rós - ( )".to_string(),
            genre: Vec::new(),
            style: Vec::new(),
        };
        assert_eq!(hit.artist_and_title(), ("Sigur Rós", "( )"));
    }

    #[test]
    fn test_empty_results_not_found() {
        let search: SearchResponse = parse_json(r#"{"results": []}"#).unwrap();
        let album = AlbumIdentity::new("Portishead", "Dummy");
        assert_eq!(
            select_genres(&album, &search).unwrap_err().kind(),
            FailureKind::NotFound
        );
    }
}
