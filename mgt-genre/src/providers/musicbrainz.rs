//! MusicBrainz adapter
//!
//! Release search, then a release lookup with tags and genres for both
//! the release and its release group. Curated genres are always kept;
//! folksonomy tags need `MIN_TAG_VOTES` votes.
//!
//! API Documentation: https://musicbrainz.org/doc/MusicBrainz_API

use super::http::{best_match, dedupe_genres, require_genres, HttpSource};
use super::GenreProvider;
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Votes a free-form tag needs before it counts as a genre
const MIN_TAG_VOTES: u32 = 2;

/// Genres kept per release
const MAX_GENRES: usize = 10;

#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseSearch {
    #[serde(default)]
    pub releases: Vec<ReleaseHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseHit {
    pub id: String,
    pub title: String,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistCredit {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Release {
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(rename = "release-group")]
    pub release_group: Option<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseGroup {
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Tag {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

/// MusicBrainz adapter
pub struct MusicBrainzProvider {
    source: HttpSource,
}

impl MusicBrainzProvider {
    pub fn new(source: HttpSource) -> Self {
        Self { source }
    }
}

/// Lucene query for the release search endpoint
pub(crate) fn search_query(album: &AlbumIdentity) -> String {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "release:\"{}\" AND artist:\"{}\"",
        escape(&album.title),
        escape(&album.artist)
    )
}

/// Release id of the best-matching search hit
pub(crate) fn select_release(
    album: &AlbumIdentity,
    search: &ReleaseSearch,
) -> Result<String, ProviderFailure> {
    let candidates: Vec<&ReleaseHit> = search
        .releases
        .iter()
        .filter(|hit| !hit.artist_credit.is_empty())
        .collect();
    let best = best_match(album, &candidates, |hit| {
        (hit.artist_credit[0].name.as_str(), hit.title.as_str())
    })?;
    Ok(best.id.clone())
}

/// Genre strings from a release lookup, strongest first
pub(crate) fn extract_genres(release: &Release) -> Vec<String> {
    let mut weighted: Vec<Tag> = Vec::new();
    let groups = release.release_group.iter();

    weighted.extend(release.genres.iter().cloned());
    weighted.extend(groups.clone().flat_map(|g| g.genres.iter().cloned()));
    weighted.extend(
        release
            .tags
            .iter()
            .chain(groups.flat_map(|g| g.tags.iter()))
            .filter(|tag| tag.count >= MIN_TAG_VOTES)
            .cloned(),
    );

    // Stable sort keeps curated genres ahead of tags with equal votes
    weighted.sort_by(|a, b| b.count.cmp(&a.count));

    let mut genres = dedupe_genres(weighted.iter().map(|t| t.name.as_str()));
    genres.truncate(MAX_GENRES);
    genres
}

#[async_trait]
impl GenreProvider for MusicBrainzProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MusicBrainz
    }

    fn weight(&self) -> f64 {
        self.source.weight()
    }

    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let query = search_query(album);
        let search: ReleaseSearch = self
            .source
            .send_json(
                self.source
                    .get("release")
                    .query(&[("query", query.as_str()), ("limit", "10"), ("fmt", "json")]),
                urgency,
            )
            .await?;

        let release_id = select_release(album, &search)?;
        debug!(provider = "musicbrainz", release_id = %release_id, "Matched release");

        let release: Release = self
            .source
            .send_json(
                self.source.get(&format!("release/{}", release_id)).query(&[
                    ("inc", "release-groups+tags+genres"),
                    ("fmt", "json"),
                ]),
                urgency,
            )
            .await?;

        let genres = require_genres(extract_genres(&release), album)?;
        Ok(ProviderResponse::new(self.id(), genres, self.weight()))
    }
}
