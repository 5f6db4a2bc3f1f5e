//! Last.fm adapter
//!
//! `album.getinfo` with autocorrect; top tags become genres. Requires an
//! API key. Last.fm reports errors inside a 200 body as `{error, message}`
//! and encodes a single tag as an object and no tags as an empty string.

use super::http::{dedupe_genres, match_score, require_genres, HttpSource, MIN_MATCH_SCORE};
use super::GenreProvider;
use crate::types::{AlbumIdentity, ProviderFailure, ProviderId, ProviderResponse, Urgency};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Last.fm error code: invalid parameters / album not found
const ERROR_NOT_FOUND: i64 = 6;

/// Last.fm error code: rate limit exceeded
const ERROR_RATE_LIMIT: i64 = 29;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum InfoResponse {
    Error { error: i64, message: String },
    Album { album: AlbumInfo },
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumInfo {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub tags: Option<TagField>,
}

/// `tags` is an object, or "" when the album has none
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TagField {
    Tags { tag: TagList },
    Empty(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TagList {
    Many(Vec<Tag>),
    One(Tag),
}

#[derive(Debug, Deserialize)]
pub(crate) struct Tag {
    pub name: String,
}

/// Genres from an `album.getinfo` response
pub(crate) fn extract_genres(
    album: &AlbumIdentity,
    response: InfoResponse,
) -> Result<Vec<String>, ProviderFailure> {
    let info = match response {
        InfoResponse::Error { error, message } => {
            return Err(match error {
                ERROR_NOT_FOUND => ProviderFailure::NotFound(message),
                ERROR_RATE_LIMIT => ProviderFailure::RateLimited,
                _ => ProviderFailure::NetworkError(format!("Last.fm error {}: {}", error, message)),
            });
        }
        InfoResponse::Album { album } => album,
    };

    // Autocorrect can land on a different album
    let score = match_score(album, &info.artist, &info.name);
    if score < MIN_MATCH_SCORE {
        return Err(ProviderFailure::NotFound(format!(
            "Last.fm returned '{} - {}' (score {:.2})",
            info.artist, info.name, score
        )));
    }

    let tags = match info.tags {
        Some(TagField::Tags { tag: TagList::Many(tags) }) => tags,
        Some(TagField::Tags { tag: TagList::One(tag) }) => vec![tag],
        Some(TagField::Empty(_)) | None => Vec::new(),
    };
    Ok(dedupe_genres(tags.iter().map(|t| t.name.as_str())))
}

/// Last.fm adapter
pub struct LastFmProvider {
    source: HttpSource,
}

impl LastFmProvider {
    pub fn new(source: HttpSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl GenreProvider for LastFmProvider {
    fn id(&self) -> ProviderId {
        ProviderId::LastFm
    }

    fn weight(&self) -> f64 {
        self.source.weight()
    }

    async fn fetch(
        &self,
        album: &AlbumIdentity,
        urgency: Urgency,
    ) -> Result<ProviderResponse, ProviderFailure> {
        let api_key = self
            .source
            .credentials()
            .ok_or_else(|| ProviderFailure::NetworkError("Last.fm API key not configured".into()))?;

        let response: InfoResponse = self
            .source
            .send_json(
                self.source.get("").query(&[
                    ("method", "album.getinfo"),
                    ("api_key", api_key),
                    ("artist", album.artist.as_str()),
                    ("album", album.title.as_str()),
                    ("autocorrect", "1"),
                    ("format", "json"),
                ]),
                urgency,
            )
            .await?;

        let genres = require_genres(extract_genres(album, response)?, album)?;
        Ok(ProviderResponse::new(self.id(), genres, self.weight()))
    }
}
