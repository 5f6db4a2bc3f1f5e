//! Vocabulary Normalizer
//!
//! Maps provider genre strings onto the canonical taxonomy:
//! 1. Exact match on the normalized alias key
//! 2. Fuzzy match (normalized Levenshtein) against every alias key
//! 3. Below the similarity threshold the string is discarded
//!
//! A match expands to the genre plus its ancestor chain, each ancestor
//! discounted by `ancestor_discount` per step.

use crate::config::ScoringConfig;
use crate::taxonomy::{alias_key, Taxonomy};
use crate::types::{NormalizedObservation, ProviderResponse, RawGenreObservation};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Similarities closer than this are treated as a tie
const SIMILARITY_EPSILON: f64 = 1e-9;

/// Separator between genres packed into a single tag value
const COMPOUND_SEPARATOR: char = ';';

/// Canonical genre with its specificity weight
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGenre {
    pub name: String,
    /// 1.0 for the matched genre, discounted for ancestors
    pub weight: f64,
}

/// Taxonomy-backed genre normalizer
#[derive(Debug, Clone)]
pub struct VocabularyNormalizer {
    taxonomy: Arc<Taxonomy>,
    ancestor_discount: f64,
    fuzzy_threshold: f64,
}

impl VocabularyNormalizer {
    pub fn new(taxonomy: Arc<Taxonomy>, scoring: &ScoringConfig) -> Self {
        Self {
            taxonomy,
            ancestor_discount: scoring.ancestor_discount,
            fuzzy_threshold: scoring.fuzzy_threshold,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Canonical genres for one raw string (empty if no match)
    ///
    /// The matched genre comes first, followed by its ancestors nearest
    /// first.
    pub fn normalize(&self, raw: &str) -> Vec<NormalizedGenre> {
        let Some(matched) = self.match_genre(raw) else {
            return Vec::new();
        };

        let mut result = vec![NormalizedGenre {
            name: matched.to_string(),
            weight: 1.0,
        }];
        let mut weight = 1.0;
        for ancestor in self.taxonomy.ancestors(matched) {
            weight *= self.ancestor_discount;
            result.push(NormalizedGenre {
                name: ancestor.name.clone(),
                weight,
            });
        }
        result
    }

    /// Normalize several raw values, splitting `;`-joined tag values
    ///
    /// Results are merged per canonical genre keeping the strongest weight,
    /// returned in name order.
    pub fn normalize_all<'a, I>(&self, raws: I) -> Vec<NormalizedGenre>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut merged: BTreeMap<String, f64> = BTreeMap::new();
        for raw in raws {
            for part in raw.split(COMPOUND_SEPARATOR) {
                if part.trim().is_empty() {
                    continue;
                }
                for genre in self.normalize(part) {
                    let entry = merged.entry(genre.name).or_insert(0.0);
                    if genre.weight > *entry {
                        *entry = genre.weight;
                    }
                }
            }
        }

        merged
            .into_iter()
            .map(|(name, weight)| NormalizedGenre { name, weight })
            .collect()
    }

    /// Normalized evidence for one provider response, per raw genre string
    pub fn observe(&self, response: &ProviderResponse) -> Vec<NormalizedObservation> {
        response
            .observations()
            .flat_map(|raw| {
                let RawGenreObservation {
                    provider_id,
                    raw_genre,
                    provider_weight,
                } = raw;
                self.normalize_all([raw_genre.as_str()])
                    .into_iter()
                    .map(move |genre| NormalizedObservation {
                        provider_id,
                        canonical_genre: genre.name,
                        provider_weight,
                        observation_weight: genre.weight,
                    })
            })
            .collect()
    }

    /// Canonical genre name for a raw string
    pub fn match_genre(&self, raw: &str) -> Option<&str> {
        let key = alias_key(raw);
        if key.is_empty() {
            return None;
        }

        if let Some(name) = self.taxonomy.lookup_key(&key) {
            return Some(name);
        }

        self.fuzzy_match(raw, &key)
    }

    fn fuzzy_match(&self, raw: &str, key: &str) -> Option<&str> {
        let mut best_similarity = 0.0_f64;
        let mut candidates: BTreeSet<&str> = BTreeSet::new();

        for (alias, name) in self.taxonomy.alias_keys() {
            let similarity = strsim::normalized_levenshtein(key, alias);
            if similarity > best_similarity + SIMILARITY_EPSILON {
                best_similarity = similarity;
                candidates.clear();
                candidates.insert(name);
            } else if (similarity - best_similarity).abs() <= SIMILARITY_EPSILON {
                candidates.insert(name);
            }
        }

        if best_similarity < self.fuzzy_threshold {
            debug!(
                raw = raw,
                best_similarity = best_similarity,
                "Genre discarded: no alias above similarity threshold"
            );
            return None;
        }

        // BTreeSet order gives the alphabetically-first canonical name
        let chosen = candidates.iter().next().copied()?;
        if candidates.len() > 1 {
            let unrelated = candidates
                .iter()
                .any(|other| !self.taxonomy.are_related(chosen, other));
            let others: Vec<&str> = candidates.iter().skip(1).copied().collect();
            if unrelated {
                warn!(
                    raw = raw,
                    chosen = chosen,
                    candidates = ?others,
                    similarity = best_similarity,
                    "Ambiguous genre match across unrelated genres"
                );
            } else {
                debug!(
                    raw = raw,
                    chosen = chosen,
                    candidates = ?others,
                    similarity = best_similarity,
                    "Ambiguous genre match within one family"
                );
            }
        } else {
            debug!(
                raw = raw,
                matched = chosen,
                similarity = best_similarity,
                "Fuzzy matched genre"
            );
        }

        Some(chosen)
    }
}
