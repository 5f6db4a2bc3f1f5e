//! Confidence Scorer
//!
//! Combines normalized observations into ranked genres and an overall
//! confidence percentage.
//!
//! **Per genre:** aggregate score = Σ over supporting providers of
//! provider weight × observation weight, where each provider contributes
//! at most once per genre (its strongest observation).
//!
//! **Overall confidence:** 100 × top score / max(Σ responding provider
//! weights, agreement weight), clamped to [0, 100].

use crate::config::ScoringConfig;
use crate::types::{GenreScore, NormalizedObservation, ProviderId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Scoring result
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    /// Descending by score, ties by name, at most `max_genres`
    pub ranked_genres: Vec<GenreScore>,
    /// 0-100
    pub overall_confidence: f64,
}

/// Weighted evidence combiner
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    /// Ranked genres kept (default 5)
    max_genres: usize,
    /// Weighted support required for full confidence (default 1.8)
    agreement_weight: f64,
}

impl ConfidenceScorer {
    pub fn new(scoring: &ScoringConfig) -> Self {
        Self {
            max_genres: scoring.max_genres,
            agreement_weight: scoring.agreement_weight,
        }
    }

    /// Score observations from the providers that responded
    ///
    /// `responding_weight` is the summed weight of every provider that
    /// returned a successful response, whether or not its genres matched.
    pub fn score(
        &self,
        observations: &[NormalizedObservation],
        responding_weight: f64,
    ) -> ScoreOutcome {
        // genre -> provider -> strongest contribution
        let mut evidence: BTreeMap<&str, BTreeMap<ProviderId, f64>> = BTreeMap::new();
        for observation in observations {
            let contribution = observation.contribution();
            let best = evidence
                .entry(observation.canonical_genre.as_str())
                .or_default()
                .entry(observation.provider_id)
                .or_insert(0.0);
            if contribution > *best {
                *best = contribution;
            }
        }

        let mut ranked: Vec<GenreScore> = evidence
            .into_iter()
            .map(|(genre, providers)| GenreScore {
                canonical_genre: genre.to_string(),
                aggregate_score: providers.values().sum(),
                supporting_providers: providers.keys().copied().collect::<BTreeSet<_>>(),
            })
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(self.max_genres);

        let overall_confidence = ranked
            .first()
            .map(|top| self.confidence(top.aggregate_score, responding_weight))
            .unwrap_or(0.0);

        ScoreOutcome {
            ranked_genres: ranked,
            overall_confidence,
        }
    }

    fn confidence(&self, top_score: f64, responding_weight: f64) -> f64 {
        let denominator = responding_weight.max(self.agreement_weight);
        if denominator <= 0.0 {
            return 0.0;
        }
        (100.0 * top_score / denominator).clamp(0.0, 100.0)
    }
}

/// Score descending, then name ascending
fn rank_order(a: &GenreScore, b: &GenreScore) -> Ordering {
    b.aggregate_score
        .total_cmp(&a.aggregate_score)
        .then_with(|| a.canonical_genre.cmp(&b.canonical_genre))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(provider: ProviderId, genre: &str, provider_weight: f64, weight: f64) -> NormalizedObservation {
        NormalizedObservation {
            provider_id: provider,
            canonical_genre: genre.to_string(),
            provider_weight,
            observation_weight: weight,
        }
    }

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(&ScoringConfig::default())
    }

    #[test]
    fn test_death_black_metal_shared_ancestor() {
        let observations = vec![
            obs(ProviderId::Spotify, "Death Metal", 1.0, 1.0),
            obs(ProviderId::Spotify, "Metal", 1.0, 0.6),
            obs(ProviderId::MusicBrainz, "Black Metal", 0.85, 1.0),
            obs(ProviderId::MusicBrainz, "Metal", 0.85, 0.6),
        ];
        let outcome = scorer().score(&observations, 1.85);

        let names: Vec<&str> = outcome
            .ranked_genres
            .iter()
            .map(|g| g.canonical_genre.as_str())
            .collect();
        assert_eq!(names, vec!["Metal", "Death Metal", "Black Metal"]);
        assert!((outcome.ranked_genres[0].aggregate_score - (0.6 + 0.85 * 0.6)).abs() < 1e-9);
        assert_eq!(outcome.ranked_genres[0].supporting_providers.len(), 2);
    }

    #[test]
    fn test_provider_contributes_once_per_genre() {
        let observations = vec![
            obs(ProviderId::Deezer, "Rock", 0.75, 0.6),
            obs(ProviderId::Deezer, "Rock", 0.75, 1.0),
            obs(ProviderId::Deezer, "Rock", 0.75, 0.36),
        ];
        let outcome = scorer().score(&observations, 0.75);
        assert_eq!(outcome.ranked_genres.len(), 1);
        assert!((outcome.ranked_genres[0].aggregate_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_by_name_and_truncate() {
        let genres = ["Jazz", "Blues", "Funk", "Soul", "Rock", "Ambient", "Pop"];
        let observations: Vec<_> = genres
            .iter()
            .map(|g| obs(ProviderId::LastFm, g, 0.7, 1.0))
            .collect();
        let outcome = scorer().score(&observations, 0.7);

        let names: Vec<&str> = outcome
            .ranked_genres
            .iter()
            .map(|g| g.canonical_genre.as_str())
            .collect();
        assert_eq!(names, vec!["Ambient", "Blues", "Funk", "Jazz", "Pop"]);
    }

    #[test]
    fn test_idempotent() {
        let observations = vec![
            obs(ProviderId::Spotify, "House", 1.0, 1.0),
            obs(ProviderId::Deezer, "Techno", 0.75, 1.0),
            obs(ProviderId::Deezer, "Electronic", 0.75, 0.6),
            obs(ProviderId::Spotify, "Electronic", 1.0, 0.6),
        ];
        let s = scorer();
        assert_eq!(s.score(&observations, 1.75), s.score(&observations, 1.75));
    }

    #[test]
    fn test_confidence_bounds() {
        let s = scorer();
        assert_eq!(s.score(&[], 0.0).overall_confidence, 0.0);

        // Single provider cannot reach full confidence alone
        let one = vec![obs(ProviderId::Spotify, "Rock", 1.0, 1.0)];
        let outcome = s.score(&one, 1.0);
        assert!((outcome.overall_confidence - 100.0 / 1.8).abs() < 1e-9);

        // Full agreement across all providers
        let all: Vec<_> = [
            (ProviderId::Spotify, 1.0),
            (ProviderId::MusicBrainz, 0.85),
            (ProviderId::Discogs, 0.8),
            (ProviderId::Deezer, 0.75),
            (ProviderId::LastFm, 0.7),
        ]
        .into_iter()
        .map(|(p, w)| obs(p, "Rock", w, 1.0))
        .collect();
        let outcome = s.score(&all, 4.1);
        assert!((outcome.overall_confidence - 100.0).abs() < 1e-9);
        assert!(outcome.overall_confidence <= 100.0);
    }

    #[test]
    fn test_silent_responders_dilute_confidence() {
        let s = scorer();
        let one = vec![obs(ProviderId::Spotify, "Rock", 1.0, 1.0)];
        let alone = s.score(&one, 1.0).overall_confidence;
        let diluted = s.score(&one, 3.0).overall_confidence;
        assert!(diluted < alone);
    }
}
