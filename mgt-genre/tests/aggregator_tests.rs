//! Resolution pipeline tests over scripted providers

mod helpers;

use helpers::log_capture::capture_logs;
use helpers::{album, engine_with, MockProvider};
use mgt_common::time::ManualClock;
use mgt_genre::aggregator::Aggregator;
use mgt_genre::cache::{MemoryStore, ResponseCache};
use mgt_genre::config::{ScoringConfig, ThresholdConfig};
use mgt_genre::normalizer::VocabularyNormalizer;
use mgt_genre::policy::DecisionPolicy;
use mgt_genre::scorer::ConfidenceScorer;
use mgt_genre::taxonomy::Taxonomy;
use mgt_genre::{AlbumIdentity, Disposition, EngineConfig, FailureKind, ProviderFailure, ProviderId, Urgency};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::default())
}

fn subset(ids: &[ProviderId]) -> BTreeSet<ProviderId> {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn test_partial_failure_still_produces_ranked_genres() {
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["death metal"]),
        MockProvider::genres(ProviderId::MusicBrainz, 0.85, &["Black Metal"]),
        MockProvider::failing(
            ProviderId::Discogs,
            0.8,
            ProviderFailure::NetworkError("connection reset".to_string()),
        ),
        MockProvider::failing(
            ProviderId::Deezer,
            0.75,
            ProviderFailure::NetworkError("dns failure".to_string()),
        ),
        MockProvider::failing(
            ProviderId::LastFm,
            0.7,
            ProviderFailure::NotFound("no album".to_string()),
        ),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    let result = engine.resolve(&album()).await;

    assert_eq!(result.sources_queried.len(), 5);
    assert_eq!(
        result.sources_failed,
        subset(&[ProviderId::Discogs, ProviderId::Deezer, ProviderId::LastFm])
    );
    assert_eq!(result.failures[&ProviderId::Discogs], FailureKind::NetworkError);
    assert_eq!(result.failures[&ProviderId::LastFm], FailureKind::NotFound);

    assert_eq!(result.genre_names(), vec!["Metal", "Death Metal", "Black Metal"]);
    let metal = &result.ranked_genres[0];
    assert!((metal.aggregate_score - (0.6 + 0.85 * 0.6)).abs() < 1e-9);
    assert_eq!(
        metal.supporting_providers,
        subset(&[ProviderId::Spotify, ProviderId::MusicBrainz])
    );

    // 100 * 1.11 / 1.85
    assert!((result.overall_confidence - 60.0).abs() < 1e-9);
    assert_eq!(result.disposition, Disposition::Skip);
}

#[tokio::test]
async fn test_all_providers_failing_yields_empty_uncached_result() {
    let providers = vec![
        MockProvider::failing(
            ProviderId::Spotify,
            1.0,
            ProviderFailure::NetworkError("down".to_string()),
        ),
        MockProvider::failing(ProviderId::Deezer, 0.75, ProviderFailure::RateLimited),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    let result = engine.resolve(&album()).await;
    assert!(result.is_empty());
    assert_eq!(result.overall_confidence, 0.0);
    assert_eq!(result.disposition, Disposition::Skip);
    assert_eq!(result.sources_failed, result.sources_queried);
    assert_eq!(result.failures[&ProviderId::Deezer], FailureKind::RateLimited);

    engine.resolve(&album()).await;
    assert_eq!(providers[0].calls(), 2);
    assert_eq!(providers[1].calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out_without_blocking_others() {
    let config = EngineConfig {
        resolution_timeout_secs: 2,
        ..EngineConfig::default()
    };
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Progressive Metal", "Death Metal"]),
        MockProvider::hanging(ProviderId::Deezer, 0.75),
    ];
    let engine = engine_with(config, &providers, clock()).await;

    let started = tokio::time::Instant::now();
    let result = engine.resolve(&album()).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));
    assert_eq!(result.failures[&ProviderId::Deezer], FailureKind::Timeout);
    assert!(!result.sources_failed.contains(&ProviderId::Spotify));
    assert_eq!(
        result.genre_names(),
        vec!["Death Metal", "Progressive Metal", "Metal"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_providers_are_queried_concurrently() {
    let delay = Duration::from_secs(1);
    let providers: Vec<_> = [
        (ProviderId::Spotify, "Rock"),
        (ProviderId::MusicBrainz, "Hard Rock"),
        (ProviderId::Deezer, "Rock"),
    ]
    .into_iter()
    .map(|(id, genre)| {
        Arc::new(
            MockProvider::new(id, 0.9, helpers::Outcome::Genres(vec![genre.to_string()]))
                .with_delay(delay),
        )
    })
    .collect();
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    let started = tokio::time::Instant::now();
    let result = engine.resolve(&album()).await;

    assert!(started.elapsed() < delay * 2);
    assert_eq!(result.genre_names()[0], "Rock");
    assert_eq!(result.ranked_genres[0].supporting_providers.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resolutions_share_providers() {
    let provider = Arc::new(
        MockProvider::new(
            ProviderId::Spotify,
            1.0,
            helpers::Outcome::Genres(vec!["Jazz".to_string()]),
        )
        .with_delay(Duration::from_millis(500)),
    );
    let engine = engine_with(EngineConfig::default(), &[provider.clone()], clock()).await;

    let albums: Vec<AlbumIdentity> = (0..8)
        .map(|i| AlbumIdentity::new("Miles Davis", format!("Session {}", i)))
        .collect();
    let started = tokio::time::Instant::now();
    let results = futures::future::join_all(albums.iter().map(|a| engine.resolve(a))).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(provider.calls(), 8);
    for (result, album) in results.iter().zip(&albums) {
        assert_eq!(&result.album, album);
        assert_eq!(result.genre_names(), vec!["Jazz"]);
    }
}

#[tokio::test]
async fn test_aggregate_cache_hit_skips_providers() {
    let clock = clock();
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Jazz"]),
        MockProvider::genres(ProviderId::Deezer, 0.75, &["Bebop"]),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock.clone()).await;

    let first = engine.resolve(&album()).await;
    let requested = AlbumIdentity::new("OPETH", "blackwater  park");
    let again = engine.resolve(&requested).await;

    assert_eq!(again.album, requested);
    assert_eq!(again.ranked_genres, first.ranked_genres);
    assert_eq!(again.resolved_at, first.resolved_at);
    assert_eq!(providers[0].calls(), 1);
    assert_eq!(providers[1].calls(), 1);

    clock.advance(Duration::from_secs(3601));
    engine.resolve(&album()).await;
    assert_eq!(providers[0].calls(), 2);
    assert_eq!(providers[1].calls(), 2);
}

#[tokio::test]
async fn test_provider_cache_reused_across_provider_sets() {
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Jazz"]),
        MockProvider::genres(ProviderId::MusicBrainz, 0.85, &["Cool Jazz"]),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    engine
        .resolve_with(&album(), &subset(&[ProviderId::Spotify]), Urgency::Wait)
        .await;
    let both = engine
        .resolve_with(
            &album(),
            &subset(&[ProviderId::Spotify, ProviderId::MusicBrainz]),
            Urgency::Wait,
        )
        .await;

    assert_eq!(providers[0].calls(), 1);
    assert_eq!(providers[1].calls(), 1);
    assert_eq!(both.ranked_genres[0].canonical_genre, "Jazz");
    assert_eq!(both.ranked_genres[0].supporting_providers.len(), 2);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Funk"]),
        MockProvider::failing(ProviderId::Discogs, 0.8, ProviderFailure::Timeout),
        MockProvider::genres(ProviderId::Deezer, 0.75, &["Funk"]),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    engine
        .resolve_with(
            &album(),
            &subset(&[ProviderId::Spotify, ProviderId::Discogs]),
            Urgency::Wait,
        )
        .await;
    engine
        .resolve_with(
            &album(),
            &subset(&[ProviderId::Spotify, ProviderId::Discogs, ProviderId::Deezer]),
            Urgency::Wait,
        )
        .await;

    assert_eq!(providers[0].calls(), 1);
    assert_eq!(providers[1].calls(), 2);
    assert_eq!(providers[2].calls(), 1);
}

#[tokio::test]
async fn test_threshold_update_applies_to_next_resolution() {
    let providers = vec![MockProvider::genres(ProviderId::Spotify, 1.0, &["Soul"])];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    // 100 * 1.0 / 1.8
    let before = engine.resolve(&AlbumIdentity::new("Aretha Franklin", "Lady Soul")).await;
    assert!((before.overall_confidence - 100.0 / 1.8).abs() < 1e-9);
    assert_eq!(before.disposition, Disposition::Skip);

    engine
        .update_thresholds(ThresholdConfig::new(90.0, 50.0))
        .unwrap();
    let after = engine.resolve(&AlbumIdentity::new("Aretha Franklin", "Young, Gifted and Black")).await;
    assert_eq!(after.disposition, Disposition::NeedsReview);

    engine
        .update_thresholds(ThresholdConfig::new(55.0, 40.0))
        .unwrap();
    let auto = engine.resolve(&AlbumIdentity::new("Aretha Franklin", "Spirit in the Dark")).await;
    assert_eq!(auto.disposition, Disposition::AutoApply);

    assert!(engine.update_thresholds(ThresholdConfig::new(10.0, 20.0)).is_err());
    assert_eq!(engine.thresholds(), ThresholdConfig::new(55.0, 40.0));
}

#[tokio::test]
async fn test_cached_result_is_redecided_under_new_thresholds() {
    let providers = vec![MockProvider::genres(ProviderId::Spotify, 1.0, &["Soul"])];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;
    let lady_soul = AlbumIdentity::new("Aretha Franklin", "Lady Soul");

    let before = engine.resolve(&lady_soul).await;
    assert_eq!(before.disposition, Disposition::Skip);

    engine
        .update_thresholds(ThresholdConfig::new(55.0, 40.0))
        .unwrap();
    let after = engine.resolve(&lady_soul).await;

    assert_eq!(providers[0].calls(), 1);
    assert_eq!(after.overall_confidence, before.overall_confidence);
    assert_eq!(after.disposition, Disposition::AutoApply);

    engine
        .update_thresholds(ThresholdConfig::new(95.0, 80.0))
        .unwrap();
    assert_eq!(engine.resolve(&lady_soul).await.disposition, Disposition::Skip);
}

#[tokio::test]
async fn test_cached_result_reports_requested_identity() {
    let providers = vec![MockProvider::genres(ProviderId::Deezer, 0.75, &["Death Metal"])];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    let original = AlbumIdentity::new("Opeth", "Blackwater Park").with_year(1999);
    let reissue = AlbumIdentity::new("Opeth", "Blackwater Park").with_year(2005);

    let first = engine.resolve(&original).await;
    let second = engine.resolve(&reissue).await;

    assert_eq!(providers[0].calls(), 1);
    assert_eq!(first.album.year, Some(1999));
    assert_eq!(second.album, reissue);
    assert_eq!(second.album.year, Some(2005));
    assert_eq!(second.ranked_genres, first.ranked_genres);
}

#[tokio::test]
async fn test_oversized_timeout_does_not_overflow_deadline() {
    let provider = MockProvider::genres(ProviderId::Spotify, 1.0, &["Ska"]);
    let aggregator = Aggregator::new(
        helpers::as_dyn(&[provider.clone()]),
        Arc::new(VocabularyNormalizer::new(
            Arc::new(Taxonomy::builtin().unwrap()),
            &ScoringConfig::default(),
        )),
        ConfidenceScorer::new(&ScoringConfig::default()),
        DecisionPolicy::new(ThresholdConfig::default()).unwrap(),
        ResponseCache::new(
            Arc::new(MemoryStore::new()),
            clock(),
            Duration::from_secs(900),
            Duration::from_secs(3600),
        ),
        Duration::MAX,
    );

    let result = aggregator
        .resolve(&album(), &subset(&[ProviderId::Spotify]), Urgency::Wait)
        .await;
    assert_eq!(result.genre_names(), vec!["Ska", "Reggae"]);
    assert!(result.sources_failed.is_empty());
}

#[tokio::test]
async fn test_unmatched_genres_count_towards_responding_weight() {
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Reggae"]),
        MockProvider::genres(ProviderId::Deezer, 1.0, &["zzqx nonsense tag"]),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    let result = engine.resolve(&album()).await;
    assert!(result.sources_failed.is_empty());
    assert_eq!(result.genre_names(), vec!["Reggae"]);
    assert!((result.overall_confidence - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_failures_are_logged_by_severity() {
    let (logs, _guard) = capture_logs();
    let providers = vec![
        MockProvider::genres(ProviderId::Spotify, 1.0, &["Blues"]),
        MockProvider::failing(
            ProviderId::LastFm,
            0.7,
            ProviderFailure::NotFound("no album".to_string()),
        ),
        MockProvider::failing(
            ProviderId::Discogs,
            0.8,
            ProviderFailure::ParseError("unexpected payload".to_string()),
        ),
    ];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;

    engine.resolve(&album()).await;

    let warned = logs.matching(Level::WARN, "Provider failed");
    assert_eq!(warned.len(), 1);
    assert_eq!(warned[0].field("provider"), Some("discogs"));
    logs.assert_contains(Level::DEBUG, "Provider has no match");
    logs.assert_contains(Level::INFO, "Genres resolved");
}

#[tokio::test]
async fn test_shutdown_closes_engine() {
    let providers = vec![MockProvider::genres(ProviderId::Spotify, 1.0, &["Ska"])];
    let engine = engine_with(EngineConfig::default(), &providers, clock()).await;
    engine.resolve(&album()).await;
    engine.shutdown().await.unwrap();
}
