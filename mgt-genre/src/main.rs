//! mgt-genre - command-line front end for the genre engine
//!
//! Subcommands:
//! - `resolve`: resolve one album and print the result as JSON
//! - `normalize`: show canonical genres for raw genre strings
//! - `check-config`: validate configuration and taxonomy, then exit

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mgt_genre::normalizer::VocabularyNormalizer;
use mgt_genre::taxonomy::Taxonomy;
use mgt_genre::{AlbumIdentity, EngineConfig, GenreEngine, ProviderId, Urgency};
use tracing::info;

/// Command-line arguments for mgt-genre
#[derive(Parser, Debug)]
#[command(name = "mgt-genre")]
#[command(about = "Multi-source genre aggregation for music libraries")]
#[command(version)]
struct Args {
    /// Configuration file (overrides MGT_CONFIG and ~/.config/mgt/genre.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve genres for one album
    Resolve {
        #[arg(short, long)]
        artist: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        year: Option<i32>,

        /// Comma-separated provider subset (default: all enabled)
        #[arg(short, long, value_delimiter = ',')]
        providers: Vec<ProviderId>,

        /// Report RateLimited instead of waiting for a token
        #[arg(long)]
        fail_fast: bool,
    },

    /// Map raw genre strings onto the taxonomy
    Normalize {
        #[arg(required = true)]
        genres: Vec<String>,
    },

    /// Validate configuration and taxonomy
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = EngineConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    mgt_common::config::init_tracing(&config.logging, "mgt_genre")
        .context("Failed to initialize logging")?;

    info!(
        "mgt-genre {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match args.command {
        Command::Resolve {
            artist,
            title,
            year,
            providers,
            fail_fast,
        } => resolve(config, artist, title, year, providers, fail_fast).await,
        Command::Normalize { genres } => normalize(&config, &genres),
        Command::CheckConfig => check_config(&config),
    }
}

async fn resolve(
    config: EngineConfig,
    artist: String,
    title: String,
    year: Option<i32>,
    providers: Vec<ProviderId>,
    fail_fast: bool,
) -> Result<()> {
    let delimiter = config.genre_delimiter.clone();
    let default_urgency = config.rate_limit_mode;
    let engine = GenreEngine::start(config)
        .await
        .context("Failed to start genre engine")?;

    let mut album = AlbumIdentity::new(artist, title);
    if let Some(year) = year {
        album = album.with_year(year);
    }

    let subset: BTreeSet<ProviderId> = if providers.is_empty() {
        engine.enabled_providers().clone()
    } else {
        providers.into_iter().collect()
    };
    let urgency = if fail_fast {
        Urgency::FailFast
    } else {
        default_urgency
    };

    let result = engine.resolve_with(&album, &subset, urgency).await;
    engine.shutdown().await.context("Shutdown failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("GENRE={}", result.tag_value(&delimiter));
    Ok(())
}

fn normalize(config: &EngineConfig, genres: &[String]) -> Result<()> {
    let taxonomy = Taxonomy::load(&config.taxonomy).context("Invalid taxonomy")?;
    let normalizer = VocabularyNormalizer::new(Arc::new(taxonomy), &config.scoring);

    for raw in genres {
        let matched = normalizer.normalize_all([raw.as_str()]);
        if matched.is_empty() {
            println!("{:<30} -> (no match)", raw);
            continue;
        }
        let rendered: Vec<String> = matched
            .iter()
            .map(|g| format!("{} ({:.2})", g.name, g.weight))
            .collect();
        println!("{:<30} -> {}", raw, rendered.join(", "));
    }
    Ok(())
}

fn check_config(config: &EngineConfig) -> Result<()> {
    let taxonomy = Taxonomy::load(&config.taxonomy).context("Invalid taxonomy")?;

    println!("Configuration OK");
    println!("  taxonomy genres:   {}", taxonomy.len());
    println!(
        "  thresholds:        auto_apply_at={} review_at={}",
        config.thresholds.auto_apply_at, config.thresholds.review_at
    );
    println!(
        "  cache:             {}",
        config
            .cache
            .database_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );
    for id in ProviderId::ALL {
        let settings = config.provider_settings(id);
        println!(
            "  {:<12} enabled={:<5} weight={:.2} rate_limit={}/min",
            id.as_str(),
            settings.enabled,
            settings.weight,
            settings.rate_limit_per_minute
        );
    }
    Ok(())
}
