use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracklist_sync::config::{
    ResolveConfig, DEFAULT_CATALOG_MIN_INTERVAL, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_MAX_SEARCH_FAILURES, DEFAULT_MAX_WORKERS, DEFAULT_SCRAPE_MIN_INTERVAL, DEFAULT_SEARCH_LIMIT,
};
use tracklist_sync::confirm::{AutoRejectConfirmer, Confirmer, TerminalConfirmer};
use tracklist_sync::coordinator::Coordinator;
use tracklist_sync::error::ConfigError;
use tracklist_sync::models::{EpisodeRecord, ResolveStats};
use tracklist_sync::nts::NtsClient;
use tracklist_sync::pipeline::{BatchReport, Halt, Pipeline};
use tracklist_sync::progress::{format_duration, set_log_only};
use tracklist_sync::retry::RetryPass;
use tracklist_sync::scoring::LexicalScorer;
use tracklist_sync::spotify::SpotifyClient;
use tracklist_sync::store::ShowStore;
use tracklist_sync::sync::{resolve_episodes, scrape_show, sync_playlist};
use tracklist_sync::throttle::Throttle;

#[derive(Parser)]
#[command(name = "tracklist-sync")]
#[command(about = "Resolve NTS Radio show tracklists to Spotify tracks and build a playlist")]
struct Args {
    /// NTS show alias, e.g. "m00dtapes"
    show_alias: String,

    #[command(subcommand)]
    command: Command,

    /// Directory holding per-show state
    #[arg(long, global = true, env = "TRACKLIST_SYNC_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, global = true, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    #[arg(long, global = true, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// User access token with playlist-modify-private scope
    #[arg(long, global = true, env = "SPOTIFY_USER_TOKEN", hide_env_values = true)]
    user_token: Option<String>,

    /// Distances below this are accepted without asking
    #[arg(long, global = true, default_value_t = DEFAULT_LOW_THRESHOLD)]
    low_threshold: f64,

    /// Distances above this are rejected without asking
    #[arg(long, global = true, default_value_t = DEFAULT_HIGH_THRESHOLD)]
    high_threshold: f64,

    #[arg(long, global = true, default_value_t = DEFAULT_MAX_WORKERS)]
    workers: usize,

    /// Seconds between Spotify requests
    #[arg(long, global = true, default_value_t = DEFAULT_CATALOG_MIN_INTERVAL)]
    catalog_interval: f64,

    /// Seconds between NTS requests
    #[arg(long, global = true, default_value_t = DEFAULT_SCRAPE_MIN_INTERVAL)]
    scrape_interval: f64,

    /// Candidates requested per search
    #[arg(long, global = true, default_value_t = DEFAULT_SEARCH_LIMIT)]
    search_limit: usize,

    /// Consecutive search failures before the run is aborted
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_SEARCH_FAILURES)]
    max_search_failures: usize,

    /// Reject borderline matches instead of prompting
    #[arg(long, global = true)]
    no_confirm: bool,

    /// Log-only mode: hide progress bars, log periodically (for tail -f)
    #[arg(long, global = true)]
    log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long, global = true)]
    stats: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every episode, search each track on Spotify and save the results
    Scrape,
    /// Search again for tracks that are still unmatched
    Retry,
    /// Create a private Spotify playlist from the saved matches
    Playlist,
}

impl Args {
    fn config(&self) -> Result<ResolveConfig, ConfigError> {
        if self.show_alias.trim().is_empty() {
            return Err(ConfigError::EmptyShowAlias);
        }
        ResolveConfig {
            low_threshold: self.low_threshold,
            high_threshold: self.high_threshold,
            max_workers: self.workers,
            catalog_min_interval: self.catalog_interval,
            scrape_min_interval: self.scrape_interval,
            search_limit: self.search_limit,
            max_search_failures: self.max_search_failures,
            data_dir: self.data_dir.clone(),
        }
        .validate()
    }

    fn search_client(&self) -> Result<SpotifyClient> {
        let client_id = self
            .client_id
            .as_deref()
            .context("Missing Spotify client id (set SPOTIFY_CLIENT_ID)")?;
        let client_secret = self
            .client_secret
            .as_deref()
            .context("Missing Spotify client secret (set SPOTIFY_CLIENT_SECRET)")?;
        SpotifyClient::new(client_id, client_secret, self.user_token.clone())
            .context("Failed to build Spotify client")
    }

    fn confirmer(&self) -> Box<dyn Confirmer> {
        if self.no_confirm {
            Box::new(AutoRejectConfirmer)
        } else {
            Box::new(TerminalConfirmer::stdio())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracklist_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();
    set_log_only(args.log_only);

    let config = args.config().context("Invalid configuration")?;
    let store = ShowStore::new(&config.data_dir, &args.show_alias);
    let start = Instant::now();

    let stats = match args.command {
        Command::Scrape => run_scrape(&args, &config, &store)?,
        Command::Retry => run_retry(&args, &config, &store)?,
        Command::Playlist => {
            run_playlist(&args, &config, &store)?;
            None
        }
    };

    if let Some(stats) = stats {
        stats.log_phase("resolve");
        if let Some(path) = &args.stats {
            stats
                .write_to_file(path)
                .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        }
    }

    println!("  Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}

fn run_scrape(args: &Args, config: &ResolveConfig, store: &ShowStore) -> Result<Option<ResolveStats>> {
    let spotify = args.search_client()?;
    let nts = NtsClient::new().context("Failed to build NTS client")?;

    println!("{:=<60}", "");
    println!("Fetching episodes for {}...", store.show_alias());
    println!("{:=<60}", "");

    let scrape_throttle = Throttle::new("nts", config.scrape_interval());
    let scraped = scrape_show(
        &nts,
        store.show_alias(),
        &Coordinator::new(config.max_workers),
        &scrape_throttle,
        true,
    )
    .context("Failed to fetch episode listing")?;
    if scraped.failed_episodes > 0 {
        println!("  Skipped {} episodes that could not be fetched", scraped.failed_episodes);
    }

    let mut episodes = scraped.episodes;
    let track_total: usize = episodes.iter().map(|e| e.track_count).sum();
    println!("Searching {} tracks from {} episodes on Spotify...", track_total, episodes.len());

    let catalog_throttle = Throttle::new("spotify", config.catalog_interval());
    let pipeline = Pipeline::new(&spotify, &LexicalScorer, &catalog_throttle, config)?.with_progress(true);
    let confirmer = args.confirmer();
    let report = resolve_episodes(&pipeline, confirmer.as_ref(), &mut episodes);

    save_and_summarize(store, &episodes, &report)?;
    report.check_outage()?;
    Ok(Some(report.stats))
}

fn run_retry(args: &Args, config: &ResolveConfig, store: &ShowStore) -> Result<Option<ResolveStats>> {
    let mut episodes = store.load_tracklists().with_context(|| {
        format!(
            "Failed to load {} (run `scrape` first)",
            store.tracklists_path().display()
        )
    })?;

    let spotify = args.search_client()?;
    let catalog_throttle = Throttle::new("spotify", config.catalog_interval());
    let pipeline = Pipeline::new(&spotify, &LexicalScorer, &catalog_throttle, config)?.with_progress(true);
    let confirmer = args.confirmer();

    let retry = RetryPass::new(&pipeline, confirmer.as_ref()).run(&mut episodes);
    println!("  Tracks retried: {}", retry.retried);
    println!("  New matches found: {}", retry.new_matches);

    save_and_summarize(store, &episodes, &retry.batch)?;
    retry.check_outage()?;
    Ok(Some(retry.batch.stats))
}

fn run_playlist(args: &Args, config: &ResolveConfig, store: &ShowStore) -> Result<()> {
    let playlist = store.load_playlist().with_context(|| {
        format!(
            "Failed to load {} (run `scrape` or `retry` first)",
            store.playlist_path().display()
        )
    })?;
    let spotify = args.search_client()?;
    let catalog_throttle = Throttle::new("spotify", config.catalog_interval());

    println!("Creating playlist: {}", playlist.name);
    let playlist_id =
        sync_playlist(&spotify, &playlist, &catalog_throttle).context("Failed to create Spotify playlist")?;

    println!("\n{:=<60}", "");
    println!("Playlist created!");
    println!("  Playlist: {}", playlist.name);
    println!("  Total tracks: {}", playlist.uris.len());
    println!("  URL: https://open.spotify.com/playlist/{}", playlist_id);
    println!("{:=<60}", "");
    Ok(())
}

/// Persist whatever was resolved (also after a quit or outage) and print the summary.
fn save_and_summarize(store: &ShowStore, episodes: &[EpisodeRecord], report: &BatchReport) -> Result<()> {
    let playlist = store
        .save_all(episodes)
        .with_context(|| format!("Failed to save results in {}", store.dir().display()))?;

    let total_tracks: usize = episodes.iter().map(|e| e.track_count).sum();
    let matched: usize = episodes.iter().map(|e| e.matched_count()).sum();
    let rate = if total_tracks == 0 {
        0.0
    } else {
        100.0 * matched as f64 / total_tracks as f64
    };

    println!("\n{:=<60}", "");
    match report.halt {
        Some(Halt::UserQuit { at }) => println!("Stopped at user request (track {} of batch)", at + 1),
        Some(Halt::CatalogOutage { failures }) => {
            println!("Stopped after {} consecutive Spotify search failures", failures)
        }
        None => println!("Complete!"),
    }
    println!("  Episodes processed: {}", episodes.len());
    println!("  Total tracks: {}", total_tracks);
    println!("  Tracks found on Spotify: {}", matched);
    println!("  Match rate: {:.1}%", rate);
    println!(
        "  This run: {} of {} searched tracks matched ({:.1}%, {} confirmed by you)",
        report.stats.total_matches(),
        report.stats.total_tracks,
        report.stats.match_rate(),
        report.stats.human_matches
    );
    println!("  Full data saved to: {}", store.tracklists_path().display());
    println!("  Playlist URIs saved to: {} ({} tracks)", store.playlist_path().display(), playlist.total_tracks);
    println!("{:=<60}", "");
    Ok(())
}
