use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use local_music_importer::aggregate::{aggregate, ReconciliationReport};
use local_music_importer::config::{Credentials, ReconcileConfig, SpotifyConfig, MAX_NUMBER_OF_TRACKS};
use local_music_importer::engine::Reconciler;
use local_music_importer::error::ConfigError;
use local_music_importer::listing::load_local_names;
use local_music_importer::match_log::MatchLog;
use local_music_importer::progress::{create_progress_bar, create_spinner, format_duration, set_log_only};
use local_music_importer::publish::{publish, PlaylistTarget};
use local_music_importer::safety::validate_log_path;
use local_music_importer::scoring::{SimilarityMetric, Threshold};
use local_music_importer::search::{RetryingSearcher, DEFAULT_CANDIDATE_LIMIT};
use local_music_importer::spotify::{SpotifyClient, SpotifyPublisher};

#[derive(Parser)]
#[command(name = "local-music-importer")]
#[command(about = "Match local audio files against the Spotify catalog and collect them in a playlist")]
struct Args {
    /// Directory with the music files (asked for on stdin when omitted)
    dir: Option<PathBuf>,

    /// Use the precise compare ratio (0.95) instead of the normal one (0.80)
    #[arg(long, conflicts_with = "threshold")]
    precise: bool,

    /// Custom acceptance threshold, exclusive, in (0, 1)
    #[arg(long)]
    threshold: Option<f64>,

    /// Candidates requested per search
    #[arg(long, default_value_t = DEFAULT_CANDIDATE_LIMIT)]
    limit: usize,

    #[arg(long, default_value_t = MAX_NUMBER_OF_TRACKS)]
    max_tracks: usize,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Similarity metric: "sequence" or "levenshtein"
    #[arg(long, default_value = "sequence")]
    metric: SimilarityMetric,

    /// Compare accent-folded ASCII forms
    #[arg(long)]
    fold_ascii: bool,

    /// Include audio files in subdirectories
    #[arg(long)]
    recursive: bool,

    /// Secrets file (defaults to ./secrets.json when present)
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// Write a CSV match log to this path
    #[arg(long)]
    log: Option<PathBuf>,

    /// Create a new private playlist with this name
    #[arg(long, conflicts_with = "playlist_id")]
    playlist: Option<String>,

    /// Add to an existing playlist
    #[arg(long)]
    playlist_id: Option<String>,

    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Extra attempts for timed out or rate limited searches
    #[arg(long, default_value = "2")]
    retries: usize,

    /// Disable progress bars, print periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn prompt_music_dir() -> Result<PathBuf> {
    print!("--> Enter the path to the directory where the music files are located: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read music directory from stdin")?;
    let line = line.trim();
    if line.is_empty() {
        bail!("No music directory given");
    }
    Ok(PathBuf::from(line.replace('\\', "/")))
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("\n{} ({}):", title, items.len());
    for item in items {
        println!("  {}", item);
    }
}

fn print_report(report: &ReconciliationReport) {
    let s = &report.summary;

    print_list("Not identical", &report.not_identical);
    print_list("Zero found", &report.zero_candidates);
    print_list("Cancelled", &report.cancelled);
    print_list("Tracks in playlist", &report.confirmed_in_playlist);

    println!("\n{:=<60}", "");
    println!("STATISTICS");
    println!("  Tracks processed:      {}", s.total);
    println!("  Successfully found:    {}", s.matched);
    println!("  Not identical:         {}", s.not_identical);
    println!("  Zero found:            {}", s.zero_found);
    if s.search_failures > 0 {
        println!("    of which failed:     {}", s.search_failures);
    }
    if s.cancelled > 0 {
        println!("  Cancelled:             {}", s.cancelled);
    }
    if s.excluded_over_cap > 0 {
        println!("  Skipped (track cap):   {}", s.excluded_over_cap);
    }
    println!("  Success rate search:   {:.2}%", s.search_success_rate());
    match s.playlist_success_rate() {
        Some(rate) => println!("  Success rate playlist: {:.2}%", rate),
        None => println!("  Success rate playlist: n/a"),
    }
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
    set_log_only(args.log_only);

    let start = Instant::now();

    let music_dir = match args.dir {
        Some(dir) => dir,
        None => prompt_music_dir()?,
    };

    let credentials = match Credentials::load(args.secrets.as_deref()) {
        Ok(credentials) => credentials,
        Err(ConfigError::MissingCredential(key)) if io::stdin().is_terminal() => {
            warn!(missing = key, "no Spotify credentials in secrets file or environment");
            Credentials::prompt(&mut io::stdin().lock(), &mut io::stdout())
                .context("Failed to read Spotify credentials")?
        }
        Err(e) => return Err(e).context("Failed to load Spotify credentials"),
    };

    let threshold = match args.threshold {
        Some(t) => Threshold::new(t)?,
        None if args.precise => Threshold::PRECISE,
        None => Threshold::NORMAL,
    };
    let config = ReconcileConfig {
        threshold,
        candidate_limit: args.limit,
        max_tracks: args.max_tracks,
        workers: args.workers,
        metric: args.metric,
        fold_ascii: args.fold_ascii,
    };
    config.validate()?;

    let mut spotify = SpotifyConfig::spotify()?;
    spotify.timeout = std::time::Duration::from_secs(args.timeout_secs);
    spotify.retries = args.retries;

    println!("Reading music directory: {:?}", music_dir);
    let names = load_local_names(&music_dir, args.recursive)
        .with_context(|| format!("Failed to list {}", music_dir.display()))?;
    println!("Found {} audio files", names.len());

    if let Some(path) = &args.log {
        validate_log_path(path)?;
    }

    let client = SpotifyClient::connect(&credentials, &spotify).context("Failed to authenticate with Spotify")?;
    let searcher = RetryingSearcher::new(client, spotify.retries, spotify.retry_backoff);

    let log = match &args.log {
        Some(path) => Some(
            MatchLog::create(path).with_context(|| format!("Failed to create log {}", path.display()))?,
        ),
        None => None,
    };

    let processed = names.len().min(config.max_tracks);
    let pb = create_progress_bar(processed as u64, "Searching tracks");
    let mut reconciler = Reconciler::new(config).with_progress(pb.clone());
    if let Some(log) = &log {
        reconciler = reconciler.with_log(log.sender());
    }

    // Ctrl-C stops the remaining searches; the partial report and log still get written
    let cancel = reconciler.cancel_token();
    if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
        warn!("Failed to register signal handler: {}", err);
    }

    let run = reconciler.run(&names, &searcher)?;
    if reconciler.cancel_token().is_cancelled() {
        pb.abandon_with_message("Search interrupted");
    } else {
        pb.finish_with_message(format!("Searched {} tracks", run.records.len()));
    }

    let mut report = aggregate(&run);
    info!(matched = report.summary.matched, total = report.summary.total, "reconciliation done");

    let target = match (args.playlist, args.playlist_id) {
        (Some(name), _) => Some(PlaylistTarget::Create(name)),
        (None, Some(id)) => Some(PlaylistTarget::Existing(id)),
        (None, None) => None,
    };

    // Publishing failures do not invalidate the search results; report first
    let mut publish_error = None;
    if let Some(target) = target {
        let spinner = create_spinner("Adding tracks to playlist");
        let result = SpotifyPublisher::new(&credentials, &spotify)
            .map_err(anyhow::Error::from)
            .and_then(|publisher| {
                publish(&publisher, &target, &report.matched_ids).map_err(anyhow::Error::from)
            });
        match result {
            Ok(published) => {
                spinner.finish_with_message(format!(
                    "Added {} tracks to playlist {}",
                    published.added, published.playlist_id
                ));
                report.record_playlist(&published.confirmed);
            }
            Err(e) => {
                spinner.finish_with_message("Playlist step failed");
                publish_error = Some(e);
            }
        }
    }

    if let Some(log) = log {
        let playlist = report
            .summary
            .playlist_confirmed
            .map(|_| report.confirmed_in_playlist.as_slice());
        log.finish(&report.summary, playlist)
            .context("Failed to write match log")?;
    }

    print_report(&report);
    if args.log_only {
        report.summary.log_json();
    }
    println!("Elapsed: {}", format_duration(start.elapsed()));

    match publish_error {
        Some(e) => Err(e.context("Failed to publish playlist")),
        None => Ok(()),
    }
}
