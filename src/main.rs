// modqueue - command line front end for the sequencing core
// No audio here: `play` prints the order a player would use

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use modqueue::cache::background::{probe_all, revalidate_all};
use modqueue::cache::open_store;
use modqueue::storage::collect_candidates;
use modqueue::{
    Config, HeaderProber, LocalStorage, PlaybackSession, QueueEntry, SessionSettings,
    ValidityCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "modqueue")]
#[command(about = "Validity cache and shuffle queue for tracker module players")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable developer logging (stderr + debug output)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether files are playable modules
    Probe {
        /// Re-check files previously rejected
        #[arg(long)]
        force: bool,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the play order for a set of files
    Play(PlayArgs),
    /// Drop cached verdicts for files
    Forget {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Wipe the whole cache
    ClearCache,
}

#[derive(Args)]
struct PlayArgs {
    /// Candidate to start from (index into the expanded file list)
    #[arg(long, default_value_t = 0)]
    start: usize,

    #[arg(long, overrides_with = "no_shuffle")]
    shuffle: bool,
    #[arg(long)]
    no_shuffle: bool,

    #[arg(long = "loop", overrides_with = "no_loop")]
    looping: bool,
    #[arg(long = "no-loop")]
    no_loop: bool,

    #[arg(long, overrides_with = "no_keep_first")]
    keep_first: bool,
    #[arg(long)]
    no_keep_first: bool,

    /// Stop after this many files (defaults to one lap when looping)
    #[arg(long)]
    limit: Option<usize>,

    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

// `--x` / `--no-x` pair; neither means "use the config"
fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn init_logging(dev: bool) -> Result<WorkerGuard> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modqueue")
        .join("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "modqueue.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Base filter: info level for general logs, debug for modqueue
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,modqueue=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // Dev mode mirrors everything to stderr
    let stderr_layer =
        dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}

fn print_entry(entry: &QueueEntry, position: usize, total: usize) {
    println!(
        "[{}/{}] {} ({}) {}",
        position,
        total,
        entry.title(),
        entry.info.module_type,
        entry.path.display()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines get flushed on exit
    let _log_guard = init_logging(cli.dev)?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    debug!("Loaded config: {:?}", config);

    let store = open_store(&config.cache)?;
    let cache = Arc::new(ValidityCache::new(store, HeaderProber::new(), LocalStorage));

    match cli.command {
        Command::Probe { force, paths } => {
            let candidates = collect_candidates(&paths);
            info!("Probing {} files (force: {})", candidates.len(), force);

            let (timeout, concurrency) = (config.probe.timeout(), config.probe.concurrency);
            let outcomes = if force {
                revalidate_all(Arc::clone(&cache), candidates, timeout, concurrency).await
            } else {
                probe_all(Arc::clone(&cache), candidates, timeout, concurrency).await
            };

            for (path, result) in outcomes {
                match result {
                    Ok(info) => {
                        println!("✅ {} [{}] {}", info.name, info.module_type, path.display())
                    }
                    Err(e) => println!("❌ {}", e),
                }
            }
        }

        Command::Play(args) => {
            let mut settings = SessionSettings::from(&config);
            if let Some(shuffle) = flag(args.shuffle, args.no_shuffle) {
                settings.mode.shuffle = shuffle;
            }
            if let Some(looping) = flag(args.looping, args.no_loop) {
                settings.mode.looping = looping;
            }
            if let Some(keep_first) = flag(args.keep_first, args.no_keep_first) {
                settings.mode.keep_first = keep_first;
            }

            let candidates = collect_candidates(&args.paths);
            let session =
                PlaybackSession::start(Arc::clone(&cache), candidates, args.start, settings)
                    .await?;

            let Some(first) = session.now_playing().await? else {
                return Ok(());
            };
            let total = first.total;
            let limit = args.limit.unwrap_or(total);

            print_entry(&first.entry, first.position, total);
            let mut printed = 1;
            while printed < limit {
                if session.advance().await?.is_none() {
                    break;
                }
                let Some(now) = session.now_playing().await? else {
                    break;
                };
                print_entry(&now.entry, now.position, now.total);
                printed += 1;
            }
        }

        Command::Forget { paths } => {
            let candidates = collect_candidates(&paths);
            let removed = cache.invalidate_all(&candidates);
            println!("🗑️  Forgot {} of {} files", removed, candidates.len());
        }

        Command::ClearCache => {
            cache.clear_all()?;
            println!("🧹 Cache cleared ({})", config.cache.directory.display());
        }
    }

    Ok(())
}
