use anyhow::Result;
use clap::{Parser, Subcommand};
use proxy_harvest::{
    proxy::prober::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS},
    sync::{DEFAULT_CHANNEL, DEFAULT_DISPLAY_NAME, DEFAULT_LIST_PATH, DEFAULT_SCAN_LIMIT},
    ConnectionRecord, JsonlSource, ListStore, LivenessProber, LivenessStatus, ProberConfig,
    RecordExtractor, SyncConfig, Syncer, TelegramWebSource,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Incremental harvester for proxy config links posted to a channel
#[derive(Parser)]
#[command(name = "proxy-harvest")]
#[command(about = "Incremental harvester for proxy config links posted to a channel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Channel to read messages from
    #[arg(long, env = "TG_CHANNEL", default_value = DEFAULT_CHANNEL, global = true)]
    channel: String,

    /// Display label written after `#` on every config
    #[arg(long, env = "CFG_NAME", default_value = DEFAULT_DISPLAY_NAME, global = true)]
    name: String,

    /// Timeout in seconds for each TCP probe
    #[arg(long, env = "PROBE_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = parse_timeout, global = true)]
    timeout: f64,

    /// Number of concurrent TCP probes
    #[arg(short = 'n', long, env = "PROBE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY, global = true)]
    concurrency: usize,

    /// Maximum number of messages scanned per run
    #[arg(long, default_value_t = DEFAULT_SCAN_LIMIT, global = true)]
    scan_limit: usize,

    /// Persisted config list
    #[arg(short, long, default_value = DEFAULT_LIST_PATH, global = true)]
    output: PathBuf,

    /// Directory holding the cursor file
    #[arg(long, default_value = "state", global = true)]
    state_dir: PathBuf,

    /// Read messages from a JSON-lines export instead of the channel web preview
    #[arg(long, global = true)]
    from_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one incremental ingestion (default)
    Sync,
    /// Extract and relabel config links from a text file
    Extract {
        /// Input file containing free text
        input: PathBuf,
    },
    /// Probe every config in a list file
    Check {
        /// List file, one config per line
        input: PathBuf,
        /// Rewrite the list keeping only configs that pass
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let prober_config = ProberConfig::new()
        .with_timeout(Duration::try_from_secs_f64(cli.timeout)?)
        .with_concurrency(cli.concurrency);

    match cli.command {
        Some(Commands::Sync) | None => {
            let config = SyncConfig::new()
                .with_channel(cli.channel)
                .with_display_name(cli.name)
                .with_scan_limit(cli.scan_limit)
                .with_list_path(cli.output)
                .with_cursor_path(cli.state_dir.join("last_id.txt"))
                .with_prober(prober_config);

            let report = match cli.from_file {
                Some(path) => {
                    let source = JsonlSource::from_path(&path)?;
                    info!(messages = source.len(), path = %path.display(), "loaded export");
                    Syncer::new(source, config).run().await?
                }
                None => Syncer::new(TelegramWebSource::new()?, config).run().await?,
            };

            println!("{}", report);
        }
        Some(Commands::Extract { input }) => {
            let text = std::fs::read_to_string(&input)?;
            let extractor = RecordExtractor::new(&cli.name);
            let records = extractor.extract(&text);

            info!(count = records.len(), input = %input.display(), "extracted configs");
            for record in &records {
                println!("{}", record);
            }
        }
        Some(Commands::Check { input, write }) => {
            let store = ListStore::new(&input);
            let lines = store.load()?;
            let records: Vec<ConnectionRecord> = lines
                .iter()
                .filter_map(|line| ConnectionRecord::new(line.as_str()))
                .collect();

            println!("Loaded {} configs from {:?}", lines.len(), input);
            println!(
                "Checking with {} concurrent probes, timeout: {}s",
                prober_config.concurrency, cli.timeout
            );

            let prober = LivenessProber::with_config(prober_config);
            let results = prober.probe_records(records).await;

            let count = |status: LivenessStatus| results.iter().filter(|r| r.status == status).count();
            println!(
                "Results: {} alive, {} dead, {} untested, {} unrecognized",
                count(LivenessStatus::Alive),
                count(LivenessStatus::Dead),
                count(LivenessStatus::Untested),
                lines.len() - results.len()
            );

            if write {
                let dead: HashSet<&str> = results
                    .iter()
                    .filter(|r| !r.passes())
                    .map(|r| r.record.as_str())
                    .collect();
                let kept: Vec<&String> = lines
                    .iter()
                    .filter(|line| !dead.contains(line.as_str()))
                    .collect();
                store.save(&kept)?;
                println!("Saved {} configs to {:?}", kept.len(), input);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("Invalid timeout: {}", s))?;
    if secs <= 0.0 {
        return Err(format!("Timeout must be a positive number of seconds, got {}", s));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Timeout {} is out of range: {}", s, e))?;
    Ok(secs)
}
