//! CLI for the teleseries telemetry buffer.
//!
//! Provides commands for inspecting subscriptions, replaying captured
//! traffic, and running a simulated live session.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::Rng;
use teleseries::clock::{self, ManualClock};
use teleseries::{IngestionAdapter, Poller, SessionConfig, Snapshot, SnapshotReader};
use tracing_subscriber::EnvFilter;

/// Messages the simulated transport may hold before the publisher blocks.
const TRANSPORT_QUEUE: usize = 256;

/// Time-windowed telemetry buffer CLI.
#[derive(Parser)]
#[command(name = "teleseries", version, about)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Session selection and bounds. Flags override the config file.
#[derive(Args)]
struct SessionArgs {
    /// JSON session config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base topic path.
    #[arg(long)]
    base: Option<String>,

    /// Entity to track (repeatable). None means single-entity mode.
    #[arg(long = "entity")]
    entities: Vec<String>,

    /// Parameter to track (repeatable).
    #[arg(long = "parameter")]
    parameters: Vec<String>,

    /// Retention window in seconds.
    #[arg(long)]
    window: Option<u64>,

    /// Maximum points kept per series.
    #[arg(long)]
    max_points: Option<usize>,

    /// Poll cadence in milliseconds.
    #[arg(long)]
    poll_ms: Option<u64>,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the subscription filters and tracked series for a session.
    Filters,

    /// Feed captured messages through the buffer and print the final windows.
    ///
    /// Each input line is `<t_secs> <topic> <payload>`. Blank lines and lines
    /// starting with `#` are skipped.
    Replay {
        /// Input file, or `-` for stdin.
        input: PathBuf,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Run a simulated publisher against a live buffer and print summaries.
    Simulate {
        /// How long to run, in seconds.
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Delay between publish rounds, in milliseconds.
        #[arg(long, default_value = "250")]
        rate_ms: u64,
    },
}

/// Output format for replay results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON document.
    Json,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = resolve_config(&cli.session).and_then(|config| match cli.command {
        Commands::Filters => cmd_filters(&config),
        Commands::Replay { input, format } => cmd_replay(&config, &input, &format),
        Commands::Simulate { duration, rate_ms } => {
            cmd_simulate(&config, Duration::from_secs(duration), Duration::from_millis(rate_ms))
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Builds the session config from the optional file plus flag overrides.
fn resolve_config(args: &SessionArgs) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::new("", Vec::<String>::new()),
    };

    if let Some(base) = &args.base {
        config.base_topic.clone_from(base);
    }
    if !args.entities.is_empty() {
        config.entities.clone_from(&args.entities);
    }
    if !args.parameters.is_empty() {
        config.parameters.clone_from(&args.parameters);
    }
    if let Some(window) = args.window {
        config.window_secs = Some(window);
    }
    if let Some(max_points) = args.max_points {
        config.max_points = Some(max_points);
    }
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }

    config.validate()?;
    Ok(config)
}

/// Implements `teleseries filters`.
fn cmd_filters(config: &SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let router = config.router()?;

    println!("Subscriptions:");
    for filter in router.subscriptions() {
        println!("  {filter}");
    }
    println!();

    let entities: Vec<&str> = router.entities().collect();
    let parameters: Vec<&str> = router.parameters().collect();
    if entities.is_empty() {
        println!("Entities: (single-entity mode)");
    } else {
        println!("Entities: {}", entities.join(", "));
    }
    println!("Parameters: {}", parameters.join(", "));
    println!();

    let keys = router.keys();
    println!("Tracked series: {}", keys.len());
    for key in &keys {
        println!("  - {key} <- {}", router.topic_for(key));
    }

    Ok(())
}

/// One parsed replay input line.
#[derive(Debug, PartialEq)]
struct ReplayLine<'a> {
    at_ns: u64,
    topic: &'a str,
    payload: &'a str,
}

/// Parses `<t_secs> <topic> <payload>`. Returns `Ok(None)` for blank and
/// comment lines.
fn parse_replay_line(line: &str) -> Result<Option<ReplayLine<'_>>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.splitn(3, char::is_whitespace);
    let (Some(t), Some(topic), Some(payload)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(format!("expected '<t_secs> <topic> <payload>', got '{line}'"));
    };

    let secs: f64 = t.parse().map_err(|_| format!("invalid timestamp '{t}'"))?;
    let at = Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("invalid timestamp '{t}': {e}"))?;

    Ok(Some(ReplayLine {
        at_ns: clock::duration_ns(at),
        topic,
        payload: payload.trim_start(),
    }))
}

/// Implements `teleseries replay <input>`.
fn cmd_replay(
    config: &SessionConfig,
    input: &PathBuf,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };

    let replay_clock = ManualClock::new(0);
    let store = Arc::new(config.build_store_with_clock(Arc::new(replay_clock.clone()))?);
    let adapter = IngestionAdapter::new(Arc::clone(&store));
    adapter.on_connect();

    let mut now_ns = 0u64;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(parsed) = parse_replay_line(&line).map_err(|e| format!("line {}: {e}", index + 1))?
        else {
            continue;
        };

        if parsed.at_ns < now_ns {
            tracing::warn!(line = index + 1, "timestamp goes backwards, holding clock");
        }
        now_ns = now_ns.max(parsed.at_ns);
        replay_clock.set(now_ns);

        adapter.on_message(parsed.topic, parsed.payload.as_bytes());
    }
    adapter.on_disconnect();

    let snapshots = SnapshotReader::new(store).get_tracked();
    let stats = adapter.stats();

    match format {
        OutputFormat::Csv => {
            println!(
                "# received={}, appended={}, malformed={}, unroutable={}",
                stats.received, stats.appended, stats.malformed, stats.unroutable
            );
            println!("entity,parameter,timestamp_ns,value");
            for reading in snapshots.iter().flat_map(Snapshot::readings) {
                let key = reading.key();
                println!(
                    "{},{},{},{}",
                    key.entity,
                    key.parameter,
                    reading.timestamp_ns(),
                    reading.value()
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "taken_at_ns": now_ns,
                "stats": stats,
                "series": snapshots,
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `teleseries simulate`.
fn cmd_simulate(
    config: &SessionConfig,
    duration: Duration,
    rate: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(config.build_store()?);
    let router = store.router();
    let adapter = IngestionAdapter::new(Arc::clone(&store));

    let retention = store.retention();
    let describe = |bound: Option<String>| bound.unwrap_or_else(|| "none".to_string());

    println!("teleseries simulation");
    println!("  Series: {}", router.keys().len());
    println!("  Window: {}", describe(retention.window_duration().map(|w| format!("{w:?}"))));
    println!("  Max points: {}", describe(retention.point_cap().map(|c| c.to_string())));
    println!("  Duration: {duration:?}");
    println!("  Publish every: {rate:?}");
    println!("  Poll every: {:?}", config.poll_interval());
    println!();

    // Stand-in transport: the publisher sends (topic, payload) over a bounded
    // channel and a separate thread delivers them to the adapter.
    let (tx, rx) = mpsc::sync_channel::<(String, Vec<u8>)>(TRANSPORT_QUEUE);

    let topics: Vec<String> = router.keys().iter().map(|key| router.topic_for(key)).collect();
    let publisher = thread::Builder::new()
        .name("teleseries-publisher".to_string())
        .spawn(move || publish_until(&topics, Instant::now() + duration, rate, &tx))?;

    let transport = {
        let adapter = adapter.clone();
        thread::Builder::new()
            .name("teleseries-transport".to_string())
            .spawn(move || {
                adapter.on_connect();
                for (topic, payload) in rx {
                    adapter.on_message(&topic, &payload);
                }
                adapter.on_disconnect();
            })?
    };

    let started = Instant::now();
    let poller = Poller::spawn(
        SnapshotReader::new(Arc::clone(&store)),
        config.poll_interval(),
        move |snapshots| print_summary_table(started.elapsed(), snapshots),
    )?;

    let published = publisher.join().map_err(|_| "publisher thread panicked")?;
    transport.join().map_err(|_| "transport thread panicked")?;
    let ticks = poller.stop();

    let stats = adapter.stats();
    println!("Results:");
    println!("  Published: {published}");
    println!("  Appended: {}", stats.appended);
    println!("  Dropped: {}", stats.malformed + stats.unroutable);
    println!("  Poll ticks: {ticks}");
    println!("  Connection: {}", adapter.connection_state());

    Ok(())
}

/// Publishes a random reading around 50 on every topic each round until
/// `deadline`. Blocks while the transport queue is full.
///
/// Returns the number of messages handed to the transport.
fn publish_until(
    topics: &[String],
    deadline: Instant,
    rate: Duration,
    tx: &mpsc::SyncSender<(String, Vec<u8>)>,
) -> u64 {
    let mut rng = rand::rng();
    let mut published = 0u64;
    while Instant::now() < deadline {
        for topic in topics {
            let value = 50.0 + rng.random_range(-25.0..25.0);
            if tx.send((topic.clone(), format!("{value:.2}").into_bytes())).is_err() {
                return published;
            }
            published += 1;
        }
        thread::sleep(rate);
    }
    published
}

/// Prints one render pass: latest value and window statistics per series.
fn print_summary_table(elapsed: Duration, snapshots: &[Snapshot]) {
    println!("[{:>6.1}s]", elapsed.as_secs_f64());
    println!(
        "  {:<28} {:>5} {:>9} {:>9} {:>9} {:>9}",
        "series", "n", "latest", "mean", "min", "max"
    );
    for snap in snapshots {
        match snap.summary() {
            Some(s) => println!(
                "  {:<28} {:>5} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
                snap.key().to_string(),
                s.count,
                s.latest,
                s.mean,
                s.min,
                s.max
            ),
            None => println!("  {:<28} {:>5} {:>9}", snap.key().to_string(), 0, "waiting"),
        }
    }
    println!();
}
