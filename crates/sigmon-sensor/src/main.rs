//! SigMon Sensor - passive telecom signaling monitor
//!
//! Reads pcap captures, decodes CAP, INAP, MAP, Diameter, GTP-C, PFCP, S1AP,
//! NGAP and NAS signaling and writes one JSON document per decoded message.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sigmon_capture::CaptureEngine;
use sigmon_core::config::{ConfigLoader, SensorConfig};
use sigmon_core::metrics::{create_metrics, SharedMetrics};
use sigmon_core::{Dictionary, HealthCheck, Message, SourceConfig, SENSOR_VERSION};
use sigmon_decode::{DecoderRegistry, RoutingProcessor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sigmon-sensor")]
#[command(version)]
#[command(about = "Passive telecom signaling monitor", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (text, json); overrides the config file
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "SIGMON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture and decode pipeline until interrupted
    Run {
        /// Write decoded messages as JSON lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds between pipeline statistics log lines
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        stats_interval: u64,
    },

    /// Decode every capture file in a directory once and print JSON lines
    Decode {
        /// Directory holding capture files
        input: PathBuf,

        /// File name pattern
        #[arg(short, long, default_value = "*.pcap")]
        pattern: String,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Vendor dictionary applied to this capture
        #[arg(long)]
        vendor: Option<String>,

        /// Write JSON lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show configured sources, decoders and dictionaries
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The configured subscriber depends on the config, so loading logs go
    // through a plain stderr subscriber until then
    let bootstrap = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose, "info"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        ConfigLoader::new().with_cli_path(cli.config.clone()).load()
    })
    .context("Failed to load configuration")?;

    // CLI flags take precedence over the config file
    let level = log_level(cli.verbose, &config.sensor.log_level);
    let format = cli
        .format
        .clone()
        .unwrap_or_else(|| config.sensor.log_format.clone());
    init_logging(level, &format)?;

    match cli.command {
        Commands::Run {
            output,
            stats_interval,
        } => run_command(config, output, Duration::from_secs(stats_interval)).await,
        Commands::Decode {
            input,
            pattern,
            recursive,
            vendor,
            output,
        } => {
            anyhow::ensure!(input.is_dir(), "{} is not a directory", input.display());
            let source = SourceConfig {
                pattern,
                recursive,
                vendor,
                ..SourceConfig::file(input)
            };
            decode_command(config, source, output).await
        }
        Commands::Status => status_command(&config),
    }
}

fn log_level(verbose: u8, configured: &str) -> Level {
    match verbose {
        0 => match configured.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber; `RUST_LOG` directives refine the level
fn init_logging(level: Level, format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    // stdout carries decoded messages
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Capture engine wired to the decoders, plus the handles the control loop needs
struct Pipeline {
    engine: CaptureEngine,
    health: Arc<HealthCheck>,
    metrics: SharedMetrics,
    messages: mpsc::Receiver<Message>,
}

impl Pipeline {
    /// A lossless pipeline applies backpressure to capture instead of
    /// dropping messages when the writer falls behind
    fn build(config: &SensorConfig, lossless: bool) -> Self {
        let dictionary = Arc::new(Dictionary::new(&config.dictionary));
        let vendors = dictionary.load_all();
        debug!(?vendors, "Dictionaries ready");

        let health = Arc::new(HealthCheck::new(config.health.clone()));
        let metrics = create_metrics();
        let (tx, messages) = mpsc::channel(config.decode.message_buffer);

        let registry = DecoderRegistry::from_settings(&config.decode, dictionary);
        health.update_component_status(
            "decode",
            !registry.is_empty(),
            format!("{} decoders", registry.len()),
        );

        let mut router = RoutingProcessor::new(Arc::new(registry), tx)
            .with_health(health.clone())
            .with_metrics(metrics.clone());
        if lossless {
            router = router.lossless();
        }

        let engine = CaptureEngine::new(&config.capture)
            .with_metrics(metrics.clone())
            .with_health(health.clone());
        engine.register_processor(Arc::new(router));

        Self {
            engine,
            health,
            metrics,
            messages,
        }
    }
}

fn log_stats(metrics: &SharedMetrics) {
    let capture = metrics.capture.snapshot();
    let decode = metrics.decode.snapshot();
    info!(
        packets = capture.packets_captured,
        files = capture.files_processed,
        file_errors = capture.file_errors,
        decoded = decode.messages_decoded,
        decode_errors = decode.decode_errors,
        dropped = decode.messages_dropped,
        "Pipeline statistics"
    );
}

/// Drain the message channel into JSON lines until every sender is gone
async fn write_messages(
    mut messages: mpsc::Receiver<Message>,
    output: Option<PathBuf>,
) -> anyhow::Result<u64> {
    let sink: Box<dyn AsyncWrite + Send + Unpin> = match &output {
        Some(path) => Box::new(
            File::create(path)
                .await
                .with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut writer = BufWriter::new(sink);
    let mut written = 0u64;

    while let Some(message) = messages.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        written += 1;

        if messages.is_empty() {
            writer.flush().await?;
        }
    }

    writer.flush().await?;
    Ok(written)
}

async fn run_command(
    config: SensorConfig,
    output: Option<PathBuf>,
    stats_interval: Duration,
) -> anyhow::Result<()> {
    if config.capture.sources.is_empty() {
        warn!("No capture sources configured");
    }

    let Pipeline {
        engine,
        health,
        metrics,
        messages,
    } = Pipeline::build(&config, false);

    let writer = tokio::spawn(write_messages(messages, output));
    let mut alarms = health.start()?;
    engine.start()?;
    info!(
        "SigMon sensor v{} running with {} sources",
        SENSOR_VERSION,
        engine.sources().len()
    );

    let mut ticker = tokio::time::interval(stats_interval);
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!("Signal handler failed: {}", e);
                }
                info!("Shutdown requested");
                break Ok(());
            }
            Some(alarm) = alarms.recv() => {
                error!("{}; exiting so the supervisor restarts the sensor", alarm);
                break Err(anyhow::anyhow!("{}", alarm));
            }
            _ = ticker.tick() => log_stats(&metrics),
        }
    };

    if let Err(e) = engine.stop().await {
        warn!("Capture engine stop failed: {}", e);
    }
    health.stop();

    // Dropping the engine releases the last message sender
    drop(engine);
    let written = writer.await??;

    log_stats(&metrics);
    info!("SigMon sensor stopped after {} messages", written);
    outcome
}

async fn decode_command(
    mut config: SensorConfig,
    source: SourceConfig,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    config.capture.sources = vec![source];

    let Pipeline {
        engine,
        metrics,
        messages,
        ..
    } = Pipeline::build(&config, true);

    let writer = tokio::spawn(write_messages(messages, output));
    engine.start()?;
    engine.wait().await?;
    drop(engine);

    let written = writer.await??;
    log_stats(&metrics);
    let dropped = metrics.decode.snapshot().messages_dropped;
    if dropped > 0 {
        warn!("{} decoded messages were not written", dropped);
    }
    info!("Decoded {} messages", written);
    Ok(())
}

fn status_command(config: &SensorConfig) -> anyhow::Result<()> {
    println!();
    println!("SigMon Sensor v{}", SENSOR_VERSION);
    println!();

    println!("Capture sources:");
    if config.capture.sources.is_empty() {
        println!("  (none)");
    }
    for source in &config.capture.sources {
        let mut line = format!("  {}", source.label());
        if source.watch {
            line.push_str(&format!(" (watch, every {} ms)", config.capture.poll_interval_ms));
        }
        if let Some(vendor) = &source.vendor {
            line.push_str(&format!(" vendor={}", vendor));
        }
        println!("{}", line);
    }

    let dictionary = Arc::new(Dictionary::new(&config.dictionary));
    let loaded = dictionary.load_all();

    println!();
    println!("Decoders (routing order):");
    let registry = DecoderRegistry::from_settings(&config.decode, dictionary.clone());
    for (i, name) in registry.names().iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }

    println!();
    println!("Dictionaries ({}):", config.dictionary.base_path.display());
    println!("  default vendor: {}", dictionary.default_vendor());
    for vendor in config.dictionary.vendors.keys() {
        let state = if loaded.contains(vendor) {
            "loaded"
        } else {
            "failed"
        };
        println!("  {}: {}", vendor, state);
    }

    let health = &config.health;
    println!();
    println!("Health:");
    println!(
        "  check loop: {} (every {} ms)",
        health.enabled, health.check_interval_ms
    );
    println!(
        "  watchdog: {} (timeout {} ms, restart on failure: {})",
        health.watchdog_enabled, health.watchdog_timeout_ms, health.restart_on_failure
    );
    println!();

    Ok(())
}
