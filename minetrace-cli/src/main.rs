//! minetrace CLI
//!
//! Multi-sensor emitter localization with audio guidance.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use minetrace_core::{GeoPosition, SensorDomain, SignatureCatalog, SignatureDomain};
use minetrace_detectors::TrackerEvent;
use minetrace_runtime::{SessionReport, Tracker, TrackerConfig};
use minetrace_sensors::{FixedPosition, LogToneSink, SimulatedEmitter, SimulatedSampler};

#[derive(Parser)]
#[command(name = "minetrace")]
#[command(author, version, about = "minetrace: multi-sensor emitter tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tracking session against a simulated emitter
    Track {
        /// Session length in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Tracker config file (or set MINETRACE_CONFIG env var)
        #[arg(short, long, env = "MINETRACE_CONFIG")]
        config: Option<PathBuf>,

        /// Simulated emitter frequency in Hz
        #[arg(long, default_value = "62500")]
        emitter_hz: f64,

        /// Simulated emitter strength (0-100)
        #[arg(long, default_value = "60")]
        strength: f64,

        /// Seed for the simulated samplers
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Operator latitude
        #[arg(long, default_value = "33.6374")]
        lat: f64,

        /// Operator longitude
        #[arg(long, default_value = "46.4227")]
        lon: f64,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,

        /// Write the session report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List known emitter signatures
    Catalog {
        /// Only this domain (infrasonic, acoustic, ultrasonic, radio)
        #[arg(short, long)]
        domain: Option<SignatureDomain>,

        /// Extra signature file merged into the built-in table
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Manage tracker configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        #[arg(short, long, env = "MINETRACE_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Track {
            duration,
            config,
            emitter_hz,
            strength,
            seed,
            lat,
            lon,
            json,
            output,
        } => {
            let emitter = SimulatedEmitter {
                frequency: emitter_hz,
                strength,
                ..Default::default()
            };
            run_track(
                duration,
                config,
                emitter,
                seed,
                GeoPosition::new(lat, lon, 0.0),
                json,
                output,
            )
            .await?;
        }
        Commands::Catalog { domain, file } => {
            print_catalog(domain, file)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                TrackerConfig::default().save(&path)?;
                println!("Wrote default config to {}", path.display());
            }
            ConfigAction::Show { config } => {
                print!("{}", load_config(config)?.to_toml_string()?);
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<TrackerConfig> {
    match path {
        Some(path) => TrackerConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(TrackerConfig::default()),
    }
}

async fn run_track(
    duration: u64,
    config_path: Option<PathBuf>,
    emitter: SimulatedEmitter,
    seed: u64,
    position: GeoPosition,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;

    if !json {
        println!("minetrace - multi-sensor emitter tracker\n");
        println!(
            "Simulated emitter: {:.0} Hz at strength {:.0} (seed {})",
            emitter.frequency, emitter.strength, seed
        );
        println!(
            "Operator: {:.4}, {:.4} | Duration: {}s\n",
            position.latitude, position.longitude, duration
        );
    }

    let mut builder = Tracker::builder(config)
        .position(Arc::new(FixedPosition(position)))
        .tone_sink(Arc::new(LogToneSink));
    for (offset, domain) in SensorDomain::ALL.into_iter().enumerate() {
        let sampler = SimulatedSampler::new(domain.as_str(), emitter, seed.wrapping_add(offset as u64));
        builder = builder.sampler(domain, Arc::new(sampler));
    }
    let tracker = Arc::new(builder.build()?);

    let mut events = tracker.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, TrackerEvent::SessionCompleted { .. });
                    print_event(&event, json);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Event printer skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stopper = tracker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_tracking();
        }
    });

    let report = tracker
        .start_tracking(Duration::from_secs(duration))
        .await?
        .context("A tracking session was already running")?;
    let _ = printer.await;

    if !json {
        print_report(&report);
    }

    if let Some(path) = output {
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        if !json {
            println!("Report saved to: {}", path.display());
        }
    }

    Ok(())
}

fn print_event(event: &TrackerEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        TrackerEvent::SignalDetected { .. } => {}
        TrackerEvent::ScanProgress {
            detector,
            fraction,
            count,
            ..
        } => {
            println!("  {:<14} {:>5.1}%  {} signals", detector, fraction * 100.0, count);
        }
        TrackerEvent::MinerDetected { detection } => {
            println!(
                "[{}] Emitter candidate at {:.1} Hz: {:.0}% confidence, ~{:.0} m ({})",
                detection.detected_at.format("%H:%M:%S"),
                detection.frequency_key,
                detection.combined_confidence * 100.0,
                detection.estimated_distance,
                detection.primary.device_class.as_deref().unwrap_or("unknown")
            );
        }
        TrackerEvent::DirectionUpdated { direction, .. } => {
            println!(
                "  bearing {:>5.1} deg, ~{:.0} m ({:.0}% confidence)",
                direction.bearing,
                direction.distance,
                direction.confidence * 100.0
            );
        }
        TrackerEvent::SessionCompleted { .. } => {}
    }
}

fn print_report(report: &SessionReport) {
    println!("\n{}", "=".repeat(60));
    println!(
        "Session {} after {:.1}s",
        if report.cancelled { "stopped" } else { "completed" },
        report.elapsed_ms as f64 / 1000.0
    );
    println!(
        "Signals: {} electromagnetic, {} acoustic ({} total)",
        report.electromagnetic_signals, report.acoustic_signals, report.total_signals
    );
    println!("Comprehensive detections: {}", report.comprehensive_detections);

    match &report.best {
        Some(best) => {
            println!(
                "Best candidate: {:.1} Hz, {:.0}% confidence, ~{:.0} m",
                best.frequency_key,
                best.combined_confidence * 100.0,
                best.estimated_distance
            );
            if let Some(direction) = best.direction {
                println!("Direction: {:.1} deg ({:?})", direction.bearing, direction.method);
            }
        }
        None => println!("No emitter localized."),
    }
}

fn print_catalog(domain: Option<SignatureDomain>, file: Option<PathBuf>) -> Result<()> {
    let mut catalog = SignatureCatalog::load();
    if let Some(path) = file {
        let added = catalog
            .load_file(&path)
            .with_context(|| format!("Failed to load signatures from {}", path.display()))?;
        println!("Merged {} signatures from {}\n", added, path.display());
    }

    let domains: Vec<SignatureDomain> = match domain {
        Some(domain) => vec![domain],
        None => SignatureDomain::ALL.to_vec(),
    };

    for domain in domains {
        let bounds = domain.bounds();
        println!(
            "{} ({:.1} Hz - {:.1} Hz)",
            domain.as_str(),
            bounds.min,
            bounds.max
        );
        for signature in catalog.signatures_in_domain(domain) {
            println!(
                "  {:>12.1} Hz  ±{:<9.1} min {:>5.1}  {}",
                signature.frequency,
                signature.tolerance,
                signature.min_amplitude,
                signature.device_class
            );
        }
        println!();
    }

    println!("Frequency groups:");
    for group in catalog.groups() {
        println!(
            "  {:>12.1} Hz  {:.2}  {}",
            group.frequency,
            group.confidence,
            group.device_classes.join(", ")
        );
    }

    Ok(())
}
