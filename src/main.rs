// src/main.rs - replays captured serial traffic through the MMU monitor
use clap::{Parser, Subcommand};
use mmu_monitor::config::{self, Config};
use mmu_monitor::replay;
use mmu_monitor::{EventDispatcher, MonitorService};
use mmu_shared::{PrinterControl, PrinterProfile};

#[derive(Parser, Debug)]
#[command(name = "mmu-monitor", version, about = "Tracks a Prusa MMU from printer serial traffic")]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<String>,
    /// Force a printer profile (MK3, MK3_5, MK3_9, MK4, COREONE)
    #[arg(short, long)]
    profile: Option<PrinterProfile>,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an OctoPrint serial.log and print every MMU event as JSON
    Replay { serial_log: String },
}

/// Printer side of a replay: holds always succeed, commands are logged.
struct ReplayPrinter;

impl PrinterControl for ReplayPrinter {
    fn set_job_on_hold(&mut self, hold: bool) -> bool {
        tracing::info!("Job hold {}", if hold { "set" } else { "released" });
        true
    }

    fn send_commands(&mut self, commands: &[String], tags: &[&str]) {
        tracing::info!("Printer would send {:?} tagged {:?}", commands, tags);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config(path).map(Some),
        None => Ok(None),
    };
    let debug = cli.verbose || matches!(&loaded, Ok(Some(config)) if config.debug);

    // Events go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_max_level(if debug { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match loaded {
        Ok(Some(config)) => config,
        Ok(None) => Config::default(),
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(profile) = cli.profile {
        tracing::info!("Printer profile forced to {}", profile);
        config.printer_profile = Some(profile);
    }

    match cli.command {
        Command::Replay { serial_log } => {
            tracing::info!("Replaying {}", serial_log);
            let contents = tokio::fs::read_to_string(&serial_log).await?;
            let (records, skipped) = replay::parse_log(&contents);

            let (dispatcher, mut events) = EventDispatcher::new();
            let printer_events = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match serde_json::to_string(&event) {
                        Ok(json) => println!("{}", json),
                        Err(e) => tracing::error!("Failed to encode {:?}: {}", event, e),
                    }
                }
            });

            let (service, handle) = MonitorService::new(config, ReplayPrinter, dispatcher, 64);
            let monitor = tokio::spawn(service.run());

            let mut stats = replay::replay(&handle, &records).await?;
            stats.skipped = skipped;
            drop(handle);

            let monitor = monitor.await?;
            tracing::info!(
                "Replay done: {} received, {} sent, {} rewritten, {} suppressed, {} skipped; MMU is {}",
                stats.received,
                stats.sent,
                stats.rewritten,
                stats.suppressed,
                stats.skipped,
                monitor.state().state
            );
            drop(monitor);
            printer_events.await?;
        }
    }

    Ok(())
}
