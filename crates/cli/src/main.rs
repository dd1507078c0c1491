use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use clap::{Parser, Subcommand};
use netloop_intent_config::{Config, ConfigError, CONFIG_FILE_NAME};
use netloop_reconcile_runner::{
    EnforcementLoop, Intent, LoopOptions, SimulatedDevice, TracingReporter,
};

const EXAMPLE_CONFIG: &str = "device:
  hostname: router1
  platform: ios-xr
intent:
  service: gnmi
  port: 57400
  tls: true";

#[derive(Parser)]
#[command(name = "netloop", version, about = "Closed-loop network automation controller")]
struct Cli {
    /// Path to the intent configuration (defaults to ./input.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Continuously enforce the configured intent on the device
    Run {
        /// Override controller.interval_secs from config
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Stop after this many iterations instead of running forever (0 runs none)
        #[arg(long)]
        max_iterations: Option<u64>,
    },
    /// Validate the configuration and show the loaded intent
    Check {
        /// Print the resolved configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!(
                "config file {} not found\n\nCreate it with the following structure:\n{}",
                path.display(),
                EXAMPLE_CONFIG
            )
        }
        Err(e) => Err(anyhow::anyhow!("{}: {}", path.display(), e)),
    }
}

fn print_summary(config: &Config) {
    println!("Configuration loaded successfully:");
    println!("  Device:   {} ({})", config.device.hostname, config.device.platform);
    println!(
        "  Intent:   service={}, port={}, tls={}",
        config.intent.service, config.intent.port, config.intent.tls
    );
    println!(
        "  Interval: {}s (apply timeout {}s)",
        config.controller.interval_secs, config.controller.apply_timeout_secs
    );
    if config.controller.backoff.enabled {
        println!("  Backoff:  up to {}s", config.controller.backoff.max_secs);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr, stdout stays for the summary / JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(".").join(CONFIG_FILE_NAME));
    let config = load_config(&config_path)?;

    match cli.command {
        Commands::Check { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_summary(&config);
            }
        }
        Commands::Run { interval_secs, max_iterations } => {
            let intent = Intent::from_config(&config.intent)?;
            let device = SimulatedDevice::from_config(&config)?;

            let mut options = LoopOptions::from_config(&config.controller);
            if let Some(secs) = interval_secs {
                if secs == 0 {
                    anyhow::bail!("--interval-secs must be greater than 0");
                }
                options.interval = Duration::from_secs(secs);
            }
            options.max_iterations = max_iterations;

            print_summary(&config);
            println!("\nStarting closed-loop automation...");

            let enforcement = EnforcementLoop::new(device, intent, options, TracingReporter::new());
            let handle = enforcement.handle();

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received Ctrl+C, stopping after current iteration");
                    let _ = handle.shutdown();
                }
            });

            let summary = enforcement.run().await;

            println!(
                "Stopped after {} iteration(s): {} apply(s), {} failed apply(s), {} failed read(s)",
                summary.iterations, summary.applies, summary.apply_failures, summary.read_failures
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
