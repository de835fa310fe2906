use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tether_config::ScenarioDef;

mod simulate;

/// Tether - async request lifecycle engine with caching and auto-run plugins
#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Replay a scenario against a simulated service and print the state timeline
  Simulate {
    /// Path to the scenario file (JSON)
    scenario_file: PathBuf,

    /// How long to keep observing after the last step
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing();

  match cli.command {
    Some(Commands::Simulate {
      scenario_file,
      settle_ms,
    }) => {
      simulate_file(scenario_file, settle_ms)?;
    }
    None => {
      println!("tether - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}

fn simulate_file(scenario_file: PathBuf, settle_ms: u64) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { simulate_file_async(scenario_file, settle_ms).await })
}

async fn simulate_file_async(scenario_file: PathBuf, settle_ms: u64) -> Result<()> {
  let content = tokio::fs::read_to_string(&scenario_file)
    .await
    .with_context(|| format!("failed to read scenario file: {}", scenario_file.display()))?;

  let scenario = ScenarioDef::from_json_str(&content)
    .with_context(|| format!("failed to load scenario file: {}", scenario_file.display()))?;

  eprintln!(
    "Loaded scenario: {} ({} instances, {} steps)",
    scenario.name,
    scenario.instances.len(),
    scenario.steps.len()
  );

  let cancel = CancellationToken::new();
  let on_ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_ctrl_c.cancel();
    }
  });

  let report = simulate::run(&scenario, settle_ms, cancel).await;
  if report.interrupted {
    eprintln!("Interrupted; printing the timeline recorded so far");
  }
  eprintln!("Service calls: {}", report.service_calls);

  println!("{}", serde_json::to_string_pretty(&report.to_json())?);

  Ok(())
}
