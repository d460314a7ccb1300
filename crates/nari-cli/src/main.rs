//! `nari`: terminal front end for the Nari study dashboard.
//!
//! Mirrors the backend's state, prints alarms and connection changes as they
//! happen, and takes line commands on stdin (`help` lists them).
//!
//! # Usage
//!
//! ```
//! nari --url http://localhost:5000
//! nari --config ~/.config/nari/config.toml
//! ```
//!
//! Every config key can also be set from the environment, e.g.
//! `NARI_STALE_AFTER_SECS=60` or `NARI_RECONNECT__STRATEGY=exponential`.

mod input;
mod view;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use input::Input;
use nari_client::{
  ApiClient, ClientConfig, Engine, EngineHandle, Notice, PollingChannel,
};
use nari_core::supervisor::ConnectionStatus;
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  sync::{broadcast, watch},
};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nari", version, about = "Terminal front end for the Nari study dashboard")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "nari.toml")]
  config: PathBuf,

  /// Backend root URL (default: http://localhost:5000).
  #[arg(long, env = "NARI_URL")]
  url: Option<String>,
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
  config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("NARI")
        .separator("__")
        .try_parsing(true),
    )
    .set_override_option("base_url", cli.url.clone())?
    .build()
    .context("failed to read config")?
    .try_deserialize()
    .context("failed to deserialise ClientConfig")
}

#[tokio::main]
async fn main() -> Result<()> {
  // Logs go to stderr; stdout is the prompt's.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli)?;

  let api = ApiClient::new(&config).context("failed to build API client")?;
  match api.health().await {
    Ok(true) => info!(url = %config.base_url, "backend healthy"),
    Ok(false) => warn!(url = %config.base_url, "backend reports unhealthy"),
    Err(error) => warn!(url = %config.base_url, %error, "backend unreachable; will keep retrying"),
  }
  let channel =
    PollingChannel::new(&config).context("failed to build event channel")?;

  let engine = Engine::spawn(api, channel, config.supervisor());
  let reporter = tokio::spawn(report(engine.connection(), engine.notices()));

  let result = prompt(&engine).await;

  reporter.abort();
  engine.shutdown().await;
  result
}

// ─── Background output ───────────────────────────────────────────────────────

/// Print connection changes and one-shot notices until the engine stops.
async fn report(
  mut connection: watch::Receiver<ConnectionStatus>,
  mut notices: broadcast::Receiver<Notice>,
) {
  let mut last = connection.borrow().state;
  loop {
    tokio::select! {
      changed = connection.changed() => {
        if changed.is_err() {
          break;
        }
        let status = *connection.borrow_and_update();
        if status.state != last || status.exhausted {
          last = status.state;
          println!("-- {}", view::connection_line(&status));
        }
      }
      notice = notices.recv() => match notice {
        Ok(Notice::AlarmPresented(alarm)) => println!("\x07{}", view::presented(&alarm)),
        Ok(Notice::CountdownFinished) => println!("\x07-- timer finished"),
        Ok(Notice::Synced { resync: true }) => println!("-- resynchronised"),
        Ok(Notice::Synced { resync: false }) => {}
        Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "missed notices"),
        Err(broadcast::error::RecvError::Closed) => break,
      },
    }
  }
}

// ─── Prompt ──────────────────────────────────────────────────────────────────

async fn prompt(engine: &EngineHandle) -> Result<()> {
  let state = engine.state();
  let connection = engine.connection();
  let clocks = engine.clocks();
  let mut lines = BufReader::new(tokio::io::stdin()).lines();

  loop {
    let line = tokio::select! {
      line = lines.next_line() => line.context("reading stdin")?,
      _ = tokio::signal::ctrl_c() => None,
    };
    let Some(line) = line else { break };

    match input::parse(&line) {
      Ok(None) => {}
      Ok(Some(Input::Quit)) => break,
      Ok(Some(Input::Help)) => println!("{}", input::HELP),
      Ok(Some(Input::Show(v))) => print!(
        "{}",
        view::render(v, &state.borrow(), &connection.borrow(), &clocks.borrow())
      ),
      Ok(Some(Input::Engine(command))) => {
        engine.send(command).await.context("engine stopped")?;
      }
      Err(error) => eprintln!("{error:#}"),
    }
  }
  Ok(())
}
