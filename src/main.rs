mod api;
mod app;
mod cache;
mod commands;
mod config;
mod controllers;
mod event;
mod logging;
mod notify;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "linkdeck")]
#[command(about = "A terminal dashboard for short links and their click analytics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/linkdeck/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overrides LINKDECK_API_URL and the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Log file (default: <data dir>/linkdeck/linkdeck.log)
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let log_path = args.log_file.unwrap_or_else(logging::default_log_path);
  let _log_guard = logging::init(&log_path)?;

  let config = config::Config::load(args.config.as_deref())?;
  let api_url = config.api_url(args.api_url.as_deref())?;
  info!(%api_url, "starting linkdeck");

  let mut app = app::App::new(config, api_url)?;
  app.run().await?;

  Ok(())
}
