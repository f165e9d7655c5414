//! This script is meant to be ran periodically, e.g. from a scheduled CI job
//! inside a checkout of the archive repository.

use std::process;

use clap::Parser;
use tracing::error;

use bedrock_archiver::archiver::{http_client, run};
use bedrock_archiver::config::{Args, Config};
use bedrock_archiver::history::{DryRunHistory, GitHistory, History};

fn main() {
  let args = Args::parse();

  // LOGGING=debug or LOG_LEVEL=debug overrides --verbose
  let log_level = std::env::var("LOGGING")
    .or_else(|_| std::env::var("LOG_LEVEL"))
    .unwrap_or_else(|_| if args.verbose { "debug" } else { "info" }.to_string());
  tracing_subscriber::fmt()
    .with_env_filter(log_level)
    .with_target(false)
    .with_ansi(false)
    .init();

  let config = Config::from(args);
  let mut history: Box<dyn History> = if config.persist_changes {
    Box::new(GitHistory::new(&config.workdir))
  } else {
    Box::new(DryRunHistory)
  };

  let outcome = http_client().and_then(|http| run(&config, &http, &mut *history));
  if let Err(e) = outcome {
    error!("{}", e);
    process::exit(1);
  }
}
