use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use maxlog_logs::Symbol;

mod actions;
mod config;

use config::{Args, Command, FileConfig, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(config::normalize_args(std::env::args()));

    // Diagnostics go to stderr so they never interleave with log output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", Symbol::Error, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let command = args.command.unwrap_or(Command::Logs);
    if command == Command::Version {
        println!("maxlog version: {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    // Configuration errors surface here, before any stream is opened
    let file = FileConfig::load(args.options.config.as_deref())?;
    let settings = Settings::resolve(args.options, file)?;
    tracing::debug!(?settings, "resolved settings");

    match command {
        Command::Logs => actions::logs(&settings).await,
        Command::Inspect => actions::inspect(&settings).await,
        Command::Version => Ok(ExitCode::SUCCESS),
    }
}
