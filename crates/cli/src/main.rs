// catsync CLI entry point.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

#[derive(Parser)]
#[command(name = "catsync", version, about = "Commit and publish a local catalog repository")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_tracing();
    commands::run(cli.command).into()
}

/// Diagnostics go to stderr so stdout stays a clean report channel.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CATSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
