/// SkillStack: roadmap step ordering service
///
/// Main entry point. Runs either the HTTP API or a queue worker:
/// - `skillstack` / `skillstack serve`: API at /api/roadmaps/* and /api/roadmap-steps/*,
///   health at /healthz and /healthz/dispatch
/// - `skillstack worker`: consumes queued normalization jobs

use clap::{Parser, Subcommand};
use skillstack::{
    config::Config,
    server::{start_server, start_worker},
};

#[derive(Debug, Parser)]
#[command(name = "skillstack")]
#[command(version, about = "Roadmap step ordering service", long_about = None)]
struct Cli {
    /// Process to run; defaults to the API server
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API and the maintenance cron
    Serve,
    /// Consume normalization jobs from the durable queue
    Worker,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration (defaults to 0.0.0.0:8000 and ./data, SKILLSTACK_* overrides)
    let config = Config::default();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => start_server(config).await?,
        Command::Worker => start_worker(config).await?,
    }

    Ok(())
}
