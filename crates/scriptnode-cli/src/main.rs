//! Scriptnode CLI - validate, inspect and render network descriptions.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scriptnode")]
#[command(author, version, about = "Scriptnode network CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check network descriptions for errors
    Validate(commands::validate::ValidateArgs),

    /// Show the nodes, parameters and errors of a network
    Inspect(commands::inspect::InspectArgs),

    /// Render a network to a WAV file
    Render(commands::render::RenderArgs),

    /// List the node types that can be created
    Nodes(commands::nodes::NodesArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Nodes(args) => commands::nodes::run(args),
    }
}
