//! Easel CLI — the main entry point.
//!
//! Commands:
//! - `onboard`    — Write a default config file
//! - `agent`      — Interactive chat or single-message mode
//! - `playground` — Start the HTTP playground
//! - `agents`     — List available agents
//! - `doctor`     — Check configuration and the tool server

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "easel",
    about = "Easel — chat agents with on-demand image generation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Chat with an agent
    Agent {
        /// Agent id (sage, scholar, image_generator)
        #[arg(short, long, default_value = "image_generator")]
        agent: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// User id passed to the agent as context
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Start the HTTP playground
    Playground {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available agents
    Agents,

    /// Check configuration and the tool server
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent {
            agent,
            message,
            user,
        } => commands::agent::run(&agent, message, user).await?,
        Commands::Playground { port } => commands::playground::run(port).await?,
        Commands::Agents => commands::agents::run(),
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
