//! dockit CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::goal::GoalArgs;

#[derive(Parser)]
#[command(name = "dockit")]
#[command(about = "Build, push and run Docker images for delivery goals", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "DOCKIT_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image and push it to the configured registries
    Build {
        #[command(flatten)]
        goal: GoalArgs,
    },
    /// Build an image (or use an existing one) and run it
    Run {
        #[command(flatten)]
        goal: GoalArgs,
        /// Run this image instead of building one
        #[arg(long)]
        image: Option<String>,
        /// Arguments passed to the container
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Validate a dockit configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "dockit.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Build { goal } => {
            let code = commands::goal::build(goal, cli.json).await?;
            std::process::exit(code);
        }
        Commands::Run { goal, image, args } => {
            let code = commands::goal::run(goal, image, args, cli.json).await?;
            std::process::exit(code);
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
