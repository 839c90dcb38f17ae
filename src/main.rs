use clap::{Parser, Subcommand};
use course_rag::Result;
use course_rag::commands::{ask, build, config, serve, show_status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "course-rag")]
#[command(about = "Answer course questions from indexed course content and forum posts")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml; relative paths in the config resolve against it
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the corpus, embed it and publish a new index
    Build,
    /// Serve the question-answering HTTP API
    Serve,
    /// Answer one question and print the sources
    Ask {
        /// The question to answer
        question: String,
    },
    /// Show the configuration, or write a default config file
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "init")]
        show: bool,
        /// Write a default config.toml
        #[arg(long)]
        init: bool,
        /// Overwrite an existing config.toml when used with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
    /// Show the live index version and its manifest
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build => {
            build(&cli.base_dir).await?;
        }
        Commands::Serve => {
            serve(&cli.base_dir).await?;
        }
        Commands::Ask { question } => {
            ask(&cli.base_dir, &question).await?;
        }
        Commands::Config { init, force, .. } => {
            config(&cli.base_dir, init, force)?;
        }
        Commands::Status => {
            show_status(&cli.base_dir)?;
        }
    }

    Ok(())
}
