//! lexiprobe CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "lexiprobe",
    version,
    about = "Adaptive vocabulary placement and spoken-answer tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a placement session against a synthetic learner
    Simulate {
        /// Path to a question pool (.toml or .json)
        #[arg(long)]
        pool: PathBuf,

        /// Self-assessment answer (1 = beginner .. 4 = advanced)
        #[arg(long, default_value = "3")]
        q0: u8,

        /// The learner's true level (1-8); questions at or below it are answered correctly
        #[arg(long)]
        ability: u8,

        /// Random seed for question choice and slips
        #[arg(long)]
        seed: Option<u64>,

        /// Probability that the learner answers against their ability
        #[arg(long, default_value = "0.0")]
        slip: f64,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Also write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate question pool files
    Validate {
        /// Path to a pool file or directory
        #[arg(long)]
        pool: PathBuf,
    },

    /// Send an audio clip to the configured transcription fallback
    Transcribe {
        /// Audio file to transcribe
        #[arg(long)]
        audio: PathBuf,

        /// Word ID the clip answers
        #[arg(long)]
        word_id: String,

        /// On-device transcript, if any
        #[arg(long, default_value = "")]
        hint: String,

        /// MIME type (inferred from the file extension by default)
        #[arg(long)]
        mime: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration
    ShowConfig {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and a sample question pool
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexiprobe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            pool,
            q0,
            ability,
            seed,
            slip,
            format,
            output,
        } => commands::simulate::execute(commands::simulate::SimulateArgs {
            pool,
            q0,
            ability,
            seed,
            slip,
            format,
            output,
        }),
        Commands::Validate { pool } => commands::validate::execute(pool),
        Commands::Transcribe {
            audio,
            word_id,
            hint,
            mime,
            config,
        } => commands::transcribe::execute(audio, word_id, hint, mime, config).await,
        Commands::ShowConfig { config } => commands::show_config::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
