mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{EvalT5Args, TrainCnnArgs, TrainT5Args};

/// ntp: next-title prediction over career sequences.
#[derive(Parser)]
#[command(name = "ntp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and evaluating the two model families.
#[derive(Subcommand)]
enum Command {
    /// Train the CNN classifier over co-occurrence images.
    TrainCnn {
        /// Path to the experiment TOML file.
        #[arg(long, default_value = "configs/experiment.toml")]
        config: PathBuf,
        /// Path to the dataset JSON file.
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Fine-tune the seq2seq model on the configured prompt tasks.
    TrainT5 {
        /// Path to the experiment TOML file.
        #[arg(long, default_value = "configs/experiment.toml")]
        config: PathBuf,
        /// Path to the dataset JSON file.
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Evaluate a saved seq2seq checkpoint on the test split.
    EvalT5 {
        /// Path to the experiment TOML file.
        #[arg(long, default_value = "configs/experiment.toml")]
        config: PathBuf,
        /// Path to the dataset JSON file.
        #[arg(long)]
        dataset: PathBuf,
        /// Checkpoint directory written by train-t5.
        #[arg(long)]
        checkpoint: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::TrainCnn { config, dataset } => {
            pipeline::run_train_cnn(TrainCnnArgs { config, dataset })
        }
        Command::TrainT5 { config, dataset } => {
            pipeline::run_train_t5(TrainT5Args { config, dataset })
        }
        Command::EvalT5 {
            config,
            dataset,
            checkpoint,
        } => pipeline::run_eval_t5(EvalT5Args {
            config,
            dataset,
            checkpoint,
        }),
    }
}
