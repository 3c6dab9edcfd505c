// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! pipeflow - Configuration-driven pipeline materialization
//!
//! Build stage graphs from pipeline documents, inspect them, and run them.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if !pipeflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            config,
            workers,
            format,
        } => pipeflow::cli::run::run(config, workers, format, cli.verbose).await,
        Commands::Validate { config } => pipeflow::cli::validate::run(config, cli.verbose).await,
        Commands::Graph { config, format } => {
            pipeflow::cli::graph::run(config, format, cli.verbose).await
        }
        Commands::Stages => pipeflow::cli::stages::run(cli.verbose).await,
    }
}
