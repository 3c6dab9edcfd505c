// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for pipeflow.

pub mod graph;
pub mod run;
pub mod stages;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::errors::PipeflowResult;
use crate::stages::StageRegistry;

/// Pipeline materialization engine
///
/// Build stage graphs from pipeline documents and run them.
#[derive(Parser, Debug)]
#[clap(
    name = "pipeflow",
    version,
    about = "Build, inspect, and run configuration-driven stage pipelines",
    long_about = None,
    after_help = "Examples:\n\
        pipeflow validate profiler.json       Check a pipeline document\n\
        pipeflow graph profiler.json          Show the stage graph\n\
        pipeflow run profiler.json -w 2       Run with two workers\n\
        pipeflow stages                       List available stage types\n\n\
        See 'pipeflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a workflow from a pipeline document and run it
    Run {
        /// Pipeline document (.json, .yaml, .toml)
        #[clap(env = "PIPEFLOW_CONFIG")]
        config: PathBuf,

        /// Maximum number of stages running at once (overrides the document)
        #[clap(short, long, env = "PIPEFLOW_WORKERS", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate a pipeline document
    Validate {
        /// Pipeline document to validate
        #[clap(env = "PIPEFLOW_CONFIG")]
        config: PathBuf,
    },

    /// Show a pipeline as a graph
    Graph {
        /// Pipeline document
        #[clap(env = "PIPEFLOW_CONFIG")]
        config: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// List registered stage types
    Stages,
}

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Registry used by every command: the built-in stages
///
/// Installed globally on first use so that workflows resolve stages the same
/// way an embedding application would.
pub fn builtin_registry() -> PipeflowResult<std::sync::Arc<StageRegistry>> {
    match StageRegistry::global() {
        Ok(registry) => Ok(registry),
        Err(_) => StageRegistry::with_builtins()?.install_global(),
    }
}
