// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! # pipeflow - Configuration-driven pipeline materialization
//!
//! `pipeflow` turns a declarative pipeline document into an executable
//! task graph and runs it.
//!
//! ## Features
//!
//! - **Declarative pipelines** - One source, any number of processors, one sink
//! - **Pluggable stages** - Implementations are looked up in a registry by kind and name
//! - **DAG execution** - Stages run as soon as their inputs are ready, bounded by a worker pool
//! - **Failure isolation** - A failing stage only skips its own dependents
//!
//! ## Quick Start
//!
//! ```bash
//! # Check a pipeline document
//! pipeflow validate profiler.json
//!
//! # Show the stage graph
//! pipeflow graph profiler.json --format mermaid
//!
//! # Run it
//! pipeflow run profiler.json --workers 2
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod stages;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigLoader, ConfigRef};
pub use errors::{PipeflowError, PipeflowResult, StageError};
pub use pipeline::{RunSummary, StageKind, StageStatus, StopSignal, Workflow, WorkflowFactory};
pub use stages::{Stage, StageFactory, StageRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
