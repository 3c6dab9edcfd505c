// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Error types
//!
//! Build-time failures surface as [`PipeflowError`] and always abort workflow
//! creation. Run-time failures of individual stages are [`StageError`]s and
//! are captured into the run summary instead of being raised.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::StageKind;

/// Result type for pipeflow operations
pub type PipeflowResult<T> = Result<T, PipeflowError>;

/// Main error type for pipeflow
#[derive(Error, Debug, Diagnostic)]
pub enum PipeflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline configuration not found: {reference}")]
    #[diagnostic(
        code(pipeflow::config_not_found),
        help("{reason}")
    )]
    ConfigNotFound { reference: String, reason: String },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(pipeflow::config_invalid))]
    ConfigInvalid {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Registry Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' uses unknown {kind} type '{stage_type}'")]
    #[diagnostic(
        code(pipeflow::unknown_stage),
        help("Run 'pipeflow stages' to list the registered stage types")
    )]
    UnknownStage {
        stage: String,
        kind: StageKind,
        stage_type: String,
    },

    #[error("No {kind} stage type named '{stage_type}' is registered")]
    #[diagnostic(
        code(pipeflow::unknown_stage_type),
        help("Run 'pipeflow stages' to list the registered stage types")
    )]
    UnknownStageType { kind: StageKind, stage_type: String },

    #[error("A {kind} stage named '{stage_type}' is already registered")]
    #[diagnostic(code(pipeflow::duplicate_stage))]
    DuplicateStage { kind: StageKind, stage_type: String },

    #[error("The global stage registry is already installed")]
    #[diagnostic(
        code(pipeflow::registry_already_installed),
        help("Register every stage type before installing the registry, then install it once")
    )]
    RegistryAlreadyInstalled,

    #[error("The global stage registry has not been installed")]
    #[diagnostic(
        code(pipeflow::registry_not_installed),
        help("Call StageRegistry::install_global during startup, before creating workflows")
    )]
    RegistryNotInstalled,

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' reads input '{input}' but no stage produces it")]
    #[diagnostic(
        code(pipeflow::dangling_input),
        help("Check that '{input}' is the name or output of an upstream stage")
    )]
    DanglingInput { stage: String, input: String },

    #[error("Stage '{stage}' reads input '{input}' which is produced by more than one stage: {}", .producers.join(", "))]
    #[diagnostic(
        code(pipeflow::ambiguous_input),
        help("Give each producer a distinct 'output' name")
    )]
    AmbiguousInput {
        stage: String,
        input: String,
        producers: Vec<String>,
    },

    #[error("Circular dependency detected between stages: {}", .stages.join(", "))]
    #[diagnostic(
        code(pipeflow::cycle_detected),
        help("Review the 'input' fields of these stages to remove the cycle")
    )]
    CycleDetected { stages: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No workflow registered under '{id}'")]
    #[diagnostic(code(pipeflow::workflow_not_registered))]
    WorkflowNotRegistered { id: String },
}

impl PipeflowError {
    /// Create a configuration error without a help hint
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
            help: None,
        }
    }
}

/// Failure of a single stage execution
///
/// Recorded against the stage in the run summary; never fatal to stages
/// that do not depend on the failed one.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    #[error("{message}")]
    Failed { message: String },

    #[error("failed to instantiate stage: {message}")]
    Instantiate { message: String },

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("stage panicked: {message}")]
    Panicked { message: String },

    #[error("missing input '{input}'")]
    MissingInput { input: String },
}

impl StageError {
    /// Create a generic execution failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        Self::failed(e.to_string())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        Self::failed(e.to_string())
    }
}
