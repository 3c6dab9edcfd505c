// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Typed pipeline descriptors
//!
//! The in-memory form of a loaded pipeline document: one descriptor per
//! stage with every default already applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque per-stage options, interpreted only by the stage implementation
pub type StageOptions = serde_json::Map<String, Value>;

/// Role of a stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Extracts records from an external system
    Source,
    /// Transforms records produced upstream
    Processor,
    /// Publishes records to an external system
    Sink,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Processor => write!(f, "processor"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

/// A single declared stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDescriptor {
    /// Stage name (unique within the pipeline)
    pub name: String,

    /// Stage role
    pub kind: StageKind,

    /// Registered implementation name, looked up together with `kind`
    pub stage_type: String,

    /// Names of the upstream outputs this stage consumes
    pub inputs: Vec<String>,

    /// Names this stage publishes its result under
    pub outputs: Vec<String>,

    /// Implementation-specific options
    pub options: StageOptions,
}

impl StageDescriptor {
    /// Create a descriptor whose output carries its own name (none for sinks)
    pub fn new(kind: StageKind, stage_type: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let outputs = match kind {
            StageKind::Sink => vec![],
            _ => vec![name.clone()],
        };

        Self {
            name,
            kind,
            stage_type: stage_type.into(),
            inputs: vec![],
            outputs,
            options: StageOptions::new(),
        }
    }

    /// Set the consumed input names
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the published output name
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.outputs = vec![output.into()];
        self
    }

    /// Set the stage options
    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }

    /// Look up a single option
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Look up a string option
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }
}

/// Execution settings carried by the pipeline document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of stages running at once
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-stage timeout; unset means stages may run indefinitely
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            stage_timeout_secs: None,
        }
    }
}

fn default_workers() -> usize {
    4
}

/// A fully resolved pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Schema version of the source document
    pub version: String,

    /// Optional display name
    pub name: Option<String>,

    /// The extraction stage
    pub source: StageDescriptor,

    /// Transform stages in declaration order
    pub processors: Vec<StageDescriptor>,

    /// The publishing stage
    pub sink: StageDescriptor,

    /// Execution settings
    pub execution: ExecutionConfig,
}

impl PipelineConfig {
    /// All stages in declaration order: source, processors, sink
    pub fn stages(&self) -> impl Iterator<Item = &StageDescriptor> {
        std::iter::once(&self.source)
            .chain(self.processors.iter())
            .chain(std::iter::once(&self.sink))
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages().find(|s| s.name == name)
    }

    /// Get all stage names in declaration order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages().map(|s| s.name.as_str()).collect()
    }

    /// Content hash of the resolved configuration
    ///
    /// Option maps are ordered, so equal configurations always hash equally.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }
}
