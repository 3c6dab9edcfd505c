// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipeline document schema
//!
//! The on-disk shape of a pipeline configuration, before defaults are
//! applied. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipeflowError;
use crate::pipeline::{ExecutionConfig, PipelineConfig, StageDescriptor, StageKind, StageOptions};

/// Pipeline document as written by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDocument {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    /// Source connector
    pub source: SourceSpec,

    /// Processors, in declaration order
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,

    /// Sink
    pub sink: SinkSpec,

    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_version() -> String {
    "1".to_string()
}

/// Source stage declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub stage_type: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub output: Option<String>,

    #[serde(default)]
    pub options: Option<Value>,
}

/// Processor stage declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSpec {
    #[serde(rename = "type")]
    pub stage_type: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Upstream outputs; defaults to the preceding stage
    #[serde(default)]
    pub input: Option<InputSpec>,

    #[serde(default)]
    pub output: Option<String>,

    #[serde(default)]
    pub options: Option<Value>,
}

/// Sink stage declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    #[serde(rename = "type")]
    pub stage_type: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Upstream outputs; defaults to the last processor, or the source
    #[serde(default)]
    pub input: Option<InputSpec>,

    #[serde(default)]
    pub options: Option<Value>,
}

/// Input declaration: one upstream output or several
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Single(String),
    Multiple(Vec<String>),
}

impl InputSpec {
    /// Declared input names
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }
}

impl PipelineDocument {
    /// Apply defaults and produce typed descriptors
    ///
    /// Stage names default to the stage type; outputs default to the stage
    /// name; a missing input chains to the previously declared stage.
    pub fn resolve(self) -> Result<PipelineConfig, PipeflowError> {
        let source_name = self
            .source
            .name
            .unwrap_or_else(|| self.source.stage_type.clone());
        let mut source =
            StageDescriptor::new(StageKind::Source, self.source.stage_type, source_name.clone())
                .with_options(options_map(&source_name, self.source.options)?);
        if let Some(output) = self.source.output {
            source = source.with_output(output);
        }

        let mut previous_output = source.outputs.first().cloned().unwrap_or(source_name);
        let mut processors = Vec::with_capacity(self.processors.len());

        for spec in self.processors {
            let name = spec.name.unwrap_or_else(|| spec.stage_type.clone());
            let inputs = spec
                .input
                .map(|i| i.names())
                .unwrap_or_else(|| vec![previous_output.clone()]);

            let mut processor = StageDescriptor::new(StageKind::Processor, spec.stage_type, name.clone())
                .with_inputs(inputs)
                .with_options(options_map(&name, spec.options)?);
            if let Some(output) = spec.output {
                processor = processor.with_output(output);
            }

            previous_output = processor.outputs.first().cloned().unwrap_or(name);
            processors.push(processor);
        }

        let sink_name = self.sink.name.unwrap_or_else(|| self.sink.stage_type.clone());
        let sink_inputs = self
            .sink
            .input
            .map(|i| i.names())
            .unwrap_or_else(|| vec![previous_output]);
        let sink = StageDescriptor::new(StageKind::Sink, self.sink.stage_type, sink_name.clone())
            .with_inputs(sink_inputs)
            .with_options(options_map(&sink_name, self.sink.options)?);

        Ok(PipelineConfig {
            version: self.version,
            name: self.name,
            source,
            processors,
            sink,
            execution: self.execution,
        })
    }
}

fn options_map(stage: &str, options: Option<Value>) -> Result<StageOptions, PipeflowError> {
    match options {
        None | Some(Value::Null) => Ok(StageOptions::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(PipeflowError::ConfigInvalid {
            reason: format!("stage '{}': options must be an object, got {}", stage, other),
            help: Some("Wrap stage options in an object, e.g. \"options\": {}".into()),
        }),
    }
}
