// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Built-in stages
//!
//! Generic stages for smoke-testing pipelines without external connectors.

use async_trait::async_trait;
use serde_json::Value;

use super::{Stage, StageFactory, StageInput, StageResult};
use crate::errors::StageError;
use crate::pipeline::StageDescriptor;

/// `source/static`: emits the records listed in `options.records`
pub struct StaticSourceFactory;

struct StaticSource {
    records: Vec<Value>,
}

impl StageFactory for StaticSourceFactory {
    fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        let records = match descriptor.option("records") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(StageError::Instantiate {
                    message: format!("'records' must be an array, got {}", other),
                })
            }
        };

        Ok(Box::new(StaticSource { records }))
    }

    fn description(&self) -> &str {
        "Emits the records listed in options.records"
    }
}

#[async_trait]
impl Stage for StaticSource {
    async fn execute(&self, _input: StageInput) -> Result<StageResult, StageError> {
        Ok(StageResult::with_payload(
            self.records.len() as u64,
            Value::Array(self.records.clone()),
        ))
    }
}

/// `processor/passthrough`: concatenates upstream payloads
pub struct PassthroughFactory;

struct Passthrough;

impl StageFactory for PassthroughFactory {
    fn create(&self, _descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(Passthrough))
    }

    fn description(&self) -> &str {
        "Forwards the records of all inputs unchanged"
    }
}

#[async_trait]
impl Stage for Passthrough {
    async fn execute(&self, input: StageInput) -> Result<StageResult, StageError> {
        let mut merged = Vec::new();
        for (_, result) in input.iter() {
            match &result.payload {
                Value::Null => {}
                Value::Array(items) => merged.extend(items.iter().cloned()),
                other => merged.push(other.clone()),
            }
        }

        Ok(StageResult::with_payload(
            input.total_records(),
            Value::Array(merged),
        ))
    }
}

/// `processor/fail`: always fails with `options.message`
pub struct FailStageFactory;

struct FailStage {
    message: String,
}

impl StageFactory for FailStageFactory {
    fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        let message = descriptor
            .option_str("message")
            .unwrap_or("stage configured to fail")
            .to_string();
        Ok(Box::new(FailStage { message }))
    }

    fn description(&self) -> &str {
        "Always fails; useful for exercising failure handling"
    }
}

#[async_trait]
impl Stage for FailStage {
    async fn execute(&self, _input: StageInput) -> Result<StageResult, StageError> {
        Err(StageError::failed(self.message.clone()))
    }
}

/// `sink/log`: logs how many records each input delivered
pub struct LogSinkFactory;

struct LogSink {
    name: String,
}

impl StageFactory for LogSinkFactory {
    fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(LogSink {
            name: descriptor.name.clone(),
        }))
    }

    fn description(&self) -> &str {
        "Logs the record count of every input"
    }
}

#[async_trait]
impl Stage for LogSink {
    async fn execute(&self, input: StageInput) -> Result<StageResult, StageError> {
        for (name, result) in input.iter() {
            tracing::info!(sink = %self.name, input = name, records = result.records, "Received records");
        }
        Ok(StageResult::new(input.total_records()))
    }
}

/// `sink/null`: discards its input
pub struct NullSinkFactory;

struct NullSink;

impl StageFactory for NullSinkFactory {
    fn create(&self, _descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(NullSink))
    }

    fn description(&self) -> &str {
        "Discards all records"
    }
}

#[async_trait]
impl Stage for NullSink {
    async fn execute(&self, input: StageInput) -> Result<StageResult, StageError> {
        Ok(StageResult::new(input.total_records()))
    }
}
