// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Stage contract
//!
//! Concrete connectors, processors, and sinks live outside this crate. They
//! plug in by implementing [`StageFactory`] and registering it in a
//! [`StageRegistry`] under a `(kind, name)` pair.

mod builtin;
mod registry;

pub use builtin::{
    FailStageFactory, LogSinkFactory, NullSinkFactory, PassthroughFactory, StaticSourceFactory,
};
pub use registry::{StageRegistry, StageRegistryBuilder};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::StageError;
use crate::pipeline::StageDescriptor;

/// Output of one stage execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageResult {
    /// Number of records handled
    pub records: u64,

    /// Data handed to downstream stages
    pub payload: Value,
}

impl StageResult {
    /// A result carrying only a record count
    pub fn new(records: u64) -> Self {
        Self {
            records,
            payload: Value::Null,
        }
    }

    /// A result carrying data for downstream stages
    pub fn with_payload(records: u64, payload: Value) -> Self {
        Self { records, payload }
    }
}

/// Results of every upstream stage, keyed by the consuming input name
#[derive(Debug, Clone, Default)]
pub struct StageInput {
    results: BTreeMap<String, Arc<StageResult>>,
}

impl StageInput {
    /// Create an empty input set (what sources receive)
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, input: impl Into<String>, result: Arc<StageResult>) {
        self.results.insert(input.into(), result);
    }

    /// Result delivered under `input`
    pub fn get(&self, input: &str) -> Option<&StageResult> {
        self.results.get(input).map(Arc::as_ref)
    }

    /// Result delivered under `input`, or a [`StageError::MissingInput`]
    pub fn require(&self, input: &str) -> Result<&StageResult, StageError> {
        self.get(input).ok_or_else(|| StageError::MissingInput {
            input: input.to_string(),
        })
    }

    /// Iterate inputs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageResult)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Sum of upstream record counts
    pub fn total_records(&self) -> u64 {
        self.results.values().map(|r| r.records).sum()
    }
}

/// A runnable stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Run the stage against the results of its upstream stages
    async fn execute(&self, input: StageInput) -> Result<StageResult, StageError>;
}

/// Produces stages from their descriptors
///
/// Factories are shared across runs and threads; a fresh stage is created
/// for every run.
pub trait StageFactory: Send + Sync {
    /// Instantiate a stage for `descriptor`
    fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError>;

    /// One-line description shown when listing stage types
    fn description(&self) -> &str {
        ""
    }
}

impl<F> StageFactory for F
where
    F: Fn(&StageDescriptor) -> Result<Box<dyn Stage>, StageError> + Send + Sync,
{
    fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        self(descriptor)
    }
}
