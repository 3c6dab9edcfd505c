// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipeline materialization and execution
//!
//! Descriptors describe a loaded pipeline, the graph builder wires them into
//! a DAG, and the factory wraps the result in a runnable [`Workflow`].

mod dag;
mod descriptor;
mod factory;
mod status;
mod supervisor;
mod validation;
mod workflow;

pub use dag::{GraphBuilder, StageGraph, StageNode};
pub use descriptor::{ExecutionConfig, PipelineConfig, StageDescriptor, StageKind, StageOptions};
pub use factory::WorkflowFactory;
pub use status::{StageStatus, StatusBoard, StatusCell};
pub use supervisor::{RunSummary, StageOutcome, StopSignal};
pub use validation::{PipelineValidator, ValidationResult};
pub use workflow::{SchedulerScope, Workflow, WorkflowCatalog, WorkflowId};
