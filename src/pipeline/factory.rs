// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Workflow factory
//!
//! Turns a configuration reference into a [`Workflow`]: load, validate,
//! resolve every stage against the registry, then build the graph. Any
//! failure aborts creation; there is no partially built workflow.

use std::sync::Arc;

use crate::config::{ensure_valid, ConfigLoader, ConfigRef};
use crate::errors::PipeflowResult;
use crate::pipeline::workflow::{Workflow, WorkflowId};
use crate::pipeline::{GraphBuilder, PipelineConfig};
use crate::stages::StageRegistry;

/// Materializes workflows from pipeline documents
#[derive(Debug, Clone)]
pub struct WorkflowFactory {
    loader: ConfigLoader,
    registry: Arc<StageRegistry>,
}

impl WorkflowFactory {
    /// Factory resolving stages against `registry`
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self {
            loader: ConfigLoader::new(),
            registry,
        }
    }

    /// Factory bound to the process-wide registry
    pub fn from_global() -> PipeflowResult<Self> {
        Ok(Self::new(StageRegistry::global()?))
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Load the document behind `reference` and build its workflow
    pub fn create(&self, reference: impl Into<ConfigRef>) -> PipeflowResult<Workflow> {
        let reference = reference.into();
        let config = self.loader.load(&reference)?;
        self.create_from_config(WorkflowId::from_ref(&reference), config)
    }

    /// Build a workflow from an already loaded configuration
    ///
    /// The configuration goes through the same checks as a loaded document.
    pub fn create_from_config(&self, id: WorkflowId, config: PipelineConfig) -> PipeflowResult<Workflow> {
        ensure_valid(&config)?;
        let graph = GraphBuilder::build(&config, &self.registry)?;
        let workflow = Workflow::new(id, config, graph);

        tracing::info!(
            workflow = %workflow.id(),
            stages = workflow.graph().len(),
            fingerprint = &workflow.fingerprint()[..12],
            "Created workflow"
        );

        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipeflowError;
    use crate::pipeline::{ExecutionConfig, StageDescriptor, StageKind};
    use std::io::Write;

    fn factory() -> WorkflowFactory {
        WorkflowFactory::new(Arc::new(StageRegistry::with_builtins().unwrap()))
    }

    fn write_config(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        (dir, path)
    }

    #[test]
    fn test_create_from_file() {
        let (_dir, path) = write_config(
            "orders.yaml",
            "source:\n  type: static\nprocessors:\n  - type: passthrough\nsink:\n  type: log\n",
        );

        let workflow = factory().create(path.as_path()).unwrap();
        assert_eq!(workflow.id().as_str(), "orders");
        assert_eq!(workflow.graph().order_names(), vec!["static", "passthrough", "log"]);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let result = factory().create("/nonexistent/pipeline.json");
        assert!(matches!(result, Err(PipeflowError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_unknown_stage_type_aborts_creation() {
        let (_dir, path) = write_config(
            "warehouse.json",
            r#"{"source": {"type": "redshift"}, "sink": {"type": "null"}}"#,
        );

        let result = factory().create(path);
        assert!(matches!(result, Err(PipeflowError::UnknownStage { .. })));
    }

    #[test]
    fn test_same_config_same_workflow_shape() {
        let (_dir, path) = write_config(
            "twice.json",
            r#"{"source": {"type": "static"}, "sink": {"type": "null"}}"#,
        );
        let factory = factory();

        let a = factory.create(path.as_path()).unwrap();
        let b = factory.create(path.as_path()).unwrap();
        assert_eq!(a.graph().order_names(), b.graph().order_names());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_in_memory_config_is_checked() {
        let config = PipelineConfig {
            version: "1".into(),
            name: None,
            source: StageDescriptor::new(StageKind::Source, "static", "S"),
            processors: vec![StageDescriptor::new(StageKind::Processor, "passthrough", "island")],
            sink: StageDescriptor::new(StageKind::Sink, "null", "sink").with_inputs(["island"]),
            execution: ExecutionConfig::default(),
        };

        match factory().create_from_config(WorkflowId::new("island"), config) {
            Err(PipeflowError::ConfigInvalid { reason, .. }) => {
                assert!(reason.contains("processor 'island': at least one input is required"));
            }
            other => panic!("expected ConfigInvalid, got {:?}", other.map(|w| w.id().clone())),
        }
    }
}
