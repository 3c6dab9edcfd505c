// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipeline validation
//!
//! Reports every problem in a loaded configuration at once, instead of
//! stopping at the first one the way workflow creation does.

use crate::config::check_config;
use crate::errors::PipeflowError;
use crate::pipeline::{GraphBuilder, PipelineConfig, StageKind};
use crate::stages::StageRegistry;

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a configuration against the stages available in `registry`
    pub fn validate(config: &PipelineConfig, registry: &StageRegistry) -> ValidationResult {
        let mut result = ValidationResult::new();

        for error in check_config(config) {
            result.add_error(&error);
        }

        // Report every unresolvable stage, not just the first
        for stage in config.stages() {
            if let Err(e) = registry.resolve_for(stage) {
                result.add_error(&e.to_string());
            }
        }

        // Graph checks need every stage resolved
        if result.is_valid() {
            match GraphBuilder::build(config, registry) {
                Ok(graph) => {
                    for (stage, output) in graph.unconsumed_outputs() {
                        let kind = graph.node(stage).map(|n| n.kind());
                        if kind == Some(StageKind::Processor) {
                            result.add_warning(&format!(
                                "Stage '{}': output '{}' is not consumed by any stage",
                                stage, output
                            ));
                        }
                    }
                }
                Err(e @ PipeflowError::CycleDetected { .. })
                | Err(e @ PipeflowError::DanglingInput { .. })
                | Err(e @ PipeflowError::AmbiguousInput { .. }) => {
                    result.add_error(&e.to_string());
                }
                Err(e) => {
                    result.add_error(&format!("Graph construction failed: {}", e));
                }
            }
        }

        if config.execution.stage_timeout_secs.is_none() {
            result.add_warning("No stage timeout configured; a hung stage will block its run indefinitely");
        }

        result
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
