// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Semantic checks on a resolved pipeline configuration.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipeline::{PipelineConfig, StageDescriptor};

/// Schema versions this build understands
pub const SUPPORTED_VERSIONS: &[&str] = &["1"];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("identifier pattern is valid")
    })
}

/// Check that a stage or type name is a usable identifier
pub fn is_valid_identifier(value: &str) -> bool {
    identifier_pattern().is_match(value)
}

/// Collect every semantic error in `config`
///
/// Returns an empty list when the configuration is usable. Graph-level
/// problems (dangling or ambiguous inputs, cycles) are left to the graph
/// builder.
pub fn check_config(config: &PipelineConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if !SUPPORTED_VERSIONS.contains(&config.version.as_str()) {
        errors.push(format!(
            "unsupported pipeline version '{}', expected one of: {}",
            config.version,
            SUPPORTED_VERSIONS.join(", ")
        ));
    }

    let mut seen_names = HashSet::new();
    for stage in config.stages() {
        check_stage(stage, &mut errors);

        if !seen_names.insert(stage.name.as_str()) {
            errors.push(format!("duplicate stage name '{}'", stage.name));
        }
    }

    if config.execution.workers == 0 {
        errors.push("execution.workers must be at least 1".to_string());
    }

    if config.execution.stage_timeout_secs == Some(0) {
        errors.push("execution.stage_timeout_secs must be greater than 0".to_string());
    }

    errors
}

/// Fail with `ConfigInvalid` naming every problem [`check_config`] finds
pub fn ensure_valid(config: &PipelineConfig) -> PipeflowResult<()> {
    let errors = check_config(config);
    if errors.is_empty() {
        return Ok(());
    }

    Err(PipeflowError::ConfigInvalid {
        reason: errors.join("; "),
        help: None,
    })
}

fn check_stage(stage: &StageDescriptor, errors: &mut Vec<String>) {
    let context = format!("{} '{}'", stage.kind, stage.name);

    if !is_valid_identifier(&stage.name) {
        errors.push(format!("{context}: invalid stage name"));
    }

    if !is_valid_identifier(&stage.stage_type) {
        errors.push(format!("{context}: invalid stage type '{}'", stage.stage_type));
    }

    for output in &stage.outputs {
        if !is_valid_identifier(output) {
            errors.push(format!("{context}: invalid output name '{output}'"));
        }
    }

    let mut seen_inputs = HashSet::new();
    for input in &stage.inputs {
        if input.trim().is_empty() {
            errors.push(format!("{context}: empty input name"));
        } else if !seen_inputs.insert(input.as_str()) {
            errors.push(format!("{context}: input '{input}' listed twice"));
        }
    }

    match stage.kind {
        crate::pipeline::StageKind::Source if !stage.inputs.is_empty() => {
            errors.push(format!("{context}: a source cannot declare inputs"));
        }
        crate::pipeline::StageKind::Processor | crate::pipeline::StageKind::Sink
            if stage.inputs.is_empty() =>
        {
            errors.push(format!("{context}: at least one input is required"));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExecutionConfig, StageKind};

    fn config(processors: Vec<StageDescriptor>) -> PipelineConfig {
        PipelineConfig {
            version: "1".into(),
            name: None,
            source: StageDescriptor::new(StageKind::Source, "static", "src"),
            processors,
            sink: StageDescriptor::new(StageKind::Sink, "null", "sink").with_inputs(["src"]),
            execution: ExecutionConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        assert!(check_config(&config(vec![])).is_empty());
    }

    #[test]
    fn test_duplicate_names() {
        let errors = check_config(&config(vec![
            StageDescriptor::new(StageKind::Processor, "p", "dup").with_inputs(["src"]),
            StageDescriptor::new(StageKind::Processor, "p", "dup").with_inputs(["src"]),
        ]));
        assert!(errors.iter().any(|e| e.contains("duplicate stage name 'dup'")));
    }

    #[test]
    fn test_unsupported_version() {
        let mut cfg = config(vec![]);
        cfg.version = "2".into();
        assert!(check_config(&cfg)[0].contains("unsupported pipeline version"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut cfg = config(vec![]);
        cfg.execution.workers = 0;
        assert!(check_config(&cfg).iter().any(|e| e.contains("workers")));
    }

    #[test]
    fn test_processor_requires_input() {
        let errors = check_config(&config(vec![StageDescriptor::new(
            StageKind::Processor,
            "p",
            "orphan",
        )]));
        assert!(errors.iter().any(|e| e.contains("at least one input")));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("orm-profiler"));
        assert!(is_valid_identifier("metadata_rest.v2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("-leading"));
        assert!(!is_valid_identifier("has space"));
    }
}
