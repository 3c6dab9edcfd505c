// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Validate command - check a pipeline document

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::builtin_registry;
use crate::config::{ConfigLoader, ConfigRef};
use crate::pipeline::PipelineValidator;

/// Run the validate command
pub async fn run(config_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let registry = builtin_registry()?;
    let reference = ConfigRef::from(config_path.as_path());

    let config = match ConfigLoader::new().load(&reference) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("  {} Failed to load pipeline document", "✗".red());
            eprintln!();
            return Err(e.into());
        }
    };

    println!("  {} Pipeline document parsed ({})", "✓".green(), reference.format());

    let validation = PipelineValidator::validate(&config, &registry);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if validation.has_warnings() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        if let Some(name) = &config.name {
            println!("  Name: {}", name);
        }
        println!("  Stages: {}", config.stages().count());
        for stage in config.stages() {
            let inputs = if stage.inputs.is_empty() {
                String::new()
            } else {
                format!(" [inputs: {}]", stage.inputs.join(", "))
            };
            println!(
                "    - {} ({}/{}){}",
                stage.name,
                stage.kind,
                stage.stage_type,
                inputs.dimmed()
            );
        }
    }

    println!();

    if !validation.is_valid() {
        return Err(miette::miette!("Pipeline validation failed"));
    }

    if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
    }
    Ok(())
}
