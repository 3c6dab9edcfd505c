// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Run command - create a workflow and execute it

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use super::{builtin_registry, OutputFormat};
use crate::pipeline::{RunSummary, StageStatus, StopSignal, WorkflowFactory};
use crate::utils::{create_spinner, status_symbol};

/// Run the pipeline
pub async fn run(config: PathBuf, workers: Option<u16>, format: OutputFormat, verbose: bool) -> Result<()> {
    let factory = WorkflowFactory::new(builtin_registry()?);

    let mut workflow = factory.create(config.as_path())?;
    if let Some(workers) = workers {
        workflow = workflow.with_workers(usize::from(workers));
    }

    if verbose && format == OutputFormat::Text {
        println!("{} {}", "Workflow:".bold(), workflow.id());
        println!("  Fingerprint: {}", workflow.fingerprint().dimmed());
        println!("  Workers: {}", workflow.execution().workers);
        println!();
    }

    // Ctrl-C stops pending stages; running ones finish
    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.stop();
        }
    });

    let spinner = (format == OutputFormat::Text)
        .then(|| create_spinner(&format!("Running {} ({} stages)", workflow.name(), workflow.graph().len())));

    let summary = workflow.run_with_stop(stop).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Text => print_summary(&summary, verbose),
    }

    if summary.succeeded {
        Ok(())
    } else if summary.cancelled {
        Err(miette::miette!("Run of '{}' was stopped", summary.workflow_id))
    } else {
        Err(miette::miette!(
            "Run of '{}' failed: {}",
            summary.workflow_id,
            summary.failed_stages().join(", ")
        ))
    }
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    for stage in &summary.stages {
        let detail = match stage.status {
            StageStatus::Succeeded => format!("{} records", stage.records.unwrap_or(0)),
            StageStatus::Failed => stage
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            StageStatus::Skipped => stage.skip_reason.clone().unwrap_or_default(),
            _ => String::new(),
        };

        let timing = if verbose {
            format!(" ({}ms)", stage.duration_ms)
        } else {
            String::new()
        };

        println!(
            "  {} {} {}{}",
            status_symbol(stage.status),
            stage.name,
            detail.dimmed(),
            timing.dimmed()
        );
    }

    println!();
    if summary.succeeded {
        println!(
            "{}",
            format!("Workflow completed in {}ms", summary.duration_ms).green().bold()
        );
    } else {
        println!("{}", "Workflow did not complete successfully".red().bold());
    }
}
