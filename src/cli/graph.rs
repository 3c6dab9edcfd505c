// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Graph command - visualize a pipeline as a graph

use miette::Result;
use std::path::PathBuf;

use super::{builtin_registry, GraphFormat};
use crate::pipeline::WorkflowFactory;

/// Run the graph command
pub async fn run(config: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let workflow = WorkflowFactory::new(builtin_registry()?).create(config.as_path())?;
    let graph = workflow.graph();

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
