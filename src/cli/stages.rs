// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Stages command - list registered stage types

use colored::Colorize;
use miette::Result;

use super::builtin_registry;

pub async fn run(verbose: bool) -> Result<()> {
    let registry = builtin_registry()?;

    println!("{}", "Registered stage types".bold());
    println!();

    for (kind, name, description) in registry.entries() {
        let key = format!("{:<24}", format!("{}/{}", kind, name));
        if verbose || !description.is_empty() {
            println!("  {} {}", key.cyan(), description.dimmed());
        } else {
            println!("  {}", key.trim_end().cyan());
        }
    }

    Ok(())
}
