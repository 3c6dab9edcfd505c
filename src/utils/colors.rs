// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::pipeline::StageStatus;

/// Symbol shown next to a stage in run output
pub fn status_symbol(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
        StageStatus::Skipped => "○".dimmed(),
        StageStatus::Running => "→".blue(),
        StageStatus::Pending => "·".dimmed(),
    }
}

/// Check if colors should be disabled
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    std::env::var_os("NO_COLOR").is_none()
}
