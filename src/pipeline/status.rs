// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Stage status tracking
//!
//! Each stage owns one atomic status cell. Every transition is a
//! compare-and-swap, so two workers can never both move a stage into
//! `running`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Execution status of a stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StageStatus {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Skipped = 4,
}

impl StageStatus {
    /// Whether the stage can no longer change within this run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Whether dependents of a stage in this status must be skipped
    pub fn blocks_dependents(self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Skipped,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One atomically updated status
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    fn new() -> Self {
        Self(AtomicU8::new(StageStatus::Pending as u8))
    }

    /// Current status
    pub fn load(&self) -> StageStatus {
        StageStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; returns false if the status was not `from`
    pub fn transition(&self, from: StageStatus, to: StageStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn reset(&self) {
        self.0.store(StageStatus::Pending as u8, Ordering::Release);
    }
}

/// Status cells for every stage of a graph, indexed by node position
#[derive(Debug)]
pub struct StatusBoard {
    cells: Vec<StatusCell>,
}

impl StatusBoard {
    /// All stages pending
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| StatusCell::new()).collect(),
        }
    }

    /// Cell for the stage at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range for the graph this board was built for.
    pub fn cell(&self, index: usize) -> &StatusCell {
        &self.cells[index]
    }

    pub fn get(&self, index: usize) -> Option<StageStatus> {
        self.cells.get(index).map(StatusCell::load)
    }

    /// Put every stage back to pending
    pub fn reset(&self) {
        for cell in &self.cells {
            cell.reset();
        }
    }

    /// Whether every stage reached a terminal status
    pub fn all_terminal(&self) -> bool {
        self.cells.iter().all(|c| c.load().is_terminal())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_transition_requires_expected_state() {
        let board = StatusBoard::new(1);
        let cell = board.cell(0);

        assert!(cell.transition(StageStatus::Pending, StageStatus::Running));
        assert!(!cell.transition(StageStatus::Pending, StageStatus::Running));
        assert!(cell.transition(StageStatus::Running, StageStatus::Succeeded));
        assert_eq!(cell.load(), StageStatus::Succeeded);
    }

    #[test]
    fn test_only_one_racer_wins() {
        let board = Arc::new(StatusBoard::new(1));
        let winners: usize = (0..8)
            .map(|_| {
                let board = Arc::clone(&board);
                std::thread::spawn(move || {
                    board.cell(0).transition(StageStatus::Pending, StageStatus::Running)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_reset_and_terminal() {
        let board = StatusBoard::new(2);
        assert!(!board.all_terminal());

        board.cell(0).transition(StageStatus::Pending, StageStatus::Skipped);
        board.cell(1).transition(StageStatus::Pending, StageStatus::Failed);
        assert!(board.all_terminal());

        board.reset();
        assert_eq!(board.get(0), Some(StageStatus::Pending));
        assert_eq!(board.get(5), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StageStatus::Succeeded.to_string(), "succeeded");
        assert!(StageStatus::Skipped.blocks_dependents());
        assert!(!StageStatus::Running.is_terminal());
    }
}
