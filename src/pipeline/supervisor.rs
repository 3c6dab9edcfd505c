// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Execution supervisor
//!
//! Drives one run of a stage graph. Ready stages are spawned onto the tokio
//! runtime, bounded by a worker semaphore. A stage is released only after
//! every upstream stage succeeded; dependents of a failed or skipped stage
//! are skipped without being attempted. Failures never abort independent
//! branches.

use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::errors::StageError;
use crate::pipeline::{
    ExecutionConfig, StageDescriptor, StageGraph, StageKind, StageStatus, StatusBoard,
};
use crate::stages::{StageFactory, StageInput, StageResult};

/// External request to stop a run
///
/// Stopping skips every stage that has not started yet; stages already
/// running finish (or time out) normally.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the stop; idempotent
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once [`stop`](Self::stop) has been called
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Final state of one stage within a run
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub kind: StageKind,
    pub status: StageStatus,

    /// Records reported by the stage, when it succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<u64>,

    /// Why the stage failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,

    /// Why the stage was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    pub duration_ms: u64,
}

impl StageOutcome {
    fn pending(name: &str, kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: StageStatus::Pending,
            records: None,
            error: None,
            skip_reason: None,
            duration_ms: 0,
        }
    }
}

/// Aggregate result of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workflow_id: String,
    pub run_id: u64,

    /// Per-stage outcomes in execution order
    pub stages: Vec<StageOutcome>,

    /// True iff every stage succeeded
    pub succeeded: bool,

    /// Whether a stop signal cut the run short
    pub cancelled: bool,

    pub duration_ms: u64,
}

impl RunSummary {
    /// Outcome of a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Final status of a stage by name
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    /// Stages that ended in `status`
    pub fn with_status(&self, status: StageStatus) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(move |s| s.status == status)
    }

    /// Names of the stages that failed
    pub fn failed_stages(&self) -> Vec<&str> {
        self.with_status(StageStatus::Failed)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// What a stage task reports back to the supervisor
struct StageAttempt {
    node: NodeIndex,
    result: Result<StageResult, StageError>,
    duration: Duration,
}

/// Runs a stage graph once, tracking status in a [`StatusBoard`]
pub(crate) struct ExecutionSupervisor<'a> {
    graph: &'a StageGraph,
    statuses: &'a StatusBoard,
    workers: usize,
    stage_timeout: Option<Duration>,
}

impl<'a> ExecutionSupervisor<'a> {
    /// Create a supervisor; `statuses` must have been reset to pending
    ///
    /// `statuses` holds one cell per stage of `graph`.
    pub(crate) fn new(graph: &'a StageGraph, statuses: &'a StatusBoard, execution: &ExecutionConfig) -> Self {
        debug_assert_eq!(
            statuses.len(),
            graph.len(),
            "status board does not match the stage graph"
        );
        Self {
            graph,
            statuses,
            workers: execution.workers.max(1),
            stage_timeout: execution.stage_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Execute every stage and report the outcome
    ///
    /// Never fails: stage errors are captured into the summary.
    pub(crate) async fn supervise(&self, workflow_id: &str, run_id: u64, stop: &StopSignal) -> RunSummary {
        let start = Instant::now();
        let _abandon = AbandonGuard {
            graph: self.graph,
            statuses: self.statuses,
        };
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<StageAttempt> = JoinSet::new();
        let mut results: HashMap<NodeIndex, Arc<StageResult>> = HashMap::new();
        let mut outcomes: HashMap<NodeIndex, StageOutcome> = self
            .graph
            .order_indices()
            .iter()
            .map(|n| {
                let stage = self.graph.stage_at(*n);
                (*n, StageOutcome::pending(stage.name(), stage.kind()))
            })
            .collect();
        let mut cancelled = false;

        loop {
            if !cancelled && stop.is_stopped() {
                cancelled = true;
                tracing::info!(workflow = workflow_id, run_id, "Stop requested, skipping pending stages");
                self.skip_pending(&mut outcomes);
            }

            if !cancelled {
                self.release_ready(&semaphore, &mut tasks, &results, &mut outcomes);
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = stop.stopped(), if !cancelled => continue,
            };

            match joined {
                Some(Ok(attempt)) => self.record(attempt, &mut results, &mut outcomes),
                Some(Err(join_error)) => {
                    tracing::error!(workflow = workflow_id, error = %join_error, "Stage task could not be joined");
                }
                None => break,
            }
        }

        self.settle_leftovers(&mut outcomes);

        let stages: Vec<StageOutcome> = self
            .graph
            .order_indices()
            .iter()
            .filter_map(|n| outcomes.remove(n))
            .collect();
        let succeeded = stages.iter().all(|s| s.status == StageStatus::Succeeded);

        RunSummary {
            workflow_id: workflow_id.to_string(),
            run_id,
            stages,
            succeeded,
            cancelled,
            duration_ms: millis(start.elapsed()),
        }
    }

    /// Walk the fixed order once, skipping blocked stages and spawning ready ones
    fn release_ready(
        &self,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<StageAttempt>,
        results: &HashMap<NodeIndex, Arc<StageResult>>,
        outcomes: &mut HashMap<NodeIndex, StageOutcome>,
    ) {
        for &node in self.graph.order_indices() {
            let cell = self.statuses.cell(node.index());
            if cell.load() != StageStatus::Pending {
                continue;
            }

            // Upstream statuses are read in order, so skips cascade in one pass
            let blocker = self
                .graph
                .upstream(node)
                .find(|(up, _)| self.statuses.cell(up.index()).load().blocks_dependents());

            if let Some((up, _)) = blocker {
                let upstream = self.graph.stage_at(up);
                let reason = format!(
                    "upstream stage '{}' {}",
                    upstream.name(),
                    self.statuses.cell(up.index()).load()
                );
                self.mark_skipped(node, reason, outcomes);
                continue;
            }

            let ready = self
                .graph
                .upstream(node)
                .all(|(up, _)| self.statuses.cell(up.index()).load() == StageStatus::Succeeded);
            if !ready {
                continue;
            }

            let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
                // Every worker is busy; retry after the next completion
                return;
            };

            if !cell.transition(StageStatus::Pending, StageStatus::Running) {
                continue;
            }

            let mut input = StageInput::new();
            for (up, input_name) in self.graph.upstream(node) {
                if let Some(result) = results.get(&up) {
                    input.insert(input_name, Arc::clone(result));
                }
            }

            if let Some(outcome) = outcomes.get_mut(&node) {
                outcome.status = StageStatus::Running;
            }

            tracing::debug!(stage = self.graph.stage_at(node).name(), "Stage running");
            self.spawn_stage(node, input, permit, tasks);
        }
    }

    fn spawn_stage(
        &self,
        node: NodeIndex,
        input: StageInput,
        permit: OwnedSemaphorePermit,
        tasks: &mut JoinSet<StageAttempt>,
    ) {
        let stage = self.graph.stage_at(node);
        let factory = stage.factory();
        let descriptor = stage.descriptor().clone();
        let stage_timeout = self.stage_timeout;

        tasks.spawn(async move {
            let _permit = permit;
            let started = Instant::now();

            // Run in a nested task so a panicking stage is reported, not lost
            let mut handle = AbortOnDrop(tokio::spawn(run_stage(
                factory,
                descriptor,
                input,
                stage_timeout,
            )));

            let result = match (&mut handle.0).await {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => Err(StageError::Panicked {
                    message: panic_message(join_error.into_panic()),
                }),
                Err(_) => Err(StageError::failed("stage task was cancelled")),
            };

            StageAttempt {
                node,
                result,
                duration: started.elapsed(),
            }
        });
    }

    fn record(
        &self,
        attempt: StageAttempt,
        results: &mut HashMap<NodeIndex, Arc<StageResult>>,
        outcomes: &mut HashMap<NodeIndex, StageOutcome>,
    ) {
        let StageAttempt { node, result, duration } = attempt;
        let cell = self.statuses.cell(node.index());
        let name = self.graph.stage_at(node).name();
        let Some(outcome) = outcomes.get_mut(&node) else {
            return;
        };
        outcome.duration_ms = millis(duration);

        match result {
            Ok(result) => {
                cell.transition(StageStatus::Running, StageStatus::Succeeded);
                tracing::debug!(stage = name, records = result.records, "Stage succeeded");
                outcome.status = StageStatus::Succeeded;
                outcome.records = Some(result.records);
                results.insert(node, Arc::new(result));
            }
            Err(error) => {
                cell.transition(StageStatus::Running, StageStatus::Failed);
                tracing::warn!(stage = name, error = %error, "Stage failed");
                outcome.status = StageStatus::Failed;
                outcome.error = Some(error);
            }
        }
    }

    fn mark_skipped(&self, node: NodeIndex, reason: String, outcomes: &mut HashMap<NodeIndex, StageOutcome>) {
        if !self
            .statuses
            .cell(node.index())
            .transition(StageStatus::Pending, StageStatus::Skipped)
        {
            return;
        }

        tracing::debug!(stage = self.graph.stage_at(node).name(), reason = %reason, "Stage skipped");
        if let Some(outcome) = outcomes.get_mut(&node) {
            outcome.status = StageStatus::Skipped;
            outcome.skip_reason = Some(reason);
        }
    }

    fn skip_pending(&self, outcomes: &mut HashMap<NodeIndex, StageOutcome>) {
        for &node in self.graph.order_indices() {
            self.mark_skipped(node, "run stopped".to_string(), outcomes);
        }
    }

    /// Close out stages whose task vanished without reporting back
    fn settle_leftovers(&self, outcomes: &mut HashMap<NodeIndex, StageOutcome>) {
        for &node in self.graph.order_indices() {
            let cell = self.statuses.cell(node.index());
            if cell.transition(StageStatus::Running, StageStatus::Failed) {
                if let Some(outcome) = outcomes.get_mut(&node) {
                    outcome.status = StageStatus::Failed;
                    outcome.error = Some(StageError::failed("stage task was lost"));
                }
            }
        }
    }
}

/// Aborts the wrapped stage task when the supervising task goes away
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fails stages left running when a run is dropped before it completes
///
/// A run that completes has already settled every cell, so this is a no-op.
struct AbandonGuard<'a> {
    graph: &'a StageGraph,
    statuses: &'a StatusBoard,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        for &node in self.graph.order_indices() {
            self.statuses
                .cell(node.index())
                .transition(StageStatus::Running, StageStatus::Failed);
        }
    }
}

/// Instantiate a stage and execute it, bounded by `stage_timeout`
async fn run_stage(
    factory: Arc<dyn StageFactory>,
    descriptor: StageDescriptor,
    input: StageInput,
    stage_timeout: Option<Duration>,
) -> Result<StageResult, StageError> {
    let runnable = factory.create(&descriptor).map_err(|e| match e {
        StageError::Instantiate { .. } => e,
        other => StageError::Instantiate {
            message: other.to_string(),
        },
    })?;

    match stage_timeout {
        Some(limit) => tokio::time::timeout(limit, runnable.execute(input))
            .await
            .map_err(|_| StageError::Timeout {
                seconds: limit.as_secs(),
            })?,
        None => runnable.execute(input).await,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
