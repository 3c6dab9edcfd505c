// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Executable workflows
//!
//! A [`Workflow`] owns a built stage graph plus the per-stage status cells
//! for its runs. Workflows are published to a scheduler through the
//! [`SchedulerScope`] trait; [`WorkflowCatalog`] is the in-memory scope.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::config::ConfigRef;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipeline::supervisor::{ExecutionSupervisor, RunSummary, StopSignal};
use crate::pipeline::{ExecutionConfig, PipelineConfig, StageGraph, StageStatus, StatusBoard};

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex is valid"))
}

/// Scheduler-safe workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Sanitize `raw` into an identifier
    ///
    /// Every character outside `[A-Za-z0-9_-]` becomes `_`. An empty result
    /// falls back to `workflow_<hash>` so the id is never blank.
    pub fn new(raw: &str) -> Self {
        let cleaned = unsafe_chars().replace_all(raw, "_");
        if cleaned.is_empty() {
            return Self::fallback(raw);
        }
        Self(cleaned.into_owned())
    }

    /// Derive the id from the file stem of a config reference
    pub fn from_ref(reference: &ConfigRef) -> Self {
        let raw = reference.as_str();
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        let stem = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if stem.is_empty() {
            return Self::fallback(raw);
        }
        Self::new(&stem)
    }

    fn fallback(raw: &str) -> Self {
        let hash = blake3::hash(raw.as_bytes()).to_hex();
        Self(format!("workflow_{}", &hash.as_str()[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for WorkflowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Somewhere workflows can be published for timed or triggered runs
pub trait SchedulerScope {
    /// Make `workflow` available under its id
    fn publish(&self, workflow: Arc<Workflow>);
}

/// A materialized pipeline, ready to run
pub struct Workflow {
    id: WorkflowId,
    name: Option<String>,
    execution: ExecutionConfig,
    fingerprint: String,
    graph: StageGraph,
    statuses: StatusBoard,
    run_lock: Mutex<()>,
    runs: AtomicU64,
}

impl Workflow {
    pub(crate) fn new(id: WorkflowId, config: PipelineConfig, graph: StageGraph) -> Self {
        let fingerprint = config.fingerprint();
        let statuses = StatusBoard::new(graph.len());

        Self {
            id,
            name: config.name,
            execution: config.execution,
            fingerprint,
            graph,
            statuses,
            run_lock: Mutex::new(()),
            runs: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Display name, falling back to the id
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Content hash of the configuration this workflow was built from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Override the worker count from the document
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.execution.workers = workers.max(1);
        self
    }

    /// Current status of every stage, in execution order
    pub fn statuses(&self) -> Vec<(&str, StageStatus)> {
        self.graph
            .nodes()
            .filter_map(|node| {
                let position = self.graph.position(node.name())?;
                Some((node.name(), self.statuses.get(position)?))
            })
            .collect()
    }

    /// Current status of one stage
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.statuses.get(self.graph.position(stage)?)
    }

    /// Number of runs started so far
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Execute every stage once
    pub async fn run(&self) -> RunSummary {
        self.run_with_stop(StopSignal::new()).await
    }

    /// Execute every stage once, honouring `stop`
    ///
    /// Concurrent calls queue behind each other; each run starts with every
    /// stage pending again.
    #[tracing::instrument(skip_all, fields(workflow = %self.id))]
    pub async fn run_with_stop(&self, stop: StopSignal) -> RunSummary {
        let _guard = self.run_lock.lock().await;
        let run_id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.statuses.reset();

        tracing::info!(run_id, stages = self.graph.len(), workers = self.execution().workers, "Starting run");

        let summary = ExecutionSupervisor::new(&self.graph, &self.statuses, self.execution())
            .supervise(self.id.as_str(), run_id, &stop)
            .await;

        if summary.succeeded {
            tracing::info!(run_id, duration_ms = summary.duration_ms, "Run succeeded");
        } else {
            tracing::warn!(
                run_id,
                failed = ?summary.failed_stages(),
                cancelled = summary.cancelled,
                "Run did not succeed"
            );
        }

        summary
    }

    /// Publish this workflow into `scope`
    pub fn register<S>(self, scope: &S) -> Arc<Self>
    where
        S: SchedulerScope + ?Sized,
    {
        let workflow = Arc::new(self);
        tracing::debug!(workflow = %workflow.id, "Registering workflow");
        scope.publish(Arc::clone(&workflow));
        workflow
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .field("stages", &self.graph.order_names())
            .finish()
    }
}

/// In-memory scheduler scope
#[derive(Debug, Default)]
pub struct WorkflowCatalog {
    workflows: RwLock<BTreeMap<WorkflowId, Arc<Workflow>>>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Workflow>> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<WorkflowId> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the workflow registered under `id`
    pub async fn trigger(&self, id: &str) -> PipeflowResult<RunSummary> {
        let workflow = self.get(id).ok_or_else(|| PipeflowError::WorkflowNotRegistered {
            id: id.to_string(),
        })?;
        Ok(workflow.run().await)
    }
}

impl SchedulerScope for WorkflowCatalog {
    fn publish(&self, workflow: Arc<Workflow>) {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.id().clone(), workflow);
    }
}
