// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! End-to-end tests: pipeline document on disk to finished run.

use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeflow::errors::{PipeflowError, StageError};
use pipeflow::pipeline::{
    SchedulerScope, StageDescriptor, StageKind, StageStatus, StopSignal, WorkflowCatalog,
    WorkflowFactory,
};
use pipeflow::stages::{Stage, StageInput, StageRegistry, StageResult};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(String),
    Finish(String),
}

#[derive(Default)]
struct Journal {
    events: Mutex<Vec<Event>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Journal {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &Event) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {:?}", event))
    }
}

/// Sleeps for `options.delay_ms`, then fails if `options.fail` is set
struct Recorded {
    name: String,
    delay: Duration,
    fail: bool,
    journal: Arc<Journal>,
}

#[async_trait]
impl Stage for Recorded {
    async fn execute(&self, input: StageInput) -> Result<StageResult, StageError> {
        self.journal.events.lock().unwrap().push(Event::Start(self.name.clone()));
        let now = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.journal.running.fetch_sub(1, Ordering::SeqCst);
        self.journal.events.lock().unwrap().push(Event::Finish(self.name.clone()));

        if self.fail {
            return Err(StageError::failed(format!("{} was told to fail", self.name)));
        }
        Ok(StageResult::new(input.total_records() + 1))
    }
}

fn registry(journal: &Arc<Journal>) -> Arc<StageRegistry> {
    let mut builder = StageRegistry::builder().with_builtins().unwrap();

    for kind in [StageKind::Source, StageKind::Processor, StageKind::Sink] {
        let journal = Arc::clone(journal);
        builder
            .register(
                kind,
                "recorded",
                move |d: &StageDescriptor| -> Result<Box<dyn Stage>, StageError> {
                    let delay = d
                        .option("delay_ms")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(10);
                    Ok(Box::new(Recorded {
                        name: d.name.clone(),
                        delay: Duration::from_millis(delay),
                        fail: d.option("fail").and_then(serde_json::Value::as_bool).unwrap_or(false),
                        journal: Arc::clone(&journal),
                    }))
                },
            )
            .unwrap();
    }

    Arc::new(builder.build())
}

fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    path
}

fn setup() -> (tempfile::TempDir, Arc<Journal>, WorkflowFactory) {
    let journal = Arc::new(Journal::default());
    let factory = WorkflowFactory::new(registry(&journal));
    (tempfile::tempdir().unwrap(), journal, factory)
}

#[tokio::test]
async fn test_linear_pipeline_runs_in_order() {
    let (dir, journal, factory) = setup();
    let path = write_config(
        &dir,
        "linear.json",
        r#"{
            "source": {"type": "recorded", "name": "S"},
            "processors": [{"type": "recorded", "name": "P", "input": "S"}],
            "sink": {"type": "recorded", "name": "sink", "input": "P"}
        }"#,
    );

    let workflow = factory.create(path).unwrap();
    assert_eq!(workflow.graph().order_names(), vec!["S", "P", "sink"]);

    let summary = workflow.run().await;
    assert!(summary.succeeded);
    assert_eq!(
        journal.events(),
        vec![
            Event::Start("S".into()),
            Event::Finish("S".into()),
            Event::Start("P".into()),
            Event::Finish("P".into()),
            Event::Start("sink".into()),
            Event::Finish("sink".into()),
        ]
    );
}

#[tokio::test]
async fn test_failed_source_skips_downstream() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "linear.json",
        r#"{
            "source": {"type": "recorded", "name": "S", "options": {"fail": true}},
            "processors": [{"type": "recorded", "name": "P", "input": "S"}],
            "sink": {"type": "recorded", "name": "sink", "input": "P"}
        }"#,
    );

    let summary = factory.create(path).unwrap().run().await;
    assert!(!summary.succeeded);
    assert_eq!(summary.status_of("S"), Some(StageStatus::Failed));
    assert_eq!(summary.status_of("P"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("sink"), Some(StageStatus::Skipped));
}

#[tokio::test]
async fn test_stage_never_starts_before_its_inputs_finish() {
    let (dir, journal, factory) = setup();
    let path = write_config(
        &dir,
        "diamond.yaml",
        r#"
source:
  type: recorded
  name: extract
processors:
  - type: recorded
    name: slow
    input: extract
    options:
      delay_ms: 60
  - type: recorded
    name: fast
    input: extract
    options:
      delay_ms: 5
  - type: recorded
    name: join
    input: [slow, fast]
sink:
  type: recorded
  name: publish
  input: join
"#,
    );

    let workflow = factory.create(path).unwrap();
    let summary = workflow.run().await;
    assert!(summary.succeeded);

    for stage in workflow.graph().nodes() {
        let started = journal.position(&Event::Start(stage.name().to_string()));
        for upstream in workflow.graph().dependencies(stage.name()).unwrap() {
            let finished = journal.position(&Event::Finish(upstream.to_string()));
            assert!(finished < started, "{} started before {} finished", stage.name(), upstream);
        }
    }

    // join received both branches
    assert_eq!(summary.stage("join").unwrap().records, Some(5));
}

#[tokio::test]
async fn test_failure_skips_only_dependents() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "branches.json",
        r#"{
            "source": {"type": "recorded", "name": "A"},
            "processors": [
                {"type": "recorded", "name": "B", "input": "A", "options": {"fail": true}},
                {"type": "recorded", "name": "C", "input": "B"},
                {"type": "recorded", "name": "D", "input": "A"}
            ],
            "sink": {"type": "recorded", "name": "sink", "input": "D"}
        }"#,
    );

    let summary = factory.create(path).unwrap().run().await;
    assert!(!summary.succeeded);
    assert_eq!(summary.status_of("B"), Some(StageStatus::Failed));
    assert_eq!(summary.status_of("C"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("D"), Some(StageStatus::Succeeded));
    assert_eq!(summary.status_of("sink"), Some(StageStatus::Succeeded));
    assert_eq!(
        summary.stage("B").unwrap().error,
        Some(StageError::failed("B was told to fail"))
    );
}

#[test]
fn test_ambiguous_output_rejected() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "ambiguous.json",
        r#"{
            "source": {"type": "recorded", "name": "S"},
            "processors": [
                {"type": "recorded", "name": "a", "input": "S", "output": "rows"},
                {"type": "recorded", "name": "b", "input": "S", "output": "rows"}
            ],
            "sink": {"type": "recorded", "name": "sink", "input": "rows"}
        }"#,
    );

    match factory.create(path) {
        Err(PipeflowError::AmbiguousInput { stage, input, producers }) => {
            assert_eq!(stage, "sink");
            assert_eq!(input, "rows");
            assert_eq!(producers, vec!["a", "b"]);
        }
        other => panic!("expected AmbiguousInput, got {:?}", other.map(|w| w.id().clone())),
    }
}

#[test]
fn test_mutual_dependency_rejected() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "cycle.json",
        r#"{
            "source": {"type": "recorded", "name": "S"},
            "processors": [
                {"type": "recorded", "name": "A", "input": ["S", "B"]},
                {"type": "recorded", "name": "B", "input": "A"}
            ],
            "sink": {"type": "recorded", "name": "sink", "input": "B"}
        }"#,
    );

    match factory.create(path) {
        Err(PipeflowError::CycleDetected { stages }) => assert_eq!(stages, vec!["A", "B"]),
        other => panic!("expected CycleDetected, got {:?}", other.map(|w| w.id().clone())),
    }
}

#[test]
fn test_building_twice_is_deterministic() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "fanout.toml",
        r#"
[source]
type = "recorded"
name = "S"

[[processors]]
type = "recorded"
name = "z"
input = "S"

[[processors]]
type = "recorded"
name = "a"
input = "S"

[sink]
type = "recorded"
name = "sink"
input = ["z", "a"]
"#,
    );

    let first = factory.create(path.as_path()).unwrap();
    let second = factory.create(path.as_path()).unwrap();

    assert_eq!(first.graph().order_names(), vec!["S", "z", "a", "sink"]);
    assert_eq!(first.graph().order_names(), second.graph().order_names());
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[tokio::test]
async fn test_stop_before_run_skips_everything() {
    let (dir, journal, factory) = setup();
    let path = write_config(
        &dir,
        "stopped.json",
        r#"{"source": {"type": "recorded"}, "sink": {"type": "null"}}"#,
    );

    let stop = StopSignal::new();
    stop.stop();
    let summary = factory.create(path).unwrap().run_with_stop(stop).await;

    assert!(summary.cancelled);
    assert!(!summary.succeeded);
    assert!(summary.stages.iter().all(|s| s.status == StageStatus::Skipped));
    assert!(journal.events().is_empty());
}

#[tokio::test]
async fn test_stage_timeout() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "slow.json",
        r#"{
            "source": {"type": "recorded", "name": "S", "options": {"delay_ms": 5000}},
            "sink": {"type": "null", "name": "sink"},
            "execution": {"stage_timeout_secs": 1}
        }"#,
    );

    let summary = factory.create(path).unwrap().run().await;
    assert_eq!(
        summary.stage("S").unwrap().error,
        Some(StageError::Timeout { seconds: 1 })
    );
    assert_eq!(summary.status_of("sink"), Some(StageStatus::Skipped));
}

#[tokio::test]
async fn test_dropped_run_cancels_running_stages() {
    let (dir, journal, factory) = setup();
    let path = write_config(
        &dir,
        "dropped.json",
        r#"{
            "source": {"type": "recorded", "name": "S", "options": {"delay_ms": 200}},
            "sink": {"type": "recorded", "name": "sink"}
        }"#,
    );
    let workflow = factory.create(path).unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), workflow.run()).await;
    assert!(abandoned.is_err());

    // Long enough for the source to have finished had it kept running
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(journal.events(), vec![Event::Start("S".into())]);
    assert_eq!(workflow.status("S"), Some(StageStatus::Failed));
    assert_eq!(workflow.status("sink"), Some(StageStatus::Pending));

    let summary = workflow.run().await;
    assert!(summary.succeeded);
    assert_eq!(workflow.run_count(), 2);
}

#[tokio::test]
async fn test_single_worker_runs_one_stage_at_a_time() {
    let (dir, journal, factory) = setup();
    let path = write_config(
        &dir,
        "wide.json",
        r#"{
            "source": {"type": "recorded", "name": "S"},
            "processors": [
                {"type": "recorded", "name": "a", "input": "S"},
                {"type": "recorded", "name": "b", "input": "S"},
                {"type": "recorded", "name": "c", "input": "S"}
            ],
            "sink": {"type": "recorded", "name": "sink", "input": ["a", "b", "c"]},
            "execution": {"workers": 4}
        }"#,
    );

    let workflow = factory.create(path).unwrap().with_workers(1);
    let summary = workflow.run().await;

    assert!(summary.succeeded);
    assert_eq!(journal.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_builtin_stages_pass_records_through() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "builtin.json",
        r#"{
            "name": "smoke",
            "source": {"type": "static", "options": {"records": [{"id": 1}, {"id": 2}]}},
            "processors": [{"type": "passthrough"}],
            "sink": {"type": "log"}
        }"#,
    );

    let workflow = factory.create(path).unwrap();
    assert_eq!(workflow.name(), "smoke");

    let summary = workflow.run().await;
    assert!(summary.succeeded);
    assert_eq!(summary.stage("log").unwrap().records, Some(2));
}

#[tokio::test]
async fn test_catalog_trigger_runs_registered_workflow() {
    let (dir, _journal, factory) = setup();
    let path = write_config(
        &dir,
        "nightly profile.json",
        r#"{"source": {"type": "static"}, "sink": {"type": "null"}}"#,
    );

    let catalog = WorkflowCatalog::new();
    let workflow = factory.create(path).unwrap().register(&catalog);
    assert_eq!(workflow.id().as_str(), "nightly_profile");

    let summary = catalog.trigger("nightly_profile").await.unwrap();
    assert!(summary.succeeded);
    assert_eq!(workflow.status("static"), Some(StageStatus::Succeeded));

    // Custom scopes only need `publish`
    struct Counting(AtomicUsize);
    impl SchedulerScope for Counting {
        fn publish(&self, _workflow: Arc<pipeflow::Workflow>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    let scope = Counting(AtomicUsize::new(0));
    let path = write_config(
        &dir,
        "other.json",
        r#"{"source": {"type": "static"}, "sink": {"type": "null"}}"#,
    );
    factory.create(path).unwrap().register(&scope);
    assert_eq!(scope.0.load(Ordering::SeqCst), 1);
}
