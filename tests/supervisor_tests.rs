use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use MarkBlaster::data_model::{JobOutcome, WorkItem};
use MarkBlaster::error::{BatchError, Result};
use MarkBlaster::executor::{JobRunner, WatermarkRemover};
use MarkBlaster::progress::ProgressState;
use MarkBlaster::supervisor::{
    BatchConfig, BatchObserver, BatchRun, BatchState, BatchSupervisor, SilentObserver,
};

// Mock remover: writes the output file, reports 25/50/75, fails for the
// configured names, and records the order it was called in.
#[derive(Default)]
struct MockRemover {
    failures: HashMap<String, String>,
    delays_ms: HashMap<String, u64>,
    calls: Mutex<Vec<String>>,
    cancel_after_first: Option<CancellationToken>,
}

impl MockRemover {
    fn failing(mut self, name: &str, message: &str) -> Self {
        self.failures.insert(name.to_string(), message.to_string());
        self
    }

    fn delayed(mut self, name: &str, ms: u64) -> Self {
        self.delays_ms.insert(name.to_string(), ms);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WatermarkRemover for MockRemover {
    fn name(&self) -> &'static str {
        "MockRemover"
    }

    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut (dyn FnMut(i64) + Send),
        _quiet: bool,
    ) -> Result<()> {
        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(name.clone());
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        if let Some(ms) = self.delays_ms.get(&name) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        for value in [25, 50, 75] {
            progress(value);
        }
        if let Some(message) = self.failures.get(&name) {
            return Err(BatchError::TransformError(message.clone()));
        }
        tokio::fs::write(output, b"cleaned").await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    State(BatchState),
    Discovered(usize),
    Started(usize),
    Progress(usize, u8),
    Finished(usize, bool, ProgressState),
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<BatchState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl BatchObserver for RecordingObserver {
    fn on_state(&self, state: BatchState) {
        self.events.lock().unwrap().push(Event::State(state));
    }

    fn on_discovered(&self, items: &[WorkItem]) {
        self.events.lock().unwrap().push(Event::Discovered(items.len()));
    }

    fn on_item_started(&self, index: usize, _total: usize, _item: &WorkItem) {
        self.events.lock().unwrap().push(Event::Started(index));
    }

    fn on_item_progress(&self, index: usize, value: u8) {
        self.events.lock().unwrap().push(Event::Progress(index, value));
    }

    fn on_item_finished(
        &self,
        index: usize,
        _item: &WorkItem,
        outcome: &JobOutcome,
        progress: ProgressState,
    ) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(index, outcome.is_success(), progress));
    }
}

fn fixture(names: &[&str]) -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("in")).unwrap();
    for name in names {
        fs::write(dir.path().join("in").join(name), b"video").unwrap();
    }
    dir
}

fn supervisor(remover: Arc<MockRemover>, root: &Path) -> BatchSupervisor {
    BatchSupervisor::new(
        JobRunner::new(remover),
        BatchConfig::new(root.join("in"), root.join("out")),
    )
}

fn completed(run: BatchRun) -> MarkBlaster::report::SummaryReport {
    match run {
        BatchRun::Completed(report) => report,
        other => panic!("expected a completed batch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_all_items_succeed() {
    let root = fixture(&["c.mp4", "a.mp4", "b.mp4"]);
    let remover = Arc::new(MockRemover::default());
    let mut supervisor = supervisor(remover.clone(), root.path());

    let run = supervisor
        .run(&SilentObserver, &CancellationToken::new())
        .await
        .unwrap();
    let report = completed(run);

    assert_eq!(report.successful, vec!["a.mp4", "b.mp4", "c.mp4"]);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.success_rate, 100.0);
    assert_eq!(remover.calls(), vec!["a.mp4", "b.mp4", "c.mp4"]);
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        assert!(root.path().join("out").join(format!("cleaned_{}", name)).exists());
    }
    assert_eq!(supervisor.state(), BatchState::Done);
}

#[tokio::test]
async fn test_failure_does_not_stop_the_batch() {
    let root = fixture(&["a.mp4", "b.mp4"]);
    let remover = Arc::new(MockRemover::default().failing("b.mp4", "decode error"));
    let mut supervisor = supervisor(remover.clone(), root.path());

    let report = completed(
        supervisor
            .run(&SilentObserver, &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(report.successful, vec!["a.mp4"]);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.error_for("b.mp4"), Some("decode error"));
    assert_eq!(report.success_rate, 50.0);
    assert_eq!(report.total_attempted(), 2);
}

#[tokio::test]
async fn test_failure_in_the_middle_keeps_order() {
    let root = fixture(&["a.mp4", "b.mp4", "c.mp4"]);
    let remover = Arc::new(MockRemover::default().failing("b.mp4", "decode error"));
    let mut supervisor = supervisor(remover.clone(), root.path());

    let report = completed(
        supervisor
            .run(&SilentObserver, &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(report.successful, vec!["a.mp4", "c.mp4"]);
    assert_eq!(report.failed[0].file_name, "b.mp4");
    assert!((report.success_rate - 66.666).abs() < 0.01);
    assert_eq!(remover.calls().len(), 3);
}

#[tokio::test]
async fn test_long_error_is_kept_whole_in_report() {
    let long = "x".repeat(80);
    let root = fixture(&["a.mp4"]);
    let remover = Arc::new(MockRemover::default().failing("a.mp4", &long));
    let mut supervisor = supervisor(remover, root.path());

    let report = completed(
        supervisor
            .run(&SilentObserver, &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(report.error_for("a.mp4"), Some(long.as_str()));
    assert_eq!(report.failed[0].display_error(), format!("{}...", "x".repeat(57)));
}

#[tokio::test]
async fn test_empty_batch_touches_nothing() {
    let root = fixture(&["a.mp4"]);
    let remover = Arc::new(MockRemover::default());
    let mut supervisor = BatchSupervisor::new(
        JobRunner::new(remover.clone()),
        BatchConfig {
            pattern: "*.mov".to_string(),
            ..BatchConfig::new(root.path().join("in"), root.path().join("out"))
        },
    );
    let observer = RecordingObserver::default();

    let run = supervisor
        .run(&observer, &CancellationToken::new())
        .await
        .unwrap();

    match run {
        BatchRun::Empty { pattern, .. } => assert_eq!(pattern, "*.mov"),
        other => panic!("expected an empty batch, got {:?}", other),
    }
    assert_eq!(supervisor.state(), BatchState::Done);
    assert!(remover.calls().is_empty());
    assert!(!root.path().join("out").exists());
    assert_eq!(
        observer.states(),
        vec![BatchState::Discovering, BatchState::EmptyBatch, BatchState::Done]
    );
}

#[tokio::test]
async fn test_missing_input_is_fatal_and_runs_nothing() {
    let root = tempdir().unwrap();
    let remover = Arc::new(MockRemover::default());
    let mut supervisor = supervisor(remover.clone(), root.path());

    let err = supervisor
        .run(&SilentObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::InputNotFound(_)));
    assert!(remover.calls().is_empty());
    assert!(!root.path().join("out").exists());
}

#[tokio::test]
async fn test_output_collision_is_fatal_before_any_job() {
    let root = fixture(&["Clip.mp4", "clip.mp4"]);
    // Case-insensitive filesystems fold both names into one file.
    if fs::read_dir(root.path().join("in")).unwrap().count() < 2 {
        return;
    }
    let remover = Arc::new(MockRemover::default());
    let mut supervisor = supervisor(remover.clone(), root.path());

    let err = supervisor
        .run(&SilentObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::OutputCollision { .. }));
    assert!(remover.calls().is_empty());
    assert!(!root.path().join("out").exists());
}

#[tokio::test]
async fn test_state_trace_and_progress_events() {
    let root = fixture(&["a.mp4", "b.mp4"]);
    let remover = Arc::new(MockRemover::default().failing("b.mp4", "decode error"));
    let mut supervisor = supervisor(remover, root.path());
    let observer = RecordingObserver::default();

    supervisor
        .run(&observer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        observer.states(),
        vec![
            BatchState::Discovering,
            BatchState::Running,
            BatchState::Summarizing,
            BatchState::Done
        ]
    );

    let item_events: Vec<Event> = observer
        .events()
        .into_iter()
        .filter(|e| !matches!(e, Event::State(_)))
        .collect();
    assert_eq!(
        item_events,
        vec![
            Event::Discovered(2),
            Event::Started(0),
            Event::Progress(0, 25),
            Event::Progress(0, 50),
            Event::Progress(0, 75),
            Event::Progress(0, 100),
            Event::Finished(
                0,
                true,
                ProgressState {
                    completed: 1,
                    total: 2,
                    current_item: 100
                }
            ),
            Event::Started(1),
            Event::Progress(1, 25),
            Event::Progress(1, 50),
            Event::Progress(1, 75),
            Event::Finished(
                1,
                false,
                ProgressState {
                    completed: 2,
                    total: 2,
                    current_item: 100
                }
            ),
        ]
    );
}

#[tokio::test]
async fn test_rerun_gives_the_same_report() {
    let root = fixture(&["a.mp4", "b.mp4", "c.mp4"]);
    let remover = Arc::new(MockRemover::default().failing("c.mp4", "decode error"));
    let mut supervisor = supervisor(remover.clone(), root.path());

    let first = completed(
        supervisor
            .run(&SilentObserver, &CancellationToken::new())
            .await
            .unwrap(),
    );
    let second = completed(
        supervisor
            .run(&SilentObserver, &CancellationToken::new())
            .await
            .unwrap(),
    );

    // Outputs from the first run are written elsewhere, so discovery is
    // unchanged.
    assert_eq!(first.successful, second.successful);
    assert_eq!(first.failed, second.failed);
    assert_eq!(remover.calls().len(), 6);
}

#[tokio::test]
async fn test_pooled_run_keeps_discovery_order() {
    let names = ["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4"];
    let root = fixture(&names);
    let remover = Arc::new(
        MockRemover::default()
            .delayed("a.mp4", 60)
            .delayed("b.mp4", 5)
            .delayed("c.mp4", 30)
            .failing("d.mp4", "decode error"),
    );
    let mut supervisor = BatchSupervisor::new(
        JobRunner::new(remover.clone()),
        BatchConfig {
            jobs: 3,
            ..BatchConfig::new(root.path().join("in"), root.path().join("out"))
        },
    );
    let observer = RecordingObserver::default();

    let report = completed(
        supervisor
            .run(&observer, &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(report.successful, vec!["a.mp4", "b.mp4", "c.mp4", "e.mp4"]);
    assert_eq!(report.failed[0].file_name, "d.mp4");

    let called: HashSet<String> = remover.calls().into_iter().collect();
    assert_eq!(called.len(), names.len());

    // `completed` rises by exactly one per finished item.
    let completed_counts: Vec<usize> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Finished(_, _, state) => Some(state.completed),
            _ => None,
        })
        .collect();
    assert_eq!(completed_counts, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_cancel_stops_before_next_item() {
    let root = fixture(&["a.mp4", "b.mp4", "c.mp4"]);
    let cancel = CancellationToken::new();
    let remover = Arc::new(MockRemover {
        cancel_after_first: Some(cancel.clone()),
        ..MockRemover::default()
    });
    let mut supervisor = supervisor(remover.clone(), root.path());

    let run = supervisor.run(&SilentObserver, &cancel).await.unwrap();

    match run {
        BatchRun::Interrupted { report, remaining } => {
            // The item in flight finishes normally.
            assert_eq!(report.successful, vec!["a.mp4"]);
            assert_eq!(remaining, 2);
        }
        other => panic!("expected an interrupted batch, got {:?}", other),
    }
    assert_eq!(remover.calls(), vec!["a.mp4"]);
    assert_eq!(supervisor.state(), BatchState::Done);
}

#[tokio::test]
async fn test_cancel_in_pool_lets_in_flight_items_finish() {
    let root = fixture(&["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4"]);
    let cancel = CancellationToken::new();
    // Both pool slots are filled before either item starts, and the first
    // slot finishes last.
    let remover = Arc::new(
        MockRemover {
            cancel_after_first: Some(cancel.clone()),
            ..MockRemover::default()
        }
        .delayed("a.mp4", 60)
        .delayed("b.mp4", 5),
    );
    let mut supervisor = BatchSupervisor::new(
        JobRunner::new(remover.clone()),
        BatchConfig {
            jobs: 2,
            ..BatchConfig::new(root.path().join("in"), root.path().join("out"))
        },
    );
    let observer = RecordingObserver::default();

    let run = supervisor.run(&observer, &cancel).await.unwrap();

    match run {
        BatchRun::Interrupted { report, remaining } => {
            assert_eq!(report.successful, vec!["a.mp4", "b.mp4"]);
            assert_eq!(remaining, 3);
        }
        other => panic!("expected an interrupted batch, got {:?}", other),
    }
    let called: HashSet<String> = remover.calls().into_iter().collect();
    assert_eq!(
        called,
        HashSet::from(["a.mp4".to_string(), "b.mp4".to_string()])
    );

    let mut started: Vec<usize> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Started(index) => Some(index),
            _ => None,
        })
        .collect();
    started.sort();
    assert_eq!(started, vec![0, 1]);
    assert!(!root.path().join("out").join("cleaned_c.mp4").exists());
    assert_eq!(supervisor.state(), BatchState::Done);
}
