// src/supervisor.rs

use crate::data_model::{JobOutcome, WorkItem};
use crate::discovery::{absolutize, check_output_collisions, discover, validate_input_dir, DEFAULT_PATTERN};
use crate::error::{BatchError, Result};
use crate::executor::{JobRunner, ProgressSink};
use crate::progress::{ItemProgress, ProgressAggregator, ProgressState};
use crate::report::{summarize, SummaryReport};
use crate::utils::prometheus_metrics::*;
use chrono::Local;
use futures::{future, stream, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Lifecycle of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    Discovering,
    EmptyBatch,
    Running,
    Summarizing,
    Done,
}

impl BatchState {
    pub fn can_transition_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, EmptyBatch)
                | (Discovering, Running)
                | (EmptyBatch, Done)
                | (Running, Summarizing)
                | (Summarizing, Done)
        )
    }
}

/// What to process and how.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pattern: String,
    pub quiet: bool,
    /// Items in flight at once. 1 means strictly sequential.
    pub jobs: usize,
}

impl BatchConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            pattern: DEFAULT_PATTERN.to_string(),
            quiet: false,
            jobs: 1,
        }
    }
}

/// Hooks for presentation layers. Every method has a no-op default.
pub trait BatchObserver: Send + Sync {
    fn on_state(&self, _state: BatchState) {}

    fn on_discovered(&self, _items: &[WorkItem]) {}

    fn on_item_started(&self, _index: usize, _total: usize, _item: &WorkItem) {}

    /// `value` is already filtered: in range and strictly increasing for the
    /// item at `index`.
    fn on_item_progress(&self, _index: usize, _value: u8) {}

    fn on_item_finished(
        &self,
        _index: usize,
        _item: &WorkItem,
        _outcome: &JobOutcome,
        _progress: ProgressState,
    ) {
    }
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl BatchObserver for SilentObserver {}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum BatchRun {
    /// Nothing matched; no job ran and the output folder was not touched.
    Empty { input_dir: PathBuf, pattern: String },
    Completed(SummaryReport),
    /// Cancelled by the user. Items in flight ran to their end; `remaining`
    /// items were never started and may be 0.
    Interrupted {
        report: SummaryReport,
        remaining: usize,
    },
}

impl BatchRun {
    pub fn report(&self) -> Option<&SummaryReport> {
        match self {
            BatchRun::Empty { .. } => None,
            BatchRun::Completed(report) => Some(report),
            BatchRun::Interrupted { report, .. } => Some(report),
        }
    }
}

// Sequential mode: progress flows through the batch aggregator.
struct AggregatorSink<'a> {
    index: usize,
    aggregator: &'a mut ProgressAggregator,
    observer: &'a dyn BatchObserver,
}

impl ProgressSink for AggregatorSink<'_> {
    fn item_progress(&mut self, value: u8) {
        if self.aggregator.advance_item_to(value as i64) {
            self.observer.on_item_progress(self.index, value);
        }
    }
}

// Pooled mode: every in-flight item owns its tracker.
struct SlotSink<'a> {
    index: usize,
    progress: ItemProgress,
    observer: &'a dyn BatchObserver,
}

impl ProgressSink for SlotSink<'_> {
    fn item_progress(&mut self, value: u8) {
        if self.progress.advance_to(value as i64) {
            self.observer.on_item_progress(self.index, value);
        }
    }
}

/// Drives discovery, the job runner and the summary for one folder.
pub struct BatchSupervisor {
    runner: JobRunner,
    config: BatchConfig,
    state: BatchState,
}

impl BatchSupervisor {
    pub fn new(runner: JobRunner, config: BatchConfig) -> Self {
        Self {
            runner,
            config,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn transition(&mut self, next: BatchState, observer: &dyn BatchObserver) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BatchError::Unexpected(format!(
                "invalid batch transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "Batch state transition");
        self.state = next;
        observer.on_state(next);
        Ok(())
    }

    /// Runs the whole batch. Per-item failures are recorded in the report;
    /// only errors outside the item loop are returned as `Err`. When `cancel`
    /// fires, no further item is started and a partial report is returned.
    #[instrument(skip_all, fields(input = %self.config.input_dir.display(), pattern = %self.config.pattern))]
    pub async fn run(
        &mut self,
        observer: &dyn BatchObserver,
        cancel: &CancellationToken,
    ) -> Result<BatchRun> {
        self.state = BatchState::Idle;
        self.transition(BatchState::Discovering, observer)?;

        let input_dir = validate_input_dir(&self.config.input_dir)?;
        let output_dir = absolutize(&self.config.output_dir)?;
        let items = discover(&input_dir, &self.config.pattern, &output_dir)?;
        ITEMS_DISCOVERED_TOTAL.inc_by(items.len() as f64);
        observer.on_discovered(&items);

        if items.is_empty() {
            info!("No files matching '{}' found in {}", self.config.pattern, input_dir.display());
            self.transition(BatchState::EmptyBatch, observer)?;
            self.transition(BatchState::Done, observer)?;
            return Ok(BatchRun::Empty {
                input_dir,
                pattern: self.config.pattern.clone(),
            });
        }

        check_output_collisions(&items)?;
        self.transition(BatchState::Running, observer)?;
        tokio::fs::create_dir_all(&output_dir).await?;
        let started_at = Local::now();
        info!(items = items.len(), output_dir = %output_dir.display(), jobs = self.config.jobs, "Batch started");

        let outcomes = if self.config.jobs <= 1 {
            self.run_sequential(&items, observer, cancel).await
        } else {
            self.run_pooled(&items, observer, cancel).await
        };

        self.transition(BatchState::Summarizing, observer)?;
        let remaining = items.len() - outcomes.len();
        let report = summarize(&outcomes, started_at, Local::now());
        info!(
            successful = report.success_count(),
            failed = report.failure_count(),
            remaining,
            "Batch finished"
        );
        self.transition(BatchState::Done, observer)?;

        if cancel.is_cancelled() {
            BATCHES_INTERRUPTED_TOTAL.inc();
            Ok(BatchRun::Interrupted { report, remaining })
        } else {
            Ok(BatchRun::Completed(report))
        }
    }

    async fn run_sequential(
        &self,
        items: &[WorkItem],
        observer: &dyn BatchObserver,
        cancel: &CancellationToken,
    ) -> Vec<(WorkItem, JobOutcome)> {
        let total = items.len();
        let mut aggregator = ProgressAggregator::new(total);
        let mut outcomes = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(completed = index, total, "Interrupted, not starting further items");
                break;
            }
            let span = info_span!("batch_item", index = index + 1, total, file = %item.file_name());

            aggregator.start_item();
            observer.on_item_started(index, total, item);
            let outcome = {
                let mut sink = AggregatorSink {
                    index,
                    aggregator: &mut aggregator,
                    observer,
                };
                self.runner
                    .run_one(item, &mut sink, self.config.quiet)
                    .instrument(span)
                    .await
            };
            aggregator.finish_item();
            aggregator.advance_overall();
            observer.on_item_finished(index, item, &outcome, aggregator.state());
            outcomes.push((item.clone(), outcome));
        }
        outcomes
    }

    async fn run_pooled(
        &self,
        items: &[WorkItem],
        observer: &dyn BatchObserver,
        cancel: &CancellationToken,
    ) -> Vec<(WorkItem, JobOutcome)> {
        let total = items.len();
        let runner = &self.runner;
        let quiet = self.config.quiet;
        let mut aggregator = ProgressAggregator::new(total);
        let mut slots: Vec<Option<JobOutcome>> = vec![None; total];

        let mut in_flight = stream::iter(items.iter().enumerate())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(index, item)| async move {
                let span = info_span!("batch_item", index = index + 1, total, file = %item.file_name());
                observer.on_item_started(index, total, item);
                let mut sink = SlotSink {
                    index,
                    progress: ItemProgress::new(),
                    observer,
                };
                let outcome = runner.run_one(item, &mut sink, quiet).instrument(span).await;
                (index, outcome)
            })
            .buffer_unordered(self.config.jobs);

        // Completions are collected here only, so `completed` and the slots
        // have a single writer.
        while let Some((index, outcome)) = in_flight.next().await {
            aggregator.start_item();
            aggregator.finish_item();
            aggregator.advance_overall();
            observer.on_item_finished(index, &items[index], &outcome, aggregator.state());
            slots[index] = Some(outcome);
        }
        if cancel.is_cancelled() {
            warn!(completed = aggregator.completed(), total, "Interrupted, not starting further items");
        }

        items
            .iter()
            .zip(slots)
            .filter_map(|(item, slot)| slot.map(|outcome| (item.clone(), outcome)))
            .collect()
    }
}
