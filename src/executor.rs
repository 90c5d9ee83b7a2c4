use crate::data_model::{JobOutcome, WorkItem};
use crate::error::Result;
use crate::progress::ItemProgress;
use crate::utils::prometheus_metrics::*;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// The external single-item transformation.
///
/// Implementations receive the input and output paths, a callback taking an
/// integer completion percentage, and the verbosity flag. The callback may be
/// invoked zero or more times; nothing requires it to ever reach 100.
#[async_trait]
pub trait WatermarkRemover: Send + Sync {
    fn name(&self) -> &'static str; // For logging/error reporting

    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut (dyn FnMut(i64) + Send),
        quiet: bool,
    ) -> Result<()>;
}

/// Receives the filtered 0..=100 progress of the item being run.
pub trait ProgressSink: Send {
    fn item_progress(&mut self, value: u8);
}

/// Runs the remover for one item at a time and turns whatever it does into
/// a [`JobOutcome`].
#[derive(Clone)]
pub struct JobRunner {
    remover: Arc<dyn WatermarkRemover>,
}

impl JobRunner {
    pub fn new(remover: Arc<dyn WatermarkRemover>) -> Self {
        JobRunner { remover }
    }

    pub fn remover_name(&self) -> &'static str {
        self.remover.name()
    }

    /// Processes `item`, forwarding only strictly increasing in-range values
    /// to `sink`. On success the sink has always seen 100 last. Errors and
    /// panics from the remover become `JobOutcome::Failure` and never
    /// escape.
    #[instrument(skip(self, sink), fields(item = %item.file_name(), remover = self.remover.name()))]
    pub async fn run_one(
        &self,
        item: &WorkItem,
        sink: &mut dyn ProgressSink,
        quiet: bool,
    ) -> JobOutcome {
        ACTIVE_ITEMS.inc();
        let processing_timer = ITEM_PROCESSING_DURATION_SECONDS.start_timer();

        let mut tracker = ItemProgress::new();
        let result = {
            let mut callback = |value: i64| {
                if tracker.advance_to(value) {
                    sink.item_progress(tracker.value());
                } else {
                    debug!(value, last = tracker.value(), "Ignoring progress report");
                }
            };
            AssertUnwindSafe(self.remover.remove(
                item.input_path(),
                item.output_path(),
                &mut callback,
                quiet,
            ))
            .catch_unwind()
            .await
        };

        let outcome = match result {
            Ok(Ok(())) => {
                if tracker.complete() > 0 {
                    sink.item_progress(tracker.value());
                }
                ITEMS_SUCCEEDED_TOTAL.inc();
                JobOutcome::Success {
                    output_path: item.output_path().to_path_buf(),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Watermark removal failed");
                ITEMS_FAILED_TOTAL.inc();
                JobOutcome::Failure {
                    error_detail: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(error = %message, "Watermark remover panicked");
                ITEMS_FAILED_TOTAL.inc();
                JobOutcome::Failure {
                    error_detail: message,
                }
            }
        };

        processing_timer.observe_duration();
        ACTIVE_ITEMS.dec();
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "watermark remover panicked".to_string()
    }
}
