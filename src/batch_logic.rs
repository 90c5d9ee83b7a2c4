// src/batch_logic.rs

//! Command-line surface of the batch orchestrator.
//!
//! Startup runs in two phases. Phase 1 ([`validate_args`]) only parses and
//! checks arguments and the remover config with cheap filesystem calls.
//! Phase 2 ([`execute`]) constructs the watermark remover, which may be
//! expensive, and runs the supervisor. Invalid input never reaches phase 2.

use crate::config::batch::Args;
use crate::config::remover::{load_or_default, RemoverConfig};
use crate::data_model::{JobOutcome, WorkItem};
use crate::discovery::{absolutize, compile_pattern, validate_input_dir};
use crate::error::Result;
use crate::executor::{JobRunner, WatermarkRemover};
use crate::pipeline::CommandRemover;
use crate::progress::ProgressState;
use crate::supervisor::{BatchConfig, BatchObserver, BatchRun, BatchState, BatchSupervisor};
use crate::utils::render;
use crate::utils::utils::setup_prometheus_metrics;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

const OVERALL_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent}% {pos}/{len} [{elapsed_precise}] ETA {eta}";
const ITEM_TEMPLATE: &str =
    "  {msg} [{bar:40.green/white}] {pos}% ({per_sec}) [{elapsed_precise}] ETA {eta}";

/// Arguments after phase 1: paths resolved, pattern and remover config
/// checked. Nothing has been created on disk.
#[derive(Debug, Clone)]
pub struct ValidatedArgs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pattern: String,
    pub quiet: bool,
    pub jobs: usize,
    pub remover_config: RemoverConfig,
    pub report_json: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

/// Phase 1.
pub fn validate_args(args: &Args) -> Result<ValidatedArgs> {
    let input_dir = validate_input_dir(&args.input)?;
    let output_dir = absolutize(&args.output)?;
    compile_pattern(&args.pattern)?;
    let remover_config = load_or_default(args.remover_config.as_deref())?;

    Ok(ValidatedArgs {
        input_dir,
        output_dir,
        pattern: args.pattern.clone(),
        quiet: args.quiet,
        jobs: usize::from(args.jobs.max(1)),
        remover_config,
        report_json: args.report_json.clone(),
        metrics_port: args.metrics_port,
    })
}

/// Default phase-2 constructor: the external command remover.
pub fn command_remover(config: &RemoverConfig) -> Result<Arc<dyn WatermarkRemover>> {
    Ok(Arc::new(CommandRemover::new(config.clone())?))
}

pub fn exit_code_for(run: &BatchRun) -> i32 {
    match run {
        BatchRun::Interrupted { .. } => EXIT_INTERRUPTED,
        BatchRun::Empty { .. } | BatchRun::Completed(_) => EXIT_SUCCESS,
    }
}

/// What to do about the `count`-th Ctrl-C of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Let the item in flight finish, then stop.
    StopAfterCurrent,
    /// Kill the process right away.
    ExitNow,
}

pub fn interrupt_action(count: usize) -> InterruptAction {
    if count <= 1 {
        InterruptAction::StopAfterCurrent
    } else {
        InterruptAction::ExitNow
    }
}

/// Cancels `cancel` on the first Ctrl-C, so the item in flight still runs to
/// its end. A second Ctrl-C exits with 130 immediately.
pub fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            match interrupt_action(count) {
                InterruptAction::StopAfterCurrent => {
                    eprintln!(
                        "\nInterrupt received, stopping after the current video... (press Ctrl-C again to abort)"
                    );
                    warn!("Interrupt received");
                    cancel.cancel();
                }
                InterruptAction::ExitNow => {
                    eprintln!("\nAborted.");
                    warn!("Second interrupt received, exiting");
                    std::process::exit(EXIT_INTERRUPTED);
                }
            }
        }
    });
}

/// Full command-line run. Returns the process exit code.
pub async fn run_batch<F>(args: Args, make_remover: F, cancel: CancellationToken) -> i32
where
    F: FnOnce(&RemoverConfig) -> Result<Arc<dyn WatermarkRemover>>,
{
    let validated = match validate_args(&args) {
        Ok(validated) => validated,
        Err(e) => {
            error!(error = %e, "Invalid arguments");
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    match execute(validated, make_remover, &cancel).await {
        Ok(run) => exit_code_for(&run),
        Err(e) => {
            error!(error = %e, "Batch did not run to completion");
            if e.is_configuration() {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("\nFatal error: {}", e);
            }
            EXIT_FAILURE
        }
    }
}

/// Phase 2.
pub async fn execute<F>(
    args: ValidatedArgs,
    make_remover: F,
    cancel: &CancellationToken,
) -> Result<BatchRun>
where
    F: FnOnce(&RemoverConfig) -> Result<Arc<dyn WatermarkRemover>>,
{
    setup_prometheus_metrics(args.metrics_port).await?;
    let remover = make_remover(&args.remover_config)?;
    let runner = JobRunner::new(remover);
    info!(remover = runner.remover_name(), "Watermark remover ready");

    println!("{}", render::banner());

    let config = BatchConfig::from(&args);
    let observer = ConsoleObserver::new(&args.input_dir, &args.output_dir, &args.pattern);
    let mut supervisor = BatchSupervisor::new(runner, config);
    let run = supervisor.run(&observer, cancel).await;
    observer.finish();
    let run = run?;

    match &run {
        BatchRun::Empty { input_dir, pattern } => {
            println!("{}", render::no_files_found(pattern, input_dir));
        }
        BatchRun::Completed(report) => {
            println!("{}", render::summary(report));
        }
        BatchRun::Interrupted { report, remaining } => {
            println!("{}", render::summary(report));
            if *remaining > 0 {
                println!("Processing interrupted by user ({} videos not started)", remaining);
            } else {
                println!("Processing interrupted by user");
            }
        }
    }

    if let (Some(path), Some(report)) = (&args.report_json, run.report()) {
        write_report_json(path, report).await?;
    }
    Ok(run)
}

async fn write_report_json(path: &Path, report: &crate::report::SummaryReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, payload).await?;
    info!(path = %path.display(), "Wrote JSON report");
    Ok(())
}

/// Creates a `ProgressBar` with `template`, falling back to the default
/// style if the template does not parse.
fn create_progress_bar(total_items: u64, message: &str, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_items);
    pb.set_message(message.to_string());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Renders batch progress as an overall bar plus one bar per item in flight.
pub struct ConsoleObserver {
    multi: MultiProgress,
    overall: ProgressBar,
    items: Mutex<HashMap<usize, ProgressBar>>,
    input_dir: PathBuf,
    output_dir: PathBuf,
    pattern: String,
}

impl ConsoleObserver {
    pub fn new(input_dir: &Path, output_dir: &Path, pattern: &str) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(create_progress_bar(0, "Overall Progress", OVERALL_TEMPLATE));
        Self {
            multi,
            overall,
            items: Mutex::new(HashMap::new()),
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            pattern: pattern.to_string(),
        }
    }

    // Hidden targets (no terminal) swallow `MultiProgress::println`.
    fn println(&self, line: String) {
        if self.multi.is_hidden() || self.multi.println(&line).is_err() {
            println!("{}", line);
        }
    }

    fn take_item_bar(&self, index: usize) -> Option<ProgressBar> {
        self.items.lock().ok().and_then(|mut bars| bars.remove(&index))
    }

    /// Clears every bar left on screen.
    pub fn finish(&self) {
        if let Ok(mut bars) = self.items.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
        self.overall.finish_and_clear();
    }
}

impl BatchObserver for ConsoleObserver {
    fn on_state(&self, state: BatchState) {
        if state == BatchState::Summarizing {
            self.overall.finish_and_clear();
        }
    }

    fn on_discovered(&self, items: &[WorkItem]) {
        if items.is_empty() {
            self.overall.finish_and_clear();
            return;
        }
        self.println(render::config_table(
            &self.input_dir,
            &self.output_dir,
            &self.pattern,
            items.len(),
        ));
        self.overall.set_length(items.len() as u64);
    }

    fn on_item_started(&self, index: usize, total: usize, item: &WorkItem) {
        self.overall.set_message(render::overall_message(index + 1, total));
        self.println(render::item_header(index, total, &item.file_name()));
        let bar = self
            .multi
            .add(create_progress_bar(100, "Processing video", ITEM_TEMPLATE));
        if let Ok(mut bars) = self.items.lock() {
            bars.insert(index, bar);
        }
    }

    fn on_item_progress(&self, index: usize, value: u8) {
        if let Ok(bars) = self.items.lock() {
            if let Some(bar) = bars.get(&index) {
                bar.set_position(u64::from(value));
            }
        }
    }

    fn on_item_finished(
        &self,
        index: usize,
        _item: &WorkItem,
        outcome: &JobOutcome,
        progress: ProgressState,
    ) {
        if let Some(bar) = self.take_item_bar(index) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        match outcome {
            JobOutcome::Success { output_path } => self.println(render::item_completed(output_path)),
            JobOutcome::Failure { error_detail } => self.println(render::item_failed(error_detail)),
        }
        self.overall.set_position(progress.completed as u64);
    }
}

impl From<&ValidatedArgs> for BatchConfig {
    fn from(args: &ValidatedArgs) -> Self {
        BatchConfig {
            input_dir: args.input_dir.clone(),
            output_dir: args.output_dir.clone(),
            pattern: args.pattern.clone(),
            quiet: args.quiet,
            jobs: args.jobs,
        }
    }
}
