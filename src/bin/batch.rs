// src/bin/batch.rs

//! # Batch Binary
//!
//! Removes watermarks from every matching video in a folder, one after the
//! other (or a few at a time with `--jobs`), with an overall progress bar and
//! a per-video bar, and prints a summary table at the end.
//!
//! Exit codes: 0 when the batch ran (even with per-video failures) or found
//! nothing to do, 1 on invalid input or a fatal error, 130 on Ctrl-C.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use MarkBlaster::batch_logic::{command_remover, run_batch, spawn_interrupt_handler};
use MarkBlaster::config::batch::Args;
use MarkBlaster::utils::utils::init_tracing;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr; stdout belongs to the progress bars.
    init_tracing(if args.quiet { "warn" } else { "info" });

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let code = run_batch(args, command_remover, cancel).await;
    std::process::exit(code);
}
