// src/bin/server.rs

//! # Web Binary
//!
//! Single-video upload service: `POST /process` with a multipart file,
//! poll `GET /status/:job_id`, fetch `GET /download/:job_id`.

use clap::Parser;
use tracing::info;
use MarkBlaster::batch_logic::command_remover;
use MarkBlaster::config::server::Args;
use MarkBlaster::server::run_server;
use MarkBlaster::utils::utils::{init_tracing, setup_prometheus_metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let args = Args::parse();
    info!(?args, "Starting web server");

    setup_prometheus_metrics(args.metrics_port).await?;
    run_server(args, command_remover).await?;
    Ok(())
}
