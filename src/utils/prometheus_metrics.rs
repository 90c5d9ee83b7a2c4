// src/utils/prometheus_metrics.rs

use once_cell::sync::Lazy;
use prometheus::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};

// Metrics from the supervisor
pub static ITEMS_DISCOVERED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "batch_items_discovered_total",
        "Total number of input files matched by discovery."
    )
    .expect("Failed to register ITEMS_DISCOVERED_TOTAL counter")
});

pub static BATCHES_INTERRUPTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "batch_runs_interrupted_total",
        "Total number of batch runs stopped early by an interrupt."
    )
    .expect("Failed to register BATCHES_INTERRUPTED_TOTAL counter")
});

// Metrics from the job runner
pub static ITEMS_SUCCEEDED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "job_items_succeeded_total",
        "Total number of items the watermark remover processed successfully."
    )
    .expect("Failed to register ITEMS_SUCCEEDED_TOTAL counter")
});

pub static ITEMS_FAILED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "job_items_failed_total",
        "Total number of items for which the watermark remover failed."
    )
    .expect("Failed to register ITEMS_FAILED_TOTAL counter")
});

pub static ITEM_PROCESSING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "job_item_processing_duration_seconds",
        "Histogram of per-item watermark removal durations.",
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    )
    .expect("Failed to register ITEM_PROCESSING_DURATION_SECONDS histogram")
});

pub static ACTIVE_ITEMS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "job_active_items",
        "Number of items currently being processed."
    )
    .expect("Failed to register ACTIVE_ITEMS gauge")
});

// Metrics from the web surface
pub static WEB_JOBS_SUBMITTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "web_jobs_submitted_total",
        "Total number of videos uploaded through the web surface."
    )
    .expect("Failed to register WEB_JOBS_SUBMITTED_TOTAL counter")
});
