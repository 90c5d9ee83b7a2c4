#![allow(non_snake_case)]

// Batch side: discovery -> supervisor -> executor -> report.
pub mod batch_logic;
pub mod config;
pub mod data_model;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod supervisor;
pub mod utils;

// Web side, sharing the executor with the batch binary.
pub mod server;
