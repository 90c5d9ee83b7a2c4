// Utils

pub mod prometheus_metrics;
pub mod render;
pub mod utils;
