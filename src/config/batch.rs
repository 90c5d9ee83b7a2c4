// --- Command-Line Arguments for the batch binary ---
// Lives in the library so tests can drive `Args::parse_from`.
use clap::Parser;
use std::path::PathBuf;

use crate::discovery::DEFAULT_PATTERN;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Batch process videos to remove watermarks",
    after_help = "Examples:\n  \
        markblaster -i /path/to/input -o /path/to/output\n  \
        markblaster -i /path/to/input -o /path/to/output --pattern \"*.mov\"\n  \
        markblaster -i /path/to/input -o /path/to/output --pattern \"*.{mp4,mov,avi}\"\n  \
        markblaster -i /path/to/input -o /path/to/output --quiet"
)]
pub struct Args {
    /// Input folder containing video files
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output folder for cleaned videos (created if missing)
    #[arg(short, long)]
    pub output: PathBuf,

    /// File pattern to match
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Run in quiet mode (suppress the remover's own output and most logs)
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Number of videos processed at the same time
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,

    /// Path to the remover configuration YAML file
    #[arg(short = 'c', long)]
    pub remover_config: Option<PathBuf>,

    /// Also write the summary report as JSON to this path
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Optional: Port for the Prometheus metrics HTTP endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,
}
