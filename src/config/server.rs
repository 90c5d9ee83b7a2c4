use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Web form for removing watermarks from a single video")]
pub struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 7860)]
    pub port: u16,

    /// Folder receiving cleaned videos
    #[arg(short, long, default_value = "./web_outputs")]
    pub output_dir: PathBuf,

    /// Folder for uploaded videos. Defaults to `markblaster-uploads` in the system temp dir.
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Largest accepted upload, in megabytes
    #[arg(long, default_value_t = 500)]
    pub max_upload_mb: usize,

    /// Path to the remover configuration YAML file
    #[arg(short = 'c', long)]
    pub remover_config: Option<PathBuf>,

    /// Optional: Port for the Prometheus metrics HTTP endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,
}
