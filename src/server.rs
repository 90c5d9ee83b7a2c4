//! Web surface: upload one video, follow its progress, download the result.
//!
//! Every upload becomes one job run through the same [`JobRunner`] the batch
//! binary uses. Progress is mapped onto three display phases.

use crate::config::remover::RemoverConfig;
use crate::config::server::Args;
use crate::data_model::{output_file_name, JobOutcome, WorkItem};
use crate::error::{BatchError, Result};
use crate::executor::{JobRunner, ProgressSink, WatermarkRemover};
use crate::utils::prometheus_metrics::WEB_JOBS_SUBMITTED_TOTAL;
use crate::utils::utils::metrics_router;
use axum::{
    body::Body,
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const EMPTY_UPLOAD_MESSAGE: &str = "Please upload a video first!";
const STARTING_MESSAGE: &str = "Starting watermark removal...";

// Represents the state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed(String),
}

/// Display phase derived from the 0..=100 progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Detecting,
    Removing,
    Merging,
}

impl Phase {
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            0..=49 => Phase::Detecting,
            50..=94 => Phase::Removing,
            _ => Phase::Merging,
        }
    }

    pub fn status_line(self, progress: u8) -> String {
        match self {
            Phase::Detecting => format!("Detecting watermarks... {}%", progress),
            Phase::Removing => format!("Removing watermarks... {}%", progress),
            Phase::Merging => format!("Merging audio... {}%", progress),
        }
    }
}

// Represents a job in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub file_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub phase: Phase,
    pub message: String,
    pub output_file: Option<PathBuf>,
}

impl Job {
    pub fn new(id: Uuid, file_name: String) -> Self {
        Self {
            id,
            file_name,
            status: JobStatus::Pending,
            progress: 0,
            phase: Phase::Detecting,
            message: STARTING_MESSAGE.to_string(),
            output_file: None,
        }
    }

    fn apply_progress(&mut self, progress: u8) {
        self.progress = progress;
        self.phase = Phase::from_progress(progress);
        self.message = self.phase.status_line(progress);
    }
}

// The application state, shared across all handlers
pub struct AppState {
    pub job_store: Arc<RwLock<HashMap<Uuid, Job>>>,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub runner: JobRunner,
}

impl AppState {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf, runner: JobRunner) -> Self {
        Self {
            job_store: Arc::new(RwLock::new(HashMap::new())),
            upload_dir,
            output_dir,
            runner,
        }
    }

    pub async fn job(&self, job_id: Uuid) -> Option<Job> {
        self.job_store.read().await.get(&job_id).cloned()
    }
}

/// Forwards filtered progress to the job store through a channel, since the
/// sink is called synchronously from inside the remover.
struct ChannelSink {
    tx: mpsc::UnboundedSender<u8>,
}

impl ProgressSink for ChannelSink {
    fn item_progress(&mut self, value: u8) {
        let _ = self.tx.send(value);
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

enum UploadError {
    Client(axum::extract::multipart::MultipartError),
    Io(std::io::Error),
}

/// Streams one multipart field to `input_path` chunk by chunk. Returns the
/// number of bytes written.
async fn store_upload(
    field: &mut Field<'_>,
    job_dir: &std::path::Path,
    input_path: &std::path::Path,
) -> std::result::Result<u64, UploadError> {
    tokio::fs::create_dir_all(job_dir).await.map_err(UploadError::Io)?;
    let mut file = tokio::fs::File::create(input_path)
        .await
        .map_err(UploadError::Io)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(UploadError::Client)? {
        file.write_all(&chunk).await.map_err(UploadError::Io)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(UploadError::Io)?;
    Ok(written)
}

async fn remove_upload(job_dir: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
        warn!(error = %e, path = %job_dir.display(), "Failed to clean up rejected upload");
    }
}

async fn process_handler(State(app_state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let job_id = Uuid::new_v4();
    let mut upload: Option<(String, PathBuf)> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Invalid upload: {}", e)),
        };
        // Plain form fields carry no file name and are ignored.
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if let Some((_, stored)) = &upload {
            if let Some(job_dir) = stored.parent() {
                remove_upload(job_dir).await;
            }
            return bad_request("Upload exactly one video per request");
        }
        let Some(file_name) = std::path::Path::new(&raw_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
        else {
            return bad_request(EMPTY_UPLOAD_MESSAGE);
        };
        let job_dir = app_state.upload_dir.join(job_id.to_string());
        let input_path = job_dir.join(&file_name);
        let written = match store_upload(&mut field, &job_dir, &input_path).await {
            Ok(written) => written,
            Err(UploadError::Client(e)) => {
                remove_upload(&job_dir).await;
                return bad_request(format!("Invalid upload: {}", e));
            }
            Err(UploadError::Io(e)) => {
                error!(error = %e, path = %input_path.display(), "Failed to store upload");
                remove_upload(&job_dir).await;
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload").into_response();
            }
        };
        if written == 0 {
            remove_upload(&job_dir).await;
            return bad_request(EMPTY_UPLOAD_MESSAGE);
        }
        upload = Some((file_name, input_path));
    }

    let Some((file_name, input_path)) = upload else {
        return bad_request(EMPTY_UPLOAD_MESSAGE);
    };

    let item = WorkItem::new(input_path, &app_state.output_dir.join(job_id.to_string()));
    app_state
        .job_store
        .write()
        .await
        .insert(job_id, Job::new(job_id, file_name.clone()));
    WEB_JOBS_SUBMITTED_TOTAL.inc();
    info!(%job_id, file = %file_name, "Accepted upload");

    tokio::spawn(run_web_job(app_state.clone(), job_id, item));

    (
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id.to_string(), "message": STARTING_MESSAGE })),
    )
        .into_response()
}

/// Runs one uploaded video and records progress and outcome in the store.
pub async fn run_web_job(app_state: Arc<AppState>, job_id: Uuid, item: WorkItem) {
    update_job(&app_state, job_id, |job| job.status = JobStatus::InProgress).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
    let store = app_state.job_store.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if let Some(job) = store.write().await.get_mut(&job_id) {
                job.apply_progress(progress);
            }
        }
    });

    let mut sink = ChannelSink { tx };
    let outcome = match item.output_path().parent() {
        Some(dir) => match tokio::fs::create_dir_all(dir).await {
            Ok(()) => app_state.runner.run_one(&item, &mut sink, false).await,
            Err(e) => JobOutcome::Failure {
                error_detail: e.to_string(),
            },
        },
        None => JobOutcome::Failure {
            error_detail: format!("no output folder for {}", item.output_path().display()),
        },
    };
    // Closing the channel lets the forwarder drain and stop.
    drop(sink);
    if let Err(e) = forwarder.await {
        warn!(%job_id, error = %e, "Progress forwarder ended abnormally");
    }

    update_job(&app_state, job_id, |job| match &outcome {
        JobOutcome::Success { output_path } => {
            job.apply_progress(100);
            job.status = JobStatus::Completed;
            job.message = format!(
                "Successfully processed! Saved to: {}",
                output_file_name(item.input_path())
            );
            job.output_file = Some(output_path.clone());
        }
        JobOutcome::Failure { error_detail } => {
            job.status = JobStatus::Failed(error_detail.clone());
            job.message = format!("Error processing video: {}", error_detail);
        }
    })
    .await;
    info!(%job_id, success = outcome.is_success(), "Web job finished");
}

async fn update_job<F: FnOnce(&mut Job)>(app_state: &AppState, job_id: Uuid, f: F) {
    if let Some(job) = app_state.job_store.write().await.get_mut(&job_id) {
        f(job);
    }
}

async fn status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match app_state.job(job_id).await {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (StatusCode::NOT_FOUND, "Job not found").into_response(),
    }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

async fn download_handler(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Response {
    let path = match app_state.job(job_id).await {
        Some(Job {
            status: JobStatus::Completed,
            output_file: Some(path),
            ..
        }) => path,
        _ => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(%job_id, error = %e, "Output file missing");
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (
        [
            (header::CONTENT_TYPE, content_type_for(&path).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

pub fn build_router(app_state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/process", post(process_handler))
        .route("/status/:job_id", get(status_handler))
        .route("/download/:job_id", get(download_handler))
        .with_state(app_state)
        .merge(metrics_router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Startup for the web binary: folders and arguments first, then the
/// remover, then the listener. Serves until Ctrl-C.
pub async fn run_server<F>(args: Args, make_remover: F) -> Result<()>
where
    F: FnOnce(&RemoverConfig) -> Result<Arc<dyn WatermarkRemover>>,
{
    let remover_config = crate::config::remover::load_or_default(args.remover_config.as_deref())?;
    let output_dir = crate::discovery::absolutize(&args.output_dir)?;
    let upload_dir = match &args.upload_dir {
        Some(dir) => crate::discovery::absolutize(dir)?,
        None => std::env::temp_dir().join("markblaster-uploads"),
    };
    tokio::fs::create_dir_all(&output_dir).await?;
    tokio::fs::create_dir_all(&upload_dir).await?;

    let runner = JobRunner::new(make_remover(&remover_config)?);
    let app_state = Arc::new(AppState::new(upload_dir.clone(), output_dir.clone(), runner));
    let app = build_router(app_state, args.max_upload_mb.saturating_mul(1024 * 1024));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BatchError::ConfigError(format!("Failed to bind {}: {}", addr, e)))?;
    info!(
        %addr,
        output_dir = %output_dir.display(),
        upload_dir = %upload_dir.display(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down web server");
        })
        .await?;
    Ok(())
}
