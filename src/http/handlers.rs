//! HTTP request handlers
//!
//! Implements the upload form, the conversion endpoint and the operational
//! endpoints.

use axum::{
    extract::{multipart::Field, multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderValue},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::{ConvertError, UploadError};
use crate::job::UploadJob;
use crate::state::AppState;
use crate::transcode::{extract_audio, ExtractionReport};

/// A converted MP3 sent back as a download
#[derive(Debug)]
pub struct AudioArtifact {
    pub filename: String,
    pub data: Bytes,
}

impl IntoResponse for AudioArtifact {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&content_disposition(&self.filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.data,
        )
            .into_response()
    }
}

/// `attachment` disposition with a quoted ASCII name and an RFC 5987 UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let fallback = if ascii.is_empty() { "audio.mp3" } else { &ascii };
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// Upload form
/// GET /
pub async fn index_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Extract audio from video</title>
</head>
<body>
  <h1>Extract audio from video</h1>
  <form action="/upload" method="post" enctype="multipart/form-data">
    <input type="file" name="{field}" accept="video/*,audio/*">
    <button type="submit">Convert to MP3</button>
  </form>
</body>
</html>
"#,
        field = state.config.upload.field_name
    ))
}

/// Conversion endpoint
/// POST /upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AudioArtifact, UploadError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            tracing::debug!("Upload without multipart body: {}", rejection);
            state.stats.reject();
            return Err(UploadError::NoFileSent);
        }
    };

    let field_name = state.config.upload.field_name.clone();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                state.stats.reject();
                return Err(UploadError::NoFileSent);
            }
            Err(e) => {
                tracing::warn!("Failed to read multipart body: {}", e);
                state.stats.reject();
                return Err(ConvertError::Upload(e.body_text()).into());
            }
        };
        if field.name() != Some(field_name.as_str()) {
            continue;
        }
        return accept_field(&state, field).await;
    }
}

/// Validate the file field, then run it as a job.
async fn accept_field(state: &AppState, field: Field<'_>) -> Result<AudioArtifact, UploadError> {
    let original_filename = match field.file_name() {
        None => {
            state.stats.reject();
            return Err(UploadError::NoFileSent);
        }
        Some("") => {
            state.stats.reject();
            return Err(UploadError::NoFileSelected);
        }
        Some(name) => name.to_string(),
    };

    let job = match UploadJob::new(&state.config.upload.work_dir, &original_filename) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(filename = %original_filename, "Rejected upload: {}", e);
            state.stats.reject();
            return Err(e.into());
        }
    };

    let mut active = ActiveJob::start(state, job);
    tracing::info!(
        job_id = %active.job.id,
        filename = %active.job.filename,
        original = %active.job.original_filename,
        job_dir = %active.job.job_dir.display(),
        "Upload accepted"
    );

    match run_job(state, &active.job, field).await {
        Ok((artifact, report)) => {
            active.complete(true);
            tracing::info!(
                job_id = %active.job.id,
                output = %active.job.output_filename,
                stream_index = report.stream_index,
                codec = %report.source_codec,
                sample_rate = report.source_sample_rate,
                channels = report.source_channels,
                samples = report.samples_encoded,
                duration_secs = report.duration_secs,
                output_bytes = report.output_bytes,
                "Conversion finished"
            );
            Ok(artifact)
        }
        Err(e) => {
            tracing::warn!(
                job_id = %active.job.id,
                filename = %active.job.filename,
                "Conversion failed: {}",
                e
            );
            active.job.discard().await;
            active.complete(false);
            Err(e.into())
        }
    }
}

/// An accepted job, counted in flight and shielded from the sweeper.
///
/// If the request future is dropped before `complete` is called (the client
/// disconnected), the job is counted as failed and its directory removed.
struct ActiveJob<'a> {
    state: &'a AppState,
    job: UploadJob,
    outcome: Option<bool>,
}

impl<'a> ActiveJob<'a> {
    fn start(state: &'a AppState, job: UploadJob) -> Self {
        state.stats.start();
        state.live_jobs.register(job.id);
        Self {
            state,
            job,
            outcome: None,
        }
    }

    fn complete(&mut self, success: bool) {
        self.outcome = Some(success);
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.state.live_jobs.unregister(&self.job.id);

        if let Some(success) = self.outcome {
            self.state.stats.finish(success);
            return;
        }

        self.state.stats.finish(false);
        tracing::warn!(
            job_id = %self.job.id,
            filename = %self.job.filename,
            "Job abandoned before completion"
        );
        let job = self.job.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { job.discard().await });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_dir_all(&job.job_dir) {
                    tracing::warn!("Failed to remove {}: {}", job.job_dir.display(), e);
                }
            }
        }
    }
}

/// Store the upload, convert it and load the result.
async fn run_job(
    state: &AppState,
    job: &UploadJob,
    field: Field<'_>,
) -> Result<(AudioArtifact, ExtractionReport), ConvertError> {
    job.prepare().await?;
    let stored = store_field(job, field).await?;
    tracing::debug!(job_id = %job.id, bytes = stored, "Upload stored");

    let input = job.input_path.clone();
    let output = job.output_path.clone();
    let audio = state.config.audio.clone();

    // Blocking FFmpeg call, run on the blocking thread pool
    let result = tokio::task::spawn_blocking(move || extract_audio(&input, &output, &audio))
        .await
        .map_err(|e| ConvertError::Task(e.to_string()));

    job.discard_input().await;
    let report = result??;

    let data = tokio::fs::read(&job.output_path).await?;

    Ok((
        AudioArtifact {
            filename: job.output_filename.clone(),
            data: Bytes::from(data),
        },
        report,
    ))
}

/// Stream a multipart field verbatim to the job's input path.
async fn store_field(job: &UploadJob, mut field: Field<'_>) -> Result<u64, ConvertError> {
    let mut file = tokio::fs::File::create(&job.input_path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ConvertError::Upload(e.body_text()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("audio-extract-server v", env!("CARGO_PKG_VERSION"))
}

/// Debug endpoint - job counters
pub async fn job_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.stats.snapshot();

    Json(serde_json::json!({
        "accepted": stats.accepted,
        "converted": stats.converted,
        "failed": stats.failed,
        "rejected": stats.rejected,
        "in_flight": stats.in_flight,
        "live_jobs": state.live_jobs.len(),
        "started_at": state.started_at.to_rfc3339(),
        "work_dir": state.config.upload.work_dir.to_string_lossy(),
    }))
}
