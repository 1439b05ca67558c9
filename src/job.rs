//! Upload jobs
//!
//! One [`UploadJob`] exists per accepted upload. It owns a private job
//! directory under the working directory, so uploads sharing a filename
//! never touch each other's files.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{ConvertError, Result};
use crate::transcode::derive_output_filename;

/// Prefix given to the stored upload when its name equals the output name
const SOURCE_PREFIX: &str = "source.";

/// Characters replaced in client filenames
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts (either separator style) are dropped, control and
/// reserved characters become `_`. Names that end up empty, `.` or `..` are
/// rejected.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw.rsplit(&['/', '\\'][..]).next().unwrap_or("").trim();

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(ConvertError::InvalidFilename(raw.to_string()));
    }

    if sanitized != raw {
        tracing::debug!(raw, sanitized = %sanitized, "sanitized upload filename");
    }

    Ok(sanitized)
}

/// A single video-to-audio conversion request
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: Uuid,
    /// Filename exactly as the client sent it
    pub original_filename: String,
    /// Sanitised filename
    pub filename: String,
    pub job_dir: PathBuf,
    pub input_path: PathBuf,
    pub output_filename: String,
    pub output_path: PathBuf,
}

impl UploadJob {
    /// Plan the paths for a new job under `work_dir`. Nothing is created on
    /// disk until [`UploadJob::prepare`].
    pub fn new(work_dir: &Path, original_filename: &str) -> Result<Self> {
        let filename = sanitize_filename(original_filename)?;
        let id = Uuid::new_v4();
        let job_dir = work_dir.join(id.to_string());
        let output_filename = derive_output_filename(&filename);

        let stored_name = if filename == output_filename {
            format!("{}{}", SOURCE_PREFIX, filename)
        } else {
            filename.clone()
        };

        Ok(Self {
            id,
            original_filename: original_filename.to_string(),
            input_path: job_dir.join(stored_name),
            output_path: job_dir.join(&output_filename),
            filename,
            job_dir,
            output_filename,
        })
    }

    /// Create the job directory.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.job_dir).await?;
        Ok(())
    }

    /// Remove the uploaded input, keeping the job directory and output.
    pub async fn discard_input(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.input_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    job_id = %self.id,
                    "Failed to remove upload {}: {}",
                    self.input_path.display(),
                    e
                );
            }
        }
    }

    /// Remove the job directory and everything in it.
    pub async fn discard(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    job_id = %self.id,
                    "Failed to remove job directory {}: {}",
                    self.job_dir.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(
            sanitize_filename("Férias 2023.mov").unwrap(),
            "Férias 2023.mov"
        );
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\video.mp4").unwrap(),
            "video.mp4"
        );
        assert_eq!(sanitize_filename("/abs/path/a.b.mov").unwrap(), "a.b.mov");
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("what?.mp4").unwrap(), "what_.mp4");
        assert_eq!(sanitize_filename("tab\there.mp4").unwrap(), "tab_here.mp4");
        assert_eq!(sanitize_filename("say \"hi\".mkv").unwrap(), "say _hi_.mkv");
    }

    #[test]
    fn test_sanitize_rejects_empty_components() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("  ").is_err());
    }

    #[test]
    fn test_job_paths() {
        let job = UploadJob::new(Path::new("/work"), "clip.mp4").unwrap();
        assert_eq!(job.job_dir, Path::new("/work").join(job.id.to_string()));
        assert_eq!(job.input_path, job.job_dir.join("clip.mp4"));
        assert_eq!(job.output_filename, "clip.mp3");
        assert_eq!(job.output_path, job.job_dir.join("clip.mp3"));
    }

    #[test]
    fn test_job_input_never_aliases_output() {
        let job = UploadJob::new(Path::new("/work"), "song.mp3").unwrap();
        assert_eq!(job.output_filename, "song.mp3");
        assert_eq!(job.input_path, job.job_dir.join("source.song.mp3"));
        assert_ne!(job.input_path, job.output_path);
    }

    #[test]
    fn test_same_filename_gets_distinct_directories() {
        let a = UploadJob::new(Path::new("/work"), "clip.mp4").unwrap();
        let b = UploadJob::new(Path::new("/work"), "clip.mp4").unwrap();
        assert_eq!(a.output_filename, b.output_filename);
        assert_ne!(a.job_dir, b.job_dir);
    }

    #[test]
    fn test_traversal_stays_inside_work_dir() {
        let job = UploadJob::new(Path::new("/work"), "../../../tmp/evil.mp4").unwrap();
        assert!(job.input_path.starts_with("/work"));
        assert_eq!(job.filename, "evil.mp4");
        assert_eq!(job.original_filename, "../../../tmp/evil.mp4");
    }

    #[tokio::test]
    async fn test_prepare_and_discard() {
        let work = tempfile::tempdir().unwrap();
        let job = UploadJob::new(work.path(), "clip.mp4").unwrap();
        job.prepare().await.unwrap();
        tokio::fs::write(&job.input_path, b"data").await.unwrap();
        tokio::fs::write(&job.output_path, b"mp3").await.unwrap();

        job.discard_input().await;
        assert!(!job.input_path.exists());
        assert!(job.output_path.exists());

        // removing an already removed input is silent
        job.discard_input().await;

        job.discard().await;
        assert!(!job.job_dir.exists());
    }
}
