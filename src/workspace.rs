//! Working directory maintenance
//!
//! Converted outputs stay in their job directory after the response is sent
//! and are swept once they are older than the retention period.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::state::LiveJobs;

/// Create the working directory if it does not exist yet.
pub fn ensure_work_dir(work_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(work_dir)?;
    tracing::info!("Working directory: {}", work_dir.display());
    Ok(())
}

/// Remove job directories under `work_dir` last modified more than `ttl` ago.
///
/// Plain files are left alone, as are entries whose age cannot be read and
/// directories of jobs in `live`. Returns the number of directories removed.
pub fn sweep_expired(work_dir: &Path, ttl: Duration, live: &LiveJobs) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(work_dir)? {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !metadata.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if live.owns_dir(&name.to_string_lossy()) {
            tracing::debug!("Skipping live job directory {}", entry.path().display());
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok());
        match age {
            Some(age) if age >= ttl => {}
            _ => continue,
        }

        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                tracing::debug!("Swept expired job directory {}", entry.path().display());
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to sweep job directory {}: {}",
                    entry.path().display(),
                    e
                );
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ensure_work_dir_creates_nested() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a").join("uploads");
        ensure_work_dir(&dir).unwrap();
        assert!(dir.is_dir());
        // second call is a no-op
        ensure_work_dir(&dir).unwrap();
    }

    #[test]
    fn test_sweep_removes_expired_directories_only() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("job-a")).unwrap();
        std::fs::write(root.path().join("job-a").join("clip.mp3"), b"x").unwrap();
        std::fs::create_dir(root.path().join("job-b")).unwrap();
        std::fs::write(root.path().join("stray.txt"), b"keep").unwrap();

        let live = LiveJobs::default();
        let removed = sweep_expired(root.path(), Duration::ZERO, &live).unwrap();
        assert_eq!(removed, 2);
        assert!(!root.path().join("job-a").exists());
        assert!(!root.path().join("job-b").exists());
        assert!(root.path().join("stray.txt").exists());
    }

    #[test]
    fn test_sweep_keeps_fresh_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("job-a")).unwrap();

        let live = LiveJobs::default();
        let removed = sweep_expired(root.path(), Duration::from_secs(3600), &live).unwrap();
        assert_eq!(removed, 0);
        assert!(root.path().join("job-a").exists());
    }

    #[test]
    fn test_sweep_missing_work_dir_is_error() {
        let root = tempfile::tempdir().unwrap();
        let live = LiveJobs::default();
        assert!(sweep_expired(&root.path().join("absent"), Duration::ZERO, &live).is_err());
    }

    #[test]
    fn test_sweep_skips_live_jobs() {
        let root = tempfile::tempdir().unwrap();
        let running = Uuid::new_v4();
        let finished = Uuid::new_v4();
        std::fs::create_dir(root.path().join(running.to_string())).unwrap();
        std::fs::write(root.path().join(running.to_string()).join("clip.mp4"), b"x").unwrap();
        std::fs::create_dir(root.path().join(finished.to_string())).unwrap();

        let live = LiveJobs::default();
        live.register(running);

        let removed = sweep_expired(root.path(), Duration::ZERO, &live).unwrap();
        assert_eq!(removed, 1);
        assert!(root.path().join(running.to_string()).join("clip.mp4").exists());
        assert!(!root.path().join(finished.to_string()).exists());

        // swept on the next pass once the job is done
        live.unregister(&running);
        assert_eq!(sweep_expired(root.path(), Duration::ZERO, &live).unwrap(), 1);
        assert!(!root.path().join(running.to_string()).exists());
    }
}
