//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - Server configuration
//! - Job counters exposed on `/debug/jobs`
//! - The set of jobs still being converted

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::config::ServerConfig;

/// Lifetime counters for upload jobs
#[derive(Debug, Default)]
pub struct JobStats {
    /// Uploads that passed validation and got a job directory
    pub accepted: AtomicU64,
    /// Jobs that produced an MP3
    pub converted: AtomicU64,
    /// Jobs that ended in a conversion error
    pub failed: AtomicU64,
    /// Requests turned away before a job was created
    pub rejected: AtomicU64,
    in_flight: AtomicU64,
}

impl JobStats {
    /// Record an accepted job; it stays in flight until `finish` is called.
    pub fn start(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a job previously passed to `start`.
    pub fn finish(&self, success: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.converted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatsSnapshot {
    pub accepted: u64,
    pub converted: u64,
    pub failed: u64,
    pub rejected: u64,
    pub in_flight: u64,
}

/// Ids of jobs whose directory is still in use by a request
#[derive(Debug, Default)]
pub struct LiveJobs {
    ids: DashSet<Uuid>,
}

impl LiveJobs {
    pub fn register(&self, id: Uuid) {
        self.ids.insert(id);
    }

    pub fn unregister(&self, id: &Uuid) {
        self.ids.remove(id);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Whether a directory named `name` under the work dir belongs to a live job.
    pub fn owns_dir(&self, name: &str) -> bool {
        Uuid::parse_str(name).is_ok_and(|id| self.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Application state shared across all handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Job counters
    pub stats: JobStats,

    /// Jobs the sweeper must not touch
    pub live_jobs: LiveJobs,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            stats: JobStats::default(),
            live_jobs: LiveJobs::default(),
            started_at: Utc::now(),
        }
    }

    /// Create AppState with default configuration
    #[cfg(test)]
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_creation() {
        let state = AppState::with_defaults();
        assert_eq!(state.config.port, 5000);
        assert_eq!(state.stats.snapshot().accepted, 0);
        assert!(state.started_at <= Utc::now());
    }

    #[test]
    fn test_job_stats_lifecycle() {
        let stats = JobStats::default();
        stats.start();
        stats.start();
        assert_eq!(stats.in_flight(), 2);

        stats.finish(true);
        stats.finish(false);
        stats.reject();

        assert_eq!(
            stats.snapshot(),
            JobStatsSnapshot {
                accepted: 2,
                converted: 1,
                failed: 1,
                rejected: 1,
                in_flight: 0,
            }
        );
    }

    #[test]
    fn test_live_jobs_match_directory_names() {
        let live = LiveJobs::default();
        let id = Uuid::new_v4();
        live.register(id);

        assert!(live.owns_dir(&id.to_string()));
        assert!(!live.owns_dir(&Uuid::new_v4().to_string()));
        assert!(!live.owns_dir("not-a-uuid"));
        assert_eq!(live.len(), 1);

        live.unregister(&id);
        assert!(!live.owns_dir(&id.to_string()));
        assert_eq!(live.len(), 0);
    }
}
