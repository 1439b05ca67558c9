//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory holding one job directory per request
    pub work_dir: PathBuf,

    /// Multipart field that carries the video
    pub field_name: String,

    /// Maximum request body size in megabytes
    pub max_upload_mb: usize,

    /// How long a converted output is kept on disk, in seconds
    pub retain_output_secs: u64,

    /// Interval between workspace sweeps, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("uploads"),
            field_name: "video_file".to_string(),
            max_upload_mb: 1024,
            retain_output_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl UploadConfig {
    /// Get maximum body size in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn retain_output(&self) -> Duration {
        Duration::from_secs(self.retain_output_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// MP3 encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count (1 = mono, anything else = stereo)
    pub channels: u16,

    /// MP3 bitrate in bps
    pub bitrate: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bitrate: 128_000,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upload configuration
    pub upload: UploadConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (pretty, json)
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload: UploadConfig::default(),
            audio: AudioConfig::default(),
            cors_enabled: false,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default tracing filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> String {
        format!(
            "audio_extract_server={},tower_http={}",
            self.log_level, self.log_level
        )
    }
}
