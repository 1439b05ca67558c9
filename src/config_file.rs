//! Configuration file support
//!
//! Loads server configuration from TOML files. Every section and key is
//! optional; missing values fall back to [`ServerConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{AudioConfig, ServerConfig, UploadConfig};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Upload settings
    pub upload: Option<UploadSettings>,
    /// Audio settings
    pub audio: Option<AudioSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Working directory for job directories
    pub work_dir: Option<PathBuf>,
    /// Multipart field name carrying the video
    pub field_name: Option<String>,
    /// Maximum request body size in MB
    pub max_upload_mb: Option<usize>,
    /// Retention of converted outputs in seconds
    pub retain_output_secs: Option<u64>,
    /// Workspace sweep interval in seconds
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Output sample rate
    pub sample_rate: Option<u32>,
    /// Output channel count
    pub channels: Option<u16>,
    /// MP3 bitrate in bps
    pub bitrate: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate a configuration file spelling out every default
    pub fn default_config() -> Self {
        let defaults = ServerConfig::default();
        Self {
            server: Some(ServerSettings {
                host: Some(defaults.host),
                port: Some(defaults.port),
                cors_enabled: Some(defaults.cors_enabled),
            }),
            upload: Some(UploadSettings {
                work_dir: Some(defaults.upload.work_dir),
                field_name: Some(defaults.upload.field_name),
                max_upload_mb: Some(defaults.upload.max_upload_mb),
                retain_output_secs: Some(defaults.upload.retain_output_secs),
                sweep_interval_secs: Some(defaults.upload.sweep_interval_secs),
            }),
            audio: Some(AudioSettings {
                sample_rate: Some(defaults.audio.sample_rate),
                channels: Some(defaults.audio.channels),
                bitrate: Some(defaults.audio.bitrate),
            }),
            logging: Some(LoggingSettings {
                level: Some(defaults.log_level),
                format: Some(defaults.log_format),
            }),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let server = self.server.unwrap_or_default();
        let upload = self.upload.unwrap_or_default();
        let audio = self.audio.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        ServerConfig {
            host: server.host.unwrap_or(defaults.host),
            port: server.port.unwrap_or(defaults.port),
            upload: UploadConfig {
                work_dir: upload.work_dir.unwrap_or(defaults.upload.work_dir),
                field_name: upload.field_name.unwrap_or(defaults.upload.field_name),
                max_upload_mb: upload
                    .max_upload_mb
                    .unwrap_or(defaults.upload.max_upload_mb),
                retain_output_secs: upload
                    .retain_output_secs
                    .unwrap_or(defaults.upload.retain_output_secs),
                sweep_interval_secs: upload
                    .sweep_interval_secs
                    .unwrap_or(defaults.upload.sweep_interval_secs),
            },
            audio: AudioConfig {
                sample_rate: audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
                channels: audio.channels.unwrap_or(defaults.audio.channels),
                bitrate: audio.bitrate.unwrap_or(defaults.audio.bitrate),
            },
            cors_enabled: server.cors_enabled.unwrap_or(defaults.cors_enabled),
            log_level: logging.level.unwrap_or(defaults.log_level),
            log_format: logging.format.unwrap_or(defaults.log_format),
        }
    }
}

/// Load the server configuration from `path`.
///
/// A missing file yields the defaults. A file that exists but cannot be
/// parsed also yields the defaults, together with the reason so the caller
/// can log it once logging is up.
pub fn load_server_config<P: AsRef<Path>>(path: P) -> (ServerConfig, Option<String>) {
    let path = path.as_ref();
    if !path.exists() {
        return (ServerConfig::default(), None);
    }
    match ConfigFile::from_file(path) {
        Ok(cf) => (cf.into_server_config(), None),
        Err(e) => (
            ServerConfig::default(),
            Some(format!(
                "Failed to load config file {}: {}. Using defaults.",
                path.display(),
                e
            )),
        ),
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default_config();
        assert_eq!(config.server.unwrap().port, Some(5000));
        assert_eq!(
            config.upload.unwrap().field_name.as_deref(),
            Some("video_file")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[server]\nport = 8081\n\n[audio]\nbitrate = 192000").unwrap();

        let config = ConfigFile::from_file(temp_file.path())
            .unwrap()
            .into_server_config();
        assert_eq!(config.port, 8081);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.audio.bitrate, 192_000);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.upload.field_name, "video_file");
    }

    #[test]
    fn test_into_server_config() {
        let server_config = ConfigFile::default_config().into_server_config();
        assert_eq!(server_config.port, 5000);
        assert_eq!(server_config.upload.retain_output_secs, 3600);
        assert_eq!(server_config.log_format, "pretty");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warning) = load_server_config(dir.path().join("absent.toml"));
        assert_eq!(config.port, 5000);
        assert!(warning.is_none());
    }

    #[test]
    fn test_load_malformed_file_warns() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[server\nport = ").unwrap();

        let (config, warning) = load_server_config(temp_file.path());
        assert_eq!(config.port, 5000);
        assert!(warning.unwrap().contains("Using defaults"));
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        let loaded = ConfigFile::from_file(&path).unwrap().into_server_config();
        assert_eq!(loaded.port, 5000);
        assert_eq!(loaded.upload.work_dir, PathBuf::from("uploads"));
    }
}
