//! FFmpeg module - library initialisation, log routing and FFI helpers
//!
//! This module handles:
//! - FFmpeg initialization
//! - Forwarding FFmpeg's own log output into `tracing`
//! - Safe wrappers for the few fields `ffmpeg-next` does not expose

pub mod helpers;

pub use ffmpeg_next as ffmpeg;

use std::ffi::{c_char, c_int, c_void, CStr};

/// Initialize FFmpeg library
///
/// This should be called once at application startup. Calling it again is
/// harmless, which the tests rely on.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::debug!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that forwards messages to `tracing`.
///
/// Must be called after `init()` and before any conversion starts, because
/// replacing the global log callback is not thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are called once
    // at startup before any request is served.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected for ordinary uploads and carry no signal.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Estimating duration from bitrate, this may be inaccurate",
    "Queue input is backward in time",
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
];

/// Returns true if an FFmpeg log line should be dropped.
fn is_suppressed(msg: &str) -> bool {
    SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s))
}

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut c_void,
    level: c_int,
    fmt: *const c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    if level > ffmpeg_next::ffi::av_log_get_level() {
        return;
    }

    let mut buf = [0 as c_char; 1024];
    let mut print_prefix: c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() || is_suppressed(msg) {
        return;
    }

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg_next::ffi::AV_LOG_WARNING as c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}

/// Get the version of the linked libavformat
pub fn version_info() -> String {
    let v = ffmpeg::format::version();
    format!(
        "libavformat {}.{}.{}",
        v >> 16,
        (v >> 8) & 0xff,
        v & 0xff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_version_info() {
        assert!(version_info().starts_with("libavformat "));
    }

    #[test]
    fn test_suppressed_messages() {
        assert!(is_suppressed(
            "[mp3 @ 0x55] Estimating duration from bitrate, this may be inaccurate"
        ));
        assert!(!is_suppressed("[mov,mp4 @ 0x55] moov atom not found"));
    }
}
