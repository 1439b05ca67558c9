use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Outcome of a rejected or failed upload.
///
/// Every variant is reported to the client as a `200 text/plain` body, the
/// download attachment being the only success signal.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The request carried no file field under the expected name
    #[error("No file sent.")]
    NoFileSent,

    /// The file field was present but its filename was empty
    #[error("No file selected.")]
    NoFileSelected,

    /// Anything that went wrong after the upload was accepted
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvertError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Errors raised while storing an upload or extracting its audio
#[derive(Error, Debug)]
pub enum ConvertError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container has no audio stream to extract
    #[error("No audio stream found in source file")]
    NoAudioStream,

    /// The audio stream decoded to zero samples
    #[error("Audio stream contained no decodable samples")]
    EmptyAudio,

    /// The client filename has no usable component left after sanitising
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The multipart body could not be read to the end
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The blocking conversion task panicked or was cancelled
    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Failed to resample audio: {0}")]
    Resample(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),
}

/// Errors that stop the server from starting
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the conversion path
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_messages() {
        assert_eq!(UploadError::NoFileSent.to_string(), "No file sent.");
        assert_eq!(UploadError::NoFileSelected.to_string(), "No file selected.");

        let err = UploadError::from(ConvertError::NoAudioStream);
        assert_eq!(
            err.to_string(),
            "Conversion error: No audio stream found in source file"
        );
    }

    #[test]
    fn test_nested_ffmpeg_message_is_kept() {
        let err = UploadError::from(ConvertError::from(FfmpegError::OpenInput(
            "moov atom not found".into(),
        )));
        assert!(err.to_string().ends_with("moov atom not found"));
    }

    #[tokio::test]
    async fn test_upload_error_is_plain_text_ok() {
        let response = UploadError::NoFileSelected.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"No file selected.");
    }
}
