//! Audio extraction module
//!
//! This module turns the audio track of an uploaded container into MP3:
//! - Audio decoder initialization from the source stream
//! - Resampling to the configured rate, layout and encoder sample format
//! - Rechunking into encoder-sized frames
//! - MP3 encoder initialization
//! - Muxing into the output file

pub mod decoder;
pub mod encoder;
pub mod fifo;
pub mod pipeline;
pub mod resampler;

pub use pipeline::{derive_output_filename, extract_audio, ExtractionReport};
