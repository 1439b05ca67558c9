//! Audio extraction pipeline
//!
//! Combines `AudioDecoder` → `AudioResampler` → `SampleFifo` → `Mp3Encoder`
//! and muxes the result into an MP3 file next to the upload.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::config::AudioConfig;
use crate::error::{ConvertError, FfmpegError, Result};
use crate::ffmpeg::helpers::stream_reset_codec_tag;

use super::decoder::AudioDecoder;
use super::encoder::{Mp3Encoder, ENCODER_SAMPLE_FMT};
use super::fifo::SampleFifo;
use super::resampler::AudioResampler;

/// Extension of every file the pipeline writes
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Summary of one finished extraction
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    /// Index of the audio stream that was extracted
    pub stream_index: usize,
    /// Codec of the source audio stream
    pub source_codec: String,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    /// Samples per channel written to the encoder
    pub samples_encoded: i64,
    pub duration_secs: f64,
    /// Size of the written MP3 file
    pub output_bytes: u64,
}

/// Extract the best audio stream of `input_path` into an MP3 at `output_path`.
///
/// Blocking: call from `spawn_blocking`. All FFmpeg contexts are dropped
/// before this returns, so the input file can be removed right after.
pub fn extract_audio(
    input_path: &Path,
    output_path: &Path,
    config: &AudioConfig,
) -> Result<ExtractionReport> {
    // ── 1. Open source file and pick the audio stream ─────────────────────
    let mut input = ffmpeg::format::input(&input_path)
        .map_err(|e| FfmpegError::OpenInput(e.to_string()))?;

    let (stream_index, source_codec, source_time_base, mut decoder) = {
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or(ConvertError::NoAudioStream)?;
        let decoder = AudioDecoder::open(&stream)?;
        (
            stream.index(),
            stream.parameters().id(),
            stream.time_base(),
            decoder,
        )
    };

    tracing::debug!(
        stream_index,
        codec = source_codec.name(),
        sample_rate = decoder.sample_rate(),
        channels = decoder.channels(),
        time_base = ?source_time_base,
        "extract_audio: decoder opened"
    );

    // ── 2. Open encoder and output muxer ──────────────────────────────────
    let mut encoder = Mp3Encoder::open(config)?;

    let mut output = ffmpeg::format::output(&output_path)
        .map_err(|e| FfmpegError::MuxerCreate(e.to_string()))?;
    {
        let mut out_stream = output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::MP3))
            .map_err(|e| FfmpegError::MuxerCreate(format!("add_stream: {}", e)))?;
        out_stream.set_parameters(encoder.codec_parameters());
        stream_reset_codec_tag(&mut out_stream);
        out_stream.set_time_base(encoder.time_base());
    }
    output
        .write_header()
        .map_err(|e| FfmpegError::WriteHeader(e.to_string()))?;

    // The muxer may pick its own time base while writing the header
    let out_time_base = output
        .stream(0)
        .map(|s| s.time_base())
        .unwrap_or_else(|| encoder.time_base());

    let mut sink = PacketSink {
        output: &mut output,
        in_time_base: encoder.time_base(),
        out_time_base,
    };

    // ── 3. Decode → resample → rechunk → encode ───────────────────────────
    let mut resampler: Option<AudioResampler> = None;
    let mut fifo = SampleFifo::new(
        encoder.channels(),
        encoder.channel_layout(),
        encoder.sample_rate(),
    );
    let mut decoded_frames = 0usize;

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while let Some(mut frame) = decoder.receive_frame()? {
            decoded_frames += 1;
            resample_into(&mut resampler, &mut frame, &mut fifo)?;
            encode_ready(&mut fifo, &mut encoder, &mut sink)?;
        }
    }

    // ── 4. Flush every stage in order ─────────────────────────────────────
    decoder.send_eof()?;
    while let Some(mut frame) = decoder.receive_frame()? {
        decoded_frames += 1;
        resample_into(&mut resampler, &mut frame, &mut fifo)?;
    }
    if let Some(rsmp) = resampler.as_mut() {
        if let Some(out) = rsmp.flush()? {
            fifo.push(&out)?;
        }
    }
    encode_ready(&mut fifo, &mut encoder, &mut sink)?;
    if let Some(mut tail) = fifo.drain()? {
        encoder.send_frame(&mut tail)?;
    }

    if encoder.samples_sent() == 0 {
        tracing::warn!(
            stream_index,
            decoded_frames,
            "extract_audio: audio stream produced no samples"
        );
        return Err(ConvertError::EmptyAudio);
    }

    encoder.send_eof()?;
    sink.drain(&mut encoder)?;

    output
        .write_trailer()
        .map_err(|e| FfmpegError::WriteTrailer(e.to_string()))?;
    drop(output);
    drop(input);

    let output_bytes = std::fs::metadata(output_path)?.len();
    let samples_encoded = encoder.samples_sent();

    let report = ExtractionReport {
        stream_index,
        source_codec: source_codec.name().to_string(),
        source_sample_rate: decoder.sample_rate(),
        source_channels: decoder.channels(),
        samples_encoded,
        duration_secs: samples_encoded as f64 / encoder.sample_rate() as f64,
        output_bytes,
    };

    tracing::debug!(?report, "extract_audio: done");

    Ok(report)
}

/// Writes encoder output to the muxer in the output stream's time base.
struct PacketSink<'a> {
    output: &'a mut ffmpeg::format::context::Output,
    in_time_base: ffmpeg::Rational,
    out_time_base: ffmpeg::Rational,
}

impl PacketSink<'_> {
    /// Write every packet the encoder currently has ready.
    fn drain(&mut self, encoder: &mut Mp3Encoder) -> Result<()> {
        while let Some(mut packet) = encoder.receive_packet()? {
            packet.set_stream(0);
            packet.rescale_ts(self.in_time_base, self.out_time_base);
            packet
                .write_interleaved(&mut *self.output)
                .map_err(|e| FfmpegError::WritePacket(e.to_string()))?;
        }
        Ok(())
    }
}

/// Resample one decoded frame into the FIFO.
///
/// The resampler is created from the first frame that arrives, which may be
/// one the decoder only releases on flush.
fn resample_into(
    resampler: &mut Option<AudioResampler>,
    frame: &mut ffmpeg::util::frame::Audio,
    fifo: &mut SampleFifo,
) -> Result<()> {
    if resampler.is_none() {
        tracing::debug!(
            sample_rate = frame.rate(),
            channels = frame.channels(),
            format = ?frame.format(),
            "extract_audio: creating resampler from first frame"
        );
        *resampler = Some(AudioResampler::new(
            frame,
            ENCODER_SAMPLE_FMT,
            fifo.layout(),
            fifo.rate(),
        )?);
    }
    if let Some(rsmp) = resampler.as_mut() {
        if let Some(out) = rsmp.convert(frame)? {
            fifo.push(&out)?;
        }
    }
    Ok(())
}

/// Feed every full encoder frame waiting in the FIFO.
fn encode_ready(
    fifo: &mut SampleFifo,
    encoder: &mut Mp3Encoder,
    sink: &mut PacketSink<'_>,
) -> Result<()> {
    while let Some(mut frame) = fifo.pop_frame(encoder.frame_size())? {
        encoder.send_frame(&mut frame)?;
        sink.drain(encoder)?;
    }
    Ok(())
}

/// Name of the MP3 produced for an upload called `filename`.
///
/// Only the final extension is replaced: `a.b.mov` becomes `a.b.mp3`, and a
/// name without extension just gains one.
pub fn derive_output_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    format!("{}.{}", stem, OUTPUT_EXTENSION)
}
