//! Audio resampler for the extraction pipeline
//!
//! Converts decoded PCM frames to the sample format, rate and channel layout
//! the MP3 encoder was opened with.

use crate::error::{FfmpegError, Result};
use crate::ffmpeg::helpers::ensure_channel_layout;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

/// Headroom added to every output buffer on top of the rate-scaled input size
const OUTPUT_SLACK_SAMPLES: usize = 1024;

/// Audio resampler wrapping FFmpeg's `SwrContext`
pub struct AudioResampler {
    context: resampling::Context,
    source_rate: u32,
    output_format: Sample,
    output_layout: ChannelLayout,
    output_rate: u32,
}

impl AudioResampler {
    /// Create a resampler converting frames shaped like `src_frame` to the
    /// given output format.
    pub fn new(
        src_frame: &mut ffmpeg::util::frame::Audio,
        output_format: Sample,
        output_layout: ChannelLayout,
        output_rate: u32,
    ) -> Result<Self> {
        ensure_channel_layout(src_frame);
        let src_layout = if src_frame.channel_layout().bits() == 0 {
            match src_frame.channels() {
                1 => ChannelLayout::MONO,
                _ => ChannelLayout::STEREO,
            }
        } else {
            src_frame.channel_layout()
        };

        let context = resampling::Context::get(
            src_frame.format(),
            src_layout,
            src_frame.rate(),
            output_format,
            output_layout,
            output_rate,
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!(
                "{:?} {} Hz -> {:?} {} Hz: {}",
                src_frame.format(),
                src_frame.rate(),
                output_format,
                output_rate,
                e
            ))
        })?;

        Ok(Self {
            context,
            source_rate: src_frame.rate(),
            output_format,
            output_layout,
            output_rate,
        })
    }

    /// Convert one decoded frame.
    ///
    /// Returns `None` when the resampler buffered the input without producing
    /// output yet.
    pub fn convert(
        &mut self,
        frame: &mut ffmpeg::util::frame::Audio,
    ) -> Result<Option<ffmpeg::util::frame::Audio>> {
        ensure_channel_layout(frame);
        let capacity = self.output_capacity(frame.samples());
        let mut out = self.alloc_output(capacity);

        self.context
            .run(frame, &mut out)
            .map_err(|e| FfmpegError::Resample(e.to_string()))?;

        Ok(if out.samples() == 0 { None } else { Some(out) })
    }

    /// Drain samples still buffered inside the resampler.
    ///
    /// A passthrough context has nothing buffered and may report an error
    /// here, which is not a failure of the job.
    pub fn flush(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut out = self.alloc_output(OUTPUT_SLACK_SAMPLES * 4);
        if let Err(e) = self.context.flush(&mut out) {
            tracing::debug!("Resampler flush returned non-fatal error: {}", e);
            return Ok(None);
        }

        Ok(if out.samples() == 0 { None } else { Some(out) })
    }

    fn output_capacity(&self, input_samples: usize) -> usize {
        let scaled = (input_samples as u64 * self.output_rate as u64)
            .div_ceil(self.source_rate.max(1) as u64);
        scaled as usize + OUTPUT_SLACK_SAMPLES
    }

    fn alloc_output(&self, capacity: usize) -> ffmpeg::util::frame::Audio {
        // swr only allocates output frames it receives empty, sized to the
        // input; pre-allocating lets upsampling drain in a single call.
        let mut out =
            ffmpeg::util::frame::Audio::new(self.output_format, capacity, self.output_layout);
        out.set_rate(self.output_rate);
        out
    }
}
