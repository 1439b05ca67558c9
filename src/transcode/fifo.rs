//! Sample FIFO between the resampler and the encoder
//!
//! The MP3 encoder only accepts frames of exactly `frame_size` samples
//! (1152 for libmp3lame), except for the final one. Resampled frames arrive
//! in whatever size the decoder produced, so they are queued here and handed
//! out again in encoder-sized chunks.
//!
//! Handles FLTP (planar float32) only, the format the resampler produces.

use crate::error::{FfmpegError, Result};
use crate::ffmpeg::helpers::{
    audio_plane_data, audio_plane_data_mut, fltp_plane_as_f32, fltp_plane_as_f32_mut,
};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

pub struct SampleFifo {
    planes: Vec<Vec<f32>>,
    layout: ChannelLayout,
    rate: u32,
}

impl SampleFifo {
    pub fn new(channels: usize, layout: ChannelLayout, rate: u32) -> Self {
        Self {
            planes: vec![Vec::new(); channels],
            layout,
            rate,
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Number of queued samples per channel.
    pub fn len(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every sample of `frame`.
    pub fn push(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<()> {
        let n = frame.samples();
        for (ch, plane) in self.planes.iter_mut().enumerate() {
            let data = audio_plane_data(frame, ch);
            let floats = fltp_plane_as_f32(data, n).ok_or_else(|| {
                FfmpegError::Resample(format!(
                    "unexpected plane layout: format={:?}, ch={}, samples={}, bytes={}",
                    frame.format(),
                    ch,
                    n,
                    data.len()
                ))
            })?;
            plane.extend_from_slice(floats);
        }
        Ok(())
    }

    /// Take exactly `frame_size` samples, or `None` if fewer are queued.
    pub fn pop_frame(&mut self, frame_size: usize) -> Result<Option<ffmpeg::util::frame::Audio>> {
        if frame_size == 0 || self.len() < frame_size {
            return Ok(None);
        }
        self.take(frame_size).map(Some)
    }

    /// Take whatever is left as one short frame.
    pub fn drain(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.take(self.len()).map(Some)
    }

    fn take(&mut self, n: usize) -> Result<ffmpeg::util::frame::Audio> {
        let mut out = ffmpeg::util::frame::Audio::new(Sample::F32(Type::Planar), n, self.layout);
        out.set_rate(self.rate);
        for (ch, plane) in self.planes.iter_mut().enumerate() {
            let bytes = audio_plane_data_mut(&mut out, ch);
            let floats = fltp_plane_as_f32_mut(bytes, n).ok_or_else(|| {
                FfmpegError::Resample(format!("cannot allocate {} samples for ch {}", n, ch))
            })?;
            floats.copy_from_slice(&plane[..n]);
            plane.drain(..n);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_frame(start: usize, samples: usize) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(Sample::F32(Type::Planar), samples, ChannelLayout::STEREO);
        frame.set_rate(44100);
        for ch in 0..2 {
            let plane = audio_plane_data_mut(&mut frame, ch);
            let floats = fltp_plane_as_f32_mut(plane, samples).unwrap();
            for (i, v) in floats.iter_mut().enumerate() {
                *v = (start + i) as f32 + ch as f32 * 0.5;
            }
        }
        frame
    }

    #[test]
    fn test_rechunks_into_fixed_frames() {
        let mut fifo = SampleFifo::new(2, ChannelLayout::STEREO, 44100);
        for k in 0..3 {
            fifo.push(&ramp_frame(k * 1000, 1000)).unwrap();
        }
        assert_eq!(fifo.len(), 3000);

        let first = fifo.pop_frame(1152).unwrap().unwrap();
        assert_eq!(first.samples(), 1152);
        let second = fifo.pop_frame(1152).unwrap().unwrap();
        assert_eq!(second.samples(), 1152);
        assert!(fifo.pop_frame(1152).unwrap().is_none());

        let tail = fifo.drain().unwrap().unwrap();
        assert_eq!(tail.samples(), 3000 - 2 * 1152);
        assert!(fifo.is_empty());
        assert!(fifo.drain().unwrap().is_none());
    }

    #[test]
    fn test_samples_keep_order_across_pushes() {
        let mut fifo = SampleFifo::new(2, ChannelLayout::STEREO, 44100);
        fifo.push(&ramp_frame(0, 700)).unwrap();
        fifo.push(&ramp_frame(700, 700)).unwrap();

        let frame = fifo.pop_frame(1152).unwrap().unwrap();
        let left = fltp_plane_as_f32(audio_plane_data(&frame, 0), 1152).unwrap();
        let right = fltp_plane_as_f32(audio_plane_data(&frame, 1), 1152).unwrap();
        assert_eq!(left[699], 699.0);
        assert_eq!(left[700], 700.0);
        assert_eq!(right[1151], 1151.5);
        assert_eq!(frame.rate(), 44100);
    }

    #[test]
    fn test_zero_frame_size_yields_nothing() {
        let mut fifo = SampleFifo::new(2, ChannelLayout::STEREO, 44100);
        fifo.push(&ramp_frame(0, 10)).unwrap();
        assert!(fifo.pop_frame(0).unwrap().is_none());
        assert_eq!(fifo.len(), 10);
    }
}
