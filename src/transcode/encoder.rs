//! MP3 encoder for the extraction pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` (libmp3lame in practice) to encode
//! planar float PCM frames into MP3 packets.

use crate::config::AudioConfig;
use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

/// Sample format fed to the encoder
pub const ENCODER_SAMPLE_FMT: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);
/// MPEG-1 Layer III frame size, used when the encoder does not report one
pub const MP3_FRAME_SIZE: usize = 1152;

/// Channel layout used for a requested channel count
pub fn channel_layout_for(channels: u16) -> ChannelLayout {
    if channels == 1 {
        ChannelLayout::MONO
    } else {
        ChannelLayout::STEREO
    }
}

/// MP3 encoder backed by a real FFmpeg codec context
pub struct Mp3Encoder {
    encoder: ffmpeg::encoder::Audio,
    frame_size: usize,
    time_base: ffmpeg::Rational,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    channels: usize,
    pts: i64,
}

impl Mp3Encoder {
    /// Open an MP3 encoder with the configured rate, channels and bitrate.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let codec = codec::encoder::find(codec::Id::MP3).ok_or_else(|| {
            FfmpegError::EncoderNotFound("no MP3 encoder in this FFmpeg build".into())
        })?;

        let channel_layout = channel_layout_for(config.channels);
        let channels = if config.channels == 1 { 1 } else { 2 };
        let time_base = ffmpeg::Rational::new(1, config.sample_rate as i32);

        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio_enc = context
            .encoder()
            .audio()
            .map_err(|e| FfmpegError::EncoderCreate(format!("audio encoder handle: {}", e)))?;

        audio_enc.set_rate(config.sample_rate as i32);
        audio_enc.set_format(ENCODER_SAMPLE_FMT);
        audio_enc.set_channel_layout(channel_layout);
        audio_enc.set_bit_rate(config.bitrate as usize);

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderCreate(format!(
                "{} at {} Hz, {} bps: {}",
                codec.name(),
                config.sample_rate,
                config.bitrate,
                e
            ))
        })?;

        let frame_size = match encoder.frame_size() as usize {
            0 => MP3_FRAME_SIZE,
            n => n,
        };

        Ok(Self {
            encoder,
            frame_size,
            time_base,
            sample_rate: config.sample_rate,
            channel_layout,
            channels,
            pts: 0,
        })
    }

    /// Send one PCM frame; its pts is assigned from the running sample count.
    pub fn send_frame(&mut self, frame: &mut ffmpeg::util::frame::Audio) -> Result<()> {
        frame.set_pts(Some(self.pts));
        self.pts += frame.samples() as i64;
        self.encoder
            .send_frame(frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame: {}", e)).into())
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<()> {
        self.encoder
            .send_eof()
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_eof: {}", e)).into())
    }

    /// Receive one encoded packet, or `None` if the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("receive_packet: {}", e)).into()),
        }
    }

    /// Samples per channel the encoder expects per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Encoder time base (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples sent so far.
    pub fn samples_sent(&self) -> i64 {
        self.pts
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        crate::ffmpeg::helpers::encoder_codec_parameters(&self.encoder)
    }
}

/// Check whether the FFmpeg build includes an MP3 encoder.
pub fn is_mp3_encoder_available() -> bool {
    codec::encoder::find(codec::Id::MP3).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout_for() {
        assert_eq!(channel_layout_for(1), ChannelLayout::MONO);
        assert_eq!(channel_layout_for(2), ChannelLayout::STEREO);
        assert_eq!(channel_layout_for(6), ChannelLayout::STEREO);
    }

    #[test]
    fn test_mp3_encoder_creation() {
        crate::ffmpeg::init().unwrap();
        if !is_mp3_encoder_available() {
            return;
        }
        let enc = Mp3Encoder::open(&AudioConfig::default());
        assert!(enc.is_ok(), "MP3 encoder should open: {:?}", enc.err());
        let enc = enc.unwrap();
        assert_eq!(enc.frame_size(), MP3_FRAME_SIZE);
        assert_eq!(enc.time_base(), ffmpeg::Rational::new(1, 44100));
        assert_eq!(enc.channels(), 2);
    }

    #[test]
    fn test_mp3_encoder_mono() {
        crate::ffmpeg::init().unwrap();
        if !is_mp3_encoder_available() {
            return;
        }
        let config = AudioConfig {
            sample_rate: 22050,
            channels: 1,
            bitrate: 64_000,
        };
        let enc = Mp3Encoder::open(&config).unwrap();
        assert_eq!(enc.channel_layout(), ChannelLayout::MONO);
        assert_eq!(enc.sample_rate(), 22050);
    }

    #[test]
    fn test_mp3_encoder_emits_packets() {
        crate::ffmpeg::init().unwrap();
        if !is_mp3_encoder_available() {
            return;
        }
        let mut enc = Mp3Encoder::open(&AudioConfig::default()).unwrap();

        let mut packets = 0;
        for _ in 0..8 {
            let mut frame = ffmpeg::util::frame::Audio::new(
                ENCODER_SAMPLE_FMT,
                enc.frame_size(),
                ChannelLayout::STEREO,
            );
            frame.set_rate(44100);
            for ch in 0..2 {
                for d in crate::ffmpeg::helpers::audio_plane_data_mut(&mut frame, ch).iter_mut() {
                    *d = 0;
                }
            }
            enc.send_frame(&mut frame).unwrap();
            while let Some(_packet) = enc.receive_packet().unwrap() {
                packets += 1;
            }
        }
        enc.send_eof().unwrap();
        while let Some(_packet) = enc.receive_packet().unwrap() {
            packets += 1;
        }

        assert!(packets > 0);
        assert_eq!(enc.samples_sent(), 8 * MP3_FRAME_SIZE as i64);
    }
}
