//! Audio decoder for the extraction pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to decode the compressed audio packets
//! of the selected stream (AAC, AC-3, Opus, PCM, …) into raw PCM frames.

use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;

/// Audio decoder backed by a FFmpeg codec context
pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder for the given stream using the stream's own codec
    /// parameters.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "audio decoder for stream {} ({}): {}",
                stream_index,
                stream.parameters().id().name(),
                e
            ))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// `AVERROR_INVALIDDATA` is treated as non-fatal: a damaged packet is
    /// skipped and decoding continues with the next one.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_packet on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    /// Send EOF to flush the decoder's internal buffers.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_eof on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input or is drained.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "receive_frame on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Channel count of decoded frames.
    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next as ffmpeg;

    #[test]
    fn test_common_source_decoders_present() {
        crate::ffmpeg::init().unwrap();
        for id in [
            ffmpeg::codec::Id::AAC,
            ffmpeg::codec::Id::MP3,
            ffmpeg::codec::Id::PCM_S16LE,
        ] {
            assert!(
                ffmpeg::codec::decoder::find(id).is_some(),
                "decoder missing for {:?}",
                id
            );
        }
    }
}
