//! Safe wrappers around FFmpeg FFI calls.
//!
//! All `unsafe` blocks needed by the transcoding pipeline are contained here
//! with explicit safety arguments.

use ffmpeg_next as ffmpeg;

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to describe the output stream to the muxer.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> ffmpeg::codec::Parameters {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` only returns null on OOM.
    // `avcodec_parameters_from_context` copies fields from a live, opened
    // encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Zero out `codec_tag` on the `AVCodecParameters` attached to an output
/// stream, so the muxer picks the correct tag for the target container.
///
/// Must be called after `out_stream.set_parameters(...)` and before
/// `write_header`.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `codecpar` is set by `set_parameters` and is non-null.
    // `codec_tag` is a plain u32 field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

/// Give a decoded frame a concrete channel layout when the source left the
/// channel order unspecified (plain PCM in WAV, some MPEG-TS streams).
///
/// The resampler compares the frame layout against the one it was configured
/// with and rejects frames whose order is `UNSPEC`.
pub fn ensure_channel_layout(frame: &mut ffmpeg::util::frame::Audio) {
    // SAFETY: `frame.as_mut_ptr()` is valid and exclusively borrowed.
    // `av_channel_layout_default` overwrites a layout that was uninit'ed
    // just before, so nothing leaks.
    unsafe {
        let f = frame.as_mut_ptr();
        if (*f).ch_layout.order == ffmpeg::ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC {
            let channels = (*f).ch_layout.nb_channels;
            ffmpeg::ffi::av_channel_layout_uninit(&mut (*f).ch_layout);
            ffmpeg::ffi::av_channel_layout_default(&mut (*f).ch_layout, channels);
        }
    }
}

/// Reinterpret a raw byte slice from an FLTP audio plane as `&[f32]`.
///
/// Returns `None` if the slice is not 4-byte aligned or is shorter than
/// `sample_count * 4` bytes.
pub fn fltp_plane_as_f32(byte_slice: &[u8], sample_count: usize) -> Option<&[f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: alignment and length are verified above. FLTP planes are
    // native-endian f32 values laid out contiguously.
    Some(unsafe { std::slice::from_raw_parts(ptr as *const f32, sample_count) })
}

/// Mutable version of [`fltp_plane_as_f32`].
pub fn fltp_plane_as_f32_mut(byte_slice: &mut [u8], sample_count: usize) -> Option<&mut [f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_mut_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: as above, and the mutable borrow of `byte_slice` guarantees
    // exclusive access.
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, sample_count) })
}

/// Extract an audio plane slice from an `AVFrame`.
///
/// `ffmpeg-next`'s `Audio::data(index)` stops counting planes when
/// `linesize[1] == 0`, but planar audio frames usually only populate
/// `linesize[0]`, which then describes the size of every plane.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: `frame.as_ptr()` is valid for the lifetime of `frame`; plane
    // pointers are checked for null and `linesize[0]` is the allocation size
    // of each plane.
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if frame.format().is_planar() {
            if index >= channels {
                return &[];
            }
        } else if index > 0 {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

/// Mutable version of [`audio_plane_data`].
pub fn audio_plane_data_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: same as `audio_plane_data`; the `&mut` borrow of `frame`
    // guarantees exclusive access to its planes.
    unsafe {
        let f = frame.as_mut_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if frame.format().is_planar() {
            if index >= channels {
                return &mut [];
            }
        } else if index > 0 {
            return &mut [];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts_mut(plane_ptr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::util::channel_layout::ChannelLayout;
    use ffmpeg_next::util::format::sample::{Sample, Type};

    #[test]
    fn test_fltp_plane_rejects_short_slice() {
        let bytes = [0u8; 7];
        assert!(fltp_plane_as_f32(&bytes, 2).is_none());
    }

    #[test]
    fn test_plane_roundtrip_through_frame() {
        let mut frame = ffmpeg::util::frame::Audio::new(
            Sample::F32(Type::Planar),
            16,
            ChannelLayout::STEREO,
        );

        for ch in 0..2 {
            let plane = audio_plane_data_mut(&mut frame, ch);
            let floats = fltp_plane_as_f32_mut(plane, 16).unwrap();
            for (i, v) in floats.iter_mut().enumerate() {
                *v = (ch * 100 + i) as f32;
            }
        }

        let right = fltp_plane_as_f32(audio_plane_data(&frame, 1), 16).unwrap();
        assert_eq!(right[0], 100.0);
        assert_eq!(right[15], 115.0);
        assert!(audio_plane_data(&frame, 2).is_empty());
    }
}
