//! Test fixtures for integration tests
//!
//! Media files are generated in memory so the tests need no assets on disk.

use std::path::Path;
use std::sync::Arc;

use ffmpeg_next as ffmpeg;

use crate::config::ServerConfig;
use crate::ffmpeg::helpers::stream_reset_codec_tag;
use crate::state::AppState;

/// Boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "----audio-extract-test-boundary";

/// Whether the linked FFmpeg can produce MP3 at all
pub fn mp3_ready() -> bool {
    crate::ffmpeg::init().is_ok() && crate::transcode::encoder::is_mp3_encoder_available()
}

/// PCM WAV file holding a mono 16-bit sine tone
pub fn wav_tone(seconds: f32, sample_rate: u32, frequency: f32) -> Vec<u8> {
    let samples = (seconds * sample_rate as f32) as u32;
    let data_len = samples * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for n in 0..samples {
        let t = n as f32 / sample_rate as f32;
        let v = (t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.5;
        out.extend_from_slice(&((v * i16::MAX as f32) as i16).to_le_bytes());
    }
    out
}

/// Raw YUV4MPEG2 clip: 16x16 grey frames, no audio stream
pub fn y4m_video(frames: usize) -> Vec<u8> {
    const FRAME_BYTES: usize = 16 * 16 * 3 / 2;

    let mut out = b"YUV4MPEG2 W16 H16 F25:1 Ip A1:1 C420jpeg\n".to_vec();
    for _ in 0..frames {
        out.extend_from_slice(b"FRAME\n");
        out.extend(std::iter::repeat(0x80u8).take(FRAME_BYTES));
    }
    out
}

/// NUT file with a 25-frame video stream at index 0 and a one-second mono
/// 44.1 kHz tone at index 1, remuxed from [`y4m_video`] and [`wav_tone`].
///
/// Scratch files are written to `dir`.
pub fn video_with_audio(dir: &Path) -> Vec<u8> {
    crate::ffmpeg::init().unwrap();

    let video_path = dir.join("fixture-video.y4m");
    let audio_path = dir.join("fixture-audio.wav");
    let out_path = dir.join("fixture.nut");
    std::fs::write(&video_path, y4m_video(25)).unwrap();
    std::fs::write(&audio_path, wav_tone(1.0, 44100, 440.0)).unwrap();

    let mut inputs = vec![
        ffmpeg::format::input(&video_path).unwrap(),
        ffmpeg::format::input(&audio_path).unwrap(),
    ];
    let mut output = ffmpeg::format::output(&out_path).unwrap();

    let mut in_time_bases = Vec::new();
    for input in &inputs {
        let stream = input.streams().next().unwrap();
        let mut out_stream = output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .unwrap();
        out_stream.set_parameters(stream.parameters());
        stream_reset_codec_tag(&mut out_stream);
        in_time_bases.push(stream.time_base());
    }
    output.write_header().unwrap();

    for (index, input) in inputs.iter_mut().enumerate() {
        let out_time_base = output.stream(index).unwrap().time_base();
        for (_, mut packet) in input.packets() {
            packet.set_stream(index);
            packet.rescale_ts(in_time_bases[index], out_time_base);
            packet.set_position(-1);
            packet.write_interleaved(&mut output).unwrap();
        }
    }
    output.write_trailer().unwrap();
    drop(output);

    std::fs::read(&out_path).unwrap()
}

/// Bytes no demuxer accepts as media
pub fn garbage(len: usize) -> Vec<u8> {
    b"this is not a media file\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Hand-built `multipart/form-data` body with a single part.
///
/// `filename: None` omits the filename parameter entirely. Returns the
/// content type header value and the body.
pub fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> (String, Vec<u8>) {
    let mut disposition = format!("form-data; name=\"{}\"", field);
    if let Some(name) = filename {
        disposition.push_str(&format!("; filename=\"{}\"", name));
    }

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {}\r\n", disposition).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

/// App state whose working directory is `work_dir`
pub fn test_state(work_dir: &Path) -> Arc<AppState> {
    let mut config = ServerConfig::default();
    config.upload.work_dir = work_dir.to_path_buf();
    Arc::new(AppState::new(config))
}

/// Names of the entries directly under `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_tone_header() {
        let wav = wav_tone(0.5, 8000, 440.0);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 4000 * 2);
        assert_eq!(
            u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]) as usize,
            wav.len() - 8
        );
    }

    #[test]
    fn test_y4m_size() {
        let clip = y4m_video(3);
        let header = b"YUV4MPEG2 W16 H16 F25:1 Ip A1:1 C420jpeg\n".len();
        assert_eq!(clip.len(), header + 3 * (6 + 384));
    }

    #[test]
    fn test_multipart_body_shape() {
        let (content_type, body) = multipart_body("video_file", Some("a.mp4"), b"xyz");
        assert!(content_type.ends_with(BOUNDARY));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("name=\"video_file\"; filename=\"a.mp4\""));
        assert!(text.contains("\r\n\r\nxyz\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", BOUNDARY)));
    }

    #[test]
    fn test_video_with_audio_stream_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.nut");
        std::fs::write(&path, video_with_audio(dir.path())).unwrap();

        let input = ffmpeg::format::input(&path).unwrap();
        let kinds: Vec<ffmpeg::media::Type> = input
            .streams()
            .map(|s| s.parameters().medium())
            .collect();
        assert_eq!(kinds, vec![ffmpeg::media::Type::Video, ffmpeg::media::Type::Audio]);
        assert_eq!(
            input.streams().best(ffmpeg::media::Type::Audio).unwrap().index(),
            1
        );
    }
}
