//! End-to-end integration tests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tower::util::ServiceExt;

use crate::http::create_router;
use crate::integration::fixtures::{
    dir_entries, garbage, mp3_ready, multipart_body, test_state, video_with_audio, wav_tone,
    y4m_video, BOUNDARY,
};

/// Response pieces the tests look at
struct Reply {
    status: StatusCode,
    content_type: String,
    disposition: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

async fn post_upload(app: Router, content_type: Option<&str>, body: Vec<u8>) -> Reply {
    let mut request = Request::builder().method("POST").uri("/upload");
    if let Some(ct) = content_type {
        request = request.header(header::CONTENT_TYPE, ct);
    }
    let response = app
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    Reply {
        status,
        content_type,
        disposition,
        body,
    }
}

async fn upload_file(app: Router, filename: &str, data: &[u8]) -> Reply {
    let (ct, body) = multipart_body("video_file", Some(filename), data);
    post_upload(app, Some(&ct), body).await
}

/// Assert the file at `path` is an MP3 with one audio stream.
fn assert_is_mp3(path: &Path) {
    let input = ffmpeg_next::format::input(&path).unwrap();
    let stream = input
        .streams()
        .best(ffmpeg_next::media::Type::Audio)
        .unwrap();
    assert_eq!(stream.parameters().id(), ffmpeg_next::codec::Id::MP3);
}

/// Container duration of the media file at `path`, in seconds
fn duration_secs(path: &Path) -> f64 {
    const AV_TIME_BASE: f64 = 1_000_000.0;
    let input = ffmpeg_next::format::input(&path).unwrap();
    input.duration() as f64 / AV_TIME_BASE
}

#[tokio::test]
async fn test_missing_field_is_no_file_sent() {
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let app = create_router(state.clone());

    let (ct, body) = multipart_body("other_field", Some("clip.mp4"), b"data");
    let reply = post_upload(app, Some(&ct), body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.content_type.starts_with("text/plain"));
    assert_eq!(reply.text(), "No file sent.");
    assert!(dir_entries(work.path()).is_empty());
    assert_eq!(state.stats.snapshot().rejected, 1);
}

#[tokio::test]
async fn test_non_multipart_is_no_file_sent() {
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let reply = post_upload(app, None, b"hello".to_vec()).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "No file sent.");
    assert!(dir_entries(work.path()).is_empty());
}

#[tokio::test]
async fn test_empty_filename_is_no_file_selected() {
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let reply = upload_file(app, "", b"").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "No file selected.");
    assert!(dir_entries(work.path()).is_empty());
}

#[tokio::test]
async fn test_field_without_filename_is_no_file_sent() {
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let app = create_router(state.clone());

    let (ct, body) = multipart_body("video_file", None, b"plain text field");
    let reply = post_upload(app, Some(&ct), body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "No file sent.");
    assert!(dir_entries(work.path()).is_empty());
    assert_eq!(state.stats.snapshot().rejected, 1);
}

#[tokio::test]
async fn test_unusable_filename_is_conversion_error() {
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let reply = upload_file(app, "..", b"data").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text().starts_with("Conversion error: Invalid filename"));
    assert!(dir_entries(work.path()).is_empty());
}

#[tokio::test]
async fn test_wav_upload_returns_mp3_attachment() {
    if !mp3_ready() {
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let app = create_router(state.clone());

    let reply = upload_file(app, "tone.wav", &wav_tone(1.0, 44100, 440.0)).await;

    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.text());
    assert_eq!(reply.content_type, "audio/mpeg");
    let disposition = reply.disposition.clone().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"tone.mp3\""));

    // one job directory holding the output only
    let jobs = dir_entries(work.path());
    assert_eq!(jobs.len(), 1);
    let job_dir = work.path().join(&jobs[0]);
    assert_eq!(dir_entries(&job_dir), vec!["tone.mp3".to_string()]);

    let on_disk = std::fs::read(job_dir.join("tone.mp3")).unwrap();
    assert_eq!(reply.body, on_disk);
    assert_is_mp3(&job_dir.join("tone.mp3"));

    let stats = state.stats.snapshot();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.converted, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_video_with_audio_track_returns_mp3() {
    if !mp3_ready() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let reply = upload_file(app, "clip.nut", &video_with_audio(scratch.path())).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type, "audio/mpeg", "body: {}", reply.text());
    assert!(reply
        .disposition
        .clone()
        .unwrap()
        .starts_with("attachment; filename=\"clip.mp3\""));

    let jobs = dir_entries(work.path());
    assert_eq!(jobs.len(), 1);
    let output = work.path().join(&jobs[0]).join("clip.mp3");
    assert_eq!(std::fs::read(&output).unwrap(), reply.body);
    assert_is_mp3(&output);

    // the tone is one second long; the video stream must not stretch it
    let duration = duration_secs(&output);
    assert!((0.8..1.3).contains(&duration), "duration {}", duration);
}

#[tokio::test]
async fn test_video_without_audio_is_conversion_error() {
    crate::ffmpeg::init().unwrap();
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let app = create_router(state.clone());

    let reply = upload_file(app, "silent.y4m", &y4m_video(5)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.content_type.starts_with("text/plain"));
    assert_eq!(
        reply.text(),
        "Conversion error: No audio stream found in source file"
    );
    assert!(dir_entries(work.path()).is_empty());
    assert_eq!(state.stats.snapshot().failed, 1);
}

#[tokio::test]
async fn test_corrupt_upload_is_conversion_error() {
    crate::ffmpeg::init().unwrap();
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let reply = upload_file(app, "junk.mp4", &garbage(4096)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(
        reply.text().starts_with("Conversion error: "),
        "unexpected body: {}",
        reply.text()
    );
    assert!(dir_entries(work.path()).is_empty());
}

#[tokio::test]
async fn test_traversal_filename_stays_in_work_dir() {
    if !mp3_ready() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    std::fs::create_dir(&work).unwrap();
    let app = create_router(test_state(&work));

    let reply = upload_file(app, "../../tone.wav", &wav_tone(0.5, 44100, 440.0)).await;

    assert_eq!(reply.content_type, "audio/mpeg", "body: {}", reply.text());
    assert!(reply
        .disposition
        .unwrap()
        .starts_with("attachment; filename=\"tone.mp3\""));
    assert_eq!(dir_entries(root.path()), vec!["work".to_string()]);
}

#[tokio::test]
async fn test_sequential_duplicate_uploads() {
    if !mp3_ready() {
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let wav = wav_tone(0.5, 44100, 440.0);

    for _ in 0..2 {
        let reply = upload_file(create_router(state.clone()), "clip.wav", &wav).await;
        assert_eq!(reply.content_type, "audio/mpeg", "body: {}", reply.text());
        assert!(reply
            .disposition
            .unwrap()
            .starts_with("attachment; filename=\"clip.mp3\""));
    }

    assert_eq!(dir_entries(work.path()).len(), 2);
    assert_eq!(state.stats.snapshot().converted, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_duplicate_uploads() {
    if !mp3_ready() {
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));
    let wav = wav_tone(1.0, 44100, 440.0);

    let (a, b) = tokio::join!(
        upload_file(app.clone(), "clip.wav", &wav),
        upload_file(app.clone(), "clip.wav", &wav),
    );

    for reply in [&a, &b] {
        assert_eq!(reply.content_type, "audio/mpeg", "body: {}", reply.text());
    }

    let jobs = dir_entries(work.path());
    assert_eq!(jobs.len(), 2);
    for job in jobs {
        assert_eq!(
            dir_entries(&work.path().join(job)),
            vec!["clip.mp3".to_string()]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_disconnect_mid_upload() {
    let work = tempfile::tempdir().unwrap();
    let state = test_state(work.path());
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // announce far more body than is sent, then hang up
    let mut partial = format!(
        "POST /upload HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
         Content-Length: 10000000\r\n\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"video_file\"; filename=\"clip.mp4\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    partial.extend(garbage(64 * 1024));

    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    socket.write_all(&partial).await.unwrap();
    socket.flush().await.unwrap();

    // the job is running once its directory exists
    for _ in 0..200 {
        if state.live_jobs.len() == 1 && dir_entries(work.path()).len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.stats.snapshot().accepted, 1);
    assert_eq!(dir_entries(work.path()).len(), 1);
    drop(socket);

    for _ in 0..200 {
        if state.stats.in_flight() == 0 && dir_entries(work.path()).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = state.stats.snapshot();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(state.live_jobs.len(), 0);
    assert!(dir_entries(work.path()).is_empty());
}

#[tokio::test]
async fn test_live_server_with_reqwest() {
    if !mp3_ready() {
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let app = create_router(test_state(work.path()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let url = format!("http://{}/upload", addr);

    let part = reqwest::multipart::Part::bytes(wav_tone(0.5, 44100, 440.0))
        .file_name("Férias.wav")
        .mime_str("audio/wav")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("video_file", part);
    let response = client.post(&url).multipart(form).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("filename*=UTF-8''F%C3%A9rias%2Emp3"));
    let bytes = response.bytes().await.unwrap();
    assert!(!bytes.is_empty());

    // a form without the file field
    let form = reqwest::multipart::Form::new().text("comment", "hello");
    let response = client.post(&url).multipart(form).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "No file sent.");
}
