//! HTTP level tests against a local mock of the Beatoven.ai API.
//!
//! Response bodies follow the public API: `POST /tracks/compose` answers
//! `{"task_id": ...}`, `GET /tasks/{id}` answers `{"status": ..., "meta": {...}}`.

use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::Arc,
    time::Duration,
};

use beatoven::{
    AudioFormat, BeatovenClient, Error, GenerateOptions, HttpTrackApi, Overrides, Phase,
    Settings, TaskState, TrackApi, TrackRequest, config::EnvSource,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

const KEY: &str = "test-key";

fn settings(server: &MockServer) -> Settings {
    settings_for(&server.uri())
}

fn settings_for(api_url: &str) -> Settings {
    let overrides = Overrides {
        api_key: Some(KEY.into()),
        api_url: Some(api_url.into()),
        output_dir: None,
    };
    let mut settings = Settings::resolve(&overrides, &EnvSource::default()).unwrap();
    settings.poll_interval = Duration::from_millis(10);
    settings.poll_timeout = Duration::from_secs(10);
    settings.request_timeout = Duration::from_secs(5);
    settings
}

fn api(server: &MockServer) -> HttpTrackApi {
    HttpTrackApi::new(Arc::new(settings(server)))
}

async fn mount_compose(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/tracks/compose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": task_id })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn compose_sends_bearer_token_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tracks/compose"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(json!({
            "prompt": { "text": "test tone" },
            "format": "wav",
            "duration": 30,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "abc123" })))
        .expect(1)
        .mount(&server)
        .await;

    let request = TrackRequest::new("test tone")
        .unwrap()
        .with_duration(30)
        .unwrap()
        .with_format(AudioFormat::Wav);
    let created = api(&server).compose_track(&request).await.unwrap();
    assert_eq!(created.task_id, "abc123");
}

#[tokio::test]
async fn compose_applies_configured_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tracks/compose"))
        .and(body_json(json!({
            "prompt": { "text": "ambient" },
            "format": "mp3",
            "duration": 180,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "t-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let request = TrackRequest::new("ambient").unwrap();
    assert_eq!(
        api(&server).compose_track(&request).await.unwrap().task_id,
        "t-1"
    );
}

#[tokio::test]
async fn status_task_id_matches_composed_id() {
    let server = MockServer::start().await;
    mount_compose(&server, "abc123").await;
    Mock::given(method("GET"))
        .and(path("/tasks/abc123"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "composing",
            "meta": {},
        })))
        .mount(&server)
        .await;

    let api = api(&server);
    let created = api
        .compose_track(&TrackRequest::new("x").unwrap())
        .await
        .unwrap();
    let status = api.get_task_status(&created.task_id).await.unwrap();
    assert_eq!(status.task_id, created.task_id);
    assert_eq!(status.status, TaskState::Composing);
}

#[tokio::test]
async fn compose_error_statuses() {
    for (code, check) in [
        (401, (|e: &Error| matches!(e, Error::Auth { .. })) as fn(&Error) -> bool),
        (403, |e| matches!(e, Error::Auth { .. })),
        (404, |e| matches!(e, Error::Validation { .. })),
        (422, |e| matches!(e, Error::Validation { .. })),
        (503, |e| matches!(e, Error::Transient { .. })),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tracks/compose"))
            .respond_with(
                ResponseTemplate::new(code).set_body_json(json!({ "detail": "nope" })),
            )
            .mount(&server)
            .await;

        let err = api(&server)
            .compose_track(&TrackRequest::new("x").unwrap())
            .await
            .unwrap_err();
        assert!(check(&err), "{code}: {err:?}");
    }
}

#[tokio::test]
async fn compose_without_task_id_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tracks/compose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let err = api(&server)
        .compose_track(&TrackRequest::new("x").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
}

#[tokio::test]
async fn status_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&server)
        .await;

    let err = api(&server).get_task_status("missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn slow_status_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "composing" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.request_timeout = Duration::from_millis(200);
    let err = HttpTrackApi::new(Arc::new(settings))
        .get_task_status("slow")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn download_creates_directories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn/x.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF-audio".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested/deeper/x.wav");
    let url = format!("{}/cdn/x.wav", server.uri());

    let saved = api(&server).download_track(&url, &target).await.unwrap();
    assert_eq!(saved, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"RIFF-audio");
    assert!(!dir.path().join("nested/deeper/x.wav.part").exists());
}

#[tokio::test]
async fn download_to_unwritable_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn/x.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();
    let url = format!("{}/cdn/x.mp3", server.uri());

    let err = api(&server)
        .download_track(&url, &blocker.join("x.mp3"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err:?}");
}

#[tokio::test]
async fn download_missing_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn/gone.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("tracks/gone.mp3");
    let url = format!("{}/cdn/gone.mp3", server.uri());

    let err = api(&server).download_track(&url, &target).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
    assert!(!dir.path().join("tracks").exists());
}

#[tokio::test]
async fn download_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn/slow.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"ID3".to_vec())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.download_timeout = Duration::from_millis(200);
    let api = HttpTrackApi::new(Arc::new(settings));

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("tracks/slow.mp3");
    let url = format!("{}/cdn/slow.mp3", server.uri());

    let err = api.download_track(&url, &target).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
    assert!(!target.exists());
    assert!(!dir.path().join("tracks/slow.mp3.part").exists());
    assert!(!dir.path().join("tracks").exists());
}

/// Answers one request with fewer body bytes than its `Content-Length` promises
fn truncated_track_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\nRIFF")
            .unwrap();
        stream.flush().unwrap();
    });
    format!("http://{addr}/cdn/cut.wav")
}

#[tokio::test]
async fn interrupted_download_removes_part_file() {
    let server = MockServer::start().await;
    let url = truncated_track_server();

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("cut.wav");

    let err = api(&server).download_track(&url, &target).await.unwrap_err();
    assert!(matches!(err, Error::Transient { .. }), "{err:?}");
    assert!(!target.exists());
    assert!(!dir.path().join("cut.wav.part").exists());
}

#[tokio::test]
async fn compose_connection_refused_is_transient() {
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let api = HttpTrackApi::new(Arc::new(settings_for(&format!("http://{addr}"))));

    let request = TrackRequest::new("test tone").unwrap();
    let err = api.compose_track(&request).await.unwrap_err();
    assert!(matches!(err, Error::Transient { .. }), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn generates_test_tone() {
    let server = MockServer::start().await;
    mount_compose(&server, "abc123").await;
    Mock::given(method("GET"))
        .and(path("/tasks/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "meta": {},
        })))
        .with_priority(1)
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "meta": { "track_url": format!("{}/cdn/x.wav", server.uri()) },
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/x.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF-tone".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let options = GenerateOptions {
        prompt: "test tone".into(),
        duration: Some(30),
        format: Some(AudioFormat::Wav),
        output_dir: Some(dir.path().join("outputs")),
        filename: Some("test_tone".into()),
    };

    let path = BeatovenClient::new(settings(&server))
        .generate_music(&options)
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("outputs/test_tone.wav"));
    assert_eq!(std::fs::read(&path).unwrap(), b"RIFF-tone");
}

#[tokio::test]
async fn unauthorized_compose_never_polls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tracks/compose"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = BeatovenClient::new(settings(&server))
        .generate_music(&GenerateOptions::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.phase, Phase::Create);
    assert!(matches!(err.kind(), Error::Auth { .. }));
}

#[tokio::test]
async fn negative_duration_rejected_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let options = GenerateOptions {
        duration: Some(-5),
        ..GenerateOptions::new("x")
    };
    let err = BeatovenClient::new(settings(&server))
        .generate_music(&options)
        .await
        .unwrap_err();
    assert_eq!(err.phase, Phase::Setup);
    assert!(matches!(err.kind(), Error::Validation { .. }));
}

#[tokio::test]
async fn batch_results_keep_input_order() {
    let server = MockServer::start().await;
    mount_compose(&server, "batch-1").await;
    Mock::given(method("GET"))
        .and(path("/tasks/batch-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "composed",
            "meta": { "track_url": format!("{}/cdn/b.mp3", server.uri()) },
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/b.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let job = |prompt: &str, name: &str| GenerateOptions {
        output_dir: Some(dir.path().to_path_buf()),
        filename: Some(name.into()),
        ..GenerateOptions::new(prompt)
    };
    let jobs = vec![job("first", "one"), job("", "invalid"), job("third", "three")];

    let results = BeatovenClient::new(settings(&server))
        .generate_batch(jobs)
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &dir.path().join("one.mp3"));
    assert_eq!(results[1].as_ref().unwrap_err().phase, Phase::Setup);
    assert_eq!(results[2].as_ref().unwrap(), &dir.path().join("three.mp3"));
}
