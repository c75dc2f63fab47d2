//! Remote answer service tests against a local stub server

mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use base64::Engine;
use serde_json::{Value, json};

use common::{CountingGenerator, Rig};
use mentor_voice::response::{DEFAULT_REMOTE_TIMEOUT, Generator, LocalPipeline, RemoteProvider};
use mentor_voice::voice::CapturedUtterance;
use mentor_voice::{Error, ResponseOrchestrator, ResponseProvider, ResponseSource, UserInput};

const ANSWER_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

/// Requests the stub received: content type and raw body
#[derive(Clone, Default)]
struct Seen(Arc<Mutex<Vec<(String, Vec<u8>)>>>);

impl Seen {
    fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

fn record(seen: &Seen, headers: &HeaderMap, body: &Bytes) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.0.lock().unwrap().push((content_type, body.to_vec()));
}

async fn answer_with_url(
    State(seen): State<Seen>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::Json<Value> {
    record(&seen, &headers, &body);
    axum::Json(json!({
        "text": "Closures capture their environment.",
        "audio_url": "/static/answer.wav",
        "emotion": "positive",
    }))
}

async fn answer_inline(
    State(seen): State<Seen>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::Json<Value> {
    record(&seen, &headers, &body);
    axum::Json(json!({
        "text": "Try it again.",
        "audio_bytes": base64::engine::general_purpose::STANDARD.encode(b"ID3inline"),
    }))
}

async fn answer_missing_audio() -> axum::Json<Value> {
    axum::Json(json!({
        "text": "No audio today.",
        "audio_url": "/static/missing.mp3",
    }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded")
}

async fn garbage() -> &'static str {
    "<html>not json</html>"
}

async fn slow() -> axum::Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    axum::Json(json!({ "text": "too late" }))
}

/// Serve `router` on an ephemeral port and return its base URL
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn provider(rig: &Rig, base_url: &str, timeout: Duration) -> RemoteProvider {
    RemoteProvider::new(base_url, "learner-42".to_string(), timeout, rig.store()).unwrap()
}

fn utterance(rig: &Rig) -> CapturedUtterance {
    let path = rig.dir.path().join("question.wav");
    let audio = b"RIFFquestion".to_vec();
    std::fs::write(&path, &audio).unwrap();
    CapturedUtterance {
        audio,
        path,
        captured_at: chrono::Local::now(),
        transcript: None,
    }
}

fn responses(rig: &Rig) -> Vec<PathBuf> {
    std::fs::read_dir(rig.dir.path().join("responses"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[tokio::test]
async fn test_text_turn_posts_json_and_downloads_audio() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/api/ask", post(answer_with_url))
        .route("/static/answer.wav", get(|| async { ANSWER_WAV }))
        .with_state(seen.clone());
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let payload = remote
        .respond(&UserInput::Text("what is a closure".to_string()))
        .await
        .unwrap();

    assert_eq!(payload.text, "Closures capture their environment.");
    assert_eq!(payload.emotion, "positive");
    assert_eq!(payload.source, ResponseSource::Remote);

    let audio = payload.audio.expect("audio downloaded");
    assert_eq!(audio.extension().unwrap(), "wav");
    assert!(audio.starts_with(rig.dir.path().join("responses")));
    assert_eq!(std::fs::read(&audio).unwrap(), ANSWER_WAV);

    let requests = seen.take();
    assert_eq!(requests.len(), 1);
    let (content_type, body) = &requests[0];
    assert!(content_type.starts_with("application/json"));
    let body: Value = serde_json::from_slice(body).unwrap();
    assert_eq!(
        body,
        json!({ "user_input": "what is a closure", "user_id": "learner-42" })
    );
}

#[tokio::test]
async fn test_audio_turn_uploads_multipart() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/api/ask", post(answer_inline))
        .with_state(seen.clone());
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let payload = remote
        .respond(&UserInput::Audio(utterance(&rig)))
        .await
        .unwrap();

    assert_eq!(payload.text, "Try it again.");
    assert_eq!(payload.emotion, "neutral");

    let audio = payload.audio.expect("inline audio saved");
    assert_eq!(audio.extension().unwrap(), "mp3");
    assert_eq!(std::fs::read(&audio).unwrap(), b"ID3inline");

    let requests = seen.take();
    let (content_type, body) = &requests[0];
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(body);
    assert!(body.contains(r#"name="audio"; filename="question.wav""#));
    assert!(body.contains("audio/wav"));
    assert!(body.contains("RIFFquestion"));
    assert!(body.contains(r#"name="user_id""#));
    assert!(body.contains("learner-42"));
}

#[tokio::test]
async fn test_missing_audio_keeps_text() {
    let router = Router::new().route("/api/ask", post(answer_missing_audio));
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let input = UserInput::Text("hello".to_string());
    let payload = tokio_test::assert_ok!(remote.respond(&input).await);

    assert_eq!(payload.text, "No audio today.");
    assert!(payload.audio.is_none());
    assert!(responses(&rig).is_empty());
}

#[tokio::test]
async fn test_server_error_is_remote_error() {
    let router = Router::new().route("/api/ask", post(broken));
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let input = UserInput::Text("hi".to_string());
    let err = tokio_test::assert_err!(remote.respond(&input).await);
    assert!(matches!(&err, Error::Remote(msg) if msg.contains("500")));
}

#[tokio::test]
async fn test_malformed_body_is_remote_error() {
    let router = Router::new().route("/api/ask", post(garbage));
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let input = UserInput::Text("hi".to_string());
    let err = tokio_test::assert_err!(remote.respond(&input).await);
    assert!(matches!(&err, Error::Remote(msg) if msg.contains("malformed")));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let router = Router::new().route("/api/ask", post(slow));
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, Duration::from_millis(200));

    let input = UserInput::Text("hi".to_string());
    let err = tokio_test::assert_err!(remote.respond(&input).await);
    assert!(matches!(&err, Error::Remote(msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn test_orchestrator_falls_back_when_service_fails() {
    let router = Router::new().route("/api/ask", post(broken));
    let base = serve(router).await;

    let rig = Rig::new();
    let remote = provider(&rig, &base, DEFAULT_REMOTE_TIMEOUT);

    let generate_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&generate_calls);
    let store = rig.store();
    let mut orchestrator = ResponseOrchestrator::new(
        Box::new(remote),
        Box::new(move || {
            let pipeline = LocalPipeline::new(
                None,
                Some(Box::new(CountingGenerator {
                    calls: Arc::clone(&calls),
                }) as Box<dyn Generator>),
                Vec::new(),
                "You are a patient tutor.".to_string(),
                store.clone(),
            );
            Ok(Box::new(pipeline) as Box<dyn ResponseProvider>)
        }),
    );

    let payload = orchestrator
        .respond(&UserInput::Text("how do lifetimes work".to_string()))
        .await;

    assert!(orchestrator.has_fallback());
    assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(payload.text, "About how do lifetimes work: keep going.");
    assert!(payload.audio.is_none());
    assert_ne!(payload.source, ResponseSource::Remote);
}
