mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use common::{PAGE_URL, TestServer, engine_for, test_config};
use futures::StreamExt;
use tokio::time::Instant;
use vidfetch_engine::{
    ChannelListener, DownloadError, NoopListener, ProgressEvent, TaskControl, TaskState,
};

const BODY_LEN: usize = 1000;

fn body() -> Vec<u8> {
    (0..BODY_LEN).map(|i| (i % 251) as u8).collect()
}

async fn video_head() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, BODY_LEN.to_string().parse().unwrap());
    (headers, ())
}

async fn video_get() -> impl IntoResponse {
    body()
}

async fn forbidden_get(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::FORBIDDEN
}

fn video_router() -> Router {
    Router::new().route("/video.mp4", get(video_get).head(video_head))
}

/// Body sent in `CHUNKS` pieces with a short gap between them.
const CHUNKS: usize = 10;
const CHUNK_LEN: usize = BODY_LEN / CHUNKS;

#[derive(Default)]
struct Trickle {
    gets: AtomicUsize,
    /// Paused right before the fourth chunk of the first response
    pause: Mutex<Option<TaskControl>>,
}

async fn trickle_get(State(trickle): State<Arc<Trickle>>) -> impl IntoResponse {
    trickle.gets.fetch_add(1, Ordering::SeqCst);
    let chunks = futures::stream::iter(0..CHUNKS).then(move |i| {
        let trickle = Arc::clone(&trickle);
        async move {
            if i == 3
                && let Some(control) = trickle.pause.lock().unwrap().take()
            {
                control.pause();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            let chunk = body()[i * CHUNK_LEN..(i + 1) * CHUNK_LEN].to_vec();
            Ok::<_, std::io::Error>(Bytes::from(chunk))
        }
    });
    Body::from_stream(chunks)
}

/// What the next GET receives.
#[derive(Debug, Clone, Copy)]
enum Reply {
    /// 200 with a longer body of wrong bytes, cut off mid-transfer
    Broken,
    ServerError,
    Full,
}

struct Script {
    replies: Vec<Reply>,
    gets: AtomicUsize,
}

impl Script {
    fn new(replies: &[Reply]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.to_vec(),
            gets: AtomicUsize::new(0),
        })
    }
}

async fn scripted_get(State(script): State<Arc<Script>>) -> impl IntoResponse {
    let n = script.gets.fetch_add(1, Ordering::SeqCst);
    match script.replies.get(n).copied().unwrap_or(Reply::Full) {
        Reply::Broken => {
            let chunks = futures::stream::iter(0..4).then(|i| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if i < 3 {
                    Ok(Bytes::from(vec![0xEE; 500]))
                } else {
                    Err(std::io::Error::other("connection reset"))
                }
            });
            Body::from_stream(chunks).into_response()
        }
        Reply::ServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Reply::Full => body().into_response(),
    }
}

fn scripted_router(script: &Arc<Script>) -> Router {
    Router::new()
        .route("/video.mp4", get(scripted_get).head(video_head))
        .with_state(Arc::clone(script))
}

const LARGE_LEN: usize = 6000;

async fn large_head() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, LARGE_LEN.to_string().parse().unwrap());
    (headers, ())
}

async fn large_get() -> impl IntoResponse {
    vec![7u8; LARGE_LEN]
}

#[tokio::test]
async fn downloads_whole_file() {
    let server = TestServer::new(video_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    let done = engine
        .download(&mut task, Arc::new(NoopListener))
        .await
        .unwrap();

    assert!(done);
    assert_eq!(task.state(), TaskState::Success);
    assert_eq!(task.counters().downloaded(), 1000);
    assert_eq!(task.counters().total(), 1000);
    assert_eq!(task.percent(), 100.0);
    assert_eq!(task.counters().retry_count(), 0);

    let path = task.file_path().unwrap();
    assert_eq!(path, dir.path().join("Test Clip.mp4"));
    assert_eq!(tokio::fs::read(path).await.unwrap(), body());
}

#[tokio::test]
async fn listener_sees_completion() {
    let server = TestServer::new(video_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));
    let (listener, mut rx) = ChannelListener::channel(16);

    let snapshot = engine
        .process(PAGE_URL, Arc::new(listener))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.state, TaskState::Success);
    assert_eq!(snapshot.downloaded_bytes, 1000);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&ProgressEvent::Progress {
        percent: 100.0,
        downloaded: 1000,
        total: 1000,
    }));
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
}

#[tokio::test]
async fn forbidden_fails_after_all_attempts() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/video.mp4", get(forbidden_get).head(video_head))
        .with_state(Arc::clone(&hits));
    let server = TestServer::new(router).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    let err = engine
        .download(&mut task, Arc::new(NoopListener))
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Network { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(task.error_code(), Some("NETWORK"));
    assert!(task.error_message().unwrap().contains("403"));
    assert_eq!(task.counters().retry_count(), 3);
}

#[tokio::test]
async fn failed_probe_skips_transfer() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/video.mp4", get(video_get).head(forbidden_get))
        .with_state(Arc::clone(&hits));
    let server = TestServer::new(router).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    assert!(
        engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .is_err()
    );

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(task.state(), TaskState::Error);
    assert!(!dir.path().join("Test Clip.mp4").exists());
}

#[tokio::test]
async fn cancelled_task_never_starts() {
    let server = TestServer::new(video_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    task.control().cancel();

    let done = engine
        .download(&mut task, Arc::new(NoopListener))
        .await
        .unwrap();
    assert!(!done);
    assert_eq!(task.state(), TaskState::Prepare);
    assert!(!dir.path().join("Test Clip.mp4").exists());
}

#[tokio::test]
async fn pause_mid_body_keeps_partial_file() {
    let trickle = Arc::new(Trickle::default());
    let router = Router::new()
        .route("/video.mp4", get(trickle_get).head(video_head))
        .with_state(Arc::clone(&trickle));
    let server = TestServer::new(router).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    *trickle.pause.lock().unwrap() = Some(task.control().clone());

    let done = engine
        .download(&mut task, Arc::new(NoopListener))
        .await
        .unwrap();
    assert!(!done);
    assert_eq!(task.state(), TaskState::Pause);
    assert_eq!(task.counters().retry_count(), 0);
    assert!(task.error_message().is_none());

    let path = task.file_path().unwrap().to_path_buf();
    let partial = tokio::fs::metadata(&path).await.unwrap().len();
    assert!(partial < BODY_LEN as u64, "kept {partial} bytes");
    assert_eq!(task.counters().downloaded(), partial);
    assert_eq!(trickle.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resume_after_pause_restarts_from_zero() {
    let trickle = Arc::new(Trickle::default());
    let router = Router::new()
        .route("/video.mp4", get(trickle_get).head(video_head))
        .with_state(Arc::clone(&trickle));
    let server = TestServer::new(router).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    *trickle.pause.lock().unwrap() = Some(task.control().clone());

    assert!(
        !engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .unwrap()
    );
    assert!(
        engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .unwrap()
    );

    assert_eq!(task.state(), TaskState::Success);
    assert_eq!(trickle.gets.load(Ordering::SeqCst), 2);
    assert_eq!(task.counters().downloaded(), BODY_LEN as u64);
    assert_eq!(task.counters().retry_count(), 0);
    let path = task.file_path().unwrap();
    assert_eq!(tokio::fs::read(path).await.unwrap(), body());
}

#[tokio::test]
async fn recovers_after_two_server_errors() {
    let script = Script::new(&[Reply::ServerError, Reply::ServerError, Reply::Full]);
    let server = TestServer::new(scripted_router(&script)).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    assert!(
        engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .unwrap()
    );

    assert_eq!(task.state(), TaskState::Success);
    assert_eq!(task.counters().retry_count(), 2);
    assert_eq!(script.gets.load(Ordering::SeqCst), 3);
    assert_eq!(task.counters().downloaded(), BODY_LEN as u64);
    let path = task.file_path().unwrap();
    assert_eq!(tokio::fs::read(path).await.unwrap(), body());
}

#[tokio::test]
async fn retry_rewrites_a_longer_stale_attempt() {
    let script = Script::new(&[Reply::Broken, Reply::ServerError, Reply::Full]);
    let server = TestServer::new(scripted_router(&script)).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    assert!(
        engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .unwrap()
    );

    assert_eq!(task.counters().retry_count(), 2);
    assert_eq!(task.counters().downloaded(), BODY_LEN as u64);
    let path = task.file_path().unwrap();
    let written = tokio::fs::read(path).await.unwrap();
    assert_eq!(written.len(), BODY_LEN);
    assert_eq!(written, body());
}

#[tokio::test]
async fn unwritable_output_fails_without_retrying() {
    let script = Script::new(&[]);
    let server = TestServer::new(scripted_router(&script)).await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server.url("/video.mp4"), test_config(dir.path()));

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    // A directory where the output file should go.
    tokio::fs::create_dir(task.file_path().unwrap()).await.unwrap();

    let err = engine
        .download(&mut task, Arc::new(NoopListener))
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Filesystem { .. }), "{err:?}");
    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(task.error_code(), Some("FILESYSTEM"));
    assert_eq!(task.counters().retry_count(), 0);
    assert_eq!(script.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_slows_the_transfer() {
    let router = Router::new().route("/video.mp4", get(large_get).head(large_head));
    let server = TestServer::new(router).await;
    let dir = tempfile::tempdir().unwrap();
    // One second of burst, then 2000 bytes of debt at 4000 B/s.
    let config = test_config(dir.path()).with_rate_limit(Some(4000));
    let engine = engine_for(&server.url("/video.mp4"), config);

    let mut task = engine.submit(PAGE_URL).unwrap();
    engine.prepare(&mut task).await.unwrap();
    let started = Instant::now();
    assert!(
        engine
            .download(&mut task, Arc::new(NoopListener))
            .await
            .unwrap()
    );

    assert!(started.elapsed() >= Duration::from_millis(450));
    assert_eq!(task.counters().downloaded(), LARGE_LEN as u64);
}
