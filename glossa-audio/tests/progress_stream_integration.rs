//! Progress stream and exercise fetch integration tests
//!
//! A local axum server plays the generation service: it streams scripted
//! newline-delimited progress records and serves the two-phase completed-
//! exercise fetch (a "generating" placeholder, then the activity).

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use glossa_audio::{
    await_exercise, fetch_exercise, ClipStatus, FetchOutcome, ProgressStreamClient,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct ServiceState {
    /// Scripted progress records, one JSON document per stream line
    script: Arc<Vec<String>>,
    /// How many exercise fetches return "generating" before the activity
    not_ready_fetches: Arc<AtomicUsize>,
}

async fn progress_route(
    State(state): State<ServiceState>,
    Path(_session_id): Path<String>,
) -> impl IntoResponse {
    let script = Arc::clone(&state.script);
    let stream = async_stream::stream! {
        for line in script.iter() {
            let mut framed = line.clone();
            framed.push('\n');
            yield Ok::<_, std::io::Error>(framed.into_bytes());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    Body::from_stream(stream)
}

async fn exercise_route(
    State(state): State<ServiceState>,
    Path(_session_id): Path<String>,
) -> impl IntoResponse {
    if state.not_ready_fetches.load(Ordering::SeqCst) > 0 {
        state.not_ready_fetches.fetch_sub(1, Ordering::SeqCst);
        return Json(json!({"status": "generating"}));
    }
    Json(json!({
        "activity": {
            "title": "Lesson 7",
            "_audio_data": [
                {"audio_base64": "QUJD"},
                {"audio_base64": "REVG"}
            ]
        }
    }))
}

/// Spawn the scripted service, returning its base URL.
async fn serve(script: Vec<String>, not_ready_fetches: usize) -> String {
    let state = ServiceState {
        script: Arc::new(script),
        not_ready_fetches: Arc::new(AtomicUsize::new(not_ready_fetches)),
    };
    let app = Router::new()
        .route("/exercises/:session_id/progress", get(progress_route))
        .route("/exercises/:session_id", get(exercise_route))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn progress_stream_tracks_to_completion() {
    let base = serve(
        vec![
            r#"{"type":"init","progress":{"0":"pending","1":"pending","2":"pending"},"total_paragraphs":3}"#.to_string(),
            r#"{"type":"update_count","total_paragraphs":4,"progress":{"3":"pending"}}"#.to_string(),
            r#"{"paragraph_index":0,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":1,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":2,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":3,"status":"complete"}"#.to_string(),
            r#"{"type":"complete"}"#.to_string(),
        ],
        0,
    )
    .await;

    let client = reqwest::Client::new();
    let mut progress = ProgressStreamClient::connect(&client, &base, "session-1")
        .await
        .unwrap();

    let snapshot = progress.wait_terminal().await;
    assert!(snapshot.is_complete);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.total_clips, Some(4));
    assert_eq!(snapshot.complete_count(), 4);
    assert_eq!(snapshot.clips[&3], ClipStatus::Complete);
}

#[tokio::test]
async fn progress_stream_incomplete_until_terminal_record() {
    let base = serve(
        vec![
            r#"{"type":"update_count","total_paragraphs":4}"#.to_string(),
            r#"{"paragraph_index":0,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":1,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":2,"status":"complete"}"#.to_string(),
            r#"{"paragraph_index":3,"status":"pending"}"#.to_string(),
        ],
        0,
    )
    .await;

    let client = reqwest::Client::new();
    let mut progress = ProgressStreamClient::connect(&client, &base, "session-2")
        .await
        .unwrap();

    // Stream ends without a complete record: three clips done, not terminal
    let snapshot = progress.wait_terminal().await;
    assert!(!snapshot.is_complete);
    assert_eq!(snapshot.complete_count(), 3);
    assert_eq!(snapshot.clips[&3], ClipStatus::Pending);
}

#[tokio::test]
async fn progress_stream_error_is_terminal() {
    let base = serve(
        vec![
            r#"{"type":"init","progress":{"0":"generating"},"total_paragraphs":1}"#.to_string(),
            r#"{"error":"tts backend unavailable"}"#.to_string(),
            // Anything after the error must be ignored
            r#"{"type":"complete"}"#.to_string(),
        ],
        0,
    )
    .await;

    let client = reqwest::Client::new();
    let mut progress = ProgressStreamClient::connect(&client, &base, "session-3")
        .await
        .unwrap();

    let snapshot = progress.wait_terminal().await;
    assert!(!snapshot.is_complete);
    assert_eq!(snapshot.error.as_deref(), Some("tts backend unavailable"));
}

#[tokio::test]
async fn connect_requires_session_id() {
    let client = reqwest::Client::new();
    let result = ProgressStreamClient::connect(&client, "http://127.0.0.1:1", "").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fetch_reports_generating_then_ready() {
    let base = serve(Vec::new(), 1).await;
    let client = reqwest::Client::new();

    match fetch_exercise(&client, &base, "session-4").await.unwrap() {
        FetchOutcome::Generating => {}
        FetchOutcome::Ready(_) => panic!("first fetch should still be generating"),
    }

    match fetch_exercise(&client, &base, "session-4").await.unwrap() {
        FetchOutcome::Ready(activity) => {
            assert_eq!(activity.audio_data.len(), 2);
            assert_eq!(activity.content["title"], "Lesson 7");
        }
        FetchOutcome::Generating => panic!("second fetch should be ready"),
    }
}

#[tokio::test]
async fn await_exercise_retries_through_the_persist_window() {
    let base = serve(Vec::new(), 2).await;
    let client = reqwest::Client::new();

    let activity = await_exercise(
        &client,
        &base,
        "session-5",
        Duration::from_millis(20),
        10,
    )
    .await
    .unwrap();

    assert_eq!(activity.audio_data.len(), 2);
    assert_eq!(activity.audio_data[0].audio_base64, "QUJD");
}

#[tokio::test]
async fn await_exercise_gives_up_eventually() {
    let base = serve(Vec::new(), usize::MAX).await;
    let client = reqwest::Client::new();

    let result = await_exercise(&client, &base, "session-6", Duration::from_millis(5), 3).await;
    assert!(result.is_err());
}
