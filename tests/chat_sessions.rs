mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use repomind::{
    app_state::AppState,
    build_app,
    client::{ChatRequest, ClientError, RepoApi, UploadRequest},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

/// API lenta: el nombre y el historial tardan un poco y el chat bastante más.
#[derive(Default)]
struct SlowApi {
    chat_calls: AtomicUsize,
}

impl SlowApi {
    const LOAD_DELAY: Duration = Duration::from_millis(50);
    const CHAT_DELAY: Duration = Duration::from_millis(400);
}

#[async_trait]
impl RepoApi for SlowApi {
    async fn list_repositories(&self) -> Result<Value, ClientError> {
        Ok(json!([]))
    }
    async fn repository(&self, _id: &str) -> Result<Value, ClientError> {
        tokio::time::sleep(Self::LOAD_DELAY).await;
        Ok(json!({"name": "flask-demo"}))
    }
    async fn structure(&self, _id: &str) -> Result<Value, ClientError> {
        Ok(json!({"children": []}))
    }
    async fn components(&self, _id: &str) -> Result<Value, ClientError> {
        Ok(json!([]))
    }
    async fn queries(&self, _id: &str, _limit: usize) -> Result<Value, ClientError> {
        tokio::time::sleep(Self::LOAD_DELAY).await;
        Ok(json!([]))
    }
    async fn file(&self, _id: &str, _path: &str) -> Result<Value, ClientError> {
        Ok(Value::Null)
    }
    async fn chat(&self, _id: &str, _request: &ChatRequest) -> Result<Value, ClientError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Self::CHAT_DELAY).await;
        Ok(json!({"text": "It uses Flask.", "referenced_files": ["app.py"]}))
    }
    async fn analyze(&self, _id: &str, _file_path: &str, _query: &str) -> Result<Value, ClientError> {
        Ok(Value::Null)
    }
    async fn delete_repository(&self, _id: &str) -> Result<Value, ClientError> {
        Ok(Value::Null)
    }
    async fn create_repository(&self, _upload: UploadRequest) -> Result<Value, ClientError> {
        Ok(Value::Null)
    }
}

fn app(api: Arc<SlowApi>, temp: &std::path::Path) -> Router {
    let state = AppState::new(
        test_config(temp),
        memory_store(),
        ScriptedGenerator::answering(FLASK_ANSWER),
        api,
    );
    build_app(state)
}

fn submit(message: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat/42")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!("message={message}")))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

#[tokio::test]
async fn simultaneous_first_submits_send_a_single_chat_request() {
    let temp = tempfile::tempdir().unwrap();
    let api = Arc::new(SlowApi::default());
    let app = app(api.clone(), temp.path());

    let (first, second) = tokio::join!(send(&app, submit("one")), send(&app, submit("two")));

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
    assert_eq!(api.chat_calls.load(Ordering::SeqCst), 1);

    let rejected = if first.0 == StatusCode::CONFLICT { &first.1 } else { &second.1 };
    assert!(rejected.contains("Please wait for the current response"));
}

#[tokio::test]
async fn reloading_during_a_reply_keeps_the_pending_request_guarded() {
    let temp = tempfile::tempdir().unwrap();
    let api = Arc::new(SlowApi::default());
    let app = app(api.clone(), temp.path());

    let pending = tokio::spawn({
        let app = app.clone();
        async move { send(&app, submit("first")).await }
    });
    // Tras el init (dos cargas de 50ms) la sesión ya está esperando al chat.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, reloaded) = send(
        &app,
        Request::builder().uri("/chat/42").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reloaded.contains("thinking-dots"));
    assert!(reloaded.contains(r#"data-state="awaiting""#));

    let (status, _) = send(&app, submit("second")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, finished) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(finished.contains("It uses Flask."));
    assert_eq!(api.chat_calls.load(Ordering::SeqCst), 1);

    let (status, _) = send(&app, submit("third")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(api.chat_calls.load(Ordering::SeqCst), 2);
}
