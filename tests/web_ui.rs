mod common;

use std::sync::Arc;

use repomind::{
    build_app,
    llm::TextGenerator,
    models::{AssistantReply, QueryRecord},
    store::RepoStore,
};
use reqwest::{redirect::Policy, StatusCode};

use common::*;

struct Server {
    base: String,
    http: reqwest::Client,
    _temp: tempfile::TempDir,
}

impl Server {
    async fn start(store: Arc<dyn RepoStore>, generator: Arc<dyn TextGenerator>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let temp = tempfile::tempdir().unwrap();

        let app = build_app(state_with(store, generator, &base, temp.path()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = reqwest::Client::builder().redirect(Policy::none()).build().unwrap();
        Self { base, http, _temp: temp }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn page(&self, path: &str) -> (StatusCode, String) {
        let response = self.http.get(self.url(path)).send().await.unwrap();
        (response.status(), response.text().await.unwrap())
    }
}

#[tokio::test]
async fn chat_reply_renders_text_then_referenced_file_link() {
    let store = memory_store();
    seed_flask_repo(store.as_ref()).await;
    let server = Server::start(store, ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let response = server
        .http
        .post(server.url("/chat/42"))
        .form(&[("message", "Which web framework does this use?")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();

    let bubble = html
        .find(r#"<div class="message-content">It uses Flask.</div>"#)
        .expect("falta la burbuja del sistema");
    let link = html
        .find(r#"<a href="/repos/42/file?path=app.py">app.py</a>"#)
        .expect("falta el enlace al fichero");
    assert!(bubble < link);
    assert_eq!(html.matches(r#"class="referenced-files""#).count(), 1);
    assert!(html.contains("Chat with flask-demo"));
    assert!(!html.contains("thinking-dots"));
}

#[tokio::test]
async fn history_replay_skips_failed_answers() {
    let store = memory_store();
    seed_flask_repo(store.as_ref()).await;

    let mut failed = QueryRecord::new("42", "broken question", AssistantReply::apology("x"));
    failed.response.text = "Error generating text: upstream timeout".to_string();
    failed.timestamp = "2024-01-01T00:00:02.000000Z".to_string();
    let mut ok = QueryRecord::new(
        "42",
        "what is this?",
        AssistantReply {
            text: "A Flask demo.".to_string(),
            code: None,
            referenced_files: Vec::new(),
            confidence: 0.9,
        },
    );
    ok.timestamp = "2024-01-01T00:00:01.000000Z".to_string();
    store.save_query(&failed).await.unwrap();
    store.save_query(&ok).await.unwrap();

    let server = Server::start(store, ScriptedGenerator::answering(FLASK_ANSWER)).await;
    let (status, html) = server.page("/chat/42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(html.matches(r#"data-role="user""#).count(), 1);
    assert_eq!(html.matches(r#"data-role="system""#).count(), 1);
    assert!(html.contains("A Flask demo."));
    assert!(!html.contains("upstream timeout"));
}

#[tokio::test]
async fn unknown_repository_chat_still_renders_degraded() {
    let server = Server::start(memory_store(), ScriptedGenerator::answering(FLASK_ANSWER)).await;
    let (status, html) = server.page("/chat/ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Chat with Repository"));
    assert!(html.contains(r#"class="name-unavailable""#));
    assert!(html.contains(r#"action="/chat/ghost""#));
}

#[tokio::test]
async fn repository_pages_render_cards_tree_and_components() {
    let store = memory_store();
    seed_flask_repo(store.as_ref()).await;
    let server = Server::start(store, ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let (_, list) = server.page("/repos").await;
    assert!(list.contains(r#"data-repo-id="42""#));
    assert!(list.contains(r#"href="/chat/42""#));
    assert!(list.contains("64 bytes"));

    let (status, detail) = server.page("/repos/42").await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail.contains("<h1>flask-demo</h1>"));
    let dir = detail.find(r#"data-path="templates">templates</span>"#).unwrap();
    let file = detail.find(r#"<a href="/repos/42/file?path=app.py">app.py</a>"#).unwrap();
    assert!(dir < file);
    assert!(detail.contains("Files in templates directory"));
}

#[tokio::test]
async fn empty_repository_list_offers_an_upload_link() {
    let server = Server::start(memory_store(), ScriptedGenerator::answering(FLASK_ANSWER)).await;
    let (_, html) = server.page("/repos").await;
    assert!(html.contains("No repositories found."));
    assert!(html.contains(r#"href="/upload">Upload your first repository</a>"#));
}

#[tokio::test]
async fn file_page_shows_escaped_source() {
    let store = memory_store();
    seed_flask_repo(store.as_ref()).await;
    let server = Server::start(store, ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let (_, html) = server.page("/repos/42/file?path=templates%2Findex.html").await;
    assert!(html.contains("&lt;h1&gt;Hi&lt;/h1&gt;"));
    assert!(html.contains("HTML · 12 bytes · 1 lines"));
}

#[tokio::test]
async fn invalid_upload_is_annotated_without_calling_the_api() {
    let store = memory_store();
    let server = Server::start(store.clone(), ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let form = reqwest::multipart::Form::new()
        .text("repo_type", "github")
        .text("name", "demo")
        .text("github_url", "https://gitlab.com/me/demo");
    let response = server.http.post(server.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = response.text().await.unwrap();

    assert_eq!(html.matches(r#"class="field-error""#).count(), 1);
    assert!(html.contains("Please enter a valid GitHub URL"));
    assert!(store.list_repositories().await.unwrap().is_empty());
}

#[tokio::test]
async fn valid_upload_redirects_to_the_new_repository() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("lib.rs"), "pub fn hello() {}\n").unwrap();

    let store = memory_store();
    let server = Server::start(store.clone(), ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let form = reqwest::multipart::Form::new()
        .text("repo_type", "local")
        .text("name", "scratch")
        .text("local_path", project.path().to_string_lossy().to_string());
    let response = server.http.post(server.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let repos = store.list_repositories().await.unwrap();
    assert_eq!(repos.len(), 1);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, format!("/repos/{}", repos[0].id));
}

#[tokio::test]
async fn backend_rejections_show_their_detail_in_a_banner() {
    let server = Server::start(memory_store(), ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let form = reqwest::multipart::Form::new()
        .text("repo_type", "local")
        .text("name", "ghost")
        .text("local_path", "/definitely/not/a/dir");
    let response = server.http.post(server.url("/upload")).multipart(form).send().await.unwrap();
    let html = response.text().await.unwrap();
    assert!(html.contains(r#"class="alert alert-error""#));
    assert!(html.contains("Local path does not exist or is not a directory"));
}

#[tokio::test]
async fn legacy_chat_route_redirects() {
    let server = Server::start(memory_store(), ScriptedGenerator::answering(FLASK_ANSWER)).await;
    let response = server.http.get(server.url("/repos/42/chat")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"].to_str().unwrap(), "/chat/42");
}

#[tokio::test]
async fn legacy_source_input_is_accepted_by_the_upload_page() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("main.py"), "print('hi')\n").unwrap();

    let store = memory_store();
    let server = Server::start(store.clone(), ScriptedGenerator::answering(FLASK_ANSWER)).await;

    let form = reqwest::multipart::Form::new()
        .text("repo_type", "local")
        .text("name", "legacy")
        .text("source_input", project.path().to_string_lossy().to_string());
    let response = server.http.post(server.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let repos = store.list_repositories().await.unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].name, "legacy");
}
