#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use repomind::{
    app_state::AppState,
    client::HttpRepoApi,
    config::AppConfig,
    llm::TextGenerator,
    models::{FileRecord, Repository, RepoStatus, SourceType},
    store::{MemoryStore, RepoStore},
};
use url::Url;

/// Generador que siempre devuelve lo mismo.
pub struct ScriptedGenerator(pub Result<String, String>);

impl ScriptedGenerator {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self(Ok(text.to_string())))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self(Err(message.to_string())))
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        self.0.clone().map_err(|e| anyhow!(e))
    }
}

pub fn test_config(temp_dir: &std::path::Path) -> AppConfig {
    AppConfig {
        temp_dir: temp_dir.to_path_buf(),
        max_repo_size_mb: 5,
        ..AppConfig::default()
    }
}

pub fn state_with(
    store: Arc<dyn RepoStore>,
    generator: Arc<dyn TextGenerator>,
    api_base: &str,
    temp_dir: &std::path::Path,
) -> AppState {
    let api = HttpRepoApi::new(Url::parse(api_base).expect("URL base de pruebas"));
    AppState::new(test_config(temp_dir), store, generator, Arc::new(api))
}

/// Repositorio `42` ya analizado con un `app.py` de Flask.
pub async fn seed_flask_repo(store: &dyn RepoStore) -> Repository {
    let mut repo = Repository::new("flask-demo", SourceType::Github, "https://github.com/me/flask-demo", None);
    repo.id = "42".to_string();
    repo.status = RepoStatus::Analyzed;
    repo.summary = Some("flask-demo contains 2 files.".to_string());
    repo.size_bytes = 64;
    store.insert_repository(&repo).await.unwrap();

    let files = vec![
        FileRecord {
            repo_id: "42".into(),
            path: "app.py".into(),
            language: "Python".into(),
            content: "from flask import Flask\napp = Flask(__name__)\n".into(),
            summary: "Python file with 2 lines.".into(),
            size_bytes: 46,
            line_count: 2,
            functions: Vec::new(),
        },
        FileRecord {
            repo_id: "42".into(),
            path: "templates/index.html".into(),
            language: "HTML".into(),
            content: "<h1>Hi</h1>\n".into(),
            summary: "HTML file with 1 lines.".into(),
            size_bytes: 12,
            line_count: 1,
            functions: Vec::new(),
        },
    ];
    store.save_files("42", &files).await.unwrap();
    repo
}

pub fn memory_store() -> Arc<dyn RepoStore> {
    Arc::new(MemoryStore::new())
}

pub const FLASK_ANSWER: &str = "ANSWER: It uses Flask.\n\nREFERENCES:\n- app.py\n";

/// Cuerpo multipart mínimo con campos de texto y un fichero opcional.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> (String, Vec<u8>) {
    let boundary = "repomind-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some((name, file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
