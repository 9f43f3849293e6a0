//! Cliente de la API JSON usado por las páginas de la interfaz.
//!
//! Devuelve el JSON tal cual; la normalización vive en `contract`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::contract;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("error de red: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("respuesta ilegible: {0}")]
    Decode(String),
}

impl ClientError {
    /// Mensaje `detail` devuelto por el servidor, si lo hubo.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } if !detail.is_empty() => Some(detail),
            _ => None,
        }
    }
}

/// Cuerpo de `POST /api/chat/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub repo_id: String,
    pub context: Value,
}

impl ChatRequest {
    pub fn new(repo_id: &str, message: &str) -> Self {
        Self {
            message: message.to_string(),
            repo_id: repo_id.to_string(),
            context: json!({}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZipUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Campos multipart de `POST /api/repos`.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub repo_type: String,
    pub name: String,
    pub github_url: Option<String>,
    pub github_branch: Option<String>,
    pub local_path: Option<String>,
    pub zip_file: Option<ZipUpload>,
}

#[async_trait]
pub trait RepoApi: Send + Sync {
    async fn list_repositories(&self) -> Result<Value, ClientError>;
    async fn repository(&self, id: &str) -> Result<Value, ClientError>;
    async fn structure(&self, id: &str) -> Result<Value, ClientError>;
    async fn components(&self, id: &str) -> Result<Value, ClientError>;
    async fn queries(&self, id: &str, limit: usize) -> Result<Value, ClientError>;
    async fn file(&self, id: &str, path: &str) -> Result<Value, ClientError>;
    async fn chat(&self, id: &str, request: &ChatRequest) -> Result<Value, ClientError>;
    async fn analyze(&self, id: &str, file_path: &str, query: &str) -> Result<Value, ClientError>;
    async fn delete_repository(&self, id: &str) -> Result<Value, ClientError>;
    async fn create_repository(&self, upload: UploadRequest) -> Result<Value, ClientError>;
}

/// Implementación sobre HTTP con `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRepoApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpRepoApi {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Decode(format!("URL base no válida: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| contract::error_detail(&v))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).trim().to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get(&self, url: Url) -> Result<Value, ClientError> {
        Self::read(self.http.get(url).send().await?).await
    }
}

#[async_trait]
impl RepoApi for HttpRepoApi {
    async fn list_repositories(&self) -> Result<Value, ClientError> {
        self.get(self.endpoint(&["api", "repos"])?).await
    }

    async fn repository(&self, id: &str) -> Result<Value, ClientError> {
        self.get(self.endpoint(&["api", "repos", id])?).await
    }

    async fn structure(&self, id: &str) -> Result<Value, ClientError> {
        self.get(self.endpoint(&["api", "repos", id, "structure"])?).await
    }

    async fn components(&self, id: &str) -> Result<Value, ClientError> {
        self.get(self.endpoint(&["api", "repos", id, "components"])?).await
    }

    async fn queries(&self, id: &str, limit: usize) -> Result<Value, ClientError> {
        let mut url = self.endpoint(&["api", "repos", id, "queries"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.get(url).await
    }

    async fn file(&self, id: &str, path: &str) -> Result<Value, ClientError> {
        let mut url = self.endpoint(&["api", "repos", id, "files"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.get(url).await
    }

    async fn chat(&self, id: &str, request: &ChatRequest) -> Result<Value, ClientError> {
        let url = self.endpoint(&["api", "chat", id])?;
        Self::read(self.http.post(url).json(request).send().await?).await
    }

    async fn analyze(&self, id: &str, file_path: &str, query: &str) -> Result<Value, ClientError> {
        let url = self.endpoint(&["api", "repos", id, "analyze"])?;
        let body = json!({ "file_path": file_path, "query": query });
        Self::read(self.http.post(url).json(&body).send().await?).await
    }

    async fn delete_repository(&self, id: &str) -> Result<Value, ClientError> {
        let url = self.endpoint(&["api", "repos", id])?;
        Self::read(self.http.delete(url).send().await?).await
    }

    async fn create_repository(&self, upload: UploadRequest) -> Result<Value, ClientError> {
        let mut form = Form::new()
            .text("repo_type", upload.repo_type)
            .text("name", upload.name);
        if let Some(url) = upload.github_url {
            form = form.text("github_url", url);
        }
        if let Some(branch) = upload.github_branch {
            form = form.text("github_branch", branch);
        }
        if let Some(path) = upload.local_path {
            form = form.text("local_path", path);
        }
        if let Some(zip) = upload.zip_file {
            let part = Part::bytes(zip.bytes)
                .file_name(zip.file_name)
                .mime_str("application/zip")?;
            form = form.part("zip_file", part);
        }

        let url = self.endpoint(&["api", "repos"])?;
        Self::read(self.http.post(url).multipart(form).send().await?).await
    }
}
