use std::path::PathBuf;

use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::spawn;
use tracing::{info, warn};

use crate::{
    analysis,
    app_state::AppState,
    error::{ApiError, ApiResult},
    ingest::{self, RepoSource},
    models::{is_zip_name, AssistantReply, Component, FileAnalysis, QueryRecord, Repository, SourceType, TreeNode},
};

const DEFAULT_QUERY_LIMIT: usize = 10;
const DEFAULT_ANALYSIS_QUERY: &str = "Summarize what this file does and suggest improvements.";

// --- Payloads ---

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
    #[serde(default)]
    repo_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

#[derive(Deserialize)]
pub struct AnalyzePayload {
    file_path: String,
    #[serde(default)]
    query: String,
}

#[derive(Deserialize)]
pub struct QueriesParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct FileParams {
    path: Option<String>,
}

/// Campos multipart de `POST /api/repos`.
#[derive(Debug, Default)]
struct UploadFields {
    repo_type: String,
    name: String,
    github_url: String,
    github_branch: String,
    local_path: String,
    /// Campo unificado antiguo; se acepta como alias del campo del tipo elegido.
    source_input: String,
    zip_file: Option<(String, Vec<u8>)>,
}

impl UploadFields {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut fields = UploadFields::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "zip_file" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid ZIP upload: {e}")))?;
                if !file_name.is_empty() || !bytes.is_empty() {
                    fields.zip_file = Some((file_name, bytes.to_vec()));
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid form field '{name}': {e}")))?;
            match name.as_str() {
                "repo_type" => fields.repo_type = value,
                "name" => fields.name = value,
                "github_url" => fields.github_url = value,
                "github_branch" => fields.github_branch = value,
                "local_path" => fields.local_path = value,
                "source_input" => fields.source_input = value,
                other => warn!("Campo de subida desconocido ignorado: {other}"),
            }
        }
        Ok(fields)
    }

    /// Valida los campos y devuelve el registro nuevo y su origen.
    fn into_repository(mut self) -> ApiResult<(Repository, RepoSource)> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Repository name is required".into()));
        }
        let source_type = SourceType::parse(self.repo_type.trim())
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid repository type: {}", self.repo_type)))?;

        if !self.source_input.trim().is_empty() {
            warn!("Campo 'source_input' obsoleto; usa el campo específico del tipo {source_type}");
            let alias = std::mem::take(&mut self.source_input);
            match source_type {
                SourceType::Github if self.github_url.trim().is_empty() => self.github_url = alias,
                SourceType::Local if self.local_path.trim().is_empty() => self.local_path = alias,
                _ => {}
            }
        }

        match source_type {
            SourceType::Github => {
                let url = self.github_url.trim();
                if url.is_empty() {
                    return Err(ApiError::BadRequest("GitHub URL is required".into()));
                }
                if !url.contains("github.com") {
                    return Err(ApiError::BadRequest("Invalid GitHub URL".into()));
                }
                let branch = Some(self.github_branch.trim().to_string()).filter(|b| !b.is_empty());
                Ok((
                    Repository::new(&name, source_type, url, branch.clone()),
                    RepoSource::Github {
                        url: url.to_string(),
                        branch,
                    },
                ))
            }
            SourceType::Zip => {
                let (file_name, bytes) = self
                    .zip_file
                    .ok_or_else(|| ApiError::BadRequest("ZIP file is required".into()))?;
                if !is_zip_name(&file_name) {
                    return Err(ApiError::BadRequest("File must be a ZIP archive".into()));
                }
                Ok((
                    Repository::new(&name, source_type, &file_name, None),
                    RepoSource::Zip { file_name, bytes },
                ))
            }
            SourceType::Local => {
                let path = self.local_path.trim();
                if path.is_empty() {
                    return Err(ApiError::BadRequest("Local path is required".into()));
                }
                let dir = PathBuf::from(path);
                if !dir.is_dir() {
                    return Err(ApiError::BadRequest(format!(
                        "Local path does not exist or is not a directory: {path}"
                    )));
                }
                Ok((
                    Repository::new(&name, source_type, path, None),
                    RepoSource::Local { path: dir },
                ))
            }
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = usize::try_from(app_state.config.max_repo_size_bytes()).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/api/repos",
            get(list_repositories_handler)
                .post(create_repository_handler)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/repos/:id",
            get(get_repository_handler).delete(delete_repository_handler),
        )
        .route("/api/repos/:id/structure", get(structure_handler))
        .route("/api/repos/:id/components", get(components_handler))
        .route("/api/repos/:id/queries", get(queries_handler))
        .route("/api/repos/:id/files", get(file_handler))
        .route("/api/repos/:id/analyze", post(analyze_handler))
        .route("/api/chat/:id", post(chat_handler))
        .with_state(app_state)
}

async fn find_repository(state: &AppState, id: &str) -> ApiResult<Repository> {
    state
        .store
        .get_repository(id)
        .await?
        .ok_or_else(ApiError::repo_not_found)
}

// --- Handlers ---

#[axum::debug_handler]
async fn list_repositories_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Repository>>> {
    Ok(Json(state.store.list_repositories().await?))
}

#[axum::debug_handler]
async fn create_repository_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (repo, source) = UploadFields::read(multipart).await?.into_repository()?;
    state.store.insert_repository(&repo).await?;
    info!("Repositorio {} ({}) registrado desde {}", repo.id, repo.name, repo.source_type);

    let response = json!({ "id": repo.id, "name": repo.name, "status": repo.status });

    let store = state.store.clone();
    let workdir = ingest::workdir_for(&state.config.temp_dir, &repo);
    let max_bytes = state.config.max_repo_size_bytes();
    spawn(async move {
        if let Ok(summary) =
            ingest::ingest_repository(store, &repo, source, workdir.clone(), max_bytes).await
        {
            info!("¡Ingesta de {} completada! {}", repo.id, summary);
        }
        if workdir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
                warn!("No se pudo limpiar {}: {e}", workdir.display());
            }
        }
    });

    Ok((StatusCode::CREATED, Json(response)))
}

#[axum::debug_handler]
async fn get_repository_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Repository>> {
    Ok(Json(find_repository(&state, &id).await?))
}

#[axum::debug_handler]
async fn delete_repository_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_repository(&id).await? {
        return Err(ApiError::repo_not_found());
    }
    state.drop_chat_session(&id).await;
    info!("Repositorio {id} eliminado.");
    Ok(Json(json!({ "message": "Repository deleted successfully" })))
}

#[axum::debug_handler]
async fn structure_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TreeNode>> {
    let repo = find_repository(&state, &id).await?;
    let files = state.store.list_files(&id).await?;
    Ok(Json(analysis::build_structure(&repo.name, &files)))
}

#[axum::debug_handler]
async fn components_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Component>>> {
    find_repository(&state, &id).await?;
    let files = state.store.list_files(&id).await?;
    Ok(Json(analysis::group_components(&files)))
}

#[axum::debug_handler]
async fn queries_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QueriesParams>,
) -> ApiResult<Json<Vec<QueryRecord>>> {
    find_repository(&state, &id).await?;
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    Ok(Json(state.store.recent_queries(&id, limit).await?))
}

#[axum::debug_handler]
async fn file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<FileParams>,
) -> ApiResult<Json<Value>> {
    let path = params
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("File path is required".into()))?;
    find_repository(&state, &id).await?;

    let file = state
        .store
        .get_file(&id, &path)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

    Ok(Json(json!({
        "path": file.path,
        "content": file.content,
        "size_bytes": file.size_bytes,
        "line_count": file.line_count,
        "language": file.language,
        "functions": file.functions,
    })))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ChatPayload>,
) -> ApiResult<Json<AssistantReply>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".into()));
    }
    if let Some(body_id) = payload.repo_id.as_deref().filter(|b| *b != id) {
        warn!("repo_id del cuerpo ({body_id}) distinto del de la ruta ({id}); se usa el de la ruta");
    }
    let repo = find_repository(&state, &id).await?;

    let context = payload.context.as_ref().filter(|c| c.as_object().is_some_and(|o| !o.is_empty()));
    let file_path = context.and_then(|c| c.get("file_path")).and_then(Value::as_str);

    let reply = state
        .processor
        .process_query(&repo, message, file_path, context)
        .await?;

    if !reply.is_apology() {
        state
            .store
            .save_query(&QueryRecord::new(&id, message, reply.clone()))
            .await?;
    }
    Ok(Json(reply))
}

#[axum::debug_handler]
async fn analyze_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AnalyzePayload>,
) -> ApiResult<Json<FileAnalysis>> {
    if payload.file_path.trim().is_empty() {
        return Err(ApiError::BadRequest("File path is required".into()));
    }
    let repo = find_repository(&state, &id).await?;
    let question = if payload.query.trim().is_empty() {
        DEFAULT_ANALYSIS_QUERY
    } else {
        payload.query.trim()
    };

    state
        .processor
        .analyze_file(&repo, &payload.file_path, question)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("File not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(repo_type: &str) -> UploadFields {
        UploadFields {
            repo_type: repo_type.into(),
            name: "demo".into(),
            ..UploadFields::default()
        }
    }

    fn rejection(fields: UploadFields) -> String {
        match fields.into_repository() {
            Err(ApiError::BadRequest(detail)) => detail,
            other => panic!("se esperaba BadRequest, llegó {:?}", other.map(|(r, _)| r.id)),
        }
    }

    #[test]
    fn uploads_require_name_and_known_type() {
        let mut f = fields("github");
        f.name = "  ".into();
        assert_eq!(rejection(f), "Repository name is required");
        assert!(rejection(fields("svn")).starts_with("Invalid repository type"));
    }

    #[test]
    fn github_uploads_need_a_github_url() {
        let mut f = fields("github");
        f.github_url = "https://gitlab.com/a/b".into();
        assert_eq!(rejection(f), "Invalid GitHub URL");

        let mut f = fields("github");
        f.github_url = "https://github.com/a/b".into();
        f.github_branch = " dev ".into();
        let (repo, source) = f.into_repository().unwrap();
        assert_eq!(repo.branch.as_deref(), Some("dev"));
        assert!(matches!(source, RepoSource::Github { .. }));
    }

    #[test]
    fn zip_uploads_need_a_zip_name() {
        assert_eq!(rejection(fields("zip")), "ZIP file is required");
        let mut f = fields("zip");
        f.zip_file = Some(("code.tar".into(), vec![1]));
        assert_eq!(rejection(f), "File must be a ZIP archive");
        let mut f = fields("zip");
        f.zip_file = Some(("CODE.ZIP".into(), vec![1]));
        assert_eq!(rejection(f), "File must be a ZIP archive");
    }

    #[test]
    fn legacy_source_input_maps_to_the_selected_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fields("local");
        f.source_input = dir.path().to_string_lossy().to_string();
        let (repo, source) = f.into_repository().unwrap();
        assert_eq!(repo.source_type, SourceType::Local);
        assert!(matches!(source, RepoSource::Local { path } if path == dir.path()));
    }
}
