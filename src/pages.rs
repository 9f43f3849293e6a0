//! Páginas HTML. Cada página monta sus componentes, los carga contra la API
//! JSON y serializa el resultado dentro del layout común.

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, SessionSlot},
    client::ZipUpload,
    contract,
    ui::{
        chat::{ChatSession, SessionState, SubmitRejected},
        dom::{escape, Element},
        file::FileViewer,
        form::{UploadForm, UploadFormView},
        repos::{KeyComponents, RepositoryHeader, RepositoryList},
        tree::FileTree,
    },
};

#[derive(Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
pub struct AnalyzeForm {
    file_path: String,
    #[serde(default)]
    query: String,
}

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = usize::try_from(app_state.config.max_repo_size_bytes()).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(home_page))
        .route("/repos", get(repositories_page))
        .route("/repos/:id", get(repository_page))
        .route("/repos/:id/file", get(file_page))
        .route("/repos/:id/analyze", post(analyze_submit))
        .route("/repos/:id/delete", post(delete_submit))
        .route("/repos/:id/chat", get(chat_redirect))
        .route("/chat/:id", get(chat_page).post(chat_submit))
        .route(
            "/upload",
            get(upload_page)
                .post(upload_submit)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(app_state)
}

/// Layout común de todas las páginas.
pub fn page(title: &str, body: &Element) -> Html<String> {
    let nav = Element::new("nav")
        .with_class("topnav")
        .with_child(Element::new("a").with_class("brand").with_attr("href", "/").with_text("RepoMind"))
        .with_child(Element::new("a").with_attr("href", "/repos").with_text("Repositories"))
        .with_child(Element::new("a").with_attr("href", "/upload").with_text("Upload"));

    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} · RepoMind</title>
  <link rel="stylesheet" href="/static/style.css">
  <script src="/static/repomind.js" defer></script>
</head>
<body>
  <header>{nav}</header>
  <main class="container">{body}</main>
</body>
</html>"#,
        title = escape(title),
        nav = nav.render(),
        body = body.render(),
    ))
}

fn banner(kind: &str, message: &str) -> Element {
    Element::new("div")
        .with_class("alert")
        .with_class(&format!("alert-{kind}"))
        .with_text(message.to_string())
}

// --- Repositorios ---

#[axum::debug_handler]
async fn home_page() -> Html<String> {
    let body = Element::new("section")
        .with_class("hero")
        .with_child(Element::new("h1").with_text("RepoMind"))
        .with_child(Element::new("p").with_text(
            "Upload a code repository and ask questions about it in plain language.",
        ))
        .with_child(
            Element::new("div")
                .with_class("hero-actions")
                .with_child(Element::new("a").with_class("btn").with_class("btn-primary").with_attr("href", "/upload").with_text("Upload a repository"))
                .with_child(Element::new("a").with_class("btn").with_class("btn-secondary").with_attr("href", "/repos").with_text("Browse repositories")),
        );
    page("Home", &body)
}

#[axum::debug_handler]
async fn repositories_page(State(state): State<AppState>) -> Html<String> {
    let mut list = RepositoryList::new();
    list.load(state.api.as_ref()).await;
    let body = Element::new("div")
        .with_child(Element::new("h1").with_text("Repositories"))
        .with_child(list.into_element());
    page("Repositories", &body)
}

#[axum::debug_handler]
async fn repository_page(State(state): State<AppState>, Path(id): Path<String>) -> Html<String> {
    let api = state.api.as_ref();
    let mut header = RepositoryHeader::new(&id);
    let mut tree = FileTree::new(&id);
    let mut components = KeyComponents::new(&id);

    // Cada widget degrada por separado.
    futures::join!(header.load(api), tree.load(api), components.load(api));

    let title = header.name().unwrap_or("Repository").to_string();
    let body = Element::new("div")
        .with_class("repo-detail")
        .with_child(header.into_element())
        .with_child(
            Element::new("div")
                .with_class("repo-columns")
                .with_child(
                    Element::new("section")
                        .with_class("panel")
                        .with_child(Element::new("h2").with_text("Files"))
                        .with_child(tree.into_element()),
                )
                .with_child(
                    Element::new("section")
                        .with_class("panel")
                        .with_child(Element::new("h2").with_text("Key components"))
                        .with_child(components.into_element()),
                ),
        );
    page(&title, &body)
}

#[axum::debug_handler]
async fn file_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Html<String> {
    let mut viewer = FileViewer::new(&id, &query.path);
    viewer.load(state.api.as_ref()).await;
    page(&query.path, &with_back_link(&id, viewer.into_element()))
}

#[axum::debug_handler]
async fn analyze_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<AnalyzeForm>,
) -> Html<String> {
    let api = state.api.as_ref();
    let mut viewer = FileViewer::new(&id, &form.file_path);
    let (_, analysis) = futures::join!(viewer.load(api), api.analyze(&id, &form.file_path, &form.query));

    let analysis = match analysis {
        Ok(value) => contract::analysis(&value),
        Err(e) => {
            error!("Error analizando {} en {id}: {e}", form.file_path);
            None
        }
    };
    viewer.show_analysis(analysis.as_ref());
    page(&form.file_path, &with_back_link(&id, viewer.into_element()))
}

fn with_back_link(repo_id: &str, content: Element) -> Element {
    Element::new("div")
        .with_child(
            Element::new("a")
                .with_class("back-link")
                .with_attr("href", format!("/repos/{repo_id}"))
                .with_text("← Back to repository"),
        )
        .with_child(content)
}

#[axum::debug_handler]
async fn delete_submit(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.api.delete_repository(&id).await {
        Ok(_) => {
            info!("Repositorio {id} eliminado desde la interfaz.");
            Redirect::to("/repos").into_response()
        }
        Err(e) => {
            error!("Error eliminando el repositorio {id}: {e}");
            let mut list = RepositoryList::new();
            list.load(state.api.as_ref()).await;
            let body = Element::new("div")
                .with_child(banner("error", "Failed to delete repository."))
                .with_child(list.into_element());
            (StatusCode::BAD_GATEWAY, page("Repositories", &body)).into_response()
        }
    }
}

// --- Chat ---

#[axum::debug_handler]
async fn chat_redirect(Path(id): Path<String>) -> Redirect {
    Redirect::to(&format!("/chat/{id}"))
}

/// Sesión del repositorio, iniciada y bloqueada. Si la crea esta petición,
/// `init` y lo que haga después el llamador ocurren bajo el mismo cerrojo.
async fn ready_session(state: &AppState, repo_id: &str) -> OwnedMutexGuard<ChatSession> {
    match state.chat_session_slot(repo_id).await {
        SessionSlot::Created(mut session) => {
            session.init(state.api.as_ref()).await;
            session
        }
        SessionSlot::Existing(shared) => shared.lock_owned().await,
    }
}

fn chat_body(session: &ChatSession, notice: Option<&str>) -> Element {
    let mut body = Element::new("div").with_class("chat-page");
    body.push(
        Element::new("a")
            .with_class("back-link")
            .with_attr("href", format!("/repos/{}", session.repo_id()))
            .with_text("← Back to repository"),
    );
    if let Some(notice) = notice {
        body.push(banner("warning", notice));
    }
    body.push(session.render());
    body
}

#[axum::debug_handler]
async fn chat_page(State(state): State<AppState>, Path(id): Path<String>) -> Html<String> {
    let session = match state.chat_session_slot(&id).await {
        SessionSlot::Created(mut session) => {
            session.init(state.api.as_ref()).await;
            session
        }
        SessionSlot::Existing(shared) => {
            // Una respuesta en vuelo se muestra tal cual; si no, cada visita
            // reproduce de nuevo el historial guardado sobre la misma sesión.
            let mut session = shared.lock_owned().await;
            if session.state() != SessionState::Awaiting {
                session.reset();
                session.init(state.api.as_ref()).await;
            }
            session
        }
    };
    page(&format!("Chat · {}", session.repo_name()), &chat_body(&session, None))
}

#[axum::debug_handler]
async fn chat_submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<ChatForm>,
) -> Response {
    let mut session = ready_session(&state, &id).await;
    let begun = session.begin_submit(&form.message);
    let shared = OwnedMutexGuard::mutex(&session).clone();
    // El cerrojo se suelta durante la llamada; el estado `Awaiting` es lo que
    // rechaza un segundo envío.
    drop(session);

    let (status, notice) = match begun {
        Ok(request) => {
            let result = state.api.chat(&id, &request).await;
            shared.lock().await.complete_submit(result);
            (StatusCode::OK, None)
        }
        Err(SubmitRejected::Busy) => {
            warn!("Envío rechazado en {id}: hay una respuesta pendiente");
            (StatusCode::CONFLICT, Some("Please wait for the current response before sending another message."))
        }
        Err(SubmitRejected::EmptyMessage) => (StatusCode::BAD_REQUEST, Some("Please enter a message.")),
    };

    let session = shared.lock().await;
    let html = page(&format!("Chat · {}", session.repo_name()), &chat_body(&session, notice));
    (status, html).into_response()
}

// --- Alta ---

#[axum::debug_handler]
async fn upload_page() -> Html<String> {
    upload_body(UploadFormView::new(&UploadForm::default()).into_element())
}

fn upload_body(form: Element) -> Html<String> {
    let body = Element::new("div")
        .with_class("upload-page")
        .with_child(Element::new("h1").with_text("Upload a repository"))
        .with_child(form);
    page("Upload", &body)
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, String> {
    let mut form = UploadForm::default();
    let mut source_input = String::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "zip_file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| e.to_string())?;
            if !file_name.is_empty() {
                form.zip_files.push(ZipUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }
        let value = field.text().await.map_err(|e| e.to_string())?;
        match name.as_str() {
            "repo_type" => form.repo_type = value,
            "name" => form.name = value,
            "github_url" => form.github_url = value,
            "github_branch" => form.github_branch = value,
            "local_path" => form.local_path = value,
            "source_input" => source_input = value,
            other => warn!("Campo de subida desconocido ignorado: {other}"),
        }
    }
    if form.apply_source_input(&source_input) {
        warn!("Campo 'source_input' obsoleto; usa el campo específico del tipo {}", form.repo_type);
    }
    Ok(form)
}

#[axum::debug_handler]
async fn upload_submit(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Formulario de subida ilegible: {e}");
            let view = UploadFormView::new(&UploadForm::default());
            return (StatusCode::BAD_REQUEST, upload_body(view.with_banner("Unknown error"))).into_response();
        }
    };

    // Con errores de validación no se llama a la API.
    let errors = form.validate();
    let mut view = UploadFormView::new(&form);
    if !errors.is_empty() {
        view.annotate(&errors);
        return (StatusCode::BAD_REQUEST, upload_body(view.into_element())).into_response();
    }

    match state.api.create_repository(form.to_request()).await {
        Ok(value) => match contract::created_id(&value) {
            Some(id) => Redirect::to(&format!("/repos/{id}")).into_response(),
            None => {
                error!("Alta sin identificador en la respuesta: {value}");
                (StatusCode::BAD_GATEWAY, upload_body(view.with_banner("Unknown error"))).into_response()
            }
        },
        Err(e) => {
            error!("Error creando el repositorio: {e}");
            let message = e.detail().unwrap_or("Unknown error").to_string();
            (StatusCode::BAD_REQUEST, upload_body(view.with_banner(&message))).into_response()
        }
    }
}
