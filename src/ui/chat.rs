//! Sesión de chat sobre un repositorio.
//!
//! Estados: `Loading` (nombre e historial), `Idle` y `Awaiting` (hay una
//! petición en vuelo). Mientras no se esté en `Idle` los envíos se rechazan.
//! El envío se parte en `begin_submit` / `complete_submit` para que quien
//! guarde la sesión tras un cerrojo pueda soltarlo durante la llamada.

use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    client::{ChatRequest, ClientError, RepoApi},
    contract::{self, ChatReply},
    models::ERROR_SIGNATURE,
    ui::{dom::Element, tree::file_link},
};

pub const HISTORY_LIMIT: usize = 10;
pub const DEFAULT_REPO_NAME: &str = "Repository";
pub const APOLOGY: &str = "Sorry, I encountered an error processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Idle,
    Awaiting,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitRejected {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a previous message is still being processed")]
    Busy,
}

pub struct ChatSession {
    repo_id: String,
    repo_name: String,
    name_unavailable: bool,
    history_unavailable: bool,
    state: SessionState,
    messages: Element,
}

impl ChatSession {
    pub fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            repo_name: DEFAULT_REPO_NAME.to_string(),
            name_unavailable: false,
            history_unavailable: false,
            state: SessionState::Loading,
            messages: Element::new("div").with_class("chat-messages"),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn name_unavailable(&self) -> bool {
        self.name_unavailable
    }

    pub fn history_unavailable(&self) -> bool {
        self.history_unavailable
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages(&self) -> &Element {
        &self.messages
    }

    /// Vuelve a `Loading` sin nada pintado, para repetir `init`.
    pub fn reset(&mut self) {
        *self = Self::new(&self.repo_id);
    }

    /// Carga el nombre y reproduce el historial. Ningún fallo es fatal.
    pub async fn init(&mut self, api: &dyn RepoApi) {
        self.state = SessionState::Loading;

        match api.repository(&self.repo_id).await {
            Ok(value) => match contract::repository_detail(&value) {
                Some(detail) => self.repo_name = detail.name,
                None => self.name_unavailable = true,
            },
            Err(e) => {
                warn!("No se pudo obtener el nombre del repositorio {}: {e}", self.repo_id);
                self.name_unavailable = true;
            }
        }

        match api.queries(&self.repo_id, HISTORY_LIMIT).await {
            Ok(value) => self.replay_history(&value),
            Err(e) => {
                warn!("No se pudo cargar el historial de {}: {e}", self.repo_id);
                self.history_unavailable = true;
            }
        }

        self.state = SessionState::Idle;
    }

    /// Pinta el historial en orden cronológico. El backend lo devuelve del más
    /// reciente al más antiguo; se toman los `HISTORY_LIMIT` primeros y se
    /// invierten. Las respuestas con la firma de error se omiten.
    pub fn replay_history(&mut self, value: &Value) {
        let mut entries = contract::history(value);
        entries.truncate(HISTORY_LIMIT);
        entries.reverse();

        for entry in entries {
            if entry.reply.text.contains(ERROR_SIGNATURE) {
                continue;
            }
            self.push_user_message(&entry.query);
            self.push_reply(&entry.reply);
        }
    }

    /// Valida el mensaje, lo pinta y pasa a `Awaiting`.
    pub fn begin_submit(&mut self, message: &str) -> Result<ChatRequest, SubmitRejected> {
        if self.state != SessionState::Idle {
            return Err(SubmitRejected::Busy);
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(SubmitRejected::EmptyMessage);
        }

        self.push_user_message(message);
        self.messages.push(thinking_indicator());
        self.state = SessionState::Awaiting;
        Ok(ChatRequest::new(&self.repo_id, message))
    }

    /// Pinta la respuesta (o la disculpa genérica) y vuelve a `Idle`.
    pub fn complete_submit(&mut self, result: Result<Value, ClientError>) {
        self.messages.remove_where(&|el| el.has_class("thinking"));

        match result {
            Ok(value) => {
                let reply = contract::chat_reply(&value);
                if reply.text.contains(ERROR_SIGNATURE) {
                    error!("Respuesta de chat con error para {}: {}", self.repo_id, reply.text);
                    self.push_apology();
                } else {
                    self.push_reply(&reply);
                }
            }
            Err(e) => {
                error!("Error enviando mensaje de chat para {}: {e}", self.repo_id);
                self.push_apology();
            }
        }

        self.state = SessionState::Idle;
    }

    /// Envío completo: una única petición, sin reintentos.
    pub async fn submit(&mut self, api: &dyn RepoApi, message: &str) -> Result<(), SubmitRejected> {
        let request = self.begin_submit(message)?;
        let result = api.chat(&self.repo_id, &request).await;
        self.complete_submit(result);
        Ok(())
    }

    fn push_user_message(&mut self, text: &str) {
        self.messages.push(message_bubble("user").with_child(
            Element::new("div").with_class("message-content").with_text(text.to_string()),
        ));
    }

    fn push_apology(&mut self) {
        self.messages.push(message_bubble("system").with_child(
            Element::new("div").with_class("message-content").with_text(APOLOGY),
        ));
    }

    fn push_reply(&mut self, reply: &ChatReply) {
        let mut bubble = message_bubble("system").with_child(
            Element::new("div").with_class("message-content").with_text(reply.text.clone()),
        );
        if let Some(code) = reply.code.as_deref().filter(|c| !c.trim().is_empty()) {
            bubble.push(
                Element::new("pre")
                    .with_class("code-block")
                    .with_child(Element::new("code").with_text(code.to_string())),
            );
        }
        if let Some(block) = referenced_files_block(&self.repo_id, &reply.referenced_files) {
            bubble.push(block);
        }
        self.messages.push(bubble);
    }

    /// Panel completo: cabecera, mensajes y formulario.
    pub fn render(&self) -> Element {
        let mut title = Element::new("h2")
            .with_class("chat-title")
            .with_text(format!("Chat with {}", self.repo_name));
        if self.name_unavailable {
            title.push(
                Element::new("span")
                    .with_class("name-unavailable")
                    .with_attr("title", "Repository name unavailable")
                    .with_text(" (name unavailable)"),
            );
        }

        let mut panel = Element::new("section")
            .with_class("chat-panel")
            .with_attr("data-state", state_label(self.state))
            .with_child(title);
        if self.history_unavailable {
            panel.push(
                Element::new("p")
                    .with_class("notice")
                    .with_text("Previous conversation could not be loaded."),
            );
        }
        panel.push(self.messages.clone());

        let mut input = Element::new("input")
            .with_attr("type", "text")
            .with_attr("name", "message")
            .with_attr("placeholder", "Ask a question about this repository...")
            .with_attr("autocomplete", "off");
        let mut button = Element::new("button")
            .with_attr("type", "submit")
            .with_class("btn")
            .with_class("btn-primary")
            .with_text("Send");
        if self.state != SessionState::Idle {
            input.set_attr("disabled", "disabled");
            button.set_attr("disabled", "disabled");
        }
        panel.push(
            Element::new("form")
                .with_class("chat-form")
                .with_attr("method", "post")
                .with_attr("action", format!("/chat/{}", self.repo_id))
                .with_child(input)
                .with_child(button),
        );
        panel
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Loading => "loading",
        SessionState::Idle => "idle",
        SessionState::Awaiting => "awaiting",
    }
}

fn message_bubble(role: &str) -> Element {
    Element::new("div")
        .with_class("message")
        .with_class(&format!("{role}-message"))
        .with_attr("data-role", role)
}

fn thinking_indicator() -> Element {
    let mut dots = Element::new("div").with_class("thinking-dots");
    for _ in 0..3 {
        dots.push(Element::new("span").with_class("dot"));
    }
    message_bubble("system").with_class("thinking").with_child(dots)
}

/// Bloque de ficheros referenciados; `None` si no hay ninguno.
pub fn referenced_files_block(repo_id: &str, files: &[String]) -> Option<Element> {
    if files.is_empty() {
        return None;
    }
    let mut list = Element::new("ul");
    for path in files {
        list.push(
            Element::new("li").with_child(
                Element::new("a")
                    .with_attr("href", file_link(repo_id, path))
                    .with_text(path.clone()),
            ),
        );
    }
    Some(
        Element::new("div")
            .with_class("referenced-files")
            .with_child(Element::new("h4").with_text("Referenced files"))
            .with_child(list),
    )
}
