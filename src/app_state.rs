use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    client::RepoApi, config::AppConfig, llm::TextGenerator, query::QueryProcessor,
    store::RepoStore, ui::chat::ChatSession,
};

pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Resultado de buscar la sesión de chat de un repositorio.
pub enum SessionSlot {
    /// Sesión nueva en `Loading`, ya bloqueada por quien la creó.
    Created(OwnedMutexGuard<ChatSession>),
    Existing(SharedSession),
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn RepoStore>,
    pub processor: Arc<QueryProcessor>,
    /// Cliente que usan las páginas HTML para hablar con la API JSON.
    pub api: Arc<dyn RepoApi>,
    /// Sesión de chat viva por repositorio. Una entrada nunca se sustituye.
    pub chat_sessions: Arc<Mutex<HashMap<String, SharedSession>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RepoStore>,
        generator: Arc<dyn TextGenerator>,
        api: Arc<dyn RepoApi>,
    ) -> Self {
        Self {
            config,
            processor: Arc::new(QueryProcessor::new(store.clone(), generator)),
            store,
            api,
            chat_sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Busca o crea la sesión del repositorio bajo el cerrojo del mapa.
    /// La sesión creada sale ya bloqueada, así que nadie la ve a medio iniciar.
    pub async fn chat_session_slot(&self, repo_id: &str) -> SessionSlot {
        let mut sessions = self.chat_sessions.lock().await;
        if let Some(existing) = sessions.get(repo_id) {
            return SessionSlot::Existing(existing.clone());
        }
        let shared: SharedSession = Arc::new(Mutex::new(ChatSession::new(repo_id)));
        sessions.insert(repo_id.to_string(), shared.clone());
        SessionSlot::Created(shared.lock_owned().await)
    }

    pub async fn drop_chat_session(&self, repo_id: &str) {
        self.chat_sessions.lock().await.remove(repo_id);
    }
}
