//! RepoMind: sube un repositorio de código y pregúntale en lenguaje natural.

pub mod analysis;
pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pages;
pub mod query;
pub mod store;
pub mod ui;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::app_state::AppState;

/// Router completo: API JSON, páginas HTML y ficheros estáticos.
pub fn build_app(app_state: AppState) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    Router::new()
        .merge(api::create_router(app_state.clone()))
        .merge(pages::create_router(app_state))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
