//! Almacén de documentos: repositorios, ficheros y consultas.
//!
//! Implementaciones:
//!   - `Neo4jStore`: persistencia en Neo4j.
//!   - `MemoryStore`: en memoria, para desarrollo local y tests.

mod memory;
mod neo4j;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{FileRecord, QueryRecord, RepoStatus, Repository};

/// Cambios que el pipeline de análisis aplica a un repositorio.
#[derive(Debug, Clone, Default)]
pub struct RepositoryUpdate {
    pub status: Option<RepoStatus>,
    pub summary: Option<String>,
    pub size_bytes: Option<u64>,
}

#[async_trait]
pub trait RepoStore: Send + Sync {
    async fn insert_repository(&self, repo: &Repository) -> Result<()>;
    async fn list_repositories(&self) -> Result<Vec<Repository>>;
    async fn get_repository(&self, id: &str) -> Result<Option<Repository>>;
    async fn update_repository(&self, id: &str, update: RepositoryUpdate) -> Result<()>;
    /// Borra el repositorio y todo lo que cuelga de él. Devuelve `false` si no existía.
    async fn delete_repository(&self, id: &str) -> Result<bool>;

    /// Sustituye los ficheros guardados del repositorio.
    async fn save_files(&self, repo_id: &str, files: &[FileRecord]) -> Result<()>;
    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>>;
    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>>;

    async fn save_query(&self, record: &QueryRecord) -> Result<()>;
    /// Consultas más recientes primero.
    async fn recent_queries(&self, repo_id: &str, limit: usize) -> Result<Vec<QueryRecord>>;
}
