use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RepoStore, RepositoryUpdate};
use crate::models::{FileRecord, QueryRecord, Repository};

#[derive(Debug, Default)]
struct Collections {
    repositories: Vec<Repository>,
    files: HashMap<String, Vec<FileRecord>>,
    queries: Vec<QueryRecord>,
}

/// Almacén en memoria. Se pierde al reiniciar el servidor.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoStore for MemoryStore {
    async fn insert_repository(&self, repo: &Repository) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.repositories.retain(|r| r.id != repo.id);
        inner.repositories.push(repo.clone());
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut repos = self.inner.read().await.repositories.clone();
        repos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(repos)
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let inner = self.inner.read().await;
        Ok(inner.repositories.iter().find(|r| r.id == id).cloned())
    }

    async fn update_repository(&self, id: &str, update: RepositoryUpdate) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(repo) = inner.repositories.iter_mut().find(|r| r.id == id) {
            if let Some(status) = update.status {
                repo.status = status;
            }
            if let Some(summary) = update.summary {
                repo.summary = Some(summary);
            }
            if let Some(size) = update.size_bytes {
                repo.size_bytes = size;
            }
        }
        Ok(())
    }

    async fn delete_repository(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.repositories.len();
        inner.repositories.retain(|r| r.id != id);
        if inner.repositories.len() == before {
            return Ok(false);
        }
        inner.files.remove(id);
        inner.queries.retain(|q| q.repo_id != id);
        Ok(true)
    }

    async fn save_files(&self, repo_id: &str, files: &[FileRecord]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.files.insert(repo_id.to_string(), files.to_vec());
        Ok(())
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.files.get(repo_id).cloned().unwrap_or_default())
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .files
            .get(repo_id)
            .and_then(|files| files.iter().find(|f| f.path == path))
            .cloned())
    }

    async fn save_query(&self, record: &QueryRecord) -> Result<()> {
        self.inner.write().await.queries.push(record.clone());
        Ok(())
    }

    async fn recent_queries(&self, repo_id: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        let inner = self.inner.read().await;
        let mut queries: Vec<QueryRecord> = inner
            .queries
            .iter()
            .filter(|q| q.repo_id == repo_id)
            .cloned()
            .collect();
        // Orden estable: a igualdad de timestamp gana el último insertado.
        queries.reverse();
        queries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        queries.truncate(limit);
        Ok(queries)
    }
}
