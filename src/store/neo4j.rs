//! Persistencia en Neo4j.
//!
//! Etiquetas usadas:
//!   - `:Repository {id}`
//!   - `:SourceFile {repo_id, path}` enlazado con `(:Repository)-[:HAS_FILE]->`
//!   - `:Query {id, repo_id}` enlazado con `(:Repository)-[:HAS_QUERY]->`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Row};
use tracing::{info, warn};
use url::Url;

use super::{RepoStore, RepositoryUpdate};
use crate::{
    config::Neo4jConfig,
    models::{AssistantReply, FileRecord, QueryRecord, RepoStatus, Repository, SourceType},
};

pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(cfg: &Neo4jConfig) -> Result<Self> {
        let url = Url::parse(&cfg.uri)?;
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port().unwrap_or(7687);
        let addr = format!("{host}:{port}");

        info!("Conectando a Neo4j en {addr}...");
        let graph = Graph::new(&addr, &cfg.user, &cfg.password).await?;
        info!("Conexión a Neo4j OK");
        Ok(Self { graph })
    }

    /// Crea los constraints de unicidad para las etiquetas usadas.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT repository_id IF NOT EXISTS
             FOR (r:Repository)
             REQUIRE r.id IS UNIQUE",
            "CREATE CONSTRAINT query_id IF NOT EXISTS
             FOR (q:Query)
             REQUIRE q.id IS UNIQUE",
            "CREATE INDEX source_file_repo IF NOT EXISTS
             FOR (f:SourceFile)
             ON (f.repo_id, f.path)",
        ];

        for stmt in statements {
            self.graph.run(query(stmt)).await?;
        }

        info!("Esquema de Neo4j asegurado.");
        Ok(())
    }
}

fn repository_from_row(row: &Row) -> Result<Repository> {
    let id: String = row.get("id").ok_or_else(|| anyhow!("Falta campo 'id' en :Repository"))?;
    let source_type = row
        .get::<String>("source_type")
        .and_then(|s| SourceType::parse(&s))
        .unwrap_or(SourceType::Github);
    let status = row
        .get::<String>("status")
        .and_then(|s| RepoStatus::parse(&s))
        .unwrap_or(RepoStatus::Processing);
    let created_at = row
        .get::<String>("created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(Repository {
        id,
        name: row.get("name").unwrap_or_default(),
        source_type,
        source: row.get("source").unwrap_or_default(),
        branch: row.get::<String>("branch").filter(|b| !b.is_empty()),
        created_at,
        size_bytes: row.get::<i64>("size_bytes").unwrap_or(0).max(0) as u64,
        status,
        summary: row.get::<String>("summary").filter(|s| !s.is_empty()),
    })
}

fn file_from_row(row: &Row) -> Result<FileRecord> {
    let functions = row
        .get::<String>("functions")
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(FileRecord {
        repo_id: row.get("repo_id").unwrap_or_default(),
        path: row.get("path").ok_or_else(|| anyhow!("Falta campo 'path' en :SourceFile"))?,
        language: row.get("language").unwrap_or_default(),
        content: row.get("content").unwrap_or_default(),
        summary: row.get("summary").unwrap_or_default(),
        size_bytes: row.get::<i64>("size_bytes").unwrap_or(0).max(0) as u64,
        line_count: row.get::<i64>("line_count").unwrap_or(0).max(0) as usize,
        functions,
    })
}

const REPOSITORY_FIELDS: &str = "r.id AS id, r.name AS name, r.source_type AS source_type,
    r.source AS source, r.branch AS branch, r.created_at AS created_at,
    r.size_bytes AS size_bytes, r.status AS status, r.summary AS summary";

const FILE_FIELDS: &str = "f.repo_id AS repo_id, f.path AS path, f.language AS language,
    f.content AS content, f.summary AS summary, f.size_bytes AS size_bytes,
    f.line_count AS line_count, f.functions AS functions";

#[async_trait]
impl RepoStore for Neo4jStore {
    async fn insert_repository(&self, repo: &Repository) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (r:Repository {id: $id})
                     SET r.name = $name, r.source_type = $source_type, r.source = $source,
                         r.branch = $branch, r.created_at = $created_at,
                         r.size_bytes = $size_bytes, r.status = $status, r.summary = $summary",
                )
                .param("id", repo.id.clone())
                .param("name", repo.name.clone())
                .param("source_type", repo.source_type.as_str())
                .param("source", repo.source.clone())
                .param("branch", repo.branch.clone().unwrap_or_default())
                .param("created_at", repo.created_at.to_rfc3339())
                .param("size_bytes", repo.size_bytes as i64)
                .param("status", repo.status.as_str())
                .param("summary", repo.summary.clone().unwrap_or_default()),
            )
            .await?;
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut cursor = self
            .graph
            .execute(query(&format!(
                "MATCH (r:Repository) RETURN {REPOSITORY_FIELDS} ORDER BY r.created_at DESC"
            )))
            .await?;

        let mut repos = Vec::new();
        while let Some(row) = cursor.next().await? {
            match repository_from_row(&row) {
                Ok(repo) => repos.push(repo),
                Err(e) => warn!("Repositorio ignorado al listar: {e}"),
            }
        }
        Ok(repos)
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let mut cursor = self
            .graph
            .execute(
                query(&format!(
                    "MATCH (r:Repository {{id: $id}}) RETURN {REPOSITORY_FIELDS}"
                ))
                .param("id", id),
            )
            .await?;

        match cursor.next().await? {
            Some(row) => Ok(Some(repository_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_repository(&self, id: &str, update: RepositoryUpdate) -> Result<()> {
        let mut sets = Vec::new();
        if update.status.is_some() {
            sets.push("r.status = $status");
        }
        if update.summary.is_some() {
            sets.push("r.summary = $summary");
        }
        if update.size_bytes.is_some() {
            sets.push("r.size_bytes = $size_bytes");
        }
        if sets.is_empty() {
            return Ok(());
        }

        let mut q = query(&format!(
            "MATCH (r:Repository {{id: $id}}) SET {}",
            sets.join(", ")
        ))
        .param("id", id);
        // neo4rs 0.6 does not export `BoltType`, so params are applied directly.
        if let Some(status) = update.status {
            q = q.param("status", status.as_str());
        }
        if let Some(summary) = update.summary {
            q = q.param("summary", summary);
        }
        if let Some(size) = update.size_bytes {
            q = q.param("size_bytes", size as i64);
        }
        self.graph.run(q).await?;
        Ok(())
    }

    async fn delete_repository(&self, id: &str) -> Result<bool> {
        if self.get_repository(id).await?.is_none() {
            return Ok(false);
        }

        let txn = self.graph.start_txn().await?;
        txn.run(query("MATCH (f:SourceFile {repo_id: $id}) DETACH DELETE f").param("id", id))
            .await?;
        txn.run(query("MATCH (q:Query {repo_id: $id}) DETACH DELETE q").param("id", id))
            .await?;
        txn.run(query("MATCH (r:Repository {id: $id}) DETACH DELETE r").param("id", id))
            .await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn save_files(&self, repo_id: &str, files: &[FileRecord]) -> Result<()> {
        let txn = self.graph.start_txn().await?;
        txn.run(query("MATCH (f:SourceFile {repo_id: $id}) DETACH DELETE f").param("id", repo_id))
            .await?;

        for file in files {
            txn.run(
                query(
                    "CREATE (f:SourceFile {repo_id: $repo_id, path: $path})
                     SET f.language = $language, f.content = $content, f.summary = $summary,
                         f.size_bytes = $size_bytes, f.line_count = $line_count,
                         f.functions = $functions
                     WITH f MATCH (r:Repository {id: $repo_id}) MERGE (r)-[:HAS_FILE]->(f)",
                )
                .param("repo_id", repo_id)
                .param("path", file.path.clone())
                .param("language", file.language.clone())
                .param("content", file.content.clone())
                .param("summary", file.summary.clone())
                .param("size_bytes", file.size_bytes as i64)
                .param("line_count", file.line_count as i64)
                .param("functions", serde_json::to_string(&file.functions)?),
            )
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>> {
        let mut cursor = self
            .graph
            .execute(
                query(&format!(
                    "MATCH (f:SourceFile {{repo_id: $id}}) RETURN {FILE_FIELDS} ORDER BY f.path"
                ))
                .param("id", repo_id),
            )
            .await?;

        let mut files = Vec::new();
        while let Some(row) = cursor.next().await? {
            files.push(file_from_row(&row)?);
        }
        Ok(files)
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let mut cursor = self
            .graph
            .execute(
                query(&format!(
                    "MATCH (f:SourceFile {{repo_id: $id, path: $path}}) RETURN {FILE_FIELDS} LIMIT 1"
                ))
                .param("id", repo_id)
                .param("path", path),
            )
            .await?;

        match cursor.next().await? {
            Some(row) => Ok(Some(file_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_query(&self, record: &QueryRecord) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (q:Query {id: $id})
                     SET q.repo_id = $repo_id, q.query = $query, q.response = $response,
                         q.timestamp = $timestamp
                     WITH q MATCH (r:Repository {id: $repo_id}) MERGE (r)-[:HAS_QUERY]->(q)",
                )
                .param("id", record.id.clone())
                .param("repo_id", record.repo_id.clone())
                .param("query", record.query.clone())
                .param("response", serde_json::to_string(&record.response)?)
                .param("timestamp", record.timestamp.clone()),
            )
            .await?;
        Ok(())
    }

    async fn recent_queries(&self, repo_id: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (q:Query {repo_id: $id})
                     RETURN q.id AS id, q.query AS query, q.response AS response,
                            q.timestamp AS timestamp
                     ORDER BY q.timestamp DESC LIMIT $limit",
                )
                .param("id", repo_id)
                .param("limit", limit as i64),
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = cursor.next().await? {
            let raw: String = row.get("response").unwrap_or_default();
            let response = match serde_json::from_str::<AssistantReply>(&raw) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Respuesta almacenada ilegible en la consulta de {repo_id}: {e}");
                    continue;
                }
            };
            records.push(QueryRecord {
                id: row.get("id").unwrap_or_default(),
                repo_id: repo_id.to_string(),
                query: row.get("query").unwrap_or_default(),
                response,
                timestamp: row.get("timestamp").unwrap_or_default(),
            });
        }
        Ok(records)
    }
}
