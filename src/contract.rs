//! Normalización de las respuestas de la API.
//!
//! El backend ha ido cambiando de forma (`id` frente a `_id`, `source_type`
//! frente a `type`, ficheros referenciados como texto u objeto, respuestas
//! de chat como texto u objeto). Aquí se traduce cada forma conocida a un
//! único registro canónico por endpoint; la interfaz solo ve esos registros.

use serde_json::Value;
use tracing::warn;

pub const NO_DESCRIPTION: &str = "No description available";

/// Lee el primer campo presente entre `keys`, aceptando texto o número.
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn size_field(value: &Value) -> Option<f64> {
    match value.get("size_bytes")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn source_type_label(value: &Value) -> String {
    string_field(value, &["source_type", "type"]).unwrap_or_else(|| "github".to_string())
}

/// Tarjeta de la lista de repositorios.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSummary {
    pub id: String,
    pub name: String,
    pub source_type: String,
    pub created_at: Option<String>,
    pub status: String,
    pub size_bytes: Option<f64>,
}

/// `GET /api/repos`. Las entradas sin identificador se descartan.
pub fn repository_list(value: &Value) -> Vec<RepoSummary> {
    let Some(items) = value.as_array() else {
        warn!("La lista de repositorios no es un array: {value}");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(id) = string_field(item, &["_id", "id"]) else {
                warn!("Repositorio sin identificador, se omite: {item}");
                return None;
            };
            Some(RepoSummary {
                name: string_field(item, &["name"]).unwrap_or_else(|| id.clone()),
                id,
                source_type: source_type_label(item),
                created_at: string_field(item, &["created_at"]),
                status: string_field(item, &["status"]).unwrap_or_else(|| "processing".to_string()),
                size_bytes: size_field(item),
            })
        })
        .collect()
}

/// Cabecera de la página de detalle.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoDetail {
    pub name: String,
    pub source_type: String,
    pub created_at: Option<String>,
    pub size_bytes: Option<f64>,
    pub status: Option<String>,
    pub summary: Option<String>,
}

/// `GET /api/repos/{id}`.
pub fn repository_detail(value: &Value) -> Option<RepoDetail> {
    if !value.is_object() {
        warn!("Detalle de repositorio con forma inesperada: {value}");
        return None;
    }
    Some(RepoDetail {
        name: string_field(value, &["name"]).unwrap_or_else(|| "Unnamed repository".to_string()),
        source_type: source_type_label(value),
        created_at: string_field(value, &["created_at"]),
        size_bytes: size_field(value),
        status: string_field(value, &["status"]),
        summary: string_field(value, &["summary"]),
    })
}

/// Nodo del árbol tal y como lo pinta la interfaz.
#[derive(Debug, Clone, PartialEq)]
pub enum FileNode {
    Directory {
        name: String,
        path: String,
        children: Vec<FileNode>,
    },
    File {
        name: String,
        path: String,
    },
    /// Nodo sin etiqueta de tipo reconocible.
    Malformed(Value),
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::Directory { name, .. } | FileNode::File { name, .. } => name,
            FileNode::Malformed(_) => "",
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FileNode::Directory { .. })
    }

    pub fn from_value(value: &Value) -> FileNode {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let name = string_field(value, &["name"]);
        let path = string_field(value, &["path"]);

        match kind {
            "directory" | "dir" | "folder" => {
                let children = value
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|c| c.iter().map(FileNode::from_value).collect())
                    .unwrap_or_default();
                let name = name.unwrap_or_default();
                FileNode::Directory {
                    path: path.unwrap_or_else(|| name.clone()),
                    name,
                    children,
                }
            }
            "file" => match (name, path) {
                (Some(name), Some(path)) => FileNode::File { name, path },
                (Some(name), None) => FileNode::File { path: name.clone(), name },
                (None, Some(path)) => FileNode::File {
                    name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                    path,
                },
                (None, None) => FileNode::Malformed(value.clone()),
            },
            _ => FileNode::Malformed(value.clone()),
        }
    }
}

/// `GET /api/repos/{id}/structure`: devuelve los hijos de la raíz.
pub fn structure(value: &Value) -> Vec<FileNode> {
    match value {
        Value::Array(items) => items.iter().map(FileNode::from_value).collect(),
        Value::Object(_) => value
            .get("children")
            .and_then(Value::as_array)
            .map(|c| c.iter().map(FileNode::from_value).collect())
            .unwrap_or_default(),
        _ => {
            warn!("Estructura con forma inesperada: {value}");
            Vec::new()
        }
    }
}

/// Componente clave de un repositorio.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentView {
    pub name: String,
    pub description: String,
    pub files: Vec<String>,
}

/// `GET /api/repos/{id}/components`.
pub fn components(value: &Value) -> Vec<ComponentView> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| ComponentView {
                    name: string_field(item, &["name"]).unwrap_or_else(|| "Unnamed component".to_string()),
                    description: string_field(item, &["description"])
                        .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                    files: item.get("files").map(referenced_files).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Lista de ficheros: cada entrada es una ruta o un objeto con `path` o
/// `file_path`. Lo que no lleve ruta se descarta.
pub fn referenced_files(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(_) => string_field(item, &["path", "file_path"]),
            _ => None,
        })
        .collect()
}

/// Respuesta del asistente ya normalizada.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatReply {
    pub text: String,
    pub code: Option<String>,
    pub referenced_files: Vec<String>,
}

/// `POST /api/chat/{id}` y el campo `response` del historial.
pub fn chat_reply(value: &Value) -> ChatReply {
    match value {
        Value::String(text) => ChatReply {
            text: text.clone(),
            ..ChatReply::default()
        },
        Value::Object(_) => ChatReply {
            text: string_field(value, &["text", "response", "answer"]).unwrap_or_default(),
            code: string_field(value, &["code"]),
            referenced_files: value
                .get("referenced_files")
                .map(referenced_files)
                .unwrap_or_default(),
        },
        _ => ChatReply::default(),
    }
}

/// Entrada del historial de conversación.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub query: String,
    pub reply: ChatReply,
}

/// `GET /api/repos/{id}/queries`, en el orden recibido (más reciente primero).
pub fn history(value: &Value) -> Vec<HistoryEntry> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let query = string_field(item, &["query"])?;
                    let reply = item.get("response").map(chat_reply).unwrap_or_default();
                    Some(HistoryEntry { query, reply })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Contenido de un fichero para la vista de código.
#[derive(Debug, Clone, PartialEq)]
pub struct FileView {
    pub path: String,
    pub content: String,
    pub size_bytes: Option<f64>,
    pub line_count: Option<u64>,
    pub language: String,
}

/// `GET /api/repos/{id}/files?path=`.
pub fn file_view(value: &Value, requested_path: &str) -> Option<FileView> {
    let content = value.get("content")?.as_str()?.to_string();
    Some(FileView {
        path: string_field(value, &["path"]).unwrap_or_else(|| requested_path.to_string()),
        content,
        size_bytes: size_field(value),
        line_count: value.get("line_count").and_then(Value::as_u64),
        language: string_field(value, &["language"]).unwrap_or_else(|| "Unknown".to_string()),
    })
}

/// Resultado de `POST /api/repos/{id}/analyze`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisView {
    pub summary: String,
    pub functions: Vec<(String, String)>,
    pub recommendations: Option<String>,
}

pub fn analysis(value: &Value) -> Option<AnalysisView> {
    let summary = string_field(value, &["summary"])?;
    let functions = value
        .get("functions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|f| {
                    let name = string_field(f, &["name"])?;
                    Some((name, string_field(f, &["description"]).unwrap_or_default()))
                })
                .collect()
        })
        .unwrap_or_default();
    Some(AnalysisView {
        summary,
        functions,
        recommendations: string_field(value, &["recommendations"]),
    })
}

/// Identificador del repositorio recién creado.
pub fn created_id(value: &Value) -> Option<String> {
    string_field(value, &["id", "_id"])
}

/// Mensaje de error de un cuerpo `{"detail": ...}`.
pub fn error_detail(value: &Value) -> Option<String> {
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
