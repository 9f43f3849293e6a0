//! Modelos de dominio del backend (repositorios, ficheros, consultas).

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subcadena con la que el cliente LLM marca una generación fallida.
/// Cualquier respuesta que la contenga se trata como un error transitorio.
pub const ERROR_SIGNATURE: &str = "Error generating text:";

/// Un ZIP se reconoce por la extensión exacta `.zip`, sin variantes de mayúsculas.
pub fn is_zip_name(file_name: &str) -> bool {
    file_name.ends_with(".zip")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Github,
    Zip,
    Local,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Github, SourceType::Zip, SourceType::Local];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "github" => Some(Self::Github),
            "zip" => Some(Self::Zip),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Zip => "zip",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Processing,
    Analyzed,
    Error,
}

impl RepoStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "analyzed" => Some(Self::Analyzed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Analyzed => "analyzed",
            Self::Error => "error",
        }
    }
}

/// Registro de un repositorio subido por el usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub source_type: SourceType,
    /// URL de GitHub, nombre del ZIP o ruta local, según `source_type`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub status: RepoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Repository {
    pub fn new(name: &str, source_type: SourceType, source: &str, branch: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            source_type,
            source: source.to_string(),
            branch,
            created_at: Utc::now(),
            size_bytes: 0,
            status: RepoStatus::Processing,
            summary: None,
        }
    }
}

/// Función extraída de un fichero de código.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub description: String,
    pub start_line: usize,
}

/// Fichero de un repositorio tal y como se guarda en el almacén.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub repo_id: String,
    /// Ruta relativa a la raíz del repositorio, separada por `/`.
    pub path: String,
    pub language: String,
    pub content: String,
    #[serde(default)]
    pub summary: String,
    pub size_bytes: u64,
    pub line_count: usize,
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
}

/// Respuesta estructurada del asistente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub referenced_files: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl AssistantReply {
    pub fn apology(text: &str) -> Self {
        Self {
            text: text.to_string(),
            code: None,
            referenced_files: Vec::new(),
            confidence: 0.0,
        }
    }

    /// Las disculpas por fallo del LLM no se guardan en el historial.
    pub fn is_apology(&self) -> bool {
        self.confidence <= 0.0
    }
}

/// Consulta registrada junto con su respuesta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub repo_id: String,
    pub query: String,
    pub response: AssistantReply,
    pub timestamp: String,
}

impl QueryRecord {
    pub fn new(repo_id: &str, query: &str, response: AssistantReply) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repo_id: repo_id.to_string(),
            query: query.to_string(),
            response,
            // Precisión fija para que el orden lexicográfico sea cronológico.
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

/// Nodo del árbol de ficheros servido por `/structure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Directory {
        name: String,
        path: String,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        path: String,
        #[serde(default)]
        language: String,
    },
}

/// Componente clave: agrupación de ficheros relacionados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub description: String,
    pub files: Vec<ComponentFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFile {
    pub path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub description: String,
}

/// Resultado del análisis de un fichero concreto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub summary: String,
    pub functions: Vec<FunctionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
}
