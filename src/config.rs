//! Carga y gestión de configuración de la aplicación (servidor, almacén, LLM).

use std::{env, path::PathBuf};

use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    /// Endpoint propio que recibe `{model, prompt, max_tokens, temperature}`.
    Custom,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "custom" => Ok(Self::Custom),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// `LLM_PROVIDER` manda; si falta, se deduce de la URL de la API.
    pub fn detect(explicit: Option<&str>, api_url: Option<&str>) -> Result<Self> {
        if let Some(name) = explicit.filter(|n| !n.trim().is_empty()) {
            return Self::from_str(name);
        }
        Ok(match api_url {
            None => Self::OpenAI,
            Some(url) if url.contains("openai.com") => Self::OpenAI,
            Some(url) if url.contains("anthropic.com") => Self::Anthropic,
            Some(_) => Self::Custom,
        })
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Custom => "gpt-4",
        }
    }
}

/// Credenciales de Neo4j. Si no hay URI se usa el almacén en memoria.
#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    /// URL base de la API JSON que consume la interfaz web.
    pub api_base_url: String,
    pub neo4j: Option<Neo4jConfig>,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_max_tokens: u64,
    pub llm_temperature: f64,
    /// URL del endpoint propio (y pista para deducir el proveedor).
    pub llm_api_url: Option<String>,
    pub llm_api_key: Option<String>,

    pub temp_dir: PathBuf,
    pub max_repo_size_mb: u64,
    pub static_dir: PathBuf,
    pub open_browser: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let server_addr = "127.0.0.1:8000".to_string();
        Self {
            api_base_url: format!("http://{server_addr}"),
            server_addr,
            neo4j: None,
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_max_tokens: 1000,
            llm_temperature: 0.3,
            llm_api_url: None,
            llm_api_key: None,
            temp_dir: default_temp_dir(),
            max_repo_size_mb: 100,
            static_dir: PathBuf::from("frontend/static"),
            open_browser: false,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let api_base_url =
            env::var("API_BASE_URL").unwrap_or_else(|_| format!("http://{server_addr}"));
        url::Url::parse(&api_base_url)
            .map_err(|e| anyhow!("API_BASE_URL inválida ({api_base_url}): {e}"))?;

        let neo4j = match env::var("NEO4J_URI") {
            Ok(uri) if !uri.trim().is_empty() => Some(Neo4jConfig {
                uri,
                user: env::var("NEO4J_USER")
                    .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: env::var("NEO4J_PASSWORD")
                    .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?,
            }),
            _ => None,
        };

        let llm_api_url = non_empty_var("LLM_API_URL");
        let llm_api_key = non_empty_var("LLM_API_KEY");
        let llm_provider =
            LlmProvider::detect(env::var("LLM_PROVIDER").ok().as_deref(), llm_api_url.as_deref())?;
        let llm_chat_model = non_empty_var("LLM_CHAT_MODEL")
            .or_else(|| non_empty_var("LLM_MODEL"))
            .unwrap_or_else(|| llm_provider.default_model().to_string());
        let llm_max_tokens = parse_var("LLM_MAX_TOKENS", defaults.llm_max_tokens)?;
        let llm_temperature = parse_var("LLM_TEMPERATURE", defaults.llm_temperature)?;

        let temp_dir = env::var("REPOMIND_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_dir);
        let max_repo_size_mb = parse_var("MAX_REPO_SIZE_MB", defaults.max_repo_size_mb)?;
        let static_dir = env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);
        let open_browser = env::var("OPEN_BROWSER")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "t" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            server_addr,
            api_base_url,
            neo4j,
            llm_provider,
            llm_chat_model,
            llm_max_tokens,
            llm_temperature,
            llm_api_url,
            llm_api_key,
            temp_dir,
            max_repo_size_mb,
            static_dir,
            open_browser,
        })
    }

    pub fn max_repo_size_bytes(&self) -> u64 {
        self.max_repo_size_mb * 1024 * 1024
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Variable numérica opcional; si existe debe parsear.
fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key} tiene un valor no válido: {raw}")),
        Err(_) => Ok(default),
    }
}

fn default_temp_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("repomind")
}
