//! Cliente LLM. OpenAI y Anthropic van por Rig; un endpoint propio se llama
//! directamente con `reqwest`.

use std::{env, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant specializing in code analysis and understanding.";
const CUSTOM_TIMEOUT: Duration = Duration::from_secs(60);

/// Generador de texto a partir de un prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub max_tokens: u64,
    pub temperature: f64,
    api_url: Option<String>,
    api_key: Option<String>,
    http: reqwest::Client,
}

/// Agente de Rig con los parámetros comunes; cada proveedor tiene su tipo.
macro_rules! prompt_agent {
    ($client:expr, $manager:expr, $prompt:expr) => {{
        let agent = $client
            .agent($manager.model_name())
            .preamble(SYSTEM_PROMPT)
            .max_tokens($manager.max_tokens)
            .temperature($manager.temperature)
            .build();
        let answer: String = agent.prompt($prompt).await?;
        Ok(answer)
    }};
}

impl LlmManager {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if !(0.0..=2.0).contains(&cfg.llm_temperature) {
            return Err(anyhow!("Temperatura fuera de rango: {}", cfg.llm_temperature));
        }
        if cfg.llm_provider == LlmProvider::Custom && cfg.llm_api_url.is_none() {
            return Err(anyhow!("El proveedor 'custom' necesita LLM_API_URL"));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            max_tokens: cfg.llm_max_tokens,
            temperature: cfg.llm_temperature,
            api_url: cfg.llm_api_url.clone(),
            api_key: cfg.llm_api_key.clone(),
            http: reqwest::Client::new(),
        })
    }

    fn model_name(&self) -> &str {
        if self.chat_model.trim().is_empty() {
            self.provider.default_model()
        } else {
            self.chat_model.as_str()
        }
    }

    async fn generate_with_openai(&self, prompt: &str) -> Result<String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::providers::openai;

        require_env("OPENAI_API_KEY")?;
        let client = openai::Client::from_env();
        prompt_agent!(client, self, prompt)
    }

    async fn generate_with_anthropic(&self, prompt: &str) -> Result<String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::providers::anthropic;

        require_env("ANTHROPIC_API_KEY")?;
        let client = anthropic::Client::from_env();
        prompt_agent!(client, self, prompt)
    }

    async fn generate_with_custom(&self, prompt: &str) -> Result<String> {
        let url = self
            .api_url
            .as_deref()
            .ok_or_else(|| anyhow!("Falta LLM_API_URL para el proveedor 'custom'"))?;

        let mut request = self
            .http
            .post(url)
            .timeout(CUSTOM_TIMEOUT)
            .json(&json!({
                "model": self.model_name(),
                "prompt": prompt,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let body: Value = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Respuesta no JSON de {url}"))?;
        custom_text(&body).ok_or_else(|| anyhow!("El endpoint {url} no devolvió texto"))
    }
}

/// Rig hace `panic!` si falta la clave; mejor un error que acabe en disculpa.
fn require_env(key: &str) -> Result<()> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("Falta {key} en el entorno")),
    }
}

/// El texto puede venir en `text`, `generated_text` u `output`.
fn custom_text(body: &Value) -> Option<String> {
    ["text", "generated_text", "output"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(|text| text.trim().to_string())
}

#[async_trait]
impl TextGenerator for LlmManager {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        debug!("Prompt de {} caracteres para {:?}/{}", prompt.len(), self.provider, self.model_name());
        match self.provider {
            LlmProvider::OpenAI => self.generate_with_openai(prompt).await,
            LlmProvider::Anthropic => self.generate_with_anthropic(prompt).await,
            LlmProvider::Custom => self.generate_with_custom(prompt).await,
        }
    }
}
