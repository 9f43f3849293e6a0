//! Procesado de preguntas en lenguaje natural sobre un repositorio.
//!
//! Flujo:
//!   1. Extracción de palabras clave de la pregunta.
//!   2. Selección de ficheros relevantes (ruta, resumen y funciones).
//!   3. Construcción del prompt con el contexto del repositorio.
//!   4. Llamada al LLM y parseo de las secciones ANSWER / CODE / REFERENCES.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info};

use crate::{
    llm::TextGenerator,
    models::{
        AssistantReply, FileAnalysis, FileRecord, FunctionSummary, Repository, ERROR_SIGNATURE,
    },
    store::RepoStore,
};

const MAX_TOKENS: usize = 8192;
const MAX_RELEVANT_FILES: usize = 5;
const MAX_LISTED_FILES: usize = 50;
const COMMON_FILES: [&str; 7] = [
    "README.md",
    "setup.py",
    "requirements.txt",
    "package.json",
    "main.py",
    "app.py",
    "index.js",
];
const STOP_WORDS: [&str; 19] = [
    "the", "a", "an", "in", "on", "at", "is", "are", "was", "were", "and", "or", "but", "of",
    "for", "with", "about", "to", "from",
];

pub const LLM_FAILURE_REPLY: &str = "I'm sorry, I encountered an error while analyzing this repository. Please try a different question or try again later.";

/// Respuesta del LLM ya separada en secciones.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub reply: AssistantReply,
    pub recommendations: Option<String>,
}

#[derive(Clone)]
pub struct QueryProcessor {
    store: Arc<dyn RepoStore>,
    generator: Arc<dyn TextGenerator>,
}

impl QueryProcessor {
    pub fn new(store: Arc<dyn RepoStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { store, generator }
    }

    /// Responde a una pregunta sobre `repo`. Si el LLM falla devuelve una
    /// disculpa con confianza 0 (nunca el error en bruto).
    pub async fn process_query(
        &self,
        repo: &Repository,
        question: &str,
        file_path: Option<&str>,
        context: Option<&Value>,
    ) -> Result<AssistantReply> {
        info!("Procesando consulta para el repositorio {}: {}", repo.id, question);
        let files = self.store.list_files(&repo.id).await?;
        let current_file = file_path.and_then(|p| files.iter().find(|f| f.path == p));

        let prompt = build_prompt(repo, question, &files, current_file, context, false);
        Ok(self.ask(&prompt).await.reply)
    }

    /// Análisis de un fichero concreto. `None` si el fichero no existe.
    pub async fn analyze_file(
        &self,
        repo: &Repository,
        file_path: &str,
        question: &str,
    ) -> Result<Option<FileAnalysis>> {
        let files = self.store.list_files(&repo.id).await?;
        let Some(file) = files.iter().find(|f| f.path == file_path) else {
            return Ok(None);
        };

        let prompt = build_prompt(repo, question, &files, Some(file), None, true);
        let parsed = self.ask(&prompt).await;

        let functions = file
            .functions
            .iter()
            .map(|f| FunctionSummary {
                name: f.name.clone(),
                description: if f.description.is_empty() {
                    f.signature.clone()
                } else {
                    f.description.clone()
                },
            })
            .collect();

        Ok(Some(FileAnalysis {
            summary: parsed.reply.text,
            functions,
            recommendations: parsed.recommendations,
        }))
    }

    async fn ask(&self, prompt: &str) -> ParsedResponse {
        match self.generator.generate_text(prompt).await {
            Ok(raw) if raw.contains(ERROR_SIGNATURE) => {
                error!("Error del LLM: {raw}");
                failure_response()
            }
            Ok(raw) => parse_response(&raw),
            Err(e) => {
                error!("{ERROR_SIGNATURE} {e}");
                failure_response()
            }
        }
    }
}

fn failure_response() -> ParsedResponse {
    ParsedResponse {
        reply: AssistantReply::apology(LLM_FAILURE_REPLY),
        recommendations: None,
    }
}

/// Palabras clave: sin stop words y de más de 2 letras, frases entre
/// comillas, extensiones y posibles nombres de fichero.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();

    let mut keywords: Vec<String> = words
        .iter()
        .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 2)
        .map(|w| w.to_string())
        .collect();

    keywords.extend(query.split('"').skip(1).step_by(2).map(|p| p.to_string()));
    keywords.extend(
        words
            .iter()
            .filter(|w| w.starts_with('.') && w.len() > 1)
            .map(|w| w.to_string()),
    );
    keywords.extend(
        words
            .iter()
            .filter(|w| w.contains('.') && !w.starts_with('.') && !w.ends_with('.'))
            .map(|w| w.to_string()),
    );
    keywords.retain(|k| !k.trim().is_empty());
    keywords
}

/// Ficheros cuya ruta, resumen o funciones mencionan alguna palabra clave.
/// Sin coincidencias se recurre a ficheros habituales (README, main...).
pub fn find_relevant_files<'a>(files: &'a [FileRecord], query: &str) -> Vec<&'a FileRecord> {
    let keywords: Vec<String> = extract_keywords(query)
        .into_iter()
        .map(|k| k.to_lowercase())
        .collect();

    let mut relevant: Vec<&FileRecord> = Vec::new();
    for keyword in &keywords {
        for file in files {
            let matches = file.path.to_lowercase().contains(keyword)
                || file.summary.to_lowercase().contains(keyword)
                || file.functions.iter().any(|f| {
                    f.name.to_lowercase().contains(keyword)
                        || f.description.to_lowercase().contains(keyword)
                });
            if matches && !relevant.iter().any(|r| r.path == file.path) {
                relevant.push(file);
            }
        }
    }

    if relevant.is_empty() {
        for common in COMMON_FILES {
            let common = common.to_lowercase();
            if let Some(file) = files.iter().find(|f| f.path.to_lowercase().ends_with(&common)) {
                if !relevant.iter().any(|r| r.path == file.path) {
                    relevant.push(file);
                }
            }
        }
    }

    relevant.truncate(MAX_RELEVANT_FILES);
    relevant
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(
    repo: &Repository,
    question: &str,
    files: &[FileRecord],
    current_file: Option<&FileRecord>,
    context: Option<&Value>,
    with_recommendations: bool,
) -> String {
    let summary = repo.summary.as_deref().unwrap_or("No summary available");
    let mut prompt = format!(
        "You are RepoMind, an AI assistant specialized in analyzing and explaining code repositories.\n\n\
         Repository: {}\nRepository Summary: {summary}\n\nUser Query: {question}\n",
        repo.name
    );

    if !files.is_empty() {
        prompt.push_str("\nFiles in this repository:\n");
        for file in files.iter().take(MAX_LISTED_FILES) {
            prompt.push_str(&format!("- {}\n", file.path));
        }
        if files.len() > MAX_LISTED_FILES {
            prompt.push_str(&format!("... and {} more files\n", files.len() - MAX_LISTED_FILES));
        }
    }

    if let Some(file) = current_file {
        prompt.push_str(&format!(
            "\nCurrent File: {}\nLanguage: {}\nFile Summary: {}\n\nFile Content:\n```{}\n{}\n```\n",
            file.path,
            file.language,
            file.summary,
            file.language.to_lowercase(),
            truncate_chars(&file.content, MAX_TOKENS / 4)
        ));
        if !file.functions.is_empty() {
            prompt.push_str("Functions in this file:\n");
            for f in &file.functions {
                prompt.push_str(&format!("- {} (line {})\n", f.signature, f.start_line));
            }
        }
    }

    let relevant = find_relevant_files(files, question);
    if !relevant.is_empty() {
        prompt.push_str("\nRelevant Files:\n");
        for file in relevant {
            prompt.push_str(&format!(
                "--- File: {} ---\nLanguage: {}\nSummary: {}\n",
                file.path, file.language, file.summary
            ));
            if !file.content.is_empty() {
                prompt.push_str(&format!(
                    "Content snippet:\n```{}\n{}\n```\n",
                    file.language.to_lowercase(),
                    truncate_chars(&file.content, MAX_TOKENS / 10)
                ));
            }
            if !file.functions.is_empty() {
                prompt.push_str("Functions in this file:\n");
                for f in file.functions.iter().take(3) {
                    prompt.push_str(&format!(
                        "- {}: {}\n",
                        f.name,
                        truncate_chars(&f.description, 100)
                    ));
                }
                if file.functions.len() > 3 {
                    prompt.push_str(&format!("... and {} more functions\n", file.functions.len() - 3));
                }
            }
            prompt.push('\n');
        }
    }

    if let Some(Value::Object(extra)) = context {
        if !extra.is_empty() {
            prompt.push_str("\nAdditional context:\n");
            for (key, value) in extra {
                prompt.push_str(&format!("- {key}: {value}\n"));
            }
        }
    }

    prompt.push_str(
        "\nPlease provide a detailed, informative response to the user's query based on the repository context provided.\n\
         If you don't have enough information to answer the query, please acknowledge this limitation instead of speculating.\n\
         If the query asks for code, include relevant, well-structured code snippets.\n\n\
         Format your response as follows:\n\n\
         ANSWER: <detailed explanation answering the user's query>\n\n\
         CODE (if applicable):\n```language\n<code snippets if requested or helpful>\n```\n\n\
         REFERENCES:\n<list of specific files referenced in your answer, one per line>\n",
    );
    if with_recommendations {
        prompt.push_str("\nRECOMMENDATIONS:\n<suggested improvements for the current file>\n");
    }
    prompt
}

struct SectionPatterns {
    answer: Regex,
    code: Regex,
    references: Regex,
    recommendations: Regex,
}

fn section_patterns() -> Option<&'static SectionPatterns> {
    static PATTERNS: OnceLock<Option<SectionPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(SectionPatterns {
                answer: Regex::new(r"(?s)ANSWER:(.*?)(?:CODE[^:\n]*:|REFERENCES:|RECOMMENDATIONS:|\z)").ok()?,
                code: Regex::new(r"(?s)CODE[^:\n]*:\s*```[^\n]*\n(.*?)```").ok()?,
                references: Regex::new(r"(?s)REFERENCES:(.*?)(?:RECOMMENDATIONS:|\z)").ok()?,
                recommendations: Regex::new(r"(?s)RECOMMENDATIONS:(.*?)(?:REFERENCES:|\z)").ok()?,
            })
        })
        .as_ref()
}

fn clean_reference(line: &str) -> Option<String> {
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
        .trim_start();
    let trimmed = match trimmed.split_once(". ") {
        Some((n, rest)) if n.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    let trimmed = trimmed.trim().trim_matches('`').trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.is_empty() || lowered == "none" || lowered == "n/a" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Separa la respuesta del LLM en texto, código y referencias.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let Some(patterns) = section_patterns() else {
        return ParsedResponse {
            reply: AssistantReply {
                text: raw.trim().to_string(),
                code: None,
                referenced_files: Vec::new(),
                confidence: 0.9,
            },
            recommendations: None,
        };
    };

    let text = patterns
        .answer
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| raw.trim().to_string());

    let code = patterns
        .code
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty());

    let referenced_files = patterns
        .references
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().lines().filter_map(clean_reference).collect())
        .unwrap_or_default();

    let recommendations = patterns
        .recommendations
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty());

    ParsedResponse {
        reply: AssistantReply {
            text,
            code,
            referenced_files,
            confidence: 0.9,
        },
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FunctionInfo, SourceType};
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FixedGenerator(Result<String, String>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate_text(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn file(path: &str, summary: &str) -> FileRecord {
        FileRecord {
            repo_id: "r".into(),
            path: path.into(),
            language: "Python".into(),
            content: "x = 1\n".into(),
            summary: summary.into(),
            size_bytes: 6,
            line_count: 1,
            functions: Vec::new(),
        }
    }

    #[test]
    fn keywords_drop_stop_words_and_keep_files() {
        let keywords = extract_keywords("What is the role of \"query processor\" in app.py and .env");
        assert!(keywords.contains(&"what".to_string()));
        assert!(keywords.contains(&"role".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(keywords.contains(&"query processor".to_string()));
        assert!(keywords.contains(&"app.py".to_string()));
        assert!(keywords.contains(&".env".to_string()));
    }

    #[test]
    fn relevant_files_match_paths_summaries_and_functions() {
        let mut with_fn = file("src/db.py", "");
        with_fn.functions.push(FunctionInfo {
            name: "connect_mongo".into(),
            signature: "def connect_mongo():".into(),
            description: String::new(),
            start_line: 1,
        });
        let files = vec![file("src/routes.py", "HTTP routes"), with_fn, file("README.md", "")];

        let found: Vec<&str> = find_relevant_files(&files, "where are the routes")
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(found, vec!["src/routes.py"]);

        let found: Vec<&str> = find_relevant_files(&files, "mongo connection")
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(found, vec!["src/db.py"]);
    }

    #[test]
    fn relevant_files_fall_back_to_common_files() {
        let files = vec![file("docs/README.md", ""), file("lib/x.py", "")];
        let found = find_relevant_files(&files, "zzz");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "docs/README.md");
    }

    #[test]
    fn parses_all_sections() {
        let raw = "ANSWER: It uses Flask.\n\nCODE (if applicable):\n```python\napp = Flask(__name__)\n```\n\nREFERENCES:\n- app.py\n2. `src/routes.py`\nNone\n";
        let parsed = parse_response(raw);
        assert_eq!(parsed.reply.text, "It uses Flask.");
        assert_eq!(parsed.reply.code.as_deref(), Some("app = Flask(__name__)"));
        assert_eq!(parsed.reply.referenced_files, vec!["app.py", "src/routes.py"]);
        assert_eq!(parsed.recommendations, None);
    }

    #[test]
    fn unstructured_responses_become_plain_text() {
        let parsed = parse_response("  Just an answer.  ");
        assert_eq!(parsed.reply.text, "Just an answer.");
        assert!(parsed.reply.code.is_none());
        assert!(parsed.reply.referenced_files.is_empty());
    }

    #[test]
    fn parses_recommendations() {
        let parsed = parse_response("ANSWER: Fine.\nRECOMMENDATIONS:\nAdd tests.\n");
        assert_eq!(parsed.reply.text, "Fine.");
        assert_eq!(parsed.recommendations.as_deref(), Some("Add tests."));
    }

    #[test]
    fn prompt_includes_current_file_and_context() {
        let repo = Repository::new("demo", SourceType::Local, "/tmp/demo", None);
        let files = vec![file("app.py", "entry point")];
        let context = serde_json::json!({"selection": "line 3"});
        let prompt = build_prompt(&repo, "explain app.py", &files, files.first(), Some(&context), false);
        assert!(prompt.contains("Repository: demo"));
        assert!(prompt.contains("Current File: app.py"));
        assert!(prompt.contains("--- File: app.py ---"));
        assert!(prompt.contains("- selection: \"line 3\""));
        assert!(!prompt.contains("RECOMMENDATIONS"));
    }

    #[tokio::test]
    async fn llm_failures_become_apologies() {
        let store: Arc<dyn RepoStore> = Arc::new(MemoryStore::new());
        let repo = Repository::new("demo", SourceType::Local, "/tmp/demo", None);
        store.insert_repository(&repo).await.unwrap();

        let failing = QueryProcessor::new(store.clone(), Arc::new(FixedGenerator(Err("timeout".into()))));
        let reply = failing.process_query(&repo, "hi", None, None).await.unwrap();
        assert_eq!(reply.text, LLM_FAILURE_REPLY);
        assert_eq!(reply.confidence, 0.0);

        let signature = QueryProcessor::new(
            store,
            Arc::new(FixedGenerator(Ok(format!("{ERROR_SIGNATURE} 429")))),
        );
        let reply = signature.process_query(&repo, "hi", None, None).await.unwrap();
        assert!(!reply.text.contains(ERROR_SIGNATURE));
    }

    #[tokio::test]
    async fn analyze_file_reports_functions() {
        let store: Arc<dyn RepoStore> = Arc::new(MemoryStore::new());
        let repo = Repository::new("demo", SourceType::Local, "/tmp/demo", None);
        store.insert_repository(&repo).await.unwrap();
        let mut record = file("app.py", "entry");
        record.repo_id = repo.id.clone();
        record.functions.push(FunctionInfo {
            name: "main".into(),
            signature: "def main():".into(),
            description: String::new(),
            start_line: 1,
        });
        store.save_files(&repo.id, &[record]).await.unwrap();

        let processor = QueryProcessor::new(
            store,
            Arc::new(FixedGenerator(Ok("ANSWER: Entry point.\nRECOMMENDATIONS:\nSplit main.".into()))),
        );
        let analysis = processor.analyze_file(&repo, "app.py", "summarize").await.unwrap().unwrap();
        assert_eq!(analysis.summary, "Entry point.");
        assert_eq!(analysis.functions[0].description, "def main():");
        assert_eq!(analysis.recommendations.as_deref(), Some("Split main."));

        assert!(processor.analyze_file(&repo, "missing.py", "x").await.unwrap().is_none());
    }
}
