//! Ingesta de un repositorio: obtención del código (GitHub, ZIP o ruta
//! local), escaneo de ficheros de texto y análisis, persistiendo el
//! resultado en el almacén.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use mime_guess::MimeGuess;
use tokio::process::Command;
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};
use zip::ZipArchive;

use crate::{
    analysis,
    models::{FileRecord, RepoStatus, Repository},
    store::{RepoStore, RepositoryUpdate},
};

/// Directorios que nunca se indexan.
const IGNORED_DIRS: [&str; 10] = [
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
];

/// Ficheros mayores que esto se consideran artefactos y se omiten.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Origen del código de un repositorio.
#[derive(Debug, Clone)]
pub enum RepoSource {
    Github { url: String, branch: Option<String> },
    Zip { file_name: String, bytes: Vec<u8> },
    Local { path: PathBuf },
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub total_bytes: u64,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos ({} bytes).",
            self.files_scanned, self.files_ingested, self.files_skipped, self.total_bytes
        )
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && IGNORED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

fn is_binary_by_name(path: &Path) -> bool {
    match MimeGuess::from_path(path).first() {
        Some(m) => {
            matches!(m.type_().as_str(), "image" | "audio" | "video" | "font")
                || matches!(m.subtype().as_str(), "pdf" | "zip" | "octet-stream")
        }
        None => false,
    }
}

/// Recorre `root` y devuelve un `FileRecord` por cada fichero de texto.
/// Falla si el tamaño total supera `max_bytes`.
pub fn scan_directory(
    repo_id: &str,
    root: &Path,
    max_bytes: u64,
) -> Result<(Vec<FileRecord>, IngestionSummary)> {
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let mut summary = IngestionSummary::default();
    let mut files = Vec::new();

    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in entries {
        summary.files_scanned += 1;
        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        summary.total_bytes += size;
        if summary.total_bytes > max_bytes {
            return Err(anyhow!(
                "El repositorio supera el tamaño máximo de {} MB",
                max_bytes / (1024 * 1024)
            ));
        }

        if size > MAX_FILE_BYTES || is_binary_by_name(path) {
            summary.files_skipped += 1;
            continue;
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
                summary.files_skipped += 1;
                continue;
            }
        };

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        let language = analysis::detect_language(path).to_string();
        let functions = analysis::extract_functions(&content, &language);
        let line_count = content.lines().count();

        files.push(FileRecord {
            repo_id: repo_id.to_string(),
            summary: analysis::summarize_file(&language, line_count, &functions),
            path: relative,
            language,
            size_bytes: content.len() as u64,
            line_count,
            functions,
            content,
        });
        summary.files_ingested += 1;
    }

    Ok((files, summary))
}

/// Deja el código del repositorio en disco y devuelve su directorio raíz.
pub async fn materialize(source: &RepoSource, workdir: &Path) -> Result<PathBuf> {
    match source {
        RepoSource::Local { path } => {
            if !path.is_dir() {
                return Err(anyhow!(
                    "La ruta local no es un directorio válido: {}",
                    path.display()
                ));
            }
            Ok(path.clone())
        }
        RepoSource::Github { url, branch } => {
            tokio::fs::create_dir_all(workdir).await?;
            let checkout = workdir.join("checkout");
            let mut cmd = Command::new("git");
            cmd.arg("clone").arg("--depth").arg("1");
            if let Some(branch) = branch.as_deref().filter(|b| !b.trim().is_empty()) {
                cmd.arg("--branch").arg(branch.trim());
            }
            cmd.arg(url).arg(&checkout);

            info!("Clonando {url}...");
            let output = cmd.output().await.context("No se pudo ejecutar git")?;
            if !output.status.success() {
                return Err(anyhow!(
                    "git clone falló: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            Ok(checkout)
        }
        RepoSource::Zip { file_name, bytes } => {
            let dest = workdir.join("extracted");
            let bytes = bytes.clone();
            let target = dest.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                fs::create_dir_all(&target)?;
                let mut archive = ZipArchive::new(Cursor::new(bytes))?;
                archive.extract(&target)?;
                Ok(())
            })
            .await?
            .with_context(|| format!("No se pudo extraer {file_name}"))?;
            Ok(single_top_level_dir(&dest).unwrap_or(dest))
        }
    }
}

/// Los ZIP de GitHub envuelven todo en una carpeta; si es así, se usa esa.
fn single_top_level_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(Result::ok);
    let first = entries.next()?;
    if entries.next().is_some() || !first.file_type().ok()?.is_dir() {
        return None;
    }
    Some(first.path())
}

/// Directorio de trabajo de un repositorio dentro de `temp_dir`.
pub fn workdir_for(temp_dir: &Path, repo: &Repository) -> PathBuf {
    let safe_name: String = repo
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    temp_dir.join(format!("{safe_name}_{}", repo.id))
}

/// Ingesta completa: obtiene el código, lo escanea, guarda los ficheros y
/// deja el repositorio en `analyzed` (o en `error` si algo falla).
pub async fn ingest_repository(
    store: Arc<dyn RepoStore>,
    repo: &Repository,
    source: RepoSource,
    workdir: PathBuf,
    max_bytes: u64,
) -> Result<IngestionSummary> {
    let result = run_ingestion(store.as_ref(), repo, &source, &workdir, max_bytes).await;

    let update = match &result {
        Ok((summary_text, scan)) => RepositoryUpdate {
            status: Some(RepoStatus::Analyzed),
            summary: Some(summary_text.clone()),
            size_bytes: Some(scan.total_bytes),
        },
        Err(err) => {
            error!("Error de ingesta en {}: {err:#}", repo.id);
            RepositoryUpdate {
                status: Some(RepoStatus::Error),
                summary: Some(format!("Analysis failed: {err}")),
                size_bytes: None,
            }
        }
    };
    store.update_repository(&repo.id, update).await?;

    result.map(|(_, scan)| scan)
}

async fn run_ingestion(
    store: &dyn RepoStore,
    repo: &Repository,
    source: &RepoSource,
    workdir: &Path,
    max_bytes: u64,
) -> Result<(String, IngestionSummary)> {
    let root = materialize(source, workdir).await?;

    let repo_id = repo.id.clone();
    let (files, scan) =
        tokio::task::spawn_blocking(move || scan_directory(&repo_id, &root, max_bytes)).await??;
    info!("Repositorio {} escaneado. {}", repo.id, scan);

    store.save_files(&repo.id, &files).await?;
    Ok((analysis::summarize_repository(&repo.name, &files), scan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::store::MemoryStore;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_skips_ignored_dirs_and_binaries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.py", "def main():\n    pass\n");
        write(dir.path(), "node_modules/pkg/index.js", "module.exports = 1;\n");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main\n");
        fs::write(dir.path().join("logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let (files, summary) = scan_directory("r1", dir.path(), 10 * 1024 * 1024).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.py"]);
        assert_eq!(files[0].language, "Python");
        assert_eq!(files[0].functions.len(), 1);
        assert_eq!(files[0].line_count, 2);
        assert_eq!(summary.files_skipped, 1);
    }

    #[test]
    fn scan_rejects_oversized_repositories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.txt", &"x".repeat(2048));
        let err = scan_directory("r1", dir.path(), 1024).unwrap_err();
        assert!(err.to_string().contains("tamaño máximo"));
    }

    #[tokio::test]
    async fn zip_sources_are_extracted_and_unwrapped() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("project-main/app.py", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"print('hi')\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let workdir = tempfile::tempdir().unwrap();
        let source = RepoSource::Zip { file_name: "project.zip".into(), bytes };
        let root = materialize(&source, workdir.path()).await.unwrap();
        assert!(root.ends_with("project-main"));
        assert!(root.join("app.py").is_file());
    }

    #[tokio::test]
    async fn missing_local_paths_mark_the_repository_as_failed() {
        let store: Arc<dyn RepoStore> = Arc::new(MemoryStore::new());
        let repo = Repository::new("ghost", SourceType::Local, "/definitely/not/here", None);
        store.insert_repository(&repo).await.unwrap();

        let source = RepoSource::Local { path: PathBuf::from("/definitely/not/here") };
        let workdir = tempfile::tempdir().unwrap();
        assert!(ingest_repository(store.clone(), &repo, source, workdir.path().to_path_buf(), 1024)
            .await
            .is_err());

        let stored = store.get_repository(&repo.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RepoStatus::Error);
        assert!(stored.summary.unwrap().starts_with("Analysis failed"));
    }

    #[tokio::test]
    async fn local_ingestion_stores_files_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.py", "def run():\n    return 1\n");
        write(dir.path(), "README.md", "# Demo\n");

        let store: Arc<dyn RepoStore> = Arc::new(MemoryStore::new());
        let repo = Repository::new("demo", SourceType::Local, &dir.path().to_string_lossy(), None);
        store.insert_repository(&repo).await.unwrap();

        let source = RepoSource::Local { path: dir.path().to_path_buf() };
        ingest_repository(store.clone(), &repo, source, dir.path().join("work"), 1024 * 1024)
            .await
            .unwrap();

        let stored = store.get_repository(&repo.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RepoStatus::Analyzed);
        assert!(stored.size_bytes > 0);
        assert!(stored.summary.unwrap().contains("2 files"));
        assert_eq!(store.list_files(&repo.id).await.unwrap().len(), 2);
    }

    #[test]
    fn workdirs_are_sanitized() {
        let repo = Repository::new("my repo/../x", SourceType::Local, "/tmp", None);
        let dir = workdir_for(Path::new("/tmp/repomind"), &repo);
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("my_repo____x_"));
    }
}
