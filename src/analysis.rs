//! Análisis estático ligero de un repositorio ya escaneado: detección de
//! lenguaje, extracción de funciones, resúmenes, árbol de ficheros y
//! componentes clave.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::OnceLock,
};

use regex::Regex;

use crate::models::{Component, ComponentFile, FileRecord, FunctionInfo, TreeNode};

/// Máximo de componentes devueltos por `group_components`.
pub const MAX_COMPONENTS: usize = 10;

/// Lenguaje a partir de la extensión (o del nombre, para ficheros sin extensión).
pub fn detect_language(path: &Path) -> &'static str {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match file_name.as_str() {
        "dockerfile" => return "Dockerfile",
        "makefile" => return "Makefile",
        _ => {}
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "py" | "pyw" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "scala" => "Scala",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "go" => "Go",
        "rb" => "Ruby",
        "php" => "PHP",
        "rs" => "Rust",
        "swift" => "Swift",
        "html" | "htm" => "HTML",
        "css" | "scss" | "sass" | "less" => "CSS",
        "md" | "markdown" | "rst" => "Markdown",
        "json" => "JSON",
        "yml" | "yaml" => "YAML",
        "toml" => "TOML",
        "xml" => "XML",
        "sql" => "SQL",
        "sh" | "bash" | "zsh" => "Shell",
        "txt" | "cfg" | "ini" | "env" => "Text",
        _ => "Unknown",
    }
}

fn function_patterns() -> &'static HashMap<&'static str, Vec<Regex>> {
    static PATTERNS: OnceLock<HashMap<&'static str, Vec<Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(&str, &[&str]); 9] = [
            ("Python", &[r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\("]),
            (
                "JavaScript",
                &[
                    r"^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(",
                    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
                ],
            ),
            (
                "TypeScript",
                &[
                    r"^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*[<(]",
                    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s*)?\([^)]*\)[^=]*=>",
                ],
            ),
            (
                "Rust",
                &[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)"],
            ),
            ("Go", &[r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*[\[(]"]),
            (
                "Java",
                &[r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized)\s+)+[\w<>\[\],\s]+?\s+([A-Za-z_]\w*)\s*\([^;]*$"],
            ),
            ("Kotlin", &[r"^\s*(?:\w+\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?([A-Za-z_]\w*)\s*\("]),
            ("Ruby", &[r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!]?)"]),
            ("PHP", &[r"^\s*(?:(?:public|private|protected|static)\s+)*function\s+([A-Za-z_]\w*)\s*\("]),
        ];
        table
            .iter()
            .map(|(lang, patterns)| {
                let compiled = patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();
                (*lang, compiled)
            })
            .collect()
    })
}

/// Extrae las funciones declaradas en `content` para los lenguajes soportados.
pub fn extract_functions(content: &str, language: &str) -> Vec<FunctionInfo> {
    let Some(patterns) = function_patterns().get(language) else {
        return Vec::new();
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut functions = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let Some(name) = patterns
            .iter()
            .find_map(|re| re.captures(line).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        functions.push(FunctionInfo {
            name,
            signature: line.trim().trim_end_matches('{').trim_end().to_string(),
            description: describe_function(&lines, index, language),
            start_line: index + 1,
        });
    }
    functions
}

/// Documentación de una función: docstring en Python, comentario previo en el resto.
fn describe_function(lines: &[&str], index: usize, language: &str) -> String {
    if language == "Python" {
        let docstring = lines
            .iter()
            .skip(index + 1)
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim());
        if let Some(doc) = docstring {
            for quote in ["\"\"\"", "'''"] {
                if let Some(rest) = doc.strip_prefix(quote) {
                    return rest.trim_end_matches(quote).trim().to_string();
                }
            }
        }
        return String::new();
    }

    let mut comment = Vec::new();
    for line in lines[..index].iter().rev() {
        let trimmed = line.trim();
        let text = ["///", "//!", "//", "#", "/**", "*/", "/*", "*"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix));
        match text {
            Some(text) if !trimmed.starts_with("#[") => comment.push(text.trim().to_string()),
            _ => break,
        }
    }
    comment.reverse();
    comment
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn summarize_file(language: &str, line_count: usize, functions: &[FunctionInfo]) -> String {
    match functions.len() {
        0 => format!("{language} file with {line_count} lines."),
        1 => format!(
            "{language} file with {line_count} lines defining `{}`.",
            functions[0].name
        ),
        n => {
            let names: Vec<&str> = functions.iter().take(3).map(|f| f.name.as_str()).collect();
            let more = if n > 3 { format!(" and {} more", n - 3) } else { String::new() };
            format!(
                "{language} file with {line_count} lines defining {n} functions (`{}`{more}).",
                names.join("`, `")
            )
        }
    }
}

/// Resumen del repositorio: número de ficheros y lenguajes principales.
pub fn summarize_repository(name: &str, files: &[FileRecord]) -> String {
    if files.is_empty() {
        return format!("{name} contains no readable source files.");
    }

    let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        *by_language.entry(file.language.as_str()).or_default() += 1;
    }
    let mut languages: Vec<(&str, usize)> = by_language.into_iter().collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let total_lines: usize = files.iter().map(|f| f.line_count).sum();
    let function_count: usize = files.iter().map(|f| f.functions.len()).sum();
    let top: Vec<String> = languages
        .iter()
        .take(5)
        .map(|(lang, count)| format!("{lang} ({count})"))
        .collect();

    format!(
        "{name} contains {} files ({total_lines} lines, {function_count} functions). Main languages: {}.",
        files.len(),
        top.join(", ")
    )
}

/// Construye el árbol de directorios a partir de las rutas de los ficheros.
pub fn build_structure(repo_name: &str, files: &[FileRecord]) -> TreeNode {
    let mut root = TreeNode::Directory {
        name: repo_name.to_string(),
        path: String::new(),
        children: Vec::new(),
    };

    for file in files {
        let parts: Vec<&str> = file.path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            continue;
        };

        let mut current = &mut root;
        for (depth, dir) in dirs.iter().enumerate() {
            let TreeNode::Directory { children, .. } = current else {
                break;
            };
            let position = children
                .iter()
                .position(|c| matches!(c, TreeNode::Directory { name, .. } if name.as_str() == *dir));
            let index = match position {
                Some(index) => index,
                None => {
                    children.push(TreeNode::Directory {
                        name: dir.to_string(),
                        path: parts[..=depth].join("/"),
                        children: Vec::new(),
                    });
                    children.len() - 1
                }
            };
            current = &mut children[index];
        }

        if let TreeNode::Directory { children, .. } = current {
            children.push(TreeNode::File {
                name: file_name.to_string(),
                path: file.path.clone(),
                language: file.language.clone(),
            });
        }
    }
    sort_tree(&mut root);
    root
}

/// Directorios primero y después por nombre, en todos los niveles.
fn sort_tree(node: &mut TreeNode) {
    if let TreeNode::Directory { children, .. } = node {
        children.sort_by(|a, b| match (a, b) {
            (TreeNode::Directory { .. }, TreeNode::File { .. }) => Ordering::Less,
            (TreeNode::File { .. }, TreeNode::Directory { .. }) => Ordering::Greater,
            _ => node_name(a).to_lowercase().cmp(&node_name(b).to_lowercase()),
        });
        for child in children.iter_mut() {
            sort_tree(child);
        }
    }
}

fn node_name(node: &TreeNode) -> &str {
    match node {
        TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
    }
}

/// Agrupa los ficheros por directorio padre; los más poblados primero.
pub fn group_components(files: &[FileRecord]) -> Vec<Component> {
    let mut directories: BTreeMap<String, Vec<ComponentFile>> = BTreeMap::new();
    for file in files {
        let dir = match file.path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir.to_string(),
            _ => "root".to_string(),
        };
        directories.entry(dir).or_default().push(ComponentFile {
            path: file.path.clone(),
            summary: file.summary.clone(),
            language: file.language.clone(),
        });
    }

    let mut components: Vec<Component> = directories
        .into_iter()
        .map(|(name, files)| Component {
            description: format!("Files in {name} directory"),
            name,
            files,
        })
        .collect();
    // sort_by es estable: a igualdad de tamaño se mantiene el orden alfabético.
    components.sort_by(|a, b| b.files.len().cmp(&a.files.len()));
    components.truncate(MAX_COMPONENTS);
    components
}
