//! Vista de un fichero con su análisis opcional.

use tracing::error;

use crate::{
    client::RepoApi,
    contract::{self, AnalysisView},
    ui::{dom::Element, format::format_size},
};

pub struct FileViewer {
    repo_id: String,
    path: String,
    root: Element,
}

impl FileViewer {
    pub fn new(repo_id: &str, path: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            path: path.to_string(),
            root: Element::new("section")
                .with_class("file-viewer")
                .with_child(Element::new("p").with_class("loading").with_text("Loading file...")),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    pub async fn load(&mut self, api: &dyn RepoApi) {
        let view = match api.file(&self.repo_id, &self.path).await {
            Ok(value) => contract::file_view(&value, &self.path),
            Err(e) => {
                error!("Error cargando {} de {}: {e}", self.path, self.repo_id);
                None
            }
        };

        self.root.clear();
        let Some(view) = view else {
            self.root.push(
                Element::new("p")
                    .with_class("error-message")
                    .with_text("Failed to load file content."),
            );
            return;
        };

        let lines = view
            .line_count
            .map(|n| format!("{n} lines"))
            .unwrap_or_else(|| "Unknown lines".to_string());
        self.root.push(Element::new("h2").with_class("file-path").with_text(view.path.clone()));
        self.root.push(Element::new("p").with_class("file-meta").with_text(format!(
            "{} · {} · {}",
            view.language,
            format_size(view.size_bytes),
            lines
        )));
        self.root.push(
            Element::new("pre").with_class("code-block").with_child(
                Element::new("code")
                    .with_class(&format!("language-{}", view.language.to_lowercase()))
                    .with_text(view.content),
            ),
        );
        self.root.push(analyze_form(&self.repo_id, &view.path));
    }

    pub fn show_analysis(&mut self, analysis: Option<&AnalysisView>) {
        self.root.remove_where(&|el| el.has_class("file-analysis"));
        let mut section = Element::new("div").with_class("file-analysis");

        match analysis {
            Some(analysis) => {
                section.push(Element::new("h3").with_text("Analysis"));
                section.push(Element::new("p").with_text(analysis.summary.clone()));
                if !analysis.functions.is_empty() {
                    let mut list = Element::new("ul").with_class("function-list");
                    for (name, description) in &analysis.functions {
                        list.push(
                            Element::new("li")
                                .with_child(Element::new("code").with_text(name.clone()))
                                .with_text(format!(": {description}")),
                        );
                    }
                    section.push(list);
                }
                if let Some(recommendations) = &analysis.recommendations {
                    section.push(Element::new("h4").with_text("Recommendations"));
                    section.push(Element::new("p").with_text(recommendations.clone()));
                }
            }
            None => section.push(
                Element::new("p")
                    .with_class("error-message")
                    .with_text("The analysis could not be completed."),
            ),
        }
        self.root.push(section);
    }
}

fn analyze_form(repo_id: &str, path: &str) -> Element {
    Element::new("form")
        .with_class("analyze-form")
        .with_attr("method", "post")
        .with_attr("action", format!("/repos/{repo_id}/analyze"))
        .with_child(
            Element::new("input")
                .with_attr("type", "hidden")
                .with_attr("name", "file_path")
                .with_attr("value", path),
        )
        .with_child(
            Element::new("input")
                .with_attr("type", "text")
                .with_attr("name", "query")
                .with_attr("placeholder", "What should the analysis focus on?"),
        )
        .with_child(
            Element::new("button")
                .with_attr("type", "submit")
                .with_class("btn")
                .with_class("btn-secondary")
                .with_text("Analyze file"),
        )
}
