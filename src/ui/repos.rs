//! Lista de repositorios, cabecera de detalle y componentes clave.

use tracing::error;

use crate::{
    client::RepoApi,
    contract::{self, ComponentView, RepoSummary},
    ui::{
        dom::Element,
        format::{format_date, format_size},
        tree::file_link,
    },
};

fn loading(text: &str) -> Element {
    Element::new("p").with_class("loading").with_text(text)
}

fn inline_error(text: &str) -> Element {
    Element::new("p").with_class("error-message").with_text(text)
}

fn badge(kind: &str, text: &str) -> Element {
    Element::new("span")
        .with_class("badge")
        .with_class(&format!("badge-{kind}"))
        .with_text(text.to_string())
}

fn link_button(href: String, label: &str, style: &str) -> Element {
    Element::new("a")
        .with_class("btn")
        .with_class(style)
        .with_attr("href", href)
        .with_text(label)
}

fn delete_form(repo_id: &str) -> Element {
    Element::new("form")
        .with_class("inline-form")
        .with_attr("method", "post")
        .with_attr("action", format!("/repos/{repo_id}/delete"))
        .with_attr("data-confirm", "Delete this repository?")
        .with_child(
            Element::new("button")
                .with_attr("type", "submit")
                .with_class("btn")
                .with_class("btn-danger")
                .with_text("Delete"),
        )
}

/// Rejilla de tarjetas de `/repos`.
pub struct RepositoryList {
    root: Element,
}

impl Default for RepositoryList {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryList {
    pub fn new() -> Self {
        Self {
            root: Element::new("div")
                .with_class("repo-list")
                .with_child(loading("Loading repositories...")),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    pub async fn load(&mut self, api: &dyn RepoApi) {
        match api.list_repositories().await {
            Ok(value) => self.render(&contract::repository_list(&value)),
            Err(e) => {
                error!("Error cargando repositorios: {e}");
                self.root.clear();
                self.root.push(inline_error("Failed to load repositories. Please try again later."));
            }
        }
    }

    pub fn render(&mut self, repos: &[RepoSummary]) {
        self.root.clear();
        if repos.is_empty() {
            self.root.push(
                Element::new("div")
                    .with_class("empty-state")
                    .with_child(Element::new("p").with_text("No repositories found."))
                    .with_child(link_button("/upload".to_string(), "Upload your first repository", "btn-primary")),
            );
            return;
        }
        for repo in repos {
            self.root.push(repo_card(repo));
        }
    }
}

fn repo_card(repo: &RepoSummary) -> Element {
    Element::new("div")
        .with_class("repo-card")
        .with_attr("data-repo-id", repo.id.clone())
        .with_child(Element::new("h3").with_text(repo.name.clone()))
        .with_child(
            Element::new("div")
                .with_class("repo-badges")
                .with_child(badge("type", &repo.source_type))
                .with_child(badge(&repo.status, &repo.status)),
        )
        .with_child(
            Element::new("p").with_class("repo-meta").with_text(format!(
                "Created {} · {}",
                format_date(repo.created_at.as_deref()),
                format_size(repo.size_bytes)
            )),
        )
        .with_child(
            Element::new("div")
                .with_class("repo-actions")
                .with_child(link_button(format!("/repos/{}", repo.id), "View", "btn-secondary"))
                .with_child(link_button(format!("/chat/{}", repo.id), "Chat", "btn-primary"))
                .with_child(delete_form(&repo.id)),
        )
}

/// Cabecera de `/repos/{id}`.
pub struct RepositoryHeader {
    repo_id: String,
    root: Element,
    name: Option<String>,
}

impl RepositoryHeader {
    pub fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            root: Element::new("section")
                .with_class("repo-header")
                .with_child(loading("Loading repository...")),
            name: None,
        }
    }

    /// Nombre cargado, si la carga fue bien.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    pub async fn load(&mut self, api: &dyn RepoApi) {
        let detail = match api.repository(&self.repo_id).await {
            Ok(value) => contract::repository_detail(&value),
            Err(e) => {
                error!("Error cargando el repositorio {}: {e}", self.repo_id);
                None
            }
        };

        self.root.clear();
        let Some(detail) = detail else {
            self.root.push(inline_error("Failed to load repository details."));
            return;
        };

        let mut badges = Element::new("div")
            .with_class("repo-badges")
            .with_child(badge("type", &detail.source_type));
        if let Some(status) = &detail.status {
            badges.push(badge(status, status));
        }

        self.root.push(Element::new("h1").with_text(detail.name.clone()));
        self.root.push(badges);
        self.root.push(
            Element::new("dl")
                .with_class("repo-facts")
                .with_child(Element::new("dt").with_text("Created"))
                .with_child(Element::new("dd").with_text(format_date(detail.created_at.as_deref())))
                .with_child(Element::new("dt").with_text("Size"))
                .with_child(Element::new("dd").with_text(format_size(detail.size_bytes))),
        );
        self.root.push(
            Element::new("p")
                .with_class("repo-summary")
                .with_text(detail.summary.clone().unwrap_or_else(|| "No summary available yet.".to_string())),
        );
        self.root.push(
            Element::new("div")
                .with_class("repo-actions")
                .with_child(link_button(format!("/chat/{}", self.repo_id), "Chat", "btn-primary"))
                .with_child(delete_form(&self.repo_id)),
        );
        self.name = Some(detail.name);
    }
}

/// Sección de componentes clave.
pub struct KeyComponents {
    repo_id: String,
    root: Element,
}

impl KeyComponents {
    pub fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            root: Element::new("section")
                .with_class("key-components")
                .with_child(loading("Loading components...")),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    pub async fn load(&mut self, api: &dyn RepoApi) {
        match api.components(&self.repo_id).await {
            Ok(value) => self.render(&contract::components(&value)),
            Err(e) => {
                error!("Error cargando componentes de {}: {e}", self.repo_id);
                self.root.clear();
                self.root.push(inline_error("Failed to load key components."));
            }
        }
    }

    pub fn render(&mut self, components: &[ComponentView]) {
        self.root.clear();
        if components.is_empty() {
            self.root.push(Element::new("p").with_class("empty-state").with_text("No key components identified."));
            return;
        }
        for component in components {
            let mut card = Element::new("div")
                .with_class("component-card")
                .with_child(Element::new("h4").with_text(component.name.clone()))
                .with_child(Element::new("p").with_text(component.description.clone()));
            if !component.files.is_empty() {
                let mut list = Element::new("ul").with_class("component-files");
                for path in &component.files {
                    list.push(
                        Element::new("li").with_child(
                            Element::new("a")
                                .with_attr("href", file_link(&self.repo_id, path))
                                .with_text(path.clone()),
                        ),
                    );
                }
                card.push(list);
            }
            self.root.push(card);
        }
    }
}
