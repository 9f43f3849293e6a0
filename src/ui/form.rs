//! Formulario de alta de repositorios: validación, visibilidad de los grupos
//! por tipo de origen y anotación de errores.

use crate::{
    client::{UploadRequest, ZipUpload},
    models::{is_zip_name, SourceType},
    ui::dom::Element,
};

pub const DEFAULT_SOURCE: SourceType = SourceType::Github;

const ERROR_CLASS: &str = "field-error";
const INVALID_CLASS: &str = "input-invalid";
const HIDDEN_CLASS: &str = "hidden";

/// Valores enviados por el navegador.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub repo_type: String,
    pub name: String,
    pub github_url: String,
    pub github_branch: String,
    pub local_path: String,
    pub zip_files: Vec<ZipUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

impl UploadForm {
    pub fn source_type(&self) -> Option<SourceType> {
        SourceType::parse(&self.repo_type)
    }

    /// Campo unificado antiguo: rellena el campo del tipo elegido si está vacío.
    /// Devuelve `true` si se usó.
    pub fn apply_source_input(&mut self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let target = match self.source_type() {
            Some(SourceType::Github) => &mut self.github_url,
            Some(SourceType::Local) => &mut self.local_path,
            _ => return false,
        };
        if !target.trim().is_empty() {
            return false;
        }
        *target = value.to_string();
        true
    }

    /// Recoge todos los errores; una lista vacía significa que se puede enviar.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Please enter a repository name"));
        }

        match self.source_type() {
            Some(SourceType::Github) => {
                let url = self.github_url.trim();
                if url.is_empty() || !url.contains("github.com") {
                    errors.push(FieldError::new("github_url", "Please enter a valid GitHub URL"));
                }
            }
            Some(SourceType::Zip) => {
                let valid = self.zip_files.len() == 1
                    && is_zip_name(&self.zip_files[0].file_name);
                if !valid {
                    errors.push(FieldError::new("zip_file", "Please select a ZIP file"));
                }
            }
            Some(SourceType::Local) => {
                if self.local_path.trim().is_empty() {
                    errors.push(FieldError::new("local_path", "Please enter a local path"));
                }
            }
            None => errors.push(FieldError::new("repo_type", "Please choose a source type")),
        }

        errors
    }

    /// Petición multipart con solo el campo del tipo elegido.
    pub fn to_request(&self) -> UploadRequest {
        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        let source_type = self.source_type().unwrap_or(DEFAULT_SOURCE);

        let mut request = UploadRequest {
            repo_type: source_type.as_str().to_string(),
            name: self.name.trim().to_string(),
            ..UploadRequest::default()
        };
        match source_type {
            SourceType::Github => {
                request.github_url = non_empty(&self.github_url);
                request.github_branch = non_empty(&self.github_branch);
            }
            SourceType::Zip => request.zip_file = self.zip_files.first().cloned(),
            SourceType::Local => request.local_path = non_empty(&self.local_path),
        }
        request
    }
}

/// Vista del formulario. Es dueña de su `<form>` raíz.
pub struct UploadFormView {
    root: Element,
}

impl UploadFormView {
    pub fn new(form: &UploadForm) -> Self {
        let selected = form.source_type().unwrap_or(DEFAULT_SOURCE);

        let mut type_select = Element::new("select")
            .with_attr("id", "repo_type")
            .with_attr("name", "repo_type")
            .with_attr("data-source-selector", "");
        for source in SourceType::ALL {
            let mut option = Element::new("option")
                .with_attr("value", source.as_str())
                .with_text(source_label(source));
            if source == selected {
                option.set_attr("selected", "selected");
            }
            type_select.push(option);
        }

        let root = Element::new("form")
            .with_attr("id", "upload-form")
            .with_attr("method", "post")
            .with_attr("action", "/upload")
            .with_attr("enctype", "multipart/form-data")
            .with_child(field("name", "Repository name", text_input("name", &form.name, "my-project")))
            .with_child(field("repo_type", "Source type", type_select))
            .with_child(
                source_group(SourceType::Github)
                    .with_child(field(
                        "github_url",
                        "GitHub URL",
                        text_input("github_url", &form.github_url, "https://github.com/user/repo"),
                    ))
                    .with_child(field(
                        "github_branch",
                        "Branch (optional)",
                        text_input("github_branch", &form.github_branch, "main"),
                    )),
            )
            .with_child(source_group(SourceType::Zip).with_child(field(
                "zip_file",
                "ZIP archive",
                Element::new("input")
                    .with_attr("type", "file")
                    .with_attr("id", "zip_file")
                    .with_attr("name", "zip_file")
                    .with_attr("accept", ".zip"),
            )))
            .with_child(source_group(SourceType::Local).with_child(field(
                "local_path",
                "Local path",
                text_input("local_path", &form.local_path, "/path/to/project"),
            )))
            .with_child(
                Element::new("button")
                    .with_attr("type", "submit")
                    .with_class("btn")
                    .with_class("btn-primary")
                    .with_text("Upload repository"),
            );

        let mut view = Self { root };
        view.toggle_source(selected);
        view
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Deja visible exactamente un grupo de campos: el del tipo elegido.
    pub fn toggle_source(&mut self, selected: SourceType) {
        self.root.for_each_mut(&mut |el| {
            if let Some(group) = el.attr("data-source-group") {
                if group == selected.as_str() {
                    el.remove_class(HIDDEN_CLASS);
                } else {
                    el.add_class(HIDDEN_CLASS);
                }
            }
        });
    }

    /// Quita las anotaciones previas y marca cada campo con su error.
    pub fn annotate(&mut self, errors: &[FieldError]) {
        self.root.remove_where(&|el| el.has_class(ERROR_CLASS));
        self.root.for_each_mut(&mut |el| el.remove_class(INVALID_CLASS));

        for error in errors {
            let target = error.field;
            if let Some(input) = self.root.find_mut(&|el| el.attr("name") == Some(target)) {
                input.add_class(INVALID_CLASS);
            }
            if let Some(wrapper) = self.root.find_mut(&|el| el.attr("data-field") == Some(target)) {
                wrapper.push(
                    Element::new("div")
                        .with_class(ERROR_CLASS)
                        .with_text(error.message.clone()),
                );
            }
        }
    }

    /// Banner de error encima del formulario.
    pub fn with_banner(self, message: &str) -> Element {
        Element::new("div")
            .with_child(
                Element::new("div")
                    .with_class("alert")
                    .with_class("alert-error")
                    .with_text(message.to_string()),
            )
            .with_child(self.root)
    }

    pub fn into_element(self) -> Element {
        self.root
    }
}

fn source_label(source: SourceType) -> &'static str {
    match source {
        SourceType::Github => "GitHub repository",
        SourceType::Zip => "ZIP upload",
        SourceType::Local => "Local directory",
    }
}

fn source_group(source: SourceType) -> Element {
    Element::new("div")
        .with_class("source-group")
        .with_attr("data-source-group", source.as_str())
}

fn text_input(name: &str, value: &str, placeholder: &str) -> Element {
    Element::new("input")
        .with_attr("type", "text")
        .with_attr("id", name)
        .with_attr("name", name)
        .with_attr("value", value)
        .with_attr("placeholder", placeholder)
}

fn field(name: &str, label: &str, input: Element) -> Element {
    Element::new("div")
        .with_class("form-group")
        .with_attr("data-field", name)
        .with_child(Element::new("label").with_attr("for", name).with_text(label))
        .with_child(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_form(url: &str) -> UploadForm {
        UploadForm {
            repo_type: "github".into(),
            name: "demo".into(),
            github_url: url.into(),
            ..UploadForm::default()
        }
    }

    #[test]
    fn legacy_source_input_fills_the_selected_field() {
        let mut form = github_form("");
        assert!(form.apply_source_input(" https://github.com/me/demo "));
        assert_eq!(form.github_url, "https://github.com/me/demo");
        assert!(form.validate().is_empty());

        // Un campo específico ya rellenado tiene prioridad.
        assert!(!form.apply_source_input("https://github.com/other/repo"));
        assert_eq!(form.github_url, "https://github.com/me/demo");

        let mut local = UploadForm {
            repo_type: "local".into(),
            ..UploadForm::default()
        };
        assert!(local.apply_source_input("/srv/code"));
        assert_eq!(local.local_path, "/srv/code");

        let mut zip = UploadForm {
            repo_type: "zip".into(),
            ..UploadForm::default()
        };
        assert!(!zip.apply_source_input("code.zip"));
    }

    #[test]
    fn github_urls_must_point_at_github() {
        let errors = github_form("https://gitlab.com/user/repo").validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "github_url");
        assert!(github_form("https://github.com/user/repo").validate().is_empty());
    }

    #[test]
    fn all_failures_are_collected() {
        let form = UploadForm {
            repo_type: "local".into(),
            ..UploadForm::default()
        };
        let fields: Vec<_> = form.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "local_path"]);
    }

    #[test]
    fn zip_needs_exactly_one_zip_archive() {
        let zip = |name: &str| ZipUpload { file_name: name.into(), bytes: vec![1] };
        let mut form = UploadForm {
            repo_type: "zip".into(),
            name: "demo".into(),
            ..UploadForm::default()
        };
        assert_eq!(form.validate().len(), 1);
        form.zip_files = vec![zip("code.tar.gz")];
        assert_eq!(form.validate().len(), 1);
        form.zip_files = vec![zip("a.zip"), zip("b.zip")];
        assert_eq!(form.validate().len(), 1);
        form.zip_files = vec![zip("Project.ZIP")];
        assert_eq!(form.validate().len(), 1);
        form.zip_files = vec![zip("project.zip")];
        assert!(form.validate().is_empty());
    }

    #[test]
    fn exactly_one_group_is_visible() {
        let mut view = UploadFormView::new(&UploadForm::default());
        let visible = |view: &UploadFormView| -> Vec<String> {
            view.root()
                .find_all(&|e| e.attr("data-source-group").is_some() && !e.has_class("hidden"))
                .iter()
                .filter_map(|e| e.attr("data-source-group").map(str::to_string))
                .collect()
        };
        assert_eq!(visible(&view), vec!["github"]);
        view.toggle_source(SourceType::Local);
        assert_eq!(visible(&view), vec!["local"]);
    }

    #[test]
    fn annotations_replace_previous_ones() {
        let form = github_form("nope");
        let mut view = UploadFormView::new(&form);
        view.annotate(&form.validate());
        view.annotate(&form.validate());

        let messages = view.root().find_by_class("field-error");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text_content(), "Please enter a valid GitHub URL");
        assert_eq!(view.root().find_by_class("input-invalid").len(), 1);

        view.annotate(&[]);
        assert!(view.root().find_by_class("field-error").is_empty());
        assert!(view.root().find_by_class("input-invalid").is_empty());
    }

    #[test]
    fn requests_only_carry_the_selected_source() {
        let mut form = github_form("https://github.com/a/b");
        form.local_path = "/tmp/x".into();
        let request = form.to_request();
        assert_eq!(request.github_url.as_deref(), Some("https://github.com/a/b"));
        assert!(request.local_path.is_none());
        assert!(request.github_branch.is_none());
    }
}
