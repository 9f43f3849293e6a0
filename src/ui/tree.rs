//! Árbol de ficheros plegable.

use std::cmp::Ordering;

use tracing::{error, warn};
use url::form_urlencoded;

use crate::{
    client::RepoApi,
    contract::{self, FileNode},
    ui::dom::Element,
};

pub const COLLAPSED: &str = "collapsed";
pub const EMPTY_DIRECTORY: &str = "No files found";

/// Enlace a la vista de un fichero.
pub fn file_link(repo_id: &str, path: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("/repos/{repo_id}/file?path={encoded}")
}

fn rank(node: &FileNode) -> u8 {
    match node {
        FileNode::Directory { .. } => 0,
        FileNode::File { .. } => 1,
        FileNode::Malformed(_) => 2,
    }
}

/// Directorios primero; dentro de cada grupo, por nombre sin distinguir
/// mayúsculas y, a igualdad, distinguiéndolas.
fn compare(a: &FileNode, b: &FileNode) -> Ordering {
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
        .then_with(|| a.name().cmp(b.name()))
}

pub struct FileTree {
    repo_id: String,
    root: Element,
}

impl FileTree {
    pub fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            root: Element::new("div")
                .with_class("file-tree")
                .with_child(Element::new("p").with_class("loading").with_text("Loading file structure...")),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    pub async fn load(&mut self, api: &dyn RepoApi) {
        match api.structure(&self.repo_id).await {
            Ok(value) => self.render(&contract::structure(&value)),
            Err(e) => {
                error!("Error cargando la estructura de {}: {e}", self.repo_id);
                self.root.clear();
                self.root.push(
                    Element::new("p")
                        .with_class("error-message")
                        .with_text("Failed to load file structure."),
                );
            }
        }
    }

    pub fn render(&mut self, nodes: &[FileNode]) {
        self.root.clear();
        let level = self.render_level(nodes);
        self.root.push(level);
    }

    fn render_level(&self, nodes: &[FileNode]) -> Element {
        let mut list = Element::new("ul").with_class("tree-list");
        if nodes.is_empty() {
            list.push(Element::new("li").with_class("tree-empty").with_text(EMPTY_DIRECTORY));
            return list;
        }

        let mut sorted: Vec<&FileNode> = nodes.iter().collect();
        sorted.sort_by(|a, b| compare(a, b));

        for node in sorted {
            list.push(self.render_node(node));
        }
        list
    }

    fn render_node(&self, node: &FileNode) -> Element {
        match node {
            FileNode::Directory { name, path, children } => {
                let mut subtree = self.render_level(children);
                subtree.add_class("tree-children");
                subtree.set_attr("data-path", path.clone());
                Element::new("li")
                    .with_class("tree-directory")
                    .with_child(
                        Element::new("span")
                            .with_class("tree-toggle")
                            .with_attr("data-path", path.clone())
                            .with_text(name.clone()),
                    )
                    .with_child(subtree)
            }
            FileNode::File { name, path } => Element::new("li").with_class("tree-file").with_child(
                Element::new("a")
                    .with_attr("href", file_link(&self.repo_id, path))
                    .with_text(name.clone()),
            ),
            FileNode::Malformed(raw) => {
                warn!("Nodo del árbol sin tipo reconocible: {raw}");
                Element::new("li").with_class("tree-placeholder")
            }
        }
    }

    /// Pliega o despliega el subárbol de un directorio. Devuelve el estado
    /// resultante, o `None` si el directorio no existe.
    pub fn toggle(&mut self, dir_path: &str) -> Option<bool> {
        self.root
            .find_mut(&|el| el.has_class("tree-children") && el.attr("data-path") == Some(dir_path))
            .map(|subtree| subtree.toggle_class(COLLAPSED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubApi;
    use serde_json::json;

    fn tree_from(value: serde_json::Value) -> FileTree {
        let mut tree = FileTree::new("42");
        tree.render(&contract::structure(&value));
        tree
    }

    fn labels(el: &Element) -> Vec<String> {
        el.find_all(&|e| e.has_class("tree-toggle") || e.tag() == "a")
            .iter()
            .map(|e| e.text_content())
            .collect()
    }

    #[test]
    fn directories_come_before_files() {
        let tree = tree_from(json!({"children": [
            {"type": "file", "name": "b", "path": "b"},
            {"type": "directory", "name": "a", "path": "a", "children": [
                {"type": "file", "name": "z.py", "path": "a/z.py"}
            ]},
        ]}));
        assert_eq!(labels(tree.root()), vec!["a", "z.py", "b"]);
    }

    #[test]
    fn names_sort_case_insensitively_then_case_aware() {
        let tree = tree_from(json!({"children": [
            {"type": "file", "name": "b.py"},
            {"type": "file", "name": "B.py"},
            {"type": "file", "name": "a.py"},
        ]}));
        assert_eq!(labels(tree.root()), vec!["a.py", "B.py", "b.py"]);
    }

    #[test]
    fn file_links_are_url_encoded() {
        let tree = tree_from(json!({"children": [
            {"type": "file", "name": "my file.py", "path": "src/my file.py"}
        ]}));
        let links = tree.root().find_by_tag("a");
        assert_eq!(links[0].attr("href"), Some("/repos/42/file?path=src%2Fmy+file.py"));
        assert_eq!(file_link("42", "app.py"), "/repos/42/file?path=app.py");
    }

    #[test]
    fn empty_directories_show_a_placeholder() {
        let tree = tree_from(json!({"children": [
            {"type": "directory", "name": "docs", "path": "docs", "children": []}
        ]}));
        let empty = tree.root().find_by_class("tree-empty");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].text_content(), "No files found");
    }

    #[test]
    fn malformed_nodes_do_not_abort_the_render() {
        let tree = tree_from(json!({"children": [
            {"name": "broken"},
            {"type": "file", "name": "ok.py"},
        ]}));
        assert_eq!(tree.root().find_by_class("tree-placeholder").len(), 1);
        assert_eq!(labels(tree.root()), vec!["ok.py"]);
    }

    #[test]
    fn toggling_only_flips_the_css_flag() {
        let mut tree = tree_from(json!({"children": [
            {"type": "directory", "name": "src", "path": "src", "children": [
                {"type": "file", "name": "main.rs", "path": "src/main.rs"}
            ]}
        ]}));
        assert_eq!(tree.toggle("src"), Some(true));
        assert_eq!(tree.root().find_by_class(COLLAPSED).len(), 1);
        assert_eq!(labels(tree.root()), vec!["src", "main.rs"]);
        assert_eq!(tree.toggle("src"), Some(false));
        assert_eq!(tree.toggle("missing"), None);
    }

    #[tokio::test]
    async fn load_failures_stay_inside_the_widget() {
        let api = StubApi::new().failing("structure", 500, "boom");
        let mut tree = FileTree::new("42");
        tree.load(&api).await;
        assert_eq!(tree.root().text_content(), "Failed to load file structure.");
    }
}
