//! Componentes de la interfaz web. Cada uno es dueño de su contenedor raíz,
//! lo carga a partir de un `RepoApi` y degrada solo su propia zona si falla.

pub mod chat;
pub mod dom;
pub mod file;
pub mod form;
pub mod format;
pub mod repos;
pub mod tree;
