//! Descubrimiento de documentos de entrada.
//!
//! La categoría de un documento es el nombre de su carpeta contenedora. Se
//! ignoran ficheros y carpetas ocultos y las extensiones no admitidas.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::errors::{PipelineError, PipelineResult};
use crate::models::{Document, DocumentKind};

/// Tipos de fichero que acepta una pasada concreta del pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFilter {
    /// Imágenes y PDF escaneados.
    Scans,
    /// Contenido en texto plano (`.txt`).
    Text,
}

impl InputFilter {
    fn accepts(self, kind: DocumentKind) -> bool {
        match self {
            Self::Scans => matches!(kind, DocumentKind::Image | DocumentKind::Paged),
            Self::Text => kind == DocumentKind::Text,
        }
    }
}

/// Documentos agrupados por categoría, en orden estable.
pub type CategoryMap = BTreeMap<String, Vec<Document>>;

/// Agrupa los ficheros situados directamente dentro de cada subcarpeta de
/// `root`. Las categorías sin ficheros admitidos no aparecen.
pub fn scan_categories(root: &Path, filter: InputFilter) -> PipelineResult<CategoryMap> {
    ensure_root(root)?;

    let mut categories = CategoryMap::new();
    let walker = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker.filter_map(|e| e.ok()) {
        if let Some(doc) = to_document(root, &entry, filter) {
            categories.entry(doc.category.clone()).or_default().push(doc);
        }
    }
    Ok(categories)
}

/// Recorre `root` recursivamente y devuelve todos los documentos admitidos,
/// ordenados por ruta relativa.
pub fn scan_recursive(root: &Path, filter: InputFilter) -> PipelineResult<Vec<Document>> {
    ensure_root(root)?;

    let documents = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter_map(|entry| to_document(root, &entry, filter))
        .collect();
    Ok(documents)
}

fn ensure_root(root: &Path) -> PipelineResult<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::InputNotFound(root.to_path_buf()))
    }
}

fn to_document(root: &Path, entry: &DirEntry, filter: InputFilter) -> Option<Document> {
    if !entry.file_type().is_file() {
        return None;
    }
    let kind = DocumentKind::from_path(entry.path()).filter(|k| filter.accepts(*k));
    let Some(kind) = kind else {
        debug!("Saltando fichero no admitido: {}", entry.path().display());
        return None;
    };
    Document::new(root, entry.path(), kind)
}

fn is_hidden(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.depth() > 0
        && (name.starts_with('.')
            || name.starts_with('_')
            || name.eq_ignore_ascii_case("thumbs.db")
            || name.eq_ignore_ascii_case("desktop.ini"))
}
