//! Escritura del árbol de salida espejado.
//!
//! `{salida}/{raíz}/[{idioma}/]{directorio relativo}/{nombre}.txt`

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::{PipelineError, PipelineResult};
use crate::models::RootKind;

/// Destino de los artefactos de un documento.
pub trait ArtifactSink {
    fn write(
        &mut self,
        root: RootKind,
        language: Option<&str>,
        relative_dir: &Path,
        file_name: &str,
        content: &str,
    ) -> PipelineResult<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct MirroredWriter {
    base: PathBuf,
    /// Rutas escritas por esta instancia (una ejecución).
    written: HashSet<PathBuf>,
    collisions: usize,
}

impl MirroredWriter {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            written: HashSet::new(),
            collisions: 0,
        }
    }

    /// Escrituras que pisaron un fichero ya escrito en esta ejecución, p. ej.
    /// `a.png` y `a.pdf` en la misma carpeta comparten `a.txt`.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Ruta final de un artefacto, sin tocar el disco.
    pub fn target_path(
        &self,
        root: RootKind,
        language: Option<&str>,
        relative_dir: &Path,
        file_name: &str,
    ) -> PathBuf {
        let mut path = self.base.join(root.dir_name());
        if let Some(code) = language.filter(|_| root.is_localized()) {
            path.push(code);
        }
        path.push(relative_dir);
        path.push(file_name);
        path
    }
}

impl ArtifactSink for MirroredWriter {
    /// Crea los directorios intermedios y sobrescribe el fichero si existe.
    fn write(
        &mut self,
        root: RootKind,
        language: Option<&str>,
        relative_dir: &Path,
        file_name: &str,
        content: &str,
    ) -> PipelineResult<PathBuf> {
        let path = self.target_path(root, language, relative_dir, file_name);
        let err = |source| PipelineError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(err)?;
        }
        fs::write(&path, content.as_bytes()).map_err(err)?;
        if !self.written.insert(path.clone()) {
            self.collisions += 1;
            warn!("⚠️ {} ya se escribió en esta ejecución; se sobrescribe.", path.display());
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_and_localized_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MirroredWriter::new(dir.path());
        let rel = Path::new("invoice/2023");

        let info = writer
            .write(RootKind::Info, None, rel, "f.txt", "PIT-11")
            .unwrap();
        assert_eq!(info, dir.path().join("info/invoice/2023/f.txt"));

        let title = writer
            .write(RootKind::Titles, Some("de"), rel, "f.txt", "Rechnung")
            .unwrap();
        assert_eq!(title, dir.path().join("titles/de/invoice/2023/f.txt"));
        assert_eq!(fs::read_to_string(title).unwrap(), "Rechnung");
    }

    #[test]
    fn rewriting_overwrites_identically() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MirroredWriter::new(dir.path());
        let rel = Path::new("receipt");

        writer.write(RootKind::Content, None, rel, "r.txt", "partial").unwrap();
        let path = writer.write(RootKind::Content, None, rel, "r.txt", "full text").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "full text");
    }

    #[test]
    fn same_stem_in_one_folder_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MirroredWriter::new(dir.path());
        let rel = Path::new("invoice");

        writer.write(RootKind::Info, None, rel, "a.txt", "from a.png").unwrap();
        writer.write(RootKind::Titles, Some("pl"), rel, "a.txt", "Faktura").unwrap();
        assert_eq!(writer.collisions(), 0);

        writer.write(RootKind::Info, None, rel, "a.txt", "from a.pdf").unwrap();
        assert_eq!(writer.collisions(), 1);
    }

    #[test]
    fn blocked_directory_is_a_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("category"), "not a dir").unwrap();
        let mut writer = MirroredWriter::new(dir.path());

        let err = writer
            .write(RootKind::Category, None, Path::new("x"), "a.txt", "legal")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Write { .. }));
    }
}
