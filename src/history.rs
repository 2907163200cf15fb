//! Historial de unidades completadas.
//!
//! Es un log de sólo-añadir con una ruta relativa por línea. Se carga una vez
//! en memoria al arrancar; cada `mark_done` añade la línea y sincroniza a
//! disco antes de volver.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{PipelineError, PipelineResult};

/// Registro durable de documentos terminados.
pub trait HistoryStore {
    fn is_done(&self, key: &str) -> bool;
    fn mark_done(&mut self, key: &str) -> PipelineResult<()>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Implementación sobre un fichero de texto UTF-8.
#[derive(Debug)]
pub struct FileHistory {
    path: PathBuf,
    done: HashSet<String>,
    file: File,
}

impl FileHistory {
    /// Abre (o crea) el log y carga sus entradas.
    pub fn open(path: &Path) -> PipelineResult<Self> {
        let err = |source| PipelineError::History {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(err)?;
        }

        let done = read_keys(path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(err)?;

        // Una línea final sin `\n` (corte a mitad de escritura) no debe pegarse
        // a la siguiente entrada.
        if needs_newline(path).map_err(err)? {
            warn!("Historial {} sin salto de línea final; se completa.", path.display());
            file.write_all(b"\n").map_err(err)?;
            file.sync_data().map_err(err)?;
        }

        info!("📂 Historial cargado: {} entradas en {}", done.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            done,
            file,
        })
    }
}

/// Lee las claves de un log sin crearlo ni modificarlo. Un fichero
/// inexistente equivale a un historial vacío. Cada línea es una clave
/// exacta: sólo se quita el fin de línea.
pub fn read_keys(path: &Path) -> PipelineResult<HashSet<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(source) => Err(PipelineError::History {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn needs_newline(path: &Path) -> std::io::Result<bool> {
    let bytes = fs::read(path)?;
    Ok(bytes.last().is_some_and(|b| *b != b'\n'))
}

impl HistoryStore for FileHistory {
    fn is_done(&self, key: &str) -> bool {
        self.done.contains(key)
    }

    fn mark_done(&mut self, key: &str) -> PipelineResult<()> {
        if key.contains('\n') || key.contains('\r') {
            return Err(PipelineError::History {
                path: self.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("clave con salto de línea: {key:?}"),
                ),
            });
        }
        if self.done.contains(key) {
            return Ok(());
        }

        let write = self
            .file
            .write_all(format!("{key}\n").as_bytes())
            .and_then(|_| self.file.sync_data());
        write.map_err(|source| PipelineError::History {
            path: self.path.clone(),
            source,
        })?;

        self.done.insert(key.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.done.len()
    }
}

/// Historial en memoria, útil para simulaciones (`plan`) y pruebas.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    pub done: HashSet<String>,
    /// Orden de las confirmaciones.
    pub log: Vec<String>,
}

impl MemoryHistory {
    /// Copia en memoria de un log existente; nada se escribe de vuelta.
    pub fn snapshot(path: &Path) -> PipelineResult<Self> {
        Ok(Self {
            done: read_keys(path)?,
            log: Vec::new(),
        })
    }
}

impl HistoryStore for MemoryHistory {
    fn is_done(&self, key: &str) -> bool {
        self.done.contains(key)
    }

    fn mark_done(&mut self, key: &str) -> PipelineResult<()> {
        if self.done.insert(key.to_string()) {
            self.log.push(key.to_string());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.done.len()
    }
}
