//! Taxonomía de errores del pipeline.
//!
//! Sólo `InputNotFound` y los fallos del historial abortan una ejecución; el
//! resto afecta a un único documento (o a un único par idioma/campo en el caso de traducciones).

use std::path::PathBuf;

use thiserror::Error;

use crate::models::FieldKind;

/// Fallos de la etapa de extracción (OCR + análisis estructurado).
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no se pudo leer el documento {path}: {reason}")]
    UnreadableInput { path: PathBuf, reason: String },

    #[error("fallo del servicio de {capability}: {reason}")]
    Capability {
        capability: &'static str,
        reason: String,
    },

    #[error("respuesta estructurada inválida: {reason}")]
    InvalidResponse { reason: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no existe el directorio de entrada: {0}")]
    InputNotFound(PathBuf),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("la extracción no produjo texto")]
    EmptyExtraction,

    #[error("traducción de {field} a '{language}' fallida: {reason}")]
    Translation {
        language: String,
        field: FieldKind,
        reason: String,
    },

    #[error("no se pudo escribir {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error en el historial {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{operation}' superó el límite de {secs}s")]
    Timeout { operation: String, secs: u64 },
}

impl PipelineError {
    /// Errores que deben detener la ejecución entera en lugar de pasar al
    /// siguiente documento.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InputNotFound(_) | Self::History { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
