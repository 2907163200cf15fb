//! Interfaces de los servicios externos (OCR, análisis, traducción, síntesis)
//! y composición de la etapa de extracción.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{ExtractionError, PipelineError, PipelineResult};
use crate::models::{Document, DocumentType, ExtractedMetadata, Extraction, FieldKind, Language};

/// Convierte un documento en texto plano.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, doc: &Document) -> Result<String, ExtractionError>;
}

/// Produce los metadatos estructurados a partir del texto.
#[async_trait]
pub trait MetadataAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        hint: Option<DocumentType>,
    ) -> Result<ExtractedMetadata, ExtractionError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target: &Language,
        field: FieldKind,
    ) -> anyhow::Result<String>;
}

/// Genera una variante sintética de un documento.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<String>;
}

/// Contrato completo de extracción: documento + pista de categoría.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, doc: &Document) -> PipelineResult<Extraction>;
}

/// Extracción en dos pasos: reconocimiento de texto y análisis.
pub struct StagedExtractor<R, A> {
    recognizer: R,
    analyzer: A,
    type_from_folder: bool,
}

impl<R: TextRecognizer, A: MetadataAnalyzer> StagedExtractor<R, A> {
    pub fn new(recognizer: R, analyzer: A) -> Self {
        Self {
            recognizer,
            analyzer,
            type_from_folder: false,
        }
    }

    /// Con la carpeta como fuente de verdad del tipo (contenido ya clasificado).
    pub fn with_type_from_folder(mut self, enabled: bool) -> Self {
        self.type_from_folder = enabled;
        self
    }
}

#[async_trait]
impl<R: TextRecognizer, A: MetadataAnalyzer> Extractor for StagedExtractor<R, A> {
    async fn extract(&self, doc: &Document) -> PipelineResult<Extraction> {
        let raw_text = self.recognizer.recognize(doc).await?;
        if raw_text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }

        let hint = doc.type_hint();
        let mut metadata = self.analyzer.analyze(&raw_text, hint).await?;

        if self.type_from_folder {
            if let Some(folder_type) = hint {
                if folder_type != metadata.doc_type {
                    debug!(
                        "{}: tipo '{}' sustituido por el de la carpeta '{}'",
                        doc.key(),
                        metadata.doc_type,
                        folder_type
                    );
                }
                metadata.doc_type = folder_type;
            }
        }

        Ok(Extraction { raw_text, metadata })
    }
}
