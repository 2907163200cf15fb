//! Driver del pipeline: escaneo → omitir si ya está hecho → extraer →
//! escribir → traducir → registrar en el historial.
//!
//! Los documentos se procesan de uno en uno. El registro en el historial es
//! siempre la última operación de un documento; si algo falla antes, el
//! documento se reintenta completo en la siguiente ejecución.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::capabilities::{Extractor, Translator};
use crate::config::{EmptyTextPolicy, PipelineConfig};
use crate::errors::{PipelineError, PipelineResult};
use crate::history::HistoryStore;
use crate::models::{Document, Extraction, FieldKind, RootKind};
use crate::output::ArtifactSink;
use crate::scanner;

/// Texto que sustituye a una traducción fallida.
pub const TRANSLATION_FAILED: &str = "Translation Error";

/// Estados de un documento dentro de una ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Pending,
    Extracting,
    ExtractFailed,
    Extracted,
    /// Raíces canónicas (contenido, categoría, tipo, info) escritas.
    Written,
    Translating,
    /// Todos los idiomas intentados y escritos (con o sin texto degradado).
    Translated,
    WriteFailed,
    Done,
}

#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub key: String,
    pub from: DocumentState,
    pub to: DocumentState,
    pub at: DateTime<Utc>,
}

/// Resultado final de un documento.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Ya estaba en el historial.
    Skipped,
    Completed { degraded: usize },
    /// OCR vacío; `recorded` indica si se anotó en el historial.
    Empty { recorded: bool },
    ExtractFailed,
    WriteFailed,
}

/// Resumen de los resultados de una ejecución.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub files_completed: usize,
    pub files_empty: usize,
    pub extract_failures: usize,
    pub write_failures: usize,
    pub degraded_translations: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Skipped => self.files_skipped += 1,
            DocumentOutcome::Completed { degraded } => {
                self.files_completed += 1;
                self.degraded_translations += degraded;
            }
            DocumentOutcome::Empty { .. } => self.files_empty += 1,
            DocumentOutcome::ExtractFailed => self.extract_failures += 1,
            DocumentOutcome::WriteFailed => self.write_failures += 1,
        }
    }
}

/// Implementa cómo se mostrará el resumen como texto.
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} completados, {} omitidos, {} vacíos, {} fallos de extracción, {} fallos de escritura, {} traducciones degradadas.",
            self.files_scanned,
            self.files_completed,
            self.files_skipped,
            self.files_empty,
            self.extract_failures,
            self.write_failures,
            self.degraded_translations
        )?;
        if self.cancelled {
            write!(f, " (interrumpido)")?;
        }
        Ok(())
    }
}

pub struct Pipeline<E, T, S, H> {
    config: PipelineConfig,
    extractor: E,
    translator: T,
    sink: S,
    history: H,
    cancel: Arc<AtomicBool>,
    events: Vec<DocumentEvent>,
}

impl<E, T, S, H> Pipeline<E, T, S, H>
where
    E: Extractor,
    T: Translator,
    S: ArtifactSink,
    H: HistoryStore,
{
    pub fn new(config: PipelineConfig, extractor: E, translator: T, sink: S, history: H) -> Self {
        Self {
            config,
            extractor,
            translator,
            sink,
            history,
            cancel: Arc::new(AtomicBool::new(false)),
            events: Vec::new(),
        }
    }

    /// Bandera compartida; al activarla el driver se detiene antes del
    /// siguiente documento.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn events(&self) -> &[DocumentEvent] {
        &self.events
    }

    /// Procesa todos los documentos pendientes del directorio de entrada.
    pub async fn run(&mut self) -> PipelineResult<RunSummary> {
        let documents = scanner::scan_recursive(&self.config.input_dir, self.config.input_filter)?;
        let total = documents.len();
        info!(
            "🚀 Encontrados {} ficheros en {} ({} ya en el historial).",
            total,
            self.config.input_dir.display(),
            self.history.len()
        );

        let mut summary = RunSummary {
            files_scanned: total,
            ..RunSummary::default()
        };

        for (index, doc) in documents.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("🛑 Detenido por el usuario. Progreso guardado.");
                summary.cancelled = true;
                break;
            }
            if !self.history.is_done(doc.key()) {
                info!("[{}/{}] Procesando: {}", index + 1, total, doc.key());
            }
            let outcome = self.process_document(doc).await?;
            summary.record(&outcome);
        }

        info!("✅ {summary}");
        Ok(summary)
    }

    /// Lleva un documento hasta `Done` o lo deja pendiente. Sólo devuelve
    /// error si la ejecución entera debe abortarse.
    pub async fn process_document(&mut self, doc: &Document) -> PipelineResult<DocumentOutcome> {
        let key = doc.key();
        if self.history.is_done(key) {
            debug!("Omitido (ya en el historial): {key}");
            self.transition(key, DocumentState::Pending, DocumentState::Done);
            return Ok(DocumentOutcome::Skipped);
        }

        self.transition(key, DocumentState::Pending, DocumentState::Extracting);
        let extractor = &self.extractor;
        let extracted = call_with_budget(
            self.config.call_timeout,
            self.config.call_retries,
            "extracción",
            move || extractor.extract(doc),
        )
        .await;

        let extraction = match extracted {
            Ok(extraction) => extraction,
            Err(PipelineError::EmptyExtraction) => return self.handle_empty(doc),
            Err(err) => {
                error!("❌ Fallo de extracción en {key}: {err}");
                self.transition(key, DocumentState::Extracting, DocumentState::ExtractFailed);
                return Ok(DocumentOutcome::ExtractFailed);
            }
        };
        self.transition(key, DocumentState::Extracting, DocumentState::Extracted);

        if let Err(err) = self.write_canonical(doc, &extraction) {
            return self.write_failed(key, DocumentState::Extracted, err);
        }
        self.transition(key, DocumentState::Extracted, DocumentState::Written);

        self.transition(key, DocumentState::Written, DocumentState::Translating);
        let degraded = match self.write_translations(doc, &extraction).await {
            Ok(degraded) => degraded,
            Err(err) => return self.write_failed(key, DocumentState::Translating, err),
        };
        self.transition(key, DocumentState::Translating, DocumentState::Translated);

        self.history.mark_done(key)?;
        self.transition(key, DocumentState::Translated, DocumentState::Done);
        info!("✅ Terminado: {key}");
        Ok(DocumentOutcome::Completed { degraded })
    }

    fn handle_empty(&mut self, doc: &Document) -> PipelineResult<DocumentOutcome> {
        let key = doc.key();
        match self.config.empty_text_policy {
            EmptyTextPolicy::MarkDone => {
                warn!("⚠️ OCR vacío en {key}: se marca como procesado (sin resultados).");
                self.history.mark_done(key)?;
                self.transition(key, DocumentState::Extracting, DocumentState::Done);
                Ok(DocumentOutcome::Empty { recorded: true })
            }
            EmptyTextPolicy::Retry => {
                warn!("⚠️ OCR vacío en {key}: se reintentará en la próxima ejecución.");
                self.transition(key, DocumentState::Extracting, DocumentState::ExtractFailed);
                Ok(DocumentOutcome::Empty { recorded: false })
            }
        }
    }

    fn write_failed(
        &mut self,
        key: &str,
        from: DocumentState,
        err: PipelineError,
    ) -> PipelineResult<DocumentOutcome> {
        error!("❌ Error de escritura en {key}: {err}");
        self.transition(key, from, DocumentState::WriteFailed);
        Ok(DocumentOutcome::WriteFailed)
    }

    fn write_canonical(&mut self, doc: &Document, extraction: &Extraction) -> PipelineResult<()> {
        let rel_dir = doc.relative_dir();
        let name = doc.artifact_name();
        let meta = &extraction.metadata;

        for root in RootKind::CANONICAL {
            let content = match root {
                RootKind::Content => extraction.raw_text.as_str(),
                RootKind::Category => meta.category.as_str(),
                RootKind::Type => meta.doc_type.id(),
                RootKind::Info => meta.info.as_str(),
                RootKind::Titles | RootKind::Summary => continue,
            };
            self.sink.write(root, None, &rel_dir, &name, content)?;
        }
        Ok(())
    }

    /// Escribe título y resumen en cada idioma. Devuelve cuántos pares
    /// (idioma, campo) quedaron con el texto de sustitución.
    async fn write_translations(
        &mut self,
        doc: &Document,
        extraction: &Extraction,
    ) -> PipelineResult<usize> {
        let rel_dir = doc.relative_dir();
        let name = doc.artifact_name();
        let mut degraded = 0;

        for language in self.config.languages.clone() {
            for field in [FieldKind::Title, FieldKind::Summary] {
                let base = extraction.metadata.base_text(field);
                let text = if language.code == self.config.canonical_language {
                    base.to_string()
                } else {
                    let translator = &self.translator;
                    let lang = &language;
                    let translated = call_with_budget(
                        self.config.call_timeout,
                        self.config.call_retries,
                        "traducción",
                        move || async move {
                            translator.translate(base, lang, field).await.map_err(|e| {
                                PipelineError::Translation {
                                    language: lang.code.clone(),
                                    field,
                                    reason: e.to_string(),
                                }
                            })
                        },
                    )
                    .await;
                    match translated {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("{}: {err}", doc.key());
                            degraded += 1;
                            TRANSLATION_FAILED.to_string()
                        }
                    }
                };
                self.sink
                    .write(field.root(), Some(&language.code), &rel_dir, &name, &text)?;
            }
            debug!("{}: idioma [{}] listo", doc.key(), language.code.to_uppercase());
        }
        Ok(degraded)
    }

    fn transition(&mut self, key: &str, from: DocumentState, to: DocumentState) {
        debug!("{key}: {from:?} -> {to:?}");
        self.events.push(DocumentEvent {
            key: key.to_string(),
            from,
            to,
            at: Utc::now(),
        });
    }
}

/// Ejecuta una llamada a un servicio externo con límite de tiempo y, si se
/// configura, reintentos. Un texto vacío no se reintenta.
pub async fn call_with_budget<T, F, Fut>(
    timeout: Duration,
    retries: u32,
    operation: &str,
    mut call: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                operation: operation.to_string(),
                secs: timeout.as_secs(),
            }),
        };
        match result {
            Err(err) if attempt < retries && !matches!(err, PipelineError::EmptyExtraction) => {
                attempt += 1;
                warn!("Reintentando {operation} ({attempt}/{retries}) tras: {err}");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: PipelineResult<()> =
            call_with_budget(Duration::from_millis(20), 0, "lenta", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Timeout { .. })));
    }

    #[tokio::test]
    async fn retries_stop_at_budget() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: PipelineResult<()> =
            call_with_budget(Duration::from_secs(1), 2, "falla", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Translation {
                    language: "de".into(),
                    field: FieldKind::Title,
                    reason: "boom".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_text_is_never_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: PipelineResult<()> =
            call_with_budget(Duration::from_secs(1), 3, "ocr", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::EmptyExtraction)
            })
            .await;
        assert!(matches!(result, Err(PipelineError::EmptyExtraction)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&DocumentOutcome::Completed { degraded: 2 });
        summary.record(&DocumentOutcome::Skipped);
        summary.record(&DocumentOutcome::Empty { recorded: true });
        summary.record(&DocumentOutcome::WriteFailed);
        assert_eq!(summary.files_completed, 1);
        assert_eq!(summary.degraded_translations, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_empty, 1);
        assert_eq!(summary.write_failures, 1);
        assert!(summary.to_string().starts_with("Resumen:"));
    }
}
