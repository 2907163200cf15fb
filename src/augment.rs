//! Generación de variantes sintéticas equilibrada por categoría.
//!
//! Cada categoría se lleva hacia el mismo objetivo de ejemplos: los ficheros
//! aún no procesados reciben una cuota de variantes (ver `quota`), se copia el
//! original y se escriben `{stem}_synth_{i}.txt`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{error, info, warn};

use crate::capabilities::Synthesizer;
use crate::config::AugmentConfig;
use crate::errors::{ExtractionError, PipelineError, PipelineResult};
use crate::history::HistoryStore;
use crate::models::Document;
use crate::pipeline::call_with_budget;
use crate::quota::{self, QuotaPlan};
use crate::scanner::{self, CategoryMap, InputFilter};

/// Plan de una categoría para esta ejecución.
#[derive(Debug, Clone)]
pub struct CategoryPlan {
    pub category: String,
    pub pending: Vec<Document>,
    pub already_done: usize,
    pub plan: QuotaPlan<String>,
}

impl CategoryPlan {
    pub fn quota_for(&self, doc: &Document) -> usize {
        self.plan.quota(&doc.relative)
    }
}

/// Calcula el objetivo efectivo y el reparto de cada categoría. El objetivo
/// se deriva del tamaño total de las categorías; el reparto sólo cubre los
/// ficheros pendientes.
pub fn build_plans<H, R>(
    categories: &CategoryMap,
    history: &H,
    config: &AugmentConfig,
    rng: &mut R,
) -> (usize, Vec<CategoryPlan>)
where
    H: HistoryStore,
    R: Rng + ?Sized,
{
    let largest = categories.values().map(Vec::len).max().unwrap_or(0);
    let target = quota::effective_target(
        config.target_per_category,
        largest,
        config.min_variants_per_file,
    );

    let plans = categories
        .iter()
        .map(|(category, docs)| {
            let pending: Vec<Document> = docs
                .iter()
                .filter(|d| !history.is_done(d.key()))
                .cloned()
                .collect();
            let keys: Vec<String> = pending.iter().map(|d| d.relative.clone()).collect();
            let plan = quota::allocate(&keys, config.min_variants_per_file, target, &mut *rng);
            CategoryPlan {
                category: category.clone(),
                already_done: docs.len() - pending.len(),
                pending,
                plan,
            }
        })
        .collect();
    (target, plans)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AugmentSummary {
    pub categories: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub variants_written: usize,
    pub variants_failed: usize,
    pub cancelled: bool,
}

impl fmt::Display for AugmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: {} categorías, {} ficheros procesados ({} con error), {} variantes generadas, {} fallidas.",
            self.categories,
            self.files_processed,
            self.files_failed,
            self.variants_written,
            self.variants_failed
        )?;
        if self.cancelled {
            write!(f, " (interrumpido)")?;
        }
        Ok(())
    }
}

pub struct Augmenter<S, H, R> {
    config: AugmentConfig,
    synthesizer: S,
    history: H,
    rng: R,
    cancel: Arc<AtomicBool>,
}

impl<S, H, R> Augmenter<S, H, R>
where
    S: Synthesizer,
    H: HistoryStore,
    R: Rng,
{
    pub fn new(config: AugmentConfig, synthesizer: S, history: H, rng: R) -> Self {
        Self {
            config,
            synthesizer,
            history,
            rng,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub async fn run(&mut self) -> PipelineResult<AugmentSummary> {
        info!("🔍 Analizando estructura e historial...");
        let categories = scanner::scan_categories(&self.config.input_dir, InputFilter::Text)?;
        let (target, plans) =
            build_plans(&categories, &self.history, &self.config, &mut self.rng);
        info!("🎯 Objetivo por categoría: {target} ejemplos.");

        let mut summary = AugmentSummary {
            categories: plans.len(),
            ..AugmentSummary::default()
        };

        'categories: for plan in &plans {
            if plan.pending.is_empty() {
                info!("✅ Categoría [{}] ya procesada por completo.", plan.category);
                continue;
            }
            info!(
                "📂 Categoría [{}]: {} ficheros nuevos, {} variantes previstas.",
                plan.category,
                plan.pending.len(),
                plan.plan.total_variants()
            );

            for doc in &plan.pending {
                if self.cancel.load(Ordering::SeqCst) {
                    warn!("🛑 Detenido por el usuario. Progreso guardado.");
                    summary.cancelled = true;
                    break 'categories;
                }
                match self.augment_file(doc, plan.quota_for(doc)).await {
                    Ok((written, failed)) => {
                        summary.files_processed += 1;
                        summary.variants_written += written;
                        summary.variants_failed += failed;
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        error!("❌ {}: {err}", doc.key());
                        summary.files_failed += 1;
                    }
                }
            }
        }

        info!("✅ {summary}");
        Ok(summary)
    }

    /// Copia el original y genera sus variantes; registra el fichero en el
    /// historial al terminar. Devuelve (variantes escritas, fallidas).
    async fn augment_file(
        &mut self,
        doc: &Document,
        quota: usize,
    ) -> PipelineResult<(usize, usize)> {
        let original = fs::read_to_string(&doc.path).map_err(|e| {
            ExtractionError::UnreadableInput {
                path: doc.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let target_dir = self.config.output_dir.join(&doc.category);
        let file_name = doc
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| doc.relative.clone());
        write_text(&target_dir.join(file_name), &original)?;

        info!("📄 {} ({} variantes)", doc.key(), quota);
        let stem = doc
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let (mut written, mut failed) = (0, 0);
        for i in 1..=quota {
            let synthesizer = &self.synthesizer;
            let source = original.as_str();
            let variant = call_with_budget(
                self.config.call_timeout,
                self.config.call_retries,
                "síntesis",
                move || async move {
                    synthesizer.synthesize(source).await.map_err(|e| {
                        PipelineError::Extraction(ExtractionError::Capability {
                            capability: "llm",
                            reason: e.to_string(),
                        })
                    })
                },
            )
            .await;

            match variant {
                Ok(text) => {
                    write_text(&target_dir.join(synthetic_name(&stem, i)), &text)?;
                    written += 1;
                }
                Err(err) => {
                    warn!("Variante {i} de {} fallida: {err}", doc.key());
                    failed += 1;
                }
            }
        }

        self.history.mark_done(doc.key())?;
        Ok((written, failed))
    }
}

pub fn synthetic_name(stem: &str, index: usize) -> String {
    format!("{stem}_synth_{index}.txt")
}

fn write_text(path: &Path, content: &str) -> PipelineResult<PathBuf> {
    let err = |source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(err)?;
    }
    fs::write(path, content).map_err(err)?;
    Ok(path.to_path_buf())
}
