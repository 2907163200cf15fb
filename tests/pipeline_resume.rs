//! Ejecuciones completas del pipeline con servicios simulados: reanudación,
//! escritura antes del registro y traducciones degradadas.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scan_dataset_builder::{
    capabilities::{Extractor, Translator},
    config::{parse_languages, EmptyTextPolicy, PipelineConfig},
    errors::{ExtractionError, PipelineError, PipelineResult},
    history::{FileHistory, HistoryStore},
    models::{
        Document, DocumentCategory, DocumentType, ExtractedMetadata, Extraction, FieldKind,
        Language, RootKind,
    },
    output::{ArtifactSink, MirroredWriter},
    pipeline::{DocumentState, Pipeline, TRANSLATION_FAILED},
    scanner::InputFilter,
};

#[derive(Clone, Default)]
struct FakeExtractor {
    calls: Arc<Mutex<Vec<String>>>,
    empty: Arc<HashSet<String>>,
    failing: Arc<HashSet<String>>,
    /// Activa la bandera de parada tras N extracciones.
    stop_after: Option<(usize, Arc<AtomicBool>)>,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, doc: &Document) -> PipelineResult<Extraction> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(doc.key().to_string());
            calls.len()
        };
        if let Some((limit, flag)) = &self.stop_after {
            if n >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.empty.contains(doc.key()) {
            return Err(PipelineError::EmptyExtraction);
        }
        if self.failing.contains(doc.key()) {
            return Err(ExtractionError::InvalidResponse {
                reason: "not json".into(),
            }
            .into());
        }
        Ok(Extraction {
            raw_text: format!("OCR of {}", doc.key()),
            metadata: ExtractedMetadata {
                title_base: format!("Invoice - {} - 2024", doc.artifact_name()),
                summary_base: "An invoice issued by ACME.".into(),
                category: DocumentCategory::Financial,
                doc_type: doc.type_hint().unwrap_or(DocumentType::Other),
                info: "FV/1/2024".into(),
            },
        })
    }
}

#[derive(Clone, Default)]
struct FakeTranslator {
    calls: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<(String, FieldKind)>>>,
    broken_language: Option<String>,
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(
        &self,
        text: &str,
        target: &Language,
        field: FieldKind,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push((target.code.clone(), field));
        if self.broken_language.as_deref() == Some(target.code.as_str()) {
            anyhow::bail!("model unavailable for {}", target.name);
        }
        Ok(format!("[{}] {text}", target.code))
    }
}

/// Anota, en su primera llamada, qué raíces canónicas existen ya en disco y
/// si el historial sigue vacío.
struct InspectingTranslator {
    out: PathBuf,
    history_file: PathBuf,
    first_call: Arc<Mutex<Option<(Vec<bool>, String)>>>,
}

#[async_trait]
impl Translator for InspectingTranslator {
    async fn translate(
        &self,
        text: &str,
        target: &Language,
        _field: FieldKind,
    ) -> anyhow::Result<String> {
        let mut first = self.first_call.lock().unwrap();
        if first.is_none() {
            let roots = ["content", "category", "type", "info"]
                .iter()
                .map(|root| self.out.join(root).join("invoice/a.txt").is_file())
                .collect();
            let history = fs::read_to_string(&self.history_file).unwrap_or_default();
            *first = Some((roots, history));
        }
        Ok(format!("[{}] {text}", target.code))
    }
}

/// Escritor real que falla en la escritura número `fail_at` (1-based) de
/// una clave concreta.
struct FlakySink {
    inner: MirroredWriter,
    fail_key_dir: Option<PathBuf>,
    fail_at: usize,
    seen: usize,
    writes: Vec<PathBuf>,
}

impl FlakySink {
    fn new(base: &Path) -> Self {
        Self {
            inner: MirroredWriter::new(base),
            fail_key_dir: None,
            fail_at: 0,
            seen: 0,
            writes: Vec::new(),
        }
    }

    fn failing(base: &Path, relative_dir: &str, fail_at: usize) -> Self {
        Self {
            fail_key_dir: Some(PathBuf::from(relative_dir)),
            fail_at,
            ..Self::new(base)
        }
    }
}

impl ArtifactSink for FlakySink {
    fn write(
        &mut self,
        root: RootKind,
        language: Option<&str>,
        relative_dir: &Path,
        file_name: &str,
        content: &str,
    ) -> PipelineResult<PathBuf> {
        if self.fail_key_dir.as_deref() == Some(relative_dir) {
            self.seen += 1;
            if self.seen == self.fail_at {
                return Err(PipelineError::Write {
                    path: relative_dir.join(file_name),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
        }
        let path = self.inner.write(root, language, relative_dir, file_name, content)?;
        self.writes.push(path.clone());
        Ok(path)
    }
}

fn scans(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join("scans").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"\x89PNG fake").unwrap();
    }
}

fn config(root: &Path, languages: &str) -> PipelineConfig {
    PipelineConfig {
        input_dir: root.join("scans"),
        output_dir: root.join("out"),
        history_file: root.join("history.txt"),
        input_filter: InputFilter::Scans,
        languages: parse_languages(languages).unwrap(),
        canonical_language: "en".into(),
        call_timeout: Duration::from_secs(5),
        call_retries: 0,
        empty_text_policy: EmptyTextPolicy::MarkDone,
        type_from_folder: false,
    }
}

#[tokio::test]
async fn interrupted_run_resumes_without_repeating_work() {
    let dir = tempfile::tempdir().unwrap();
    scans(
        dir.path(),
        &["invoice/a.png", "invoice/b.jpg", "receipt/c.png", "receipt/d.pdf"],
    );
    let cfg = config(dir.path(), "en:English,pl:Polish");

    let stop = Arc::new(AtomicBool::new(false));
    let first_extractor = FakeExtractor {
        stop_after: Some((2, stop.clone())),
        ..FakeExtractor::default()
    };
    let first_calls = first_extractor.calls.clone();
    let mut first = Pipeline::new(
        cfg.clone(),
        first_extractor,
        FakeTranslator::default(),
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    )
    .with_cancel_flag(stop);

    let summary = first.run().await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.files_completed, 2);
    assert_eq!(first_calls.lock().unwrap().len(), 2);
    drop(first);

    let second_extractor = FakeExtractor::default();
    let second_calls = second_extractor.calls.clone();
    let translator = FakeTranslator::default();
    let translations = translator.calls.clone();
    let mut second = Pipeline::new(
        cfg.clone(),
        second_extractor,
        translator,
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );

    let summary = second.run().await.unwrap();
    assert_eq!(summary.files_skipped, 2);
    assert_eq!(summary.files_completed, 2);
    assert_eq!(
        second_calls.lock().unwrap().as_slice(),
        &["receipt/c.png".to_string(), "receipt/d.pdf".to_string()]
    );
    // Un idioma traducido × dos campos × dos documentos nuevos.
    assert_eq!(translations.load(Ordering::SeqCst), 4);

    let history = fs::read_to_string(&cfg.history_file).unwrap();
    assert_eq!(
        history.lines().collect::<Vec<_>>(),
        vec!["invoice/a.png", "invoice/b.jpg", "receipt/c.png", "receipt/d.pdf"]
    );
}

#[tokio::test]
async fn write_failure_leaves_document_pending_and_retries_every_root() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["invoice/a.png"]);
    // 4 raíces canónicas + título + resumen en un solo idioma = 6 escrituras.
    let cfg = config(dir.path(), "en:English");

    let mut failing = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        FakeTranslator::default(),
        FlakySink::failing(&cfg.output_dir, "invoice", 3),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let summary = failing.run().await.unwrap();
    assert_eq!(summary.write_failures, 1);
    assert_eq!(failing.sink().writes.len(), 2);
    assert!(!failing.history().is_done("invoice/a.png"));
    assert!(failing
        .events()
        .iter()
        .any(|e| e.to == DocumentState::WriteFailed));
    drop(failing);
    assert_eq!(fs::read_to_string(&cfg.history_file).unwrap(), "");

    let mut retry = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        FakeTranslator::default(),
        FlakySink::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let summary = retry.run().await.unwrap();
    assert_eq!(summary.files_completed, 1);
    assert_eq!(retry.sink().writes.len(), 6);
    assert!(retry.history().is_done("invoice/a.png"));

    let out = &cfg.output_dir;
    for rel in [
        "content/invoice/a.txt",
        "category/invoice/a.txt",
        "type/invoice/a.txt",
        "info/invoice/a.txt",
        "titles/en/invoice/a.txt",
        "summary/en/invoice/a.txt",
    ] {
        assert!(out.join(rel).is_file(), "falta {rel}");
    }
    assert_eq!(fs::read_to_string(out.join("type/invoice/a.txt")).unwrap(), "invoice");
    assert_eq!(fs::read_to_string(out.join("category/invoice/a.txt")).unwrap(), "financial");
}

#[tokio::test]
async fn canonical_language_bypasses_the_translator() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["pit11/scan.jpg"]);
    let cfg = config(dir.path(), "pl:Polish,en:English,de:German");

    let translator = FakeTranslator::default();
    let requested = translator.requested.clone();
    let mut pipeline = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        translator,
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    pipeline.run().await.unwrap();

    let out = &cfg.output_dir;
    assert_eq!(
        fs::read_to_string(out.join("titles/en/pit11/scan.txt")).unwrap(),
        "Invoice - scan.txt - 2024"
    );
    assert_eq!(
        fs::read_to_string(out.join("summary/en/pit11/scan.txt")).unwrap(),
        "An invoice issued by ACME."
    );
    assert_eq!(
        fs::read_to_string(out.join("titles/de/pit11/scan.txt")).unwrap(),
        "[de] Invoice - scan.txt - 2024"
    );
    assert_eq!(fs::read_to_string(out.join("type/pit11/scan.txt")).unwrap(), "taxDocument");
    assert!(requested.lock().unwrap().iter().all(|(code, _)| code != "en"));
    assert_eq!(requested.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn one_failing_language_degrades_only_itself() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["invoice/a.png"]);
    let cfg = config(dir.path(), "pl:Polish,en:English,de:German,fr:French");

    let translator = FakeTranslator {
        broken_language: Some("de".into()),
        ..FakeTranslator::default()
    };
    let mut pipeline = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        translator,
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.files_completed, 1);
    assert_eq!(summary.degraded_translations, 2);
    assert!(pipeline.history().is_done("invoice/a.png"));

    let out = &cfg.output_dir;
    for root in ["titles", "summary"] {
        assert_eq!(
            fs::read_to_string(out.join(format!("{root}/de/invoice/a.txt"))).unwrap(),
            TRANSLATION_FAILED
        );
        for code in ["pl", "fr"] {
            let path = out.join(format!("{root}/{code}/invoice/a.txt"));
            let text = fs::read_to_string(path).unwrap();
            assert!(text.starts_with(&format!("[{code}] ")));
        }
    }
}

#[tokio::test]
async fn empty_and_failed_extractions_follow_policy() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["invoice/blank.png", "invoice/broken.png", "invoice/ok.png"]);
    let extractor = FakeExtractor {
        empty: Arc::new(HashSet::from(["invoice/blank.png".to_string()])),
        failing: Arc::new(HashSet::from(["invoice/broken.png".to_string()])),
        ..FakeExtractor::default()
    };

    let cfg = config(dir.path(), "en:English");
    let mut pipeline = Pipeline::new(
        cfg.clone(),
        extractor.clone(),
        FakeTranslator::default(),
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let summary = pipeline.run().await.unwrap();
    assert_eq!(
        (summary.files_empty, summary.extract_failures, summary.files_completed),
        (1, 1, 1)
    );
    let history = pipeline.history();
    assert!(history.is_done("invoice/blank.png"));
    assert!(!history.is_done("invoice/broken.png"));
    assert!(!cfg.output_dir.join("content/invoice/blank.txt").exists());
    assert!(!cfg.output_dir.join("content/invoice/broken.txt").exists());

    let retry_cfg = PipelineConfig {
        empty_text_policy: EmptyTextPolicy::Retry,
        history_file: dir.path().join("history-retry.txt"),
        ..cfg
    };
    let mut retrying = Pipeline::new(
        retry_cfg,
        extractor,
        FakeTranslator::default(),
        MirroredWriter::new(&dir.path().join("out")),
        FileHistory::open(&dir.path().join("history-retry.txt")).unwrap(),
    );
    retrying.run().await.unwrap();
    assert!(!retrying.history().is_done("invoice/blank.png"));
    assert!(retrying.history().is_done("invoice/ok.png"));
}

#[tokio::test]
async fn missing_input_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "en:English");
    let mut pipeline = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        FakeTranslator::default(),
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::InputNotFound(_)));
}

#[tokio::test]
async fn canonical_roots_exist_before_any_translation() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["invoice/a.png"]);
    let cfg = config(dir.path(), "en:English,de:German");

    let first_call = Arc::new(Mutex::new(None));
    let translator = InspectingTranslator {
        out: cfg.output_dir.clone(),
        history_file: cfg.history_file.clone(),
        first_call: first_call.clone(),
    };
    let mut pipeline = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        translator,
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    pipeline.run().await.unwrap();

    let (roots, history) = first_call.lock().unwrap().take().unwrap();
    assert_eq!(roots, vec![true; 4]);
    assert_eq!(history, "");
    assert!(pipeline.history().is_done("invoice/a.png"));

    let states: Vec<_> = pipeline.events().iter().map(|e| e.to).collect();
    let written = states.iter().position(|s| *s == DocumentState::Written).unwrap();
    let translating = states
        .iter()
        .position(|s| *s == DocumentState::Translating)
        .unwrap();
    assert!(written < translating);
}

#[tokio::test]
async fn same_stem_documents_are_reported_as_collisions() {
    let dir = tempfile::tempdir().unwrap();
    scans(dir.path(), &["invoice/a.pdf", "invoice/a.png"]);
    let cfg = config(dir.path(), "en:English");

    let mut pipeline = Pipeline::new(
        cfg.clone(),
        FakeExtractor::default(),
        FakeTranslator::default(),
        MirroredWriter::new(&cfg.output_dir),
        FileHistory::open(&cfg.history_file).unwrap(),
    );
    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.files_completed, 2);
    // 4 raíces canónicas + título + resumen del segundo documento.
    assert_eq!(pipeline.sink().collisions(), 6);
}
