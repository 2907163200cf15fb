//! Carga y gestión de configuración del pipeline (rutas, cuotas, idiomas, LLM).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::models::Language;
use crate::scanner::InputFilter;

pub const DEFAULT_LANGUAGES: &str =
    "pl:Polish,en:English,de:German,fr:French,es:Spanish,it:Italian,uk:Ukrainian";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Qué hacer cuando el OCR no devuelve texto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyTextPolicy {
    /// Se registra en el historial para no volver a intentarlo.
    MarkDone,
    /// Se trata como un fallo de extracción y se reintenta en la siguiente ejecución.
    Retry,
}

impl EmptyTextPolicy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mark-done" | "mark_done" | "done" => Ok(Self::MarkDone),
            "retry" => Ok(Self::Retry),
            other => Err(anyhow!("Política de texto vacío desconocida: {other}")),
        }
    }
}

/// Parámetros del pipeline. Se construye una vez y se pasa al driver.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub history_file: PathBuf,
    pub input_filter: InputFilter,
    pub languages: Vec<Language>,
    pub canonical_language: String,
    pub call_timeout: Duration,
    pub call_retries: u32,
    pub empty_text_policy: EmptyTextPolicy,
    /// Fuerza la etiqueta de tipo a partir de la carpeta (contenido sintético).
    pub type_from_folder: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("scans"),
            output_dir: PathBuf::from("."),
            history_file: PathBuf::from("processed_real_scans_files.txt"),
            input_filter: InputFilter::Scans,
            languages: parse_languages(DEFAULT_LANGUAGES).unwrap_or_default(),
            canonical_language: "en".to_string(),
            call_timeout: Duration::from_secs(120),
            call_retries: 0,
            empty_text_policy: EmptyTextPolicy::MarkDone,
            type_from_folder: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(anyhow!("La lista de idiomas de destino está vacía"));
        }
        if !self
            .languages
            .iter()
            .any(|l| l.code == self.canonical_language)
        {
            return Err(anyhow!(
                "El idioma canónico '{}' no está entre los idiomas de destino",
                self.canonical_language
            ));
        }
        Ok(())
    }
}

/// Parámetros de la generación de variantes sintéticas.
#[derive(Clone, Debug)]
pub struct AugmentConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub history_file: PathBuf,
    /// Objetivo por categoría; `0` usa el tamaño de la categoría más grande.
    pub target_per_category: usize,
    pub min_variants_per_file: usize,
    pub seed: Option<u64>,
    pub call_timeout: Duration,
    pub call_retries: u32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("synthetic_content"),
            history_file: PathBuf::from("synthetic_processed_files.log"),
            target_per_category: 60,
            min_variants_per_file: 1,
            seed: None,
            call_timeout: Duration::from_secs(120),
            call_retries: 0,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub augment: AugmentConfig,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub tesseract_cmd: String,
    pub pdftoppm_cmd: String,
    pub ocr_langs: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let mut pipeline = PipelineConfig::default();
        let mut augment = AugmentConfig::default();

        if let Some(dir) = var("INPUT_DIR") {
            pipeline.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("OUTPUT_DIR") {
            pipeline.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = var("HISTORY_FILE") {
            pipeline.history_file = PathBuf::from(file);
        }
        if let Some(langs) = var("TARGET_LANGUAGES") {
            pipeline.languages = parse_languages(&langs)?;
        }
        if let Some(code) = var("CANONICAL_LANGUAGE") {
            pipeline.canonical_language = code;
        }
        if let Some(policy) = var("EMPTY_TEXT_POLICY") {
            pipeline.empty_text_policy = EmptyTextPolicy::from_str(&policy)?;
        }

        let timeout_secs: u64 = parse_var("CALL_TIMEOUT_SECS", 120)?;
        pipeline.call_timeout = Duration::from_secs(timeout_secs);
        pipeline.call_retries = parse_var("CALL_RETRIES", 0)?;
        pipeline.validate()?;

        if let Some(dir) = var("AUGMENT_INPUT_DIR") {
            augment.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("AUGMENT_OUTPUT_DIR") {
            augment.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = var("AUGMENT_HISTORY_FILE") {
            augment.history_file = PathBuf::from(file);
        }
        augment.target_per_category = parse_var("TARGET_COUNT_PER_TYPE", 60)?;
        augment.min_variants_per_file = parse_var("MIN_SYNTHETIC_PER_FILE", 1)?;
        augment.seed = match var("QUOTA_SEED") {
            Some(raw) => Some(raw.parse().context("QUOTA_SEED debe ser un entero")?),
            None => None,
        };
        augment.call_timeout = pipeline.call_timeout;
        augment.call_retries = pipeline.call_retries;

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let tesseract_cmd = env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string());
        let pdftoppm_cmd = env::var("PDFTOPPM_CMD").unwrap_or_else(|_| "pdftoppm".to_string());
        let ocr_langs = env::var("OCR_LANGS").unwrap_or_else(|_| "pol+eng".to_string());

        Ok(Self {
            pipeline,
            augment,
            llm_provider,
            llm_chat_model,
            tesseract_cmd,
            pdftoppm_cmd,
            ocr_langs,
        })
    }
}

/// Interpreta `"pl:Polish,en:English"`. Sin nombre, el código hace de nombre.
pub fn parse_languages(raw: &str) -> Result<Vec<Language>> {
    let mut languages: Vec<Language> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (code, name) = match entry.split_once(':') {
            Some((code, name)) => (code.trim(), name.trim()),
            None => (entry, entry),
        };
        if code.is_empty() || code.contains('/') {
            return Err(anyhow!("Código de idioma inválido: '{entry}'"));
        }
        if languages.iter().any(|l| l.code == code) {
            return Err(anyhow!("Idioma duplicado: '{code}'"));
        }
        languages.push(Language::new(code, name));
    }
    if languages.is_empty() {
        return Err(anyhow!("La lista de idiomas está vacía"));
    }
    Ok(languages)
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}")),
        None => Ok(default),
    }
}
