//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.
//!
//! El mismo gestor cubre tres servicios: análisis estructurado de documentos,
//! traducción de etiquetas y generación de variantes sintéticas.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use tracing::warn;

use crate::capabilities::{MetadataAnalyzer, Synthesizer, Translator};
use crate::config::{AppConfig, LlmProvider};
use crate::errors::ExtractionError;
use crate::models::{DocumentType, ExtractedMetadata, FieldKind, Language};

/// Caracteres del documento que se envían al modelo.
const ANALYSIS_TEXT_LIMIT: usize = 4000;
const SYNTHESIS_TEXT_LIMIT: usize = 3500;

const ANALYSIS_PROMPT: &str = r#"
You analyze OCR text of scanned personal documents and extract structured data.
RULES:
1. "summary_base": a factual summary in ENGLISH (5 sentences).
2. "title_base": a title in ENGLISH formatted as "[Specific Type] - [Entity] - [Date]"
   (e.g. "Tax Document (PIT-11) - Employer Name - 2023").
3. "category": one of the allowed category values.
4. "type": the BEST MATCH among the allowed type values.
5. "info": specific details (form symbol, provider, document number...).
Return ONLY one JSON object that validates against the schema below. No explanations.
"#;

const SYNTHESIS_PROMPT: &str = r#"
You are a raw data generator. Return ONLY the document text. No conversational fillers.
TASK:
1. Create a synthetic version of the source document.
2. Fill all placeholders/blanks with realistic Polish data.
3. Replace all existing names, dates, and numbers with new ones.
4. Add minor OCR errors (swapped letters, missing spaces).
5. Output MUST be in Polish.
OUTPUT ONLY THE TRANSFORMED TEXT. DO NOT EXPLAIN.
"#;

const SYNTHESIS_MARKER: &str = "SYNTHETIC TEXT START:";

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn complete(&self, preamble: &str, prompt: &str, temperature: f64) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(preamble, prompt, temperature).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }

    async fn complete_with_openai(
        &self,
        preamble: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(preamble)
            .temperature(temperature)
            .build();

        let answer = agent.prompt(prompt).await?;
        Ok(answer)
    }
}

#[async_trait]
impl MetadataAnalyzer for LlmManager {
    async fn analyze(
        &self,
        text: &str,
        hint: Option<DocumentType>,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let preamble = analysis_preamble();
        let prompt = analysis_prompt(text, hint);
        let response = self
            .complete(&preamble, &prompt, 0.0)
            .await
            .map_err(|e| ExtractionError::Capability {
                capability: "llm",
                reason: e.to_string(),
            })?;

        parse_metadata_response(&response).inspect_err(|e| {
            warn!("No se pudo validar la respuesta de análisis: {e}. Respuesta LLM: '{response}'");
        })
    }
}

#[async_trait]
impl Translator for LlmManager {
    async fn translate(&self, text: &str, target: &Language, field: FieldKind) -> Result<String> {
        let preamble = format!(
            "Translate the following {field} into {}.\nOutput ONLY the translation. No explanations. No markdown.",
            target.name
        );
        let response = self.complete(&preamble, text, 0.0).await?;
        let cleaned = clean_translation(&response);
        if cleaned.is_empty() {
            return Err(anyhow!("traducción vacía"));
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl Synthesizer for LlmManager {
    async fn synthesize(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "SOURCE DOCUMENT TO TRANSFORM:\n{}\n---\n{SYNTHESIS_MARKER}",
            truncate_chars(text, SYNTHESIS_TEXT_LIMIT)
        );
        let response = self.complete(SYNTHESIS_PROMPT, &prompt, 0.7).await?;
        let cleaned = clean_synthetic(&response);
        if cleaned.is_empty() {
            return Err(anyhow!("el modelo devolvió una variante vacía"));
        }
        Ok(cleaned)
    }
}

/// Instrucciones de análisis con el JSON schema de `ExtractedMetadata`.
pub fn analysis_preamble() -> String {
    let schema = schemars::schema_for!(ExtractedMetadata);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!("{ANALYSIS_PROMPT}\nJSON SCHEMA:\n{schema_json}")
}

pub fn analysis_prompt(text: &str, hint: Option<DocumentType>) -> String {
    let hint_str = match hint {
        Some(t) => format!(
            "Strong Hint: the document is likely a '{}' ({}). Typical features: {}.\n",
            t.id(),
            t.label(),
            t.hint()
        ),
        None => String::new(),
    };
    format!(
        "{hint_str}TEXT:\n{}",
        truncate_chars(text, ANALYSIS_TEXT_LIMIT)
    )
}

/// Valida la respuesta del modelo contra `ExtractedMetadata`.
pub fn parse_metadata_response(response: &str) -> Result<ExtractedMetadata, ExtractionError> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(ExtractionError::InvalidResponse {
                reason: "la respuesta no contiene un objeto JSON".to_string(),
            })
        }
    };

    serde_json::from_str::<ExtractedMetadata>(&cleaned[start..=end]).map_err(|e| {
        ExtractionError::InvalidResponse {
            reason: e.to_string(),
        }
    })
}

fn clean_translation(response: &str) -> String {
    response
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn clean_synthetic(response: &str) -> String {
    response
        .replace(SYNTHESIS_MARKER, "")
        .replace("```text", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
