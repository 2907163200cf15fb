//! Reconocedores de texto: Tesseract para imágenes, capa de texto (o páginas
//! rasterizadas con `pdftoppm`) para PDF y lectura directa para `.txt`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::capabilities::TextRecognizer;
use crate::errors::ExtractionError;
use crate::models::{Document, DocumentKind};

/// Resolución de rasterizado de páginas PDF para el OCR.
const PDF_RASTER_DPI: &str = "300";

/// OCR invocando el binario `tesseract` instalado en el sistema. Los PDF sin
/// capa de texto se rasterizan con `pdftoppm` y se reconocen página a página.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub command: String,
    pub langs: String,
    pub rasterizer: String,
}

impl TesseractOcr {
    pub fn new(command: &str, langs: &str) -> Self {
        Self {
            command: command.to_string(),
            langs: langs.to_string(),
            rasterizer: "pdftoppm".to_string(),
        }
    }

    pub fn with_rasterizer(mut self, command: &str) -> Self {
        self.rasterizer = command.to_string();
        self
    }

    async fn ocr_image(&self, path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.langs)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractionError::Capability {
                capability: "ocr",
                reason: format!("no se pudo lanzar '{}': {e}", self.command),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Capability {
                capability: "ocr",
                reason: format!("tesseract terminó con {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Capa de texto si la hay; si no, OCR de cada página rasterizada.
    async fn ocr_pdf(&self, path: &Path) -> Result<String, ExtractionError> {
        match pdf_text(path).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => debug!("{} sin capa de texto; se rasteriza.", path.display()),
            Err(e) => warn!("Capa de texto ilegible en {}: {e}; se rasteriza.", path.display()),
        }

        let pages_dir = tempfile::tempdir().map_err(|e| ExtractionError::Capability {
            capability: "pdf",
            reason: format!("no se pudo crear el directorio temporal: {e}"),
        })?;
        let pages = self.rasterize(path, pages_dir.path()).await?;
        if pages.is_empty() {
            return Err(ExtractionError::UnreadableInput {
                path: path.to_path_buf(),
                reason: "el PDF no produjo ninguna página".to_string(),
            });
        }

        let mut text = String::new();
        for page in &pages {
            text.push_str(&self.ocr_image(page).await?);
        }
        debug!("{}: {} páginas reconocidas", path.display(), pages.len());
        Ok(text)
    }

    /// `pdftoppm -r 300 -png <pdf> <dir>/p`; devuelve las páginas en orden.
    async fn rasterize(&self, pdf: &Path, dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let output = Command::new(&self.rasterizer)
            .arg("-r")
            .arg(PDF_RASTER_DPI)
            .arg("-png")
            .arg(pdf)
            .arg(dir.join("p"))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractionError::Capability {
                capability: "pdf",
                reason: format!("no se pudo lanzar '{}': {e}", self.rasterizer),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::UnreadableInput {
                path: pdf.to_path_buf(),
                reason: format!(
                    "{} terminó con {}: {}",
                    self.rasterizer,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let read_err = |e: std::io::Error| ExtractionError::Capability {
            capability: "pdf",
            reason: e.to_string(),
        };
        let mut pages = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().is_some_and(|e| e == "png") {
                pages.push(path);
            }
        }
        // pdftoppm rellena con ceros el número de página: el orden léxico vale.
        pages.sort();
        Ok(pages)
    }
}

/// Texto embebido de un PDF. Los PDF escaneados sin capa de texto devuelven
/// una cadena vacía.
async fn pdf_text(path: &Path) -> Result<String, ExtractionError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| ExtractionError::Capability {
            capability: "pdf",
            reason: e.to_string(),
        })?;

    result.map_err(|e| ExtractionError::UnreadableInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn recognize(&self, doc: &Document) -> Result<String, ExtractionError> {
        debug!("OCR de {} ({:?})", doc.key(), doc.kind);
        match doc.kind {
            DocumentKind::Image => self.ocr_image(&doc.path).await,
            DocumentKind::Paged => self.ocr_pdf(&doc.path).await,
            DocumentKind::Text => PlainTextReader.recognize(doc).await,
        }
    }
}

/// Lee ficheros de texto UTF-8 tal cual.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextReader;

#[async_trait]
impl TextRecognizer for PlainTextReader {
    async fn recognize(&self, doc: &Document) -> Result<String, ExtractionError> {
        tokio::fs::read_to_string(&doc.path)
            .await
            .map_err(|e| ExtractionError::UnreadableInput {
                path: doc.path.clone(),
                reason: e.to_string(),
            })
    }
}
