use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::OcrConfig;
use crate::error::{K1Error, K1Result};

/// OCR escalation path: rasterize pages with pdftoppm, recognize each image
/// with tesseract. Both run as external processes so the binary carries no
/// native OCR dependencies; `is_available` lets callers degrade gracefully
/// when the tools are not installed.
pub struct OcrEngine {
    config: OcrConfig,
}

impl OcrEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Probe for both external binaries. Called once per pipeline run before
    /// attempting escalation.
    pub fn is_available(&self) -> bool {
        let probe = |binary: &str, flag: &str| {
            Command::new(binary)
                .arg(flag)
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false)
        };
        probe(&self.config.pdftoppm_path, "-v") && probe(&self.config.tesseract_path, "--version")
    }

    /// Run the full rasterize-and-recognize pass. Individual page failures
    /// are tolerated; the error path is reserved for being unable to produce
    /// any page images at all.
    pub fn recognize(&self, pdf_bytes: &[u8]) -> K1Result<String> {
        let scratch = TempDir::new().map_err(|e| K1Error::file_io("ocr scratch dir", e))?;
        let pdf_path = scratch.path().join("input.pdf");
        std::fs::write(&pdf_path, pdf_bytes)
            .map_err(|e| K1Error::file_io(pdf_path.display().to_string(), e))?;

        let pages = self.rasterize(&pdf_path, scratch.path())?;
        info!("rasterized {} pages at {} dpi", pages.len(), self.config.dpi);

        let mut recognized = Vec::with_capacity(pages.len());
        for page in &pages {
            match self.recognize_page(page) {
                Ok(text) => recognized.push(text),
                Err(e) => {
                    // A single bad page should not cost the whole document.
                    warn!("OCR failed for {}: {}", page.display(), e);
                    recognized.push(String::new());
                }
            }
        }

        Ok(recognized.join("\n\n"))
    }

    fn rasterize(&self, pdf_path: &std::path::Path, out_dir: &std::path::Path) -> K1Result<Vec<PathBuf>> {
        let prefix = out_dir.join("page");
        let output = Command::new(&self.config.pdftoppm_path)
            .arg("-png")
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .with_context(|| format!("failed to run {}", self.config.pdftoppm_path))?;

        if !output.status.success() {
            return Err(K1Error::General(anyhow!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)
            .map_err(|e| K1Error::file_io(out_dir.display().to_string(), e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect();

        // pdftoppm numbers pages without zero-padding on some versions, so
        // lexical order would put page-10 before page-2.
        pages.sort_by_key(|path| page_number(path));

        if pages.is_empty() {
            return Err(K1Error::General(anyhow!("pdftoppm produced no page images")));
        }
        Ok(pages)
    }

    fn recognize_page(&self, image: &std::path::Path) -> anyhow::Result<String> {
        debug!("tesseract pass on {}", image.display());
        let output = Command::new(&self.config.tesseract_path)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--oem")
            .arg(self.config.engine_mode.to_string())
            .arg("--psm")
            .arg(self.config.page_seg_mode.to_string())
            .output()
            .with_context(|| format!("failed to run {}", self.config.tesseract_path))?;

        if !output.status.success() {
            return Err(anyhow!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn page_number(path: &std::path::Path) -> u32 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit('-').next())
        .and_then(|num| num.parse().ok())
        .unwrap_or(u32::MAX)
}
