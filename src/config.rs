use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration. Every tunable constant the pipeline exposes lives
/// here; the pipeline itself holds an immutable copy for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub acquisition: AcquisitionConfig,
    pub ocr: OcrConfig,
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Maximum input size in MB. Bounds memory for page rasterization.
    pub max_input_size_mb: u64,

    /// Fraction of structural markers that must be present for the text
    /// layer to be accepted without OCR escalation (inclusive boundary).
    pub quality_threshold: f64,

    /// Minimum non-whitespace characters per page for the density marker.
    pub min_chars_per_page: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Rasterization resolution. 300 DPI balances recognition accuracy
    /// against time and memory for US-letter forms.
    pub dpi: u32,

    /// Tesseract engine mode (`--oem`). 1 = LSTM only.
    pub engine_mode: u32,

    /// Tesseract page segmentation mode (`--psm`). 6 = uniform block of
    /// text, suited to tabular form layouts.
    pub page_seg_mode: u32,

    /// Recognition language.
    pub language: String,

    /// Paths to the external binaries, resolved via PATH by default.
    pub tesseract_path: String,
    pub pdftoppm_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Weight for the fraction of all registry fields found.
    pub weight_coverage: f64,

    /// Weight for the fraction of required fields found.
    pub weight_required: f64,

    /// Weight for the mean match-confidence of found fields.
    pub weight_match: f64,

    /// Multiplier applied to the blended score when method is OCR.
    pub ocr_penalty: f64,

    /// Presentation tier cut-points; the scorer returns the continuous
    /// value, tiering is applied by callers.
    pub high_tier_cutoff: f64,
    pub medium_tier_cutoff: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig {
                max_input_size_mb: 10,
                quality_threshold: 0.30,
                min_chars_per_page: 200,
            },
            ocr: OcrConfig {
                dpi: 300,
                engine_mode: 1,
                page_seg_mode: 6,
                language: "eng".to_string(),
                tesseract_path: "tesseract".to_string(),
                pdftoppm_path: "pdftoppm".to_string(),
            },
            confidence: ConfidenceConfig {
                weight_coverage: crate::confidence::W_COVERAGE,
                weight_required: crate::confidence::W_REQUIRED,
                weight_match: crate::confidence::W_MATCH,
                ocr_penalty: crate::confidence::OCR_PENALTY,
                high_tier_cutoff: 0.80,
                medium_tier_cutoff: 0.60,
            },
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(threshold) = std::env::var("K1_QUALITY_THRESHOLD") {
            if let Ok(value) = threshold.parse::<f64>() {
                config.acquisition.quality_threshold = value;
            }
        }

        if let Ok(dpi) = std::env::var("K1_OCR_DPI") {
            if let Ok(value) = dpi.parse::<u32>() {
                config.ocr.dpi = value;
            }
        }

        if let Ok(path) = std::env::var("K1_TESSERACT_PATH") {
            config.ocr.tesseract_path = path;
        }

        config
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.acquisition.quality_threshold) {
            return Err(anyhow!(
                "quality_threshold must be in [0,1], got {}",
                self.acquisition.quality_threshold
            ));
        }

        let weight_sum = self.confidence.weight_coverage
            + self.confidence.weight_required
            + self.confidence.weight_match;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(anyhow!("confidence weights must sum to 1.0, got {}", weight_sum));
        }

        if !(0.0..=1.0).contains(&self.confidence.ocr_penalty) {
            return Err(anyhow!("ocr_penalty must be in [0,1]"));
        }

        Ok(())
    }
}
