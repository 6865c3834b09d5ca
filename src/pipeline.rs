use std::path::Path;
use tracing::{debug, info, warn};

use crate::acquisition::PdfAcquirer;
use crate::confidence::ConfidenceScorer;
use crate::config::PipelineConfig;
use crate::error::{K1Error, K1Result};
use crate::extraction::FieldExtractor;
use crate::logging::StageTimer;
use crate::model::{ExtractionMethod, K1Record};
use crate::ocr::OcrEngine;
use crate::patterns::FieldRegistry;
use crate::quality::QualityAssessor;

/// The end-to-end K-1 pipeline: acquire text, gate on quality, escalate to
/// OCR when the text layer is untrustworthy, run the pattern registry, and
/// score the result. Holds no per-document state, so one instance serves
/// any number of documents, concurrently.
pub struct K1Pipeline {
    acquirer: PdfAcquirer,
    assessor: QualityAssessor,
    extractor: FieldExtractor,
    scorer: ConfidenceScorer,
    ocr: OcrEngine,
}

impl K1Pipeline {
    pub fn new(config: PipelineConfig) -> K1Result<Self> {
        config
            .validate()
            .map_err(|e| K1Error::configuration(e.to_string()))?;

        Ok(Self {
            acquirer: PdfAcquirer::new(&config.acquisition),
            assessor: QualityAssessor::new(&config.acquisition),
            extractor: FieldExtractor::new(FieldRegistry::standard()),
            scorer: ConfidenceScorer::new(config.confidence.clone()),
            ocr: OcrEngine::new(config.ocr.clone()),
        })
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn registry(&self) -> &FieldRegistry {
        self.extractor.registry()
    }

    pub fn extract_from_file<P: AsRef<Path>>(&self, path: P) -> K1Result<K1Record> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| K1Error::file_io(path.display().to_string(), e))?;
        self.extract_from_bytes(&bytes)
    }

    pub fn extract_from_bytes(&self, bytes: &[u8]) -> K1Result<K1Record> {
        self.run(bytes, false)
    }

    /// Skip the quality gate and go straight to OCR. For documents known to
    /// carry a misleading text layer.
    pub fn extract_with_forced_ocr(&self, bytes: &[u8]) -> K1Result<K1Record> {
        self.run(bytes, true)
    }

    fn run(&self, bytes: &[u8], force_ocr: bool) -> K1Result<K1Record> {
        let _total = StageTimer::start("pipeline");
        let mut warnings = Vec::new();

        let acquired = {
            let _t = StageTimer::start("acquisition");
            self.acquirer.acquire(bytes)?
        };

        let assessment = self.assessor.assess(&acquired.text, acquired.page_count);
        debug!(
            "text layer: {} chars, quality {:.2}",
            acquired.text.len(),
            assessment.score
        );

        let (text, method) = if !force_ocr && assessment.acceptable {
            // AcroForm values merged into an accepted text layer make the
            // record multi-source.
            let method = if acquired.has_form_values {
                ExtractionMethod::Hybrid
            } else {
                ExtractionMethod::TextLayer
            };
            (acquired.text.clone(), method)
        } else {
            // A rejected (or bypassed) text layer means the acquisition is
            // OCR-grade no matter which text survives; recording the method
            // as OCR carries the degradation into the confidence penalty.
            let text = self.escalate(bytes, &acquired.text, force_ocr, &mut warnings);
            (text, ExtractionMethod::Ocr)
        };

        let outcome = {
            let _t = StageTimer::start("extraction");
            self.extractor.extract(&text)
        };
        warnings.extend(outcome.warnings);

        let mut record = K1Record {
            form_variant: outcome.form_variant,
            method,
            fields: outcome.fields,
            confidence: 0.0,
            category_confidence: Default::default(),
            missing_required_fields: Vec::new(),
            warnings: Vec::new(),
        };

        record.confidence = self.scorer.score(&record, self.extractor.registry());
        record.category_confidence = self.scorer.category_breakdown(&record);

        let missing: Vec<String> = record
            .missing_required(self.extractor.registry())
            .into_iter()
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            warnings.push(format!("missing required fields: {}", missing.join(", ")));
        }
        record.missing_required_fields = missing;
        if let Some(delta) = record.capital_reconciliation_delta() {
            if record.capital_reconciles() == Some(false) {
                warnings.push(format!(
                    "capital account does not reconcile: off by {:.2}",
                    delta
                ));
            }
        }
        record.warnings = warnings;

        info!("{}", record.summary());
        Ok(record)
    }

    /// The text layer was rejected (or bypassed). Try OCR; merge with any
    /// native text we did get, and fall back to the rejected text when OCR
    /// cannot run. Every degradation is recorded, never fatal.
    fn escalate(
        &self,
        bytes: &[u8],
        native_text: &str,
        forced: bool,
        warnings: &mut Vec<String>,
    ) -> String {
        if !forced {
            info!("text layer below quality threshold, escalating to OCR");
        }

        if !self.ocr.is_available() {
            warnings.push(
                "text layer quality is low and OCR tools are not installed; \
                 results are best-effort from the rejected native text"
                    .to_string(),
            );
            return native_text.to_string();
        }

        let ocr_text = {
            let _t = StageTimer::start("ocr");
            match self.ocr.recognize(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!("OCR escalation failed: {}", e);
                    warnings.push(format!("OCR failed ({}); using rejected native text", e));
                    return native_text.to_string();
                }
            }
        };

        if native_text.trim().is_empty() {
            ocr_text
        } else {
            // Keep both sources: fillable-form values live in the native
            // text while scanned annotations only show up under OCR.
            format!("{}\n{}", native_text, ocr_text)
        }
    }
}
