use std::collections::BTreeMap;

use crate::config::ConfidenceConfig;
use crate::model::{ExtractionMethod, K1Record};
use crate::patterns::{FieldCategory, FieldRegistry};

/// Weight for the fraction of all registry fields that were found.
pub const W_COVERAGE: f64 = 0.25;

/// Weight for the fraction of required fields that were found.
pub const W_REQUIRED: f64 = 0.35;

/// Weight for the mean rule-confidence of the fields that matched.
pub const W_MATCH: f64 = 0.40;

/// Multiplier applied to the blended score when the text came from OCR.
/// Recognition noise makes every downstream match less trustworthy.
pub const OCR_PENALTY: f64 = 0.85;

/// Blends coverage, required-field presence, and match quality into one
/// score in [0,1]. Pure function of the record contents; holds no state.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Score a record against the registry it was extracted with. An empty
    /// record scores exactly 0.0.
    pub fn score(&self, record: &K1Record, registry: &FieldRegistry) -> f64 {
        if record.fields.is_empty() {
            return 0.0;
        }

        let coverage = record.fields.len() as f64 / registry.len() as f64;

        let required_total = registry.required_fields().count();
        let required_found = registry
            .required_fields()
            .filter(|spec| record.fields.contains_key(spec.id))
            .count();
        let required = if required_total == 0 {
            1.0
        } else {
            required_found as f64 / required_total as f64
        };

        let match_quality = record
            .fields
            .values()
            .map(|f| f.match_confidence)
            .sum::<f64>()
            / record.fields.len() as f64;

        let blended = self.config.weight_coverage * coverage
            + self.config.weight_required * required
            + self.config.weight_match * match_quality;

        let penalized = match record.method {
            ExtractionMethod::Ocr => blended * self.config.ocr_penalty,
            ExtractionMethod::TextLayer | ExtractionMethod::Hybrid => blended,
        };

        penalized.clamp(0.0, 1.0)
    }

    /// Mean match-confidence per category, only for categories that have at
    /// least one extracted field. Gives callers a sense of which part of the
    /// form read well.
    pub fn category_breakdown(&self, record: &K1Record) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<FieldCategory, (f64, usize)> = BTreeMap::new();
        for field in record.fields.values() {
            let entry = sums.entry(field.category).or_insert((0.0, 0));
            entry.0 += field.match_confidence;
            entry.1 += 1;
        }

        sums.into_iter()
            .map(|(cat, (sum, n))| (cat.as_str().to_string(), sum / n as f64))
            .collect()
    }

    /// Presentation tier for a score. The continuous value is authoritative;
    /// tiers exist for human-facing output only.
    pub fn tier(&self, confidence: f64) -> ConfidenceTier {
        if confidence >= self.config.high_tier_cutoff {
            ConfidenceTier::High
        } else if confidence >= self.config.medium_tier_cutoff {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}
