use regex::Regex;
use tracing::debug;

use crate::config::AcquisitionConfig;

/// Outcome of scoring a candidate text layer. The score is the fraction of
/// structural markers present; `acceptable` applies the configured threshold
/// with an inclusive boundary.
#[derive(Debug, Clone)]
pub struct QualityAssessment {
    pub score: f64,
    pub markers_present: usize,
    pub total_markers: usize,
    pub acceptable: bool,
    /// Names of the markers that hit, for diagnostics.
    pub markers: Vec<&'static str>,
}

/// Scores extracted text for K-1 structural markers to decide whether the
/// text layer is trustworthy or the document needs OCR. A scanned form often
/// yields a technically-valid but empty or garbled text layer; marker
/// density separates the two cases far more reliably than raw length.
#[derive(Debug)]
pub struct QualityAssessor {
    threshold: f64,
    min_chars_per_page: usize,
    currency_re: Regex,
    identifier_re: Regex,
    year_re: Regex,
}

/// Marker definitions. Exactly ten, so the default 0.30 threshold is a
/// three-of-ten boundary.
const MARKER_COUNT: usize = 10;

impl QualityAssessor {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            threshold: config.quality_threshold,
            min_chars_per_page: config.min_chars_per_page,
            // Static patterns; construction is covered by unit tests.
            currency_re: Regex::new(r"\$\s?[\d,]+|[\d,]+\.\d{2}").unwrap(),
            identifier_re: Regex::new(r"\b\d{2}-\d{7}\b|\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            year_re: Regex::new(r"\b20[0-9]{2}\b").unwrap(),
        }
    }

    pub fn assess(&self, text: &str, page_count: usize) -> QualityAssessment {
        let lower = text.to_lowercase();
        let mut markers = Vec::new();

        if lower.contains("schedule k-1") || lower.contains("schedule k1") {
            markers.push("schedule_k1_title");
        }
        if lower.contains("form 1065") || lower.contains("form 1120") || lower.contains("form 1041")
        {
            markers.push("form_number");
        }
        if lower.contains("part i") || lower.contains("part ii") || lower.contains("part iii") {
            markers.push("part_headings");
        }
        if lower.contains("income") {
            markers.push("income_language");
        }
        if lower.contains("partner") || lower.contains("shareholder") || lower.contains("beneficiary")
        {
            markers.push("party_language");
        }
        if lower.contains("capital account") {
            markers.push("capital_account_language");
        }
        if lower.contains("identification number") || lower.contains("ein") {
            markers.push("identifier_labels");
        }
        if self.currency_re.is_match(text) {
            markers.push("currency_amounts");
        }
        if self.identifier_re.is_match(text) {
            markers.push("identifier_shapes");
        }

        let non_ws = text.chars().filter(|c| !c.is_whitespace()).count();
        let pages = page_count.max(1);
        if non_ws / pages >= self.min_chars_per_page && self.year_re.is_match(text) {
            markers.push("text_density");
        }

        let score = markers.len() as f64 / MARKER_COUNT as f64;
        let assessment = QualityAssessment {
            score,
            markers_present: markers.len(),
            total_markers: MARKER_COUNT,
            // Inclusive: a score exactly at the threshold passes.
            acceptable: score >= self.threshold,
            markers,
        };

        debug!(
            "quality: {}/{} markers, score {:.2}, acceptable={}",
            assessment.markers_present, MARKER_COUNT, score, assessment.acceptable
        );
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn assessor() -> QualityAssessor {
        QualityAssessor::new(&PipelineConfig::default().acquisition)
    }

    #[test]
    fn test_realistic_k1_text_is_acceptable() {
        let text = "Schedule K-1 (Form 1065) 2023\n\
                    Part I Information About the Partnership\n\
                    Employer identification number: 12-3456789\n\
                    Part III Partner's Share of Current Year Income\n\
                    1 Ordinary business income (loss) $12,345\n\
                    Beginning capital account $50,000";
        let result = assessor().assess(text, 1);
        assert!(result.acceptable);
        assert!(result.markers_present >= 6);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let result = assessor().assess("", 1);
        assert_eq!(result.score, 0.0);
        assert!(!result.acceptable);
    }

    #[test]
    fn test_garbled_scan_residue_rejected() {
        // Typical of a scanned page with a junk text layer.
        let text = "f1 . , ~ |||| .. @ # xx qq zz";
        let result = assessor().assess(text, 1);
        assert!(!result.acceptable);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // Exactly three markers out of ten: title, form number, income.
        let text = "Schedule K-1 Form 1065 income";
        let result = assessor().assess(text, 1);
        assert_eq!(result.markers_present, 3);
        assert!((result.score - 0.30).abs() < 1e-9);
        assert!(result.acceptable, "score equal to threshold must pass");
    }

    #[test]
    fn test_two_markers_fail_default_threshold() {
        let text = "Schedule K-1 Form 1065";
        let result = assessor().assess(text, 1);
        assert_eq!(result.markers_present, 2);
        assert!(!result.acceptable);
    }

    #[test]
    fn test_density_marker_scales_with_page_count() {
        let filler = "income 2023 ".repeat(40); // ~440 non-ws chars
        let one_page = assessor().assess(&filler, 1);
        let ten_pages = assessor().assess(&filler, 10);
        assert!(one_page.markers.contains(&"text_density"));
        assert!(!ten_pages.markers.contains(&"text_density"));
    }
}
