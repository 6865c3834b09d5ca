use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::patterns::{FieldCategory, FieldRegistry};

/// How the accepted text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    TextLayer,
    Ocr,
    Hybrid,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::TextLayer => "text-layer",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Hybrid => "hybrid",
        }
    }
}

/// Detected form family. Extraction targets 1065; the others are recognized
/// and recorded so downstream consumers can route accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormVariant {
    Form1065,
    Form1120S,
    Form1041,
    Unknown,
}

impl FormVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormVariant::Form1065 => "1065",
            FormVariant::Form1120S => "1120S",
            FormVariant::Form1041 => "1041",
            FormVariant::Unknown => "unknown",
        }
    }
}

/// A validated field value. Currency and percentage fields normalize to
/// numbers; names, identifiers, and the tax year stay textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Number(n) => write!(f, "{:.2}", n),
        }
    }
}

/// One extracted, validated field with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: FieldValue,
    /// Confidence of the rule that matched, from the registry's tiers.
    pub match_confidence: f64,
    pub category: FieldCategory,
}

/// The pipeline's output: everything extracted from one document. Contains
/// no timestamps or other run-varying state, so repeated runs over the same
/// bytes produce identical records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K1Record {
    pub form_variant: FormVariant,
    pub method: ExtractionMethod,
    /// Field id -> extracted value. BTreeMap keeps export order stable.
    pub fields: BTreeMap<String, ExtractedField>,
    /// Blended confidence in [0,1].
    pub confidence: f64,
    /// Mean match-confidence per category, for categories with any hit.
    pub category_confidence: BTreeMap<String, f64>,
    /// Required registry fields that were not extracted, in registry order.
    pub missing_required_fields: Vec<String>,
    /// Human-readable anomalies noticed during extraction; never fatal.
    pub warnings: Vec<String>,
}

/// Income box ids that participate in the total-income rollup. Deductions
/// and distributions (boxes 12 and 19) are excluded.
const TOTAL_INCOME_BOXES: [&str; 12] = [
    "box_1_ordinary_income",
    "box_2_rental_real_estate",
    "box_3_other_rental",
    "box_4_guaranteed_payments",
    "box_5_interest_income",
    "box_6a_ordinary_dividends",
    "box_6b_qualified_dividends",
    "box_7_royalties",
    "box_8_net_short_term_gain",
    "box_9a_net_long_term_gain",
    "box_10_net_1231_gain",
    "box_11_other_income",
];

/// Tolerance for the capital account roll-forward check. Preparers round to
/// whole dollars, so a $1 gap is not an anomaly.
const RECONCILIATION_TOLERANCE: f64 = 1.0;

impl K1Record {
    pub fn get(&self, id: &str) -> Option<&ExtractedField> {
        self.fields.get(id)
    }

    pub fn get_number(&self, id: &str) -> Option<f64> {
        self.fields.get(id).and_then(|f| f.value.as_number())
    }

    pub fn get_text(&self, id: &str) -> Option<&str> {
        self.fields.get(id).and_then(|f| f.value.as_text())
    }

    /// Sum of the income boxes that were actually found. `None` when no
    /// income box was extracted at all.
    pub fn total_income(&self) -> Option<f64> {
        let found: Vec<f64> = TOTAL_INCOME_BOXES
            .iter()
            .filter_map(|id| self.get_number(id))
            .collect();
        if found.is_empty() {
            None
        } else {
            Some(found.iter().sum())
        }
    }

    /// Check the item L roll-forward: beginning + contributions + income
    /// share - distributions should land on the ending balance. Returns
    /// `None` when the needed fields are not all present, `Some(delta)`
    /// otherwise.
    pub fn capital_reconciliation_delta(&self) -> Option<f64> {
        let beginning = self.get_number("capital_account_beginning")?;
        let ending = self.get_number("capital_account_ending")?;
        let contributions = self.get_number("capital_contributions").unwrap_or(0.0);
        // The form pre-prints parentheses around withdrawals, so the value
        // may arrive negative; either sign convention means capital out.
        let distributions = self
            .get_number("capital_distributions")
            .unwrap_or(0.0)
            .abs();
        let income = self.total_income().unwrap_or(0.0);

        Some((beginning + contributions + income - distributions) - ending)
    }

    pub fn capital_reconciles(&self) -> Option<bool> {
        self.capital_reconciliation_delta()
            .map(|delta| delta.abs() <= RECONCILIATION_TOLERANCE)
    }

    /// Required registry fields with no extracted value.
    pub fn missing_required<'a>(&self, registry: &'a FieldRegistry) -> Vec<&'a str> {
        registry
            .required_fields()
            .filter(|spec| !self.fields.contains_key(spec.id))
            .map(|spec| spec.id)
            .collect()
    }

    /// Flatten to one level of key -> JSON value for export. Field ids map
    /// directly; record-level metadata gets reserved keys that no field id
    /// collides with.
    pub fn to_flat_map(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();

        for (id, field) in &self.fields {
            let value = match &field.value {
                FieldValue::Text(s) => serde_json::Value::String(s.clone()),
                FieldValue::Number(n) => serde_json::json!(n),
            };
            map.insert(id.clone(), value);
        }

        map.insert(
            "form_variant".to_string(),
            serde_json::Value::String(self.form_variant.as_str().to_string()),
        );
        map.insert(
            "extraction_method".to_string(),
            serde_json::Value::String(self.method.as_str().to_string()),
        );
        map.insert("confidence".to_string(), serde_json::json!(self.confidence));
        if !self.missing_required_fields.is_empty() {
            map.insert(
                "missing_required_fields".to_string(),
                serde_json::json!(self.missing_required_fields),
            );
        }
        if let Some(total) = self.total_income() {
            map.insert("total_income".to_string(), serde_json::json!(total));
        }

        map
    }

    /// One-line human summary for batch output.
    pub fn summary(&self) -> String {
        let entity = self.get_text("entity_name").unwrap_or("<no entity>");
        let year = self.get_text("tax_year").unwrap_or("????");
        format!(
            "{} ({}) - {} fields, {:.0}% confidence via {}",
            entity,
            year,
            self.fields.len(),
            self.confidence * 100.0,
            self.method.as_str()
        )
    }
}

/// Normalize a raw currency capture to a signed amount. Handles `$`,
/// thousands separators, accounting-style parentheses, and leading or
/// trailing minus signs. `None` means the capture is not a usable amount.
pub fn normalize_currency(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut negative = false;
    let mut s = trimmed;

    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let s = s.trim();
    let s = s.strip_prefix('-').map(|rest| {
        negative = true;
        rest
    }).unwrap_or(s);
    let s = s.strip_suffix('-').map(|rest| {
        negative = true;
        rest
    }).unwrap_or(s);

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Normalize a percentage capture. Values outside 0..=100 are coercion
/// failures, not clamped.
pub fn normalize_percentage(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').trim();
    let value: f64 = cleaned.parse().ok()?;
    if (0.0..=100.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Normalize an EIN or SSN capture to its nine digits, no separators. Any
/// other digit count means the match was spurious.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 9 {
        Some(digits)
    } else {
        None
    }
}

/// Normalize a textual capture: collapse runs of whitespace, strip trailing
/// label punctuation. Empty or single-character results are rejected.
pub fn normalize_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = collapsed.trim_end_matches([':', ',', '.']).trim().to_string();
    if cleaned.len() > 1 {
        Some(cleaned)
    } else {
        None
    }
}
