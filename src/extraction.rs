use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::model::{
    normalize_currency, normalize_identifier, normalize_percentage, normalize_text,
    ExtractedField, FieldValue, FormVariant,
};
use crate::patterns::{FieldCategory, FieldRegistry, FieldSpec, ValueType, CONF_BARE};

/// Raw extraction output before scoring: validated fields plus anything
/// worth telling the user about.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub fields: BTreeMap<String, ExtractedField>,
    pub form_variant: FormVariant,
    pub warnings: Vec<String>,
}

/// Runs the pattern registry over acquired text. For each field the rules
/// fire in specificity order and the first match whose capture survives
/// type validation wins; a field with no surviving match is simply absent,
/// never an error.
pub struct FieldExtractor {
    registry: FieldRegistry,
}

impl FieldExtractor {
    pub fn new(registry: FieldRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn extract(&self, text: &str) -> ExtractionOutcome {
        let form_variant = detect_form_variant(text);
        let mut fields = BTreeMap::new();
        let mut warnings = Vec::new();

        // Each category remembers where its most recent anchored match
        // ended; loose rules for that category search from there first.
        // Keeps a bare EIN-shaped number in the partner block from landing
        // in an entity field.
        let mut anchors: HashMap<FieldCategory, usize> = HashMap::new();

        for spec in self.registry.fields() {
            if let Some(field) = self.extract_field(spec, text, &mut anchors) {
                if field.match_confidence <= CONF_BARE {
                    warnings.push(format!(
                        "{}: matched only a low-specificity pattern",
                        spec.id
                    ));
                }
                fields.insert(spec.id.to_string(), field);
            }
        }

        if form_variant != FormVariant::Form1065 && form_variant != FormVariant::Unknown {
            warnings.push(format!(
                "form variant {} detected; field registry targets Form 1065",
                form_variant.as_str()
            ));
        }

        debug!(
            "extracted {}/{} fields, variant {}",
            fields.len(),
            self.registry.len(),
            form_variant.as_str()
        );

        ExtractionOutcome {
            fields,
            form_variant,
            warnings,
        }
    }

    fn extract_field(
        &self,
        spec: &FieldSpec,
        text: &str,
        anchors: &mut HashMap<FieldCategory, usize>,
    ) -> Option<ExtractedField> {
        let anchor = *anchors.get(&spec.category).unwrap_or(&0);

        for rule in &spec.rules {
            // Anchored rules search the whole text. Loose rules start at
            // the category's anchor so a bare number in another section
            // cannot win, then retry from the top if nothing follows it.
            let first = if rule.anchored { 0 } else { anchor };
            let retry = (!rule.anchored && anchor > 0).then_some(0);

            for offset in std::iter::once(first).chain(retry) {
                let captures = match rule.pattern.captures(&text[offset..]) {
                    Some(c) => c,
                    None => continue,
                };
                let raw = match captures.get(1) {
                    Some(m) => m,
                    None => continue,
                };

                let value = match coerce(raw.as_str(), spec.value_type) {
                    Some(v) => v,
                    None => {
                        // The capture looked right but failed validation; a
                        // lower-specificity rule may still find a clean token.
                        trace!("{}: capture {:?} failed coercion", spec.id, raw.as_str());
                        continue;
                    }
                };

                if rule.anchored {
                    if let Some(m) = captures.get(0) {
                        anchors.insert(spec.category, offset + m.end());
                    }
                }

                trace!("{} = {:?} (confidence {})", spec.id, value, rule.confidence);
                return Some(ExtractedField {
                    value,
                    match_confidence: rule.confidence,
                    category: spec.category,
                });
            }
        }

        None
    }
}

fn coerce(raw: &str, value_type: ValueType) -> Option<FieldValue> {
    match value_type {
        ValueType::Currency => normalize_currency(raw).map(FieldValue::Number),
        ValueType::Percentage => normalize_percentage(raw).map(FieldValue::Number),
        ValueType::Identifier => normalize_identifier(raw).map(FieldValue::Text),
        ValueType::Text => normalize_text(raw).map(FieldValue::Text),
    }
}

/// Identify the form family from its title block. Checked in order of how
/// often each variant shows up in practice.
pub fn detect_form_variant(text: &str) -> FormVariant {
    let lower = text.to_lowercase();
    if lower.contains("form 1065") {
        FormVariant::Form1065
    } else if lower.contains("form 1120s") || lower.contains("form 1120-s") {
        FormVariant::Form1120S
    } else if lower.contains("form 1041") {
        FormVariant::Form1041
    } else {
        FormVariant::Unknown
    }
}
