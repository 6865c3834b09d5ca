use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which section of the form a field belongs to. Drives anchor tracking in
/// the extraction engine and the per-category confidence breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Entity,
    Partner,
    Income,
    CapitalAccount,
    Metadata,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 5] = [
        FieldCategory::Entity,
        FieldCategory::Partner,
        FieldCategory::Income,
        FieldCategory::CapitalAccount,
        FieldCategory::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::Entity => "entity",
            FieldCategory::Partner => "partner",
            FieldCategory::Income => "income",
            FieldCategory::CapitalAccount => "capital_account",
            FieldCategory::Metadata => "metadata",
        }
    }
}

/// Expected value type, enforced by validation before anything lands in the
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Currency,
    Percentage,
    Identifier,
}

/// Match-confidence tiers by rule specificity. Anchored label rules are
/// trusted most; bare numeric-proximity rules least.
pub const CONF_ANCHORED: f64 = 0.95;
pub const CONF_LABEL_VARIANT: f64 = 0.85;
pub const CONF_LOOSE: f64 = 0.60;
pub const CONF_BARE: f64 = 0.40;

/// One recognition rule: a compiled pattern with capture group 1 holding the
/// raw value, plus the confidence its specificity earns.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub pattern: Regex,
    pub confidence: f64,
    /// Anchored rules update the category anchor position when they match.
    pub anchored: bool,
}

impl MatchRule {
    fn new(pattern: &str, confidence: f64) -> Self {
        Self {
            // Registry patterns are static; a malformed one is a programming
            // error caught by the registry unit tests.
            pattern: Regex::new(pattern).unwrap_or_else(|e| {
                panic!("invalid registry pattern {:?}: {}", pattern, e)
            }),
            confidence,
            anchored: confidence >= CONF_ANCHORED,
        }
    }
}

/// Immutable definition of one extractable field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Stable identifier, part of the export contract.
    pub id: &'static str,
    pub label: &'static str,
    pub category: FieldCategory,
    pub value_type: ValueType,
    pub required: bool,
    /// Rules in priority order, most specific first. First match wins.
    pub rules: Vec<MatchRule>,
}

/// The registry of every field the pipeline knows about. Built once at
/// startup, read-only afterwards, safe to share across concurrent runs.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldSpec>,
}

/// Raw value fragment for plain currency amounts: optional sign or dollar
/// symbol, digits with thousands separators, optional decimals, optional
/// trailing minus.
const AMOUNT: &str = r"(-?\$?\s?[\d,]+(?:\.\d+)?-?)";

/// Parenthesized (negative) currency amounts, captured with the parentheses
/// so normalization sees the sign convention.
const PAREN_AMOUNT: &str = r"(\(\$?\s?[\d,]+(?:\.\d+)?\))";

/// Skip between a label and its plain amount. Crosses annotation parens like
/// "(loss)" but stops before digits, minus, and a paren that opens an
/// amount, so the sign is not swallowed.
const SKIP: &str = r"(?:\([A-Za-z\s]*\)|[^\d\-\(])*";

/// Skip between a label and a parenthesized amount.
const SKIP_TO_PAREN: &str = r"(?:\([A-Za-z\s]*\)|[^\d\(])*";

/// Build the paren-then-plain rule pair for one currency label.
fn currency_pair(label_pattern: &str, confidence: f64) -> Vec<MatchRule> {
    vec![
        MatchRule::new(
            &format!(r"(?i){}{}{}", label_pattern, SKIP_TO_PAREN, PAREN_AMOUNT),
            confidence,
        ),
        MatchRule::new(
            &format!(r"(?i){}{}{}", label_pattern, SKIP, AMOUNT),
            confidence,
        ),
    ]
}

/// Build the rule ladder for a numbered income box. K-1s vary by preparer:
/// "Box 1", "1", "1." all appear, and values may sit on the same line or the
/// next one. The leading `(?:^|[^0-9])` stops "1" from matching inside "11".
fn box_rules(box_num: &str, keywords: &[&str]) -> Vec<MatchRule> {
    let keyword_pattern = keywords.join(r"[\s\w]*");
    let prefix = format!(r"(?:^|[^0-9])(?:Box\s+)?{}\.?\s+", box_num);
    // Labels often lead with filler ("Net rental real estate...") before
    // the words that identify the box.
    let filler = r"[A-Za-z&,\- \t]*?";

    let mut rules = Vec::new();

    // Most specific: box number + identifying keywords + amount, with the
    // parenthesized-negative form checked first so the sign survives.
    rules.extend(currency_pair(
        &format!(r"(?m){}{}{}", prefix, filler, keyword_pattern),
        CONF_ANCHORED,
    ));

    // Keywords with the value wrapped to the following line.
    rules.push(MatchRule::new(
        &format!(
            r"(?im){}{}{}[^\n\d]*\n\s*{}",
            prefix, filler, keyword_pattern, AMOUNT
        ),
        CONF_LABEL_VARIANT,
    ));

    // Box number at line start, first amount anywhere after (columnar
    // layouts with minimal descriptions).
    rules.push(MatchRule::new(
        &format!(r"(?im)^\s*(?:Box\s+)?{}\.?\s+\S[^\n]*?{}", box_num, AMOUNT),
        CONF_LOOSE,
    ));

    rules
}

impl FieldRegistry {
    /// The standard Schedule K-1 (Form 1065) registry.
    pub fn standard() -> Self {
        let mut fields = Vec::new();

        // === Metadata ===
        fields.push(FieldSpec {
            id: "tax_year",
            label: "Tax year",
            category: FieldCategory::Metadata,
            value_type: ValueType::Text,
            required: true,
            rules: vec![
                MatchRule::new(r"(?i)For\s+(?:calendar|tax)\s+year\s+(20\d{2})", CONF_ANCHORED),
                MatchRule::new(r"(?i)Calendar\s+year\s+(20\d{2})", CONF_ANCHORED),
                MatchRule::new(r"(?i)Tax\s+year\s+(20\d{2})", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)year\s+ending\s+\d{1,2}/\d{1,2}/(20\d{2})", CONF_LABEL_VARIANT),
                MatchRule::new(r"\b(20[2-3][0-9])\b", CONF_BARE),
            ],
        });

        // === Entity information ===
        fields.push(FieldSpec {
            id: "entity_name",
            label: "Entity name",
            category: FieldCategory::Entity,
            value_type: ValueType::Text,
            required: true,
            rules: vec![
                MatchRule::new(r"(?i)Partnership's\s+name[^:\n]*[\s:]*\n?\s*([^\n]+)", CONF_ANCHORED),
                MatchRule::new(r"(?i)Corporation's\s+name[^:\n]*[\s:]*\n?\s*([^\n]+)", CONF_ANCHORED),
                MatchRule::new(r"(?i)Estate's\s+or\s+trust's\s+name[\s:]*\n?\s*([^\n]+)", CONF_ANCHORED),
                MatchRule::new(r"(?i)Entity\s+name[\s:]*\n?\s*([^\n]+)", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Name\s+of\s+partnership[\s:]*\n?\s*([^\n]+)", CONF_LABEL_VARIANT),
                MatchRule::new(
                    r"([A-Z][A-Za-z0-9\s&,.\-]+(?:LLC|L\.L\.C\.|LP|LLP|Corp|Corporation|Inc|Partnership))",
                    CONF_LOOSE,
                ),
            ],
        });

        fields.push(FieldSpec {
            id: "entity_ein",
            label: "Employer identification number",
            category: FieldCategory::Entity,
            value_type: ValueType::Identifier,
            required: false,
            rules: vec![
                MatchRule::new(r"(?i)Employer\s+identification\s+number[\s:]*(\d{2}[-\s]?\d{7})", CONF_ANCHORED),
                MatchRule::new(r"(?i)\bEIN[\s:]*(\d{2}[-\s]?\d{7})", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Federal\s+ID[\s:]*(\d{2}[-\s]?\d{7})", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Tax\s+ID[\s:]*(\d{2}[-\s]?\d{7})", CONF_LABEL_VARIANT),
                MatchRule::new(r"\b(\d{2}-\d{7})\b", CONF_LOOSE),
            ],
        });

        fields.push(FieldSpec {
            id: "entity_address",
            label: "Entity address",
            category: FieldCategory::Entity,
            value_type: ValueType::Text,
            required: false,
            rules: vec![
                MatchRule::new(
                    r"(?i)Partnership's[^\n]*address[^\n]*\n[^\n]*\n\s*([^\n]+)",
                    CONF_ANCHORED,
                ),
                MatchRule::new(r"(?i)Entity\s+address[\s:]*\n?\s*([^\n]+)", CONF_LABEL_VARIANT),
            ],
        });

        // === Partner information ===
        fields.push(FieldSpec {
            id: "partner_name",
            label: "Partner name",
            category: FieldCategory::Partner,
            value_type: ValueType::Text,
            required: false,
            rules: vec![
                MatchRule::new(r"(?i)Partner's\s+name[^:\n]*[\s:]*\n?\s*([^\n]+)", CONF_ANCHORED),
                MatchRule::new(r"(?i)Shareholder's\s+name[^:\n]*[\s:]*\n?\s*([^\n]+)", CONF_ANCHORED),
                MatchRule::new(r"(?i)Beneficiary's\s+name[\s:]*\n?\s*([^\n]+)", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Name\s+of\s+partner[\s:]*\n?\s*([^\n]+)", CONF_LABEL_VARIANT),
            ],
        });

        fields.push(FieldSpec {
            id: "partner_tin",
            label: "Partner identifying number",
            category: FieldCategory::Partner,
            value_type: ValueType::Identifier,
            required: false,
            rules: vec![
                MatchRule::new(
                    r"(?i)Partner's\s+(?:SSN|TIN|identifying\s+number)[^\d]*(\d{3}[-\s]?\d{2}[-\s]?\d{4})",
                    CONF_ANCHORED,
                ),
                MatchRule::new(
                    r"(?i)Shareholder's\s+identifying\s+number[^\d]*(\d{3}[-\s]?\d{2}[-\s]?\d{4})",
                    CONF_ANCHORED,
                ),
                MatchRule::new(r"(?i)\bSSN[\s:]*(\d{3}[-\s]?\d{2}[-\s]?\d{4})", CONF_LABEL_VARIANT),
                MatchRule::new(r"\b(\d{3}-\d{2}-\d{4})\b", CONF_LOOSE),
            ],
        });

        fields.push(FieldSpec {
            id: "profit_sharing_percent",
            label: "Profit sharing percentage",
            category: FieldCategory::Partner,
            value_type: ValueType::Percentage,
            required: false,
            rules: vec![
                MatchRule::new(r"(?i)Profit\s+sharing[^\d]*(\d+(?:\.\d+)?)\s*%", CONF_ANCHORED),
                MatchRule::new(r"(?i)Share\s+of\s+profit[^\d]*(\d+(?:\.\d+)?)\s*%", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Profit[\s:]*(\d+(?:\.\d+)?)\s*%", CONF_LOOSE),
            ],
        });

        fields.push(FieldSpec {
            id: "loss_sharing_percent",
            label: "Loss sharing percentage",
            category: FieldCategory::Partner,
            value_type: ValueType::Percentage,
            required: false,
            rules: vec![
                MatchRule::new(r"(?i)Loss\s+sharing[^\d]*(\d+(?:\.\d+)?)\s*%", CONF_ANCHORED),
                MatchRule::new(r"(?i)Share\s+of\s+loss[^\d]*(\d+(?:\.\d+)?)\s*%", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Loss[\s:]*(\d+(?:\.\d+)?)\s*%", CONF_LOOSE),
            ],
        });

        fields.push(FieldSpec {
            id: "capital_percent",
            label: "Capital ownership percentage",
            category: FieldCategory::Partner,
            value_type: ValueType::Percentage,
            required: false,
            rules: vec![
                MatchRule::new(
                    r"(?i)Capital\s+(?:ownership|percentage)[^\d]*(\d+(?:\.\d+)?)\s*%",
                    CONF_ANCHORED,
                ),
                MatchRule::new(r"(?i)Ownership\s+percentage[^\d]*(\d+(?:\.\d+)?)\s*%", CONF_LABEL_VARIANT),
                MatchRule::new(r"(?i)Capital[\s:]*(\d+(?:\.\d+)?)\s*%", CONF_LOOSE),
            ],
        });

        // === Income boxes (Part III) ===
        let boxes: [(&'static str, &'static str, &'static str, &'static [&'static str]); 15] = [
            ("box_1_ordinary_income", "Ordinary business income (loss)", "1", &["Ordinary", "business", "income"]),
            ("box_2_rental_real_estate", "Net rental real estate income (loss)", "2", &["rental", "real", "estate"]),
            ("box_3_other_rental", "Other net rental income (loss)", "3", &["Other", "net", "rental"]),
            ("box_4_guaranteed_payments", "Guaranteed payments", "4a?", &["Guaranteed", "payments"]),
            ("box_5_interest_income", "Interest income", "5", &["Interest", "income"]),
            ("box_6a_ordinary_dividends", "Ordinary dividends", "6a", &["Ordinary", "dividends"]),
            ("box_6b_qualified_dividends", "Qualified dividends", "6b", &["Qualified", "dividends"]),
            ("box_7_royalties", "Royalties", "7", &["Royalties"]),
            ("box_8_net_short_term_gain", "Net short-term capital gain (loss)", "8", &["short[\\s\\-]*term", "capital"]),
            ("box_9a_net_long_term_gain", "Net long-term capital gain (loss)", "9a", &["long[\\s\\-]*term", "capital"]),
            ("box_10_net_1231_gain", "Net section 1231 gain (loss)", "10", &["section", "1231"]),
            ("box_11_other_income", "Other income (loss)", "11", &["Other", "income"]),
            ("box_12_section_179", "Section 179 deduction", "12", &["Section", "179"]),
            ("box_14_self_employment", "Self-employment earnings (loss)", "14", &["Self[\\s\\-]*employment", "earnings"]),
            ("box_19_distributions", "Distributions", "19", &["Distributions"]),
        ];

        for (id, label, num, keywords) in boxes {
            fields.push(FieldSpec {
                id,
                label,
                category: FieldCategory::Income,
                value_type: ValueType::Currency,
                required: false,
                rules: box_rules(num, keywords),
            });
        }

        // === Capital account analysis (Part II, item L) ===
        fields.push(FieldSpec {
            id: "capital_account_beginning",
            label: "Beginning capital account",
            category: FieldCategory::CapitalAccount,
            value_type: ValueType::Currency,
            required: false,
            rules: [
                currency_pair(r"Beginning\s+capital\s+account", CONF_ANCHORED),
                currency_pair(r"Capital\s+account\s+at\s+beginning", CONF_LABEL_VARIANT),
                currency_pair(r"Beginning\s+balance", CONF_LOOSE),
            ]
            .concat(),
        });

        fields.push(FieldSpec {
            id: "capital_contributions",
            label: "Capital contributed during year",
            category: FieldCategory::CapitalAccount,
            value_type: ValueType::Currency,
            required: false,
            rules: [
                currency_pair(r"Capital\s+contributed", CONF_ANCHORED),
                currency_pair(r"Contributions", CONF_LOOSE),
            ]
            .concat(),
        });

        fields.push(FieldSpec {
            id: "capital_distributions",
            label: "Withdrawals and distributions",
            category: FieldCategory::CapitalAccount,
            value_type: ValueType::Currency,
            required: false,
            rules: [
                currency_pair(r"Withdrawals\s*(?:&|and)\s*distributions", CONF_ANCHORED),
                currency_pair(r"Withdrawals", CONF_LABEL_VARIANT),
                currency_pair(r"Distributions", CONF_LOOSE),
            ]
            .concat(),
        });

        fields.push(FieldSpec {
            id: "capital_account_ending",
            label: "Ending capital account",
            category: FieldCategory::CapitalAccount,
            value_type: ValueType::Currency,
            required: false,
            rules: [
                currency_pair(r"Ending\s+capital\s+account", CONF_ANCHORED),
                currency_pair(r"Capital\s+account\s+at\s+end", CONF_LABEL_VARIANT),
                currency_pair(r"Ending\s+balance", CONF_LOOSE),
            ]
            .concat(),
        });

        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}
