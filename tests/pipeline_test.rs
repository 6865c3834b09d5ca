use k1_reader::confidence::OCR_PENALTY;
use k1_reader::model::FieldValue;
use k1_reader::{K1Error, K1Pipeline, PipelineConfig};
use lopdf::{dictionary, Document, Object, Stream};

/// Build a well-formed single-page PDF carrying the given text lines in
/// Helvetica. Whether the primary extractor or the content-stream fallback
/// reads it, the same lines come out.
fn pdf_with_text(lines: &[&str]) -> Vec<u8> {
    let mut stream = String::from("BT\n/F1 12 Tf\n72 720 Td\n");
    for line in lines {
        let escaped = line.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
        stream.push_str(&format!("({}) Tj\n0 -14 Td\n", escaped));
    }
    stream.push_str("ET\n");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, stream.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serializing test PDF");
    bytes
}

fn sample_k1_lines() -> Vec<&'static str> {
    vec![
        "Schedule K-1 (Form 1065) 2023",
        "For calendar year 2023",
        "Part I Information About the Partnership",
        "Partnership's name: Acme Partners LLC",
        "Employer identification number: 12-3456789",
        "Part II Information About the Partner",
        "Partner's name: Jane Smith",
        "Partner's SSN or TIN: 987-65-4321",
        "Profit sharing: 25.5%",
        "L Partner's Capital Account Analysis",
        "Beginning capital account $50,000",
        "Capital contributed during year $10,000",
        "Withdrawals and distributions ($9,845)",
        "Ending capital account $63,000",
        "Part III Partner's Share of Current Year Income",
        "Box 1 Ordinary business income (loss) $12,345",
        "5 Interest income 500",
    ]
}

/// Every registry field in canonical form, with a capital account that
/// rolls forward exactly.
fn complete_k1_lines() -> Vec<&'static str> {
    vec![
        "Schedule K-1 (Form 1065) 2023",
        "For calendar year 2023",
        "Part I Information About the Partnership",
        "B Partnership's name, address, city, state, and ZIP code",
        "Acme Partners LLC",
        "12 Main Street, Dover DE 19901",
        "Employer identification number: 12-3456789",
        "Part II Information About the Partner",
        "Partner's name: Jane Smith",
        "Partner's SSN or TIN: 987-65-4321",
        "Profit sharing: 25%",
        "Loss sharing: 25%",
        "Capital ownership: 25%",
        "L Partner's Capital Account Analysis",
        "Beginning capital account 50,000",
        "Capital contributed during year 10,000",
        "Withdrawals and distributions (2,000)",
        "Ending capital account 75,100",
        "Part III Partner's Share of Current Year Income",
        "1 Ordinary business income (loss) 10,000",
        "2 Net rental real estate income (loss) 2,000",
        "3 Other net rental income (loss) 800",
        "4a Guaranteed payments 1,000",
        "5 Interest income 500",
        "6a Ordinary dividends 600",
        "6b Qualified dividends 300",
        "7 Royalties 100",
        "8 Net short-term capital gain (loss) 400",
        "9a Net long-term capital gain (loss) 700",
        "10 Net section 1231 gain (loss) 250",
        "11 Other income (loss) 450",
        "12 Section 179 deduction 5,000",
        "14 Self-employment earnings (loss) 9,000",
        "19 Distributions 4,000",
    ]
}

fn pipeline() -> K1Pipeline {
    K1Pipeline::new(PipelineConfig::default()).expect("default config is valid")
}

/// Config whose OCR binaries cannot exist, making the escalation fallback
/// deterministic regardless of what is installed.
fn no_ocr_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.ocr.tesseract_path = "k1-reader-no-such-tesseract".to_string();
    config.ocr.pdftoppm_path = "k1-reader-no-such-pdftoppm".to_string();
    config
}

#[test]
fn rejected_text_layer_without_ocr_reports_ocr_method() {
    let pipeline = K1Pipeline::new(no_ocr_config()).unwrap();

    // Two of ten structural markers: rejected at the default threshold.
    let bytes = pdf_with_text(&["Schedule K-1 Form 1065"]);
    let record = pipeline.extract_from_bytes(&bytes).unwrap();

    assert_eq!(record.method.as_str(), "ocr");
    assert!(record
        .warnings
        .iter()
        .any(|w| w.contains("OCR tools are not installed")));
}

#[test]
fn degraded_acquisition_carries_confidence_penalty() {
    // Drop the EIN label so the document scores nine of ten quality
    // markers: accepted at the default threshold, rejected at 1.0.
    let mut lines = sample_k1_lines();
    lines.retain(|l| !l.contains("Employer identification"));
    let bytes = pdf_with_text(&lines);

    let accepted = K1Pipeline::new(no_ocr_config())
        .unwrap()
        .extract_from_bytes(&bytes)
        .unwrap();

    // Same document behind a tightened gate; with no OCR tools the same
    // native text flows through, now OCR-grade.
    let mut strict = no_ocr_config();
    strict.acquisition.quality_threshold = 1.0;
    let degraded = K1Pipeline::new(strict)
        .unwrap()
        .extract_from_bytes(&bytes)
        .unwrap();

    assert_eq!(accepted.method.as_str(), "text-layer");
    assert_eq!(degraded.method.as_str(), "ocr");
    assert_eq!(degraded.fields.len(), accepted.fields.len());
    assert!((degraded.confidence - accepted.confidence * OCR_PENALTY).abs() < 1e-9);
}

#[test]
fn canonical_document_extracts_every_registry_field() {
    let bytes = pdf_with_text(&complete_k1_lines());
    let pipeline = pipeline();
    let record = pipeline.extract_from_bytes(&bytes).unwrap();

    let missing: Vec<&str> = pipeline
        .registry()
        .fields()
        .iter()
        .map(|spec| spec.id)
        .filter(|id| !record.fields.contains_key(*id))
        .collect();
    assert!(missing.is_empty(), "fields not extracted: {:?}", missing);

    assert!(
        record.confidence >= 0.80,
        "complete extraction should be high tier, got {}",
        record.confidence
    );
    // 50,000 + 10,000 + 17,100 income - 2,000 distributions = 75,100.
    assert_eq!(record.total_income(), Some(17100.0));
    assert_eq!(record.capital_reconciles(), Some(true));
}

#[test]
fn extracts_full_sample_via_text_layer() {
    let bytes = pdf_with_text(&sample_k1_lines());
    let record = pipeline().extract_from_bytes(&bytes).unwrap();

    assert_eq!(record.method.as_str(), "text-layer");
    assert_eq!(record.form_variant.as_str(), "1065");
    assert_eq!(
        record.get("box_1_ordinary_income").unwrap().value,
        FieldValue::Number(12345.0)
    );
    assert_eq!(record.get_text("entity_name"), Some("Acme Partners LLC"));
    assert_eq!(record.get_text("entity_ein"), Some("123456789"));
    assert_eq!(record.get_text("tax_year"), Some("2023"));
    assert_eq!(record.get_number("box_5_interest_income"), Some(500.0));
    assert_eq!(record.get_number("profit_sharing_percent"), Some(25.5));
}

#[test]
fn full_sample_lands_in_high_tier() {
    let bytes = pdf_with_text(&sample_k1_lines());
    let pipeline = pipeline();
    let record = pipeline.extract_from_bytes(&bytes).unwrap();

    assert!(
        record.confidence >= 0.80,
        "expected high-tier confidence, got {}",
        record.confidence
    );
    assert_eq!(pipeline.scorer().tier(record.confidence).as_str(), "high");
}

#[test]
fn parenthesized_amounts_are_negative() {
    let bytes = pdf_with_text(&[
        "Schedule K-1 (Form 1065)",
        "Part II income",
        "Beginning capital account ($5,000)",
    ]);
    let record = pipeline().extract_from_bytes(&bytes).unwrap();
    assert_eq!(record.get_number("capital_account_beginning"), Some(-5000.0));
}

#[test]
fn capital_roll_forward_reconciles() {
    // 50,000 + 10,000 + 12,845 - 9,845 = 63,000 exactly.
    let bytes = pdf_with_text(&[
        "Schedule K-1 (Form 1065) 2023",
        "Box 1 Ordinary business income (loss) $12,345",
        "5 Interest income 500",
        "Beginning capital account $50,000",
        "Capital contributed during year $10,000",
        "Withdrawals and distributions ($9,845)",
        "Ending capital account $63,000",
    ]);
    let record = pipeline().extract_from_bytes(&bytes).unwrap();
    assert_eq!(record.capital_reconciles(), Some(true));
    assert!(!record.warnings.iter().any(|w| w.contains("reconcile")));
}

#[test]
fn capital_gap_produces_warning_not_error() {
    let bytes = pdf_with_text(&[
        "Schedule K-1 (Form 1065) 2023",
        "income Part III",
        "Beginning capital account $50,000",
        "Ending capital account $10,000",
    ]);
    let record = pipeline().extract_from_bytes(&bytes).unwrap();
    assert_eq!(record.capital_reconciles(), Some(false));
    assert!(record.warnings.iter().any(|w| w.contains("reconcile")));
}

#[test]
fn garbage_text_yields_zero_confidence_without_error() {
    // Accept any text quality so the run stays on the deterministic
    // text-layer path regardless of installed OCR tooling.
    let mut config = PipelineConfig::default();
    config.acquisition.quality_threshold = 0.0;
    let pipeline = K1Pipeline::new(config).unwrap();

    let bytes = pdf_with_text(&["zzzz qqqq xxxx", "~~ || ##"]);
    let record = pipeline.extract_from_bytes(&bytes).unwrap();

    assert!(record.fields.is_empty());
    assert_eq!(record.confidence, 0.0);
}

#[test]
fn non_pdf_bytes_are_unreadable() {
    let result = pipeline().extract_from_bytes(b"just some text pretending");
    assert!(matches!(result, Err(K1Error::UnreadablePdf { .. })));
}

#[test]
fn empty_input_is_unreadable() {
    let result = pipeline().extract_from_bytes(b"");
    assert!(matches!(result, Err(K1Error::UnreadablePdf { .. })));
}

#[test]
fn oversized_input_is_rejected() {
    let result = pipeline().extract_from_bytes(&vec![0u8; 11 * 1024 * 1024]);
    assert!(matches!(result, Err(K1Error::InputTooLarge { limit_mb: 10 })));
}

#[test]
fn repeated_runs_are_identical() {
    let bytes = pdf_with_text(&sample_k1_lines());
    let pipeline = pipeline();

    let first = pipeline.extract_from_bytes(&bytes).unwrap();
    let second = pipeline.extract_from_bytes(&bytes).unwrap();

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn missing_required_fields_surface_as_warning() {
    let mut config = PipelineConfig::default();
    config.acquisition.quality_threshold = 0.0;
    let pipeline = K1Pipeline::new(config).unwrap();

    let bytes = pdf_with_text(&["Box 1 Ordinary business income (loss) $100"]);
    let record = pipeline.extract_from_bytes(&bytes).unwrap();

    assert!(record
        .warnings
        .iter()
        .any(|w| w.contains("missing required fields")));
    assert_eq!(
        record.missing_required_fields,
        vec!["tax_year".to_string(), "entity_name".to_string()]
    );

    let flat = record.to_flat_map();
    let listed = flat["missing_required_fields"]
        .as_array()
        .expect("missing-required export is an array");
    assert_eq!(listed.len(), 2);
}

#[test]
fn form_field_values_make_the_record_hybrid() {
    let mut lines = sample_k1_lines();
    lines.retain(|l| !l.contains("Partner's name"));
    let mut bytes = pdf_with_text(&lines);

    // Re-open and attach a filled form field, the way tax software stores
    // partner data outside the content stream.
    let mut doc = Document::load_mem(&bytes).unwrap();
    doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => Object::string_literal("Partner's name"),
        "V" => Object::string_literal("Jane Smith"),
    });
    bytes.clear();
    doc.save_to(&mut bytes).unwrap();

    let record = pipeline().extract_from_bytes(&bytes).unwrap();
    assert_eq!(record.method.as_str(), "hybrid");
    assert_eq!(record.get_text("partner_name"), Some("Jane Smith"));
}

#[test]
fn flat_export_round_trips_through_json() {
    let bytes = pdf_with_text(&sample_k1_lines());
    let record = pipeline().extract_from_bytes(&bytes).unwrap();

    let flat = record.to_flat_map();
    let json = serde_json::to_string(&flat).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["extraction_method"], "text-layer");
    assert_eq!(parsed["box_1_ordinary_income"], 12345.0);
    assert!(parsed.get("total_income").is_some());
}
