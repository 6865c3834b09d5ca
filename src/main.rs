use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use tracing::error;

use k1_reader::logging::{init_logging, LoggingConfig};
use k1_reader::{K1Pipeline, K1Record, PipelineConfig};

#[derive(Parser)]
#[command(name = "k1-reader")]
#[command(about = "Extract structured data from Schedule K-1 PDFs")]
#[command(version)]
struct Cli {
    /// K-1 PDF files to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// TOML configuration file (falls back to K1_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the quality gate and OCR every document
    #[arg(long)]
    force_ocr: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    init_logging(&LoggingConfig {
        level: level.to_string(),
    });

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::load_from_env(),
    };
    let pipeline = K1Pipeline::new(config).map_err(|e| anyhow!(e.user_message()))?;

    // Documents are independent and the pipeline is stateless, so batches
    // fan out across cores.
    let results: Vec<(PathBuf, Result<K1Record, String>)> = cli
        .inputs
        .par_iter()
        .map(|path| {
            let result = std::fs::read(path)
                .map_err(|e| format!("{}: {}", path.display(), e))
                .and_then(|bytes| {
                    let run = if cli.force_ocr {
                        pipeline.extract_with_forced_ocr(&bytes)
                    } else {
                        pipeline.extract_from_bytes(&bytes)
                    };
                    run.map_err(|e| e.user_message())
                });
            (path.clone(), result)
        })
        .collect();

    report_batch(&pipeline, &results);

    let records: Vec<(&PathBuf, &K1Record)> = results
        .iter()
        .filter_map(|(path, r)| r.as_ref().ok().map(|rec| (path, rec)))
        .collect();

    let rendered = match cli.format {
        OutputFormat::Json => render_json(&records)?,
        OutputFormat::Csv => render_csv(&records),
    };

    match &cli.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
        }
    }

    if records.is_empty() {
        return Err(anyhow!("no documents could be processed"));
    }
    Ok(())
}

/// Per-file status lines plus batch totals, on stderr so they never mix
/// with exported data.
fn report_batch(pipeline: &K1Pipeline, results: &[(PathBuf, Result<K1Record, String>)]) {
    let mut ok = 0usize;
    let mut confidence_sum = 0.0;

    for (path, result) in results {
        match result {
            Ok(record) => {
                ok += 1;
                confidence_sum += record.confidence;
                let tier = pipeline.scorer().tier(record.confidence);
                eprintln!("{}: [{}] {}", path.display(), tier.as_str(), record.summary());
                for warning in &record.warnings {
                    eprintln!("{}:   warning: {}", path.display(), warning);
                }
            }
            Err(message) => {
                eprintln!("{}: failed: {}", path.display(), message);
            }
        }
    }

    let failed = results.len() - ok;
    if results.len() > 1 {
        let mean = if ok > 0 { confidence_sum / ok as f64 } else { 0.0 };
        eprintln!(
            "processed {} documents: {} ok, {} failed, mean confidence {:.0}%",
            results.len(),
            ok,
            failed,
            mean * 100.0
        );
    }
}

fn render_json(records: &[(&PathBuf, &K1Record)]) -> Result<String> {
    let flat: Vec<serde_json::Value> = records
        .iter()
        .map(|(path, record)| {
            let mut map = record.to_flat_map();
            map.insert(
                "source_file".to_string(),
                serde_json::Value::String(path.display().to_string()),
            );
            serde_json::to_value(map)
        })
        .collect::<Result<_, _>>()?;

    Ok(serde_json::to_string_pretty(&flat)? + "\n")
}

fn render_csv(records: &[(&PathBuf, &K1Record)]) -> String {
    // Column set is the union of keys across all records, so sparse fields
    // still line up.
    let mut columns: BTreeSet<String> = BTreeSet::new();
    columns.insert("source_file".to_string());
    for (_, record) in records {
        columns.extend(record.to_flat_map().into_keys());
    }

    let mut out = String::new();
    let header: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for (path, record) in records {
        let flat = record.to_flat_map();
        let row: Vec<String> = columns
            .iter()
            .map(|col| {
                if col == "source_file" {
                    return csv_escape(&path.display().to_string());
                }
                match flat.get(col) {
                    Some(serde_json::Value::String(s)) => csv_escape(s),
                    Some(value) => value.to_string(),
                    None => String::new(),
                }
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_render_csv_empty() {
        let out = render_csv(&[]);
        assert_eq!(out, "source_file\n");
    }
}
