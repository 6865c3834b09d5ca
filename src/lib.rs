//! Schedule K-1 extraction pipeline.
//!
//! Pulls structured field data out of K-1 PDFs: native text layer first,
//! OCR escalation when the layer is missing or garbled, then a tiered
//! pattern registry with validation and confidence scoring.

pub mod acquisition;
pub mod confidence;
pub mod config;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod model;
pub mod ocr;
pub mod patterns;
pub mod pipeline;
pub mod quality;

pub use config::PipelineConfig;
pub use error::{K1Error, K1Result};
pub use model::{ExtractionMethod, FormVariant, K1Record};
pub use pipeline::K1Pipeline;
