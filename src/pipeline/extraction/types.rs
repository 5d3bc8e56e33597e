use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Sentinel stored in any patient field the document did not yield.
pub const NOT_FOUND: &str = "Not Found";

/// JSON keys of the three patient fields every record must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["patient_first_name", "patient_last_name", "patient_dob"];

/// Confidence label reported by the extraction service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// Lenient label parsing: case-insensitive, anything unrecognised is `Low`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient fields extracted from one page or one document.
///
/// Missing values hold [`NOT_FOUND`], never an empty string. Keys the service
/// returned beyond the known ones are kept in `extra` so the record can be
/// persisted exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_dob: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExtractionRecord {
    /// All-sentinel, low-confidence record carrying `notes` verbatim.
    pub fn not_found(notes: impl Into<String>) -> Self {
        Self {
            patient_first_name: NOT_FOUND.to_string(),
            patient_last_name: NOT_FOUND.to_string(),
            patient_dob: NOT_FOUND.to_string(),
            confidence: Confidence::Low,
            notes: notes.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Fallback record for a pipeline that could not run to completion.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::not_found(format!("Processing failed: {reason}"))
    }

    /// Values of the required fields in [`REQUIRED_FIELDS`] order.
    pub fn required_values(&self) -> [&str; 3] {
        [
            self.patient_first_name.as_str(),
            self.patient_last_name.as_str(),
            self.patient_dob.as_str(),
        ]
    }
}

/// One rendered page, owned by the orchestrator for a single extraction run.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number.
    pub page_number: usize,
    pub total_pages: usize,
    pub image: DynamicImage,
}

/// PDF page access: page count, text layer, and rasterisation.
///
/// Page indices are 0-based. The processor calls implementations on the
/// blocking pool, hence `Send + Sync`.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    fn page_text(&self, pdf_bytes: &[u8], page_index: usize) -> Result<String, ExtractionError>;

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<DynamicImage, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_labels_parse_leniently() {
        assert_eq!(Confidence::from_label("high"), Confidence::High);
        assert_eq!(Confidence::from_label(" HIGH "), Confidence::High);
        assert_eq!(Confidence::from_label("Medium"), Confidence::Medium);
        assert_eq!(Confidence::from_label("low"), Confidence::Low);
        assert_eq!(Confidence::from_label("very sure"), Confidence::Low);
        assert_eq!(Confidence::from_label(""), Confidence::Low);
    }

    #[test]
    fn failed_record_prefixes_reason() {
        let record = ExtractionRecord::failed("PDF has no pages");
        assert_eq!(record.notes, "Processing failed: PDF has no pages");
        assert_eq!(record.required_values(), [NOT_FOUND; 3]);
        assert_eq!(record.confidence, Confidence::Low);
    }

    #[test]
    fn record_serializes_flat_with_extra_keys() {
        let mut record = ExtractionRecord::not_found("n");
        record.patient_first_name = "Jane".into();
        record
            .extra
            .insert("mrn".into(), serde_json::Value::String("12345".into()));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["patient_first_name"], "Jane");
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["mrn"], "12345");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn record_deserializes_without_optional_keys() {
        let record: ExtractionRecord = serde_json::from_str(
            r#"{"patient_first_name":"A","patient_last_name":"B","patient_dob":"C"}"#,
        )
        .unwrap();
        assert_eq!(record.confidence, Confidence::Low);
        assert!(record.notes.is_empty());
        assert!(record.extra.is_empty());
    }
}
