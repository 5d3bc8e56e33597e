use std::path::Path;

use serde::Serialize;

use super::extraction::ExtractionError;

/// Upload types the processor accepts.
pub const ACCEPTED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/bmp",
];

/// How a document is fed to the extraction service.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Paginated: text layer first, rendered pages otherwise.
    Pdf,
    /// Single raster sent as one image.
    Image,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub kind: DocumentKind,
    pub file_size_bytes: usize,
}

/// Classify an upload by its filename and check it against the size limit.
///
/// The `.pdf` extension (any case) selects the PDF pipeline; every other
/// accepted type is treated as a single image.
pub fn detect_format(
    filename: &str,
    file_size: usize,
    max_size: usize,
) -> Result<FormatDetection, ExtractionError> {
    if file_size > max_size {
        return Err(ExtractionError::FileTooLarge {
            size: file_size,
            max: max_size,
        });
    }

    let is_pdf = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let mime_type = if is_pdf {
        "application/pdf".to_string()
    } else {
        mime_guess::from_path(filename)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    };

    if !ACCEPTED_MIME_TYPES.contains(&mime_type.as_str()) {
        return Err(ExtractionError::UnsupportedFormat {
            filename: filename.to_string(),
            mime_type,
        });
    }

    let kind = if is_pdf {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    };

    Ok(FormatDetection {
        mime_type,
        kind,
        file_size_bytes: file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10 * 1024 * 1024;

    #[test]
    fn pdf_extension_is_case_insensitive() {
        for name in ["scan.pdf", "SCAN.PDF", "intake.Pdf"] {
            let detection = detect_format(name, 1024, MAX).unwrap();
            assert_eq!(detection.kind, DocumentKind::Pdf, "{name}");
            assert_eq!(detection.mime_type, "application/pdf");
        }
    }

    #[test]
    fn accepted_images() {
        let cases = [
            ("photo.jpg", "image/jpeg"),
            ("photo.jpeg", "image/jpeg"),
            ("card.png", "image/png"),
            ("fax.tiff", "image/tiff"),
            ("fax.tif", "image/tiff"),
            ("old.bmp", "image/bmp"),
        ];
        for (name, mime) in cases {
            let detection = detect_format(name, 10, MAX).unwrap();
            assert_eq!(detection.kind, DocumentKind::Image, "{name}");
            assert_eq!(detection.mime_type, mime, "{name}");
        }
    }

    #[test]
    fn unsupported_types_are_rejected() {
        for name in ["notes.txt", "archive.zip", "no_extension", "anim.gif"] {
            let err = detect_format(name, 10, MAX).unwrap_err();
            assert!(
                matches!(err, ExtractionError::UnsupportedFormat { .. }),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn oversize_is_rejected_before_type_check() {
        let err = detect_format("notes.txt", MAX + 1, MAX).unwrap_err();
        assert!(matches!(err, ExtractionError::FileTooLarge { size, max } if size == MAX + 1 && max == MAX));
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        assert!(detect_format("scan.pdf", MAX, MAX).is_ok());
    }
}
