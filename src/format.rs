//! File format routing.
//!
//! [`SUPPORTED_EXTENSIONS`] is the only list of recognized extensions.
//! Directory discovery ([`DocumentFormat::from_path`]) and per-file
//! dispatch ([`route`]) both read it, so a file found by a scan is always
//! accepted at load time.

use std::fmt;
use std::path::Path;

/// Extraction strategy selected for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Docx,
    /// Excel workbooks (`.xlsx`, and legacy `.xls`).
    Spreadsheet,
    Csv,
    Email,
    /// Raster images; text is recovered through OCR.
    Image,
}

/// Every recognized extension (lowercase, without the dot) and its format.
pub const SUPPORTED_EXTENSIONS: &[(&str, DocumentFormat)] = &[
    ("txt", DocumentFormat::Text),
    ("md", DocumentFormat::Markdown),
    ("pdf", DocumentFormat::Pdf),
    ("docx", DocumentFormat::Docx),
    ("xlsx", DocumentFormat::Spreadsheet),
    ("xls", DocumentFormat::Spreadsheet),
    ("csv", DocumentFormat::Csv),
    ("eml", DocumentFormat::Email),
    ("png", DocumentFormat::Image),
    ("jpg", DocumentFormat::Image),
    ("jpeg", DocumentFormat::Image),
    ("tiff", DocumentFormat::Image),
    ("bmp", DocumentFormat::Image),
];

/// The file's extension is not in [`SUPPORTED_EXTENSIONS`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported file type '{extension}': {path}")]
pub struct UnsupportedFormat {
    pub path: String,
    pub extension: String,
}

impl DocumentFormat {
    /// Look up a bare extension, case-insensitively. A leading dot is allowed.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
        SUPPORTED_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, format)| *format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// True for the OCR-backed image capability, as opposed to structured
    /// document extractors.
    pub fn is_image(self) -> bool {
        self == DocumentFormat::Image
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Spreadsheet => "spreadsheet",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Email => "email",
            DocumentFormat::Image => "image",
        };
        f.write_str(name)
    }
}

/// Select the extraction strategy for a single file.
pub fn route(path: &Path) -> Result<DocumentFormat, UnsupportedFormat> {
    DocumentFormat::from_path(path).ok_or_else(|| UnsupportedFormat {
        path: path.display().to_string(),
        extension: path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_known_extensions_case_insensitively() {
        assert_eq!(route(Path::new("a/report.PDF")), Ok(DocumentFormat::Pdf));
        assert_eq!(route(Path::new("notes.Md")), Ok(DocumentFormat::Markdown));
        assert_eq!(route(Path::new("x.XLS")), Ok(DocumentFormat::Spreadsheet));
        assert_eq!(route(Path::new("scan.JPEG")), Ok(DocumentFormat::Image));
    }

    #[test]
    fn rejects_unknown_and_missing_extensions() {
        let err = route(Path::new("/tmp/archive.zip")).unwrap_err();
        assert_eq!(err.extension, ".zip");
        assert!(err.to_string().contains("unsupported file type"));

        let err = route(Path::new("/tmp/Makefile")).unwrap_err();
        assert_eq!(err.extension, "");
    }

    #[test]
    fn from_extension_accepts_leading_dot() {
        assert_eq!(
            DocumentFormat::from_extension(".eml"),
            Some(DocumentFormat::Email)
        );
        assert_eq!(DocumentFormat::from_extension("pptx"), None);
    }

    #[test]
    fn scan_filter_and_dispatch_never_disagree() {
        for (ext, format) in SUPPORTED_EXTENSIONS {
            for name in [format!("f.{}", ext), format!("f.{}", ext.to_uppercase())] {
                let path = Path::new(&name);
                let scanned = DocumentFormat::from_path(path);
                assert_eq!(scanned, Some(*format), "scan rejected {}", name);
                assert_eq!(route(path), Ok(*format), "dispatch rejected {}", name);
            }
        }
        for rejected in ["f.json", "f.html", "f.pptx", "f"] {
            let path = Path::new(rejected);
            assert!(DocumentFormat::from_path(path).is_none());
            assert!(route(path).is_err());
        }
    }

    #[test]
    fn only_image_formats_use_ocr() {
        let images: Vec<_> = SUPPORTED_EXTENSIONS
            .iter()
            .filter(|(_, f)| f.is_image())
            .map(|(e, _)| *e)
            .collect();
        assert_eq!(images, vec!["png", "jpg", "jpeg", "tiff", "bmp"]);
    }
}
