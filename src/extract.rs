use std::path::Path;

use crate::error::{Error, Result};

pub const MIN_SOURCE_CHARS: usize = 100;

/// Words that distinguish a legal complaint from arbitrary prose. A document
/// that contains none of them is rejected before any model call is made.
const COMPLAINT_INDICATORS: [&str; 4] = ["complaint", "plaintiff", "defendant", "paragraph"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    /// Filename extension is authoritative; the part content type is only
    /// consulted when the extension is missing or unrecognized.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            return Ok(SourceFormat::Pdf);
        }
        if lower.ends_with(".txt") {
            return Ok(SourceFormat::Text);
        }
        if let Some(ct) = content_type {
            if ct == "application/pdf" {
                return Ok(SourceFormat::Pdf);
            }
            if ct.starts_with("text/") {
                return Ok(SourceFormat::Text);
            }
        }
        Err(Error::UnsupportedFormat(format!(
            "{filename} (only PDF and TXT files are supported)"
        )))
    }
}

pub fn extract_text(format: SourceFormat, bytes: &[u8]) -> Result<String> {
    match format {
        SourceFormat::Pdf => pdf_text(bytes),
        SourceFormat::Text => utf8_text(bytes),
    }
}

/// Reads a local file for the one-shot CLI path. Format detection is by
/// extension only since there is no content type to fall back on.
pub fn extract_from_path(path: &Path) -> Result<String> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = SourceFormat::detect(filename, None)?;
    let bytes = std::fs::read(path)?;
    extract_text(format, &bytes)
}

fn pdf_text(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Extraction(format!("failed to read pdf: {e}")))?;
    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return Err(Error::Extraction(
            "no extractable text found in pdf".to_string(),
        ));
    }
    Ok(text)
}

fn utf8_text(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Extraction("file is not valid utf-8".to_string()))?;
    Ok(normalize_whitespace(text))
}

/// Trims trailing space from each line and collapses runs of blank lines so
/// page breaks from pdf extraction do not bloat the prompt.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

pub fn validate_source_text(text: &str, max_chars: Option<usize>) -> Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "document contains no text".to_string(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars < MIN_SOURCE_CHARS {
        return Err(Error::InvalidInput(format!(
            "document text is too short ({chars} chars, need at least {MIN_SOURCE_CHARS})"
        )));
    }
    if let Some(max) = max_chars
        && chars > max
    {
        return Err(Error::InvalidInput(format!(
            "document text is too long ({chars} chars, limit is {max})"
        )));
    }
    let lower = trimmed.to_lowercase();
    if !COMPLAINT_INDICATORS.iter().any(|word| lower.contains(word)) {
        return Err(Error::InvalidInput(
            "document does not appear to be a legal complaint".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_complaint_text() -> String {
        format!(
            "COMPLAINT\n\nPlaintiff alleges that Defendant made false statements. {}",
            "The statements were materially misleading to investors. ".repeat(3)
        )
    }

    #[test]
    fn test_detect_pdf_extension() {
        let format = SourceFormat::detect("complaint.pdf", None).unwrap();
        assert_eq!(format, SourceFormat::Pdf);
    }

    #[test]
    fn test_detect_extension_case_insensitive() {
        let format = SourceFormat::detect("COMPLAINT.TXT", None).unwrap();
        assert_eq!(format, SourceFormat::Text);
    }

    #[test]
    fn test_detect_extension_beats_content_type() {
        let format = SourceFormat::detect("complaint.pdf", Some("text/plain")).unwrap();
        assert_eq!(format, SourceFormat::Pdf);
    }

    #[test]
    fn test_detect_content_type_fallback() {
        let format = SourceFormat::detect("upload", Some("application/pdf")).unwrap();
        assert_eq!(format, SourceFormat::Pdf);
        let format = SourceFormat::detect("upload", Some("text/plain; charset=utf-8"));
        assert!(matches!(format, Ok(SourceFormat::Text)));
    }

    #[test]
    fn test_detect_unsupported() {
        let err = SourceFormat::detect("complaint.docx", None).unwrap_err();
        assert!(err.to_string().contains("complaint.docx"));
    }

    #[test]
    fn test_utf8_rejects_invalid_bytes() {
        let err = extract_text(SourceFormat::Text, &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.to_string().contains("utf-8"));
    }

    #[test]
    fn test_normalize_collapses_blank_runs() {
        let text = "first line  \n\n\n\nsecond line\n";
        assert_eq!(normalize_whitespace(text), "first line\n\nsecond line");
    }

    #[test]
    fn test_validate_accepts_complaint() {
        assert!(validate_source_text(&make_complaint_text(), None).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let err = validate_source_text("   \n  ", None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_short_text() {
        let err = validate_source_text("plaintiff", None).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_validate_rejects_missing_indicators() {
        let text = "a".repeat(200);
        let err = validate_source_text(&text, None).unwrap_err();
        assert!(err.to_string().contains("legal complaint"));
    }

    #[test]
    fn test_validate_enforces_max_chars() {
        let text = make_complaint_text();
        let err = validate_source_text(&text, Some(50)).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_validate_minimum_counts_chars_not_bytes() {
        // 50 characters but 150 bytes; must still be rejected as too short.
        let text = "訴".repeat(50);
        let err = validate_source_text(&text, None).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_validate_max_counts_chars_not_bytes() {
        // Character count sits exactly at the cap while the byte count is
        // more than double it.
        let text = format!(
            "Plaintiff filed this complaint against Defendant. {}",
            "訴".repeat(100)
        );
        let cap = text.chars().count();
        assert!(validate_source_text(&text, Some(cap)).is_ok());
    }
}
