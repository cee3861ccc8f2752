//! Route an uploaded file to the right text-extraction strategy.
//!
//! Detection uses the declared media type (or the one the filename suffix implies),
//! then the filename suffix, then a `%PDF-` magic sniff. Only the PDF path involves any real work; the rest is
//! deliberately shallow.

use crate::orchestrate::PdfExtractor;
use pactext_core::{DocumentFormat, DocumentText, Error, RawDocument, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Upper bound for DOCX strip output.
pub const DOCX_MAX_CHARS: usize = 50_000;

/// Largest upload accepted by [`validate_upload`].
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const TEXT_CHARS_PER_PAGE: usize = 3000;

pub const IMAGE_PLACEHOLDER: &str =
    "[Image file uploaded - OCR extraction would be needed for image-based contracts]";

fn xml_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

/// Best-effort sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Media type implied by a filename suffix, for uploads that declare none.
pub fn media_type_for_name(file_name: &str) -> Option<&'static str> {
    let name = file_name.trim().to_ascii_lowercase();
    let (_, ext) = name.rsplit_once('.')?;
    match ext {
        "pdf" => Some("application/pdf"),
        "docx" => Some(DOCX_MEDIA_TYPE),
        "txt" => Some("text/plain"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Declared media type, else the one implied by the filename.
fn effective_media_type(doc: &RawDocument) -> String {
    let ct = doc.media_type_lc();
    if !ct.is_empty() {
        return ct;
    }
    media_type_for_name(&doc.file_name)
        .unwrap_or_default()
        .to_string()
}

/// True when the declared type or the filename says PDF (no bytes needed).
pub fn names_pdf(media_type: Option<&str>, file_name: &str) -> bool {
    let declared = media_type
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false);
    declared || file_name.trim().to_ascii_lowercase().ends_with(".pdf")
}

/// Read `path` into a [`RawDocument`], inferring the media type from the suffix when
/// none is given.
pub async fn read_document(path: &Path, media_type: Option<String>) -> Result<RawDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Io(format!("read {}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let media_type =
        media_type.or_else(|| media_type_for_name(&file_name).map(|s| s.to_string()));
    Ok(RawDocument::new(bytes, media_type, file_name))
}

/// Size half of the upload gate.
pub fn check_upload_size(len: u64) -> Result<()> {
    if len > MAX_UPLOAD_BYTES as u64 {
        return Err(Error::TooLarge {
            bytes: usize::try_from(len).unwrap_or(usize::MAX),
            max: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

pub fn detect_format(doc: &RawDocument) -> DocumentFormat {
    let ct = effective_media_type(doc);
    let name = doc.file_name_lc();

    if ct == "text/plain" || name.ends_with(".txt") {
        return DocumentFormat::PlainText;
    }
    if ct == "application/pdf" || name.ends_with(".pdf") {
        return DocumentFormat::Pdf;
    }
    if ct == DOCX_MEDIA_TYPE || name.ends_with(".docx") {
        return DocumentFormat::Docx;
    }
    if ct.starts_with("image/") {
        return DocumentFormat::Image;
    }
    // Undeclared uploads: trust the magic header over a plain-text guess.
    if bytes_look_like_pdf(&doc.bytes) {
        return DocumentFormat::Pdf;
    }
    DocumentFormat::Other
}

/// Upload-form gate: PDF, DOCX, JPEG or PNG, at most [`MAX_UPLOAD_BYTES`].
pub fn validate_upload(doc: &RawDocument) -> Result<DocumentFormat> {
    check_upload_size(doc.bytes.len() as u64)?;
    let ct = effective_media_type(doc);
    let name = doc.file_name_lc();
    let accepted = matches!(
        ct.as_str(),
        "application/pdf" | DOCX_MEDIA_TYPE | "image/jpeg" | "image/png"
    ) || name.ends_with(".pdf")
        || name.ends_with(".docx");
    if !accepted {
        let shown = if ct.is_empty() { name } else { ct };
        return Err(Error::UnsupportedUpload(shown));
    }
    Ok(detect_format(doc))
}

fn text_page_count(text: &str) -> usize {
    text.chars().count().div_ceil(TEXT_CHARS_PER_PAGE).max(1)
}

/// Strip markup and binary noise from raw DOCX archive bytes.
///
/// No unzip, no XML parse: this only recovers text from uncompressed parts, which is
/// why the output is capped and reported as a single page.
pub fn docx_strip_text(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    let untagged = xml_tag_re().replace_all(&raw, " ");
    let printable: String = untagged
        .chars()
        .map(|c| match c {
            ' '..='~' | '\n' | '\r' => c,
            _ => ' ',
        })
        .collect();
    let cleaned = printable.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned.chars().take(DOCX_MAX_CHARS).collect()
}

#[derive(Clone)]
pub struct Dispatcher {
    pdf: PdfExtractor,
}

impl Dispatcher {
    pub fn new(pdf: PdfExtractor) -> Self {
        Self { pdf }
    }

    pub fn pdf_extractor(&self) -> &PdfExtractor {
        &self.pdf
    }

    pub async fn extract(&self, doc: &RawDocument) -> DocumentText {
        let format = detect_format(doc);
        tracing::debug!(file = %doc.file_name, format = format.as_str(), "dispatching upload");
        match format {
            DocumentFormat::Pdf => self.pdf.extract_pdf(doc).await.into(),
            DocumentFormat::PlainText => {
                let text = String::from_utf8_lossy(&doc.bytes).to_string();
                DocumentText {
                    format,
                    page_count: text_page_count(&text),
                    text,
                    method: None,
                }
            }
            DocumentFormat::Docx => DocumentText {
                format,
                text: docx_strip_text(&doc.bytes),
                page_count: 1,
                method: None,
            },
            DocumentFormat::Image => DocumentText {
                format,
                text: IMAGE_PLACEHOLDER.to_string(),
                page_count: 1,
                method: None,
            },
            DocumentFormat::Other => {
                let text = match std::str::from_utf8(&doc.bytes) {
                    Ok(s) => s.to_string(),
                    Err(e) => {
                        tracing::debug!(file = %doc.file_name, error = %e, "not utf-8 text");
                        String::new()
                    }
                };
                DocumentText {
                    format,
                    page_count: text_page_count(&text),
                    text,
                    method: None,
                }
            }
        }
    }
}
