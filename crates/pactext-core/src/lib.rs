use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("ocr failed: {0}")]
    Ocr(String),
    #[error("ocr rate limited: {0}")]
    RateLimited(String),
    #[error("ocr quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("insufficient text extracted ({chars} chars)")]
    InsufficientText { chars: usize },
    #[error("unsupported upload: {0}")]
    UnsupportedUpload(String),
    #[error("upload too large: {bytes} bytes (max {max})")]
    TooLarge { bytes: usize, max: usize },
    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Minimum trimmed text length the downstream analysis request will accept.
pub const MIN_ANALYZABLE_CHARS: usize = 50;

/// An uploaded file: raw bytes plus whatever the uploader declared about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
    pub file_name: String,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>, media_type: Option<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type,
            file_name: file_name.into(),
        }
    }

    /// Declared media type, lowercased and stripped of parameters (`; charset=...`).
    pub fn media_type_lc(&self) -> String {
        self.media_type
            .as_deref()
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    pub fn file_name_lc(&self) -> String {
        self.file_name.trim().to_ascii_lowercase()
    }
}

/// Output of one native scan pass over a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionCandidate {
    pub text: String,
    /// Always >= 1.
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
    Fallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Native => "native",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Fallback => "fallback",
        }
    }
}

/// The PDF pipeline's external contract: `{text, pageCount, method}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub text: String,
    pub page_count: usize,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn analyzable_text(&self) -> Result<&str> {
        ensure_analyzable(&self.text)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
    Image,
    Other,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "plain_text",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Image => "image",
            DocumentFormat::Other => "other",
        }
    }
}

/// Text recovered from any supported upload.
///
/// `method` is only set for PDFs, where it records which tier of the
/// extraction pipeline produced the text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    pub format: DocumentFormat,
    pub text: String,
    pub page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ExtractionMethod>,
}

impl DocumentText {
    pub fn analyzable_text(&self) -> Result<&str> {
        ensure_analyzable(&self.text)
    }
}

impl From<ExtractionResult> for DocumentText {
    fn from(r: ExtractionResult) -> Self {
        Self {
            format: DocumentFormat::Pdf,
            text: r.text,
            page_count: r.page_count,
            method: Some(r.method),
        }
    }
}

/// Gate applied before building an analysis request.
///
/// Returns the trimmed text, or `InsufficientText` when fewer than
/// [`MIN_ANALYZABLE_CHARS`] characters remain.
pub fn ensure_analyzable(text: &str) -> Result<&str> {
    let t = text.trim();
    let chars = t.chars().count();
    if chars < MIN_ANALYZABLE_CHARS {
        return Err(Error::InsufficientText { chars });
    }
    Ok(t)
}

/// OCR request body, as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    pub pdf_base64: String,
    pub file_name: String,
}

/// OCR success body. No page boundaries are marked in `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub text: String,
}

#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract_text(&self, req: &OcrRequest) -> Result<OcrResponse>;
}
