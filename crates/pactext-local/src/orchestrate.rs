//! PDF extraction ladder: native scan → readability check → OCR → degraded → unreadable.
//!
//! Every call terminates in exactly one [`ExtractionState`]. The public entry points are
//! total: failures (OCR errors, unreadable input, read errors) come back as `fallback`
//! results, never as `Err` or a panic.

use crate::dispatch::read_document;
use crate::readability::ReadabilityPolicy;
use crate::scan::scan_native;
use base64::Engine;
use pactext_core::{
    Error, ExtractionCandidate, ExtractionMethod, ExtractionResult, OcrBackend, OcrRequest,
    RawDocument, Result,
};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

/// Native text must be longer than this to be accepted without OCR.
const NATIVE_MIN_CHARS: usize = 100;
/// OCR text must be longer than this to be used.
const OCR_MIN_CHARS: usize = 50;
/// Unreadable native text longer than this is still returned, with a warning note.
const DEGRADED_MIN_CHARS: usize = 50;
/// Rough chars-per-page used when only OCR text is available for a page estimate.
const OCR_CHARS_PER_PAGE: usize = 3000;

pub const INCOMPLETE_NOTE: &str = "\n\n[Note: Text extraction may be incomplete. The document appears to be scanned or use complex encoding. Some content may be missing or garbled.]";

pub const UNREADABLE_MESSAGE: &str = "Unable to extract readable text from this PDF. The document may be:\n\n\
• A scanned document with low image quality\n\
• Password protected or encrypted\n\
• Using an unsupported encoding\n\n\
Please try:\n\
1. Converting the scanned PDF to a clearer image\n\
2. Using a PDF with selectable text\n\
3. Copying and pasting the text directly";

pub const READ_ERROR_MESSAGE: &str =
    "Error reading PDF file. Please ensure the file is not corrupted and try again.";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    NativeAccepted,
    OcrEscalated,
    DegradedNative,
    Unreadable,
    ReadError,
}

impl ExtractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionState::NativeAccepted => "native_accepted",
            ExtractionState::OcrEscalated => "ocr_escalated",
            ExtractionState::DegradedNative => "degraded_native",
            ExtractionState::Unreadable => "unreadable",
            ExtractionState::ReadError => "read_error",
        }
    }
}

/// A result plus how the pipeline got there (diagnostics only).
#[derive(Debug, Clone)]
pub struct TracedExtraction {
    pub result: ExtractionResult,
    pub state: ExtractionState,
    /// Why OCR was skipped or rejected, when it was attempted.
    pub ocr_error: Option<String>,
    pub native_chars: usize,
}

fn read_error() -> TracedExtraction {
    TracedExtraction {
        result: ExtractionResult {
            text: READ_ERROR_MESSAGE.to_string(),
            page_count: 1,
            method: ExtractionMethod::Fallback,
        },
        state: ExtractionState::ReadError,
        ocr_error: None,
        native_chars: 0,
    }
}

/// Page count for an OCR result: trust the native structural estimate when present.
fn ocr_page_count(native_page_count: usize, ocr_text: &str) -> usize {
    if native_page_count > 0 {
        return native_page_count;
    }
    ocr_text.chars().count().div_ceil(OCR_CHARS_PER_PAGE).max(1)
}

#[derive(Clone)]
pub struct PdfExtractor {
    ocr: Option<Arc<dyn OcrBackend>>,
    policy: ReadabilityPolicy,
}

impl PdfExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrBackend>>) -> Self {
        Self {
            ocr,
            policy: ReadabilityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReadabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ocr_backend_name(&self) -> Option<&'static str> {
        self.ocr.as_ref().map(|b| b.name())
    }

    pub async fn extract_pdf(&self, doc: &RawDocument) -> ExtractionResult {
        self.extract_pdf_traced(doc).await.result
    }

    /// Read `path` and extract. A read failure is a `fallback` result, not an error.
    pub async fn extract_pdf_path(&self, path: &Path) -> ExtractionResult {
        self.extract_pdf_path_traced(path).await.result
    }

    pub async fn extract_pdf_path_traced(&self, path: &Path) -> TracedExtraction {
        match read_document(path, Some("application/pdf".to_string())).await {
            Ok(doc) => self.extract_pdf_traced(&doc).await,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "pdf read failed");
                read_error()
            }
        }
    }

    pub async fn extract_pdf_traced(&self, doc: &RawDocument) -> TracedExtraction {
        // The scanner is total, but a panic in it must still not escape this boundary.
        let candidate = match std::panic::catch_unwind(AssertUnwindSafe(|| scan_native(&doc.bytes)))
        {
            Ok(c) => c,
            Err(_) => {
                tracing::warn!(file = %doc.file_name, "native scan panicked");
                return read_error();
            }
        };
        let traced = self.run_ladder(doc, candidate).await;
        tracing::info!(
            file = %doc.file_name,
            state = traced.state.as_str(),
            method = traced.result.method.as_str(),
            chars = traced.result.text.chars().count(),
            pages = traced.result.page_count,
            "pdf extraction complete"
        );
        traced
    }

    async fn run_ladder(&self, doc: &RawDocument, candidate: ExtractionCandidate) -> TracedExtraction {
        let native_chars = candidate.text.chars().count();
        let readable = native_chars > NATIVE_MIN_CHARS && self.policy.is_readable(&candidate.text);
        tracing::debug!(native_chars, readable, "native candidate classified");

        if readable {
            return TracedExtraction {
                result: ExtractionResult {
                    text: candidate.text,
                    page_count: candidate.page_count,
                    method: ExtractionMethod::Native,
                },
                state: ExtractionState::NativeAccepted,
                ocr_error: None,
                native_chars,
            };
        }

        let ocr_error = match self.try_ocr(doc).await {
            Ok(text) => {
                let page_count = ocr_page_count(candidate.page_count, &text);
                return TracedExtraction {
                    result: ExtractionResult {
                        text,
                        page_count,
                        method: ExtractionMethod::Ocr,
                    },
                    state: ExtractionState::OcrEscalated,
                    ocr_error: None,
                    native_chars,
                };
            }
            Err(e) => {
                tracing::warn!(file = %doc.file_name, error = %e, "ocr fallback failed");
                Some(e.to_string())
            }
        };

        if native_chars > DEGRADED_MIN_CHARS {
            let mut text = candidate.text;
            text.push_str(INCOMPLETE_NOTE);
            return TracedExtraction {
                result: ExtractionResult {
                    text,
                    page_count: candidate.page_count,
                    method: ExtractionMethod::Fallback,
                },
                state: ExtractionState::DegradedNative,
                ocr_error,
                native_chars,
            };
        }

        TracedExtraction {
            result: ExtractionResult {
                text: UNREADABLE_MESSAGE.to_string(),
                page_count: 1,
                method: ExtractionMethod::Fallback,
            },
            state: ExtractionState::Unreadable,
            ocr_error,
            native_chars,
        }
    }

    async fn try_ocr(&self, doc: &RawDocument) -> Result<String> {
        let backend = self
            .ocr
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("no ocr backend".to_string()))?;
        let req = OcrRequest {
            pdf_base64: base64::engine::general_purpose::STANDARD.encode(&doc.bytes),
            file_name: doc.file_name.clone(),
        };
        let resp = backend.extract_text(&req).await?;
        let n = resp.text.chars().count();
        if n <= OCR_MIN_CHARS {
            return Err(Error::Ocr(format!(
                "{} returned too little text ({n} chars)",
                backend.name()
            )));
        }
        Ok(resp.text)
    }
}
