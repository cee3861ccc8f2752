use pactext_core::{Error, OcrBackend, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod dispatch;
pub mod ocr_endpoint;
pub mod orchestrate;
pub mod readability;
pub mod scan;
pub mod vision_ocr;

pub use dispatch::Dispatcher;
pub use orchestrate::{ExtractionState, PdfExtractor, TracedExtraction};
pub use readability::ReadabilityPolicy;

/// Which OCR backend (if any) the PDF ladder may escalate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    Off,
    Endpoint,
    Vision,
    /// Endpoint if configured, else vision if configured, else off.
    Auto,
}

impl OcrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::Off => "off",
            OcrMode::Endpoint => "endpoint",
            OcrMode::Vision => "vision",
            OcrMode::Auto => "auto",
        }
    }

    /// `PACTEXT_OCR`, `auto` when unset. An unknown value is an error, as on the CLI.
    pub fn from_env() -> Result<Self> {
        match std::env::var("PACTEXT_OCR") {
            Ok(s) => s.parse(),
            Err(_) => Ok(OcrMode::Auto),
        }
    }
}

impl FromStr for OcrMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(OcrMode::Off),
            "endpoint" => Ok(OcrMode::Endpoint),
            "vision" => Ok(OcrMode::Vision),
            "auto" | "" => Ok(OcrMode::Auto),
            other => Err(Error::NotConfigured(format!(
                "unknown ocr mode {other:?} (expected off|endpoint|vision|auto)"
            ))),
        }
    }
}

/// Shared HTTP client for the OCR backends.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("pactext-local/0.1")
        // Per-request timeouts (PACTEXT_OCR_TIMEOUT_MS) bound the body; this bounds the dial.
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Ocr(e.to_string()))
}

/// Resolve an OCR backend from env for the given mode.
///
/// Explicit modes fail with `NotConfigured` when their env is missing; `Auto` quietly
/// resolves to `None` instead.
pub fn ocr_backend(client: reqwest::Client, mode: OcrMode) -> Result<Option<Arc<dyn OcrBackend>>> {
    match mode {
        OcrMode::Off => Ok(None),
        OcrMode::Endpoint => {
            let b: Arc<dyn OcrBackend> =
                Arc::new(ocr_endpoint::OcrEndpointClient::from_env(client)?);
            Ok(Some(b))
        }
        OcrMode::Vision => {
            let b: Arc<dyn OcrBackend> = Arc::new(vision_ocr::VisionOcrClient::from_env(client)?);
            Ok(Some(b))
        }
        OcrMode::Auto => {
            if ocr_endpoint::ocr_endpoint_from_env().is_some() {
                return ocr_backend(client, OcrMode::Endpoint);
            }
            if vision_ocr::vision_base_url_from_env().is_some() {
                return ocr_backend(client, OcrMode::Vision);
            }
            Ok(None)
        }
    }
}

/// Dispatcher wired from env: OCR backend per `mode`, readability thresholds per env.
pub fn dispatcher_from_env(mode: OcrMode) -> Result<Dispatcher> {
    let ocr = ocr_backend(http_client()?, mode)?;
    let pdf = PdfExtractor::new(ocr).with_policy(ReadabilityPolicy::from_env());
    Ok(Dispatcher::new(pdf))
}
