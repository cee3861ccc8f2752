//! Vision-model OCR over an OpenAI-compatible `chat/completions` gateway.
//!
//! The whole PDF is sent as a `data:application/pdf;base64,...` image part and the model
//! is asked to transcribe it. This is the fallback of last resort before giving up, so it
//! stays small and bounded: one request, fixed prompt, per-request timeout.

use crate::ocr_endpoint::{ocr_timeout_ms_from_env, status_error};
use pactext_core::{Error, OcrBackend, OcrRequest, OcrResponse, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
const MAX_TOKENS: u32 = 16_000;
const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "You are an expert document OCR specialist. Your task is to extract ALL text content from the provided PDF document image(s).

Instructions:
1. Extract every piece of text visible in the document
2. Maintain the logical reading order and structure
3. Preserve paragraph breaks and section headers
4. Include all legal terms, clauses, and fine print
5. If there are multiple pages, process each one and combine the text
6. Do NOT summarize or interpret - just extract the raw text exactly as written
7. Include headers, footers, and any marginalia

Output ONLY the extracted text, nothing else. No commentary or explanations.";

const USER_PROMPT: &str = "Please extract all text from this PDF document. This is a contract or legal document that needs full text extraction for analysis.";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn vision_base_url_from_env() -> Option<String> {
    env("PACTEXT_VISION_BASE_URL")
}

fn vision_api_key_from_env() -> Option<String> {
    env("PACTEXT_VISION_API_KEY")
}

pub fn vision_model_from_env() -> String {
    env("PACTEXT_VISION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

#[derive(Debug, Clone)]
pub struct VisionOcrClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: u64,
}

impl VisionOcrClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model: vision_model_from_env(),
            timeout_ms: ocr_timeout_ms_from_env(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = vision_base_url_from_env()
            .ok_or_else(|| Error::NotConfigured("missing PACTEXT_VISION_BASE_URL".to_string()))?;
        Ok(Self::new(client, base_url, vision_api_key_from_env()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn build_request(&self, req: &OcrRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        Part::Text {
                            text: USER_PROMPT.to_string(),
                        },
                        Part::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:application/pdf;base64,{}", req.pdf_base64),
                            },
                        },
                    ]),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

#[async_trait::async_trait]
impl OcrBackend for VisionOcrClient {
    fn name(&self) -> &'static str {
        "vision_ocr"
    }

    async fn extract_text(&self, req: &OcrRequest) -> Result<OcrResponse> {
        tracing::debug!(file = %req.file_name, model = %self.model, "vision ocr requested");
        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&self.build_request(req))
            .send()
            .await
            .map_err(|e| Error::Ocr(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_error("vision chat.completions", status, None));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| Error::Ocr(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(OcrResponse { text })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
