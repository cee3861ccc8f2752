use pactext_core::{Error, OcrBackend, OcrRequest, OcrResponse, Result};
use serde::Deserialize;
use std::time::Instant;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn ocr_endpoint_from_env() -> Option<String> {
    env("PACTEXT_OCR_ENDPOINT")
}

fn ocr_api_key_from_env() -> Option<String> {
    env("PACTEXT_OCR_API_KEY")
}

pub fn ocr_timeout_ms_from_env() -> u64 {
    env("PACTEXT_OCR_TIMEOUT_MS")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(60_000)
        .clamp(200, 300_000)
}

/// Map a non-success OCR status to the error taxonomy callers (and logs) care about.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, detail: Option<String>) -> Error {
    let detail = detail
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!(": {d}"))
        .unwrap_or_default();
    match status.as_u16() {
        429 => Error::RateLimited(format!("{provider} HTTP {status}{detail}")),
        402 => Error::QuotaExhausted(format!("{provider} HTTP {status}{detail}")),
        _ => Error::Ocr(format!("{provider} HTTP {status}{detail}")),
    }
}

#[derive(Debug, Deserialize)]
struct EndpointBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a remote OCR service speaking `{pdfBase64, fileName} -> {text}`.
#[derive(Debug, Clone)]
pub struct OcrEndpointClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl OcrEndpointClient {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            timeout_ms: ocr_timeout_ms_from_env(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let endpoint = ocr_endpoint_from_env()
            .ok_or_else(|| Error::NotConfigured("missing PACTEXT_OCR_ENDPOINT".to_string()))?;
        Ok(Self::new(client, endpoint, ocr_api_key_from_env()))
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl OcrBackend for OcrEndpointClient {
    fn name(&self) -> &'static str {
        "ocr_endpoint"
    }

    async fn extract_text(&self, req: &OcrRequest) -> Result<OcrResponse> {
        let t0 = Instant::now();
        let mut rb = self
            .client
            .post(&self.endpoint)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Ocr(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // Error bodies are `{error}` by contract; anything else is just dropped.
            let detail = resp
                .json::<EndpointBody>()
                .await
                .ok()
                .and_then(|b| b.error);
            return Err(status_error("ocr endpoint", status, detail));
        }

        let body: EndpointBody = resp.json().await.map_err(|e| Error::Ocr(e.to_string()))?;
        if let Some(err) = body.error.filter(|e| !e.trim().is_empty()) {
            return Err(Error::Ocr(err));
        }
        let text = body
            .text
            .ok_or_else(|| Error::Ocr("ocr endpoint response missing text".to_string()))?;
        tracing::debug!(
            chars = text.chars().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "ocr endpoint responded"
        );
        Ok(OcrResponse { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn req() -> OcrRequest {
        OcrRequest {
            pdf_base64: "JVBERi0xLjQ=".to_string(),
            file_name: "nda.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_wire_contract_and_returns_text() {
        let app = Router::new().route(
            "/ocr-extract",
            post(
                |headers: axum::http::HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    let auth = headers
                        .get(axum::http::header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    Json(json!({
                        "text": format!(
                            "{}|{}|{}",
                            body["pdfBase64"].as_str().unwrap_or(""),
                            body["fileName"].as_str().unwrap_or(""),
                            auth
                        ),
                        "method": "ocr",
                        "success": true
                    }))
                },
            ),
        );
        let addr = serve(app).await;
        let c = OcrEndpointClient::new(
            reqwest::Client::new(),
            format!("http://{addr}/ocr-extract"),
            Some("k1".to_string()),
        );
        let r = c.extract_text(&req()).await.unwrap();
        assert_eq!(r.text, "JVBERi0xLjQ=|nda.pdf|Bearer k1");
    }

    #[tokio::test]
    async fn maps_rate_limit_and_quota_statuses() {
        let app = Router::new()
            .route(
                "/429",
                post(|| async {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({"error": "Rate limit exceeded."})),
                    )
                }),
            )
            .route(
                "/402",
                post(|| async { (StatusCode::PAYMENT_REQUIRED, "no json") }),
            )
            .route(
                "/500",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))) }),
            );
        let addr = serve(app).await;
        let client = reqwest::Client::new();

        let c = OcrEndpointClient::new(client.clone(), format!("http://{addr}/429"), None);
        match c.extract_text(&req()).await {
            Err(Error::RateLimited(m)) => assert!(m.contains("Rate limit exceeded"), "{m}"),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        let c = OcrEndpointClient::new(client.clone(), format!("http://{addr}/402"), None);
        assert!(matches!(c.extract_text(&req()).await, Err(Error::QuotaExhausted(_))));
        let c = OcrEndpointClient::new(client, format!("http://{addr}/500"), None);
        assert!(matches!(c.extract_text(&req()).await, Err(Error::Ocr(_))));
    }

    #[tokio::test]
    async fn error_body_or_missing_text_is_a_failure() {
        let app = Router::new()
            .route(
                "/err",
                post(|| async { Json(json!({"error": "No PDF data provided"})) }),
            )
            .route("/empty", post(|| async { Json(json!({"success": true})) }));
        let addr = serve(app).await;
        let client = reqwest::Client::new();

        let c = OcrEndpointClient::new(client.clone(), format!("http://{addr}/err"), None);
        match c.extract_text(&req()).await {
            Err(Error::Ocr(m)) => assert_eq!(m, "No PDF data provided"),
            other => panic!("expected Ocr error, got {other:?}"),
        }
        let c = OcrEndpointClient::new(client, format!("http://{addr}/empty"), None);
        assert!(c.extract_text(&req()).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_not_a_panic() {
        // Bind then drop to get a port nobody is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let c = OcrEndpointClient::new(reqwest::Client::new(), format!("http://{addr}/"), None)
            .with_timeout_ms(500);
        assert!(matches!(c.extract_text(&req()).await, Err(Error::Ocr(_))));
    }
}
