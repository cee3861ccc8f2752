use axum::{routing::post, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;

const OCR_ENV: &[&str] = &[
    "PACTEXT_ENV_FILE",
    "PACTEXT_OCR",
    "PACTEXT_OCR_ENDPOINT",
    "PACTEXT_OCR_API_KEY",
    "PACTEXT_VISION_BASE_URL",
    "PACTEXT_VISION_API_KEY",
];

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn native_pdf() -> Vec<u8> {
    let body = "This Services Agreement is entered into by the parties named below. \
                The Provider shall deliver the services described in each statement of work, \
                and the Client shall pay all undisputed invoices within thirty days.";
    format!(
        "%PDF-1.4\n1 0 obj << /Type /Pages /Count 2 >> endobj\n\
         2 0 obj << /Type /Page >> endobj\n3 0 obj << /Type /Page >> endobj\n\
         4 0 obj << /Length 999 >>\nstream\nBT /F1 12 Tf 72 700 Td ({body}) Tj ET\nendstream\nendobj\n"
    )
    .into_bytes()
}

fn scanned_pdf() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj << /Type /Page >> endobj\n2 0 obj << /Filter /DCTDecode >>\n\xff\xd8\xff\xe0\x00\x10JFIF\n%%EOF\n".to_vec()
}

async fn run(args: &[&str], envs: &[(&str, String)]) -> (i32, serde_json::Value) {
    let bin = assert_cmd::cargo::cargo_bin!("pactext");
    let mut cmd = tokio::process::Command::new(bin);
    cmd.args(args);
    for k in OCR_ENV {
        cmd.env_remove(k);
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let out = cmd.output().await.expect("run pactext");
    let code = out.status.code().unwrap_or(-1);
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
        panic!(
            "parse json ({e}); stdout={} stderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    });
    (code, v)
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let p = dir.join(name);
    std::fs::write(&p, bytes).unwrap();
    p.to_string_lossy().to_string()
}

#[tokio::test]
async fn extract_native_pdf_without_network() {
    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "services.pdf", &native_pdf());

    let (code, v) = run(&["extract", &p, "--ocr", "off"], &[]).await;
    assert_eq!(code, 0, "v={v}");
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["format"].as_str(), Some("pdf"));
    assert_eq!(v["method"].as_str(), Some("native"));
    assert_eq!(v["state"].as_str(), Some("native_accepted"));
    assert_eq!(v["pageCount"].as_u64(), Some(2));
    let text = v["text"].as_str().unwrap_or("");
    assert!(text.contains("This Services Agreement"), "text={text}");
}

#[tokio::test]
async fn extract_scanned_pdf_escalates_to_ocr_endpoint() {
    let ocr_text = "MASTER LEASE AGREEMENT. This lease is made between Landlord and Tenant. \
                    Tenant shall pay rent monthly in advance.";
    let app = Router::new().route(
        "/ocr-extract",
        post(move |Json(body): Json<serde_json::Value>| async move {
            if body["pdfBase64"].as_str().unwrap_or("").is_empty() {
                return Json(json!({ "error": "No PDF data provided" }));
            }
            Json(json!({ "text": ocr_text, "method": "ocr", "success": true }))
        }),
    );
    let addr = serve(app).await;

    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "scan.pdf", &scanned_pdf());
    let (code, v) = run(
        &["extract", &p],
        &[(
            "PACTEXT_OCR_ENDPOINT",
            format!("http://{addr}/ocr-extract"),
        )],
    )
    .await;
    assert_eq!(code, 0, "v={v}");
    assert_eq!(v["method"].as_str(), Some("ocr"));
    assert_eq!(v["state"].as_str(), Some("ocr_escalated"));
    assert_eq!(v["ocr_backend"].as_str(), Some("ocr_endpoint"));
    assert_eq!(v["text"].as_str(), Some(ocr_text));
    assert_eq!(v["pageCount"].as_u64(), Some(1));
}

#[tokio::test]
async fn extract_scanned_pdf_without_ocr_returns_unreadable_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "scan.pdf", &scanned_pdf());
    let (code, v) = run(&["extract", &p, "--ocr", "off"], &[]).await;
    assert_eq!(code, 0, "v={v}");
    assert_eq!(v["method"].as_str(), Some("fallback"));
    assert_eq!(v["state"].as_str(), Some("unreadable"));
    assert!(v["text"]
        .as_str()
        .unwrap_or("")
        .starts_with("Unable to extract readable text from this PDF."));
}

#[tokio::test]
async fn upload_gate_rejects_plain_text_unless_accept_any() {
    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "notes.txt", b"short");

    let (code, v) = run(&["extract", &p, "--ocr", "off"], &[]).await;
    assert_eq!(code, 2);
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert!(v["error"].as_str().unwrap_or("").contains("unsupported upload"));

    // Past the upload gate, the analysis gate still rejects 5 chars of text.
    let (code, v) = run(
        &["extract", &p, "--ocr", "off", "--accept-any", "true"],
        &[],
    )
    .await;
    assert_eq!(code, 2);
    assert_eq!(v["format"].as_str(), Some("plain_text"));
    assert!(v["error"]
        .as_str()
        .unwrap_or("")
        .contains("insufficient text"));

    let (code, v) = run(
        &[
            "extract",
            &p,
            "--ocr",
            "off",
            "--accept-any",
            "true",
            "--allow-short",
            "true",
        ],
        &[],
    )
    .await;
    assert_eq!(code, 0);
    assert_eq!(v["text"].as_str(), Some("short"));
    assert_eq!(v["pageCount"].as_u64(), Some(1));
}

#[tokio::test]
async fn scan_reports_candidate_and_readability() {
    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "services.pdf", &native_pdf());
    let (code, v) = run(&["scan", &p], &[]).await;
    assert_eq!(code, 0);
    assert_eq!(v["kind"].as_str(), Some("scan"));
    assert_eq!(v["looks_like_pdf"].as_bool(), Some(true));
    assert_eq!(v["readable"].as_bool(), Some(true));
    assert_eq!(v["has_domain_marker"].as_bool(), Some(true));
    assert_eq!(v["pageCount"].as_u64(), Some(2));
}

#[tokio::test]
async fn extract_png_by_suffix_yields_image_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let p = write(tmp.path(), "contract.png", b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR");

    let (code, v) = run(&["extract", &p, "--ocr", "off"], &[]).await;
    assert_eq!(code, 0, "v={v}");
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["format"].as_str(), Some("image"));
    assert_eq!(
        v["text"].as_str(),
        Some("[Image file uploaded - OCR extraction would be needed for image-based contracts]")
    );
    assert_eq!(v["pageCount"].as_u64(), Some(1));
    assert!(v["method"].is_null());
}

#[tokio::test]
async fn extract_missing_pdf_reports_read_error_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("missing.pdf").to_string_lossy().to_string();

    let (code, v) = run(&["extract", &p, "--ocr", "off"], &[]).await;
    assert_eq!(code, 0, "v={v}");
    assert_eq!(v["file"].as_str(), Some("missing.pdf"));
    assert_eq!(v["method"].as_str(), Some("fallback"));
    assert_eq!(v["state"].as_str(), Some("read_error"));
    assert_eq!(v["pageCount"].as_u64(), Some(1));
    assert!(v["text"]
        .as_str()
        .unwrap_or("")
        .starts_with("Error reading PDF file."));
}
