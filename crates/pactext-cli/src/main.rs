use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pactext_core::{DocumentFormat, DocumentText};
use pactext_local::{dispatch, readability, scan, OcrMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pactext")]
#[command(about = "Contract text extraction (native PDF scan with OCR fallback)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract text from a contract file (json: {text, pageCount, method, ...}).
    Extract(ExtractCmd),
    /// Run only the native PDF scan and readability check (json; no network).
    Scan(ScanCmd),
    /// Diagnose OCR configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    /// File to extract.
    path: PathBuf,
    /// Declared media type (default: inferred from the file suffix, then magic bytes).
    #[arg(long)]
    media_type: Option<String>,
    /// OCR fallback: off|endpoint|vision|auto
    #[arg(long, env = "PACTEXT_OCR", default_value = "auto")]
    ocr: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Do not fail when fewer than 50 chars of text were recovered.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    allow_short: bool,
    /// Skip the upload gate (PDF/DOCX/JPEG/PNG, max 20 MiB).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    accept_any: bool,
}

#[derive(clap::Args, Debug)]
struct ScanCmd {
    /// PDF file to scan.
    path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in `KEY=VALUE` loader (`PACTEXT_ENV_FILE`). Never overrides the process env.
fn load_env_file() {
    let Ok(p) = std::env::var("PACTEXT_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    // stdout is reserved for JSON; logs go to stderr.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn print_rejection(file: &str, e: &pactext_core::Error) -> i32 {
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "extract",
        "ok": false,
        "file": file,
        "error": e.to_string(),
    });
    println!("{v}");
    2
}

async fn run_extract(args: ExtractCmd) -> Result<i32> {
    let mode: OcrMode = args.ocr.parse()?;
    let file_name = file_name_of(&args.path);

    // Named PDFs go through the path entry point so a read failure is a fallback result.
    let (out, state, ocr_error, ocr_backend): (
        DocumentText,
        Option<&'static str>,
        Option<String>,
        Option<&'static str>,
    ) = if dispatch::names_pdf(args.media_type.as_deref(), &file_name) {
        if !args.accept_any {
            if let Ok(meta) = tokio::fs::metadata(&args.path).await {
                if let Err(e) = dispatch::check_upload_size(meta.len()) {
                    return Ok(print_rejection(&file_name, &e));
                }
            }
        }
        let dispatcher = pactext_local::dispatcher_from_env(mode)?;
        let pdf = dispatcher.pdf_extractor();
        let traced = pdf.extract_pdf_path_traced(&args.path).await;
        (
            traced.result.into(),
            Some(traced.state.as_str()),
            traced.ocr_error,
            pdf.ocr_backend_name(),
        )
    } else {
        let doc = dispatch::read_document(&args.path, args.media_type.clone()).await?;
        if !args.accept_any {
            if let Err(e) = dispatch::validate_upload(&doc) {
                return Ok(print_rejection(&file_name, &e));
            }
        }
        let dispatcher = pactext_local::dispatcher_from_env(mode)?;
        let backend = dispatcher.pdf_extractor().ocr_backend_name();
        if dispatch::detect_format(&doc) == DocumentFormat::Pdf {
            let traced = dispatcher.pdf_extractor().extract_pdf_traced(&doc).await;
            (
                traced.result.into(),
                Some(traced.state.as_str()),
                traced.ocr_error,
                backend,
            )
        } else {
            (dispatcher.extract(&doc).await, None, None, backend)
        }
    };
    tracing::debug!(mode = mode.as_str(), backend = ?ocr_backend, "extraction finished");

    let gate = out.analyzable_text().map(|_| ()).map_err(|e| e.to_string());
    let ok = gate.is_ok() || args.allow_short;

    match args.output.to_ascii_lowercase().as_str() {
        "text" => println!("{}", out.text),
        _ => {
            let mut v = serde_json::json!({
                "schema_version": 1,
                "kind": "extract",
                "ok": ok,
                "file": file_name,
                "format": out.format,
                "text": out.text,
                "pageCount": out.page_count,
                "method": out.method,
                "ocr_mode": mode.as_str(),
                "ocr_backend": ocr_backend,
            });
            if let Some(state) = state {
                v["state"] = serde_json::json!(state);
            }
            if let Some(e) = ocr_error {
                v["ocr_error"] = serde_json::json!(e);
            }
            if let Err(e) = &gate {
                v["error"] = serde_json::json!(e);
            }
            println!("{v}");
        }
    }
    Ok(if ok { 0 } else { 2 })
}

async fn run_scan(args: ScanCmd) -> Result<i32> {
    let bytes = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("read {}", args.path.display()))?;
    let candidate = scan::scan_native(&bytes);
    let policy = readability::ReadabilityPolicy::from_env();
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "scan",
        "ok": true,
        "file": file_name_of(&args.path),
        "looks_like_pdf": dispatch::bytes_look_like_pdf(&bytes),
        "text": candidate.text,
        "chars": candidate.text.chars().count(),
        "pageCount": candidate.page_count,
        "readable_ratio": readability::readable_ratio(&candidate.text),
        "has_domain_marker": policy.has_marker(&candidate.text),
        "readable": policy.is_readable(&candidate.text),
    });
    println!("{v}");
    Ok(0)
}

fn run_doctor(args: DoctorCmd) -> Result<i32> {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();
    let mode = OcrMode::from_env();
    let mode_label = match &mode {
        Ok(m) => m.as_str().to_string(),
        Err(_) => std::env::var("PACTEXT_OCR").unwrap_or_default(),
    };

    let mut checks: Vec<serde_json::Value> = Vec::new();
    let resolved = mode.as_ref().map_err(|e| e.to_string()).and_then(|m| {
        pactext_local::http_client()
            .and_then(|c| pactext_local::ocr_backend(c, *m))
            .map_err(|e| e.to_string())
    });
    let (backend_ok, backend_name, backend_err) = match &resolved {
        Ok(b) => (true, b.as_ref().map(|b| b.name()), None),
        Err(e) => (false, None, Some(e.clone())),
    };
    let message = match (&backend_name, &backend_err) {
        (Some(n), _) => format!("ocr fallback via {n}"),
        (None, None) => {
            "ocr fallback disabled; unreadable PDFs degrade to fallback text".to_string()
        }
        (None, Some(e)) => e.clone(),
    };
    let hint = if backend_ok {
        ""
    } else if mode.is_err() {
        "Set PACTEXT_OCR to one of off, endpoint, vision, auto."
    } else {
        "Set PACTEXT_OCR_ENDPOINT or PACTEXT_VISION_BASE_URL, or PACTEXT_OCR=off."
    };
    checks.push(serde_json::json!({
        "name": "ocr_backend_resolves",
        "ok": backend_ok,
        "message": message,
        "hint": hint,
    }));

    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": backend_ok,
        "name": "pactext",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "ocr_mode": mode_label,
            "ocr_endpoint": has_env("PACTEXT_OCR_ENDPOINT"),
            "ocr_api_key": has_env("PACTEXT_OCR_API_KEY"),
            "vision_base_url": has_env("PACTEXT_VISION_BASE_URL"),
            "vision_api_key": has_env("PACTEXT_VISION_API_KEY"),
            "vision_model": pactext_local::vision_ocr::vision_model_from_env(),
            "ocr_timeout_ms": pactext_local::ocr_endpoint::ocr_timeout_ms_from_env(),
        },
        "resolved_ocr_backend": backend_name,
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("pactext {}", env!("CARGO_PKG_VERSION"));
            for c in v["checks"].as_array().into_iter().flatten() {
                println!(
                    "{} {}: {}",
                    if c["ok"].as_bool() == Some(true) { "ok  " } else { "FAIL" },
                    c["name"].as_str().unwrap_or(""),
                    c["message"].as_str().unwrap_or("")
                );
            }
        }
        _ => println!("{v}"),
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Extract(args) => run_extract(args).await?,
        Commands::Scan(args) => run_scan(args).await?,
        Commands::Doctor(args) => run_doctor(args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "pactext",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pactext {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            0
        }
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
