//! Byte-pattern text scanner for PDF bodies.
//!
//! This is intentionally *not* a PDF reader: there is no xref/object model, no font
//! encoding tables, no stream decompression. Four independent pattern passes look for
//! the places where uncompressed PDFs keep literal text, and a merge stage unions and
//! deduplicates what they find.
//!
//! Notes:
//! - Decoding is lossy (`from_utf8_lossy`), so the scanner never fails.
//! - Worst case is an empty string and a page count of 1.

use pactext_core::ExtractionCandidate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Content-stream regions shorter than this (after normalization) are dropped.
const MIN_STREAM_CHARS: usize = 20;
const MIN_SHOW_TEXT_CHARS: usize = 1;
const MIN_ARRAY_TEXT_CHARS: usize = 2;
const MIN_TEXT_OBJECT_CHARS: usize = 5;

fn stream_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)stream(.*?)endstream").expect("static regex"))
}

fn stream_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"endstream|stream").expect("static regex"))
}

fn show_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\(((?:\\.|[^\\)])*)\)\s*Tj").expect("static regex"))
}

fn array_show_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[([^\]]*)\]\s*TJ").expect("static regex"))
}

fn text_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\bBT\b(.*?)\bET\b").expect("static regex"))
}

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\(((?:\\.|[^\\)])*)\)").expect("static regex"))
}

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/Type\s*/(Page\w*)").expect("static regex"))
}

fn has_letter(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic())
}

fn has_letter_run(s: &str, min_run: usize) -> bool {
    let mut run = 0usize;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the backslash escapes of a PDF literal string body.
///
/// Handles `\n`, `\r` (dropped), `\t`, `\(`, `\)` and `\\`. With `octal`, three-digit
/// octal escapes (`\101`) become the corresponding character. Anything else is kept
/// verbatim, backslash included.
pub fn decode_literal(raw: &str, octal: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' || i + 1 >= chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let next = chars[i + 1];
        match next {
            'n' => out.push('\n'),
            'r' => {}
            't' => out.push('\t'),
            '(' | ')' | '\\' => out.push(next),
            d if octal && d.is_digit(8) => {
                let digits: String = chars[i + 1..].iter().take(3).collect();
                let value = (digits.chars().count() == 3
                    && digits.chars().all(|x| x.is_digit(8)))
                .then(|| u32::from_str_radix(&digits, 8).ok())
                .flatten()
                .and_then(char::from_u32);
                match value {
                    Some(ch) => {
                        out.push(ch);
                        i += 4;
                        continue;
                    }
                    None => {
                        out.push('\\');
                        i += 1;
                        continue;
                    }
                }
            }
            _ => {
                out.push('\\');
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    out
}

/// Pass 1: raw `stream ... endstream` regions with binary noise blanked out.
pub(crate) fn content_stream_lines(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in stream_re().captures_iter(raw) {
        let body = stream_keyword_re().replace_all(&cap[1], "");
        let printable: String = body
            .chars()
            .map(|c| match c {
                ' '..='~' | '\n' | '\r' | '\t' => c,
                _ => ' ',
            })
            .collect();
        let cleaned = norm_ws(&printable);
        if cleaned.chars().count() > MIN_STREAM_CHARS && has_letter_run(&cleaned, 3) {
            out.push(cleaned);
        }
    }
    out
}

/// Pass 2: `(literal) Tj`, survivors joined into one line.
pub(crate) fn show_text_lines(raw: &str) -> Vec<String> {
    let kept: Vec<String> = show_text_re()
        .captures_iter(raw)
        .map(|cap| decode_literal(&cap[1], false))
        .filter(|t| t.chars().count() > MIN_SHOW_TEXT_CHARS && has_letter(t))
        .collect();
    if kept.is_empty() {
        return Vec::new();
    }
    vec![kept.join(" ")]
}

/// Pass 3: `[(frag) -250 (ments)] TJ`, one line per array.
pub(crate) fn array_show_lines(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in array_show_re().captures_iter(raw) {
        // Kerned fragments of the same run: no separator.
        let text: String = literal_re()
            .captures_iter(&cap[1])
            .map(|lit| decode_literal(&lit[1], true))
            .collect();
        if text.chars().count() > MIN_ARRAY_TEXT_CHARS && has_letter(&text) {
            out.push(text);
        }
    }
    out
}

/// Pass 4: literals inside `BT ... ET` text objects, one line per block.
pub(crate) fn text_object_lines(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in text_object_re().captures_iter(raw) {
        let parts: Vec<String> = literal_re()
            .captures_iter(&cap[1])
            .map(|lit| decode_literal(&lit[1], false))
            .filter(|t| has_letter(t))
            .collect();
        let block = parts.join(" ");
        if block.chars().count() > MIN_TEXT_OBJECT_CHARS && has_letter(&block) {
            out.push(block);
        }
    }
    out
}

/// Merge pass outputs (in order), normalize whitespace and drop repeated lines.
///
/// Overlapping pass families routinely capture the same literal twice (a `Tj` inside a
/// `BT` block is seen by passes 2 and 4); the first occurrence wins.
pub(crate) fn merge_lines(passes: &[Vec<String>]) -> String {
    let mut joined = String::new();
    for pass in passes {
        for line in pass {
            joined.push_str(line);
            joined.push('\n');
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    let mut prev_blank = false;
    for line in joined.lines() {
        let norm = norm_ws(line);
        if norm.is_empty() {
            if !out.is_empty() && !prev_blank {
                out.push(String::new());
                prev_blank = true;
            }
            continue;
        }
        if !seen.insert(norm.clone()) {
            continue;
        }
        out.push(norm);
        prev_blank = false;
    }
    out.join("\n").trim().to_string()
}

fn count_page_markers(raw: &str) -> usize {
    page_marker_re()
        .captures_iter(raw)
        .filter(|cap| &cap[1] == "Page")
        .count()
}

/// Estimate page count from `/Type /Page` objects (`/Pages` tree nodes excluded).
///
/// Never returns 0.
pub fn estimate_page_count(bytes: &[u8]) -> usize {
    count_page_markers(&String::from_utf8_lossy(bytes)).max(1)
}

/// Run all four passes plus the page estimate over a raw buffer.
pub fn scan_native(bytes: &[u8]) -> ExtractionCandidate {
    let raw = String::from_utf8_lossy(bytes);

    let passes = [
        content_stream_lines(&raw),
        show_text_lines(&raw),
        array_show_lines(&raw),
        text_object_lines(&raw),
    ];
    tracing::debug!(
        streams = passes[0].len(),
        show_text = passes[1].len(),
        array_show = passes[2].len(),
        text_objects = passes[3].len(),
        "native scan passes"
    );

    let text = merge_lines(&passes);
    let page_count = count_page_markers(&raw).max(1);
    ExtractionCandidate { text, page_count }
}
