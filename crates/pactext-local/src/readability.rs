//! Legibility check for natively scanned text.
//!
//! Decides whether a native scan is good enough to hand downstream, or whether OCR
//! should be attempted. The thresholds are empirical; treat them as knobs.

/// Words whose presence lets legally dense, punctuation-heavy text pass at a lower ratio.
pub const DOMAIN_MARKERS: &[&str] = &[
    "agreement",
    "party",
    "parties",
    "shall",
    "contract",
    "terms",
    "conditions",
    "liability",
    "payment",
    "termination",
    "clause",
    "section",
    "article",
    "hereby",
    "whereas",
    "therefore",
];

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_ratio(key: &str, default: f64) -> f64 {
    env(key)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadabilityPolicy {
    /// Texts shorter than this (in chars) are never readable.
    pub min_chars: usize,
    /// Ratio above which text is readable on its own.
    pub readable_ratio: f64,
    /// Ratio above which text is readable if it also contains a domain marker.
    pub marker_ratio: f64,
    pub markers: Vec<String>,
}

impl Default for ReadabilityPolicy {
    fn default() -> Self {
        Self {
            min_chars: 100,
            readable_ratio: 0.30,
            marker_ratio: 0.15,
            markers: DOMAIN_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ReadabilityPolicy {
    /// Defaults, with `PACTEXT_READABLE_RATIO` / `PACTEXT_MARKER_RATIO` overrides.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            readable_ratio: env_ratio("PACTEXT_READABLE_RATIO", d.readable_ratio),
            marker_ratio: env_ratio("PACTEXT_MARKER_RATIO", d.marker_ratio),
            ..d
        }
    }

    pub fn has_marker(&self, text: &str) -> bool {
        let lc = text.to_lowercase();
        self.markers.iter().any(|m| lc.contains(m.as_str()))
    }

    pub fn is_readable(&self, text: &str) -> bool {
        if text.chars().count() < self.min_chars {
            return false;
        }
        let ratio = readable_ratio(text);
        if ratio > self.readable_ratio {
            return true;
        }
        ratio > self.marker_ratio && self.has_marker(text)
    }
}

/// Fraction of whitespace tokens longer than 2 chars that are ASCII letters only.
pub fn readable_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut alpha = 0usize;
    for tok in text.split_whitespace() {
        if tok.chars().count() <= 2 {
            continue;
        }
        total += 1;
        if tok.chars().all(|c| c.is_ascii_alphabetic()) {
            alpha += 1;
        }
    }
    alpha as f64 / total.max(1) as f64
}

/// Classify with the default policy.
pub fn is_readable(text: &str) -> bool {
    ReadabilityPolicy::default().is_readable(text)
}
