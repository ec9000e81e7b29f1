//! Recovery of a structured document from free-form model output.
//!
//! Vision models wrap their JSON in markdown fences, apologies, and prose.
//! Parsing is an ordered list of strategies tried in sequence; the first one
//! that yields syntactically valid JSON wins. New strategies slot into the
//! list without touching the existing ones.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    // ```json ... ``` or bare ``` ... ```; non-greedy so the first fence wins.
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex is valid")
});

/// A strategy extracts a candidate JSON snippet from the raw text.
type Strategy = fn(&str) -> Option<String>;

fn whole_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn first_fenced_block(raw: &str) -> Option<String> {
    FENCED_BLOCK
        .captures(raw)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Scan for the first top-level `{…}` or `[…]` substring, balancing braces
/// and respecting string literals.
fn first_balanced_span(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find(|c| c == '{' || c == '[')?;
    let (open, close) = if bytes[start] == b'{' {
        (b'{', b'}')
    } else {
        (b'[', b']')
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

const STRATEGIES: &[(&str, Strategy)] = &[
    ("whole_text", whole_text),
    ("fenced_block", first_fenced_block),
    ("balanced_span", first_balanced_span),
];

/// Try each strategy in order; return the first candidate that deserializes.
/// `None` means extraction failed — callers must not treat it as empty data.
pub fn parse_first<T: DeserializeOwned>(raw: &str) -> Option<T> {
    for (name, strategy) in STRATEGIES {
        if let Some(candidate) = strategy(raw) {
            match serde_json::from_str::<T>(&candidate) {
                Ok(value) => {
                    debug!(strategy = name, "parsed structured document");
                    return Some(value);
                }
                Err(e) => {
                    debug!(strategy = name, error = %e, "strategy produced invalid JSON");
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::ExtractedInvoice;
    use serde_json::{json, Value};

    fn sample_json() -> String {
        json!({
            "supplier": "ACME SARL",
            "invoice_number": "F-2026-0042",
            "items": [
                {"reference": "SKU-1", "designation": "Widget", "quantity": "10"}
            ]
        })
        .to_string()
    }

    #[test]
    fn parses_bare_json() {
        let doc: ExtractedInvoice = parse_first(&sample_json()).expect("bare JSON parses");
        assert_eq!(doc.supplier.as_deref(), Some("ACME SARL"));
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = format!("Here is the result:\n```json\n{}\n```\nDone.", sample_json());
        let doc: ExtractedInvoice = parse_first(&raw).expect("fenced JSON parses");
        assert_eq!(doc.invoice_number.as_deref(), Some("F-2026-0042"));
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let raw = format!(
            "I analyzed the invoice carefully. {} I hope this helps!",
            sample_json()
        );
        let doc: ExtractedInvoice = parse_first(&raw).expect("embedded JSON parses");
        assert_eq!(doc.items[0].reference, "SKU-1");
    }

    #[test]
    fn all_three_routes_yield_the_same_document() {
        let bare = sample_json();
        let fenced = format!("```json\n{}\n```", bare);
        let prose = format!("Sure thing: {} — let me know.", bare);

        let a: Value = parse_first(&bare).unwrap();
        let b: Value = parse_first(&fenced).unwrap();
        let c: Value = parse_first(&prose).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn garbage_reports_failure() {
        assert!(parse_first::<ExtractedInvoice>("I could not read the image, sorry.").is_none());
        assert!(parse_first::<ExtractedInvoice>("").is_none());
        assert!(parse_first::<ExtractedInvoice>("{ truncated ...").is_none());
    }

    #[test]
    fn balanced_scan_respects_string_literals() {
        let raw = r#"note: {"designation": "box } with brace", "reference": "R1"} trailing"#;
        let v: Value = parse_first(raw).expect("braces inside strings are ignored");
        assert_eq!(v["reference"], "R1");
    }

    #[test]
    fn arrays_parse_for_batch_replies() {
        let raw = "```\n[{\"reference\": \"A\"}, {\"reference\": \"B\"}]\n```";
        let v: Vec<Value> = parse_first(raw).expect("array parses");
        assert_eq!(v.len(), 2);
    }
}
