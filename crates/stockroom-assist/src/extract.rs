//! Tolerant extraction of structured data from model replies.
//!
//! Vision models wrap JSON in prose or Markdown fences and mix key languages:
//!
//! ````text
//! Here is what I found:
//! ```json
//! {"nombre": "Coca-Cola 1.5L", "precio": "1.990", "marca": "Coca-Cola"}
//! ```
//! ````
//!
//! [`extract_json`] finds the object, [`hints_from_json`] maps the keys.

use serde_json::{Map, Value};
use stockroom_core::Money;

use crate::types::ProductHints;

/// Finds the first JSON object in `reply`.
///
/// Tries, in order: the whole reply, a fenced code block, and the span from
/// the first `{` to the last `}`.
pub fn extract_json(reply: &str) -> Option<Map<String, Value>> {
    let trimmed = reply.trim();

    let candidates = [
        Some(trimmed),
        fenced_block(trimmed),
        brace_span(trimmed),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // skip an info string such as "json"
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Maps an extracted object onto [`ProductHints`].
///
/// Accepts English and Spanish keys. Prices may be numbers or strings
/// (`"$1.990"`, `"12,50"`); unparseable prices are dropped.
pub fn hints_from_json(map: &Map<String, Value>) -> ProductHints {
    let text = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| map.get(*key))
            .find_map(value_as_text)
    };

    let brand = text(&["brand", "marca"]);
    let notes = text(&["description", "descripcion", "observaciones", "notes"]);
    let description = match (brand, notes) {
        (Some(brand), Some(notes)) => Some(format!("{brand}. {notes}")),
        (Some(brand), None) => Some(brand),
        (None, notes) => notes,
    };

    ProductHints {
        name: text(&["name", "nombre", "product"]),
        code: text(&["code", "codigo", "sku", "barcode"]).map(|c| sanitize_code(&c)).filter(|c| !c.is_empty()),
        price_cents: ["price", "precio"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(price_cents),
        category: text(&["category", "categoria"]),
        description,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = text.to_lowercase();
    if text.is_empty() || matches!(lowered.as_str(), "null" | "n/a" | "none" | "desconocido" | "no visible") {
        None
    } else {
        Some(text)
    }
}

fn price_cents(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(units) = n.as_i64() {
                return units.checked_mul(100).filter(|c| *c >= 0);
            }
            let cents = (n.as_f64()? * 100.0).round();
            (cents >= 0.0 && cents < i64::MAX as f64).then_some(cents as i64)
        }
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            Money::parse(&cleaned)
                .ok()
                .or_else(|| {
                    // thousands separators, e.g. "1.990"
                    let digits: String = cleaned.trim_start_matches('$').chars().filter(|c| *c != '.').collect();
                    Money::parse(&digits).ok()
                })
                .map(|m| m.cents())
        }
        _ => None,
    }
}

/// Keeps characters a product code may hold; spaces become hyphens.
fn sanitize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .take(50)
        .collect()
}
