use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// JSON object as returned by the model, keys untouched.
pub type JsonObject = Map<String, Value>;

/// Which rung of the extraction ladder produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractedFrom {
    Fenced,
    Braced,
    Whole,
}

static FENCED_BLOCK: OnceLock<Regex> = OnceLock::new();

fn fenced_block() -> &'static Regex {
    FENCED_BLOCK.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
    })
}

/// Pull a JSON object out of free-form model output.
///
/// Tries, in order: the first fenced code block, the first balanced
/// brace-delimited substring that parses, then the whole response.
pub fn extract_object(response: &str) -> Option<(JsonObject, ExtractedFrom)> {
    if let Some(caps) = fenced_block().captures(response) {
        if let Some(obj) = parse_object(&caps[1]) {
            return Some((obj, ExtractedFrom::Fenced));
        }
        debug!("Fenced block found but did not parse as an object");
    }

    let mut from = 0;
    while let Some(offset) = response[from..].find('{') {
        let start = from + offset;
        if let Some(obj) = balanced_span(&response[start..]).and_then(parse_object) {
            return Some((obj, ExtractedFrom::Braced));
        }
        from = start + 1;
    }

    parse_object(response.trim()).map(|obj| (obj, ExtractedFrom::Whole))
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Length-bounded slice from an opening `{` to its matching `}`, honouring
/// string literals and escapes. `None` if the braces never balance.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
