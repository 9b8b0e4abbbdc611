//! Best-effort parsing of "almost JSON" model output.
//!
//! Models that are not held to a JSON response format tend to answer with
//! Python-literal dicts (`{'a': True}`), trailing commas, or JSON wrapped in a
//! markdown fence or a sentence. [`repair_parse`] accepts all of these.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON|python)?\s*([\s\S]*?)\s*```").expect("valid regex"));
static OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));
static ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").expect("valid regex"));

/// Parse `text` as JSON, falling back to Python-literal normalization and to
/// extracting an embedded object/array. Returns `None` if nothing parses.
///
/// Any JSON value is accepted, scalars included; JSON mode narrows this to
/// objects and arrays.
pub fn repair_parse(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Some(v) = parse_candidate(text) {
        return Some(v);
    }

    let mut candidates: Vec<&str> = Vec::new();
    if let Some(inner) = FENCED.captures(text).and_then(|c| c.get(1)) {
        candidates.push(inner.as_str());
    }
    for re in [&*OBJECT, &*ARRAY] {
        if let Some(m) = re.find(text) {
            candidates.push(m.as_str());
        }
    }

    candidates.into_iter().find_map(parse_candidate)
}

fn parse_candidate(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    serde_json::from_str(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&normalize_python_literal(candidate)).ok())
}

/// Rewrite Python-literal syntax into JSON:
/// single-quoted strings become double-quoted, `True`/`False`/`None` become
/// `true`/`false`/`null`, and trailing commas before `}`/`]` are dropped.
/// Text inside string literals is never touched.
pub fn normalize_python_literal(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                i = copy_string_literal(&chars, i, &mut out);
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Copy the string literal starting at `start` as a double-quoted JSON
/// string. Returns the index just past the closing quote.
fn copy_string_literal(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '\'' {
                // \' is not a JSON escape
                out.push('\'');
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    // Unterminated literal: close it so the caller gets a parse attempt.
    out.push('"');
    i
}
