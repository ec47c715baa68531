//! Record normalization
//!
//! Canvas returns rich-text fields as HTML, sometimes serializes integer ids
//! as floats, and nests discussion replies arbitrarily deep. The helpers here
//! turn that into flat records that fit one relational row each.

use crate::api::Record;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

/// Nested children of a discussion entry
const REPLIES_FIELD: &str = "replies";

/// Body of a discussion entry
const MESSAGE_FIELD: &str = "message";

fn markup_re() -> &'static Regex {
    static MARKUP_RE: OnceLock<Regex> = OnceLock::new();
    MARKUP_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid markup regex"))
}

/// Removes every `<...>` run from `text`
///
/// Not an HTML parser: a tag runs from `<` to the next `>`, entities are left
/// alone. Stripping twice gives the same result as stripping once.
pub fn strip_markup(text: &str) -> String {
    markup_re().replace_all(text, "").into_owned()
}

/// Strips markup from a string field in place; null and absent fields stay as they are
pub fn strip_markup_field(record: &mut Record, field: &str) {
    if let Some(Value::String(text)) = record.get_mut(field) {
        *text = strip_markup(text);
    }
}

/// Canonical string form of an identifier value
///
/// * integral floats lose their fraction (`123.0` → `"123"`)
/// * integers and strings are kept as written
/// * non-integral floats are stringified unchanged
/// * `null` has no identifier and yields `None`
pub fn canonical_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(canonical_number(n)),
        other => Some(other.to_string()),
    }
}

fn canonical_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }

    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => {
            if f.abs() < i64::MAX as f64 {
                (f as i64).to_string()
            } else {
                format!("{:.0}", f)
            }
        }
        _ => n.to_string(),
    }
}

/// True for `id` and every `*_id` field
pub fn is_id_field(key: &str) -> bool {
    key == "id" || key.ends_with("_id")
}

/// Rewrites every numeric identifier field of `record` to its canonical string
///
/// Strings and nulls are already canonical and stay as they are; other
/// value kinds under an id-like name are not identifiers and are left alone.
pub fn canonicalize_ids(record: &mut Record) {
    for (key, value) in record.iter_mut() {
        if let Value::Number(n) = value {
            if is_id_field(key) {
                *value = Value::String(canonical_number(n));
            }
        }
    }
}

/// Flattens a discussion reply tree into one record per entry
///
/// Entries come out in pre-order: each entry before its replies, siblings in
/// their original order. Every entry loses its `replies` field and has its
/// `message` stripped of markup.
pub fn flatten_replies(nodes: Vec<Record>) -> Vec<Record> {
    let mut flat = Vec::new();
    for node in nodes {
        push_entry(node, &mut flat);
    }
    flat
}

fn push_entry(mut node: Record, flat: &mut Vec<Record>) {
    let replies = node.shift_remove(REPLIES_FIELD);
    strip_markup_field(&mut node, MESSAGE_FIELD);
    flat.push(node);

    if let Some(Value::Array(children)) = replies {
        for child in children {
            match child {
                Value::Object(child) => push_entry(child, flat),
                other => tracing::trace!("Skipping non-object reply: {}", other),
            }
        }
    }
}

/// Serializes nested arrays and objects to JSON text so each field fits one column
pub fn flatten_nested(record: &mut Record) {
    for value in record.values_mut() {
        if value.is_array() || value.is_object() {
            *value = Value::String(value.to_string());
        }
    }
}
