//! Persisted layout of one packed record.
//!
//! ```text
//! description:  "1712000000000,null,1712000004242"
//!                 slot 0 live   │    slot 2 live
//!                               └─ slot 1 deleted
//! content:      ["{\"left\":\"a\"}","","{\"left\":\"b\"}"]
//! ```
//!
//! Live descriptions are percent-escaped so that a literal `null` or an
//! embedded comma survives the round trip. Descriptions without `%` or `,`
//! encode to themselves.

use md5::{Digest, Md5};
use serde_json::Value;

use crate::error::Result;

/// Lowercase hex MD5 of `content`, the checksum format of the hosted store.
pub fn md5_hex(content: &str) -> String {
    hex::encode(Md5::digest(content.as_bytes()))
}

/// Token marking a deleted (or never used) slot.
pub const DELETED_TOKEN: &str = "null";

fn escape(text: &str) -> String {
    if text == DELETED_TOKEN {
        return "%6Eull".to_string();
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("%25"),
            ',' => out.push_str("%2C"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(token: &str) -> String {
    if !token.contains('%') {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .get(1..3)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .filter(u8::is_ascii);
        match decoded {
            Some(byte) => {
                out.push(byte as char);
                rest = &tail[3..];
            }
            // Unknown escape: keep verbatim
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Serialize slot descriptions; `None` slots become [`DELETED_TOKEN`].
pub fn encode_descriptions(descriptions: &[Option<String>]) -> String {
    descriptions
        .iter()
        .map(|d| match d {
            Some(text) => escape(text),
            None => DELETED_TOKEN.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a record description; a missing description means no slots.
pub fn decode_descriptions(raw: Option<&str>) -> Vec<Option<String>> {
    match raw {
        None => Vec::new(),
        Some(raw) => raw
            .split(',')
            .map(|token| {
                if token == DELETED_TOKEN {
                    None
                } else {
                    Some(unescape(token))
                }
            })
            .collect(),
    }
}

/// Serialize slot values as a JSON string array.
pub fn encode_values(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

/// Checksum the server will report once `values` are stored.
pub fn values_checksum(values: &[String]) -> Result<String> {
    Ok(md5_hex(&encode_values(values)?))
}

/// Outcome of parsing stored content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValues {
    Valid(Vec<String>),
    /// An array with some non-string items; those read as empty and the
    /// content needs rewriting.
    Salvaged(Vec<String>),
    /// Nothing recoverable.
    Corrupt(String),
}

/// Parse stored content, padding short arrays to `live_slots` entries.
///
/// Missing content is an empty array. A JSON array with stray non-string
/// items keeps its strings; anything else, or an array without a single
/// non-empty string, is corrupt.
pub fn parse_values(raw: Option<&str>, live_slots: usize) -> ParsedValues {
    let items = match raw {
        None => Vec::new(),
        Some(raw) if raw.trim().is_empty() => Vec::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => return ParsedValues::Corrupt("content is not an array".to_string()),
            Err(e) => return ParsedValues::Corrupt(e.to_string()),
        },
    };

    let strict = items.iter().all(Value::is_string);
    let mut values: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => text,
            _ => String::new(),
        })
        .collect();
    if !strict && values.iter().all(String::is_empty) {
        return ParsedValues::Corrupt("array holds no strings".to_string());
    }
    if values.len() < live_slots {
        values.resize(live_slots, String::new());
    }
    if strict {
        ParsedValues::Valid(values)
    } else {
        ParsedValues::Salvaged(values)
    }
}
