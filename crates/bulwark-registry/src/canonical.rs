//! # Canonical JSON (RFC 8785 style)
//!
//! Semantically identical JSON documents must produce identical bytes before
//! they are hashed or signed. Two places depend on this:
//!
//! - capability fingerprints recorded at registration
//! - token signatures and parameter binding in the policy engine, where
//!   `{"a":1,"b":2}` and `{"b":2,"a":1}` must be the same parameters
//!
//! Rules applied:
//!
//! 1. Object keys sorted by UTF-16 code units
//! 2. Integral numbers without a fraction, other numbers in shortest form
//! 3. Minimal string escaping
//! 4. No insignificant whitespace
//! 5. Array order preserved
//!
//! ```rust
//! use bulwark_registry::canonical::canonical_json;
//! use serde_json::json;
//!
//! assert_eq!(
//!     canonical_json(&json!({"b": 1, "a": [true, null]})),
//!     r#"{"a":[true,null],"b":1}"#
//! );
//! ```

use std::cmp::Ordering;
use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Canonical string form of `value`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Hex-encoded SHA-256 of the canonical form.
pub fn fingerprint(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    hex::encode(digest)
}

/// True if `a` and `b` have the same canonical form.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
    } else if let Some(f) = n.as_f64() {
        if !f.is_finite() {
            out.push_str("null");
        } else if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
            // Integral floats within the exact range print without ".0".
            let _ = write!(out, "{}", f as i64);
        } else {
            let _ = write!(out, "{}", f);
        }
    } else {
        out.push_str(&n.to_string());
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{20}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| utf16_cmp(a, b));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}
