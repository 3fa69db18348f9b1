//! JSON value comparison and pattern helpers shared by the in-process
//! evaluators (in-memory filtering, embedded document and key-value stores).

use super::Direction;
use crate::model::{field_value, Record};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

/// Equality with numeric normalization (`1 == 1.0`).
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

/// Total order for comparable values; `None` for mismatched types.
///
/// `null` sorts before everything, matching SQLite ordering.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Some(a.cmp(&b))
            } else {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Ordering comparison used by `gt`/`gte`/`lt`/`lte`; `null` never matches.
pub(crate) fn compare_operand(actual: &Value, operand: &Value) -> Option<Ordering> {
    if actual.is_null() || operand.is_null() {
        return None;
    }
    compare_values(actual, operand)
}

/// Compares two records by a list of sort keys. Incomparable values tie.
pub(crate) fn compare_records(keys: &[(&str, Direction)], left: &Record, right: &Record) -> Ordering {
    for (field, direction) in keys {
        let a = field_value(left, field).unwrap_or(&Value::Null);
        let b = field_value(right, field).unwrap_or(&Value::Null);
        let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Translates a SQL `LIKE` pattern into an anchored regex source.
///
/// Case folding matches SQLite: ASCII letters match either case, every other
/// character matches only itself.
pub(crate) fn like_pattern(pattern: &str) -> String {
    let mut out = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            letter if letter.is_ascii_alphabetic() => {
                out.push('[');
                out.push(letter.to_ascii_lowercase());
                out.push(letter.to_ascii_uppercase());
                out.push(']');
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

pub(crate) fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&like_pattern(pattern))
        .dot_matches_new_line(true)
        .build()
}

/// Compiles a Redis-style glob (`*`, `?`, `[...]`, `\` escapes).
pub(crate) fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(next.encode_utf8(&mut [0; 4])));
                }
            }
            '[' => {
                let mut class = String::from("[");
                let mut first = true;
                for next in chars.by_ref() {
                    match next {
                        ']' => break,
                        '^' if first => class.push('^'),
                        '-' => class.push('-'),
                        other => class.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                    }
                    first = false;
                }
                class.push(']');
                out.push_str(&class);
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Escapes glob metacharacters so `value` matches only itself.
pub(crate) fn glob_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
