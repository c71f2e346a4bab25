//! Typed scalar values as written in migration files.
//!
//! A value is written as raw text plus a type tag: `3|NUMBER`,
//! `archived|STRING`, `TRUE|BOOL`, `|NULL`.

use tabula_store::Value;

use crate::constants::{BOOL_TYPE, NULL_TYPE, NUMBER_TYPE, STRING_TYPE};
use crate::error::ParseError;

/// Decode `raw` according to `type_tag`.
///
/// Returns `Ok(None)` for `NULL`: such properties are left out of the
/// entity instead of being stored as an explicit null.
///
/// `BOOL` is permissive: `"true"` in any case is `true`, any other text
/// is `false`.
pub fn decode(raw: &str, type_tag: &str) -> Result<Option<Value>, ParseError> {
    match type_tag {
        STRING_TYPE => Ok(Some(Value::String(raw.to_string()))),
        NUMBER_TYPE => decode_number(raw).map(Some),
        BOOL_TYPE => Ok(Some(Value::Bool(raw.eq_ignore_ascii_case("true")))),
        NULL_TYPE => Ok(None),
        other => Err(ParseError::UnsupportedType(other.to_string())),
    }
}

fn decode_number(raw: &str) -> Result<Value, ParseError> {
    let invalid = |reason: String| ParseError::InvalidNumber {
        raw: raw.to_string(),
        reason,
    };

    if raw.contains('.') {
        raw.parse::<f64>()
            .map(Value::Double)
            .map_err(|e| invalid(e.to_string()))
    } else {
        raw.parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| invalid(e.to_string()))
    }
}

/// Encode a value as `(raw, type_tag)`, the inverse of [`decode`].
///
/// Floats always carry a decimal point so they decode back as floats.
pub fn encode(value: &Value) -> (String, &'static str) {
    match value {
        Value::String(s) => (s.clone(), STRING_TYPE),
        Value::Int64(n) => (n.to_string(), NUMBER_TYPE),
        Value::Double(n) => {
            let mut raw = n.to_string();
            if n.is_finite() && !raw.contains('.') {
                raw.push_str(".0");
            }
            (raw, NUMBER_TYPE)
        }
        Value::Bool(b) => (b.to_string(), BOOL_TYPE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_pick_representation_by_decimal_point() {
        assert_eq!(decode("3", "NUMBER").unwrap(), Some(Value::Int64(3)));
        assert_eq!(decode("-42", "NUMBER").unwrap(), Some(Value::Int64(-42)));
        assert_eq!(decode("3.5", "NUMBER").unwrap(), Some(Value::Double(3.5)));
        assert_eq!(decode("0.0", "NUMBER").unwrap(), Some(Value::Double(0.0)));
    }

    #[test]
    fn malformed_numbers_fail() {
        assert!(matches!(
            decode("abc", "NUMBER"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            decode("1.2.3", "NUMBER"),
            Err(ParseError::InvalidNumber { .. })
        ));
        // Integers must fit in an i64.
        assert!(matches!(
            decode("99999999999999999999", "NUMBER"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn bool_is_permissive() {
        assert_eq!(decode("TRUE", "BOOL").unwrap(), Some(Value::Bool(true)));
        assert_eq!(decode("true", "BOOL").unwrap(), Some(Value::Bool(true)));
        assert_eq!(decode("yse", "BOOL").unwrap(), Some(Value::Bool(false)));
        assert_eq!(decode("", "BOOL").unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn string_and_null() {
        assert_eq!(
            decode("archived", "STRING").unwrap(),
            Some(Value::String("archived".into()))
        );
        assert_eq!(decode("", "STRING").unwrap(), Some(Value::String(String::new())));
        assert_eq!(decode("", "NULL").unwrap(), None);
        assert_eq!(decode("ignored", "NULL").unwrap(), None);
    }

    #[test]
    fn unknown_type_tag() {
        assert_eq!(
            decode("1", "DATE"),
            Err(ParseError::UnsupportedType("DATE".into()))
        );
        // Tags are case-sensitive.
        assert!(decode("1", "number").is_err());
    }

    #[test]
    fn encoded_floats_decode_as_floats() {
        for n in [3.0, -0.5, 1e21, 123456.789] {
            let (raw, tag) = encode(&Value::Double(n));
            assert_eq!(decode(&raw, tag).unwrap(), Some(Value::Double(n)), "{raw}");
        }
    }
}
