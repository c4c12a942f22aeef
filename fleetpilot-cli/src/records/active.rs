//! Active-flag interpretation

use serde_json::{Map, Value};

use super::aliases::{ACTIVE_FLAG_FIELDS, normalize_search_text};
use crate::api::models::Record;

const TRUE_TOKENS: &[&str] = &["true", "t", "yes", "y", "si", "1"];
const FALSE_TOKENS: &[&str] = &["false", "f", "no", "n", "0"];

/// Interpret a boolean-like value. `None` means the value says nothing.
pub fn interpret_active_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().filter(|f| !f.is_nan()).map(|f| f != 0.0),
        Value::String(text) => {
            let normalized = normalize_search_text(text.trim());
            if normalized.is_empty() {
                return None;
            }
            if TRUE_TOKENS.contains(&normalized.as_str()) {
                return Some(true);
            }
            if FALSE_TOKENS.contains(&normalized.as_str()) {
                return Some(false);
            }
            parse_plain_number(&normalized).map(|f| f != 0.0)
        }
        _ => None,
    }
}

/// Signed decimal without exponent; `inf` and `nan` spellings are not numbers
fn parse_plain_number(text: &str) -> Option<f64> {
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn flag_in(source: &Map<String, Value>) -> Option<bool> {
    ACTIVE_FLAG_FIELDS
        .iter()
        .filter_map(|field| source.get(*field))
        .find_map(interpret_active_flag)
}

/// A record is active when the first interpretable flag, searched in
/// `fieldData` then in the raw entry, is true
pub fn is_record_active(record: &Record) -> bool {
    if let Some(flag) = flag_in(&record.field_data) {
        return flag;
    }
    if let Some(flag) = record.raw.as_object().and_then(flag_in) {
        return flag;
    }
    false
}

/// Keep only active records
pub fn filter_active(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().filter(is_record_active).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(field_data: Value) -> Record {
        Record {
            field_data: field_data.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn test_truthy_values() {
        for value in [json!("Si"), json!("Sí"), json!("1"), json!(true), json!(1), json!(" YES "), json!("2")] {
            assert_eq!(interpret_active_flag(&value), Some(true), "{}", value);
        }
    }

    #[test]
    fn test_falsy_values() {
        for value in [json!("No"), json!("0"), json!(false), json!(0), json!("f"), json!("0.0")] {
            assert_eq!(interpret_active_flag(&value), Some(false), "{}", value);
        }
    }

    #[test]
    fn test_unknown_values() {
        for value in [
            json!("quizás"),
            json!(""),
            json!(null),
            json!({}),
            json!([1]),
            json!("inf"),
            json!("NaN"),
            json!("infinity"),
        ] {
            assert_eq!(interpret_active_flag(&value), None, "{}", value);
        }
    }

    #[test]
    fn test_unknown_variant_continues_search() {
        let record = record_with(json!({ "isActivo": "tal vez", "Activo": "Si" }));
        assert!(is_record_active(&record));
    }

    #[test]
    fn test_unrecognized_on_all_variants_is_inactive() {
        let record = record_with(json!({ "isActivo": "tal vez", "activo": "pendiente" }));
        assert!(!is_record_active(&record));
        assert!(!is_record_active(&record_with(json!({ "nombre": "Ana" }))));
    }

    #[test]
    fn test_raw_entry_is_searched_after_field_data() {
        let record = Record {
            raw: json!({ "esActivo": 1 }),
            ..record_with(json!({ "nombre": "Ana" }))
        };
        assert!(is_record_active(&record));
    }

    #[test]
    fn test_filter_active() {
        let records = vec![
            record_with(json!({ "isActivo": 1 })),
            record_with(json!({ "isActivo": 0 })),
            record_with(json!({ "ACTIVO": "si" })),
        ];
        assert_eq!(filter_active(records).len(), 2);
    }
}
