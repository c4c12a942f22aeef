//! Payload normalization
//!
//! The backend answers in several shapes depending on the access path:
//!
//! 1. Data API script wrapper: `{response: {scriptResult, scriptError}}`
//! 2. Script envelope: `{scriptResult: {code, resultParameter}}`
//! 3. Data API layout response: `{response: {data: [...]}}`
//! 4. OData collection: `{value: [...]}`
//!
//! [`normalize`] turns all of them into [`Record`]s. It never fails; problems
//! with a recognized payload are reported through [`Normalized::error`].

use serde_json::{Map, Value};

use super::models::{Record, id_text};
use crate::records::aliases::{MOD_ID_KEYS, RECORD_ID_KEYS};

/// Which payload shape produced the records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Unknown,
    DataApiScript,
    Script,
    DataApi,
    OData,
}

impl std::fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PayloadSource::Unknown => "unknown",
            PayloadSource::DataApiScript => "data-api-script",
            PayloadSource::Script => "script",
            PayloadSource::DataApi => "data-api",
            PayloadSource::OData => "odata",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub source: PayloadSource,
    pub error: Option<String>,
}

impl Normalized {
    fn ok(source: PayloadSource, records: Vec<Record>) -> Self {
        Self {
            records,
            source,
            error: None,
        }
    }

    fn failed(source: PayloadSource, error: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            source,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Normalize any supported payload into records
pub fn normalize(payload: &Value) -> Normalized {
    let Some(object) = payload.as_object() else {
        return Normalized::ok(PayloadSource::Unknown, Vec::new());
    };
    if object.is_empty() {
        return Normalized::ok(PayloadSource::Unknown, Vec::new());
    }

    let response = object.get("response").and_then(Value::as_object);

    if let Some(response) = response
        && (response.contains_key("scriptResult") || response.contains_key("scriptError"))
    {
        return normalize_data_api_script(response);
    }

    if let Some(envelope) = object.get("scriptResult").filter(|v| is_truthy(v)) {
        return normalize_script_envelope(envelope);
    }

    if let Some(data) = response.and_then(|r| r.get("data")).and_then(Value::as_array) {
        let records = data.iter().filter_map(Record::from_data_api).collect();
        return Normalized::ok(PayloadSource::DataApi, records);
    }

    if let Some(entries) = object.get("value").and_then(Value::as_array) {
        let records = entries.iter().filter_map(odata_record).collect();
        return Normalized::ok(PayloadSource::OData, records);
    }

    Normalized::failed(PayloadSource::Unknown, "unrecognized payload structure")
}

fn normalize_data_api_script(response: &Map<String, Value>) -> Normalized {
    let source = PayloadSource::DataApiScript;

    if let Some(code) = response.get("scriptError").and_then(script_code)
        && code != 0.0
    {
        return Normalized::failed(source, format!("script returned error code {}", code));
    }

    let result = response.get("scriptResult").unwrap_or(&Value::Null);
    match script_entries(result) {
        Ok(entries) => Normalized::ok(source, entries.iter().filter_map(script_record).collect()),
        Err(message) => Normalized::failed(source, message),
    }
}

fn normalize_script_envelope(envelope: &Value) -> Normalized {
    let source = PayloadSource::Script;

    if let Some(code) = envelope.get("code").and_then(Value::as_f64)
        && code != 0.0
    {
        return Normalized::failed(source, format!("script returned error code {}", code));
    }

    let result = envelope.get("resultParameter").unwrap_or(&Value::Null);
    match script_entries(result) {
        Ok(entries) => Normalized::ok(source, entries.iter().filter_map(script_record).collect()),
        Err(message) => Normalized::failed(source, message),
    }
}

/// Numeric script error code; textual codes that are not numbers are ignored
fn script_code(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Entries of a script result, possibly encoded as a JSON string
fn script_entries(result: &Value) -> Result<Vec<Value>, String> {
    match result {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::Object(_) => list_from_container(result)
            .ok_or_else(|| "script returned JSON without the expected record list".to_string()),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            let parsed: Value = serde_json::from_str(trimmed).map_err(|e| {
                format!("could not interpret the script response. Detail: {}", e)
            })?;
            match parsed {
                Value::Array(items) => Ok(items),
                other => list_from_container(&other).ok_or_else(|| {
                    "script returned JSON without the expected record list".to_string()
                }),
            }
        }
        _ => Err("unsupported script response format".to_string()),
    }
}

fn list_from_container(value: &Value) -> Option<Vec<Value>> {
    ["records", "data"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .cloned()
}

/// Script entries keep every key in `fieldData`
fn script_record(entry: &Value) -> Option<Record> {
    let object = entry.as_object()?;
    let record_id = first_present(object, RECORD_ID_KEYS).and_then(|(_, v)| id_text(v));
    let mod_id = first_present(object, MOD_ID_KEYS).and_then(|(_, v)| id_text(v));

    Some(Record {
        record_id,
        mod_id,
        field_data: object.clone(),
        portal_data: Map::new(),
        raw: entry.clone(),
    })
}

/// OData entries drop `@odata*` annotations and hoist the matched id keys
fn odata_record(entry: &Value) -> Option<Record> {
    let object = entry.as_object()?;
    let record_key = first_present(object, RECORD_ID_KEYS);
    let mod_key = first_present(object, MOD_ID_KEYS);

    let field_data = object
        .iter()
        .filter(|(key, _)| !key.starts_with("@odata"))
        .filter(|(key, _)| {
            record_key.is_none_or(|(k, _)| k != key.as_str())
                && mod_key.is_none_or(|(k, _)| k != key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(Record {
        record_id: record_key.and_then(|(_, v)| id_text(v)),
        mod_id: mod_key.and_then(|(_, v)| id_text(v)),
        field_data,
        portal_data: Map::new(),
        raw: entry.clone(),
    })
}

fn first_present<'a>(
    object: &'a Map<String, Value>,
    keys: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|key| object.get(*key).map(|value| (*key, value)))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields_without_ids(record: &Record) -> Map<String, Value> {
        record
            .field_data
            .iter()
            .filter(|(k, _)| !RECORD_ID_KEYS.contains(&k.as_str()) && !MOD_ID_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equivalent_payloads_yield_same_records() {
        let data_api = json!({
            "response": { "data": [
                { "recordId": "5", "modId": "2", "fieldData": { "nombreCompleto": "Ana Ruiz", "isActivo": 1 } }
            ]}
        });
        let script = json!({
            "response": {
                "scriptError": "0",
                "scriptResult": "[{\"recordId\":\"5\",\"modId\":\"2\",\"nombreCompleto\":\"Ana Ruiz\",\"isActivo\":1}]"
            }
        });
        let odata = json!({
            "@odata.context": "https://fm/odata/$metadata#Clientes",
            "value": [
                { "@odata.etag": "W/\"2\"", "recordId": 5, "modId": 2, "nombreCompleto": "Ana Ruiz", "isActivo": 1 }
            ]
        });

        let results: Vec<Normalized> = [&data_api, &script, &odata].iter().map(|p| normalize(p)).collect();
        let sources: Vec<PayloadSource> = results.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![PayloadSource::DataApi, PayloadSource::DataApiScript, PayloadSource::OData]
        );

        for result in &results {
            assert!(result.is_ok(), "{:?}", result.error);
            assert_eq!(result.records.len(), 1);
            let record = &result.records[0];
            assert_eq!(record.record_id.as_deref(), Some("5"));
            assert_eq!(record.mod_id.as_deref(), Some("2"));
            assert_eq!(
                fields_without_ids(record),
                json!({ "nombreCompleto": "Ana Ruiz", "isActivo": 1 }).as_object().unwrap().clone()
            );
            assert!(!record.raw.is_null());
        }
    }

    #[test]
    fn test_script_error_code_is_reported() {
        let payload = json!({ "response": { "scriptError": "3", "scriptResult": "[]" } });
        let result = normalize(&payload);
        assert_eq!(result.source, PayloadSource::DataApiScript);
        assert_eq!(result.error.as_deref(), Some("script returned error code 3"));
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_script_result_containers() {
        let records = normalize(&json!({
            "response": { "scriptResult": { "records": [{ "id": "a" }] } }
        }));
        assert_eq!(records.records[0].record_id.as_deref(), Some("a"));
        assert!(records.records[0].field_data.contains_key("id"));

        let data = normalize(&json!({
            "response": { "scriptResult": "{\"data\":[{\"RecordID\":7},3]}" }
        }));
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].record_id.as_deref(), Some("7"));

        let blank = normalize(&json!({ "response": { "scriptResult": "   " } }));
        assert!(blank.is_ok());
        assert!(blank.records.is_empty());
    }

    #[test]
    fn test_script_result_errors() {
        let broken = normalize(&json!({ "response": { "scriptResult": "[{" } }));
        assert!(broken.error.unwrap().starts_with("could not interpret the script response. Detail:"));

        let no_list = normalize(&json!({ "response": { "scriptResult": "{\"ok\":true}" } }));
        assert_eq!(
            no_list.error.as_deref(),
            Some("script returned JSON without the expected record list")
        );

        let number = normalize(&json!({ "response": { "scriptResult": 12 } }));
        assert_eq!(number.error.as_deref(), Some("unsupported script response format"));
    }

    #[test]
    fn test_script_envelope_shape() {
        let failed = normalize(&json!({ "scriptResult": { "code": 401, "resultParameter": "" } }));
        assert_eq!(failed.source, PayloadSource::Script);
        assert_eq!(failed.error.as_deref(), Some("script returned error code 401"));

        let ok = normalize(&json!({
            "scriptResult": { "code": 0, "resultParameter": [{ "__RecordId": "9", "__ModId": "1", "x": 1 }] }
        }));
        assert!(ok.is_ok());
        assert_eq!(ok.records[0].record_id.as_deref(), Some("9"));
        assert_eq!(ok.records[0].mod_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_odata_keeps_unknown_id_variants_in_field_data() {
        let result = normalize(&json!({
            "value": [{ "ROWID": 3, "Id": "x-1", "recordId": "r1", "campo": "v" }]
        }));
        let record = &result.records[0];
        assert_eq!(record.record_id.as_deref(), Some("r1"));
        assert!(record.field_data.contains_key("ROWID"));
        // only the first matching id key is hoisted
        assert!(record.field_data.contains_key("Id"));
        assert!(!record.field_data.contains_key("recordId"));
    }

    #[test]
    fn test_empty_and_unrecognized_payloads() {
        assert!(normalize(&Value::Null).is_ok());
        assert!(normalize(&json!({})).is_ok());

        let unknown = normalize(&json!({ "foo": [] }));
        assert_eq!(unknown.source, PayloadSource::Unknown);
        assert_eq!(unknown.error.as_deref(), Some("unrecognized payload structure"));
    }
}
