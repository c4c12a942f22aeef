//! Canonical record model shared by every payload shape

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::records::aliases::scalar_text;

/// A row of a related table embedded in a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub field_data: Map<String, Value>,
}

/// Uniform record produced by the normalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    #[serde(default)]
    pub field_data: Map<String, Value>,
    /// Related-table name to its rows, in backend order
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub portal_data: Map<String, Value>,
    /// Untouched payload entry
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl Record {
    /// Build a record from a Data API `response.data` entry.
    /// Returns `None` for entries that are not objects.
    pub fn from_data_api(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let field_data = object
            .get("fieldData")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let portal_data = object
            .get("portalData")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(Self {
            record_id: object.get("recordId").and_then(id_text),
            mod_id: object.get("modId").and_then(id_text),
            field_data,
            portal_data,
            raw: entry.clone(),
        })
    }

    /// Rows of every portal, in backend order
    pub fn portals(&self) -> impl Iterator<Item = (&str, Vec<PortalRow>)> {
        self.portal_data
            .iter()
            .map(|(name, rows)| (name.as_str(), portal_rows(rows)))
    }

    /// Field value by exact name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.field_data.get(name)
    }
}

/// Portal rows of a `portalData` entry.
///
/// Rows carrying a `fieldData` object use it; flat Data API rows use their
/// own keys minus the row identifiers.
pub fn portal_rows(rows: &Value) -> Vec<PortalRow> {
    let Some(rows) = rows.as_array() else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            let Some(object) = row.as_object() else {
                return PortalRow::default();
            };
            let record_id = object.get("recordId").and_then(id_text);
            let field_data = match object.get("fieldData").and_then(Value::as_object) {
                Some(nested) => nested.clone(),
                None => object
                    .iter()
                    .filter(|(key, _)| key.as_str() != "recordId" && key.as_str() != "modId")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            };
            PortalRow {
                record_id,
                field_data,
            }
        })
        .collect()
}

/// Identifier text of a JSON value; null yields `None`
pub fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
        other => scalar_text(other),
    }
}

/// HTTP response as seen by the fetch chain
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    /// Parsed JSON body, `None` when empty
    pub body: Option<Value>,
    /// Set when a non-empty body was not valid JSON
    pub parse_error: Option<String>,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// First backend message of a Data API error envelope
    pub fn message(&self) -> Option<String> {
        self.body
            .as_ref()?
            .get("messages")?
            .as_array()?
            .iter()
            .find_map(|message| message.get("message").and_then(Value::as_str))
            .map(str::to_string)
    }

    /// First backend message code, numeric or textual
    pub fn message_code(&self) -> Option<String> {
        self.body
            .as_ref()?
            .get("messages")?
            .as_array()?
            .iter()
            .find_map(|message| message.get("code").and_then(id_text))
    }

    /// Backend message, else the status text, else a generic description
    pub fn describe(&self) -> String {
        self.message()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(self.status_text.clone()).filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Body of a `_find` request
#[derive(Debug, Clone, Serialize)]
pub struct FindRequest {
    pub query: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl FindRequest {
    /// Only active records
    pub fn active(limit: Option<u32>) -> Self {
        Self {
            query: vec![serde_json::json!({ "isActivo": 1 })],
            limit,
            offset: None,
        }
    }

    /// Smallest possible query, used to keep the session warm
    pub fn probe() -> Self {
        Self {
            query: vec![serde_json::json!({ "isActivo": 1 })],
            limit: Some(1),
            offset: Some(0),
        }
    }
}
