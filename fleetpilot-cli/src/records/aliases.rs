//! Declarative alias tables and name normalization
//!
//! Every spelling variant the backend has used for a logical attribute lives
//! in one of the tables below. Lookups go through pure functions so new
//! spellings only require touching data.

use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

/// Keys recognized as the backend record identifier, in priority order
pub const RECORD_ID_KEYS: &[&str] = &[
    "__RecordId",
    "__RecordID",
    "__recordId",
    "__recordID",
    "__recordid",
    "recordId",
    "RecordId",
    "RecordID",
    "recordID",
    "recordid",
    "id",
    "ID",
    "Id",
];

/// Keys recognized as the backend modification id, in priority order
pub const MOD_ID_KEYS: &[&str] = &[
    "__ModId", "__ModID", "__modId", "__modID", "__modid", "modId", "ModId", "ModID",
];

/// Field names tried (in order) when choosing a row's record key
pub const PRIMARY_KEY_FIELDS: &[&str] = &["id", "ID", "Id", "uuid", "UUID", "Uuid"];

/// Field names that may carry the active flag
pub const ACTIVE_FLAG_FIELDS: &[&str] = &[
    "isActivo", "IsActivo", "ISACTIVO", "activo", "Activo", "ACTIVO", "esActivo", "EsActivo",
    "ESACTIVO",
];

/// Normalized name of the identifier column, never displayed
pub const HIDDEN_COLUMN: &str = "id";

/// Primary column groups in canonical display order.
/// Each group lists the normalized spellings accepted for that column.
pub const PRIMARY_COLUMN_ALIASES: &[&[&str]] = &[
    &["nombrecompleto"],
    &[
        "dni",
        "documentoidentidad",
        "ndocumentoidentidad",
        "ndcumentoidentidad",
    ],
    &["estado"],
    &["matricula", "matriculavehiculoasignado", "matriculaasignada"],
    &["nombreinversor", "inversornombre"],
    &[
        "numerotarjetacombustible",
        "tarjetacombustible",
        "ntarjetacombustible",
    ],
    &["numerotarjetaefectivo", "tarjetaefectivo", "ntarjetaefectivo"],
];

/// Logical attributes shown in the driver summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    FullName,
    DocumentNumber,
    Status,
    Investor,
}

/// Accepted raw spellings per logical attribute, matched after normalization
pub const DRIVER_FIELD_ALIASES: &[(LogicalField, &[&str])] = &[
    (
        LogicalField::FullName,
        &["nombrecompleto", "nombre", "nombre completo"],
    ),
    (
        LogicalField::DocumentNumber,
        &[
            "ndocumentoidentidad",
            "documentoidentidad",
            "numerodocumento",
            "dni",
            "numero identificacion",
        ],
    ),
    (LogicalField::Status, &["estado", "estadogeneral"]),
    (LogicalField::Investor, &["nombreinversor", "inversornombre"]),
];

/// Accepted spellings for a logical attribute
pub fn aliases_for(field: LogicalField) -> &'static [&'static str] {
    DRIVER_FIELD_ALIASES
        .iter()
        .find(|(candidate, _)| *candidate == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Decompose to NFD and drop the combining diacritical marks block
pub fn strip_diacritics(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// Diacritic-free, lowercase, alphanumeric-only form of an arbitrary key
pub fn normalize_field_key(value: &str) -> String {
    strip_diacritics(value)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Normalized column name: the part after the last `::`, without
/// diacritics or punctuation, lowercased
pub fn normalize_column_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let base = match trimmed.rfind("::") {
        Some(pos) => &trimmed[pos + 2..],
        None => trimmed,
    };
    normalize_field_key(base)
}

/// Case/diacritic-insensitive text used for substring search
pub fn normalize_search_text(value: &str) -> String {
    strip_diacritics(value).to_lowercase()
}

pub fn is_hidden_column(name: &str) -> bool {
    normalize_column_name(name) == HIDDEN_COLUMN
}

/// Whether the column belongs to the default-visible group
pub fn is_default_visible(name: &str) -> bool {
    let normalized = normalize_column_name(name);
    !normalized.is_empty() && primary_group_index(&normalized).is_some()
}

/// Locked columns are always visible and cannot be hidden
pub fn is_locked_column(name: &str) -> bool {
    let normalized = normalize_column_name(name);
    normalized == HIDDEN_COLUMN || primary_group_index(&normalized).is_some()
}

/// Index of the primary group a normalized name belongs to
pub fn primary_group_index(normalized: &str) -> Option<usize> {
    PRIMARY_COLUMN_ALIASES
        .iter()
        .position(|group| group.contains(&normalized))
}

/// First non-empty value among the aliases of `field`.
///
/// The field data keys are normalized once; for each alias (in order) the
/// first key normalizing to the same form wins.
pub fn resolve_logical_field(field_data: &Map<String, Value>, field: LogicalField) -> Option<String> {
    let lookup: Vec<(String, &Value)> = field_data
        .iter()
        .map(|(key, value)| (normalize_field_key(key), value))
        .collect();

    for alias in aliases_for(field) {
        let wanted = normalize_field_key(alias);
        let Some((_, value)) = lookup.iter().find(|(key, _)| *key == wanted) else {
            continue;
        };
        if let Some(text) = scalar_text(value) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Text form of a scalar JSON value; `None` for null, objects and arrays
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
