//! Row projection: records to display-ready text

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::aliases::{
    LogicalField, PRIMARY_KEY_FIELDS, is_hidden_column, normalize_search_text,
    resolve_logical_field, scalar_text,
};
use crate::api::models::Record;

/// Separator between fragments of one cell
pub const FRAGMENT_SEPARATOR: &str = " · ";

/// Placeholder for missing summary values
pub const MISSING_VALUE: &str = "—";

/// Badge category of a status value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Success,
    Danger,
    Warning,
    Secondary,
    Neutral,
}

impl StatusCategory {
    /// Badge class used by HTML-ish consumers (json output)
    pub fn badge_class(self) -> &'static str {
        match self {
            StatusCategory::Success => "bg-success-subtle text-success",
            StatusCategory::Danger => "bg-danger-subtle text-danger",
            StatusCategory::Warning => "bg-warning-subtle text-warning",
            StatusCategory::Secondary => "bg-secondary-subtle text-secondary",
            StatusCategory::Neutral => "bg-light text-body",
        }
    }
}

/// Formatted status value with its badge category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: String,
    pub category: StatusCategory,
}

/// Map a raw status to its badge
pub fn format_status(raw: Option<&str>) -> StatusBadge {
    let label = raw.map(str::trim).unwrap_or_default();
    if label.is_empty() {
        return StatusBadge {
            label: "Sin estado".to_string(),
            category: StatusCategory::Neutral,
        };
    }

    let normalized = normalize_search_text(label);
    let category = match normalized.as_str() {
        "contratado" | "activo" => StatusCategory::Success,
        "suspendido" => StatusCategory::Danger,
        "pendiente" => StatusCategory::Warning,
        "baja" | "finalizado" => StatusCategory::Secondary,
        other if other.contains("bolsa") => StatusCategory::Warning,
        _ => StatusCategory::Neutral,
    };

    StatusBadge {
        label: label.to_string(),
        category,
    }
}

/// Summary of the fields every driver view shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    pub nombre_completo: String,
    pub numero_documento: String,
    pub estado: StatusBadge,
    pub nombre_inversor: String,
}

impl DriverSummary {
    pub fn from_record(record: &Record) -> Self {
        let lookup = |field| {
            resolve_logical_field(&record.field_data, field)
                .unwrap_or_else(|| MISSING_VALUE.to_string())
        };
        let status = resolve_logical_field(&record.field_data, LogicalField::Status);

        Self {
            nombre_completo: lookup(LogicalField::FullName),
            numero_documento: lookup(LogicalField::DocumentNumber),
            estado: format_status(status.as_deref()),
            nombre_inversor: lookup(LogicalField::Investor),
        }
    }

    /// Searchable text of the summary, normalized
    pub fn search_text(&self) -> String {
        normalize_search_text(
            &[
                self.nombre_completo.as_str(),
                self.numero_documento.as_str(),
                self.estado.label.as_str(),
                self.nombre_inversor.as_str(),
            ]
            .join(" "),
        )
    }
}

/// Display-ready view of one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedRow {
    pub record_key: String,
    pub record_id: Option<String>,
    /// Field name to text fragments, in first-seen order
    pub fields: IndexMap<String, Vec<String>>,
    pub summary: DriverSummary,
}

impl ProjectedRow {
    /// Joined cell text of a field
    pub fn cell_text(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map(|values| join_field_values(values))
            .unwrap_or_default()
    }
}

/// Project a record; `None` when it has no usable key
pub fn project(record: &Record) -> Option<ProjectedRow> {
    let record_key = primary_key(record)?;
    Some(ProjectedRow {
        record_key,
        record_id: record.record_id.clone(),
        fields: flatten_record_fields(record),
        summary: DriverSummary::from_record(record),
    })
}

/// Record key: an id-like field, else the backend record id
pub fn primary_key(record: &Record) -> Option<String> {
    PRIMARY_KEY_FIELDS
        .iter()
        .filter_map(|field| record.field_data.get(*field))
        .map(key_text)
        .find(|key| !key.is_empty())
        .or_else(|| {
            record
                .record_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
}

fn key_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => format_cell_value(other).trim().to_string(),
    }
}

/// Text for a single cell value
pub fn format_cell_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => scalar_text(other).unwrap_or_default(),
    }
}

/// Flatten field data and portals into named fragment lists.
///
/// Portal fields are named `portal::field`. With several portal rows each
/// fragment is prefixed with its 1-based row index.
pub fn flatten_record_fields(record: &Record) -> IndexMap<String, Vec<String>> {
    let mut fields: IndexMap<String, Vec<String>> = IndexMap::new();

    for (name, value) in &record.field_data {
        if is_hidden_column(name) {
            continue;
        }
        fields
            .entry(name.clone())
            .or_default()
            .push(format_cell_value(value));
    }

    for (portal, rows) in record.portals() {
        let numbered = rows.len() > 1;
        for (index, row) in rows.iter().enumerate() {
            for (field, value) in &row.field_data {
                let name = format!("{}::{}", portal, field);
                if is_hidden_column(&name) {
                    continue;
                }
                let formatted = format_cell_value(value);
                let fragment = if numbered {
                    let prefix = format!("[{}]", index + 1);
                    if formatted.is_empty() {
                        prefix
                    } else {
                        format!("{} {}", prefix, formatted)
                    }
                } else {
                    formatted
                };
                fields.entry(name).or_default().push(fragment);
            }
        }
    }

    fields
}

/// Join fragments, dropping blanks
pub fn join_field_values(values: &[String]) -> String {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

/// Field names across rows, first-seen order, hidden columns excluded
pub fn collect_field_names(rows: &[ProjectedRow]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for name in row.fields.keys() {
            if !is_hidden_column(name) && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// Human label for a record, used in selection snapshots and status lines
pub fn display_label(record: &Record) -> String {
    let text = |name: &str| {
        record
            .field_data
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(name) = ["nombreCompleto", "NombreCompleto", "nombrecompleto", "Nombre", "nombre"]
        .iter()
        .find_map(|key| text(key))
    {
        return name;
    }

    let composed: Vec<String> = ["nombre", "apellido1", "apellido2"]
        .iter()
        .filter_map(|key| text(key))
        .collect();
    if !composed.is_empty() {
        return composed.join(" ");
    }

    match record.record_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => format!("ID {}", id),
        _ => "conductor seleccionado".to_string(),
    }
}

/// Summaries matching every whitespace-separated token of `term`
pub fn quick_search<'a>(summaries: &'a [DriverSummary], term: &str) -> Vec<&'a DriverSummary> {
    let tokens: Vec<String> = normalize_search_text(term)
        .split_whitespace()
        .map(str::to_string)
        .collect();

    summaries
        .iter()
        .filter(|summary| {
            let haystack = summary.search_text();
            tokens.iter().all(|token| haystack.contains(token.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_example_projection() {
        let record = record(json!({
            "recordId": "5",
            "fieldData": { "nombreCompleto": "Ana Ruiz", "estado": "Contratado", "isActivo": 1 }
        }));

        let row = project(&record).unwrap();
        assert_eq!(row.record_key, "5");
        assert_eq!(row.cell_text("nombreCompleto"), "Ana Ruiz");
        assert_eq!(row.summary.nombre_completo, "Ana Ruiz");
        assert_eq!(row.summary.estado.label, "Contratado");
        assert_eq!(row.summary.estado.category, StatusCategory::Success);
    }

    #[test]
    fn test_primary_key_resolution() {
        let by_field = record(json!({ "recordId": "5", "fieldData": { "uuid": " abc ", "id": "  " } }));
        assert_eq!(primary_key(&by_field).as_deref(), Some("abc"));

        let numeric = record(json!({ "fieldData": { "ID": 42 } }));
        assert_eq!(primary_key(&numeric).as_deref(), Some("42"));

        let keyless = record(json!({ "recordId": "  ", "fieldData": { "nombre": "x" } }));
        assert_eq!(primary_key(&keyless), None);
        assert!(project(&keyless).is_none());
    }

    #[test]
    fn test_status_categories() {
        let cases = [
            ("Contratado", StatusCategory::Success),
            ("ACTIVO", StatusCategory::Success),
            ("Suspendido", StatusCategory::Danger),
            ("Pendiente", StatusCategory::Warning),
            ("Baja", StatusCategory::Secondary),
            ("Finalizado", StatusCategory::Secondary),
            ("En Bolsa", StatusCategory::Warning),
            ("Otro", StatusCategory::Neutral),
        ];
        for (raw, expected) in cases {
            assert_eq!(format_status(Some(raw)).category, expected, "{}", raw);
        }

        let empty = format_status(Some("  "));
        assert_eq!(empty.label, "Sin estado");
        assert_eq!(empty.category, StatusCategory::Neutral);
    }

    #[test]
    fn test_flatten_portal_rows() {
        let record = record(json!({
            "recordId": "1",
            "fieldData": { "id": "1", "nombre": "Ana", "extra": null, "meta": { "a": 1 } },
            "portalData": {
                "Vehiculos": [
                    { "recordId": "10", "Vehiculos::matricula": "1111AAA", "id": "x" },
                    { "recordId": "11", "Vehiculos::matricula": "" }
                ],
                "Tarjetas": [{ "fieldData": { "numero": "987" } }]
            }
        }));

        let fields = flatten_record_fields(&record);
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["nombre"], vec!["Ana"]);
        assert_eq!(fields["extra"], vec![""]);
        assert_eq!(fields["meta"], vec!["{\"a\":1}"]);
        assert!(!fields.contains_key("Vehiculos::id"));
        assert_eq!(
            fields["Vehiculos::Vehiculos::matricula"],
            vec!["[1] 1111AAA", "[2]"]
        );
        assert_eq!(fields["Tarjetas::numero"], vec!["987"]);

        assert_eq!(
            join_field_values(&fields["Vehiculos::Vehiculos::matricula"]),
            "[1] 1111AAA · [2]"
        );
    }

    #[test]
    fn test_collect_field_names_first_seen() {
        let a = project(&record(json!({ "recordId": "1", "fieldData": { "b": 1, "a": 2 } }))).unwrap();
        let b = project(&record(json!({ "recordId": "2", "fieldData": { "c": 1, "a": 2, "ID": 3 } }))).unwrap();
        assert_eq!(collect_field_names(&[a, b]), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_display_label_fallbacks() {
        assert_eq!(
            display_label(&record(json!({ "fieldData": { "NombreCompleto": " Ana Ruiz " } }))),
            "Ana Ruiz"
        );
        assert_eq!(
            display_label(&record(json!({ "fieldData": { "apellido1": "Ruiz", "apellido2": "Gil" } }))),
            "Ruiz Gil"
        );
        assert_eq!(display_label(&record(json!({ "recordId": "8" }))), "ID 8");
        assert_eq!(display_label(&Record::default()), "conductor seleccionado");
    }

    #[test]
    fn test_summary_and_quick_search() {
        let records = [
            record(json!({ "fieldData": { "Nombre Completo": "José Pérez", "DNI": "111A", "estado": "En bolsa" } })),
            record(json!({ "fieldData": { "nombre": "Ana Ruiz", "inversorNombre": "Flotas Sur" } })),
        ];
        let summaries: Vec<DriverSummary> = records.iter().map(DriverSummary::from_record).collect();

        assert_eq!(summaries[0].numero_documento, "111A");
        assert_eq!(summaries[0].estado.category, StatusCategory::Warning);
        assert_eq!(summaries[1].numero_documento, MISSING_VALUE);
        assert_eq!(summaries[1].nombre_inversor, "Flotas Sur");

        let hits = quick_search(&summaries, "jose  PEREZ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].nombre_completo, "José Pérez");

        assert_eq!(quick_search(&summaries, "").len(), 2);
        assert!(quick_search(&summaries, "ana bolsa").is_empty());
    }
}
