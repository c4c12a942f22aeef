//! Column metadata and captions

use serde::Serialize;

use crate::records::aliases::{is_default_visible, is_locked_column, normalize_column_name};

/// Caption of the placeholder column used when no field is displayable
pub const SYNTHETIC_COLUMN: &str = "Información";

const FRIENDLY_NAMES: &[(&str, &str)] = &[
    ("ndocumentoidentidad", "Número de documento de identidad"),
    ("documentoidentidad", "Documento de identidad"),
    ("ndcumentoidentidad", "Número de documento de identidad"),
    ("dni", "DNI"),
    ("nie", "NIE"),
    ("nombrecompleto", "Nombre completo"),
    ("nombre", "Nombre"),
    ("apellido1", "Primer apellido"),
    ("apellido2", "Segundo apellido"),
    ("estado", "Estado"),
    ("estadogeneral", "Estado general"),
    ("estadoconductor", "Estado del conductor"),
    ("fechanacimiento", "Fecha de nacimiento"),
    ("edad", "Edad"),
    ("nafiliacionss", "Número de afiliación S.S."),
    ("nacionalidad", "Nacionalidad"),
    ("nivelformativotrabajador", "Nivel formativo"),
    ("telefono1", "Teléfono 1"),
    ("telefono2", "Teléfono 2"),
    ("correopersonal", "Correo personal"),
    ("correoplataforma", "Correo plataforma"),
    ("telefonoboltcompleto", "Teléfono Bolt"),
    ("tipovia", "Tipo de vía"),
    ("nombrevia", "Nombre de vía"),
    ("numero", "Número"),
    ("pisoyletra", "Piso y letra"),
    ("cp", "Código postal"),
    ("localidad", "Localidad"),
    ("provincia", "Provincia"),
    ("matricula", "Matrícula"),
    ("matriculavehiculoasignado", "Matrícula vehículo asignado"),
    ("matriculaasignada", "Matrícula asignada"),
    ("nombreinversor", "Nombre del inversor"),
    ("inversornombre", "Nombre del inversor"),
    ("numerotarjetacombustible", "Número tarjeta combustible"),
    ("tarjetacombustible", "Tarjeta combustible"),
    ("ntarjetacombustible", "Número tarjeta combustible"),
    ("numerotarjetaefectivo", "Número tarjeta efectivo"),
    ("tarjetaefectivo", "Tarjeta efectivo"),
    ("ntarjetaefectivo", "Número tarjeta efectivo"),
    ("fechafirma", "Fecha de firma"),
    ("tipodocumentoidentidad", "Tipo de documento de identidad"),
];

/// Caption shown for a raw field name
pub fn humanize_column_name(name: &str) -> String {
    let raw = name.trim();
    let normalized = normalize_column_name(raw);
    if let Some((_, friendly)) = FRIENDLY_NAMES.iter().find(|(key, _)| *key == normalized) {
        return friendly.to_string();
    }

    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One column of the rendered table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    /// Raw field name
    pub name: String,
    pub display_name: String,
    /// Normalized name, or `column-<index>` when it normalizes to nothing
    pub key: String,
    pub primary: bool,
    pub locked: bool,
    pub synthetic: bool,
    pub data_index: usize,
}

/// Metadata for the ordered columns. Without columns a single synthetic
/// column is produced so the table still has a body.
pub fn build_column_meta(ordered: &[String]) -> Vec<ColumnMeta> {
    if ordered.is_empty() {
        return vec![ColumnMeta {
            name: SYNTHETIC_COLUMN.to_string(),
            display_name: SYNTHETIC_COLUMN.to_string(),
            key: normalize_column_name(SYNTHETIC_COLUMN),
            primary: true,
            locked: true,
            synthetic: true,
            data_index: 0,
        }];
    }

    ordered
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let normalized = normalize_column_name(name);
            ColumnMeta {
                name: name.clone(),
                display_name: humanize_column_name(name),
                key: if normalized.is_empty() {
                    format!("column-{}", index)
                } else {
                    normalized
                },
                primary: is_default_visible(name),
                locked: is_locked_column(name),
                synthetic: false,
                data_index: index,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_column_name() {
        assert_eq!(humanize_column_name("nDocumentoIdentidad"), "Número de documento de identidad");
        assert_eq!(humanize_column_name("Conductores::telefono1"), "Teléfono 1");
        assert_eq!(humanize_column_name("pisoYLetra"), "Piso y letra");
        assert_eq!(humanize_column_name("  correo  "), "Correo");
        assert_eq!(humanize_column_name("ñandú"), "Ñandú");
        assert_eq!(humanize_column_name(""), "");
    }

    #[test]
    fn test_build_column_meta() {
        let columns = build_column_meta(&["estado".into(), "Email".into(), "!!".into()]);
        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary && columns[0].locked);
        assert_eq!(columns[1].key, "email");
        assert!(!columns[1].primary && !columns[1].locked);
        assert_eq!(columns[2].key, "column-2");
        assert_eq!(columns[2].data_index, 2);
    }

    #[test]
    fn test_synthetic_column_when_empty() {
        let columns = build_column_meta(&[]);
        assert_eq!(columns.len(), 1);
        assert!(columns[0].synthetic);
        assert_eq!(columns[0].key, "informacion");
    }
}
