//! Spreadsheet export of the live table view

pub mod xlsx;
pub mod zip;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::table::LiveView;

pub use xlsx::{build_spreadsheet, column_letter, export_file_name};

/// Write the view as `<dir>/<layout>_<timestamp>.xlsx`.
///
/// Returns `None` without touching the filesystem when the view has no
/// visible column or no row.
pub fn export_view(
    view: &LiveView,
    directory: &Path,
    layout: &str,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>> {
    if view.is_empty() {
        log::info!("Nothing to export");
        return Ok(None);
    }

    let bytes = build_spreadsheet(&view.headers, &view.rows, layout, now.with_timezone(&Utc));
    let path = directory.join(export_file_name(layout, now.naive_local()));

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create export directory {}", directory.display()))?;
    std::fs::write(&path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!(
        "Exported {} rows x {} columns to {}",
        view.rows.len(),
        view.headers.len(),
        path.display()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Record;
    use crate::config::repository::{KeyValueStore, MemoryKvStore};
    use crate::events::EventBus;
    use crate::table::{SortDirection, TableController, TableKeys};
    use calamine::{Reader, Xlsx, open_workbook};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fleetpilot-export-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_empty_view_is_not_exported() {
        let dir = scratch_dir("empty");
        let now = Local::now();
        let no_rows = LiveView { headers: vec!["Nombre".into()], rows: vec![] };
        let no_columns = LiveView { headers: vec![], rows: vec![vec![]] };

        assert_eq!(export_view(&no_rows, &dir, "clientes", now).unwrap(), None);
        assert_eq!(export_view(&no_columns, &dir, "clientes", now).unwrap(), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_export_writes_readable_workbook() {
        let dir = scratch_dir("write");
        let now = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let view = LiveView {
            headers: vec!["Nombre completo".into(), "Estado".into()],
            rows: vec![vec!["Ana Ruiz".into(), "Activo".into()]],
        };

        let path = export_view(&view, &dir, "Clientes Listado", now).unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "Clientes_Listado_20240506_070809.xlsx");

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range("Clientes Listado").unwrap();
        assert_eq!(range.get_size(), (2, 2));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn driver(id: &str, name: &str, estado: &str, notas: &str) -> Record {
        Record::from_data_api(&json!({
            "recordId": id,
            "modId": "1",
            "fieldData": {
                "id": id,
                "nombreCompleto": name,
                "matricula": format!("M-{}", id),
                "estado": estado,
                "notas": notas,
                "email": format!("{}@fleet.test", id),
                "telefono": format!("600 000 00{}", id)
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_export_matches_live_table_view() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let keys = TableKeys {
            layout: "clientes".into(),
            state_key: "clientesTable.state:ana:clientes".into(),
            selection_key: "clientes.process-selection".into(),
        };
        let mut controller = TableController::new(keys, store, EventBus::new());
        let records = Arc::new(vec![
            driver("1", "Zoe Díaz", "Contratado", "Llaves & tarjeta <pendiente>"),
            driver("2", "Ana Ruiz", "Baja", "sin notas"),
            driver("3", "José Núñez", "Contratado", "Conducción nocturna"),
        ]);
        let generation = controller.begin_load();
        controller.render(generation, records).unwrap();

        controller.set_all_visible(true);
        controller.set_column_visible("email", false);
        let from = controller
            .state()
            .field_order()
            .iter()
            .position(|name| name == "notas")
            .unwrap();
        controller.move_column(from, 0);
        controller.flush();

        let grid = controller.grid_mut().unwrap();
        grid.search("CONTRATADO");
        let name_column = grid.column_index("nombreCompleto").unwrap();
        grid.set_order(vec![(name_column, SortDirection::Desc)]);

        let view = controller.live_view();
        assert_eq!(view.headers.first().map(String::as_str), Some("Notas"));
        assert!(!view.headers.iter().any(|h| h == "Email"));
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0][0], "Llaves & tarjeta <pendiente>");
        assert_eq!(view.rows[1][0], "Conducción nocturna");

        let dir = scratch_dir("live");
        let path = export_view(&view, &dir, "clientes", Local::now()).unwrap().unwrap();
        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range("clientes").unwrap();

        let sheet: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        assert_eq!(sheet[0], view.headers);
        assert_eq!(&sheet[1..], view.rows.as_slice());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
