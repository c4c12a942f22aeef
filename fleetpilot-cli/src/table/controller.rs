//! Table controller
//!
//! Owns the column state, the projected rows, the grid and the selection
//! for one table surface. Mutations are synchronous and return the
//! storage [`Effect`]s they imply; [`TableController::apply_effects`] runs
//! them against the key-value store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use super::columns::{ColumnMeta, build_column_meta};
use super::grid::{GridRow, GridView, LiveView};
use super::persist;
use super::selection::{Selection, StoredSelection};
use super::state::{
    ColumnState, PersistedTableState, SortDescriptor, TableState, TableStateUpdate,
};
use crate::api::models::Record;
use crate::config::repository::KeyValueStore;
use crate::events::{EventBus, TableEvent};
use crate::records::projector::{ProjectedRow, collect_field_names, display_label, project};

/// Storage work requested by a controller mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PersistState(PersistedTableState),
    SaveSelection(StoredSelection),
    ClearSelection,
}

/// Where the controller stores its state
#[derive(Debug, Clone)]
pub struct TableKeys {
    pub layout: String,
    /// Per-user key of the column state
    pub state_key: String,
    /// Session key of the selection snapshot
    pub selection_key: String,
}

pub struct TableController {
    keys: TableKeys,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    state: TableState,
    records: Arc<Vec<Record>>,
    rows: Vec<ProjectedRow>,
    row_index: HashMap<String, usize>,
    columns: Vec<ColumnMeta>,
    grid: Option<GridView>,
    selection: Selection,
    stored_selection: Option<StoredSelection>,
    generation: u64,
    rendered_generation: Option<u64>,
    dirty: bool,
}

impl TableController {
    pub fn new(keys: TableKeys, store: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            keys,
            store,
            events,
            state: TableState::new(),
            records: Arc::new(Vec::new()),
            rows: Vec::new(),
            row_index: HashMap::new(),
            columns: Vec::new(),
            grid: None,
            selection: Selection::default(),
            stored_selection: None,
            generation: 0,
            rendered_generation: None,
            dirty: false,
        }
    }

    /// Load the stored column state and selection snapshot
    pub async fn load_saved(&mut self) {
        if let Some(stored) = persist::load_state(self.store.as_ref(), &self.keys.state_key).await {
            log::debug!(
                "Restored table state with {} ordered fields",
                stored.field_order.len()
            );
            self.state = TableState::from_persisted(stored);
        }
        self.stored_selection =
            persist::load_selection(self.store.as_ref(), &self.keys.selection_key).await;
    }

    pub fn keys(&self) -> &TableKeys {
        &self.keys
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn records(&self) -> &Arc<Vec<Record>> {
        &self.records
    }

    pub fn rows(&self) -> &[ProjectedRow] {
        &self.rows
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn grid(&self) -> Option<&GridView> {
        self.grid.as_ref()
    }

    pub fn grid_mut(&mut self) -> Option<&mut GridView> {
        self.grid.as_mut()
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selection.key()
    }

    pub fn selected_row(&self) -> Option<&ProjectedRow> {
        self.selection
            .key()
            .and_then(|key| self.row_index.get(key))
            .map(|index| &self.rows[*index])
    }

    /// Start a load; results of older generations are discarded
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Render a freshly loaded record set. Returns `None` when a newer load
    /// has started since `generation` was issued.
    pub fn render(&mut self, generation: u64, records: Arc<Vec<Record>>) -> Option<Vec<Effect>> {
        if !self.is_current(generation) {
            log::debug!(
                "Discarding records of load {} (current is {})",
                generation,
                self.generation
            );
            return None;
        }

        self.events.publish_table(TableEvent::Data {
            layout: self.keys.layout.clone(),
            records: Arc::clone(&records),
        });
        self.records = records;
        self.rendered_generation = Some(generation);
        Some(self.rebuild())
    }

    /// Request a rebuild on the next [`flush`](Self::flush)
    pub fn schedule_render(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Run one rebuild for every render scheduled since the last flush
    pub fn flush(&mut self) -> Vec<Effect> {
        if !self.dirty {
            return Vec::new();
        }
        if self.rendered_generation.is_none() {
            self.dirty = false;
            return Vec::new();
        }
        self.rebuild()
    }

    fn rebuild(&mut self) -> Vec<Effect> {
        self.dirty = false;
        let mut effects = Vec::new();

        self.rows = project_unique(&self.records);
        self.row_index = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.record_key.clone(), index))
            .collect();

        let previous = self.grid.take();
        if let Some(grid) = &previous {
            // Keep the user's sort across rebuilds
            if !self.state.has_pending_sort() && !grid.order().is_empty() {
                let sort = grid
                    .order()
                    .iter()
                    .filter_map(|(column, dir)| {
                        grid.columns().get(*column).map(|c| SortDescriptor {
                            name: c.meta.name.clone(),
                            key: c.meta.key.clone(),
                            dir: *dir,
                        })
                    })
                    .collect();
                self.state.set_pending_sort(Some(sort));
            }
            self.events.publish_table(TableEvent::Destroy);
        }
        let search = previous
            .as_ref()
            .map(|grid| grid.search_term().to_string())
            .unwrap_or_default();

        let field_names = collect_field_names(&self.rows);
        let (order, visibility) = self.state.reconcile(&field_names);

        self.columns = if self.rows.is_empty() && order.is_empty() {
            Vec::new()
        } else {
            build_column_meta(&order)
        };

        let mut columns = GridView::columns_from_meta(self.columns.clone());
        for (index, column) in columns.iter_mut().enumerate() {
            column.visible = column.meta.synthetic || visibility.get(index).copied().unwrap_or(true);
        }
        let rows = self
            .rows
            .iter()
            .map(|row| GridRow::from_projected(row, &self.columns))
            .collect();

        let mut grid = GridView::new(columns, rows);
        if !search.is_empty() {
            grid.search(&search);
        }
        let positions: Vec<(String, String)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.key.clone()))
            .collect();
        let sort = self.state.take_pending_sort(&positions);
        if !sort.is_empty() {
            grid.set_order(sort);
        }
        self.grid = Some(grid);

        if !field_names.is_empty() {
            effects.push(Effect::PersistState(self.state.to_persisted(Some(&order))));
        }

        self.reconcile_selection(&mut effects);

        log::debug!(
            "Rendered {} rows with {} columns",
            self.rows.len(),
            self.columns.len()
        );
        self.events.publish_table(TableEvent::Ready);
        self.events.publish_table(TableEvent::Draw);
        effects
    }

    fn reconcile_selection(&mut self, effects: &mut Vec<Effect>) {
        if self.selection.key().is_some() {
            if self.selection.retain(&self.row_index) {
                log::debug!("Selected row disappeared, clearing selection");
                effects.push(Effect::ClearSelection);
                self.publish_selection();
            }
            return;
        }

        let Some(stored) = self.stored_selection.take() else {
            return;
        };
        let restored = self.selection.restore(
            &stored,
            self.rows
                .iter()
                .map(|row| (row.record_key.as_str(), row.record_id.as_deref())),
        );
        if restored {
            log::debug!("Restored selection {:?}", self.selection.key());
            self.publish_selection();
        } else {
            // Keep it for a later dataset that may contain the row
            self.stored_selection = Some(stored);
        }
    }

    fn publish_selection(&self) {
        let row = self.selected_row();
        self.events.publish_table(TableEvent::Select {
            record_key: row.map(|r| r.record_key.clone()),
            record_id: row.and_then(|r| r.record_id.clone()),
            display_name: row.and_then(|r| self.record_for(r)).map(display_label),
        });
    }

    fn record_for(&self, row: &ProjectedRow) -> Option<&Record> {
        self.records.iter().find(|record| {
            project(record).is_some_and(|projected| projected.record_key == row.record_key)
                || (row.record_id.is_some() && record.record_id == row.record_id)
        })
    }

    fn snapshot(&self) -> Option<StoredSelection> {
        let row = self.selected_row()?;
        let record = self.record_for(row).cloned();
        Some(StoredSelection {
            layout: self.keys.layout.clone(),
            saved_at: Utc::now().timestamp_millis(),
            record_key: Some(row.record_key.clone()),
            record_id: row.record_id.clone(),
            field_order: self.state.field_order().to_vec(),
            display_name: record.as_ref().map(display_label).unwrap_or_default(),
            key: Some(row.record_key.clone()),
            record,
        })
    }

    fn selection_effects(&self) -> Vec<Effect> {
        self.publish_selection();
        match self.snapshot() {
            Some(snapshot) => vec![Effect::SaveSelection(snapshot)],
            None => vec![Effect::ClearSelection],
        }
    }

    /// Row click: select, or deselect when already selected
    pub fn toggle_row(&mut self, key: &str) -> Vec<Effect> {
        if !self.row_index.contains_key(key) {
            return Vec::new();
        }
        self.stored_selection = None;
        self.selection.toggle(key);
        self.selection_effects()
    }

    pub fn clear_selection(&mut self) -> Vec<Effect> {
        self.stored_selection = None;
        if !self.selection.clear() {
            return Vec::new();
        }
        self.publish_selection();
        vec![Effect::ClearSelection]
    }

    /// Select the row whose record id (or key) matches
    pub fn select_by_record_id(&mut self, record_id: &str) -> Option<Vec<Effect>> {
        let record_id = record_id.trim();
        if record_id.is_empty() {
            return None;
        }
        let key = self
            .rows
            .iter()
            .find(|row| row.record_id.as_deref() == Some(record_id))
            .or_else(|| self.rows.iter().find(|row| row.record_key == record_id))
            .map(|row| row.record_key.clone())?;
        self.stored_selection = None;
        self.selection.select(&key);
        Some(self.selection_effects())
    }

    fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.synthetic)
            .map(|c| c.name.clone())
            .collect()
    }

    fn persist_effect(&self) -> Effect {
        let names = self.column_names();
        Effect::PersistState(self.state.to_persisted(Some(&names)))
    }

    /// Show or hide one column. Locked columns stay visible.
    pub fn set_column_visible(&mut self, name: &str, visible: bool) -> Vec<Effect> {
        if !self.state.set_visible(name, visible) {
            return Vec::new();
        }
        let visible = self.state.is_visible(name);
        if let Some(grid) = self.grid.as_mut()
            && let Some(index) = grid.column_index(name)
        {
            grid.set_column_visible(index, visible);
            self.events.publish_table(TableEvent::Draw);
        }
        vec![self.persist_effect()]
    }

    /// Select all / deselect all in the column picker
    pub fn set_all_visible(&mut self, visible: bool) -> Vec<Effect> {
        let names = self.column_names();
        if !self.state.set_all_visible(&names, visible) {
            return Vec::new();
        }
        if let Some(grid) = self.grid.as_mut() {
            for name in &names {
                if let Some(index) = grid.column_index(name) {
                    grid.set_column_visible(index, self.state.is_visible(name));
                }
            }
            self.events.publish_table(TableEvent::Draw);
        }
        vec![self.persist_effect()]
    }

    /// Move a column to an insertion slot of the field order
    pub fn move_column(&mut self, from: usize, to: usize) -> Vec<Effect> {
        if !self.state.move_column(from, to) {
            return Vec::new();
        }
        self.schedule_render();
        vec![Effect::PersistState(self.state.to_persisted(None))]
    }

    /// Forget the stored order and visibility
    pub fn reset_columns(&mut self) -> Vec<Effect> {
        self.state.reset();
        self.schedule_render();
        vec![self.persist_effect()]
    }

    /// Column picker entries whose caption matches `filter`
    pub fn filter_columns(&self, filter: &str) -> Vec<&ColumnMeta> {
        let needle = crate::records::aliases::normalize_search_text(filter);
        self.columns
            .iter()
            .filter(|c| !c.synthetic)
            .filter(|c| {
                needle.is_empty()
                    || crate::records::aliases::normalize_search_text(&c.display_name)
                        .contains(needle.trim())
            })
            .collect()
    }

    /// Order, column visibility and sort as currently shown
    pub fn current_state(&self) -> TableStateUpdate {
        let columns = self
            .columns
            .iter()
            .filter(|c| !c.synthetic)
            .map(|c| ColumnState {
                name: c.name.clone(),
                key: c.key.clone(),
                visible: self.state.is_visible(&c.name),
            })
            .collect();
        let order = self
            .grid
            .as_ref()
            .map(|grid| {
                grid.order()
                    .iter()
                    .filter_map(|(column, dir)| {
                        grid.columns().get(*column).map(|c| SortDescriptor {
                            name: c.meta.name.clone(),
                            key: c.meta.key.clone(),
                            dir: *dir,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        TableStateUpdate {
            field_order: Some(self.state.field_order().to_vec()),
            columns: Some(columns),
            visibility: None,
            order: Some(order),
        }
    }

    /// Merge an externally supplied state. Structural changes persist and
    /// rebuild; a sort-only change applies to the current grid directly.
    pub fn apply_state(&mut self, update: TableStateUpdate) -> Vec<Effect> {
        let structure_changed = self.state.apply_update(update);
        if structure_changed {
            self.schedule_render();
            return vec![Effect::PersistState(self.state.to_persisted(None))];
        }

        if self.state.has_pending_sort() && self.grid.is_some() {
            let positions: Vec<(String, String)> = self
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.key.clone()))
                .collect();
            let sort = self.state.take_pending_sort(&positions);
            if let Some(grid) = self.grid.as_mut() {
                grid.set_order(sort);
                self.events.publish_table(TableEvent::Draw);
            }
        }
        Vec::new()
    }

    /// Visible columns and filtered, sorted rows
    pub fn live_view(&self) -> LiveView {
        self.grid.as_ref().map(GridView::live_view).unwrap_or(LiveView {
            headers: Vec::new(),
            rows: Vec::new(),
        })
    }

    pub async fn apply_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PersistState(state) => {
                    persist::save_state(self.store.as_ref(), &self.keys.state_key, &state).await
                }
                Effect::SaveSelection(selection) => {
                    persist::save_selection(self.store.as_ref(), &self.keys.selection_key, &selection)
                        .await
                }
                Effect::ClearSelection => {
                    persist::clear_selection(self.store.as_ref(), &self.keys.selection_key).await
                }
            }
        }
    }
}

/// Project every record, suffixing repeated keys so each row stays
/// addressable
fn project_unique(records: &[Record]) -> Vec<ProjectedRow> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    records
        .iter()
        .filter_map(project)
        .map(|mut row| {
            let count = seen.entry(row.record_key.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                log::debug!("Duplicate record key {}", row.record_key);
                row.record_key = format!("{}#{}", row.record_key, count);
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::{MemoryKvStore, Namespace};
    use crate::table::state::SortDirection;
    use serde_json::json;

    fn record(id: &str, name: &str, plate: &str, extra: serde_json::Value) -> Record {
        let mut field_data = json!({
            "id": id,
            "nombreCompleto": name,
            "matricula": plate,
        });
        if let (Some(target), Some(extra)) = (field_data.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        Record::from_data_api(&json!({ "recordId": format!("r{}", id), "modId": "1", "fieldData": field_data }))
            .unwrap()
    }

    fn dataset() -> Arc<Vec<Record>> {
        Arc::new(vec![
            record("1", "Zoe Díaz", "ABC123", json!({ "color": "rojo" })),
            record("2", "Ana Ruiz", "XYZ987", json!({ "color": "azul" })),
        ])
    }

    fn controller() -> (TableController, Arc<dyn KeyValueStore>, EventBus) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let events = EventBus::new();
        let keys = TableKeys {
            layout: "clientes".into(),
            state_key: "clientesTable.state:ana:clientes".into(),
            selection_key: "clientes.process-selection".into(),
        };
        (TableController::new(keys, Arc::clone(&store), events.clone()), store, events)
    }

    fn render(controller: &mut TableController, records: Arc<Vec<Record>>) -> Vec<Effect> {
        let generation = controller.begin_load();
        controller.render(generation, records).unwrap()
    }

    #[tokio::test]
    async fn test_render_orders_and_hides_columns() {
        let (mut controller, store, _events) = controller();
        let effects = render(&mut controller, dataset());
        controller.apply_effects(effects).await;

        let names: Vec<&str> = controller.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["nombreCompleto", "matricula", "color"]);

        let view = controller.live_view();
        assert_eq!(view.headers, vec!["Nombre completo", "Matrícula"]);
        assert_eq!(view.rows.len(), 2);

        let stored = store
            .get(Namespace::Local, "clientesTable.state:ana:clientes")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.contains("\"color\":false"));
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let (mut controller, _store, _events) = controller();
        let first = controller.begin_load();
        let second = controller.begin_load();

        assert!(controller.render(second, dataset()).is_some());
        assert!(controller.render(first, Arc::new(Vec::new())).is_none());
        assert_eq!(controller.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_selection_toggle_and_disappearing_row() {
        let (mut controller, store, events) = controller();
        let mut table_events = events.subscribe_table();
        render(&mut controller, dataset());

        let effects = controller.toggle_row("2");
        assert!(matches!(&effects[..], [Effect::SaveSelection(s)] if s.record_id.as_deref() == Some("r2")));
        controller.apply_effects(effects).await;
        assert!(store.get(Namespace::Session, "clientes.process-selection").await.unwrap().is_some());

        let mut saw_select = false;
        while let Ok(event) = table_events.try_recv() {
            if let TableEvent::Select { record_key, display_name, .. } = event {
                assert_eq!(record_key.as_deref(), Some("2"));
                assert_eq!(display_name.as_deref(), Some("Ana Ruiz"));
                saw_select = true;
            }
        }
        assert!(saw_select);

        let effects = render(&mut controller, Arc::new(vec![record("1", "Zoe Díaz", "ABC123", json!({}))]));
        assert!(effects.contains(&Effect::ClearSelection));
        assert_eq!(controller.selected_key(), None);
    }

    #[tokio::test]
    async fn test_toggle_same_row_deselects() {
        let (mut controller, _store, _events) = controller();
        render(&mut controller, dataset());
        controller.toggle_row("1");
        let effects = controller.toggle_row("1");
        assert_eq!(effects, vec![Effect::ClearSelection]);
        assert!(controller.toggle_row("missing").is_empty());
    }

    #[tokio::test]
    async fn test_saved_state_and_selection_restore() {
        let (mut controller, store, _events) = controller();
        store
            .set(
                Namespace::Local,
                "clientesTable.state:ana:clientes",
                r#"{"fieldOrder":["color","matricula"],"visibility":{"color":true,"matricula":false}}"#,
            )
            .await
            .unwrap();
        store
            .set(Namespace::Session, "clientes.process-selection", r#"{"recordId":"r1"}"#)
            .await
            .unwrap();
        controller.load_saved().await;
        render(&mut controller, dataset());

        let names: Vec<&str> = controller.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["color", "matricula", "nombreCompleto"]);
        // matricula is locked
        assert!(controller.state().is_visible("matricula"));
        assert!(controller.state().is_visible("color"));
        assert_eq!(controller.selected_key(), Some("1"));
    }

    #[tokio::test]
    async fn test_move_column_is_batched_into_one_render() {
        let (mut controller, _store, _events) = controller();
        render(&mut controller, dataset());

        assert!(!controller.move_column(2, 0).is_empty());
        assert!(controller.move_column(0, 0).is_empty());
        assert!(!controller.set_column_visible("color", true).is_empty());
        assert!(controller.is_dirty());

        controller.flush();
        assert!(!controller.is_dirty());
        let names: Vec<&str> = controller.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "color");
        assert_eq!(controller.live_view().headers[0], "Color");
        assert!(controller.flush().is_empty());
    }

    #[tokio::test]
    async fn test_sort_survives_rebuild_and_state_round_trip() {
        let (mut controller, _store, _events) = controller();
        render(&mut controller, dataset());

        let sort = vec![SortDescriptor { name: "nombreCompleto".into(), key: String::new(), dir: SortDirection::Asc }];
        let effects = controller.apply_state(TableStateUpdate { order: Some(sort), ..Default::default() });
        assert!(effects.is_empty());
        assert_eq!(controller.live_view().rows[0][0], "Ana Ruiz");

        render(&mut controller, dataset());
        assert_eq!(controller.live_view().rows[0][0], "Ana Ruiz");

        let state = controller.current_state();
        let order = state.order.clone().unwrap();
        assert_eq!(order[0].name, "nombreCompleto");
        assert_eq!(order[0].key, "nombrecompleto");
        assert!(state.columns.unwrap().iter().any(|c| c.name == "color" && !c.visible));
    }

    #[tokio::test]
    async fn test_search_term_survives_rebuild() {
        let (mut controller, _store, _events) = controller();
        render(&mut controller, dataset());
        controller.grid_mut().unwrap().search("diaz");
        assert_eq!(controller.live_view().rows.len(), 1);

        render(&mut controller, dataset());
        assert_eq!(controller.live_view().rows.len(), 1);
        assert_eq!(controller.grid().unwrap().search_term(), "diaz");
    }

    #[tokio::test]
    async fn test_empty_dataset_has_no_columns() {
        let (mut controller, _store, _events) = controller();
        let effects = render(&mut controller, Arc::new(Vec::new()));
        assert!(effects.is_empty());
        assert!(controller.columns().is_empty());
        assert!(controller.live_view().is_empty());
    }

    #[tokio::test]
    async fn test_select_by_record_id() {
        let (mut controller, _store, _events) = controller();
        render(&mut controller, dataset());
        assert!(controller.select_by_record_id("r2").is_some());
        assert_eq!(controller.selected_key(), Some("2"));
        assert!(controller.select_by_record_id("nope").is_none());
        assert_eq!(controller.clear_selection(), vec![Effect::ClearSelection]);
    }

    #[test]
    fn test_duplicate_keys_are_suffixed() {
        let rows = project_unique(&[
            record("1", "A", "P1", json!({})),
            record("1", "B", "P2", json!({})),
        ]);
        assert_eq!(rows[0].record_key, "1");
        assert_eq!(rows[1].record_key, "1#2");
    }
}
