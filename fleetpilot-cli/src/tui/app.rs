//! Table browser: state, messages and the update function

use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use super::widgets::ListState;
use crate::api::shared::FetchResult;
use crate::events::AuthEvent;
use crate::table::{ColumnDrag, Effect, HeaderCell, TableController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Search,
    Picker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Column visibility picker
#[derive(Debug, Clone, Default)]
pub struct PickerState {
    pub list: ListState,
    pub filter: String,
}

pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    FocusGained,
    Resize,
    RecordsLoaded { generation: u64, result: FetchResult },
    Exported(Result<Option<PathBuf>, String>),
    Auth(AuthEvent),
}

#[derive(Debug, PartialEq)]
pub enum Command {
    None,
    LoadRecords(u64),
    Persist(Vec<Effect>),
    Export,
    Ping,
    Quit,
}

impl Command {
    fn persist(effects: Vec<Effect>) -> Self {
        if effects.is_empty() {
            Command::None
        } else {
            Command::Persist(effects)
        }
    }
}

pub struct State {
    pub controller: TableController,
    pub mode: Mode,
    pub rows: ListState,
    /// Position among the visible columns
    pub column_cursor: usize,
    /// First visible column drawn, for horizontal scrolling
    pub column_offset: usize,
    pub search_input: String,
    pub picker: PickerState,
    pub status: Option<StatusMessage>,
    pub loading: bool,
    pub user: Option<String>,
    pub export_dir: PathBuf,
    /// Header geometry of the last frame
    pub header_cells: Vec<HeaderCell>,
    pub header_row: u16,
    pub body_area: Rect,
    pub drag: Option<ColumnDrag>,
    pub should_quit: bool,
}

impl State {
    pub fn new(controller: TableController, export_dir: PathBuf, user: Option<String>) -> Self {
        Self {
            controller,
            mode: Mode::Browse,
            rows: ListState::with_selection().with_wrap_around(false),
            column_cursor: 0,
            column_offset: 0,
            search_input: String::new(),
            picker: PickerState::default(),
            status: None,
            loading: false,
            user,
            export_dir,
            header_cells: Vec::new(),
            header_row: 0,
            body_area: Rect::default(),
            drag: None,
            should_quit: false,
        }
    }

    pub fn view_len(&self) -> usize {
        self.controller.grid().map(|g| g.filtered_count()).unwrap_or(0)
    }

    fn visible_columns(&self) -> Vec<usize> {
        self.controller
            .grid()
            .map(|g| g.visible_columns())
            .unwrap_or_default()
    }

    fn cursor_column(&self) -> Option<usize> {
        self.visible_columns().get(self.column_cursor).copied()
    }

    fn cursor_row_key(&self) -> Option<String> {
        let position = self.rows.selected()?;
        self.controller
            .grid()
            .and_then(|g| g.view_row(position))
            .map(|row| row.key.clone())
    }

    /// Keep cursors valid after the view changed
    fn clamp_cursors(&mut self) {
        let len = self.view_len();
        self.rows.clamp(len);
        let columns = self.visible_columns().len();
        self.column_cursor = self.column_cursor.min(columns.saturating_sub(1));
        self.column_offset = self.column_offset.min(self.column_cursor);
    }

    /// Move the row cursor onto the selected row, if it is in view
    fn focus_selected_row(&mut self) {
        let position = self
            .controller
            .selected_key()
            .and_then(|key| self.controller.grid().and_then(|g| g.view_position(key)));
        if let Some(position) = position {
            let len = self.view_len();
            self.rows.select_and_scroll(Some(position), len);
        }
    }
}

pub fn init(state: &mut State) -> Command {
    reload(state)
}

fn reload(state: &mut State) -> Command {
    state.loading = true;
    state.status = Some(StatusMessage::info("Cargando registros…"));
    Command::LoadRecords(state.controller.begin_load())
}

pub fn update(state: &mut State, msg: Msg) -> Command {
    match msg {
        Msg::Key(key) => match state.mode {
            Mode::Browse => browse_key(state, key),
            Mode::Search => search_key(state, key),
            Mode::Picker => picker_key(state, key),
        },
        Msg::Mouse(mouse) => handle_mouse(state, mouse),
        Msg::FocusGained => Command::Ping,
        Msg::Resize => Command::None,

        Msg::RecordsLoaded { generation, result } => match result {
            Ok(records) => {
                let count = records.len();
                let Some(effects) = state.controller.render(generation, records) else {
                    return Command::None;
                };
                state.loading = false;
                state.status = Some(StatusMessage::info(format!("{} registros cargados", count)));
                state.clamp_cursors();
                state.focus_selected_row();
                Command::persist(effects)
            }
            Err(error) => {
                if state.controller.is_current(generation) {
                    state.loading = false;
                    state.status = Some(StatusMessage::error(error.to_string()));
                }
                Command::None
            }
        },

        Msg::Exported(result) => {
            state.status = Some(match result {
                Ok(Some(path)) => StatusMessage::info(format!("Exportado a {}", path.display())),
                Ok(None) => StatusMessage::info("No hay datos visibles para exportar"),
                Err(error) => StatusMessage::error(format!("Error al exportar: {}", error)),
            });
            Command::None
        }

        Msg::Auth(AuthEvent::Logout) => {
            state.status = Some(StatusMessage::error(
                "La sesión ha caducado. Inicie sesión con `fleetpilot session login`.",
            ));
            Command::None
        }
        Msg::Auth(AuthEvent::SessionChanged) => Command::None,
    }
}

fn browse_key(state: &mut State, key: KeyEvent) -> Command {
    let len = state.view_len();
    if state.rows.handle_key(key.code, len, 20) {
        return Command::None;
    }

    match key.code {
        KeyCode::Char('q') => Command::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Command::Quit,
        KeyCode::Char('r') => reload(state),
        KeyCode::Char('e') => Command::Export,
        KeyCode::Char('/') => {
            state.mode = Mode::Search;
            state.search_input = state
                .controller
                .grid()
                .map(|g| g.search_term().to_string())
                .unwrap_or_default();
            Command::None
        }
        KeyCode::Char('c') => {
            state.mode = Mode::Picker;
            state.picker = PickerState {
                list: ListState::with_selection(),
                filter: String::new(),
            };
            Command::None
        }
        KeyCode::Left => {
            state.column_cursor = state.column_cursor.saturating_sub(1);
            Command::None
        }
        KeyCode::Right => {
            let count = state.visible_columns().len();
            state.column_cursor = (state.column_cursor + 1).min(count.saturating_sub(1));
            Command::None
        }
        KeyCode::Char(c @ ('s' | 'S')) => {
            let additive = c == 'S' || key.modifiers.contains(KeyModifiers::SHIFT);
            if let Some(column) = state.cursor_column()
                && let Some(grid) = state.controller.grid_mut()
            {
                grid.toggle_sort(column, additive);
            }
            Command::None
        }
        KeyCode::Char(c @ ('<' | '>')) => move_cursor_column(state, c == '>'),
        KeyCode::Enter | KeyCode::Char(' ') => match state.cursor_row_key() {
            Some(row_key) => Command::persist(state.controller.toggle_row(&row_key)),
            None => Command::None,
        },
        KeyCode::Esc => {
            if let Some(grid) = state.controller.grid_mut()
                && !grid.search_term().is_empty()
            {
                grid.search("");
                state.clamp_cursors();
                return Command::None;
            }
            Command::persist(state.controller.clear_selection())
        }
        _ => Command::None,
    }
}

/// Keyboard reorder: swap the cursor column with its visible neighbour
fn move_cursor_column(state: &mut State, right: bool) -> Command {
    let visible = state.visible_columns();
    let Some(&from) = visible.get(state.column_cursor) else {
        return Command::None;
    };
    let neighbour = if right {
        visible.get(state.column_cursor + 1).copied()
    } else {
        state
            .column_cursor
            .checked_sub(1)
            .and_then(|i| visible.get(i).copied())
    };
    let Some(neighbour) = neighbour else {
        return Command::None;
    };
    let to = if right { neighbour + 1 } else { neighbour };
    let effects = state.controller.move_column(from, to);
    if !effects.is_empty() {
        state.column_cursor = if right {
            state.column_cursor + 1
        } else {
            state.column_cursor - 1
        };
    }
    Command::persist(effects)
}

fn search_key(state: &mut State, key: KeyEvent) -> Command {
    match key.code {
        KeyCode::Enter => {
            state.mode = Mode::Browse;
            return Command::None;
        }
        KeyCode::Esc => {
            state.mode = Mode::Browse;
            state.search_input.clear();
        }
        KeyCode::Backspace => {
            state.search_input.pop();
        }
        KeyCode::Char(c) => state.search_input.push(c),
        _ => return Command::None,
    }
    let term = state.search_input.clone();
    if let Some(grid) = state.controller.grid_mut() {
        grid.search(&term);
    }
    state.rows.select_and_scroll(Some(0), state.view_len());
    state.clamp_cursors();
    Command::None
}

/// Picker entries as `(name, caption, locked)` matching the filter
pub fn picker_entries(state: &State) -> Vec<(String, String, bool)> {
    state
        .controller
        .filter_columns(&state.picker.filter)
        .into_iter()
        .map(|meta| (meta.name.clone(), meta.display_name.clone(), meta.locked))
        .collect()
}

fn picker_key(state: &mut State, key: KeyEvent) -> Command {
    let entries = picker_entries(state);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if state.picker.list.handle_key(key.code, entries.len(), 10) {
        return Command::None;
    }

    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            state.mode = Mode::Browse;
            state.clamp_cursors();
            Command::None
        }
        KeyCode::Char('a') if ctrl => Command::persist(state.controller.set_all_visible(true)),
        KeyCode::Char('n') if ctrl => Command::persist(state.controller.set_all_visible(false)),
        KeyCode::Char('r') if ctrl => {
            state.status = Some(StatusMessage::info("Columnas restablecidas"));
            Command::persist(state.controller.reset_columns())
        }
        KeyCode::Char(' ') => {
            let Some((name, _, locked)) = state
                .picker
                .list
                .selected()
                .and_then(|i| entries.get(i).cloned())
            else {
                return Command::None;
            };
            if locked {
                state.status = Some(StatusMessage::info("Esta columna siempre es visible"));
                return Command::None;
            }
            let visible = state.controller.state().is_visible(&name);
            Command::persist(state.controller.set_column_visible(&name, !visible))
        }
        KeyCode::Backspace => {
            state.picker.filter.pop();
            let len = picker_entries(state).len();
            state.picker.list.clamp(len);
            Command::None
        }
        KeyCode::Char(c) if !ctrl => {
            state.picker.filter.push(c);
            let len = picker_entries(state).len();
            state.picker.list.select_and_scroll(Some(0), len);
            state.picker.list.clamp(len);
            Command::None
        }
        _ => Command::None,
    }
}

fn handle_mouse(state: &mut State, mouse: MouseEvent) -> Command {
    if state.mode != Mode::Browse {
        return Command::None;
    }
    let on_header = mouse.row == state.header_row;

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) if on_header => {
            state.drag = ColumnDrag::start(&state.header_cells, mouse.column);
            Command::None
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some(drag) = state.drag.as_mut() {
                drag.update(&state.header_cells, mouse.column);
            }
            Command::None
        }
        MouseEventKind::Up(MouseButton::Left) => {
            let Some(drag) = state.drag.take() else {
                return Command::None;
            };
            let field_count = state.controller.state().field_order().len();
            if let Some((from, to)) = drag.finish(&state.header_cells, field_count) {
                return Command::persist(state.controller.move_column(from, to));
            }
            // Released where it started: a header click
            if drag.drop_index.is_some_and(|d| d == drag.start_index || d == drag.start_index + 1)
                && let Some(cell) = state.header_cells.get(drag.start_index).copied()
            {
                let additive = mouse.modifiers.contains(KeyModifiers::SHIFT);
                if let Some(grid) = state.controller.grid_mut() {
                    grid.toggle_sort(cell.field_index, additive);
                }
            }
            Command::None
        }
        MouseEventKind::Down(MouseButton::Left) => {
            let area = state.body_area;
            if mouse.row < area.y || mouse.row >= area.y + area.height {
                return Command::None;
            }
            let position = state.rows.scroll_offset() + (mouse.row - area.y) as usize;
            if position >= state.view_len() {
                return Command::None;
            }
            state.rows.select_and_scroll(Some(position), state.view_len());
            match state.cursor_row_key() {
                Some(row_key) => Command::persist(state.controller.toggle_row(&row_key)),
                None => Command::None,
            }
        }
        MouseEventKind::ScrollDown => {
            state.rows.handle_key(KeyCode::Down, state.view_len(), 20);
            Command::None
        }
        MouseEventKind::ScrollUp => {
            state.rows.handle_key(KeyCode::Up, state.view_len(), 20);
            Command::None
        }
        _ => Command::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Record;
    use crate::config::repository::{KeyValueStore, MemoryKvStore};
    use crate::events::EventBus;
    use crate::table::TableKeys;
    use crossterm::event::KeyEventState;
    use serde_json::json;
    use std::sync::Arc;

    fn key(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: crossterm::event::KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn records() -> Arc<Vec<Record>> {
        let record = |id: &str, name: &str, color: &str| {
            Record::from_data_api(&json!({
                "recordId": id,
                "fieldData": { "id": id, "nombreCompleto": name, "matricula": "M", "color": color }
            }))
            .unwrap()
        };
        Arc::new(vec![record("1", "Zoe", "rojo"), record("2", "Ana", "verde")])
    }

    fn loaded_state() -> State {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let keys = TableKeys {
            layout: "clientes".into(),
            state_key: "s".into(),
            selection_key: "sel".into(),
        };
        let controller = TableController::new(keys, store, EventBus::new());
        let mut state = State::new(controller, PathBuf::from("."), None);
        let Command::LoadRecords(generation) = init(&mut state) else {
            panic!("init should load records");
        };
        let command = update(&mut state, Msg::RecordsLoaded { generation, result: Ok(records()) });
        assert!(matches!(command, Command::Persist(_)));
        state
    }

    #[test]
    fn test_load_then_sort_and_select() {
        let mut state = loaded_state();
        assert!(!state.loading);
        assert_eq!(state.view_len(), 2);

        update(&mut state, key(KeyCode::Char('s')));
        let first = state.controller.grid().unwrap().view_row(0).unwrap().key.clone();
        assert_eq!(first, "2");

        let command = update(&mut state, key(KeyCode::Enter));
        assert!(matches!(command, Command::Persist(_)));
        assert_eq!(state.controller.selected_key(), Some("2"));
    }

    #[test]
    fn test_stale_load_is_ignored() {
        let mut state = loaded_state();
        let stale = state.controller.begin_load();
        let _current = state.controller.begin_load();
        let command = update(&mut state, Msg::RecordsLoaded { generation: stale, result: Ok(Arc::new(Vec::new())) });
        assert_eq!(command, Command::None);
        assert_eq!(state.view_len(), 2);
    }

    #[test]
    fn test_search_mode_filters_live() {
        let mut state = loaded_state();
        update(&mut state, key(KeyCode::Char('/')));
        assert_eq!(state.mode, Mode::Search);
        update(&mut state, key(KeyCode::Char('z')));
        assert_eq!(state.view_len(), 1);
        update(&mut state, key(KeyCode::Esc));
        assert_eq!(state.view_len(), 2);
        assert_eq!(state.mode, Mode::Browse);
    }

    #[test]
    fn test_picker_toggles_unlocked_column() {
        let mut state = loaded_state();
        update(&mut state, key(KeyCode::Char('c')));
        assert_eq!(state.mode, Mode::Picker);
        for c in "color".chars() {
            update(&mut state, key(KeyCode::Char(c)));
        }
        assert_eq!(picker_entries(&state).len(), 1);
        let command = update(&mut state, key(KeyCode::Char(' ')));
        assert!(matches!(command, Command::Persist(_)));
        assert!(state.controller.state().is_visible("color"));
    }

    #[test]
    fn test_header_drag_moves_column() {
        let mut state = loaded_state();
        state.header_row = 2;
        state.header_cells = vec![
            HeaderCell { x: 0, width: 10, field_index: 0 },
            HeaderCell { x: 11, width: 10, field_index: 1 },
        ];
        let mouse = |kind, column| {
            Msg::Mouse(MouseEvent { kind, column, row: 2, modifiers: KeyModifiers::NONE })
        };

        update(&mut state, mouse(MouseEventKind::Down(MouseButton::Left), 2));
        update(&mut state, mouse(MouseEventKind::Drag(MouseButton::Left), 19));
        let command = update(&mut state, mouse(MouseEventKind::Up(MouseButton::Left), 19));
        assert!(matches!(command, Command::Persist(_)));
        assert!(state.controller.is_dirty());
        state.controller.flush();
        assert_eq!(state.controller.state().field_order()[0], "matricula");
    }

    #[test]
    fn test_failed_load_reports_error() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let keys = TableKeys { layout: "l".into(), state_key: "s".into(), selection_key: "k".into() };
        let mut state = State::new(TableController::new(keys, store, EventBus::new()), PathBuf::from("."), None);
        let Command::LoadRecords(generation) = init(&mut state) else {
            panic!("init should load records");
        };
        let error = crate::api::FetchError { attempts: Vec::new() };
        update(&mut state, Msg::RecordsLoaded { generation, result: Err(error) });
        assert!(state.status.as_ref().is_some_and(|s| s.is_error));
        assert!(!state.loading);
    }
}
