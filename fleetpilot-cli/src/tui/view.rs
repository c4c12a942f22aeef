//! Rendering of the table browser

use std::ops::Range;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::app::{Mode, State, picker_entries};
use crate::records::StatusCategory;
use crate::records::projector::MISSING_VALUE;
use crate::table::{GridView, HeaderCell, SortDirection};

const MAX_COLUMN_WIDTH: usize = 40;
const MIN_COLUMN_WIDTH: usize = 3;
/// Rows sampled when sizing columns
const WIDTH_SAMPLE: usize = 200;
const GUTTER: u16 = 2;

const HELP: &str = "↑↓ fila  ←→ columna  Enter seleccionar  / buscar  s/S ordenar  </> mover  c columnas  e exportar  r recargar  q salir";

fn badge_color(category: StatusCategory) -> Color {
    match category {
        StatusCategory::Success => Color::Green,
        StatusCategory::Danger => Color::Red,
        StatusCategory::Warning => Color::Yellow,
        StatusCategory::Secondary => Color::DarkGray,
        StatusCategory::Neutral => Color::Reset,
    }
}

pub fn render(frame: &mut Frame, state: &mut State) {
    let [title, header, body, footer, help] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_title(frame, state, title);
    state.header_row = header.y;
    state.body_area = body;
    state.rows.set_viewport_height(body.height as usize);

    if state.controller.grid().is_some_and(|g| !g.columns().is_empty()) {
        render_grid(frame, state, header, body);
    } else {
        state.header_cells.clear();
        let text = if state.loading {
            "Cargando registros…"
        } else {
            "No hay registros para mostrar"
        };
        frame.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
            body,
        );
    }

    render_footer(frame, state, footer);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        help,
    );

    if state.mode == Mode::Picker {
        render_picker(frame, state);
    }
}

fn render_title(frame: &mut Frame, state: &State, area: Rect) {
    let mut spans = vec![
        Span::styled(" FleetPilot ", Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(
            state.controller.keys().layout.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(user) = &state.user {
        spans.push(Span::styled(format!("  {}", user), Style::default().fg(Color::DarkGray)));
    }
    if state.loading {
        spans.push(Span::styled("  ⟳", Style::default().fg(Color::Yellow)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Display width of each grid column, capped
fn column_widths(grid: &GridView) -> Vec<usize> {
    grid.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let header = column.meta.display_name.width() + 2;
            let cells = grid
                .view_rows()
                .take(WIDTH_SAMPLE)
                .map(|row| row.cells[index].width())
                .max()
                .unwrap_or(0);
            header.max(cells).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
        })
        .collect()
}

/// Scroll horizontally so the cursor column is on screen
fn adjust_column_offset(state: &mut State, widths: &[usize], visible: &[usize], available: usize) {
    if state.column_cursor < state.column_offset {
        state.column_offset = state.column_cursor;
    }
    loop {
        let used: usize = visible[state.column_offset..=state.column_cursor]
            .iter()
            .map(|index| widths[*index] + 1)
            .sum();
        if used <= available || state.column_offset >= state.column_cursor {
            break;
        }
        state.column_offset += 1;
    }
}

/// Header geometry of the columns that fit in `area`
fn layout_header(
    visible: &[usize],
    widths: &[usize],
    offset: usize,
    area: Rect,
) -> Vec<HeaderCell> {
    let mut cells = Vec::new();
    let mut x = area.x + GUTTER;
    let right = area.x + area.width;
    for index in visible.iter().skip(offset) {
        if x >= right {
            break;
        }
        let width = (widths[*index] as u16).min(right - x);
        cells.push(HeaderCell {
            x,
            width,
            field_index: *index,
        });
        x = x.saturating_add(width + 1);
    }
    cells
}

fn sort_marker(grid: &GridView, column: usize) -> String {
    let order = grid.order();
    match order.iter().position(|(c, _)| *c == column) {
        Some(rank) => {
            let arrow = match order[rank].1 {
                SortDirection::Asc => "▲",
                SortDirection::Desc => "▼",
            };
            if order.len() > 1 {
                format!("{}{}", arrow, rank + 1)
            } else {
                arrow.to_string()
            }
        }
        None => String::new(),
    }
}

fn render_grid(frame: &mut Frame, state: &mut State, header: Rect, body: Rect) {
    let Some(grid) = state.controller.grid() else {
        return;
    };
    let visible = grid.visible_columns();
    let widths = column_widths(grid);

    if visible.is_empty() {
        state.header_cells.clear();
        frame.render_widget(
            Paragraph::new("Todas las columnas están ocultas. Pulse c para elegir columnas.")
                .style(Style::default().fg(Color::DarkGray)),
            body,
        );
        return;
    }

    state.column_cursor = state.column_cursor.min(visible.len() - 1);
    adjust_column_offset(state, &widths, &visible, header.width.saturating_sub(GUTTER) as usize);
    let cells = layout_header(&visible, &widths, state.column_offset, header);

    let Some(grid) = state.controller.grid() else {
        return;
    };
    let cursor_column = visible.get(state.column_cursor).copied();

    // Header
    let mut spans = vec![Span::raw(" ".repeat(GUTTER as usize))];
    for cell in &cells {
        let column = &grid.columns()[cell.field_index];
        let caption = format!("{} {}", column.meta.display_name, sort_marker(grid, cell.field_index));
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if Some(cell.field_index) == cursor_column {
            style = style.fg(Color::Cyan).add_modifier(Modifier::UNDERLINED);
        }
        spans.push(Span::styled(pad(&truncate(caption.trim_end(), cell.width as usize), cell.width as usize), style));
        spans.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), header);

    if let Some(slot) = state.drag.and_then(|d| d.drop_index) {
        let x = match cells.get(slot) {
            Some(cell) => cell.x.saturating_sub(1),
            None => cells.last().map(|c| c.x + c.width).unwrap_or(header.x),
        };
        if x < header.x + header.width {
            frame.render_widget(
                Paragraph::new("┃").style(Style::default().fg(Color::Yellow)),
                Rect::new(x, header.y, 1, 1),
            );
        }
    }

    // Body
    let selected_key = state.controller.selected_key();
    let cursor = state.rows.selected();
    let offset = state.rows.scroll_offset();
    let lines: Vec<Line> = grid
        .view_rows()
        .enumerate()
        .skip(offset)
        .take(body.height as usize)
        .map(|(position, row)| {
            let is_selected = selected_key == Some(row.key.as_str());
            let mut row_style = Style::default();
            if is_selected {
                row_style = row_style.bg(Color::Blue).fg(Color::White);
            }
            if cursor == Some(position) {
                row_style = row_style.add_modifier(Modifier::REVERSED);
            }

            let mut spans = vec![Span::raw(if is_selected { "● " } else { "  " })];
            for cell in &cells {
                let text = &row.cells[cell.field_index];
                let width = cell.width as usize;
                match grid.status_badge(cell.field_index, text) {
                    Some(badge) => {
                        let style = Style::default()
                            .fg(badge_color(badge.category))
                            .add_modifier(Modifier::BOLD);
                        spans.push(Span::styled(pad(&truncate(&badge.label, width), width), style));
                    }
                    None => {
                        let shown = truncate(text, width);
                        let ranges = grid.highlight_ranges(cell.field_index, text);
                        spans.extend(highlighted(&shown, &ranges));
                        let fill = width.saturating_sub(shown.width());
                        spans.push(Span::raw(" ".repeat(fill)));
                    }
                }
                spans.push(Span::raw(" "));
            }
            Line::from(spans).style(row_style)
        })
        .collect();

    state.header_cells = cells;
    frame.render_widget(Paragraph::new(lines), body);
}

/// Split `text` into plain and highlighted spans
fn highlighted(text: &str, ranges: &[Range<usize>]) -> Vec<Span<'static>> {
    let highlight = Style::default().bg(Color::Yellow).fg(Color::Black);
    let mut spans = Vec::new();
    let mut cursor = 0;
    for range in ranges {
        let start = range.start.min(text.len());
        let end = range.end.min(text.len());
        if start < cursor || start >= end {
            continue;
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            continue;
        }
        if start > cursor {
            spans.push(Span::raw(text[cursor..start].to_string()));
        }
        spans.push(Span::styled(text[start..end].to_string(), highlight));
        cursor = end;
    }
    if cursor < text.len() {
        spans.push(Span::raw(text[cursor..].to_string()));
    }
    spans
}

/// Cut `text` to at most `width` columns, marking the cut with `…`
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(fill))
}

fn render_footer(frame: &mut Frame, state: &State, area: Rect) {
    let mut spans = Vec::new();

    if state.mode == Mode::Search {
        spans.push(Span::styled("/", Style::default().fg(Color::Cyan)));
        spans.push(Span::raw(format!("{}▌", state.search_input)));
        spans.push(Span::raw("  "));
    } else if let Some(term) = state.controller.grid().map(|g| g.search_term()).filter(|t| !t.is_empty()) {
        spans.push(Span::styled(format!("[{}] ", term), Style::default().fg(Color::Cyan)));
    }

    if let Some(grid) = state.controller.grid() {
        spans.push(Span::raw(grid.info_line()));
    }

    if let Some(row) = state.controller.selected_row() {
        let label = if row.summary.nombre_completo == MISSING_VALUE {
            row.record_key.clone()
        } else {
            row.summary.nombre_completo.clone()
        };
        spans.push(Span::styled(format!("  · {}", label), Style::default().fg(Color::Blue)));
    }

    if let Some(status) = &state.status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        spans.push(Span::styled(format!("  {}", status.text), Style::default().fg(color)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_picker(frame: &mut Frame, state: &mut State) {
    let entries = picker_entries(state);
    let area = centered(frame.area(), 50, (entries.len() as u16 + 4).clamp(6, 20));
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Columnas ")
        .title_bottom(" Espacio mostrar/ocultar  ^A todas  ^N ninguna  ^R restablecer ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [filter, list] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);
    frame.render_widget(
        Paragraph::new(format!("Filtrar: {}▌", state.picker.filter)),
        filter,
    );

    state.picker.list.set_viewport_height(list.height as usize);
    let cursor = state.picker.list.selected();
    let lines: Vec<Line> = entries
        .iter()
        .enumerate()
        .skip(state.picker.list.scroll_offset())
        .take(list.height as usize)
        .map(|(index, (name, caption, locked))| {
            let mark = if state.controller.state().is_visible(name) { "[x]" } else { "[ ]" };
            let mut style = Style::default();
            if *locked {
                style = style.fg(Color::DarkGray);
            }
            if cursor == Some(index) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(format!("{} {}", mark, caption), style))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), list);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_display_width() {
        assert_eq!(truncate("Matrícula", 20), "Matrícula");
        assert_eq!(truncate("Nombre completo", 7), "Nombre…");
        assert_eq!(truncate("日本語テキスト", 5).width(), 5);
    }

    #[test]
    fn test_highlighted_splits_spans() {
        let spans = highlighted("Ana Ruiz", &[4..8]);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].content, "Ana ");
        assert_eq!(spans[1].content, "Ruiz");

        // ranges past a truncated prefix are dropped
        let spans = highlighted("Ana…", &[4..8]);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_layout_header_clips_to_area() {
        let area = Rect::new(0, 1, 30, 1);
        let cells = layout_header(&[0, 2, 3], &[10, 5, 10, 20], 0, area);
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0], HeaderCell { x: 2, width: 10, field_index: 0 });
        assert_eq!(cells[1], HeaderCell { x: 13, width: 10, field_index: 2 });
        assert_eq!(cells[2], HeaderCell { x: 24, width: 6, field_index: 3 });
        let cells = layout_header(&[0, 2, 3], &[10, 5, 10, 20], 1, area);
        assert_eq!(cells[0].field_index, 2);
        assert_eq!(cells[1].width, 30 - 13);
    }
}
