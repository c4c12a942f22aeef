//! In-memory grid: global search, multi-column sort, column visibility
//!
//! The grid owns the cell text of every row and computes the live view
//! (visible columns, filtered rows in sort order) that both the terminal
//! renderer and the spreadsheet exporter read.

use std::cmp::Ordering;
use std::ops::Range;

use super::columns::ColumnMeta;
use super::state::SortDirection;
use crate::records::aliases::{normalize_column_name, normalize_search_text};
use crate::records::projector::{ProjectedRow, StatusBadge, format_status};

/// A column of the grid
#[derive(Debug, Clone)]
pub struct GridColumn {
    pub meta: ColumnMeta,
    pub visible: bool,
    /// Whether the column renders as a status badge
    pub status: bool,
}

/// A row of the grid
#[derive(Debug, Clone)]
pub struct GridRow {
    pub key: String,
    pub record_id: Option<String>,
    pub cells: Vec<String>,
    search_text: String,
}

impl GridRow {
    pub fn new(key: String, record_id: Option<String>, cells: Vec<String>) -> Self {
        let search_text = normalize_search_text(&cells.join(" "));
        Self {
            key,
            record_id,
            cells,
            search_text,
        }
    }

    /// Build a row from a projected record following the column layout
    pub fn from_projected(row: &ProjectedRow, columns: &[ColumnMeta]) -> Self {
        let cells = columns
            .iter()
            .map(|column| {
                if column.synthetic {
                    row.summary.nombre_completo.clone()
                } else {
                    row.cell_text(&column.name)
                }
            })
            .collect();
        Self::new(row.record_key.clone(), row.record_id.clone(), cells)
    }
}

/// Visible columns and filtered, ordered rows at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl LiveView {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridView {
    columns: Vec<GridColumn>,
    rows: Vec<GridRow>,
    search: String,
    tokens: Vec<String>,
    order: Vec<(usize, SortDirection)>,
    /// Indices into `rows`, filtered and sorted
    view: Vec<usize>,
}

impl GridView {
    pub fn new(columns: Vec<GridColumn>, rows: Vec<GridRow>) -> Self {
        let mut grid = Self {
            columns,
            rows,
            ..Self::default()
        };
        grid.draw();
        grid
    }

    /// Columns built from metadata, all visible until told otherwise
    pub fn columns_from_meta(meta: Vec<ColumnMeta>) -> Vec<GridColumn> {
        meta.into_iter()
            .map(|meta| {
                let status = normalize_column_name(&meta.name) == "estado";
                GridColumn {
                    meta,
                    visible: true,
                    status,
                }
            })
            .collect()
    }

    pub fn columns(&self) -> &[GridColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn filtered_count(&self) -> usize {
        self.view.len()
    }

    pub fn search_term(&self) -> &str {
        &self.search
    }

    pub fn search_tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn order(&self) -> &[(usize, SortDirection)] {
        &self.order
    }

    /// Set the global search term and redraw
    pub fn search(&mut self, term: &str) {
        self.search = term.to_string();
        self.tokens = normalize_search_text(term)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self.draw();
    }

    /// Replace the sort order; out-of-range columns are ignored
    pub fn set_order(&mut self, order: Vec<(usize, SortDirection)>) {
        self.order = order
            .into_iter()
            .filter(|(column, _)| *column < self.columns.len())
            .collect();
        self.draw();
    }

    /// Header-click sorting. A plain click sorts by the column alone,
    /// flipping direction when it already leads; `additive` appends or
    /// flips the column within a multi-column sort.
    pub fn toggle_sort(&mut self, column: usize, additive: bool) {
        if column >= self.columns.len() {
            return;
        }

        if additive {
            match self.order.iter_mut().find(|(c, _)| *c == column) {
                Some(entry) => entry.1 = entry.1.toggled(),
                None => self.order.push((column, SortDirection::Asc)),
            }
        } else {
            let direction = match self.order.first() {
                Some((c, dir)) if *c == column => dir.toggled(),
                _ => SortDirection::Asc,
            };
            self.order = vec![(column, direction)];
        }
        self.draw();
    }

    pub fn set_column_visible(&mut self, column: usize, visible: bool) {
        if let Some(entry) = self.columns.get_mut(column) {
            entry.visible = visible;
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.meta.name == name)
    }

    /// Indices of visible columns, in display order
    pub fn visible_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.visible)
            .map(|(index, _)| index)
            .collect()
    }

    /// Filtered and ordered rows
    pub fn view_rows(&self) -> impl Iterator<Item = &GridRow> {
        self.view.iter().map(|index| &self.rows[*index])
    }

    pub fn view_row(&self, position: usize) -> Option<&GridRow> {
        self.view.get(position).map(|index| &self.rows[*index])
    }

    /// Position of a row key within the current view
    pub fn view_position(&self, key: &str) -> Option<usize> {
        self.view.iter().position(|index| self.rows[*index].key == key)
    }

    /// Recompute the filtered, ordered view
    pub fn draw(&mut self) {
        let mut view: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                self.tokens
                    .iter()
                    .all(|token| row.search_text.contains(token.as_str()))
            })
            .map(|(index, _)| index)
            .collect();

        if !self.order.is_empty() {
            view.sort_by(|a, b| {
                for (column, direction) in &self.order {
                    let ordering = compare_cells(
                        &self.rows[*a].cells[*column],
                        &self.rows[*b].cells[*column],
                    );
                    let ordering = match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        self.view = view;
    }

    /// Snapshot of what is currently shown
    pub fn live_view(&self) -> LiveView {
        let visible = self.visible_columns();
        LiveView {
            headers: visible
                .iter()
                .map(|index| self.columns[*index].meta.display_name.clone())
                .collect(),
            rows: self
                .view_rows()
                .map(|row| visible.iter().map(|index| row.cells[*index].clone()).collect())
                .collect(),
        }
    }

    /// Status badge of a cell, for status columns
    pub fn status_badge(&self, column: usize, text: &str) -> Option<StatusBadge> {
        self.columns
            .get(column)
            .filter(|c| c.status)
            .map(|_| format_status(Some(text)))
    }

    /// Byte ranges of `text` matching the search tokens.
    ///
    /// Longer tokens win; ranges never overlap. Status cells are not
    /// highlighted.
    pub fn highlight_ranges(&self, column: usize, text: &str) -> Vec<Range<usize>> {
        if self.columns.get(column).is_some_and(|c| c.status) {
            return Vec::new();
        }
        highlight_ranges(&self.search, text)
    }

    /// Summary line in the usual grid wording
    pub fn info_line(&self) -> String {
        let shown = self.filtered_count();
        let total = self.total_rows();
        if shown == total {
            format!("Mostrando {} registros", shown)
        } else {
            format!("Mostrando {} registros (filtrado de {} registros totales)", shown, total)
        }
    }
}

/// Ranges of `text` matching the whitespace tokens of `term`, compared the
/// way the search compares: without case or diacritics
pub fn highlight_ranges(term: &str, text: &str) -> Vec<Range<usize>> {
    let term = normalize_search_text(term);
    let mut tokens: Vec<&str> = term.split_whitespace().collect();
    if tokens.is_empty() || text.is_empty() {
        return Vec::new();
    }
    tokens.sort_by_key(|token| std::cmp::Reverse(token.chars().count()));
    tokens.dedup();

    let (folded, origins) = fold_with_offsets(text);
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for token in tokens {
        for (at, _) in folded.match_indices(token) {
            let range = origins[at].start..origins[at + token.len() - 1].end;
            if ranges
                .iter()
                .all(|existing| range.end <= existing.start || range.start >= existing.end)
            {
                ranges.push(range);
            }
        }
    }
    ranges.sort_by_key(|range| range.start);
    ranges
}

/// `text` folded like the search haystack, with the source byte range of
/// every folded byte
fn fold_with_offsets(text: &str) -> (String, Vec<Range<usize>>) {
    let mut folded = String::with_capacity(text.len());
    let mut origins: Vec<Range<usize>> = Vec::with_capacity(text.len());
    let mut buf = [0u8; 4];

    for (start, c) in text.char_indices() {
        let end = start + c.len_utf8();
        let piece = normalize_search_text(c.encode_utf8(&mut buf));
        if piece.is_empty() {
            // combining mark: extend the preceding character
            if let Some(owner) = origins.last().map(|origin| origin.start) {
                for origin in origins.iter_mut().rev().take_while(|o| o.start == owner) {
                    origin.end = end;
                }
            }
            continue;
        }
        folded.push_str(&piece);
        origins.extend(std::iter::repeat_n(start..end, piece.len()));
    }
    (folded, origins)
}

/// Numeric comparison when both cells are numbers, else case-insensitive text
pub fn compare_cells(a: &str, b: &str) -> Ordering {
    let parse = |value: &str| value.trim().replace(',', ".").parse::<f64>().ok();
    if let (Some(x), Some(y)) = (parse(a), parse(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    // empty cells sort first
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    normalize_search_text(a).cmp(&normalize_search_text(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::columns::build_column_meta;

    fn grid() -> GridView {
        let meta = build_column_meta(&["nombreCompleto".into(), "estado".into(), "edad".into()]);
        let rows = vec![
            GridRow::new("1".into(), None, vec!["Ana Ruiz".into(), "Contratado".into(), "31".into()]),
            GridRow::new("2".into(), None, vec!["José Pérez".into(), "En bolsa".into(), "9".into()]),
            GridRow::new("3".into(), None, vec!["ana Gil".into(), "Finalizado".into(), "".into()]),
        ];
        GridView::new(GridView::columns_from_meta(meta), rows)
    }

    fn keys(grid: &GridView) -> Vec<String> {
        grid.view_rows().map(|row| row.key.clone()).collect()
    }

    #[test]
    fn test_search_requires_every_token() {
        let mut grid = grid();
        grid.search("ana");
        assert_eq!(keys(&grid), vec!["1", "3"]);

        grid.search("ANA contratado");
        assert_eq!(keys(&grid), vec!["1"]);

        grid.search("jose perez");
        assert_eq!(keys(&grid), vec!["2"]);
        assert_eq!(grid.info_line(), "Mostrando 1 registros (filtrado de 3 registros totales)");

        grid.search("  ");
        assert_eq!(grid.filtered_count(), 3);
        assert_eq!(grid.info_line(), "Mostrando 3 registros");
    }

    #[test]
    fn test_numeric_and_text_sorting() {
        let mut grid = grid();
        grid.set_order(vec![(2, SortDirection::Asc)]);
        assert_eq!(keys(&grid), vec!["3", "2", "1"]);

        grid.set_order(vec![(0, SortDirection::Desc)]);
        assert_eq!(keys(&grid), vec!["2", "1", "3"]);
    }

    #[test]
    fn test_toggle_sort() {
        let mut grid = grid();
        grid.toggle_sort(0, false);
        assert_eq!(grid.order(), &[(0, SortDirection::Asc)]);
        grid.toggle_sort(0, false);
        assert_eq!(grid.order(), &[(0, SortDirection::Desc)]);
        grid.toggle_sort(1, true);
        assert_eq!(grid.order(), &[(0, SortDirection::Desc), (1, SortDirection::Asc)]);
        grid.toggle_sort(1, false);
        assert_eq!(grid.order(), &[(1, SortDirection::Asc)]);
        grid.toggle_sort(9, false);
        assert_eq!(grid.order(), &[(1, SortDirection::Asc)]);
    }

    #[test]
    fn test_live_view_follows_visibility_filter_and_order() {
        let mut grid = grid();
        grid.set_column_visible(2, false);
        grid.search("ana");
        grid.set_order(vec![(0, SortDirection::Asc)]);

        let view = grid.live_view();
        assert_eq!(view.headers, vec!["Nombre completo", "Estado"]);
        assert_eq!(
            view.rows,
            vec![
                vec!["ana Gil".to_string(), "Finalizado".to_string()],
                vec!["Ana Ruiz".to_string(), "Contratado".to_string()],
            ]
        );
    }

    #[test]
    fn test_highlight_ranges_prefer_longer_tokens() {
        let ranges = highlight_ranges("an ana", "Ana Banana");
        assert_eq!(ranges, vec![0..3, 5..8]);

        assert!(highlight_ranges("", "Ana").is_empty());
        assert_eq!(highlight_ranges("a.b", "xa.by"), vec![1..4]);
    }

    #[test]
    fn test_highlight_ignores_accents_and_case() {
        assert_eq!(highlight_ranges("jose", "José Núñez"), vec![0..5]);
        assert_eq!(highlight_ranges("NUNEZ josé", "José Núñez"), vec![0..5, 6..13]);
        // decomposed input keeps its combining mark inside the range
        assert_eq!(highlight_ranges("jose", "Jose\u{301} Ruiz"), vec![0..6]);
        assert!(highlight_ranges("josep", "José").is_empty());
    }

    #[test]
    fn test_status_column_is_not_highlighted() {
        let mut grid = grid();
        grid.search("contratado");
        assert!(grid.highlight_ranges(1, "Contratado").is_empty());
        assert_eq!(grid.highlight_ranges(0, "Contratado"), vec![0..10]);
        assert!(grid.status_badge(1, "Contratado").is_some());
        assert!(grid.status_badge(0, "Contratado").is_none());
    }

    #[test]
    fn test_compare_cells() {
        assert_eq!(compare_cells("10", "9"), Ordering::Greater);
        assert_eq!(compare_cells("1,5", "1.25"), Ordering::Greater);
        assert_eq!(compare_cells("", "a"), Ordering::Less);
        assert_eq!(compare_cells("Álvaro", "beatriz"), Ordering::Less);
    }
}
