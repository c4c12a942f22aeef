//! Plain-terminal rendering of grid views

use anyhow::{Context, Result};
use colored::*;
use serde_json::{Map, Value};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::records::projector::format_status;
use crate::records::{StatusBadge, StatusCategory};
use crate::table::GridView;

const MAX_CELL_WIDTH: usize = 40;

/// Rows of a grid ready for printing
#[derive(Debug, Clone, PartialEq)]
pub struct Tabular {
    pub names: Vec<String>,
    pub headers: Vec<String>,
    /// Per column: whether cells render as status badges
    pub status: Vec<bool>,
    pub rows: Vec<Vec<String>>,
}

impl Tabular {
    /// Filtered, ordered rows of the grid; hidden columns only with `all_columns`
    pub fn from_grid(grid: &GridView, all_columns: bool) -> Self {
        let columns: Vec<usize> = if all_columns {
            (0..grid.columns().len()).collect()
        } else {
            grid.visible_columns()
        };
        let meta = |index: &usize| &grid.columns()[*index];

        Self {
            names: columns.iter().map(|i| meta(i).meta.name.clone()).collect(),
            headers: columns.iter().map(|i| meta(i).meta.display_name.clone()).collect(),
            status: columns.iter().map(|i| meta(i).status).collect(),
            rows: grid
                .view_rows()
                .map(|row| columns.iter().map(|i| row.cells[*i].clone()).collect())
                .collect(),
        }
    }
}

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

pub fn colored_badge(badge: &StatusBadge) -> ColoredString {
    match badge.category {
        StatusCategory::Success => badge.label.green(),
        StatusCategory::Danger => badge.label.red(),
        StatusCategory::Warning => badge.label.yellow(),
        StatusCategory::Secondary => badge.label.dimmed(),
        StatusCategory::Neutral => badge.label.normal(),
    }
}

/// Aligned text table
pub fn format_table(table: &Tabular) -> String {
    let cell = |text: &str| truncate(&text.replace('\n', " "), MAX_CELL_WIDTH);
    let rows: Vec<Vec<(String, Option<StatusBadge>)>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, text)| {
                    if table.status[i] {
                        let badge = format_status(Some(text));
                        (cell(&badge.label), Some(badge))
                    } else {
                        (cell(text), None)
                    }
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].0.width())
                .chain(std::iter::once(cell(header).width()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let fill = |text: &str, width: usize| " ".repeat(width.saturating_sub(text.width()));

    let mut out = String::new();
    let header: Vec<String> = table
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| {
            let h = cell(h);
            format!("{}{}", h.bold(), fill(&h, *w))
        })
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push_str(&rule.join("  ").dimmed().to_string());
    out.push('\n');

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|((text, badge), width)| {
                let styled = match badge {
                    Some(badge) => colored_badge(&StatusBadge {
                        label: text.clone(),
                        category: badge.category,
                    })
                    .to_string(),
                    None => text.clone(),
                };
                format!("{}{}", styled, fill(text, *width))
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Array of objects keyed by raw field name, in column order
pub fn format_json(table: &Tabular) -> Result<String> {
    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .names
                .iter()
                .cloned()
                .zip(row.iter().map(|cell| Value::String(cell.clone())))
                .collect();
            Value::Object(object)
        })
        .collect();
    serde_json::to_string_pretty(&rows).context("Failed to format JSON output")
}

/// CSV with the captions as header row
pub fn format_csv(table: &Tabular) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .context("Failed to write CSV header")?;
    for row in &table.rows {
        writer.write_record(row).context("Failed to write CSV row")?;
    }
    let bytes = writer.into_inner().context("Failed to finish CSV output")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tabular {
        Tabular {
            names: vec!["nombreCompleto".into(), "estado".into()],
            headers: vec!["Nombre completo".into(), "Estado".into()],
            status: vec![false, true],
            rows: vec![
                vec!["Ana, Ruiz".into(), "activo".into()],
                vec!["Luis".into(), "baja".into()],
            ],
        }
    }

    #[test]
    fn test_format_table_aligns_columns() {
        colored::control::set_override(false);
        let text = format_table(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Nombre completo  Estado"));
        assert!(lines[1].starts_with("───────────────  ──────"));
        assert!(lines[2].starts_with("Ana, Ruiz        "));
    }

    #[test]
    fn test_format_json_keeps_field_names() {
        let json: Value = serde_json::from_str(&format_json(&sample()).unwrap()).unwrap();
        assert_eq!(json[0]["nombreCompleto"], "Ana, Ruiz");
        assert_eq!(json[1]["estado"], "baja");
    }

    #[test]
    fn test_format_csv_quotes_cells() {
        let csv = format_csv(&sample()).unwrap();
        assert_eq!(csv.lines().next(), Some("Nombre completo,Estado"));
        assert_eq!(csv.lines().nth(1), Some("\"Ana, Ruiz\",activo"));
    }

    #[test]
    fn test_truncate_long_cells() {
        let long = "x".repeat(60);
        assert_eq!(truncate(&long, MAX_CELL_WIDTH).width(), MAX_CELL_WIDTH);
    }
}
