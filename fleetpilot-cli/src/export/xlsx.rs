//! Office Open XML parts for a single-sheet workbook with inline strings

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use super::zip::{ZipEntry, write_stored};

pub const DEFAULT_SHEET_NAME: &str = "Hoja1";
pub const DEFAULT_FILE_STEM: &str = "export";
pub const CREATOR: &str = "FleetPilot";
const MAX_SHEET_NAME_CHARS: usize = 31;
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Spreadsheet column letters for a zero-based index (`0` is `A`, `26` is `AA`)
pub fn column_letter(index: usize) -> String {
    let mut dividend = index + 1;
    let mut letters = Vec::new();
    while dividend > 0 {
        let modulo = (dividend - 1) % 26;
        letters.push((b'A' + modulo as u8) as char);
        dividend = (dividend - modulo - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Escape markup characters and drop characters XML 1.0 cannot carry
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars().filter(|c| is_xml_char(*c)) {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Worksheet name: whitespace collapsed, `\ / ? * [ ] :` replaced by a
/// space, at most 31 characters
pub fn sanitize_sheet_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed
        .chars()
        .map(|c| match c {
            '\\' | '/' | '?' | '*' | '[' | ']' | ':' => ' ',
            other => other,
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    if cleaned.trim().is_empty() {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        cleaned
    }
}

/// File stem: whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_-]` is dropped
pub fn sanitize_file_stem(name: &str) -> String {
    let joined = name.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        cleaned
    }
}

/// `<stem>_<YYYYMMDD_HHMMSS>.xlsx`
pub fn export_file_name(layout: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.xlsx", sanitize_file_stem(layout), now.format("%Y%m%d_%H%M%S"))
}

fn inline_cell(value: &str, column: usize, row: usize) -> String {
    format!(
        r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        column_letter(column),
        row,
        escape_xml(value)
    )
}

pub fn worksheet_xml(headers: &[String], rows: &[Vec<String>]) -> String {
    let dimension = if headers.is_empty() {
        "A1".to_string()
    } else {
        format!("A1:{}{}", column_letter(headers.len() - 1), rows.len() + 1)
    };

    let mut sheet_data = String::from(r#"<row r="1">"#);
    for (column, header) in headers.iter().enumerate() {
        sheet_data.push_str(&inline_cell(header, column, 1));
    }
    sheet_data.push_str("</row>");

    for (index, cells) in rows.iter().enumerate() {
        let row = index + 2;
        sheet_data.push_str(&format!(r#"<row r="{}">"#, row));
        for (column, value) in cells.iter().enumerate() {
            sheet_data.push_str(&inline_cell(value, column, row));
        }
        sheet_data.push_str("</row>");
    }

    format!(
        r#"{}<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="{}"/><sheetData>{}</sheetData></worksheet>"#,
        XML_DECLARATION, dimension, sheet_data
    )
}

pub fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"{}<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        XML_DECLARATION,
        escape_xml(sheet_name)
    )
}

fn workbook_relationships_xml() -> String {
    format!(
        r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        XML_DECLARATION
    )
}

fn package_relationships_xml() -> String {
    format!(
        concat!(
            r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
            r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
            "</Relationships>"
        ),
        XML_DECLARATION
    )
}

fn content_types_xml() -> String {
    format!(
        concat!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
            r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
            "</Types>"
        ),
        XML_DECLARATION
    )
}

fn app_properties_xml() -> String {
    format!(
        r#"{}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>Microsoft Excel</Application></Properties>"#,
        XML_DECLARATION
    )
}

fn core_properties_xml(title: &str, created: DateTime<Utc>) -> String {
    let timestamp = created.to_rfc3339_opts(SecondsFormat::Millis, true);
    format!(
        concat!(
            r#"{}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<dc:title>{}</dc:title><dc:creator>{}</dc:creator><cp:lastModifiedBy>{}</cp:lastModifiedBy>",
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>"#,
            r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{}</dcterms:modified>"#,
            "</cp:coreProperties>"
        ),
        XML_DECLARATION,
        escape_xml(title),
        CREATOR,
        CREATOR,
        timestamp,
        timestamp
    )
}

/// Complete `.xlsx` package bytes for one sheet of inline-string cells
pub fn build_spreadsheet(
    headers: &[String],
    rows: &[Vec<String>],
    sheet_name: &str,
    created: DateTime<Utc>,
) -> Vec<u8> {
    let sheet_name = sanitize_sheet_name(sheet_name);
    let entries = [
        ZipEntry::new("[Content_Types].xml", content_types_xml()),
        ZipEntry::new("_rels/.rels", package_relationships_xml()),
        ZipEntry::new("docProps/app.xml", app_properties_xml()),
        ZipEntry::new("docProps/core.xml", core_properties_xml(&sheet_name, created)),
        ZipEntry::new("xl/workbook.xml", workbook_xml(&sheet_name)),
        ZipEntry::new("xl/_rels/workbook.xml.rels", workbook_relationships_xml()),
        ZipEntry::new("xl/worksheets/sheet1.xml", worksheet_xml(headers, rows)),
    ];
    write_stored(&entries)
}
