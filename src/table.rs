//! Fixed-width text tables for query results and catalog listings.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{datastore::Row, schema::Column};

const NULL_DISPLAY: &str = "<null>";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separators = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separators, &separator_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

/// Renders text-materialized query rows; the first row supplies the headers.
pub fn render_rows(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::from("(0 rows)\n");
    };
    let cells = rows
        .iter()
        .map(|row| {
            row.fields()
                .iter()
                .map(|f| f.value.clone().unwrap_or_else(|| NULL_DISPLAY.to_string()))
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    render_table(&first.names(), &cells)
}

pub fn render_columns(columns: &[Column]) -> String {
    let headers = vec![
        "column".to_string(),
        "type".to_string(),
        "date_format".to_string(),
    ];
    let rows = columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.data_type.to_string(),
                c.date_format.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&sanitized));
            format!("{sanitized}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
