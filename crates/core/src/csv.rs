//! CSV text encoding for tabular datasets held in text media.
//!
//! Follows RFC 4180: a header row of column names, fields quoted when they
//! contain a comma, quote, or line break, embedded quotes doubled. Quoted
//! fields may span lines. Columns are matched by header name, so a file
//! whose columns were reordered (or that carries extra columns) still maps
//! onto the dataset's column order.

use std::borrow::Cow;

use crate::codec::Row;
use crate::error::CoreError;

/// Render rows (in `columns` order) as CSV text with a trailing newline.
pub fn write_table(columns: &[&str], rows: &[Row]) -> String {
    let mut out = String::new();
    push_line(&mut out, columns.iter().map(|c| escape(c)));
    for row in rows {
        push_line(
            &mut out,
            row.iter().map(|cell| escape(cell.as_deref().unwrap_or(""))),
        );
    }
    out
}

/// Parse CSV text into rows laid out in `columns` order.
///
/// Empty input (no header) is an empty dataset. Empty cells and columns
/// missing from the header become `None`.
pub fn parse_table(text: &str, columns: &[&str]) -> Result<Vec<Row>, CoreError> {
    let mut records = parse_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

    let positions: Vec<Option<usize>> = columns
        .iter()
        .map(|column| header.iter().position(|h| h == column))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in records.enumerate() {
        if record.len() > header.len() {
            return Err(CoreError::malformed(
                "csv",
                format!(
                    "row {} has {} fields but the header has {}",
                    line + 1,
                    record.len(),
                    header.len()
                ),
            ));
        }
        let row = positions
            .iter()
            .map(|pos| {
                pos.and_then(|i| record.get(i))
                    .filter(|value| !value.is_empty())
                    .cloned()
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Split CSV text into raw records, honouring quotes. Blank lines are skipped.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>, CoreError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                finish_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(CoreError::malformed("csv", "unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        finish_record(&mut records, record);
    }
    Ok(records)
}

fn finish_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].is_empty();
    if !blank {
        records.push(record);
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = Cow<'a, str>>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        out.push_str(&cell);
        first = false;
    }
    out.push('\n');
}

/// Quote a value if it contains a comma, quote, or line break.
fn escape(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
