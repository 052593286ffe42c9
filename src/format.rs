//! Output rendering for the CLI.
//!
//! Rows print as an ASCII table (like the MySQL CLI), a Markdown table, or
//! JSON.

use crate::config::OutputFormat;
use crate::models::{Page, Row, Value};
use serde_json::json;
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

fn columns_of(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.column_names().map(str::to_string).collect())
        .unwrap_or_default()
}

fn cell(row: &Row, column: &str) -> (String, bool) {
    match row.get(column) {
        Some(value) => (value.to_string(), value.is_numeric()),
        None => (Value::Null.to_string(), false),
    }
}

pub fn format_as_table(rows: &[Row], elapsed: Duration) -> String {
    let columns = columns_of(rows);
    if columns.is_empty() {
        return format!("Empty set ({:.2} sec)\n", elapsed.as_secs_f64());
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, column) in columns.iter().enumerate() {
            widths[i] = widths[i].max(cell(row, column).0.width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad_center(name, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(column, w)| {
                let (text, numeric) = cell(row, column);
                let pad = " ".repeat(w.saturating_sub(text.width()));
                if numeric {
                    format!("| {pad}{text} ")
                } else {
                    format!("| {text}{pad} ")
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rows.len(),
        row_text,
        elapsed.as_secs_f64()
    ));

    output
}

/// Center `text` in `width` display columns.
fn pad_center(text: &str, width: usize) -> String {
    let gap = width.saturating_sub(text.width());
    let left = gap / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(gap - left))
}

pub fn format_as_markdown(rows: &[Row]) -> String {
    let columns = columns_of(rows);
    if columns.is_empty() {
        return "*Empty set*\n".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {c} "))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let line: String = columns
            .iter()
            .map(|column| format!("| {} ", cell(row, column).0.replace('|', "\\|")))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} rows*\n", rows.len()));

    output
}

/// Render rows in the requested format.
pub fn format_rows(rows: &[Row], format: OutputFormat, elapsed: Duration) -> String {
    match format {
        OutputFormat::Table => format_as_table(rows, elapsed),
        OutputFormat::Markdown => format_as_markdown(rows),
        OutputFormat::Json => {
            let row_count = rows.len();
            let rows: Vec<_> = rows.iter().cloned().map(Row::into_json).collect();
            pretty(&json!({
                "rows": rows,
                "row_count": row_count,
                "execution_time_ms": elapsed.as_millis() as u64,
            }))
        }
    }
}

/// Render one page: the rows plus a paging footer.
pub fn format_page(page: &Page<Row>, format: OutputFormat, elapsed: Duration) -> String {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = page.items.iter().cloned().map(Row::into_json).collect();
            pretty(&json!({
                "rows": rows,
                "page_index": page.page_index,
                "page_size": page.page_size,
                "total_count": page.total_count,
                "total_pages": page.total_pages(),
                "execution_time_ms": elapsed.as_millis() as u64,
            }))
        }
        _ => format!(
            "{}Page {} of {} ({} rows total)\n",
            format_rows(&page.items, format, elapsed),
            page.page_index + 1,
            page.total_pages().max(1),
            page.total_count
        ),
    }
}

/// Render the outcome of a write.
pub fn format_affected(rows_affected: u64, format: OutputFormat, elapsed: Duration) -> String {
    match format {
        OutputFormat::Json => pretty(&json!({
            "rows_affected": rows_affected,
            "execution_time_ms": elapsed.as_millis() as u64,
        })),
        _ => {
            let row_text = if rows_affected == 1 { "row" } else { "rows" };
            format!(
                "Query OK, {rows_affected} {row_text} affected ({:.2} sec)\n",
                elapsed.as_secs_f64()
            )
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Row> {
        vec![
            Row::new().with("id", 1).with("name", "Alice"),
            Row::new().with("id", 22).with("name", "日本"),
        ]
    }

    #[test]
    fn test_table_alignment() {
        let out = format_as_table(&sample(), Duration::from_millis(10));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+----+-------+");
        assert_eq!(lines[1], "| id | name  |");
        assert_eq!(lines[3], "|  1 | Alice |");
        // Wide characters take two display columns.
        assert_eq!(lines[4], "| 22 | 日本  |");
        assert!(out.ends_with("2 rows in set (0.01 sec)\n"));
    }

    #[test]
    fn test_empty_set() {
        assert!(format_as_table(&[], Duration::ZERO).starts_with("Empty set"));
        assert_eq!(format_as_markdown(&[]), "*Empty set*\n");
    }

    #[test]
    fn test_markdown() {
        let out = format_as_markdown(&sample());
        assert!(out.starts_with("| id | name |\n|---|---|\n| 1 | Alice |\n"));
        assert!(out.ends_with("*2 rows*\n"));
    }

    #[test]
    fn test_json_rows() {
        let out = format_rows(&sample(), OutputFormat::Json, Duration::ZERO);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["row_count"], 2);
        assert_eq!(parsed["rows"][1]["name"], "日本");
    }

    #[test]
    fn test_affected() {
        let out = format_affected(1, OutputFormat::Table, Duration::ZERO);
        assert_eq!(out, "Query OK, 1 row affected (0.00 sec)\n");
    }
}
