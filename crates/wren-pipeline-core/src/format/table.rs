use serde_json::{Number, Value};

use crate::api::types::{Column, Record};

pub const NO_DATA: &str = "No data available.";

/// Render records as a markdown table in the columns' declared order.
///
/// At most `max_rows` rows are rendered; the trailing summary always reports
/// the number of records received and notes when the table was truncated.
pub fn render_table(records: &[Record], columns: &[Column], max_rows: usize) -> String {
    if records.is_empty() || columns.is_empty() {
        return NO_DATA.to_string();
    }

    let names: Vec<String> = columns.iter().map(|c| escape_cell(&c.name)).collect();
    let mut out = String::new();
    out.push_str(&row_line(&names));
    out.push('\n');
    out.push_str(&row_line(&vec!["---".to_string(); names.len()]));
    out.push('\n');

    let rows: Vec<String> = records
        .iter()
        .take(max_rows)
        .map(|record| {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| format_cell(record.get(&c.name)))
                .collect();
            row_line(&cells)
        })
        .collect();
    out.push_str(&rows.join("\n"));

    out.push_str("\n\n**Total rows:** ");
    out.push_str(&format_count(records.len() as u64));
    if records.len() > max_rows {
        out.push_str(" (showing first ");
        out.push_str(&format_count(max_rows as u64));
        out.push(')');
    }
    out
}

/// `1234567` -> `1,234,567`.
pub fn format_count(n: u64) -> String {
    group_thousands(&n.to_string())
}

fn row_line(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Number(n)) => format_number(n),
        Some(Value::String(s)) => escape_cell(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => escape_cell(&other.to_string()),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return format_integer(&i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return format_integer(&u.to_string());
    }
    match n.as_f64() {
        Some(f) if f.abs() >= 1000.0 => format_integer(&format!("{f:.2}")),
        Some(f) => format!("{f:.2}"),
        None => n.to_string(),
    }
}

/// Insert thousands separators into the integer part of a decimal string.
fn format_integer(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (unsigned, None),
    };

    let mut out = String::with_capacity(text.len() + int_part.len() / 3);
    out.push_str(sign);
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Cells must stay on one line and must not close the cell early.
fn escape_cell(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('|', "\\|")
}
