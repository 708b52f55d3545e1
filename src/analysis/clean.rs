//! Deterministic cleaning applied by the `clean_csv` tool

use std::collections::HashSet;

use super::{is_null, DataFrame};

const ID_COLUMNS: &[&str] = &[
    "id",
    "customerid",
    "customer_id",
    "userid",
    "user_id",
    "row_id",
    "index",
    "unnamed: 0",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub empty_rows: usize,
    pub missing_rows: usize,
    pub duplicate_rows: usize,
    pub dropped_columns: Vec<String>,
    pub binary_columns: Vec<String>,
}

impl std::fmt::Display for CleanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Rows: {} -> {}", self.rows_in, self.rows_out)?;
        writeln!(f, "Dropped empty rows: {}", self.empty_rows)?;
        writeln!(f, "Dropped rows with missing values: {}", self.missing_rows)?;
        writeln!(f, "Dropped duplicate rows: {}", self.duplicate_rows)?;
        writeln!(f, "Dropped identifier columns: {}", list_or_none(&self.dropped_columns))?;
        write!(f, "Encoded yes/no columns as 1/0: {}", list_or_none(&self.binary_columns))
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn is_id_column(name: &str) -> bool {
    ID_COLUMNS.contains(&name.trim().to_lowercase().as_str())
}

fn binary_value(cell: &str) -> Option<&'static str> {
    match cell.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" => Some("1"),
        "no" | "n" | "false" => Some("0"),
        _ => None,
    }
}

/// Clean `df`, returning the cleaned frame and what was changed
pub fn clean(df: &DataFrame) -> (DataFrame, CleanReport) {
    let mut report = CleanReport {
        rows_in: df.rows.len(),
        ..Default::default()
    };

    let keep: Vec<usize> = (0..df.columns.len())
        .filter(|&i| {
            if is_id_column(&df.columns[i]) {
                report.dropped_columns.push(df.columns[i].clone());
                false
            } else {
                true
            }
        })
        .collect();

    let columns: Vec<String> = keep.iter().map(|&i| df.columns[i].clone()).collect();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(df.rows.len());
    for row in &df.rows {
        if row.iter().all(|c| c.trim().is_empty()) {
            report.empty_rows += 1;
            continue;
        }
        rows.push(keep.iter().map(|&i| row[i].trim().to_string()).collect());
    }

    for idx in 0..columns.len() {
        let mut present = rows.iter().map(|r| r[idx].as_str()).filter(|c| !is_null(c)).peekable();
        if present.peek().is_none() || !present.all(|c| binary_value(c).is_some()) {
            continue;
        }
        for row in &mut rows {
            if let Some(v) = binary_value(&row[idx]) {
                row[idx] = v.to_string();
            }
        }
        report.binary_columns.push(columns[idx].clone());
    }

    let before = rows.len();
    rows.retain(|r| !r.iter().any(|c| is_null(c)));
    report.missing_rows = before - rows.len();

    let mut seen = HashSet::new();
    let before = rows.len();
    rows.retain(|r| seen.insert(r.clone()));
    report.duplicate_rows = before - rows.len();

    report.rows_out = rows.len();
    (DataFrame::new(columns, rows), report)
}
