//! Tabular data helpers behind the CSV and modelling tools.
//!
//! A [`DataFrame`] is deliberately small: every cell is kept as the trimmed
//! string read from disk and typed views are computed per column on demand.

pub mod clean;
pub mod random_forest;
pub mod sample;

use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

pub use clean::{clean, CleanReport};
pub use random_forest::{ForestParams, RandomForest};
pub use sample::create_sample_data;

/// Column dtype, named the way dataframe libraries print them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int64,
    Float64,
    Bool,
    Object,
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::Int64 => write!(f, "int64"),
            DType::Float64 => write!(f, "float64"),
            DType::Bool => write!(f, "bool"),
            DType::Object => write!(f, "object"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV {}", path.display()))?;

        let columns: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            anyhow::bail!("{} has no header row", path.display());
        }

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV record {} in {}", line + 1, path.display()))?;
            let mut row: Vec<String> = record.iter().map(|v| v.to_string()).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn null_count(&self, idx: usize) -> usize {
        self.rows.iter().filter(|r| is_null(&r[idx])).count()
    }

    pub fn dtype(&self, idx: usize) -> DType {
        let values: Vec<&str> = self
            .rows
            .iter()
            .map(|r| r[idx].as_str())
            .filter(|v| !is_null(v))
            .collect();
        if values.is_empty() {
            return DType::Object;
        }
        if values.iter().all(|v| v.parse::<i64>().is_ok()) {
            // missing values force a float column, as they would in a dataframe
            if self.null_count(idx) > 0 {
                DType::Float64
            } else {
                DType::Int64
            }
        } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
            DType::Float64
        } else if values.iter().all(|v| matches!(*v, "True" | "False" | "true" | "false")) {
            DType::Bool
        } else {
            DType::Object
        }
    }

    /// Numeric view of a column, `None` when any present value is non-numeric.
    /// Missing cells are skipped.
    pub fn numeric_values(&self, idx: usize) -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let cell = &row[idx];
            if is_null(cell) {
                continue;
            }
            out.push(cell.parse::<f64>().ok()?);
        }
        Some(out)
    }

    /// Summary statistics for every numeric column
    pub fn describe(&self) -> Vec<ColumnSummary> {
        let mut summaries = Vec::new();
        for (idx, name) in self.columns.iter().enumerate() {
            if !matches!(self.dtype(idx), DType::Int64 | DType::Float64) {
                continue;
            }
            let Some(mut values) = self.numeric_values(idx) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            summaries.push(ColumnSummary {
                column: name.clone(),
                count,
                mean,
                std: sample_std(&values, mean),
                min: values[0],
                q25: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q75: quantile(&values, 0.75),
                max: values[count - 1],
            });
        }
        summaries
    }

    /// First `n` rows rendered as an aligned text table
    pub fn head(&self, n: usize) -> String {
        let shown: Vec<&Vec<String>> = self.rows.iter().take(n).collect();
        let index_width = shown.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                shown
                    .iter()
                    .map(|r| display_cell(&r[i]).len())
                    .chain(std::iter::once(c.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        out.push_str(&" ".repeat(index_width));
        for (c, w) in self.columns.iter().zip(&widths) {
            out.push_str(&format!("  {:>w$}", c, w = w));
        }
        out.push('\n');
        for (i, row) in shown.iter().enumerate() {
            out.push_str(&format!("{:<w$}", i, w = index_width));
            for (cell, w) in row.iter().zip(&widths) {
                out.push_str(&format!("  {:>w$}", display_cell(cell), w = w));
            }
            out.push('\n');
        }
        out
    }
}

pub fn is_null(cell: &str) -> bool {
    matches!(cell.trim(), "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "None")
}

fn display_cell(cell: &str) -> &str {
    if is_null(cell) {
        "NaN"
    } else {
        cell
    }
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
