use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{string_arg, string_params, Tool, ToolError, Workspace};
use crate::analysis::{self, ColumnSummary, DataFrame};

const HEAD_ROWS: usize = 5;

/// Head, dtypes, shape, missing counts and summary statistics of a CSV
pub struct InspectCsvTool {
    workspace: Workspace,
}

impl InspectCsvTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for InspectCsvTool {
    fn name(&self) -> &str {
        "inspect_csv"
    }

    fn description(&self) -> &str {
        "Load a CSV file and report its first rows, shape, column types, \
         missing values and summary statistics."
    }

    fn parameters(&self) -> Value {
        string_params(&[("path", "Relative path of the CSV file")])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let path = self.workspace.resolve(&string_arg(&args, "path")?)?;
        let df = DataFrame::from_path(&path).map_err(|e| ToolError::Csv(format!("{:#}", e)))?;
        Ok(render_inspection(&df))
    }
}

pub fn render_inspection(df: &DataFrame) -> String {
    let (rows, cols) = df.shape();
    let name_width = df.columns.iter().map(|c| c.len()).max().unwrap_or(0);

    let mut out = format!("Head:\n{}\n", df.head(HEAD_ROWS));
    out.push_str(&format!("Shape: ({}, {})\n\nColumn types:\n", rows, cols));
    for (i, c) in df.columns.iter().enumerate() {
        out.push_str(&format!("{:<w$}  {}\n", c, df.dtype(i), w = name_width));
    }
    out.push_str("\nMissing values:\n");
    for (i, c) in df.columns.iter().enumerate() {
        out.push_str(&format!("{:<w$}  {}\n", c, df.null_count(i), w = name_width));
    }
    out.push_str("\nSummary statistics:\n");
    out.push_str(&render_describe(&df.describe()));
    out
}

fn render_describe(stats: &[ColumnSummary]) -> String {
    if stats.is_empty() {
        return "(no numeric columns)\n".to_string();
    }

    let rows: [(&str, fn(&ColumnSummary) -> f64); 8] = [
        ("count", |s| s.count as f64),
        ("mean", |s| s.mean),
        ("std", |s| s.std),
        ("min", |s| s.min),
        ("25%", |s| s.q25),
        ("50%", |s| s.median),
        ("75%", |s| s.q75),
        ("max", |s| s.max),
    ];
    let widths: Vec<usize> = stats
        .iter()
        .map(|s| {
            rows.iter()
                .map(|(_, get)| format!("{:.6}", get(s)).len())
                .chain(std::iter::once(s.column.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = " ".repeat(5);
    for (s, w) in stats.iter().zip(&widths) {
        out.push_str(&format!("  {:>w$}", s.column, w = w));
    }
    out.push('\n');
    for (label, get) in rows {
        out.push_str(&format!("{:<5}", label));
        for (s, w) in stats.iter().zip(&widths) {
            out.push_str(&format!("  {:>w$.6}", get(s), w = w));
        }
        out.push('\n');
    }
    out
}

/// Deterministic cleaning of a CSV into a new file
pub struct CleanCsvTool {
    workspace: Workspace,
}

impl CleanCsvTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for CleanCsvTool {
    fn name(&self) -> &str {
        "clean_csv"
    }

    fn description(&self) -> &str {
        "Clean a CSV file: trim cells, drop empty, incomplete and duplicate rows, \
         encode yes/no columns as 1/0, drop identifier columns, and write the result."
    }

    fn parameters(&self) -> Value {
        string_params(&[
            ("input_path", "Relative path of the raw CSV"),
            ("output_path", "Relative path to write, e.g. cleaned_data.csv"),
        ])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let input = self.workspace.resolve(&string_arg(&args, "input_path")?)?;
        let output_name = string_arg(&args, "output_path")?;
        let output = self.workspace.resolve(&output_name)?;

        let raw = DataFrame::from_path(&input).map_err(|e| ToolError::Csv(format!("{:#}", e)))?;
        let (cleaned, report) = analysis::clean(&raw);
        if cleaned.rows.is_empty() {
            return Err(ToolError::Csv("no rows left after cleaning".to_string()));
        }
        cleaned
            .write_csv(&output)
            .map_err(|e| ToolError::Io(format!("{:#}", e)))?;

        info!(
            input = %input.display(),
            output = %output.display(),
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            "Cleaned CSV"
        );
        Ok(format!("Cleaned data written to {}\n{}", output_name, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workspace_with(csv: &str) -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("raw.csv"), csv).unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    #[tokio::test]
    async fn test_inspect_reports_structure() {
        let (_dir, ws) = workspace_with("Age,Plan,Churn\n25,basic,0\n40,pro,1\n33,,0\n");
        let out = InspectCsvTool::new(ws)
            .invoke(json!({"path": "raw.csv"}))
            .await
            .unwrap();

        assert!(out.contains("Shape: (3, 3)"));
        assert!(out.contains("Age    int64"));
        assert!(out.contains("Plan   object"));
        assert!(out.contains("Plan   1"));
        assert!(out.contains("count"));
        assert!(out.contains("50%"));
    }

    #[tokio::test]
    async fn test_inspect_missing_file_is_error() {
        let (_dir, ws) = workspace_with("a\n1\n");
        let err = InspectCsvTool::new(ws)
            .invoke(json!({"path": "nope.csv"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Error reading CSV"));
    }

    #[tokio::test]
    async fn test_clean_writes_output() {
        let (dir, ws) = workspace_with("id,Age,Churn\n1,25,Yes\n2,40,No\n3,,No\n");
        let out = CleanCsvTool::new(ws)
            .invoke(json!({"input_path": "raw.csv", "output_path": "cleaned_data.csv"}))
            .await
            .unwrap();
        assert!(out.starts_with("Cleaned data written to cleaned_data.csv"));

        let cleaned = DataFrame::from_path(&dir.path().join("cleaned_data.csv")).unwrap();
        assert_eq!(cleaned.columns, vec!["Age", "Churn"]);
        assert_eq!(cleaned.rows, vec![vec!["25", "1"], vec!["40", "0"]]);
    }

    #[tokio::test]
    async fn test_clean_everything_dropped_is_error() {
        let (_dir, ws) = workspace_with("Age,Churn\n,Yes\n");
        let err = CleanCsvTool::new(ws)
            .invoke(json!({"input_path": "raw.csv", "output_path": "out.csv"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Csv(_)));
    }
}
