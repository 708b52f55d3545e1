use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{string_arg, string_params, Tool, ToolError, Workspace};
use crate::analysis::random_forest::{accuracy, train_test_split};
use crate::analysis::{is_null, DataFrame, ForestParams, RandomForest};

pub const TARGET_COLUMN: &str = "Churn";
const TEST_FRACTION: f64 = 0.3;
const SPLIT_SEED: u64 = 42;
const MIN_ROWS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub accuracy: f64,
    /// Per feature column, in column order
    pub importances: Vec<(String, f64)>,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl std::fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let importances: Vec<String> = self
            .importances
            .iter()
            .map(|(name, v)| format!("'{}': {:.4}", name, v))
            .collect();
        write!(
            f,
            "Model Trained. Accuracy: {:.2}. Feature Importance: {{{}}}",
            self.accuracy,
            importances.join(", ")
        )
    }
}

/// Fit the churn classifier on every non-target column of `df`
pub fn train_churn_model(df: &DataFrame) -> Result<TrainingReport, ToolError> {
    let target = df.column_index(TARGET_COLUMN).ok_or_else(|| {
        ToolError::Training(format!(
            "target column '{}' not found (columns: {})",
            TARGET_COLUMN,
            df.columns.join(", ")
        ))
    })?;

    let (n_rows, _) = df.shape();
    if n_rows < MIN_ROWS {
        return Err(ToolError::Training(format!(
            "need at least {} rows, found {}",
            MIN_ROWS, n_rows
        )));
    }
    if let Some(idx) = (0..df.columns.len()).find(|&i| df.null_count(i) > 0) {
        return Err(ToolError::Training(format!(
            "column '{}' has missing values; clean the data first",
            df.columns[idx]
        )));
    }

    let features: Vec<usize> = (0..df.columns.len()).filter(|&i| i != target).collect();
    if features.is_empty() {
        return Err(ToolError::Training("no feature columns besides the target".to_string()));
    }

    let mut columns = Vec::with_capacity(features.len());
    for &i in &features {
        let values = df.numeric_values(i).ok_or_else(|| {
            ToolError::Training(format!(
                "feature column '{}' is not numeric; encode it first",
                df.columns[i]
            ))
        })?;
        columns.push(values);
    }
    let x: Vec<Vec<f64>> = (0..n_rows).map(|r| columns.iter().map(|c| c[r]).collect()).collect();

    let mut classes: Vec<&str> = df
        .rows
        .iter()
        .map(|r| r[target].as_str())
        .filter(|v| !is_null(v))
        .collect();
    classes.sort_unstable();
    classes.dedup();
    let y: Vec<usize> = df
        .rows
        .iter()
        .map(|r| classes.iter().position(|c| *c == r[target]).unwrap_or(0))
        .collect();

    let (train, test) = train_test_split(n_rows, TEST_FRACTION, SPLIT_SEED);
    let pick_x = |idx: &[usize]| idx.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
    let pick_y = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();

    let forest = RandomForest::fit(&pick_x(&train), &pick_y(&train), classes.len(), &ForestParams::default());
    let predicted: Vec<usize> = test.iter().map(|&i| forest.predict(&x[i])).collect();

    Ok(TrainingReport {
        accuracy: accuracy(&pick_y(&test), &predicted),
        importances: features
            .iter()
            .map(|&i| df.columns[i].clone())
            .zip(forest.feature_importances().iter().copied())
            .collect(),
        train_rows: train.len(),
        test_rows: test.len(),
    })
}

pub struct TrainModelTool {
    workspace: Workspace,
}

impl TrainModelTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for TrainModelTool {
    fn name(&self) -> &str {
        "train_model"
    }

    fn description(&self) -> &str {
        "Train a Random Forest classifier predicting the 'Churn' column from every other \
         (numeric) column of a CSV, using a 70/30 train/test split. Returns the test \
         accuracy and the importance of each feature."
    }

    fn parameters(&self) -> Value {
        string_params(&[("csv_path", "Relative path of the cleaned CSV")])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let path = self.workspace.resolve(&string_arg(&args, "csv_path")?)?;
        let df = DataFrame::from_path(&path).map_err(|e| ToolError::Training(format!("{:#}", e)))?;

        let report = tokio::task::spawn_blocking(move || train_churn_model(&df))
            .await
            .map_err(|e| ToolError::Training(format!("training task failed: {}", e)))??;

        info!(
            accuracy = report.accuracy,
            train_rows = report.train_rows,
            test_rows = report.test_rows,
            "Trained churn model"
        );
        Ok(report.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample::sample_frame;
    use serde_json::json;

    #[test]
    fn test_trains_on_sample() {
        let report = train_churn_model(&sample_frame()).unwrap();
        assert_eq!(report.test_rows, 4);
        assert_eq!(report.train_rows, 8);
        let names: Vec<&str> = report.importances.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Age", "Annual_Spend", "Support_Calls"]);
        assert!((0.0..=1.0).contains(&report.accuracy));
    }

    #[test]
    fn test_report_format() {
        let report = TrainingReport {
            accuracy: 0.75,
            importances: vec![("Age".to_string(), 0.25), ("Support_Calls".to_string(), 0.75)],
            train_rows: 8,
            test_rows: 4,
        };
        assert_eq!(
            report.to_string(),
            "Model Trained. Accuracy: 0.75. Feature Importance: {'Age': 0.2500, 'Support_Calls': 0.7500}"
        );
    }

    #[test]
    fn test_non_numeric_feature_is_rejected() {
        let mut df = sample_frame();
        df.rows[0][0] = "old".to_string();
        let err = train_churn_model(&df).unwrap_err();
        assert!(err.to_string().contains("'Age' is not numeric"));
    }

    #[tokio::test]
    async fn test_missing_churn_column_is_error_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "Age,Spend\n1,2\n3,4\n5,6\n7,8\n").unwrap();
        let tools = crate::tools::ToolSet::new().with(TrainModelTool::new(Workspace::new(dir.path())));

        let out = tools
            .dispatch(&crate::types::ToolCall {
                id: "call_0".to_string(),
                name: "train_model".to_string(),
                arguments: json!({"csv_path": "data.csv"}),
            })
            .await;
        assert!(out.starts_with("Error training model: target column 'Churn' not found"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrainModelTool::new(Workspace::new(dir.path()))
            .invoke(json!({"csv_path": "missing.csv"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Training(_)));
    }
}
