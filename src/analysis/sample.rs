// Synthetic churn dataset used to seed demo and test runs

use std::path::Path;

use anyhow::Result;

use super::DataFrame;

const AGE: [i64; 12] = [25, 30, 45, 35, 50, 23, 60, 48, 33, 29, 22, 55];
const ANNUAL_SPEND: [i64; 12] = [1200, 3000, 5000, 2500, 6000, 1000, 7000, 5500, 2800, 2900, 800, 6200];
const SUPPORT_CALLS: [i64; 12] = [1, 0, 0, 1, 0, 5, 0, 0, 1, 0, 4, 0];
// 1 = churned, 0 = stayed
const CHURN: [i64; 12] = [1, 0, 0, 0, 0, 1, 0, 0, 1, 0, 1, 0];

/// The built-in churn sample, rows with non-positive spend removed
pub fn sample_frame() -> DataFrame {
    let columns = ["Age", "Annual_Spend", "Support_Calls", "Churn"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let rows = (0..AGE.len())
        .filter(|&i| ANNUAL_SPEND[i] > 0)
        .map(|i| {
            vec![
                AGE[i].to_string(),
                ANNUAL_SPEND[i].to_string(),
                SUPPORT_CALLS[i].to_string(),
                CHURN[i].to_string(),
            ]
        })
        .collect();

    DataFrame::new(columns, rows)
}

pub fn create_sample_data(path: &Path) -> Result<usize> {
    let frame = sample_frame();
    frame.write_csv(path)?;
    Ok(frame.rows.len())
}
