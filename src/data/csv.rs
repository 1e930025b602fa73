//! CSV loader for dense data
//!
//! The last column is the label, all other columns are features. A header
//! row is detected and skipped when most of its feature fields are not
//! numbers. Precomputed kernel matrices are usually shipped this way.

use crate::core::{Result, SolverError};
use crate::data::{DenseDataset, LabeledData};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load a CSV file into a dense dataset
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<LabeledData<DenseDataset>> {
    let file = File::open(path).map_err(SolverError::IoError)?;
    read_csv(BufReader::new(file))
}

/// Load CSV data from a reader
pub fn read_csv<R: BufRead>(reader: R) -> Result<LabeledData<DenseDataset>> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels = Vec::new();
    let mut seen_data = false;

    for line in reader.lines() {
        let line = line.map_err(SolverError::IoError)?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !seen_data && is_header_line(line) {
            seen_data = true;
            continue;
        }
        seen_data = true;

        let (features, label) = parse_data_line(line)?;
        if let Some(first) = rows.first() {
            if first.len() != features.len() {
                return Err(SolverError::ParseError(format!(
                    "Expected {} feature columns, got {}: {}",
                    first.len(),
                    features.len(),
                    line
                )));
            }
        }
        rows.push(features);
        labels.push(label);
    }

    if rows.is_empty() {
        return Err(SolverError::EmptyDataset);
    }

    Ok(LabeledData {
        data: DenseDataset::from_rows(rows)?,
        labels,
    })
}

/// Check if a line appears to be a header
fn is_header_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 2 {
        return false;
    }

    let non_numeric_count = fields
        .iter()
        .take(fields.len() - 1)
        .filter(|field| field.trim().parse::<f64>().is_err())
        .count();

    non_numeric_count > fields.len() / 2
}

fn parse_data_line(line: &str) -> Result<(Vec<f64>, f64)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();

    if fields.len() < 2 {
        return Err(SolverError::ParseError(format!(
            "Line has too few fields: {}",
            line
        )));
    }

    let label_str = fields[fields.len() - 1];
    let label = label_str
        .parse::<f64>()
        .map_err(|_| SolverError::ParseError(format!("Invalid label: {}", label_str)))?;

    let features = fields[..fields.len() - 1]
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            field.parse::<f64>().map_err(|_| {
                SolverError::ParseError(format!(
                    "Invalid feature value at column {}: {}",
                    idx + 1,
                    field
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok((features, label))
}
