//! LibSVM text format loader
//!
//! label index:value index:value ...
//!
//! Example:
//! +1 1:0.5 3:1.2 7:0.8
//! 3 2:0.3 5:2.1
//!
//! Labels are returned as written; mapping them to {-1, +1} or to class
//! indices is left to the caller.

use crate::core::{Result, SolverError, SparseVector};
use crate::data::{LabeledData, SparseDataset};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load a LibSVM file into a sparse dataset
pub fn load_libsvm<P: AsRef<Path>>(path: P) -> Result<LabeledData<SparseDataset>> {
    let file = File::open(path).map_err(SolverError::IoError)?;
    read_libsvm(BufReader::new(file), None)
}

/// Load LibSVM data from a reader
///
/// `n_features` pins the width, for test files that must line up with a
/// training set whose highest feature is missing here.
pub fn read_libsvm<R: BufRead>(
    reader: R,
    n_features: Option<usize>,
) -> Result<LabeledData<SparseDataset>> {
    let mut rows = Vec::new();
    let mut labels = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(SolverError::IoError)?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (label, row) = parse_line(line).map_err(|e| {
            SolverError::ParseError(format!("Error parsing line {}: {}", line_num + 1, e))
        })?;
        labels.push(label);
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(SolverError::EmptyDataset);
    }

    Ok(LabeledData {
        data: SparseDataset::from_vectors(&rows, n_features)?,
        labels,
    })
}

/// Parse a single line in libsvm format
fn parse_line(line: &str) -> Result<(f64, SparseVector)> {
    let mut parts = line.split_whitespace();

    let label_str = parts
        .next()
        .ok_or_else(|| SolverError::ParseError("Empty line".to_string()))?;
    let label = label_str
        .parse::<f64>()
        .map_err(|_| SolverError::ParseError(format!("Invalid label: {}", label_str)))?;

    let mut indices = Vec::new();
    let mut values = Vec::new();

    for feature_str in parts {
        let (index_str, value_str) = feature_str.split_once(':').ok_or_else(|| {
            SolverError::ParseError(format!("Invalid feature format: {}", feature_str))
        })?;

        let index = index_str.parse::<usize>().map_err(|_| {
            SolverError::ParseError(format!("Invalid feature index: {}", index_str))
        })?;
        let value = value_str.parse::<f64>().map_err(|_| {
            SolverError::ParseError(format!("Invalid feature value: {}", value_str))
        })?;

        // libsvm uses 1-based indexing
        if index == 0 {
            return Err(SolverError::ParseError(
                "Feature index must be positive: 0".to_string(),
            ));
        }

        indices.push(index - 1);
        values.push(value);
    }

    Ok((label, SparseVector::new(indices, values)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Dataset;
    use std::io::Cursor;

    #[test]
    fn test_parse_line_basic() {
        let (label, row) = parse_line("+1 1:0.5 3:1.2").expect("Should parse");

        assert_eq!(label, 1.0);
        assert_eq!(row.indices, vec![0, 2]); // 1-based to 0-based
        assert_eq!(row.values, vec![0.5, 1.2]);
    }

    #[test]
    fn test_parse_line_keeps_multiclass_labels() {
        let (label, _) = parse_line("3 1:1.0").expect("Should parse");
        assert_eq!(label, 3.0);
    }

    #[test]
    fn test_parse_line_invalid_format() {
        assert!(parse_line("+1 1").is_err());
        assert!(parse_line("+1 abc:1.0").is_err());
        assert!(parse_line("+1 1:abc").is_err());
        assert!(parse_line("+1 0:1.0").is_err());
        assert!(parse_line("x 1:1.0").is_err());
    }

    #[test]
    fn test_read_libsvm() {
        let data = "# Comment line\n+1 1:0.5 3:1.2\n\n-1 2:0.3 5:2.1\n";
        let loaded = read_libsvm(Cursor::new(data), None).expect("Should load");

        assert_eq!(loaded.labels, vec![1.0, -1.0]);
        assert_eq!(loaded.data.n_samples(), 2);
        assert_eq!(loaded.data.n_features(), 5);
        assert_eq!(loaded.data.row(1).indices, &[1, 4]);
        assert_eq!(loaded.data.column(2).values, &[1.2]);
    }

    #[test]
    fn test_read_libsvm_fixed_width() {
        let loaded = read_libsvm(Cursor::new("1 1:1.0\n"), Some(10)).expect("Should load");
        assert_eq!(loaded.data.n_features(), 10);
    }

    #[test]
    fn test_read_libsvm_empty() {
        let result = read_libsvm(Cursor::new("# Only comments\n\n"), None);
        assert!(matches!(result, Err(SolverError::EmptyDataset)));
    }

    #[test]
    fn test_load_libsvm_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(temp_file, "+1 1:0.5 3:1.2").expect("Failed to write");
        writeln!(temp_file, "-1 2:0.3 5:2.1").expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let loaded = load_libsvm(temp_file.path()).expect("Should load");
        assert_eq!(loaded.data.n_features(), 5);
        assert_eq!(loaded.labels, vec![1.0, -1.0]);
    }

    #[test]
    fn test_load_libsvm_io_error() {
        let result = load_libsvm("/non/existent/file.libsvm");
        assert!(matches!(result, Err(SolverError::IoError(_))));
    }
}
