//! Question dataset loading.

use std::path::Path;
use tracing::info;

use crate::error::{BenchError, Result};
use crate::types::QuestionRecord;

/// Load questions from a CSV file with `question`, `gt_answer`, `source` and
/// optional `gt_context` columns. Other columns are ignored.
///
/// When `limit` is set only that many leading rows are returned.
pub fn load_questions(path: &Path, limit: Option<usize>) -> Result<Vec<QuestionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| BenchError::Dataset {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<QuestionRecord>().enumerate() {
        if limit.is_some_and(|n| idx >= n) {
            break;
        }
        let record = row.map_err(|e| BenchError::Dataset {
            path: path.to_path_buf(),
            message: format!("row {}: {}", idx + 1, e),
        })?;
        records.push(record);
    }

    info!(path = %path.display(), rows = records.len(), "Loaded question dataset");
    Ok(records)
}
