//! CSV vendor feed adapter.

use crate::domain::error::SecmasterError;
use crate::domain::record::ExternalRecord;
use crate::domain::record_shape::classify;
use crate::ports::record_source::RecordSource;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvRecordSource {
    fn records(&self) -> Result<Vec<Result<ExternalRecord, SecmasterError>>, SecmasterError> {
        let content = fs::read_to_string(&self.path)?;
        debug!(path = %self.path.display(), bytes = content.len(), "read vendor feed");
        parse_feed(&content)
    }
}

/// Parses a whole feed. An unrecognised header rejects the feed; every data
/// row yields its own result.
pub fn parse_feed(
    content: &str,
) -> Result<Vec<Result<ExternalRecord, SecmasterError>>, SecmasterError> {
    let first_line = content.lines().next().unwrap_or("");
    let shape = classify(first_line).ok_or_else(|| SecmasterError::RecordParse {
        line: 1,
        reason: format!("unrecognised header {:?}", first_line.trim_end()),
    })?;
    debug!(?shape, "classified feed");

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in rdr.records() {
        let parsed = match result {
            Ok(row) => {
                let line = row.position().map_or(0, |p| p.line());
                let fields: Vec<&str> = row.iter().collect();
                shape.parse_row(line, &fields)
            }
            Err(e) => Err(SecmasterError::RecordParse {
                line: e.position().map_or(0, |p| p.line()),
                reason: format!("CSV parse error: {}", e),
            }),
        };
        records.push(parsed);
    }

    Ok(records)
}
