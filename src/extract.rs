//! Batch discovery and row streaming
//!
//! A batch is one delimited file; its label is the file name without the
//! extension. Rows are read one at a time and never collected.

use crate::coerce::RawRow;
use crate::error::{ExtractionError, SchemaViolation};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub label: String,
    pub path: PathBuf,
}

impl BatchFile {
    /// The batch stored as `<dir>/<label>.<extension>`.
    pub fn in_dir(dir: &Path, label: &str, extension: &str) -> Self {
        Self {
            label: label.to_string(),
            path: dir.join(format!("{}.{}", label, extension)),
        }
    }
}

/// List batch files in `dir` with the given extension, excluding the
/// reserved label, in lexicographic file-name order.
pub fn discover_batches(dir: &Path, extension: &str, reserved: &str) -> Result<Vec<BatchFile>, ExtractionError> {
    let discover_err = |source| ExtractionError::Discover {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(discover_err)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some(extension))
        .collect();

    entries.sort_by_key(|entry| entry.file_name());

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let path = entry.path();
            let label = path.file_stem()?.to_str()?.to_string();
            (label != reserved).then_some(BatchFile { label, path })
        })
        .collect())
}

/// One extracted record and its 0-based position in the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub index: u64,
    pub fields: Result<RawRow, SchemaViolation>,
}

/// Streaming reader over one batch file.
///
/// Yields `Ok(row)` per record, where a record that cannot be mapped onto
/// the header is a row-level `SchemaViolation`. An I/O failure ends the
/// stream with `Err`, which aborts the batch.
pub struct RowStream {
    path: PathBuf,
    reader: Reader<File>,
    headers: StringRecord,
    record: StringRecord,
    next_index: u64,
    finished: bool,
}

impl RowStream {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self, ExtractionError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|source| ExtractionError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let headers = reader
            .headers()
            .map_err(|source| ExtractionError::Header {
                path: path.to_path_buf(),
                source,
            })?
            .clone();

        if headers.is_empty() {
            return Err(ExtractionError::EmptyHeader {
                path: path.to_path_buf(),
            });
        }

        log::debug!("📥 Opened {} (columns: {:?})", path.display(), headers);

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            record: StringRecord::new(),
            next_index: 0,
            finished: false,
        })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    fn map_record(&self) -> Result<RawRow, SchemaViolation> {
        if self.record.len() != self.headers.len() {
            return Err(SchemaViolation::Malformed(format!(
                "expected {} fields, found {}",
                self.headers.len(),
                self.record.len()
            )));
        }
        Ok(self
            .headers
            .iter()
            .zip(self.record.iter())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

impl Iterator for RowStream {
    type Item = Result<ExtractedRow, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let index = self.next_index;
        let fields = match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.finished = true;
                return None;
            }
            Ok(true) => self.map_record(),
            Err(source) if source.is_io_error() => {
                self.finished = true;
                return Some(Err(ExtractionError::Stream {
                    path: self.path.clone(),
                    row_index: index,
                    source,
                }));
            }
            Err(e) => Err(SchemaViolation::Malformed(e.to_string())),
        };

        self.next_index += 1;
        Some(Ok(ExtractedRow { index, fields }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["2012-5.csv", "2012-1.csv", "validation.csv", "notes.txt", "2012-10.csv"] {
            fs::write(dir.path().join(name), "a\n1\n").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let batches = discover_batches(dir.path(), "csv", "validation").unwrap();
        let labels: Vec<&str> = batches.iter().map(|b| b.label.as_str()).collect();

        assert_eq!(labels, vec!["2012-1", "2012-10", "2012-5"]);
        assert_eq!(batches[0].path, dir.path().join("2012-1.csv"));
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempdir().unwrap();
        let result = discover_batches(&dir.path().join("absent"), "csv", "validation");
        assert!(matches!(result, Err(ExtractionError::Discover { .. })));
    }

    #[test]
    fn test_stream_rows_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.csv");
        fs::write(&path, "timestamp,user_id,price\n2012-01-01, 1 ,10\n2012-01-02,2,20\n").unwrap();

        let stream = RowStream::open(&path, b',').unwrap();
        assert_eq!(stream.headers().len(), 3);

        let rows: Vec<ExtractedRow> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[1].index, 1);

        let first = rows[0].fields.as_ref().unwrap();
        assert_eq!(first.get("user_id").map(String::as_str), Some("1"));
        assert_eq!(first.get("price").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_short_record_is_row_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.csv");
        fs::write(&path, "a;b\n1;2\n3\n4;5\n").unwrap();

        let rows: Vec<ExtractedRow> = RowStream::open(&path, b';').unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].fields.is_ok());
        assert!(matches!(rows[1].fields, Err(SchemaViolation::Malformed(_))));
        assert!(rows[2].fields.is_ok());
        assert_eq!(rows[2].index, 2);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let result = RowStream::open(&dir.path().join("missing.csv"), b',');
        assert!(matches!(result, Err(ExtractionError::Open { .. })));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        let result = RowStream::open(&path, b',');
        assert!(matches!(result, Err(ExtractionError::EmptyHeader { .. })));
    }
}
