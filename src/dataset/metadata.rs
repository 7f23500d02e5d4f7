//! Metadata table loading (`hash_id` -> `annotator_emo`).
//!
//! The layout is chosen by file extension: Parquet (`.parquet`), JSON lines
//! (`.jsonl`, one object per line) or comma separated values (`.csv`, header
//! row first). Columns other than `hash_id` and `annotator_emo` are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use parquet::errors::ParquetError;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::Deserialize;
use thiserror::Error;

const ID_COLUMN: &str = "hash_id";
const LABEL_COLUMN: &str = "annotator_emo";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read metadata {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid metadata {path} line {line}: {detail}")]
    InvalidRow {
        path: PathBuf,
        line: usize,
        detail: String,
    },
    #[error("Metadata {path} is missing column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("Invalid Parquet metadata {path}: {source}")]
    Parquet {
        path: PathBuf,
        source: ParquetError,
    },
    #[error("Unsupported metadata format for {0} (expected .parquet, .jsonl or .csv)")]
    UnsupportedFormat(PathBuf),
}

/// One metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleRecord {
    #[serde(rename = "hash_id")]
    pub id: String,
    #[serde(rename = "annotator_emo")]
    pub raw_label: String,
}

/// Load every record of a metadata table.
pub fn load_records(path: &Path) -> Result<Vec<SampleRecord>, MetadataError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let file = File::open(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match ext.as_deref() {
        Some("parquet") => parse_parquet(file, path),
        Some("jsonl") | Some("ndjson") => parse_jsonl(BufReader::new(file), path),
        Some("csv") => parse_csv(BufReader::new(file), path),
        _ => Err(MetadataError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn parse_jsonl(reader: impl BufRead, path: &Path) -> Result<Vec<SampleRecord>, MetadataError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| io_error(path, source))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SampleRecord =
            serde_json::from_str(&line).map_err(|err| MetadataError::InvalidRow {
                path: path.to_path_buf(),
                line: idx + 1,
                detail: err.to_string(),
            })?;
        out.push(record);
    }
    Ok(out)
}

fn parse_csv(reader: impl Read, path: &Path) -> Result<Vec<SampleRecord>, MetadataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|err| csv_error(path, err))?
        .clone();
    for column in [ID_COLUMN, LABEL_COLUMN] {
        if !headers.iter().any(|header| header == column) {
            return Err(MetadataError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    reader
        .deserialize::<SampleRecord>()
        .map(|row| row.map_err(|err| csv_error(path, err)))
        .collect()
}

fn csv_error(path: &Path, err: csv::Error) -> MetadataError {
    MetadataError::InvalidRow {
        path: path.to_path_buf(),
        line: err.position().map_or(0, |pos| pos.line() as usize),
        detail: err.to_string(),
    }
}

/// Read the two string columns of a Parquet table, row by row.
fn parse_parquet(file: File, path: &Path) -> Result<Vec<SampleRecord>, MetadataError> {
    let parquet_error = |source: ParquetError| MetadataError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let reader = SerializedFileReader::new(file).map_err(parquet_error)?;
    let schema = reader.metadata().file_metadata().schema_descr().root_schema();
    for column in [ID_COLUMN, LABEL_COLUMN] {
        if !schema.get_fields().iter().any(|field| field.name() == column) {
            return Err(MetadataError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    let mut out = Vec::new();
    for (idx, row) in reader.get_row_iter(None).map_err(parquet_error)?.enumerate() {
        let row = row.map_err(parquet_error)?;
        let mut id = None;
        let mut raw_label = None;
        for (name, field) in row.get_column_iter() {
            let slot = match name.as_str() {
                ID_COLUMN => &mut id,
                LABEL_COLUMN => &mut raw_label,
                _ => continue,
            };
            *slot = Some(field_text(field).ok_or_else(|| MetadataError::InvalidRow {
                path: path.to_path_buf(),
                line: idx + 1,
                detail: format!("column '{name}' holds {field}, expected a string"),
            })?);
        }
        let (Some(id), Some(raw_label)) = (id, raw_label) else {
            return Err(MetadataError::InvalidRow {
                path: path.to_path_buf(),
                line: idx + 1,
                detail: "row is missing hash_id or annotator_emo".to_string(),
            });
        };
        out.push(SampleRecord { id, raw_label });
    }
    Ok(out)
}

fn field_text(field: &Field) -> Option<String> {
    match field {
        Field::Str(text) => Some(text.clone()),
        Field::Bytes(bytes) => bytes.as_utf8().ok().map(str::to_string),
        Field::Int(value) => Some(value.to_string()),
        Field::Long(value) => Some(value.to_string()),
        _ => None,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> MetadataError {
    MetadataError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parquet::data_type::{ByteArray, ByteArrayType};
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use tempfile::tempdir;

    fn write_parquet(path: &Path, columns: &[(&str, Vec<&str>)]) {
        let fields: String = columns
            .iter()
            .map(|(name, _)| format!("  required binary {name} (UTF8);\n"))
            .collect();
        let schema = parse_message_type(&format!("message metadata {{\n{fields}}}")).unwrap();
        let file = File::create(path).unwrap();
        let mut writer = SerializedFileWriter::new(file, Arc::new(schema), Default::default()).unwrap();
        let mut group = writer.next_row_group().unwrap();
        for (_, values) in columns {
            let mut column = group.next_column().unwrap().unwrap();
            let data: Vec<ByteArray> = values.iter().map(|v| ByteArray::from(*v)).collect();
            column
                .typed::<ByteArrayType>()
                .write_batch(&data, None, None)
                .unwrap();
            column.close().unwrap();
        }
        group.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn loads_jsonl_and_ignores_extra_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.jsonl");
        std::fs::write(
            &path,
            "{\"hash_id\":\"a1\",\"annotator_emo\":\"angry\",\"speaker\":3}\n\n{\"hash_id\":\"b2\",\"annotator_emo\":\"happy\"}\n",
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a1");
        assert_eq!(records[1].raw_label, "happy");
    }

    #[test]
    fn loads_csv_with_quoted_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(
            &path,
            "source,annotator_emo,hash_id\n\"crowd, v2\",neutral,x9\nlab,\"sad\",y7\r\n",
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(
            records,
            vec![
                SampleRecord {
                    id: "x9".into(),
                    raw_label: "neutral".into()
                },
                SampleRecord {
                    id: "y7".into(),
                    raw_label: "sad".into()
                },
            ]
        );
    }

    #[test]
    fn csv_without_label_column_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(&path, "hash_id,emotion\na,b\n").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::MissingColumn {
                column: "annotator_emo",
                ..
            })
        ));
    }

    #[test]
    fn malformed_jsonl_reports_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.jsonl");
        std::fs::write(&path, "{\"hash_id\":\"a\",\"annotator_emo\":\"x\"}\n{oops}\n").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::InvalidRow { line: 2, .. })
        ));
    }

    #[test]
    fn csv_quoted_fields_may_span_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(
            &path,
            "hash_id,annotator_emo,note\nx9,neutral,\"two\nlines\"\ny7,angry,\" padded \"\n",
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "x9");
        assert_eq!(records[1].raw_label, "angry");
    }

    #[test]
    fn short_csv_row_reports_its_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(&path, "hash_id,annotator_emo\na,happy\nb\n").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::InvalidRow { line, .. }) if line >= 2
        ));
    }

    #[test]
    fn loads_parquet_string_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.parquet");
        write_parquet(
            &path,
            &[
                ("speaker", vec!["s1", "s2", "s3"]),
                ("hash_id", vec!["a1", "b2", "c3"]),
                ("annotator_emo", vec!["angry", "neutral", "happy"]),
            ],
        );
        let records = load_records(&path).unwrap();
        assert_eq!(
            records,
            vec![
                SampleRecord {
                    id: "a1".into(),
                    raw_label: "angry".into()
                },
                SampleRecord {
                    id: "b2".into(),
                    raw_label: "neutral".into()
                },
                SampleRecord {
                    id: "c3".into(),
                    raw_label: "happy".into()
                },
            ]
        );
    }

    #[test]
    fn parquet_without_label_column_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.parquet");
        write_parquet(&path, &[("hash_id", vec!["a1"]), ("emotion", vec!["sad"])]);
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::MissingColumn {
                column: "annotator_emo",
                ..
            })
        ));
    }

    #[test]
    fn truncated_parquet_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.parquet");
        std::fs::write(&path, b"PAR1").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::Parquet { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(MetadataError::UnsupportedFormat(_))
        ));
    }
}
