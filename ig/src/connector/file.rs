//! File connector: JSON, JSON Lines or CSV in; JSON Lines or CSV out

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::Record;

use super::{ConnectorError, DestinationWriter, FileConnectorConfig, FileFormat, SourceReader, WriteMode};

/// Reads the whole file on each fetch
pub struct FileSource {
    config: FileConnectorConfig,
}

impl FileSource {
    pub fn new(config: FileConnectorConfig) -> Self {
        debug!(path = %config.path.display(), "FileSource::new: called");
        Self { config }
    }
}

#[async_trait]
impl SourceReader for FileSource {
    async fn fetch(&self) -> Result<Value, ConnectorError> {
        let path = &self.config.path;
        debug!(path = %path.display(), "FileSource::fetch: called");
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConnectorError::io(path, e))?;

        match self.config.effective_format() {
            FileFormat::Jsonl => parse_lines(&content, &path.display().to_string()),
            FileFormat::Csv => parse_csv(&content, &path.display().to_string()),
            _ => serde_json::from_str(&content).map_err(|e| ConnectorError::parse(path.display(), e)),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.config.path.display())
    }
}

/// One JSON value per non-blank line
fn parse_lines(content: &str, origin: &str) -> Result<Value, ConnectorError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| ConnectorError::parse(format!("{} line {}", origin, i + 1), e))
        })
        .collect::<Result<Vec<Value>, _>>()
        .map(Value::Array)
}

/// Header row gives the keys; every value is read as a string
fn parse_csv(content: &str, origin: &str) -> Result<Value, ConnectorError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(content.as_bytes());
    let headers = reader.headers().map_err(|e| ConnectorError::csv(origin, e))?.clone();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ConnectorError::csv(origin, e))?;
        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(Value::Object(record));
    }
    Ok(Value::Array(rows))
}

/// CSV cell text: strings verbatim, null empty, anything else as JSON
fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Rows for `records`, columns taken from the first record's keys
///
/// A record with a key outside those columns is rejected.
fn render_csv(records: &[Record], write_header: bool, origin: &str) -> Result<Vec<u8>, ConnectorError> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    if write_header {
        writer.write_record(&columns).map_err(|e| ConnectorError::csv(origin, e))?;
    }
    for record in records {
        if let Some(extra) = record.keys().find(|key| !first.contains_key(*key)) {
            return Err(ConnectorError::csv(origin, format!("field '{}' is not a CSV column", extra)));
        }
        let row: Vec<String> = columns.iter().map(|column| csv_cell(record.get(*column))).collect();
        writer.write_record(&row).map_err(|e| ConnectorError::csv(origin, e))?;
    }
    writer.into_inner().map_err(|e| ConnectorError::csv(origin, e.error()))
}

/// Appends each batch as JSON Lines, or as CSV rows for `.csv` paths
pub struct FileDestination {
    config: FileConnectorConfig,
    truncated: AtomicBool,
    write_lock: Mutex<()>,
}

impl FileDestination {
    pub fn new(config: FileConnectorConfig) -> Self {
        debug!(path = %config.path.display(), mode = ?config.mode, "FileDestination::new: called");
        Self {
            config,
            truncated: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl DestinationWriter for FileDestination {
    async fn send(&self, records: &[Record]) -> Result<(), ConnectorError> {
        let path = &self.config.path;
        debug!(path = %path.display(), record_count = records.len(), "FileDestination::send: called");
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConnectorError::io(parent, e))?;
        }

        let truncate = self.config.mode == WriteMode::Overwrite && !self.truncated.load(Ordering::SeqCst);

        let buf = if self.config.effective_format() == FileFormat::Csv {
            // header only when the file starts out empty
            let has_content = !truncate
                && tokio::fs::metadata(path)
                    .await
                    .is_ok_and(|meta| meta.len() > 0);
            render_csv(records, !has_content, &path.display().to_string())?
        } else {
            let mut buf = String::new();
            for record in records {
                let line = serde_json::to_string(record).map_err(|e| ConnectorError::parse(path.display(), e))?;
                buf.push_str(&line);
                buf.push('\n');
            }
            buf.into_bytes()
        };

        let mut options = tokio::fs::OpenOptions::new();
        if truncate {
            info!(path = %path.display(), "FileDestination::send: truncating for overwrite");
            options.write(true).create(true).truncate(true);
        } else {
            options.append(true).create(true);
        }

        let mut file = options.open(path).await.map_err(|e| ConnectorError::io(path, e))?;
        self.truncated.store(true, Ordering::SeqCst);
        file.write_all(&buf)
            .await
            .map_err(|e| ConnectorError::io(path, e))?;
        file.flush().await.map_err(|e| ConnectorError::io(path, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.config.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_json_array() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        std::fs::write(&path, r#"[{"id": 1}, {"id": 2}]"#).unwrap();

        let source = FileSource::new(FileConnectorConfig::new(&path));
        assert_eq!(source.fetch().await.unwrap(), json!([{"id": 1}, {"id": 2}]));
    }

    #[tokio::test]
    async fn test_fetch_json_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.jsonl");
        std::fs::write(&path, "{\"id\": 1}\n\n{\"id\": 2}\n").unwrap();

        let source = FileSource::new(FileConnectorConfig::new(&path));
        assert_eq!(source.fetch().await.unwrap(), json!([{"id": 1}, {"id": 2}]));
    }

    #[tokio::test]
    async fn test_fetch_bad_line_names_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.jsonl");
        std::fs::write(&path, "{\"id\": 1}\nnot json\n").unwrap();

        let err = FileSource::new(FileConnectorConfig::new(&path)).fetch().await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let temp = TempDir::new().unwrap();
        let source = FileSource::new(FileConnectorConfig::new(temp.path().join("nope.json")));
        assert!(matches!(source.fetch().await, Err(ConnectorError::Io { .. })));
    }

    #[tokio::test]
    async fn test_send_appends_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/sub/out.jsonl");
        let dest = FileDestination::new(FileConnectorConfig::new(&path));

        dest.send(&[record(json!({"a": 1}))]).await.unwrap();
        dest.send(&[record(json!({"a": 2})), record(json!({"a": 3}))]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
    }

    #[tokio::test]
    async fn test_overwrite_truncates_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let mut cfg = FileConnectorConfig::new(&path);
        cfg.mode = WriteMode::Overwrite;
        let dest = FileDestination::new(cfg);
        dest.send(&[record(json!({"a": 1}))]).await.unwrap();
        dest.send(&[record(json!({"a": 2}))]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[tokio::test]
    async fn test_fetch_csv() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.csv");
        std::fs::write(&path, "id,name\n1,Ada\n2,\"Hopper, Grace\"\n").unwrap();

        let source = FileSource::new(FileConnectorConfig::new(&path));
        assert_eq!(
            source.fetch().await.unwrap(),
            json!([{"id": "1", "name": "Ada"}, {"id": "2", "name": "Hopper, Grace"}])
        );
    }

    #[tokio::test]
    async fn test_send_csv_writes_header_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        let dest = FileDestination::new(FileConnectorConfig::new(&path));

        dest.send(&[record(json!({"id": 1, "name": "Ada, L"}))]).await.unwrap();
        dest.send(&[record(json!({"id": 2, "name": null}))]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,name\n1,\"Ada, L\"\n2,\n");
    }

    #[tokio::test]
    async fn test_send_csv_append_to_existing_skips_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        std::fs::write(&path, "id\n0\n").unwrap();

        let dest = FileDestination::new(FileConnectorConfig::new(&path));
        dest.send(&[record(json!({"id": 1}))]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id\n0\n1\n");
    }

    #[tokio::test]
    async fn test_send_csv_overwrite_rewrites_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        std::fs::write(&path, "stale\n").unwrap();

        let mut cfg = FileConnectorConfig::new(&path);
        cfg.mode = WriteMode::Overwrite;
        let dest = FileDestination::new(cfg);
        dest.send(&[record(json!({"a": "x"}))]).await.unwrap();
        dest.send(&[record(json!({"a": "y"}))]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nx\ny\n");
    }

    #[tokio::test]
    async fn test_send_csv_rejects_unknown_column() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        let dest = FileDestination::new(FileConnectorConfig::new(&path));

        let err = dest
            .send(&[record(json!({"a": 1})), record(json!({"a": 2, "b": 3}))])
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Csv { .. }));
        assert!(err.to_string().contains("'b'"));
    }
}
