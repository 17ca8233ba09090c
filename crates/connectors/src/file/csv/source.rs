use crate::{error::AdapterError, file::csv::error::FileError, source::SourceReader};
use async_trait::async_trait;
use model::records::record::Record;
use serde_json::{Map, Value};
use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

/// Reads a headered CSV file as a sequence of string-valued documents.
///
/// Every page re-opens the file and skips to the requested offset, so the
/// file must not be rewritten while a job is running.
pub struct CsvSource {
    path: PathBuf,
    headers: Arc<Vec<String>>,
}

impl CsvSource {
    pub fn open(path: PathBuf) -> Result<Self, FileError> {
        if !path.exists() {
            return Err(FileError::NotFound(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.is_empty() {
            return Err(FileError::InvalidFormat(format!(
                "{} has no header row",
                path.display()
            )));
        }

        Ok(CsvSource {
            path,
            headers: Arc::new(headers),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn count_blocking(path: &Path) -> Result<u64, FileError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let mut record = csv::StringRecord::new();
        let mut count = 0;
        while reader.read_record(&mut record)? {
            count += 1;
        }
        Ok(count)
    }

    fn read_blocking(
        path: &Path,
        headers: &[String],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, FileError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let mut rows = Vec::with_capacity(limit.min(100_000) as usize);

        for (idx, row) in reader
            .records()
            .skip(offset as usize)
            .take(limit as usize)
            .enumerate()
        {
            let row = row.map_err(|e| {
                FileError::ReadError(format!("row {}: {e}", offset + idx as u64))
            })?;

            let mut fields = Map::with_capacity(headers.len());
            for (i, header) in headers.iter().enumerate() {
                let value = match row.get(i) {
                    Some("") | None => Value::Null,
                    Some(cell) => Value::String(cell.to_string()),
                };
                fields.insert(header.clone(), value);
            }
            rows.push(Record::new(fields));
        }

        Ok(rows)
    }
}

#[async_trait]
impl SourceReader for CsvSource {
    fn name(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn count(&self) -> Result<u64, AdapterError> {
        let path = self.path.clone();
        let count = tokio::task::spawn_blocking(move || Self::count_blocking(&path))
            .await
            .map_err(|e| AdapterError::Generic(format!("CSV count task failed: {e}")))??;
        Ok(count)
    }

    async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
        let path = self.path.clone();
        let headers = self.headers.clone();
        let rows = tokio::task::spawn_blocking(move || {
            Self::read_blocking(&path, &headers, offset, limit)
        })
        .await
        .map_err(|e| AdapterError::Generic(format!("CSV read task failed: {e}")))??;

        debug!(offset, limit, rows = rows.len(), "Read CSV page");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_csv(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,email").unwrap();
        for i in 0..rows {
            if i == 1 {
                writeln!(file, "{i},user{i},").unwrap();
            } else {
                writeln!(file, "{i},user{i},user{i}@example.com").unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn counts_data_rows_only() {
        let file = write_csv(5);
        let source = CsvSource::open(file.path().to_path_buf()).unwrap();
        assert_eq!(source.count().await.unwrap(), 5);
        assert_eq!(source.headers(), ["id", "name", "email"]);
    }

    #[tokio::test]
    async fn reads_requested_window() {
        let file = write_csv(10);
        let source = CsvSource::open(file.path().to_path_buf()).unwrap();

        let page = source.read_page(1, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].get("id"), Some(&json!("1")));
        assert_eq!(page[0].get("email"), Some(&Value::Null));
        assert_eq!(page[2].get("name"), Some(&json!("user3")));
    }

    #[tokio::test]
    async fn short_read_at_end_of_file() {
        let file = write_csv(4);
        let source = CsvSource::open(file.path().to_path_buf()).unwrap();
        assert_eq!(source.read_page(3, 10).await.unwrap().len(), 1);
        assert!(source.read_page(10, 10).await.unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = CsvSource::open(PathBuf::from("/definitely/not/here.csv"))
            .err()
            .unwrap();
        assert!(matches!(err, FileError::NotFound(_)));
    }
}
