#[cfg(test)]
mod tests {
    use crate::{seed_postgres_table, test_pg_url, utils::test_config_with};
    use engine_runtime::execution::{executor::run, factory};
    use flate2::read::GzDecoder;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::{
        fs::{self, File},
        io::{BufRead, BufReader, Read, Write},
        path::Path,
    };
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    fn write_customers_csv(path: &Path, rows: usize) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "customer_id,first_name,city,email").unwrap();
        for i in 0..rows {
            writeln!(file, "C{i:05},Name{i},City{},c{i}@example.com", i % 7).unwrap();
        }
    }

    fn parquet_rows(path: &Path) -> usize {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        reader.map(|batch| batch.unwrap().num_rows()).sum()
    }

    fn line_count(path: &Path) -> usize {
        BufReader::new(File::open(path).unwrap()).lines().count()
    }

    // Scenario: 45 CSV rows exported to a local directory as Parquet in
    // chunks of 20, through the real store and sink built from config.
    // Expected Outcome: three Parquet files holding 20, 20 and 5 rows; a
    // rerun writes nothing new.
    #[tokio::test]
    #[traced_test]
    async fn csv_to_local_parquet() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("customers.csv");
        write_customers_csv(&csv, 45);

        let config = test_config_with(dir.path(), &[
            ("SOURCE_URL", csv.display().to_string()),
            ("OUTPUT_FORMAT", "parquet".to_string()),
            ("COMPRESSION", "snappy".to_string()),
            ("CHUNK_SIZE", "20".to_string()),
            ("MAX_WORKERS", "2".to_string()),
            ("BLOB_PREFIX", "customers".to_string()),
        ]);

        let parts = factory::collaborators(&config).await.unwrap();
        let store = parts.store.clone();
        let report = run(config.clone(), parts, CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.completed_count, 3);
        assert_eq!(report.records_transferred, 45);

        let out = dir.path().join("blobs").join("customers");
        let rows: Vec<usize> = (0..3)
            .map(|i| parquet_rows(&out.join(format!("chunk_{i:06}.parquet"))))
            .collect();
        assert_eq!(rows, vec![20, 20, 5]);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 3);
        assert!(logs_contain("Chunk completed"));

        // The sled directory stays locked while `store` is alive.
        let again = factory::Collaborators {
            source: factory::source_for(&config).await.unwrap(),
            sink: factory::sink_for(&config).await.unwrap(),
            store,
            guard: factory::guard_for(&config),
        };
        let rerun = run(config.clone(), again, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rerun.processed, 0);
        assert_eq!(rerun.completed_count, 3);
    }

    // Scenario: JSON Lines with gzip to a local directory.
    // Expected Outcome: `.jsonl.gz` blobs that decompress to one line per row.
    #[tokio::test]
    async fn csv_to_local_gzip_jsonl() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("customers.csv");
        write_customers_csv(&csv, 12);

        let config = test_config_with(dir.path(), &[
            ("SOURCE_URL", csv.display().to_string()),
            ("COMPRESSION", "gzip".to_string()),
            ("CHUNK_SIZE", "5".to_string()),
        ]);

        let parts = factory::collaborators(&config).await.unwrap();
        let report = run(config.clone(), parts, CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_success());

        let out = dir.path().join("blobs").join("export");
        let tail = out.join("chunk_000002.jsonl.gz");
        let raw = fs::read(&tail).unwrap();
        let mut text = String::new();
        GzDecoder::new(&raw[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"customer_id\":\"C00010\""));
    }

    // Scenario: a live Postgres table of 250 rows exported as JSON Lines in
    // chunks of 100.
    // Expected Outcome: 100, 100 and 50 lines, ordered by id.
    #[tokio::test]
    #[ignore = "needs a running Postgres (TEST_PG_URL)"]
    async fn postgres_to_local_jsonl() {
        seed_postgres_table("doc2blob_export_test", 250).await;

        let dir = tempdir().unwrap();
        let config = test_config_with(dir.path(), &[
            ("SOURCE_KIND", "postgres".to_string()),
            ("SOURCE_URL", test_pg_url()),
            ("SOURCE_TABLE", "doc2blob_export_test".to_string()),
            ("CHUNK_SIZE", "100".to_string()),
        ]);

        let parts = factory::collaborators(&config).await.unwrap();
        let report = run(config.clone(), parts, CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_success(), "{report:?}");

        let out = dir.path().join("blobs").join("export");
        let lines: Vec<usize> = (0..3)
            .map(|i| line_count(&out.join(format!("chunk_{i:06}.jsonl"))))
            .collect();
        assert_eq!(lines, vec![100, 100, 50]);

        let first = fs::read_to_string(out.join("chunk_000001.jsonl")).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(first.lines().next().unwrap()).unwrap();
        assert_eq!(doc["id"], serde_json::json!(100));
        assert_eq!(doc["tags"], serde_json::json!(["t1"]));
    }
}
