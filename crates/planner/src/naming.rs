use model::core::format::{Compression, OutputFormat};

/// Deterministic blob name for a chunk, e.g. `export/chunk_000042.parquet`.
pub fn blob_name(prefix: &str, index: u64, format: OutputFormat, compression: Compression) -> String {
    format!(
        "{}chunk_{index:06}.{}",
        normalize_prefix(prefix),
        format.extension(compression)
    )
}

/// Trims surrounding slashes and appends a single trailing `/` to a
/// non-empty prefix.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Stable identifier of a transfer, so that re-running the same transfer
/// resumes the same job. Everything a stored plan is checked against on
/// resume goes into the key.
pub fn job_id(
    source: &str,
    destination: &str,
    format: OutputFormat,
    compression: Compression,
    chunk_size: u64,
) -> String {
    let key = format!("{source}|{destination}|{format}|{compression}|{chunk_size}");
    let digest = format!("{:x}", md5::compute(key));
    format!("job-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(
            blob_name("mongodb_export/", 7, OutputFormat::Columnar, Compression::Snappy),
            "mongodb_export/chunk_000007.parquet"
        );
        assert_eq!(
            blob_name("", 1_234_567, OutputFormat::LineDelimited, Compression::Gzip),
            "chunk_1234567.jsonl.gz"
        );
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("/a/b"), "a/b/");
        assert_eq!(normalize_prefix("a/b//"), "a/b/");
        assert_eq!(normalize_prefix(" / "), "");
    }

    #[test]
    fn job_id_is_stable_and_input_sensitive() {
        let id = |format, compression, size| {
            job_id("pg:users", "fs:/tmp/out/export/", format, compression, size)
        };
        let a = id(OutputFormat::Columnar, Compression::Snappy, 100);
        assert_eq!(a, id(OutputFormat::Columnar, Compression::Snappy, 100));
        assert_ne!(a, id(OutputFormat::Columnar, Compression::Snappy, 200));
        assert_ne!(a, id(OutputFormat::Columnar, Compression::Zstd, 100));
        assert_ne!(
            id(OutputFormat::LineDelimited, Compression::None, 100),
            id(OutputFormat::LineDelimited, Compression::Gzip, 100)
        );
        assert!(a.starts_with("job-"));
        assert_eq!(a.len(), "job-".len() + 16);
    }
}
