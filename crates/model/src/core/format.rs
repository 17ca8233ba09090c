use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Blob encoding for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Columnar analytic format (Parquet).
    Columnar,
    /// Line-delimited structured format (JSON Lines).
    LineDelimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

impl OutputFormat {
    /// File extension of a blob written with this format and compression.
    ///
    /// Parquet compresses internally, so only JSON Lines changes its extension.
    pub fn extension(&self, compression: Compression) -> &'static str {
        match (self, compression) {
            (OutputFormat::Columnar, _) => "parquet",
            (OutputFormat::LineDelimited, Compression::Gzip) => "jsonl.gz",
            (OutputFormat::LineDelimited, _) => "jsonl",
        }
    }

    /// Codec used when none is configured.
    pub fn default_compression(&self) -> Compression {
        match self {
            OutputFormat::Columnar => Compression::Snappy,
            OutputFormat::LineDelimited => Compression::None,
        }
    }

    /// Whether blobs of this format can be written with `compression`.
    /// JSON Lines is either plain or gzip-compressed.
    pub fn supports(&self, compression: Compression) -> bool {
        match self {
            OutputFormat::Columnar => true,
            OutputFormat::LineDelimited => {
                matches!(compression, Compression::None | Compression::Gzip)
            }
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Columnar => "application/vnd.apache.parquet",
            OutputFormat::LineDelimited => "application/x-ndjson",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Columnar => write!(f, "parquet"),
            OutputFormat::LineDelimited => write!(f, "jsonl"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parquet" | "columnar" => Ok(OutputFormat::Columnar),
            "jsonl" | "ndjson" | "json_lines" => Ok(OutputFormat::LineDelimited),
            other => Err(format!("Unknown output format: {other}")),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Snappy => write!(f, "snappy"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" | "" => Ok(Compression::None),
            "snappy" => Ok(Compression::Snappy),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            other => Err(format!("Unknown compression: {other}")),
        }
    }
}
