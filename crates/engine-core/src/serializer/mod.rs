use crate::error::SerializeError;
use bytes::Bytes;
use model::{
    core::format::{Compression, OutputFormat},
    records::record::Record,
};

pub mod columnar;
pub mod lines;

/// Encodes one chunk of records into a blob body.
pub fn serialize(
    records: &[Record],
    format: OutputFormat,
    compression: Compression,
) -> Result<Bytes, SerializeError> {
    match format {
        OutputFormat::Columnar => columnar::encode(records, compression),
        OutputFormat::LineDelimited => lines::encode(records, compression),
    }
}
