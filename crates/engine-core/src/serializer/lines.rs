use crate::error::SerializeError;
use bytes::Bytes;
use flate2::{Compression as GzLevel, write::GzEncoder};
use model::{core::format::Compression, records::record::Record};
use std::io::Write;

/// JSON Lines: one object per line, each terminated by `\n`. Only gzip
/// applies to this format; other codecs leave the output uncompressed.
pub fn encode(records: &[Record], compression: Compression) -> Result<Bytes, SerializeError> {
    let mut buf = Vec::with_capacity(records.len() * 128);
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    if compression != Compression::Gzip {
        return Ok(Bytes::from(buf));
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(buf.len() / 4), GzLevel::default());
    encoder.write_all(&buf)?;
    Ok(Bytes::from(encoder.finish()?))
}
