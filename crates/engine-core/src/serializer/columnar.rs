use crate::error::SerializeError;
use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use model::{core::format::Compression, records::record::Record};
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel},
    file::properties::WriterProperties,
};
use serde_json::Value;
use std::{collections::HashMap, io::Cursor, sync::Arc};

/// Number of leading records inspected to pick each column's type.
pub const TYPE_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Default, Clone, Copy)]
struct Seen {
    bools: bool,
    ints: bool,
    floats: bool,
    strings: bool,
    nested: bool,
}

impl Seen {
    fn observe(&mut self, value: &Value) {
        match value {
            Value::Null => {}
            Value::Bool(_) => self.bools = true,
            Value::Number(n) if n.is_i64() => self.ints = true,
            Value::Number(_) => self.floats = true,
            Value::String(_) => self.strings = true,
            Value::Array(_) | Value::Object(_) => self.nested = true,
        }
    }

    fn data_type(&self) -> DataType {
        let numeric = self.ints || self.floats;
        match (self.bools, numeric, self.strings, self.nested) {
            (true, false, false, false) => DataType::Boolean,
            (false, true, false, false) if !self.floats => DataType::Int64,
            (false, true, false, false) => DataType::Float64,
            _ => DataType::Utf8,
        }
    }
}

/// Column names in order of first appearance, with the type inferred from
/// the sampled records.
fn infer_schema(records: &[Record]) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashMap<String, Seen> = HashMap::new();

    for (row, record) in records.iter().enumerate() {
        for (name, value) in record.fields() {
            let entry = seen.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                Seen::default()
            });
            if row < TYPE_SAMPLE_SIZE {
                entry.observe(value);
            }
        }
    }

    let fields: Vec<Field> = order
        .into_iter()
        .map(|name| {
            let data_type = seen.get(&name).copied().unwrap_or_default().data_type();
            Field::new(name, data_type, true)
        })
        .collect();
    Schema::new(fields)
}

fn incompatible(field: &str, row: usize, expected: &str, value: &Value) -> SerializeError {
    SerializeError::Incompatible {
        field: field.to_string(),
        row,
        message: format!("expected {expected}, found {value}"),
    }
}

/// Text form used by string columns. Empty arrays and objects become null.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn build_column(
    records: &[Record],
    field: &Field,
) -> Result<ArrayRef, SerializeError> {
    let name = field.name();
    let values = records.iter().map(|r| r.get(name).unwrap_or(&Value::Null));

    let array: ArrayRef = match field.data_type() {
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(records.len());
            for (row, value) in values.enumerate() {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Bool(b) => builder.append_value(*b),
                    other => return Err(incompatible(name, row, "boolean", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(records.len());
            for (row, value) in values.enumerate() {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => builder.append_value(i),
                        None => return Err(incompatible(name, row, "integer", value)),
                    },
                    other => return Err(incompatible(name, row, "integer", other)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(records.len());
            for (row, value) in values.enumerate() {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Number(n) => match n.as_f64() {
                        Some(f) => builder.append_value(f),
                        None => return Err(incompatible(name, row, "number", value)),
                    },
                    other => return Err(incompatible(name, row, "number", other)),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::with_capacity(records.len(), records.len() * 16);
            for value in values {
                builder.append_option(as_text(value));
            }
            Arc::new(builder.finish())
        }
    };

    Ok(array)
}

fn writer_properties(compression: Compression) -> WriterProperties {
    let codec = match compression {
        Compression::None => ParquetCompression::UNCOMPRESSED,
        Compression::Snappy => ParquetCompression::SNAPPY,
        Compression::Gzip => ParquetCompression::GZIP(GzipLevel::default()),
        Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
    };
    WriterProperties::builder()
        .set_compression(codec)
        .set_created_by("doc2blob".to_string())
        .build()
}

/// Encodes the records as a single-row-group Parquet file.
pub fn encode(records: &[Record], compression: Compression) -> Result<Bytes, SerializeError> {
    let schema = Arc::new(infer_schema(records));
    if schema.fields().is_empty() {
        return Err(SerializeError::Incompatible {
            field: "*".to_string(),
            row: 0,
            message: "records carry no fields".to_string(),
        });
    }

    let columns = schema
        .fields()
        .iter()
        .map(|field| build_column(records, field))
        .collect::<Result<Vec<_>, _>>()?;
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, schema, Some(writer_properties(compression)))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(Bytes::from(cursor.into_inner()))
}
