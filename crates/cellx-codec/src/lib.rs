//! Binary matrix frames used for all bulk numeric transfer.
//!
//! A frame is an Arrow IPC stream: the schema carries each column's name and
//! type tag, so a reader can dispatch without outside knowledge. Inbound label
//! writes arrive zlib-compressed; [`inflate`] runs before [`decode`] and is
//! never part of it.

mod table;

pub use table::{
    categorical_array, column_index, column_strings, column_type, float32_values, project, table,
};

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use arrow::array::{RecordBatch, RecordBatchOptions};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use bytes::Bytes;
use cellx_protocol::Axis;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Schema metadata key naming the axis a frame was encoded for.
pub const AXIS_METADATA_KEY: &str = "cellx.axis";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("inflate failed: {0}")]
    Inflate(#[source] std::io::Error),
    #[error("deflate failed: {0}")]
    Deflate(#[source] std::io::Error),
    #[error("malformed frame: {0}")]
    Malformed(#[from] ArrowError),
    #[error("column '{name}' has unsupported type {data_type}")]
    UnsupportedType { name: String, data_type: DataType },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown axis tag '{0}'")]
    UnknownAxis(String),
}

/// A decoded frame: the column-oriented table plus the axis tag, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub axis: Option<Axis>,
    pub table: RecordBatch,
}

/// Column types a frame may carry.
pub fn is_supported(data_type: &DataType) -> bool {
    match data_type {
        DataType::Float32
        | DataType::Float64
        | DataType::Int32
        | DataType::Int16
        | DataType::Boolean
        | DataType::Utf8 => true,
        DataType::Dictionary(key, value) => {
            key.is_dictionary_key_type() && value.as_ref() == &DataType::Utf8
        }
        _ => false,
    }
}

fn check_schema(schema: &Schema) -> Result<(), CodecError> {
    let mut seen = HashSet::new();
    for field in schema.fields() {
        if !is_supported(field.data_type()) {
            return Err(CodecError::UnsupportedType {
                name: field.name().clone(),
                data_type: field.data_type().clone(),
            });
        }
        if !seen.insert(field.name().as_str()) {
            return Err(CodecError::DuplicateColumn(field.name().clone()));
        }
    }
    Ok(())
}

/// Decompress a zlib stream (the transport wrapper of label writes).
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(CodecError::Inflate)?;
    Ok(out)
}

/// Compress bytes into a zlib stream; the inverse of [`inflate`].
pub fn deflate(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(CodecError::Deflate)?;
    encoder.finish().map_err(CodecError::Deflate)
}

/// Encode a table into a frame tagged with `axis`.
pub fn encode(table: &RecordBatch, axis: Axis) -> Result<Bytes, CodecError> {
    let source = table.schema();
    check_schema(&source)?;
    let mut metadata = source.metadata().clone();
    metadata.insert(AXIS_METADATA_KEY.to_string(), axis.as_str().to_string());
    let schema = Arc::new(Schema::new_with_metadata(source.fields().clone(), metadata));
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    let batch =
        RecordBatch::try_new_with_options(schema.clone(), table.columns().to_vec(), &options)?;

    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    tracing::trace!(
        axis = %axis,
        columns = batch.num_columns(),
        rows = batch.num_rows(),
        bytes = buf.len(),
        "encoded frame"
    );
    Ok(Bytes::from(buf))
}

/// Decode a frame. Streams holding several batches are concatenated; a
/// stream with no batches yields a zero-row table.
pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let full = reader.schema();
    check_schema(&full)?;

    let mut metadata = full.metadata().clone();
    let axis = match metadata.remove(AXIS_METADATA_KEY) {
        Some(tag) => Some(Axis::parse(&tag).ok_or(CodecError::UnknownAxis(tag))?),
        None => None,
    };
    let schema = Arc::new(Schema::new_with_metadata(full.fields().clone(), metadata));

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    let table = if schema.fields().is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        RecordBatch::try_new_with_options(schema, Vec::new(), &options)?
    } else {
        let merged = match batches.len() {
            1 => batches.remove(0),
            _ => concat_batches(&full, &batches)?,
        };
        RecordBatch::try_new(schema, merged.columns().to_vec())?
    };
    Ok(Frame { axis, table })
}

/// Inflate then decode an inbound label write.
pub fn decode_compressed(bytes: &[u8]) -> Result<Frame, CodecError> {
    let raw = inflate(bytes)?;
    decode(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, BooleanArray, Float32Array, Int16Array, Int32Array, Int64Array};

    fn sample(rows: usize) -> RecordBatch {
        let labels: Vec<&str> = ["a", "b", "a", "c"].iter().cycle().take(rows).copied().collect();
        table(
            vec![
                (
                    "n_counts".into(),
                    Arc::new(Float32Array::from_iter_values((0..rows).map(|i| i as f32 * 0.5)))
                        as ArrayRef,
                ),
                (
                    "n_genes".into(),
                    Arc::new(Int32Array::from_iter_values((0..rows).map(|i| i as i32))) as ArrayRef,
                ),
                (
                    "batch".into(),
                    Arc::new(Int16Array::from_iter_values((0..rows).map(|i| (i % 3) as i16)))
                        as ArrayRef,
                ),
                (
                    "is_doublet".into(),
                    Arc::new(BooleanArray::from_iter((0..rows).map(|i| Some(i % 2 == 0)))) as ArrayRef,
                ),
                ("louvain".into(), categorical_array(labels.iter().map(|s| Some(*s)))),
            ],
            rows,
        )
        .expect("sample table")
    }

    #[test]
    fn roundtrip_preserves_supported_columns() {
        let original = sample(7);
        let bytes = encode(&original, Axis::Obs).unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.axis, Some(Axis::Obs));
        assert_eq!(frame.table, original);
    }

    #[test]
    fn roundtrip_zero_row_table() {
        let original = sample(0);
        let frame = decode(&encode(&original, Axis::Var).unwrap()).unwrap();
        assert_eq!(frame.table.num_rows(), 0);
        assert_eq!(frame.table, original);
    }

    #[test]
    fn roundtrip_zero_column_table_keeps_row_count() {
        let original = table(Vec::new(), 5).unwrap();
        let frame = decode(&encode(&original, Axis::Obs).unwrap()).unwrap();
        assert_eq!(frame.table.num_columns(), 0);
        assert_eq!(frame.table.num_rows(), 5);
    }

    #[test]
    fn compressed_label_write_decodes() {
        let original = sample(4);
        let wire = deflate(&encode(&original, Axis::Obs).unwrap()).unwrap();
        let frame = decode_compressed(&wire).unwrap();
        assert_eq!(frame.table, original);
    }

    #[test]
    fn encode_rejects_unsupported_types() {
        let t = table(
            vec![(
                "wide".into(),
                Arc::new(Int64Array::from(vec![1_i64, 2])) as ArrayRef,
            )],
            2,
        )
        .unwrap();
        let err = encode(&t, Axis::Obs).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType { ref name, .. } if name == "wide"));
    }

    #[test]
    fn truncated_frame_fails() {
        let bytes = encode(&sample(16), Axis::Obs).unwrap();
        // drop the end-of-stream marker plus one byte of the batch body
        let cut = &bytes[..bytes.len() - 9];
        assert!(decode(cut).is_err());
    }

    #[test]
    fn garbage_fails_to_inflate() {
        assert!(matches!(
            inflate(b"definitely not zlib"),
            Err(CodecError::Inflate(_))
        ));
    }
}
