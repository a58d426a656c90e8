use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, DictionaryArray, RecordBatch, RecordBatchOptions, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float32Type, Int32Type, Schema};
use cellx_protocol::ColumnType;

use crate::{is_supported, CodecError};

/// Build a table from named columns. `rows` is required so that tables
/// without columns still report their height.
pub fn table(columns: Vec<(String, ArrayRef)>, rows: usize) -> Result<RecordBatch, CodecError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (name, array) in columns {
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

/// Dictionary-encoded string column; the dictionary holds the categories.
pub fn categorical_array<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> ArrayRef {
    let array: DictionaryArray<Int32Type> = values.into_iter().collect();
    Arc::new(array)
}

pub fn column_index(table: &RecordBatch, name: &str) -> Result<usize, CodecError> {
    table
        .schema()
        .index_of(name)
        .map_err(|_| CodecError::UnknownColumn(name.to_string()))
}

/// Keep only the named columns, in the order given.
pub fn project(table: &RecordBatch, names: &[&str]) -> Result<RecordBatch, CodecError> {
    let indices = names
        .iter()
        .map(|name| column_index(table, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(table.project(&indices)?)
}

/// Client-facing type of a column. Unsupported types yield `None`.
pub fn column_type(array: &dyn Array) -> Option<ColumnType> {
    let data_type = array.data_type();
    if !is_supported(data_type) {
        return None;
    }
    Some(match data_type {
        DataType::Float32 => ColumnType::Float32,
        DataType::Float64 => ColumnType::Float64,
        DataType::Int32 => ColumnType::Int32,
        DataType::Int16 => ColumnType::Int16,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Utf8 => ColumnType::String,
        DataType::Dictionary(_, _) => {
            let dictionary = array.as_any_dictionary();
            let values = cast(dictionary.values(), &DataType::Utf8).ok()?;
            let categories = values
                .as_string::<i32>()
                .iter()
                .flatten()
                .map(str::to_string)
                .collect();
            ColumnType::Categorical { categories }
        }
        _ => return None,
    })
}

/// Render every cell as text; nulls stay `None`.
pub fn column_strings(array: &dyn Array) -> Result<Vec<Option<String>>, CodecError> {
    let rendered = cast(array, &DataType::Utf8)?;
    let strings: &StringArray = rendered.as_string::<i32>();
    Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
}

/// Numeric column widened or narrowed to f32; nulls become NaN.
pub fn float32_values(array: &dyn Array) -> Result<Vec<f32>, CodecError> {
    let cast_array = cast(array, &DataType::Float32)?;
    let floats = cast_array.as_primitive::<Float32Type>();
    Ok(floats.iter().map(|v| v.unwrap_or(f32::NAN)).collect())
}
