use std::collections::HashSet;

use arrow::array::{Array, AsArray, BooleanArray, RecordBatch};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Float64Type};
use arrow::error::ArrowError;
use cellx_protocol::{AxisFilter, FieldPredicate, IndexSelector};

use crate::query::FilterError;

/// Row selection over one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Vec<bool>);

impl Mask {
    pub fn all(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn none(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn from_bools(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of selected rows.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect()
    }

    pub fn and(&mut self, other: &Mask) {
        for (bit, keep) in self.0.iter_mut().zip(other.0.iter()) {
            *bit &= *keep;
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn to_array(&self) -> BooleanArray {
        BooleanArray::from(self.0.clone())
    }
}

/// Keep only the rows selected by `mask`.
pub fn select_rows(table: &RecordBatch, mask: &Mask) -> Result<RecordBatch, ArrowError> {
    filter_record_batch(table, &mask.to_array())
}

fn find_column<'a>(sources: &[&'a RecordBatch], name: &str) -> Option<&'a dyn Array> {
    sources.iter().copied().find_map(|table: &'a RecordBatch| {
        table
            .schema()
            .index_of(name)
            .ok()
            .map(|i| table.column(i).as_ref())
    })
}

fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Float32 | DataType::Float64 | DataType::Int32 | DataType::Int16
    )
}

fn numeric_values(field: &str, column: &dyn Array) -> Result<Vec<Option<f64>>, FilterError> {
    let widened = cast(column, &DataType::Float64).map_err(|_| FilterError::WrongFieldType {
        field: field.to_string(),
        predicate: "range",
    })?;
    Ok(widened
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

fn predicate_mask(
    predicate: &FieldPredicate,
    column: &dyn Array,
    len: usize,
) -> Result<Mask, FilterError> {
    let field = predicate.name();
    let mut bits = vec![false; len];
    match predicate {
        FieldPredicate::Values { values, .. } if is_numeric(column.data_type()) => {
            let wanted: Vec<f64> = values
                .iter()
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .collect();
            for (bit, value) in bits.iter_mut().zip(numeric_values(field, column)?) {
                *bit = value.is_some_and(|x| wanted.iter().any(|w| *w == x));
            }
        }
        FieldPredicate::Values { values, .. } => {
            let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();
            let rendered =
                cellx_codec::column_strings(column).map_err(|_| FilterError::WrongFieldType {
                    field: field.to_string(),
                    predicate: "value",
                })?;
            for (bit, value) in bits.iter_mut().zip(rendered) {
                *bit = value.is_some_and(|s| wanted.contains(s.as_str()));
            }
        }
        FieldPredicate::Range { min, max, .. } => {
            if !is_numeric(column.data_type()) {
                return Err(FilterError::WrongFieldType {
                    field: field.to_string(),
                    predicate: "range",
                });
            }
            for (bit, value) in bits.iter_mut().zip(numeric_values(field, column)?) {
                *bit = value.is_some_and(|x| {
                    min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi)
                });
            }
        }
    }
    Ok(Mask(bits))
}

fn index_mask(selectors: &[IndexSelector], len: usize) -> Result<Mask, FilterError> {
    let mut bits = vec![false; len];
    for selector in selectors {
        match *selector {
            IndexSelector::Single(i) => {
                let slot = bits
                    .get_mut(i as usize)
                    .ok_or(FilterError::IndexOutOfBounds { index: i, len })?;
                *slot = true;
            }
            IndexSelector::Span([start, stop]) => {
                if start > stop || stop as usize > len {
                    return Err(FilterError::IndexOutOfBounds {
                        index: stop.max(start),
                        len,
                    });
                }
                for bit in &mut bits[start as usize..stop as usize] {
                    *bit = true;
                }
            }
        }
    }
    Ok(Mask(bits))
}

/// Evaluate an axis filter against annotation tables; the first table that
/// holds a field wins. All predicates and the index list are intersected.
pub fn evaluate(
    filter: &AxisFilter,
    sources: &[&RecordBatch],
    len: usize,
) -> Result<Mask, FilterError> {
    let mut mask = Mask::all(len);
    for predicate in &filter.annotation_value {
        let column = find_column(sources, predicate.name())
            .ok_or_else(|| FilterError::UnknownField(predicate.name().to_string()))?;
        mask.and(&predicate_mask(predicate, column, len)?);
    }
    if let Some(selectors) = &filter.index {
        mask.and(&index_mask(selectors, len)?);
    }
    Ok(mask)
}

/// Like [`evaluate`] but an absent filter selects every row.
pub fn evaluate_optional(
    filter: Option<&AxisFilter>,
    sources: &[&RecordBatch],
    len: usize,
) -> Result<Mask, FilterError> {
    match filter {
        Some(filter) => evaluate(filter, sources, len),
        None => Ok(Mask::all(len)),
    }
}
