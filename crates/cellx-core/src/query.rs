//! Query-string filter language.
//!
//! Parameters look like `<axis>:<field>=<value>` where the value is either a
//! single discrete value or a `min,max` range with `*` as an open endpoint:
//!
//! ```text
//! ?obs:tissue=heart&obs:tissue=lung&obs:num_reads=1000,*
//! ```
//!
//! Field names and values are percent-decoded once more after the transport
//! decoding of the query string, since callers double-escape them.

use cellx_protocol::{Axis, AxisFilter, FieldPredicate, FilterSpec};
use percent_encoding::percent_decode_str;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("unknown filter axis '{0}'")]
    UnknownAxis(String),
    #[error("malformed filter key '{0}', expected <axis>:<name>")]
    MalformedKey(String),
    #[error("do not mix range and value filters (field '{0}')")]
    MixedPredicates(String),
    #[error("duplicate range specification (field '{0}')")]
    DuplicateRange(String),
    #[error("must specify at least min or max in range filter (field '{0}')")]
    UnboundedRange(String),
    #[error("badly formatted filter value for field '{0}'")]
    BadSegmentCount(String),
    #[error("could not convert '{value}' to a number (field '{field}')")]
    BadNumber { field: String, value: String },
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{field}' does not support {predicate} filters")]
    WrongFieldType {
        field: String,
        predicate: &'static str,
    },
    #[error("filtering on the {0} axis is not supported here")]
    UnsupportedAxis(Axis),
    #[error("index {index} is out of bounds for axis of length {len}")]
    IndexOutOfBounds { index: u64, len: usize },
}

#[derive(Debug)]
struct FieldAccumulator {
    name: String,
    values: Option<Vec<String>>,
    min: Option<f64>,
    max: Option<f64>,
}

impl FieldAccumulator {
    fn new(name: String) -> Self {
        Self {
            name,
            values: None,
            min: None,
            max: None,
        }
    }

    fn has_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    fn into_predicate(self) -> FieldPredicate {
        match self.values {
            Some(values) => FieldPredicate::Values {
                name: self.name,
                values,
            },
            None => FieldPredicate::Range {
                name: self.name,
                min: self.min,
                max: self.max,
            },
        }
    }
}

fn unquote(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn parse_bound(field: &str, raw: &str) -> Result<Option<f64>, FilterError> {
    let decoded = unquote(raw);
    if decoded == "*" {
        return Ok(None);
    }
    decoded
        .trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FilterError::BadNumber {
            field: field.to_string(),
            value: decoded,
        })
}

/// Parse transport-decoded `(key, value)` pairs into a [`FilterSpec`].
///
/// Repeated single values for one field accumulate in arrival order. Axes
/// without predicates are omitted from the result.
pub fn parse_filter<I, K, V>(pairs: I) -> Result<FilterSpec, FilterError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut obs: Vec<FieldAccumulator> = Vec::new();
    let mut var: Vec<FieldAccumulator> = Vec::new();

    for (key, value) in pairs {
        let key = key.as_ref();
        let value = value.as_ref();
        let mut parts = key.split(':');
        let (axis, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(axis), Some(name), None) => (axis, name),
            _ => return Err(FilterError::MalformedKey(key.to_string())),
        };
        let fields = match Axis::parse(axis) {
            Some(Axis::Obs) => &mut obs,
            Some(Axis::Var) => &mut var,
            None => return Err(FilterError::UnknownAxis(axis.to_string())),
        };
        let name = unquote(name);
        let position = match fields.iter().position(|f| f.name == name) {
            Some(position) => position,
            None => {
                fields.push(FieldAccumulator::new(name));
                fields.len() - 1
            }
        };
        let current = &mut fields[position];

        let segments: Vec<&str> = value.split(',').collect();
        match segments.as_slice() {
            [single] => {
                if current.has_range() {
                    return Err(FilterError::MixedPredicates(current.name.clone()));
                }
                current.values.get_or_insert_with(Vec::new).push(unquote(single));
            }
            [lo, hi] => {
                if current.values.is_some() {
                    return Err(FilterError::MixedPredicates(current.name.clone()));
                }
                if current.has_range() {
                    return Err(FilterError::DuplicateRange(current.name.clone()));
                }
                let min = parse_bound(&current.name, lo)?;
                let max = parse_bound(&current.name, hi)?;
                if min.is_none() && max.is_none() {
                    return Err(FilterError::UnboundedRange(current.name.clone()));
                }
                current.min = min;
                current.max = max;
            }
            _ => return Err(FilterError::BadSegmentCount(current.name.clone())),
        }
    }

    let finish = |fields: Vec<FieldAccumulator>| {
        (!fields.is_empty()).then(|| AxisFilter {
            annotation_value: fields
                .into_iter()
                .map(FieldAccumulator::into_predicate)
                .collect(),
            index: None,
        })
    };
    Ok(FilterSpec {
        obs: finish(obs),
        var: finish(var),
    })
}

/// Decoded query parameters in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Apply the transport-level decoding (`+` and `%xx`) to a raw query.
    pub fn parse(raw: &str) -> Self {
        Self(
            form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Merge another parameter list after this one (query then form body).
    pub fn extend(&mut self, other: QueryParams) {
        self.0.extend(other.0);
    }

    /// Parse every parameter not named in `reserved` as a filter.
    pub fn filter(&self, reserved: &[&str]) -> Result<FilterSpec, FilterError> {
        parse_filter(
            self.0
                .iter()
                .filter(|(k, _)| !reserved.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}

/// Convenience for a raw query string: decode, drop `reserved`, parse.
pub fn parse_query_string(raw: &str, reserved: &[&str]) -> Result<FilterSpec, FilterError> {
    QueryParams::parse(raw).filter(reserved)
}
