use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// RFC7807-style error payload used at service edges.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One of the two orientations of the dataset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Obs,
    Var,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Obs, Axis::Var];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Obs => "obs",
            Axis::Var => "var",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "obs" => Some(Axis::Obs),
            "var" => Some(Axis::Var),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------- Filters --------

/// Per-axis predicates. An axis with no predicates is absent, never empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs: Option<AxisFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<AxisFilter>,
}

impl FilterSpec {
    pub fn axis(&self, axis: Axis) -> Option<&AxisFilter> {
        match axis {
            Axis::Obs => self.obs.as_ref(),
            Axis::Var => self.var.as_ref(),
        }
    }

    pub fn references(&self, axis: Axis) -> bool {
        self.axis(axis).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.is_none() && self.var.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation_value: Vec<FieldPredicate>,
    /// Row positions, either single offsets or half-open `[start, stop)` spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Vec<IndexSelector>>,
}

impl AxisFilter {
    pub fn field(&self, name: &str) -> Option<&FieldPredicate> {
        self.annotation_value.iter().find(|p| p.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum IndexSelector {
    Single(u64),
    Span([u64; 2]),
}

/// A per-field constraint: a discrete value-set or an inclusive numeric range.
///
/// Deserialization rejects predicates that carry both `values` and a bound,
/// and ranges with neither bound.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldPredicate {
    Values {
        name: String,
        values: Vec<String>,
    },
    Range {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

impl FieldPredicate {
    pub fn name(&self) -> &str {
        match self {
            FieldPredicate::Values { name, .. } | FieldPredicate::Range { name, .. } => name,
        }
    }
}

#[derive(Deserialize)]
struct RawFieldPredicate {
    name: String,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

impl TryFrom<RawFieldPredicate> for FieldPredicate {
    type Error = String;

    fn try_from(raw: RawFieldPredicate) -> Result<Self, Self::Error> {
        match (raw.values, raw.min, raw.max) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(format!(
                "field '{}' mixes a value filter with a range filter",
                raw.name
            )),
            (Some(values), None, None) => {
                let values = values
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(s),
                        Value::Number(n) => Ok(n.to_string()),
                        Value::Bool(b) => Ok(b.to_string()),
                        other => Err(format!(
                            "field '{}' has a non-scalar filter value: {other}",
                            raw.name
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldPredicate::Values {
                    name: raw.name,
                    values,
                })
            }
            (None, None, None) => Err(format!(
                "field '{}' must specify values or at least one of min/max",
                raw.name
            )),
            (None, min, max) => Ok(FieldPredicate::Range {
                name: raw.name,
                min,
                max,
            }),
        }
    }
}

impl<'de> Deserialize<'de> for FieldPredicate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawFieldPredicate::deserialize(deserializer)?;
        FieldPredicate::try_from(raw).map_err(serde::de::Error::custom)
    }
}

// -------- Schema document --------

/// Value type of an annotation column as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    Categorical { categories: Vec<String> },
    String,
    Boolean,
    Float32,
    Float64,
    Int32,
    Int16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Other,
}

impl ColumnType {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnType::Categorical { .. } => ColumnKind::Categorical,
            ColumnType::Float32 | ColumnType::Float64 | ColumnType::Int32 | ColumnType::Int16 => {
                ColumnKind::Numeric
            }
            ColumnType::String | ColumnType::Boolean => ColumnKind::Other,
        }
    }
}

/// Only categorical columns are writable by users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSchema {
    pub name: String,
    pub writable: bool,
    #[serde(flatten)]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let writable = column_type.kind() == ColumnKind::Categorical;
        Self {
            name: name.into(),
            writable,
            column_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisAnnotations {
    pub index: Option<String>,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnnotationsSchema {
    pub obs: AxisAnnotations,
    pub var: AxisAnnotations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataframeSchema {
    pub n_obs: usize,
    pub n_var: usize,
    pub r#type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutSchema {
    pub name: String,
    pub r#type: String,
    pub dims: [String; 2],
}

impl LayoutSchema {
    /// 2-D float32 layout with `<name>_0`, `<name>_1` dimension names.
    pub fn planar(name: impl Into<String>) -> Self {
        let name = name.into();
        let dims = [format!("{name}_0"), format!("{name}_1")];
        Self {
            name,
            r#type: "float32".into(),
            dims,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutSet {
    pub obs: Vec<LayoutSchema>,
}

/// Derived on every request; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaDoc {
    pub dataframe: DataframeSchema,
    pub annotations: AnnotationsSchema,
    pub layout: LayoutSet,
    pub layers: Vec<String>,
}

// -------- Embeddings --------

/// Planar coordinates, one entry per observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
}

impl Coordinates {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.x.len() == self.y.len()
    }
}

/// Sparse nearest-neighbor graph in coordinate (COO) form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborGraph {
    pub rows: Vec<i32>,
    pub cols: Vec<i32>,
    pub weights: Vec<f32>,
}

impl NeighborGraph {
    pub fn edge_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.rows.len() == self.cols.len() && self.rows.len() == self.weights.len()
    }
}

// -------- Gene sets --------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneSetsDocument {
    pub genesets: Vec<GeneSet>,
    pub tid: u64,
}

// -------- Derived views --------

/// `[var_index, log_fold_change, p_value, adjusted_p_value]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiffExpRow(pub u32, pub f64, pub f64, pub f64);

impl DiffExpRow {
    pub fn is_finite(&self) -> bool {
        self.1.is_finite() && self.2.is_finite() && self.3.is_finite()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiffExpResult {
    pub positive: Vec<DiffExpRow>,
    pub negative: Vec<DiffExpRow>,
}

impl DiffExpResult {
    pub fn first_non_finite(&self) -> Option<&DiffExpRow> {
        self.positive
            .iter()
            .chain(self.negative.iter())
            .find(|row| !row.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SankeyResult {
    pub edges: Vec<[String; 2]>,
    pub weights: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn predicate_rejects_values_with_bounds() {
        let err = serde_json::from_value::<FieldPredicate>(
            json!({"name": "tissue", "values": ["heart"], "min": 1.0}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("mixes"));
    }

    #[test]
    fn predicate_rejects_unbounded_range() {
        assert!(serde_json::from_value::<FieldPredicate>(json!({"name": "n"})).is_err());
    }

    #[test]
    fn predicate_stringifies_scalar_values() {
        let pred: FieldPredicate =
            serde_json::from_value(json!({"name": "flag", "values": [true, 3, "x"]})).unwrap();
        assert_eq!(
            pred,
            FieldPredicate::Values {
                name: "flag".into(),
                values: vec!["true".into(), "3".into(), "x".into()],
            }
        );
    }

    #[test]
    fn filter_spec_serializes_without_empty_axes() {
        let spec = FilterSpec {
            obs: Some(AxisFilter {
                annotation_value: vec![FieldPredicate::Range {
                    name: "num_reads".into(),
                    min: Some(1000.0),
                    max: None,
                }],
                index: None,
            }),
            var: None,
        };
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"obs": {"annotation_value": [{"name": "num_reads", "min": 1000.0}]}})
        );
    }

    #[test]
    fn index_selectors_accept_offsets_and_spans() {
        let filter: AxisFilter = serde_json::from_value(json!({"index": [1, [3, 5]]})).unwrap();
        assert_eq!(
            filter.index,
            Some(vec![IndexSelector::Single(1), IndexSelector::Span([3, 5])])
        );
    }

    #[test]
    fn column_schema_writable_only_for_categorical() {
        let cat = ColumnSchema::new(
            "louvain",
            ColumnType::Categorical {
                categories: vec!["a".into()],
            },
        );
        let num = ColumnSchema::new("n_counts", ColumnType::Float32);
        assert!(cat.writable);
        assert!(!num.writable);
        assert_eq!(
            serde_json::to_value(&num).unwrap(),
            json!({"name": "n_counts", "writable": false, "type": "float32"})
        );
    }

    #[test]
    fn diffexp_rows_serialize_as_tuples() {
        let result = DiffExpResult {
            positive: vec![DiffExpRow(3, 1.5, 0.01, 0.02)],
            negative: vec![],
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"positive": [[3, 1.5, 0.01, 0.02]], "negative": []})
        );
        assert!(result.first_non_finite().is_none());
    }
}
