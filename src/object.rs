//! Source object descriptors.
//!
//! A sync reads from a warehouse table, a dataset, a model, a topic, or a
//! segment/cohort of a dataset. Segments and cohorts are not objects of
//! their own on the wire: the object is their dataset and the segment or
//! cohort id travels next to it as a filter.
//!
//! ```text
//! state                                    wire source_attributes
//! {type: segment, id: 42, dataset_id: 7}   {object: {type: dataset, id: 7}, filter_segment_id: 42}
//! {type: cohort,  id: 9,  dataset_id: 7}   {object: {type: dataset, id: 7}, cohort_id: 9}
//! ```
//!
//! On read the API may also report a dataset as `business_object_source`
//! with a `dataset_id`, and tag segment filters with `filter_segment_source`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::coerce::{self, lenient_i64, null_as_default};
use crate::error::ProviderError;

/// What a sync reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SourceObjectState", into = "SourceObjectState")]
pub enum SourceObject {
    /// A warehouse table.
    Table {
        /// Table name.
        table_name: String,
        /// Schema, when the warehouse has one.
        table_schema: Option<String>,
        /// Catalog/database, when the warehouse has one.
        table_catalog: Option<String>,
    },
    /// A dataset.
    Dataset {
        /// Dataset id.
        id: String,
    },
    /// A model.
    Model {
        /// Model id.
        id: String,
    },
    /// A streaming topic.
    Topic {
        /// Topic id.
        id: String,
    },
    /// A segment of a dataset.
    Segment {
        /// Segment id.
        id: String,
        /// Dataset the segment belongs to.
        dataset_id: String,
    },
    /// A cohort of a dataset.
    Cohort {
        /// Cohort id.
        id: String,
        /// Dataset the cohort belongs to.
        dataset_id: String,
    },
}

impl SourceObject {
    /// The state `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceObject::Table { .. } => "table",
            SourceObject::Dataset { .. } => "dataset",
            SourceObject::Model { .. } => "model",
            SourceObject::Topic { .. } => "topic",
            SourceObject::Segment { .. } => "segment",
            SourceObject::Cohort { .. } => "cohort",
        }
    }

    /// All state `type` tags.
    pub const TYPES: [&'static str; 6] = ["table", "dataset", "model", "topic", "segment", "cohort"];
}

/// The flat `object` block as it appears in state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceObjectState {
    /// Variant tag.
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub object_type: String,
    /// Id for every variant but `table`.
    pub id: Option<String>,
    /// Table name.
    pub table_name: Option<String>,
    /// Table schema.
    pub table_schema: Option<String>,
    /// Table catalog.
    pub table_catalog: Option<String>,
    /// Parent dataset of a segment or cohort.
    pub dataset_id: Option<String>,
}

impl TryFrom<SourceObjectState> for SourceObject {
    type Error = String;

    fn try_from(state: SourceObjectState) -> Result<Self, Self::Error> {
        let kind = state.object_type.clone();
        let required = |field: &str, value: Option<String>| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("{} object requires '{}'", kind, field))
        };

        match kind.as_str() {
            "table" => Ok(SourceObject::Table {
                table_name: required("table_name", state.table_name)?,
                table_schema: state.table_schema,
                table_catalog: state.table_catalog,
            }),
            "dataset" => Ok(SourceObject::Dataset {
                id: required("id", state.id)?,
            }),
            "model" => Ok(SourceObject::Model {
                id: required("id", state.id)?,
            }),
            "topic" => Ok(SourceObject::Topic {
                id: required("id", state.id)?,
            }),
            "segment" => Ok(SourceObject::Segment {
                id: required("id", state.id)?,
                dataset_id: required("dataset_id", state.dataset_id)?,
            }),
            "cohort" => Ok(SourceObject::Cohort {
                id: required("id", state.id)?,
                dataset_id: required("dataset_id", state.dataset_id)?,
            }),
            other => Err(format!(
                "unknown source object type '{}', expected one of: {}",
                other,
                SourceObject::TYPES.join(", ")
            )),
        }
    }
}

impl From<SourceObject> for SourceObjectState {
    fn from(object: SourceObject) -> Self {
        let object_type = object.type_name().to_string();
        match object {
            SourceObject::Table {
                table_name,
                table_schema,
                table_catalog,
            } => SourceObjectState {
                object_type,
                table_name: Some(table_name),
                table_schema,
                table_catalog,
                ..Default::default()
            },
            SourceObject::Dataset { id } | SourceObject::Model { id } | SourceObject::Topic { id } => {
                SourceObjectState {
                    object_type,
                    id: Some(id),
                    ..Default::default()
                }
            },
            SourceObject::Segment { id, dataset_id } | SourceObject::Cohort { id, dataset_id } => {
                SourceObjectState {
                    object_type,
                    id: Some(id),
                    dataset_id: Some(dataset_id),
                    ..Default::default()
                }
            },
        }
    }
}

/// The `source_attributes` block of a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttributes {
    /// Source connection id.
    #[serde(deserialize_with = "lenient_i64")]
    pub connection_id: i64,
    /// What to read.
    pub object: SourceObject,
}

/// The `destination_attributes` block of a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAttributes {
    /// Destination connection id.
    #[serde(deserialize_with = "lenient_i64")]
    pub connection_id: i64,
    /// Destination object name, e.g. `Contact`.
    pub object: String,
}

/// Encode `source_attributes` for a request body.
pub fn encode_source(source: &SourceAttributes) -> Value {
    let mut object = Map::new();
    let mut attributes = Map::new();
    attributes.insert("connection_id".into(), Value::from(source.connection_id));

    match &source.object {
        SourceObject::Table {
            table_name,
            table_schema,
            table_catalog,
        } => {
            object.insert("type".into(), "table".into());
            object.insert("table_name".into(), table_name.as_str().into());
            if let Some(schema) = table_schema {
                object.insert("table_schema".into(), schema.as_str().into());
            }
            if let Some(catalog) = table_catalog {
                object.insert("table_catalog".into(), catalog.as_str().into());
            }
        },
        SourceObject::Dataset { id } | SourceObject::Model { id } | SourceObject::Topic { id } => {
            object.insert("type".into(), source.object.type_name().into());
            object.insert("id".into(), coerce::id_to_wire(id));
        },
        SourceObject::Segment { id, dataset_id } => {
            object.insert("type".into(), "dataset".into());
            object.insert("id".into(), coerce::id_to_wire(dataset_id));
            attributes.insert("filter_segment_id".into(), coerce::id_to_wire(id));
        },
        SourceObject::Cohort { id, dataset_id } => {
            object.insert("type".into(), "dataset".into());
            object.insert("id".into(), coerce::id_to_wire(dataset_id));
            attributes.insert("cohort_id".into(), coerce::id_to_wire(id));
        },
    }

    attributes.insert("object".into(), Value::Object(object));
    Value::Object(attributes)
}

/// Encode `destination_attributes` for a request body.
pub fn encode_destination(destination: &DestinationAttributes) -> Value {
    serde_json::json!({
        "connection_id": destination.connection_id,
        "object": destination.object,
    })
}

fn connection_id(attributes: &Map<String, Value>, path: &str) -> Result<i64, ProviderError> {
    match attributes.get("connection_id") {
        None | Some(Value::Null) => Err(ProviderError::MissingField(format!(
            "{}.connection_id",
            path
        ))),
        Some(v) => coerce::int_from_wire(v).ok_or_else(|| {
            ProviderError::Decode(format!("{}.connection_id is not an integer: {}", path, v))
        }),
    }
}

fn wire_id(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(coerce::id_from_wire)
}

/// Decode `source_attributes` from an API record.
pub fn decode_source(value: &Value) -> Result<SourceAttributes, ProviderError> {
    const PATH: &str = "source_attributes";
    let attributes = value
        .as_object()
        .ok_or_else(|| ProviderError::MissingField(PATH.to_string()))?;
    let connection_id = connection_id(attributes, PATH)?;
    let object = attributes
        .get("object")
        .and_then(Value::as_object)
        .ok_or_else(|| ProviderError::MissingField(format!("{}.object", PATH)))?;

    let missing_id = || ProviderError::MissingField(format!("{}.object.id", PATH));
    let dataset_id = || wire_id(object, &["dataset_id", "id"]).ok_or_else(missing_id);

    let segment_source = attributes
        .get("filter_segment_source")
        .and_then(Value::as_str)
        .unwrap_or("segment");
    let filter_segment_id = attributes.get("filter_segment_id").and_then(coerce::id_from_wire);
    let cohort_id = attributes.get("cohort_id").and_then(coerce::id_from_wire);

    let decoded = match (filter_segment_id, cohort_id) {
        (_, Some(id)) => SourceObject::Cohort {
            id,
            dataset_id: dataset_id()?,
        },
        (Some(id), None) if segment_source == "cohort" => SourceObject::Cohort {
            id,
            dataset_id: dataset_id()?,
        },
        (Some(id), None) => SourceObject::Segment {
            id,
            dataset_id: dataset_id()?,
        },
        (None, None) => decode_object(object)?,
    };

    debug!(object_type = decoded.type_name(), "Decoded source object");
    Ok(SourceAttributes {
        connection_id,
        object: decoded,
    })
}

fn decode_object(object: &Map<String, Value>) -> Result<SourceObject, ProviderError> {
    let kind = object.get("type").and_then(Value::as_str).ok_or_else(|| {
        ProviderError::MissingField("source_attributes.object.type".to_string())
    })?;
    let id = |keys: &[&str]| {
        wire_id(object, keys).ok_or_else(|| {
            ProviderError::MissingField("source_attributes.object.id".to_string())
        })
    };
    let optional = |key: &str| {
        object
            .get(key)
            .filter(|v| !v.is_null())
            .map(coerce::string_from_wire)
    };

    match kind {
        "table" => Ok(SourceObject::Table {
            table_name: optional("table_name").ok_or_else(|| {
                ProviderError::MissingField("source_attributes.object.table_name".to_string())
            })?,
            table_schema: optional("table_schema"),
            table_catalog: optional("table_catalog"),
        }),
        "dataset" | "business_object_source" => Ok(SourceObject::Dataset {
            id: id(&["dataset_id", "id"])?,
        }),
        "model" => Ok(SourceObject::Model { id: id(&["id"])? }),
        "topic" => Ok(SourceObject::Topic { id: id(&["id"])? }),
        other => Err(ProviderError::Decode(format!(
            "unsupported source object type '{}'",
            other
        ))),
    }
}

/// Decode `destination_attributes` from an API record.
pub fn decode_destination(value: &Value) -> Result<DestinationAttributes, ProviderError> {
    const PATH: &str = "destination_attributes";
    let attributes = value
        .as_object()
        .ok_or_else(|| ProviderError::MissingField(PATH.to_string()))?;
    let object = match attributes.get("object") {
        None | Some(Value::Null) => {
            return Err(ProviderError::MissingField(format!("{}.object", PATH)))
        },
        Some(v) => coerce::string_from_wire(v),
    };

    Ok(DestinationAttributes {
        connection_id: connection_id(attributes, PATH)?,
        object,
    })
}
