//! Field mapping codec for the sync resource.
//!
//! A sync's `field_mapping` blocks describe, one entry per destination
//! field, where the value comes from. In state a mapping is a flat block
//! gated by a `type` string; in memory it is a [`FieldMapping`] whose
//! [`MappingSource`] carries only the data its variant needs; on the wire
//! it is a [`MappingAttribute`] whose `from` is a `{type, data}` pair.
//!
//! | state `type`          | wire `from.type`     | wire `from.data`                        |
//! |-----------------------|----------------------|-----------------------------------------|
//! | `direct`, `hash`      | `column`             | column name                             |
//! | `constant`            | `constant_value`     | `{"basic_type": "text", "value": "…"}`  |
//! | `sync_metadata`       | `sync_metadata`      | metadata key                            |
//! | `segment_membership`  | `segment_membership` | `{"identify_by": "…"}`                  |
//! | `liquid_template`     | `liquid_template`    | `{"liquid_template": "…"}`              |
//!
//! The wire form loses two details (hashing and the JSON type of a
//! constant), so reads are passed through [`reconcile_mappings`] against the
//! configured list before they reach state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::coerce::{self, null_as_default};
use crate::error::ProviderError;
use crate::validation::type_name;

/// The `type` tag of a field mapping in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// Copy a source column.
    #[default]
    Direct,
    /// Copy a source column, hashed by the destination.
    Hash,
    /// A fixed value.
    Constant,
    /// A property of the sync run itself.
    SyncMetadata,
    /// Whether the record belongs to a segment.
    SegmentMembership,
    /// A rendered liquid template.
    LiquidTemplate,
}

impl MappingType {
    /// All tags, in schema order.
    pub const ALL: [MappingType; 6] = [
        MappingType::Direct,
        MappingType::Hash,
        MappingType::Constant,
        MappingType::SyncMetadata,
        MappingType::SegmentMembership,
        MappingType::LiquidTemplate,
    ];

    /// The tag as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Direct => "direct",
            MappingType::Hash => "hash",
            MappingType::Constant => "constant",
            MappingType::SyncMetadata => "sync_metadata",
            MappingType::SegmentMembership => "segment_membership",
            MappingType::LiquidTemplate => "liquid_template",
        }
    }
}

/// Where a mapped value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSource {
    /// A source column, copied as-is.
    Direct {
        /// Column name.
        from: String,
    },
    /// A source column, hashed before it is written.
    Hash {
        /// Column name.
        from: String,
    },
    /// A constant. Never `null`.
    Constant {
        /// The configured value, in whatever JSON type the user wrote.
        value: Value,
    },
    /// A sync run property such as `sync_run_id`.
    SyncMetadata {
        /// Metadata key.
        key: String,
    },
    /// Segment membership, identified by the given field.
    SegmentMembership {
        /// Field identifying the segment.
        identify_by: String,
    },
    /// A liquid template rendered per record.
    LiquidTemplate {
        /// Template source.
        template: String,
    },
}

impl MappingSource {
    /// The state `type` tag for this source.
    pub fn mapping_type(&self) -> MappingType {
        match self {
            MappingSource::Direct { .. } => MappingType::Direct,
            MappingSource::Hash { .. } => MappingType::Hash,
            MappingSource::Constant { .. } => MappingType::Constant,
            MappingSource::SyncMetadata { .. } => MappingType::SyncMetadata,
            MappingSource::SegmentMembership { .. } => MappingType::SegmentMembership,
            MappingSource::LiquidTemplate { .. } => MappingType::LiquidTemplate,
        }
    }
}

/// One destination field and the value written to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldMappingState", into = "FieldMappingState")]
pub struct FieldMapping {
    /// Destination field name.
    pub to: String,
    /// Where the value comes from.
    pub source: MappingSource,
    /// Records are matched at the destination on this field.
    pub is_primary_identifier: bool,
    /// Destination object used to resolve a lookup.
    pub lookup_object: Option<String>,
    /// Field on `lookup_object` to match against.
    pub lookup_field: Option<String>,
    /// Never overwrite a value already present at the destination.
    pub preserve_values: bool,
    /// Create the destination field if it does not exist.
    pub generate_field: bool,
    /// `None` leaves the server default in place; `Some(false)` disables
    /// syncing nulls explicitly.
    pub sync_null_values: Option<bool>,
}

impl FieldMapping {
    fn new(to: impl Into<String>, source: MappingSource) -> Self {
        Self {
            to: to.into(),
            source,
            is_primary_identifier: false,
            lookup_object: None,
            lookup_field: None,
            preserve_values: false,
            generate_field: false,
            sync_null_values: None,
        }
    }

    /// Copy column `from` into field `to`.
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(to, MappingSource::Direct { from: from.into() })
    }

    /// Copy column `from` into field `to`, hashed.
    pub fn hash(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(to, MappingSource::Hash { from: from.into() })
    }

    /// Write a constant into field `to`.
    pub fn constant(to: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(
            to,
            MappingSource::Constant {
                value: value.into(),
            },
        )
    }

    /// Write a sync run property into field `to`.
    pub fn sync_metadata(to: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(to, MappingSource::SyncMetadata { key: key.into() })
    }

    /// Write segment membership into field `to`.
    pub fn segment_membership(to: impl Into<String>, identify_by: impl Into<String>) -> Self {
        Self::new(
            to,
            MappingSource::SegmentMembership {
                identify_by: identify_by.into(),
            },
        )
    }

    /// Render a liquid template into field `to`.
    pub fn liquid_template(to: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(
            to,
            MappingSource::LiquidTemplate {
                template: template.into(),
            },
        )
    }

    /// Mark this mapping as the primary identifier.
    pub fn primary(mut self) -> Self {
        self.is_primary_identifier = true;
        self
    }

    /// Resolve the value through a lookup on another destination object.
    pub fn with_lookup(mut self, object: impl Into<String>, field: impl Into<String>) -> Self {
        self.lookup_object = Some(object.into());
        self.lookup_field = Some(field.into());
        self
    }

    /// Keep existing destination values.
    pub fn preserving_values(mut self) -> Self {
        self.preserve_values = true;
        self
    }

    /// Create the destination field when missing.
    pub fn generating_field(mut self) -> Self {
        self.generate_field = true;
        self
    }

    /// Set `sync_null_values` explicitly.
    pub fn with_sync_null_values(mut self, enabled: bool) -> Self {
        self.sync_null_values = Some(enabled);
        self
    }
}

/// A field mapping as it appears in configuration and state.
///
/// Unset attributes are serialized as `null`; non-column mappings carry
/// an empty `from`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMappingState {
    /// Source column for `direct`/`hash`.
    pub from: Option<String>,
    /// Destination field.
    #[serde(deserialize_with = "null_as_default")]
    pub to: String,
    /// Variant tag.
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub mapping_type: MappingType,
    /// Value for `constant`.
    pub constant: Option<Value>,
    /// Key for `sync_metadata`.
    pub sync_metadata_key: Option<String>,
    /// Identifier for `segment_membership`.
    pub segment_identify_by: Option<String>,
    /// Template for `liquid_template`.
    pub liquid_template: Option<String>,
    /// See [`FieldMapping::is_primary_identifier`].
    #[serde(deserialize_with = "null_as_default")]
    pub is_primary_identifier: bool,
    /// See [`FieldMapping::lookup_object`].
    pub lookup_object: Option<String>,
    /// See [`FieldMapping::lookup_field`].
    pub lookup_field: Option<String>,
    /// See [`FieldMapping::preserve_values`].
    #[serde(deserialize_with = "null_as_default")]
    pub preserve_values: bool,
    /// See [`FieldMapping::generate_field`].
    #[serde(deserialize_with = "null_as_default")]
    pub generate_field: bool,
    /// See [`FieldMapping::sync_null_values`].
    pub sync_null_values: Option<bool>,
}

impl TryFrom<FieldMappingState> for FieldMapping {
    type Error = String;

    fn try_from(state: FieldMappingState) -> Result<Self, Self::Error> {
        let tag = state.mapping_type;
        let reject = |field: &str, present: bool| -> Result<(), String> {
            if present {
                Err(format!("'{}' cannot be set on a {} mapping", field, tag.as_str()))
            } else {
                Ok(())
            }
        };
        let require = |field: &str, value: Option<String>| -> Result<String, String> {
            value.ok_or_else(|| format!("{} mapping requires '{}'", tag.as_str(), field))
        };

        let from_set = state.from.as_deref().is_some_and(|f| !f.is_empty());
        if tag != MappingType::Constant {
            reject("constant", state.constant.is_some())?;
        }
        if tag != MappingType::SyncMetadata {
            reject("sync_metadata_key", state.sync_metadata_key.is_some())?;
        }
        if tag != MappingType::SegmentMembership {
            reject("segment_identify_by", state.segment_identify_by.is_some())?;
        }
        if tag != MappingType::LiquidTemplate {
            reject("liquid_template", state.liquid_template.is_some())?;
        }
        if !matches!(tag, MappingType::Direct | MappingType::Hash) {
            reject("from", from_set)?;
        }

        let source = match tag {
            MappingType::Direct => MappingSource::Direct {
                from: state.from.unwrap_or_default(),
            },
            MappingType::Hash => MappingSource::Hash {
                from: state.from.unwrap_or_default(),
            },
            MappingType::Constant => match state.constant {
                Some(value) if !value.is_null() => MappingSource::Constant { value },
                _ => return Err("constant mapping requires a non-null 'constant'".to_string()),
            },
            MappingType::SyncMetadata => MappingSource::SyncMetadata {
                key: require("sync_metadata_key", state.sync_metadata_key)?,
            },
            MappingType::SegmentMembership => MappingSource::SegmentMembership {
                identify_by: require("segment_identify_by", state.segment_identify_by)?,
            },
            MappingType::LiquidTemplate => MappingSource::LiquidTemplate {
                template: require("liquid_template", state.liquid_template)?,
            },
        };

        Ok(Self {
            to: state.to,
            source,
            is_primary_identifier: state.is_primary_identifier,
            lookup_object: state.lookup_object,
            lookup_field: state.lookup_field,
            preserve_values: state.preserve_values,
            generate_field: state.generate_field,
            sync_null_values: state.sync_null_values,
        })
    }
}

impl From<FieldMapping> for FieldMappingState {
    fn from(mapping: FieldMapping) -> Self {
        let mut state = FieldMappingState {
            from: Some(String::new()),
            to: mapping.to,
            mapping_type: mapping.source.mapping_type(),
            is_primary_identifier: mapping.is_primary_identifier,
            lookup_object: mapping.lookup_object,
            lookup_field: mapping.lookup_field,
            preserve_values: mapping.preserve_values,
            generate_field: mapping.generate_field,
            sync_null_values: mapping.sync_null_values,
            ..Default::default()
        };
        match mapping.source {
            MappingSource::Direct { from } | MappingSource::Hash { from } => {
                state.from = Some(from)
            },
            MappingSource::Constant { value } => state.constant = Some(value),
            MappingSource::SyncMetadata { key } => state.sync_metadata_key = Some(key),
            MappingSource::SegmentMembership { identify_by } => {
                state.segment_identify_by = Some(identify_by)
            },
            MappingSource::LiquidTemplate { template } => state.liquid_template = Some(template),
        }
        state
    }
}

/// The `from` half of a wire mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MappingFrom {
    /// A source column.
    Column(String),
    /// A constant, always sent as text.
    ConstantValue {
        /// Always `"text"`.
        basic_type: String,
        /// The stringified constant.
        value: String,
    },
    /// A sync run property.
    SyncMetadata(String),
    /// Segment membership.
    SegmentMembership {
        /// Field identifying the segment.
        identify_by: String,
    },
    /// A liquid template.
    LiquidTemplate {
        /// Template source.
        liquid_template: String,
    },
}

/// A field mapping as the Census API accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingAttribute {
    /// Value source.
    pub from: MappingFrom,
    /// Destination field.
    pub to: String,
    /// Record-matching key.
    #[serde(default)]
    pub is_primary_identifier: bool,
    /// Lookup object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_object: Option<String>,
    /// Lookup field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_field: Option<String>,
    /// Keep existing destination values.
    #[serde(default)]
    pub preserve_values: bool,
    /// Create the destination field when missing.
    #[serde(default)]
    pub generate_field: bool,
    /// Omitted when unset so the server default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_null_values: Option<bool>,
}

/// Encode one mapping. Does not check the primary identifier invariant.
pub fn encode_mapping(mapping: &FieldMapping) -> MappingAttribute {
    let from = match &mapping.source {
        MappingSource::Direct { from } | MappingSource::Hash { from } => {
            MappingFrom::Column(from.clone())
        },
        MappingSource::Constant { value } => MappingFrom::ConstantValue {
            basic_type: "text".to_string(),
            value: coerce::stringify_constant(value),
        },
        MappingSource::SyncMetadata { key } => MappingFrom::SyncMetadata(key.clone()),
        MappingSource::SegmentMembership { identify_by } => MappingFrom::SegmentMembership {
            identify_by: identify_by.clone(),
        },
        MappingSource::LiquidTemplate { template } => MappingFrom::LiquidTemplate {
            liquid_template: template.clone(),
        },
    };

    MappingAttribute {
        from,
        to: mapping.to.clone(),
        is_primary_identifier: mapping.is_primary_identifier,
        lookup_object: mapping.lookup_object.clone(),
        lookup_field: mapping.lookup_field.clone(),
        preserve_values: mapping.preserve_values,
        generate_field: mapping.generate_field,
        sync_null_values: mapping.sync_null_values,
    }
}

/// Fail unless exactly one mapping is the primary identifier.
pub fn check_primary_identifier(mappings: &[FieldMapping]) -> Result<(), ProviderError> {
    let indices: Vec<usize> = mappings
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_primary_identifier)
        .map(|(i, _)| i)
        .collect();
    if indices.len() == 1 {
        Ok(())
    } else {
        Err(ProviderError::PrimaryIdentifier { indices })
    }
}

/// Encode a sync's mapping list, enforcing the primary identifier invariant.
pub fn encode_mappings(mappings: &[FieldMapping]) -> Result<Vec<MappingAttribute>, ProviderError> {
    check_primary_identifier(mappings)?;
    let encoded: Vec<_> = mappings.iter().map(encode_mapping).collect();
    debug!(count = encoded.len(), "Encoded field mappings");
    Ok(encoded)
}

/// Parse the `field_mapping` list from configuration or state.
///
/// `null` is an empty list. Errors name the index of the offending entry.
pub fn parse_mappings(value: &Value) -> Result<Vec<FieldMapping>, ProviderError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(ProviderError::Validation(format!(
                "field_mapping must be a list, got {}",
                type_name(other)
            )))
        },
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let state: FieldMappingState = serde_json::from_value(item.clone()).map_err(|e| {
                ProviderError::InvalidMapping {
                    index,
                    message: e.to_string(),
                }
            })?;
            FieldMapping::try_from(state)
                .map_err(|message| ProviderError::InvalidMapping { index, message })
        })
        .collect()
}

/// Decode one wire mapping.
///
/// Only a missing `to` or `from` is an error; anything else the API sends
/// is mapped to the closest state representation.
pub fn decode_mapping(index: usize, value: &Value) -> Result<FieldMapping, ProviderError> {
    let path = |field: &str| format!("field_mapping.{}.{}", index, field);
    let obj = value.as_object().ok_or_else(|| {
        ProviderError::Decode(format!(
            "field mapping {} is {}, expected object",
            index,
            type_name(value)
        ))
    })?;

    let to = match obj.get("to") {
        None | Some(Value::Null) => return Err(ProviderError::MissingField(path("to"))),
        Some(v) => coerce::string_from_wire(v),
    };
    let from = match obj.get("from") {
        None | Some(Value::Null) => return Err(ProviderError::MissingField(path("from"))),
        Some(v) => v,
    };

    let optional_string = |key: &str| {
        obj.get(key)
            .filter(|v| !v.is_null())
            .map(coerce::string_from_wire)
    };

    Ok(FieldMapping {
        to,
        source: decode_source(index, from),
        is_primary_identifier: coerce::bool_from_wire(obj.get("is_primary_identifier"))
            .unwrap_or(false),
        lookup_object: optional_string("lookup_object"),
        lookup_field: optional_string("lookup_field"),
        preserve_values: coerce::bool_from_wire(obj.get("preserve_values")).unwrap_or(false),
        generate_field: coerce::bool_from_wire(obj.get("generate_field")).unwrap_or(false),
        sync_null_values: coerce::bool_from_wire(obj.get("sync_null_values")),
    })
}

fn decode_source(index: usize, from: &Value) -> MappingSource {
    // Some endpoints return a bare column name instead of {type, data}.
    let Some(obj) = from.as_object() else {
        return MappingSource::Direct {
            from: coerce::string_from_wire(from),
        };
    };
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or("column");
    let data = obj.get("data").unwrap_or(&Value::Null);

    match kind {
        "constant_value" => {
            let value = match data.get("value") {
                Some(value) => value.clone(),
                None => {
                    warn!(index, data = %data, "constant_value mapping has no 'value', using raw data");
                    data.clone()
                },
            };
            if value.is_null() {
                warn!(index, "constant_value mapping has no data, using an empty string");
                MappingSource::Constant {
                    value: Value::String(String::new()),
                }
            } else {
                MappingSource::Constant { value }
            }
        },
        "sync_metadata" => MappingSource::SyncMetadata {
            key: coerce::string_from_wire(data),
        },
        "segment_membership" => MappingSource::SegmentMembership {
            identify_by: nested_string(index, kind, data, "identify_by"),
        },
        "liquid_template" => MappingSource::LiquidTemplate {
            template: nested_string(index, kind, data, "liquid_template"),
        },
        "column" => MappingSource::Direct {
            from: coerce::string_from_wire(data),
        },
        other => {
            warn!(index, kind = other, "Unrecognized mapping source type, treating as column");
            MappingSource::Direct {
                from: coerce::string_from_wire(data),
            }
        },
    }
}

fn nested_string(index: usize, kind: &str, data: &Value, key: &str) -> String {
    match data {
        Value::Object(map) => match map.get(key) {
            Some(v) => coerce::string_from_wire(v),
            None => {
                warn!(index, kind, key, "Mapping data is missing its key");
                String::new()
            },
        },
        other => coerce::string_from_wire(other),
    }
}

/// Decode a list of wire mappings.
pub fn decode_mappings(values: &[Value]) -> Result<Vec<FieldMapping>, ProviderError> {
    let decoded = values
        .iter()
        .enumerate()
        .map(|(index, value)| decode_mapping(index, value))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = decoded.len(), "Decoded field mappings");
    Ok(decoded)
}

/// Restore details the wire form drops, using the configured mappings.
///
/// Each decoded mapping is paired with the configured one at the same
/// position when the `to` fields agree, otherwise with the first configured
/// mapping writing the same field. A paired `hash` mapping turns a decoded
/// `direct` back into `hash` when the columns agree, and a paired constant
/// keeps its configured JSON type when it stringifies to the decoded text.
pub fn reconcile_mappings(decoded: Vec<FieldMapping>, prior: &[FieldMapping]) -> Vec<FieldMapping> {
    decoded
        .into_iter()
        .enumerate()
        .map(|(index, mut mapping)| {
            let paired = prior
                .get(index)
                .filter(|p| p.to == mapping.to)
                .or_else(|| prior.iter().find(|p| p.to == mapping.to));
            let Some(paired) = paired else {
                return mapping;
            };

            let restore = match (&mapping.source, &paired.source) {
                (MappingSource::Direct { from }, MappingSource::Hash { from: configured }) => {
                    from == configured
                },
                (MappingSource::Constant { value }, MappingSource::Constant { value: configured }) => {
                    value != configured
                        && value.as_str() == Some(coerce::stringify_constant(configured).as_str())
                },
                _ => false,
            };
            if restore {
                mapping.source = paired.source.clone();
            }
            mapping
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn every_variant() -> Vec<FieldMapping> {
        vec![
            FieldMapping::direct("email", "Email").primary(),
            FieldMapping::direct("", "EmptyFrom"),
            FieldMapping::hash("phone", "HashedPhone"),
            FieldMapping::constant("LeadSource", "Terraform Test"),
            FieldMapping::constant("Score", 5),
            FieldMapping::constant("Opted", true),
            FieldMapping::constant("Blank", ""),
            FieldMapping::sync_metadata("RunId", "sync_run_id"),
            FieldMapping::segment_membership("InSegment", "email"),
            FieldMapping::liquid_template("Greeting", "Hello {{ record['name'] }}"),
            FieldMapping::direct("account_id", "AccountId")
                .with_lookup("Account", "External_Id__c")
                .preserving_values()
                .generating_field()
                .with_sync_null_values(false),
            FieldMapping::direct("notes", "Notes").with_sync_null_values(true),
        ]
    }

    fn wire(mappings: &[FieldMapping]) -> Vec<Value> {
        encode_mappings(mappings)
            .unwrap()
            .iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect()
    }

    #[test]
    fn test_round_trip_every_variant() {
        let mappings = every_variant();
        let decoded = decode_mappings(&wire(&mappings)).unwrap();
        assert_eq!(reconcile_mappings(decoded, &mappings), mappings);
    }

    #[test]
    fn test_round_trip_without_prior_loses_only_hash_and_constant_type() {
        let mappings = every_variant();
        let decoded = decode_mappings(&wire(&mappings)).unwrap();

        assert_eq!(
            decoded[2].source,
            MappingSource::Direct {
                from: "phone".to_string()
            }
        );
        assert_eq!(
            decoded[4].source,
            MappingSource::Constant { value: json!("5") }
        );
        assert_eq!(decoded[0], mappings[0]);
        assert_eq!(decoded[9], mappings[9]);
        assert_eq!(decoded[10], mappings[10]);
    }

    #[test]
    fn test_encode_wire_shapes() {
        let encoded = wire(&[
            FieldMapping::direct("email", "Email").primary(),
            FieldMapping::constant("LeadSource", 42),
            FieldMapping::sync_metadata("RunId", "sync_run_id"),
            FieldMapping::segment_membership("InSegment", "email"),
            FieldMapping::liquid_template("Greeting", "Hi {{ name }}"),
        ]);

        assert_eq!(
            encoded[0],
            json!({
                "from": {"type": "column", "data": "email"},
                "to": "Email",
                "is_primary_identifier": true,
                "preserve_values": false,
                "generate_field": false
            })
        );
        assert_eq!(
            encoded[1]["from"],
            json!({"type": "constant_value", "data": {"basic_type": "text", "value": "42"}})
        );
        assert_eq!(
            encoded[2]["from"],
            json!({"type": "sync_metadata", "data": "sync_run_id"})
        );
        assert_eq!(
            encoded[3]["from"],
            json!({"type": "segment_membership", "data": {"identify_by": "email"}})
        );
        assert_eq!(
            encoded[4]["from"],
            json!({"type": "liquid_template", "data": {"liquid_template": "Hi {{ name }}"}})
        );
    }

    #[test]
    fn test_sync_null_values_unset_is_omitted() {
        let unset = serde_json::to_value(encode_mapping(&FieldMapping::direct("a", "A"))).unwrap();
        assert!(unset.get("sync_null_values").is_none());

        let disabled = serde_json::to_value(encode_mapping(
            &FieldMapping::direct("a", "A").with_sync_null_values(false),
        ))
        .unwrap();
        assert_eq!(disabled["sync_null_values"], json!(false));
    }

    #[test]
    fn test_primary_identifier_count() {
        let none = vec![FieldMapping::direct("a", "A"), FieldMapping::direct("b", "B")];
        assert!(matches!(
            encode_mappings(&none),
            Err(ProviderError::PrimaryIdentifier { indices }) if indices.is_empty()
        ));

        let two = vec![
            FieldMapping::direct("a", "A").primary(),
            FieldMapping::direct("b", "B"),
            FieldMapping::direct("c", "C").primary(),
        ];
        match encode_mappings(&two) {
            Err(ProviderError::PrimaryIdentifier { indices }) => assert_eq!(indices, vec![0, 2]),
            other => panic!("expected a primary identifier error, got {:?}", other),
        }

        let one = vec![
            FieldMapping::direct("a", "A").primary(),
            FieldMapping::direct("b", "B"),
        ];
        assert_eq!(encode_mappings(&one).unwrap().len(), 2);

        assert!(encode_mappings(&[]).is_err());
    }

    #[test]
    fn test_decode_constant_value() {
        let mapping = decode_mapping(
            0,
            &json!({
                "from": {"type": "constant_value", "data": {"value": "Terraform Test", "basic_type": "text"}},
                "to": "LeadSource"
            }),
        )
        .unwrap();

        let state = serde_json::to_value(&mapping).unwrap();
        assert_eq!(state["type"], "constant");
        assert_eq!(state["constant"], "Terraform Test");
        assert_eq!(state["to"], "LeadSource");
        assert_eq!(state["from"], "");
    }

    #[test]
    fn test_decode_constant_without_value_uses_raw_data() {
        let mapping = decode_mapping(
            3,
            &json!({
                "from": {"type": "constant_value", "data": {"basic_type": "text", "text": "x"}},
                "to": "LeadSource"
            }),
        )
        .unwrap();
        assert_eq!(
            mapping.source,
            MappingSource::Constant {
                value: json!({"basic_type": "text", "text": "x"})
            }
        );

        let bare = decode_mapping(0, &json!({"from": {"type": "constant_value", "data": "x"}, "to": "T"}))
            .unwrap();
        assert_eq!(bare.source, MappingSource::Constant { value: json!("x") });
    }

    #[test]
    fn test_decode_constant_without_data_is_never_null() {
        let shapes = [
            json!({"from": {"type": "constant_value"}, "to": "LeadSource"}),
            json!({"from": {"type": "constant_value", "data": null}, "to": "LeadSource"}),
            json!({"from": {"type": "constant_value", "data": {"value": null}}, "to": "LeadSource"}),
        ];
        for shape in shapes {
            let mapping = decode_mapping(1, &shape).unwrap();
            assert_eq!(mapping.source, MappingSource::Constant { value: json!("") });

            let state = serde_json::to_value(&mapping).unwrap();
            let reparsed = parse_mappings(&json!([state])).unwrap();
            assert_eq!(reparsed, vec![mapping]);
        }
    }

    #[test]
    fn test_decode_tolerates_odd_shapes() {
        let numeric_column =
            decode_mapping(0, &json!({"from": {"type": "column", "data": 42.0}, "to": 7})).unwrap();
        assert_eq!(numeric_column.to, "7");
        assert_eq!(
            numeric_column.source,
            MappingSource::Direct {
                from: "42".to_string()
            }
        );

        let unknown =
            decode_mapping(0, &json!({"from": {"type": "mystery", "data": "col"}, "to": "X"}))
                .unwrap();
        assert_eq!(
            unknown.source,
            MappingSource::Direct {
                from: "col".to_string()
            }
        );

        let bare = decode_mapping(0, &json!({"from": "email", "to": "Email"})).unwrap();
        assert_eq!(
            bare.source,
            MappingSource::Direct {
                from: "email".to_string()
            }
        );

        let flat_segment = decode_mapping(
            0,
            &json!({"from": {"type": "segment_membership", "data": "email"}, "to": "S"}),
        )
        .unwrap();
        assert_eq!(
            flat_segment.source,
            MappingSource::SegmentMembership {
                identify_by: "email".to_string()
            }
        );

        let no_key = decode_mapping(
            0,
            &json!({"from": {"type": "liquid_template", "data": {}}, "to": "L"}),
        )
        .unwrap();
        assert_eq!(
            no_key.source,
            MappingSource::LiquidTemplate {
                template: String::new()
            }
        );
    }

    #[test]
    fn test_decode_missing_required_fields() {
        let err = decode_mappings(&[
            json!({"from": {"type": "column", "data": "a"}, "to": "A"}),
            json!({"from": {"type": "column", "data": "b"}}),
        ])
        .unwrap_err();
        match err {
            ProviderError::MissingField(path) => assert_eq!(path, "field_mapping.1.to"),
            other => panic!("unexpected error: {other}"),
        }

        let err = decode_mapping(0, &json!({"to": "A", "from": null})).unwrap_err();
        assert!(matches!(err, ProviderError::MissingField(p) if p == "field_mapping.0.from"));

        let err = decode_mapping(0, &json!("nope")).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn test_parse_mappings_from_state() {
        let parsed = parse_mappings(&json!([
            {
                "from": "email", "to": "Email", "type": "direct", "is_primary_identifier": true,
                "constant": null, "sync_metadata_key": null, "segment_identify_by": null,
                "liquid_template": null, "lookup_object": null, "lookup_field": null,
                "preserve_values": null, "generate_field": false, "sync_null_values": null
            },
            {"to": "LeadSource", "type": "constant", "constant": "Terraform"},
            {"to": "Run", "type": "sync_metadata", "sync_metadata_key": "sync_run_id", "from": ""}
        ]))
        .unwrap();

        assert_eq!(
            parsed,
            vec![
                FieldMapping::direct("email", "Email").primary(),
                FieldMapping::constant("LeadSource", "Terraform"),
                FieldMapping::sync_metadata("Run", "sync_run_id"),
            ]
        );
        assert!(parse_mappings(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_mappings_rejects_malformed_entries() {
        let err = parse_mappings(&json!([
            {"from": "a", "to": "A", "is_primary_identifier": true},
            {"to": "LeadSource", "type": "constant"}
        ]))
        .unwrap_err();
        match err {
            ProviderError::InvalidMapping { index, message } => {
                assert_eq!(index, 1);
                assert!(message.contains("constant"));
            },
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_mappings(&json!([
            {"to": "LeadSource", "type": "constant", "constant": "x", "from": "col"}
        ]))
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidMapping { index: 0, .. }));

        let err = parse_mappings(&json!([{"to": "A", "type": "direct", "sync_metadata_key": "k"}]))
            .unwrap_err();
        assert!(err.to_string().contains("sync_metadata_key"));

        let err = parse_mappings(&json!([{"to": "A", "type": "sync_metadata"}])).unwrap_err();
        assert!(err.to_string().contains("requires 'sync_metadata_key'"));

        let err = parse_mappings(&json!([{"to": "A", "type": "rot13"}])).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidMapping { index: 0, .. }));

        assert!(parse_mappings(&json!({"to": "A"})).is_err());
    }

    #[test]
    fn test_state_shape_round_trip() {
        for mapping in every_variant() {
            let state = serde_json::to_value(&mapping).unwrap();
            let back: FieldMapping = serde_json::from_value(state).unwrap();
            assert_eq!(back, mapping);
        }
    }

    #[test]
    fn test_reconcile_does_not_invent_hash() {
        let prior = vec![FieldMapping::hash("phone", "Phone")];
        let decoded = vec![FieldMapping::direct("mobile", "Phone")];
        let reconciled = reconcile_mappings(decoded.clone(), &prior);
        assert_eq!(reconciled, decoded);
    }

    #[test]
    fn test_reconcile_matches_by_field_when_reordered() {
        let prior = vec![
            FieldMapping::direct("email", "Email").primary(),
            FieldMapping::constant("Score", 5),
        ];
        let decoded = vec![
            FieldMapping::constant("Score", "5"),
            FieldMapping::direct("email", "Email").primary(),
        ];
        let reconciled = reconcile_mappings(decoded, &prior);
        assert_eq!(reconciled[0], FieldMapping::constant("Score", 5));

        let changed = reconcile_mappings(vec![FieldMapping::constant("Score", "6")], &prior);
        assert_eq!(changed[0], FieldMapping::constant("Score", "6"));
    }

    #[test]
    fn test_mapping_type_tags() {
        let tags: Vec<_> = MappingType::ALL.iter().map(MappingType::as_str).collect();
        assert_eq!(
            tags,
            vec![
                "direct",
                "hash",
                "constant",
                "sync_metadata",
                "segment_membership",
                "liquid_template"
            ]
        );
        for tag in MappingType::ALL {
            assert_eq!(serde_json::to_value(tag).unwrap(), json!(tag.as_str()));
        }
    }
}
