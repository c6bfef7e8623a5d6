//! The `census_sync` resource.
//!
//! [`SyncConfig`] is the typed form of the resource's state. It is built
//! from raw state only after the JSON passed [`sync_schema`], is encoded into
//! a [`SyncRequest`] for create/update calls, and is rebuilt from the
//! record the API returns on read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::coerce::{self, null_as_default};
use crate::config::summarize;
use crate::error::ProviderError;
use crate::mapping::{
    check_primary_identifier, decode_mappings, encode_mappings, parse_mappings,
    reconcile_mappings, FieldMapping, MappingAttribute, MappingType,
};
use crate::object::{
    decode_destination, decode_source, encode_destination, encode_source, DestinationAttributes,
    SourceAttributes, SourceObject,
};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::validation;

/// How records are written to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// Insert new records and update existing ones.
    Upsert,
    /// Only update existing records.
    Update,
    /// Only insert new records.
    Insert,
    /// Make the destination match the source, deleting extra records.
    Mirror,
    /// Append every record.
    Append,
}

impl SyncOperation {
    /// All operations, as written in configuration.
    pub const ALL: [&'static str; 5] = ["upsert", "update", "insert", "mirror", "append"];
}

/// Which destination properties a sync manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBehavior {
    /// Only the mapped fields.
    SpecificProperties,
    /// Every source column, with mappings as overrides.
    SyncAllProperties,
}

/// Typed state of a `census_sync` resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server-assigned id. `None` until created.
    #[serde(default)]
    pub id: Option<String>,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Write operation.
    pub operation: SyncOperation,
    /// Whether scheduled runs are suspended.
    #[serde(default, deserialize_with = "null_as_default")]
    pub paused: bool,
    /// Property management mode. `None` uses the server default.
    #[serde(default)]
    pub field_behavior: Option<FieldBehavior>,
    /// What the sync reads.
    pub source_attributes: SourceAttributes,
    /// Where the sync writes.
    pub destination_attributes: DestinationAttributes,
    /// Field mappings, in configuration order.
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
}

/// Request body for creating or updating a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Write operation.
    pub operation: SyncOperation,
    /// Whether scheduled runs are suspended.
    pub paused: bool,
    /// Property management mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_behavior: Option<FieldBehavior>,
    /// Encoded source attributes.
    pub source_attributes: Value,
    /// Encoded destination attributes.
    pub destination_attributes: Value,
    /// Encoded field mappings.
    pub mappings: Vec<MappingAttribute>,
}

impl SyncConfig {
    /// Build the typed config from raw configuration or state.
    ///
    /// Schema violations are reported together as one validation error;
    /// field mapping errors name the index of the offending mapping.
    pub fn from_state(state: &Value) -> Result<Self, ProviderError> {
        if let Err(diagnostics) = validation::validate_result(&sync_schema(), state) {
            return Err(ProviderError::Validation(summarize(&diagnostics)));
        }
        let field_mapping = parse_mappings(state.get("field_mapping").unwrap_or(&Value::Null))?;

        let mut rest = state.clone();
        if let Some(obj) = rest.as_object_mut() {
            obj.remove("field_mapping");
        }
        let mut config: SyncConfig = serde_json::from_value(rest)
            .map_err(|e| ProviderError::Validation(format!("invalid sync configuration: {}", e)))?;
        config.field_mapping = field_mapping;
        Ok(config)
    }

    /// Serialize to state.
    pub fn to_state(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Encode the request body, checking the mapping invariants first.
    pub fn to_request(&self) -> Result<SyncRequest, ProviderError> {
        let mappings = encode_mappings(&self.field_mapping)?;
        Ok(SyncRequest {
            label: self.label.clone(),
            operation: self.operation,
            paused: self.paused,
            field_behavior: self.field_behavior,
            source_attributes: encode_source(&self.source_attributes),
            destination_attributes: encode_destination(&self.destination_attributes),
            mappings,
        })
    }

    /// Rebuild state from an API record.
    ///
    /// With `prior`, field mappings are reconciled against it so that a read
    /// of an unchanged sync reproduces the configuration exactly.
    pub fn from_record(record: &Value, prior: Option<&SyncConfig>) -> Result<Self, ProviderError> {
        let id = record_id(record)?;

        let operation = match record.get("operation") {
            None | Some(Value::Null) => {
                return Err(ProviderError::MissingField("operation".to_string()))
            },
            Some(v) => serde_json::from_value::<SyncOperation>(v.clone()).map_err(|_| {
                ProviderError::Decode(format!("unsupported sync operation {}", v))
            })?,
        };

        let field_behavior = match record.get("field_behavior") {
            None | Some(Value::Null) => None,
            Some(v) => match serde_json::from_value::<FieldBehavior>(v.clone()) {
                Ok(behavior) => Some(behavior),
                Err(_) => {
                    warn!(sync_id = %id, value = %v, "Ignoring unknown field_behavior");
                    None
                },
            },
        };

        let mappings = match record.get("mappings") {
            Some(Value::Array(items)) => decode_mappings(items)?,
            Some(Value::Null) | None => {
                return Err(ProviderError::MissingField("mappings".to_string()))
            },
            Some(other) => {
                return Err(ProviderError::Decode(format!(
                    "mappings must be a list, got {}",
                    validation::type_name(other)
                )))
            },
        };
        let field_mapping = match prior {
            Some(prior) => reconcile_mappings(mappings, &prior.field_mapping),
            None => mappings,
        };

        let config = SyncConfig {
            label: record
                .get("label")
                .filter(|v| !v.is_null())
                .map(coerce::string_from_wire),
            operation,
            paused: coerce::bool_from_wire(record.get("paused")).unwrap_or(false),
            field_behavior,
            source_attributes: decode_source(record.get("source_attributes").unwrap_or(&Value::Null))?,
            destination_attributes: decode_destination(
                record.get("destination_attributes").unwrap_or(&Value::Null),
            )?,
            field_mapping,
            id: Some(id),
        };
        debug!(
            sync_id = config.id.as_deref().unwrap_or_default(),
            mappings = config.field_mapping.len(),
            "Decoded sync record"
        );
        Ok(config)
    }
}

/// The id of an API record, read from `id` or `sync_id`.
pub fn record_id(record: &Value) -> Result<String, ProviderError> {
    ["id", "sync_id"]
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(coerce::id_from_wire)
        .ok_or_else(|| ProviderError::MissingField("id".to_string()))
}

/// Validate raw configuration, returning every problem found.
pub fn validate_sync(config: &Value) -> Vec<Diagnostic> {
    let diagnostics = validation::validate(&sync_schema(), config);
    if !diagnostics.is_empty() {
        return diagnostics;
    }
    match SyncConfig::from_state(config) {
        Ok(sync) => match check_primary_identifier(&sync.field_mapping) {
            Ok(()) => Vec::new(),
            Err(err) => {
                let detail = "Mark exactly one field_mapping with is_primary_identifier = true";
                let flagged = match &err {
                    ProviderError::PrimaryIdentifier { indices } if indices.len() > 1 => {
                        indices.clone()
                    },
                    _ => Vec::new(),
                };
                let diagnostic = Diagnostic::from(err).with_detail(detail);
                if flagged.is_empty() {
                    vec![diagnostic]
                } else {
                    flagged
                        .iter()
                        .map(|i| diagnostic.clone().with_attribute(format!("field_mapping.{}", i)))
                        .collect()
                }
            },
        },
        Err(err) => vec![err.into()],
    }
}

/// Schema of the `census_sync` resource.
pub fn sync_schema() -> Schema {
    let object = Block::new()
        .with_attribute(
            "type",
            Attribute::required_string().one_of(SourceObject::TYPES),
        )
        .with_attribute("id", Attribute::optional_string())
        .with_attribute("table_name", Attribute::optional_string())
        .with_attribute("table_schema", Attribute::optional_string())
        .with_attribute("table_catalog", Attribute::optional_string())
        .with_attribute(
            "dataset_id",
            Attribute::optional_string().with_description("Parent dataset of a segment or cohort"),
        );

    let mapping = Block::new()
        .with_attribute("from", Attribute::optional_string())
        .with_attribute("to", Attribute::required_string())
        .with_attribute(
            "type",
            Attribute::optional_string().one_of(MappingType::ALL.iter().map(MappingType::as_str)),
        )
        .with_attribute("constant", Attribute::optional_dynamic())
        .with_attribute("sync_metadata_key", Attribute::optional_string())
        .with_attribute("segment_identify_by", Attribute::optional_string())
        .with_attribute("liquid_template", Attribute::optional_string())
        .with_attribute("is_primary_identifier", Attribute::optional_bool())
        .with_attribute("lookup_object", Attribute::optional_string())
        .with_attribute("lookup_field", Attribute::optional_string())
        .with_attribute("preserve_values", Attribute::optional_bool())
        .with_attribute("generate_field", Attribute::optional_bool())
        .with_attribute("sync_null_values", Attribute::optional_bool());

    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("label", Attribute::optional_string())
        .with_attribute(
            "operation",
            Attribute::required_string().one_of(SyncOperation::ALL),
        )
        .with_attribute("paused", Attribute::optional_bool())
        .with_attribute(
            "field_behavior",
            Attribute::optional_string().one_of(["specific_properties", "sync_all_properties"]),
        )
        .with_block(
            "source_attributes",
            NestedBlock::single(
                Block::new()
                    .with_attribute("connection_id", Attribute::required_int64().with_force_new())
                    .with_block("object", NestedBlock::single(object).with_min_items(1)),
            )
            .with_min_items(1),
        )
        .with_block(
            "destination_attributes",
            NestedBlock::single(
                Block::new()
                    .with_attribute("connection_id", Attribute::required_int64().with_force_new())
                    .with_attribute("object", Attribute::required_string()),
            )
            .with_min_items(1),
        )
        .with_block(
            "field_mapping",
            NestedBlock::list(mapping).with_min_items(1),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_error_contains;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config_json() -> Value {
        json!({
            "label": "Users to Salesforce",
            "operation": "upsert",
            "paused": false,
            "source_attributes": {
                "connection_id": 11,
                "object": {"type": "segment", "id": "42", "dataset_id": "7"}
            },
            "destination_attributes": {"connection_id": 3, "object": "Contact"},
            "field_mapping": [
                {"from": "email", "to": "Email", "type": "direct", "is_primary_identifier": true},
                {"from": "phone", "to": "Phone", "type": "hash"},
                {"to": "LeadSource", "type": "constant", "constant": "Terraform Test"},
                {"to": "Score", "type": "constant", "constant": 5, "sync_null_values": false}
            ]
        })
    }

    #[test]
    fn test_from_state_and_request() {
        let config = SyncConfig::from_state(&config_json()).unwrap();
        assert_eq!(config.operation, SyncOperation::Upsert);
        assert_eq!(config.field_mapping.len(), 4);

        let request = serde_json::to_value(config.to_request().unwrap()).unwrap();
        assert_eq!(
            request["source_attributes"],
            json!({
                "connection_id": 11,
                "object": {"type": "dataset", "id": 7},
                "filter_segment_id": 42
            })
        );
        assert_eq!(request["destination_attributes"], json!({"connection_id": 3, "object": "Contact"}));
        assert_eq!(request["mappings"][1]["from"], json!({"type": "column", "data": "phone"}));
        assert_eq!(request["mappings"][3]["sync_null_values"], json!(false));
        assert!(request.get("field_behavior").is_none());
    }

    #[test]
    fn test_record_round_trip_with_prior() {
        let config = SyncConfig::from_state(&config_json()).unwrap();
        let mut record = serde_json::to_value(config.to_request().unwrap()).unwrap();
        record["id"] = json!(99.0);

        let decoded = SyncConfig::from_record(&record, Some(&config)).unwrap();
        assert_eq!(decoded.id.as_deref(), Some("99"));
        assert_eq!(
            SyncConfig {
                id: None,
                ..decoded.clone()
            },
            config
        );

        let reread = SyncConfig::from_state(&decoded.to_state().unwrap()).unwrap();
        assert_eq!(reread, decoded);
    }

    #[test]
    fn test_from_record_without_prior() {
        let config = SyncConfig::from_state(&config_json()).unwrap();
        let mut record = serde_json::to_value(config.to_request().unwrap()).unwrap();
        record["sync_id"] = json!(5);
        record["field_behavior"] = json!("specific_properties");

        let decoded = SyncConfig::from_record(&record, None).unwrap();
        assert_eq!(decoded.id.as_deref(), Some("5"));
        assert_eq!(decoded.field_behavior, Some(FieldBehavior::SpecificProperties));
        assert_eq!(decoded.field_mapping[1], FieldMapping::direct("phone", "Phone"));
    }

    #[test]
    fn test_from_record_errors() {
        let config = SyncConfig::from_state(&config_json()).unwrap();
        let request = serde_json::to_value(config.to_request().unwrap()).unwrap();

        let err = SyncConfig::from_record(&request, None).unwrap_err();
        assert!(matches!(err, ProviderError::MissingField(p) if p == "id"));

        let mut no_mappings = request.clone();
        no_mappings["id"] = json!(1);
        no_mappings.as_object_mut().unwrap().remove("mappings");
        assert!(matches!(
            SyncConfig::from_record(&no_mappings, None),
            Err(ProviderError::MissingField(p)) if p == "mappings"
        ));

        let mut bad_operation = request.clone();
        bad_operation["id"] = json!(1);
        bad_operation["operation"] = json!("teleport");
        assert!(matches!(
            SyncConfig::from_record(&bad_operation, None),
            Err(ProviderError::Decode(_))
        ));

        let mut odd_behavior = request;
        odd_behavior["id"] = json!(1);
        odd_behavior["field_behavior"] = json!("everything");
        assert_eq!(
            SyncConfig::from_record(&odd_behavior, None).unwrap().field_behavior,
            None
        );
    }

    #[test]
    fn test_validate_sync_primary_identifier() {
        assert!(validate_sync(&config_json()).is_empty());

        let mut none = config_json();
        none["field_mapping"][0]["is_primary_identifier"] = json!(false);
        let diagnostics = validate_sync(&none);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("field_mapping".to_string()));
        assert_error_contains(&diagnostics, "found 0");

        let mut two = config_json();
        two["field_mapping"][3]["is_primary_identifier"] = json!(true);
        let diagnostics = validate_sync(&two);
        assert_error_contains(&diagnostics, "found 2 at field_mapping.0, field_mapping.3");
        let attributes: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert_eq!(attributes, vec!["field_mapping.0", "field_mapping.3"]);
    }

    #[test]
    fn test_record_with_empty_constant_reads_back() {
        let config = SyncConfig::from_state(&config_json()).unwrap();
        let mut record = serde_json::to_value(config.to_request().unwrap()).unwrap();
        record["id"] = json!(8);
        record["mappings"][2]["from"] = json!({"type": "constant_value"});

        let imported = SyncConfig::from_record(&record, None).unwrap();
        let state = imported.to_state().unwrap();
        assert_eq!(state["field_mapping"][2]["constant"], json!(""));

        let reread = SyncConfig::from_state(&state).unwrap();
        assert_eq!(reread, imported);
    }

    #[test]
    fn test_validate_sync_reports_mapping_index() {
        let mut config = config_json();
        config["field_mapping"][2]["constant"] = Value::Null;
        let diagnostics = validate_sync(&config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("field_mapping.2".to_string()));
    }

    #[test]
    fn test_validate_sync_schema_errors() {
        let mut config = config_json();
        config["operation"] = json!("merge");
        config["source_attributes"]["object"]["type"] = json!("view");
        let diagnostics = validate_sync(&config);
        let attributes: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        assert!(attributes.contains(&"operation".to_string()));
        assert!(attributes.contains(&"source_attributes.object.type".to_string()));

        let err = SyncConfig::from_state(&config).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_schema_force_new() {
        let schema = sync_schema();
        assert!(schema.block.is_force_new("source_attributes.connection_id"));
        assert!(schema.block.is_force_new("destination_attributes.connection_id"));
        assert!(!schema.block.is_force_new("field_mapping.0.to"));
        assert!(!schema.block.is_force_new("label"));
    }
}
