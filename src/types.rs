//! Plan and import result types, and the state diff behind them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Dot-separated attribute path, list indices included.
    pub path: String,
    /// The value before the change (`None` when the attribute is added).
    pub before: Option<Value>,
    /// The value after the change (`None` when the attribute is removed).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// An attribute that is being set.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// An attribute that is being cleared.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// An attribute whose value changes.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The state expected after apply. `null` when the resource is destroyed.
    pub planned_state: Value,
    /// Attribute-level changes against the prior state.
    pub changes: Vec<AttributeChange>,
    /// Whether the remote object must be destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying this plan would do anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.requires_replace
    }
}

/// An existing remote object brought under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Compute leaf-level changes between two states.
///
/// `null` and an absent key are the same thing. Objects are compared key by
/// key, lists of equal length element by element; a list whose length
/// changes is reported as one change on the list itself.
pub fn diff(before: &Value, after: &Value) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    diff_at("", before, after, &mut changes);
    changes
}

fn diff_at(path: &str, before: &Value, after: &Value, changes: &mut Vec<AttributeChange>) {
    let empty = Map::new();
    match (before, after) {
        (Value::Object(_) | Value::Null, Value::Object(_) | Value::Null)
            if before.is_object() || after.is_object() =>
        {
            let before = before.as_object().unwrap_or(&empty);
            let after = after.as_object().unwrap_or(&empty);
            let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                diff_at(
                    &child_path(path, key),
                    before.get(key).unwrap_or(&Value::Null),
                    after.get(key).unwrap_or(&Value::Null),
                    changes,
                );
            }
        },
        (Value::Array(b), Value::Array(a)) if b.len() == a.len() => {
            for (i, (b, a)) in b.iter().zip(a).enumerate() {
                diff_at(&child_path(path, &i.to_string()), b, a, changes);
            }
        },
        (b, a) if b == a => {},
        (Value::Null, a) => changes.push(AttributeChange::added(path, a.clone())),
        (b, Value::Null) => changes.push(AttributeChange::removed(path, b.clone())),
        (b, a) => changes.push(AttributeChange::modified(path, b.clone(), a.clone())),
    }
}

fn child_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("label", json!("nightly"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("nightly")));

        let removed = AttributeChange::removed("label", json!("old"));
        assert_eq!(removed.before, Some(json!("old")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("paused", json!(false), json!(true));
        assert_eq!(modified.before, Some(json!(false)));
        assert_eq!(modified.after, Some(json!(true)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "123"}));
        assert!(!no_change.has_changes());

        let replace = PlanResult::with_changes(json!({}), vec![], true);
        assert!(replace.has_changes());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("census_sync", json!({"id": "42"}));
        assert_eq!(imported.resource_type, "census_sync");
        assert_eq!(imported.state["id"], "42");
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let state = json!({"label": "a", "field_mapping": [{"to": "Email"}]});
        assert!(diff(&state, &state.clone()).is_empty());
    }

    #[test]
    fn test_diff_null_equals_absent() {
        assert!(diff(&json!({"label": null}), &json!({})).is_empty());
    }

    #[test]
    fn test_diff_leaf_paths() {
        let before = json!({
            "label": "a",
            "paused": false,
            "source_attributes": {"connection_id": 1},
            "field_mapping": [{"to": "Email", "from": "email"}]
        });
        let after = json!({
            "label": null,
            "paused": true,
            "source_attributes": {"connection_id": 2},
            "field_mapping": [{"to": "Email", "from": "mail"}],
            "field_behavior": "sync_all_properties"
        });

        let changes = diff(&before, &after);
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "field_behavior",
                "field_mapping.0.from",
                "label",
                "paused",
                "source_attributes.connection_id"
            ]
        );
        assert_eq!(changes[0], AttributeChange::added("field_behavior", json!("sync_all_properties")));
        assert_eq!(changes[2], AttributeChange::removed("label", json!("a")));
    }

    #[test]
    fn test_diff_list_length_change() {
        let changes = diff(&json!({"tags": ["a"]}), &json!({"tags": ["a", "b"]}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "tags");
    }

    #[test]
    fn test_diff_against_null_lists_every_leaf() {
        let state = json!({"id": "1", "destination_attributes": {"object": "Contact"}});
        let created = diff(&Value::Null, &state);
        let paths: Vec<_> = created.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["destination_attributes.object", "id"]);
        assert!(created.iter().all(|c| c.before.is_none()));

        let destroyed = diff(&state, &Value::Null);
        assert!(destroyed.iter().all(|c| c.after.is_none()));
        assert_eq!(destroyed.len(), 2);
    }
}
