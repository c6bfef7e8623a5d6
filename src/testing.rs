//! Testing utilities for the Census provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without an engine, and
//! [`MemorySyncApi`] stands in for the Census API. The in-memory API answers
//! the way the real one does: ids come back as floats, datasets as
//! `business_object_source` objects and segments with a
//! `filter_segment_source`, so the decode paths are exercised.
//!
//! # Example
//!
//! ```ignore
//! use census_provider::testing::{MemorySyncApi, ProviderTester};
//! use census_provider::{CensusProvider, SYNC_RESOURCE};
//!
//! #[tokio::test]
//! async fn test_create_sync() {
//!     let tester = ProviderTester::new(CensusProvider::new(MemorySyncApi::new()));
//!     tester.configure(json!({"access_token": "test"})).await.unwrap();
//!
//!     let state = tester.lifecycle_create(SYNC_RESOURCE, config).await.unwrap();
//!     assert!(state["id"].is_string());
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::SyncApi;
use crate::error::ProviderError;
use crate::mapping::{decode_mappings, encode_mappings, reconcile_mappings, FieldMapping};
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::sync::SyncRequest;
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.resource_types()
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// In-memory API
// =========================================================================

#[derive(Default)]
struct MemoryStore {
    next_id: u64,
    syncs: BTreeMap<String, Value>,
    failure: Option<String>,
}

/// An in-memory [`SyncApi`] that stores records the way the Census API
/// returns them.
#[derive(Default)]
pub struct MemorySyncApi {
    store: Mutex<MemoryStore>,
}

impl MemorySyncApi {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with [`ProviderError::Api`].
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.store.lock().await.failure = Some(message.into());
    }

    /// Store a raw record under `id`, replacing any existing one.
    pub async fn insert_record(&self, id: impl Into<String>, record: Value) {
        self.store.lock().await.syncs.insert(id.into(), record);
    }

    /// The raw record stored under `id`.
    pub async fn record(&self, id: &str) -> Option<Value> {
        self.store.lock().await.syncs.get(id).cloned()
    }

    /// Number of stored syncs.
    pub async fn len(&self) -> usize {
        self.store.lock().await.syncs.len()
    }

    /// Whether no syncs are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn to_record(id: u64, request: &SyncRequest) -> Result<Value, ProviderError> {
        let mut record = serde_json::to_value(request)?;
        record["id"] = Value::from(id as f64);

        let source = &mut record["source_attributes"];
        if source.get("filter_segment_id").is_some() {
            source["filter_segment_source"] = Value::from("segment");
        }
        if let Some(object) = source.get_mut("object").and_then(Value::as_object_mut) {
            if object.get("type").and_then(Value::as_str) == Some("dataset") {
                object.insert("type".into(), Value::from("business_object_source"));
                if let Some(dataset_id) = object.remove("id") {
                    object.insert("dataset_id".into(), dataset_id);
                }
            }
        }
        Ok(record)
    }
}

impl MemoryStore {
    fn check_failure(&mut self) -> Result<(), ProviderError> {
        match self.failure.take() {
            Some(message) => Err(ProviderError::Api(message)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SyncApi for MemorySyncApi {
    async fn create_sync(&self, request: &SyncRequest) -> Result<Value, ProviderError> {
        let mut store = self.store.lock().await;
        store.check_failure()?;
        store.next_id += 1;
        let id = store.next_id;
        let record = Self::to_record(id, request)?;
        store.syncs.insert(id.to_string(), record.clone());
        debug!(sync_id = id, "Stored sync in memory");
        Ok(record)
    }

    async fn get_sync(&self, id: &str) -> Result<Option<Value>, ProviderError> {
        let mut store = self.store.lock().await;
        store.check_failure()?;
        Ok(store.syncs.get(id).cloned())
    }

    async fn update_sync(&self, id: &str, request: &SyncRequest) -> Result<Value, ProviderError> {
        let mut store = self.store.lock().await;
        store.check_failure()?;
        if !store.syncs.contains_key(id) {
            return Err(ProviderError::NotFound(format!("sync {}", id)));
        }
        let numeric = id
            .parse::<u64>()
            .map_err(|_| ProviderError::Api(format!("invalid sync id '{}'", id)))?;
        let record = Self::to_record(numeric, request)?;
        store.syncs.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_sync(&self, id: &str) -> Result<(), ProviderError> {
        let mut store = self.store.lock().await;
        store.check_failure()?;
        store.syncs.remove(id);
        Ok(())
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a mapping list survives encode → decode → reconcile intact.
///
/// # Panics
///
/// Panics if encoding fails or the reconciled list differs from `mappings`.
pub fn assert_mappings_round_trip(mappings: &[FieldMapping]) {
    let encoded = match encode_mappings(mappings) {
        Ok(encoded) => encoded,
        Err(err) => panic!("Expected mappings to encode, but got: {}", err),
    };
    let wire: Vec<Value> = encoded
        .iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();
    let decoded = match decode_mappings(&wire) {
        Ok(decoded) => decoded,
        Err(err) => panic!("Expected wire mappings to decode, but got: {}", err),
    };
    let reconciled = reconcile_mappings(decoded, mappings);
    assert_eq!(
        reconciled, mappings,
        "Mappings changed across a round trip through the wire form {:?}",
        wire
    );
}

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not. Changed attributes: {:?}",
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan changes something without replacing the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
