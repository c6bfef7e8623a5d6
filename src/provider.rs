//! The engine-facing provider surface.
//!
//! [`ProviderService`] is the trait the orchestrating engine drives, using
//! plain JSON for configuration and state. [`CensusProvider`] implements it
//! for the `census_sync` resource on top of a [`SyncApi`].

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::api::SyncApi;
use crate::coerce;
use crate::config::{provider_schema, ProviderConfig};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::sync::{sync_schema, validate_sync, SyncConfig};
use crate::types::{diff, ImportedResource, PlanResult};
use crate::validation;

/// Resource type name of a sync.
pub const SYNC_RESOURCE: &str = "census_sync";

/// Trait that provider implementations must implement.
///
/// Configuration and state cross this boundary as `serde_json::Value`;
/// implementations validate and type them before doing any work.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Names of the resource types this provider serves.
    fn resource_types(&self) -> Vec<String> {
        self.schema().resources.keys().cloned().collect()
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&self.schema().provider, &config))
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match self.schema().resources.get(resource_type) {
            Some(schema) => Ok(validation::validate(schema, &config)),
            None => Err(ProviderError::UnknownResource(resource_type.to_string())),
        }
    }

    /// Plan changes for a resource. A `null` proposed state plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Provider for Census syncs.
pub struct CensusProvider<A: SyncApi> {
    api: A,
    config: RwLock<Option<ProviderConfig>>,
}

impl<A: SyncApi> CensusProvider<A> {
    /// Create an unconfigured provider backed by `api`.
    pub fn new(api: A) -> Self {
        Self {
            api,
            config: RwLock::new(None),
        }
    }

    /// The API collaborator.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// The stored provider configuration, once configured.
    pub async fn config(&self) -> Option<ProviderConfig> {
        self.config.read().await.clone()
    }

    async fn require_configured(&self) -> Result<(), ProviderError> {
        if self.config.read().await.is_some() {
            Ok(())
        } else {
            Err(ProviderError::Configuration(
                "provider must be configured before managing resources".to_string(),
            ))
        }
    }

    fn check_resource(resource_type: &str) -> Result<(), ProviderError> {
        if resource_type == SYNC_RESOURCE {
            Ok(())
        } else {
            Err(ProviderError::UnknownResource(resource_type.to_string()))
        }
    }

    fn state_id(config: &SyncConfig) -> Result<&str, ProviderError> {
        config
            .id
            .as_deref()
            .ok_or_else(|| ProviderError::Validation("sync state has no id".to_string()))
    }
}

#[async_trait::async_trait]
impl<A: SyncApi> ProviderService for CensusProvider<A> {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_schema())
            .with_resource(SYNC_RESOURCE, sync_schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(match ProviderConfig::from_value(&config) {
            Ok(_) => Vec::new(),
            Err(err) => vec![err.into()],
        })
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let parsed = match ProviderConfig::from_value(&config) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(vec![err.into()]),
        };

        let mut diagnostics = Vec::new();
        if parsed.access_token.is_none() {
            warn!("No access_token configured");
            diagnostics.push(
                Diagnostic::warning("No access_token configured")
                    .with_detail("API calls will be made without credentials")
                    .with_attribute("access_token"),
            );
        }
        info!(base_url = parsed.base_url(), "Configured Census provider");
        *self.config.write().await = Some(parsed);
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping Census provider");
        *self.config.write().await = None;
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Self::check_resource(resource_type)?;
        Ok(validate_sync(&config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        Self::check_resource(resource_type)?;

        let prior = match prior_state.filter(|s| !s.is_null()) {
            Some(state) => Some(SyncConfig::from_state(&state)?),
            None => None,
        };

        if proposed_state.is_null() {
            return Ok(match prior {
                Some(prior) => {
                    let changes = diff(&prior.to_state()?, &Value::Null);
                    PlanResult::with_changes(Value::Null, changes, false)
                },
                None => PlanResult::no_change(Value::Null),
            });
        }

        let mut planned = SyncConfig::from_state(&proposed_state)?;
        // Surface mapping invariant violations at plan time.
        planned.to_request()?;

        let Some(prior) = prior else {
            planned.id = None;
            let state = planned.to_state()?;
            let changes = diff(&Value::Null, &state);
            debug!(changes = changes.len(), "Planned sync creation");
            return Ok(PlanResult::with_changes(state, changes, false));
        };

        planned.id = prior.id.clone();
        let prior_state = prior.to_state()?;
        let changes = diff(&prior_state, &planned.to_state()?);
        if changes.is_empty() {
            return Ok(PlanResult::no_change(prior_state));
        }

        let schema = sync_schema();
        let requires_replace = changes.iter().any(|c| schema.block.is_force_new(&c.path));
        if requires_replace {
            planned.id = None;
        }
        debug!(changes = changes.len(), requires_replace, "Planned sync update");
        Ok(PlanResult::with_changes(
            planned.to_state()?,
            changes,
            requires_replace,
        ))
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        Self::check_resource(resource_type)?;
        self.require_configured().await?;

        let planned = SyncConfig::from_state(&planned_state)?;
        let request = planned.to_request()?;
        let record = self.api.create_sync(&request).await?;
        let created = SyncConfig::from_record(&record, Some(&planned))?;

        info!(sync_id = created.id.as_deref().unwrap_or_default(), "Created sync");
        created.to_state()
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        Self::check_resource(resource_type)?;
        self.require_configured().await?;

        let current = SyncConfig::from_state(&current_state)?;
        let id = Self::state_id(&current)?;
        let record = self
            .api
            .get_sync(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("sync {}", id)))?;

        SyncConfig::from_record(&record, Some(&current))?.to_state()
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        Self::check_resource(resource_type)?;
        self.require_configured().await?;

        let prior = SyncConfig::from_state(&prior_state)?;
        let id = Self::state_id(&prior)?;
        let planned = SyncConfig::from_state(&planned_state)?;
        let request = planned.to_request()?;
        let record = self.api.update_sync(id, &request).await?;
        let updated = SyncConfig::from_record(&record, Some(&planned))?;

        info!(sync_id = id, "Updated sync");
        updated.to_state()
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        Self::check_resource(resource_type)?;
        self.require_configured().await?;

        let id = current_state
            .get("id")
            .and_then(coerce::id_from_wire)
            .ok_or_else(|| ProviderError::Validation("sync state has no id".to_string()))?;
        self.api.delete_sync(&id).await?;

        info!(sync_id = %id, "Deleted sync");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Self::check_resource(resource_type)?;
        self.require_configured().await?;

        let record = self
            .api
            .get_sync(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("sync {}", id)))?;
        let state = SyncConfig::from_record(&record, None)?.to_state()?;

        info!(sync_id = id, "Imported sync");
        Ok(vec![ImportedResource::new(SYNC_RESOURCE, state)])
    }
}
