//! The seam between the provider and the Census sync endpoints.
//!
//! [`SyncApi`] takes encoded request bodies and returns raw API records;
//! all translation to and from state happens in [`crate::sync`]. The
//! provider is generic over it so tests can run against
//! [`crate::testing::MemorySyncApi`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::sync::SyncRequest;

/// Sync CRUD calls against the Census API.
#[async_trait]
pub trait SyncApi: Send + Sync + 'static {
    /// Create a sync and return the stored record.
    async fn create_sync(&self, request: &SyncRequest) -> Result<Value, ProviderError>;

    /// Fetch a sync record. `Ok(None)` when it does not exist.
    async fn get_sync(&self, id: &str) -> Result<Option<Value>, ProviderError>;

    /// Replace a sync's settings and return the stored record.
    async fn update_sync(&self, id: &str, request: &SyncRequest) -> Result<Value, ProviderError>;

    /// Delete a sync. Deleting a missing sync is not an error.
    async fn delete_sync(&self, id: &str) -> Result<(), ProviderError>;
}
