//! Census Provider
//!
//! The sync resource of an infrastructure-as-code provider for
//! [Census](https://www.getcensus.com), the reverse-ETL service. The heart of
//! the crate is the translation between a sync's declarative configuration
//! and the JSON the Census API speaks, in both directions, such that reading
//! back an unchanged sync produces exactly the configured state.
//!
//! # Overview
//!
//! - **Field mappings** ([`mapping`]): the flat `field_mapping` blocks
//!   (`direct`, `hash`, `constant`, `sync_metadata`, `segment_membership`,
//!   `liquid_template`) and their tagged `{type, data}` wire form
//! - **Source objects** ([`object`]): tables, datasets, models, topics,
//!   segments and cohorts, including the dataset-plus-filter encoding of
//!   segments and cohorts
//! - **Sync resource** ([`sync`]): the typed resource state, request body
//!   and schema
//! - **Provider** ([`provider`]): the [`ProviderService`] trait and
//!   [`CensusProvider`], which drives a [`SyncApi`]
//! - **Schema & validation**: attribute schemas and the diagnostics raised
//!   when raw JSON does not match them
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use census_provider::{CensusProvider, ProviderService, SYNC_RESOURCE};
//! use serde_json::json;
//!
//! let provider = CensusProvider::new(my_api);
//! provider.configure(json!({"access_token": token})).await?;
//!
//! let plan = provider.plan(SYNC_RESOURCE, None, config.clone(), config).await?;
//! let state = provider.create(SYNC_RESOURCE, plan.planned_state).await?;
//! ```
//!
//! # Round trips
//!
//! The wire form is lossy: `hash` mappings come back as plain columns and
//! constants come back as text. [`SyncConfig::from_record`] therefore takes
//! the configured sync and restores those details when the wire data agrees
//! with it, so a refresh does not show drift.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod coerce;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod object;
pub mod provider;
pub mod schema;
pub mod sync;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use api::SyncApi;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use mapping::{FieldMapping, MappingAttribute, MappingSource, MappingType};
pub use object::{DestinationAttributes, SourceAttributes, SourceObject};
pub use provider::{CensusProvider, ProviderService, SYNC_RESOURCE};
pub use schema::ProviderSchema;
pub use sync::{FieldBehavior, SyncConfig, SyncOperation, SyncRequest};
pub use types::{AttributeChange, ImportedResource, PlanResult};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
