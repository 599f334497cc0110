//! Storage backend traits

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Timestamp format used in JSON listings
pub const LISTING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Container not found: {account}/{container}")]
    ContainerNotFound { account: String, container: String },

    #[error("Object not found: {container}/{object}")]
    ObjectNotFound { container: String, object: String },

    #[error("Container not empty: {0}")]
    ContainerNotEmpty(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Status the internal API answers with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ContainerNotFound { .. } | Self::ObjectNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ContainerNotEmpty(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Listing window: `limit` entries strictly after `marker`, optionally
/// restricted to `prefix` and rolled up at `delimiter`
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: usize,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 10_000,
            marker: None,
            end_marker: None,
            prefix: None,
            delimiter: None,
        }
    }
}

/// An object record in a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub name: String,
    pub hash: String,
    pub bytes: u64,
    pub content_type: String,
    pub last_modified: String,
}

/// One row of a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ListingEntry {
    Object(ObjectSummary),
    Subdir { subdir: String },
}

impl ListingEntry {
    /// Object name or rolled-up prefix
    pub fn name(&self) -> &str {
        match self {
            Self::Object(object) => &object.name,
            Self::Subdir { subdir } => subdir,
        }
    }
}

/// A container record in an account listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub name: String,
    pub count: u64,
    pub bytes: u64,
    pub last_modified: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub container_count: u64,
    pub object_count: u64,
    pub bytes_used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    pub object_count: u64,
    pub bytes_used: u64,
}

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub etag: String,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// Backend for the internal account/container/object API
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    // === Account operations ===

    async fn list_containers(
        &self,
        account: &str,
        query: &ListQuery,
    ) -> Result<Vec<ContainerSummary>, StorageError>;

    async fn account_stats(&self, account: &str) -> AccountStats;

    // === Container operations ===

    /// Create a container. Returns `false` when it already existed.
    async fn create_container(&self, account: &str, container: &str) -> Result<bool, StorageError>;

    async fn container_stats(
        &self,
        account: &str,
        container: &str,
    ) -> Result<ContainerStats, StorageError>;

    async fn delete_container(&self, account: &str, container: &str) -> Result<(), StorageError>;

    async fn list_objects(
        &self,
        account: &str,
        container: &str,
        query: &ListQuery,
    ) -> Result<Vec<ListingEntry>, StorageError>;

    // === Object operations ===

    async fn put_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn get_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn delete_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<(), StorageError>;
}
