//! In-memory storage backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

use crate::traits::{
    AccountStats, ContainerStats, ContainerSummary, ListQuery, ListingEntry, ObjectStorage,
    ObjectSummary, StorageError, StoredObject, LISTING_TIME_FORMAT,
};

/// In-memory container; objects are kept sorted by name
struct MemoryContainer {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    last_modified: RwLock<DateTime<Utc>>,
}

impl MemoryContainer {
    fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            last_modified: RwLock::new(Utc::now()),
        }
    }

    fn stats(&self) -> ContainerStats {
        let objects = self.objects.read();
        ContainerStats {
            object_count: objects.len() as u64,
            bytes_used: objects.values().map(|o| o.data.len() as u64).sum(),
        }
    }
}

#[derive(Default)]
struct MemoryAccount {
    containers: RwLock<BTreeMap<String, Arc<MemoryContainer>>>,
}

/// Ephemeral (in-memory) storage backend.
///
/// Accounts spring into existence on first use.
#[derive(Default)]
pub struct MemoryStorage {
    accounts: DashMap<String, Arc<MemoryAccount>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn account(&self, account: &str) -> Arc<MemoryAccount> {
        self.accounts
            .entry(account.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn container(&self, account: &str, container: &str) -> Result<Arc<MemoryContainer>, StorageError> {
        let found = self.accounts.get(account).and_then(|account_ref| {
            let containers = account_ref.containers.read();
            containers.get(container).cloned()
        });
        found.ok_or_else(|| container_not_found(account, container))
    }

    fn existing_account(&self, account: &str, container: &str) -> Result<Arc<MemoryAccount>, StorageError> {
        self.accounts
            .get(account)
            .map(|account_ref| account_ref.value().clone())
            .ok_or_else(|| container_not_found(account, container))
    }
}

fn container_not_found(account: &str, container: &str) -> StorageError {
    StorageError::ContainerNotFound {
        account: account.to_string(),
        container: container.to_string(),
    }
}

/// Entry selected for a listing page
enum Selected<'a, V> {
    Entry(&'a str, &'a V),
    Subdir(String),
}

/// Walk `entries` in name order applying marker, prefix, delimiter and
/// limit the way every internal listing does.
///
/// Rolled-up prefixes count towards the limit and are emitted once, and
/// never when they sort at or before the marker.
fn select<'a, V>(entries: &'a BTreeMap<String, V>, query: &ListQuery) -> Vec<Selected<'a, V>> {
    let marker = query.marker.as_deref().filter(|m| !m.is_empty());
    let start = marker.map_or(Bound::Unbounded, Bound::Excluded);
    let prefix = query.prefix.as_deref().unwrap_or("");
    let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());

    let mut page = Vec::new();
    let mut last_subdir: Option<String> = None;
    for (name, value) in entries.range::<str, _>((start, Bound::Unbounded)) {
        if page.len() >= query.limit {
            break;
        }
        if query
            .end_marker
            .as_deref()
            .is_some_and(|end| name.as_str() >= end)
        {
            break;
        }
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };

        let rolled_up = delimiter
            .and_then(|d| rest.find(d).map(|at| &name[..prefix.len() + at + d.len()]));
        match rolled_up {
            Some(subdir) => {
                if last_subdir.as_deref() == Some(subdir) || marker.is_some_and(|m| subdir <= m) {
                    continue;
                }
                last_subdir = Some(subdir.to_string());
                page.push(Selected::Subdir(subdir.to_string()));
            }
            None => page.push(Selected::Entry(name, value)),
        }
    }
    page
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn list_containers(
        &self,
        account: &str,
        query: &ListQuery,
    ) -> Result<Vec<ContainerSummary>, StorageError> {
        let Some(account_ref) = self.accounts.get(account).map(|a| a.value().clone()) else {
            return Ok(Vec::new());
        };
        let containers = account_ref.containers.read();

        let listing = select(&*containers, query)
            .into_iter()
            .map(|selected| match selected {
                Selected::Entry(name, container) => {
                    let stats = container.stats();
                    ContainerSummary {
                        name: name.to_string(),
                        count: stats.object_count,
                        bytes: stats.bytes_used,
                        last_modified: container
                            .last_modified
                            .read()
                            .format(LISTING_TIME_FORMAT)
                            .to_string(),
                    }
                }
                Selected::Subdir(subdir) => ContainerSummary {
                    name: subdir,
                    count: 0,
                    bytes: 0,
                    last_modified: String::new(),
                },
            })
            .collect();
        Ok(listing)
    }

    async fn account_stats(&self, account: &str) -> AccountStats {
        let Some(account_ref) = self.accounts.get(account).map(|a| a.value().clone()) else {
            return AccountStats::default();
        };
        let containers = account_ref.containers.read();
        containers.values().fold(
            AccountStats {
                container_count: containers.len() as u64,
                ..AccountStats::default()
            },
            |mut stats, container| {
                let container_stats = container.stats();
                stats.object_count += container_stats.object_count;
                stats.bytes_used += container_stats.bytes_used;
                stats
            },
        )
    }

    async fn create_container(&self, account: &str, container: &str) -> Result<bool, StorageError> {
        let account_ref = self.account(account);
        let mut containers = account_ref.containers.write();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), Arc::new(MemoryContainer::new()));
        debug!(account = %account, container = %container, "Created container");
        Ok(true)
    }

    async fn container_stats(
        &self,
        account: &str,
        container: &str,
    ) -> Result<ContainerStats, StorageError> {
        Ok(self.container(account, container)?.stats())
    }

    async fn delete_container(&self, account: &str, container: &str) -> Result<(), StorageError> {
        let account_ref = self.existing_account(account, container)?;
        // Writers hold the read side while storing, so nothing lands between
        // the emptiness check and the removal
        let mut containers = account_ref.containers.write();
        let Some(container_ref) = containers.get(container) else {
            return Err(container_not_found(account, container));
        };
        if !container_ref.objects.read().is_empty() {
            return Err(StorageError::ContainerNotEmpty(container.to_string()));
        }
        containers.remove(container);
        debug!(account = %account, container = %container, "Deleted container");
        Ok(())
    }

    async fn list_objects(
        &self,
        account: &str,
        container: &str,
        query: &ListQuery,
    ) -> Result<Vec<ListingEntry>, StorageError> {
        let container_ref = self.container(account, container)?;
        let objects = container_ref.objects.read();

        let listing = select(&*objects, query)
            .into_iter()
            .map(|selected| match selected {
                Selected::Entry(name, object) => ListingEntry::Object(ObjectSummary {
                    name: name.to_string(),
                    hash: object.etag.clone(),
                    bytes: object.data.len() as u64,
                    content_type: object.content_type.clone(),
                    last_modified: object.last_modified.format(LISTING_TIME_FORMAT).to_string(),
                }),
                Selected::Subdir(subdir) => ListingEntry::Subdir { subdir },
            })
            .collect();
        Ok(listing)
    }

    async fn put_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let account_ref = self.existing_account(account, container)?;
        let containers = account_ref.containers.read();
        let container_ref = containers
            .get(container)
            .ok_or_else(|| container_not_found(account, container))?;

        let stored = StoredObject {
            etag: Self::compute_etag(&data),
            data,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        container_ref
            .objects
            .write()
            .insert(object.to_string(), stored.clone());
        *container_ref.last_modified.write() = stored.last_modified;

        debug!(
            container = %container,
            object = %object,
            size = stored.data.len(),
            "Stored object"
        );
        Ok(stored)
    }

    async fn get_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<StoredObject, StorageError> {
        let container_ref = self.container(account, container)?;
        let objects = container_ref.objects.read();
        objects
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                container: container.to_string(),
                object: object.to_string(),
            })
    }

    async fn delete_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<(), StorageError> {
        let container_ref = self.container(account, container)?;
        let removed = container_ref.objects.write().remove(object);
        if removed.is_none() {
            return Err(StorageError::ObjectNotFound {
                container: container.to_string(),
                object: object.to_string(),
            });
        }
        *container_ref.last_modified.write() = Utc::now();
        Ok(())
    }
}
