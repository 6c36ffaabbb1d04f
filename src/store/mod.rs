pub mod disk;
pub mod memory;

use crate::core::store::{KeyValueCollection, Store};
use anyhow::{Context, Result};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::debug;

/// Local key/value store holding named collections.
///
/// Opened on a directory, collections are `fjall` partitions that survive a
/// restart. Created with [`KeyValueStore::in_memory`] they are plain maps.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        debug!("Opened key/value store at {}", path.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(keyspace),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }
}

impl Store for KeyValueStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(existing));
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(keyspace) => {
                let partition = keyspace
                    .open_partition(name, PartitionCreateOptions::default())
                    .with_context(|| format!("Failed to open collection: {name}"))?;
                Arc::new(DiskCollection::new(keyspace.clone(), partition))
            }
            None => Arc::new(MemoryCollection::new()),
        };
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}
