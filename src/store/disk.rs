use crate::core::store::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use tracing::debug;

/// Collection stored in a `fjall` partition.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .partition
            .get(key)
            .with_context(|| format!("Failed to read key {}", String::from_utf8_lossy(key)))?
            .map(|slice| slice.to_vec());
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Disk collection GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.partition
            .insert(key, value)
            .with_context(|| format!("Failed to write key {}", String::from_utf8_lossy(key)))?;
        debug!(key = %String::from_utf8_lossy(key), "Disk collection PUT");
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.partition
            .remove(key)
            .with_context(|| format!("Failed to remove key {}", String::from_utf8_lossy(key)))?;
        debug!(key = %String::from_utf8_lossy(key), "Disk collection REMOVE");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist keyspace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::PartitionCreateOptions;
    use tempfile::tempdir;

    fn open(path: &std::path::Path) -> DiskCollection {
        let keyspace = fjall::Config::new(path).open().unwrap();
        let partition = keyspace
            .open_partition("filters", PartitionCreateOptions::default())
            .unwrap();
        DiskCollection::new(keyspace, partition)
    }

    #[tokio::test]
    async fn test_disk_get_put_remove() {
        let dir = tempdir().unwrap();
        let collection = open(dir.path());

        assert!(collection.get(b"maxAmount").await.unwrap().is_none());

        collection.put(b"maxAmount", b"250.5").await.unwrap();
        collection.flush().await.unwrap();
        assert_eq!(
            collection.get(b"maxAmount").await.unwrap(),
            Some(b"250.5".to_vec())
        );

        collection.remove(b"maxAmount").await.unwrap();
        assert!(collection.get(b"maxAmount").await.unwrap().is_none());
    }
}
