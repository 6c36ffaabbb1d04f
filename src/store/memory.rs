use crate::core::store::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Volatile collection backed by a HashMap; contents die with the process.
#[derive(Clone, Default)]
pub struct MemoryCollection {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self.inner.lock().await;
        let value = entries.get(key).cloned();
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Memory collection GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut entries = self.inner.lock().await;
        entries.insert(key.to_vec(), value.to_vec());
        debug!(key = %String::from_utf8_lossy(key), "Memory collection PUT");
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let mut entries = self.inner.lock().await;
        entries.remove(key);
        debug!(key = %String::from_utf8_lossy(key), "Memory collection REMOVE");
        Ok(())
    }
}
