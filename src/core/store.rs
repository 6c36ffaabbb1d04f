//! Key/value persistence abstractions

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A named bucket of byte keys and values.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    async fn remove(&self, key: &[u8]) -> Result<()>;
    /// Makes previous writes durable. A no-op for volatile collections.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub trait Store: Send + Sync {
    /// Opens `name`, creating it when missing.
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>>;
}
