use std::sync::Arc;

use super::pool::{Pool, PoolSpecifier};
use crate::api::{BatchAppsApi, PoolRef};
use crate::error::{BatchAppsError, Result};
use crate::models::PoolInfo;

/// Entry point for working with compute pools
pub struct PoolManager {
    api: Arc<BatchAppsApi>,
    count: Option<u64>,
}

impl PoolManager {
    pub fn new(api: Arc<BatchAppsApi>) -> Self {
        Self { api, count: None }
    }

    /// Number of pools seen on the last listing
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Specification for a new pool; call `start()` to create it
    pub fn create_pool(&self, target_size: u32, max_tasks: u32, communication: bool) -> PoolSpecifier {
        PoolSpecifier::new(Arc::clone(&self.api), target_size, max_tasks, communication)
    }

    pub async fn get_pool(&self, pool: &PoolRef) -> Result<Pool> {
        let resp = self.api.get_pool(pool).await?;
        let info: PoolInfo = serde_json::from_value(resp)?;
        Ok(Pool::new(Arc::clone(&self.api), info))
    }

    /// All pools of the account
    pub async fn get_pools(&mut self) -> Result<Vec<Pool>> {
        let list = self.api.list_pools().await?;
        self.count = Some(list.total_count);

        list.pools
            .into_iter()
            .map(|value| {
                serde_json::from_value::<PoolInfo>(value)
                    .map(|info| Pool::new(Arc::clone(&self.api), info))
                    .map_err(|e| {
                        BatchAppsError::InvalidResponse(format!(
                            "Malformed pool response object: {}",
                            e
                        ))
                    })
            })
            .collect()
    }

    /// Delete every pool, returning those that could not be deleted
    pub async fn clear_pools(&mut self) -> Result<Vec<(Pool, BatchAppsError)>> {
        let pools = self.get_pools().await?;
        let mut undeleted = Vec::new();

        for pool in pools {
            if let Err(e) = pool.delete().await {
                tracing::warn!("Failed to delete pool {}: {}", pool, e);
                undeleted.push((pool, e));
            }
        }

        self.count = Some(undeleted.len() as u64);
        Ok(undeleted)
    }
}
