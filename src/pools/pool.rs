use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use crate::api::{BatchAppsApi, PoolRef};
use crate::error::Result;
use crate::models::{CertificateReference, PoolInfo};

/// Maximum number of certificates on a pool
pub const MAX_CERTIFICATES: usize = 10;

/// A compute pool in the cloud
#[derive(Clone)]
pub struct Pool {
    api: Arc<BatchAppsApi>,
    pub id: Option<String>,
    pub created: Option<String>,
    pub auto: bool,
    pub target_size: u32,
    pub current_size: u32,
    pub state: Option<String>,
    pub allocation_state: Option<String>,
    pub max_tasks: u32,
    pub resize_error: String,
    pub communication: bool,
    pub certificates: Vec<CertificateReference>,
    pub jobs: Vec<Value>,
    pub url: Option<String>,
}

impl Pool {
    pub fn new(api: Arc<BatchAppsApi>, info: PoolInfo) -> Self {
        Self {
            api,
            id: info.id,
            created: info.creation_time,
            auto: info.auto_pool,
            target_size: info.target_dedicated,
            current_size: info.current_dedicated,
            state: info.state,
            allocation_state: info.allocation_state,
            max_tasks: info.max_tasks_per_tvm,
            resize_error: info.resize_error.unwrap_or_default(),
            communication: info.communication,
            certificates: info.certificate_references,
            jobs: info.active_jobs,
            url: info.pool_detail_link.href,
        }
    }

    fn pool_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Delete the pool
    pub async fn delete(&self) -> Result<()> {
        self.api.delete_pool(self.pool_id()).await?;
        tracing::info!("Deleted pool {}", self.pool_id());
        Ok(())
    }

    /// Request a new target size, then refresh the pool
    pub async fn resize(&mut self, target: u32) -> Result<()> {
        self.api.resize_pool(self.pool_id(), target).await?;
        tracing::info!("Initiated pool resize to new target: {}", target);
        self.update().await
    }

    /// Refresh the pool's state from the service
    pub async fn update(&mut self) -> Result<()> {
        let resp = self
            .api
            .get_pool(&PoolRef::Id(self.pool_id().to_string()))
            .await?;
        let info: PoolInfo = serde_json::from_value(resp)?;

        self.created = info.creation_time;
        self.target_size = info.target_dedicated;
        self.current_size = info.current_dedicated;
        self.state = info.state;
        self.allocation_state = info.allocation_state;
        self.resize_error = info.resize_error.unwrap_or_default();
        self.jobs = info.jobs;
        tracing::info!("Updated pool reference.");
        Ok(())
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.created == other.created
            && self.max_tasks == other.max_tasks
            && self.target_size == other.target_size
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("created", &self.created)
            .field("target_size", &self.target_size)
            .field("current_size", &self.current_size)
            .field("state", &self.state)
            .field("allocation_state", &self.allocation_state)
            .field("max_tasks", &self.max_tasks)
            .finish()
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} / {} TVMs, {})",
            self.pool_id(),
            self.current_size,
            self.target_size,
            self.state.as_deref().unwrap_or("unknown")
        )
    }
}

/// Reference to a newly created pool
#[derive(Debug, Clone, PartialEq)]
pub struct StartedPool {
    pub id: String,
    pub link: Option<String>,
}

/// Specification of a pool yet to be created
#[derive(Clone)]
pub struct PoolSpecifier {
    api: Arc<BatchAppsApi>,
    pub target_size: u32,
    pub max_tasks: u32,
    pub communication: bool,
    pub certificates: Vec<CertificateReference>,
}

impl PoolSpecifier {
    pub fn new(api: Arc<BatchAppsApi>, target_size: u32, max_tasks: u32, communication: bool) -> Self {
        Self {
            api,
            target_size,
            max_tasks,
            communication,
            certificates: Vec::new(),
        }
    }

    /// Add a certificate to install on the pool's VMs
    ///
    /// Returns false once the certificate limit is reached.
    pub fn add_cert(
        &mut self,
        thumbprint: &str,
        algorithm: Option<&str>,
        store_location: Option<&str>,
        store_name: Option<&str>,
    ) -> bool {
        if self.certificates.len() >= MAX_CERTIFICATES {
            tracing::warn!("Max number of certificates has been reached.");
            return false;
        }
        self.certificates.push(CertificateReference {
            thumbprint: thumbprint.to_string(),
            thumbprint_algorithm: algorithm.unwrap_or("SHA1").to_string(),
            store_location: store_location.unwrap_or("CurrentUser").to_string(),
            store_name: store_name.unwrap_or("My").to_string(),
        });
        true
    }

    /// Create the pool
    pub async fn start(&self) -> Result<StartedPool> {
        let resp = self
            .api
            .add_pool(
                self.target_size,
                self.max_tasks,
                self.communication,
                &self.certificates,
            )
            .await?;
        Ok(StartedPool {
            id: resp.pool_id,
            link: resp.link.href,
        })
    }

    /// Auto-pool specification for a job submission of `size` TVMs
    pub fn auto_pool_message(&self, size: u32) -> Value {
        json!({
            "targetDedicated": size.to_string(),
            "maxTasksPerTVM": self.max_tasks.to_string(),
            "communication": self.communication,
            "certificateReferences": self.certificates,
        })
    }
}

impl fmt::Debug for PoolSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSpecifier")
            .field("target_size", &self.target_size)
            .field("max_tasks", &self.max_tasks)
            .field("communication", &self.communication)
            .field("certificates", &self.certificates)
            .finish()
    }
}
