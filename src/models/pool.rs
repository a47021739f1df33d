use serde::{Deserialize, Serialize};

use super::{lenient_string, lenient_u32, Link};

/// Certificate installed on the VMs of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateReference {
    pub thumbprint: String,
    pub thumbprint_algorithm: String,
    pub store_location: String,
    pub store_name: String,
}

/// Pool as returned by `GET pools` and `GET pools/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub auto_pool: bool,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub target_dedicated: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub current_dedicated: u32,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub allocation_state: Option<String>,
    #[serde(default, rename = "maxTasksPerTVM", deserialize_with = "lenient_u32")]
    pub max_tasks_per_tvm: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub resize_error: Option<String>,
    #[serde(default)]
    pub communication: bool,
    #[serde(default)]
    pub certificate_references: Vec<CertificateReference>,
    #[serde(default)]
    pub active_jobs: Vec<serde_json::Value>,
    #[serde(default)]
    pub jobs: Vec<serde_json::Value>,
    #[serde(default)]
    pub pool_detail_link: Link,
}

/// `GET pools` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolList {
    pub total_count: u64,
    pub pools: Vec<serde_json::Value>,
}

/// `POST pools` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPoolResponse {
    pub pool_id: String,
    pub link: Link,
}
