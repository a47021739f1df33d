// Batch Apps client - Library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod http_client;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod pools;
pub mod utils;

pub use api::{BatchAppsApi, JobRef, PoolRef};
pub use auth::{AuthManager, AzureOAuth, Credentials};
pub use config::Configuration;
pub use error::{BatchAppsError, Result};
pub use files::{FileCollection, FileManager, UserFile};
pub use http_client::BatchAppsHttpClient;
pub use jobs::{JobManager, JobSubmission, SubmittedJob, Task};
pub use monitor::JobMonitor;
pub use pools::{Pool, PoolManager, PoolSpecifier};
