// Compute pools

mod manager;
mod pool;

pub use manager::PoolManager;
pub use pool::{Pool, PoolSpecifier, StartedPool, MAX_CERTIFICATES};
