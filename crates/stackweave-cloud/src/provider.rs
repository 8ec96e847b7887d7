//! Cloud provider trait definition

use crate::error::Result;
use crate::state::ResourceState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use stackweave_core::{LookupKind, LookupRequest, LookupTable, ResourceKind};
use std::time::Duration;
use tracing::{debug, warn};

/// Cloud provider abstraction trait
///
/// Every call may fail transiently (see [`crate::CloudError::is_transient`]);
/// callers decide whether to retry.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "memory")
    fn name(&self) -> &str;

    /// Start creating a resource and return its provider id
    async fn create(&self, kind: ResourceKind, config: &Map<String, Value>) -> Result<String>;

    /// Current state of a created resource
    async fn describe(&self, provider_id: &str) -> Result<ResourceState>;

    /// Delete a resource
    async fn delete(&self, provider_id: &str) -> Result<()>;

    /// Find an existing resource, machine image or hosted zone matching `filter`
    async fn lookup(&self, kind: LookupKind, filter: &str) -> Result<Option<String>>;
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// Polling budget for `describe` loops
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Deployment polling defaults
    pub fn deployment() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(15 * 60))
    }

    /// Certificate DNS validation defaults
    pub fn certificate() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30 * 60))
    }
}

/// Answer the lookups a stack needs before its topology is built
///
/// Misses are left out of the table; the builder reports them. A name
/// shared by several nodes is asked for once.
pub async fn resolve_lookups(
    provider: &dyn CloudProvider,
    requests: &[LookupRequest],
) -> Result<LookupTable> {
    let mut table = LookupTable::new();
    for request in requests {
        if table.contains(request.kind, &request.filter) {
            continue;
        }
        match provider.lookup(request.kind, &request.filter).await? {
            Some(id) => {
                debug!(node = %request.node, kind = %request.kind, provider_id = %id, "Lookup resolved");
                table.insert(request.kind, request.filter.clone(), id);
            }
            None => {
                warn!(node = %request.node, kind = %request.kind, filter = %request.filter, "Lookup found nothing");
            }
        }
    }
    Ok(table)
}
