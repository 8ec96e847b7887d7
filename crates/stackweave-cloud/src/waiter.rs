//! Deployment waiter
//!
//! Polls `describe` until a created resource is usable, fails, or the polling
//! budget runs out.

use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, PollConfig};
use crate::state::ResourceState;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Wait for a resource to become available
///
/// Transient describe errors (a freshly created id not yet visible) count
/// against the budget but do not abort the wait. Running out of budget yields
/// [`CloudError::Timeout`]; a resource reporting a failed status yields
/// [`CloudError::ApiError`].
pub async fn wait_for_resource(
    provider: &dyn CloudProvider,
    provider_id: &str,
    config: &PollConfig,
) -> Result<ResourceState> {
    let deadline = Instant::now() + config.timeout;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        match provider.describe(provider_id).await {
            Ok(state) if state.status.is_ready() => {
                debug!(provider_id, polls, "Resource available");
                return Ok(state);
            }
            Ok(state) if state.status.is_failed() => {
                return Err(CloudError::ApiError(format!(
                    "{} entered status {}",
                    provider_id, state.status
                )));
            }
            Ok(state) => {
                debug!(provider_id, polls, status = %state.status, "Resource not ready yet");
            }
            Err(e) if e.is_transient() => {
                debug!(provider_id, polls, "Describe failed transiently: {}", e);
            }
            Err(e) => return Err(e),
        }

        if Instant::now() + config.interval > deadline {
            return Err(CloudError::Timeout(format!(
                "{} not available after {} polls",
                provider_id, polls
            )));
        }
        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, InMemoryProvider};
    use serde_json::{Map, json};
    use stackweave_core::ResourceKind;
    use std::time::Duration;

    fn named(name: &str) -> Map<String, serde_json::Value> {
        let mut config = Map::new();
        config.insert("name".to_string(), json!(name));
        config
    }

    fn poll() -> PollConfig {
        PollConfig::new(Duration::from_secs(5), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_available() {
        let provider = InMemoryProvider::new().with_fault("web", Fault::ReadyAfter(3));
        let id = provider
            .create(ResourceKind::Compute, &named("web"))
            .await
            .unwrap();

        let started = Instant::now();
        let state = wait_for_resource(&provider, &id, &poll()).await.unwrap();
        assert!(state.status.is_ready());
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let provider = InMemoryProvider::new().with_fault("web", Fault::NeverReady);
        let id = provider
            .create(ResourceKind::Compute, &named("web"))
            .await
            .unwrap();

        let err = wait_for_resource(&provider, &id, &poll()).await.unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_an_error() {
        let provider = InMemoryProvider::new().with_fault("web", Fault::FailValidation);
        let id = provider
            .create(ResourceKind::Compute, &named("web"))
            .await
            .unwrap();

        let err = wait_for_resource(&provider, &id, &poll()).await.unwrap_err();
        assert!(matches!(err, CloudError::ApiError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_polls_until_deadline() {
        let provider = InMemoryProvider::new();
        let err = wait_for_resource(&provider, "i-missing", &poll())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }
}
