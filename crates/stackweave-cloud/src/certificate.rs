//! Region-aware certificate provisioner
//!
//! Certificates are content-addressed by `(domain, region, sanList)`: the
//! first request for a key creates the certificate, every later or concurrent
//! request for the same key shares it. Each key validates independently, so a
//! slow certificate in one region never delays another.

use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, PollConfig, RetryConfig};
use crate::retry::with_backoff;
use crate::waiter::wait_for_resource;
use serde_json::{Map, Value, json};
use stackweave_core::{
    CertificateHandle, CertificateKey, ResourceKind, ValidationError, ValidationState, field,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, instrument, warn};

/// What a certificate will be attached to, and by which node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateConsumer {
    /// An edge distribution; the certificate must live in the edge region
    Distribution { node: String },
    /// A regional listener; the certificate must live in the listener's region
    Listener { node: String, region: String },
}

impl CertificateConsumer {
    pub fn node(&self) -> &str {
        match self {
            CertificateConsumer::Distribution { node } | CertificateConsumer::Listener { node, .. } => {
                node
            }
        }
    }
}

/// Terminal result of one certificate's validation, shared by every requester
#[derive(Debug, Clone)]
enum Validation {
    Issued,
    TimedOut,
    Failed(String),
}

struct Entry {
    provider_id: OnceCell<String>,
    validation: OnceCell<Validation>,
    state: Mutex<ValidationState>,
}

impl Entry {
    fn new() -> Self {
        Self {
            provider_id: OnceCell::new(),
            validation: OnceCell::new(),
            state: Mutex::new(ValidationState::PendingValidation),
        }
    }
}

pub struct CertificateProvisioner {
    provider: Arc<dyn CloudProvider>,
    edge_region: String,
    retry: RetryConfig,
    poll: PollConfig,
    entries: Mutex<HashMap<CertificateKey, Arc<Entry>>>,
}

impl CertificateProvisioner {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        edge_region: impl Into<String>,
        retry: RetryConfig,
        poll: PollConfig,
    ) -> Self {
        Self {
            provider,
            edge_region: edge_region.into(),
            retry,
            poll,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn edge_region(&self) -> &str {
        &self.edge_region
    }

    /// Reject a region that does not fit where the certificate will be used
    ///
    /// The error names the consumer that cannot attach the certificate.
    pub fn check_consumers(
        &self,
        certificate: &str,
        region: &str,
        consumers: &[CertificateConsumer],
    ) -> std::result::Result<(), ValidationError> {
        for consumer in consumers {
            let expected = match consumer {
                CertificateConsumer::Distribution { .. } => self.edge_region.as_str(),
                CertificateConsumer::Listener { region, .. } => region.as_str(),
            };
            if region != expected {
                return Err(ValidationError::RegionMismatch {
                    node: consumer.node().to_string(),
                    certificate: certificate.to_string(),
                    expected: expected.to_string(),
                    actual: region.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn entry(&self, key: &CertificateKey) -> Arc<Entry> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Entry::new()))
            .clone()
    }

    async fn snapshot(&self, key: &CertificateKey, entry: &Entry) -> Option<CertificateHandle> {
        let provider_id = entry.provider_id.get()?;
        let mut handle = CertificateHandle::new(key, provider_id.clone());
        handle.validation_state = *entry.state.lock().await;
        Some(handle)
    }

    /// Request a certificate, or return the existing handle for the same key
    ///
    /// `name` labels the provider resource; only the first requester's name is
    /// used. The request counts as one attempt even when the create call had to
    /// be retried.
    #[instrument(skip(self, san_list, consumers))]
    pub async fn request_certificate(
        &self,
        name: &str,
        domain: &str,
        region: &str,
        san_list: &[String],
        consumers: &[CertificateConsumer],
    ) -> Result<CertificateHandle> {
        self.check_consumers(name, region, consumers)?;

        let key = CertificateKey::new(domain, region, san_list);
        let entry = self.entry(&key).await;

        entry
            .provider_id
            .get_or_try_init(|| async {
                let mut config = Map::new();
                config.insert(field::NAME.to_string(), json!(name));
                config.insert(field::REGION.to_string(), json!(key.region));
                config.insert(field::DOMAIN.to_string(), json!(key.domain));
                config.insert(field::SAN.to_string(), json!(key.san_list));

                let outcome = with_backoff(&self.retry, "request certificate", || {
                    self.provider.create(ResourceKind::Certificate, &config)
                })
                .await;
                let provider_id = outcome.result?;
                info!(domain = %key.domain, provider_id = %provider_id, "Certificate requested");
                Ok::<String, CloudError>(provider_id)
            })
            .await?;

        self.snapshot(&key, &entry).await.ok_or_else(|| {
            CloudError::InvalidConfig(format!("certificate {} has no provider id", key.domain))
        })
    }

    /// Poll until the certificate is issued
    ///
    /// Concurrent and later waiters on the same certificate share one polling
    /// loop and its outcome, so a certificate is polled for at most one
    /// budget. A certificate that is not issued within that budget, or whose
    /// polling fails, is marked `Failed`.
    pub async fn await_issued(&self, handle: &CertificateHandle) -> Result<CertificateHandle> {
        let key = handle.key();
        let entry = self.entry(&key).await;

        let validation = entry
            .validation
            .get_or_init(|| async {
                let validation =
                    match wait_for_resource(self.provider.as_ref(), &handle.provider_id, &self.poll)
                        .await
                    {
                        Ok(_) => Validation::Issued,
                        Err(CloudError::Timeout(_)) => Validation::TimedOut,
                        Err(e) => Validation::Failed(e.to_string()),
                    };
                let state = match &validation {
                    Validation::Issued => {
                        info!(domain = %key.domain, region = %key.region, "Certificate issued");
                        ValidationState::Issued
                    }
                    Validation::TimedOut => {
                        warn!(domain = %key.domain, region = %key.region, "Certificate validation timed out");
                        ValidationState::Failed
                    }
                    Validation::Failed(reason) => {
                        warn!(domain = %key.domain, region = %key.region, "Certificate validation failed: {}", reason);
                        ValidationState::Failed
                    }
                };
                *entry.state.lock().await = state;
                validation
            })
            .await;

        match validation {
            Validation::Issued => {}
            Validation::TimedOut => {
                return Err(CloudError::CertificateValidationTimeout {
                    domain: key.domain.clone(),
                    region: key.region.clone(),
                    timeout_secs: self.poll.timeout.as_secs(),
                });
            }
            Validation::Failed(reason) => {
                return Err(CloudError::CertificateValidationFailed {
                    domain: key.domain.clone(),
                    region: key.region.clone(),
                    reason: reason.clone(),
                });
            }
        }

        self.snapshot(&key, &entry).await.ok_or_else(|| {
            CloudError::InvalidConfig(format!("certificate {} was never requested", key.domain))
        })
    }

    /// Current snapshot of a previously requested certificate
    pub async fn handle(
        &self,
        domain: &str,
        region: &str,
        san_list: &[String],
    ) -> Option<CertificateHandle> {
        let key = CertificateKey::new(domain, region, san_list);
        let entry = self.entries.lock().await.get(&key).cloned()?;
        self.snapshot(&key, &entry).await
    }

    /// Every requested certificate, ordered by key
    pub async fn handles(&self) -> Vec<CertificateHandle> {
        let mut entries: Vec<(CertificateKey, Arc<Entry>)> = self
            .entries
            .lock()
            .await
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut handles = Vec::with_capacity(entries.len());
        for (key, entry) in &entries {
            if let Some(handle) = self.snapshot(key, entry).await {
                handles.push(handle);
            }
        }
        handles
    }
}

/// Config value of a certificate node's SAN list
pub fn san_list(config: &Map<String, Value>) -> Vec<String> {
    match config.get(field::SAN) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
