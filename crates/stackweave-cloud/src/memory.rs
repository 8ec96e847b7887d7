//! In-memory provider
//!
//! A provider that keeps resources in a map. Used by `weave apply --simulate`
//! and by tests, which inject faults per resource name (the `name` config
//! entry set during wiring) and hold resources in `Creating` until released.

use crate::error::{CloudError, Result};
use crate::provider::CloudProvider;
use crate::state::{ResourceState, ResourceStatus};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use stackweave_core::{LookupKind, ResourceKind, VALIDATION_STATE, ValidationState, field};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

/// Misbehaviour injected for one resource name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Every create call fails with a non-transient error
    FailCreate,
    /// The next `n` create calls are throttled
    Throttle(u32),
    /// The resource is created, then reports a failed status
    FailValidation,
    /// The resource stays `Creating` forever
    NeverReady,
    /// The resource reports `Creating` for `n` describes before it is available
    ReadyAfter(u32),
}

struct Record {
    name: String,
    state: ResourceState,
    pending_describes: u32,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    resources: HashMap<String, Record>,
    lookups: HashMap<(LookupKind, String), String>,
    lookup_calls: usize,
    faults: HashMap<String, Fault>,
    held: HashSet<String>,
    creates: Vec<(ResourceKind, String)>,
    deletes: Vec<String>,
}

impl Inner {
    fn next_id(&mut self, kind: impl Into<LookupKind>) -> String {
        self.next_id += 1;
        format!("{}-{:04}", id_prefix(kind.into()), self.next_id)
    }

    fn insert_existing(&mut self, kind: ResourceKind, name: &str, id: &str) {
        let state = ResourceState::new(id, kind).with_status(ResourceStatus::Available);
        self.resources.insert(
            id.to_string(),
            Record {
                name: name.to_string(),
                state,
                pending_describes: 0,
            },
        );
    }
}

#[derive(Default)]
pub struct InMemoryProvider {
    inner: Mutex<Inner>,
    /// Answer every lookup with a synthesized existing resource
    adopt_any: bool,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider for dry runs: every lookup finds an existing resource
    pub fn simulated() -> Self {
        Self {
            inner: Mutex::default(),
            adopt_any: true,
        }
    }

    /// Register an existing resource, image or zone that `lookup(kind, filter)` finds
    pub fn with_lookup(
        mut self,
        kind: impl Into<LookupKind>,
        filter: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        let kind = kind.into();
        let filter = filter.into();
        let provider_id = provider_id.into();
        let inner = self.inner.get_mut();
        if let LookupKind::Resource(resource) = kind {
            inner.insert_existing(resource, &filter, &provider_id);
        }
        inner.lookups.insert((kind, filter), provider_id);
        self
    }

    pub fn with_fault(mut self, name: impl Into<String>, fault: Fault) -> Self {
        self.inner.get_mut().faults.insert(name.into(), fault);
        self
    }

    pub async fn inject(&self, name: impl Into<String>, fault: Fault) {
        self.inner.lock().await.faults.insert(name.into(), fault);
    }

    /// Keep the named resource in `Creating` until [`release`](Self::release)
    pub async fn hold(&self, name: impl Into<String>) {
        self.inner.lock().await.held.insert(name.into());
    }

    pub async fn release(&self, name: &str) {
        self.inner.lock().await.held.remove(name);
    }

    /// Number of create calls that produced a resource
    pub async fn create_count(&self) -> usize {
        self.inner.lock().await.creates.len()
    }

    pub async fn create_count_for(&self, kind: ResourceKind) -> usize {
        self.inner
            .lock()
            .await
            .creates
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Names of created resources in creation order
    pub async fn created_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .creates
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.inner.lock().await.deletes.clone()
    }

    /// Number of lookup calls answered so far
    pub async fn lookup_calls(&self) -> usize {
        self.inner.lock().await.lookup_calls
    }
}

fn id_prefix(kind: LookupKind) -> &'static str {
    let kind = match kind {
        LookupKind::Resource(kind) => kind,
        LookupKind::MachineImage => return "ami",
        LookupKind::HostedZone => return "zone",
    };
    match kind {
        ResourceKind::Network => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::Compute => "i",
        ResourceKind::Certificate => "cert",
        ResourceKind::TargetGroup => "tg",
        ResourceKind::LoadBalancer => "lb",
        ResourceKind::Listener => "listener",
        ResourceKind::Distribution => "dist",
        ResourceKind::DnsRecord => "rec",
    }
}

fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Attributes a real provider would report for a new resource
fn synthesize_attributes(
    kind: ResourceKind,
    id: &str,
    serial: u64,
    config: &Map<String, Value>,
) -> Map<String, Value> {
    let mut attributes = Map::new();
    let region = config_str(config, field::REGION).unwrap_or("local");
    match kind {
        ResourceKind::Compute => {
            attributes.insert(
                field::PRIVATE_IP.to_string(),
                json!(format!("10.0.{}.{}", serial / 250, serial % 250 + 4)),
            );
        }
        ResourceKind::LoadBalancer => {
            attributes.insert(
                field::DNS_NAME.to_string(),
                json!(format!("{}.{}.elb.example.net", id, region)),
            );
        }
        ResourceKind::Distribution => {
            attributes.insert(
                field::DOMAIN_NAME.to_string(),
                json!(format!("{}.edge.example.net", id)),
            );
        }
        ResourceKind::DnsRecord => {
            let fqdn = config_str(config, "record-name")
                .or_else(|| config_str(config, "zone"))
                .unwrap_or(id);
            attributes.insert(field::FQDN.to_string(), json!(fqdn));
            if let Some(target) = config.get(field::TARGET) {
                attributes.insert(field::TARGET.to_string(), target.clone());
            }
        }
        ResourceKind::Certificate => {
            for key in [field::DOMAIN, field::SAN] {
                if let Some(value) = config.get(key) {
                    attributes.insert(key.to_string(), value.clone());
                }
            }
            attributes.insert(
                VALIDATION_STATE.to_string(),
                json!(ValidationState::PendingValidation),
            );
        }
        _ => {}
    }
    attributes
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, kind: ResourceKind, config: &Map<String, Value>) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let name = config_str(config, field::NAME)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", kind, inner.creates.len() + 1));

        let mut pending_describes = 0;
        match inner.faults.get_mut(&name) {
            Some(Fault::FailCreate) => {
                return Err(CloudError::ApiError(format!("create {} rejected", name)));
            }
            Some(Fault::Throttle(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                return Err(CloudError::Throttled(format!("create {}", name)));
            }
            Some(Fault::ReadyAfter(n)) => pending_describes = *n,
            _ => {}
        }

        let id = inner.next_id(kind);
        let serial = inner.next_id;
        let mut state = ResourceState::new(&id, kind).with_status(ResourceStatus::Creating);
        state.attributes = synthesize_attributes(kind, &id, serial, config);

        debug!(kind = %kind, name = %name, provider_id = %id, "Created in-memory resource");
        inner.creates.push((kind, name.clone()));
        inner.resources.insert(
            id.clone(),
            Record {
                name,
                state,
                pending_describes,
            },
        );
        Ok(id)
    }

    async fn describe(&self, provider_id: &str) -> Result<ResourceState> {
        let mut inner = self.inner.lock().await;
        let Inner {
            resources,
            faults,
            held,
            ..
        } = &mut *inner;

        let record = resources
            .get_mut(provider_id)
            .ok_or_else(|| CloudError::ResourceNotFound(provider_id.to_string()))?;

        if record.state.status == ResourceStatus::Creating {
            let fault = faults.get(&record.name);
            if fault == Some(&Fault::FailValidation) {
                record.state.set_status(ResourceStatus::Failed);
                if record.state.kind == ResourceKind::Certificate {
                    record
                        .state
                        .set_attribute(VALIDATION_STATE, json!(ValidationState::Failed));
                }
            } else if fault == Some(&Fault::NeverReady) || held.contains(&record.name) {
                // stays Creating
            } else if record.pending_describes > 0 {
                record.pending_describes -= 1;
            } else {
                record.state.set_status(ResourceStatus::Available);
                if record.state.kind == ResourceKind::Certificate {
                    record
                        .state
                        .set_attribute(VALIDATION_STATE, json!(ValidationState::Issued));
                }
            }
        }

        Ok(record.state.clone())
    }

    async fn delete(&self, provider_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .resources
            .remove(provider_id)
            .ok_or_else(|| CloudError::ResourceNotFound(provider_id.to_string()))?;
        inner.deletes.push(provider_id.to_string());
        Ok(())
    }

    async fn lookup(&self, kind: LookupKind, filter: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.lookup_calls += 1;
        if let Some(id) = inner.lookups.get(&(kind, filter.to_string())) {
            return Ok(Some(id.clone()));
        }
        if !self.adopt_any {
            return Ok(None);
        }

        let id = inner.next_id(kind);
        if let LookupKind::Resource(resource) = kind {
            inner.insert_existing(resource, filter, &id);
        }
        inner.lookups.insert((kind, filter.to_string()), id.clone());
        Ok(Some(id))
    }
}
