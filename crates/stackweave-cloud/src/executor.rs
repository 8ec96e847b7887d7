//! Provisioning plan executor
//!
//! Runs one task per node. A node waits on the `watch` channels of its
//! dependencies, is provisioned once all of them are `Ready`, and publishes
//! its own state on its channel; every channel has exactly one writer, the
//! node's own task.
//!
//! ```text
//! Pending -> Resolving -> Provisioning -> Validating -> Ready
//!               |              |              |
//!               v              v              v
//!            Blocked        Failed         Failed
//! ```
//!
//! A failed node blocks everything that transitively depends on it; unrelated
//! branches keep going.

use crate::certificate::{self, CertificateConsumer, CertificateProvisioner};
use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, PollConfig, RetryConfig};
use crate::report::{ExecutionReport, NodeOutcome, Transition};
use crate::retry::with_backoff;
use crate::waiter::wait_for_resource;
use chrono::Utc;
use serde_json::Map;
use stackweave_core::{
    NodeState, ResourceKind, ResourceNode, ResourceOutputs, Topology, field, resolve_config,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Executor tuning
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Backoff for transient create failures
    pub retry: RetryConfig,

    /// Polling budget for non-certificate resources
    pub deployment: PollConfig,

    /// Polling budget for certificate validation
    pub certificate: PollConfig,

    /// Maximum number of nodes provisioning at once
    pub max_concurrency: Option<usize>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            deployment: PollConfig::deployment(),
            certificate: PollConfig::certificate(),
            max_concurrency: None,
        }
    }
}

pub struct Executor {
    provider: Arc<dyn CloudProvider>,
    options: ExecutorOptions,
}

struct RunContext {
    provider: Arc<dyn CloudProvider>,
    options: ExecutorOptions,
    topology: Arc<Topology>,
    certificates: CertificateProvisioner,
    outputs: RwLock<HashMap<String, ResourceOutputs>>,
    journal: Mutex<Vec<Transition>>,
    seq: AtomicU64,
    permits: Option<Arc<Semaphore>>,
}

impl Executor {
    pub fn new(provider: Arc<dyn CloudProvider>, options: ExecutorOptions) -> Self {
        Self { provider, options }
    }

    /// Start a run in the background
    pub fn spawn(&self, topology: Arc<Topology>) -> RunHandle {
        let ctx = Arc::new(RunContext {
            provider: self.provider.clone(),
            options: self.options.clone(),
            certificates: CertificateProvisioner::new(
                self.provider.clone(),
                topology.edge_region(),
                self.options.retry.clone(),
                self.options.certificate.clone(),
            ),
            topology: topology.clone(),
            outputs: RwLock::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            permits: self
                .options
                .max_concurrency
                .map(|n| Arc::new(Semaphore::new(n.max(1)))),
        });

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for node in topology.nodes() {
            let (tx, rx) = watch::channel(NodeState::Pending);
            senders.insert(node.id.clone(), tx);
            receivers.insert(node.id.clone(), rx);
        }

        let (abort_tx, abort_rx) = watch::channel(false);
        let order: Vec<String> = topology.order().into_iter().map(str::to_string).collect();

        let mut tasks = Vec::with_capacity(order.len());
        for id in &order {
            let Some(node) = topology.node(id) else {
                continue;
            };
            let Some(tx) = senders.remove(id) else {
                continue;
            };
            let deps = node
                .depends_on
                .iter()
                .filter_map(|d| receivers.get(d).map(|rx| (d.clone(), rx.clone())))
                .collect();
            tasks.push(NodeTask {
                ctx: ctx.clone(),
                node: node.clone(),
                deps,
                consumers: certificate_consumers(&topology, node),
                tx,
                abort: abort_rx.clone(),
            });
        }

        let span = info_span!("run", stack = %topology.namespace(), nodes = topology.len());
        let task = tokio::spawn(run(ctx, tasks).instrument(span));

        RunHandle {
            order,
            states: receivers,
            abort: AbortSignal(Arc::new(abort_tx)),
            task,
        }
    }

    /// Run to completion
    #[instrument(skip_all, fields(stack = %topology.namespace()))]
    pub async fn execute(&self, topology: Arc<Topology>) -> Result<ExecutionReport> {
        self.spawn(topology).wait().await
    }
}

/// Cancels a run from outside its [`RunHandle`]
#[derive(Clone)]
pub struct AbortSignal(Arc<watch::Sender<bool>>);

impl AbortSignal {
    /// Cancel every node that has not started provisioning
    pub fn abort(&self) {
        info!("Aborting run");
        self.0.send_replace(true);
    }
}

/// Handle on a running provisioning run
pub struct RunHandle {
    order: Vec<String>,
    states: HashMap<String, watch::Receiver<NodeState>>,
    abort: AbortSignal,
    task: JoinHandle<ExecutionReport>,
}

impl RunHandle {
    /// Current state of a node
    pub fn state(&self, id: &str) -> Option<NodeState> {
        self.states.get(id).map(|rx| *rx.borrow())
    }

    /// Current state of every node in creation order
    pub fn states(&self) -> Vec<(String, NodeState)> {
        self.order
            .iter()
            .filter_map(|id| self.state(id).map(|state| (id.clone(), state)))
            .collect()
    }

    /// Wait until a node is in `state` or in a terminal state
    ///
    /// Returns the state observed, or `None` for an unknown node.
    pub async fn wait_for(&self, id: &str, state: NodeState) -> Option<NodeState> {
        let mut rx = self.states.get(id)?.clone();
        let observed = rx
            .wait_for(|s| *s == state || s.is_terminal())
            .await
            .map(|s| *s)
            .ok();
        observed.or_else(|| Some(*rx.borrow()))
    }

    /// Cancel every node that has not started provisioning
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<ExecutionReport> {
        self.task.await.map_err(|e| CloudError::Task(e.to_string()))
    }
}

/// Where a certificate node's dependents will attach it
fn certificate_consumers(topology: &Topology, node: &ResourceNode) -> Vec<CertificateConsumer> {
    if node.kind != ResourceKind::Certificate {
        return Vec::new();
    }
    topology
        .dependents(&node.id)
        .into_iter()
        .filter_map(|dependent| match dependent.kind {
            ResourceKind::Distribution => Some(CertificateConsumer::Distribution {
                node: dependent.id.clone(),
            }),
            ResourceKind::Listener => Some(CertificateConsumer::Listener {
                node: dependent.id.clone(),
                region: dependent.region.clone(),
            }),
            _ => None,
        })
        .collect()
}

async fn run(ctx: Arc<RunContext>, tasks: Vec<NodeTask>) -> ExecutionReport {
    let started_at = Utc::now();
    info!("Provisioning started");

    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task.run().in_current_span());
    }

    let mut outcomes: HashMap<String, NodeOutcome> = HashMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => {
                outcomes.insert(outcome.node_id.clone(), outcome);
            }
            Err(e) => error!("Node task failed: {}", e),
        }
    }

    let outcomes: Vec<NodeOutcome> = ctx
        .topology
        .ordered_nodes()
        .map(|node| {
            outcomes.remove(&node.id).unwrap_or_else(|| NodeOutcome {
                node_id: node.id.clone(),
                kind: node.kind,
                region: node.region.clone(),
                state: NodeState::Failed,
                provider_id: None,
                attributes: Map::new(),
                attempts: 0,
                error: Some("node task did not complete".to_string()),
                blocked_by: None,
                cancelled: false,
            })
        })
        .collect();

    let mut transitions = std::mem::take(&mut *ctx.journal.lock().await);
    transitions.sort_by_key(|t| t.seq);

    let finished_at = Utc::now();
    let report = ExecutionReport {
        stack: ctx.topology.namespace().to_string(),
        outcomes,
        transitions,
        certificates: ctx.certificates.handles().await,
        started_at,
        finished_at,
        duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
    };

    info!(
        ready = report.outcomes.iter().filter(|o| o.state == NodeState::Ready).count(),
        failed = report.failed().len(),
        blocked = report.blocked().len(),
        "Provisioning finished"
    );
    report
}

/// Single writer of one node's state
struct StateCell {
    ctx: Arc<RunContext>,
    node_id: String,
    tx: watch::Sender<NodeState>,
    current: NodeState,
}

impl StateCell {
    async fn transition(&mut self, to: NodeState) {
        debug_assert!(
            self.current.can_transition_to(to),
            "{}: illegal transition {} -> {}",
            self.node_id,
            self.current,
            to
        );
        let seq = self.ctx.seq.fetch_add(1, Ordering::SeqCst);
        self.ctx.journal.lock().await.push(Transition {
            seq,
            node: self.node_id.clone(),
            from: self.current,
            to,
            at: Utc::now(),
        });
        debug!(node = %self.node_id, from = %self.current, to = %to, seq, "Transition");
        self.current = to;
        self.tx.send_replace(to);
    }
}

enum Resolution {
    Proceed(Option<OwnedSemaphorePermit>),
    Blocked { by: Option<String>, cancelled: bool },
}

struct NodeTask {
    ctx: Arc<RunContext>,
    node: ResourceNode,
    deps: Vec<(String, watch::Receiver<NodeState>)>,
    consumers: Vec<CertificateConsumer>,
    tx: watch::Sender<NodeState>,
    abort: watch::Receiver<bool>,
}

impl NodeTask {
    async fn run(self) -> NodeOutcome {
        let NodeTask {
            ctx,
            node,
            deps,
            consumers,
            tx,
            mut abort,
        } = self;

        let mut outcome = NodeOutcome {
            node_id: node.id.clone(),
            kind: node.kind,
            region: node.region.clone(),
            state: NodeState::Pending,
            provider_id: None,
            attributes: Map::new(),
            attempts: 0,
            error: None,
            blocked_by: None,
            cancelled: false,
        };
        let mut cell = StateCell {
            ctx: ctx.clone(),
            node_id: node.id.clone(),
            tx,
            current: NodeState::Pending,
        };

        cell.transition(NodeState::Resolving).await;

        let _permit = match resolve(&ctx, &deps, &mut abort).await {
            Resolution::Proceed(permit) => permit,
            Resolution::Blocked { by, cancelled } => {
                match &by {
                    Some(dependency) => {
                        warn!(node = %node.id, dependency = %dependency, "Blocked by dependency")
                    }
                    None if cancelled => info!(node = %node.id, "Cancelled"),
                    None => warn!(node = %node.id, "Blocked"),
                }
                cell.transition(NodeState::Blocked).await;
                outcome.state = NodeState::Blocked;
                outcome.blocked_by = by;
                outcome.cancelled = cancelled;
                return outcome;
            }
        };

        cell.transition(NodeState::Provisioning).await;
        match provision(&ctx, &node, &consumers, &mut cell, &mut outcome).await {
            Ok(outputs) => {
                outcome.provider_id = Some(outputs.provider_id.clone());
                outcome.attributes = outputs.attributes.clone();
                ctx.outputs.write().await.insert(node.id.clone(), outputs);
                info!(node = %node.id, kind = %node.kind, "Ready");
                cell.transition(NodeState::Ready).await;
                outcome.state = NodeState::Ready;
            }
            Err(e) => {
                error!(node = %node.id, kind = %node.kind, "Provisioning failed: {}", e);
                cell.transition(NodeState::Failed).await;
                outcome.state = NodeState::Failed;
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }
}

/// Wait for every dependency to finish, then for a concurrency permit
///
/// Dependencies are watched together: the first one to finish in any state
/// but `Ready` blocks the node, however long its siblings take.
async fn resolve(
    ctx: &RunContext,
    deps: &[(String, watch::Receiver<NodeState>)],
    abort: &mut watch::Receiver<bool>,
) -> Resolution {
    let cancelled = || Resolution::Blocked {
        by: None,
        cancelled: true,
    };

    let mut pending = JoinSet::new();
    for (dependency, rx) in deps {
        let dependency = dependency.clone();
        let mut rx = rx.clone();
        pending.spawn(async move {
            // A closed channel means the dependency's task died
            let state = rx
                .wait_for(|s| s.is_terminal())
                .await
                .map(|s| *s)
                .unwrap_or(NodeState::Failed);
            (dependency, state)
        });
    }

    loop {
        let finished = tokio::select! {
            biased;
            Ok(_) = abort.wait_for(|aborted| *aborted) => return cancelled(),
            finished = pending.join_next() => finished,
        };
        match finished {
            None => break,
            Some(Ok((_, NodeState::Ready))) => {}
            Some(Ok((dependency, _))) => {
                return Resolution::Blocked {
                    by: Some(dependency),
                    cancelled: false,
                };
            }
            Some(Err(e)) => {
                error!("Dependency watch failed: {}", e);
                return Resolution::Blocked {
                    by: None,
                    cancelled: false,
                };
            }
        }
    }

    let permit = match &ctx.permits {
        Some(semaphore) => {
            let semaphore = semaphore.clone();
            tokio::select! {
                biased;
                Ok(_) = abort.wait_for(|aborted| *aborted) => return cancelled(),
                permit = semaphore.acquire_owned() => permit.ok(),
            }
        }
        None => None,
    };

    if *abort.borrow() {
        return cancelled();
    }
    Resolution::Proceed(permit)
}

async fn provision(
    ctx: &RunContext,
    node: &ResourceNode,
    consumers: &[CertificateConsumer],
    cell: &mut StateCell,
    outcome: &mut NodeOutcome,
) -> Result<ResourceOutputs> {
    if node.is_lookup() {
        let provider_id = node
            .config_str(field::PROVIDER_ID)
            .ok_or_else(|| CloudError::Provisioning {
                node: node.id.clone(),
                message: "lookup was not resolved".to_string(),
            })?
            .to_string();
        debug!(node = %node.id, provider_id = %provider_id, "Adopting existing resource");

        cell.transition(NodeState::Validating).await;
        let described = with_backoff(&ctx.options.retry, "describe", || {
            ctx.provider.describe(&provider_id)
        })
        .await
        .result?;
        let mut outputs = ResourceOutputs::ready(node, provider_id);
        outputs.attributes = described.attributes;
        return Ok(outputs);
    }

    if node.kind == ResourceKind::Certificate {
        let domain = node
            .config_str(field::DOMAIN)
            .ok_or_else(|| CloudError::Provisioning {
                node: node.id.clone(),
                message: "certificate declares no domain".to_string(),
            })?;
        let sans = certificate::san_list(&node.config);

        outcome.attempts = 1;
        let handle = ctx
            .certificates
            .request_certificate(&node.id, domain, &node.region, &sans, consumers)
            .await?;

        cell.transition(NodeState::Validating).await;
        let handle = ctx.certificates.await_issued(&handle).await?;
        let mut outputs = ResourceOutputs::ready(node, handle.provider_id.clone());
        outputs.attributes = handle.to_attributes();
        return Ok(outputs);
    }

    let config = {
        let outputs = ctx.outputs.read().await;
        resolve_config(node, &outputs, ctx.topology.edge_region())?
    };

    let created = with_backoff(&ctx.options.retry, "create", || {
        ctx.provider.create(node.kind, &config)
    })
    .await;
    outcome.attempts = created.attempts;
    let provider_id = created.result?;
    outcome.provider_id = Some(provider_id.clone());
    debug!(node = %node.id, provider_id = %provider_id, attempts = created.attempts, "Created");

    cell.transition(NodeState::Validating).await;
    let state = wait_for_resource(ctx.provider.as_ref(), &provider_id, &ctx.options.deployment)
        .await
        .map_err(|e| CloudError::Provisioning {
            node: node.id.clone(),
            message: e.to_string(),
        })?;

    let mut outputs = ResourceOutputs::ready(node, provider_id);
    outputs.attributes = state.attributes;
    Ok(outputs)
}
