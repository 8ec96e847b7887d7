//! StackWeave provisioning
//!
//! Provider abstraction, certificate provisioner and the concurrent plan
//! executor.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    Executor                      │
//! │   one task per node, watch channel per node      │
//! │  ┌────────────────┐   ┌───────────────────────┐  │
//! │  │ wiring (core)  │   │ CertificateProvisioner│  │
//! │  └────────────────┘   └───────────────────────┘  │
//! │  ┌────────────────┐   ┌───────────────────────┐  │
//! │  │ retry/backoff  │   │  deployment waiter    │  │
//! │  └────────────────┘   └───────────────────────┘  │
//! └─────────────────────────┬────────────────────────┘
//!                           │
//!               ┌───────────▼───────────┐
//!               │ trait CloudProvider   │
//!               └───────────┬───────────┘
//!                           │
//!                 ┌─────────▼─────────┐
//!                 │ InMemoryProvider  │
//!                 └───────────────────┘
//! ```

pub mod certificate;
pub mod error;
pub mod executor;
pub mod memory;
pub mod plan;
pub mod provider;
pub mod report;
pub mod retry;
pub mod state;
pub mod waiter;

// Re-exports
pub use certificate::{CertificateConsumer, CertificateProvisioner};
pub use error::{CloudError, Result};
pub use executor::{AbortSignal, Executor, ExecutorOptions, RunHandle};
pub use memory::{Fault, InMemoryProvider};
pub use plan::{Action, ActionType, Plan, PlanSummary};
pub use provider::{CloudProvider, PollConfig, RetryConfig, resolve_lookups};
pub use report::{Endpoints, ExecutionReport, NodeOutcome, Transition};
pub use retry::{RetryOutcome, with_backoff};
pub use state::{ResourceState, ResourceStatus};
pub use waiter::wait_for_resource;
