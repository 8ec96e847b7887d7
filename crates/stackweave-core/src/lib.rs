//! StackWeave core
//!
//! Resource model, KDL stack parser and topology builder. Everything here is
//! pure: no provider calls happen in this crate.
//!
//! ```text
//! stack.kdl ──parse──▶ StackDeclaration ──TopologyBuilder──▶ Topology
//!                                                              │
//!                      ResourceOutputs of ready deps ──wiring──┤
//!                                                              ▼
//!                                                     provider config
//! ```

pub mod assembly;
pub mod edge;
pub mod error;
pub mod model;
pub mod parser;
pub mod security;
pub mod topology;
pub mod wiring;

pub use error::{BuildError, Result, ValidationError};
pub use model::*;
pub use parser::{parse_stack_file, parse_stack_string};
pub use security::{CompiledPolicy, PolicyWarning, SecurityRule, SecurityRuleSpec};
pub use topology::{
    LookupRequest, LookupTable, Namespace, Topology, TopologyBuilder, lookup_requests,
    reference_lookups,
};
pub use wiring::resolve_config;
