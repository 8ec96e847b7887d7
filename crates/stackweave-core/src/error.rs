//! Error types for declaration parsing and topology building

use crate::model::{LookupKind, ResourceKind};
use thiserror::Error;

/// Errors raised while turning declarations into a frozen topology.
///
/// Every variant is fatal and is raised before any provisioning call.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("File read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("Duplicate resource id: {0}")]
    DuplicateId(String),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Lookup failed for {node}: no {kind} matches '{filter}'")]
    Lookup {
        node: String,
        kind: LookupKind,
        filter: String,
    },
}

/// Structural and policy validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Security group {group_id}: rule peer is empty")]
    EmptyPeer { group_id: String },

    #[error("Security group {group_id}: malformed peer '{peer}'")]
    MalformedPeer { group_id: String, peer: String },

    #[error("Security group {group_id}: invalid port range {low}-{high}")]
    InvalidPortRange {
        group_id: String,
        low: i64,
        high: i64,
    },

    #[error("Security group {group_id}: protocol {protocol} requires a port")]
    MissingPort { group_id: String, protocol: String },

    #[error("Security group {group_id}: unrecognized protocol '{protocol}'")]
    UnknownProtocol { group_id: String, protocol: String },

    #[error("Security group {group_id}: unsupported rule direction '{direction}'")]
    UnsupportedDirection { group_id: String, direction: String },

    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("{node} depends on undeclared resource '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("{0} depends on itself")]
    SelfDependency(String),

    #[error("{node} is missing a required {kind} reference")]
    MissingReference { node: String, kind: ResourceKind },

    #[error("{node} references more than one {kind}")]
    AmbiguousReference { node: String, kind: ResourceKind },

    #[error("{0} has no region and the stack declares no default region")]
    MissingRegion(String),

    #[error(
        "{node} requires certificate {certificate} in region {expected}, but it is in {actual}"
    )]
    RegionMismatch {
        node: String,
        certificate: String,
        expected: String,
        actual: String,
    },

    #[error("{node}: invalid field '{field}': {reason}")]
    InvalidField {
        node: String,
        field: String,
        reason: String,
    },

    #[error("Certificate {0} is not issued")]
    CertificateNotIssued(String),

    #[error("{node} cannot be wired before {dependency} is ready")]
    DependencyNotReady { node: String, dependency: String },
}

pub type Result<T> = std::result::Result<T, BuildError>;
