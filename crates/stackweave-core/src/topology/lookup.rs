//! Pre-resolved lookups of existing provider resources

use crate::model::{Declaration, LookupKind, ResourceKind, StackOptions, field};
use std::collections::HashMap;

/// A config entry naming an existing provider resource by name
///
/// The builder writes the resolved id to `resolved_key` and keeps the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceLookup {
    pub resource: ResourceKind,
    pub key: &'static str,
    pub kind: LookupKind,
    pub resolved_key: &'static str,
}

static REFERENCE_LOOKUPS: [ReferenceLookup; 3] = [
    ReferenceLookup {
        resource: ResourceKind::Compute,
        key: field::AMI,
        kind: LookupKind::MachineImage,
        resolved_key: field::IMAGE_ID,
    },
    ReferenceLookup {
        resource: ResourceKind::Certificate,
        key: field::ZONE,
        kind: LookupKind::HostedZone,
        resolved_key: field::ZONE_ID,
    },
    ReferenceLookup {
        resource: ResourceKind::DnsRecord,
        key: field::ZONE,
        kind: LookupKind::HostedZone,
        resolved_key: field::ZONE_ID,
    },
];

/// Reference lookups that apply to a resource kind
pub fn reference_lookups(kind: ResourceKind) -> impl Iterator<Item = &'static ReferenceLookup> {
    REFERENCE_LOOKUPS.iter().filter(move |l| l.resource == kind)
}

/// A lookup a stack needs answered before its topology can be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Local id of the declaring resource
    pub node: String,
    pub kind: LookupKind,
    pub filter: String,
}

/// Lookups that must be resolved for the given declarations
///
/// Stack option defaults are applied first, so a network selected through
/// `options { vpc-id ... }` or an image named by `options { ami ... }` is
/// looked up too.
pub fn lookup_requests(declarations: &[Declaration], options: &StackOptions) -> Vec<LookupRequest> {
    let mut requests = Vec::new();
    for decl in declarations {
        let mut config = decl.config.clone();
        options.apply_defaults(decl.kind, &mut config);

        if let Some(filter) = config.get(field::LOOKUP).and_then(|v| v.as_str()) {
            requests.push(LookupRequest {
                node: decl.id.clone(),
                kind: decl.kind.into(),
                filter: filter.to_string(),
            });
        }
        for reference in reference_lookups(decl.kind) {
            if let Some(filter) = config.get(reference.key).and_then(|v| v.as_str()) {
                requests.push(LookupRequest {
                    node: decl.id.clone(),
                    kind: reference.kind,
                    filter: filter.to_string(),
                });
            }
        }
    }
    requests
}

/// Provider ids found for `(kind, filter)` pairs
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<(LookupKind, String), String>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        kind: impl Into<LookupKind>,
        filter: impl Into<String>,
        provider_id: impl Into<String>,
    ) {
        self.entries
            .insert((kind.into(), filter.into()), provider_id.into());
    }

    pub fn with(
        mut self,
        kind: impl Into<LookupKind>,
        filter: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        self.insert(kind, filter, provider_id);
        self
    }

    pub fn resolve(&self, kind: impl Into<LookupKind>, filter: &str) -> Option<&str> {
        self.entries
            .get(&(kind.into(), filter.to_string()))
            .map(String::as_str)
    }

    pub fn contains(&self, kind: impl Into<LookupKind>, filter: &str) -> bool {
        self.resolve(kind, filter).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
