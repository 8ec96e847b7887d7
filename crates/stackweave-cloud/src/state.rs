//! Provider-side resource state
//!
//! What `describe` reports about a created resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stackweave_core::ResourceKind;

/// State of a single provider resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    pub kind: ResourceKind,

    /// Current status
    pub status: ResourceStatus,

    /// Resource attributes (private IP, DNS name, etc.)
    pub attributes: Map<String, Value>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: ResourceStatus::Unknown,
            attributes: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource
///
/// For certificates `Creating` means pending validation and `Available`
/// means issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is being created
    Creating,
    /// Resource is deployed and usable
    Available,
    /// Resource is being deleted
    Deleting,
    /// Resource has been deleted
    Deleted,
    /// Resource is in error state
    Failed,
    /// Status is unknown
    Unknown,
}

impl ResourceStatus {
    pub fn is_ready(self) -> bool {
        self == ResourceStatus::Available
    }

    pub fn is_failed(self) -> bool {
        matches!(self, ResourceStatus::Failed | ResourceStatus::Deleted)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Available => write!(f, "available"),
            ResourceStatus::Deleting => write!(f, "deleting"),
            ResourceStatus::Deleted => write!(f, "deleted"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_state_attributes() {
        let mut state = ResourceState::new("i-0001", ResourceKind::Compute)
            .with_status(ResourceStatus::Creating)
            .with_attribute("private-ip", json!("10.0.0.1"));
        assert_eq!(state.get_attribute::<String>("private-ip").as_deref(), Some("10.0.0.1"));
        assert!(!state.status.is_ready());

        state.set_status(ResourceStatus::Available);
        assert!(state.status.is_ready());
        assert!(state.updated_at >= state.created_at);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(ResourceStatus::Available).unwrap(),
            json!("available")
        );
        assert!(ResourceStatus::Failed.is_failed());
        assert_eq!(ResourceStatus::Deleting.to_string(), "deleting");
    }
}
