//! TLS certificate handles

use super::node::{ResourceOutputs, field};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Region that hosts certificates consumed by edge distributions
pub const DEFAULT_EDGE_REGION: &str = "us-east-1";

/// Region alias normalised to the configured edge region
pub const GLOBAL_REGION_ALIAS: &str = "global";

/// Attribute carrying a certificate's validation state in node outputs
pub const VALIDATION_STATE: &str = "validation-state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    PendingValidation,
    Issued,
    Failed,
}

/// Content address of a certificate: `(domain, region, sanList)`
///
/// SANs are sorted and deduplicated so listing order does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CertificateKey {
    pub domain: String,
    pub region: String,
    pub san_list: Vec<String>,
}

impl CertificateKey {
    pub fn new(domain: impl Into<String>, region: impl Into<String>, san_list: &[String]) -> Self {
        let mut san_list = san_list.to_vec();
        san_list.sort();
        san_list.dedup();
        Self {
            domain: domain.into(),
            region: region.into(),
            san_list,
        }
    }
}

/// A requested certificate as seen by its consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateHandle {
    pub domain: String,
    pub region: String,
    pub san_list: Vec<String>,
    pub provider_id: String,
    pub validation_state: ValidationState,
}

impl CertificateHandle {
    pub fn new(key: &CertificateKey, provider_id: impl Into<String>) -> Self {
        Self {
            domain: key.domain.clone(),
            region: key.region.clone(),
            san_list: key.san_list.clone(),
            provider_id: provider_id.into(),
            validation_state: ValidationState::PendingValidation,
        }
    }

    pub fn key(&self) -> CertificateKey {
        CertificateKey::new(&self.domain, &self.region, &self.san_list)
    }

    pub fn is_issued(&self) -> bool {
        self.validation_state == ValidationState::Issued
    }

    /// Rebuild a handle from a ready certificate node's outputs
    pub fn from_outputs(outputs: &ResourceOutputs) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidField {
            node: outputs.node_id.clone(),
            field: "outputs".to_string(),
            reason: reason.to_string(),
        };

        let domain = outputs
            .attribute_str(field::DOMAIN)
            .ok_or_else(|| invalid("certificate outputs carry no domain"))?;
        let san_list: Vec<String> = outputs
            .attributes
            .get(field::SAN)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let validation_state = outputs
            .attributes
            .get(VALIDATION_STATE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(ValidationState::PendingValidation);

        Ok(Self {
            domain: domain.to_string(),
            region: outputs.region.clone(),
            san_list,
            provider_id: outputs.provider_id.clone(),
            validation_state,
        })
    }

    /// Attributes published by a ready certificate node
    pub fn to_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attributes = serde_json::Map::new();
        attributes.insert(field::DOMAIN.to_string(), json!(self.domain));
        attributes.insert(field::SAN.to_string(), json!(self.san_list));
        attributes.insert(VALIDATION_STATE.to_string(), json!(self.validation_state));
        attributes
    }
}
