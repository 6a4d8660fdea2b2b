use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_PORT: u16 = 22;

/// One named entry in the registry.
///
/// `port` is kept as a raw integer so a hand-edited file with a bad value
/// still loads; range checks happen in [`validate`] and at command build time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(rename = "host")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    /// `user@host`, or just the host when no user is set.
    pub fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.address),
            None => self.address.clone(),
        }
    }

    /// The port ssh will actually use.
    pub fn effective_port(&self) -> i64 {
        self.port.unwrap_or(DEFAULT_PORT as i64)
    }
}

/// Non-fatal findings reported alongside a successful validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationWarning {
    MissingBastion(String),
}

/// Checks `record` against the current registry contents.
///
/// `prior` names the record being edited so that keeping its own name is not
/// reported as a duplicate.
pub fn validate(
    record: &Host,
    hosts: &[Host],
    prior: Option<&str>,
) -> Result<Vec<ValidationWarning>, ValidationError> {
    let name = record.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if record.address.trim().is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    if hosts
        .iter()
        .any(|h| h.name == record.name && Some(h.name.as_str()) != prior)
    {
        return Err(ValidationError::DuplicateName(record.name.clone()));
    }
    if let Some(port) = record.port {
        if !(1..=65535).contains(&port) {
            return Err(ValidationError::PortOutOfRange(port));
        }
    }

    let mut warnings = Vec::new();
    if let Some(bastion) = &record.bastion {
        if bastion == &record.name {
            return Err(ValidationError::SelfBastion(record.name.clone()));
        }
        check_bastion_chain(record, hosts, prior)?;
        if !hosts
            .iter()
            .any(|h| &h.name == bastion && Some(h.name.as_str()) != prior)
        {
            warnings.push(ValidationWarning::MissingBastion(bastion.clone()));
        }
    }
    Ok(warnings)
}

// Follows the bastion chain as it would look with `record` installed.
fn check_bastion_chain(
    record: &Host,
    hosts: &[Host],
    prior: Option<&str>,
) -> Result<(), ValidationError> {
    let lookup = |name: &str| -> Option<&Host> {
        if name == record.name {
            return Some(record);
        }
        hosts
            .iter()
            .find(|h| h.name == name && Some(h.name.as_str()) != prior)
    };

    let mut seen = vec![record.name.as_str()];
    let mut current = record.bastion.as_deref();
    while let Some(name) = current {
        if seen.contains(&name) {
            return Err(ValidationError::BastionCycle(name.to_string()));
        }
        seen.push(name);
        current = lookup(name).and_then(|h| h.bastion.as_deref());
    }
    Ok(())
}
