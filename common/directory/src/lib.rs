// Copyright 2020 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use thiserror::Error;

pub mod services;
pub mod validation;

pub use services::{find_services, select_service, ServiceDescriptor};
pub use validation::{validate, ValidationError, LOOP_SERVICE};

pub type Epoch = u64;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("service '{capability}' was not found in the directory document")]
    ServiceNotFound { capability: String },

    #[error("failed to read the directory document from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("the directory document is malformed: {source}")]
    Malformed {
        #[from]
        source: serde_json::Error,
    },
}

/// Endpoint metadata a provider publishes for one of its services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParameters {
    pub endpoint: String,

    /// Any other service-specific parameters, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServiceParameters {
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        ServiceParameters {
            endpoint: endpoint.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,

    /// Map of capability name to the parameters of the service exposing it.
    #[serde(default)]
    pub services: HashMap<String, ServiceParameters>,
}

impl ProviderDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ProviderDescriptor {
            name: name.into(),
            services: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_service<S: Into<String>>(mut self, capability: S, params: ServiceParameters) -> Self {
        self.services.insert(capability.into(), params);
        self
    }

    pub fn has_service(&self, capability: &str) -> bool {
        self.services.contains_key(capability)
    }
}

/// Snapshot of the network as published by the directory authority for a single epoch.
/// Once received it is never modified, a newer document replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDocument {
    pub epoch: Epoch,

    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,
}

impl Display for DirectoryDocument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "directory document for epoch {} ({} providers)",
            self.epoch,
            self.providers.len()
        )
    }
}

impl DirectoryDocument {
    pub fn new(epoch: Epoch, providers: Vec<ProviderDescriptor>) -> Self {
        DirectoryDocument { epoch, providers }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn new_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let document = serde_json::from_slice(&raw)?;
        log::debug!("loaded directory document from {}", path.display());
        Ok(document)
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    pub(crate) fn provider_with(name: &str, capabilities: &[&str]) -> ProviderDescriptor {
        capabilities
            .iter()
            .fold(ProviderDescriptor::new(name), |provider, cap| {
                provider.with_service(*cap, ServiceParameters::new(format!("{cap}-{name}")))
            })
    }
}
