// Copyright 2020 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::{DirectoryDocument, DirectoryError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Provider-side service resolved from a particular directory document.
/// It is only meaningful for as long as that document remains current.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Name of the service endpoint.
    pub name: String,

    /// Name of the provider hosting it.
    pub provider: String,
}

impl Display for ServiceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.provider)
    }
}

pub fn find_services(document: &DirectoryDocument, capability: &str) -> Vec<ServiceDescriptor> {
    document
        .providers
        .iter()
        .filter_map(|provider| {
            provider
                .services
                .get(capability)
                .map(|params| ServiceDescriptor {
                    name: params.endpoint.clone(),
                    provider: provider.name.clone(),
                })
        })
        .collect()
}

/// Pick one of the matching services uniformly at random so that probes are spread
/// across all equivalent endpoints.
pub fn select_service<R>(
    document: &DirectoryDocument,
    capability: &str,
    rng: &mut R,
) -> Result<ServiceDescriptor, DirectoryError>
where
    // I don't think there's a need for this RNG to be crypto-secure
    R: Rng + ?Sized,
{
    find_services(document, capability)
        .choose(rng)
        .cloned()
        .ok_or_else(|| DirectoryError::ServiceNotFound {
            capability: capability.to_string(),
        })
}
