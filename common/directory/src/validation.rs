// Copyright 2020 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::DirectoryDocument;
use thiserror::Error;

/// Capability every provider has to expose for decoy loop traffic to be indistinguishable.
pub const LOOP_SERVICE: &str = "loop";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("provider '{provider}' does not have the '{}' service", LOOP_SERVICE)]
    MissingLoopService { provider: String },
}

/// Decide whether the document is usable for sending loop decoy traffic.
///
/// The document is only accepted if *every* provider advertises [LOOP_SERVICE]; if even a single
/// one does not, the traffic we'd generate would no longer blend in and the whole document is rejected.
pub fn validate(document: &DirectoryDocument) -> Result<(), ValidationError> {
    match document
        .providers
        .iter()
        .find(|provider| !provider.has_service(LOOP_SERVICE))
    {
        Some(provider) => Err(ValidationError::MissingLoopService {
            provider: provider.name.clone(),
        }),
        None => Ok(()),
    }
}
