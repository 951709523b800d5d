// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::transport::TransportError;
use spray_directory::{DirectoryError, Epoch, ValidationError};
use std::time::Duration;
use thiserror::Error;

/// How a failure affects the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborts session establishment. Propagated to the caller of `start`, never retried.
    StartupFatal,

    /// Detected by a running worker. Funnelled through the fatal error channel and halts the client.
    RuntimeFatal,

    /// Logged by whoever observed it. The traffic pipeline keeps running.
    Recoverable,
}

impl ErrorKind {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::Recoverable)
    }
}

#[derive(Debug, Error)]
pub enum ClientCoreError {
    #[error("timed out after {timeout:?} while waiting for the initial directory document")]
    DirectoryTimeout { timeout: Duration },

    #[error("the session dial deadline got exceeded before the session became ready")]
    DialDeadlineExceeded,

    #[error("session establishment got cancelled")]
    Cancelled,

    #[error("the client got halted before the session became ready")]
    Halted,

    #[error("directory document for epoch {epoch} is not valid for the loop decoy traffic use case: {source}")]
    InvalidDirectory {
        epoch: Epoch,
        #[source]
        source: ValidationError,
    },

    #[error("received an invalid directory document update for epoch {epoch}: {source}")]
    InvalidDirectoryUpdate {
        epoch: Epoch,
        #[source]
        source: ValidationError,
    },

    #[error("failed to load or generate the link keys: {source}")]
    KeyLoadFailure {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to construct the mixnet transport: {source}")]
    TransportConnectFailure {
        #[source]
        source: TransportError,
    },

    #[error("failed to construct a probe packet: {source}")]
    PacketConstructionFailure {
        #[source]
        source: TransportError,
    },

    #[error("failed to send a probe packet: {source}")]
    PacketSendFailure {
        #[source]
        source: TransportError,
    },

    #[error("service lookup failed: {source}")]
    ServiceNotFound {
        #[source]
        source: DirectoryError,
    },

    #[error("no directory document is available yet")]
    NoDocument,

    #[error("the session has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error("experienced an I/O failure: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ClientCoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientCoreError::DirectoryTimeout { .. }
            | ClientCoreError::DialDeadlineExceeded
            | ClientCoreError::Cancelled
            | ClientCoreError::Halted
            | ClientCoreError::InvalidDirectory { .. }
            | ClientCoreError::KeyLoadFailure { .. }
            | ClientCoreError::TransportConnectFailure { .. }
            | ClientCoreError::AlreadyStarted
            | ClientCoreError::ConfigError(_)
            | ClientCoreError::Io { .. } => ErrorKind::StartupFatal,

            ClientCoreError::PacketConstructionFailure { .. }
            | ClientCoreError::InvalidDirectoryUpdate { .. } => ErrorKind::RuntimeFatal,

            ClientCoreError::PacketSendFailure { .. }
            | ClientCoreError::ServiceNotFound { .. }
            | ClientCoreError::NoDocument => ErrorKind::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

impl From<DirectoryError> for ClientCoreError {
    fn from(source: DirectoryError) -> Self {
        ClientCoreError::ServiceNotFound { source }
    }
}
