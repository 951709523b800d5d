// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use spray_crypto::asymmetric::x25519;
use spray_directory::DirectoryDocument;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use crate::client::session::operations::TransportEvents;

pub mod loopback;

#[cfg(test)]
pub(crate) mod mock;

pub const SURB_ID_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("the transport is not connected to the provider")]
    NotConnected,

    #[error("the transport has been shut down")]
    Closed,

    #[error("no directory document is available for routing")]
    NoDocument,

    #[error("recipient '{recipient}' is not reachable with the current directory document")]
    UnreachableRecipient { recipient: Recipient },

    #[error("payload of {size} bytes exceeds the packet capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    // we need to type erase the error type since we can't have dynamic associated types alongside dynamic dispatch
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    pub fn erased<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        TransportError::Backend(Box::new(err))
    }
}

/// Destination of probe packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub user: String,
    pub provider: String,
}

impl Recipient {
    pub fn new<S1: Into<String>, S2: Into<String>>(user: S1, provider: S2) -> Self {
        Recipient {
            user: user.into(),
            provider: provider.into(),
        }
    }
}

impl Display for Recipient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.provider)
    }
}

/// Identifier of the single use reply block embedded in a probe packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurbId(pub [u8; SURB_ID_LENGTH]);

impl Display for SurbId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Fully encrypted packet, ready to be handed to the provider.
#[derive(Debug, Clone)]
pub struct ProbePacket {
    pub bytes: Vec<u8>,
    pub surb_id: Option<SurbId>,
}

impl ProbePacket {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Everything a connector needs to establish the session with the provider.
pub struct ConnectionParams {
    pub user: String,
    pub provider: String,
    pub provider_key_pin: Option<x25519::PublicKey>,
    pub link_keys: Arc<x25519::KeyPair>,
    pub message_polling_interval: Duration,

    /// Sink for everything the transport reports asynchronously.
    pub events: TransportEvents,
}

/// Opens connections to the provider.
pub trait TransportConnector: Send + Sync {
    /// Must not block. Completion of the connection, as well as any directory documents,
    /// are reported later through [TransportEvents].
    fn connect(&self, params: ConnectionParams) -> Result<Arc<dyn MixnetTransport>, TransportError>;
}

/// Established connection to the provider, including the cryptographic layer
/// that turns payloads into mixnet packets.
#[async_trait]
pub trait MixnetTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Most recent directory document the transport knows about.
    fn current_document(&self) -> Option<Arc<DirectoryDocument>>;

    async fn compose_packet(
        &self,
        recipient: &Recipient,
        payload: &[u8],
    ) -> Result<ProbePacket, TransportError>;

    async fn send_packet(&self, packet: ProbePacket) -> Result<(), TransportError>;

    /// Difference between the provider's clock and ours. Positive if the provider is ahead.
    fn clock_skew(&self) -> time::Duration;

    /// Tear the connection down. Calling it more than once has no further effect.
    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surb_id_is_displayed_as_hex() {
        let mut raw = [0u8; SURB_ID_LENGTH];
        raw[0] = 0xab;
        raw[15] = 0x01;
        assert_eq!(
            SurbId(raw).to_string(),
            "ab000000000000000000000000000001"
        );
    }

    #[test]
    fn recipient_is_displayed_as_address() {
        assert_eq!(Recipient::new("echo", "acme").to_string(), "echo@acme");
    }
}
