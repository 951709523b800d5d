// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::client::fatal::FatalErrorSender;
use crate::client::traffic::PacketSender;
use crate::error::ClientCoreError;
use crate::transport::{MixnetTransport, Recipient};
use spray_task::ShutdownToken;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Keeps producing probe packets addressed to the configured target for as long as
/// the egress side keeps accepting them.
pub(crate) struct PacketConstructor {
    transport: Arc<dyn MixnetTransport>,
    recipient: Recipient,
    payload: Vec<u8>,
    packet_tx: PacketSender,
    fatal_tx: FatalErrorSender,
    shutdown: ShutdownToken,
    constructed: u64,
}

impl PacketConstructor {
    pub(crate) fn new(
        transport: Arc<dyn MixnetTransport>,
        recipient: Recipient,
        payload_size: usize,
        packet_tx: PacketSender,
        fatal_tx: FatalErrorSender,
        shutdown: ShutdownToken,
    ) -> Self {
        PacketConstructor {
            transport,
            recipient,
            payload: vec![0u8; payload_size],
            packet_tx,
            fatal_tx,
            shutdown,
            constructed: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("started PacketConstructor targeting {}", self.recipient);

        loop {
            let composed = self
                .shutdown
                .run_until_cancelled(self.transport.compose_packet(&self.recipient, &self.payload))
                .await;

            let packet = match composed {
                None => {
                    trace!("PacketConstructor: received shutdown");
                    break;
                }
                Some(Ok(packet)) => packet,
                Some(Err(source)) => {
                    // the cryptographic layer is unusable, nothing more can be sent in this session
                    error!("failed to construct a probe packet: {source}");
                    self.fatal_tx
                        .report(ClientCoreError::PacketConstructionFailure { source });
                    break;
                }
            };
            self.constructed += 1;

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    trace!("PacketConstructor: received shutdown");
                    break;
                }
                sent = self.packet_tx.send(packet) => {
                    if sent.is_err() {
                        trace!("PacketConstructor: stopping since egress channel closed");
                        break;
                    }
                }
            }
        }

        debug!(
            "PacketConstructor: exiting after constructing {} packets",
            self.constructed
        );
    }
}
