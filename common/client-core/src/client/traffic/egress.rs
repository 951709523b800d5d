// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::client::traffic::rate_limit::TokenBucket;
use crate::client::traffic::PacketReceiver;
use crate::error::ClientCoreError;
use crate::transport::{MixnetTransport, ProbePacket};
use spray_task::ShutdownToken;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Sole consumer of constructed packets and sole owner of the rate limiter.
pub(crate) struct EgressController {
    transport: Arc<dyn MixnetTransport>,
    packet_rx: PacketReceiver,
    limiter: TokenBucket,
    shutdown: ShutdownToken,

    sent: u64,
    failed: u64,
}

impl EgressController {
    pub(crate) fn new(
        transport: Arc<dyn MixnetTransport>,
        packet_rx: PacketReceiver,
        send_rate: f64,
        send_burst: u32,
        shutdown: ShutdownToken,
    ) -> Self {
        EgressController {
            transport,
            packet_rx,
            limiter: TokenBucket::new(send_rate, send_burst),
            shutdown,
            sent: 0,
            failed: 0,
        }
    }

    /// Returns `false` if shutdown was signalled while handling the packet.
    async fn on_packet(&mut self, packet: ProbePacket) -> bool {
        if !self.limiter.acquire(&self.shutdown).await {
            return false;
        }

        let Some(result) = self
            .shutdown
            .run_until_cancelled(self.transport.send_packet(packet))
            .await
        else {
            return false;
        };

        match result {
            Ok(()) => {
                self.sent += 1;
                trace!("sent probe packet #{}", self.sent);
            }
            Err(source) => {
                // lost probes are acceptable, the packet is not retried
                let err = ClientCoreError::PacketSendFailure { source };
                debug_assert!(!err.is_fatal());
                self.failed += 1;
                warn!("{err} (dropped {} packets so far)", self.failed);
            }
        }
        true
    }

    pub(crate) async fn run(mut self) {
        debug!("started EgressController with graceful shutdown support");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    trace!("EgressController: received shutdown");
                    break;
                }
                packet = self.packet_rx.recv() => match packet {
                    Some(packet) => {
                        if !self.on_packet(packet).await {
                            trace!("EgressController: received shutdown");
                            break;
                        }
                    }
                    None => {
                        trace!("EgressController: stopping since channel closed");
                        break;
                    }
                }
            }
        }

        debug!(
            "EgressController: exiting after sending {} packets ({} failures)",
            self.sent, self.failed
        );
    }
}
