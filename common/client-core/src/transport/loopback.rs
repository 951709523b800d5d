// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

//! In-process transport that never leaves the machine.
//!
//! It behaves like a provider connection from the session's point of view: the connection is
//! reported as established after a configurable delay, the configured directory document is
//! published immediately and then re-published periodically, and composed packets have the
//! size and shape of real ones. Sent packets are only counted.

use crate::config::LoopbackSettings;
use crate::transport::{
    ConnectionParams, MixnetTransport, ProbePacket, Recipient, SurbId, TransportConnector,
    TransportError, TransportEvents, SURB_ID_LENGTH,
};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use rand::RngCore;
use spray_directory::{DirectoryDocument, DirectoryError};
use spray_task::ShutdownToken;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Routing information and SURB prepended to every payload.
pub const PACKET_HEADER_SIZE: usize = 365;
pub const PACKET_PAYLOAD_SIZE: usize = 2048;
pub const PACKET_SIZE: usize = PACKET_HEADER_SIZE + PACKET_PAYLOAD_SIZE;

pub struct LoopbackConnector {
    document: Arc<DirectoryDocument>,
    settings: LoopbackSettings,
}

impl LoopbackConnector {
    pub fn new(settings: LoopbackSettings) -> Result<Self, DirectoryError> {
        let document = DirectoryDocument::new_from_file(&settings.directory_file)?;
        Ok(Self::new_with_document(document, settings))
    }

    pub fn new_with_document(document: DirectoryDocument, settings: LoopbackSettings) -> Self {
        LoopbackConnector {
            document: Arc::new(document),
            settings,
        }
    }
}

impl TransportConnector for LoopbackConnector {
    fn connect(&self, params: ConnectionParams) -> Result<Arc<dyn MixnetTransport>, TransportError> {
        info!(
            "connecting {}@{} to the loopback provider with link key {}",
            params.user,
            params.provider,
            params.link_keys.public_key()
        );
        if let Some(pin) = &params.provider_key_pin {
            debug!("ignoring provider key pin {pin}");
        }

        let transport = Arc::new(LoopbackTransport {
            connected: AtomicBool::new(false),
            document: ArcSwapOption::empty(),
            clock_skew: self.settings.clock_skew(),
            sent: AtomicU64::new(0),
            shutdown: ShutdownToken::new(),
        });

        tokio::spawn(run_provider(
            transport.clone(),
            self.document.clone(),
            self.settings.clone(),
            params.events,
        ));

        Ok(transport)
    }
}

async fn run_provider(
    transport: Arc<LoopbackTransport>,
    document: Arc<DirectoryDocument>,
    settings: LoopbackSettings,
    events: TransportEvents,
) {
    let shutdown = transport.shutdown.clone();
    transport.publish(document.clone(), &events);

    let connect_delay = tokio::time::sleep(settings.connect_delay);
    tokio::pin!(connect_delay);
    let mut refresh = tokio::time::interval(settings.document_refresh_interval);
    // the first tick completes immediately and the document has just been published
    refresh.tick().await;

    let mut connected = false;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                trace!("loopback provider: received shutdown");
                break;
            }
            _ = &mut connect_delay, if !connected => {
                connected = true;
                transport.connected.store(true, Ordering::SeqCst);
                events.on_connection(Ok(()));
            }
            _ = refresh.tick() => {
                if events.is_closed() {
                    debug!("loopback provider: the session is gone, closing the connection");
                    transport.connected.store(false, Ordering::SeqCst);
                    break;
                }
                transport.publish(document.clone(), &events)
            }
        }
    }

    if connected {
        events.on_disconnect();
    }
}

pub struct LoopbackTransport {
    connected: AtomicBool,
    document: ArcSwapOption<DirectoryDocument>,
    clock_skew: time::Duration,
    sent: AtomicU64,
    shutdown: ShutdownToken,
}

impl LoopbackTransport {
    fn publish(&self, document: Arc<DirectoryDocument>, events: &TransportEvents) {
        self.document.store(Some(document.clone()));
        events.on_document(document);
    }

    pub fn sent_packets(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MixnetTransport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_document(&self) -> Option<Arc<DirectoryDocument>> {
        self.document.load_full()
    }

    async fn compose_packet(
        &self,
        recipient: &Recipient,
        payload: &[u8],
    ) -> Result<ProbePacket, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let document = self.current_document().ok_or(TransportError::NoDocument)?;
        if document.provider(&recipient.provider).is_none() {
            return Err(TransportError::UnreachableRecipient {
                recipient: recipient.clone(),
            });
        }
        if payload.len() > PACKET_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                capacity: PACKET_PAYLOAD_SIZE,
            });
        }

        let mut rng = rand::rngs::OsRng;
        let mut surb_id = [0u8; SURB_ID_LENGTH];
        rng.try_fill_bytes(&mut surb_id)
            .map_err(TransportError::erased)?;

        // the whole packet is indistinguishable from random bytes
        let mut bytes = vec![0u8; PACKET_SIZE];
        rng.try_fill_bytes(&mut bytes)
            .map_err(TransportError::erased)?;

        Ok(ProbePacket {
            bytes,
            surb_id: Some(SurbId(surb_id)),
        })
    }

    async fn send_packet(&self, packet: ProbePacket) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let sent = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("loopback: sent packet #{sent} of {} bytes", packet.len());
        Ok(())
    }

    fn clock_skew(&self) -> time::Duration {
        self.clock_skew
    }

    async fn disconnect(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(
                "disconnecting the loopback transport after {} sent packets",
                self.sent_packets()
            );
        }
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}
