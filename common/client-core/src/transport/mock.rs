// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::transport::{
    ConnectionParams, MixnetTransport, ProbePacket, Recipient, SurbId, TransportConnector,
    TransportError, TransportEvents,
};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use spray_directory::{DirectoryDocument, Epoch, ProviderDescriptor, ServiceParameters, LOOP_SERVICE};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn provider(name: &str, capabilities: &[&str]) -> ProviderDescriptor {
    capabilities
        .iter()
        .fold(ProviderDescriptor::new(name), |provider, cap| {
            provider.with_service(*cap, ServiceParameters::new(format!("{cap}-{name}")))
        })
}

pub(crate) fn valid_document(epoch: Epoch) -> DirectoryDocument {
    DirectoryDocument::new(
        epoch,
        vec![
            provider("acme", &[LOOP_SERVICE, "echo"]),
            provider("provider-2", &[LOOP_SERVICE, "echo", "keyserver"]),
        ],
    )
}

pub(crate) fn invalid_document(epoch: Epoch) -> DirectoryDocument {
    DirectoryDocument::new(
        epoch,
        vec![
            provider("acme", &[LOOP_SERVICE, "echo"]),
            provider("rogue", &["echo"]),
        ],
    )
}

/// Transport with fault injection and counters for everything the session does with it.
#[derive(Default)]
pub(crate) struct MockTransport {
    connected: AtomicBool,
    document: ArcSwapOption<DirectoryDocument>,
    clock_skew_secs: AtomicI64,

    fail_sends: AtomicBool,
    // compose fails once this many packets have been constructed
    compose_limit: AtomicUsize,

    composed: AtomicUsize,
    send_attempts: AtomicUsize,
    sent: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        MockTransport {
            compose_limit: AtomicUsize::new(usize::MAX),
            ..Default::default()
        }
    }

    pub(crate) fn connected_with_valid_document() -> Self {
        let transport = MockTransport::new();
        transport.set_connected(true);
        transport.set_document(valid_document(1));
        transport
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst)
    }

    pub(crate) fn set_document(&self, document: DirectoryDocument) {
        self.document.store(Some(Arc::new(document)))
    }

    pub(crate) fn set_clock_skew(&self, skew: time::Duration) {
        self.clock_skew_secs
            .store(skew.whole_seconds(), Ordering::SeqCst)
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst)
    }

    pub(crate) fn fail_compose_after(&self, packets: usize) {
        self.compose_limit.store(packets, Ordering::SeqCst)
    }

    pub(crate) fn composed_packets(&self) -> usize {
        self.composed.load(Ordering::SeqCst)
    }

    pub(crate) fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_packets(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MixnetTransport for MockTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_document(&self) -> Option<Arc<DirectoryDocument>> {
        self.document.load_full()
    }

    async fn compose_packet(
        &self,
        _recipient: &Recipient,
        payload: &[u8],
    ) -> Result<ProbePacket, TransportError> {
        if self.composed.load(Ordering::SeqCst) >= self.compose_limit.load(Ordering::SeqCst) {
            return Err(TransportError::NoDocument);
        }
        let id = self.composed.fetch_add(1, Ordering::SeqCst);
        let mut surb_id = [0u8; 16];
        surb_id[..8].copy_from_slice(&(id as u64).to_be_bytes());
        Ok(ProbePacket {
            bytes: payload.to_vec(),
            surb_id: Some(SurbId(surb_id)),
        })
    }

    async fn send_packet(&self, _packet: ProbePacket) -> Result<(), TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clock_skew(&self) -> time::Duration {
        time::Duration::seconds(self.clock_skew_secs.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Event the connector replays through the session callbacks after connecting.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Wait(Duration),
    Connected,
    Document(DirectoryDocument),
}

pub(crate) struct MockConnector {
    transport: Arc<MockTransport>,
    refuse: bool,
    script: Vec<Scripted>,
    events: Mutex<Option<TransportEvents>>,
}

impl MockConnector {
    pub(crate) fn new(transport: Arc<MockTransport>) -> Self {
        MockConnector {
            transport,
            refuse: false,
            script: Vec::new(),
            events: Mutex::new(None),
        }
    }

    pub(crate) fn refusing(transport: Arc<MockTransport>) -> Self {
        MockConnector {
            refuse: true,
            ..MockConnector::new(transport)
        }
    }

    #[must_use]
    pub(crate) fn with_script(mut self, script: Vec<Scripted>) -> Self {
        self.script = script;
        self
    }

    /// Callbacks handed over by the most recent `connect`.
    pub(crate) fn events(&self) -> Option<TransportEvents> {
        self.events.lock().unwrap().clone()
    }
}

impl TransportConnector for MockConnector {
    fn connect(&self, params: ConnectionParams) -> Result<Arc<dyn MixnetTransport>, TransportError> {
        if self.refuse {
            return Err(TransportError::Closed);
        }
        *self.events.lock().unwrap() = Some(params.events.clone());

        let transport = self.transport.clone();
        let events = params.events;
        let script = self.script.clone();
        tokio::spawn(async move {
            for step in script {
                match step {
                    Scripted::Wait(delay) => tokio::time::sleep(delay).await,
                    Scripted::Connected => {
                        transport.set_connected(true);
                        events.on_connection(Ok(()))
                    }
                    Scripted::Document(document) => {
                        transport.set_document(document.clone());
                        events.on_document(Arc::new(document))
                    }
                }
            }
        });

        Ok(self.transport.clone())
    }
}
