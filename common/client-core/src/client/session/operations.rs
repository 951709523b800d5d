// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::transport::{SurbId, TransportError};
use spray_directory::DirectoryDocument;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub(crate) type OperationSender = mpsc::UnboundedSender<SessionOp>;
pub(crate) type OperationReceiver = mpsc::UnboundedReceiver<SessionOp>;

pub(crate) fn operation_channel() -> (OperationSender, OperationReceiver) {
    mpsc::unbounded_channel()
}

/// Tagged state change delivered to the session's control plane.
#[derive(Debug, Clone)]
pub enum SessionOp {
    /// Reserved for cleanup hooks. Has no effect.
    Empty,

    ConnectivityChanged { is_connected: bool },

    NewDocument(Arc<DirectoryDocument>),
}

impl Display for SessionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SessionOp::Empty => write!(f, "empty"),
            SessionOp::ConnectivityChanged { is_connected } => {
                write!(f, "connectivity change (connected: {is_connected})")
            }
            SessionOp::NewDocument(document) => write!(f, "new {document}"),
        }
    }
}

/// Callback sink handed over to the transport.
///
/// Every handler either enqueues a [SessionOp] or logs, and returns immediately,
/// so the transport's own tasks are never held up by session logic.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    op_tx: OperationSender,
}

impl TransportEvents {
    pub(crate) fn new(op_tx: OperationSender) -> Self {
        TransportEvents { op_tx }
    }

    fn enqueue(&self, op: SessionOp) {
        if let Err(err) = self.op_tx.send(op) {
            trace!("the session is gone, dropping {}", err.0);
        }
    }

    pub fn on_connection(&self, result: Result<(), TransportError>) {
        match result {
            Ok(()) => {
                info!("connected to the provider");
                self.enqueue(SessionOp::ConnectivityChanged { is_connected: true })
            }
            Err(err) => {
                warn!("connection to the provider failed: {err}");
                self.enqueue(SessionOp::ConnectivityChanged {
                    is_connected: false,
                })
            }
        }
    }

    pub fn on_disconnect(&self) {
        self.enqueue(SessionOp::ConnectivityChanged {
            is_connected: false,
        })
    }

    pub fn on_document(&self, document: Arc<DirectoryDocument>) {
        debug!("received directory document for epoch {}", document.epoch);
        self.enqueue(SessionOp::NewDocument(document))
    }

    pub fn on_message(&self, ciphertext: &[u8]) {
        debug!("received an inbound message of {} bytes", ciphertext.len());
    }

    pub fn on_ack(&self, surb_id: &SurbId, ciphertext: &[u8]) {
        info!(
            "received an acknowledgement for SURB {surb_id} ({} bytes)",
            ciphertext.len()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.op_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_enqueue_operations_in_order() {
        let (op_tx, mut op_rx) = operation_channel();
        let events = TransportEvents::new(op_tx);

        events.on_connection(Ok(()));
        events.on_document(Arc::new(DirectoryDocument::new(3, Vec::new())));
        events.on_message(b"hello");
        events.on_disconnect();

        assert!(matches!(
            op_rx.try_recv(),
            Ok(SessionOp::ConnectivityChanged { is_connected: true })
        ));
        assert!(matches!(op_rx.try_recv(), Ok(SessionOp::NewDocument(doc)) if doc.epoch == 3));
        assert!(matches!(
            op_rx.try_recv(),
            Ok(SessionOp::ConnectivityChanged {
                is_connected: false
            })
        ));
        assert!(op_rx.try_recv().is_err());
    }

    #[test]
    fn callbacks_after_session_is_gone_are_dropped() {
        let (op_tx, op_rx) = operation_channel();
        let events = TransportEvents::new(op_tx);
        drop(op_rx);

        assert!(events.is_closed());
        events.on_connection(Err(TransportError::NotConnected));
        events.on_document(Arc::new(DirectoryDocument::new(1, Vec::new())));
    }
}
