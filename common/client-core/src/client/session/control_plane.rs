// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::client::fatal::FatalErrorSender;
use crate::client::session::operations::{OperationReceiver, SessionOp};
use crate::config::DirectoryPolicy;
use crate::error::ClientCoreError;
use crate::transport::MixnetTransport;
use arc_swap::ArcSwapOption;
use spray_directory::{validate, DirectoryDocument};
use spray_task::ShutdownToken;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, trace, warn};

/// Clock difference to the provider above which the operator gets warned.
pub const MAX_CLOCK_SKEW: time::Duration = time::Duration::minutes(2);

pub(crate) fn is_excessive_clock_skew(skew: time::Duration) -> bool {
    skew.abs() >= MAX_CLOCK_SKEW
}

/// Owns all mutable session state. Every change arrives as a [SessionOp],
/// so none of the fields need any locking.
pub(crate) struct ControlPlane {
    op_rx: OperationReceiver,
    transport: Arc<dyn MixnetTransport>,
    directory_policy: DirectoryPolicy,
    fatal_tx: FatalErrorSender,
    shutdown: ShutdownToken,

    // written here only, read by `Session::get_service`
    current_document: Arc<ArcSwapOption<DirectoryDocument>>,
    is_connected: bool,
    online_at: Option<OffsetDateTime>,
}

impl ControlPlane {
    pub(crate) fn new(
        op_rx: OperationReceiver,
        transport: Arc<dyn MixnetTransport>,
        directory_policy: DirectoryPolicy,
        current_document: Arc<ArcSwapOption<DirectoryDocument>>,
        fatal_tx: FatalErrorSender,
        shutdown: ShutdownToken,
    ) -> Self {
        ControlPlane {
            op_rx,
            transport,
            directory_policy,
            fatal_tx,
            shutdown,
            current_document,
            is_connected: false,
            online_at: None,
        }
    }

    fn on_connectivity_change(&mut self, is_connected: bool) {
        let was_connected = std::mem::replace(&mut self.is_connected, is_connected);
        if !is_connected {
            if was_connected {
                info!("lost connection to the provider");
            }
            return;
        }
        if was_connected {
            trace!("connectivity notification while already connected");
            return;
        }

        let now = OffsetDateTime::now_utc();
        self.online_at = Some(now);

        let skew = self.transport.clock_skew();
        if is_excessive_clock_skew(skew) {
            warn!(
                "the observed time difference between us and the provider is {skew}, \
                 which exceeds the tolerated {MAX_CLOCK_SKEW}. Check the system clock"
            );
        } else {
            debug!("online since {now}, clock skew: {skew}");
        }
    }

    fn on_new_document(&mut self, document: Arc<DirectoryDocument>) {
        if let Err(source) = validate(&document) {
            match self.directory_policy {
                DirectoryPolicy::Warn => {
                    warn!("{document} is not valid for the loop decoy traffic use case: {source}. Using it anyway");
                }
                DirectoryPolicy::Halt => {
                    error!("{document} is not valid for the loop decoy traffic use case: {source}");
                    self.fatal_tx
                        .report(ClientCoreError::InvalidDirectoryUpdate {
                            epoch: document.epoch,
                            source,
                        });
                    return;
                }
            }
        }

        debug!("switching to {document}");
        self.current_document.store(Some(document));
    }

    pub(crate) fn handle(&mut self, op: SessionOp) {
        trace!("handling {op}");
        match op {
            SessionOp::Empty => {}
            SessionOp::ConnectivityChanged { is_connected } => {
                self.on_connectivity_change(is_connected)
            }
            SessionOp::NewDocument(document) => self.on_new_document(document),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("started ControlPlane with graceful shutdown support");

        // connectivity notifications that arrived before the session became ready were discarded
        if self.transport.is_connected() {
            self.on_connectivity_change(true);
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    trace!("ControlPlane: received shutdown");
                    break;
                }
                op = self.op_rx.recv() => match op {
                    Some(op) => self.handle(op),
                    None => {
                        trace!("ControlPlane: stopping since operation channel closed");
                        break;
                    }
                }
            }
        }

        debug!("ControlPlane: exiting");
    }

    #[cfg(test)]
    pub(crate) fn online_at(&self) -> Option<OffsetDateTime> {
        self.online_at
    }
}
