// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::ClientCoreError;
use tokio::sync::mpsc;
use tracing::debug;

pub fn fatal_error_channel() -> (FatalErrorSender, FatalErrorReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FatalErrorSender(tx), FatalErrorReceiver(rx))
}

/// Single path through which every fatal condition reaches the shutdown logic,
/// regardless of which worker detected it.
#[derive(Debug, Clone)]
pub struct FatalErrorSender(mpsc::UnboundedSender<ClientCoreError>);

impl FatalErrorSender {
    /// Never blocks. Reports made after the receiving side got closed are dropped.
    pub fn report(&self, err: ClientCoreError) {
        debug_assert!(err.is_fatal(), "{err} is not a fatal error");
        if let Err(mpsc::error::SendError(err)) = self.0.send(err) {
            debug!("the fatal error channel is already closed, dropping: {err}");
        }
    }
}

#[derive(Debug)]
pub struct FatalErrorReceiver(mpsc::UnboundedReceiver<ClientCoreError>);

impl FatalErrorReceiver {
    pub async fn recv(&mut self) -> Option<ClientCoreError> {
        self.0.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientCoreError> {
        self.0.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.0.close()
    }
}
