// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A halt signal shared between all loops of a single component.
///
/// Cancelling a token cancels all of its children, but never its parent,
/// so a session can be halted without tearing down the client that owns it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: CancellationToken,
}

impl ShutdownToken {
    pub fn new() -> Self {
        ShutdownToken::default()
    }

    /// Create a token that gets cancelled whenever this one is,
    /// but that can also be cancelled independently.
    #[must_use]
    pub fn child_token(&self) -> Self {
        ShutdownToken {
            inner: self.inner.child_token(),
        }
    }

    /// Cancel this token and all of its children. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancelled()
    }

    /// Drive the provided future to completion unless the token gets cancelled first,
    /// in which case `None` is returned and the future is dropped.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => None,
            res = fut => Some(res),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelling_parent_cancels_children() {
        let parent = ShutdownToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_alone() {
        let parent = ShutdownToken::new();
        let child = parent.child_token();

        child.cancel();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_cancelled_short_circuits() {
        let token = ShutdownToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let res = token
            .run_until_cancelled(tokio::time::sleep(Duration::from_secs(3600)))
            .await;
        assert!(res.is_none());

        // already cancelled token never polls the future
        let res = token.run_until_cancelled(async { 42 }).await;
        assert!(res.is_none());

        let fresh = ShutdownToken::new();
        assert_eq!(fresh.run_until_cancelled(async { 42 }).await, Some(42));
    }
}
