// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::ShutdownToken;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, Instrument};

/// Combined [TaskTracker](tokio_util::task::TaskTracker) and [ShutdownToken](ShutdownToken)
/// for spawning long-running workers and waiting until all of them have exited.
#[derive(Clone, Debug, Default)]
pub struct ShutdownTracker {
    tracker: TaskTracker,
    root_token: ShutdownToken,
}

impl ShutdownTracker {
    pub fn new() -> Self {
        ShutdownTracker::default()
    }

    /// Create a tracker whose root token is derived from an existing one,
    /// so that cancelling the external token also halts all tracked workers.
    pub fn new_from_external_shutdown_token(shutdown_token: ShutdownToken) -> Self {
        ShutdownTracker {
            tracker: TaskTracker::new(),
            root_token: shutdown_token,
        }
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.root_token
    }

    pub fn clone_shutdown_token(&self) -> ShutdownToken {
        self.root_token.clone()
    }

    /// Spawn the provided future on the current Tokio runtime and track it.
    /// The name is attached to a tracing span wrapping the whole task.
    #[track_caller]
    pub fn spawn_named<F>(&self, task: F, name: &str) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug!("spawning tracked task '{name}'");
        self.tracker
            .spawn(task.instrument(tracing::debug_span!("task", name = %name)))
    }

    pub fn tracked_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker once every worker has been spawned. No further tasks are expected.
    pub fn close_tracker(&self) -> bool {
        self.tracker.close()
    }

    /// Cancel the root token and wait until every tracked task has exited.
    pub async fn shutdown(&self) {
        self.root_token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
