// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::client::fatal::{fatal_error_channel, FatalErrorReceiver, FatalErrorSender};
use crate::client::key_manager::{create_data_dir, load_or_generate_link_keys};
use crate::client::session::{Session, StartupContext};
use crate::config::Config;
use crate::error::ClientCoreError;
use crate::transport::TransportConnector;
use spray_crypto::asymmetric::x25519;
use spray_directory::ServiceDescriptor;
use spray_task::ShutdownToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

pub mod fatal;
pub mod key_manager;
pub mod session;
pub(crate) mod traffic;

/// Handle to the spray client. Cheap to clone, every clone refers to the same client.
#[derive(Clone)]
pub struct SprayClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    connector: Box<dyn TransportConnector>,
    fatal_tx: FatalErrorSender,

    started: AtomicBool,
    // held for the whole of `start`, so the teardown never misses a session that is being set up
    startup_lock: Mutex<()>,
    session: OnceCell<Session>,

    // parent of every session halt token
    halt_token: ShutdownToken,
    fatal_channel_closed: ShutdownToken,
    halted: ShutdownToken,
    teardown: OnceCell<()>,

    // the fatal error that triggered the halt, if any
    fatal_error: OnceLock<ClientCoreError>,
}

impl SprayClient {
    /// Creates the client and spawns the watcher that halts it upon the first fatal error.
    /// Has to be called from within a tokio runtime.
    pub fn new<C>(config: Config, connector: C) -> Result<Self, ClientCoreError>
    where
        C: TransportConnector + 'static,
    {
        create_data_dir(&config.client.data_dir)?;

        let (fatal_tx, fatal_rx) = fatal_error_channel();
        let client = SprayClient {
            inner: Arc::new(ClientInner {
                config,
                connector: Box::new(connector),
                fatal_tx,
                started: AtomicBool::new(false),
                startup_lock: Mutex::new(()),
                session: OnceCell::new(),
                halt_token: ShutdownToken::new(),
                fatal_channel_closed: ShutdownToken::new(),
                halted: ShutdownToken::new(),
                teardown: OnceCell::new(),
                fatal_error: OnceLock::new(),
            }),
        };

        tokio::spawn(client.clone().watch_fatal_errors(fatal_rx));
        Ok(client)
    }

    /// Generates (or loads) the link keys without establishing any session.
    pub fn generate_keys(config: &Config) -> Result<x25519::PublicKey, ClientCoreError> {
        create_data_dir(config.account_data_dir())?;
        let keys = load_or_generate_link_keys(&config.link_key_paths(), &mut rand::rngs::OsRng)
            .map_err(|source| ClientCoreError::KeyLoadFailure { source })?;
        Ok(*keys.public_key())
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    async fn watch_fatal_errors(self, mut fatal_rx: FatalErrorReceiver) {
        tokio::select! {
            biased;
            _ = self.inner.fatal_channel_closed.cancelled() => {
                debug!("fatal error watcher: the client got halted");
            }
            err = fatal_rx.recv() => {
                if let Some(err) = err {
                    warn!("shutting down due to error: {err}");
                    let _ = self.inner.fatal_error.set(err);
                    self.halt().await;
                }
            }
        }
        fatal_rx.close();
    }

    /// Establishes the session, bounded by the configured dial timeout.
    pub async fn start(&self) -> Result<&Session, ClientCoreError> {
        let ctx = StartupContext::with_timeout(
            ShutdownToken::new(),
            self.inner.config.debug.session_dial_timeout,
        );
        self.start_with_context(ctx).await
    }

    /// Establishes the session. Can only succeed once per client.
    pub async fn start_with_context(
        &self,
        ctx: StartupContext,
    ) -> Result<&Session, ClientCoreError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ClientCoreError::AlreadyStarted);
        }

        let _startup = self.inner.startup_lock.lock().await;
        if self.inner.halt_token.is_cancelled() {
            return Err(ClientCoreError::Halted);
        }

        let session = Session::start(
            ctx,
            &self.inner.config,
            self.inner.connector.as_ref(),
            &self.inner.halt_token,
            self.inner.fatal_tx.clone(),
        )
        .await?;

        if self.inner.session.set(session).is_err() {
            return Err(ClientCoreError::AlreadyStarted);
        }

        // a concurrent halt is blocked on the startup lock and tears this session down
        // as soon as we release it
        if self.inner.halt_token.is_cancelled() {
            return Err(ClientCoreError::Halted);
        }
        self.inner
            .session
            .get()
            .ok_or(ClientCoreError::AlreadyStarted)
    }

    /// Stops the client. Safe to call any number of times from any task,
    /// every caller returns once the single teardown has completed.
    pub async fn halt(&self) {
        self.inner
            .teardown
            .get_or_init(|| async move {
                info!("starting graceful shutdown");
                self.inner.halt_token.cancel();

                // any in-flight startup observes the cancelled token and finishes promptly
                drop(self.inner.startup_lock.lock().await);
                if let Some(session) = self.inner.session.get() {
                    session.halt().await;
                }
                self.inner.fatal_channel_closed.cancel();
                self.inner.halted.cancel();
                info!("the client has been halted");
            })
            .await;
    }

    /// Waits until the client has been halted. Returns the fatal error that caused it, if any.
    pub async fn wait(&self) -> Option<&ClientCoreError> {
        self.inner.halted.cancelled().await;
        self.inner.fatal_error.get()
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.is_cancelled()
    }

    pub fn session(&self) -> Option<&Session> {
        self.inner.session.get()
    }

    /// Picks a random service with the given capability from the session's current document.
    pub fn get_service(&self, capability: &str) -> Result<ServiceDescriptor, ClientCoreError> {
        self.session()
            .ok_or(ClientCoreError::NoDocument)?
            .get_service(capability)
    }
}
