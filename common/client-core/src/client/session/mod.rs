// Copyright 2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::client::fatal::FatalErrorSender;
use crate::client::key_manager::{create_data_dir, load_or_generate_link_keys};
use crate::client::session::control_plane::ControlPlane;
use crate::client::session::operations::{operation_channel, OperationReceiver, SessionOp};
use crate::client::traffic::construction::PacketConstructor;
use crate::client::traffic::egress::EgressController;
use crate::client::traffic::packet_channel;
use crate::config::Config;
use crate::error::ClientCoreError;
use crate::transport::{
    ConnectionParams, MixnetTransport, TransportConnector, TransportEvents,
};
use arc_swap::ArcSwapOption;
use spray_crypto::asymmetric::x25519;
use spray_directory::{select_service, validate, DirectoryDocument, ServiceDescriptor};
use spray_task::{ShutdownToken, ShutdownTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

pub(crate) mod control_plane;
pub mod operations;

/// Bounds a single attempt at establishing the session.
#[derive(Debug, Clone)]
pub struct StartupContext {
    /// Cancelled by the caller to abandon the attempt.
    pub cancel: ShutdownToken,

    /// Point in time by which the session has to be ready.
    pub deadline: Instant,
}

impl StartupContext {
    pub fn new(cancel: ShutdownToken, deadline: Instant) -> Self {
        StartupContext { cancel, deadline }
    }

    pub fn with_timeout(cancel: ShutdownToken, timeout: Duration) -> Self {
        StartupContext {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }
}

/// Live session with the provider.
///
/// Once [Session::start] returns, the control plane, the packet constructor and the
/// egress controller are all running on the session's tracker.
pub struct Session {
    identifier: String,
    link_keys: Arc<x25519::KeyPair>,
    transport: Arc<dyn MixnetTransport>,
    current_document: Arc<ArcSwapOption<DirectoryDocument>>,
    workers: ShutdownTracker,
}

impl Session {
    /// Establishes the session: loads the link keys, connects the transport and waits for the
    /// first directory document. The traffic pipeline only gets launched once that document
    /// has been validated.
    ///
    /// `halt` is the client wide halt signal. The session derives its own worker token from it.
    pub async fn start(
        ctx: StartupContext,
        config: &Config,
        connector: &dyn TransportConnector,
        halt: &ShutdownToken,
        fatal_tx: FatalErrorSender,
    ) -> Result<Session, ClientCoreError> {
        let identifier = config.identifier();
        debug!("establishing session for {identifier}");

        // INIT
        let paths = config.link_key_paths();
        let link_keys = create_data_dir(config.account_data_dir())
            .and_then(|_| load_or_generate_link_keys(&paths, &mut rand::rngs::OsRng))
            .map_err(|source| ClientCoreError::KeyLoadFailure { source })?;
        let link_keys = Arc::new(link_keys);

        let provider_key_pin = config
            .account
            .provider_key_pin
            .as_ref()
            .map(x25519::PublicKey::from_base58_string)
            .transpose()
            .map_err(|err| {
                ClientCoreError::ConfigError(crate::config::ConfigError::InvalidValue {
                    field: "account.provider_key_pin",
                    reason: err.to_string(),
                })
            })?;

        let (op_tx, mut op_rx) = operation_channel();
        let transport = connector
            .connect(ConnectionParams {
                user: config.account.user.clone(),
                provider: config.account.provider.clone(),
                provider_key_pin,
                link_keys: link_keys.clone(),
                message_polling_interval: config.debug.polling_interval,
                events: TransportEvents::new(op_tx),
            })
            .map_err(|source| ClientCoreError::TransportConnectFailure { source })?;

        // AWAITING_DIRECTORY
        let workers = ShutdownTracker::new_from_external_shutdown_token(halt.child_token());
        let first_document = match await_first_document(
            &ctx,
            workers.shutdown_token(),
            &mut op_rx,
            config.debug.initial_max_pki_retrieval_delay,
        )
        .await
        {
            Ok(document) => document,
            Err(err) => {
                error!("failed to establish the session: {err}");
                transport.disconnect().await;
                return Err(err);
            }
        };

        if let Err(source) = validate(&first_document) {
            error!("aborting, {first_document} is not valid for the loop decoy traffic use case: {source}");
            fatal_tx.report(ClientCoreError::InvalidDirectory {
                epoch: first_document.epoch,
                source: source.clone(),
            });
            transport.disconnect().await;
            return Err(ClientCoreError::InvalidDirectory {
                epoch: first_document.epoch,
                source,
            });
        }

        // READY
        let current_document = Arc::new(ArcSwapOption::from(Some(first_document)));
        let (packet_tx, packet_rx) = packet_channel(config.debug.packet_buffer);

        let control_plane = ControlPlane::new(
            op_rx,
            transport.clone(),
            config.debug.directory_policy,
            current_document.clone(),
            fatal_tx.clone(),
            workers.clone_shutdown_token(),
        );
        let constructor = PacketConstructor::new(
            transport.clone(),
            config.target_recipient(),
            config.debug.payload_size,
            packet_tx,
            fatal_tx,
            workers.clone_shutdown_token(),
        );
        let egress = EgressController::new(
            transport.clone(),
            packet_rx,
            config.debug.send_rate,
            config.debug.send_burst,
            workers.clone_shutdown_token(),
        );

        workers.spawn_named(control_plane.run(), "ControlPlane");
        workers.spawn_named(constructor.run(), "PacketConstructor");
        workers.spawn_named(egress.run(), "EgressController");
        workers.close_tracker();

        info!("session for {identifier} is ready");
        Ok(Session {
            identifier,
            link_keys,
            transport,
            current_document,
            workers,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn link_public_key(&self) -> &x25519::PublicKey {
        self.link_keys.public_key()
    }

    /// The directory document currently retained by the control plane.
    pub fn current_document(&self) -> Option<Arc<DirectoryDocument>> {
        self.current_document.load_full()
    }

    /// Picks a random service with the given capability from the retained document.
    pub fn get_service(&self, capability: &str) -> Result<ServiceDescriptor, ClientCoreError> {
        let document = self.current_document().ok_or(ClientCoreError::NoDocument)?;
        Ok(select_service(
            &document,
            capability,
            &mut rand::thread_rng(),
        )?)
    }

    pub fn is_halted(&self) -> bool {
        self.workers.shutdown_token().is_cancelled()
    }

    pub fn running_workers(&self) -> usize {
        self.workers.tracked_tasks()
    }

    /// Stops all session workers and waits for them to exit before disconnecting the transport.
    pub async fn halt(&self) {
        debug!("halting session for {}", self.identifier);
        self.workers.shutdown().await;
        self.transport.disconnect().await;
        debug!("session for {} halted", self.identifier);
    }
}

async fn await_first_document(
    ctx: &StartupContext,
    halt: &ShutdownToken,
    op_rx: &mut OperationReceiver,
    max_retrieval_delay: Duration,
) -> Result<Arc<DirectoryDocument>, ClientCoreError> {
    let retrieval_timeout = tokio::time::sleep(max_retrieval_delay);
    let dial_deadline = tokio::time::sleep_until(ctx.deadline);
    tokio::pin!(retrieval_timeout);
    tokio::pin!(dial_deadline);

    loop {
        let op = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ClientCoreError::Cancelled),
            _ = &mut dial_deadline => return Err(ClientCoreError::DialDeadlineExceeded),
            _ = halt.cancelled() => return Err(ClientCoreError::Halted),
            _ = &mut retrieval_timeout => {
                return Err(ClientCoreError::DirectoryTimeout {
                    timeout: max_retrieval_delay,
                })
            }
            op = op_rx.recv() => op,
        };

        match op {
            Some(SessionOp::NewDocument(document)) => {
                debug!("received the initial {document}");
                return Ok(document);
            }
            Some(other) => trace!("ignoring {other} while waiting for the initial directory document"),
            None => {
                return Err(ClientCoreError::TransportConnectFailure {
                    source: crate::transport::TransportError::Closed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fatal::{fatal_error_channel, FatalErrorReceiver};
    use crate::transport::mock::{invalid_document, valid_document, MockConnector, MockTransport, Scripted};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::new(dir.path(), "alice", "acme").with_target("echo", "provider-2");
        config.debug.send_rate = 50.0;
        config.debug.initial_max_pki_retrieval_delay = Duration::from_secs(10);
        config.debug.session_dial_timeout = Duration::from_secs(30);
        config
    }

    fn ctx(timeout: Duration) -> StartupContext {
        StartupContext::with_timeout(ShutdownToken::new(), timeout)
    }

    struct Harness {
        _dir: TempDir,
        config: Config,
        transport: Arc<MockTransport>,
        halt: ShutdownToken,
        fatal_tx: FatalErrorSender,
        fatal_rx: FatalErrorReceiver,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = test_config(&dir);
            let (fatal_tx, fatal_rx) = fatal_error_channel();
            Harness {
                _dir: dir,
                config,
                transport: Arc::new(MockTransport::new()),
                halt: ShutdownToken::new(),
                fatal_tx,
                fatal_rx,
            }
        }

        async fn start(
            &self,
            ctx: StartupContext,
            connector: &MockConnector,
        ) -> Result<Session, ClientCoreError> {
            Session::start(ctx, &self.config, connector, &self.halt, self.fatal_tx.clone()).await
        }

        fn assert_no_pipeline(&self) {
            assert_eq!(self.transport.composed_packets(), 0);
            assert_eq!(self.transport.send_attempts(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_document_times_out_without_launching_pipeline() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone())
            .with_script(vec![Scripted::Connected]);

        let res = harness.start(ctx(Duration::from_secs(30)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::DirectoryTimeout { timeout }) if timeout == Duration::from_secs(10)));

        // give any stray worker a chance to run
        tokio::time::sleep(Duration::from_secs(5)).await;
        harness.assert_no_pipeline();
        assert_eq!(harness.transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dial_deadline_bounds_the_whole_startup() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone()).with_script(vec![
            Scripted::Wait(Duration::from_secs(5)),
            Scripted::Document(valid_document(1)),
        ]);

        let res = harness.start(ctx(Duration::from_secs(2)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::DialDeadlineExceeded)));
        harness.assert_no_pipeline();
        assert_eq!(harness.transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_startup() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone());
        let ctx = ctx(Duration::from_secs(30));

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let res = harness.start(ctx, &connector).await;
        assert!(matches!(res, Err(ClientCoreError::Cancelled)));
        harness.assert_no_pipeline();
    }

    #[tokio::test(start_paused = true)]
    async fn halt_aborts_startup() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone());

        let halt = harness.halt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            halt.cancel();
        });

        let res = harness.start(ctx(Duration::from_secs(30)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::Halted)));
        harness.assert_no_pipeline();
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_document_is_reported_exactly_once() {
        let mut harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone())
            .with_script(vec![Scripted::Connected, Scripted::Document(invalid_document(4))]);

        let res = harness.start(ctx(Duration::from_secs(30)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::InvalidDirectory { epoch: 4, .. })));

        assert!(matches!(
            harness.fatal_rx.try_recv(),
            Some(ClientCoreError::InvalidDirectory { epoch: 4, .. })
        ));
        assert!(harness.fatal_rx.try_recv().is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        harness.assert_no_pipeline();
        assert_eq!(harness.transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connection_is_a_startup_failure() {
        let harness = Harness::new();
        let connector = MockConnector::refusing(harness.transport.clone());

        let res = harness.start(ctx(Duration::from_secs(30)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::TransportConnectFailure { .. })));
        harness.assert_no_pipeline();
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_keys_are_a_startup_failure() {
        let harness = Harness::new();
        let paths = harness.config.link_key_paths();
        std::fs::create_dir_all(harness.config.account_data_dir()).unwrap();
        std::fs::write(&paths.private_key_path, "garbage").unwrap();
        std::fs::write(&paths.public_key_path, "garbage").unwrap();

        let connector = MockConnector::new(harness.transport.clone());
        let res = harness.start(ctx(Duration::from_secs(30)), &connector).await;
        assert!(matches!(res, Err(ClientCoreError::KeyLoadFailure { .. })));
        assert!(connector.events().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn valid_document_starts_the_pipeline() {
        let mut harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone()).with_script(vec![
            Scripted::Wait(Duration::from_millis(100)),
            Scripted::Connected,
            Scripted::Document(valid_document(9)),
        ]);

        let session = harness
            .start(ctx(Duration::from_secs(30)), &connector)
            .await
            .unwrap();
        assert_eq!(session.identifier(), "alice@acme");
        let stored: x25519::KeyPair =
            spray_crypto::pem_store::load_keypair(&harness.config.link_key_paths()).unwrap();
        assert_eq!(session.link_public_key(), stored.public_key());
        assert_eq!(session.current_document().map(|d| d.epoch), Some(9));
        assert_eq!(session.running_workers(), 3);
        assert!(harness.config.link_key_paths().exists());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(harness.transport.sent_packets() > 0);

        let service = session.get_service("keyserver").unwrap();
        assert_eq!(service.provider, "provider-2");
        assert!(matches!(
            session.get_service("nonexistent"),
            Err(ClientCoreError::ServiceNotFound { .. })
        ));

        session.halt().await;
        assert!(session.is_halted());
        assert_eq!(session.running_workers(), 0);
        assert_eq!(harness.transport.disconnects(), 1);

        let sent = harness.transport.sent_packets();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(harness.transport.sent_packets(), sent);
        assert!(harness.fatal_rx.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn operations_before_the_first_document_are_ignored() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone());

        let start = harness.start(ctx(Duration::from_secs(30)), &connector);
        let inject = async {
            let events = loop {
                match connector.events() {
                    Some(events) => break events,
                    None => tokio::task::yield_now().await,
                }
            };
            events.on_disconnect();
            events.on_connection(Ok(()));
            harness.transport.set_document(valid_document(3));
            events.on_document(Arc::new(valid_document(3)));
        };

        let (session, _) = tokio::join!(start, inject);
        let session = session.unwrap();
        assert_eq!(session.current_document().map(|d| d.epoch), Some(3));
        session.halt().await;
    }

    #[tokio::test(start_paused = true)]
    async fn later_documents_reach_the_session() {
        let harness = Harness::new();
        let connector = MockConnector::new(harness.transport.clone()).with_script(vec![
            Scripted::Connected,
            Scripted::Document(valid_document(1)),
        ]);

        let session = harness
            .start(ctx(Duration::from_secs(30)), &connector)
            .await
            .unwrap();

        connector
            .events()
            .unwrap()
            .on_document(Arc::new(valid_document(2)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.current_document().map(|d| d.epoch), Some(2));

        session.halt().await;
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn clock_skew_leaves_the_send_rate_alone() {
        let mut harness = Harness::new();
        let rate = harness.config.debug.send_rate;
        let burst = f64::from(harness.config.debug.send_burst);
        let window = Duration::from_secs(10);

        harness.transport.set_clock_skew(time::Duration::minutes(3));
        let connector = MockConnector::new(harness.transport.clone()).with_script(vec![
            Scripted::Document(valid_document(1)),
            Scripted::Wait(Duration::from_secs(1)),
            Scripted::Connected,
        ]);

        let session = harness
            .start(ctx(Duration::from_secs(30)), &connector)
            .await
            .unwrap();
        tokio::time::sleep(window).await;
        let sent = harness.transport.sent_packets() as f64;

        assert!(logs_contain("observed time difference"));
        let expected = rate * window.as_secs_f64();
        assert!(sent <= burst + expected + 1.0, "sent {sent}");
        assert!(sent >= expected - 1.0, "sent {sent}");
        assert_eq!(session.running_workers(), 3);
        assert!(harness.fatal_rx.try_recv().is_none());

        session.halt().await;
    }

    #[tokio::test(start_paused = true)]
    async fn construction_failure_reaches_the_fatal_channel() {
        let mut harness = Harness::new();
        harness.transport.fail_compose_after(5);
        let connector = MockConnector::new(harness.transport.clone()).with_script(vec![
            Scripted::Connected,
            Scripted::Document(valid_document(1)),
        ]);

        let session = harness
            .start(ctx(Duration::from_secs(30)), &connector)
            .await
            .unwrap();

        let err = harness.fatal_rx.recv().await.unwrap();
        assert!(matches!(err, ClientCoreError::PacketConstructionFailure { .. }));
        session.halt().await;
        assert!(harness.fatal_rx.try_recv().is_none());
    }
}
