// Copyright 2021-2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::commands::ConfigArgs;
use anyhow::{bail, Context};
use clap::Args;
use spray_bin_common::logging::setup_tracing_logger;
use spray_client_core::transport::loopback::LoopbackConnector;
use spray_client_core::SprayClient;
use spray_task::wait_for_signal;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub(crate) struct Run {
    #[command(flatten)]
    config: ConfigArgs,

    /// Only generate the link keys and exit, overriding `debug.generate_only`.
    #[clap(long)]
    pub(crate) generate_only: bool,
}

pub(crate) async fn execute(args: Run) -> anyhow::Result<()> {
    let mut config = args.config.load_config()?;
    if args.generate_only {
        config.debug.generate_only = true;
    }

    setup_tracing_logger(&config.logging).context("failed to set up logging")?;

    if config.debug.generate_only {
        let public_key = SprayClient::generate_keys(&config)?;
        info!("generated link keys for {}: {public_key}", config.identifier());
        return Ok(());
    }

    let Some(loopback) = config.loopback.clone() else {
        bail!("no transport is configured, add a [loopback] section to the config");
    };
    let connector = LoopbackConnector::new(loopback).context("failed to load the directory document")?;

    info!(
        "starting spray client for {} targeting {}",
        config.identifier(),
        config.target_recipient()
    );
    let client = SprayClient::new(config, connector)?;
    let session = client
        .start()
        .await
        .context("failed to establish the session")?;
    info!(
        "session {} is up, our public link key is {}",
        session.identifier(),
        session.link_public_key()
    );

    tokio::select! {
        _ = wait_for_signal() => {
            info!("received shutdown signal");
        }
        _ = client.wait() => {
            warn!("the client has stopped on its own");
        }
    }

    client.halt().await;
    if let Some(err) = client.wait().await {
        bail!("the client got halted due to a fatal error: {err}");
    }

    info!("stopped");
    Ok(())
}
