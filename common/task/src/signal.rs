// Copyright 2022 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

// never resolves if the handler could not be installed
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received SIGINT"),
        Err(err) => {
            log::error!("failed to listen for SIGINT: {err}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigquit) =
        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(sigterm), Ok(sigquit)) => (sigterm, sigquit),
            (Err(err), _) | (_, Err(err)) => {
                log::error!("failed to register unix signal handlers: {err}. only listening for SIGINT");
                wait_for_ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = wait_for_ctrl_c() => {},
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM");
        }
        _ = sigquit.recv() => {
            log::info!("Received SIGQUIT");
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn does_not_resolve_without_a_signal() {
        let res = tokio::time::timeout(Duration::from_millis(50), wait_for_signal()).await;
        assert!(res.is_err());
    }
}
