// Copyright 2021-2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::commands::ConfigArgs;
use clap::Args;
use spray_client_core::SprayClient;

#[derive(Args, Debug, Clone)]
pub(crate) struct Init {
    #[command(flatten)]
    config: ConfigArgs,
}

pub(crate) fn execute(args: Init) -> anyhow::Result<()> {
    let config = args.config.load_config()?;
    let public_key = SprayClient::generate_keys(&config)?;

    println!(
        "Link keys of {} are stored in {}",
        config.identifier(),
        config.account_data_dir().display()
    );
    println!("Public link key: {public_key}");
    Ok(())
}
