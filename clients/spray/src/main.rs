// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use clap::{crate_name, crate_version, Parser};
use spray_bin_common::logging::maybe_print_banner;

pub(crate) mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = commands::Cli::parse();

    if !args.no_banner {
        maybe_print_banner(crate_name!(), crate_version!());
    }

    args.execute().await
}
