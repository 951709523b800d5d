// Copyright 2021-2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use spray_client_core::config::Config;
use std::path::PathBuf;

pub(crate) mod init;
pub(crate) mod run;

const DEFAULT_CONFIG_DIR: &str = "spray";
const DEFAULT_CONFIG_FILENAME: &str = "spray.toml";

#[derive(Parser, Debug)]
#[clap(author = "Nymtech", version, about)]
pub(crate) struct Cli {
    /// Flag used for disabling the printed banner in tty.
    #[clap(long)]
    pub(crate) no_banner: bool,

    #[clap(subcommand)]
    command: Commands,
}

impl Cli {
    pub(crate) async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Init(args) => init::execute(args),
            Commands::Run(args) => run::execute(args).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Generate the link keys of the configured account and exit
    Init(init::Init),

    /// Establish the session and keep spraying probe packets until interrupted
    Run(run::Run),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ConfigArgs {
    /// Path to the TOML config file. Defaults to `spray/spray.toml` in the user's config directory.
    #[clap(short, long)]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILENAME))
            .context("could not determine the default config location, please specify it with --config")
    }

    pub(crate) fn load_config(&self) -> anyhow::Result<Config> {
        let path = self.config_path()?;
        Config::read_from_toml_file(&path)
            .with_context(|| format!("failed to load config from '{}'", path.display()))
    }
}
