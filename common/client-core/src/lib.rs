// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use client::session::{Session, StartupContext};
pub use client::SprayClient;
pub use error::{ClientCoreError, ErrorKind};
pub use spray_directory::{DirectoryDocument, ServiceDescriptor};
