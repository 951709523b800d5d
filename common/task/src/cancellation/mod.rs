// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

pub mod token;
pub mod tracker;

pub use token::ShutdownToken;
pub use tracker::ShutdownTracker;
