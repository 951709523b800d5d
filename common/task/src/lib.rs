// Copyright 2022 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

pub mod cancellation;
pub mod signal;

pub use cancellation::{ShutdownToken, ShutdownTracker};
pub use signal::wait_for_signal;
