// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

pub mod asymmetric;
pub mod pem_store;

pub use pem_store::{KeyPairPath, PemStorableKey, PemStorableKeyPair};
