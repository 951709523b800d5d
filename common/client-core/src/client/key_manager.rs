// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use rand::{CryptoRng, RngCore};
use spray_crypto::asymmetric::x25519;
use spray_crypto::pem_store::{load_key, load_keypair, store_key, store_keypair};
use spray_crypto::KeyPairPath;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Create the directory (and any missing parents), restricting access to the owner.
pub fn create_data_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Load the link key pair from disk, generating and persisting a fresh one if none exists yet.
pub fn load_or_generate_link_keys<R>(paths: &KeyPairPath, rng: &mut R) -> io::Result<x25519::KeyPair>
where
    R: RngCore + CryptoRng,
{
    if paths.exists() {
        let keys: x25519::KeyPair = load_keypair(paths)?;
        if !keys.is_consistent() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "public key stored in {} does not belong to the private key",
                    paths.public_key_path.display()
                ),
            ));
        }
        debug!("loaded link keys from {}", paths.private_key_path.display());
        return Ok(keys);
    }

    if paths.private_key_path.exists() {
        warn!(
            "public link key is missing, deriving it from {}",
            paths.private_key_path.display()
        );
        let private_key: x25519::PrivateKey = load_key(&paths.private_key_path)?;
        let public_key = private_key.public_key();
        store_key(&public_key, &paths.public_key_path)?;
        return Ok(private_key.into());
    }

    let keys = x25519::KeyPair::new(rng);
    store_keypair(&keys, paths)?;
    info!(
        "generated new link keys with public key {}",
        keys.public_key().to_base58_string()
    );
    Ok(keys)
}
