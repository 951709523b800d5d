// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use pem::Pem;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroize;

pub trait PemStorableKey: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn pem_type() -> &'static str;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error>;
}

pub trait PemStorableKeyPair {
    type PrivatePemKey: PemStorableKey;
    type PublicPemKey: PemStorableKey;

    fn private_key(&self) -> &Self::PrivatePemKey;
    fn public_key(&self) -> &Self::PublicPemKey;
    fn from_keys(private_key: Self::PrivatePemKey, public_key: Self::PublicPemKey) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairPath {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
}

impl KeyPairPath {
    pub fn new<P: AsRef<Path>>(private_key_path: P, public_key_path: P) -> Self {
        KeyPairPath {
            private_key_path: private_key_path.as_ref().to_path_buf(),
            public_key_path: public_key_path.as_ref().to_path_buf(),
        }
    }

    /// Both halves of the pair are already present on disk.
    pub fn exists(&self) -> bool {
        self.private_key_path.exists() && self.public_key_path.exists()
    }
}

pub fn load_keypair<T>(paths: &KeyPairPath) -> io::Result<T>
where
    T: PemStorableKeyPair,
{
    let private = load_key::<T::PrivatePemKey>(&paths.private_key_path)?;
    let public = load_key::<T::PublicPemKey>(&paths.public_key_path)?;
    Ok(T::from_keys(private, public))
}

pub fn store_keypair<T>(keypair: &T, paths: &KeyPairPath) -> io::Result<()>
where
    T: PemStorableKeyPair,
{
    store_key(keypair.public_key(), &paths.public_key_path)?;
    store_key(keypair.private_key(), &paths.private_key_path)
}

pub fn load_key<T>(path: &Path) -> io::Result<T>
where
    T: PemStorableKey,
{
    let mut key_pem = read_pem_file(path)?;

    if T::pem_type() != key_pem.tag {
        key_pem.contents.zeroize();
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "unexpected key pem tag '{}' in {}, expected '{}'",
                key_pem.tag,
                path.display(),
                T::pem_type()
            ),
        ));
    }

    let key = T::from_bytes(&key_pem.contents)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err));
    key_pem.contents.zeroize();
    key
}

pub fn store_key<T>(key: &T, path: &Path) -> io::Result<()>
where
    T: PemStorableKey,
{
    write_pem_file(path, key.to_bytes(), T::pem_type())
}

fn read_pem_file(filepath: &Path) -> io::Result<Pem> {
    let mut pem_bytes = File::open(filepath)?;
    let mut buf = Vec::new();
    pem_bytes.read_to_end(&mut buf)?;
    let parsed = pem::parse(&buf).map_err(io::Error::other);
    buf.zeroize();
    parsed
}

fn write_pem_file(filepath: &Path, data: Vec<u8>, tag: &str) -> io::Result<()> {
    // ensure the whole directory structure exists
    if let Some(parent_dir) = filepath.parent() {
        std::fs::create_dir_all(parent_dir)?;
    }
    let mut pem = Pem {
        tag: tag.to_string(),
        contents: data,
    };
    let mut key = pem::encode(&pem);
    pem.contents.zeroize();

    let mut file = File::create(filepath)?;
    let written = file.write_all(key.as_bytes());
    key.zeroize();
    written?;

    // note: this is only supported on unix (on different systems, like Windows, it will just
    // be ignored)
    #[cfg(target_family = "unix")]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = file.metadata()?.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(filepath, permissions)?;
    }

    debug!("stored '{tag}' in {}", filepath.display());
    Ok(())
}
