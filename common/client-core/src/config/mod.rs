// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::transport::Recipient;
use serde::{Deserialize, Serialize};
use spray_bin_common::logging::LoggingSettings;
use spray_crypto::asymmetric::x25519;
use spray_crypto::KeyPairPath;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const LINK_PRIVATE_KEY_FILENAME: &str = "link.private.pem";
pub const LINK_PUBLIC_KEY_FILENAME: &str = "link.public.pem";

// 'DEBUG'
const DEFAULT_SEND_RATE: f64 = 10.0;
const DEFAULT_SEND_BURST: u32 = 1;
const DEFAULT_SESSION_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_MAX_PKI_RETRIEVAL_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PAYLOAD_SIZE: usize = 1024;
const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

// Capacity of the channel between packet construction and egress.
pub const DEFAULT_PACKET_BUFFER: usize = 32;

// 'LOOPBACK'
const DEFAULT_LOOPBACK_CONNECT_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_LOOPBACK_DOCUMENT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse the config: {source}")]
    Malformed {
        #[from]
        source: toml::de::Error,
    },

    #[error("invalid value of '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub client: Client,

    #[serde(default)]
    pub logging: LoggingSettings,

    pub account: Account,

    #[serde(default)]
    pub debug: Debug,

    /// Settings of the in-process transport used for dry runs.
    #[serde(default)]
    pub loopback: Option<LoopbackSettings>,
}

impl Config {
    pub fn new<P, S1, S2>(data_dir: P, user: S1, provider: S2) -> Self
    where
        P: Into<PathBuf>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Config {
            client: Client {
                data_dir: data_dir.into(),
            },
            logging: Default::default(),
            account: Account {
                user: user.into(),
                provider: provider.into(),
                provider_key_pin: None,
            },
            debug: Default::default(),
            loopback: None,
        }
    }

    #[must_use]
    pub fn with_target<S1, S2>(mut self, recipient: S1, provider: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.debug.target_recipient = recipient.into();
        self.debug.target_provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_loopback(mut self, loopback: LoopbackSettings) -> Self {
        self.loopback = Some(loopback);
        self
    }

    pub fn read_from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.fixup_and_validate()
    }

    /// Normalises the user identifier and relative paths, then checks every value
    /// the session relies on.
    pub fn fixup_and_validate(mut self) -> Result<Self, ConfigError> {
        if !self.debug.case_sensitive_user_identifiers {
            self.account.user = self.account.user.to_lowercase();
        }
        if let Some(file) = &self.logging.file {
            if file.is_relative() {
                self.logging.file = Some(self.client.data_dir.join(file));
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.client.data_dir.is_absolute() {
            return Err(ConfigError::invalid(
                "client.data_dir",
                format!("'{}' is not an absolute path", self.client.data_dir.display()),
            ));
        }

        check_address_component("account.user", &self.account.user)?;
        check_address_component("account.provider", &self.account.provider)?;
        if let Some(pin) = &self.account.provider_key_pin {
            x25519::PublicKey::from_base58_string(pin)
                .map_err(|err| ConfigError::invalid("account.provider_key_pin", err.to_string()))?;
        }

        self.debug.validate()?;
        if let Some(loopback) = &self.loopback {
            loopback.validate()?;
        }
        Ok(())
    }

    /// `user@provider`, the identifier of this client's account.
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.account.user, self.account.provider)
    }

    /// Per-account directory holding the link keys.
    pub fn account_data_dir(&self) -> PathBuf {
        self.client.data_dir.join(self.identifier())
    }

    pub fn link_key_paths(&self) -> KeyPairPath {
        let dir = self.account_data_dir();
        KeyPairPath::new(
            dir.join(LINK_PRIVATE_KEY_FILENAME),
            dir.join(LINK_PUBLIC_KEY_FILENAME),
        )
    }

    pub fn target_recipient(&self) -> Recipient {
        Recipient::new(&self.debug.target_recipient, &self.debug.target_provider)
    }
}

fn check_address_component(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if value.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(ConfigError::invalid(
            field,
            format!("'{value}' must not contain whitespace or '@'"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Client {
    /// Absolute path to the directory holding all per-account state.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub user: String,

    pub provider: String,

    /// Base58-encoded key the provider is expected to present. Passed through to the transport.
    #[serde(default)]
    pub provider_key_pin: Option<String>,
}

/// What to do with a directory document that fails validation after the session became ready.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryPolicy {
    /// Log the problem and keep using the new document.
    #[default]
    Warn,

    /// Treat the update as a fatal error and halt the client.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Debug {
    /// Provider hosting the probe destination.
    pub target_provider: String,

    /// Recipient all probe packets are addressed to.
    pub target_recipient: String,

    /// Sustained number of packets sent per second.
    pub send_rate: f64,

    /// Number of packets that can be sent back-to-back after an idle period.
    pub send_burst: u32,

    /// Upper bound on the whole session establishment.
    #[serde(with = "humantime_serde")]
    pub session_dial_timeout: Duration,

    /// How long to wait for the first directory document after connecting.
    #[serde(with = "humantime_serde")]
    pub initial_max_pki_retrieval_delay: Duration,

    /// Interval at which the transport polls the provider for messages.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,

    pub case_sensitive_user_identifiers: bool,

    /// Only generate the link keys, do not start a session.
    pub generate_only: bool,

    /// Size of the plaintext carried by every probe packet.
    pub payload_size: usize,

    /// Number of constructed packets that may wait for egress.
    pub packet_buffer: usize,

    pub directory_policy: DirectoryPolicy,
}

impl Debug {
    fn validate(&self) -> Result<(), ConfigError> {
        check_address_component("debug.target_recipient", &self.target_recipient)?;
        check_address_component("debug.target_provider", &self.target_provider)?;

        if !self.send_rate.is_finite() || self.send_rate <= 0.0 {
            return Err(ConfigError::invalid(
                "debug.send_rate",
                format!("{} is not a positive number", self.send_rate),
            ));
        }
        if self.send_burst == 0 {
            return Err(ConfigError::invalid("debug.send_burst", "must be at least 1"));
        }
        if self.session_dial_timeout.is_zero() {
            return Err(ConfigError::invalid("debug.session_dial_timeout", "must be non-zero"));
        }
        if self.initial_max_pki_retrieval_delay.is_zero() {
            return Err(ConfigError::invalid(
                "debug.initial_max_pki_retrieval_delay",
                "must be non-zero",
            ));
        }
        if self.payload_size == 0 || self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::invalid(
                "debug.payload_size",
                format!("must be between 1 and {MAX_PAYLOAD_SIZE} bytes"),
            ));
        }
        if self.packet_buffer == 0 {
            return Err(ConfigError::invalid("debug.packet_buffer", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Debug {
    fn default() -> Self {
        Debug {
            target_provider: String::new(),
            target_recipient: String::new(),
            send_rate: DEFAULT_SEND_RATE,
            send_burst: DEFAULT_SEND_BURST,
            session_dial_timeout: DEFAULT_SESSION_DIAL_TIMEOUT,
            initial_max_pki_retrieval_delay: DEFAULT_INITIAL_MAX_PKI_RETRIEVAL_DELAY,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            case_sensitive_user_identifiers: false,
            generate_only: false,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            packet_buffer: DEFAULT_PACKET_BUFFER,
            directory_policy: DirectoryPolicy::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopbackSettings {
    /// JSON directory document published to the session.
    pub directory_file: PathBuf,

    /// Delay before the connection is reported as established.
    #[serde(default = "default_loopback_connect_delay", with = "humantime_serde")]
    pub connect_delay: Duration,

    /// Simulated clock difference to the provider, in seconds. Negative values mean the provider is behind.
    #[serde(default)]
    pub clock_skew_secs: i64,

    /// How often the directory document gets re-published.
    #[serde(
        default = "default_loopback_document_refresh_interval",
        with = "humantime_serde"
    )]
    pub document_refresh_interval: Duration,
}

fn default_loopback_connect_delay() -> Duration {
    DEFAULT_LOOPBACK_CONNECT_DELAY
}

fn default_loopback_document_refresh_interval() -> Duration {
    DEFAULT_LOOPBACK_DOCUMENT_REFRESH_INTERVAL
}

impl LoopbackSettings {
    pub fn new<P: Into<PathBuf>>(directory_file: P) -> Self {
        LoopbackSettings {
            directory_file: directory_file.into(),
            connect_delay: DEFAULT_LOOPBACK_CONNECT_DELAY,
            clock_skew_secs: 0,
            document_refresh_interval: DEFAULT_LOOPBACK_DOCUMENT_REFRESH_INTERVAL,
        }
    }

    pub fn clock_skew(&self) -> time::Duration {
        time::Duration::seconds(self.clock_skew_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.document_refresh_interval.is_zero() {
            return Err(ConfigError::invalid(
                "loopback.document_refresh_interval",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}
