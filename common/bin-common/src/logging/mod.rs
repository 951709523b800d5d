// Copyright 2022-2023 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("'{0}' is not a valid log level")]
    InvalidLevel(String),

    #[error("failed to open log file {path}: {source}")]
    LogFileFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install the global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Log levels as they appear in the configuration file.
/// `NOTICE` has no direct `tracing` equivalent and maps onto `INFO`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Notice,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Notice | LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "" | "NOTICE" => Ok(LogLevel::Notice),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = LoggingError;

    fn try_from(value: String) -> Result<Self, LoggingError> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Disables logging entirely.
    pub disable: bool,

    /// Log file to append to. If omitted, logs are written to stderr.
    pub file: Option<PathBuf>,

    pub level: LogLevel,
}

/// `RUST_LOG`, if set, always takes precedence over the configured level.
pub fn default_tracing_env_filter(default_level: LevelFilter) -> EnvFilter {
    if ::std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .parse_lossy("")
    }
}

pub fn default_tracing_fmt_layer<S, W>(
    writer: W,
    ansi: bool,
) -> impl tracing_subscriber::Layer<S> + Sync + Send + 'static
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Sync + Send + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        // Use a more compact, abbreviated log format
        .compact()
        // Display source code file paths
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Don't display the event's target (module path)
        .with_target(false)
}

pub fn setup_tracing_logger(settings: &LoggingSettings) -> Result<(), LoggingError> {
    if settings.disable {
        return Ok(());
    }

    let filter = default_tracing_env_filter(settings.level.as_level_filter());

    match &settings.file {
        None => tracing_subscriber::registry()
            .with(default_tracing_fmt_layer(std::io::stderr, true))
            .with(filter)
            .try_init()?,
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| LoggingError::LogFileFailure {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFileFailure {
                    path: path.display().to_string(),
                    source,
                })?;

            tracing_subscriber::registry()
                .with(default_tracing_fmt_layer(Arc::new(file), false))
                .with(filter)
                .try_init()?
        }
    }

    Ok(())
}

pub fn banner(crate_name: &str, crate_version: &str) -> String {
    format!(
        r#"

                                   
       ___ _ __  _ __ __ _ _   _ 
      / __| '_ \| '__/ _` | | | |
      \__ \ |_) | | | (_| | |_| |
      |___/ .__/|_|  \__,_|\__, |
          |_|              |___/ 

             ({crate_name} - version {crate_version})

    "#
    )
}

pub fn maybe_print_banner(crate_name: &str, crate_version: &str) {
    if std::io::stdout().is_terminal() {
        println!("{}", banner(crate_name, crate_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("notice".parse::<LogLevel>().unwrap(), LogLevel::Notice);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(" DEBUG ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("".parse::<LogLevel>().unwrap(), LogLevel::Notice);
        assert!(matches!(
            "LOUD".parse::<LogLevel>(),
            Err(LoggingError::InvalidLevel(level)) if level == "LOUD"
        ));
    }

    #[test]
    fn levels_convert_through_strings() {
        assert_eq!(LogLevel::try_from(String::from("trace")).unwrap(), LogLevel::Trace);
        assert!(LogLevel::try_from(String::from("verbose")).is_err());
        assert_eq!(String::from(LogLevel::Warning), "WARNING");
    }

    #[test]
    fn notice_maps_onto_info() {
        assert_eq!(LogLevel::Notice.as_level_filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Warning.as_level_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::default(), LogLevel::Notice);
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let settings = LoggingSettings {
            disable: true,
            file: Some(PathBuf::from("/nonexistent/should/not/be/created.log")),
            level: LogLevel::Trace,
        };
        assert!(setup_tracing_logger(&settings).is_ok());
        assert!(!PathBuf::from("/nonexistent/should/not/be/created.log").exists());
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a directory can't be opened as a log file
        let settings = LoggingSettings {
            disable: false,
            file: Some(dir.path().to_path_buf()),
            level: LogLevel::Info,
        };
        assert!(matches!(
            setup_tracing_logger(&settings),
            Err(LoggingError::LogFileFailure { .. })
        ));
    }
}
