/// Errors raised while wiring the NATS client
///
/// Client library errors are carried unchanged so callers can inspect them.

use std::fmt;
use std::path::PathBuf;

use crate::settings::SettingsError;

#[derive(Debug)]
pub enum Error {
    /// The configuration namespace (or the options record) is absent
    EmptyConfig,
    Settings(SettingsError),
    InvalidAddress {
        address: String,
        message: String,
    },
    Tls {
        path: PathBuf,
        source: std::io::Error,
    },
    Credentials {
        path: PathBuf,
        source: std::io::Error,
    },
    Connect(async_nats::ConnectError),
    InvalidOption(String),
    Publish(async_nats::jetstream::context::PublishError),
    Flush(async_nats::client::FlushError),
    FlushTimeout(std::time::Duration),
    Closed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyConfig => write!(f, "nats empty config"),
            Error::Settings(err) => write!(f, "{}", err),
            Error::InvalidAddress { address, message } => {
                write!(f, "Invalid server address '{}': {}", address, message)
            }
            Error::Tls { path, source } => {
                write!(f, "Failed to load TLS file {}: {}", path.display(), source)
            }
            Error::Credentials { path, source } => {
                write!(f, "Failed to load credentials file {}: {}", path.display(), source)
            }
            Error::Connect(err) => write!(f, "{}", err),
            Error::InvalidOption(msg) => write!(f, "Invalid option: {}", msg),
            Error::Publish(err) => write!(f, "{}", err),
            Error::Flush(err) => write!(f, "Flush failed: {}", err),
            Error::FlushTimeout(limit) => write!(f, "Flush timed out after {:?}", limit),
            Error::Closed(what) => write!(f, "{} is closed", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Settings(err) => Some(err),
            Error::Tls { source, .. } | Error::Credentials { source, .. } => Some(source),
            Error::Connect(err) => Some(err),
            Error::Publish(err) => Some(err),
            Error::Flush(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SettingsError> for Error {
    fn from(err: SettingsError) -> Self {
        Error::Settings(err)
    }
}

impl From<async_nats::ConnectError> for Error {
    fn from(err: async_nats::ConnectError) -> Self {
        Error::Connect(err)
    }
}

impl From<async_nats::client::FlushError> for Error {
    fn from(err: async_nats::client::FlushError) -> Self {
        Error::Flush(err)
    }
}

impl From<async_nats::jetstream::context::PublishError> for Error {
    fn from(err: async_nats::jetstream::context::PublishError) -> Self {
        Error::Publish(err)
    }
}
