/// NATS client integration module
///
/// Builds connection options from configuration, opens the connection and
/// creates the JetStream context on top of it.

pub mod error;
pub mod config;
pub mod client;
pub mod streamer;

pub use error::Error;
pub use config::{new_config, new_default_config, fetch_addresses, Options, TlsOptions, CONFIG_KEY};
pub use client::{new_connection, flush, shutdown, Client};
pub use streamer::{
    new_default_streamer_config, new_streamer, new_streamer_config, PendingAck, Streamer,
    StreamerConfig, StreamerOption,
};
