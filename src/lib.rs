//! # natsmod: NATS client wiring for host applications
//!
//! natsmod turns a flat key/value configuration namespace into a connected
//! NATS client and a JetStream context, so a host application can inject
//! both without repeating the option plumbing.
//!
//! ## Features
//!
//! - **Layered settings**: overrides, environment, YAML documents and defaults behind one `ConfigSource` trait
//! - **Options builder**: ~30 connection options with client defaults, indexed server lists and TLS files
//! - **Connection factory**: connects through `async-nats`, surfacing client errors unchanged
//! - **JetStream factory**: API prefix, domain, timeout and a bound on unacknowledged publishes
//!
//! ## Example: configuration
//!
//! ```yaml
//! nats:
//!   servers_0: nats://10.0.0.1:4222
//!   servers_1: nats://10.0.0.2:4222
//!   name: billing
//!   reconnect_wait: 5s
//!   tls:
//!     cert: /etc/nats/client.pem
//!     key: /etc/nats/client-key.pem
//!     cacert: /etc/nats/ca.pem
//!   jetstream:
//!     prefix: $JS.hub.API
//!     publish_async_max_pending: 256
//! ```
//!
//! ## Example: wiring
//!
//! ```ignore
//! use natsmod::{NatsModule, Settings};
//!
//! let settings = Settings::from_yaml_file("config/nats.yaml")?;
//! let components = NatsModule::new().provide(&settings).await?;
//! components.streamer.publish("orders.created", b"{}".to_vec()).await?;
//! ```

// Configuration sources
pub mod settings;

// NATS options, connection and JetStream context
pub mod nats;

// Constructor registration for host applications
pub mod module;

// Re-export key types
pub use settings::{ConfigSource, Settings, SettingsError};
pub use nats::{
    new_config, new_default_config, new_connection, new_default_streamer_config, new_streamer,
    new_streamer_config, Client, Error, Options, Streamer, StreamerConfig, StreamerOption,
};
pub use module::{Components, NatsModule};
