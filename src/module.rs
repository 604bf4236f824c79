//! Registration of the NATS constructors for a host application.
//!
//! The host resolves components from its own configuration source; this
//! module only fixes the namespace and the order the constructors run in:
//! options, connection, streamer options, streamer.

use crate::nats::{self, Client, Error, Options, Streamer, StreamerConfig, CONFIG_KEY};
use crate::settings::ConfigSource;

/// Everything the module provides, in construction order
#[derive(Clone)]
pub struct Components {
    pub options: Options,
    pub client: Client,
    pub streamer_config: StreamerConfig,
    pub streamer: Streamer,
}

/// The NATS client module bound to a configuration namespace
#[derive(Debug, Clone)]
pub struct NatsModule {
    prefix: String,
}

impl Default for NatsModule {
    fn default() -> Self {
        Self {
            prefix: CONFIG_KEY.to_string(),
        }
    }
}

impl NatsModule {
    /// Constructor names in the order [`NatsModule::provide`] runs them
    pub const CONSTRUCTORS: [&'static str; 4] = ["config", "connection", "streamer_config", "streamer"];

    /// Module reading the `nats` namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Module reading a custom namespace
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn config<S: ConfigSource + ?Sized>(&self, source: &S) -> Result<Options, Error> {
        nats::new_config(source, &self.prefix)
    }

    pub async fn connection(&self, options: Option<&Options>) -> Result<Client, Error> {
        nats::new_connection(options).await
    }

    pub fn streamer_config<S: ConfigSource + ?Sized>(&self, source: &S) -> Result<StreamerConfig, Error> {
        nats::new_streamer_config(source, &self.prefix)
    }

    pub fn streamer(&self, client: &Client, opts: &[nats::StreamerOption]) -> Result<Streamer, Error> {
        nats::new_streamer(client, opts)
    }

    /// Run every constructor in order and hand back the results.
    ///
    /// Stops at the first failure; nothing is retried.
    pub async fn provide<S: ConfigSource + ?Sized>(&self, source: &S) -> Result<Components, Error> {
        let options = self.config(source)?;
        let client = self.connection(Some(&options)).await?;
        let streamer_config = self.streamer_config(source)?;
        let streamer = self.streamer(&client, &streamer_config)?;

        tracing::info!("NATS module '{}' provided {} components", self.prefix, Self::CONSTRUCTORS.len());

        Ok(Components {
            options,
            client,
            streamer_config,
            streamer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_constructor_order() {
        assert_eq!(
            NatsModule::CONSTRUCTORS,
            ["config", "connection", "streamer_config", "streamer"]
        );
    }

    #[test]
    fn test_prefix_binding() {
        assert_eq!(NatsModule::new().prefix(), "nats");

        let mut settings = Settings::new();
        settings.set_default("events.url", "nats://events:4222");
        settings.set_default("events.jetstream.prefix", "$JS.events.API");

        let module = NatsModule::with_prefix("events");
        assert_eq!(module.config(&settings).unwrap().url, "nats://events:4222");
        assert_eq!(module.streamer_config(&settings).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provide_fails_on_empty() {
        let settings = Settings::new();
        let err = NatsModule::new().provide(&settings).await.err().unwrap();
        assert!(matches!(err, Error::EmptyConfig));
    }
}
