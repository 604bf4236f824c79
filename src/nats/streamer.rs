/// JetStream context factory
///
/// Reads the `<prefix>.jetstream` namespace into an ordered list of context
/// options and applies them when the context is created.

use async_nats::jetstream::{self, context::PublishAckFuture, publish::PublishAck};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::nats::client::Client;
use crate::nats::config::CONFIG_KEY;
use crate::nats::error::Error;
use crate::settings::{ConfigSource, SettingsError};

/// A single JetStream context setting
#[derive(Debug, Clone, PartialEq)]
pub enum StreamerOption {
    /// Prefix for JetStream API subjects (`<prefix>.STREAM.INFO...`)
    ApiPrefix(String),
    /// JetStream domain; equivalent to the prefix `$JS.<domain>.API`
    Domain(String),
    /// Timeout for JetStream API requests
    Timeout(Duration),
    /// Upper bound on publishes awaiting acknowledgement
    PublishAsyncMaxPending(usize),
}

/// Ordered JetStream context settings
pub type StreamerConfig = Vec<StreamerOption>;

/// Read streamer options from the `nats.jetstream` namespace
pub fn new_default_streamer_config<S: ConfigSource + ?Sized>(source: &S) -> Result<StreamerConfig, Error> {
    new_streamer_config(source, CONFIG_KEY)
}

/// Read streamer options from `<prefix>.jetstream`.
///
/// Returns an empty list when the namespace isn't set.
pub fn new_streamer_config<S: ConfigSource + ?Sized>(source: &S, prefix: &str) -> Result<StreamerConfig, Error> {
    let js_key = format!("{}.jetstream", prefix);
    if !source.is_set(&js_key) {
        return Ok(StreamerConfig::new());
    }

    let key = |name: &str| format!("{}.{}", js_key, name);
    let mut opts = StreamerConfig::new();

    if let Some(api_prefix) = source.get_string(&key("prefix"))? {
        opts.push(StreamerOption::ApiPrefix(api_prefix));
    }

    if let Some(domain) = source.get_string(&key("domain"))? {
        opts.push(StreamerOption::Domain(domain));
    }

    if let Some(timeout) = source.get_duration(&key("timeout"))? {
        opts.push(StreamerOption::Timeout(timeout));
    }

    let max_pending_key = key("publish_async_max_pending");
    if let Some(max_pending) = source.get_int(&max_pending_key)? {
        let max_pending = usize::try_from(max_pending)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| SettingsError::InvalidValue {
                key: max_pending_key.clone(),
                expected: "positive integer",
                found: max_pending.to_string(),
            })?;
        opts.push(StreamerOption::PublishAsyncMaxPending(max_pending));
    }

    tracing::debug!(?opts, "Resolved JetStream options from '{}'", js_key);

    Ok(opts)
}

enum Endpoint<'a> {
    Default,
    Prefix(&'a str),
    Domain(&'a str),
}

/// Create a JetStream context on an open connection.
///
/// Options apply in order, so a later prefix or domain replaces an earlier one.
pub fn new_streamer(client: &Client, opts: &[StreamerOption]) -> Result<Streamer, Error> {
    let mut endpoint = Endpoint::Default;
    let mut timeout = None;
    let mut max_pending = None;

    for opt in opts {
        match opt {
            StreamerOption::ApiPrefix(prefix) => endpoint = Endpoint::Prefix(prefix),
            StreamerOption::Domain(domain) => endpoint = Endpoint::Domain(domain),
            StreamerOption::Timeout(t) => timeout = Some(*t),
            StreamerOption::PublishAsyncMaxPending(0) => {
                return Err(Error::InvalidOption(
                    "publish_async_max_pending must be positive".to_string(),
                ));
            }
            StreamerOption::PublishAsyncMaxPending(n) => max_pending = Some(*n),
        }
    }

    let mut context = match endpoint {
        Endpoint::Default => jetstream::new(client.clone()),
        Endpoint::Prefix(prefix) => jetstream::with_prefix(client.clone(), prefix),
        Endpoint::Domain(domain) => jetstream::with_domain(client.clone(), domain),
    };

    if let Some(timeout) = timeout {
        context.set_timeout(timeout);
    }

    tracing::info!("JetStream context ready");

    Ok(Streamer {
        context,
        pending: max_pending.map(|n| Arc::new(Semaphore::new(n))),
        max_pending,
    })
}

/// JetStream context with an optional bound on unacknowledged publishes
#[derive(Clone)]
pub struct Streamer {
    context: jetstream::Context,
    pending: Option<Arc<Semaphore>>,
    max_pending: Option<usize>,
}

/// A publish whose acknowledgement hasn't been awaited yet.
///
/// Holds a slot of the pending-publish budget until awaited or dropped.
pub struct PendingAck {
    ack: PublishAckFuture,
    _permit: Option<OwnedSemaphorePermit>,
}

impl PendingAck {
    /// Wait for the server acknowledgement
    pub async fn wait(self) -> Result<PublishAck, Error> {
        let PendingAck { ack, _permit } = self;
        Ok(ack.await?)
    }
}

impl Streamer {
    /// Get JetStream context for advanced operations
    pub fn context(&self) -> &jetstream::Context {
        &self.context
    }

    /// Bound on pending publishes, if one was configured
    pub fn max_pending(&self) -> Option<usize> {
        self.max_pending
    }

    /// Publish without waiting for the acknowledgement.
    ///
    /// When a pending bound is configured, waits until fewer than that many
    /// acknowledgements are outstanding.
    pub async fn publish_async(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<PendingAck, Error> {
        let permit = match &self.pending {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Closed("publish limiter".to_string()))?,
            ),
            None => None,
        };

        let subject: String = subject.into();
        let payload: Vec<u8> = payload.into();
        let ack = self.context.publish(subject, payload.into()).await?;

        Ok(PendingAck { ack, _permit: permit })
    }

    /// Publish and wait for the acknowledgement
    pub async fn publish(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<PublishAck, Error> {
        let subject = subject.into();
        let pending = self.publish_async(subject.clone(), payload).await?;
        let ack = pending.wait().await?;

        tracing::debug!("Published to JetStream subject {} (seq {})", subject, ack.sequence);

        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_empty_without_jetstream_namespace() {
        let mut settings = Settings::new();
        settings.set_default("nats.url", "nats://localhost:4222");

        let opts = new_default_streamer_config(&settings).unwrap();
        assert!(opts.is_empty());
    }

    #[test]
    fn test_enable_only_yields_no_options() {
        let mut settings = Settings::new();
        settings.set_default("nats.jetstream.enable", true);

        let opts = new_default_streamer_config(&settings).unwrap();
        assert!(opts.is_empty());
    }

    #[test]
    fn test_options_in_order() {
        let mut settings = Settings::new();
        settings.set_default("nats.jetstream.publish_async_max_pending", 256);
        settings.set_default("nats.jetstream.prefix", "$JS.hub.API");
        settings.set_default("nats.jetstream.timeout", "10s");

        let opts = new_default_streamer_config(&settings).unwrap();
        assert_eq!(
            opts,
            vec![
                StreamerOption::ApiPrefix("$JS.hub.API".to_string()),
                StreamerOption::Timeout(Duration::from_secs(10)),
                StreamerOption::PublishAsyncMaxPending(256),
            ]
        );
    }

    #[test]
    fn test_domain_option() {
        let mut settings = Settings::new();
        settings.set_default("bus.jetstream.domain", "leaf");

        let opts = new_streamer_config(&settings, "bus").unwrap();
        assert_eq!(opts, vec![StreamerOption::Domain("leaf".to_string())]);
    }

    #[test]
    fn test_zero_max_pending_rejected() {
        let mut settings = Settings::new();
        settings.set_default("nats.jetstream.publish_async_max_pending", 0);

        let err = new_default_streamer_config(&settings).unwrap_err();
        assert!(matches!(err, Error::Settings(SettingsError::InvalidValue { .. })));
    }
}
