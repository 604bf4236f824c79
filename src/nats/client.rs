/// NATS connection factory
///
/// Opens the connection described by an [`Options`] record. Connection
/// lifecycle (reconnects, pings, flushing) stays with the client library.

use std::time::Duration;

use crate::nats::config::Options;
use crate::nats::error::Error;

/// Client alias
pub type Client = async_nats::Client;

/// Connect to NATS using the given options.
///
/// # Errors
/// * `Error::EmptyConfig` - no options were given
/// * `Error::InvalidAddress` - a server address can't be parsed
/// * `Error::Connect` - the client library failed to connect
pub async fn new_connection(options: Option<&Options>) -> Result<Client, Error> {
    let options = options.ok_or(Error::EmptyConfig)?;

    let addrs = options.server_addrs()?;
    let connect_options = options.to_connect_options().await?;

    let client = connect_options.connect(addrs.as_slice()).await?;

    let info = client.server_info();
    tracing::info!(
        "Connected to NATS server {} ({}) version {}",
        info.server_name,
        info.server_id,
        info.version
    );

    Ok(client)
}

/// Flush pending writes, bounded by `flusher_timeout` (zero means no bound)
pub async fn flush(client: &Client, options: &Options) -> Result<(), Error> {
    flush_within(client, options.flusher_timeout).await
}

/// Flush before the host drops the connection, bounded by `drain_timeout`
pub async fn shutdown(client: Client, options: &Options) -> Result<(), Error> {
    let result = flush_within(&client, options.drain_timeout).await;
    tracing::info!("NATS connection released");
    drop(client);
    result
}

async fn flush_within(client: &Client, limit: Duration) -> Result<(), Error> {
    if limit.is_zero() {
        return Ok(client.flush().await?);
    }

    match tokio::time::timeout(limit, client.flush()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::FlushTimeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_fail_for_empty_config() {
        let err = new_connection(None).await.unwrap_err();
        assert!(matches!(err, Error::EmptyConfig));
        assert_eq!(err.to_string(), "nats empty config");
    }

    #[tokio::test]
    async fn test_should_fail_client() {
        // Nothing listens on port 1
        let options = Options {
            url: "nats://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(500),
            ..Options::default()
        };

        let err = new_connection(Some(&options)).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let options = Options {
            servers: Some(vec!["not a url at all::".to_string()]),
            ..Options::default()
        };

        let err = new_connection(Some(&options)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }
}
