//! Integration tests for the NATS module constructors
//!
//! Tests that need a running server (started with `nats-server -js`) are
//! ignored by default; run them with `NATS_TEST_URL` set and `--ignored`.

use natsmod::nats::{flush, shutdown};
use natsmod::{
    new_connection, new_default_config, new_default_streamer_config, new_streamer, Error,
    NatsModule, Settings, StreamerOption,
};
use std::io::Write;

fn test_server_url() -> String {
    std::env::var("NATS_TEST_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .expect("NATS_TEST_URL must point at a nats-server started with -js")
}

#[test]
fn test_must_fail_on_empty() {
    let settings = Settings::new();
    let err = new_default_config(&settings).unwrap_err();
    assert!(matches!(err, Error::EmptyConfig));
}

#[test]
fn test_config_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "nats:\n  servers_0: nats://10.0.0.1:4222\n  servers_1: nats://10.0.0.2:4222\n  servers: nats://ignored:4222\n  jetstream:\n    prefix: $JS.hub.API\n"
    )
    .unwrap();

    let settings = Settings::from_yaml_file(file.path()).unwrap();
    let options = new_default_config(&settings).unwrap();
    assert_eq!(
        options.servers,
        Some(vec![
            "nats://10.0.0.1:4222".to_string(),
            "nats://10.0.0.2:4222".to_string(),
        ])
    );

    let streamer_config = new_default_streamer_config(&settings).unwrap();
    assert_eq!(
        streamer_config,
        vec![StreamerOption::ApiPrefix("$JS.hub.API".to_string())]
    );
}

#[tokio::test]
async fn test_should_fail_for_empty_options() {
    let err = new_connection(None).await.unwrap_err();
    assert_eq!(err.to_string(), Error::EmptyConfig.to_string());
}

#[tokio::test]
async fn test_should_fail_client() {
    let mut settings = Settings::new();
    settings.set_default("nats.url", "nats://127.0.0.1:1");
    settings.set_default("nats.timeout", "500ms");

    let options = new_default_config(&settings).unwrap();
    assert_eq!(options.url, "nats://127.0.0.1:1");

    let err = new_connection(Some(&options)).await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)));
}

#[tokio::test]
#[ignore = "requires a nats-server -js at NATS_TEST_URL"]
async fn test_should_not_fail_with_test_server() {
    let url = test_server_url();

    let mut settings = Settings::new();
    settings.set_default("nats.url", url.as_str());

    let options = new_default_config(&settings).unwrap();
    let client = new_connection(Some(&options)).await.unwrap();
    assert_eq!(
        client.connection_state(),
        async_nats::connection::State::Connected
    );
}

#[tokio::test]
#[ignore = "requires a nats-server -js at NATS_TEST_URL"]
async fn test_should_get_jetstream_context() {
    let url = test_server_url();

    let mut settings = Settings::new();
    settings.set_default("nats.url", url.as_str());

    let options = new_default_config(&settings).unwrap();
    let client = new_connection(Some(&options)).await.unwrap();

    settings.set_default("nats.jetstream.enable", true);
    settings.set_default("nats.jetstream.publish_async_max_pending", 8);

    let streamer_config = new_default_streamer_config(&settings).unwrap();
    let streamer = new_streamer(&client, &streamer_config).unwrap();
    assert_eq!(streamer.max_pending(), Some(8));

    streamer.context().query_account().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a nats-server -js at NATS_TEST_URL"]
async fn test_module_provides_components() {
    let url = test_server_url();

    let mut settings = Settings::new();
    settings.set_default("nats.url", url.as_str());
    settings.set_default("nats.name", "natsmod-test");

    let components = NatsModule::new().provide(&settings).await.unwrap();
    assert_eq!(components.options.name, "natsmod-test");
    assert!(components.streamer_config.is_empty());
    assert_eq!(components.streamer.max_pending(), None);
}

#[tokio::test]
#[ignore = "requires a nats-server -js at NATS_TEST_URL"]
async fn test_flush_and_shutdown_with_test_server() {
    let url = test_server_url();

    let mut settings = Settings::new();
    settings.set_default("nats.url", url.as_str());
    settings.set_default("nats.flusher_timeout", "1s");

    let options = new_default_config(&settings).unwrap();
    let client = new_connection(Some(&options)).await.unwrap();

    flush(&client, &options).await.unwrap();
    shutdown(client, &options).await.unwrap();
}

#[test]
fn test_example_config_file() {
    let settings = Settings::from_yaml_file("config/nats.example.yaml")
        .expect("Failed to load example config");

    let options = new_default_config(&settings).unwrap();
    assert_eq!(options.servers, Some(vec!["nats://127.0.0.1:4222".to_string()]));
    assert_eq!(options.name, "natsmod-example");
    assert_eq!(options.tls, None);

    let streamer_config = new_default_streamer_config(&settings).unwrap();
    assert_eq!(
        streamer_config,
        vec![
            StreamerOption::Timeout(std::time::Duration::from_secs(5)),
            StreamerOption::PublishAsyncMaxPending(256),
        ]
    );
}
