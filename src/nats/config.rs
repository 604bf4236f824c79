/// NATS connection options built from a flat configuration namespace
///
/// Every key lives under a namespace prefix (`nats` by default), e.g.
/// `nats.url`, `nats.servers_0`, `nats.tls.cert`. Missing keys fall back to
/// the client defaults below; only a missing namespace is an error.

use async_nats::{ConnectOptions, ServerAddr};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nats::error::Error;
use crate::settings::{ConfigSource, SettingsError};

/// Namespace used by [`new_default_config`]
pub const CONFIG_KEY: &str = "nats";

pub const DEFAULT_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_MAX_RECONNECT: i64 = 60;
pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(2);
pub const DEFAULT_RECONNECT_JITTER: Duration = Duration::from_millis(100);
pub const DEFAULT_RECONNECT_JITTER_TLS: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_MAX_PINGS_OUT: usize = 2;
pub const DEFAULT_SUB_CHAN_LEN: usize = 64 * 1024;
pub const DEFAULT_RECONNECT_BUF_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Client certificate and trust roots
#[derive(Debug, Clone, PartialEq)]
pub struct TlsOptions {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca_cert: Option<PathBuf>,
}

/// Connection parameters handed to the client library.
///
/// Built once by [`new_config`] and not modified afterwards.
#[derive(Clone, PartialEq)]
pub struct Options {
    pub url: String,
    /// Explicit server list; `None` when only `url` is configured
    pub servers: Option<Vec<String>>,
    pub no_randomize: bool,
    pub no_echo: bool,
    pub name: String,
    pub verbose: bool,
    pub pedantic: bool,
    pub secure: bool,
    pub allow_reconnect: bool,
    /// Negative means reconnect forever
    pub max_reconnect: i64,
    pub reconnect_wait: Duration,
    pub reconnect_jitter: Duration,
    pub reconnect_jitter_tls: Duration,
    pub timeout: Duration,
    pub drain_timeout: Duration,
    /// Zero disables the bound
    pub flusher_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub ping_interval: Duration,
    pub max_pings_out: usize,
    pub reconnect_buf_size: usize,
    pub sub_chan_len: usize,
    pub nkey: String,
    pub user: String,
    pub password: String,
    pub token: String,
    pub credentials_file: Option<PathBuf>,
    pub use_old_request_style: bool,
    pub no_callbacks_after_client_close: bool,
    pub retry_on_failed_connect: bool,
    pub compression: bool,
    pub inbox_prefix: String,
    pub tls: Option<TlsOptions>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            url: String::new(),
            servers: None,
            no_randomize: false,
            no_echo: false,
            name: String::new(),
            verbose: false,
            pedantic: false,
            secure: false,
            allow_reconnect: true,
            max_reconnect: DEFAULT_MAX_RECONNECT,
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
            reconnect_jitter: DEFAULT_RECONNECT_JITTER,
            reconnect_jitter_tls: DEFAULT_RECONNECT_JITTER_TLS,
            timeout: DEFAULT_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            flusher_timeout: Duration::ZERO,
            request_timeout: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            max_pings_out: DEFAULT_MAX_PINGS_OUT,
            reconnect_buf_size: DEFAULT_RECONNECT_BUF_SIZE,
            sub_chan_len: DEFAULT_SUB_CHAN_LEN,
            nkey: String::new(),
            user: String::new(),
            password: String::new(),
            token: String::new(),
            credentials_file: None,
            use_old_request_style: false,
            no_callbacks_after_client_close: false,
            retry_on_failed_connect: false,
            compression: false,
            inbox_prefix: String::new(),
            tls: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(secret: &str) -> &'static str {
            if secret.is_empty() { "" } else { "<redacted>" }
        }

        f.debug_struct("Options")
            .field("url", &self.url)
            .field("servers", &self.servers)
            .field("no_randomize", &self.no_randomize)
            .field("name", &self.name)
            .field("secure", &self.secure)
            .field("allow_reconnect", &self.allow_reconnect)
            .field("max_reconnect", &self.max_reconnect)
            .field("reconnect_wait", &self.reconnect_wait)
            .field("timeout", &self.timeout)
            .field("ping_interval", &self.ping_interval)
            .field("sub_chan_len", &self.sub_chan_len)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("token", &redact(&self.token))
            .field("nkey", &redact(&self.nkey))
            .field("credentials_file", &self.credentials_file)
            .field("retry_on_failed_connect", &self.retry_on_failed_connect)
            .field("inbox_prefix", &self.inbox_prefix)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

/// Build options from the `nats` namespace
pub fn new_default_config<S: ConfigSource + ?Sized>(source: &S) -> Result<Options, Error> {
    new_config(source, CONFIG_KEY)
}

/// Build options from the namespace `prefix`.
///
/// # Errors
/// * `Error::EmptyConfig` - nothing is set under `prefix`
/// * `Error::Settings` - a key is set but has the wrong type
/// * `Error::Tls` - the `tls` namespace is set but a certificate file can't be loaded
pub fn new_config<S: ConfigSource + ?Sized>(source: &S, prefix: &str) -> Result<Options, Error> {
    if !source.is_set(prefix) {
        return Err(Error::EmptyConfig);
    }

    let key = |name: &str| format!("{}.{}", prefix, name);
    let string = |name: &str| -> Result<String, Error> {
        Ok(source.get_string(&key(name))?.unwrap_or_default())
    };
    let flag = |name: &str, default: bool| -> Result<bool, Error> {
        Ok(source.get_bool(&key(name))?.unwrap_or(default))
    };
    let duration = |name: &str, default: Duration| -> Result<Duration, Error> {
        Ok(source.get_duration(&key(name))?.unwrap_or(default))
    };
    let size = |name: &str, default: usize| -> Result<usize, Error> {
        get_usize(source, &key(name), default)
    };

    let addresses = fetch_addresses(source, &key("servers"))?;
    let servers = if addresses.is_empty() { None } else { Some(addresses) };

    let mut options = Options {
        url: string("url")?,
        servers,
        no_randomize: flag("no_randomize", false)?,
        no_echo: false,
        name: string("name")?,
        verbose: flag("verbose", false)?,
        pedantic: flag("pedantic", false)?,
        secure: flag("secure", false)?,
        allow_reconnect: flag("allow_reconnect", true)?,
        max_reconnect: source
            .get_int(&key("max_reconnect"))?
            .unwrap_or(DEFAULT_MAX_RECONNECT),
        reconnect_wait: duration("reconnect_wait", DEFAULT_RECONNECT_WAIT)?,
        reconnect_jitter: duration("reconnect_jitter", DEFAULT_RECONNECT_JITTER)?,
        reconnect_jitter_tls: duration("reconnect_jitter_tls", DEFAULT_RECONNECT_JITTER_TLS)?,
        timeout: duration("timeout", DEFAULT_TIMEOUT)?,
        drain_timeout: duration("drain_timeout", DEFAULT_DRAIN_TIMEOUT)?,
        flusher_timeout: duration("flusher_timeout", Duration::ZERO)?,
        request_timeout: source.get_duration(&key("request_timeout"))?,
        ping_interval: duration("ping_interval", DEFAULT_PING_INTERVAL)?,
        max_pings_out: size("max_pings_out", DEFAULT_MAX_PINGS_OUT)?,
        reconnect_buf_size: size("reconnect_buf_size", DEFAULT_RECONNECT_BUF_SIZE)?,
        sub_chan_len: size("sub_chan_len", DEFAULT_SUB_CHAN_LEN)?,
        nkey: string("nkey")?,
        user: string("user")?,
        password: string("password")?,
        token: string("token")?,
        credentials_file: source.get_string(&key("credentials"))?.map(PathBuf::from),
        use_old_request_style: flag("use_old_request_style", false)?,
        no_callbacks_after_client_close: flag("no_callbacks_after_client_close", false)?,
        retry_on_failed_connect: flag("retry_on_failed_connect", false)?,
        compression: flag("compression", false)?,
        inbox_prefix: string("inbox_prefix")?,
        tls: None,
    };

    if source.is_set(&key("tls")) {
        let cert = PathBuf::from(string("tls.cert")?);
        let tls_key = PathBuf::from(string("tls.key")?);
        load_certs(&cert)?;
        load_key(&tls_key)?;

        let ca_cert = if source.is_set(&key("tls.cacert")) {
            let ca = PathBuf::from(string("tls.cacert")?);
            load_certs(&ca)?;
            Some(ca)
        } else {
            None
        };

        options.secure = true;
        options.tls = Some(TlsOptions { cert, key: tls_key, ca_cert });
    }

    tracing::debug!(?options, "Resolved NATS options from '{}'", prefix);

    Ok(options)
}

/// Resolve an address list.
///
/// Enumerated keys (`key_0`, `key_1`, ...) are read until the first missing or
/// empty one. When none exist, `key` itself is read as a list (or a
/// whitespace-separated string).
pub fn fetch_addresses<S: ConfigSource + ?Sized>(source: &S, key: &str) -> Result<Vec<String>, Error> {
    let mut addresses = Vec::new();

    for i in 0.. {
        match source.get_string(&format!("{}_{}", key, i))? {
            Some(addr) if !addr.is_empty() => addresses.push(addr),
            _ => break,
        }
    }

    if addresses.is_empty() {
        addresses = source.get_string_list(key)?.unwrap_or_default();
    }

    Ok(addresses)
}

fn get_usize<S: ConfigSource + ?Sized>(source: &S, key: &str, default: usize) -> Result<usize, Error> {
    match source.get_int(key)? {
        None => Ok(default),
        Some(value) => usize::try_from(value).map_err(|_| {
            Error::Settings(SettingsError::InvalidValue {
                key: key.to_string(),
                expected: "non-negative integer",
                found: value.to_string(),
            })
        }),
    }
}

fn tls_error(path: &Path, message: impl Into<String>) -> Error {
    Error::Tls {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, message.into()),
    }
}

fn open_pem(path: &Path) -> Result<BufReader<File>, Error> {
    let file = File::open(path).map_err(|source| Error::Tls {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Load certificates from a PEM file, requiring at least one
fn load_certs(path: &Path) -> Result<(), Error> {
    let mut reader = open_pem(path)?;

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| Error::Tls { path: path.to_path_buf(), source })?;

    if certs.is_empty() {
        return Err(tls_error(path, "no certificates found"));
    }

    tracing::debug!("Loaded {} certificate(s) from {}", certs.len(), path.display());
    Ok(())
}

/// Load a private key (PKCS#1, PKCS#8 or SEC1) from a PEM file
fn load_key(path: &Path) -> Result<(), Error> {
    let mut reader = open_pem(path)?;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(_)))
            | Ok(Some(rustls_pemfile::Item::Pkcs8Key(_)))
            | Ok(Some(rustls_pemfile::Item::Sec1Key(_))) => return Ok(()),
            Ok(Some(_)) => continue,
            Ok(None) => return Err(tls_error(path, "no private key found")),
            Err(source) => {
                return Err(Error::Tls { path: path.to_path_buf(), source });
            }
        }
    }
}

impl Options {
    /// Addresses to dial: `servers` when present, else `url`, else the default URL
    pub fn server_addrs(&self) -> Result<Vec<ServerAddr>, Error> {
        let addresses: Vec<&str> = match &self.servers {
            Some(servers) if !servers.is_empty() => servers.iter().map(String::as_str).collect(),
            _ if !self.url.is_empty() => self.url.split(',').map(str::trim).collect(),
            _ => vec![DEFAULT_URL],
        };

        addresses
            .into_iter()
            .map(|address| {
                address.parse::<ServerAddr>().map_err(|e| Error::InvalidAddress {
                    address: address.to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Map these options onto the client library's connect builder.
    ///
    /// Options the client cannot express are reported once with `warn!`
    /// when they differ from their defaults.
    pub async fn to_connect_options(&self) -> Result<ConnectOptions, Error> {
        self.warn_unsupported();

        let mut opts = ConnectOptions::new()
            .connection_timeout(self.timeout)
            .ping_interval(self.ping_interval)
            .subscription_capacity(self.sub_chan_len)
            .request_timeout(self.request_timeout);

        if !self.name.is_empty() {
            opts = opts.name(self.name.as_str());
        }
        if self.no_echo {
            opts = opts.no_echo();
        }
        if self.no_randomize {
            opts = opts.retain_servers_order();
        }
        if self.retry_on_failed_connect {
            opts = opts.retry_on_initial_connect();
        }
        if !self.inbox_prefix.is_empty() {
            opts = opts.custom_inbox_prefix(self.inbox_prefix.as_str());
        }

        opts = opts.max_reconnects(self.max_reconnects());

        let wait = self.reconnect_wait;
        let jitter = if self.secure { self.reconnect_jitter_tls } else { self.reconnect_jitter };
        opts = opts.reconnect_delay_callback(move |attempts| reconnect_delay(attempts, wait, jitter));

        if !self.user.is_empty() {
            opts = opts.user_and_password(self.user.clone(), self.password.clone());
        }
        if !self.token.is_empty() {
            opts = opts.token(self.token.clone());
        }
        if !self.nkey.is_empty() {
            opts = opts.nkey(self.nkey.clone());
        }
        if let Some(path) = &self.credentials_file {
            opts = opts.credentials_file(path).await.map_err(|source| Error::Credentials {
                path: path.clone(),
                source,
            })?;
        }

        if self.secure {
            opts = opts.require_tls(true);
        }
        if let Some(tls) = &self.tls {
            opts = opts.add_client_certificate(tls.cert.clone(), tls.key.clone());
            if let Some(ca) = &tls.ca_cert {
                opts = opts.add_root_certificates(ca.clone());
            }
        }

        Ok(opts)
    }

    // The client counts the initial connect as an attempt and reads zero as
    // unlimited, so "no reconnects" is a limit of one.
    fn max_reconnects(&self) -> Option<usize> {
        if !self.allow_reconnect {
            return Some(1);
        }
        usize::try_from(self.max_reconnect)
            .ok()
            .map(|reconnects| reconnects.saturating_add(1))
    }

    fn warn_unsupported(&self) {
        let flags = [
            ("verbose", self.verbose),
            ("pedantic", self.pedantic),
            ("use_old_request_style", self.use_old_request_style),
            ("no_callbacks_after_client_close", self.no_callbacks_after_client_close),
            ("compression", self.compression),
            ("max_pings_out", self.max_pings_out != DEFAULT_MAX_PINGS_OUT),
            ("reconnect_buf_size", self.reconnect_buf_size != DEFAULT_RECONNECT_BUF_SIZE),
        ];

        for (name, set) in flags {
            if set {
                tracing::warn!("NATS option '{}' is not supported by the client and is ignored", name);
            }
        }
    }
}

// The first reconnect is immediate; later ones wait plus a random share of the jitter.
fn reconnect_delay(attempts: usize, wait: Duration, jitter: Duration) -> Duration {
    if attempts <= 1 {
        return Duration::ZERO;
    }

    wait + jitter.mul_f64(rand::random::<f64>())
}
