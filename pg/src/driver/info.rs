//! Connection parameters, built from fields or parsed from a URI.
//!
//! `scheme://[user[:password]@]host[:port]/database[?options]`
//!
//! Recognised options: `host` (overrides the authority host; a path selects
//! a Unix socket directory), `sslmode`, `sslrootcert`, `application_name`,
//! `connect_timeout` (seconds) and `options`. Anything else is passed to the
//! server as a run-time parameter in the startup message.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use super::{PgError, PgResult};

pub const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SCHEME: &str = "postgresql";

/// Whether to negotiate TLS before the startup message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    /// Try TLS, fall back to plaintext if the server declines or the TLS
    /// handshake fails.
    Prefer,
    Require,
}

impl SslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

impl FromStr for SslMode {
    type Err = PgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "prefer" | "allow" => Ok(SslMode::Prefer),
            "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
            other => Err(PgError::Connection(format!("Invalid sslmode: {}", other))),
        }
    }
}

/// Where and how to connect. Cloned into a [`Connection`](super::Connection)
/// and never changed there.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    scheme: String,
    host: String,
    port: u16,
    database: String,
    user: Option<String>,
    password: Option<String>,
    options: Option<String>,
    application_name: Option<String>,
    ssl_mode: SslMode,
    ssl_root_cert: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    params: Vec<(String, String)>,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: host.into(),
            port,
            database: database.into(),
            user: None,
            password: None,
            options: None,
            application_name: None,
            ssl_mode: SslMode::default(),
            ssl_root_cert: None,
            connect_timeout: None,
            params: Vec::new(),
        }
    }

    /// Parse a connection URI.
    pub fn parse(uri: &str) -> PgResult<Self> {
        let url = Url::parse(uri).map_err(|e| {
            PgError::Connection(format!(
                "Failed to extract host, port, database name from URI: {}",
                e
            ))
        })?;

        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Domain(name)) => decode(name)?,
            None => String::new(),
        };
        let database = decode(url.path().trim_start_matches('/'))?;

        let mut info = Self::new(host, url.port().unwrap_or(DEFAULT_PORT), database);
        info.scheme = url.scheme().to_string();
        if !url.username().is_empty() {
            info.user = Some(decode(url.username())?);
        }
        if let Some(password) = url.password() {
            info.password = Some(decode(password)?);
        }

        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "host" => info.host = value,
                "port" => {
                    info.port = value
                        .parse()
                        .map_err(|_| PgError::Connection(format!("Invalid port: {}", value)))?
                }
                "dbname" => info.database = value,
                "user" => info.user = Some(value),
                "password" => info.password = Some(value),
                "sslmode" => info.ssl_mode = value.parse()?,
                "sslrootcert" => info.ssl_root_cert = Some(PathBuf::from(value)),
                "application_name" => info.application_name = Some(value),
                "options" => info.options = Some(value),
                "connect_timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        PgError::Connection(format!("Invalid connect_timeout: {}", value))
                    })?;
                    info.connect_timeout = Some(Duration::from_secs(secs));
                }
                other => info.params.push((other.to_string(), value)),
            }
        }

        info.validate()?;
        Ok(info)
    }

    /// Fail with the name of the first missing piece.
    pub fn validate(&self) -> PgResult<()> {
        let missing = if self.host.is_empty() {
            "host"
        } else if self.port == 0 {
            "port"
        } else if self.database.is_empty() {
            "database name"
        } else {
            return Ok(());
        };
        Err(PgError::Connection(format!(
            "Failed to extract {} from connection info",
            missing
        )))
    }

    /// Render back into a URI. The default port is elided.
    pub fn to_uri(&self) -> PgResult<String> {
        self.render(self.password.as_deref())
    }

    fn render(&self, password: Option<&str>) -> PgResult<String> {
        let (mut url, authority) = self.base_url()?;
        let mut query: Vec<(&str, String)> = Vec::new();

        if authority {
            if self.user.is_some() || password.is_some() {
                url.set_username(self.user.as_deref().unwrap_or(""))
                    .and_then(|()| url.set_password(password))
                    .map_err(|()| {
                        PgError::Connection(format!("Cannot render credentials for '{}'", self.host))
                    })?;
            }
            if self.port != DEFAULT_PORT && url.set_port(Some(self.port)).is_err() {
                query.push(("port", self.port.to_string()));
            }
        } else {
            // Socket directory, port and credentials travel in the query.
            query.push(("host", self.host.clone()));
            if self.port != DEFAULT_PORT {
                query.push(("port", self.port.to_string()));
            }
            if let Some(user) = &self.user {
                query.push(("user", user.clone()));
            }
            if let Some(password) = password {
                query.push(("password", password.to_string()));
            }
        }
        url.set_path(&self.database);

        if self.ssl_mode != SslMode::Disable {
            query.push(("sslmode", self.ssl_mode.as_str().to_string()));
        }
        if let Some(path) = &self.ssl_root_cert {
            query.push(("sslrootcert", path.display().to_string()));
        }
        if let Some(name) = &self.application_name {
            query.push(("application_name", name.clone()));
        }
        if let Some(timeout) = self.connect_timeout {
            query.push(("connect_timeout", timeout.as_secs().to_string()));
        }
        if let Some(options) = &self.options {
            query.push(("options", options.clone()));
        }
        query.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.clone())));

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    /// `scheme://host/`, or `scheme:///` when the host cannot sit in the
    /// authority. The flag tells which.
    fn base_url(&self) -> PgResult<(Url, bool)> {
        if !self.is_unix_socket() {
            let host = if self.host.contains(':') {
                format!("[{}]", self.host)
            } else {
                self.host.clone()
            };
            if let Ok(url) = Url::parse(&format!("{}://{}/", self.scheme, host)) {
                return Ok((url, true));
            }
        }
        Url::parse(&format!("{}:///", self.scheme))
            .map(|url| (url, false))
            .map_err(|e| PgError::Connection(format!("Cannot render scheme '{}': {}", self.scheme, e)))
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Command-line options sent to the backend (`-c search_path=app`).
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// PEM file of trusted roots; the platform store is used otherwise.
    pub fn ssl_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_root_cert = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Extra run-time parameter for the startup message.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn get_scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// The configured user, else `$USER`, else `postgres`.
    pub fn get_user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "postgres".to_string())
    }

    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn get_options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    pub fn get_application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn get_ssl_mode(&self) -> SslMode {
        self.ssl_mode
    }

    pub fn get_ssl_root_cert(&self) -> Option<&PathBuf> {
        self.ssl_root_cert.as_ref()
    }

    pub fn get_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn is_unix_socket(&self) -> bool {
        self.host.starts_with('/')
    }

    /// `<dir>/.s.PGSQL.<port>` when the host names a socket directory.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.is_unix_socket()
            .then(|| PathBuf::from(&self.host).join(format!(".s.PGSQL.{}", self.port)))
    }

    /// Run-time parameters for the startup message, beyond user and database.
    pub(crate) fn startup_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.application_name {
            params.push(("application_name".to_string(), name.clone()));
        }
        if let Some(options) = &self.options {
            params.push(("options".to_string(), options.clone()));
        }
        params.extend(self.params.iter().cloned());
        params
    }
}

impl FromStr for ConnectionInfo {
    type Err = PgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders the URI with the password masked.
impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render(self.password.as_ref().map(|_| "***")) {
            Ok(uri) => f.write_str(&uri),
            Err(_) => write!(f, "{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ssl_mode", &self.ssl_mode)
            .finish_non_exhaustive()
    }
}

/// Percent-decode one URI component. Escapes must be two hex digits and
/// the result valid UTF-8.
fn decode(component: &str) -> PgResult<String> {
    let invalid = || PgError::Connection(format!("Invalid percent-encoding in {:?}", component));
    let mut rest = component;
    while let Some(at) = rest.find('%') {
        let escape = rest.as_bytes().get(at + 1..at + 3).ok_or_else(invalid)?;
        if !escape.iter().all(u8::is_ascii_hexdigit) {
            return Err(invalid());
        }
        rest = &rest[at + 3..];
    }
    percent_decode_str(component)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PgError::Connection(format!("Invalid UTF-8 in {:?}", component)))
}
