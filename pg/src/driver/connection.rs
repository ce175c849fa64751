//! PostgreSQL connection: transport, status, open and close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::handshake::Handshake;
use super::info::{ConnectionInfo, SslMode};
use super::io::{Wait, drive_handshake};
use super::logger::Logger;
use super::status::ConnectionStatus;
use super::stream::{self, PgStream};
use super::{PgError, PgResult};
use crate::protocol::{PgEncoder, TransactionStatus};

/// Initial read/write buffer capacity.
pub(crate) const BUFFER_CAPACITY: usize = 16 * 1024;

/// How waits on the socket are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Suspend until the socket is ready, bounded only by deadlines.
    Blocking,
    /// Wake every `poll_interval` to re-check readiness and deadlines.
    #[default]
    Polling,
}

/// What to do with a response the driver cannot classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownStatusPolicy {
    /// Treat it as a successful result with status `Unknown`.
    #[default]
    Accept,
    /// Fail the statement with a protocol error.
    Reject,
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub dispatch: Dispatch,
    pub poll_interval: Duration,
    /// Upper bound on each `execute`, including result draining.
    pub statement_timeout: Option<Duration>,
    pub unknown_status: UnknownStatusPolicy,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            dispatch: Dispatch::default(),
            poll_interval: Duration::from_millis(100),
            statement_timeout: None,
            unknown_status: UnknownStatusPolicy::default(),
        }
    }
}

/// A single connection to a PostgreSQL server.
///
/// Runs one statement at a time. Use one `Connection` per task for
/// concurrency.
pub struct Connection {
    pub(crate) info: ConnectionInfo,
    pub(crate) settings: DriverSettings,
    pub(crate) stream: Option<PgStream>,
    pub(crate) read_buf: BytesMut,
    pub(crate) write_buf: BytesMut,
    pub(crate) status: ConnectionStatus,
    pub(crate) transaction_active: bool,
    pub(crate) transaction_status: TransactionStatus,
    /// Set across every await that talks to the server; still set on the
    /// next call only if a future was dropped mid-exchange.
    pub(crate) in_flight: bool,
    /// A statement was dispatched and its results are not fully read.
    pub(crate) awaiting_results: bool,
    pub(crate) deadline: Option<Instant>,
    pub(crate) logger: Option<Arc<dyn Logger>>,
    pub(crate) last_error: Option<String>,
    parameters: HashMap<String, String>,
    backend_key: Option<(i32, i32)>,
}

impl Connection {
    /// An unopened connection.
    pub fn new(info: ConnectionInfo) -> Self {
        Self::with_settings(info, DriverSettings::default())
    }

    pub fn with_settings(info: ConnectionInfo, settings: DriverSettings) -> Self {
        Self {
            info,
            settings,
            stream: None,
            read_buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            status: ConnectionStatus::Needed,
            transaction_active: false,
            transaction_status: TransactionStatus::Idle,
            in_flight: false,
            awaiting_results: false,
            deadline: None,
            logger: None,
            last_error: None,
            parameters: HashMap::new(),
            backend_key: None,
        }
    }

    /// Create and open in one step.
    pub async fn connect(info: ConnectionInfo) -> PgResult<Self> {
        let mut conn = Self::new(info);
        conn.open().await?;
        Ok(conn)
    }

    /// Open with a blocking handshake: each step awaits readiness, bounded
    /// only by the connect timeout.
    pub async fn open(&mut self) -> PgResult<()> {
        self.open_with(Wait {
            interval: None,
            deadline: None,
        })
        .await
    }

    /// Open with a polling handshake: readiness is re-checked every
    /// `poll_interval` while the startup state machine advances.
    pub async fn open_polling(&mut self) -> PgResult<()> {
        self.open_with(Wait {
            interval: Some(self.settings.poll_interval),
            deadline: None,
        })
        .await
    }

    async fn open_with(&mut self, mut wait: Wait) -> PgResult<()> {
        self.close().await;
        self.last_error = None;

        if let Err(e) = self.info.validate() {
            return Err(self.mark_broken(e));
        }
        wait.deadline = self.info.get_connect_timeout().map(|t| Instant::now() + t);

        self.set_status(ConnectionStatus::Started);
        match self.establish(wait).await {
            Ok(()) => {
                self.set_status(ConnectionStatus::Ok);
                info!(
                    host = self.info.host(),
                    port = self.info.port(),
                    database = self.info.database(),
                    "connection opened"
                );
                Ok(())
            }
            Err(e) => Err(self.mark_broken(e)),
        }
    }

    async fn establish(&mut self, wait: Wait) -> PgResult<()> {
        let stream = self.connect_transport(wait).await?;
        let stream = self.stream.insert(stream);

        let mut hs = Handshake::new(&self.info);
        let driven = drive_handshake(stream, &mut hs, wait).await;
        self.status = hs.status();
        driven?;

        let established = hs.finish();
        self.parameters = established.parameters;
        self.backend_key = established.backend_key;
        self.read_buf = established.leftover;
        self.transaction_status = TransactionStatus::Idle;
        Ok(())
    }

    async fn connect_transport(&mut self, wait: Wait) -> PgResult<PgStream> {
        let host = self.info.host().to_string();
        let port = self.info.port();

        if let Some(path) = self.info.socket_path() {
            let unix = wait
                .run("connecting", stream::connect_unix(&path))
                .await?
                .map_err(|e| {
                    PgError::Connection(format!("Could not connect to {}: {}", path.display(), e))
                })?;
            self.set_status(ConnectionStatus::Made);
            return Ok(unix);
        }

        let mut tcp = connect_plain(&host, port, wait).await?;
        self.set_status(ConnectionStatus::Made);

        let mode = self.info.get_ssl_mode();
        if mode == SslMode::Disable {
            return Ok(PgStream::Tcp(tcp));
        }

        self.set_status(ConnectionStatus::SslStartup);
        let accepted = wait
            .run("negotiating SSL", stream::request_tls(&mut tcp))
            .await??;
        if !accepted {
            if mode == SslMode::Require {
                return Err(PgError::Connection("Server does not support TLS".to_string()));
            }
            debug!("server declined TLS, continuing in plaintext");
            self.set_status(ConnectionStatus::Made);
            return Ok(PgStream::Tcp(tcp));
        }

        let root_cert = self.info.get_ssl_root_cert().cloned();
        let upgraded = wait
            .run(
                "negotiating SSL",
                stream::upgrade_tls(tcp, &host, root_cert.as_deref()),
            )
            .await?;
        match upgraded {
            Ok(tls) => {
                self.set_status(ConnectionStatus::Made);
                Ok(PgStream::Tls(tls))
            }
            Err(e) if mode == SslMode::Prefer => {
                warn!(error = %e, "TLS failed, reconnecting in plaintext");
                let tcp = connect_plain(&host, port, wait).await?;
                self.set_status(ConnectionStatus::Made);
                Ok(PgStream::Tcp(tcp))
            }
            Err(e) => Err(e),
        }
    }

    /// Release the transport. Rolls back an open transaction first, ignoring
    /// failures. Safe to call repeatedly or on a connection never opened.
    pub async fn close(&mut self) {
        if self.stream.is_none() {
            self.transaction_active = false;
            if self.status != ConnectionStatus::Bad {
                self.set_status(ConnectionStatus::Needed);
            }
            return;
        }

        if self.transaction_active && self.status == ConnectionStatus::Ok && !self.in_flight {
            if let Err(e) = self.transaction_rollback().await {
                warn!(error = %e, "rollback during close failed");
            }
        }
        self.transaction_active = false;

        if let Some(mut stream) = self.stream.take() {
            let mut terminate = BytesMut::new();
            PgEncoder::encode_terminate(&mut terminate);
            let wait = Wait {
                interval: None,
                deadline: Some(Instant::now() + self.settings.poll_interval.max(Duration::from_secs(1))),
            };
            let _ = wait.run("closing", stream.write_all(&terminate)).await;
            let _ = wait.run("closing", stream.shutdown()).await;
            debug!("connection closed");
        }

        self.read_buf.clear();
        self.write_buf.clear();
        self.in_flight = false;
        self.awaiting_results = false;
        self.set_status(ConnectionStatus::Needed);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DriverSettings {
        &mut self.settings
    }

    /// Text of the most recent error, from the server where available.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// A run-time parameter reported by the server (`server_version`, ...).
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    /// Transaction state from the last ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Attach a statement logger.
    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = Some(logger);
    }

    pub fn clear_logger(&mut self) {
        self.logger = None;
    }

    /// Key for cancelling this connection's running statement from elsewhere.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        let (process_id, secret_key) = self.backend_key?;
        Some(CancelToken::new(&self.info, process_id, secret_key))
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            tracing::trace!(from = ?self.status, to = ?status, "connection status");
            self.status = status;
        }
    }

    pub(crate) fn record_error(&mut self, error: &PgError) {
        self.last_error = Some(error.message());
    }

    /// Drop the transport and mark the connection unusable.
    pub(crate) fn mark_broken(&mut self, error: PgError) -> PgError {
        warn!(error = %error, "connection marked bad");
        self.record_error(&error);
        self.stream = None;
        self.in_flight = false;
        self.awaiting_results = false;
        self.read_buf.clear();
        self.write_buf.clear();
        self.set_status(ConnectionStatus::Bad);
        error
    }

    /// Wait policy for the current operation.
    pub(crate) fn wait(&self) -> Wait {
        Wait {
            interval: match self.settings.dispatch {
                Dispatch::Blocking => None,
                Dispatch::Polling => Some(self.settings.poll_interval),
            },
            deadline: self.deadline,
        }
    }

    /// Refuse work unless the connection can take a new statement.
    pub(crate) fn ensure_ready(&mut self) -> PgResult<()> {
        if self.in_flight {
            return Err(self.mark_broken(PgError::Broken(
                "A previous operation was interrupted mid-exchange".to_string(),
            )));
        }
        if self.awaiting_results {
            return Err(PgError::Busy);
        }
        if self.status != ConnectionStatus::Ok {
            return Err(PgError::NotReady(self.status));
        }
        Ok(())
    }
}

async fn connect_plain(host: &str, port: u16, wait: Wait) -> PgResult<tokio::net::TcpStream> {
    wait.run("connecting", stream::connect_tcp(host, port))
        .await?
        .map_err(|e| PgError::Connection(format!("Could not connect to {}:{}: {}", host, port, e)))
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Best effort: TLS cannot write synchronously, the server then sees EOF.
        if let Some(stream) = &self.stream {
            let terminate: [u8; 5] = [b'X', 0, 0, 0, 4];
            stream.try_write(&terminate);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("status", &self.status)
            .field("transaction_active", &self.transaction_active)
            .finish_non_exhaustive()
    }
}
