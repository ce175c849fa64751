//! Thread-blocking facade over [`driver::Connection`](crate::driver::Connection).
//!
//! Each connection owns a current-thread runtime and blocks the calling
//! thread for every operation. Give each thread its own connection.
//! Not for use from inside an async runtime.

use quarry_core::{IntoComponents, QueryComponents, Value};
use tokio::runtime::{Builder, Runtime};

use crate::driver::{
    self, CancelToken, ConnectionInfo, ConnectionStatus, Dispatch, DriverSettings, Logger, PgResult,
    QueryResult,
};

pub struct Connection {
    inner: driver::Connection,
    runtime: Runtime,
}

impl Connection {
    /// An unopened connection. Waits always block until ready; the
    /// dispatch setting is forced to [`Dispatch::Blocking`].
    pub fn new(info: ConnectionInfo) -> PgResult<Self> {
        Self::with_settings(info, DriverSettings::default())
    }

    pub fn with_settings(info: ConnectionInfo, mut settings: DriverSettings) -> PgResult<Self> {
        settings.dispatch = Dispatch::Blocking;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner: driver::Connection::with_settings(info, settings),
            runtime,
        })
    }

    pub fn connect(info: ConnectionInfo) -> PgResult<Self> {
        let mut conn = Self::new(info)?;
        conn.open()?;
        Ok(conn)
    }

    pub fn open(&mut self) -> PgResult<()> {
        self.runtime.block_on(self.inner.open())
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.inner.close())
    }

    pub fn execute(&mut self, query: impl IntoComponents) -> PgResult<QueryResult> {
        self.runtime.block_on(self.inner.execute(query))
    }

    pub fn execute_params<I, V>(&mut self, sql: &str, values: I) -> PgResult<QueryResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.runtime.block_on(self.inner.execute_params(sql, values))
    }

    pub fn execute_batch(&mut self, statements: &[QueryComponents]) -> PgResult<QueryResult> {
        self.runtime.block_on(self.inner.execute_batch(statements))
    }

    pub fn transaction_start(&mut self) -> PgResult<()> {
        self.runtime.block_on(self.inner.transaction_start())
    }

    pub fn transaction_end(&mut self) -> PgResult<()> {
        self.runtime.block_on(self.inner.transaction_end())
    }

    pub fn transaction_rollback(&mut self) -> PgResult<()> {
        self.runtime.block_on(self.inner.transaction_rollback())
    }

    pub fn savepoint(&mut self, name: &str) -> PgResult<()> {
        self.runtime.block_on(self.inner.savepoint(name))
    }

    pub fn rollback_to_savepoint(&mut self, name: &str) -> PgResult<()> {
        self.runtime.block_on(self.inner.rollback_to_savepoint(name))
    }

    pub fn release_savepoint(&mut self, name: &str) -> PgResult<()> {
        self.runtime.block_on(self.inner.release_savepoint(name))
    }

    /// Send a cancel request for a statement running on another thread's
    /// connection.
    pub fn cancel(&self, token: &CancelToken) -> PgResult<()> {
        self.runtime.block_on(token.cancel_query())
    }

    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.inner.cancel_token()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.inner.last_error()
    }

    pub fn is_transaction_active(&self) -> bool {
        self.inner.is_transaction_active()
    }

    pub fn set_logger(&mut self, logger: std::sync::Arc<dyn Logger>) {
        self.inner.set_logger(logger);
    }

    /// The underlying async connection.
    pub fn get_ref(&self) -> &driver::Connection {
        &self.inner
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.runtime.block_on(self.inner.close());
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connection").field(&self.inner).finish()
    }
}
