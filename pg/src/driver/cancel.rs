//! Query cancellation over a side connection.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::info::ConnectionInfo;
use super::stream;
use super::{PgError, PgResult};
use crate::protocol::PgEncoder;

/// Everything needed to interrupt a connection's running statement.
///
/// Detached from the [`Connection`](super::Connection), so it can be moved
/// to another task while the statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelToken {
    host: String,
    port: u16,
    socket_path: Option<PathBuf>,
    process_id: i32,
    secret_key: i32,
}

impl CancelToken {
    pub(crate) fn new(info: &ConnectionInfo, process_id: i32, secret_key: i32) -> Self {
        Self {
            host: info.host().to_string(),
            port: info.port(),
            socket_path: info.socket_path(),
            process_id,
            secret_key,
        }
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// Ask the server to cancel the running statement.
    ///
    /// Opens a new connection and sends CancelRequest. Success only means
    /// the request was delivered; the statement may still complete.
    pub async fn cancel_query(&self) -> PgResult<()> {
        let request = PgEncoder::encode_cancel_request(self.process_id, self.secret_key);
        debug!(pid = self.process_id, "sending cancel request");

        match &self.socket_path {
            Some(path) => {
                let mut socket = stream::connect_unix(path).await?;
                socket.write_all(&request).await?;
                socket.shutdown().await?;
            }
            None => {
                let mut socket = stream::connect_tcp(&self.host, self.port).await.map_err(|e| {
                    PgError::Connection(format!("Could not connect to {}:{}: {}", self.host, self.port, e))
                })?;
                socket.write_all(&request).await?;
                socket.shutdown().await?;
            }
        }
        Ok(())
    }
}
