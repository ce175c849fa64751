//! Native PostgreSQL driver for quarry.
//!
//! Speaks protocol v3 directly over tokio sockets: startup and
//! authentication, simple and extended queries, transactions, and text
//! result decoding through [`quarry_core::FromValue`].
//!
//! ```ignore
//! let info: ConnectionInfo = "postgresql://bob@localhost/music".parse()?;
//! let mut conn = Connection::connect(info).await?;
//! let result = conn.execute_params("SELECT * FROM artists WHERE genre = %@", ["rock"]).await?;
//! for row in &result {
//!     let name: String = row.get("name")?;
//! }
//! ```

pub mod blocking;
pub mod driver;
pub mod protocol;

pub use driver::{
    CancelToken, Connection, ConnectionInfo, ConnectionStatus, Dispatch, DriverSettings, FieldInfo,
    Handshake, Logger, PgError, PgResult, PollingStatus, QueryResult, ResultStatus, Row, SslMode,
    TracingLogger, UnknownStatusPolicy,
};
pub use protocol::{EncodeError, PgEncoder, TransactionStatus};
pub use quarry_core;
