//! Frontend/backend message framing. Pure byte manipulation, no sockets.

pub mod auth;
pub mod encoder;
pub mod error;
pub mod types;
pub mod wire;

pub use auth::{ScramClient, ScramError};
pub use encoder::PgEncoder;
pub use error::EncodeError;
pub use types::{is_binary_affinity, oid};
pub use wire::*;
