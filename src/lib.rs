//! # quarry
//!
//! Typed PostgreSQL access: a statement builder that keeps values out of
//! SQL text, a native wire-protocol driver, and a small model layer.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use quarry::prelude::*;
//!
//! let mut conn = Config::discover()?.connect().await?;
//!
//! let query = Select::table("artists")
//!     .all()
//!     .filter(eq("genre", "rock") | eq("name", "Josh Rouse"))
//!     .asc("name");
//! let result = conn.execute(query).await?;
//! for row in &result {
//!     let name: String = row.get("name")?;
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `quarry-core` | values, query components, statement DSL |
//! | `quarry-pg` | connection, protocol, results |
//! | `quarry` | configuration, model mapping |

pub mod config;
pub mod error;
pub mod model;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Model, Persist};

pub use quarry_core;
pub use quarry_pg;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::Error;
    pub use crate::model::{Model, Persist};
    pub use quarry_core::prelude::*;
    pub use quarry_pg::{
        Connection, ConnectionInfo, ConnectionStatus, DriverSettings, PgError, QueryResult,
        ResultStatus, Row, SslMode,
    };
}
