//! Statement building for quarry.
//!
//! Statements are built as data, rendered into [`QueryComponents`] (SQL
//! fragments plus bound values), and only numbered at the last moment.
//! Values never get spliced into SQL text unless inline rendering is
//! requested explicitly.
//!
//! ```ignore
//! use quarry_core::prelude::*;
//!
//! let q = Select::table("artists")
//!     .all()
//!     .filter(eq("artists.genre", "Rock") | eq("artists.name", "Josh Rouse"))
//!     .to_components()?;
//! assert_eq!(q.to_sql(), "SELECT * FROM artists WHERE artists.genre = $1 OR artists.name = $2");
//! ```

pub mod codec;
pub mod components;
pub mod dialect;
pub mod dsl;
pub mod error;
pub mod field;
pub mod predicate;
pub mod value;

pub use codec::{FromValue, decode_bytea};
pub use components::{Fragment, IntoComponents, QueryComponents};
pub use error::{CoreResult, DecodeError, QueryError};
pub use field::{ColumnKey, ColumnRef, Field, FieldDescriptor, IntoField};
pub use value::{Point, Value};

pub mod prelude {
    pub use crate::codec::FromValue;
    pub use crate::components::{IntoComponents, QueryComponents};
    pub use crate::dialect::{Dialect, Postgres, QuestionMark};
    pub use crate::dsl::{
        Delete, Direction, Function, Insert, JoinKind, Render, Returning, Select, Selection,
        Source, Update,
    };
    pub use crate::error::{CoreResult, DecodeError, QueryError};
    pub use crate::field::{ColumnKey, Field, FieldDescriptor, IntoField};
    pub use crate::predicate::{
        Comparison, Predicate, eq, eq_field, gt, gte, ilike, in_select, is_in, is_not_null,
        is_null, like, lt, lte, ne, not_in,
    };
    pub use crate::value::{Point, Value};
}
