//! Type OIDs the driver inspects when turning cells into values.

/// Built-in type OIDs, from the server's `pg_type` catalog.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;

    pub const POINT: u32 = 600;
    pub const LSEG: u32 = 601;
    pub const PATH: u32 = 602;
    pub const BOX: u32 = 603;
    pub const POLYGON: u32 = 604;
    pub const CIRCLE: u32 = 718;
}

/// Geometry and bytea cells are handed out as `Value::Bytes`; everything
/// else is text.
pub fn is_binary_affinity(type_oid: u32) -> bool {
    matches!(
        type_oid,
        oid::BYTEA | oid::POINT | oid::LSEG | oid::PATH | oid::BOX | oid::POLYGON | oid::CIRCLE
    )
}
