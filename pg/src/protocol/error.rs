use thiserror::Error;

/// A statement that cannot be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Text parameters are NUL-terminated on the wire, so they cannot contain 0x00.
    #[error("Parameter contains a NUL byte")]
    NullByte,
    /// Bind carries the parameter count as an i16.
    #[error("{0} parameters exceed the protocol limit of 32767")]
    TooManyParameters(usize),
}
