//! Query message encoding.
//!
//! Pure, synchronous computation - no I/O. Statements and their bound
//! values go in, wire bytes come out, ready for the connection to flush.
//! Parameter data is copied into the output buffer, so the caller's values
//! need not outlive the call.

use bytes::{BufMut, BytesMut};
use quarry_core::Value;

use super::EncodeError;

/// Text (0) or binary (1) parameter format.
const FORMAT_TEXT: i16 = 0;
const FORMAT_BINARY: i16 = 1;

pub struct PgEncoder;

impl PgEncoder {
    /// Encode a raw SQL string as a Simple Query message.
    /// Wire format:
    /// - 'Q' (1 byte) - message type
    /// - length (4 bytes, big-endian, includes self)
    /// - query string (null-terminated)
    pub fn encode_query_string(buf: &mut BytesMut, sql: &str) -> Result<(), EncodeError> {
        if sql.contains('\0') {
            return Err(EncodeError::NullByte);
        }
        buf.put_u8(b'Q');
        buf.put_i32((sql.len() + 1 + 4) as i32);
        buf.put_slice(sql.as_bytes());
        buf.put_u8(0);
        Ok(())
    }

    /// Encode a Terminate message to close the connection.
    pub fn encode_terminate(buf: &mut BytesMut) {
        buf.put_slice(&[b'X', 0, 0, 0, 4]);
    }

    /// Encode a Sync message (end of an extended query).
    pub fn encode_sync(buf: &mut BytesMut) {
        buf.put_slice(&[b'S', 0, 0, 0, 4]);
    }

    /// Encode a Parse message for the unnamed statement.
    /// Parameter types are left for the server to infer.
    pub fn encode_parse(buf: &mut BytesMut, sql: &str, param_count: usize) -> Result<(), EncodeError> {
        if sql.contains('\0') {
            return Err(EncodeError::NullByte);
        }
        buf.put_u8(b'P');
        let len = 4 + 1 + sql.len() + 1 + 2 + 4 * param_count;
        buf.put_i32(len as i32);
        buf.put_u8(0); // unnamed statement
        buf.put_slice(sql.as_bytes());
        buf.put_u8(0);
        buf.put_i16(param_count as i16);
        for _ in 0..param_count {
            buf.put_u32(0);
        }
        Ok(())
    }

    /// Encode a Bind message for the unnamed portal and statement.
    /// Wire format:
    /// - 'B' (1 byte) - message type
    /// - length (4 bytes)
    /// - portal name, statement name (both "")
    /// - per-parameter format codes: text, or binary for byte values
    /// - for each parameter: length (4 bytes, -1 for NULL), data
    /// - result format count (2 bytes) - 0, all text
    pub fn encode_bind(buf: &mut BytesMut, params: &[Value]) -> Result<(), EncodeError> {
        if params.len() > i16::MAX as usize {
            return Err(EncodeError::TooManyParameters(params.len()));
        }

        let start = buf.len();
        buf.put_u8(b'B');
        buf.put_i32(0);
        buf.put_u8(0); // portal
        buf.put_u8(0); // statement

        buf.put_i16(params.len() as i16);
        for param in params {
            buf.put_i16(match param {
                Value::Bytes(_) => FORMAT_BINARY,
                _ => FORMAT_TEXT,
            });
        }

        buf.put_i16(params.len() as i16);
        for param in params {
            match param {
                Value::Null => buf.put_i32(-1),
                Value::Text(text) => {
                    if text.contains('\0') {
                        buf.truncate(start);
                        return Err(EncodeError::NullByte);
                    }
                    buf.put_i32(text.len() as i32);
                    buf.put_slice(text.as_bytes());
                }
                Value::Bytes(bytes) => {
                    buf.put_i32(bytes.len() as i32);
                    buf.put_slice(bytes);
                }
            }
        }

        buf.put_i16(0);

        let len = (buf.len() - start - 1) as i32;
        buf[start + 1..start + 5].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }

    /// Encode a Describe message for the unnamed portal.
    pub fn encode_describe_portal(buf: &mut BytesMut) {
        buf.put_slice(&[b'D', 0, 0, 0, 6, b'P', 0]);
    }

    /// Encode an Execute message for the unnamed portal, no row limit.
    pub fn encode_execute(buf: &mut BytesMut) {
        buf.put_slice(&[b'E', 0, 0, 0, 9, 0]);
        buf.put_i32(0);
    }

    /// Parse + Bind + Describe + Execute + Sync in one buffer.
    pub fn encode_extended_query(buf: &mut BytesMut, sql: &str, params: &[Value]) -> Result<(), EncodeError> {
        if params.len() > i16::MAX as usize {
            return Err(EncodeError::TooManyParameters(params.len()));
        }
        let start = buf.len();
        let encoded = Self::encode_parse(buf, sql, params.len())
            .and_then(|()| Self::encode_bind(buf, params));
        if let Err(e) = encoded {
            buf.truncate(start);
            return Err(e);
        }
        Self::encode_describe_portal(buf);
        Self::encode_execute(buf);
        Self::encode_sync(buf);
        Ok(())
    }

    /// CancelRequest: length 16, cancel code, process id, secret key.
    pub fn encode_cancel_request(process_id: i32, secret_key: i32) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&16i32.to_be_bytes());
        out[4..8].copy_from_slice(&super::wire::CANCEL_REQUEST_CODE.to_be_bytes());
        out[8..12].copy_from_slice(&process_id.to_be_bytes());
        out[12..16].copy_from_slice(&secret_key.to_be_bytes());
        out
    }
}
