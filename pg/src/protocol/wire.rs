//! PostgreSQL Wire Protocol Messages
//!
//! Frontend/Backend protocol v3 message framing.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, BufMut, BytesMut};

/// Protocol version 3.0, as sent in the startup message.
pub const PROTOCOL_VERSION: i32 = 196608;

/// SSLRequest: length 8, code 80877103.
pub const SSL_REQUEST: [u8; 8] = [0, 0, 0, 8, 4, 210, 22, 47];

/// CancelRequest code, sent in place of a protocol version.
pub const CANCEL_REQUEST_CODE: i32 = 80877102;

/// Frontend (client → server) messages used outside the query path.
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message (sent first, no type byte)
    Startup {
        user: String,
        database: String,
        params: Vec<(String, String)>,
    },
    /// Cleartext or MD5-hashed password response
    PasswordMessage(String),
    /// SASL initial response (first message in SCRAM)
    SASLInitialResponse { mechanism: String, data: Vec<u8> },
    /// SASL response (subsequent messages in SCRAM)
    SASLResponse(Vec<u8>),
    /// Abort a COPY FROM STDIN the client cannot serve
    CopyFail(String),
    Terminate,
}

/// Backend (server → client) message types
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMD5Password([u8; 4]),
    AuthenticationSASL(Vec<String>),
    AuthenticationSASLContinue(Vec<u8>),
    AuthenticationSASLFinal(Vec<u8>),
    /// Parameter status (server config)
    ParameterStatus {
        name: String,
        value: String,
    },
    /// Backend key data (for cancel)
    BackendKeyData {
        process_id: i32,
        secret_key: i32,
    },
    ReadyForQuery(TransactionStatus),
    RowDescription(Vec<FieldDescription>),
    DataRow(Vec<Option<Vec<u8>>>),
    CommandComplete(String),
    ErrorResponse(ErrorFields),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,
    ParameterDescription(Vec<u32>),
    /// Copy in response (server ready to receive COPY data)
    CopyInResponse {
        format: u8,
        column_formats: Vec<u8>,
    },
    /// Copy out response (server will send COPY data)
    CopyOutResponse {
        format: u8,
        column_formats: Vec<u8>,
    },
    CopyData(Vec<u8>),
    CopyDone,
    /// Notification response (async notification from LISTEN/NOTIFY)
    NotificationResponse {
        process_id: i32,
        channel: String,
        payload: String,
    },
    EmptyQueryResponse,
    /// Notice response (warning/info messages, not errors)
    NoticeResponse(ErrorFields),
    NegotiateProtocolVersion {
        newest_minor: i32,
        unrecognized: Vec<String>,
    },
    /// A well-framed message of a type this driver does not know.
    Unknown(u8),
}

/// Transaction status reported by ReadyForQuery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,    // 'I'
    InBlock, // 'T'
    Failed,  // 'E'
    Unknown(u8),
}

/// Field description in RowDescription
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_attr: i16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: i16,
}

/// Error fields from ErrorResponse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorFields {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

/// Write a type byte, then `body` with its length prefix.
fn framed(buf: &mut BytesMut, tag: Option<u8>, body: impl FnOnce(&mut BytesMut)) {
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0);
    body(buf);
    let len = (buf.len() - len_pos) as i32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

impl FrontendMessage {
    /// Append the encoded message to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            FrontendMessage::Startup {
                user,
                database,
                params,
            } => framed(buf, None, |b| {
                b.put_i32(PROTOCOL_VERSION);
                put_cstr(b, "user");
                put_cstr(b, user);
                put_cstr(b, "database");
                put_cstr(b, database);
                for (name, value) in params {
                    put_cstr(b, name);
                    put_cstr(b, value);
                }
                b.put_u8(0);
            }),
            FrontendMessage::PasswordMessage(password) => {
                framed(buf, Some(b'p'), |b| put_cstr(b, password))
            }
            FrontendMessage::SASLInitialResponse { mechanism, data } => {
                framed(buf, Some(b'p'), |b| {
                    put_cstr(b, mechanism);
                    b.put_i32(data.len() as i32);
                    b.put_slice(data);
                })
            }
            FrontendMessage::SASLResponse(data) => framed(buf, Some(b'p'), |b| b.put_slice(data)),
            FrontendMessage::CopyFail(reason) => framed(buf, Some(b'f'), |b| put_cstr(b, reason)),
            FrontendMessage::Terminate => buf.put_slice(&[b'X', 0, 0, 0, 4]),
        }
    }

    /// Encode message to bytes for sending over the wire.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }
}

/// Bounds-checked reader over a message payload.
struct Payload<'a> {
    data: &'a [u8],
}

impl<'a> Payload<'a> {
    fn need(&self, n: usize, what: &str) -> Result<(), String> {
        if self.data.remaining() < n {
            return Err(format!("{} truncated", what));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8, String> {
        self.need(1, what)?;
        Ok(self.data.get_u8())
    }

    fn i16(&mut self, what: &str) -> Result<i16, String> {
        self.need(2, what)?;
        Ok(self.data.get_i16())
    }

    fn i32(&mut self, what: &str) -> Result<i32, String> {
        self.need(4, what)?;
        Ok(self.data.get_i32())
    }

    fn u32(&mut self, what: &str) -> Result<u32, String> {
        self.need(4, what)?;
        Ok(self.data.get_u32())
    }

    fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8], String> {
        self.need(n, what)?;
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn cstr(&mut self, what: &str) -> Result<String, String> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| format!("Missing null terminator in {}", what))?;
        let s = String::from_utf8_lossy(&self.data[..end]).to_string();
        self.data = &self.data[end + 1..];
        Ok(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }
}

impl BackendMessage {
    /// Split one complete message off the front of `buf`, if one is buffered.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Self>, String> {
        if buf.len() < 5 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if len < 4 {
            return Err(format!("Invalid message length: {}", len));
        }
        let total = len as usize + 1;
        if buf.len() < total {
            return Ok(None);
        }
        let frame = buf.split_to(total);
        let (message, _) = Self::decode(&frame)?;
        Ok(Some(message))
    }

    /// Decode a message from wire bytes.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), String> {
        if buf.len() < 5 {
            return Err("Buffer too short".to_string());
        }

        let msg_type = buf[0];
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if len < 4 {
            return Err(format!("Invalid message length: {}", len));
        }
        let len = len as usize;

        if buf.len() < len + 1 {
            return Err("Incomplete message".to_string());
        }

        let mut payload = Payload {
            data: &buf[5..len + 1],
        };
        let p = &mut payload;

        let message = match msg_type {
            b'R' => Self::decode_auth(p)?,
            b'S' => BackendMessage::ParameterStatus {
                name: p.cstr("ParameterStatus name")?,
                value: p.cstr("ParameterStatus value")?,
            },
            b'K' => BackendMessage::BackendKeyData {
                process_id: p.i32("BackendKeyData")?,
                secret_key: p.i32("BackendKeyData")?,
            },
            b'Z' => BackendMessage::ReadyForQuery(match p.u8("ReadyForQuery")? {
                b'I' => TransactionStatus::Idle,
                b'T' => TransactionStatus::InBlock,
                b'E' => TransactionStatus::Failed,
                other => TransactionStatus::Unknown(other),
            }),
            b'T' => Self::decode_row_description(p)?,
            b'D' => Self::decode_data_row(p)?,
            b'C' => BackendMessage::CommandComplete(p.cstr("CommandComplete")?),
            b'E' => BackendMessage::ErrorResponse(Self::parse_error_fields(p)?),
            b'N' => BackendMessage::NoticeResponse(Self::parse_error_fields(p)?),
            b'1' => BackendMessage::ParseComplete,
            b'2' => BackendMessage::BindComplete,
            b'3' => BackendMessage::CloseComplete,
            b'n' => BackendMessage::NoData,
            b's' => BackendMessage::PortalSuspended,
            b't' => {
                let count = p.i16("ParameterDescription")?.max(0) as usize;
                let mut oids = Vec::with_capacity(count);
                for _ in 0..count {
                    oids.push(p.u32("ParameterDescription")?);
                }
                BackendMessage::ParameterDescription(oids)
            }
            b'G' => {
                let (format, column_formats) = Self::decode_copy_response(p)?;
                BackendMessage::CopyInResponse {
                    format,
                    column_formats,
                }
            }
            b'H' => {
                let (format, column_formats) = Self::decode_copy_response(p)?;
                BackendMessage::CopyOutResponse {
                    format,
                    column_formats,
                }
            }
            b'd' => BackendMessage::CopyData(p.rest().to_vec()),
            b'c' => BackendMessage::CopyDone,
            b'A' => BackendMessage::NotificationResponse {
                process_id: p.i32("NotificationResponse")?,
                channel: p.cstr("notification channel")?,
                payload: p.cstr("notification payload")?,
            },
            b'I' => BackendMessage::EmptyQueryResponse,
            b'v' => {
                let newest_minor = p.i32("NegotiateProtocolVersion")?;
                let count = p.i32("NegotiateProtocolVersion")?.max(0);
                let mut unrecognized = Vec::new();
                for _ in 0..count {
                    unrecognized.push(p.cstr("protocol option")?);
                }
                BackendMessage::NegotiateProtocolVersion {
                    newest_minor,
                    unrecognized,
                }
            }
            other => BackendMessage::Unknown(other),
        };

        Ok((message, len + 1))
    }

    fn decode_auth(p: &mut Payload<'_>) -> Result<Self, String> {
        let auth_type = p.i32("Authentication")?;
        match auth_type {
            0 => Ok(BackendMessage::AuthenticationOk),
            3 => Ok(BackendMessage::AuthenticationCleartextPassword),
            5 => {
                let salt = p.bytes(4, "MD5 salt")?;
                Ok(BackendMessage::AuthenticationMD5Password([
                    salt[0], salt[1], salt[2], salt[3],
                ]))
            }
            10 => {
                // SASL - parse mechanism list
                let mut mechanisms = Vec::new();
                loop {
                    let mechanism = p.cstr("SASL mechanism")?;
                    if mechanism.is_empty() {
                        break;
                    }
                    mechanisms.push(mechanism);
                }
                Ok(BackendMessage::AuthenticationSASL(mechanisms))
            }
            // SASL Continue - server challenge
            11 => Ok(BackendMessage::AuthenticationSASLContinue(p.rest().to_vec())),
            // SASL Final - server signature
            12 => Ok(BackendMessage::AuthenticationSASLFinal(p.rest().to_vec())),
            _ => Err(format!("Unsupported auth type: {}", auth_type)),
        }
    }

    fn decode_row_description(p: &mut Payload<'_>) -> Result<Self, String> {
        let field_count = p.i16("RowDescription")?.max(0) as usize;
        let mut fields = Vec::with_capacity(field_count);

        for _ in 0..field_count {
            fields.push(FieldDescription {
                name: p.cstr("field name")?,
                table_oid: p.u32("RowDescription field")?,
                column_attr: p.i16("RowDescription field")?,
                type_oid: p.u32("RowDescription field")?,
                type_size: p.i16("RowDescription field")?,
                type_modifier: p.i32("RowDescription field")?,
                format: p.i16("RowDescription field")?,
            });
        }

        Ok(BackendMessage::RowDescription(fields))
    }

    fn decode_data_row(p: &mut Payload<'_>) -> Result<Self, String> {
        let column_count = p.i16("DataRow")?.max(0) as usize;
        let mut columns = Vec::with_capacity(column_count);

        for _ in 0..column_count {
            let len = p.i32("DataRow")?;
            if len < 0 {
                // NULL value
                columns.push(None);
            } else {
                columns.push(Some(p.bytes(len as usize, "DataRow column")?.to_vec()));
            }
        }

        Ok(BackendMessage::DataRow(columns))
    }

    fn parse_error_fields(p: &mut Payload<'_>) -> Result<ErrorFields, String> {
        let mut fields = ErrorFields::default();
        loop {
            let field_type = p.u8("error fields")?;
            if field_type == 0 {
                break;
            }
            let value = p.cstr("error field")?;
            match field_type {
                b'S' => fields.severity = value,
                b'C' => fields.code = value,
                b'M' => fields.message = value,
                b'D' => fields.detail = Some(value),
                b'H' => fields.hint = Some(value),
                _ => {}
            }
        }
        Ok(fields)
    }

    fn decode_copy_response(p: &mut Payload<'_>) -> Result<(u8, Vec<u8>), String> {
        let format = p.u8("CopyResponse")?;
        let count = p.i16("CopyResponse")?.max(0) as usize;
        let mut column_formats = Vec::with_capacity(count);
        for _ in 0..count {
            column_formats.push(p.i16("CopyResponse column format")? as u8);
        }
        Ok((format, column_formats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backend(tag: u8, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(tag);
        buf.put_i32(body.len() as i32 + 4);
        buf.put_slice(body);
        buf
    }

    #[test]
    fn test_startup_layout() {
        let buf = FrontendMessage::Startup {
            user: "u".into(),
            database: "d".into(),
            params: vec![("application_name".into(), "app".into())],
        }
        .encode();
        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len());
        assert_eq!(&buf[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&buf[8..], b"user\0u\0database\0d\0application_name\0app\0\0");
    }

    #[test]
    fn test_parse_waits_for_complete_frame() {
        let full = backend(b'Z', b"I");
        let mut partial = BytesMut::from(&full[..4]);
        assert_eq!(BackendMessage::parse(&mut partial), Ok(None));
        assert_eq!(partial.len(), 4);

        let mut two = full.clone();
        two.extend_from_slice(&backend(b'C', b"SELECT 1\0"));
        assert_eq!(
            BackendMessage::parse(&mut two),
            Ok(Some(BackendMessage::ReadyForQuery(TransactionStatus::Idle)))
        );
        assert_eq!(
            BackendMessage::parse(&mut two),
            Ok(Some(BackendMessage::CommandComplete("SELECT 1".into())))
        );
        assert!(two.is_empty());
    }

    #[test]
    fn test_data_row_with_null() {
        let mut body = Vec::new();
        body.extend_from_slice(&2i16.to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&2i32.to_be_bytes());
        body.extend_from_slice(b"hi");
        let (msg, _) = BackendMessage::decode(&backend(b'D', &body)).unwrap();
        assert_eq!(msg, BackendMessage::DataRow(vec![None, Some(b"hi".to_vec())]));
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut body = Vec::new();
        body.extend_from_slice(&1i16.to_be_bytes());
        body.extend_from_slice(&10i32.to_be_bytes());
        body.extend_from_slice(b"abc");
        assert!(BackendMessage::decode(&backend(b'D', &body)).is_err());
        assert!(BackendMessage::decode(&backend(b'K', b"\0\0")).is_err());
    }

    #[test]
    fn test_error_fields() {
        let (msg, _) =
            BackendMessage::decode(&backend(b'E', b"SERROR\0C42P01\0Mmissing\0Hcheck it\0\0"))
                .unwrap();
        assert_eq!(
            msg,
            BackendMessage::ErrorResponse(ErrorFields {
                severity: "ERROR".into(),
                code: "42P01".into(),
                message: "missing".into(),
                detail: None,
                hint: Some("check it".into()),
            })
        );
    }

    #[test]
    fn test_unknown_types_are_framed_not_fatal() {
        let (msg, used) = BackendMessage::decode(&backend(b'W', b"xyz")).unwrap();
        assert_eq!(msg, BackendMessage::Unknown(b'W'));
        assert_eq!(used, 8);
        let (msg, _) = BackendMessage::decode(&backend(b'Z', b"Q")).unwrap();
        assert_eq!(msg, BackendMessage::ReadyForQuery(TransactionStatus::Unknown(b'Q')));
    }
}
