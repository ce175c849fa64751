//! Startup and authentication, as a state machine with no I/O.
//!
//! The caller moves bytes: it writes [`Handshake::pending_output`] to the
//! socket, reads into [`Handshake::inbound_mut`], and calls
//! [`Handshake::poll`] until it reports `Ok` or `Failed`. Both the blocking
//! and the polling open paths drive this same machine.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use super::info::ConnectionInfo;
use super::status::{ConnectionStatus, PollingStatus};
use super::PgError;
use crate::protocol::auth::{SCRAM_SHA_256, md5_password};
use crate::protocol::{BackendMessage, FrontendMessage, ScramClient, TransactionStatus};

pub struct Handshake {
    user: String,
    password: Option<String>,
    status: ConnectionStatus,
    scram: Option<ScramClient>,
    outbound: BytesMut,
    inbound: BytesMut,
    parameters: HashMap<String, String>,
    backend_key: Option<(i32, i32)>,
    error: Option<PgError>,
}

/// What a completed handshake leaves behind for the connection.
pub(crate) struct Established {
    pub parameters: HashMap<String, String>,
    pub backend_key: Option<(i32, i32)>,
    /// Bytes read past the final ReadyForQuery.
    pub leftover: BytesMut,
}

impl Handshake {
    /// Queue the startup message for `info`.
    pub fn new(info: &ConnectionInfo) -> Self {
        let user = info.get_user();
        let mut outbound = BytesMut::new();
        FrontendMessage::Startup {
            user: user.clone(),
            database: info.database().to_string(),
            params: info.startup_params(),
        }
        .encode_into(&mut outbound);

        Self {
            user,
            password: info.get_password().map(str::to_string),
            status: ConnectionStatus::Made,
            scram: None,
            outbound,
            inbound: BytesMut::new(),
            parameters: HashMap::new(),
            backend_key: None,
            error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Bytes waiting to be written to the server.
    pub fn pending_output(&self) -> &[u8] {
        &self.outbound
    }

    /// Record that `n` bytes of [`pending_output`](Self::pending_output) were written.
    pub fn consume_output(&mut self, n: usize) {
        self.outbound.advance(n.min(self.outbound.len()));
        if self.outbound.is_empty() && self.status == ConnectionStatus::Made {
            self.set_status(ConnectionStatus::AwaitingResponse);
        }
    }

    /// Buffer to read server bytes into.
    pub fn inbound_mut(&mut self) -> &mut BytesMut {
        &mut self.inbound
    }

    pub fn take_error(&mut self) -> Option<PgError> {
        self.error.take()
    }

    /// Advance by at most one server message.
    pub fn poll(&mut self) -> PollingStatus {
        if self.error.is_some() || self.status == ConnectionStatus::Bad {
            return PollingStatus::Failed;
        }
        if self.status == ConnectionStatus::Ok {
            return PollingStatus::Ok;
        }
        if !self.outbound.is_empty() {
            return PollingStatus::Writing;
        }

        match BackendMessage::parse(&mut self.inbound) {
            Ok(None) => PollingStatus::Reading,
            Ok(Some(msg)) => match self.handle(msg) {
                Ok(()) if self.status == ConnectionStatus::Ok => PollingStatus::Ok,
                Ok(()) => PollingStatus::Active,
                Err(e) => {
                    self.fail(e);
                    PollingStatus::Failed
                }
            },
            Err(e) => {
                self.fail(PgError::Protocol(e));
                PollingStatus::Failed
            }
        }
    }

    pub(crate) fn finish(self) -> Established {
        Established {
            parameters: self.parameters,
            backend_key: self.backend_key,
            leftover: self.inbound,
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            trace!(from = ?self.status, to = ?status, "connection status");
            self.status = status;
        }
    }

    fn fail(&mut self, error: PgError) {
        self.set_status(ConnectionStatus::Bad);
        self.error = Some(error);
    }

    fn send(&mut self, msg: FrontendMessage) {
        msg.encode_into(&mut self.outbound);
    }

    fn require_password(&self, method: &str) -> Result<String, PgError> {
        self.password
            .clone()
            .ok_or_else(|| PgError::Auth(format!("Password required for {} authentication", method)))
    }

    fn handle(&mut self, msg: BackendMessage) -> Result<(), PgError> {
        match msg {
            BackendMessage::AuthenticationOk => {
                self.set_status(ConnectionStatus::AuthOk);
            }
            BackendMessage::AuthenticationCleartextPassword => {
                debug!(method = "cleartext", "authenticating");
                let password = self.require_password("cleartext")?;
                self.send(FrontendMessage::PasswordMessage(password));
            }
            BackendMessage::AuthenticationMD5Password(salt) => {
                debug!(method = "md5", "authenticating");
                let password = self.require_password("MD5")?;
                let hashed = md5_password(&self.user, &password, &salt);
                self.send(FrontendMessage::PasswordMessage(hashed));
            }
            BackendMessage::AuthenticationSASL(mechanisms) => {
                debug!(method = SCRAM_SHA_256, "authenticating");
                let password = self.require_password("SCRAM")?;
                if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
                    return Err(PgError::Auth(format!(
                        "Server doesn't support SCRAM-SHA-256. Available: {:?}",
                        mechanisms
                    )));
                }
                let client = ScramClient::new(&self.user, &password);
                self.send(FrontendMessage::SASLInitialResponse {
                    mechanism: SCRAM_SHA_256.to_string(),
                    data: client.client_first_message(),
                });
                self.scram = Some(client);
            }
            BackendMessage::AuthenticationSASLContinue(server_data) => {
                let client = self.scram.as_mut().ok_or_else(|| {
                    PgError::Auth("Received SASL Continue without SASL init".to_string())
                })?;
                let final_message = client
                    .process_server_first(&server_data)
                    .map_err(|e| PgError::Auth(e.to_string()))?;
                self.send(FrontendMessage::SASLResponse(final_message));
            }
            BackendMessage::AuthenticationSASLFinal(server_signature) => {
                let client = self.scram.as_ref().ok_or_else(|| {
                    PgError::Auth("Received SASL Final without SASL init".to_string())
                })?;
                client
                    .verify_server_final(&server_signature)
                    .map_err(|e| PgError::Auth(e.to_string()))?;
            }
            BackendMessage::ParameterStatus { name, value } => {
                self.set_status(ConnectionStatus::SettingEnvironment);
                self.parameters.insert(name, value);
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                self.set_status(ConnectionStatus::SettingEnvironment);
                self.backend_key = Some((process_id, secret_key));
            }
            BackendMessage::ReadyForQuery(TransactionStatus::Unknown(byte)) => {
                return Err(PgError::Protocol(format!(
                    "Unknown transaction status {:?} after startup",
                    byte as char
                )));
            }
            BackendMessage::ReadyForQuery(_) => {
                self.set_status(ConnectionStatus::Ok);
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(PgError::Connection(err.message));
            }
            BackendMessage::NoticeResponse(notice) => {
                debug!(severity = %notice.severity, "{}", notice.message);
            }
            BackendMessage::NegotiateProtocolVersion {
                newest_minor,
                unrecognized,
            } => {
                warn!(newest_minor, ?unrecognized, "server negotiated protocol version down");
            }
            other => {
                return Err(PgError::Protocol(format!(
                    "Unexpected message during startup: {:?}",
                    other
                )));
            }
        }
        Ok(())
    }
}
