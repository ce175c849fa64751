//! Password authentication: MD5 and SCRAM-SHA-256 (RFC 5802 / RFC 7677).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The only SASL mechanism offered by this client.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// base64 of the GS2 header `n,,` (no channel binding).
const GS2_HEADER_B64: &str = "biws";

const NONCE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScramError {
    #[error("SCRAM message is not valid UTF-8")]
    Utf8,
    #[error("SCRAM server-first message has no '{0}' attribute")]
    Missing(char),
    #[error("SCRAM attribute '{0}' is malformed")]
    Malformed(char),
    #[error("Server nonce does not extend the client nonce")]
    NonceMismatch,
    #[error("Server rejected the SCRAM exchange: {0}")]
    Rejected(String),
    #[error("Server signature does not match")]
    BadSignature,
    #[error("Server-final message arrived before server-first")]
    OutOfOrder,
    #[error("HMAC rejected the key")]
    Key,
}

/// `md5` followed by md5hex(md5hex(password || user) || salt).
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let mut inner = format!("{:x}", md5::compute(format!("{}{}", password, user))).into_bytes();
    inner.extend_from_slice(salt);
    format!("md5{:x}", md5::compute(inner))
}

/// Attributes of the server-first message.
struct ServerFirst<'a> {
    nonce: &'a str,
    salt: Vec<u8>,
    iterations: u32,
}

impl<'a> ServerFirst<'a> {
    fn parse(message: &'a str) -> Result<Self, ScramError> {
        let attr = |key: char| {
            message
                .split(',')
                .find_map(|part| part.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
                .ok_or(ScramError::Missing(key))
        };
        Ok(Self {
            nonce: attr('r')?,
            salt: BASE64.decode(attr('s')?).map_err(|_| ScramError::Malformed('s'))?,
            iterations: attr('i')?.parse().map_err(|_| ScramError::Malformed('i'))?,
        })
    }
}

/// Client side of one SCRAM-SHA-256 exchange.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    /// Set once the server-first message is processed.
    proof_state: Option<(Vec<u8>, String)>,
}

impl ScramClient {
    pub fn new(username: &str, password: &str) -> Self {
        let mut rng = rand::rng();
        let client_nonce = (0..24)
            .map(|_| NONCE_CHARS[rng.random_range(0..NONCE_CHARS.len())] as char)
            .collect();
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            proof_state: None,
        }
    }

    fn first_bare(&self) -> String {
        format!("n={},r={}", self.username, self.client_nonce)
    }

    /// `n,,n=<user>,r=<nonce>`
    pub fn client_first_message(&self) -> Vec<u8> {
        format!("n,,{}", self.first_bare()).into_bytes()
    }

    /// Consume `r=..,s=..,i=..` and answer with the client-final message.
    pub fn process_server_first(&mut self, message: &[u8]) -> Result<Vec<u8>, ScramError> {
        let message = std::str::from_utf8(message).map_err(|_| ScramError::Utf8)?;
        let first = ServerFirst::parse(message)?;
        if !first.nonce.starts_with(&self.client_nonce) {
            return Err(ScramError::NonceMismatch);
        }

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &first.salt, first.iterations, &mut salted);
        let client_key = hmac(&salted, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);

        let without_proof = format!("c={},r={}", GS2_HEADER_B64, first.nonce);
        let auth_message = format!("{},{},{}", self.first_bare(), message, without_proof);
        let signature = hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key.iter().zip(&signature).map(|(k, s)| k ^ s).collect();

        self.proof_state = Some((salted.to_vec(), auth_message));
        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)).into_bytes())
    }

    /// Check `v=<signature>` from the server-final message.
    pub fn verify_server_final(&self, message: &[u8]) -> Result<(), ScramError> {
        let message = std::str::from_utf8(message).map_err(|_| ScramError::Utf8)?;
        if let Some(reason) = message.strip_prefix("e=") {
            return Err(ScramError::Rejected(reason.to_string()));
        }
        let (salted, auth_message) = self.proof_state.as_ref().ok_or(ScramError::OutOfOrder)?;
        let verifier = message.strip_prefix("v=").ok_or(ScramError::Missing('v'))?;
        let expected = BASE64
            .decode(verifier.trim_end())
            .map_err(|_| ScramError::Malformed('v'))?;

        let server_key = hmac(salted, b"Server Key")?;
        if hmac(&server_key, auth_message.as_bytes())? != expected {
            return Err(ScramError::BadSignature);
        }
        Ok(())
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| ScramError::Key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
