//! Connection admission.
//!
//! The only point where unauthenticated input enters the core. A connection
//! presents a JWT before the handshake completes; on failure it is refused
//! with an explicit reason and no state is mutated.

pub mod jwt;

use crate::error::AdmissionError;

/// Verified identity bound to a connection for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

/// Admit or refuse an inbound connection based on its credential.
pub fn admit(secret: &[u8], raw_credential: Option<&str>) -> Result<Identity, AdmissionError> {
    let token = raw_credential
        .filter(|t| !t.is_empty())
        .ok_or(AdmissionError::MissingCredential)?;

    let claims = jwt::validate_access_token(secret, token).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AdmissionError::ExpiredCredential,
        _ => AdmissionError::InvalidCredential,
    })?;

    Ok(Identity {
        user_id: claims.sub,
    })
}
