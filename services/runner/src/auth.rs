//! Bearer verification for the sample ingest transport.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,
}

/// Identity asserted by a verified token. Samples must agree with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeClaims {
    pub node_id: String,
    pub project: String,
    pub service: String,
    pub version: String,
}

/// Token verification seam.
///
/// `Ok(None)` authenticates the caller without scoping it to a workload,
/// which is what a shared secret can express. Verifiers backed by signed
/// tokens return claims and the transport enforces them per sample.
pub trait ClaimsVerifier: Send + Sync {
    fn verify(&self, token: Option<&str>) -> Result<Option<NodeClaims>, AuthError>;
}

/// Accepts everything. Development mode only.
pub struct AllowAll;

impl ClaimsVerifier for AllowAll {
    fn verify(&self, _token: Option<&str>) -> Result<Option<NodeClaims>, AuthError> {
        Ok(None)
    }
}

/// Single shared token, compared by digest.
pub struct SharedSecret {
    secret_digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret_digest: Sha256::digest(secret.as_ref()).into(),
        }
    }
}

impl ClaimsVerifier for SharedSecret {
    fn verify(&self, token: Option<&str>) -> Result<Option<NodeClaims>, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if digest != self.secret_digest {
            return Err(AuthError::InvalidToken);
        }
        Ok(None)
    }
}
