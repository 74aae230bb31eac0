//! Signer key material.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::TypesError;

/// A signer's private key.
///
/// This type intentionally does not implement `Debug`, `Serialize`, or `Clone`
/// to prevent accidental exposure. Key bytes are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TypesError> {
        if bytes.is_empty() {
            return Err(TypesError::InvalidKey("empty key".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Decode a hex key, with or without a `0x` prefix.
    pub fn from_hex(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(body).map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
