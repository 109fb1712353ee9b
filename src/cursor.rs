use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::storage::LedgerPosition;

/// Cursor data for ledger pagination
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CursorData {
    pub created_at: i64,
    pub seq: i64,
}

impl From<LedgerPosition> for CursorData {
    fn from(p: LedgerPosition) -> Self {
        Self {
            created_at: p.created_at,
            seq: p.seq,
        }
    }
}

impl From<CursorData> for LedgerPosition {
    fn from(c: CursorData) -> Self {
        Self {
            created_at: c.created_at,
            seq: c.seq,
        }
    }
}

/// Signs and verifies opaque pagination cursors
pub struct CursorSigner {
    key: Vec<u8>,
}

impl CursorSigner {
    /// Without a secret a random key is generated (WARNING: cursors won't survive restarts)
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                use rand::RngExt;
                let mut rng = rand::rng();
                (0..32).map(|_| rng.random::<u8>()).collect()
            }
        };

        Self { key }
    }

    fn mac(&self) -> Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.key).map_err(|e| anyhow!("Failed to create HMAC: {}", e))
    }

    /// Create a signed cursor of the form `payload.signature`
    pub fn create(&self, data: &CursorData) -> Result<String> {
        let json = serde_json::to_string(data)?;
        let payload = BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes());

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature_b64))
    }

    /// Verify and decode a cursor
    pub fn verify(&self, cursor: &str) -> Result<CursorData> {
        let (payload, signature_b64) = cursor
            .split_once('.')
            .filter(|(_, sig)| !sig.contains('.'))
            .ok_or_else(|| anyhow!("Invalid cursor format"))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let expected = mac.finalize().into_bytes();

        let provided = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;

        if !bool::from(expected.as_slice().ct_eq(&provided[..])) {
            return Err(anyhow!("Cursor signature verification failed"));
        }

        let json_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
        serde_json::from_slice(&json_bytes).map_err(|_| anyhow!("Invalid cursor data"))
    }
}
