//! Opaque identifier and credential generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// 128 random bits, URL-safe encoded (22 chars). Used for job ids.
pub fn new_job_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 256 random bits with a fixed prefix, used for API keys. The prefix
/// makes leaked keys greppable without weakening entropy.
pub fn new_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk-scriberr-{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// 128 random bits for refresh tokens; only the sha256 digest is stored.
pub fn new_refresh_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex sha256 digest used to store refresh tokens server-side.
pub fn token_digest(token: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(token.as_bytes()))
}
