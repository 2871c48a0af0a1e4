use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// The size of an access or refresh token in bytes.
const TOKEN_SIZE: usize = 32;
/// The number of random bytes behind a session hash.
const SESSION_HASH_BYTES: usize = 4;

/// Generates a new random bearer token.
///
/// # Returns
///
/// A URL-safe base64-encoded token.
pub fn generate_token() -> String {
    let mut token = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Lowercase hex of `len` random bytes.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a session hash: eight lowercase hex characters from four random bytes.
pub fn generate_session_hash() -> String {
    random_hex(SESSION_HASH_BYTES)
}

/// The storage key for a token. Raw tokens are never persisted.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
