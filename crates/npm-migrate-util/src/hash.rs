use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha512};

/// Hex-encoded SHA-1 digest, the registry's legacy `dist.shasum` field.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Subresource-integrity string (`sha512-<base64>`) for `dist.integrity`.
#[must_use]
pub fn sha512_integrity(data: &[u8]) -> String {
    format!("sha512-{}", STANDARD.encode(Sha512::digest(data)))
}

/// Standard base64 encoding, used for publish attachments.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}
