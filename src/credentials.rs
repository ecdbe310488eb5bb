//! Credential primitives (C1): deterministic admin keys, deterministic
//! share slugs, random voter tokens, random record ids, and a salted IP
//! hash for abuse signals.
//!
//! Admin keys and share slugs are pure HMAC-SHA256 outputs over the poll
//! id; they are never persisted and are recomputed on every request that
//! needs them, so any server replica can validate ownership statelessly.
//! Rotating a salt invalidates every previously issued value derived from
//! it -- a documented operational tradeoff, not a bug.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const BASE62_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// `n` cryptographically random bytes, lowercase hex. Used for poll,
/// option, ballot, snapshot, and device record ids.
pub fn random_id(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 24 random bytes, base64url without padding. Opaque voter credential;
/// compared literally (never derived) on ballot submit.
pub fn voter_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hmac_sha256(key: &str, msg: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(msg.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// `base64url_nopad(HMAC_SHA256(key=admin_salt, msg=poll_id))`.
pub fn admin_key(poll_id: &str, admin_salt: &str) -> String {
    let digest = hmac_sha256(admin_salt, poll_id);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time comparison of a caller-supplied admin key against the
/// deterministic value recomputed from `poll_id`/`admin_salt`.
pub fn verify_admin_key(poll_id: &str, admin_salt: &str, candidate: &str) -> bool {
    let expected = admin_key(poll_id, admin_salt);
    // Compare as raw bytes so a length mismatch does not short-circuit
    // timing any earlier than a content mismatch would.
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

/// First 8 bytes of `HMAC_SHA256(key=slug_salt, msg=poll_id)`, interpreted
/// as a big-endian u64 and encoded in base62. Up to 11 characters.
pub fn share_slug(poll_id: &str, slug_salt: &str) -> String {
    let digest = hmac_sha256(slug_salt, poll_id);
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&digest[..8]);
    base62_encode(u64::from_be_bytes(eight))
}

fn base62_encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE62_ALPHABET[(n % 62) as usize]);
        n /= 62;
    }
    out.reverse();
    String::from_utf8(out).expect("base62 alphabet is ASCII")
}

/// First 8 bytes of `HMAC_SHA256(key=ip_salt, msg=client_ip)` as lowercase
/// hex. Stored on the ballot row; never logged; used only for abuse
/// signals, never authentication.
pub fn ip_hash(client_ip: &str, ip_salt: &str) -> String {
    let digest = hmac_sha256(ip_salt, client_ip);
    hex::encode(&digest[..8])
}
