//! SigV4 primitives for the aws-chunked signature chain.
//!
//! The gateway never derives the chunk signing key here; the collaborator
//! that verified the Authorization header hands it over as opaque bytes
//! together with the seed signature. This module only builds the canonical
//! strings-to-sign and compares declared signatures in constant time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of the empty string, as lowercase hex. Every chunk's
/// string-to-sign carries it in the (always empty) canonical-headers slot.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Compute HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// SHA-256 digest rendered as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// String-to-sign for one payload chunk. `prev_signature` is the seed
/// signature for the first chunk and rotates to each verified chunk's
/// signature afterwards; `payload_sha256_hex` is the hex digest of this
/// chunk's payload (the empty hash for the terminal chunk).
pub fn chunk_string_to_sign(
    amz_date: &str,
    scope: &str,
    prev_signature: &str,
    payload_sha256_hex: &str,
) -> String {
    format!(
        "AWS4-HMAC-SHA256-PAYLOAD\n{amz_date}\n{scope}\n{prev_signature}\n{EMPTY_PAYLOAD_SHA256}\n{payload_sha256_hex}"
    )
}

/// String-to-sign for the trailer block. `prev_signature` is the terminal
/// chunk's signature; `canonical_trailers` is the `name:value\n` rendering
/// of the required trailers in configured order, excluding
/// `x-amz-trailer-signature` itself.
pub fn trailer_string_to_sign(
    amz_date: &str,
    scope: &str,
    prev_signature: &str,
    canonical_trailers: &str,
) -> String {
    format!(
        "AWS4-HMAC-SHA256-TRAILER\n{amz_date}\n{scope}\n{prev_signature}\n{}",
        sha256_hex(canonical_trailers.as_bytes())
    )
}

/// Sign a string-to-sign with the opaque chunk signing key, yielding the
/// lowercase-hex signature AWS clients place on the wire.
pub fn sign(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Constant-time equality over signature strings. Timing must not leak how
/// many leading characters of a forged signature were correct.
pub fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Constant-time equality over raw digests.
pub fn ct_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
