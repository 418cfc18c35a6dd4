//! Opaque continuation tokens for paginated listings.
//!
//! A token encodes `(key, version_id?)` as base64url without padding:
//! `key` alone when the version is empty, otherwise `key\nversion_id`.
//! Decoding tolerates raw (non-base64) input and treats it as a key-only
//! cursor, preserving compatibility with clients that pass raw keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode a pagination cursor into an opaque token.
pub fn encode_continuation(key: &str, version_id: &str) -> String {
    if version_id.is_empty() {
        URL_SAFE_NO_PAD.encode(key)
    } else {
        URL_SAFE_NO_PAD.encode(format!("{key}\n{version_id}"))
    }
}

/// Decode a token into `(after_key, after_version)`. Raw input that does
/// not decode as base64 (or is not UTF-8) is taken as a key-only marker.
pub fn decode_continuation(token: &str) -> (String, String) {
    match URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(decoded) => match decoded.split_once('\n') {
            Some((key, version)) => (key.to_string(), version.to_string()),
            None => (decoded, String::new()),
        },
        None => (token.to_string(), String::new()),
    }
}
