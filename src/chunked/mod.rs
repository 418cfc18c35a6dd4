//! AWS chunked transfer decoding with SigV4 chunk-chain verification
//!
//! When a client uploads with `x-amz-content-sha256` set to one of the
//! STREAMING-* values, the body is framed per aws-chunked:
//!
//! ```text
//! <hex-chunk-size>[;chunk-signature=<sig>]\r\n
//! <chunk-data>\r\n
//! ...
//! 0[;chunk-signature=<sig>]\r\n
//! <trailer lines, if any>
//! \r\n
//! ```
//!
//! [`ChunkedBodyReader`] decodes that framing while verifying the chained
//! chunk signatures, the trailer signature, and the trailing checksum,
//! emitting only payload bytes to its consumer.

mod reader;
pub mod sigv4;

pub use reader::ChunkedBodyReader;

use thiserror::Error;

/// The four aws-chunked body modes, keyed off `x-amz-content-sha256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedMode {
    /// STREAMING-UNSIGNED-PAYLOAD (no per-chunk signatures, no trailers)
    Unsigned,
    /// STREAMING-UNSIGNED-PAYLOAD-TRAILER
    UnsignedTrailer,
    /// STREAMING-AWS4-HMAC-SHA256-PAYLOAD
    Signed,
    /// STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER
    SignedTrailer,
}

impl ChunkedMode {
    pub fn is_signed(&self) -> bool {
        matches!(self, ChunkedMode::Signed | ChunkedMode::SignedTrailer)
    }

    pub fn has_trailer(&self) -> bool {
        matches!(self, ChunkedMode::UnsignedTrailer | ChunkedMode::SignedTrailer)
    }
}

/// SigV4 context for the chunk signature chain. The signing key is opaque
/// bytes produced by the collaborator that verified the Authorization
/// header; the seed signature is that header's signature.
#[derive(Clone)]
pub struct ChunkSigV4 {
    pub signing_key: Vec<u8>,
    /// 64 lowercase hex chars; seeds the chain.
    pub seed_signature: String,
    /// `YYYYMMDDTHHMMSSZ`
    pub amz_date: String,
    /// `YYYYMMDD/region/service/aws4_request`
    pub scope: String,
}

impl std::fmt::Debug for ChunkSigV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        f.debug_struct("ChunkSigV4")
            .field("seed_signature", &self.seed_signature)
            .field("amz_date", &self.amz_date)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Per-request decoding configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct ChunkedConfig {
    pub mode: ChunkedMode,
    /// Advertised decoded length; the reader must emit exactly this many
    /// payload bytes.
    pub expected_decoded_len: u64,
    /// Ordered trailer names the caller requires (trailer modes only).
    pub trailer_keys: Vec<String>,
    /// Present iff the mode is signed.
    pub sigv4: Option<ChunkSigV4>,
}

impl ChunkedConfig {
    /// Validate the cross-field invariants: trailer keys non-empty iff the
    /// mode carries a trailer, sigv4 present iff the mode is signed.
    pub fn validate(&self) -> Result<(), ChunkedError> {
        if self.mode.has_trailer() && self.trailer_keys.is_empty() {
            return Err(ChunkedError::Config(
                "trailer mode requires at least one expected trailer".into(),
            ));
        }
        if !self.mode.has_trailer() && !self.trailer_keys.is_empty() {
            return Err(ChunkedError::Config(
                "trailer keys configured for a trailerless mode".into(),
            ));
        }
        if self.mode.is_signed() != self.sigv4.is_some() {
            return Err(ChunkedError::Config(
                "sigv4 context must be present exactly for signed modes".into(),
            ));
        }
        if let Some(sigv4) = &self.sigv4 {
            if sigv4.seed_signature.len() != 64
                || !sigv4
                    .seed_signature
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            {
                return Err(ChunkedError::Config(
                    "seed signature must be 64 lowercase hex characters".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Errors produced while decoding an aws-chunked body. Cloneable so the
/// reader can stay poisoned and return the same error on every later read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkedError {
    /// Invalid configuration handed to the reader (caller bug).
    #[error("invalid chunked config: {0}")]
    Config(String),

    /// Malformed framing: bad size line, missing CRLF, unknown extension,
    /// unexpected trailer.
    #[error("malformed chunked encoding: {0}")]
    Framing(String),

    /// Transport ended before the framing did.
    #[error("request body ended before the chunked encoding completed")]
    UnexpectedEof,

    /// Decoded byte count fell short of the advertised length.
    #[error("decoded {got} bytes, expected {expected}")]
    LengthMismatch { expected: u64, got: u64 },

    /// Decoded byte count would exceed the advertised length.
    #[error("decoded payload exceeds the advertised length of {expected} bytes")]
    TooLarge { expected: u64 },

    /// A chunk or trailer signature did not verify.
    #[error("chunk signature does not match")]
    SignatureMismatch,

    /// A required signature was absent, or present where forbidden by an
    /// unsigned mode header.
    #[error("malformed streaming authorization: {0}")]
    MalformedAuth(String),

    /// Trailer checksum value was not valid base64.
    #[error("invalid checksum encoding in trailer {0}")]
    InvalidDigest(String),

    /// Trailer checksum did not match the decoded payload.
    #[error("checksum in trailer {0} does not match the decoded payload")]
    ChecksumMismatch(String),

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level read failure.
    #[error("transport error: {0}")]
    Io(String),
}

impl ChunkedError {
    /// Symbolic S3 error code for this failure, per the gateway's closed
    /// error table.
    pub fn s3_code(&self) -> &'static str {
        match self {
            ChunkedError::Config(_) => "InternalError",
            ChunkedError::Framing(_) => "InvalidRequest",
            ChunkedError::UnexpectedEof | ChunkedError::LengthMismatch { .. } => "IncompleteBody",
            ChunkedError::TooLarge { .. } => "EntityTooLarge",
            ChunkedError::SignatureMismatch => "SignatureDoesNotMatch",
            ChunkedError::MalformedAuth(_) => "AuthorizationHeaderMalformed",
            ChunkedError::InvalidDigest(_) => "InvalidDigest",
            ChunkedError::ChecksumMismatch(_) => "BadDigest",
            ChunkedError::Cancelled => "InvalidRequest",
            ChunkedError::Io(_) => "InternalError",
        }
    }
}

impl From<std::io::Error> for ChunkedError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ChunkedError::UnexpectedEof
        } else {
            ChunkedError::Io(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigv4() -> ChunkSigV4 {
        ChunkSigV4 {
            signing_key: b"test".to_vec(),
            seed_signature: "0".repeat(64),
            amz_date: "20240101T000000Z".into(),
            scope: "20240101/us-east-1/s3/aws4_request".into(),
        }
    }

    #[test]
    fn test_config_invariants() {
        let ok = ChunkedConfig {
            mode: ChunkedMode::Signed,
            expected_decoded_len: 5,
            trailer_keys: vec![],
            sigv4: Some(sigv4()),
        };
        assert!(ok.validate().is_ok());

        let missing_sigv4 = ChunkedConfig {
            mode: ChunkedMode::Signed,
            expected_decoded_len: 5,
            trailer_keys: vec![],
            sigv4: None,
        };
        assert!(missing_sigv4.validate().is_err());

        let trailer_without_keys = ChunkedConfig {
            mode: ChunkedMode::UnsignedTrailer,
            expected_decoded_len: 5,
            trailer_keys: vec![],
            sigv4: None,
        };
        assert!(trailer_without_keys.validate().is_err());

        let keys_without_trailer = ChunkedConfig {
            mode: ChunkedMode::Unsigned,
            expected_decoded_len: 5,
            trailer_keys: vec!["x-amz-checksum-sha256".into()],
            sigv4: None,
        };
        assert!(keys_without_trailer.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_seed() {
        let mut bad = sigv4();
        bad.seed_signature = "ZZ".repeat(32);
        let config = ChunkedConfig {
            mode: ChunkedMode::Signed,
            expected_decoded_len: 0,
            trailer_keys: vec![],
            sigv4: Some(bad),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", sigv4());
        assert!(!rendered.contains("test"));
        assert!(rendered.contains("20240101T000000Z"));
    }
}
