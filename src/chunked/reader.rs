//! Pull-based aws-chunked decoder.
//!
//! The reader is a state machine over the transport byte stream. Only the
//! current header or trailer line is buffered; payload bytes stream through
//! to the caller while feeding two running digests (per-chunk for the
//! signature chain, whole-body for the trailing checksum), so memory use is
//! constant regardless of object size.

use super::sigv4;
use super::{ChunkedConfig, ChunkedError, ChunkedMode};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio_util::sync::CancellationToken;

/// Upper bound on a single header or trailer line. A chunk header is at
/// most ~100 bytes; trailer values are capped well below this.
const MAX_LINE: u64 = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectHeader,
    Payload { remaining: u64 },
    ExpectCrlf,
    Trailer,
    Done,
}

/// Streaming validator for aws-chunked request bodies.
///
/// `read` yields decoded payload bytes until EOF (a zero-length read).
/// Every framing or cryptographic failure is deterministic, reported on the
/// read that observes it, and poisons the reader: all subsequent reads
/// return the same error. Payload bytes already emitted before a failure
/// must be treated as aborted by the caller.
pub struct ChunkedBodyReader<R> {
    inner: R,
    config: ChunkedConfig,
    state: State,
    failed: Option<ChunkedError>,
    /// Seed signature, rotating to each verified chunk's signature. The
    /// terminal chunk's signature seeds trailer verification.
    prev_signature: String,
    decoded: u64,
    body_sha256: Sha256,
    chunk_sha256: Sha256,
    /// Declared signature of the chunk currently streaming through.
    pending_signature: Option<String>,
    cancel: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> ChunkedBodyReader<R> {
    /// Wrap a transport stream. Fails fast on configs violating the
    /// mode/trailer/sigv4 invariants.
    pub fn new(inner: R, config: ChunkedConfig) -> Result<Self, ChunkedError> {
        config.validate()?;
        let prev_signature = config
            .sigv4
            .as_ref()
            .map(|s| s.seed_signature.clone())
            .unwrap_or_default();
        Ok(Self {
            inner,
            config,
            state: State::ExpectHeader,
            failed: None,
            prev_signature,
            decoded: 0,
            body_sha256: Sha256::new(),
            chunk_sha256: Sha256::new(),
            pending_signature: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Attach a request-scoped cancellation token. Once cancelled, the next
    /// read fails with [`ChunkedError::Cancelled`] and the reader poisons.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of decoded payload bytes emitted so far.
    pub fn decoded_len(&self) -> u64 {
        self.decoded
    }

    /// Read decoded payload bytes into `buf`. Returns 0 at end of body,
    /// after all framing, signatures, trailers, and the byte count have
    /// been verified.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChunkedError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.state == State::Done || buf.is_empty() {
            return Ok(0);
        }
        match self.read_inner(buf).await {
            Ok(n) => Ok(n),
            Err(err) => {
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Drain the body into a buffer. Convenience for callers that hand the
    /// whole decoded object to the blob engine in one call.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, ChunkedError> {
        let mut out = Vec::with_capacity(self.config.expected_decoded_len.min(1 << 20) as usize);
        let mut buf = [0u8; 8 * 1024];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    async fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize, ChunkedError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ChunkedError::Cancelled);
            }
            match self.state {
                State::Done => return Ok(0),
                State::ExpectHeader => {
                    let line = self.read_line().await?;
                    let (size, signature) = parse_chunk_header(&self.config, &line)?;
                    if size == 0 {
                        if self.config.mode.is_signed() {
                            let declared = signature.ok_or_else(|| {
                                ChunkedError::MalformedAuth("missing chunk-signature".into())
                            })?;
                            self.verify_chunk_signature(sigv4::EMPTY_PAYLOAD_SHA256, &declared)?;
                        }
                        self.state = State::Trailer;
                    } else {
                        if self.decoded.saturating_add(size) > self.config.expected_decoded_len {
                            return Err(ChunkedError::TooLarge {
                                expected: self.config.expected_decoded_len,
                            });
                        }
                        self.pending_signature = signature;
                        self.chunk_sha256 = Sha256::new();
                        self.state = State::Payload { remaining: size };
                    }
                }
                State::Payload { remaining } => {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = self.inner.read(&mut buf[..want]).await?;
                    if n == 0 {
                        return Err(ChunkedError::UnexpectedEof);
                    }
                    self.chunk_sha256.update(&buf[..n]);
                    self.body_sha256.update(&buf[..n]);
                    self.decoded += n as u64;
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        State::ExpectCrlf
                    } else {
                        State::Payload { remaining }
                    };
                    return Ok(n);
                }
                State::ExpectCrlf => {
                    let mut crlf = [0u8; 2];
                    self.inner.read_exact(&mut crlf).await?;
                    if &crlf != b"\r\n" {
                        return Err(ChunkedError::Framing(
                            "missing CRLF after chunk payload".into(),
                        ));
                    }
                    if self.config.mode.is_signed() {
                        let digest = hex::encode(std::mem::take(&mut self.chunk_sha256).finalize());
                        let declared = self.pending_signature.take().ok_or_else(|| {
                            ChunkedError::MalformedAuth("missing chunk-signature".into())
                        })?;
                        self.verify_chunk_signature(&digest, &declared)?;
                    }
                    self.state = State::ExpectHeader;
                }
                State::Trailer => {
                    self.read_trailers().await?;
                    if self.decoded != self.config.expected_decoded_len {
                        return Err(ChunkedError::LengthMismatch {
                            expected: self.config.expected_decoded_len,
                            got: self.decoded,
                        });
                    }
                    self.state = State::Done;
                    return Ok(0);
                }
            }
        }
    }

    /// Read one CRLF-terminated line, excluding the terminator.
    async fn read_line(&mut self) -> Result<Vec<u8>, ChunkedError> {
        let mut line = Vec::new();
        let mut limited = (&mut self.inner).take(MAX_LINE);
        let n = limited.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(ChunkedError::UnexpectedEof);
        }
        if !line.ends_with(b"\n") {
            if line.len() as u64 >= MAX_LINE {
                return Err(ChunkedError::Framing("line exceeds maximum length".into()));
            }
            return Err(ChunkedError::UnexpectedEof);
        }
        if !line.ends_with(b"\r\n") {
            return Err(ChunkedError::Framing(
                "chunk line terminated by bare LF".into(),
            ));
        }
        line.truncate(line.len() - 2);
        Ok(line)
    }

    fn verify_chunk_signature(
        &mut self,
        payload_sha256_hex: &str,
        declared: &str,
    ) -> Result<(), ChunkedError> {
        let sigv4_ctx = self
            .config
            .sigv4
            .as_ref()
            .ok_or_else(|| ChunkedError::Config("signed mode without sigv4 context".into()))?;
        let string_to_sign = sigv4::chunk_string_to_sign(
            &sigv4_ctx.amz_date,
            &sigv4_ctx.scope,
            &self.prev_signature,
            payload_sha256_hex,
        );
        let expected = sigv4::sign(&sigv4_ctx.signing_key, &string_to_sign);
        if !sigv4::ct_eq(&expected, declared) {
            return Err(ChunkedError::SignatureMismatch);
        }
        self.prev_signature = expected;
        Ok(())
    }

    async fn read_trailers(&mut self) -> Result<(), ChunkedError> {
        let mut received: Vec<(String, String)> = Vec::new();
        loop {
            if self.cancel.is_cancelled() {
                return Err(ChunkedError::Cancelled);
            }
            let line = self.read_line().await?;
            if line.is_empty() {
                break;
            }
            if !self.config.mode.has_trailer() {
                return Err(ChunkedError::Framing(
                    "trailer line in a trailerless mode".into(),
                ));
            }
            let text = std::str::from_utf8(&line)
                .map_err(|_| ChunkedError::Framing("trailer line is not UTF-8".into()))?;
            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| ChunkedError::Framing("trailer line without ':'".into()))?;
            received.push((
                name.trim().to_ascii_lowercase(),
                value.trim().to_string(),
            ));
        }
        if !self.config.mode.has_trailer() {
            return Ok(());
        }
        self.verify_trailers(received)
    }

    fn verify_trailers(&mut self, received: Vec<(String, String)>) -> Result<(), ChunkedError> {
        let signed = self.config.mode == ChunkedMode::SignedTrailer;
        let mut trailer_signature: Option<String> = None;
        let mut values: Vec<(String, String)> = Vec::new();
        for (name, value) in received {
            if signed && name == "x-amz-trailer-signature" {
                if trailer_signature.replace(value).is_some() {
                    return Err(ChunkedError::Framing(
                        "duplicate x-amz-trailer-signature".into(),
                    ));
                }
                continue;
            }
            if !self.config.trailer_keys.iter().any(|k| *k == name) {
                return Err(ChunkedError::Framing(format!("unknown trailer {name}")));
            }
            if values.iter().any(|(n, _)| *n == name) {
                return Err(ChunkedError::Framing(format!("duplicate trailer {name}")));
            }
            values.push((name, value));
        }

        // Presence of every required trailer, in any received order.
        for key in &self.config.trailer_keys {
            if !values.iter().any(|(n, _)| n == key) {
                return Err(ChunkedError::Framing(format!("missing trailer {key}")));
            }
        }

        if signed {
            let declared = trailer_signature.ok_or_else(|| {
                ChunkedError::MalformedAuth("missing x-amz-trailer-signature".into())
            })?;
            // Canonical form is `name:value\n` in configured key order, LF
            // line endings, signature trailer excluded.
            let mut canonical = String::new();
            for key in &self.config.trailer_keys {
                if let Some((_, value)) = values.iter().find(|(n, _)| n == key) {
                    canonical.push_str(key);
                    canonical.push(':');
                    canonical.push_str(value);
                    canonical.push('\n');
                }
            }
            let sigv4_ctx = self
                .config
                .sigv4
                .as_ref()
                .ok_or_else(|| ChunkedError::Config("signed mode without sigv4 context".into()))?;
            let string_to_sign = sigv4::trailer_string_to_sign(
                &sigv4_ctx.amz_date,
                &sigv4_ctx.scope,
                &self.prev_signature,
                &canonical,
            );
            let expected = sigv4::sign(&sigv4_ctx.signing_key, &string_to_sign);
            if !sigv4::ct_eq(&expected, &declared) {
                return Err(ChunkedError::SignatureMismatch);
            }
        }

        // Checksum trailers are verified against the running body digest.
        for (name, value) in &values {
            if name == "x-amz-checksum-sha256" {
                use base64::Engine;
                let declared = base64::engine::general_purpose::STANDARD
                    .decode(value)
                    .map_err(|_| ChunkedError::InvalidDigest(name.clone()))?;
                let actual = self.body_sha256.clone().finalize();
                if !sigv4::ct_eq_bytes(&declared, actual.as_slice()) {
                    return Err(ChunkedError::ChecksumMismatch(name.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Parse one chunk header line: `size-hex[;chunk-signature=HEX64]`.
fn parse_chunk_header(
    config: &ChunkedConfig,
    line: &[u8],
) -> Result<(u64, Option<String>), ChunkedError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ChunkedError::Framing("chunk header is not UTF-8".into()))?;
    let (size_part, ext_part) = match text.split_once(';') {
        Some((size, ext)) => (size, Some(ext)),
        None => (text, None),
    };

    // Lowercase hex, 1-16 digits, no surrounding whitespace.
    if size_part.is_empty() || size_part.len() > 16 {
        return Err(ChunkedError::Framing(format!(
            "invalid chunk size '{size_part}'"
        )));
    }
    if !size_part
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(ChunkedError::Framing(format!(
            "invalid chunk size '{size_part}'"
        )));
    }
    let size = u64::from_str_radix(size_part, 16)
        .map_err(|_| ChunkedError::Framing(format!("invalid chunk size '{size_part}'")))?;

    let signature = match ext_part {
        Some(ext) => {
            let sig = ext.strip_prefix("chunk-signature=").ok_or_else(|| {
                ChunkedError::Framing(format!("unknown chunk extension '{ext}'"))
            })?;
            if sig.len() != 64
                || !sig
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            {
                return Err(ChunkedError::MalformedAuth(
                    "chunk-signature is not 64 lowercase hex characters".into(),
                ));
            }
            Some(sig.to_string())
        }
        None => None,
    };

    match (config.mode.is_signed(), &signature) {
        (true, None) => Err(ChunkedError::MalformedAuth(
            "missing chunk-signature in signed streaming mode".into(),
        )),
        (false, Some(_)) => Err(ChunkedError::Framing(
            "chunk-signature present in unsigned streaming mode".into(),
        )),
        _ => Ok((size, signature)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::ChunkSigV4;
    use base64::Engine;
    use proptest::prelude::*;

    const AMZ_DATE: &str = "20240101T000000Z";
    const SCOPE: &str = "20240101/us-east-1/s3/aws4_request";

    fn unsigned_config(len: u64) -> ChunkedConfig {
        ChunkedConfig {
            mode: ChunkedMode::Unsigned,
            expected_decoded_len: len,
            trailer_keys: vec![],
            sigv4: None,
        }
    }

    fn signed_config(len: u64) -> ChunkedConfig {
        ChunkedConfig {
            mode: ChunkedMode::Signed,
            expected_decoded_len: len,
            trailer_keys: vec![],
            sigv4: Some(ChunkSigV4 {
                signing_key: b"test".to_vec(),
                seed_signature: "0".repeat(64),
                amz_date: AMZ_DATE.into(),
                scope: SCOPE.into(),
            }),
        }
    }

    fn sign_next(prev: &str, payload: &[u8]) -> String {
        let sts = sigv4::chunk_string_to_sign(AMZ_DATE, SCOPE, prev, &sigv4::sha256_hex(payload));
        sigv4::sign(b"test", &sts)
    }

    /// Encode `chunks` in signed framing, chaining from the all-zero seed.
    /// Returns the frame and the terminal chunk's signature.
    fn signed_frame(chunks: &[&[u8]]) -> (Vec<u8>, String) {
        let mut prev = "0".repeat(64);
        let mut frame = Vec::new();
        for chunk in chunks {
            let sig = sign_next(&prev, chunk);
            frame.extend_from_slice(format!("{:x};chunk-signature={sig}\r\n", chunk.len()).as_bytes());
            frame.extend_from_slice(chunk);
            frame.extend_from_slice(b"\r\n");
            prev = sig;
        }
        let terminal = sign_next(&prev, b"");
        frame.extend_from_slice(format!("0;chunk-signature={terminal}\r\n\r\n").as_bytes());
        (frame, terminal)
    }

    async fn decode(frame: &[u8], config: ChunkedConfig) -> Result<Vec<u8>, ChunkedError> {
        let mut reader = ChunkedBodyReader::new(frame, config)?;
        reader.read_to_end().await
    }

    #[tokio::test]
    async fn test_unsigned_single_chunk() {
        let out = decode(b"5\r\nhello\r\n0\r\n\r\n", unsigned_config(5))
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_unsigned_multiple_chunks() {
        let frame = b"3\r\nfoo\r\n3\r\nbar\r\n4\r\nquux\r\n0\r\n\r\n";
        let out = decode(frame, unsigned_config(10)).await.unwrap();
        assert_eq!(out, b"foobarquux");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let out = decode(b"0\r\n\r\n", unsigned_config(0)).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_short_body_is_incomplete() {
        let err = decode(b"5\r\nhello\r\n0\r\n\r\n", unsigned_config(6))
            .await
            .unwrap_err();
        assert_eq!(err, ChunkedError::LengthMismatch { expected: 6, got: 5 });
        assert_eq!(err.s3_code(), "IncompleteBody");
    }

    #[tokio::test]
    async fn test_long_body_is_entity_too_large() {
        let err = decode(b"5\r\nhello\r\n0\r\n\r\n", unsigned_config(3))
            .await
            .unwrap_err();
        assert_eq!(err, ChunkedError::TooLarge { expected: 3 });
        assert_eq!(err.s3_code(), "EntityTooLarge");
    }

    #[tokio::test]
    async fn test_rejects_bad_size_lines() {
        for frame in [
            &b"zz\r\nhello\r\n0\r\n\r\n"[..],
            &b" 5\r\nhello\r\n0\r\n\r\n"[..],
            &b"5 \r\nhello\r\n0\r\n\r\n"[..],
            &b"A\r\nhello\r\n0\r\n\r\n"[..],
            &b"11112222333344445\r\nx\r\n0\r\n\r\n"[..],
            &b"\r\nhello\r\n0\r\n\r\n"[..],
        ] {
            let err = decode(frame, unsigned_config(5)).await.unwrap_err();
            assert!(matches!(err, ChunkedError::Framing(_)), "frame {frame:?}");
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_crlf_after_payload() {
        let err = decode(b"5\r\nhelloXX0\r\n\r\n", unsigned_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::Framing(_)));
    }

    #[tokio::test]
    async fn test_rejects_bare_lf_header() {
        let err = decode(b"5\nhello\r\n0\r\n\r\n", unsigned_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::Framing(_)));
    }

    #[tokio::test]
    async fn test_premature_eof() {
        let err = decode(b"5\r\nhel", unsigned_config(5)).await.unwrap_err();
        assert_eq!(err, ChunkedError::UnexpectedEof);
        assert_eq!(err.s3_code(), "IncompleteBody");
    }

    #[tokio::test]
    async fn test_signature_forbidden_in_unsigned_mode() {
        let frame = format!("5;chunk-signature={}\r\nhello\r\n0\r\n\r\n", "a".repeat(64));
        let err = decode(frame.as_bytes(), unsigned_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::Framing(_)));
    }

    #[tokio::test]
    async fn test_signed_chain_accepts() {
        let (frame, _) = signed_frame(&[b"hello"]);
        let out = decode(&frame, signed_config(5)).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_signed_chain_multiple_chunks() {
        let (frame, _) = signed_frame(&[b"hel", b"lo ", b"world"]);
        let out = decode(&frame, signed_config(11)).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_signed_rejects_any_payload_bit_flip() {
        let (frame, _) = signed_frame(&[b"hello"]);
        // Flip each payload byte in turn; every variant must be rejected.
        let payload_start = frame
            .windows(2)
            .position(|w| w == &b"\r\n"[..])
            .unwrap()
            + 2;
        for i in payload_start..payload_start + 5 {
            let mut mutated = frame.clone();
            mutated[i] ^= 0x01;
            let err = decode(&mutated, signed_config(5)).await.unwrap_err();
            assert_eq!(err, ChunkedError::SignatureMismatch, "byte {i}");
        }
    }

    #[tokio::test]
    async fn test_signed_rejects_mutated_signature() {
        let (frame, _) = signed_frame(&[b"hello"]);
        let mut text = String::from_utf8(frame).unwrap();
        // Mutate one hex digit of the first chunk signature.
        let idx = text.find("chunk-signature=").unwrap() + "chunk-signature=".len();
        let original = text.as_bytes()[idx];
        let replacement = if original == b'0' { '1' } else { '0' };
        text.replace_range(idx..idx + 1, &replacement.to_string());
        let err = decode(text.as_bytes(), signed_config(5)).await.unwrap_err();
        assert_eq!(err, ChunkedError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_signed_rejects_mutated_terminal_signature() {
        let (frame, terminal) = signed_frame(&[b"hello"]);
        let mut text = String::from_utf8(frame).unwrap();
        let mutated_terminal: String = terminal
            .chars()
            .map(|c| if c == 'a' { 'b' } else { 'a' })
            .collect();
        text = text.replace(&terminal, &mutated_terminal);
        let err = decode(text.as_bytes(), signed_config(5)).await.unwrap_err();
        assert_eq!(err, ChunkedError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_signed_requires_signature() {
        let err = decode(b"5\r\nhello\r\n0\r\n\r\n", signed_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::MalformedAuth(_)));
        assert_eq!(err.s3_code(), "AuthorizationHeaderMalformed");
    }

    #[tokio::test]
    async fn test_poisoned_reader_repeats_error() {
        let frame = b"5\r\nhello\r\n0\r\n\r\n";
        let mut reader = ChunkedBodyReader::new(&frame[..], unsigned_config(3)).unwrap();
        let first = reader.read_to_end().await.unwrap_err();
        let mut buf = [0u8; 8];
        let second = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancellation_poisons() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let frame = b"5\r\nhello\r\n0\r\n\r\n";
        let mut reader = ChunkedBodyReader::new(&frame[..], unsigned_config(5))
            .unwrap()
            .with_cancel(cancel);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap_err(), ChunkedError::Cancelled);
        assert_eq!(reader.read(&mut buf).await.unwrap_err(), ChunkedError::Cancelled);
    }

    fn trailer_config(len: u64) -> ChunkedConfig {
        ChunkedConfig {
            mode: ChunkedMode::UnsignedTrailer,
            expected_decoded_len: len,
            trailer_keys: vec!["x-amz-checksum-sha256".into()],
            sigv4: None,
        }
    }

    fn sha256_b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(Sha256::digest(data))
    }

    #[tokio::test]
    async fn test_unsigned_trailer_checksum_accepts() {
        let frame = format!(
            "5\r\nhello\r\n0\r\nx-amz-checksum-sha256: {}\r\n\r\n",
            sha256_b64(b"hello")
        );
        let out = decode(frame.as_bytes(), trailer_config(5)).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_unsigned_trailer_checksum_mismatch() {
        let frame = format!(
            "5\r\nhello\r\n0\r\nx-amz-checksum-sha256: {}\r\n\r\n",
            sha256_b64(b"jello")
        );
        let err = decode(frame.as_bytes(), trailer_config(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChunkedError::ChecksumMismatch("x-amz-checksum-sha256".into())
        );
        assert_eq!(err.s3_code(), "BadDigest");
    }

    #[tokio::test]
    async fn test_unsigned_trailer_invalid_base64() {
        let frame = "5\r\nhello\r\n0\r\nx-amz-checksum-sha256: !!!\r\n\r\n";
        let err = decode(frame.as_bytes(), trailer_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::InvalidDigest(_)));
    }

    #[tokio::test]
    async fn test_unsigned_trailer_missing_required() {
        let frame = "5\r\nhello\r\n0\r\n\r\n";
        let err = decode(frame.as_bytes(), trailer_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::Framing(_)));
    }

    #[tokio::test]
    async fn test_unsigned_trailer_rejects_unknown() {
        let frame = format!(
            "5\r\nhello\r\n0\r\nx-amz-checksum-sha256: {}\r\nx-surprise: 1\r\n\r\n",
            sha256_b64(b"hello")
        );
        let err = decode(frame.as_bytes(), trailer_config(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkedError::Framing(_)));
    }

    fn signed_trailer_config(len: u64, keys: Vec<String>) -> ChunkedConfig {
        ChunkedConfig {
            mode: ChunkedMode::SignedTrailer,
            expected_decoded_len: len,
            trailer_keys: keys,
            sigv4: signed_config(len).sigv4,
        }
    }

    /// Build a complete signed+trailer frame for `payload` with the given
    /// trailers (in canonical order).
    fn signed_trailer_frame(payload: &[u8], trailers: &[(&str, String)]) -> Vec<u8> {
        let (mut frame, terminal) = signed_frame(&[payload]);
        // Drop the bare CRLF appended by signed_frame; trailers go there.
        frame.truncate(frame.len() - 2);
        let canonical: String = trailers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        let sts = sigv4::trailer_string_to_sign(AMZ_DATE, SCOPE, &terminal, &canonical);
        let trailer_sig = sigv4::sign(b"test", &sts);
        for (name, value) in trailers {
            frame.extend_from_slice(format!("{name}:{value}\r\n").as_bytes());
        }
        frame.extend_from_slice(format!("x-amz-trailer-signature:{trailer_sig}\r\n\r\n").as_bytes());
        frame
    }

    #[tokio::test]
    async fn test_signed_trailer_accepts() {
        let trailers = [("x-amz-checksum-sha256", sha256_b64(b"hello"))];
        let frame = signed_trailer_frame(b"hello", &trailers);
        let config = signed_trailer_config(5, vec!["x-amz-checksum-sha256".into()]);
        let out = decode(&frame, config).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_signed_trailer_rejects_mutated_value() {
        // A mutated trailer value flips the trailer signature check.
        let trailers = [("x-amz-checksum-sha256", sha256_b64(b"hello"))];
        let mut frame = signed_trailer_frame(b"hello", &trailers);
        let checksum = sha256_b64(b"hello");
        let text = String::from_utf8(frame.clone()).unwrap();
        let mutated_checksum = sha256_b64(b"other");
        frame = text.replace(&checksum, &mutated_checksum).into_bytes();
        let config = signed_trailer_config(5, vec!["x-amz-checksum-sha256".into()]);
        let err = decode(&frame, config).await.unwrap_err();
        assert_eq!(err, ChunkedError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_signed_trailer_requires_trailer_signature() {
        let (mut frame, _) = signed_frame(&[b"hello"]);
        frame.truncate(frame.len() - 2);
        frame.extend_from_slice(
            format!("x-amz-checksum-sha256:{}\r\n\r\n", sha256_b64(b"hello")).as_bytes(),
        );
        let config = signed_trailer_config(5, vec!["x-amz-checksum-sha256".into()]);
        let err = decode(&frame, config).await.unwrap_err();
        assert!(matches!(err, ChunkedError::MalformedAuth(_)));
    }

    proptest! {
        // Round-trip: any payload, any chunking, unsigned framing decodes
        // back to the original bytes.
        #[test]
        fn prop_unsigned_round_trip(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..257,
        ) {
            let mut frame = Vec::new();
            for chunk in payload.chunks(chunk_size) {
                frame.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                frame.extend_from_slice(chunk);
                frame.extend_from_slice(b"\r\n");
            }
            frame.extend_from_slice(b"0\r\n\r\n");

            let out = tokio_test::block_on(decode(&frame, unsigned_config(payload.len() as u64)))
                .unwrap();
            prop_assert_eq!(out, payload);
        }
    }
}
