//! Deflate backends for the h5chunk filter pipeline.
//!
//! Only the read direction is provided: chunks are inflated, never deflated.
//!
//! - **Default**: `miniz_oxide` (pure Rust, no C dependencies)
//! - **`fast-deflate` feature**: `flate2` with the zlib-rs backend
//!
//! Both backends accept the zlib wrapper format (2-byte header, deflate
//! stream, Adler-32 trailer) that HDF5's deflate filter writes.

mod inflate;

use thiserror::Error;

/// Failure while inflating a zlib stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend}: {message}")]
pub struct InflateError {
    /// Backend that rejected the stream.
    pub backend: &'static str,
    /// Backend-specific description.
    pub message: String,
}

/// Inflate zlib-compressed data with the active backend.
///
/// `size_hint` is the expected decompressed length (0 when unknown). It only
/// sizes the initial allocation; output longer than the hint is still
/// returned in full.
pub fn inflate(data: &[u8], size_hint: usize) -> Result<Vec<u8>, InflateError> {
    inflate::decompress(data, size_hint, usize::MAX)
}

/// Like [`inflate`], but a stream that decodes to more than `limit` bytes is
/// rejected. At most `limit + 1` bytes are ever produced.
pub fn inflate_limited(
    data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, InflateError> {
    inflate::decompress(data, size_hint, limit)
}

/// Inflate with the pure-Rust `miniz_oxide` backend regardless of features.
pub fn inflate_miniz(data: &[u8], size_hint: usize) -> Result<Vec<u8>, InflateError> {
    inflate::miniz_decompress(data, size_hint, usize::MAX)
}

/// Name of the backend [`inflate`] dispatches to.
pub fn backend() -> &'static str {
    inflate::active_backend()
}

#[cfg(test)]
mod tests {
    use super::*;

    // python3 -c "import zlib; print(list(zlib.compress(bytes(range(10)), 6)))"
    const PY_ZLIB_0_TO_9: [u8; 18] = [
        120, 156, 99, 96, 100, 98, 102, 97, 101, 99, 231, 224, 4, 0, 0, 175, 0, 46,
    ];

    #[test]
    fn inflate_python_zlib() {
        let out = inflate(&PY_ZLIB_0_TO_9, 10).unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn inflate_ignores_short_hint() {
        let out = inflate(&PY_ZLIB_0_TO_9, 3).unwrap();
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn inflate_without_hint() {
        let out = inflate(&PY_ZLIB_0_TO_9, 0).unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn miniz_always_available() {
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&[42u8; 100], 6);
        assert_eq!(inflate_miniz(&compressed, 100).unwrap(), vec![42u8; 100]);
        assert_eq!(inflate(&compressed, 100).unwrap(), vec![42u8; 100]);
    }

    #[test]
    fn limited_inflate_rejects_bombs() {
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&[0u8; 1 << 20], 9);
        assert!(compressed.len() < 2048);
        let err = inflate_limited(&compressed, 8, 8).unwrap_err();
        assert_eq!(err.backend, backend());
        assert_eq!(
            inflate_limited(&PY_ZLIB_0_TO_9, 10, 10).unwrap(),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let err = inflate(&[0xDE, 0xAD, 0xBE, 0xEF], 16).unwrap_err();
        assert_eq!(err.backend, backend());
        assert!(!err.message.is_empty());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&[7u8; 4096], 6);
        let cut = &compressed[..compressed.len() / 2];
        assert!(inflate(cut, 4096).is_err());
    }

    #[test]
    fn backend_reports_name() {
        assert!(["miniz_oxide", "flate2"].contains(&backend()));
    }
}
