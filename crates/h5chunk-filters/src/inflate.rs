//! Backend selection for zlib inflation.

use crate::InflateError;

#[cfg(not(feature = "fast-deflate"))]
pub(crate) fn decompress(
    data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, InflateError> {
    miniz_decompress(data, size_hint, limit)
}

#[cfg(feature = "fast-deflate")]
pub(crate) fn decompress(
    data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, InflateError> {
    use std::io::Read;

    let decoder = flate2::read::ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(size_hint.min(limit));
    // one byte past the limit is enough to tell an overrun
    decoder
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| InflateError {
            backend: "flate2",
            message: e.to_string(),
        })?;
    if output.len() > limit {
        return Err(over_limit("flate2", limit));
    }
    Ok(output)
}

pub(crate) fn miniz_decompress(
    data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, InflateError> {
    use miniz_oxide::inflate::core::inflate_flags::{
        TINFL_FLAG_PARSE_ZLIB_HEADER, TINFL_FLAG_USING_NON_WRAPPING_OUTPUT_BUF,
    };
    use miniz_oxide::inflate::core::{decompress as tinfl, DecompressorOxide};
    use miniz_oxide::inflate::TINFLStatus;

    let flags = TINFL_FLAG_PARSE_ZLIB_HEADER | TINFL_FLAG_USING_NON_WRAPPING_OUTPUT_BUF;
    // The buffer never grows past limit + 1 bytes.
    let cap = limit.saturating_add(1);
    let mut state = DecompressorOxide::new();
    let mut output = vec![0u8; size_hint.max(64).min(cap)];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    loop {
        let (status, consumed, written) =
            tinfl(&mut state, &data[in_pos..], &mut output, out_pos, flags);
        in_pos += consumed;
        out_pos += written;

        match status {
            TINFLStatus::Done if out_pos > limit => {
                return Err(over_limit("miniz_oxide", limit));
            }
            TINFLStatus::Done => {
                output.truncate(out_pos);
                return Ok(output);
            }
            TINFLStatus::HasMoreOutput if output.len() >= cap => {
                tracing::trace!(in_pos, out_pos, limit, "miniz_oxide inflate over limit");
                return Err(over_limit("miniz_oxide", limit));
            }
            TINFLStatus::HasMoreOutput => {
                let grown = output.len().saturating_mul(2).max(64).min(cap);
                output.resize(grown, 0);
            }
            other => {
                tracing::trace!(?other, in_pos, out_pos, "miniz_oxide inflate stopped");
                return Err(InflateError {
                    backend: "miniz_oxide",
                    message: format!("inflate failed: {other:?}"),
                });
            }
        }
    }
}

fn over_limit(backend: &'static str, limit: usize) -> InflateError {
    InflateError {
        backend,
        message: format!("inflated output exceeds {limit} bytes"),
    }
}

pub(crate) fn active_backend() -> &'static str {
    #[cfg(feature = "fast-deflate")]
    {
        "flate2"
    }
    #[cfg(not(feature = "fast-deflate"))]
    {
        "miniz_oxide"
    }
}
