//! Frame payload decoding.
//!
//! Cores post frame files under transport-encoded names: `positions.xtc.b64`
//! is base64, `positions.xtc.gz.b64` is base64-wrapped gzip. The extension
//! chain is unwrapped outermost-first and the stored name loses the
//! transport suffixes.

use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;

use crate::error::StoreError;
use crate::Result;

/// Splits `name` into its stem and final extension (including the dot).
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// Decodes a named payload file, unwrapping `.b64` and then `.gz`.
///
/// Returns the storage name (transport suffixes stripped) and the decoded
/// bytes. Files without a `.b64` suffix pass through untouched.
///
/// # Errors
///
/// [`StoreError::Base64`] / [`StoreError::Gzip`] on malformed payloads.
pub fn decode_named_file(name: &str, data: &[u8]) -> Result<(String, Vec<u8>)> {
    let (stem, ext) = split_ext(name);
    if ext != ".b64" {
        return Ok((name.to_owned(), data.to_vec()));
    }
    let decoded = BASE64.decode(data).map_err(|source| StoreError::Base64 {
        name: name.to_owned(),
        source,
    })?;

    let (inner_stem, inner_ext) = split_ext(stem);
    if inner_ext != ".gz" {
        return Ok((stem.to_owned(), decoded));
    }
    let mut plain = Vec::new();
    GzDecoder::new(decoded.as_slice())
        .read_to_end(&mut plain)
        .map_err(|source| StoreError::Gzip {
            name: name.to_owned(),
            source,
        })?;
    Ok((inner_stem.to_owned(), plain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_plain_file_passes_through() {
        let (name, data) = decode_named_file("frame.xtc", b"raw-bytes").unwrap();
        assert_eq!(name, "frame.xtc");
        assert_eq!(data, b"raw-bytes");
    }

    #[test]
    fn test_b64_file_is_decoded() {
        let encoded = BASE64.encode(b"frame-payload");
        let (name, data) = decode_named_file("frame.xtc.b64", encoded.as_bytes()).unwrap();
        assert_eq!(name, "frame.xtc");
        assert_eq!(data, b"frame-payload");
    }

    #[test]
    fn test_b64_gz_file_is_unwrapped() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"frame-payload").unwrap();
        let gz = encoder.finish().unwrap();
        let encoded = BASE64.encode(&gz);

        let (name, data) = decode_named_file("frame.xtc.gz.b64", encoded.as_bytes()).unwrap();
        assert_eq!(name, "frame.xtc");
        assert_eq!(data, b"frame-payload");
    }

    #[test]
    fn test_gz_without_b64_passes_through() {
        // Only the b64 wrapper triggers decoding; a bare .gz is stored as-is.
        let (name, data) = decode_named_file("frame.xtc.gz", b"whatever").unwrap();
        assert_eq!(name, "frame.xtc.gz");
        assert_eq!(data, b"whatever");
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let err = decode_named_file("frame.xtc.b64", b"not base64!!").unwrap_err();
        assert!(matches!(err, StoreError::Base64 { .. }));
    }

    #[test]
    fn test_invalid_gzip_is_rejected() {
        let encoded = BASE64.encode(b"not gzip");
        let err = decode_named_file("frame.xtc.gz.b64", encoded.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Gzip { .. }));
    }
}
