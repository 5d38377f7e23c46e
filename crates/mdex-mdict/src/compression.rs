use std::io::Read;

use flate2::read::ZlibDecoder;
use lzokay::decompress::decompress as lzo_decompress;
use tracing::trace;

use crate::error::{MdictError, Result};
use crate::models::Compression;

/// Decompress a block payload, requiring exactly `expected` output bytes
pub fn decompress(payload: &[u8], compression: Compression, expected: u64) -> Result<Vec<u8>> {
    let expected_len = usize::try_from(expected)
        .map_err(|_| MdictError::InvalidFormat(format!("block size {expected} is too large")))?;

    match compression {
        Compression::None => {
            if payload.len() != expected_len {
                return Err(MdictError::SizeMismatch {
                    context: "uncompressed block",
                    expected,
                    found: payload.len() as u64,
                });
            }
            Ok(payload.to_vec())
        }
        Compression::Lzo => {
            trace!(from = payload.len(), to = expected, "lzo decompress");
            let mut output = vec![0u8; expected_len];
            let written = lzo_decompress(payload, &mut output)
                .map_err(|e| MdictError::Decompression(format!("lzo: {e:?}")))?;
            if written != expected_len {
                return Err(MdictError::SizeMismatch {
                    context: "lzo block",
                    expected,
                    found: written as u64,
                });
            }
            Ok(output)
        }
        Compression::Zlib => {
            trace!(from = payload.len(), to = expected, "zlib decompress");
            let mut output = Vec::with_capacity(expected_len.min(payload.len().saturating_mul(16)));
            ZlibDecoder::new(payload)
                .read_to_end(&mut output)
                .map_err(|e| MdictError::Decompression(format!("zlib: {e}")))?;
            if output.len() != expected_len {
                return Err(MdictError::SizeMismatch {
                    context: "zlib block",
                    expected,
                    found: output.len() as u64,
                });
            }
            Ok(output)
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub fn compress(data: &[u8], compression: Compression) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    use flate2::write::ZlibEncoder;

    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::Lzo => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "lzo fixtures are not supported",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_round_trip_checks_size() {
        let data = b"definition text ".repeat(40);
        let packed = compress(&data, Compression::Zlib).unwrap();

        assert_eq!(
            decompress(&packed, Compression::Zlib, data.len() as u64).unwrap(),
            data
        );
        assert!(matches!(
            decompress(&packed, Compression::Zlib, data.len() as u64 + 1),
            Err(MdictError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_uncompressed_payload_must_match_size() {
        assert!(matches!(
            decompress(b"abc", Compression::None, 4),
            Err(MdictError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_zlib_is_a_decompression_error() {
        assert!(matches!(
            decompress(b"\x00\x01\x02\x03", Compression::Zlib, 4),
            Err(MdictError::Decompression(_))
        ));
    }
}
