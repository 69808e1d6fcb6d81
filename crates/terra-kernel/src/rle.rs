//! Run-length compression for persisted terrain.
//!
//! Terrain rasters are dominated by long runs of identical bytes (open ocean,
//! flat plains), so a plain `(value, count)` encoding shrinks them by orders
//! of magnitude. The pair stream is base64-armored for text-based storage.
//!
//! # Example
//!
//! ```
//! use terra_kernel::rle::{compress_run_length, decompress_run_length};
//!
//! let data = vec![0x20u8; 10_000];
//! let encoded = compress_run_length(&data);
//! assert_eq!(encoded.len(), 80);
//! assert_eq!(decompress_run_length(&encoded).unwrap(), data);
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use terra_common::{TerraError, TerraResult};

/// Longest run a single pair can describe.
pub const MAX_RUN: usize = 255;

/// Encodes bytes as `(value, count)` pairs, splitting runs longer than 255.
#[must_use]
pub fn compress_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = data.iter().copied();
    let Some(mut current) = iter.next() else {
        return out;
    };
    let mut count = 1usize;
    for byte in iter {
        if byte == current && count < MAX_RUN {
            count += 1;
        } else {
            out.push(current);
            out.push(count as u8);
            current = byte;
            count = 1;
        }
    }
    out.push(current);
    out.push(count as u8);
    out
}

/// Decodes a pair stream.
///
/// Fails with `CorruptedData` on an odd-length stream or a zero-length run.
pub fn decompress_run_length(encoded: &[u8]) -> TerraResult<Vec<u8>> {
    if encoded.len() % 2 != 0 {
        return Err(TerraError::CorruptedData(format!(
            "run-length stream has odd length {}",
            encoded.len()
        )));
    }
    let total: usize = encoded.chunks_exact(2).map(|pair| pair[1] as usize).sum();
    let mut out = Vec::with_capacity(total);
    for (index, pair) in encoded.chunks_exact(2).enumerate() {
        let (value, count) = (pair[0], pair[1]);
        if count == 0 {
            return Err(TerraError::CorruptedData(format!(
                "run {index} has zero length"
            )));
        }
        out.resize(out.len() + count as usize, value);
    }
    Ok(out)
}

/// Decodes a pair stream that must expand to exactly `expected_len` bytes.
pub fn decompress_run_length_exact(encoded: &[u8], expected_len: usize) -> TerraResult<Vec<u8>> {
    let decoded = decompress_run_length(encoded)?;
    if decoded.len() != expected_len {
        return Err(TerraError::CorruptedData(format!(
            "run-length stream expands to {} bytes, expected {expected_len}",
            decoded.len()
        )));
    }
    Ok(decoded)
}

/// Run-length encodes and base64-armors bytes.
#[must_use]
pub fn compress_to_base64(data: &[u8]) -> String {
    STANDARD.encode(compress_run_length(data))
}

/// Inverse of [`compress_to_base64`], checking the decoded length.
pub fn decompress_from_base64(armored: &str, expected_len: usize) -> TerraResult<Vec<u8>> {
    let encoded = STANDARD
        .decode(armored.trim())
        .map_err(|e| TerraError::CorruptedData(format!("invalid base64: {e}")))?;
    decompress_run_length_exact(&encoded, expected_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        assert!(compress_run_length(&[]).is_empty());
        assert!(decompress_run_length(&[]).expect("empty").is_empty());
    }

    #[test]
    fn test_runs_split_at_255() {
        let data = vec![7u8; 600];
        let encoded = compress_run_length(&data);
        assert_eq!(encoded, vec![7, 255, 7, 255, 7, 90]);
    }

    #[test]
    fn test_uniform_raster_compresses_small() {
        // 100x100 all-ocean raster
        let data = vec![0x20u8; 10_000];
        let encoded = compress_run_length(&data);
        assert_eq!(encoded.len(), 2 * 10_000usize.div_ceil(MAX_RUN));
        assert!(encoded.len() < 100);
        assert_eq!(decompress_run_length_exact(&encoded, 10_000).expect("decode"), data);
    }

    #[test]
    fn test_rejects_odd_length() {
        assert!(matches!(
            decompress_run_length(&[1, 2, 3]),
            Err(TerraError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_rejects_zero_run() {
        assert!(matches!(
            decompress_run_length(&[1, 0]),
            Err(TerraError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let encoded = compress_run_length(&[1, 1, 2]);
        assert!(matches!(
            decompress_run_length_exact(&encoded, 4),
            Err(TerraError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_base64_armor() {
        let data = [0x20, 0x20, 0x85, 0x85, 0x85];
        let armored = compress_to_base64(&data);
        assert_eq!(decompress_from_base64(&armored, 5).expect("decode"), data);
        assert!(matches!(
            decompress_from_base64("!!not base64!!", 5),
            Err(TerraError::CorruptedData(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let decoded = decompress_run_length(&compress_run_length(&data)).expect("decode");
            prop_assert_eq!(decoded, data);
        }

        #[test]
        fn prop_round_trip_long_runs(
            runs in prop::collection::vec((any::<u8>(), 1usize..700), 0..8),
        ) {
            let data: Vec<u8> = runs
                .iter()
                .flat_map(|&(v, n)| std::iter::repeat(v).take(n))
                .collect();
            let encoded = compress_run_length(&data);
            prop_assert!(encoded.chunks_exact(2).all(|p| p[1] > 0));
            prop_assert_eq!(decompress_run_length(&encoded).expect("decode"), data);
        }
    }
}
