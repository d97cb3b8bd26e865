//! Embedding blob codec.
//!
//! Converts between an in-memory `f32` vector and the binary form stored in
//! the `chunks.embedding` column. Each element is written as 4 bytes of
//! little-endian IEEE-754, so a vector of `n` elements always encodes to
//! exactly `n × 4` bytes.
//!
//! The dimensionality is stored next to the blob (`chunks.embedding_dim`),
//! and [`decode`] checks the blob length against it rather than inferring
//! the dimension from the byte count.
//!
//! ```rust
//! use leaplogic_rag::codec::{decode, encode};
//!
//! let v = vec![1.0f32, -2.5, 3.125];
//! let blob = encode(&v);
//! assert_eq!(blob.len(), 12); // 3 × 4 bytes
//! assert_eq!(decode(&blob, 3).unwrap(), v);
//! assert!(decode(&blob, 4).is_err());
//! ```

use thiserror::Error;

/// Bytes per encoded element.
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<f32>();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("embedding blob is {actual} bytes, expected {expected} for dimension {dim}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        dim: usize,
    },
    #[error("embedding dimension must be non-negative, got {0}")]
    NegativeDimension(i64),
    #[error("embedding dimension {0} is too large")]
    DimensionOverflow(usize),
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * ELEMENT_WIDTH);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into exactly `dim` floats.
pub fn decode(blob: &[u8], dim: usize) -> Result<Vec<f32>, DecodeError> {
    let expected = dim
        .checked_mul(ELEMENT_WIDTH)
        .ok_or(DecodeError::DimensionOverflow(dim))?;
    if blob.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: blob.len(),
            dim,
        });
    }

    Ok(blob
        .chunks_exact(ELEMENT_WIDTH)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Decode a BLOB whose dimension comes from an SQLite `INTEGER` column.
pub fn decode_stored(blob: &[u8], dim: i64) -> Result<Vec<f32>, DecodeError> {
    let dim = usize::try_from(dim).map_err(|_| DecodeError::NegativeDimension(dim))?;
    decode(blob, dim)
}

/// Decode a BLOB into a `1 × dim` matrix, the row-vector shape used when a
/// stored embedding is compared against a batch of query embeddings.
pub fn decode_batch(blob: &[u8], dim: usize) -> Result<Vec<Vec<f32>>, DecodeError> {
    Ok(vec![decode(blob, dim)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001, f32::MAX, f32::MIN_POSITIVE];
        let blob = encode(&vec);
        assert_eq!(blob.len(), vec.len() * ELEMENT_WIDTH);
        assert_eq!(decode(&blob, vec.len()).unwrap(), vec);
    }

    #[test]
    fn test_nan_bits_preserved() {
        let vec = vec![f32::NAN, f32::INFINITY, -0.0];
        let restored = decode(&encode(&vec), 3).unwrap();
        for (a, b) in vec.iter().zip(restored.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(encode(&[1.0]), vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_empty_vector() {
        assert!(encode(&[]).is_empty());
        assert_eq!(decode(&[], 0).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_length_mismatch() {
        let blob = encode(&[1.0, 2.0, 3.0]);
        assert_eq!(
            decode(&blob, 4),
            Err(DecodeError::LengthMismatch {
                expected: 16,
                actual: 12,
                dim: 4
            })
        );
        assert!(decode(&blob, 2).is_err());
        // Trailing partial element
        assert!(decode(&blob[..11], 3).is_err());
    }

    #[test]
    fn test_decode_stored_rejects_negative_dim() {
        assert_eq!(
            decode_stored(&[], -1),
            Err(DecodeError::NegativeDimension(-1))
        );
        assert_eq!(decode_stored(&encode(&[0.5]), 1).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_huge_dimension_is_an_error() {
        assert_eq!(
            decode(&[0; 4], usize::MAX / 2),
            Err(DecodeError::DimensionOverflow(usize::MAX / 2))
        );
        assert!(decode_stored(&[0; 4], i64::MAX).is_err());
        assert!(decode_batch(&[0; 4], usize::MAX).is_err());
    }

    #[test]
    fn test_decode_batch_shape() {
        let blob = encode(&[0.1, 0.2, 0.3, 0.4]);
        let matrix = decode_batch(&blob, 4).unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].len(), 4);
    }
}
