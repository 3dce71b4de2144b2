//! Error types for chunk compression and entity decompression.

use thiserror::Error;

/// Errors that can occur while compressing a chunk or decompressing an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmpError {
    /// Internal error that should not occur with validated parameters
    #[error("internal compressor error")]
    Internal,

    /// Destination buffer too small for the produced output
    #[error("destination buffer too small")]
    BufferTooSmall,

    /// Value does not fit into the requested bit width
    #[error("value {value:#x} does not fit into {bits} bits")]
    ValueTooLarge { value: u32, bits: u32 },

    /// Chunk-wide compression parameter out of range
    #[error("compression parameter out of range: {0}")]
    InvalidParams(&'static str),

    /// Per-field Golomb parameter or spillover threshold out of range
    #[error("field parameter out of range: {0}")]
    InvalidFieldParams(&'static str),

    /// A buffer required by the selected mode was not supplied
    #[error("missing required buffer: {0}")]
    MissingBuffer(&'static str),

    /// A supplied buffer has the wrong length
    #[error("buffer {name} has length {actual}, expected {expected}")]
    BufferSizeMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Chunk smaller than one collection header
    #[error("chunk too small: {0} bytes")]
    ChunkTooSmall(usize),

    /// Chunk exceeds the 24 MiB limit
    #[error("chunk too large: {0} bytes")]
    ChunkTooLarge(usize),

    /// Walking the collections does not exactly consume the chunk
    #[error("chunk size inconsistent at offset {offset}")]
    ChunkSizeInconsistent { offset: usize },

    /// Collection class differs from the one established by the first collection
    #[error("collection subservice {0} inconsistent with chunk class")]
    ChunkSubserviceInconsistent(u8),

    /// Collection subservice does not map to a supported record shape
    #[error("unsupported collection subservice {0}")]
    CollectionSubserviceUnsupported(u8),

    /// Collection data length is not a multiple of its record size
    #[error("collection data length {data_len} inconsistent with record size {record_size}")]
    CollectionSizeInconsistent { data_len: usize, record_size: usize },

    /// Compressed collection payload does not fit the 2-byte size prefix
    #[error("collection too large to frame")]
    CollectionTooLargeToFrame,

    /// Entity buffer smaller than its own headers claim
    #[error("entity too small: {0} bytes")]
    EntityTooSmall(usize),

    /// Entity header fields are inconsistent or could not be built
    #[error("invalid entity header: {0}")]
    EntityHeaderInvalid(&'static str),

    /// Timestamp does not fit into 48 bits
    #[error("timestamp {0:#x} out of 48-bit range")]
    TimestampOutOfRange(u64),

    /// A 24-bit size field would exceed 0xFFFFFF
    #[error("size {0} exceeds 24-bit entity size field")]
    SizeTooLarge(usize),

    /// Compressed bitstream is corrupted or truncated
    #[error("corrupted compressed data")]
    DecoderCorruption,

    /// Entity data type is unknown to this implementation
    #[error("unsupported entity data type {0}")]
    UnsupportedType(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CmpError::BufferTooSmall;
        assert!(err.to_string().contains("too small"));

        let err = CmpError::ValueTooLarge {
            value: 0x100,
            bits: 8,
        };
        assert!(err.to_string().contains("8 bits"));

        let err = CmpError::CollectionSubserviceUnsupported(42);
        assert!(err.to_string().contains("42"));

        let err = CmpError::CollectionSizeInconsistent {
            data_len: 10,
            record_size: 4,
        };
        assert!(err.to_string().contains("record size 4"));

        let err = CmpError::TimestampOutOfRange(1 << 50);
        assert!(err.to_string().contains("48-bit"));

        let err = CmpError::SizeTooLarge(0x0100_0000);
        assert!(err.to_string().contains("24-bit"));

        let err = CmpError::DecoderCorruption;
        assert!(err.to_string().contains("corrupted"));
    }
}
