use thiserror::Error;

use crate::scalar::ScalarType;
use crate::stream::CompressionMode;

/// Errors raised while building, resizing, or deserializing a compressed array.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// Malformed or short header, or a parsed bit count other than the
    /// fixed header size.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Header scalar type differs from the array's scalar type.
    #[error("header scalar type {found} does not match array scalar type {expected}")]
    TypeMismatch {
        expected: ScalarType,
        found: ScalarType,
    },

    /// Header extents are inconsistent with the array's dimensionality.
    #[error("header extents {nx}x{ny}x{nz} are inconsistent with a {dims}-dimensional array")]
    DimensionMismatch {
        dims: u32,
        nx: usize,
        ny: usize,
        nz: usize,
    },

    /// Header describes a stream that is not fixed-rate.
    #[error("header describes {0} mode; only fixed-rate streams are supported")]
    UnsupportedMode(CompressionMode),

    /// Supplied compressed buffer is shorter than the header requires.
    #[error("buffer too small: header describes {required} bytes but {actual} were supplied")]
    BufferTooSmall { required: usize, actual: usize },

    /// The allocator could not provide compressed storage.
    #[error("failed to allocate {bytes} bytes of compressed storage")]
    Allocation { bytes: usize },

    /// Bulk set/get was given a slice whose length is not the element count.
    #[error("expected {expected} values, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

impl ArrayError {
    /// Errors that no alternative array type could recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArrayError::BufferTooSmall { .. } | ArrayError::Allocation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ArrayError>;
