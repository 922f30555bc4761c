pub mod array;
pub mod array1;
pub mod array2;
pub mod array3;
pub mod bitstream;
pub mod buffer;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod grid;
pub mod scalar;
pub mod stream;
mod store;

pub use array::{ArrayBase, CompressedArray};
pub use array1::Array1;
pub use array2::Array2;
pub use array3::Array3;
pub use codec::BlockCodec;
pub use config::ArrayConfig;
pub use error::{ArrayError, Result};
pub use format::{parse_header, Header, ParsedHeader, HEADER_SIZE, MAGIC};
pub use scalar::{Scalar, ScalarType};
pub use stream::{CompressionMode, RateParams};
