mod block_float;

pub use block_float::BlockFloatCodec;

use cfa_core::{parse_header, Array1, Array2, Array3, CompressedArray, Header, Result, ScalarType};
use tracing::{debug, warn};

pub type Array1f = Array1<f32, BlockFloatCodec>;
pub type Array1d = Array1<f64, BlockFloatCodec>;
pub type Array2f = Array2<f32, BlockFloatCodec>;
pub type Array2d = Array2<f64, BlockFloatCodec>;
pub type Array3f = Array3<f32, BlockFloatCodec>;
pub type Array3d = Array3<f64, BlockFloatCodec>;

fn boxed<A: CompressedArray + 'static>(array: Result<A>) -> Result<Box<dyn CompressedArray>> {
    array.map(|a| Box::new(a) as Box<dyn CompressedArray>)
}

/// Rebuild a compressed array from a serialized header and, optionally, its
/// compressed bytes, choosing the concrete type the header describes.
///
/// Returns `Ok(None)` when `header` is not a header or no bundled array type
/// accepts it (integer scalars, a mode other than fixed-rate). Only errors
/// that no other type could recover from (see [`cfa_core::ArrayError::is_fatal`])
/// are returned as `Err`. Downcast the result with
/// [`CompressedArray::as_any`].
pub fn construct_from_stream(header: &Header, buffer: &[u8]) -> Result<Option<Box<dyn CompressedArray>>> {
    let Some(parsed) = parse_header(header) else {
        debug!("buffer does not start with an array header");
        return Ok(None);
    };
    let field = parsed.field;
    let attempt = match (field.dimensionality(), field.scalar_type) {
        (1, ScalarType::Float) => boxed(Array1f::from_header(header, buffer)),
        (1, ScalarType::Double) => boxed(Array1d::from_header(header, buffer)),
        (2, ScalarType::Float) => boxed(Array2f::from_header(header, buffer)),
        (2, ScalarType::Double) => boxed(Array2d::from_header(header, buffer)),
        (3, ScalarType::Float) => boxed(Array3f::from_header(header, buffer)),
        (3, ScalarType::Double) => boxed(Array3d::from_header(header, buffer)),
        (dims, scalar_type) => {
            warn!(dims, %scalar_type, "no array type holds this header");
            return Ok(None);
        }
    };
    match attempt {
        Ok(array) => {
            debug!(
                dims = array.dimensionality(),
                scalar_type = %array.scalar_type(),
                rate = array.rate(),
                "constructed array from header"
            );
            Ok(Some(array))
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(%err, "header rejected");
            Ok(None)
        }
    }
}
