use crate::bitstream::BitStream;
use crate::grid::BlockShape;
use crate::scalar::Scalar;
use crate::stream::RateParams;

/// Block transform between `4^d` scalars and a fixed number of bits.
///
/// Each implementation:
/// - Encodes one block at the stream's write cursor and decodes one block at
///   its read cursor. No state may carry over between blocks; this is what
///   lets the cache decode and re-encode any block in isolation.
/// - In fixed-rate mode consumes exactly `params.maxbits` bits per block,
///   padding with zeros when the payload is shorter.
/// - Treats elements outside `shape` as padding. Their encoded value is
///   unspecified but must not depend on anything outside the block.
///
/// The block length (`4^d`) implies the dimensionality. Codecs are owned
/// values with no borrowed state, so arrays built on them can be boxed as
/// `dyn CompressedArray`.
pub trait BlockCodec<S: Scalar>: Send + Sync + 'static {
    /// Human-readable codec name for logs.
    fn name(&self) -> &'static str;

    /// Compress a single block.
    fn encode_block(&self, bits: &mut BitStream, params: &RateParams, shape: BlockShape, block: &[S]);

    /// Decompress a single block into all `block.len()` slots.
    fn decode_block(&self, bits: &mut BitStream, params: &RateParams, block: &mut [S]);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Stores the top `maxbits / n` bits of each value's `f64` pattern.
    /// Lossless once a block has 64 bits per value.
    #[derive(Debug, Clone, Copy, Default)]
    pub(crate) struct TruncatingCodec;

    fn width(params: &RateParams, n: usize) -> u32 {
        (params.maxbits as usize / n).min(64) as u32
    }

    impl<S: Scalar> BlockCodec<S> for TruncatingCodec {
        fn name(&self) -> &'static str {
            "truncating"
        }

        fn encode_block(&self, bits: &mut BitStream, params: &RateParams, shape: BlockShape, block: &[S]) {
            let p = width(params, block.len());
            for (local, value) in block.iter().enumerate() {
                let word = if shape.contains(local) { value.to_f64().to_bits() } else { 0 };
                if p > 0 {
                    bits.write_bits(word >> (64 - p), p);
                }
            }
            bits.pad(params.maxbits as usize - p as usize * block.len());
        }

        fn decode_block(&self, bits: &mut BitStream, params: &RateParams, block: &mut [S]) {
            let p = width(params, block.len());
            for value in block.iter_mut() {
                let word = if p > 0 { bits.read_bits(p) << (64 - p) } else { 0 };
                *value = S::from_f64(f64::from_bits(word));
            }
        }
    }
}
