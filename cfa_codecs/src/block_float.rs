use cfa_core::bitstream::BitStream;
use cfa_core::codec::BlockCodec;
use cfa_core::grid::BlockShape;
use cfa_core::scalar::Scalar;
use cfa_core::stream::RateParams;

/// Widest per-value field; keeps quantized values inside an `i64`.
const MAX_VALUE_BITS: u32 = 62;

/// Block-floating-point codec.
///
/// Every block of `n = 4^d` values shares one exponent. A block takes exactly
/// `maxbits` bits:
///
/// - 1 bit: block holds a nonzero value
/// - `ebits` bits: biased common exponent (8 for `f32`, 11 for `f64`)
/// - `n * p` bits: each value as a `p`-bit two's complement fraction of
///   `2^emax`, where `p = min((maxbits - 1 - ebits) / n, 62, maxprec)`
/// - zero padding up to `maxbits`
///
/// Padding elements and non-finite values encode as zero. Blocks are coded
/// independently, so any block can be rewritten in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFloatCodec;

impl BlockFloatCodec {
    pub fn new() -> Self {
        Self
    }
}

struct Layout {
    ebits: u32,
    bias: i32,
    p: u32,
}

impl Layout {
    fn new<S: Scalar>(params: &RateParams, n: usize) -> Self {
        let ebits = S::TYPE.exponent_bits();
        let bias = (1i32 << ebits.saturating_sub(1)) - 1;
        let room = (params.maxbits as usize).saturating_sub(1 + ebits as usize);
        let p = ((room / n.max(1)) as u32).min(MAX_VALUE_BITS).min(params.maxprec);
        Self { ebits, bias, p }
    }

    fn max_stored(&self) -> i32 {
        (1i32 << self.ebits) - 1
    }
}

/// Smallest `e` with `|v| < 2^e`, taken from the bit pattern.
fn exponent(v: f64) -> i32 {
    let biased = ((v.to_bits() >> 52) & 0x7ff) as i32;
    if biased == 0 {
        -1022
    } else {
        biased - 1022
    }
}

/// `x * 2^e` without overflowing the intermediate power for `|e| <= 2046`.
fn ldexp(x: f64, e: i32) -> f64 {
    let half = e / 2;
    x * 2f64.powi(half) * 2f64.powi(e - half)
}

impl<S: Scalar> BlockCodec<S> for BlockFloatCodec {
    fn name(&self) -> &'static str {
        "block-float"
    }

    fn encode_block(&self, bits: &mut BitStream, params: &RateParams, shape: BlockShape, block: &[S]) {
        let maxbits = params.maxbits as usize;
        if maxbits == 0 {
            return;
        }
        let layout = Layout::new::<S>(params, block.len());
        let value = |local: usize| {
            let v = block[local].to_f64();
            if shape.contains(local) && v.is_finite() {
                v
            } else {
                0.0
            }
        };
        let max = (0..block.len()).map(value).fold(0.0f64, |m, v| m.max(v.abs()));

        if max == 0.0 || layout.p == 0 {
            bits.write_bit(false);
            bits.pad(maxbits - 1);
            return;
        }

        let stored = (exponent(max) + layout.bias).clamp(0, layout.max_stored());
        let emax = stored - layout.bias;
        let p = layout.p;
        let limit = (1i64 << (p - 1)) - 1;
        let shift = p as i32 - 1 - emax;

        bits.write_bit(true);
        bits.write_bits(stored as u64, layout.ebits);
        for local in 0..block.len() {
            let q = (ldexp(value(local), shift).round() as i64).clamp(-limit - 1, limit);
            bits.write_bits(q as u64, p);
        }
        let used = 1 + layout.ebits as usize + block.len() * p as usize;
        bits.pad(maxbits.saturating_sub(used));
    }

    fn decode_block(&self, bits: &mut BitStream, params: &RateParams, block: &mut [S]) {
        let maxbits = params.maxbits as usize;
        if maxbits == 0 {
            block.fill(S::default());
            return;
        }
        let layout = Layout::new::<S>(params, block.len());
        if !bits.read_bit() || layout.p == 0 {
            block.fill(S::default());
            bits.skip(maxbits - 1);
            return;
        }

        let stored = bits.read_bits(layout.ebits) as i32;
        let emax = stored - layout.bias;
        let p = layout.p;
        let shift = emax - (p as i32 - 1);
        for slot in block.iter_mut() {
            let raw = bits.read_bits(p);
            let q = ((raw << (64 - p)) as i64) >> (64 - p);
            *slot = S::from_f64(ldexp(q as f64, shift));
        }
        let used = 1 + layout.ebits as usize + block.len() * p as usize;
        bits.skip(maxbits.saturating_sub(used));
    }
}
