use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};

use crate::bitstream::BitStream;
use crate::buffer::AlignedBuf;
use crate::format::{MODE_SHORT_BITS, MODE_SHORT_MAX, STREAM_WORD_BITS};
use crate::scalar::ScalarType;

/// Smallest and largest per-block bit budgets.
pub const MIN_BITS: u32 = 1;
pub const MAX_BITS: u32 = 16658;
/// Largest bit plane count a codec may emit per value.
pub const MAX_PREC: u32 = 64;
/// Smallest exponent of any supported floating-point value.
pub const MIN_EXP: i32 = -1074;

// short-form mode word ranges
const SHORT_PRECISION_BASE: u64 = 2048;
const SHORT_REVERSIBLE: u64 = 2048 + 128;
const SHORT_ACCURACY_BASE: u64 = SHORT_REVERSIBLE + 1;
const LONG_MINEXP_BIAS: i32 = 16495;

/// Compression mode implied by a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Null,
    Expert,
    FixedRate,
    FixedPrecision,
    FixedAccuracy,
    Reversible,
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionMode::Null => "null",
            CompressionMode::Expert => "expert",
            CompressionMode::FixedRate => "fixed-rate",
            CompressionMode::FixedPrecision => "fixed-precision",
            CompressionMode::FixedAccuracy => "fixed-accuracy",
            CompressionMode::Reversible => "reversible",
        };
        f.write_str(name)
    }
}

/// The four codec parameters. Fixed-rate mode is `minbits == maxbits` with
/// unbounded precision and exponent range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateParams {
    pub minbits: u32,
    pub maxbits: u32,
    pub maxprec: u32,
    pub minexp: i32,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            minbits: MIN_BITS,
            maxbits: MAX_BITS,
            maxprec: MAX_PREC,
            minexp: MIN_EXP,
        }
    }
}

impl RateParams {
    /// Fixed-rate parameters for `rate` bits per value. Returns the
    /// parameters and the rate actually achieved.
    ///
    /// Every block gets at least a sign bit plus an exponent. With `wra`
    /// (write random access) the block size is rounded up to a whole stream
    /// word so each block can be rewritten without touching its neighbours.
    pub fn fixed_rate(rate: f64, scalar_type: ScalarType, dims: u32, wra: bool) -> (Self, f64) {
        let n = 1u64 << (2 * dims);
        let word = STREAM_WORD_BITS as u64;
        let cap = if wra {
            MAX_BITS as u64 / word * word
        } else {
            MAX_BITS as u64
        };
        // float-to-int `as` saturates, mapping NaN and negatives to 0
        let mut bits = ((n as f64 * rate + 0.5).floor() as u64).min(cap);
        bits = bits.max(1 + scalar_type.exponent_bits() as u64);
        if wra {
            bits = bits.div_ceil(word) * word;
        }
        let bits = bits as u32;
        let params = Self {
            minbits: bits,
            maxbits: bits,
            maxprec: MAX_PREC,
            minexp: MIN_EXP,
        };
        (params, bits as f64 / n as f64)
    }

    pub fn mode(&self) -> CompressionMode {
        if self.minbits > self.maxbits || self.maxprec == 0 || self.maxprec > MAX_PREC {
            return CompressionMode::Null;
        }
        if self.minbits == self.maxbits
            && (1..=MAX_BITS).contains(&self.maxbits)
            && self.maxprec >= MAX_PREC
            && self.minexp <= MIN_EXP
        {
            return CompressionMode::FixedRate;
        }
        if self.minbits <= MIN_BITS && self.maxbits >= MAX_BITS {
            if self.maxprec >= MAX_PREC && self.minexp < MIN_EXP {
                return CompressionMode::Reversible;
            }
            if self.minexp <= MIN_EXP {
                return CompressionMode::FixedPrecision;
            }
            if self.maxprec >= MAX_PREC {
                return CompressionMode::FixedAccuracy;
            }
        }
        CompressionMode::Expert
    }

    /// Encode as a mode word: 12 bits for the common configurations,
    /// otherwise a 64-bit word whose low 12 bits are all ones.
    pub fn mode_word(&self) -> u64 {
        match self.mode() {
            CompressionMode::FixedRate if self.maxbits <= 2048 => return (self.maxbits - 1) as u64,
            CompressionMode::FixedPrecision if self.maxprec <= 128 => {
                return SHORT_PRECISION_BASE + (self.maxprec - 1) as u64
            }
            CompressionMode::Reversible => return SHORT_REVERSIBLE,
            CompressionMode::FixedAccuracy if self.minexp <= 843 => {
                return SHORT_ACCURACY_BASE + (self.minexp - MIN_EXP) as u64
            }
            _ => {}
        }
        let minbits = (self.minbits.clamp(1, 0x8000) - 1) as u64;
        let maxbits = (self.maxbits.clamp(1, 0x8000) - 1) as u64;
        let maxprec = (self.maxprec.clamp(1, 0x80) - 1) as u64;
        let minexp = (self.minexp.clamp(-LONG_MINEXP_BIAS, 0x7fff - LONG_MINEXP_BIAS) + LONG_MINEXP_BIAS) as u64;
        let mut word = minexp;
        word = (word << 7) + maxprec;
        word = (word << 15) + maxbits;
        word = (word << 15) + minbits;
        (word << MODE_SHORT_BITS) + (MODE_SHORT_MAX + 1)
    }

    /// Decode a mode word. `None` if it describes no valid mode.
    pub fn from_mode_word(word: u64) -> Option<Self> {
        let params = if word <= MODE_SHORT_MAX {
            let mut p = Self::default();
            if word < SHORT_PRECISION_BASE {
                p.minbits = word as u32 + 1;
                p.maxbits = word as u32 + 1;
            } else if word < SHORT_REVERSIBLE {
                p.maxprec = (word - SHORT_PRECISION_BASE) as u32 + 1;
            } else if word == SHORT_REVERSIBLE {
                p.minexp = MIN_EXP - 1;
            } else {
                p.minexp = (word - SHORT_ACCURACY_BASE) as i32 + MIN_EXP;
            }
            p
        } else {
            let mut w = word >> MODE_SHORT_BITS;
            let minbits = (w & 0x7fff) as u32 + 1;
            w >>= 15;
            let maxbits = (w & 0x7fff) as u32 + 1;
            w >>= 15;
            let maxprec = (w & 0x7f) as u32 + 1;
            w >>= 7;
            let minexp = (w & 0x7fff) as i32 - LONG_MINEXP_BIAS;
            Self {
                minbits,
                maxbits,
                maxprec,
                minexp,
            }
        };
        (params.mode() != CompressionMode::Null).then_some(params)
    }
}

/// Codec configuration plus the bit-cursor it reads and writes through.
///
/// In an array the cursor owns the compressed buffer, so the cursor's target
/// can never disagree with the array's data.
#[derive(Debug, Clone, Default)]
pub struct CodecStream {
    pub params: RateParams,
    pub bits: BitStream,
}

/// Points a [`CodecStream`] at a scratch buffer for as long as the guard
/// lives. The original target is restored on every exit path, including
/// early returns and unwinding.
pub struct StreamRedirect<'a> {
    stream: &'a mut CodecStream,
    saved: Option<BitStream>,
}

impl<'a> StreamRedirect<'a> {
    pub fn new(stream: &'a mut CodecStream, scratch: AlignedBuf) -> Self {
        let saved = mem::replace(&mut stream.bits, BitStream::new(scratch));
        Self {
            stream,
            saved: Some(saved),
        }
    }

    /// Restore the original target and hand back the scratch buffer.
    pub fn finish(mut self) -> AlignedBuf {
        self.restore().into_inner()
    }

    fn restore(&mut self) -> BitStream {
        match self.saved.take() {
            Some(saved) => mem::replace(&mut self.stream.bits, saved),
            None => BitStream::detached(),
        }
    }
}

impl Deref for StreamRedirect<'_> {
    type Target = CodecStream;

    fn deref(&self) -> &CodecStream {
        self.stream
    }
}

impl DerefMut for StreamRedirect<'_> {
    fn deref_mut(&mut self) -> &mut CodecStream {
        self.stream
    }
}

impl Drop for StreamRedirect<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
