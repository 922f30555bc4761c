use crate::buffer::AlignedBuf;
use crate::format::STREAM_WORD_BITS;

const WORD_BITS: u32 = STREAM_WORD_BITS as u32;
const WORD_BYTES: usize = STREAM_WORD_BITS / 8;

#[inline]
fn low_mask(n: u32) -> u64 {
    if n >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Bit-granular read/write cursor over an owned [`AlignedBuf`].
///
/// Bits are packed least-significant first into 64-bit little-endian words.
/// The cursor is either reading (after [`rseek`](Self::rseek)/[`rewind`](Self::rewind))
/// or writing (after [`wseek`](Self::wseek)); a write session must end with
/// [`flush`](Self::flush). Words that extend past the end of the buffer are
/// truncated on write and read back as zero, so a stream may target a
/// buffer that is not a whole number of words long (e.g. a 12-byte header).
#[derive(Debug, Default, Clone)]
pub struct BitStream {
    buf: AlignedBuf,
    /// Index of the next word to load or store.
    word: usize,
    /// Number of valid bits in `buffer`.
    bits: u32,
    buffer: u64,
}

impl BitStream {
    pub fn new(buf: AlignedBuf) -> Self {
        Self {
            buf,
            word: 0,
            bits: 0,
            buffer: 0,
        }
    }

    /// A stream with no target buffer.
    pub fn detached() -> Self {
        Self::new(AlignedBuf::empty())
    }

    /// The target buffer.
    pub fn buffer(&self) -> &AlignedBuf {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut AlignedBuf {
        &mut self.buf
    }

    pub fn into_inner(self) -> AlignedBuf {
        self.buf
    }

    pub fn capacity_bits(&self) -> usize {
        self.buf.len() * 8
    }

    fn load_word(&self, index: usize) -> u64 {
        let start = index * WORD_BYTES;
        let mut bytes = [0u8; WORD_BYTES];
        if start < self.buf.len() {
            let end = (start + WORD_BYTES).min(self.buf.len());
            bytes[..end - start].copy_from_slice(&self.buf[start..end]);
        }
        u64::from_le_bytes(bytes)
    }

    fn store_word(&mut self, index: usize, value: u64) {
        let start = index * WORD_BYTES;
        if start >= self.buf.len() {
            return;
        }
        let end = (start + WORD_BYTES).min(self.buf.len());
        self.buf[start..end].copy_from_slice(&value.to_le_bytes()[..end - start]);
    }

    /// Append the low `n` bits of `value` (`n <= 64`).
    pub fn write_bits(&mut self, value: u64, n: u32) {
        debug_assert!(n <= WORD_BITS);
        if n == 0 {
            return;
        }
        let value = value & low_mask(n);
        self.buffer |= value << self.bits;
        let total = self.bits + n;
        if total >= WORD_BITS {
            self.store_word(self.word, self.buffer);
            self.word += 1;
            let consumed = WORD_BITS - self.bits;
            self.buffer = if consumed < WORD_BITS {
                value >> consumed
            } else {
                0
            };
            self.bits = total - WORD_BITS;
        } else {
            self.bits = total;
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Read the next `n` bits (`n <= 64`).
    pub fn read_bits(&mut self, n: u32) -> u64 {
        debug_assert!(n <= WORD_BITS);
        if n == 0 {
            return 0;
        }
        if self.bits >= n {
            let value = self.buffer & low_mask(n);
            self.buffer = if n < WORD_BITS { self.buffer >> n } else { 0 };
            self.bits -= n;
            value
        } else {
            let word = self.load_word(self.word);
            self.word += 1;
            let value = (self.buffer | (word << self.bits)) & low_mask(n);
            let used = n - self.bits;
            self.buffer = if used < WORD_BITS { word >> used } else { 0 };
            self.bits = WORD_BITS - used;
            value
        }
    }

    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    /// Write `n` zero bits.
    pub fn pad(&mut self, mut n: usize) {
        while n >= STREAM_WORD_BITS {
            self.write_bits(0, WORD_BITS);
            n -= STREAM_WORD_BITS;
        }
        self.write_bits(0, n as u32);
    }

    /// Skip `n` bits while reading.
    pub fn skip(&mut self, n: usize) {
        self.rseek(self.rtell() + n);
    }

    /// Position the read cursor at bit `offset`.
    pub fn rseek(&mut self, offset: usize) {
        self.word = offset / STREAM_WORD_BITS;
        let n = (offset % STREAM_WORD_BITS) as u32;
        if n > 0 {
            let word = self.load_word(self.word);
            self.word += 1;
            self.buffer = word >> n;
            self.bits = WORD_BITS - n;
        } else {
            self.buffer = 0;
            self.bits = 0;
        }
    }

    /// Position the write cursor at bit `offset`, keeping the bits below it
    /// in the containing word.
    pub fn wseek(&mut self, offset: usize) {
        self.word = offset / STREAM_WORD_BITS;
        let n = (offset % STREAM_WORD_BITS) as u32;
        if n > 0 {
            self.buffer = self.load_word(self.word) & low_mask(n);
            self.bits = n;
        } else {
            self.buffer = 0;
            self.bits = 0;
        }
    }

    /// Bit offset of the read cursor.
    pub fn rtell(&self) -> usize {
        self.word * STREAM_WORD_BITS - self.bits as usize
    }

    /// Bit offset of the write cursor.
    pub fn wtell(&self) -> usize {
        self.word * STREAM_WORD_BITS + self.bits as usize
    }

    pub fn rewind(&mut self) {
        self.word = 0;
        self.bits = 0;
        self.buffer = 0;
    }

    /// Store any partially filled word. Bits above the write cursor in that
    /// word are preserved, so blocks need not start on word boundaries.
    pub fn flush(&mut self) {
        if self.bits > 0 {
            let keep = self.load_word(self.word) & !low_mask(self.bits);
            self.store_word(self.word, keep | self.buffer);
            self.word += 1;
            self.bits = 0;
            self.buffer = 0;
        }
    }
}
