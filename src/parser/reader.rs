//! Growable, reusable byte buffer for a single class file, plus the cursor
//! primitives the rest of the parser reads through.

use std::io::Read;

use anyhow::{Context, Result, bail};

const INITIAL_CAPACITY: usize = 16 * 1024;
const GROWTH_FACTOR: usize = 2;
const MAX_CAPACITY: usize = 2 * 1024 * 1024 * 1024;
const MIN_REFILL_CHUNK: usize = 4 * 1024;

/// A reusable byte buffer with two cursors: `used` (bytes filled so far) and
/// `curr` (bytes consumed so far). Grows geometrically up to a hard cap;
/// reused across class files in the same parser instance via [`reset`].
///
/// [`reset`]: ClassBuffer::reset
pub struct ClassBuffer {
    data: Vec<u8>,
    used: usize,
    curr: usize,
}

impl ClassBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; INITIAL_CAPACITY],
            used: 0,
            curr: 0,
        }
    }

    pub fn reset(&mut self) {
        self.used = 0;
        self.curr = 0;
    }

    /// Read `source` to exhaustion into the buffer, growing as needed.
    pub fn load_all(&mut self, mut source: impl Read) -> Result<()> {
        self.reset();
        loop {
            if self.used == self.data.len() {
                self.grow()?;
            }
            let want = (self.data.len() - self.used).max(MIN_REFILL_CHUNK).min(self.data.len() - self.used);
            let n = source.read(&mut self.data[self.used..self.used + want]).context("reading class file bytes")?;
            if n == 0 {
                break;
            }
            self.used += n;
        }
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let new_cap = (self.data.len() * GROWTH_FACTOR).min(MAX_CAPACITY);
        if new_cap <= self.data.len() {
            bail!("class file exceeds the {MAX_CAPACITY}-byte parser buffer cap");
        }
        self.data.resize(new_cap, 0);
        Ok(())
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.used]
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            bytes: &self.data[..self.used],
            pos: self.curr,
        }
    }
}

impl Default for ClassBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A read cursor over an already-filled byte slice. Mirrors the shape used
/// for decoding elsewhere in this codebase: fixed-width big-endian reads,
/// explicit bounds checks, no panics on truncated input.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn read_u1(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).context("unexpected end of class file")?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u2(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_n::<2>()?))
    }

    pub fn read_u4(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_n::<4>()?))
    }

    pub fn read_i4(&mut self) -> Result<i32> {
        Ok(self.read_u4()? as i32)
    }

    pub fn read_f4(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u4()?))
    }

    pub fn read_i8(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_n::<8>()?))
    }

    pub fn read_f8(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_n::<8>()?)))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).context("class file length overflow")?;
        if end > self.bytes.len() {
            bail!("unexpected end of class file");
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len)?;
        Ok(())
    }

    fn read_n<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos.checked_add(N).context("class file length overflow")?;
        if end > self.bytes.len() {
            bail!("unexpected end of class file");
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_all_grows_past_initial_capacity() {
        let payload = vec![0xABu8; INITIAL_CAPACITY * 3 + 17];
        let mut buffer = ClassBuffer::new();
        buffer.load_all(payload.as_slice()).expect("load");
        assert_eq!(buffer.filled().len(), payload.len());
        assert_eq!(buffer.filled(), payload.as_slice());
    }

    #[test]
    fn reset_allows_reuse_for_a_smaller_file() {
        let mut buffer = ClassBuffer::new();
        buffer.load_all([1u8, 2, 3].as_slice()).expect("load");
        assert_eq!(buffer.filled().len(), 3);
        buffer.reset();
        buffer.load_all([9u8].as_slice()).expect("load");
        assert_eq!(buffer.filled(), &[9u8]);
    }

    #[test]
    fn cursor_reads_big_endian_integers() {
        let mut cursor = Cursor::new(&[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(cursor.read_u4().unwrap(), 0xCAFEBABE);
    }

    #[test]
    fn cursor_reports_truncation() {
        let mut cursor = Cursor::new(&[0x00]);
        assert!(cursor.read_u2().is_err());
    }
}
