//! Deferred-decode constant pool: three parallel arrays indexed by pool
//! index instead of an eagerly-decoded `Vec<Entry>`. UTF-8 entries are
//! decoded on first reference and cached; everything else is a cheap
//! integer lookup until a caller actually asks for the decoded value.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, bail};

use super::reader::Cursor;

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// Slot 0 is unused (pool indices are 1-based); the slot immediately after a
/// long/double entry is a dead placeholder occupying its second slot.
const TAG_UNUSED: u8 = 0;

pub struct ConstantPool {
    bytes: Arc<[u8]>,
    tags: Vec<u8>,
    offsets: Vec<u32>,
    indirection: Vec<u32>,
    utf8_cache: Vec<OnceLock<Arc<str>>>,
}

impl ConstantPool {
    pub fn parse(cursor: &mut Cursor<'_>, bytes: Arc<[u8]>) -> Result<Self> {
        let count = cursor.read_u2()? as usize;
        let mut tags = vec![TAG_UNUSED; count];
        let mut offsets = vec![0u32; count];
        let mut indirection = vec![0u32; count];

        let mut index = 1usize;
        while index < count {
            let tag = cursor.read_u1()?;
            let offset = cursor.position() as u32;
            tags[index] = tag;
            offsets[index] = offset;

            match tag {
                TAG_UTF8 => {
                    let len = cursor.read_u2()? as usize;
                    cursor.skip(len)?;
                }
                TAG_INTEGER | TAG_FLOAT => {
                    cursor.skip(4)?;
                }
                TAG_LONG | TAG_DOUBLE => {
                    cursor.skip(8)?;
                    // the JVM spec reserves the following slot; mark it dead.
                    if index + 1 < count {
                        tags[index + 1] = TAG_UNUSED;
                    }
                    index += 1;
                }
                TAG_CLASS | TAG_STRING | TAG_METHOD_TYPE | TAG_MODULE | TAG_PACKAGE => {
                    let target = cursor.read_u2()? as u32;
                    indirection[index] = target;
                }
                TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF | TAG_INVOKE_DYNAMIC => {
                    let a = cursor.read_u2()? as u32;
                    let b = cursor.read_u2()? as u32;
                    indirection[index] = (a << 16) | b;
                }
                TAG_NAME_AND_TYPE => {
                    let name_index = cursor.read_u2()? as u32;
                    let descriptor_index = cursor.read_u2()? as u32;
                    indirection[index] = (name_index << 16) | descriptor_index;
                }
                TAG_METHOD_HANDLE => {
                    let reference_kind = cursor.read_u1()? as u32;
                    let reference_index = cursor.read_u2()? as u32;
                    indirection[index] = (reference_kind << 16) | reference_index;
                }
                other => bail!("unrecognized constant pool tag {other} at index {index}"),
            }
            index += 1;
        }

        let utf8_cache = (0..count).map(|_| OnceLock::new()).collect();

        Ok(Self {
            bytes,
            tags,
            offsets,
            indirection,
            utf8_cache,
        })
    }

    pub fn tag_at(&self, index: u16) -> Option<u8> {
        self.tags.get(index as usize).copied().filter(|t| *t != TAG_UNUSED)
    }

    /// Decode a UTF-8 entry by pool index, per the JVM's modified-UTF-8
    /// encoding, caching the result.
    pub fn utf8(&self, index: u16) -> Result<Arc<str>> {
        let idx = index as usize;
        if self.tags.get(idx).copied() != Some(TAG_UTF8) {
            bail!("constant pool index {index} is not a UTF-8 entry");
        }
        if let Some(cached) = self.utf8_cache[idx].get() {
            return Ok(Arc::clone(cached));
        }
        let offset = self.offsets[idx] as usize;
        let mut positioned = Cursor::new(&self.bytes[offset..]);
        let len = positioned.read_u2()? as usize;
        let raw = positioned.read_bytes(len)?;
        let decoded: Arc<str> = Arc::from(decode_modified_utf8(raw)?);
        let _ = self.utf8_cache[idx].set(Arc::clone(&decoded));
        Ok(decoded)
    }

    /// Decode a class entry's internal name (`java/lang/Object`), not yet
    /// dot-normalized.
    pub fn class_internal_name(&self, index: u16) -> Result<Arc<str>> {
        if self.tags.get(index as usize).copied() != Some(TAG_CLASS) {
            bail!("constant pool index {index} is not a class entry");
        }
        let utf8_index = self.indirection[index as usize] as u16;
        self.utf8(utf8_index)
    }

    pub fn string_value(&self, index: u16) -> Result<Arc<str>> {
        if self.tags.get(index as usize).copied() != Some(TAG_STRING) {
            bail!("constant pool index {index} is not a string entry");
        }
        let utf8_index = self.indirection[index as usize] as u16;
        self.utf8(utf8_index)
    }

    pub fn integer_value(&self, index: u16) -> Result<i32> {
        self.fixed_width_numeric(index, TAG_INTEGER, |mut c| c.read_i4())
    }

    pub fn float_value(&self, index: u16) -> Result<f32> {
        self.fixed_width_numeric(index, TAG_FLOAT, |mut c| c.read_f4())
    }

    pub fn long_value(&self, index: u16) -> Result<i64> {
        self.fixed_width_numeric(index, TAG_LONG, |mut c| c.read_i8())
    }

    pub fn double_value(&self, index: u16) -> Result<f64> {
        self.fixed_width_numeric(index, TAG_DOUBLE, |mut c| c.read_f8())
    }

    pub fn name_and_type(&self, index: u16) -> Result<(u16, u16)> {
        if self.tags.get(index as usize).copied() != Some(TAG_NAME_AND_TYPE) {
            bail!("constant pool index {index} is not a NameAndType entry");
        }
        let packed = self.indirection[index as usize];
        Ok(((packed >> 16) as u16, packed as u16))
    }

    fn fixed_width_numeric<T>(&self, index: u16, expected_tag: u8, read: impl Fn(Cursor<'_>) -> Result<T>) -> Result<T> {
        if self.tags.get(index as usize).copied() != Some(expected_tag) {
            bail!("constant pool index {index} has unexpected tag for numeric read");
        }
        let offset = self.offsets[index as usize] as usize;
        let cursor = Cursor::new(&self.bytes[offset..]);
        read(cursor).context("reading fixed-width constant pool entry")
    }
}

/// Decode a JVM "modified UTF-8" byte sequence: 1/2/3-byte sequences as in
/// standard UTF-8, plus a 6-byte encoding for supplementary-plane code
/// points (a surrogate pair, each half 3-byte-encoded).
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            out.push(b0 as char);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1).context("truncated modified utf-8 sequence")?;
            require_continuation(b1)?;
            let cp = (((b0 & 0x1F) as u32) << 6) | (b1 & 0x3F) as u32;
            out.push(char_from_cp(cp)?);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            if b0 == 0xED {
                if let Some(&b1) = bytes.get(i + 1) {
                    if b1 & 0xF0 == 0xA0 {
                        let b2 = *bytes.get(i + 2).context("truncated surrogate pair")?;
                        let b3 = *bytes.get(i + 3).context("truncated surrogate pair")?;
                        let b4 = *bytes.get(i + 4).context("truncated surrogate pair")?;
                        let b5 = *bytes.get(i + 5).context("truncated surrogate pair")?;
                        if b3 != 0xED || b4 & 0xF0 != 0xB0 {
                            bail!("malformed supplementary-plane modified utf-8 sequence");
                        }
                        require_continuation(b2)?;
                        require_continuation(b5)?;
                        let high = (b1 & 0x0F) as u32;
                        let mid = (b2 & 0x3F) as u32;
                        let low_hi = (b4 & 0x0F) as u32;
                        let low_lo = (b5 & 0x3F) as u32;
                        let cp = 0x10000 + ((high << 16) | (mid << 10) | (low_hi << 6) | low_lo);
                        out.push(char_from_cp(cp)?);
                        i += 6;
                        continue;
                    }
                }
            }
            let b1 = *bytes.get(i + 1).context("truncated modified utf-8 sequence")?;
            let b2 = *bytes.get(i + 2).context("truncated modified utf-8 sequence")?;
            require_continuation(b1)?;
            require_continuation(b2)?;
            let cp = (((b0 & 0x0F) as u32) << 12) | (((b1 & 0x3F) as u32) << 6) | (b2 & 0x3F) as u32;
            out.push(char_from_cp(cp)?);
            i += 3;
        } else {
            bail!("invalid modified utf-8 lead byte 0x{b0:02X}");
        }
    }
    Ok(out)
}

fn require_continuation(byte: u8) -> Result<()> {
    if byte & 0xC0 != 0x80 {
        bail!("expected modified utf-8 continuation byte, got 0x{byte:02X}");
    }
    Ok(())
}

fn char_from_cp(cp: u32) -> Result<char> {
    char::from_u32(cp).with_context(|| format!("invalid unicode code point U+{cp:04X} in modified utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii() {
        assert_eq!(decode_modified_utf8(b"Hello").unwrap(), "Hello");
    }

    #[test]
    fn decodes_two_byte_sequence() {
        // U+00E9 (e with acute) = 0xC3 0xA9 in standard (and modified) UTF-8.
        assert_eq!(decode_modified_utf8(&[0xC3, 0xA9]).unwrap(), "\u{e9}");
    }

    #[test]
    fn decodes_three_byte_sequence() {
        // U+20AC (euro sign) = 0xE2 0x82 0xAC.
        assert_eq!(decode_modified_utf8(&[0xE2, 0x82, 0xAC]).unwrap(), "\u{20AC}");
    }

    #[test]
    fn decodes_six_byte_supplementary_pair() {
        // U+1D11E (musical symbol G clef), modified-UTF-8 six-byte form.
        let bytes = [0xED, 0xA0, 0xB4, 0xED, 0xB4, 0x9E];
        assert_eq!(decode_modified_utf8(&bytes).unwrap(), "\u{1D11E}");
    }

    #[test]
    fn rejects_truncated_sequence() {
        assert!(decode_modified_utf8(&[0xC3]).is_err());
    }

    #[test]
    fn parses_minimal_pool_with_one_utf8_entry() {
        // pool_count=2, tag=1 (utf8), len=3, "Foo"
        let class_bytes: Vec<u8> = vec![0x00, 0x02, 0x01, 0x00, 0x03, b'F', b'o', b'o'];
        let bytes: Arc<[u8]> = Arc::from(class_bytes.into_boxed_slice());
        let mut cursor = Cursor::new(&bytes);
        let pool = ConstantPool::parse(&mut cursor, Arc::clone(&bytes)).expect("parse pool");
        assert_eq!(pool.utf8(1).unwrap().as_ref(), "Foo");
    }
}
