//! Bounds-checked flatbuffer access without generated code
//!
//! Reading goes through [`Table`] and [`Vector`], which check every access
//! against the underlying slice so a truncated or hostile file produces an
//! error instead of a panic. [`ByteWriter`] assembles raw flatbuffer bytes
//! front to back, for the cases where the builder cannot be used because
//! the new tables must reference existing data.

use flatbuffers::VOffsetT;
use thiserror::Error;

/// Errors raised while decoding flatbuffer bytes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlatbufferError {
    #[error("read of {len} bytes at offset {offset} is out of bounds ({size} bytes available)")]
    OutOfBounds { offset: usize, len: usize, size: usize },
    #[error("file identifier mismatch: expected {expected:?}, found {found:?}")]
    Identifier { expected: String, found: String },
    #[error("malformed vtable for table at offset {0}")]
    BadVTable(usize),
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

type Result<T> = std::result::Result<T, FlatbufferError>;

fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(FlatbufferError::OutOfBounds { offset, len, size: buf.len() })
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(buf, offset, N)?);
    Ok(out)
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    read_array(buf, offset).map(u16::from_le_bytes)
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    read_array(buf, offset).map(u32::from_le_bytes)
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    read_array(buf, offset).map(i32::from_le_bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    read_array(buf, offset).map(u64::from_le_bytes)
}

fn read_f32(buf: &[u8], offset: usize) -> Result<f32> {
    read_array(buf, offset).map(f32::from_le_bytes)
}

/// Follows the unsigned offset stored at `offset`
fn follow(buf: &[u8], offset: usize) -> Result<usize> {
    let relative = read_u32(buf, offset)? as usize;
    let target = offset
        .checked_add(relative)
        .ok_or(FlatbufferError::OutOfBounds { offset, len: relative, size: buf.len() })?;

    if target >= buf.len() {
        return Err(FlatbufferError::OutOfBounds { offset: target, len: 1, size: buf.len() });
    }

    Ok(target)
}

fn read_string(buf: &[u8], offset: usize) -> Result<&str> {
    let len = read_u32(buf, offset)? as usize;
    let bytes = slice(buf, offset + 4, len)?;
    std::str::from_utf8(bytes).map_err(|_| FlatbufferError::InvalidUtf8(offset))
}

/// Returns the file identifier of a finished flatbuffer
pub fn file_identifier(buf: &[u8]) -> Result<&[u8]> {
    slice(buf, 4, 4)
}

/// Resolves the root table, optionally checking the file identifier
pub fn root_table<'a>(buf: &'a [u8], identifier: Option<&str>) -> Result<Table<'a>> {
    if let Some(expected) = identifier {
        let found = file_identifier(buf)?;
        if found != expected.as_bytes() {
            return Err(FlatbufferError::Identifier {
                expected: expected.to_string(),
                found: String::from_utf8_lossy(found).into_owned(),
            });
        }
    }

    Table::at(buf, follow(buf, 0)?)
}

/// A table inside a flatbuffer
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    buf: &'a [u8],
    loc: usize,
    vtable: usize,
    vtable_len: usize,
}

impl<'a> Table<'a> {
    /// Opens the table at `loc`, validating its vtable header
    pub fn at(buf: &'a [u8], loc: usize) -> Result<Self> {
        let soffset = read_i32(buf, loc)? as i64;
        let vtable = loc as i64 - soffset;
        if vtable < 0 {
            return Err(FlatbufferError::BadVTable(loc));
        }
        let vtable = vtable as usize;

        let vtable_len = read_u16(buf, vtable)? as usize;
        if vtable_len < 4 || vtable_len % 2 != 0 {
            return Err(FlatbufferError::BadVTable(loc));
        }
        slice(buf, vtable, vtable_len)?;

        Ok(Self { buf, loc, vtable, vtable_len })
    }

    /// Absolute position of the table
    pub fn location(&self) -> usize {
        self.loc
    }

    /// Highest vtable offset this table has room for, exclusive
    pub fn slot_end(&self) -> VOffsetT {
        self.vtable_len as VOffsetT
    }

    /// Absolute position of a field, `None` when absent
    pub fn field_position(&self, slot: VOffsetT) -> Result<Option<usize>> {
        let slot = slot as usize;
        if slot + 2 > self.vtable_len {
            return Ok(None);
        }

        match read_u16(self.buf, self.vtable + slot)? {
            0 => Ok(None),
            relative => Ok(Some(self.loc + relative as usize)),
        }
    }

    pub fn u8(&self, slot: VOffsetT, default: u8) -> Result<u8> {
        match self.field_position(slot)? {
            Some(pos) => Ok(slice(self.buf, pos, 1)?[0]),
            None => Ok(default),
        }
    }

    pub fn i8(&self, slot: VOffsetT, default: i8) -> Result<i8> {
        self.u8(slot, default as u8).map(|v| v as i8)
    }

    pub fn u32(&self, slot: VOffsetT, default: u32) -> Result<u32> {
        match self.field_position(slot)? {
            Some(pos) => read_u32(self.buf, pos),
            None => Ok(default),
        }
    }

    pub fn u64(&self, slot: VOffsetT, default: u64) -> Result<u64> {
        match self.field_position(slot)? {
            Some(pos) => read_u64(self.buf, pos),
            None => Ok(default),
        }
    }

    /// Absolute position of the object an offset field points at
    pub fn target(&self, slot: VOffsetT) -> Result<Option<usize>> {
        match self.field_position(slot)? {
            Some(pos) => follow(self.buf, pos).map(Some),
            None => Ok(None),
        }
    }

    pub fn table(&self, slot: VOffsetT) -> Result<Option<Table<'a>>> {
        match self.target(slot)? {
            Some(pos) => Table::at(self.buf, pos).map(Some),
            None => Ok(None),
        }
    }

    pub fn vector(&self, slot: VOffsetT) -> Result<Option<Vector<'a>>> {
        match self.target(slot)? {
            Some(pos) => Vector::at(self.buf, pos).map(Some),
            None => Ok(None),
        }
    }

    pub fn string(&self, slot: VOffsetT) -> Result<Option<&'a str>> {
        match self.target(slot)? {
            Some(pos) => read_string(self.buf, pos).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Table::string`] but owned
    pub fn owned_string(&self, slot: VOffsetT) -> Result<Option<String>> {
        self.string(slot).map(|s| s.map(str::to_string))
    }
}

/// A vector inside a flatbuffer
#[derive(Debug, Clone, Copy)]
pub struct Vector<'a> {
    buf: &'a [u8],
    loc: usize,
    len: usize,
}

impl<'a> Vector<'a> {
    /// Opens the vector whose length prefix is at `loc`
    pub fn at(buf: &'a [u8], loc: usize) -> Result<Self> {
        let len = read_u32(buf, loc)? as usize;
        // Every element is at least one byte.
        slice(buf, loc + 4, len)?;
        Ok(Self { buf, loc, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn element(&self, index: usize, size: usize) -> Result<usize> {
        if index >= self.len {
            return Err(FlatbufferError::OutOfBounds {
                offset: index,
                len: 1,
                size: self.len,
            });
        }
        let pos = self.loc + 4 + index * size;
        slice(self.buf, pos, size)?;
        Ok(pos)
    }

    /// Raw bytes of a `[ubyte]` vector
    pub fn bytes(&self) -> Result<&'a [u8]> {
        slice(self.buf, self.loc + 4, self.len)
    }

    /// Absolute position of the first element
    pub fn data_position(&self) -> usize {
        self.loc + 4
    }

    pub fn i32s(&self) -> Result<Vec<i32>> {
        (0..self.len).map(|i| read_i32(self.buf, self.element(i, 4)?)).collect()
    }

    pub fn f32s(&self) -> Result<Vec<f32>> {
        (0..self.len).map(|i| read_f32(self.buf, self.element(i, 4)?)).collect()
    }

    /// Absolute position of the table referenced by element `index`
    pub fn table_position(&self, index: usize) -> Result<usize> {
        follow(self.buf, self.element(index, 4)?)
    }

    pub fn table(&self, index: usize) -> Result<Table<'a>> {
        Table::at(self.buf, self.table_position(index)?)
    }

    pub fn tables(&self) -> Result<Vec<Table<'a>>> {
        (0..self.len).map(|i| self.table(i)).collect()
    }

    pub fn strings(&self) -> Result<Vec<String>> {
        (0..self.len)
            .map(|i| {
                let target = follow(self.buf, self.element(i, 4)?)?;
                read_string(self.buf, target).map(str::to_string)
            })
            .collect()
    }
}

/// Front-to-back flatbuffer assembly with deferred offset patching
#[derive(Debug, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Pads with zeros until the length is a multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        while self.bytes.len() % alignment != 0 {
            self.bytes.push(0);
        }
    }

    /// Pads with zeros until `len() + lead` is a multiple of `alignment`
    pub fn align_after(&mut self, lead: usize, alignment: usize) {
        while (self.bytes.len() + lead) % alignment != 0 {
            self.bytes.push(0);
        }
    }

    pub fn push_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn push_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn push_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Reserves a u32 and returns its position
    pub fn placeholder(&mut self) -> usize {
        let pos = self.bytes.len();
        self.push_u32(0);
        pos
    }

    /// Overwrites a u32 slot
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrites a u16 slot
    pub fn patch_u16(&mut self, at: usize, value: u16) {
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Makes the placeholder at `at` an unsigned offset to the absolute position `target`
    pub fn patch_uoffset(&mut self, at: usize, target: usize) {
        debug_assert!(target > at, "flatbuffer offsets only point forward");
        self.patch_u32(at, (target - at) as u32);
    }

    /// Writes a string object and returns its position
    pub fn push_string(&mut self, value: &str) -> usize {
        self.align(4);
        let pos = self.len();
        self.push_u32(value.len() as u32);
        self.push_bytes(value.as_bytes());
        self.bytes.push(0);
        pos
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatbuffers::FlatBufferBuilder;

    fn sample() -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();
        let name = fbb.create_string("leaf");
        let values = fbb.create_vector(&[1.5f32, -2.0]);
        let start = fbb.start_table();
        fbb.push_slot_always(4, name);
        fbb.push_slot::<u32>(6, 7, 0);
        fbb.push_slot_always(8, values);
        let root = fbb.end_table(start);
        fbb.finish(root, Some("TEST"));
        fbb.finished_data().to_vec()
    }

    #[test]
    fn reads_builder_output() {
        let buf = sample();
        let root = root_table(&buf, Some("TEST")).unwrap();

        assert_eq!(root.string(4).unwrap(), Some("leaf"));
        assert_eq!(root.u32(6, 0).unwrap(), 7);
        assert_eq!(root.vector(8).unwrap().unwrap().f32s().unwrap(), vec![1.5, -2.0]);
        assert_eq!(root.u32(10, 99).unwrap(), 99);
        assert!(root.string(40).unwrap().is_none());
    }

    #[test]
    fn wrong_identifier_is_reported() {
        let buf = sample();
        let err = root_table(&buf, Some("TFL3")).unwrap_err();
        assert!(matches!(err, FlatbufferError::Identifier { .. }));
    }

    #[test]
    fn truncated_buffer_is_out_of_bounds() {
        let buf = sample();
        let truncated = &buf[..buf.len() / 2];
        let result = root_table(truncated, None).and_then(|t| t.string(4));
        assert!(result.is_err());
    }

    #[test]
    fn writer_patches_forward_offsets() {
        let mut w = ByteWriter::new();
        let slot = w.placeholder();
        let target = w.push_string("abc");
        w.patch_uoffset(slot, target);

        let bytes = w.into_bytes();
        assert_eq!(read_u32(&bytes, slot).unwrap() as usize, target - slot);
        assert_eq!(read_string(&bytes, target).unwrap(), "abc");
    }
}
