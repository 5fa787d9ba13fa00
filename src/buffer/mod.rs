//
// Copyright (c) 2025 Nathan Fiedler
//

//! Growable array with bulk little-endian binary I/O.
//!
//! The index keeps its block hash log and the members of each duplicate
//! chain in these. Values are written back to back with no framing; the
//! element count is recorded elsewhere (in the index header or a chain
//! prefix) and must be supplied again when reading.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::ops::Index;

/// Upper bound on the number of elements reserved ahead of a bulk read, so a
/// corrupt count fails with a short read instead of a huge allocation.
const READ_RESERVE_LIMIT: usize = 1 << 20;

///
/// Unsigned word that can be stored in a [`SerializableVec`].
///
/// The on-disk width may be narrower than the in-memory type: a 64-bit hash
/// from a 32-bit algorithm is written as 4 bytes.
///
pub trait Word: Copy + Default + Eq + std::fmt::Debug {
    /// Natural on-disk width in bytes.
    const BYTES: usize;

    /// Write the low `width` bytes of the value, little-endian.
    fn write_word<W: Write>(self, writer: &mut W, width: usize) -> io::Result<()>;

    /// Read a little-endian value `width` bytes wide.
    fn read_word<R: Read>(reader: &mut R, width: usize) -> io::Result<Self>;
}

impl Word for u32 {
    const BYTES: usize = 4;

    fn write_word<W: Write>(self, writer: &mut W, width: usize) -> io::Result<()> {
        assert_eq!(width, 4, "u32 words are four bytes wide");
        writer.write_u32::<LittleEndian>(self)
    }

    fn read_word<R: Read>(reader: &mut R, width: usize) -> io::Result<Self> {
        assert_eq!(width, 4, "u32 words are four bytes wide");
        reader.read_u32::<LittleEndian>()
    }
}

impl Word for u64 {
    const BYTES: usize = 8;

    fn write_word<W: Write>(self, writer: &mut W, width: usize) -> io::Result<()> {
        match width {
            4 => writer.write_u32::<LittleEndian>(self as u32),
            8 => writer.write_u64::<LittleEndian>(self),
            _ => panic!("unsupported word width {width}"),
        }
    }

    fn read_word<R: Read>(reader: &mut R, width: usize) -> io::Result<Self> {
        match width {
            4 => reader.read_u32::<LittleEndian>().map(u64::from),
            8 => reader.read_u64::<LittleEndian>(),
            _ => panic!("unsupported word width {width}"),
        }
    }
}

///
/// A growable sequence of words that can be written to and read from a byte
/// stream in bulk.
///
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SerializableVec<T: Word> {
    items: Vec<T>,
}

impl<T: Word> SerializableVec<T> {
    /// Construct an empty vector.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Construct an empty vector with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append a value, growing the storage as needed.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    /// Ensure room for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.items.reserve(additional);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.items.get(index).copied()
    }

    pub fn first(&self) -> Option<T> {
        self.items.first().copied()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Write every element using its natural width.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_to_width(writer, T::BYTES)
    }

    /// Write every element `width` bytes wide.
    pub fn write_to_width<W: Write>(&self, writer: &mut W, width: usize) -> io::Result<()> {
        for value in &self.items {
            value.write_word(writer, width)?;
        }
        Ok(())
    }

    /// Append `count` elements of natural width read from `reader`.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, count: usize) -> io::Result<()> {
        self.read_from_width(reader, count, T::BYTES)
    }

    /// Append `count` elements, each `width` bytes wide, read from `reader`.
    ///
    /// A stream that ends early yields an `UnexpectedEof` error; elements
    /// read up to that point remain in the vector.
    pub fn read_from_width<R: Read>(
        &mut self,
        reader: &mut R,
        count: usize,
        width: usize,
    ) -> io::Result<()> {
        self.items.reserve(count.min(READ_RESERVE_LIMIT));
        for _ in 0..count {
            self.items.push(T::read_word(reader, width)?);
        }
        Ok(())
    }
}

impl<T: Word> Index<usize> for SerializableVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T: Word> From<Vec<T>> for SerializableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T: Word> FromIterator<T> for SerializableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T: Word> IntoIterator for &'a SerializableVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_push_and_index() {
        let mut vec: SerializableVec<u32> = SerializableVec::new();
        assert!(vec.is_empty());
        for i in 0..100 {
            vec.push(i * 3);
        }
        assert_eq!(vec.len(), 100);
        assert_eq!(vec[10], 30);
        assert_eq!(vec.get(99), Some(297));
        assert_eq!(vec.get(100), None);
        assert_eq!(vec.first(), Some(0));
        assert_eq!(vec.iter().copied().sum::<u32>(), 3 * 4950);
    }

    #[test]
    fn test_write_layout() {
        let vec = SerializableVec::from(vec![1u32, 0x0a0b0c0d]);
        let mut out: Vec<u8> = Vec::new();
        vec.write_to(&mut out).unwrap();
        assert_eq!(out, [1, 0, 0, 0, 0x0d, 0x0c, 0x0b, 0x0a]);
    }

    #[test]
    fn test_narrow_u64() {
        let vec = SerializableVec::from(vec![0xffff_ffffu64, 7]);
        let mut out: Vec<u8> = Vec::new();
        vec.write_to_width(&mut out, 4).unwrap();
        assert_eq!(out.len(), 8);
        let mut back: SerializableVec<u64> = SerializableVec::new();
        back.read_from_width(&mut Cursor::new(out), 2, 4).unwrap();
        assert_eq!(back, vec);
    }

    #[test]
    fn test_read_appends() {
        let mut back = SerializableVec::from(vec![5u64]);
        let source: SerializableVec<u64> = (10..20).collect();
        let mut out: Vec<u8> = Vec::new();
        source.write_to(&mut out).unwrap();
        back.read_from(&mut Cursor::new(out), 10).unwrap();
        assert_eq!(back.len(), 11);
        assert_eq!(back[0], 5);
        assert_eq!(back[1], 10);
    }

    #[test]
    fn test_short_read() {
        let bytes = [1u8, 0, 0, 0, 2, 0];
        let mut back: SerializableVec<u32> = SerializableVec::new();
        let err = back.read_from(&mut Cursor::new(bytes), 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(back.as_slice(), &[1]);
    }

    #[test]
    fn test_huge_count_fails_without_allocating() {
        let mut back: SerializableVec<u64> = SerializableVec::new();
        let result = back.read_from(&mut Cursor::new(vec![0u8; 16]), usize::MAX);
        assert!(result.is_err());
        assert_eq!(back.len(), 2);
    }

    #[test]
    #[should_panic]
    fn test_bad_width() {
        let vec = SerializableVec::from(vec![1u64]);
        let _ = vec.write_to_width(&mut Vec::new(), 3);
    }
}
