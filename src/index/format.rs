//
// Copyright (c) 2025 Nathan Fiedler
//

//! Binary layout of a saved [`DedupIndex`].
//!
//! All integers are little-endian. Hash values are as wide as the result of
//! the index's hash algorithm (4 or 8 bytes).
//!
//! | Section        | Contents                                               |
//! |----------------|--------------------------------------------------------|
//! | header         | 64 bytes, see [`Header`]                               |
//! | entry table    | `capacity` slots of hash, `u32` count, `u32` block     |
//! | block hashes   | `block_count` hash values                              |
//! | chain count    | `u32`                                                  |
//! | chains         | per chain: hash, `u32` length, `length` `u32` blocks   |
//!
//! The entry table is written verbatim, empty slots included, so it can be
//! used in place after loading without rehashing.
use super::{DedupIndex, DuplicateChain, Entry, MAX_CAPACITY, max_count_for};
use crate::buffer::{SerializableVec, Word};
use crate::error::{Error, Result};
use crate::hash::{BlockHasher, algorithm_name};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 64;
/// Marker at the start of every saved index.
pub const MAGIC: [u8; 4] = *b"ddup";
/// The only format version understood.
pub const FORMAT_VERSION: u32 = 0;

// entries reserved ahead of reading the table, whatever the header claims
const TABLE_RESERVE_LIMIT: usize = 1 << 20;

///
/// Decoded form of the 64-byte header.
///
/// | Offset | Size | Field                          |
/// |--------|------|--------------------------------|
/// | 0      | 4    | magic `ddup`                   |
/// | 4      | 4    | version (0)                    |
/// | 8      | 4    | block size                     |
/// | 12     | 4    | table capacity                 |
/// | 16     | 4    | filled entry count             |
/// | 20     | 4    | block hash count               |
/// | 24     | 1    | primary hash algorithm id      |
/// | 25     | 1    | secondary hash algorithm id (0)|
/// | 26     | 38   | zero                           |
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub version: u32,
    pub block_size: u32,
    pub capacity: u32,
    pub entry_count: u32,
    pub block_count: u32,
    pub primary_hash: u8,
    pub secondary_hash: u8,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.block_size);
        LittleEndian::write_u32(&mut buf[12..16], self.capacity);
        LittleEndian::write_u32(&mut buf[16..20], self.entry_count);
        LittleEndian::write_u32(&mut buf[20..24], self.block_count);
        buf[24] = self.primary_hash;
        buf[25] = self.secondary_hash;
        buf
    }

    /// Decode a header, checking only the magic marker.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            version: LittleEndian::read_u32(&buf[4..8]),
            block_size: LittleEndian::read_u32(&buf[8..12]),
            capacity: LittleEndian::read_u32(&buf[12..16]),
            entry_count: LittleEndian::read_u32(&buf[16..20]),
            block_count: LittleEndian::read_u32(&buf[20..24]),
            primary_hash: buf[24],
            secondary_hash: buf[25],
        })
    }
}

// Log a format failure on its way out.
fn fail(err: Error) -> Error {
    warn!("cannot load dedup index: {}", err);
    err
}

impl<H: BlockHasher> DedupIndex<H> {
    /// Header describing this index.
    pub fn header(&self) -> Header {
        Header {
            version: FORMAT_VERSION,
            block_size: self.block_size,
            capacity: self.capacity(),
            entry_count: self.entry_count,
            block_count: self.len() as u32,
            primary_hash: H::ALGORITHM.id(),
            secondary_hash: 0,
        }
    }

    /// Exact number of bytes [`write_to`](Self::write_to) produces.
    pub fn output_file_size(&self) -> u64 {
        let width = H::ALGORITHM.result_bytes() as u64;
        let chains: u64 = self
            .chains
            .iter()
            .map(|c| width + 4 + 4 * c.len() as u64)
            .sum();
        HEADER_SIZE as u64
            + self.capacity() as u64 * (width + 8)
            + self.len() as u64 * width
            + 4
            + chains
    }

    ///
    /// Serialize the index to `writer`, returning the number of bytes
    /// written.
    ///
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<u64> {
        let width = H::ALGORITHM.result_bytes();
        writer.write_all(&self.header().encode())?;
        info!("writing {} entries", self.capacity());
        for entry in &self.entries {
            entry.hash.write_word(&mut writer, width)?;
            writer.write_u32::<LittleEndian>(entry.count)?;
            writer.write_u32::<LittleEndian>(entry.block)?;
        }
        info!("writing {} hash values", self.len());
        self.block_hashes.write_to_width(&mut writer, width)?;
        info!("writing {} duplicate block chains", self.chains.len());
        writer.write_u32::<LittleEndian>(self.chains.len() as u32)?;
        for chain in &self.chains {
            chain.hash.write_word(&mut writer, width)?;
            writer.write_u32::<LittleEndian>(chain.len() as u32)?;
            chain.blocks.write_to(&mut writer)?;
        }
        writer.flush()?;
        Ok(self.output_file_size())
    }

    ///
    /// Deserialize an index from `reader`.
    ///
    /// Fails on a bad magic marker, a hash algorithm other than `H`, an
    /// unknown version, header counts that contradict each other or the
    /// table contents, or input that ends early.
    ///
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let alg = H::ALGORITHM;
        let width = alg.result_bytes();
        let mut buf = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut buf)
            .map_err(|e| fail(Error::from_read(e, "header")))?;
        let header = Header::decode(&buf).map_err(fail)?;
        if header.primary_hash != alg.id() {
            return Err(fail(Error::HashMismatch {
                found: algorithm_name(header.primary_hash),
                expected: alg.name(),
            }));
        }
        info!(
            "reading {} entries, {:.2} % filled",
            header.capacity,
            100.0 * header.entry_count as f64 / header.capacity.max(1) as f64
        );
        // lookups need an empty slot to stop at, so the table may be at
        // most as full as insert would leave it
        if header.entry_count > max_count_for(header.capacity) {
            return Err(fail(Error::Inconsistent(format!(
                "{} entries in a table of {}",
                header.entry_count, header.capacity
            ))));
        }
        if header.version != FORMAT_VERSION || header.secondary_hash != 0 {
            return Err(fail(Error::UnsupportedVersion {
                version: header.version,
                secondary: header.secondary_hash,
            }));
        }
        if !header.capacity.is_power_of_two() || header.capacity > MAX_CAPACITY {
            return Err(fail(Error::Inconsistent(format!(
                "table capacity {} is not a power of two up to {}",
                header.capacity, MAX_CAPACITY
            ))));
        }

        let capacity = header.capacity as usize;
        let mut entries = Vec::with_capacity(capacity.min(TABLE_RESERVE_LIMIT));
        for _ in 0..capacity {
            let entry = read_entry(&mut reader, width)
                .map_err(|e| fail(Error::from_read(e, "entries")))?;
            entries.push(entry);
        }

        info!("reading {} hash values", header.block_count);
        let mut block_hashes = SerializableVec::new();
        block_hashes
            .read_from_width(&mut reader, header.block_count as usize, width)
            .map_err(|e| fail(Error::from_read(e, "block hashes")))?;

        let chain_count = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| fail(Error::from_read(e, "chain count")))?;
        info!("reading {} duplicate block chains", chain_count);
        let mut chains = Vec::new();
        for _ in 0..chain_count {
            let chain = read_chain(&mut reader, width)
                .map_err(|e| fail(Error::from_read(e, "chains")))?;
            chains.push(chain);
        }

        let index = Self {
            block_size: header.block_size,
            entries,
            entry_count: header.entry_count,
            max_count: max_count_for(header.capacity),
            block_hashes,
            chains,
            _hasher: PhantomData,
        };
        index.check_consistency().map_err(fail)?;
        Ok(index)
    }

    // Cross-check the entry table against the chains and the hash log.
    fn check_consistency(&self) -> Result<()> {
        let mut filled = 0u32;
        for entry in self.entries.iter().filter(|e| !e.is_empty()) {
            filled += 1;
            if entry.count == 1 {
                if entry.block as usize >= self.len() {
                    return Err(Error::Inconsistent(format!(
                        "entry refers to block {} of {}",
                        entry.block,
                        self.len()
                    )));
                }
            } else {
                let chain = self.chains.get(entry.block as usize).ok_or_else(|| {
                    Error::Inconsistent(format!(
                        "entry refers to chain {} of {}",
                        entry.block,
                        self.chains.len()
                    ))
                })?;
                if chain.hash != entry.hash || chain.len() != entry.count as usize {
                    return Err(Error::Inconsistent(format!(
                        "chain {} does not match its entry",
                        entry.block
                    )));
                }
            }
        }
        if filled != self.entry_count {
            return Err(Error::Inconsistent(format!(
                "header claims {} entries but table holds {}",
                self.entry_count, filled
            )));
        }
        Ok(())
    }

    /// Save the index to the file at `path`, replacing any existing file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        info!("saving dedup index to {}", path.as_ref().display());
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))
    }

    /// Load an index previously saved with [`write_to_file`](Self::write_to_file).
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("loading dedup index from {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file))
    }
}

fn read_entry<R: Read>(reader: &mut R, width: usize) -> std::io::Result<Entry> {
    let hash = u64::read_word(reader, width)?;
    let count = reader.read_u32::<LittleEndian>()?;
    let block = reader.read_u32::<LittleEndian>()?;
    Ok(Entry { hash, count, block })
}

fn read_chain<R: Read>(reader: &mut R, width: usize) -> std::io::Result<DuplicateChain> {
    let hash = u64::read_word(reader, width)?;
    let len = reader.read_u32::<LittleEndian>()?;
    let mut blocks = SerializableVec::new();
    blocks.read_from(reader, len as usize)?;
    Ok(DuplicateChain::from_blocks(hash, blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Fnv32, Rolling64};
    use crate::index::MAX_LOAD_FACTOR;
    use rand::{RngCore, SeedableRng, rngs::StdRng};
    use std::io::Cursor;

    fn sample_index() -> DedupIndex {
        let mut rng = StdRng::seed_from_u64(21);
        let mut blocks = vec![[0u8; 256]; 40];
        for block in blocks.iter_mut() {
            rng.fill_bytes(block);
        }
        let mut index: DedupIndex = DedupIndex::new(256);
        for i in 0..200usize {
            // a mix of unique blocks and repeats of the first few
            let block = if i % 3 == 0 { &blocks[i % 5] } else { &blocks[i % 40] };
            index.add_block(block);
        }
        index
    }

    fn to_bytes<H: BlockHasher>(index: &DedupIndex<H>) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        let written = index.write_to(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        out
    }

    #[test]
    fn test_header_layout() {
        let header = Header {
            version: 0,
            block_size: 4096,
            capacity: 128,
            entry_count: 17,
            block_count: 20,
            primary_hash: 5,
            secondary_hash: 0,
        };
        let buf = header.encode();
        assert_eq!(&buf[0..4], b"ddup");
        assert_eq!(&buf[8..12], &[0, 16, 0, 0]);
        assert_eq!(&buf[12..16], &[128, 0, 0, 0]);
        assert_eq!(buf[16], 17);
        assert_eq!(buf[20], 20);
        assert_eq!(buf[24], 5);
        assert!(buf[25..].iter().all(|&b| b == 0));
        assert_eq!(Header::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        assert!(!index.chains().is_empty());
        let bytes = to_bytes(&index);
        assert_eq!(bytes.len() as u64, index.output_file_size());
        let loaded: DedupIndex = DedupIndex::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.capacity(), index.capacity());
        assert_eq!(loaded.unique_count(), index.unique_count());
        assert_eq!(loaded.block_size(), 256);
        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.block_hashes(), index.block_hashes());
        assert_eq!(loaded.chains(), index.chains());
        for (block, &hash) in index.block_hashes().iter().enumerate() {
            assert!(loaded.contains_block(hash, block as u32));
        }
    }

    #[test]
    fn test_loaded_index_keeps_growing() {
        let index = sample_index();
        let bytes = to_bytes(&index);
        let mut loaded: DedupIndex = DedupIndex::read_from(Cursor::new(bytes)).unwrap();
        let before = loaded.len() as u32;
        for i in 0..500u64 {
            loaded.insert(i * 7919 + 1);
        }
        assert_eq!(loaded.find_first_match(1), Some(before));
        assert!(loaded.load_factor() <= MAX_LOAD_FACTOR);
    }

    #[test]
    fn test_narrow_hash_entries() {
        let mut index: DedupIndex<Fnv32> = DedupIndex::new(4);
        index.add_block(b"abcd");
        index.add_block(b"abcd");
        let bytes = to_bytes(&index);
        // 64 + 4 slots of 12 bytes + 2 hashes of 4 + count + one chain
        assert_eq!(bytes.len(), 64 + 48 + 8 + 4 + 4 + 4 + 8);
        let loaded: DedupIndex<Fnv32> = DedupIndex::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.find_all_matches_data(b"abcd", 5), Some(vec![0, 1]));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = to_bytes(&sample_index());
        bytes[0] = b'x';
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::BadMagic));
    }

    #[test]
    fn test_hash_mismatch() {
        let mut index: DedupIndex<Fnv32> = DedupIndex::new(4);
        index.add_block(b"abcd");
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(to_bytes(&index))).unwrap_err();
        assert!(matches!(
            err,
            Error::HashMismatch {
                found: "FNV32",
                expected: "Rolling64"
            }
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = to_bytes(&sample_index());
        bytes[4] = 1;
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes.clone())).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version: 1, .. }));
        bytes[4] = 0;
        bytes[25] = 2;
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { secondary: 2, .. }));
    }

    #[test]
    fn test_inconsistent_counts() {
        let index = sample_index();
        let mut bytes = to_bytes(&index);
        LittleEndian::write_u32(&mut bytes[16..20], index.capacity() + 1);
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes.clone())).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
        LittleEndian::write_u32(&mut bytes[16..20], index.unique_count() - 1);
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }

    #[test]
    fn test_full_table_is_rejected() {
        // two slots, both filled, leaves probing nowhere to stop
        let mut index: DedupIndex = DedupIndex::with_capacity(4, 2);
        index.entries[0] = Entry {
            hash: 2,
            count: 1,
            block: 0,
        };
        index.entries[1] = Entry {
            hash: 1,
            count: 1,
            block: 1,
        };
        index.entry_count = 2;
        index.block_hashes = SerializableVec::from(vec![2u64, 1]);
        let bytes = to_bytes(&index);
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }

    #[test]
    fn test_table_at_load_limit_loads() {
        let mut index: DedupIndex = DedupIndex::with_capacity(4, 8);
        for hash in 1..=4u64 {
            index.insert(hash);
        }
        assert_eq!(index.capacity(), 8);
        assert_eq!(index.unique_count(), 4);
        let loaded: DedupIndex = DedupIndex::read_from(Cursor::new(to_bytes(&index))).unwrap();
        assert_eq!(loaded.find_first_match(3), Some(2));
        assert_eq!(loaded.find_first_match(9), None);
    }

    #[test]
    fn test_truncated() {
        let bytes = to_bytes(&sample_index());
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(&bytes[..30])).unwrap_err();
        assert!(matches!(err, Error::Truncated { what: "header" }));
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(&bytes[..100])).unwrap_err();
        assert!(matches!(err, Error::Truncated { what: "entries" }));
        let err = DedupIndex::<Rolling64>::read_from(Cursor::new(&bytes[..bytes.len() - 1]))
            .unwrap_err();
        assert!(matches!(err, Error::Truncated { what: "chains" }));
    }

    #[test]
    fn test_file_round_trip() {
        let index = sample_index();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.ddup");
        let written = index.write_to_file(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), written);
        let loaded: DedupIndex = DedupIndex::read_from_file(&path).unwrap();
        assert_eq!(loaded.chains(), index.chains());
        assert_eq!(loaded.stats(), index.stats());
        let missing = dir.path().join("missing.ddup");
        assert!(matches!(
            DedupIndex::<Rolling64>::read_from_file(missing),
            Err(Error::Io(_))
        ));
    }
}
