//
// Copyright (c) 2025 Nathan Fiedler
//

//! Deduplication index mapping block hashes to block numbers.
//!
//! Blocks are numbered in the order they are added, starting at zero. The
//! index keeps three structures:
//!
//! * the block hash log, where position `i` holds the hash of block `i`;
//! * an open addressing table of [`Entry`] slots keyed by hash, probed
//!   linearly from `hash & (capacity - 1)`;
//! * a list of [`DuplicateChain`] values, one for every hash seen more than
//!   once, holding the numbers of all blocks with that hash.
//!
//! A hash value of zero marks an empty slot, so every hash passed in is
//! first narrowed to the width of the algorithm and a zero result replaced
//! by all ones. All public methods apply this themselves.
//!
//! The table doubles whenever an insert finds it at the maximum load factor.
//! It never shrinks, and growing past [`MAX_CAPACITY`] slots is fatal: block
//! numbers and slot counts are 32 bits wide in the saved format, so there is
//! nowhere left to go.
//!
//! ```
//! use varchunk::index::DedupIndex;
//!
//! let mut index: DedupIndex = DedupIndex::new(4);
//! let first = index.add_block(b"abcd");
//! index.add_block(b"wxyz");
//! let third = index.add_block(b"abcd");
//! assert_eq!(index.find_all_matches_data(b"abcd", 10), Some(vec![first, third]));
//! ```
use crate::buffer::SerializableVec;
use crate::error::{Error, Result};
use crate::hash::{BlockHasher, DefaultHasher};
use log::{debug, error, info};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::Path;

pub mod format;

/// Slots in a table created with [`DedupIndex::new`].
pub const INITIAL_CAPACITY: u32 = 4;
/// Slots in a table built from a large file, before any growth.
pub const EMPTY_INDEX_CAPACITY: u32 = 128;
/// Fraction of slots that may be filled before the table doubles.
pub const MAX_LOAD_FACTOR: f64 = 0.5;
/// Hard ceiling on the number of slots.
pub const MAX_CAPACITY: u32 = 0x8000_0000;

/// Bytes read at a time when indexing a stream.
const READ_BATCH_SIZE: usize = 1_048_576;
/// Streams with fewer blocks than this are pre-sized from their length.
const SMALL_FILE_BLOCKS: u64 = 100;

///
/// A slot of the open addressing table.
///
/// An empty slot has a `hash` of zero. When `count` is one, `block` is the
/// number of the only block with this hash; otherwise it is the position of
/// the hash's [`DuplicateChain`].
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Entry {
    pub hash: u64,
    pub count: u32,
    pub block: u32,
}

impl Entry {
    pub fn is_empty(&self) -> bool {
        self.hash == 0
    }
}

///
/// The blocks sharing one hash, in the order they were added.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DuplicateChain {
    hash: u64,
    blocks: SerializableVec<u32>,
    // true while every block number is larger than the one before it
    sorted: bool,
}

impl DuplicateChain {
    fn pair(hash: u64, first: u32, second: u32) -> Self {
        let mut blocks = SerializableVec::with_capacity(2);
        blocks.push(first);
        blocks.push(second);
        Self {
            hash,
            blocks,
            sorted: first < second,
        }
    }

    fn from_blocks(hash: u64, blocks: SerializableVec<u32>) -> Self {
        let sorted = blocks.as_slice().windows(2).all(|w| w[0] < w[1]);
        Self {
            hash,
            blocks,
            sorted,
        }
    }

    fn push(&mut self, block: u32) {
        if let Some(&last) = self.blocks.as_slice().last() {
            self.sorted &= last < block;
        }
        self.blocks.push(block);
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Block numbers in arrival order.
    pub fn blocks(&self) -> &[u32] {
        self.blocks.as_slice()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True if the block numbers are strictly ascending.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Membership test; binary search when ascending, linear scan otherwise.
    pub fn contains(&self, block: u32) -> bool {
        if self.sorted {
            self.blocks.as_slice().binary_search(&block).is_ok()
        } else {
            self.blocks.iter().any(|&b| b == block)
        }
    }
}

///
/// Open addressing hash index from block hash to block number.
///
/// The hash algorithm is fixed by the `H` type parameter and recorded in
/// saved indexes; see [`format`].
///
#[derive(Clone, Debug)]
pub struct DedupIndex<H: BlockHasher = DefaultHasher> {
    block_size: u32,
    entries: Vec<Entry>,
    entry_count: u32,
    max_count: u32,
    block_hashes: SerializableVec<u64>,
    chains: Vec<DuplicateChain>,
    _hasher: PhantomData<H>,
}

impl<H: BlockHasher> DedupIndex<H> {
    ///
    /// Construct an empty index of [`INITIAL_CAPACITY`] slots.
    ///
    /// `block_size` is the length of the fixed size blocks the index will
    /// hold, or zero if blocks vary in length (content defined chunks).
    ///
    pub fn new(block_size: u32) -> Self {
        Self::with_capacity(block_size, INITIAL_CAPACITY)
    }

    ///
    /// Construct an empty index with exactly `capacity` slots.
    ///
    /// Panics unless `capacity` is a power of two no larger than
    /// [`MAX_CAPACITY`].
    ///
    pub fn with_capacity(block_size: u32, capacity: u32) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "capacity must be a power of two"
        );
        assert!(capacity <= MAX_CAPACITY);
        Self {
            block_size,
            entries: vec![Entry::default(); capacity as usize],
            entry_count: 0,
            max_count: max_count_for(capacity),
            block_hashes: SerializableVec::new(),
            chains: Vec::new(),
            _hasher: PhantomData,
        }
    }

    /// Construct an empty index sized to hold `expected` distinct hashes
    /// without growing.
    pub fn with_expected_entries(block_size: u32, expected: u32) -> Self {
        let wanted = (expected as f64 / MAX_LOAD_FACTOR) as u64 + 10;
        Self::with_capacity(block_size, round_up_size(wanted))
    }

    ///
    /// Build an index of `reader` split into `block_size` byte blocks.
    ///
    /// The data is consumed in batches of about 1 MiB. A final partial block
    /// is padded with zero bytes to the full block size before hashing.
    ///
    pub fn from_reader<R: Read>(reader: R, block_size: u32) -> Result<Self> {
        assert!(block_size > 0, "block size must be positive");
        let mut index = Self::with_capacity(block_size, EMPTY_INDEX_CAPACITY);
        index.add_blocks_from(reader)?;
        Ok(index)
    }

    ///
    /// Build an index of the file at `path` split into `block_size` byte
    /// blocks, as with [`from_reader`](Self::from_reader).
    ///
    /// Files with more than 2^32 blocks are rejected. Files of fewer than
    /// 100 blocks get a table sized for a quarter of their block count.
    ///
    pub fn from_file<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Self> {
        assert!(block_size > 0, "block size must be positive");
        let file = File::open(path.as_ref())?;
        let file_size = file.metadata()?.len();
        if (file_size >> 32) > block_size as u64 {
            return Err(Error::TooLarge {
                file_size,
                block_size,
            });
        }
        let block_count = file_size.div_ceil(block_size as u64);
        let mut index = if block_count < SMALL_FILE_BLOCKS {
            Self::with_expected_entries(block_size, (block_count / 4) as u32)
        } else {
            Self::with_capacity(block_size, EMPTY_INDEX_CAPACITY)
        };
        info!(
            "indexing {} ({} bytes) in {}-byte blocks",
            path.as_ref().display(),
            file_size,
            block_size
        );
        index.add_blocks_from(file)?;
        Ok(index)
    }

    fn add_blocks_from<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let block_size = self.block_size as usize;
        let batch_blocks = (READ_BATCH_SIZE / block_size).max(1);
        let mut buffer = vec![0u8; batch_blocks * block_size];
        let mut total: u64 = 0;
        loop {
            let filled = read_full(&mut reader, &mut buffer)?;
            if filled == 0 {
                break;
            }
            total += filled as u64;
            let padded = filled.div_ceil(block_size) * block_size;
            buffer[filled..padded].fill(0);
            for block in buffer[..padded].chunks_exact(block_size) {
                self.add_block(block);
            }
            debug!("{} bytes indexed", total);
            if filled < buffer.len() {
                break;
            }
        }
        Ok(())
    }

    ///
    /// Record the next block, identified by its hash, and return the block
    /// number it was given.
    ///
    /// Block numbers are assigned consecutively, so the result always equals
    /// [`len`](Self::len) before the call.
    ///
    pub fn insert(&mut self, hash: u64) -> u32 {
        let hash = normalize::<H>(hash);
        if self.entry_count >= self.max_count {
            self.grow(self.capacity() as u64 * 2);
        }
        let Ok(block) = u32::try_from(self.block_hashes.len()) else {
            error!("block numbers exhausted at {} blocks", self.len());
            panic!("dedup index cannot number more than 2^32 blocks");
        };
        self.block_hashes.push(hash);
        let slot = self.probe(hash);
        let entry = &mut self.entries[slot];
        if entry.is_empty() {
            *entry = Entry {
                hash,
                count: 1,
                block,
            };
            self.entry_count += 1;
        } else {
            entry.count += 1;
            if entry.count == 2 {
                let chain = DuplicateChain::pair(hash, entry.block, block);
                entry.block = self.chains.len() as u32;
                self.chains.push(chain);
            } else {
                self.chains[entry.block as usize].push(block);
            }
        }
        block
    }

    /// Hash `data` and record it as the next block.
    pub fn add_block(&mut self, data: &[u8]) -> u32 {
        self.insert(H::block_hash(data))
    }

    ///
    /// Make room for at least `min_capacity` slots and rehash every entry.
    ///
    /// Requests at or below the current capacity do nothing. Duplicate
    /// chains and the block hash log are untouched, only slot positions
    /// change.
    ///
    /// Panics, after logging an error, if more than [`MAX_CAPACITY`] slots
    /// are needed.
    ///
    pub fn grow(&mut self, min_capacity: u64) {
        if min_capacity > MAX_CAPACITY as u64 {
            error!(
                "dedup index cannot grow past {} slots ({} requested)",
                MAX_CAPACITY, min_capacity
            );
            panic!("dedup index capacity exhausted");
        }
        let old_capacity = self.capacity();
        let new_capacity = round_up_size(min_capacity);
        if new_capacity <= old_capacity {
            return;
        }
        let old = std::mem::replace(
            &mut self.entries,
            vec![Entry::default(); new_capacity as usize],
        );
        self.max_count = max_count_for(new_capacity);
        for entry in old.into_iter().filter(|e| !e.is_empty()) {
            let slot = self.probe(entry.hash);
            self.entries[slot] = entry;
        }
        debug!(
            "grew dedup index from {} to {} slots ({} entries)",
            old_capacity, new_capacity, self.entry_count
        );
    }

    // Slot holding `hash`, or the empty slot where it would go. The table is
    // never full, so the scan always stops.
    fn probe(&self, hash: u64) -> usize {
        let mask = self.entries.len() - 1;
        let mut slot = (hash & mask as u64) as usize;
        loop {
            let entry = &self.entries[slot];
            if entry.is_empty() || entry.hash == hash {
                return slot;
            }
            slot = (slot + 1) & mask;
        }
    }

    /// Table entry for `hash`, if any block has it.
    pub fn entry(&self, hash: u64) -> Option<&Entry> {
        let hash = normalize::<H>(hash);
        let entry = &self.entries[self.probe(hash)];
        if entry.is_empty() { None } else { Some(entry) }
    }

    pub fn has_match(&self, hash: u64) -> bool {
        self.entry(hash).is_some()
    }

    /// Oldest block with the given hash.
    pub fn find_first_match(&self, hash: u64) -> Option<u32> {
        let entry = self.entry(hash)?;
        if entry.count == 1 {
            Some(entry.block)
        } else {
            self.chains[entry.block as usize].blocks.first()
        }
    }

    /// Up to `max_count` blocks with the given hash, oldest first.
    pub fn find_all_matches(&self, hash: u64, max_count: usize) -> Option<Vec<u32>> {
        let entry = self.entry(hash)?;
        if entry.count == 1 {
            Some(vec![entry.block])
        } else {
            let chain = &self.chains[entry.block as usize];
            Some(chain.blocks().iter().take(max_count).copied().collect())
        }
    }

    /// True if block `block` was recorded with the given hash.
    pub fn contains_block(&self, hash: u64, block: u32) -> bool {
        match self.entry(hash) {
            None => false,
            Some(entry) if entry.count == 1 => entry.block == block,
            Some(entry) => self.chains[entry.block as usize].contains(block),
        }
    }

    pub fn find_first_match_data(&self, data: &[u8]) -> Option<u32> {
        self.find_first_match(H::block_hash(data))
    }

    pub fn find_all_matches_data(&self, data: &[u8], max_count: usize) -> Option<Vec<u32>> {
        self.find_all_matches(H::block_hash(data), max_count)
    }

    /// Hash recorded for block number `block`.
    pub fn hash_of_block(&self, block: u32) -> Option<u64> {
        self.block_hashes.get(block as usize)
    }

    /// Number of blocks recorded.
    pub fn len(&self) -> usize {
        self.block_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_hashes.is_empty()
    }

    /// Number of distinct hashes, which is the number of filled slots.
    pub fn unique_count(&self) -> u32 {
        self.entry_count
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn load_factor(&self) -> f64 {
        self.entry_count as f64 / self.capacity() as f64
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn chains(&self) -> &[DuplicateChain] {
        &self.chains
    }

    pub fn block_hashes(&self) -> &[u64] {
        self.block_hashes.as_slice()
    }

    /// Summary of the table contents.
    pub fn stats(&self) -> IndexStats {
        let most_common = self
            .chains
            .iter()
            .fold(None::<&DuplicateChain>, |best, chain| match best {
                Some(b) if b.len() >= chain.len() => Some(b),
                _ => Some(chain),
            })
            .map(|chain| {
                let first_block = chain.blocks.first().unwrap_or_default();
                MostCommonHash {
                    hash: chain.hash,
                    count: chain.len(),
                    first_block,
                    first_offset: first_block as u64 * self.block_size as u64,
                }
            });
        IndexStats {
            block_count: self.len(),
            block_size: self.block_size,
            entry_count: self.entry_count,
            capacity: self.capacity(),
            duplicate_chains: self.chains.len(),
            most_common,
        }
    }
}

/// Narrow to the algorithm width and replace zero with all ones.
#[inline]
fn normalize<H: BlockHasher>(hash: u64) -> u64 {
    let alg = H::ALGORITHM;
    alg.filter(hash & alg.zero_replacement())
}

fn max_count_for(capacity: u32) -> u32 {
    (capacity as f64 * MAX_LOAD_FACTOR) as u32
}

///
/// Smallest power of two at least `size`, capped at [`MAX_CAPACITY`].
///
pub fn round_up_size(size: u64) -> u32 {
    if size >= MAX_CAPACITY as u64 {
        MAX_CAPACITY
    } else {
        size.max(1).next_power_of_two() as u32
    }
}

// Read until the buffer is full or the input is exhausted.
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

///
/// The hash shared by the most blocks, as reported by [`IndexStats`].
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MostCommonHash {
    pub hash: u64,
    pub count: usize,
    pub first_block: u32,
    /// Byte offset of the first block; only meaningful for fixed size blocks.
    pub first_offset: u64,
}

///
/// Summary of a [`DedupIndex`], printable in a short multi-line form.
///
#[derive(Clone, Debug, PartialEq)]
pub struct IndexStats {
    pub block_count: usize,
    pub block_size: u32,
    pub entry_count: u32,
    pub capacity: u32,
    pub duplicate_chains: usize,
    pub most_common: Option<MostCommonHash>,
}

impl IndexStats {
    /// Percentage of slots in use.
    pub fn fill_percent(&self) -> f64 {
        100.0 * self.entry_count as f64 / self.capacity as f64
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Table: {} {}-byte blocks",
            self.block_count, self.block_size
        )?;
        writeln!(
            f,
            "  {} of {} entries filled ({:.2} %)",
            self.entry_count,
            self.capacity,
            self.fill_percent()
        )?;
        write!(f, "  {} duplicate blocks", self.duplicate_chains)?;
        if let Some(common) = &self.most_common {
            write!(
                f,
                "\n  Most common hash value: {:x} ({} blocks, first at offset {})",
                common.hash, common.count, common.first_offset
            )?;
        }
        Ok(())
    }
}
