//
// Copyright (c) 2025 Nathan Fiedler
//

//! Content defined chunk boundary detection with a sliding window.
//!
//! This is the two-threshold scheme described in "A Low-bandwidth Network
//! File System" (Muthitacharoen et al.): no boundary is considered before
//! `min_size` bytes, a rolling hash of the last `window_size` bytes is then
//! tested at every position, and a boundary is declared where the hash
//! modulo `mod_base` equals `mod_value`. If no position qualifies before
//! `max_size` bytes, the chunk is cut there. Since a boundary depends only
//! on the bytes inside the window, an edit to one region of a file moves at
//! most the boundaries near that edit.
//!
//! There are two ways to use the [`RollingWindow`] defined in this module.
//! One is to call [`chunk_length()`](RollingWindow::chunk_length) while
//! managing your own position in the data. The other is to construct a
//! [`Chunker`] which yields [`Chunk`] values through the [`Iterator`] trait.
//!
//! ```
//! use varchunk::window::{ChunkingParameters, Chunker};
//! let data = vec![7u8; 100_000];
//! let params = ChunkingParameters::new(8192, 6963, 16384, 8192, 23, 48);
//! let total: usize = Chunker::new(&data, params).map(|c| c.length).sum();
//! assert_eq!(total, data.len());
//! ```
use crate::rolling::{HashWord, RollingHash};
use std::marker::PhantomData;

/// Modulus remainder that marks a content defined boundary.
pub const DEFAULT_MOD_VALUE: u64 = 23;
/// Number of trailing bytes covered by the boundary hash.
pub const DEFAULT_WINDOW_SIZE: usize = 48;
/// Target chunk size of the default parameter profile (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4_194_304;
/// Minimum chunk size of the default profile, 85% of the target.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 3_565_158;
/// Maximum chunk size of the default profile, 200% of the target.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8_388_608;

///
/// Parameters that drive the boundary search.
///
/// Chosen once per file and held constant for the duration of a pass; the
/// same bytes chunked with the same parameters always produce the same
/// boundaries.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ChunkingParameters {
    /// Expected chunk size; informational, the search uses the fields below.
    pub target_size: usize,
    /// No content defined boundary is considered before this many bytes.
    pub min_size: usize,
    /// A boundary is forced at this many bytes.
    pub max_size: usize,
    /// Divisor of the boundary test.
    pub mod_base: u64,
    /// Remainder of the boundary test.
    pub mod_value: u64,
    /// Number of bytes covered by the rolling hash.
    pub window_size: usize,
}

impl ChunkingParameters {
    ///
    /// Construct a set of parameters, checking the ordering invariants.
    ///
    /// Panics unless `0 < window_size <= min_size <= target_size <= max_size`
    /// and `mod_base > 0`.
    ///
    pub fn new(
        target_size: usize,
        min_size: usize,
        max_size: usize,
        mod_base: u64,
        mod_value: u64,
        window_size: usize,
    ) -> Self {
        assert!(window_size > 0, "sliding window must not be empty");
        assert!(window_size <= min_size, "sliding window larger than minimum chunk");
        assert!(min_size <= target_size, "minimum chunk size above target");
        assert!(target_size <= max_size, "target chunk size above maximum");
        assert!(mod_base > 0, "modulus base must be positive");
        Self {
            target_size,
            min_size,
            max_size,
            mod_base,
            mod_value,
            window_size,
        }
    }
}

impl Default for ChunkingParameters {
    fn default() -> Self {
        Self::new(
            DEFAULT_CHUNK_SIZE,
            DEFAULT_MIN_CHUNK_SIZE,
            DEFAULT_MAX_CHUNK_SIZE,
            DEFAULT_CHUNK_SIZE as u64,
            DEFAULT_MOD_VALUE,
            DEFAULT_WINDOW_SIZE,
        )
    }
}

///
/// Finds chunk boundaries using a rolling hash of word type `T`.
///
/// The default 32-bit word is what the default parameter profile was tuned
/// with; 64-bit words produce different boundaries.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RollingWindow<T: HashWord = u32> {
    params: ChunkingParameters,
    word: PhantomData<T>,
}

impl<T: HashWord> RollingWindow<T> {
    /// Construct a boundary finder for the given parameters.
    pub fn new(params: ChunkingParameters) -> Self {
        Self {
            params,
            word: PhantomData,
        }
    }

    /// Parameters in use.
    pub fn params(&self) -> &ChunkingParameters {
        &self.params
    }

    ///
    /// Length of the chunk that starts at the beginning of `data`, where
    /// `data` holds every byte not yet assigned to a chunk.
    ///
    /// If no more than `min_size` bytes remain, they form the final chunk.
    ///
    pub fn chunk_length(&self, data: &[u8]) -> usize {
        self.cut(data).1
    }

    ///
    /// Find the end of the next chunk in `data`, returning the boundary hash
    /// and the chunk length. The hash is zero for a final chunk that was too
    /// short to be searched.
    ///
    pub fn cut(&self, data: &[u8]) -> (u64, usize) {
        let p = &self.params;
        let remaining = data.len();
        if remaining <= p.min_size {
            return (0, remaining);
        }
        let mut end = p.min_size;
        let mut remove = end - p.window_size;
        let mut hasher: RollingHash<T> = RollingHash::new();
        hasher.add_chars(&data[remove..end]);
        let max_end = remaining.min(p.max_size);
        loop {
            let hash = hasher.hash().to_u64();
            if hash % p.mod_base == p.mod_value {
                // content defined boundary
                return (hash, end);
            }
            if end >= max_end {
                // forced boundary, e.g. for long runs of identical bytes
                return (hash, end);
            }
            hasher.move_char(data[end], data[remove]);
            end += 1;
            remove += 1;
        }
    }
}

///
/// A chunk of the source data returned from the [`Chunker`] iterator.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Chunk {
    /// Rolling hash of the window that ended the chunk.
    pub hash: u64,
    /// Starting byte position within the source.
    pub offset: usize,
    /// Length of the chunk in bytes.
    pub length: usize,
}

impl Chunk {
    /// Position one past the last byte of the chunk.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

///
/// Iterator over the chunks of a borrowed byte source.
///
/// The chunks exactly partition the source: they are contiguous, do not
/// overlap, and their lengths sum to the source length. Every chunk except
/// possibly the last is between `min_size` and `max_size` bytes long.
///
#[derive(Debug, Clone)]
pub struct Chunker<'a, T: HashWord = u32> {
    source: &'a [u8],
    window: RollingWindow<T>,
    processed: usize,
}

impl<'a> Chunker<'a, u32> {
    /// Construct a chunker using the default 32-bit window hash.
    pub fn new(source: &'a [u8], params: ChunkingParameters) -> Self {
        Chunker::with_window(source, RollingWindow::new(params))
    }
}

impl<'a, T: HashWord> Chunker<'a, T> {
    /// Construct a chunker around an existing boundary finder.
    pub fn with_window(source: &'a [u8], window: RollingWindow<T>) -> Self {
        Self {
            source,
            window,
            processed: 0,
        }
    }
}

impl<T: HashWord> Iterator for Chunker<'_, T> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.processed >= self.source.len() {
            None
        } else {
            let (hash, length) = self.window.cut(&self.source[self.processed..]);
            let offset = self.processed;
            self.processed += length;
            Some(Chunk {
                hash,
                offset,
                length,
            })
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.len() - self.processed;
        if remaining == 0 {
            return (0, Some(0));
        }
        let max_size = self.window.params.max_size.max(1);
        let min_size = self.window.params.min_size.max(1);
        (remaining.div_ceil(max_size), Some(remaining.div_ceil(min_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md5::{Digest, Md5};
    use rand::{RngCore, SeedableRng, rngs::StdRng};

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        data
    }

    fn small_params() -> ChunkingParameters {
        ChunkingParameters::new(4096, 3481, 8192, 4096, 23, 48)
    }

    #[test]
    fn test_default_params() {
        let params = ChunkingParameters::default();
        assert_eq!(params.target_size, 4_194_304);
        assert_eq!(params.min_size, 3_565_158);
        assert_eq!(params.max_size, 8_388_608);
        assert_eq!(params.mod_base, 4_194_304);
        assert_eq!(params.mod_value, 23);
        assert_eq!(params.window_size, 48);
    }

    #[test]
    #[should_panic]
    fn test_window_larger_than_minimum() {
        ChunkingParameters::new(4096, 32, 8192, 4096, 23, 48);
    }

    #[test]
    #[should_panic]
    fn test_minimum_above_target() {
        ChunkingParameters::new(4096, 5000, 8192, 4096, 23, 48);
    }

    #[test]
    #[should_panic]
    fn test_target_above_maximum() {
        ChunkingParameters::new(9000, 3481, 8192, 4096, 23, 48);
    }

    #[test]
    #[should_panic]
    fn test_zero_mod_base() {
        ChunkingParameters::new(4096, 3481, 8192, 0, 23, 48);
    }

    #[test]
    fn test_short_remainder_is_one_chunk() {
        let window: RollingWindow = RollingWindow::new(small_params());
        let data = random_bytes(3481, 1);
        assert_eq!(window.chunk_length(&data), 3481);
        assert_eq!(window.cut(&data[..100]), (0, 100));
        assert_eq!(window.chunk_length(&[]), 0);
    }

    #[test]
    fn test_cut_all_zeros() {
        // the window hash of zeros is zero, which never matches 23
        let data = vec![0u8; 8192 * 5 + 100];
        let window: RollingWindow = RollingWindow::new(small_params());
        let mut cursor = 0;
        for _ in 0..5 {
            let (hash, len) = window.cut(&data[cursor..]);
            assert_eq!(hash, 0);
            assert_eq!(len, 8192);
            cursor += len;
        }
        assert_eq!(window.chunk_length(&data[cursor..]), 100);
    }

    #[test]
    fn test_boundary_satisfies_modulus() {
        let data = random_bytes(200_000, 2);
        let params = small_params();
        for chunk in Chunker::new(&data, params) {
            let interior = chunk.end() < data.len();
            if interior && chunk.length > params.min_size && chunk.length < params.max_size {
                assert_eq!(chunk.hash % params.mod_base, params.mod_value);
                // the boundary hash covers the last window of the chunk
                let mut fresh: RollingHash<u32> = RollingHash::new();
                let window_start = chunk.end() - params.window_size;
                let expected = fresh.add_chars(&data[window_start..chunk.end()]);
                assert_eq!(chunk.hash, expected as u64);
            }
        }
    }

    #[test]
    fn test_chunks_partition_source() {
        let data = random_bytes(500_000, 3);
        let params = small_params();
        let chunks: Vec<Chunk> = Chunker::new(&data, params).collect();
        assert!(chunks.len() > 1);
        let mut expected_offset = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.offset, expected_offset);
            if index + 1 < chunks.len() {
                assert!(chunk.length >= params.min_size);
                assert!(chunk.length <= params.max_size);
            }
            expected_offset = chunk.end();
        }
        assert_eq!(expected_offset, data.len());
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let data = random_bytes(300_000, 4);
        let first: Vec<Chunk> = Chunker::new(&data, small_params()).collect();
        let second: Vec<Chunk> = Chunker::new(&data, small_params()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_contents_follow_offsets() {
        // chunking a copy of the data yields chunks with identical contents
        let data = random_bytes(100_000, 5);
        let copy = data.clone();
        let left = Chunker::new(&data, small_params());
        let right = Chunker::new(&copy, small_params());
        for (a, b) in left.zip(right) {
            let da = Md5::digest(&data[a.offset..a.end()]);
            let db = Md5::digest(&copy[b.offset..b.end()]);
            assert_eq!(da[..], db[..]);
        }
    }

    #[test]
    fn test_u64_window() {
        let data = random_bytes(200_000, 6);
        let params = small_params();
        let window: RollingWindow<u64> = RollingWindow::new(params);
        let total: usize = Chunker::with_window(&data, window).map(|c| c.length).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_size_hint() {
        let data = vec![1u8; 10_000];
        let chunker = Chunker::new(&data, small_params());
        assert_eq!(chunker.size_hint(), (2, Some(3)));
        let empty: [u8; 0] = [];
        let mut chunker = Chunker::new(&empty, small_params());
        assert_eq!(chunker.size_hint(), (0, Some(0)));
        assert!(chunker.next().is_none());
    }
}
