//
// Copyright (c) 2025 Nathan Fiedler
//

//! Block hash functions used as keys of the [`DedupIndex`](crate::index::DedupIndex).
//!
//! The index does not care which hash is used, as long as the writer and the
//! reader of a saved index agree. Each algorithm therefore carries a one byte
//! identifier from a fixed enumeration, which is recorded in the index header
//! and checked on load. The algorithm is chosen at build time through the
//! [`BlockHasher`] type parameter of the index; [`Rolling64`] is the default
//! as it is the fastest on large inputs.
//!
//! Identifiers 0 (xxHash) and 3 (Murmur64) are reserved for indexes written by
//! other tools; they can be named but not computed by this crate.
use crate::rolling::RollingHash;
use std::fmt;

///
/// Identifiers of the known block hash algorithms.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum HashAlgorithm {
    XxHash = 0,
    Fnv32 = 1,
    Fnv64 = 2,
    Murmur64 = 3,
    Rolling32 = 4,
    Rolling64 = 5,
}

impl HashAlgorithm {
    /// Look up an algorithm by its header identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(HashAlgorithm::XxHash),
            1 => Some(HashAlgorithm::Fnv32),
            2 => Some(HashAlgorithm::Fnv64),
            3 => Some(HashAlgorithm::Murmur64),
            4 => Some(HashAlgorithm::Rolling32),
            5 => Some(HashAlgorithm::Rolling64),
            _ => None,
        }
    }

    /// Identifier written into the index header.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human readable name of the algorithm.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::XxHash => "xxHash",
            HashAlgorithm::Fnv32 => "FNV32",
            HashAlgorithm::Fnv64 => "FNV64",
            HashAlgorithm::Murmur64 => "Murmur64",
            HashAlgorithm::Rolling32 => "Rolling32",
            HashAlgorithm::Rolling64 => "Rolling64",
        }
    }

    /// Number of significant bits in a hash value.
    pub fn result_bits(self) -> u32 {
        match self {
            HashAlgorithm::XxHash | HashAlgorithm::Fnv32 | HashAlgorithm::Rolling32 => 32,
            HashAlgorithm::Fnv64 | HashAlgorithm::Murmur64 | HashAlgorithm::Rolling64 => 64,
        }
    }

    /// Number of bytes a hash value occupies in a saved index.
    pub fn result_bytes(self) -> usize {
        (self.result_bits() / 8) as usize
    }

    /// Value stored in place of a hash that computes to zero: all ones in
    /// the width of the algorithm.
    pub fn zero_replacement(self) -> u64 {
        u64::MAX >> (64 - self.result_bits())
    }

    /// Map a raw hash value of zero onto [`zero_replacement`](Self::zero_replacement),
    /// since zero marks an empty slot in the index. Every value inserted into
    /// or looked up in an index must pass through here.
    #[inline]
    pub fn filter(self, hash: u64) -> u64 {
        if hash == 0 {
            self.zero_replacement()
        } else {
            hash
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name for a header identifier, or `"unknown"`.
pub fn algorithm_name(id: u8) -> &'static str {
    HashAlgorithm::from_id(id).map_or("unknown", HashAlgorithm::name)
}

/// Result width for a header identifier, or 0 if it is unknown.
pub fn algorithm_bits(id: u8) -> u32 {
    HashAlgorithm::from_id(id).map_or(0, HashAlgorithm::result_bits)
}

///
/// A deterministic hash over a byte range, usable as an index key.
///
pub trait BlockHasher {
    /// Identifier recorded in saved indexes.
    const ALGORITHM: HashAlgorithm;

    /// Raw hash of `data`, zero-extended to 64 bits.
    fn hash(data: &[u8]) -> u64;

    /// Hash of `data` with zero remapped, ready for use as an index key.
    fn block_hash(data: &[u8]) -> u64 {
        Self::ALGORITHM.filter(Self::hash(data))
    }
}

/// 64-bit multiplicative rolling hash over the whole block.
#[derive(Copy, Clone, Debug, Default)]
pub struct Rolling64;

impl BlockHasher for Rolling64 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Rolling64;

    fn hash(data: &[u8]) -> u64 {
        RollingHash::<u64>::new().add_chars(data)
    }
}

/// 32-bit multiplicative rolling hash over the whole block.
#[derive(Copy, Clone, Debug, Default)]
pub struct Rolling32;

impl BlockHasher for Rolling32 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Rolling32;

    fn hash(data: &[u8]) -> u64 {
        RollingHash::<u32>::new().add_chars(data) as u64
    }
}

const FNV_HASH_INIT: u32 = 2_166_136_261;
const FNV_HASH_PERMUTE: u32 = 16_777_619;
const FNV_HASH_INIT64: u64 = 14_695_981_039_346_656_037;
const FNV_HASH_PERMUTE64: u64 = 1_099_511_628_211;

/// Fowler-Noll-Vo 1a, 32-bit.
#[derive(Copy, Clone, Debug, Default)]
pub struct Fnv32;

impl BlockHasher for Fnv32 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Fnv32;

    fn hash(data: &[u8]) -> u64 {
        let mut hash = FNV_HASH_INIT;
        for &b in data {
            hash ^= b as u32;
            hash = hash.wrapping_mul(FNV_HASH_PERMUTE);
        }
        hash as u64
    }
}

/// Fowler-Noll-Vo 1a, 64-bit.
#[derive(Copy, Clone, Debug, Default)]
pub struct Fnv64;

impl BlockHasher for Fnv64 {
    const ALGORITHM: HashAlgorithm = HashAlgorithm::Fnv64;

    fn hash(data: &[u8]) -> u64 {
        let mut hash = FNV_HASH_INIT64;
        for &b in data {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_HASH_PERMUTE64);
        }
        hash
    }
}

/// The algorithm used when none is specified.
pub type DefaultHasher = Rolling64;
