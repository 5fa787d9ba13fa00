//
// Copyright (c) 2025 Nathan Fiedler
//

//! This crate divides files into variable length, content defined chunks and
//! keeps a deduplication index of the resulting blocks, in pure Rust. A
//! critical aspect of the behavior of the chunker is that it returns exactly
//! the same results for the same input, and that an edit to one part of a
//! file moves only the chunk boundaries near that edit.
//!
//! ## Pieces
//!
//! * [`window`] finds chunk boundaries with a rolling hash over a small
//!   sliding window, using the two-threshold scheme: no boundary before the
//!   minimum chunk size, a boundary wherever the hash modulo a divisor hits
//!   a fixed remainder, and a forced boundary at the maximum chunk size.
//! * [`planner`] picks those sizes from the size of the file, rounding the
//!   file size divided by a divisor up to a power of two or a Fibonacci
//!   number, and keeps an earlier choice ("anchor") sticky across scans.
//! * [`index`] is an open addressing hash table from block hash to block
//!   number, with chains for repeated hashes and a compact binary format.
//! * [`report`] ties these together for a single file, producing one record
//!   per chunk while recording every chunk in an index.
//!
//! ## Examples
//!
//! Chunking a buffer with explicit parameters:
//!
//! ```
//! use varchunk::window::{ChunkingParameters, Chunker};
//! let contents = vec![0u8; 1 << 20];
//! let params = ChunkingParameters::new(65536, 55705, 131072, 65536, 23, 48);
//! for entry in Chunker::new(&contents, params) {
//!     println!("offset={} size={}", entry.offset, entry.length);
//! }
//! ```
//!
//! Letting the planner choose, and finding repeated chunks:
//!
//! ```
//! use varchunk::index::DedupIndex;
//! use varchunk::planner::PlannerConfig;
//! use varchunk::report;
//! let contents: Vec<u8> = (0..400_000u32).map(|i| (i % 251) as u8).collect();
//! let mut index: DedupIndex = DedupIndex::new(0);
//! let records = report::scan(&contents, &PlannerConfig::default(), 0, &mut index);
//! let repeats = records.iter().filter(|r| r.is_duplicate()).count();
//! println!("{} chunks, {} repeated", records.len() - 1, repeats);
//! ```
//!
//! ## Saved indexes
//!
//! An index written with [`DedupIndex::write_to_file`](index::DedupIndex::write_to_file)
//! records the block hash algorithm it was built with. Reading it back with
//! a different algorithm fails rather than returning an index whose lookups
//! silently never match. The algorithm is the `H` type parameter of
//! [`DedupIndex`](index::DedupIndex) and defaults to [`hash::Rolling64`].
//!
//! ## Large Data
//!
//! With the `mmap` feature enabled, [`source::MappedFile`] maps a file
//! read-only so that multi-gigabyte inputs can be chunked without reading
//! them into memory first.

pub mod buffer;
pub mod digest;
pub mod error;
pub mod hash;
pub mod index;
pub mod planner;
pub mod report;
pub mod rolling;
#[cfg(feature = "mmap")]
pub mod source;
pub mod window;

pub use error::{Error, Result};
