//
// Copyright (c) 2025 Nathan Fiedler
//

//! Per-file chunk report.
//!
//! Scanning a file produces one [`RecordKind::File`] record describing the
//! whole file, followed by one [`RecordKind::Chunk`] record per chunk in
//! file order. Every chunk is also added to a [`DedupIndex`], so that the
//! report can say which chunks repeat content already seen, whether earlier
//! in the same file or in files scanned before it with the same index.
//!
//! How records are rendered is up to the caller; the [`Display`](std::fmt::Display)
//! implementation gives a plain tab separated line.
use crate::digest::{U128, md5};
use crate::hash::BlockHasher;
use crate::index::DedupIndex;
use crate::planner::{Plan, PlannerConfig};
use crate::window::Chunker;
use log::{debug, trace};
use std::fmt;

///
/// Whether a record describes a whole file or one of its chunks.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordKind {
    File,
    Chunk,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::File => write!(f, "file"),
            RecordKind::Chunk => write!(f, "chunk"),
        }
    }
}

///
/// One line of a chunk report.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkRecord {
    pub kind: RecordKind,
    /// Offset of the first byte within the file.
    pub start: u64,
    pub length: u64,
    /// Anchor power for the file record, zero for chunks.
    pub power: u32,
    /// MD5 of the bytes covered.
    pub digest: U128,
    /// Block number the chunk was given in the index; `None` for files.
    pub block: Option<u32>,
    /// Oldest block in the index with the same hash, if the chunk repeats
    /// earlier content.
    pub duplicate_of: Option<u32>,
}

impl ChunkRecord {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

impl fmt::Display for ChunkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.kind, self.start, self.length, self.power, self.digest
        )?;
        if let Some(block) = self.duplicate_of {
            write!(f, "\t{block}")?;
        }
        Ok(())
    }
}

///
/// Chunk `data` as planned by `config` and record every chunk in `index`.
///
/// `anchor_power` is the power recorded by an earlier scan of the same file,
/// or zero. The first record returned describes the whole file and carries
/// the anchor power to remember for the next scan.
///
/// A file planned as a single block still yields two records: the file
/// record, then one chunk record of power 0 spanning the whole file, which
/// is the block added to `index`. Consumers counting chunks per file should
/// expect that second line.
///
pub fn scan<H: BlockHasher>(
    data: &[u8],
    config: &PlannerConfig,
    anchor_power: u32,
    index: &mut DedupIndex<H>,
) -> Vec<ChunkRecord> {
    let plan = config.plan(data.len() as u64, anchor_power);
    let mut records = vec![ChunkRecord {
        kind: RecordKind::File,
        start: 0,
        length: data.len() as u64,
        power: plan.anchor_power(),
        digest: md5(data),
        block: None,
        duplicate_of: None,
    }];
    match plan {
        Plan::WholeFile { .. } => {
            debug!("indexing {} bytes as a single block", data.len());
            records.push(record_chunk(data, 0, index));
        }
        Plan::Chunked { power, params } => {
            debug!(
                "chunking {} bytes with power {} (min {}, max {})",
                data.len(),
                power,
                params.min_size,
                params.max_size
            );
            for chunk in Chunker::new(data, params) {
                let bytes = &data[chunk.offset..chunk.end()];
                records.push(record_chunk(bytes, chunk.offset, index));
            }
        }
    }
    records
}

fn record_chunk<H: BlockHasher>(
    bytes: &[u8],
    offset: usize,
    index: &mut DedupIndex<H>,
) -> ChunkRecord {
    let hash = H::block_hash(bytes);
    let duplicate_of = index.find_first_match(hash);
    let block = index.insert(hash);
    trace!(
        "chunk at {} of {} bytes is block {} (duplicate of {:?})",
        offset,
        bytes.len(),
        block,
        duplicate_of
    );
    ChunkRecord {
        kind: RecordKind::Chunk,
        start: offset as u64,
        length: bytes.len() as u64,
        power: 0,
        digest: md5(bytes),
        block: Some(block),
        duplicate_of,
    }
}
