//
// Copyright (c) 2025 Nathan Fiedler
//

//! Selection of chunking parameters from the size of a file.
//!
//! The target chunk size is the file size divided by a caller supplied
//! divisor, rounded up to the next value of a fixed increasing sequence:
//! either the powers of two or the Fibonacci numbers. From the target the
//! minimum and maximum chunk sizes are derived as 85% and 200% of it, which
//! Eshghi and Tang found to minimize both the variance of chunk sizes and
//! the average chunk size for the two-threshold scheme.
//!
//! A file that has been chunked before carries the exponent of its previous
//! power of two target, the "anchor power". Re-chunking keeps that anchor
//! until the size has grown by at least `refactor` powers of two, so that a
//! file which grows a little on every scan keeps producing the same
//! boundaries, and therefore the same chunks.
use crate::window::{ChunkingParameters, DEFAULT_MOD_VALUE, DEFAULT_WINDOW_SIZE};
use std::fmt;

/// Network MTU used to derive the small-file threshold.
pub const MTU: u64 = 1500;
/// Default divisor, giving roughly 16 to 40 chunks per file.
pub const DEFAULT_DIVISOR: u64 = 32;

/// Largest anchor power accepted, so that twice the target still fits.
pub const MAX_ANCHOR_POWER: u32 = 62;

/// Largest index whose Fibonacci number fits in 64 bits.
const FIBONACCI_MAX_INDEX: u32 = 93;

///
/// Sequence to which the target chunk size is rounded up.
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Bucketing {
    /// Smallest power of two at or above the estimate.
    #[default]
    PowerOfTwo,
    /// Smallest Fibonacci number at or above the estimate.
    Fibonacci,
}

///
/// How a file is to be divided.
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChunkMode {
    /// The whole file is a single block.
    WholeFile,
    /// Chunks of exactly the target size.
    Fixed,
    /// Content defined chunks between 85% and 200% of the target.
    #[default]
    Variable,
}

impl fmt::Display for ChunkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkMode::WholeFile => write!(f, "whole"),
            ChunkMode::Fixed => write!(f, "fixed"),
            ChunkMode::Variable => write!(f, "variable"),
        }
    }
}

///
/// Caller tunable settings of the planner.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlannerConfig {
    /// File size is divided by this to estimate the target chunk size.
    pub divisor: u64,
    /// Rounding sequence for new (unanchored) files.
    pub bucketing: Bucketing,
    /// Re-anchor once the natural power exceeds the anchor by at least this
    /// much; zero keeps the anchor forever.
    pub refactor: u32,
    /// Requested mode; small files are always planned as whole files.
    pub mode: ChunkMode,
    /// Remainder of the boundary test.
    pub mod_value: u64,
    /// Bytes covered by the boundary hash.
    pub window_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            divisor: DEFAULT_DIVISOR,
            bucketing: Bucketing::PowerOfTwo,
            refactor: 0,
            mode: ChunkMode::Variable,
            mod_value: DEFAULT_MOD_VALUE,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

///
/// Outcome of planning a file.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Plan {
    /// Index the file as one block. `power` is the anchor passed in.
    WholeFile { power: u32 },
    /// Chunk the file with `params`; `power` is the anchor to record.
    Chunked {
        power: u32,
        params: ChunkingParameters,
    },
}

impl Plan {
    /// Anchor power to record alongside the file.
    pub fn anchor_power(&self) -> u32 {
        match self {
            Plan::WholeFile { power } | Plan::Chunked { power, .. } => *power,
        }
    }

    /// Chunking parameters, unless the file is a single block.
    pub fn params(&self) -> Option<&ChunkingParameters> {
        match self {
            Plan::WholeFile { .. } => None,
            Plan::Chunked { params, .. } => Some(params),
        }
    }
}

impl PlannerConfig {
    /// Construct a configuration with the given divisor and defaults for
    /// everything else.
    pub fn with_divisor(divisor: u64) -> Self {
        assert!(divisor > 0, "divisor must be positive");
        Self {
            divisor,
            ..Default::default()
        }
    }

    /// Files of at most this many bytes are never chunked.
    pub fn small_file_threshold(&self) -> u64 {
        small_file_threshold(self.divisor)
    }

    ///
    /// Plan the chunking of a file of `file_size` bytes.
    ///
    /// An `anchor_power` of zero means the file has not been chunked before.
    ///
    /// Panics if a non-zero `anchor_power` lies outside
    /// [`min_anchor_power`](Self::min_anchor_power) to [`MAX_ANCHOR_POWER`].
    ///
    pub fn plan(&self, file_size: u64, anchor_power: u32) -> Plan {
        assert!(self.divisor > 0, "divisor must be positive");
        if anchor_power != 0 {
            assert!(
                anchor_power <= MAX_ANCHOR_POWER,
                "anchor power {anchor_power} above {MAX_ANCHOR_POWER}"
            );
            let lowest = self.min_anchor_power();
            assert!(
                anchor_power >= lowest,
                "anchor power {anchor_power} below {lowest}"
            );
        }
        if self.mode == ChunkMode::WholeFile || file_size <= self.small_file_threshold() {
            return Plan::WholeFile {
                power: anchor_power,
            };
        }
        let estimate = file_size / self.divisor;
        let (target, power) = if anchor_power == 0 {
            let target = match self.bucketing {
                Bucketing::PowerOfTwo => power_of_two_bucket(estimate),
                Bucketing::Fibonacci => fibonacci_bucket(estimate),
            };
            (target, target.ilog2())
        } else {
            let natural = power_of_two_bucket(estimate).ilog2();
            let power = reanchor(anchor_power, natural, self.refactor);
            (1u64 << power, power)
        };
        let min_size = self.min_size_for(target) as usize;
        let target = target as usize;
        let params = match self.mode {
            ChunkMode::Fixed => ChunkingParameters::new(
                target,
                min_size,
                target,
                target as u64,
                self.mod_value,
                self.window_size,
            ),
            _ => ChunkingParameters::new(
                target,
                min_size,
                target * 2,
                target as u64,
                self.mod_value,
                self.window_size,
            ),
        };
        Plan::Chunked { power, params }
    }

    /// Smallest anchor power whose minimum chunk still covers the window.
    pub fn min_anchor_power(&self) -> u32 {
        (1..MAX_ANCHOR_POWER)
            .find(|&power| self.min_size_for(1 << power) >= self.window_size as u64)
            .unwrap_or(MAX_ANCHOR_POWER)
    }

    // Minimum chunk size for a target in the configured mode.
    fn min_size_for(&self, target: u64) -> u64 {
        match self.mode {
            ChunkMode::Fixed => target,
            _ => (target as u128 * 85 / 100) as u64,
        }
    }
}

/// Small-file threshold for a divisor: `floor(MTU * divisor * 100 / 85) + 1`.
pub fn small_file_threshold(divisor: u64) -> u64 {
    MTU * divisor * 100 / 85 + 1
}

///
/// Decide between the previous anchor and the natural power of the current
/// size. The anchor is kept unless `refactor` is non-zero and the natural
/// power is at least `refactor` above it.
///
pub fn reanchor(anchor: u32, natural: u32, refactor: u32) -> u32 {
    if refactor == 0 || (natural as i64 - anchor as i64) < refactor as i64 {
        anchor
    } else {
        natural
    }
}

/// Smallest power of two that is at least `n` (1 for zero).
pub fn power_of_two_bucket(n: u64) -> u64 {
    n.max(1).next_power_of_two()
}

/// The `index`-th Fibonacci number, with `fibonacci(0) == 0`.
pub fn fibonacci(index: u32) -> u64 {
    assert!(index <= FIBONACCI_MAX_INDEX);
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..index {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

/// Smallest Fibonacci number that is at least `n` (1 for zero).
pub fn fibonacci_bucket(n: u64) -> u64 {
    let n = n.max(1);
    // binary search for the smallest index with fibonacci(index) >= n; the
    // sequence is non-decreasing from index 1 onward
    let mut lo = 1;
    let mut hi = FIBONACCI_MAX_INDEX;
    if fibonacci(hi) < n {
        return fibonacci(hi);
    }
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if fibonacci(mid) >= n {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    fibonacci(lo)
}
