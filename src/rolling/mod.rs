//
// Copyright (c) 2025 Nathan Fiedler
//

//! Polynomial rolling hashes over a sliding byte window.
//!
//! The hash of a window `b[0..n]` is `sum(b[i] * m^(n-1-i))` computed with
//! wrapping arithmetic in the word type, where `m` is the multiplier. The
//! wrap-around is intentional: the hash is only ever compared modulo the word
//! width, so overflow carries no meaning.
//!
//! Two flavors are provided. [`RollingHash`] leaves it to the caller to say
//! which byte is leaving the window, which is the cheapest option when the
//! caller already has the data in memory (as [`crate::window::RollingWindow`]
//! does). [`RollingHashBuffered`] keeps its own copy of the window so that
//! bytes can simply be pushed in one at a time.

///
/// Fixed-width unsigned integer usable as the accumulator of a rolling hash.
///
pub trait HashWord: Copy + Eq + Default + std::fmt::Debug {
    /// The multiplicative identity.
    const ONE: Self;
    /// Widen a byte into this word type.
    fn from_byte(b: u8) -> Self;
    /// Widen a 32-bit value into this word type.
    fn from_u32(v: u32) -> Self;
    /// Wrapping (modular) multiplication.
    fn wrapping_mul(self, rhs: Self) -> Self;
    /// Wrapping (modular) addition.
    fn wrapping_add(self, rhs: Self) -> Self;
    /// Wrapping (modular) subtraction.
    fn wrapping_sub(self, rhs: Self) -> Self;
    /// Zero-extend to 64 bits.
    fn to_u64(self) -> u64;
}

macro_rules! impl_hash_word {
    ($t:ty) => {
        impl HashWord for $t {
            const ONE: Self = 1;
            #[inline]
            fn from_byte(b: u8) -> Self {
                b as $t
            }
            #[inline]
            fn from_u32(v: u32) -> Self {
                v as $t
            }
            #[inline]
            fn wrapping_mul(self, rhs: Self) -> Self {
                <$t>::wrapping_mul(self, rhs)
            }
            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$t>::wrapping_add(self, rhs)
            }
            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$t>::wrapping_sub(self, rhs)
            }
            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }
        }
    };
}

impl_hash_word!(u32);
impl_hash_word!(u64);

/// Default multiplier; 69069 is a well known good multiplier for this kind
/// of hash.
pub const DEFAULT_MULTIPLIER: u32 = 69069;

///
/// Rolling hash in which the caller supplies the byte leaving the window.
///
/// Build up a window with [`add_char`](RollingHash::add_char), then slide it
/// with [`move_char`](RollingHash::move_char). The removal factor is
/// `multiplier^n` where `n` is the number of bytes added since construction
/// or the last [`reset`](RollingHash::reset), so the window length is fixed
/// by the build-up phase. Mixing window lengths without a reset produces
/// meaningless values.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RollingHash<T: HashWord> {
    state: T,
    multiplier: T,
    factor: T,
    size: usize,
}

impl<T: HashWord> RollingHash<T> {
    /// Construct an empty hash with the default multiplier.
    pub fn new() -> Self {
        Self::with_multiplier(T::from_u32(DEFAULT_MULTIPLIER))
    }

    /// Construct an empty hash with the given multiplier.
    pub fn with_multiplier(multiplier: T) -> Self {
        Self {
            state: T::default(),
            multiplier,
            factor: T::ONE,
            size: 0,
        }
    }

    /// Add a byte to the window, growing it by one. Returns the new hash.
    #[inline]
    pub fn add_char(&mut self, c: u8) -> T {
        self.size += 1;
        self.factor = self.factor.wrapping_mul(self.multiplier);
        self.state = self
            .state
            .wrapping_mul(self.multiplier)
            .wrapping_add(T::from_byte(c));
        self.state
    }

    /// Add every byte of `bytes` to the window. Returns the new hash.
    pub fn add_chars(&mut self, bytes: &[u8]) -> T {
        for &c in bytes {
            self.add_char(c);
        }
        self.state
    }

    /// Slide the window one byte: `added` enters at the leading edge while
    /// `removed` leaves at the trailing edge. Returns the new hash.
    #[inline]
    pub fn move_char(&mut self, added: u8, removed: u8) -> T {
        self.state = self
            .state
            .wrapping_mul(self.multiplier)
            .wrapping_add(T::from_byte(added))
            .wrapping_sub(self.factor.wrapping_mul(T::from_byte(removed)));
        self.state
    }

    /// Current hash value.
    #[inline]
    pub fn hash(&self) -> T {
        self.state
    }

    /// Number of bytes added since the last reset (the window length).
    pub fn len(&self) -> usize {
        self.size
    }

    /// True if no bytes have been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Clear the hash and the window length, keeping the multiplier.
    pub fn reset(&mut self) {
        self.state = T::default();
        self.factor = T::ONE;
        self.size = 0;
    }
}

impl<T: HashWord> Default for RollingHash<T> {
    fn default() -> Self {
        Self::new()
    }
}

///
/// Rolling hash that keeps its own copy of the window contents.
///
/// Each [`push`](RollingHashBuffered::push) adds one byte and drops the byte
/// that was pushed `window` calls ago. The window starts out full of zero
/// bytes, which contribute nothing to the hash, so after `window` pushes the
/// value equals that of a [`RollingHash`] built over the same bytes.
///
#[derive(Debug, Clone)]
pub struct RollingHashBuffered<T: HashWord> {
    state: T,
    multiplier: T,
    factor: T,
    buffer: Box<[u8]>,
    position: usize,
}

impl<T: HashWord> RollingHashBuffered<T> {
    /// Construct a buffered hash over a window of `window` bytes using the
    /// default multiplier.
    pub fn new(window: usize) -> Self {
        Self::with_multiplier(window, T::from_u32(DEFAULT_MULTIPLIER))
    }

    /// Construct a buffered hash with the given window size and multiplier.
    pub fn with_multiplier(window: usize, multiplier: T) -> Self {
        assert!(window > 0);
        let mut factor = T::ONE;
        for _ in 1..window {
            factor = factor.wrapping_mul(multiplier);
        }
        Self {
            state: T::default(),
            multiplier,
            factor,
            buffer: vec![0u8; window].into_boxed_slice(),
            position: 0,
        }
    }

    /// Push a byte into the window, evicting the oldest. Returns the new hash.
    #[inline]
    pub fn push(&mut self, c: u8) -> T {
        let oldest = self.buffer[self.position];
        self.state = self
            .state
            .wrapping_sub(self.factor.wrapping_mul(T::from_byte(oldest)))
            .wrapping_mul(self.multiplier)
            .wrapping_add(T::from_byte(c));
        self.buffer[self.position] = c;
        self.position = (self.position + 1) % self.buffer.len();
        self.state
    }

    /// Current hash value.
    pub fn hash(&self) -> T {
        self.state
    }

    /// Size of the window in bytes.
    pub fn window(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the hash and the window contents.
    pub fn reset(&mut self) {
        self.state = T::default();
        self.buffer.fill(0);
        self.position = 0;
    }
}
