// Deterministic, portable pseudo-random number generator for the harmony
// pipeline.
//
// xoshiro256++ (Blackman & Vigna, 2019) seeded through SplitMix64. Every
// probabilistic stage of chord generation draws from a `SeedRng` it owns:
// the grammar samples production rules with one, the style engine gates
// substitutions and pads short progressions with another. Nothing reads a
// process-wide generator, so a test can pin a seed and get the same
// progression back on every platform.
//
// **Critical constraint: determinism.** The integer core must not change.
// Golden progressions in `jazz_architect_harmony` are pinned against the
// exact output stream of this generator; altering the mixing constants, the
// float conversion, or the rejection sampling breaks them.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ generator with a 256-bit state.
///
/// Cloning a `SeedRng` forks the stream: both copies continue with identical
/// output from the point of the clone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRng {
    s: [u64; 4],
}

impl SeedRng {
    /// Create a generator from a `u64` seed.
    ///
    /// SplitMix64 expands the seed into the four state words, so nearby seeds
    /// (42, 43, ...) still produce unrelated streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Restart the stream as if freshly created with `seed`.
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// Next raw 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f64` in [0, 1) built from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in [low, high), free of modulo bias.
    ///
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform index in [low, high).
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// `true` with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

impl Default for SeedRng {
    fn default() -> Self {
        Self::new(0)
    }
}

/// SplitMix64 step, used only to expand seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
