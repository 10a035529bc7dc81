//! Seeded xorshift32 generator
//!
//! The only source of randomness in the engine. Stochastic rules draw from it
//! in sequence order, so a generation depends on nothing but the seed and the
//! generations derived before it.
//!
//! State is a signed 32-bit integer and the right shift is arithmetic. Saved
//! sessions replay bit-for-bit only if this stays exactly as written.

use serde::{Deserialize, Serialize};

/// 2^32, the divisor that maps a 32-bit word into [0, 1)
const WORD_RANGE: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xorshift {
    state: i32,
}

impl Xorshift {
    /// Seed 0 is a fixed point of the generator. Callers treat it as
    /// "randomness disabled" and never draw from such an instance.
    pub fn new(seed: u32) -> Self {
        Self { state: seed as i32 }
    }

    pub fn next_int(&mut self) -> i32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform float in [0, 1)
    pub fn next_float(&mut self) -> f64 {
        (self.next_int() as u32) as f64 / WORD_RANGE
    }

    /// Integer in [start, end)
    pub fn next_range(&mut self, start: i64, end: i64) -> i64 {
        (self.next_float() * (end - start) as f64).floor() as i64 + start
    }

    /// Pick one element with equal probability. Consumes exactly one draw.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_range(0, items.len() as i64) as usize;
        items.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_trace_from_seed_one() {
        let mut rng = Xorshift::new(1);
        assert_eq!(rng.next_int(), 270_369);
        // The left shift by 13 overflows into the sign bit on this draw
        assert_eq!(rng.next_int(), 0x0407_8601);
    }

    #[test]
    fn test_float_maps_word() {
        let mut rng = Xorshift::new(1);
        let f = rng.next_float();
        assert!((f - 270_369.0 / WORD_RANGE).abs() < 1e-15);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Xorshift::new(12345);
        let mut b = Xorshift::new(12345);
        for _ in 0..1000 {
            assert_eq!(a.next_int(), b.next_int());
        }
    }

    #[test]
    fn test_range_bounds() {
        let mut rng = Xorshift::new(987_654_321);
        for _ in 0..10_000 {
            let v = rng.next_range(3, 9);
            assert!((3..9).contains(&v));
            let f = rng.next_float();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn test_choice_consumes_one_draw() {
        let items = ["A", "B", "C"];
        let mut rng = Xorshift::new(42);
        let mut twin = rng.clone();
        rng.choice(&items);
        twin.next_int();
        assert_eq!(rng, twin);
        assert!(rng.choice::<u8>(&[]).is_none());
    }
}
