//! Random-walk prices used while the live feed is unavailable.

use crate::types::round_cents;
use rand::Rng;

/// Largest relative move per simulated step (0.5%).
pub const MAX_STEP: f64 = 0.005;

/// Starting price for a symbol that has never traded: 10 plus the first
/// byte of the symbol modulo 100.
pub fn seed_price(symbol: &str) -> f64 {
    let first = symbol.as_bytes().first().copied().unwrap_or(0);
    10.0 + (first % 100) as f64
}

/// Next simulated price: a uniform move within ±0.5% of `last`, rounded to
/// cents. A move that would reach zero keeps the previous price.
pub fn next_price<R: Rng + ?Sized>(last: f64, rng: &mut R) -> f64 {
    let change = rng.gen_range(-MAX_STEP..=MAX_STEP) * last;
    let price = round_cents(last + change);
    if price > 0.0 {
        price
    } else {
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_price() {
        // 'A' = 65
        assert_eq!(seed_price("AAPL"), 75.0);
        // 'n' = 110 -> 10
        assert_eq!(seed_price("nflx"), 20.0);
        assert_eq!(seed_price(""), 10.0);
    }

    #[test]
    fn test_next_price_stays_in_band() {
        let mut rng = rand::thread_rng();
        let mut last = 100.0;
        for _ in 0..1_000 {
            let next = next_price(last, &mut rng);
            assert!((next - last).abs() <= last * MAX_STEP + 0.005 + 1e-9);
            assert_eq!(next, round_cents(next));
            last = next;
        }
    }

    #[test]
    fn test_next_price_never_reaches_zero() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert!(next_price(0.01, &mut rng) > 0.0);
        }
    }
}
