//! Traffic multiplication.
//!
//! A multiplier of `m` turns one captured frame into `floor(m)` admission
//! attempts, plus one more with probability `m - floor(m)`. `1.0` replays
//! traffic as captured, `2.5` replays it two or three times, `0.3` samples
//! roughly 30% of it and `0.0` replays nothing. Multipliers above
//! [`MAX_MULTIPLIER`] are clamped to it.

use rand::Rng;

/// Largest multiplier honoured; larger values are clamped.
pub const MAX_MULTIPLIER: f64 = 1000.0;

/// Number of admission attempts for one input frame.
pub fn attempts<R: Rng + ?Sized>(multiplier: f64, rng: &mut R) -> usize {
    if multiplier.is_nan() || multiplier <= 0.0 {
        return 0;
    }
    let multiplier = multiplier.min(MAX_MULTIPLIER);
    let whole = multiplier.trunc();
    let fraction = multiplier - whole;

    let mut attempts = whole as usize;
    if fraction > 0.0 && rng.gen::<f64>() < fraction {
        attempts += 1;
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Always draws 0.0.
    fn low() -> StepRng {
        StepRng::new(0, 0)
    }

    /// Always draws a value just below 1.0.
    fn high() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn whole_multipliers_are_exact() {
        assert_eq!(attempts(1.0, &mut high()), 1);
        assert_eq!(attempts(2.0, &mut high()), 2);
        assert_eq!(attempts(5.0, &mut high()), 5);
    }

    #[test]
    fn zero_makes_no_attempts() {
        assert_eq!(attempts(0.0, &mut low()), 0);
    }

    #[test]
    fn fraction_is_a_coin_flip() {
        assert_eq!(attempts(0.3, &mut low()), 1);
        assert_eq!(attempts(0.3, &mut high()), 0);
        assert_eq!(attempts(2.5, &mut low()), 3);
        assert_eq!(attempts(2.5, &mut high()), 2);
    }

    #[test]
    fn sampling_rate_matches_fraction() {
        let mut rng = StdRng::seed_from_u64(7);
        let runs = 20_000;
        let total: usize = (0..runs).map(|_| attempts(0.3, &mut rng)).sum();
        let rate = total as f64 / runs as f64;
        assert!((0.27..0.33).contains(&rate), "sampled rate {rate}");
    }

    #[test]
    fn fractional_part_above_whole_is_at_most_one_extra() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let n = attempts(2.5, &mut rng);
            assert!(n == 2 || n == 3);
        }
    }

    #[test]
    fn huge_multipliers_are_clamped() {
        assert_eq!(attempts(1e17, &mut low()), 1000);
        assert_eq!(attempts(f64::INFINITY, &mut high()), 1000);
        assert_eq!(attempts(f64::NAN, &mut low()), 0);
    }
}
