//! Replica count policy.
//!
//! A multiplier of `m + p` (with `0 <= p < 1`) always sends `m` copies and
//! one extra with probability `p`, so the mean over many requests is the
//! multiplier itself.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardCount {
    whole: u32,
    fraction: f64,
}

impl ForwardCount {
    /// Returns `None` for negative, NaN or infinite multipliers.
    pub fn new(multiply: f64) -> Option<Self> {
        if !multiply.is_finite() || multiply < 0.0 || multiply > f64::from(u32::MAX) {
            return None;
        }
        let whole = multiply.floor();
        Some(Self {
            whole: whole as u32,
            fraction: multiply - whole,
        })
    }

    pub fn multiply(&self) -> f64 {
        f64::from(self.whole) + self.fraction
    }

    /// Draws a count from the calling thread's generator.
    ///
    /// `thread_rng` is per-thread, so concurrent flows never contend on it.
    pub fn draw(&self) -> u32 {
        self.draw_with(&mut rand::thread_rng())
    }

    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.fraction > 0.0 && rng.gen::<f64>() < self.fraction {
            self.whole + 1
        } else {
            self.whole
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn zero_never_forwards() {
        let count = ForwardCount::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..1000).all(|_| count.draw_with(&mut rng) == 0));
    }

    #[test]
    fn integral_multiplier_is_exact() {
        let count = ForwardCount::new(2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        assert!((0..1000).all(|_| count.draw_with(&mut rng) == 2));
        assert_eq!(count.draw(), 2);
    }

    #[test]
    fn fractional_multiplier_converges_to_mean() {
        let count = ForwardCount::new(1.5).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let draws = 100_000;
        let total: u64 = (0..draws).map(|_| u64::from(count.draw_with(&mut rng))).sum();
        let mean = total as f64 / draws as f64;
        assert!((mean - 1.5).abs() < 0.01, "mean was {mean}");
    }

    #[test]
    fn fractional_draws_stay_in_range() {
        let count = ForwardCount::new(0.25).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        assert!((0..1000).all(|_| count.draw_with(&mut rng) <= 1));
    }

    #[test]
    fn rejects_invalid_multipliers() {
        assert!(ForwardCount::new(-0.5).is_none());
        assert!(ForwardCount::new(f64::NAN).is_none());
        assert!(ForwardCount::new(f64::INFINITY).is_none());
        assert_eq!(ForwardCount::new(3.25).unwrap().multiply(), 3.25);
    }
}
