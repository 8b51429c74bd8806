//! Exact rational duration in quarter-note units.
//!
//! Every length and offset of the meter model is a
//! [RationalDuration]: a non-negative rational amount of
//! quarter-notes. Arithmetic never goes through floating point, so
//! comparisons that decide structure are exact.
//!
//! # Examples
//!
//! ```
//! use fraction::Fraction;
//! use meter_model::RationalDuration;
//!
//! let half = RationalDuration::from_whole_fraction(1, 2);
//! assert_eq!(half.get(), Fraction::from(2.0));
//! let eight = RationalDuration::from(Fraction::new(1u64, 2u64));
//! assert_eq!(half, eight + eight + eight + eight);
//! ```

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Rem, Sub};

use fraction::Fraction;

/// Largest acceptable note-value denominator.
pub static MAX_DENOMINATOR: u32 = 2048;

#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct RationalDuration {
    quarters: Fraction,
}

impl RationalDuration {
    pub fn new(quarters: Fraction) -> Self {
        Self { quarters }
    }
    pub fn zero() -> Self {
        Self {
            quarters: Fraction::new(0u64, 1u64),
        }
    }

    /// Duration of a whole-note fraction `n/d`: `4n/d` quarters.
    pub fn from_whole_fraction(numerator: u32, denominator: u32) -> Self {
        Self {
            quarters: Fraction::new(
                4 * numerator as u64,
                denominator as u64,
            ),
        }
    }
    pub fn get(&self) -> Fraction {
        self.quarters
    }
    pub fn is_zero(&self) -> bool {
        self.quarters == Fraction::new(0u64, 1u64)
    }

    /// Subtraction that survives a negative result.
    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        if self.quarters < rhs.quarters {
            return None;
        }
        Some(Self::new(self.quarters - rhs.quarters))
    }

    /// The closest notational power-of-two type: the largest
    /// duration of the form `2^k` quarters that does not exceed
    /// self. A dotted eighth (3/4 quarters) classifies as an
    /// eighth (1/2 quarters).
    ///
    /// # Returns
    /// None for zero and for durations below the 2048th-note floor.
    pub fn closest_pow2_type(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        // breve ceiling, 2048th-note floor
        let mut t = Fraction::new(8u64, 1u64);
        let floor = Fraction::new(4u64, MAX_DENOMINATOR as u64);
        while t > self.quarters {
            if t < floor {
                return None;
            }
            t = t / Fraction::new(2u64, 1u64);
        }
        Some(Self::new(t))
    }

    /// How many beams the notational type of this duration
    /// carries: 0 for a quarter and longer, 1 for an eighth, 2 for
    /// a sixteenth and so on.
    pub fn beam_count(&self) -> usize {
        let t = match self.closest_pow2_type() {
            None => return 0,
            Some(t) => t.get(),
        };
        let mut q = Fraction::new(1u64, 1u64);
        let mut count = 0;
        while q > t {
            q = q / Fraction::new(2u64, 1u64);
            count += 1;
        }
        count
    }
}

impl From<Fraction> for RationalDuration {
    fn from(value: Fraction) -> Self {
        Self::new(value)
    }
}
impl From<f64> for RationalDuration {
    fn from(value: f64) -> Self {
        Self::new(Fraction::from(value))
    }
}
impl Add for RationalDuration {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.quarters + rhs.quarters)
    }
}
impl AddAssign for RationalDuration {
    fn add_assign(&mut self, rhs: Self) {
        self.quarters = self.quarters + rhs.quarters;
    }
}
impl Sub for RationalDuration {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        let frac = self.quarters - rhs.quarters;
        if frac.is_sign_negative() {
            panic!(
                "duration can not be negative. left: {}, right: {}",
                self.quarters, rhs.quarters
            );
        }
        Self::new(frac)
    }
}
impl Mul<Fraction> for RationalDuration {
    type Output = Self;
    fn mul(self, rhs: Fraction) -> Self {
        Self::new(self.quarters * rhs)
    }
}
impl Rem for RationalDuration {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        Self::new(self.quarters % rhs.quarters)
    }
}
impl fmt::Display for RationalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ql", self.quarters)
    }
}

#[cfg(test)]
mod tests {
    use fraction::Fraction;

    use super::RationalDuration;

    #[test]
    fn arithmetic() {
        let a = RationalDuration::from(1.0);
        let b = RationalDuration::from(Fraction::new(1u64, 2u64));
        assert_eq!(a + b, RationalDuration::from(1.5));
        assert_eq!(a - b, b);
        assert_eq!(
            RationalDuration::from(3.5) % RationalDuration::from(1.5),
            RationalDuration::from(0.5)
        );
        assert_eq!(a.checked_sub(&b), Some(b));
        assert_eq!(b.checked_sub(&a), None);
    }

    #[test]
    #[should_panic]
    fn negative_sub() {
        let _ = RationalDuration::from(1.0) - RationalDuration::from(2.0);
    }

    #[test]
    fn pow2_type() {
        let dotted_eight = RationalDuration::from(0.75);
        assert_eq!(
            dotted_eight.closest_pow2_type(),
            Some(RationalDuration::from(0.5))
        );
        assert_eq!(
            RationalDuration::from(1.0).closest_pow2_type(),
            Some(RationalDuration::from(1.0))
        );
        assert_eq!(RationalDuration::zero().closest_pow2_type(), None);
    }

    #[test]
    fn beam_counts() {
        assert_eq!(RationalDuration::from(1.0).beam_count(), 0);
        assert_eq!(RationalDuration::from(0.5).beam_count(), 1);
        assert_eq!(RationalDuration::from(0.75).beam_count(), 1);
        assert_eq!(RationalDuration::from(0.25).beam_count(), 2);
        assert_eq!(RationalDuration::from(0.125).beam_count(), 3);
        assert_eq!(RationalDuration::from(2.0).beam_count(), 0);
    }
}
