//! The leaf of the meter tree: an atomic fraction with a weight.
//!
//! A [MeterTerminal] is a whole-note fraction `N/D` (denominator a
//! power of two up to 1/2048) carrying a relative strength scalar.
//! Its duration in quarter-notes is always `4N/D` and is recomputed
//! on every mutation of the ratio.
//!
//! # Examples
//!
//! ```
//! use meter_model::{MeterTerminal, RationalDuration};
//!
//! let t: MeterTerminal = "3/8".parse().unwrap();
//! assert_eq!(t.numerator(), 3);
//! assert_eq!(t.denominator(), 8);
//! assert_eq!(t.duration(), RationalDuration::from(1.5));
//! assert_eq!(t.weight(), 1.0);
//!
//! let seq = t.subdivide(3).unwrap();
//! assert_eq!(seq.len(), 3);
//! assert_eq!(seq.duration(), RationalDuration::from(1.5));
//! ```

use std::fmt;
use std::str::FromStr;

use fraction::Fraction;

use crate::duration::{RationalDuration, MAX_DENOMINATOR};
use crate::error::{MeterError, MeterResult};
use crate::sequence::{MeterNode, MeterSequence};

pub(crate) fn is_valid_denominator(denominator: u32) -> bool {
    denominator.is_power_of_two() && denominator <= MAX_DENOMINATOR
}

/// Preset splits for numerators that have no even grouping.
///
/// Consulted by [MeterTerminal::subdivide] and by the
/// partition-options table before falling back to an
/// as-even-as-possible split.
pub(crate) fn preset_splits(numerator: u32) -> &'static [&'static [u32]] {
    match numerator {
        5 => &[&[2, 3], &[3, 2], &[2, 2, 1]],
        7 => &[&[2, 2, 3], &[3, 2, 2], &[2, 3, 2], &[3, 4], &[4, 3]],
        11 => &[
            &[3, 3, 3, 2],
            &[2, 3, 3, 3],
            &[3, 3, 2, 3],
            &[3, 2, 3, 3],
        ],
        13 => &[&[3, 3, 3, 2, 2], &[2, 2, 3, 3, 3], &[3, 3, 2, 2, 3]],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterTerminal {
    numerator: u32,
    denominator: u32,
    weight: f64,
    duration: RationalDuration,
}

impl MeterTerminal {
    pub fn new(numerator: u32, denominator: u32) -> MeterResult<Self> {
        if !is_valid_denominator(denominator) {
            return Err(MeterError::InvalidDenominator(denominator));
        }
        if numerator == 0 {
            return Err(MeterError::Parse(format!(
                "zero numerator in {numerator}/{denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
            weight: 1.0,
            duration: RationalDuration::from_whole_fraction(
                numerator,
                denominator,
            ),
        })
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }
    pub fn denominator(&self) -> u32 {
        self.denominator
    }
    pub fn duration(&self) -> RationalDuration {
        self.duration
    }
    pub fn weight(&self) -> f64 {
        self.weight
    }
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Whole-note fraction of this terminal.
    pub fn fraction(&self) -> Fraction {
        Fraction::new(self.numerator as u64, self.denominator as u64)
    }

    /// Replace the ratio; duration is recomputed, weight is kept.
    pub fn set_ratio(
        &mut self,
        numerator: u32,
        denominator: u32,
    ) -> MeterResult<()> {
        if !is_valid_denominator(denominator) {
            return Err(MeterError::InvalidDenominator(denominator));
        }
        self.numerator = numerator;
        self.denominator = denominator;
        self.duration = RationalDuration::from_whole_fraction(
            numerator,
            denominator,
        );
        Ok(())
    }

    /// Split into `count` parts whose fractions sum to this
    /// terminal's fraction.
    ///
    /// Even splits are preferred; numerators with a preset
    /// (5, 7, 11, 13) consult it; anything else splits as evenly
    /// as possible with the remainder absorbed by the last part.
    /// The ratio is scaled up (3/4 → 6/8) while the numerator is
    /// smaller than `count`.
    pub fn subdivide(&self, count: usize) -> MeterResult<MeterSequence> {
        if count == 0 {
            return Err(MeterError::UnsupportedPartitionCount {
                ratio: self.to_string(),
                requested: 0,
            });
        }
        let (mut n, mut d) = (self.numerator, self.denominator);
        while (n as usize) < count {
            if d * 2 > MAX_DENOMINATOR {
                return Err(MeterError::UnsupportedPartitionCount {
                    ratio: self.to_string(),
                    requested: count,
                });
            }
            n *= 2;
            d *= 2;
        }
        let numerators: Vec<u32> = if n as usize % count == 0 {
            vec![n / count as u32; count]
        } else {
            match preset_splits(n)
                .iter()
                .find(|split| split.len() == count)
            {
                Some(split) => split.to_vec(),
                None => {
                    let base = n / count as u32;
                    let mut parts = vec![base; count];
                    *parts.last_mut().expect("count > 0") +=
                        n % count as u32;
                    parts
                }
            }
        };
        let children = numerators
            .iter()
            .map(|num| Ok(MeterNode::Terminal(Self::new(*num, d)?)))
            .collect::<MeterResult<Vec<MeterNode>>>()?;
        Ok(MeterSequence::from_parts(
            children,
            self.numerator,
            self.denominator,
            false,
        ))
    }

    /// Split by an explicit list of fraction strings.
    ///
    /// # Returns
    /// [MeterError::PartitionMismatch] if the supplied fractions do
    /// not sum to this terminal's duration.
    pub fn subdivide_by_list(
        &self,
        fractions: &[&str],
    ) -> MeterResult<MeterSequence> {
        let terminals = fractions
            .iter()
            .map(|f| f.parse::<MeterTerminal>())
            .collect::<MeterResult<Vec<MeterTerminal>>>()?;
        let sum = terminals
            .iter()
            .fold(RationalDuration::zero(), |acc, t| acc + t.duration());
        if sum != self.duration {
            return Err(MeterError::PartitionMismatch {
                supplied: fractions.join("+"),
                expected: self.to_string(),
            });
        }
        let children =
            terminals.into_iter().map(MeterNode::Terminal).collect();
        Ok(MeterSequence::from_parts(
            children,
            self.numerator,
            self.denominator,
            false,
        ))
    }
}

impl FromStr for MeterTerminal {
    type Err = MeterError;

    fn from_str(s: &str) -> MeterResult<Self> {
        let mut tokens = s.trim().split('/');
        let numerator = tokens
            .next()
            .and_then(|t| t.trim().parse::<u32>().ok())
            .ok_or_else(|| MeterError::Parse(s.to_string()))?;
        let denominator = tokens
            .next()
            .and_then(|t| t.trim().parse::<u32>().ok())
            .ok_or_else(|| MeterError::Parse(s.to_string()))?;
        if tokens.next().is_some() {
            return Err(MeterError::Parse(s.to_string()));
        }
        Self::new(numerator, denominator)
    }
}

impl fmt::Display for MeterTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
