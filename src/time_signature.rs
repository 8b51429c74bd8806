//! Time signature as four parallel meter hierarchies.
//!
//! One [TimeSignature] keeps four [MeterSequence]s over the same
//! bar: `display` (what is printed), `beam` (how flags group),
//! `beat` (what is counted) and `accent` (how strong each position
//! is). They always agree on the total duration, but each is
//! partitioned for its own purpose.
//!
//! # Examples
//!
//! ```
//! use meter_model::{RationalDuration, TimeSignature};
//!
//! let ts = TimeSignature::new("6/8").unwrap();
//! assert_eq!(ts.beat_count(), 2);
//! assert_eq!(ts.beat_duration().unwrap(), RationalDuration::from(1.5));
//!
//! let slow = TimeSignature::new("slow 6/8").unwrap();
//! assert_eq!(slow.beat_count(), 6);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use fraction::Fraction;
use once_cell::sync::Lazy;

use crate::beam::{
    merge_connecting_partial_beams, naive_beams,
    remove_sandwiched_unbeamables, sanitize_partial_beams, Beamable,
    BeamType, Beams,
};
use crate::duration::RationalDuration;
use crate::error::{MeterError, MeterResult};
use crate::sequence::{Align, FirstPartition, MeterSequence};
use crate::terminal::MeterTerminal;

/// Accent hierarchies are expensive to build and identical for
/// every signature with the same ratio, beat count and depth, so
/// the weighted leaves are shared process-wide.
static ACCENT_ARCHETYPES: Lazy<
    Mutex<HashMap<(String, usize, usize), Vec<MeterTerminal>>>,
> = Lazy::new(|| Mutex::new(HashMap::new()));

static ACCENT_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSignatureSymbol {
    Normal,
    Common,
    Cut,
}

/// Qualifier parsed from a `"fast "`/`"slow "` prefix, biasing the
/// default beat partition of ambiguous numerators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisionPreference {
    Fast,
    Slow,
    Neutral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSignature {
    ratio: String,
    symbol: TimeSignatureSymbol,
    division: DivisionPreference,
    display: MeterSequence,
    beam: MeterSequence,
    beat: MeterSequence,
    accent: MeterSequence,
}

impl TimeSignature {
    /// Parse a ratio like `"4/4"`, `"2/4+3/8"`, an alias
    /// (`"c"`, `"common"`, `"cut"`, `"allabreve"`) or a qualified
    /// form like `"slow 6/8"`, and derive the default partitions
    /// of all four sequences.
    pub fn new(value: &str) -> MeterResult<Self> {
        let (core, symbol, division) = parse_components(value)?;
        let display = MeterSequence::new(&core)?;
        let mut ts = Self {
            ratio: display.ratio_string(),
            symbol,
            division,
            beam: display.clone(),
            beat: display.clone(),
            accent: display.clone(),
            display,
        };
        ts.set_default_beam_partitions()?;
        ts.set_default_beat_partitions()?;
        ts.set_default_accent_weights(ACCENT_DEPTH)?;
        Ok(ts)
    }

    pub fn numerator(&self) -> u32 {
        self.display.numerator()
    }
    pub fn denominator(&self) -> u32 {
        self.display.denominator()
    }
    /// Total duration of one bar.
    pub fn bar_duration(&self) -> RationalDuration {
        self.display.duration()
    }
    pub fn ratio_string(&self) -> &str {
        &self.ratio
    }
    pub fn symbol(&self) -> TimeSignatureSymbol {
        self.symbol
    }
    pub fn division(&self) -> DivisionPreference {
        self.division
    }
    pub fn is_summed(&self) -> bool {
        self.display.summed_numerator()
    }

    pub fn display_sequence(&self) -> &MeterSequence {
        &self.display
    }
    pub fn beam_sequence(&self) -> &MeterSequence {
        &self.beam
    }
    pub fn beat_sequence(&self) -> &MeterSequence {
        &self.beat
    }
    pub fn accent_sequence(&self) -> &MeterSequence {
        &self.accent
    }

    fn set_default_beam_partitions(&mut self) -> MeterResult<()> {
        if self.beam.summed_numerator() {
            return Ok(());
        }
        let (n, d) =
            (self.beam.numerator(), self.beam.denominator());
        // short bars of small notes are beamed through
        if (d == 8 && n <= 3)
            || (d == 16 && n <= 5)
            || (d == 32 && n <= 11)
        {
            return Ok(());
        }
        match n {
            2..=4 => {
                self.beam.partition_by_count(n as usize, true)?;
                if d == 4 {
                    self.beam
                        .subdivide_partitions_equal(Some(2))?;
                }
            }
            5 => self.beam.partition_by_list(&["2", "3"])?,
            7 => self.beam.partition_by_list(&["2", "2", "3"])?,
            n if n % 3 == 0 && n >= 6 => {
                self.beam
                    .partition_by_count((n / 3) as usize, true)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn set_default_beat_partitions(&mut self) -> MeterResult<()> {
        if !self.beat.summed_numerator() {
            let (n, d) =
                (self.beat.numerator(), self.beat.denominator());
            let count = match self.division {
                DivisionPreference::Slow => n as usize,
                _ => match n {
                    2 | 6 => 2,
                    3 => {
                        if self.division == DivisionPreference::Fast
                            || d >= 8
                        {
                            1
                        } else {
                            3
                        }
                    }
                    9 => 3,
                    4 | 12 => 4,
                    n if n >= 15 && n % 3 == 0 => (n / 3) as usize,
                    n => n as usize,
                },
            };
            self.beat.partition_by_count(count, true)?;
        }
        self.beat.subdivide_partitions_equal(None)
    }

    /// Build the flat accent sequence from a nested hierarchy of
    /// the given depth seeded by the beat partition. Every leaf's
    /// weight doubles per hierarchical level coinciding with its
    /// start; the downbeat always weighs 1.0.
    fn set_default_accent_weights(
        &mut self,
        depth: usize,
    ) -> MeterResult<()> {
        let uniform = self.beat.is_uniform_partition()
            && !self.beat.summed_numerator();
        let key =
            (self.ratio.clone(), self.beat.len(), depth);
        if uniform {
            if let Ok(cache) = ACCENT_ARCHETYPES.lock() {
                if let Some(leaves) = cache.get(&key) {
                    self.accent = accent_from_leaves(
                        leaves.clone(),
                        &self.display,
                    );
                    return Ok(());
                }
            }
        }
        let first = if uniform {
            FirstPartition::Count(self.beat.len())
        } else {
            FirstPartition::Form(self.beat.get_level(0))
        };
        let mut hierarchy = MeterSequence::new(&self.ratio)?;
        hierarchy.subdivide_nested_hierarchy(
            depth,
            Some(first),
            true,
        )?;
        let max_score = hierarchy.depth();
        let min_weight = 2f64.powi(1 - max_score as i32);
        let mut leaves = Vec::new();
        let mut start = RationalDuration::zero();
        for mut leaf in hierarchy.flat() {
            let score =
                hierarchy.offset_to_depth(start, Align::Start)?;
            leaf.set_weight(
                min_weight * 2f64.powi(score as i32 - 1),
            );
            start += leaf.duration();
            leaves.push(leaf);
        }
        if uniform {
            if let Ok(mut cache) = ACCENT_ARCHETYPES.lock() {
                cache.insert(key, leaves.clone());
            }
        }
        self.accent = accent_from_leaves(leaves, &self.display);
        Ok(())
    }

    pub fn beat_count(&self) -> usize {
        self.beat.len()
    }

    /// Repartition the beat sequence to an exact count and rebuild
    /// the dependent accent weights.
    ///
    /// # Returns
    /// [MeterError::UnsupportedPartitionCount] when the ratio has
    /// no partition with that many parts.
    pub fn set_beat_count(&mut self, count: usize) -> MeterResult<()> {
        self.beat.partition_by_count(count, false)?;
        self.beat.subdivide_partitions_equal(None)?;
        self.set_default_accent_weights(ACCENT_DEPTH)
    }

    /// 1-based beat the offset falls into.
    pub fn get_beat(
        &self,
        offset: RationalDuration,
    ) -> MeterResult<usize> {
        Ok(self.beat.offset_to_index(offset, false)? + 1)
    }

    /// Start offsets of all beats.
    pub fn get_beat_offsets(&self) -> Vec<RationalDuration> {
        self.beat
            .get_level_spans(0)
            .iter()
            .map(|(start, _)| *start)
            .collect()
    }

    /// Duration of one beat when all beats are equal.
    ///
    /// # Returns
    /// [MeterError::NonUniformQuery] for unequal beats (ask
    /// [Self::get_beat_duration] with an offset instead).
    pub fn beat_duration(&self) -> MeterResult<RationalDuration> {
        if !self.beat.is_uniform_partition() {
            return Err(MeterError::NonUniformQuery(
                self.ratio.clone(),
            ));
        }
        match self.beat.children().first() {
            Some(child) => Ok(child.duration()),
            None => Err(MeterError::NonUniformQuery(
                self.ratio.clone(),
            )),
        }
    }

    /// Duration of the beat the offset falls into.
    pub fn get_beat_duration(
        &self,
        offset: RationalDuration,
    ) -> MeterResult<RationalDuration> {
        let index = self.beat.offset_to_index(offset, false)?;
        Ok(self.beat.children()[index].duration())
    }

    /// Offset of a 1-based, possibly fractional beat position:
    /// beat 2.5 of 4/4 is 1.5 quarters in.
    pub fn get_offset_from_beat(
        &self,
        beat: Fraction,
    ) -> MeterResult<RationalDuration> {
        let out_of_range = || MeterError::OutOfRange {
            offset: format!("beat {}", beat),
            total: format!("{} beats", self.beat.len()),
        };
        if beat < Fraction::new(1u64, 1u64) {
            return Err(out_of_range());
        }
        let rel = beat - Fraction::new(1u64, 1u64);
        let index = (*rel.numer().expect("rational")
            / *rel.denom().expect("rational"))
            as usize;
        if index >= self.beat.len() {
            return Err(out_of_range());
        }
        let remainder =
            rel - Fraction::new(index as u64, 1u64);
        let spans = self.beat.get_level_spans(0);
        let (start, end) = spans[index];
        Ok(start + (end - start) * remainder)
    }

    /// How many metrical levels of the beat hierarchy the offset
    /// sits on.
    pub fn get_beat_depth(
        &self,
        offset: RationalDuration,
        align: Align,
    ) -> MeterResult<usize> {
        self.beat.offset_to_depth(offset, align)
    }

    /// Accent strength at an offset, 1.0 on the downbeat.
    ///
    /// The offset is evaluated against the accent sequence
    /// flattened at `level`; a span collapsed at that level weighs
    /// the sum of its parts. The default accent sequence is flat,
    /// so every level answers the same there.
    ///
    /// With `force_position_match` the offset must coincide with a
    /// boundary of the level exactly; with `permit_modulus` offsets
    /// past the bar wrap around.
    pub fn get_accent_weight(
        &self,
        offset: RationalDuration,
        level: usize,
        force_position_match: bool,
        permit_modulus: bool,
    ) -> MeterResult<f64> {
        let offset = if permit_modulus {
            offset % self.bar_duration()
        } else {
            offset
        };
        let ms_level = self.accent.get_level(level);
        let index = ms_level.offset_to_index(offset, false)?;
        if force_position_match {
            let (start, _) =
                ms_level.offset_to_span(offset, false)?;
            if start != offset {
                return Err(MeterError::OutOfRange {
                    offset: offset.to_string(),
                    total: self.bar_duration().to_string(),
                });
            }
        }
        Ok(ms_level.children()[index].weight())
    }

    /// Resolve beams for a run of elements against the beam
    /// hierarchy. `measure_start_offset` places the first element
    /// inside the bar; `None` means the downbeat.
    pub fn get_beams<T: Beamable>(
        &self,
        src: &[T],
        measure_start_offset: impl Into<Option<RationalDuration>>,
    ) -> MeterResult<Vec<Option<Beams>>> {
        let measure_start = measure_start_offset
            .into()
            .unwrap_or_else(RationalDuration::zero);
        let bar = self.bar_duration();
        let durations: Vec<RationalDuration> =
            src.iter().map(|el| el.quarter_length()).collect();
        let mut offsets = Vec::with_capacity(src.len());
        let mut acc = measure_start;
        for duration in &durations {
            offsets.push(acc % bar);
            acc += *duration;
        }

        let mut beams_list = naive_beams(src);
        remove_sandwiched_unbeamables(&mut beams_list);
        let max_number = beams_list
            .iter()
            .flatten()
            .map(|b| b.max_number())
            .max()
            .unwrap_or(0);

        for depth in 0..max_number {
            let number = depth + 1;
            let archetype = self.beam.get_level(depth);
            for i in 0..beams_list.len() {
                let has = beams_list[i]
                    .as_ref()
                    .map_or(false, |b| b.has_number(number));
                if !has {
                    continue;
                }
                let start = offsets[i];
                let end = start + durations[i];
                let (arch_start, arch_end) =
                    archetype.offset_to_span(start, true)?;
                let prev_type = i
                    .checked_sub(1)
                    .and_then(|p| beams_list[p].as_ref())
                    .and_then(|b| b.get(number))
                    .map(|b| b.beam_type);
                let prev_beamable = i > 0
                    && beams_list[i - 1].is_some();
                let next_has = beams_list
                    .get(i + 1)
                    .and_then(|n| n.as_ref())
                    .map_or(false, |b| b.has_number(number));
                // a lone note filling its whole archetype span
                // carries nothing to connect to
                if start == arch_start
                    && end == arch_end
                    && prev_type.is_none()
                {
                    let slot = beams_list[i]
                        .as_mut()
                        .expect("checked above");
                    slot.remove_number(number);
                    if slot.is_empty() {
                        beams_list[i] = None;
                    }
                    continue;
                }
                let next_continues = next_has && end < arch_end;
                let beam_type = if i == 0 && start.is_zero() {
                    if next_has {
                        BeamType::Start
                    } else {
                        BeamType::PartialRight
                    }
                } else if i == beams_list.len() - 1 && end == bar {
                    if prev_type.is_some() {
                        BeamType::Stop
                    } else {
                        BeamType::PartialLeft
                    }
                } else if !prev_type
                    .map_or(false, |t| t.is_open())
                {
                    if next_continues {
                        BeamType::Start
                    } else if prev_beamable {
                        BeamType::PartialLeft
                    } else {
                        BeamType::PartialRight
                    }
                } else if next_continues {
                    BeamType::Continue
                } else {
                    BeamType::Stop
                };
                beams_list[i]
                    .as_mut()
                    .expect("checked above")
                    .set_type(number, beam_type);
            }
        }
        sanitize_partial_beams(&mut beams_list);
        merge_connecting_partial_beams(&mut beams_list);
        Ok(beams_list)
    }
}

impl FromStr for TimeSignature {
    type Err = MeterError;

    fn from_str(s: &str) -> MeterResult<Self> {
        Self::new(s)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ratio)
    }
}

fn accent_from_leaves(
    leaves: Vec<MeterTerminal>,
    display: &MeterSequence,
) -> MeterSequence {
    MeterSequence::from_parts(
        leaves
            .into_iter()
            .map(crate::sequence::MeterNode::Terminal)
            .collect(),
        display.numerator(),
        display.denominator(),
        display.summed_numerator(),
    )
}

fn parse_components(
    value: &str,
) -> MeterResult<(String, TimeSignatureSymbol, DivisionPreference)> {
    let trimmed = value.trim();
    let lowered = trimmed.to_lowercase();
    let (rest, division) =
        if let Some(rest) = lowered.strip_prefix("fast ") {
            (rest, DivisionPreference::Fast)
        } else if let Some(rest) = lowered.strip_prefix("slow ") {
            (rest, DivisionPreference::Slow)
        } else {
            (lowered.as_str(), DivisionPreference::Neutral)
        };
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(MeterError::Parse(value.to_string()));
    }
    let (core, symbol) = match rest {
        "c" | "common" => ("4/4", TimeSignatureSymbol::Common),
        "cut" | "allabreve" => ("2/2", TimeSignatureSymbol::Cut),
        other => (other, TimeSignatureSymbol::Normal),
    };
    Ok((core.to_string(), symbol, division))
}

#[cfg(test)]
mod tests {
    use fraction::Fraction;

    use crate::duration::RationalDuration;
    use crate::error::MeterError;
    use crate::sequence::fraction_to_f64;

    use super::{
        DivisionPreference, TimeSignature, TimeSignatureSymbol,
    };

    #[test]
    fn aliases_and_qualifiers() {
        let common = TimeSignature::new("common").unwrap();
        assert_eq!(common.ratio_string(), "4/4");
        assert_eq!(common.symbol(), TimeSignatureSymbol::Common);
        let cut = TimeSignature::new("cut").unwrap();
        assert_eq!(cut.ratio_string(), "2/2");
        assert_eq!(cut.symbol(), TimeSignatureSymbol::Cut);
        let fast = TimeSignature::new("fast 3/4").unwrap();
        assert_eq!(fast.division(), DivisionPreference::Fast);
        assert_eq!(fast.beat_count(), 1);
        assert!(matches!(
            TimeSignature::new("3/7"),
            Err(MeterError::InvalidDenominator(7))
        ));
    }

    #[test]
    fn default_beat_counts() {
        for (value, count) in [
            ("6/8", 2),
            ("slow 6/8", 6),
            ("3/8", 1),
            ("3/4", 3),
            ("4/4", 4),
            ("9/8", 3),
            ("12/8", 4),
            ("2/2", 2),
        ] {
            let ts = TimeSignature::new(value).unwrap();
            assert_eq!(
                ts.beat_count(),
                count,
                "beat count of {}",
                value
            );
        }
    }

    #[test]
    fn beat_queries() {
        let ts = TimeSignature::new("6/8").unwrap();
        assert_eq!(
            ts.beat_duration().unwrap(),
            RationalDuration::from(1.5)
        );
        assert_eq!(
            ts.get_beat(RationalDuration::from(1.0)).unwrap(),
            1
        );
        assert_eq!(
            ts.get_beat(RationalDuration::from(1.5)).unwrap(),
            2
        );
        assert_eq!(
            ts.get_beat_offsets(),
            vec![
                RationalDuration::zero(),
                RationalDuration::from(1.5)
            ]
        );
    }

    #[test]
    fn nonuniform_beat_duration() {
        let ts = TimeSignature::new("2/4+3/8").unwrap();
        assert!(matches!(
            ts.beat_duration(),
            Err(MeterError::NonUniformQuery(_))
        ));
        assert_eq!(
            ts.get_beat_duration(RationalDuration::from(0.5))
                .unwrap(),
            RationalDuration::from(2.0)
        );
        assert_eq!(
            ts.get_beat_duration(RationalDuration::from(2.5))
                .unwrap(),
            RationalDuration::from(1.5)
        );
    }

    #[test]
    fn offset_from_beat() {
        let ts = TimeSignature::new("4/4").unwrap();
        assert_eq!(
            ts.get_offset_from_beat(Fraction::from(1.0)).unwrap(),
            RationalDuration::zero()
        );
        assert_eq!(
            ts.get_offset_from_beat(Fraction::from(2.5)).unwrap(),
            RationalDuration::from(1.5)
        );
        assert!(ts
            .get_offset_from_beat(Fraction::from(5.0))
            .is_err());
        assert!(ts
            .get_offset_from_beat(Fraction::from(0.5))
            .is_err());
    }

    #[test]
    fn accent_weights_four_four() {
        let ts = TimeSignature::new("4/4").unwrap();
        let seq = ts.accent_sequence();
        assert_eq!(seq.len(), 16);
        let weights: Vec<f64> = seq
            .children()
            .iter()
            .map(|c| c.weight())
            .collect();
        // downbeat is the unique maximum, the half-bar is next,
        // then the remaining quarters, then eighths
        let expected = [
            1.0, 0.125, 0.25, 0.125, 0.5, 0.125, 0.25, 0.125,
            0.5, 0.125, 0.25, 0.125, 0.5, 0.125, 0.25, 0.125,
        ];
        for (i, (got, want)) in
            weights.iter().zip(expected.iter()).enumerate()
        {
            assert!(
                (got - want).abs() < 1e-9,
                "weight {} at index {}, expected {}",
                got,
                i,
                want
            );
        }
        assert_eq!(
            ts.get_accent_weight(
                RationalDuration::zero(),
                0,
                false,
                false
            )
            .unwrap(),
            1.0
        );
        assert_eq!(
            ts.get_accent_weight(
                RationalDuration::from(2.0),
                0,
                false,
                false
            )
            .unwrap(),
            0.5
        );
        assert_eq!(
            ts.get_accent_weight(
                RationalDuration::from(1.0),
                0,
                false,
                false
            )
            .unwrap(),
            0.25
        );
    }

    #[test]
    fn accent_levels_agree_on_flat_sequence() {
        let ts = TimeSignature::new("4/4").unwrap();
        for offset in [0.0, 0.5, 1.0, 2.0, 3.75] {
            let offset = RationalDuration::from(offset);
            let base = ts
                .get_accent_weight(offset, 0, false, false)
                .unwrap();
            for level in [1, 2, 5] {
                assert_eq!(
                    ts.get_accent_weight(
                        offset, level, false, false
                    )
                    .unwrap(),
                    base
                );
            }
        }
    }

    #[test]
    fn accent_weight_modes() {
        let ts = TimeSignature::new("4/4").unwrap();
        // wraps into the second bar
        assert_eq!(
            ts.get_accent_weight(
                RationalDuration::from(4.0),
                0,
                false,
                true
            )
            .unwrap(),
            1.0
        );
        assert!(ts
            .get_accent_weight(
                RationalDuration::from(4.0),
                0,
                false,
                false
            )
            .is_err());
        // off-grid offset fails only under position matching
        let off = RationalDuration::from(0.1);
        assert!(ts
            .get_accent_weight(off, 0, false, false)
            .is_ok());
        assert!(ts
            .get_accent_weight(off, 0, true, false)
            .is_err());
    }

    #[test]
    fn accent_cache_consistency() {
        let a = TimeSignature::new("4/4").unwrap();
        let b = TimeSignature::new("4/4").unwrap();
        assert_eq!(a.accent_sequence(), b.accent_sequence());
    }

    #[test]
    fn set_beat_count() {
        let mut ts = TimeSignature::new("6/8").unwrap();
        ts.set_beat_count(6).unwrap();
        assert_eq!(ts.beat_count(), 6);
        assert_eq!(
            ts.beat_duration().unwrap(),
            RationalDuration::from(0.5)
        );
        assert!(matches!(
            ts.set_beat_count(4),
            Err(MeterError::UnsupportedPartitionCount { .. })
        ));
    }

    #[test]
    fn summed_ratio_round_trip() {
        let ts = TimeSignature::new("2/4+3/8").unwrap();
        assert_eq!(ts.ratio_string(), "2/4+3/8");
        assert_eq!(ts.numerator(), 7);
        assert_eq!(ts.denominator(), 8);
        assert_eq!(
            ts.bar_duration(),
            RationalDuration::from(3.5)
        );
        assert_eq!(ts.beat_count(), 2);
    }

    #[test]
    fn weight_total_is_finite() {
        let ts = TimeSignature::new("5/8").unwrap();
        let total: f64 = ts
            .accent_sequence()
            .children()
            .iter()
            .map(|c| c.weight())
            .sum();
        assert!(total > 0.0);
        assert!(
            fraction_to_f64(
                ts.accent_sequence().duration().get()
            ) > 0.0
        );
    }
}
