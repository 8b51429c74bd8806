//! Beam groups attached to notated elements.
//!
//! A [Beams] object is the per-element stack of beams, one [Beam]
//! per number starting at 1 (the eighth-note level). Anything that
//! can report a duration implements [Beamable] and can be fed to
//! [crate::TimeSignature::get_beams], which fills the beam types
//! from the meter hierarchy.

use std::fmt;

use crate::duration::RationalDuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamType {
    Start,
    Continue,
    Stop,
    /// A stub pointing left, toward the previous element.
    PartialLeft,
    /// A stub pointing right, toward the next element.
    PartialRight,
}

impl BeamType {
    /// Whether a beam of this type continues into the next
    /// element.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Start | Self::Continue)
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialLeft | Self::PartialRight)
    }
}

impl fmt::Display for BeamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Continue => "continue",
            Self::Stop => "stop",
            Self::PartialLeft => "partial-left",
            Self::PartialRight => "partial-right",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beam {
    pub number: usize,
    pub beam_type: BeamType,
}

/// The stack of beams of one element, ordered by number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Beams {
    beams: Vec<Beam>,
}

impl Beams {
    /// One provisional [BeamType::Start] beam per number in
    /// `1..=count`; the real types are resolved against the meter
    /// afterwards.
    pub fn fill(count: usize) -> Self {
        Self {
            beams: (1..=count)
                .map(|number| Beam {
                    number,
                    beam_type: BeamType::Start,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Beam> {
        self.beams.iter()
    }
    pub fn max_number(&self) -> usize {
        self.beams.iter().map(|b| b.number).max().unwrap_or(0)
    }
    pub fn has_number(&self, number: usize) -> bool {
        self.beams.iter().any(|b| b.number == number)
    }
    pub fn get(&self, number: usize) -> Option<&Beam> {
        self.beams.iter().find(|b| b.number == number)
    }

    pub fn set_type(&mut self, number: usize, beam_type: BeamType) {
        if let Some(beam) =
            self.beams.iter_mut().find(|b| b.number == number)
        {
            beam.beam_type = beam_type;
        }
    }

    pub fn remove_number(&mut self, number: usize) {
        self.beams.retain(|b| b.number != number);
    }
}

/// Anything carrying a duration that beams can be computed for.
/// Rests participate in the stream but never receive beams.
pub trait Beamable {
    fn quarter_length(&self) -> RationalDuration;
    fn is_rest(&self) -> bool {
        false
    }
}

impl Beamable for RationalDuration {
    fn quarter_length(&self) -> RationalDuration {
        *self
    }
}

/// One [Beams] slot per element, filled from the duration alone:
/// eighths get one beam, sixteenths two and so on; rests and
/// quarter-or-longer durations get none.
pub fn naive_beams<T: Beamable>(src: &[T]) -> Vec<Option<Beams>> {
    src.iter()
        .map(|el| {
            if el.is_rest() {
                return None;
            }
            let count = el.quarter_length().beam_count();
            if count == 0 {
                None
            } else {
                Some(Beams::fill(count))
            }
        })
        .collect()
}

/// Strip beams from elements that have unbeamable neighbours on
/// both sides: a lone eighth between rests is not beamed.
pub fn remove_sandwiched_unbeamables(
    beams_list: &mut [Option<Beams>],
) {
    let len = beams_list.len();
    for i in 0..len {
        if beams_list[i].is_none() {
            continue;
        }
        let prev_beamed =
            i > 0 && beams_list[i - 1].is_some();
        let next_beamed =
            i + 1 < len && beams_list[i + 1].is_some();
        if !prev_beamed && !next_beamed {
            beams_list[i] = None;
        }
    }
}

/// Drop beams that ended up all-partial, and partial stubs that
/// have no connected beam one number below in the same element.
pub fn sanitize_partial_beams(beams_list: &mut [Option<Beams>]) {
    for slot in beams_list.iter_mut() {
        let beams = match slot {
            None => continue,
            Some(beams) => beams,
        };
        if beams.iter().all(|b| b.beam_type.is_partial()) {
            *slot = None;
            continue;
        }
        let orphans: Vec<usize> = beams
            .iter()
            .filter(|b| {
                b.beam_type.is_partial()
                    && b.number > 1
                    && beams
                        .get(b.number - 1)
                        .map_or(true, |below| {
                            below.beam_type.is_partial()
                        })
            })
            .map(|b| b.number)
            .collect();
        for number in orphans {
            beams.remove_number(number);
        }
        if beams.is_empty() {
            *slot = None;
        }
    }
}

/// Turn facing partial stubs of the same number on adjacent
/// elements into a real two-element beam.
pub fn merge_connecting_partial_beams(
    beams_list: &mut [Option<Beams>],
) {
    for i in 1..beams_list.len() {
        let (head, tail) = beams_list.split_at_mut(i);
        let (left, right) =
            match (head.last_mut(), tail.first_mut()) {
                (Some(Some(l)), Some(Some(r))) => (l, r),
                _ => continue,
            };
        let facing: Vec<usize> = left
            .iter()
            .filter(|b| {
                b.beam_type == BeamType::PartialRight
                    && right
                        .get(b.number)
                        .map_or(false, |rb| {
                            rb.beam_type == BeamType::PartialLeft
                        })
            })
            .map(|b| b.number)
            .collect();
        for number in facing {
            left.set_type(number, BeamType::Start);
            right.set_type(number, BeamType::Stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::duration::RationalDuration;

    use super::{
        merge_connecting_partial_beams, naive_beams,
        remove_sandwiched_unbeamables, sanitize_partial_beams,
        BeamType, Beams,
    };

    struct Note {
        ql: RationalDuration,
        rest: bool,
    }
    impl super::Beamable for Note {
        fn quarter_length(&self) -> RationalDuration {
            self.ql
        }
        fn is_rest(&self) -> bool {
            self.rest
        }
    }
    fn note(ql: f64) -> Note {
        Note {
            ql: RationalDuration::from(ql),
            rest: false,
        }
    }
    fn rest(ql: f64) -> Note {
        Note {
            ql: RationalDuration::from(ql),
            rest: true,
        }
    }

    #[test]
    fn naive_counts() {
        let src =
            vec![note(0.5), note(0.25), rest(0.5), note(1.0)];
        let beams = naive_beams(&src);
        assert_eq!(
            beams[0].as_ref().map(|b| b.max_number()),
            Some(1)
        );
        assert_eq!(
            beams[1].as_ref().map(|b| b.max_number()),
            Some(2)
        );
        assert!(beams[2].is_none());
        assert!(beams[3].is_none());
    }

    #[test]
    fn sandwiched_unbeamable() {
        let src = vec![rest(0.5), note(0.5), rest(0.5), note(0.5),
            note(0.5)];
        let mut beams = naive_beams(&src);
        remove_sandwiched_unbeamables(&mut beams);
        assert!(beams[1].is_none());
        assert!(beams[3].is_some());
        assert!(beams[4].is_some());
    }

    #[test]
    fn all_partial_dropped() {
        let mut beams = Beams::fill(2);
        beams.set_type(1, BeamType::PartialLeft);
        beams.set_type(2, BeamType::PartialRight);
        let mut list = vec![Some(beams)];
        sanitize_partial_beams(&mut list);
        assert!(list[0].is_none());
    }

    #[test]
    fn orphan_partial_dropped() {
        let mut beams = Beams::fill(2);
        beams.set_type(1, BeamType::Stop);
        beams.set_type(2, BeamType::PartialRight);
        let mut list = vec![Some(beams)];
        sanitize_partial_beams(&mut list);
        let kept = list[0].as_ref().unwrap();
        assert!(kept.has_number(1));
        assert!(!kept.has_number(2));
    }

    #[test]
    fn facing_partials_merge() {
        let mut left = Beams::fill(1);
        left.set_type(1, BeamType::PartialRight);
        let mut right = Beams::fill(1);
        right.set_type(1, BeamType::PartialLeft);
        let mut list = vec![Some(left), Some(right)];
        merge_connecting_partial_beams(&mut list);
        assert_eq!(
            list[0].as_ref().unwrap().get(1).unwrap().beam_type,
            BeamType::Start
        );
        assert_eq!(
            list[1].as_ref().unwrap().get(1).unwrap().beam_type,
            BeamType::Stop
        );
    }
}
