//! Inference of the best-fitting time signature for a measure.
//!
//! Candidate signatures are scored by how much accent weight the
//! note onsets collect: the meter under which the notes fall on
//! the strongest positions wins. Candidates share the measure's
//! total duration and differ in denominator, starting from the
//! coarsest power of two that keeps the numerator integral.

use fraction::Fraction;

use crate::duration::RationalDuration;
use crate::error::{MeterError, MeterResult};
use crate::time_signature::TimeSignature;

/// How many denominator doublings past the coarsest candidate are
/// tried.
static CANDIDATE_DOUBLINGS: usize = 2;

/// Infer the time signature that fits a run of note durations
/// best.
///
/// The measure length is taken from `total` when given, otherwise
/// from the sum of the durations. Onsets that sit on a candidate's
/// accent grid contribute that position's weight to the
/// candidate's score; the highest total wins, ties go to the
/// smaller denominator.
///
/// # Returns
/// [MeterError::Inference] for an empty measure or a total that no
/// power-of-two denominator expresses.
///
/// # Example
///
/// ```
/// use meter_model::{best_time_signature, RationalDuration};
///
/// let dotted = RationalDuration::from(1.5);
/// let ts = best_time_signature(&[dotted, dotted], None).unwrap();
/// assert_eq!(ts.ratio_string(), "6/8");
/// ```
pub fn best_time_signature(
    durations: &[RationalDuration],
    total: impl Into<Option<RationalDuration>>,
) -> MeterResult<TimeSignature> {
    let total = total.into().unwrap_or_else(|| {
        durations
            .iter()
            .fold(RationalDuration::zero(), |acc, d| acc + *d)
    });
    if total.is_zero() {
        return Err(MeterError::Inference(
            "measure has no duration".to_string(),
        ));
    }
    let mut onsets = Vec::with_capacity(durations.len());
    let mut acc = RationalDuration::zero();
    for duration in durations {
        onsets.push(acc);
        acc += *duration;
    }

    let mut best: Option<(f64, TimeSignature)> = None;
    for denominator in candidate_denominators(total) {
        let whole =
            total.get() * Fraction::new(denominator as u64, 4u64);
        let numerator = *whole.numer().expect("rational") as u32;
        let ts = TimeSignature::new(&format!(
            "{}/{}",
            numerator, denominator
        ))?;
        let score: f64 = onsets
            .iter()
            .map(|onset| {
                ts.get_accent_weight(*onset, 0, true, false)
                    .unwrap_or(0.0)
            })
            .sum();
        match &best {
            Some((top, _)) if score <= *top => {}
            _ => best = Some((score, ts)),
        }
    }
    best.map(|(_, ts)| ts).ok_or_else(|| {
        MeterError::Inference(format!(
            "no power-of-two denominator expresses {}",
            total
        ))
    })
}

/// The coarsest denominator that keeps `total` a whole number of
/// units, followed by its doublings.
fn candidate_denominators(
    total: RationalDuration,
) -> Vec<u32> {
    let mut out = Vec::new();
    let mut denominator = 1u32;
    while denominator <= 64 {
        let whole = total.get()
            * Fraction::new(denominator as u64, 4u64);
        if *whole.denom().expect("rational") == 1
            && *whole.numer().expect("rational") > 0
        {
            break;
        }
        denominator *= 2;
    }
    if denominator > 64 {
        return out;
    }
    for _ in 0..=CANDIDATE_DOUBLINGS {
        if denominator > 64 {
            break;
        }
        out.push(denominator);
        denominator *= 2;
    }
    out
}
