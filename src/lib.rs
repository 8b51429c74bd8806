//! Hierarchical meter model.
//!
//! A time signature is modelled as a tree of whole-note fractions:
//! leaves are [MeterTerminal]s, inner nodes are [MeterSequence]s,
//! and a [TimeSignature] holds four such trees over the same bar,
//! one each for display, beaming, beats and accents. All positions
//! and lengths are exact rationals ([RationalDuration], in
//! quarter-note units).
//!
//! ```
//! use meter_model::{RationalDuration, TimeSignature};
//!
//! let ts = TimeSignature::new("6/8").unwrap();
//! assert_eq!(ts.beat_count(), 2);
//! assert_eq!(
//!     ts.get_accent_weight(RationalDuration::zero(), 0, false, false)
//!         .unwrap(),
//!     1.0
//! );
//! ```

pub mod beam;
pub mod best_fit;
pub mod duration;
pub mod error;
mod options;
pub mod sequence;
pub mod terminal;
pub mod time_signature;

pub use beam::{Beam, Beamable, Beams, BeamType};
pub use best_fit::best_time_signature;
pub use duration::{RationalDuration, MAX_DENOMINATOR};
pub use error::{MeterError, MeterResult};
pub use sequence::{Align, FirstPartition, MeterNode, MeterSequence};
pub use terminal::MeterTerminal;
pub use time_signature::{
    DivisionPreference, TimeSignature, TimeSignatureSymbol,
};
