//! Composite node of the meter tree.
//!
//! A [MeterSequence] is an ordered list of children, each either a
//! [MeterTerminal] or another sequence. Its own ratio is derived
//! from the children: any mutation that changes the total duration
//! adopts the new summed ratio, while partitions that preserve the
//! total keep the identity the sequence was loaded with (so a 6/8
//! partitioned into 3/8+3/8 stays a 6/8).
//!
//! Children are owned exclusively: reusing another sequence's
//! substructure always deep-copies, and `load` is always
//! destructive, rebuilding the children from scratch.
//!
//! # Examples
//!
//! ```
//! use meter_model::{MeterSequence, RationalDuration};
//!
//! let mut ms = MeterSequence::new("6/8").unwrap();
//! assert_eq!(ms.numerator(), 6);
//! ms.partition_by_count(2, false).unwrap();
//! assert_eq!(ms.to_string(), "{3/8+3/8}");
//! assert_eq!(ms.numerator(), 6);
//! assert_eq!(ms.duration(), RationalDuration::from(3.0));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use fraction::Fraction;

use crate::duration::{RationalDuration, MAX_DENOMINATOR};
use crate::error::{MeterError, MeterResult};
use crate::options::partition_options;
use crate::terminal::{is_valid_denominator, MeterTerminal};

/// How an offset is matched against level boundaries in
/// [MeterSequence::offset_to_depth].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// Snap to the start of the finest-level span first.
    Quantize,
    /// Match span starts exactly.
    Start,
    /// Match span ends exactly.
    End,
}

/// Seed of the first level of [MeterSequence::subdivide_nested_hierarchy].
#[derive(Debug, Clone)]
pub enum FirstPartition {
    Count(usize),
    Form(MeterSequence),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeterNode {
    Terminal(MeterTerminal),
    Sequence(MeterSequence),
}

impl MeterNode {
    pub fn duration(&self) -> RationalDuration {
        match self {
            Self::Terminal(t) => t.duration(),
            Self::Sequence(s) => s.duration(),
        }
    }
    pub fn numerator(&self) -> u32 {
        match self {
            Self::Terminal(t) => t.numerator(),
            Self::Sequence(s) => s.numerator(),
        }
    }
    pub fn denominator(&self) -> u32 {
        match self {
            Self::Terminal(t) => t.denominator(),
            Self::Sequence(s) => s.denominator(),
        }
    }
    pub fn weight(&self) -> f64 {
        match self {
            Self::Terminal(t) => t.weight(),
            Self::Sequence(s) => s.weight(),
        }
    }
    pub fn set_weight(&mut self, weight: f64) {
        match self {
            Self::Terminal(t) => t.set_weight(weight),
            Self::Sequence(s) => s.set_weight(weight),
        }
    }

    fn depth(&self) -> usize {
        match self {
            Self::Terminal(_) => 0,
            Self::Sequence(s) => s.depth(),
        }
    }

    /// This node as a single terminal, collapsing any structure.
    pub fn as_terminal(&self) -> MeterTerminal {
        match self {
            Self::Terminal(t) => t.clone(),
            Self::Sequence(s) => s.collapsed(),
        }
    }
}

impl fmt::Display for MeterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(t) => write!(f, "{}", t),
            Self::Sequence(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeterSequence {
    children: Vec<MeterNode>,
    numerator: u32,
    denominator: u32,
    duration: RationalDuration,
    summed_numerator: bool,
    level_cache: RefCell<HashMap<(usize, bool), Vec<MeterNode>>>,
}

impl PartialEq for MeterSequence {
    fn eq(&self, other: &Self) -> bool {
        self.numerator == other.numerator
            && self.denominator == other.denominator
            && self.summed_numerator == other.summed_numerator
            && self.children == other.children
    }
}

impl MeterSequence {
    /// Parse a (possibly `"A/B+C/D"`-summed) ratio string.
    pub fn new(value: &str) -> MeterResult<Self> {
        let mut ms = Self {
            children: Vec::new(),
            numerator: 1,
            denominator: 1,
            duration: RationalDuration::zero(),
            summed_numerator: false,
            level_cache: RefCell::new(HashMap::new()),
        };
        ms.load(value, None)?;
        Ok(ms)
    }

    pub(crate) fn from_parts(
        children: Vec<MeterNode>,
        numerator: u32,
        denominator: u32,
        summed_numerator: bool,
    ) -> Self {
        Self {
            children,
            numerator,
            denominator,
            duration: RationalDuration::from_whole_fraction(
                numerator,
                denominator,
            ),
            summed_numerator,
            level_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Destructive reload: children are rebuilt from scratch.
    ///
    /// With a `partition` request the freshly loaded sequence is
    /// immediately repartitioned to that many top-level parts,
    /// falling back to the default option when the count has no
    /// exact match.
    pub fn load(
        &mut self,
        value: &str,
        partition: impl Into<Option<usize>>,
    ) -> MeterResult<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MeterError::Parse(value.to_string()));
        }
        let terms: Vec<&str> = value.split('+').collect();
        let terminals = terms
            .iter()
            .map(|term| term.parse::<MeterTerminal>())
            .collect::<MeterResult<Vec<MeterTerminal>>>()?;
        self.children =
            terminals.into_iter().map(MeterNode::Terminal).collect();
        self.summed_numerator = terms.len() > 1;
        self.duration = RationalDuration::zero();
        self.update_ratio();
        self.touch();
        if let Some(count) = partition.into() {
            self.partition_by_count(count, true)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
    pub fn children(&self) -> &[MeterNode] {
        &self.children
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
    pub fn summed_numerator(&self) -> bool {
        self.summed_numerator
    }

    /// Ratio text this sequence round-trips to: `"2/4+3/8"` for a
    /// summed load, `"6/8"` otherwise.
    pub fn ratio_string(&self) -> String {
        if self.summed_numerator {
            self.children
                .iter()
                .map(|c| c.as_terminal().to_string())
                .collect::<Vec<String>>()
                .join("+")
        } else {
            format!("{}/{}", self.numerator, self.denominator)
        }
    }

    /// Weight is the sum of the children's weights.
    pub fn weight(&self) -> f64 {
        self.children.iter().map(|c| c.weight()).sum()
    }

    /// Redistribute a total weight proportionally to each child's
    /// share of the total duration.
    pub fn set_weight(&mut self, weight: f64) {
        let total = fraction_to_f64(self.duration.get());
        if total == 0.0 {
            return;
        }
        for child in self.children.iter_mut() {
            let share = fraction_to_f64(child.duration().get()) / total;
            child.set_weight(weight * share);
        }
    }

    pub fn is_uniform_partition(&self) -> bool {
        let mut durations =
            self.children.iter().map(|c| c.duration());
        match durations.next() {
            None => true,
            Some(first) => durations.all(|d| d == first),
        }
    }

    /// Number of nesting levels: 1 for a flat sequence of
    /// terminals.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| c.depth())
            .max()
            .unwrap_or(0)
    }

    fn touch(&mut self) {
        self.level_cache.borrow_mut().clear();
    }

    /// Adopt the summed ratio of the children if the total duration
    /// changed; keep the loaded identity otherwise, so partitions
    /// never rewrite the ratio (6/8 stays 6/8 after 3/8+3/8).
    fn update_ratio(&mut self) {
        if self.children.is_empty() {
            return;
        }
        let pairs: Vec<(u32, u32)> = self
            .children
            .iter()
            .map(|c| (c.numerator(), c.denominator()))
            .collect();
        let (n, d) = fraction_sum(&pairs);
        let duration = RationalDuration::from_whole_fraction(n, d);
        if duration != self.duration {
            self.numerator = n;
            self.denominator = d;
            self.duration = duration;
        }
    }

    fn set_children_from_pairs(
        &mut self,
        pairs: &[(u32, u32)],
    ) -> MeterResult<()> {
        let children = pairs
            .iter()
            .map(|(n, d)| {
                Ok(MeterNode::Terminal(MeterTerminal::new(*n, *d)?))
            })
            .collect::<MeterResult<Vec<MeterNode>>>()?;
        self.children = children;
        self.touch();
        self.update_ratio();
        Ok(())
    }

    /// Replace children with a partition of `count` top-level
    /// parts, chosen from the partition-options table.
    ///
    /// # Returns
    /// [MeterError::UnsupportedPartitionCount] if no option has
    /// exactly `count` parts and `load_default` is false; with
    /// `load_default` the first (default) option is used instead.
    pub fn partition_by_count(
        &mut self,
        count: usize,
        load_default: bool,
    ) -> MeterResult<()> {
        let opts = partition_options(self.numerator, self.denominator);
        let pairs = match opts.iter().find(|o| o.len() == count) {
            Some(option) => option.clone(),
            None if load_default => {
                log::debug!(
                    "no {}-part option for {}/{}, using default",
                    count,
                    self.numerator,
                    self.denominator
                );
                opts[0].clone()
            }
            None => {
                return Err(MeterError::UnsupportedPartitionCount {
                    ratio: self.ratio_string(),
                    requested: count,
                })
            }
        };
        self.set_children_from_pairs(&pairs)
    }

    /// Replace children with an explicit partition.
    ///
    /// Three strategies, in priority order: literal fraction
    /// strings (verified against the total duration); plain
    /// integers whose sum is a multiple of the numerator (the
    /// denominator is scaled accordingly); otherwise an exact
    /// numerator-sequence match in the options table.
    pub fn partition_by_list(
        &mut self,
        parts: &[&str],
    ) -> MeterResult<()> {
        if parts.is_empty() {
            return Err(MeterError::PartitionMismatch {
                supplied: String::new(),
                expected: self.ratio_string(),
            });
        }
        if parts.iter().all(|p| p.contains('/')) {
            let terminals = parts
                .iter()
                .map(|p| p.parse::<MeterTerminal>())
                .collect::<MeterResult<Vec<MeterTerminal>>>()?;
            let sum = terminals.iter().fold(
                RationalDuration::zero(),
                |acc, t| acc + t.duration(),
            );
            if sum != self.duration {
                return Err(MeterError::PartitionMismatch {
                    supplied: parts.join("+"),
                    expected: self.ratio_string(),
                });
            }
            self.children = terminals
                .into_iter()
                .map(MeterNode::Terminal)
                .collect();
            self.touch();
            self.update_ratio();
            return Ok(());
        }
        let numerators = parts
            .iter()
            .map(|p| {
                p.trim()
                    .parse::<u32>()
                    .map_err(|_| MeterError::Parse(p.to_string()))
            })
            .collect::<MeterResult<Vec<u32>>>()?;
        let sum: u32 = numerators.iter().sum();
        if sum > 0 && sum % self.numerator == 0 {
            let factor = sum / self.numerator;
            let denominator = self.denominator * factor;
            if is_valid_denominator(denominator) {
                let pairs: Vec<(u32, u32)> = numerators
                    .iter()
                    .map(|n| (*n, denominator))
                    .collect();
                return self.set_children_from_pairs(&pairs);
            }
        }
        let opts = partition_options(self.numerator, self.denominator);
        for option in opts {
            let opt_numerators: Vec<u32> =
                option.iter().map(|(n, _)| *n).collect();
            if opt_numerators == numerators {
                return self.set_children_from_pairs(&option);
            }
        }
        Err(MeterError::PartitionMismatch {
            supplied: parts.join("+"),
            expected: self.ratio_string(),
        })
    }

    /// Structural deep copy of another sequence's children.
    ///
    /// # Returns
    /// [MeterError::RatioMismatch] unless both sequences share the
    /// same numerator and denominator.
    pub fn partition_by_other(
        &mut self,
        other: &MeterSequence,
    ) -> MeterResult<()> {
        if self.numerator != other.numerator
            || self.denominator != other.denominator
        {
            return Err(MeterError::RatioMismatch {
                left: self.ratio_string(),
                right: other.ratio_string(),
            });
        }
        self.children = other.children.clone();
        self.summed_numerator = other.summed_numerator;
        self.touch();
        self.update_ratio();
        Ok(())
    }

    /// Subdivide every terminal in the tree, by an explicit count
    /// or by the numerator-driven default.
    pub fn subdivide_partitions_equal(
        &mut self,
        divisions: Option<usize>,
    ) -> MeterResult<()> {
        for child in self.children.iter_mut() {
            match child {
                MeterNode::Terminal(t) => {
                    let count = divisions.unwrap_or_else(|| {
                        default_subdivision_count(t.numerator())
                    });
                    if count > 1 {
                        let sub = t.subdivide(count)?;
                        *child = MeterNode::Sequence(sub);
                    }
                }
                MeterNode::Sequence(s) => {
                    s.subdivide_partitions_equal(divisions)?;
                }
            }
        }
        self.touch();
        Ok(())
    }

    /// Build a uniform accent archetype: level 0 is the whole bar
    /// as a single part, level 1 comes from `first_partition` (or
    /// the numerator default), and every further generation
    /// subdivides each leaf by 2 or 3.
    ///
    /// With `normalize`, whenever sibling leaves end up with
    /// different denominators after a pass, the lower-denominator
    /// ones are subdivided once more until all leaves of the
    /// generation share a denominator; the loop is bounded by the
    /// denominator ceiling.
    pub fn subdivide_nested_hierarchy(
        &mut self,
        depth: usize,
        first_partition: Option<FirstPartition>,
        normalize: bool,
    ) -> MeterResult<()> {
        if depth == 0 {
            return Ok(());
        }
        let whole =
            MeterTerminal::new(self.numerator, self.denominator)?;
        let first = match first_partition {
            Some(FirstPartition::Form(form)) => {
                let fractions: Vec<String> = form
                    .children()
                    .iter()
                    .map(|c| c.as_terminal().to_string())
                    .collect();
                let refs: Vec<&str> =
                    fractions.iter().map(String::as_str).collect();
                whole.subdivide_by_list(&refs)?
            }
            Some(FirstPartition::Count(count)) => {
                whole.subdivide(count)?
            }
            None => whole.subdivide(default_subdivision_count(
                self.numerator,
            ))?,
        };
        self.children = vec![MeterNode::Sequence(first)];
        for _ in 1..depth {
            self.subdivide_partitions_equal(None)?;
            if normalize {
                self.normalize_leaf_denominators()?;
            }
        }
        self.touch();
        self.update_ratio();
        Ok(())
    }

    fn normalize_leaf_denominators(&mut self) -> MeterResult<()> {
        loop {
            let denominators: Vec<u32> = self
                .flat()
                .iter()
                .map(|t| t.denominator())
                .collect();
            let max = match denominators.iter().max() {
                None => return Ok(()),
                Some(max) => *max,
            };
            if denominators.iter().all(|d| *d == max) {
                return Ok(());
            }
            if max > MAX_DENOMINATOR {
                return Err(MeterError::InvalidDenominator(max));
            }
            self.subdivide_leaves_below(max)?;
            self.touch();
        }
    }

    fn subdivide_leaves_below(&mut self, max: u32) -> MeterResult<()> {
        for child in self.children.iter_mut() {
            match child {
                MeterNode::Terminal(t) => {
                    if t.denominator() < max {
                        *child = MeterNode::Sequence(t.subdivide(2)?);
                    }
                }
                MeterNode::Sequence(s) => {
                    s.subdivide_leaves_below(max)?;
                }
            }
        }
        self.touch();
        Ok(())
    }

    /// Flatten at most `level` sequence-levels down; with `flat`,
    /// structure below the cutoff is collapsed into terminals.
    /// Memoized per `(level, flat)`; the cache is cleared on every
    /// structural mutation.
    pub fn get_level_list(
        &self,
        level: usize,
        flat: bool,
    ) -> Vec<MeterNode> {
        if let Some(hit) =
            self.level_cache.borrow().get(&(level, flat))
        {
            return hit.clone();
        }
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                MeterNode::Terminal(t) => {
                    out.push(MeterNode::Terminal(t.clone()))
                }
                MeterNode::Sequence(s) => {
                    if level == 0 {
                        if flat {
                            out.push(MeterNode::Terminal(
                                s.collapsed(),
                            ));
                        } else {
                            out.push(MeterNode::Sequence(s.clone()));
                        }
                    } else {
                        out.extend(
                            s.get_level_list(level - 1, flat),
                        );
                    }
                }
            }
        }
        self.level_cache
            .borrow_mut()
            .insert((level, flat), out.clone());
        out
    }

    /// A flat sequence made of the given level's terminals,
    /// inheriting this sequence's ratio.
    pub fn get_level(&self, level: usize) -> MeterSequence {
        let children: Vec<MeterNode> = self
            .get_level_list(level, true)
            .iter()
            .map(|n| MeterNode::Terminal(n.as_terminal()))
            .collect();
        Self::from_parts(
            children,
            self.numerator,
            self.denominator,
            self.summed_numerator,
        )
    }

    /// `(start, end)` spans of the given level's parts.
    pub fn get_level_spans(
        &self,
        level: usize,
    ) -> Vec<(RationalDuration, RationalDuration)> {
        let mut spans = Vec::new();
        let mut acc = RationalDuration::zero();
        for node in self.get_level_list(level, true) {
            let end = acc + node.duration();
            spans.push((acc, end));
            acc = end;
        }
        spans
    }

    /// The deepest terminals of the tree.
    pub fn flat(&self) -> Vec<MeterTerminal> {
        self.get_level_list(self.depth().saturating_sub(1), true)
            .iter()
            .map(|n| n.as_terminal())
            .collect()
    }

    pub(crate) fn collapsed(&self) -> MeterTerminal {
        let mut t =
            MeterTerminal::new(self.numerator, self.denominator)
                .expect("sequence ratio is always valid");
        t.set_weight(self.weight());
        t
    }

    /// Index of the top-level child whose span contains `offset`.
    ///
    /// Spans are half-open `[start, end)`; with
    /// `include_coincident_boundaries` an offset sitting exactly on
    /// a boundary matches the earlier child (closed span).
    pub fn offset_to_index(
        &self,
        offset: RationalDuration,
        include_coincident_boundaries: bool,
    ) -> MeterResult<usize> {
        let out_of_range = || MeterError::OutOfRange {
            offset: offset.to_string(),
            total: self.duration.to_string(),
        };
        if offset > self.duration
            || (!include_coincident_boundaries
                && offset == self.duration)
        {
            return Err(out_of_range());
        }
        let mut acc = RationalDuration::zero();
        for (i, child) in self.children.iter().enumerate() {
            let end = acc + child.duration();
            if offset < end
                || (include_coincident_boundaries && offset == end)
            {
                return Ok(i);
            }
            acc = end;
        }
        Err(out_of_range())
    }

    /// `(start, end)` of the top-level span containing `offset`.
    ///
    /// With `permit_modulus` the offset is first reduced modulo the
    /// total duration instead of failing out of range.
    pub fn offset_to_span(
        &self,
        offset: RationalDuration,
        permit_modulus: bool,
    ) -> MeterResult<(RationalDuration, RationalDuration)> {
        let offset = if permit_modulus {
            offset % self.duration
        } else {
            offset
        };
        let index = self.offset_to_index(offset, false)?;
        let mut acc = RationalDuration::zero();
        for child in self.children.iter().take(index) {
            acc += child.duration();
        }
        Ok((acc, acc + self.children[index].duration()))
    }

    /// How many hierarchical levels have a boundary coincident
    /// with the offset; a proxy for metrical strength.
    pub fn offset_to_depth(
        &self,
        offset: RationalDuration,
        align: Align,
    ) -> MeterResult<usize> {
        if offset > self.duration
            || (align != Align::End && offset == self.duration)
        {
            return Err(MeterError::OutOfRange {
                offset: offset.to_string(),
                total: self.duration.to_string(),
            });
        }
        let max_level = self.depth().saturating_sub(1);
        let target = match align {
            Align::Quantize => {
                let spans = self.get_level_spans(max_level);
                spans
                    .iter()
                    .find(|(start, end)| {
                        *start <= offset && offset < *end
                    })
                    .map(|(start, _)| *start)
                    .unwrap_or(offset)
            }
            Align::Start | Align::End => offset,
        };
        let mut count = 0;
        for level in 0..=max_level {
            let matched = self
                .get_level_spans(level)
                .iter()
                .any(|(start, end)| match align {
                    Align::End => *end == target,
                    _ => *start == target,
                });
            if matched {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl fmt::Display for MeterSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self
            .children
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join("+");
        write!(f, "{{{}}}", inner)
    }
}

/// Default 2/3-preference subdivision count for a numerator.
pub(crate) fn default_subdivision_count(numerator: u32) -> usize {
    match numerator {
        1 | 2 | 4 | 8 | 16 => 2,
        3 => 3,
        6 | 9 | 12 | 15 | 18 => (numerator / 3) as usize,
        n => n as usize,
    }
}

/// Sum fractions the musical way: a shared denominator is kept
/// (3/8+3/8 is 6/8, not 3/4); mixed denominators go through the
/// least common denominator and are then reduced.
pub(crate) fn fraction_sum(pairs: &[(u32, u32)]) -> (u32, u32) {
    let first_d = pairs[0].1;
    if pairs.iter().all(|(_, d)| *d == first_d) {
        return (pairs.iter().map(|(n, _)| n).sum(), first_d);
    }
    let lcm = pairs
        .iter()
        .map(|(_, d)| *d)
        .fold(1, |acc, d| acc / gcd(acc, d) * d);
    let sum: u32 =
        pairs.iter().map(|(n, d)| n * (lcm / d)).sum();
    let g = gcd(sum, lcm);
    (sum / g, lcm / g)
}

fn gcd(a: u32, b: u32) -> u32 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

pub(crate) fn fraction_to_f64(fraction: Fraction) -> f64 {
    let numer = *fraction.numer().expect("rational") as f64;
    let denom = *fraction.denom().expect("rational") as f64;
    if fraction.is_sign_negative() {
        -numer / denom
    } else {
        numer / denom
    }
}
