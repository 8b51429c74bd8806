//! Enumeration of the ways a meter fraction can be partitioned.
//!
//! Each option is an ordered list of `(numerator, denominator)`
//! pairs summing to the source fraction. The first option is the
//! default: one part per numerator unit. Awkward numerators
//! (5, 7, 11, 13) contribute their preset splits before the
//! even groupings.

use itertools::Itertools;

use crate::terminal::preset_splits;

/// All partition options for `numerator/denominator`, most
/// conventional first. Duplicates produced by different derivation
/// paths are removed, keeping the first occurrence.
pub(crate) fn partition_options(
    numerator: u32,
    denominator: u32,
) -> Vec<Vec<(u32, u32)>> {
    let (n, d) = (numerator, denominator);
    let mut opts: Vec<Vec<(u32, u32)>> = Vec::new();
    // the default: one part per numerator unit
    opts.push(vec![(1, d); n as usize]);
    // the whole, unpartitioned
    opts.push(vec![(n, d)]);
    for split in preset_splits(n) {
        opts.push(split.iter().map(|part| (*part, d)).collect());
    }
    // compound grouping in threes
    if n % 3 == 0 && n > 3 && d >= 8 {
        opts.push(vec![(3, d); (n / 3) as usize]);
    }
    // groupings by each divisor of the numerator
    for group in (2..n).rev() {
        if n % group == 0 {
            opts.push(vec![(group, d); (n / group) as usize]);
        }
    }
    // halved forms: the same bar in fewer, larger units
    let (mut hn, mut hd) = (n, d);
    while hn % 2 == 0 && hd % 2 == 0 {
        hn /= 2;
        hd /= 2;
        opts.push(vec![(1, hd); hn as usize]);
    }
    // doubled forms: finer singletons
    let (mut dn, mut dd) = (n, d);
    while dd * 2 <= 128 {
        dn *= 2;
        dd *= 2;
        opts.push(vec![(1, dd); dn as usize]);
    }
    opts.into_iter().unique().collect()
}

#[cfg(test)]
mod tests {
    use super::partition_options;

    #[test]
    fn default_is_singletons() {
        let opts = partition_options(4, 4);
        assert_eq!(opts[0], vec![(1, 4); 4]);
    }

    #[test]
    fn compound_split_wins_for_six_eight() {
        let opts = partition_options(6, 8);
        let two_parts =
            opts.iter().find(|o| o.len() == 2).expect("2-part option");
        assert_eq!(two_parts, &vec![(3, 8), (3, 8)]);
    }

    #[test]
    fn preset_for_five_eight() {
        let opts = partition_options(5, 8);
        let three_parts =
            opts.iter().find(|o| o.len() == 3).expect("3-part option");
        assert_eq!(three_parts, &vec![(2, 8), (2, 8), (1, 8)]);
        let two_parts =
            opts.iter().find(|o| o.len() == 2).expect("2-part option");
        assert_eq!(two_parts, &vec![(2, 8), (3, 8)]);
    }

    #[test]
    fn whole_option_keeps_ratio() {
        let opts = partition_options(6, 8);
        let one_part =
            opts.iter().find(|o| o.len() == 1).expect("1-part option");
        assert_eq!(one_part, &vec![(6, 8)]);
    }

    #[test]
    fn doubled_forms_present() {
        let opts = partition_options(4, 4);
        assert!(opts.iter().any(|o| o == &vec![(1, 8); 8]));
    }
}
