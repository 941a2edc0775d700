//! Selection helper
//!
//! Picks a subset of the resolver's ordered candidate list from a selection
//! string such as `"all"`, `"1,3"` or `"2-4"`. Numbers are 1-based, out of
//! range numbers are ignored and repeats are kept once. An empty selection is
//! valid and means nothing should be collected.

use crate::models::OrganizationCandidate;
use std::collections::HashSet;

/// Zero-based indices picked by `input` out of a list of `max` entries, in the
/// order they were given.
///
/// ```
/// use asnhunt::lens::select::parse_selection;
///
/// assert_eq!(parse_selection("3, 1-2", 4), vec![2, 0, 1]);
/// assert_eq!(parse_selection("all", 3), vec![0, 1, 2]);
/// assert!(parse_selection("9", 3).is_empty());
/// ```
pub fn parse_selection(input: &str, max: usize) -> Vec<usize> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") || input == "*" {
        return (0..max).collect();
    }

    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    let mut push = |number: usize| {
        if (1..=max).contains(&number) && seen.insert(number) {
            picked.push(number - 1);
        }
    };

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
                else {
                    continue;
                };
                if start <= end {
                    // clamp so a typo like "1-999999999" stays cheap
                    (start..=end.min(max)).for_each(&mut push);
                }
            }
            None => {
                if let Ok(number) = part.parse::<usize>() {
                    push(number);
                }
            }
        }
    }
    picked
}

/// Candidates picked by `input`, in selection order
pub fn apply_selection(candidates: &[OrganizationCandidate], input: &str) -> Vec<OrganizationCandidate> {
    parse_selection(input, candidates.len())
        .into_iter()
        .filter_map(|i| candidates.get(i).cloned())
        .collect()
}
