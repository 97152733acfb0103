//! Streak arithmetic over local calendar days.

use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Streak after a visit on `today`, given the previous visit date.
///
/// Exactly yesterday extends, today leaves it unchanged, anything else
/// restarts at 1.
pub fn advance(current: u32, last_visit: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_visit {
        Some(last) if last == today => current.max(1),
        Some(last) if today.pred_opt() == Some(last) => current.saturating_add(1),
        _ => 1,
    }
}

/// Streak as of `today` from the set of visit days.
///
/// Counts consecutive days ending at the latest visit. If that visit is
/// older than yesterday the streak has lapsed and is 0.
pub fn compute(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(&latest) = days.range(..=today).next_back() else {
        return 0;
    };
    let yesterday = today.pred_opt();
    if latest != today && Some(latest) != yesterday {
        return 0;
    }

    let mut streak = 0u32;
    let mut expected = Some(latest);
    for day in days.range(..=latest).rev() {
        if Some(*day) != expected {
            break;
        }
        streak += 1;
        expected = day.pred_opt();
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_advance_rules() {
        assert_eq!(advance(0, None, d(1)), 1);
        assert_eq!(advance(1, Some(d(1)), d(2)), 2);
        assert_eq!(advance(2, Some(d(2)), d(2)), 2);
        assert_eq!(advance(2, Some(d(2)), d(4)), 1);
    }

    #[test]
    fn test_compute_day_sequence() {
        // day 1 -> 1, day 2 -> 2, skip day 3, day 4 -> 1
        let mut days = BTreeSet::new();
        days.insert(d(1));
        assert_eq!(compute(&days, d(1)), 1);
        days.insert(d(2));
        assert_eq!(compute(&days, d(2)), 2);
        assert_eq!(compute(&days, d(3)), 2);
        days.insert(d(4));
        assert_eq!(compute(&days, d(4)), 1);
    }

    #[test]
    fn test_compute_lapsed() {
        let days: BTreeSet<_> = [d(1), d(2)].into_iter().collect();
        assert_eq!(compute(&days, d(4)), 0);
        assert_eq!(compute(&BTreeSet::new(), d(4)), 0);
    }

    #[test]
    fn test_compute_ignores_future_days() {
        let days: BTreeSet<_> = [d(1), d(2), d(9)].into_iter().collect();
        assert_eq!(compute(&days, d(2)), 2);
    }

    proptest! {
        #[test]
        fn prop_advance_by_at_most_one_per_day(visits in proptest::collection::vec(0u32..3, 1..60)) {
            // Each entry is the gap in days before the next visit.
            let mut today = d(1);
            let mut streak = 0u32;
            let mut last = None;
            for gap in visits {
                today = today + chrono::Days::new(u64::from(gap));
                let before = streak;
                streak = advance(streak, last, today);
                match last {
                    Some(l) if l == today => prop_assert_eq!(streak, before),
                    _ => prop_assert!(streak <= before + 1),
                }
                prop_assert!(streak >= 1);
                last = Some(today);
            }
        }

        #[test]
        fn prop_compute_matches_advance(gaps in proptest::collection::vec(0u32..3, 1..60)) {
            let mut today = d(1);
            let mut streak = 0u32;
            let mut last = None;
            let mut days = BTreeSet::new();
            for gap in gaps {
                today = today + chrono::Days::new(u64::from(gap));
                streak = advance(streak, last, today);
                last = Some(today);
                days.insert(today);
                prop_assert_eq!(compute(&days, today), streak);
            }
        }
    }
}
