//! Finding the items that intersect a time window

use chrono::{DateTime, Utc};

use super::{StackItem, TimeWindow};

/// Which time an ordering is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    Start,
    /// End of range items, start of point items
    End,
}

impl OrderKey {
    fn of(self, item: &StackItem) -> DateTime<Utc> {
        match self {
            OrderKey::Start => item.start,
            OrderKey::End => item.ends_at(),
        }
    }
}

/// Binary search over `order` (indices into `items`, ascending by `key`)
/// for the rightmost position whose key is at or before `value`.
/// Returns `None` when every key is after `value`.
pub fn find_insertion_point(
    items: &[StackItem],
    order: &[usize],
    value: DateTime<Utc>,
    key: OrderKey,
) -> Option<usize> {
    order
        .partition_point(|&i| key.of(&items[i]) <= value)
        .checked_sub(1)
}

/// Indices of the items intersecting `window`, ordered by start.
///
/// `by_start` and `by_end` are the orderings from
/// [`order_by_start`](super::order_by_start) and
/// [`order_by_end`](super::order_by_end). Point items are found by scanning
/// left from the last start inside the window; range items by scanning
/// outward from the first end at the window start.
pub fn visible_items(
    items: &[StackItem],
    by_start: &[usize],
    by_end: &[usize],
    window: &TimeWindow,
) -> Vec<usize> {
    let mut visible = Vec::new();

    if let Some(seed) = find_insertion_point(items, by_start, window.end, OrderKey::Start) {
        for &i in by_start[..=seed].iter().rev() {
            if items[i].start < window.start {
                break;
            }
            if !items[i].is_range() {
                visible.push(i);
            }
        }
    }

    let seed = find_insertion_point(items, by_end, window.start, OrderKey::End);
    if let Some(seed) = seed {
        // ends exactly at the window start still touch it
        for &i in by_end[..=seed].iter().rev() {
            if items[i].ends_at() < window.start {
                break;
            }
            if items[i].is_range() && items[i].start <= window.end {
                visible.push(i);
            }
        }
    }
    let right = seed.map_or(0, |s| s + 1);
    for &i in &by_end[right..] {
        if items[i].is_range() && items[i].start <= window.end {
            visible.push(i);
        }
    }

    visible.sort_by_key(|&i| (items[i].start, i));
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{order_by_end, order_by_start};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn window(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(at(start), at(end)).unwrap()
    }

    #[test]
    fn test_insertion_point_is_rightmost_not_after() {
        let items: Vec<StackItem> = [0, 10, 10, 20]
            .iter()
            .enumerate()
            .map(|(i, m)| StackItem::new(i as i64, at(*m)))
            .collect();
        let order = order_by_start(&items);

        assert_eq!(find_insertion_point(&items, &order, at(-5), OrderKey::Start), None);
        assert_eq!(find_insertion_point(&items, &order, at(10), OrderKey::Start), Some(2));
        assert_eq!(find_insertion_point(&items, &order, at(15), OrderKey::Start), Some(2));
        assert_eq!(find_insertion_point(&items, &order, at(99), OrderKey::Start), Some(3));
    }

    #[test]
    fn test_mixed_points_and_ranges() {
        let items = vec![
            StackItem::new(0, at(0)),
            StackItem::new(1, at(15)),
            StackItem::new(2, at(5)).with_end(at(10)),
            StackItem::new(3, at(25)).with_end(at(40)),
            StackItem::new(4, at(0)).with_end(at(100)),
            StackItem::new(5, at(50)),
        ];
        let by_start = order_by_start(&items);
        let by_end = order_by_end(&items);

        assert_eq!(visible_items(&items, &by_start, &by_end, &window(10, 30)), vec![4, 2, 1, 3]);
        assert_eq!(visible_items(&items, &by_start, &by_end, &window(60, 70)), vec![4]);
        assert!(visible_items(&[], &[], &[], &window(0, 1)).is_empty());
    }

    fn arb_item() -> impl Strategy<Value = (i64, Option<i64>)> {
        (0i64..200, proptest::option::of(0i64..50))
    }

    proptest! {
        #[test]
        fn test_matches_linear_scan(
            specs in proptest::collection::vec(arb_item(), 0..40),
            start in 0i64..250,
            len in 0i64..60,
        ) {
            let items: Vec<StackItem> = specs.iter().enumerate().map(|(i, (s, span))| {
                let item = StackItem::new(i as i64, at(*s));
                match span {
                    Some(l) => item.with_end(at(s + l)),
                    None => item,
                }
            }).collect();
            let win = window(start, start + len);

            let found = visible_items(&items, &order_by_start(&items), &order_by_end(&items), &win);

            let mut expected: Vec<usize> = (0..items.len()).filter(|&i| items[i].intersects(&win)).collect();
            expected.sort_by_key(|&i| (items[i].start, i));
            prop_assert_eq!(found, expected);
        }
    }
}
