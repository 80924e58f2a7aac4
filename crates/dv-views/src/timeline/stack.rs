//! Vertical collision avoidance for timed items

use super::{ItemMargin, Margin, StackItem};

/// Tolerance applied to collision tests so touching edges do not collide
pub const EPSILON: f64 = 0.001;

/// Indices of `items` ordered by start time, ties in slice order
pub fn order_by_start(items: &[StackItem]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| items[i].start);
    order
}

/// Indices of `items` ordered by end time (start for point items), ties in
/// slice order
pub fn order_by_end(items: &[StackItem]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| items[i].ends_at());
    order
}

/// Whether `a` overlaps `b` once both are padded by the item margin.
/// Items without a `top` are treated as sitting at zero.
pub fn collision(a: &StackItem, b: &StackItem, margin: &ItemMargin) -> bool {
    let a_top = a.top.unwrap_or(0.0);
    let b_top = b.top.unwrap_or(0.0);
    (a.left - margin.horizontal + EPSILON) < (b.left + b.width)
        && (a.left + a.width + margin.horizontal - EPSILON) > b.left
        && (a_top - margin.vertical + EPSILON) < (b_top + b.height)
        && (a_top + a.height + margin.vertical - EPSILON) > b_top
}

/// Assign a `top` to every visible stackable item that has none.
///
/// With `force` every `top` is cleared first so the whole set is laid out
/// again; without it, already placed items keep their position and only new
/// ones are fitted around them. Items are placed in start order at
/// `margin.axis` and pushed below whatever they collide with until they fit.
pub fn stack(items: &mut [StackItem], margin: &Margin, force: bool) {
    if force {
        for item in items.iter_mut() {
            item.top = None;
        }
    }

    for i in order_by_start(items) {
        if !items[i].visible || !items[i].stack || items[i].top.is_some() {
            continue;
        }
        items[i].top = Some(margin.axis);

        while let Some(j) = first_collision(items, i, &margin.item) {
            let below = items[j].top.unwrap_or(margin.axis) + items[j].height + margin.item.vertical;
            items[i].top = Some(below);
        }
    }
}

fn first_collision(items: &[StackItem], index: usize, margin: &ItemMargin) -> Option<usize> {
    let item = &items[index];
    items.iter().enumerate().position(|(j, other)| {
        j != index
            && other.visible
            && other.stack
            && other.top.is_some()
            && collision(item, other, margin)
    })
}

/// Put every visible item on the same lane at `margin.axis`
pub fn nostack(items: &mut [StackItem], margin: &Margin) {
    for item in items.iter_mut().filter(|item| item.visible) {
        item.top = Some(margin.axis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn item(id: i64, start: u32, left: f64, width: f64) -> StackItem {
        StackItem::new(id, at(start)).with_geometry(left, width, 20.0)
    }

    #[test]
    fn test_identical_items_stack_below_each_other() {
        let mut items = vec![item(1, 0, 0.0, 50.0), item(2, 0, 0.0, 50.0)];
        let margin = Margin::default();

        stack(&mut items, &margin, true);

        let first = items[0].top.unwrap();
        assert_eq!(first, margin.axis);
        assert_eq!(items[1].top.unwrap(), first + 20.0 + 10.0);
    }

    #[test]
    fn test_lone_item_stays_on_axis() {
        let mut items = vec![item(1, 0, 0.0, 50.0), item(2, 30, 500.0, 50.0)];
        let margin = Margin::default();
        stack(&mut items, &margin, true);
        assert_eq!(items[0].top, Some(margin.axis));
        assert_eq!(items[1].top, Some(margin.axis));
    }

    #[test]
    fn test_items_are_placed_in_start_order() {
        // slice order differs from start order
        let mut items = vec![item(1, 10, 0.0, 50.0), item(2, 0, 0.0, 50.0)];
        let margin = Margin::default();
        stack(&mut items, &margin, true);
        assert_eq!(items[1].top, Some(margin.axis));
        assert_eq!(items[0].top, Some(margin.axis + 30.0));
    }

    #[test]
    fn test_rescan_after_each_push() {
        // third item collides with the first, gets pushed into the second,
        // and must be pushed again
        let mut items = vec![
            item(1, 0, 0.0, 100.0),
            item(2, 1, 60.0, 100.0),
            item(3, 2, 0.0, 100.0),
        ];
        let margin = Margin::default();
        stack(&mut items, &margin, true);
        assert_eq!(items[0].top, Some(20.0));
        assert_eq!(items[1].top, Some(50.0));
        assert_eq!(items[2].top, Some(80.0));
    }

    #[test]
    fn test_without_force_existing_tops_are_kept() {
        let mut items = vec![item(1, 0, 0.0, 50.0), item(2, 0, 0.0, 50.0)];
        items[0].top = Some(100.0);
        let margin = Margin::default();

        stack(&mut items, &margin, false);

        assert_eq!(items[0].top, Some(100.0));
        assert_eq!(items[1].top, Some(margin.axis));
    }

    #[test]
    fn test_hidden_and_unstacked_items_are_ignored() {
        let mut items = vec![item(1, 0, 0.0, 50.0), item(2, 0, 0.0, 50.0), item(3, 0, 0.0, 50.0)];
        items[0].visible = false;
        items[1].stack = false;
        let margin = Margin::default();

        stack(&mut items, &margin, true);

        assert_eq!(items[0].top, None);
        assert_eq!(items[1].top, None);
        assert_eq!(items[2].top, Some(margin.axis));
    }

    #[test]
    fn test_horizontal_margin_separates_neighbours() {
        let a = item(1, 0, 0.0, 50.0).tap_top(20.0);
        let close = item(2, 0, 55.0, 50.0).tap_top(20.0);
        let far = item(3, 0, 60.0, 50.0).tap_top(20.0);
        let margin = ItemMargin::default();
        assert!(collision(&close, &a, &margin));
        assert!(!collision(&far, &a, &margin));
    }

    #[test]
    fn test_nostack_uses_one_lane() {
        let mut items = vec![item(1, 0, 0.0, 50.0), item(2, 0, 0.0, 50.0)];
        let margin = Margin::default();
        nostack(&mut items, &margin);
        assert!(items.iter().all(|i| i.top == Some(margin.axis)));
    }

    #[test]
    fn test_order_by_end_uses_start_for_points() {
        let items = vec![
            StackItem::new(1, at(0)).with_end(at(30)),
            StackItem::new(2, at(10)),
            StackItem::new(3, at(5)).with_end(at(6)),
        ];
        assert_eq!(order_by_end(&items), vec![2, 1, 0]);
        assert_eq!(order_by_start(&items), vec![0, 2, 1]);
    }

    trait TapTop {
        fn tap_top(self, top: f64) -> Self;
    }

    impl TapTop for StackItem {
        fn tap_top(mut self, top: f64) -> Self {
            self.top = Some(top);
            self
        }
    }
}
