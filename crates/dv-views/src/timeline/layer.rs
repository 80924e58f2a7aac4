//! Redrawable layer of timeline items

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dv_core::{listener_from_fn, SubscriptionId, Topic};
use dv_data::{DataError, DataSource};
use tracing::{debug, error};

use super::{load_items, nostack, order_by_end, order_by_start, stack, visible_items, Margin, StackItem};
use crate::component::{Body, Redrawable};

/// Timeline component holding the items of one lane group.
///
/// A redraw positions the items visible in the body's window and stacks
/// them. Items keep their vertical position while only the window moves;
/// new data or a zoom makes the next redraw stack everything again.
pub struct ItemLayer {
    items: Vec<StackItem>,
    by_start: Vec<usize>,
    by_end: Vec<usize>,
    margin: Margin,
    stacking: bool,
    item_height: f64,
    point_width: f64,
    height: f64,
    restack: bool,
    /// Zoom level of the last redraw
    pixels_per_ms: f64,
    source: Option<(Arc<dyn DataSource>, SubscriptionId)>,
    stale: Arc<AtomicBool>,
}

impl ItemLayer {
    pub fn new(margin: Margin) -> Self {
        Self {
            items: Vec::new(),
            by_start: Vec::new(),
            by_end: Vec::new(),
            margin,
            stacking: true,
            item_height: 20.0,
            point_width: 10.0,
            height: 0.0,
            restack: true,
            pixels_per_ms: 0.0,
            source: None,
            stale: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Default height of items and width of point items, in pixels
    pub fn with_item_size(mut self, height: f64, point_width: f64) -> Self {
        self.item_height = height;
        self.point_width = point_width;
        self
    }

    pub fn set_stacking(&mut self, enabled: bool) {
        self.stacking = enabled;
        self.restack = true;
    }

    pub fn set_items(&mut self, mut items: Vec<StackItem>) {
        for item in &mut items {
            if item.height <= 0.0 {
                item.height = self.item_height;
            }
        }
        self.by_start = order_by_start(&items);
        self.by_end = order_by_end(&items);
        self.items = items;
        self.restack = true;
    }

    /// Load items from `source` and reload them on the next redraw after
    /// any change to it
    pub fn follow(&mut self, source: Arc<dyn DataSource>) -> Result<(), DataError> {
        self.unfollow();
        self.set_items(load_items(source.as_ref())?);

        let stale = self.stale.clone();
        let subscription = source.on(
            Topic::All,
            listener_from_fn(move |_| stale.store(true, Ordering::SeqCst)),
        );
        self.source = Some((source, subscription));
        Ok(())
    }

    fn unfollow(&mut self) {
        if let Some((source, subscription)) = self.source.take() {
            source.off(subscription);
        }
    }

    pub fn items(&self) -> &[StackItem] {
        &self.items
    }

    pub fn visible(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter().filter(|item| item.visible)
    }

    /// Height needed by the visible items
    pub fn height(&self) -> f64 {
        self.height
    }

    fn reload(&mut self) -> Result<(), DataError> {
        if let Some((source, _)) = &self.source {
            let items = load_items(source.as_ref())?;
            self.set_items(items);
        }
        Ok(())
    }
}

impl Redrawable for ItemLayer {
    fn redraw(&mut self, body: &Body) -> bool {
        if self.stale.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.reload() {
                error!("Failed to reload timeline items: {}", e);
            }
        }

        let window = body.window();
        let hidden = body.hidden();
        let width = body.width();
        let pixels_per_ms = window.pixels_per_ms(width, &hidden);
        if pixels_per_ms != self.pixels_per_ms {
            self.pixels_per_ms = pixels_per_ms;
            self.restack = true;
        }

        let mut in_window = vec![false; self.items.len()];
        for i in visible_items(&self.items, &self.by_start, &self.by_end, &window) {
            in_window[i] = true;
        }
        for (item, visible) in self.items.iter_mut().zip(in_window) {
            item.visible = visible;
            if !visible {
                continue;
            }
            item.left = window.to_screen(item.start, width, &hidden);
            item.width = match item.end {
                Some(end) => (window.to_screen(end, width, &hidden) - item.left).max(0.0),
                None => self.point_width,
            };
        }

        if self.stacking {
            stack(&mut self.items, &self.margin, self.restack);
        } else {
            nostack(&mut self.items, &self.margin);
        }
        self.restack = false;

        let height = self
            .visible()
            .filter_map(StackItem::bottom)
            .fold(self.margin.axis, f64::max)
            + self.margin.item.vertical;
        let resized = height != self.height;
        if resized {
            debug!("Item layer height {} -> {}", self.height, height);
        }
        self.height = height;
        resized
    }
}

impl Drop for ItemLayer {
    fn drop(&mut self) {
        self.unfollow();
    }
}
