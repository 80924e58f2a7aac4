//! Composition of timeline components around a shared body

use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::axis::HiddenRanges;
use crate::timeline::TimeWindow;

/// Extra redraw passes allowed while components keep resizing
pub const MAX_REDRAWS: usize = 5;

/// A part of the timeline that lays itself out against the shared body
pub trait Redrawable: Send {
    /// Lay out for the current body state. Returns `true` when the
    /// component's size changed, which makes every component redraw again.
    fn redraw(&mut self, body: &Body) -> bool;
}

/// State shared by every component of one timeline
#[derive(Debug, Clone)]
pub struct Body {
    window: Arc<RwLock<TimeWindow>>,
    hidden: Arc<RwLock<HiddenRanges>>,
    width: Arc<RwLock<f64>>,
}

impl Body {
    pub fn new(window: TimeWindow, width: f64) -> Self {
        Self {
            window: Arc::new(RwLock::new(window)),
            hidden: Arc::new(RwLock::new(HiddenRanges::default())),
            width: Arc::new(RwLock::new(width)),
        }
    }

    pub fn window(&self) -> TimeWindow {
        *self.window.read()
    }

    pub fn set_window(&self, window: TimeWindow) {
        *self.window.write() = window;
    }

    pub fn hidden(&self) -> HiddenRanges {
        self.hidden.read().clone()
    }

    pub fn set_hidden(&self, hidden: HiddenRanges) {
        *self.hidden.write() = hidden;
    }

    /// Width of the drawing area in pixels
    pub fn width(&self) -> f64 {
        *self.width.read()
    }

    pub fn set_width(&self, width: f64) {
        *self.width.write() = width;
    }

    /// Horizontal pixel offset of `time` in the current window
    pub fn to_screen(&self, time: DateTime<Utc>) -> f64 {
        self.window().to_screen(time, self.width(), &self.hidden.read())
    }
}

/// Ordered set of components redrawn together
pub struct Components {
    body: Body,
    components: Vec<Box<dyn Redrawable>>,
}

impl Components {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            components: Vec::new(),
        }
    }

    pub fn push(&mut self, component: impl Redrawable + 'static) {
        self.components.push(Box::new(component));
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Redraw every component in order, again while any of them resized.
    /// Returns the number of passes made.
    pub fn redraw_all(&mut self) -> usize {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut resized = false;
            for component in &mut self.components {
                resized |= component.redraw(&self.body);
            }
            if !resized {
                return passes;
            }
            if passes > MAX_REDRAWS {
                warn!("Components still resizing after {} redraw passes, giving up", passes);
                return passes;
            }
        }
    }
}

/// Create-or-reuse pool of visual elements keyed by kind.
///
/// Call [`prepare`](Self::prepare) before a redraw, fetch elements with
/// [`element`](Self::element) while drawing, and [`cleanup`](Self::cleanup)
/// afterwards to collect whatever was not reused.
#[derive(Debug)]
pub struct ElementPool<K, E> {
    used: AHashMap<K, Vec<E>>,
    reusable: AHashMap<K, Vec<E>>,
}

impl<K: Eq + Hash, E> ElementPool<K, E> {
    pub fn new() -> Self {
        Self {
            used: AHashMap::new(),
            reusable: AHashMap::new(),
        }
    }

    /// Mark every element handed out so far as available for reuse
    pub fn prepare(&mut self) {
        for (kind, elements) in self.used.drain() {
            self.reusable.entry(kind).or_default().extend(elements);
        }
    }

    /// A reusable element of `kind`, or a new one from `create`
    pub fn element(&mut self, kind: K, create: impl FnOnce() -> E) -> &mut E {
        let element = self
            .reusable
            .get_mut(&kind)
            .and_then(Vec::pop)
            .unwrap_or_else(create);
        let used = self.used.entry(kind).or_default();
        used.push(element);
        let last = used.len() - 1;
        &mut used[last]
    }

    /// Remove and return the elements that were not reused
    pub fn cleanup(&mut self) -> Vec<E> {
        self.reusable.drain().flat_map(|(_, elements)| elements).collect()
    }

    pub fn used_count(&self, kind: &K) -> usize {
        self.used.get(kind).map_or(0, Vec::len)
    }

    pub fn reusable_count(&self) -> usize {
        self.reusable.values().map(Vec::len).sum()
    }
}

impl<K: Eq + Hash, E> Default for ElementPool<K, E> {
    fn default() -> Self {
        Self::new()
    }
}
