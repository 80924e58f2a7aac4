//! Live filtered and projected views
//!
//! A [`DataView`] keeps only the set of ids currently visible through it.
//! Every read goes to the source, so a view can never serve stale field
//! data. The visible id set is updated inside the source's event listener,
//! before the view re-emits the change to its own subscribers.

use std::sync::{Arc, Weak};

use dv_core::{
    listener_from_fn, ChangeEvent, EventBus, Id, Listener, Record, SubscriptionId, Topic,
};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::config::DataViewOptions;
use crate::dataset::DataSet;
use crate::query::{Fields, Filter, Query};
use crate::source::DataSource;
use crate::DataError;

struct ViewInner {
    source: RwLock<Arc<dyn DataSource>>,
    subscription: Mutex<Option<SubscriptionId>>,
    filter: RwLock<Option<Filter>>,
    fields: Option<Fields>,
    ids: RwLock<IndexSet<Id>>,
    bus: EventBus,
}

/// Read-only live view over a [`DataSet`] or another view
#[derive(Clone)]
pub struct DataView {
    inner: Arc<ViewInner>,
}

impl DataView {
    /// Create a view over `source`
    pub fn new(source: Arc<dyn DataSource>, options: DataViewOptions) -> Result<Self, DataError> {
        let inner = Arc::new(ViewInner {
            source: RwLock::new(source.clone()),
            subscription: Mutex::new(None),
            filter: RwLock::new(options.filter),
            fields: options.fields,
            ids: RwLock::new(IndexSet::new()),
            bus: EventBus::new(),
        });

        *inner.ids.write() = inner.visible_ids(source.as_ref())?;
        inner.subscribe(source.as_ref());
        debug!("Created data view with {} visible record(s)", inner.ids.read().len());
        Ok(Self { inner })
    }

    /// Number of records visible through the view
    pub fn len(&self) -> usize {
        self.inner.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The view's current source
    pub fn source(&self) -> Arc<dyn DataSource> {
        self.inner.source.read().clone()
    }

    /// Rebind to another source. Emits `remove` for every previously
    /// visible id, then `add` for every id visible through the new source.
    pub fn set_data(&self, source: Arc<dyn DataSource>) -> Result<(), DataError> {
        let previous = self.source();
        if let Some(subscription) = self.inner.subscription.lock().take() {
            previous.off(subscription);
        }

        let removed: Vec<Id> = std::mem::take(&mut *self.inner.ids.write()).into_iter().collect();
        if !removed.is_empty() {
            self.inner.emit(ChangeEvent::new(Topic::Remove, removed))?;
        }

        *self.inner.source.write() = source.clone();
        let visible = self.inner.visible_ids(source.as_ref())?;
        let added: Vec<Id> = visible.iter().cloned().collect();
        *self.inner.ids.write() = visible;
        self.inner.subscribe(source.as_ref());

        if !added.is_empty() {
            self.inner.emit(ChangeEvent::new(Topic::Add, added))?;
        }
        Ok(())
    }

    /// Replace the filter and refresh
    pub fn set_filter(&self, filter: Option<Filter>) -> Result<(), DataError> {
        *self.inner.filter.write() = filter;
        self.refresh()
    }

    /// Re-evaluate the filter for every record of the source and emit the
    /// difference to the previously visible set
    pub fn refresh(&self) -> Result<(), DataError> {
        let source = self.source();
        let visible = self.inner.visible_ids(source.as_ref())?;

        let (added, removed) = {
            let mut ids = self.inner.ids.write();
            let added: Vec<Id> = visible.iter().filter(|id| !ids.contains(*id)).cloned().collect();
            let removed: Vec<Id> = ids.iter().filter(|id| !visible.contains(*id)).cloned().collect();
            *ids = visible;
            (added, removed)
        };

        if !added.is_empty() {
            self.inner.emit(ChangeEvent::new(Topic::Add, added))?;
        }
        if !removed.is_empty() {
            self.inner.emit(ChangeEvent::new(Topic::Remove, removed))?;
        }
        Ok(())
    }

    /// The table at the root of the chain of views
    pub fn get_data_set(&self) -> DataSet {
        self.source().data_set()
    }

    pub fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        self.inner.bus.on(topic, listener)
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.inner.bus.off(subscription)
    }
}

impl ViewInner {
    fn filter(&self) -> Option<Filter> {
        self.filter.read().clone()
    }

    /// The view's own read: its filter runs inside the source query, on
    /// the record before any projection
    fn query(&self) -> Query {
        let mut query = Query::new().and_filter(self.filter());
        query.fields = self.fields.clone();
        query
    }

    fn visible_ids(&self, source: &dyn DataSource) -> Result<IndexSet<Id>, DataError> {
        Ok(source
            .query_entries(None, &self.query())?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Records among `ids` that pass the filter, as the view presents them
    fn matching(&self, source: &dyn DataSource, ids: &[Id]) -> Result<IndexMap<Id, Record>, DataError> {
        Ok(source.query_entries(Some(ids), &self.query())?.into_iter().collect())
    }

    fn subscribe(self: &Arc<Self>, source: &dyn DataSource) {
        let weak: Weak<ViewInner> = Arc::downgrade(self);
        let subscription = source.on(
            Topic::All,
            listener_from_fn(move |event| {
                if let Some(inner) = weak.upgrade() {
                    if let Err(e) = inner.on_source_event(event) {
                        error!("Data view failed to follow source change: {}", e);
                    }
                }
            }),
        );
        *self.subscription.lock() = Some(subscription);
    }

    fn emit(&self, event: ChangeEvent) -> Result<(), DataError> {
        self.bus.trigger(&event)?;
        Ok(())
    }

    fn on_source_event(&self, event: &ChangeEvent) -> Result<(), DataError> {
        let source = self.source.read().clone();
        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut updated_data = Vec::new();
        let mut removed = Vec::new();

        match event.topic {
            Topic::Add => {
                let matching = self.matching(source.as_ref(), &event.items)?;
                for id in &event.items {
                    if matching.contains_key(id) && self.ids.write().insert(id.clone()) {
                        added.push(id.clone());
                    }
                }
            }
            Topic::Update => {
                let mut matching = self.matching(source.as_ref(), &event.items)?;
                for id in &event.items {
                    let visible = self.ids.read().contains(id);
                    match matching.shift_remove(id) {
                        Some(record) if visible => {
                            updated.push(id.clone());
                            updated_data.push(record);
                        }
                        Some(_) => {
                            self.ids.write().insert(id.clone());
                            added.push(id.clone());
                        }
                        None if visible => {
                            self.ids.write().shift_remove(id);
                            removed.push(id.clone());
                        }
                        None => {}
                    }
                }
            }
            Topic::Remove => {
                for id in &event.items {
                    if self.ids.write().shift_remove(id) {
                        removed.push(id.clone());
                    }
                }
            }
            Topic::All => {}
        }

        let sender = event.sender_id.as_deref();
        if !added.is_empty() {
            self.emit(ChangeEvent::new(Topic::Add, added).with_sender(sender))?;
        }
        if !updated.is_empty() {
            self.emit(
                ChangeEvent::new(Topic::Update, updated)
                    .with_data(updated_data)
                    .with_sender(sender),
            )?;
        }
        if !removed.is_empty() {
            self.emit(ChangeEvent::new(Topic::Remove, removed).with_sender(sender))?;
        }
        Ok(())
    }
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            self.source.get_mut().off(subscription);
        }
    }
}

impl DataSource for DataView {
    fn field_id(&self) -> String {
        self.source().field_id()
    }

    fn query_entries(&self, ids: Option<&[Id]>, query: &Query) -> Result<Vec<(Id, Record)>, DataError> {
        let mut query = query.clone().and_filter(self.inner.filter());
        if query.fields.is_none() {
            query.fields = self.inner.fields.clone();
        }
        self.source().query_entries(ids, &query)
    }

    fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        DataView::on(self, topic, listener)
    }

    fn off(&self, subscription: SubscriptionId) -> bool {
        DataView::off(self, subscription)
    }

    fn data_set(&self) -> DataSet {
        self.get_data_set()
    }
}

impl std::fmt::Debug for DataView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataView")
            .field("len", &self.len())
            .field("fields", &self.inner.fields)
            .finish()
    }
}
