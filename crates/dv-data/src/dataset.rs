//! Observable typed table
//!
//! A [`DataSet`] owns records keyed by id, converts declared fields on every
//! write, and publishes `add`/`update`/`remove` events after each mutating
//! call. Handles are cheap to clone and share the same table.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use dv_core::{
    convert, record_from_json, ChangeEvent, EventBus, FieldTypes, Id, Listener, Record,
    SubscriptionId, Topic, Value,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{DataSetOptions, QueueOptions};
use crate::query::{run_query, Query};
use crate::queue::{ChangeQueue, DataMutations, Method};
use crate::source::DataSource;
use crate::DataError;

/// Records passed to `add` or `update`
#[derive(Debug, Clone, PartialEq)]
pub enum DataInput {
    One(Record),
    Many(Vec<Record>),
}

impl DataInput {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            DataInput::One(record) => vec![record],
            DataInput::Many(records) => records,
        }
    }
}

impl From<Record> for DataInput {
    fn from(record: Record) -> Self {
        DataInput::One(record)
    }
}

impl From<Vec<Record>> for DataInput {
    fn from(records: Vec<Record>) -> Self {
        DataInput::Many(records)
    }
}

impl TryFrom<serde_json::Value> for DataInput {
    type Error = DataError;

    /// Accepts an object or an array of objects
    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Object(_) => Ok(DataInput::One(expect_object(json)?)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(expect_object)
                .collect::<Result<Vec<_>, _>>()
                .map(DataInput::Many),
            other => Err(unsupported("an object or an array of objects", &other)),
        }
    }
}

fn expect_object(json: serde_json::Value) -> Result<Record, DataError> {
    let kind = json_kind(&json);
    record_from_json(json).ok_or(DataError::UnsupportedInput {
        expected: "an object",
        got: kind.to_string(),
    })
}

fn unsupported(expected: &'static str, json: &serde_json::Value) -> DataError {
    DataError::UnsupportedInput {
        expected,
        got: json_kind(json).to_string(),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Ids given as JSON: a scalar id, an object carrying the id field, or an
/// array of either.
fn ids_from_json(json: &serde_json::Value, field_id: &str) -> Result<Vec<Id>, DataError> {
    let single = |item: &serde_json::Value| -> Result<Id, DataError> {
        let value = match item {
            serde_json::Value::Object(map) => map
                .get(field_id)
                .cloned()
                .map(Value::from)
                .ok_or_else(|| DataError::MissingField {
                    field: field_id.to_string(),
                })?,
            other => Value::from(other.clone()),
        };
        Id::from_value(&value).ok_or_else(|| unsupported("a string or integer id", item))
    };
    match json {
        serde_json::Value::Array(items) => items.iter().map(single).collect(),
        other => single(other).map(|id| vec![id]),
    }
}

/// The canonical record storage behind a [`DataSet`]
pub(crate) struct Store {
    field_id: String,
    types: FieldTypes,
    items: RwLock<IndexMap<Id, Record>>,
    bus: EventBus,
}

/// Result of staging an upsert batch before it is committed
#[derive(Default)]
struct UpsertBatch {
    staged: IndexMap<Id, Record>,
    added: Vec<Id>,
    updated: Vec<Id>,
    old_data: AHashMap<Id, Record>,
}

impl Store {
    fn new(options: &DataSetOptions) -> Self {
        Self {
            field_id: options.field_id.clone(),
            types: options.types.clone(),
            items: RwLock::new(IndexMap::new()),
            bus: EventBus::new(),
        }
    }

    /// Convert declared fields and read the record's id, if it has one
    fn prepare(&self, record: Record) -> Result<(Option<Id>, Record), DataError> {
        let mut converted = Record::with_capacity(record.len());
        for (field, value) in record {
            let value = match self.types.get(&field) {
                Some(field_type) => convert(&value, *field_type)?,
                None => value,
            };
            converted.insert(field, value);
        }

        let id = match converted.get(&self.field_id) {
            None | Some(Value::Null) => None,
            Some(value) => Some(Id::from_value(value).ok_or_else(|| DataError::UnsupportedInput {
                expected: "a string or integer id",
                got: value.kind().to_string(),
            })?),
        };
        Ok((id, converted))
    }

    fn with_generated_id(&self, mut record: Record) -> (Id, Record) {
        let id = Id::generate();
        record.insert(self.field_id.clone(), id.to_value());
        (id, record)
    }

    fn emit(&self, event: ChangeEvent) -> Result<(), DataError> {
        self.bus.trigger(&event)?;
        Ok(())
    }

    fn insert_all(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        let ids = {
            let mut items = self.items.write();
            let mut staged = Vec::new();
            let mut seen = AHashSet::new();
            for record in data.into_records() {
                let (id, record) = match self.prepare(record)? {
                    (Some(id), record) => (id, record),
                    (None, record) => self.with_generated_id(record),
                };
                if items.contains_key(&id) || !seen.insert(id.clone()) {
                    return Err(DataError::DuplicateId(id));
                }
                staged.push((id, record));
            }

            let ids: Vec<Id> = staged.iter().map(|(id, _)| id.clone()).collect();
            items.extend(staged);
            ids
        };

        if !ids.is_empty() {
            debug!("Added {} record(s)", ids.len());
            self.emit(ChangeEvent::new(Topic::Add, ids.clone()).with_sender(sender_id))?;
        }
        Ok(ids)
    }

    /// Stage an upsert against the current items without touching them.
    /// With `update_only`, records without an id or with an unknown id fail.
    fn stage_upsert(
        &self,
        items: &IndexMap<Id, Record>,
        records: Vec<Record>,
        update_only: bool,
    ) -> Result<UpsertBatch, DataError> {
        let mut batch = UpsertBatch::default();

        for record in records {
            let (id, record) = match self.prepare(record)? {
                (Some(id), record) => (id, record),
                (None, _) if update_only => {
                    return Err(DataError::MissingField {
                        field: self.field_id.clone(),
                    })
                }
                (None, record) => {
                    let (id, record) = self.with_generated_id(record);
                    batch.added.push(id.clone());
                    batch.staged.insert(id, record);
                    continue;
                }
            };

            let current = batch.staged.get(&id).or_else(|| items.get(&id)).cloned();
            match current {
                Some(mut merged) => {
                    if let Some(original) = items.get(&id) {
                        if !batch.old_data.contains_key(&id) {
                            batch.old_data.insert(id.clone(), original.clone());
                            batch.updated.push(id.clone());
                        }
                    }
                    merged.extend(record);
                    batch.staged.insert(id, merged);
                }
                None if update_only => return Err(DataError::MissingId(id)),
                None => {
                    batch.added.push(id.clone());
                    batch.staged.insert(id, record);
                }
            }
        }
        Ok(batch)
    }

    fn upsert(&self, data: DataInput, sender_id: Option<&str>, update_only: bool) -> Result<Vec<Id>, DataError> {
        let batch = {
            let mut items = self.items.write();
            let batch = self.stage_upsert(&items, data.into_records(), update_only)?;
            for (id, record) in &batch.staged {
                items.insert(id.clone(), record.clone());
            }
            batch
        };

        let UpsertBatch {
            staged,
            added,
            updated,
            mut old_data,
        } = batch;

        if !added.is_empty() {
            self.emit(ChangeEvent::new(Topic::Add, added.clone()).with_sender(sender_id))?;
        }
        if !updated.is_empty() {
            let data = updated.iter().filter_map(|id| staged.get(id).cloned()).collect();
            let old = updated.iter().filter_map(|id| old_data.remove(id)).collect();
            debug!("Updated {} record(s)", updated.len());
            self.emit(
                ChangeEvent::new(Topic::Update, updated.clone())
                    .with_data(data)
                    .with_old_data(old)
                    .with_sender(sender_id),
            )?;
        }

        Ok(staged.into_keys().collect())
    }

    pub(crate) fn update_only(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.upsert(data, sender_id, true)
    }
}

impl DataMutations for Store {
    fn add(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.insert_all(data, sender_id)
    }

    fn update(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.upsert(data, sender_id, false)
    }

    fn remove(&self, ids: Vec<Id>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        let removed: Vec<(Id, Record)> = {
            let mut items = self.items.write();
            ids.into_iter()
                .filter_map(|id| items.shift_remove(&id).map(|record| (id, record)))
                .collect()
        };

        if removed.is_empty() {
            return Ok(Vec::new());
        }
        let (ids, old): (Vec<Id>, Vec<Record>) = removed.into_iter().unzip();
        debug!("Removed {} record(s)", ids.len());
        self.emit(
            ChangeEvent::new(Topic::Remove, ids.clone())
                .with_old_data(old)
                .with_sender(sender_id),
        )?;
        Ok(ids)
    }

    fn clear(&self, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        let drained = std::mem::take(&mut *self.items.write());
        let (ids, old): (Vec<Id>, Vec<Record>) = drained.into_iter().unzip();
        debug!("Cleared {} record(s)", ids.len());
        self.emit(
            ChangeEvent::new(Topic::Remove, ids.clone())
                .with_old_data(old)
                .with_sender(sender_id),
        )?;
        Ok(ids)
    }
}

/// Observable, typed, in-memory table of records
#[derive(Clone)]
pub struct DataSet {
    store: Arc<Store>,
    queue: Arc<RwLock<Option<Arc<ChangeQueue<Store>>>>>,
}

impl DataSet {
    /// Create an empty table
    pub fn new(options: DataSetOptions) -> Self {
        debug!(
            "Creating data set (id field '{}', {} typed field(s))",
            options.field_id,
            options.types.len()
        );
        let set = Self {
            store: Arc::new(Store::new(&options)),
            queue: Arc::new(RwLock::new(None)),
        };
        if let Some(queue) = options.queue {
            set.attach_queue(queue);
        }
        set
    }

    /// Create a table and add the initial records. The initial records are
    /// never queued.
    pub fn with_data(data: impl Into<DataInput>, options: DataSetOptions) -> Result<Self, DataError> {
        let set = Self::new(options);
        set.store.add(data.into(), None)?;
        Ok(set)
    }

    /// Name of the identifier field
    pub fn field_id(&self) -> &str {
        &self.store.field_id
    }

    /// Declared field types
    pub fn types(&self) -> &FieldTypes {
        &self.store.types
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.store.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutations(&self) -> Arc<dyn DataMutations> {
        match self.queue.read().as_ref() {
            Some(queue) => queue.clone() as Arc<dyn DataMutations>,
            None => self.store.clone(),
        }
    }

    /// Add one or more records. Fails without storing anything if any id is
    /// already present. When the call is queued the returned list is empty.
    pub fn add(&self, data: impl Into<DataInput>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.mutations().add(data.into(), sender_id)
    }

    /// Upsert: merge supplied fields into existing records, add the rest.
    /// Ids come back in input order.
    pub fn update(&self, data: impl Into<DataInput>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.mutations().update(data.into(), sender_id)
    }

    /// Merge into existing records only; never adds. Bypasses the queue.
    pub fn update_only(&self, data: impl Into<DataInput>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.store.update_only(data.into(), sender_id)
    }

    /// Remove records by id; unknown and repeated ids are skipped
    pub fn remove<I: Into<Id>>(
        &self,
        ids: impl IntoIterator<Item = I>,
        sender_id: Option<&str>,
    ) -> Result<Vec<Id>, DataError> {
        self.mutations()
            .remove(ids.into_iter().map(Into::into).collect(), sender_id)
    }

    /// Remove records named in JSON: a scalar id, a record carrying the id
    /// field, or an array of either. Nothing is removed if any entry is
    /// unusable.
    pub fn remove_json(&self, json: &serde_json::Value, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        let ids = ids_from_json(json, &self.store.field_id)?;
        self.remove(ids, sender_id)
    }

    /// Remove every record. Always emits `remove`, even when empty.
    pub fn clear(&self, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.mutations().clear(sender_id)
    }

    /// Stored record by id
    pub fn get(&self, id: &Id) -> Option<Record> {
        self.store.items.read().get(id).cloned()
    }

    /// Record holding the greatest value of `field`; first one wins ties
    pub fn max(&self, field: &str) -> Option<Record> {
        self.extreme(field, std::cmp::Ordering::Greater)
    }

    /// Record holding the smallest value of `field`; first one wins ties
    pub fn min(&self, field: &str) -> Option<Record> {
        self.extreme(field, std::cmp::Ordering::Less)
    }

    fn extreme(&self, field: &str, wanted: std::cmp::Ordering) -> Option<Record> {
        let items = self.store.items.read();
        let mut best: Option<&Record> = None;
        for record in items.values() {
            let Some(value) = record.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let better = match best.and_then(|b| b.get(field)) {
                None => true,
                Some(current) => value.compare(current) == Some(wanted),
            };
            if better {
                best = Some(record);
            }
        }
        best.cloned()
    }

    /// Unique non-null values of `field`, in first-seen order
    pub fn distinct(&self, field: &str) -> Result<Vec<Value>, DataError> {
        let items = self.store.items.read();
        let mut seen = AHashSet::new();
        let mut values = Vec::new();
        for value in items.values().filter_map(|r| r.get(field)) {
            if value.is_null() {
                continue;
            }
            let value = match self.store.types.get(field) {
                Some(field_type) => convert(value, *field_type)?,
                None => value.clone(),
            };
            if seen.insert((value.kind(), value.to_string())) {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Subscribe to table events
    pub fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        self.store.bus.on(topic, listener)
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.store.bus.off(subscription)
    }

    /// Number of listeners subscribed to a topic
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.store.bus.listener_count(topic)
    }

    fn attach_queue(&self, options: QueueOptions) {
        let queue = ChangeQueue::attach(
            self.store.clone(),
            &[Method::Add, Method::Update, Method::Remove],
            options,
        );
        *self.queue.write() = Some(Arc::new(queue));
    }

    /// Attach, reconfigure or (with `None`) destroy the change queue.
    /// Destroying flushes whatever is still buffered.
    pub fn set_queue(&self, options: Option<QueueOptions>) -> Result<(), DataError> {
        let existing = self.queue.read().clone();
        match (existing, options) {
            (Some(queue), Some(options)) => queue.configure(options),
            (None, Some(options)) => {
                self.attach_queue(options);
                Ok(())
            }
            (Some(queue), None) => {
                self.queue.write().take();
                queue.destroy()
            }
            (None, None) => Ok(()),
        }
    }

    /// Replay queued calls now. No-op without a queue.
    pub fn flush(&self) -> Result<(), DataError> {
        let queue = self.queue.read().clone();
        match queue {
            Some(queue) => queue.flush(),
            None => Ok(()),
        }
    }

    /// Number of calls waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |q| q.len())
    }
}

impl DataSource for DataSet {
    fn field_id(&self) -> String {
        self.store.field_id.clone()
    }

    fn query_entries(&self, ids: Option<&[Id]>, query: &Query) -> Result<Vec<(Id, Record)>, DataError> {
        // Snapshot first so filters and comparators run without the lock held
        let snapshot: Vec<(Id, Record)> = {
            let items = self.store.items.read();
            match ids {
                None => items.iter().map(|(id, r)| (id.clone(), r.clone())).collect(),
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| items.get(id).map(|r| (id.clone(), r.clone())))
                    .collect(),
            }
        };
        run_query(snapshot, query)
    }

    fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        DataSet::on(self, topic, listener)
    }

    fn off(&self, subscription: SubscriptionId) -> bool {
        DataSet::off(self, subscription)
    }

    fn data_set(&self) -> DataSet {
        self.clone()
    }
}

impl std::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSet")
            .field("field_id", &self.store.field_id)
            .field("len", &self.len())
            .field("queued", &self.queued())
            .finish()
    }
}
