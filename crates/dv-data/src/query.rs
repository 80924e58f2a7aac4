//! Query options shared by tables and views

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use dv_core::{convert, FieldTypes, Id, Record, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::DataError;

/// Row predicate, evaluated against the type-converted record
pub type Filter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Custom record ordering
pub type Comparator = Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>;

/// Sort order of a query
#[derive(Clone)]
pub enum Order {
    /// Ascending by a field's value
    Field(String),
    Comparator(Comparator),
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Order::Comparator(_) => f.write_str("Comparator(..)"),
        }
    }
}

/// Field projection applied to every returned record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fields {
    /// Keep only the listed fields
    Pick(Vec<String>),
    /// Keep and rename: source field to output field
    Rename(IndexMap<String, String>),
}

/// Read options for `get`, `get_ids`, `for_each` and `map`
#[derive(Clone, Default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub fields: Option<Fields>,
    /// Per-call type override, applied on top of the stored values
    pub types: Option<FieldTypes>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order = Some(Order::Field(field.into()));
        self
    }

    pub fn order_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Record, &Record) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Order::Comparator(Arc::new(comparator)));
        self
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(Fields::Pick(fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn rename<S: Into<String>>(mut self, mapping: impl IntoIterator<Item = (S, S)>) -> Self {
        self.fields = Some(Fields::Rename(
            mapping.into_iter().map(|(from, to)| (from.into(), to.into())).collect(),
        ));
        self
    }

    pub fn types(mut self, types: FieldTypes) -> Self {
        self.types = Some(types);
        self
    }

    /// Combine this query's filter with another predicate; both must hold
    pub(crate) fn and_filter(mut self, other: Option<Filter>) -> Self {
        self.filter = match (self.filter.take(), other) {
            (Some(a), Some(b)) => Some(Arc::new(move |r: &Record| b(r) && a(r))),
            (a, b) => a.or(b),
        };
        self
    }

    pub(crate) fn matches(&self, record: &Record) -> bool {
        self.filter.as_ref().map_or(true, |f| f(record))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .field("order", &self.order)
            .field("fields", &self.fields)
            .field("types", &self.types)
            .finish()
    }
}

/// Convert the fields named in `types`, leaving the rest as stored
pub(crate) fn apply_types(mut record: Record, types: Option<&FieldTypes>) -> Result<Record, DataError> {
    let Some(types) = types else {
        return Ok(record);
    };
    for (field, value) in record.iter_mut() {
        if let Some(field_type) = types.get(field) {
            *value = convert(value, *field_type)?;
        }
    }
    Ok(record)
}

pub(crate) fn project(record: Record, fields: Option<&Fields>) -> Record {
    match fields {
        None => record,
        Some(Fields::Pick(names)) => {
            let mut record = record;
            names
                .iter()
                .filter_map(|name| record.shift_remove(name).map(|v| (name.clone(), v)))
                .collect()
        }
        Some(Fields::Rename(mapping)) => {
            let mut record = record;
            mapping
                .iter()
                .filter_map(|(from, to)| record.shift_remove(from).map(|v| (to.clone(), v)))
                .collect()
        }
    }
}

/// Stable sort of query results
pub(crate) fn sort_entries(entries: &mut [(Id, Record)], order: Option<&Order>) {
    match order {
        None => {}
        Some(Order::Field(field)) => entries.sort_by(|(_, a), (_, b)| compare_field(a, b, field)),
        Some(Order::Comparator(cmp)) => entries.sort_by(|(_, a), (_, b)| cmp(a, b)),
    }
}

/// Total order over a field: values group by kind (booleans, numbers,
/// dates, strings, lists, objects) and missing or null values sort last.
fn compare_field(a: &Record, b: &Record, field: &str) -> Ordering {
    let (a, b) = (a.get(field), b.get(field));
    kind_rank(a).cmp(&kind_rank(b)).then_with(|| match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.total_cmp(b),
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Boolean(_)) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::Date(_) | Value::Moment(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::List(_)) => 4,
        Some(Value::Object(_)) => 5,
        Some(Value::Null) | None => 6,
    }
}

/// Run a query over entries in enumeration order: convert, filter, sort,
/// then project.
pub(crate) fn run_query<I>(entries: I, query: &Query) -> Result<Vec<(Id, Record)>, DataError>
where
    I: IntoIterator<Item = (Id, Record)>,
{
    let mut selected = Vec::new();
    for (id, record) in entries {
        let record = apply_types(record, query.types.as_ref())?;
        if query.matches(&record) {
            selected.push((id, record));
        }
    }
    sort_entries(&mut selected, query.order.as_ref());
    Ok(selected
        .into_iter()
        .map(|(id, record)| (id, project(record, query.fields.as_ref())))
        .collect())
}
