//! Read and subscribe surface shared by tables and views

use dv_core::{Id, Listener, Record, SubscriptionId, Topic};
use indexmap::IndexMap;

use crate::dataset::DataSet;
use crate::query::Query;
use crate::DataError;

/// Anything records can be read from and changes subscribed to.
///
/// Implemented by [`DataSet`] and [`DataView`](crate::DataView), so a view
/// can sit on top of either and renderers can consume both.
pub trait DataSource: Send + Sync {
    /// Name of the identifier field
    fn field_id(&self) -> String;

    /// Matching `(id, record)` pairs. With `ids`, only those ids are
    /// considered, in the given order; unknown ids are skipped.
    fn query_entries(&self, ids: Option<&[Id]>, query: &Query) -> Result<Vec<(Id, Record)>, DataError>;

    fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId;

    fn off(&self, subscription: SubscriptionId) -> bool;

    /// The table at the root of any chain of views
    fn data_set(&self) -> DataSet;

    /// A single record as this source presents it, or `None` if it does
    /// not exist or is not visible here
    fn get_record(&self, id: &Id) -> Result<Option<Record>, DataError> {
        Ok(self
            .query_entries(Some(std::slice::from_ref(id)), &Query::default())?
            .pop()
            .map(|(_, record)| record))
    }

    /// A single record read with query options; the filter may hide it
    fn get_with(&self, id: &Id, query: &Query) -> Result<Option<Record>, DataError> {
        Ok(self
            .query_entries(Some(std::slice::from_ref(id)), query)?
            .pop()
            .map(|(_, record)| record))
    }

    /// Records matching the query
    fn query(&self, query: &Query) -> Result<Vec<Record>, DataError> {
        Ok(self
            .query_entries(None, query)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Records for the given ids, filtered, ordered and projected per query
    fn get_many(&self, ids: &[Id], query: &Query) -> Result<Vec<Record>, DataError> {
        Ok(self
            .query_entries(Some(ids), query)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Matching records keyed by id
    fn query_map(&self, query: &Query) -> Result<IndexMap<Id, Record>, DataError> {
        Ok(self.query_entries(None, query)?.into_iter().collect())
    }

    /// Ids of the matching records
    fn get_ids(&self, query: &Query) -> Result<Vec<Id>, DataError> {
        Ok(self
            .query_entries(None, query)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Call back with each matching record and its id
    fn for_each<F>(&self, query: &Query, mut callback: F) -> Result<(), DataError>
    where
        Self: Sized,
        F: FnMut(&Record, &Id),
    {
        for (id, record) in self.query_entries(None, query)? {
            callback(&record, &id);
        }
        Ok(())
    }

    /// Transform each matching record
    fn map<T, F>(&self, query: &Query, mut callback: F) -> Result<Vec<T>, DataError>
    where
        Self: Sized,
        F: FnMut(&Record, &Id) -> T,
    {
        Ok(self
            .query_entries(None, query)?
            .iter()
            .map(|(id, record)| callback(record, id))
            .collect())
    }
}
