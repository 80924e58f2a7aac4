//! Building timeline items from records

use dv_core::{FieldType, FieldTypes, Id, Record, Value};
use dv_data::{DataError, DataSource, Query};
use tracing::warn;

use super::StackItem;

impl StackItem {
    /// Build an item from a record whose `start` (and optional `end`) are
    /// already dates. `group` is carried over as is.
    pub fn from_record(id: Id, record: &Record) -> Option<Self> {
        let start = record.get("start").and_then(Value::as_date)?;
        let mut item = StackItem::new(id, start);
        item.end = record.get("end").and_then(Value::as_date);
        item.group = record.get("group").filter(|g| !g.is_null()).cloned();
        Some(item)
    }
}

/// Read every record of `source` as a timed item, converting `start` and
/// `end` to dates. Records without a usable start are skipped.
pub fn load_items(source: &dyn DataSource) -> Result<Vec<StackItem>, DataError> {
    let mut types = FieldTypes::new();
    types.insert("start".to_string(), FieldType::Date);
    types.insert("end".to_string(), FieldType::Date);

    let entries = source.query_entries(None, &Query::new().types(types))?;
    let mut items = Vec::with_capacity(entries.len());
    for (id, record) in entries {
        match StackItem::from_record(id.clone(), &record) {
            Some(item) => items.push(item),
            None => warn!("Skipping item {} without a start date", id),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dv_data::{DataInput, DataSet, DataSetOptions};
    use serde_json::json;

    #[test]
    fn test_load_items_converts_dates() {
        let data = DataInput::try_from(json!([
            {"id": 1, "start": "2024-01-01", "end": 1704153600000i64, "group": "a"},
            {"id": 2, "start": "2024-01-03T12:00:00Z"},
            {"id": 3, "content": "no start"}
        ]))
        .unwrap();
        let set = DataSet::with_data(data, DataSetOptions::default()).unwrap();

        let items = load_items(&set).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(items[0].end, Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
        assert_eq!(items[0].group, Some(Value::from("a")));
        assert!(!items[1].is_range());
        assert_eq!(items[1].id, Id::Int(2));
    }
}
