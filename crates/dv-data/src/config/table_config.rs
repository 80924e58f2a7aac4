//! Table and view configuration

use dv_core::FieldTypes;
use serde::{Deserialize, Serialize};

use super::queue_config::{deserialize_queue, serialize_queue, QueueOptions};
use crate::query::{Fields, Filter};

/// Configuration of a [`DataSet`](crate::DataSet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSetOptions {
    /// Name of the identifier field
    pub field_id: String,

    /// Declared field types, applied on every write
    #[serde(rename = "type")]
    pub types: FieldTypes,

    /// Batch mutating calls through a change queue
    #[serde(
        deserialize_with = "deserialize_queue",
        serialize_with = "serialize_queue"
    )]
    pub queue: Option<QueueOptions>,
}

impl Default for DataSetOptions {
    fn default() -> Self {
        Self {
            field_id: "id".to_string(),
            types: FieldTypes::new(),
            queue: None,
        }
    }
}

impl DataSetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_id(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = field_id.into();
        self
    }

    pub fn with_type(mut self, field: impl Into<String>, field_type: dv_core::FieldType) -> Self {
        self.types.insert(field.into(), field_type);
        self
    }

    pub fn with_queue(mut self, queue: QueueOptions) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Configuration of a [`DataView`](crate::DataView)
#[derive(Clone, Default)]
pub struct DataViewOptions {
    /// Only records passing the filter are visible through the view
    pub filter: Option<Filter>,

    /// Default projection when a read does not ask for fields itself
    pub fields: Option<Fields>,
}

impl DataViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dv_core::Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(std::sync::Arc::new(filter));
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = Some(fields);
        self
    }
}

impl std::fmt::Debug for DataViewOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataViewOptions")
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .field("fields", &self.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_core::FieldType;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_options() {
        let options: DataSetOptions = serde_json::from_value(json!({
            "fieldId": "key",
            "type": {"start": "Date", "count": "Number"},
            "queue": {"delay": 50, "max": 10}
        }))
        .unwrap();

        assert_eq!(options.field_id, "key");
        assert_eq!(options.types["start"], FieldType::Date);
        assert_eq!(options.queue, Some(QueueOptions { delay: Some(50), max: Some(10) }));
    }

    #[test]
    fn test_queue_flag_forms() {
        let off: DataSetOptions = serde_json::from_value(json!({"queue": false})).unwrap();
        assert_eq!(off.queue, None);
        assert_eq!(off.field_id, "id");

        let on: DataSetOptions = serde_json::from_value(json!({"queue": true})).unwrap();
        assert_eq!(on.queue, Some(QueueOptions::default()));

        let serialized = serde_json::to_value(&off).unwrap();
        assert_eq!(serialized["queue"], json!(false));
    }
}
