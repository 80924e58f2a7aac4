//! Core value model for the data visualization platform
//!
//! This crate provides the record and value types shared by every table and
//! view, typed value conversion, and the event bus tables publish through.

pub mod convert;
pub mod events;
pub mod id;
pub mod value;

// Re-export commonly used types
pub use convert::{convert, convert_named, parse_date, ConversionError, FieldType, FieldTypes};
pub use events::{
    listener_from_fn, ChangeEvent, EventBus, EventError, Listener, SubscriptionId, Topic,
};
pub use id::Id;
pub use value::{record_from_json, Record, Value};
