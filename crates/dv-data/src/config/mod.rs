//! Table, view and queue configuration

pub mod queue_config;
pub mod table_config;

pub use queue_config::*;
pub use table_config::*;
