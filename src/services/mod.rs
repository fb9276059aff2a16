pub mod catalog;
pub mod connection_pool;
pub mod dashboard_service;
pub mod database; // One pooled adapter per client kind
pub mod db_service;
pub mod dialect; // Per-client naming, quoting and paging rules
pub mod normalizer;
pub mod query_builder;
pub mod query_service;
pub mod records;
pub mod registry;
pub mod report_service;

pub use connection_pool::*;
pub use db_service::*;
pub use query_service::*;
pub use registry::*;
