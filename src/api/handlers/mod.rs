pub mod catalog;
pub mod connection;
pub mod query;
pub mod records;
pub mod report;
pub mod system;
