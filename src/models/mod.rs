pub mod connection;
pub mod entity;
pub mod metadata;
pub mod query;
pub mod value;

pub use connection::*;
pub use entity::{EntitySpec, CUSTOMER, EMPLOYEE, INVOICE, INVOICE_LINE};
pub use metadata::*;
pub use query::*;
pub use value::*;
