//! Persistence layer — libSQL-backed storage for tickets and the product catalog.

pub mod fixtures;
mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use fixtures::default_products;
pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, NewTicket};
