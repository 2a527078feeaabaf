pub mod document;
pub mod error;
pub mod expand;
pub mod graph;
pub mod project;
pub mod query;
pub mod registry;
pub mod schema;
pub mod selector;
pub mod store;
pub mod validation;

#[cfg(test)]
mod testing;

pub use document::Document;
pub use error::{RefGraphError, Result};
pub use expand::Expander;
pub use graph::{Model, RefGraph};
pub use query::Query;
pub use registry::{ModelType, Registry};
pub use schema::SchemaDefinition;
pub use selector::{FieldSelector, SelectionTree};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
