//! Entity and field descriptors for the live store.
//!
//! The schema is a set of named entities, each with an ordered list of
//! fields. Descriptors are persisted alongside the rows they describe, so a
//! migration always reads the shape the previous migration left behind.

mod entity;
mod field;
mod value;

pub use entity::EntityDef;
pub use field::{FieldDef, FieldType};
pub use value::Value;
