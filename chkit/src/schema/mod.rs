//! Row schemas and their TabSeparated wire form.

pub mod engine;
pub mod field;
pub mod model;
pub mod tsv;

pub use engine::{Engine, EngineKind, Replication};
pub use field::FieldType;
pub use model::Model;
