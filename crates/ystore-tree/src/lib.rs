//! Schema context and instance data tree for yangstore.
//!
//! This crate is the schema-library boundary: the rest of the workspace
//! consumes trees and schema nodes through the types here and never looks
//! at how they are modeled. The context is immutable per generation;
//! schema-affecting operations compile a new context and swap it in.

pub mod node;
pub mod path;
pub mod schema;
pub mod validate;

pub use node::{DataNode, DataTree};
pub use path::{Path, PathSegment, Predicate};
pub use schema::{SchemaContext, SchemaModule, SchemaNode, SchemaNodeKind};
pub use validate::{validate, validate_module};
