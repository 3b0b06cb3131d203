//! Query compilation and execution planning.
//!
//! The compiler walks a parsed filter AST bottom-up and emits a
//! backend-agnostic [`predicate::CompiledQuery`], bound to the feature
//! type's schema graph. The [`datastore::Datastore`] trait is the only seam
//! between the compiler and a concrete backend; [`memory`] provides the
//! in-process backend used by tests and the demo server.

pub mod collection;
pub mod compiler;
pub mod datastore;
pub mod memory;
pub mod predicate;
pub mod projection;

pub use collection::{FeatureCollection, SimpleFeatureCollection};
pub use compiler::{compile_query, CompilerContext};
pub use datastore::{Datastore, FeatureCursor, FieldValue, Record};
pub use memory::MemoryDatastore;
pub use predicate::{
    CompareOp, CompiledQuery, ComputedExpr, GeoTextFormat, GeometryTextRequest, Operand,
    OrderDirection, Ordering, Predicate, SpatialPredicateOp,
};
pub use projection::FeatureProjection;
