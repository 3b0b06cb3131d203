//! Schema graphs for exposed feature types.
//!
//! Every feature type is described as a tree of typed elements and
//! attributes with explicit data-source paths into the datastore. The
//! tree is what DescribeFeatureType renders, what XPath expressions
//! resolve against, and what the query compiler binds filters to.
//!
//! Elements live in a flat arena and reference each other by index, which
//! sidesteps ownership cycles through back-references and makes pruned
//! projection copies cheap.

pub mod arena;
pub mod feature_type;
pub mod registry;
pub mod types;
pub mod xpath;

pub use arena::{ComplexId, NodeId, NodeKind, Occurs, SchemaArena, TypeRef, XsdComplexType, XsdNode};
pub use feature_type::{FeatureType, FeatureTypeBuilder};
pub use registry::FeatureTypeRegistry;
pub use types::XsdType;
pub use xpath::XPathMatch;
