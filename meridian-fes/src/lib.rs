//! Request parsing for WFS 2.0 and FES 2.0.
//!
//! Both entry formats produce the same AST: Key-Value-Pairs from HTTP GET
//! are defined as a lowering onto the XML POST form. Each XML parser knows
//! its expected tag; parent nodes dispatch polymorphic children by element
//! name, mirroring the abstract types of the FES specification
//! (`Expression`, `NonIdOperator`, ...).

pub mod ast;
pub mod functions;
pub mod gml;
pub mod kvp;
pub mod wfs;
pub mod xml;
pub mod xmlns;

pub use ast::expr::{Expression, Literal, LiteralValue, ValueReference};
pub use ast::filter::{Filter, FilterPredicate};
pub use ast::identifiers::ResourceId;
pub use ast::ops::{
    ComparisonOp, DistanceOpName, Measure, NonIdOperator, SpatialOpName, SpatialOperand,
};
pub use ast::sort::{SortBy, SortOrder, SortProperty};
pub use functions::FunctionRegistry;
pub use kvp::KvpRequest;
pub use wfs::adhoc::AdhocQuery;
pub use wfs::requests::{
    DescribeFeatureType, DescribeStoredQueries, GetCapabilities, GetFeature, GetPropertyValue,
    QueryExpression, ResultType, WfsRequest,
};
pub use wfs::stored::{ResolvedStoredQuery, StoredQueryDescription, StoredQueryRegistry};
pub use xml::XmlElement;
