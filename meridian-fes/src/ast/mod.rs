//! The FES 2.0 filter AST.
//!
//! Three orthogonal node hierarchies, each a tagged variant dispatched by
//! XML element name:
//!
//! * expressions ([`expr`]): value references, literals, functions and the
//!   FES 1.0 arithmetic operators,
//! * operators ([`ops`]): comparison, spatial and logical predicates,
//! * identifiers ([`identifiers`]): `<fes:ResourceId>`.
//!
//! [`filter`] ties them together; [`sort`] covers `<fes:SortBy>`.

pub mod expr;
pub mod filter;
pub mod identifiers;
pub mod ops;
pub mod sort;
