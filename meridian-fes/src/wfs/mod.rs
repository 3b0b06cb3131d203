//! WFS 2.0 request types, built on the FES filter AST.

pub mod adhoc;
pub mod requests;
pub mod stored;
