//! The backend-agnostic query representation.
//!
//! A [`CompiledQuery`] is an opaque container that the compiler fills
//! exactly once per request: a predicate tree, orderings, the data-source
//! paths to select, relation paths to prefetch, and geometry-serialization
//! annotations for backends that render geometry text themselves.

use meridian_core::values::ScalarValue;
use meridian_core::Geometry;

/// Scalar comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

/// Topological predicates, evaluated DE-9IM style by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicateOp {
    Intersects,
    Equals,
    Disjoint,
    Touches,
    Crosses,
    Within,
    Contains,
    Overlaps,
}

/// Arithmetic inside computed expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A computed expression: functions, arithmetic and their inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedExpr {
    Value(ScalarValue),
    /// A data-source path read per row.
    Field(String),
    Function {
        name: String,
        args: Vec<ComputedExpr>,
    },
    Arithmetic {
        op: ArithOp,
        lhs: Box<ComputedExpr>,
        rhs: Box<ComputedExpr>,
    },
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A data-source path into the row.
    Path(String),
    /// A constant.
    Value(ScalarValue),
    /// A computed expression (function call or arithmetic).
    Computed(ComputedExpr),
}

/// The predicate tree handed to the datastore.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        lhs: Operand,
        op: CompareOp,
        rhs: Operand,
    },
    /// SQL-`LIKE` style match; the pattern uses `%`/`_` with `\` escapes.
    Like {
        operand: Operand,
        pattern: String,
        case_insensitive: bool,
    },
    /// Field has no value. For unbounded elements this means "no entry".
    IsNull { path: String },
    Spatial {
        path: String,
        op: SpatialPredicateOp,
        geometry: Geometry,
    },
    /// Distance comparison; `distance` is expressed in the units of the
    /// feature's CRS. `beyond` inverts the test.
    DWithin {
        path: String,
        geometry: Geometry,
        distance: f64,
        beyond: bool,
    },
    /// Identity lookup; ids are pre-coerced to the identity field's type.
    IdIn {
        path: String,
        ids: Vec<ScalarValue>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Matches nothing; used for unparseable resource ids in lax mode.
    AlwaysFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// One ordering term. Rows with a null sort key always sort last.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub path: String,
    pub direction: OrderDirection,
}

/// Geometry text formats a backend may pre-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoTextFormat {
    Wkt,
    Gml,
    GeoJson,
}

/// Ask the backend to serialize a geometry column as text (the
/// `ST_AsEWKT` / `ST_AsGML` / `ST_AsGeoJSON` optimization). Backends that
/// can't are free to skip it; renderers fall back to in-process rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTextRequest {
    /// Annotation name the renderer reads back.
    pub name: String,
    /// Source path of the geometry column.
    pub path: String,
    pub format: GeoTextFormat,
    /// Target SRID for the serialized output.
    pub srid: i32,
    pub precision: usize,
}

/// Everything the datastore needs to answer one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Option<Predicate>,
    pub orderings: Vec<Ordering>,
    /// Paths the renderers will read; backends may trim their select list.
    pub select_paths: Vec<String>,
    /// Unbounded relation paths to prefetch per chunk.
    pub prefetch_paths: Vec<String>,
    pub geometry_text: Vec<GeometryTextRequest>,
    /// Short-circuit: the query provably matches nothing.
    pub always_empty: bool,
}

impl CompiledQuery {
    pub fn add_predicate(&mut self, predicate: Predicate) {
        self.predicate = Some(match self.predicate.take() {
            None => predicate,
            Some(Predicate::And(mut parts)) => {
                parts.push(predicate);
                Predicate::And(parts)
            }
            Some(existing) => Predicate::And(vec![existing, predicate]),
        });
    }

    pub fn add_ordering(&mut self, ordering: Ordering) {
        if !self.orderings.iter().any(|o| o.path == ordering.path) {
            self.orderings.push(ordering);
        }
    }

    pub fn mark_empty(&mut self) {
        self.always_empty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_chain_with_and() {
        let mut query = CompiledQuery::default();
        query.add_predicate(Predicate::AlwaysFalse);
        query.add_predicate(Predicate::IsNull { path: "name".into() });
        query.add_predicate(Predicate::IsNull { path: "x".into() });
        match query.predicate.unwrap() {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_orderings_are_dropped() {
        let mut query = CompiledQuery::default();
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Desc,
        });
        assert_eq!(query.orderings.len(), 1);
    }
}
