//! The in-process datastore backend.
//!
//! Evaluates the compiled predicate language over in-memory collections,
//! with topological predicates from the `geo` crate. This is the backend
//! behind the test suites and the demo server; a SQL backend would
//! translate the same predicate trees into its own dialect instead.

use crate::datastore::{Datastore, FeatureCursor, FieldValue, Record};
use crate::predicate::{
    ArithOp, CompareOp, CompiledQuery, ComputedExpr, GeoTextFormat, Operand, OrderDirection,
    Ordering, Predicate, SpatialPredicateOp,
};
use async_trait::async_trait;
use geo::{CoordsIter, EuclideanDistance, Relate};
use meridian_core::error::{Result, WfsError};
use meridian_core::values::ScalarValue;
use meridian_core::{Crs, Geometry};
use meridian_fes::functions::FunctionRegistry;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use wkt::ToWkt;

/// In-memory collections, keyed by collection (feature type) name.
#[derive(Default)]
pub struct MemoryDatastore {
    collections: HashMap<String, Vec<Record>>,
    functions: Arc<FunctionRegistry>,
}

impl MemoryDatastore {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        MemoryDatastore {
            collections: HashMap::new(),
            functions,
        }
    }

    pub fn insert(&mut self, collection: &str, record: Record) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    fn rows(&self, collection: &str) -> Result<&[Record]> {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                WfsError::processing_failed(format!("Unknown collection: {collection}"))
            })
    }

    fn matching(&self, collection: &str, query: &CompiledQuery) -> Result<Vec<Record>> {
        if query.always_empty {
            return Ok(Vec::new());
        }
        let mut matched = Vec::new();
        for record in self.rows(collection)? {
            let keep = match &query.predicate {
                Some(predicate) => eval_predicate(record, predicate, &self.functions)?,
                None => true,
            };
            if keep {
                matched.push(record.clone());
            }
        }
        sort_records(&mut matched, &query.orderings);
        Ok(matched)
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn count(&self, collection: &str, query: &CompiledQuery) -> Result<u64> {
        Ok(self.matching(collection, query)?.len() as u64)
    }

    async fn open_cursor(
        &self,
        collection: &str,
        query: &CompiledQuery,
        start: u64,
        limit: Option<u64>,
        chunk_size: usize,
    ) -> Result<Box<dyn FeatureCursor>> {
        let mut rows = self.matching(collection, query)?;
        let start = (start as usize).min(rows.len());
        let end = match limit {
            Some(limit) => (start + limit as usize).min(rows.len()),
            None => rows.len(),
        };
        rows = rows[start..end].to_vec();

        // Serialize geometry annotations the way a SQL backend would with
        // ST_AsEWKT; the GML/GeoJSON variants are left to the renderers.
        for request in &query.geometry_text {
            if request.format != GeoTextFormat::Wkt {
                continue;
            }
            let target = Crs::from_srid(request.srid)?;
            for row in &mut rows {
                if let Some(geometry) = row.geometry_at(&request.path) {
                    let transformed = target.apply_to(geometry)?;
                    let text = transformed.kind.to_geo().wkt_string();
                    row.set_annotation(request.name.clone(), text);
                }
            }
        }

        let chunk_size = chunk_size.max(1);
        let chunks: VecDeque<Vec<Record>> = rows
            .chunks(chunk_size)
            .map(<[Record]>::to_vec)
            .collect();
        Ok(Box::new(MemoryCursor { chunks }))
    }
}

struct MemoryCursor {
    chunks: VecDeque<Vec<Record>>,
}

#[async_trait]
impl FeatureCursor for MemoryCursor {
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>> {
        Ok(self.chunks.pop_front())
    }
}

fn sort_records(records: &mut [Record], orderings: &[Ordering]) {
    if orderings.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for ordering in orderings {
            let va = a.scalar_at(&ordering.path);
            let vb = b.scalar_at(&ordering.path);
            // Null sort keys go last regardless of direction.
            let step = match (va.is_null(), vb.is_null()) {
                (true, true) => CmpOrdering::Equal,
                (true, false) => CmpOrdering::Greater,
                (false, true) => CmpOrdering::Less,
                (false, false) => {
                    let natural = va.compare(&vb).unwrap_or(CmpOrdering::Equal);
                    match ordering.direction {
                        OrderDirection::Asc => natural,
                        OrderDirection::Desc => natural.reverse(),
                    }
                }
            };
            if step != CmpOrdering::Equal {
                return step;
            }
        }
        CmpOrdering::Equal
    });
}

fn eval_predicate(
    record: &Record,
    predicate: &Predicate,
    functions: &FunctionRegistry,
) -> Result<bool> {
    match predicate {
        Predicate::Compare { lhs, op, rhs } => {
            let lhs_values = operand_values(record, lhs, functions)?;
            let rhs_values = operand_values(record, rhs, functions)?;
            // Unbounded elements match when any entry matches.
            for left in &lhs_values {
                for right in &rhs_values {
                    if compare(left, right, *op) {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        Predicate::Like {
            operand,
            pattern,
            case_insensitive,
        } => {
            for value in operand_values(record, operand, functions)? {
                let text = value.to_string();
                if like_match(pattern, &text, *case_insensitive) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::IsNull { path } => {
            let values = record.resolve_path(path);
            Ok(values.is_empty() || values.iter().all(|v| v.is_null()))
        }
        Predicate::Spatial { path, op, geometry } => {
            let Some(candidate) = record.geometry_at(path) else {
                return Ok(false);
            };
            let candidate = align_crs(candidate, geometry)?;
            Ok(spatial_relation(&candidate, geometry, *op))
        }
        Predicate::DWithin {
            path,
            geometry,
            distance,
            beyond,
        } => {
            let Some(candidate) = record.geometry_at(path) else {
                return Ok(false);
            };
            let candidate = align_crs(candidate, geometry)?;
            let measured =
                geometry_distance(&candidate.kind.to_geo(), &geometry.kind.to_geo());
            Ok(if *beyond {
                measured > *distance
            } else {
                measured <= *distance
            })
        }
        Predicate::IdIn { path, ids } => {
            let value = record.scalar_at(path);
            Ok(ids.iter().any(|id| id == &value))
        }
        Predicate::And(parts) => {
            for part in parts {
                if !eval_predicate(record, part, functions)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(parts) => {
            for part in parts {
                if eval_predicate(record, part, functions)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not(inner) => Ok(!eval_predicate(record, inner, functions)?),
        Predicate::AlwaysFalse => Ok(false),
    }
}

fn operand_values(
    record: &Record,
    operand: &Operand,
    functions: &FunctionRegistry,
) -> Result<Vec<ScalarValue>> {
    Ok(match operand {
        Operand::Path(path) => {
            let values: Vec<ScalarValue> = record
                .resolve_path(path)
                .into_iter()
                .filter_map(FieldValue::as_scalar)
                .cloned()
                .collect();
            if values.is_empty() {
                vec![ScalarValue::Null]
            } else {
                values
            }
        }
        Operand::Value(value) => vec![value.clone()],
        Operand::Computed(expr) => vec![eval_computed(record, expr, functions)?],
    })
}

fn eval_computed(
    record: &Record,
    expr: &ComputedExpr,
    functions: &FunctionRegistry,
) -> Result<ScalarValue> {
    match expr {
        ComputedExpr::Value(value) => Ok(value.clone()),
        ComputedExpr::Field(path) => Ok(record.scalar_at(path)),
        ComputedExpr::Function { name, args } => {
            let values = args
                .iter()
                .map(|arg| eval_computed(record, arg, functions))
                .collect::<Result<Vec<_>>>()?;
            functions.resolve(name)?.evaluate(&values)
        }
        ComputedExpr::Arithmetic { op, lhs, rhs } => {
            let left = eval_computed(record, lhs, functions)?;
            let right = eval_computed(record, rhs, functions)?;
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(WfsError::invalid_parameter(
                    format!("Invalid data for an arithmetic element: {left} {right}"),
                    "filter",
                ));
            };
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => {
                    if b == 0.0 {
                        return Err(WfsError::invalid_parameter(
                            "Division by zero in filter expression",
                            "filter",
                        ));
                    }
                    a / b
                }
            };
            Ok(ScalarValue::Double(result))
        }
    }
}

fn compare(lhs: &ScalarValue, rhs: &ScalarValue, op: CompareOp) -> bool {
    match lhs.compare(rhs) {
        None => false,
        Some(ordering) => match op {
            CompareOp::Eq => ordering == CmpOrdering::Equal,
            CompareOp::NotEq => ordering != CmpOrdering::Equal,
            CompareOp::Lt => ordering == CmpOrdering::Less,
            CompareOp::Gt => ordering == CmpOrdering::Greater,
            CompareOp::Lte => ordering != CmpOrdering::Greater,
            CompareOp::Gte => ordering != CmpOrdering::Less,
        },
    }
}

/// SQL-LIKE matching with `%`, `_` and backslash escapes.
fn like_match(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let (pattern, text) = if case_insensitive {
        (pattern.to_lowercase(), text.to_lowercase())
    } else {
        (pattern.to_string(), text.to_string())
    };
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    like_match_inner(&p, &t)
}

fn like_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => {
            (0..=text.len()).any(|skip| like_match_inner(rest, &text[skip..]))
        }
        Some(('_', rest)) => !text.is_empty() && like_match_inner(rest, &text[1..]),
        Some(('\\', rest)) => match rest.split_first() {
            Some((escaped, rest)) => {
                !text.is_empty() && text[0] == *escaped && like_match_inner(rest, &text[1..])
            }
            None => text.is_empty(),
        },
        Some((ch, rest)) => {
            !text.is_empty() && text[0] == *ch && like_match_inner(rest, &text[1..])
        }
    }
}

fn align_crs(candidate: &Geometry, reference: &Geometry) -> Result<Geometry> {
    if candidate.crs.srid == reference.crs.srid {
        Ok(candidate.clone())
    } else {
        reference.crs.apply_to(candidate)
    }
}

fn spatial_relation(
    a: &Geometry,
    b: &Geometry,
    op: SpatialPredicateOp,
) -> bool {
    let ga = a.kind.to_geo();
    let gb = b.kind.to_geo();
    let matrix = ga.relate(&gb);
    match op {
        SpatialPredicateOp::Intersects => matrix.is_intersects(),
        SpatialPredicateOp::Disjoint => matrix.is_disjoint(),
        SpatialPredicateOp::Equals => matrix.is_equal_topo(),
        SpatialPredicateOp::Touches => matrix.is_touches(),
        SpatialPredicateOp::Crosses => matrix.is_crosses(),
        SpatialPredicateOp::Within => matrix.is_within(),
        SpatialPredicateOp::Contains => matrix.is_contains(),
        SpatialPredicateOp::Overlaps => matrix.is_overlaps(),
    }
}

/// Minimum euclidean distance between two geometries.
///
/// For disjoint geometries the minimum is always attained at a vertex of
/// one operand to the other, so probing vertices both ways is exact.
fn geometry_distance(a: &geo_types::Geometry<f64>, b: &geo_types::Geometry<f64>) -> f64 {
    if a.relate(b).is_intersects() {
        return 0.0;
    }
    let via_a = a
        .coords_iter()
        .map(|c| point_to_geometry_distance(geo_types::Point(c), b))
        .fold(f64::INFINITY, f64::min);
    let via_b = b
        .coords_iter()
        .map(|c| point_to_geometry_distance(geo_types::Point(c), a))
        .fold(f64::INFINITY, f64::min);
    via_a.min(via_b)
}

fn point_to_geometry_distance(point: geo_types::Point<f64>, geometry: &geo_types::Geometry<f64>) -> f64 {
    match geometry {
        geo_types::Geometry::Point(g) => point.euclidean_distance(g),
        geo_types::Geometry::Line(g) => point.euclidean_distance(g),
        geo_types::Geometry::LineString(g) => point.euclidean_distance(g),
        geo_types::Geometry::Polygon(g) => point.euclidean_distance(g),
        geo_types::Geometry::MultiPoint(g) => point.euclidean_distance(g),
        geo_types::Geometry::MultiLineString(g) => point.euclidean_distance(g),
        geo_types::Geometry::MultiPolygon(g) => point.euclidean_distance(g),
        geo_types::Geometry::GeometryCollection(g) => g
            .0
            .iter()
            .map(|member| point_to_geometry_distance(point, member))
            .fold(f64::INFINITY, f64::min),
        geo_types::Geometry::Rect(g) => point.euclidean_distance(&g.to_polygon()),
        geo_types::Geometry::Triangle(g) => point.euclidean_distance(&g.to_polygon()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon};
    use meridian_core::crs::WGS84;
    use meridian_core::GeometryKind;

    fn store_with(records: Vec<Record>) -> MemoryDatastore {
        let mut store = MemoryDatastore::new(Arc::new(FunctionRegistry::with_defaults()));
        for record in records {
            store.insert("restaurant", record);
        }
        store
    }

    fn restaurant(id: i64, name: &str, rating: f64, x: f64, y: f64) -> Record {
        Record::new()
            .with("id", FieldValue::Scalar(ScalarValue::Integer(id)))
            .with("name", FieldValue::Scalar(ScalarValue::String(name.into())))
            .with("rating", FieldValue::Scalar(ScalarValue::Double(rating)))
            .with(
                "location",
                FieldValue::Geometry(Geometry::new(
                    WGS84.clone(),
                    GeometryKind::Point(point!(x: x, y: y)),
                )),
            )
    }

    fn sample_store() -> MemoryDatastore {
        store_with(vec![
            restaurant(1, "Café Noir", 4.5, 4.89, 52.37),
            restaurant(2, "Snackbar", 2.0, 4.90, 52.38),
            restaurant(3, "Café Brecht", 3.5, 5.10, 52.09),
        ])
    }

    async fn run(store: &MemoryDatastore, query: &CompiledQuery) -> Vec<i64> {
        let mut cursor = store
            .open_cursor("restaurant", query, 0, None, 100)
            .await
            .unwrap();
        let mut ids = Vec::new();
        while let Some(chunk) = cursor.next_chunk().await.unwrap() {
            for record in chunk {
                match record.scalar_at("id") {
                    ScalarValue::Integer(id) => ids.push(id),
                    other => panic!("unexpected id {other:?}"),
                }
            }
        }
        ids
    }

    #[tokio::test]
    async fn compare_predicate_filters() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        query.add_predicate(Predicate::Compare {
            lhs: Operand::Path("rating".into()),
            op: CompareOp::Gte,
            rhs: Operand::Value(ScalarValue::Double(3.0)),
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });
        assert_eq!(run(&store, &query).await, vec![1, 3]);
    }

    #[tokio::test]
    async fn like_predicate_matches_prefix() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        query.add_predicate(Predicate::Like {
            operand: Operand::Path("name".into()),
            pattern: "Caf%".into(),
            case_insensitive: false,
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });
        assert_eq!(run(&store, &query).await, vec![1, 3]);
    }

    #[tokio::test]
    async fn spatial_intersects_with_envelope() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        // A box around Amsterdam, excluding restaurant 3 (Utrecht).
        let envelope = Geometry::new(
            WGS84.clone(),
            GeometryKind::Polygon(polygon![
                (x: 4.58, y: 52.03), (x: 5.0, y: 52.03),
                (x: 5.0, y: 52.49), (x: 4.58, y: 52.49),
                (x: 4.58, y: 52.03),
            ]),
        );
        query.add_predicate(Predicate::Spatial {
            path: "location".into(),
            op: SpatialPredicateOp::Intersects,
            geometry: envelope,
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });
        assert_eq!(run(&store, &query).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn dwithin_in_degrees() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        query.add_predicate(Predicate::DWithin {
            path: "location".into(),
            geometry: Geometry::new(
                WGS84.clone(),
                GeometryKind::Point(point!(x: 4.89, y: 52.37)),
            ),
            distance: 0.05,
            beyond: false,
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });
        assert_eq!(run(&store, &query).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn pagination_covers_every_row_exactly_once() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        query.add_ordering(Ordering {
            path: "rating".into(),
            direction: OrderDirection::Desc,
        });
        query.add_ordering(Ordering {
            path: "id".into(),
            direction: OrderDirection::Asc,
        });

        let mut collected = Vec::new();
        for start in [0u64, 1, 2] {
            let mut cursor = store
                .open_cursor("restaurant", &query, start, Some(1), 10)
                .await
                .unwrap();
            while let Some(chunk) = cursor.next_chunk().await.unwrap() {
                for record in chunk {
                    collected.push(record.scalar_at("id"));
                }
            }
        }
        assert_eq!(
            collected,
            vec![
                ScalarValue::Integer(1),
                ScalarValue::Integer(3),
                ScalarValue::Integer(2)
            ]
        );
    }

    #[tokio::test]
    async fn null_sort_keys_go_last() {
        let mut store = sample_store();
        store.insert(
            "restaurant",
            Record::new()
                .with("id", FieldValue::Scalar(ScalarValue::Integer(9)))
                .with("name", FieldValue::Scalar(ScalarValue::Null)),
        );
        let mut query = CompiledQuery::default();
        query.add_ordering(Ordering {
            path: "name".into(),
            direction: OrderDirection::Asc,
        });
        let ids = run(&store, &query).await;
        assert_eq!(*ids.last().unwrap(), 9);
    }

    #[test]
    fn like_matcher_corner_cases() {
        assert!(like_match("Caf%", "Café Noir", false));
        assert!(!like_match("caf%", "Café Noir", false));
        assert!(like_match("caf%", "Café Noir", true));
        assert!(like_match("a_c", "abc", false));
        assert!(!like_match("a_c", "abbc", false));
        assert!(like_match("100\\%", "100%", false));
        assert!(!like_match("100\\%", "1000", false));
        assert!(like_match("%", "", false));
    }

    #[tokio::test]
    async fn wkt_annotations_are_rendered() {
        let store = sample_store();
        let mut query = CompiledQuery::default();
        query.geometry_text.push(crate::predicate::GeometryTextRequest {
            name: "_as_wkt_location".into(),
            path: "location".into(),
            format: GeoTextFormat::Wkt,
            srid: 4326,
            precision: 6,
        });
        let mut cursor = store
            .open_cursor("restaurant", &query, 0, Some(1), 10)
            .await
            .unwrap();
        let chunk = cursor.next_chunk().await.unwrap().unwrap();
        assert!(chunk[0].annotation("_as_wkt_location").unwrap().starts_with("POINT"));
    }
}
