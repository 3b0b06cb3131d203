//! The query compiler: filter AST in, `CompiledQuery` out.
//!
//! The walk is bottom-up. Value references resolve through the schema
//! graph to absolute data-source paths; literals are coerced against the
//! matched element's type before anything reaches the datastore, so type
//! errors surface as proper WFS exceptions instead of backend failures.

use crate::predicate::{
    ArithOp, CompareOp, CompiledQuery, ComputedExpr, Operand, OrderDirection, Ordering, Predicate,
    SpatialPredicateOp,
};
use meridian_core::config::ServiceConfig;
use meridian_core::error::{Result, WfsError};
use meridian_core::values::{auto_cast, ScalarValue};
use meridian_core::Geometry;
use meridian_fes::ast::expr::{ArithmeticOp, Expression, Literal, LiteralValue, ValueReference};
use meridian_fes::ast::filter::FilterPredicate;
use meridian_fes::ast::identifiers::ResourceId;
use meridian_fes::ast::ops::{
    ComparisonOp, DistanceOpName, Measure, NonIdOperator, SpatialOpName, SpatialOperand,
};
use meridian_fes::ast::sort::{SortBy, SortOrder};
use meridian_fes::functions::FunctionRegistry;
use meridian_fes::wfs::adhoc::AdhocQuery;
use meridian_schema::{FeatureType, XPathMatch, XsdNode};

/// Everything the compiler needs besides the query itself.
pub struct CompilerContext<'a> {
    pub feature_type: &'a FeatureType,
    pub functions: &'a FunctionRegistry,
    pub config: &'a ServiceConfig,
}

/// Compile an adhoc query's filter and ordering against one feature type.
pub fn compile_query(query: &AdhocQuery, ctx: &CompilerContext<'_>) -> Result<CompiledQuery> {
    let mut compiled = CompiledQuery::default();

    if let Some(sort_by) = &query.sort_by {
        compile_sort(ctx, sort_by, &mut compiled)?;
    }
    // Stable tiebreaker on the identity field keeps pagination
    // deterministic when the requested ordering has duplicates.
    compiled.add_ordering(Ordering {
        path: ctx.feature_type.id_path().to_string(),
        direction: OrderDirection::Asc,
    });

    if let Some(filter) = &query.filter {
        match &filter.predicate {
            FilterPredicate::Operator(op) => {
                let predicate = compile_operator(ctx, op)?;
                compiled.add_predicate(predicate);
            }
            FilterPredicate::Function { name, args } => {
                let call = compile_function(ctx, name, args)?;
                compiled.add_predicate(Predicate::Compare {
                    lhs: Operand::Computed(call),
                    op: CompareOp::Eq,
                    rhs: Operand::Value(ScalarValue::Bool(true)),
                });
            }
            FilterPredicate::Ids(ids) => match compile_resource_ids(ctx, ids)? {
                Some(predicate) => compiled.add_predicate(predicate),
                None => compiled.mark_empty(),
            },
        }
    }

    Ok(compiled)
}

fn compile_sort(
    ctx: &CompilerContext<'_>,
    sort_by: &SortBy,
    compiled: &mut CompiledQuery,
) -> Result<()> {
    for property in &sort_by.sort_properties {
        let matched = resolve_reference(ctx, &property.value_reference)?;
        compiled.add_ordering(Ordering {
            path: matched.path,
            direction: match property.sort_order {
                SortOrder::Asc => OrderDirection::Asc,
                SortOrder::Desc => OrderDirection::Desc,
            },
        });
    }
    Ok(())
}

fn compile_operator(ctx: &CompilerContext<'_>, operator: &NonIdOperator) -> Result<Predicate> {
    match operator {
        NonIdOperator::Comparison { op, lhs, rhs, .. } => compile_comparison(ctx, *op, lhs, rhs),
        NonIdOperator::Between { expr, lower, upper } => Ok(Predicate::And(vec![
            compile_comparison(ctx, ComparisonOp::Gte, expr, lower)?,
            compile_comparison(ctx, ComparisonOp::Lte, expr, upper)?,
        ])),
        NonIdOperator::Like {
            expr,
            pattern,
            wild_card,
            single_char,
            escape_char,
            match_case,
        } => compile_like(ctx, expr, pattern, wild_card, single_char, escape_char, *match_case),
        NonIdOperator::Nil { expr } | NonIdOperator::Null { expr } => {
            // Identical for scalar fields on purpose: any value rendered
            // with xsi:nil is also a value the output omits. For unbounded
            // elements IsNull reads as "no value present".
            let reference = expect_reference(expr)?;
            let matched = resolve_reference(ctx, reference)?;
            Ok(Predicate::IsNull { path: matched.path })
        }
        NonIdOperator::Spatial { op, operand, other } => {
            compile_spatial(ctx, *op, operand.as_ref(), other)
        }
        NonIdOperator::Distance {
            op,
            operand,
            geometry,
            distance,
        } => compile_distance(ctx, *op, operand, geometry, distance),
        NonIdOperator::Temporal { op } => Err(WfsError::option_not_supported(
            format!("Temporal operator '{op}' is not supported."),
            "filter",
        )),
        NonIdOperator::And(operands) => Ok(Predicate::And(
            operands
                .iter()
                .map(|op| compile_operator(ctx, op))
                .collect::<Result<Vec<_>>>()?,
        )),
        NonIdOperator::Or(operands) => Ok(Predicate::Or(
            operands
                .iter()
                .map(|op| compile_operator(ctx, op))
                .collect::<Result<Vec<_>>>()?,
        )),
        NonIdOperator::Not(operand) => {
            Ok(Predicate::Not(Box::new(compile_operator(ctx, operand)?)))
        }
    }
}

fn compile_comparison(
    ctx: &CompilerContext<'_>,
    op: ComparisonOp,
    lhs: &Expression,
    rhs: &Expression,
) -> Result<Predicate> {
    // Reversed operands are allowed; swap so the reference is on the left
    // and the datastore can predict the data type.
    let (lhs, rhs, op) = if matches!(lhs, Expression::Literal(_))
        && matches!(rhs, Expression::ValueReference(_))
    {
        tracing::debug!("filter switches lhs/rhs for reversed comparison");
        (rhs, lhs, op.reversed())
    } else {
        (lhs, rhs, op)
    };

    let compare_op = to_compare_op(op);
    match lhs {
        Expression::ValueReference(reference) => {
            let matched = resolve_reference(ctx, reference)?;
            let node = ctx.feature_type.node(matched.child);
            deny_geometry(node, op_tag(op))?;
            let rhs_operand = compile_operand(ctx, rhs, Some(node))?;
            Ok(Predicate::Compare {
                lhs: Operand::Path(matched.path),
                op: compare_op,
                rhs: rhs_operand,
            })
        }
        other => Ok(Predicate::Compare {
            lhs: compile_operand(ctx, other, None)?,
            op: compare_op,
            rhs: compile_operand(ctx, rhs, None)?,
        }),
    }
}

fn compile_like(
    ctx: &CompilerContext<'_>,
    expr: &Expression,
    pattern: &Expression,
    wild_card: &str,
    single_char: &str,
    escape_char: &str,
    match_case: bool,
) -> Result<Predicate> {
    let operand = match expr {
        Expression::ValueReference(reference) => {
            let matched = resolve_reference(ctx, reference)?;
            deny_geometry(ctx.feature_type.node(matched.child), "PropertyIsLike")?;
            Operand::Path(matched.path)
        }
        other => Operand::Computed(compile_computed(ctx, other)?),
    };

    let Expression::Literal(literal) = pattern else {
        return Err(WfsError::parsing_failed(
            "Expected a literal value for the PropertyIsLike operator.",
            "PropertyIsLike",
        ));
    };
    let Some(raw) = literal.as_text() else {
        return Err(WfsError::parsing_failed(
            "Expected a literal value for the PropertyIsLike operator.",
            "PropertyIsLike",
        ));
    };

    Ok(Predicate::Like {
        operand,
        pattern: map_like_pattern(raw, wild_card, single_char, escape_char),
        case_insensitive: !match_case,
    })
}

/// Rewrite the client's wildcard alphabet onto `%`/`_`/`\`.
/// The replacement order matters: escape the target characters first.
fn map_like_pattern(value: &str, wild_card: &str, single_char: &str, escape_char: &str) -> String {
    let mut value = value.to_string();
    if escape_char != "\\" {
        value = value.replace('\\', "\\\\").replace(escape_char, "\\");
    }
    if wild_card != "%" {
        value = value.replace('%', "\\%").replace(wild_card, "%");
    }
    if single_char != "_" {
        value = value.replace('_', "\\_").replace(single_char, "_");
    }
    value
}

fn compile_spatial(
    ctx: &CompilerContext<'_>,
    op: SpatialOpName,
    operand: Option<&ValueReference>,
    other: &SpatialOperand,
) -> Result<Predicate> {
    let path = match operand {
        Some(reference) => {
            let matched = resolve_reference(ctx, reference)?;
            let node = ctx.feature_type.node(matched.child);
            if !node.is_geometry() {
                return Err(WfsError::invalid_parameter(
                    format!(
                        "Operator '{}' does not support the non-geometry property '{}'.",
                        op.tag_name(),
                        node.name
                    ),
                    "filter",
                ));
            }
            matched.path
        }
        // A single-operand BBOX points at the feature's own geometry.
        None => main_geometry_path(ctx)?,
    };

    let geometry = match other {
        SpatialOperand::Value(gml) => gml.clone().into_geometry(),
        SpatialOperand::Ref(_) => {
            return Err(WfsError::option_not_supported(
                "Comparing two geometry properties is not supported.",
                "filter",
            ))
        }
    };
    // Convert the literal into the CRS the source data is stored in.
    let geometry = ctx.feature_type.crs.apply_to(&geometry)?;

    Ok(Predicate::Spatial {
        path,
        op: to_spatial_op(op),
        geometry,
    })
}

fn compile_distance(
    ctx: &CompilerContext<'_>,
    op: DistanceOpName,
    operand: &ValueReference,
    geometry: &Geometry,
    distance: &Measure,
) -> Result<Predicate> {
    let matched = resolve_reference(ctx, operand)?;
    let node = ctx.feature_type.node(matched.child);
    if !node.is_geometry() {
        return Err(WfsError::invalid_parameter(
            format!("Distance operators need a geometry property, got '{}'.", node.name),
            "filter",
        ));
    }

    let crs_is_geographic = ctx.feature_type.crs.is_geographic();
    let distance_in_crs_units = match distance.uom.as_str() {
        "deg" | "degree" | "degrees" => {
            if !crs_is_geographic || !geometry.crs.is_geographic() {
                return Err(WfsError::processing_failed(
                    "Degree distances need both operands in a degree-unit CRS.",
                )
                .status(400));
            }
            distance.value
        }
        uom => {
            let factor = uom_to_meters(uom).ok_or_else(|| {
                WfsError::invalid_parameter(
                    format!("Unsupported unit of measurement: {uom}"),
                    "filter",
                )
            })?;
            if crs_is_geographic {
                return Err(WfsError::processing_failed(
                    "DWithin/Beyond need a projected CRS for metric distances.",
                )
                .status(400));
            }
            distance.value * factor
        }
    };

    Ok(Predicate::DWithin {
        path: matched.path,
        geometry: ctx.feature_type.crs.apply_to(geometry)?,
        distance: distance_in_crs_units,
        beyond: op == DistanceOpName::Beyond,
    })
}

fn uom_to_meters(uom: &str) -> Option<f64> {
    Some(match uom {
        "m" | "metre" | "meter" | "metres" | "meters" => 1.0,
        "km" | "kilometer" | "kilometre" => 1000.0,
        "mi" | "mile" => 1609.344,
        "nm" | "nautical mile" => 1852.0,
        "ft" | "foot" => 0.3048,
        "yd" | "yard" => 0.9144,
        "inch" | "in" => 0.0254,
        "cm" => 0.01,
        "mm" => 0.001,
        _ => return None,
    })
}

/// Combine the id chain into one IN-set on the identity field.
/// Returns `None` for the "provably empty" cases of lax mode.
fn compile_resource_ids(
    ctx: &CompilerContext<'_>,
    ids: &[ResourceId],
) -> Result<Option<Predicate>> {
    for id in ids {
        if id.has_version_attributes() {
            return Err(WfsError::option_not_supported(
                "No support for ResourceId startTime/endTime/version attributes",
                "resourceId",
            ));
        }
    }

    let feature_name = &ctx.feature_type.name;
    let id_node = ctx.feature_type.node(ctx.feature_type.id_node);
    let mut values = Vec::new();

    for id in ids {
        match &id.type_name {
            None => {
                if ctx.config.wfs_strict_standard {
                    return Err(WfsError::invalid_parameter(
                        "Expected typename.id format",
                        "resourceId",
                    ));
                }
                // CITE sends bare UUIDs; they match nothing rather than
                // erroring out.
            }
            Some(type_name) => {
                let local = type_name.rsplit(':').next().unwrap_or(type_name);
                if local != feature_name {
                    return Err(WfsError::invalid_parameter(
                        "When TYPENAMES and RESOURCEID are combined, the RESOURCEID type \
                         should be included in TYPENAMES.",
                        "resourceId",
                    ));
                }
                match id_node.to_value(id.lookup_id()) {
                    Ok(value) => values.push(value),
                    Err(error) => {
                        if ctx.config.wfs_strict_standard {
                            return Err(error);
                        }
                        // Unparseable id: empty result, not an error.
                    }
                }
            }
        }
    }

    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(Predicate::IdIn {
        path: ctx.feature_type.id_path().to_string(),
        ids: values,
    }))
}

/// Compile an expression as a comparison operand. `bound` carries the
/// schema element a literal is compared against, driving coercion.
fn compile_operand(
    ctx: &CompilerContext<'_>,
    expr: &Expression,
    bound: Option<&XsdNode>,
) -> Result<Operand> {
    match expr {
        Expression::ValueReference(reference) => {
            let matched = resolve_reference(ctx, reference)?;
            Ok(Operand::Path(matched.path))
        }
        Expression::Literal(literal) => coerce_literal(literal, bound).map(Operand::Value),
        other => compile_computed(ctx, other).map(Operand::Computed),
    }
}

fn coerce_literal(literal: &Literal, bound: Option<&XsdNode>) -> Result<ScalarValue> {
    let LiteralValue::Text(raw) = &literal.value else {
        return Err(WfsError::invalid_parameter(
            "A geometry literal is not valid in a scalar comparison.",
            "filter",
        ));
    };
    if let Some(declared) = &literal.declared_type {
        if let Some(xsd_type) = meridian_schema::XsdType::from_qname(declared) {
            return xsd_type.to_value(raw);
        }
    }
    match bound {
        Some(node) => node.to_value(raw),
        None => Ok(auto_cast(raw)),
    }
}

fn compile_computed(ctx: &CompilerContext<'_>, expr: &Expression) -> Result<ComputedExpr> {
    match expr {
        Expression::ValueReference(reference) => {
            let matched = resolve_reference(ctx, reference)?;
            Ok(ComputedExpr::Field(matched.path))
        }
        Expression::Literal(literal) => coerce_literal(literal, None).map(ComputedExpr::Value),
        Expression::Function { name, args } => compile_function(ctx, name, args),
        Expression::Arithmetic { op, lhs, rhs } => Ok(ComputedExpr::Arithmetic {
            op: match op {
                ArithmeticOp::Add => ArithOp::Add,
                ArithmeticOp::Sub => ArithOp::Sub,
                ArithmeticOp::Mul => ArithOp::Mul,
                ArithmeticOp::Div => ArithOp::Div,
            },
            lhs: Box::new(compile_computed(ctx, lhs)?),
            rhs: Box::new(compile_computed(ctx, rhs)?),
        }),
    }
}

fn compile_function(
    ctx: &CompilerContext<'_>,
    name: &str,
    args: &[Expression],
) -> Result<ComputedExpr> {
    // Arity is checked against the registration here, at compile time.
    ctx.functions.resolve_call(name, args.len())?;
    Ok(ComputedExpr::Function {
        name: name.to_string(),
        args: args
            .iter()
            .map(|arg| compile_computed(ctx, arg))
            .collect::<Result<Vec<_>>>()?,
    })
}

fn resolve_reference(
    ctx: &CompilerContext<'_>,
    reference: &ValueReference,
) -> Result<XPathMatch> {
    ctx.feature_type
        .resolve_element(&reference.xpath, Some(&reference.ns_aliases))
}

fn expect_reference(expr: &Expression) -> Result<&ValueReference> {
    match expr {
        Expression::ValueReference(reference) => Ok(reference),
        _ => Err(WfsError::option_not_supported(
            "Only property references are supported here.",
            "filter",
        )),
    }
}

fn main_geometry_path(ctx: &CompilerContext<'_>) -> Result<String> {
    ctx.feature_type
        .main_geometry_node()
        .and_then(|node| node.source_path.clone())
        .ok_or_else(|| {
            WfsError::invalid_parameter(
                format!(
                    "Feature type '{}' has no geometry element to query.",
                    ctx.feature_type.name
                ),
                "filter",
            )
        })
}

fn deny_geometry(node: &XsdNode, tag: &str) -> Result<()> {
    if node.is_geometry() {
        // Not HTTP 500 here; the spec allows both.
        return Err(WfsError::processing_failed(format!(
            "Operator '{tag}' does not support comparing geometry properties: '{}'.",
            node.name
        ))
        .locator("filter")
        .status(400));
    }
    Ok(())
}

fn to_compare_op(op: ComparisonOp) -> CompareOp {
    match op {
        ComparisonOp::Eq => CompareOp::Eq,
        ComparisonOp::NotEq => CompareOp::NotEq,
        ComparisonOp::Lt => CompareOp::Lt,
        ComparisonOp::Gt => CompareOp::Gt,
        ComparisonOp::Lte => CompareOp::Lte,
        ComparisonOp::Gte => CompareOp::Gte,
    }
}

fn op_tag(op: ComparisonOp) -> &'static str {
    op.tag_name()
}

fn to_spatial_op(op: SpatialOpName) -> SpatialPredicateOp {
    match op {
        // BBOX could be bboverlaps for speed; intersects is the
        // specification-compliant choice (a line near the box matches).
        SpatialOpName::Bbox => SpatialPredicateOp::Intersects,
        SpatialOpName::Equals => SpatialPredicateOp::Equals,
        SpatialOpName::Disjoint => SpatialPredicateOp::Disjoint,
        SpatialOpName::Intersects => SpatialPredicateOp::Intersects,
        SpatialOpName::Touches => SpatialPredicateOp::Touches,
        SpatialOpName::Crosses => SpatialPredicateOp::Crosses,
        SpatialOpName::Within => SpatialPredicateOp::Within,
        SpatialOpName::Contains => SpatialPredicateOp::Contains,
        SpatialOpName::Overlaps => SpatialPredicateOp::Overlaps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::GeometryType;
    use meridian_fes::ast::filter::Filter;
    use meridian_fes::KvpRequest;
    use meridian_schema::XsdType;
    use std::collections::HashMap;

    fn feature_type() -> FeatureType {
        FeatureType::build("restaurant", "http://example.org/gisserver")
            .geometry("location", GeometryType::Point)
            .field("name", XsdType::String)
            .field("rating", XsdType::Double)
            .crs(meridian_core::crs::WGS84.clone())
            .finish()
            .unwrap()
    }

    fn compile(filter_xml: &str) -> Result<CompiledQuery> {
        compile_with_config(filter_xml, ServiceConfig::default())
    }

    fn compile_with_config(filter_xml: &str, config: ServiceConfig) -> Result<CompiledQuery> {
        let ft = feature_type();
        let functions = FunctionRegistry::with_defaults();
        let ctx = CompilerContext {
            feature_type: &ft,
            functions: &functions,
            config: &config,
        };
        let query = AdhocQuery {
            type_names: vec!["restaurant".to_string()],
            handle: String::new(),
            srs_name: None,
            property_names: None,
            filter: Some(Filter::from_string(filter_xml, None)?),
            sort_by: None,
        };
        compile_query(&query, &ctx)
    }

    #[test]
    fn literal_is_coerced_to_the_element_type() {
        let compiled = compile(
            "<Filter><PropertyIsGreaterThanOrEqualTo>
               <ValueReference>rating</ValueReference><Literal>3.0</Literal>
             </PropertyIsGreaterThanOrEqualTo></Filter>",
        )
        .unwrap();
        match compiled.predicate.unwrap() {
            Predicate::Compare { lhs, op, rhs } => {
                assert_eq!(lhs, Operand::Path("rating".into()));
                assert_eq!(op, CompareOp::Gte);
                assert_eq!(rhs, Operand::Value(ScalarValue::Double(3.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_literal_surfaces_as_error() {
        let err = compile(
            "<Filter><PropertyIsLessThan>
               <ValueReference>rating</ValueReference><Literal>abc</Literal>
             </PropertyIsLessThan></Filter>",
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "InvalidParameterValue");
    }

    #[test]
    fn reversed_operands_swap_and_invert() {
        let compiled = compile(
            "<Filter><PropertyIsLessThan>
               <Literal>4</Literal><ValueReference>rating</ValueReference>
             </PropertyIsLessThan></Filter>",
        )
        .unwrap();
        match compiled.predicate.unwrap() {
            Predicate::Compare { lhs, op, .. } => {
                assert_eq!(lhs, Operand::Path("rating".into()));
                assert_eq!(op, CompareOp::Gt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn like_pattern_mapping() {
        assert_eq!(map_like_pattern("Caf*", "*", ".", "\\"), "Caf%");
        assert_eq!(map_like_pattern("100%", "*", ".", "\\"), "100\\%");
        assert_eq!(map_like_pattern("a.b", "*", ".", "\\"), "a_b");
        assert_eq!(map_like_pattern("x_y*", "*", "?", "!"), "x\\_y%");
    }

    #[test]
    fn comparing_geometry_fields_is_rejected() {
        let err = compile(
            "<Filter><PropertyIsEqualTo>
               <ValueReference>location</ValueReference><Literal>x</Literal>
             </PropertyIsEqualTo></Filter>",
        )
        .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.code.as_str(), "OperationProcessingFailed");
    }

    #[test]
    fn bbox_defaults_to_main_geometry_with_intersects() {
        let compiled = compile(
            r#"<Filter><BBOX>
                 <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
                   <gml:lowerCorner>4.58 52.03</gml:lowerCorner>
                   <gml:upperCorner>5.31 52.49</gml:upperCorner>
                 </gml:Envelope>
               </BBOX></Filter>"#,
        )
        .unwrap();
        match compiled.predicate.unwrap() {
            Predicate::Spatial { path, op, .. } => {
                assert_eq!(path, "location");
                assert_eq!(op, SpatialPredicateOp::Intersects);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn typeless_resource_ids_match_nothing_in_lax_mode() {
        let compiled = compile(r#"<Filter><ResourceId rid="garbage"/></Filter>"#).unwrap();
        assert!(compiled.always_empty);

        let strict = ServiceConfig {
            wfs_strict_standard: true,
            ..ServiceConfig::default()
        };
        let err =
            compile_with_config(r#"<Filter><ResourceId rid="garbage"/></Filter>"#, strict)
                .unwrap_err();
        assert_eq!(err.code.as_str(), "InvalidParameterValue");
    }

    #[test]
    fn resource_ids_combine_into_one_in_set() {
        let compiled = compile(
            r#"<Filter><ResourceId rid="restaurant.1"/><ResourceId rid="restaurant.5"/></Filter>"#,
        )
        .unwrap();
        match compiled.predicate.unwrap() {
            Predicate::IdIn { path, ids } => {
                assert_eq!(path, "id");
                assert_eq!(ids, vec![ScalarValue::Integer(1), ScalarValue::Integer(5)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_resource_id_type_is_rejected() {
        let err = compile(r#"<Filter><ResourceId rid="city.1"/></Filter>"#).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("resourceId"));
    }

    #[test]
    fn sort_by_appends_id_tiebreaker() {
        let ft = feature_type();
        let functions = FunctionRegistry::with_defaults();
        let config = ServiceConfig::default();
        let ctx = CompilerContext {
            feature_type: &ft,
            functions: &functions,
            config: &config,
        };
        let kvp = KvpRequest::from_query_string(
            "TYPENAMES=restaurant&SORTBY=rating%20DESC",
            &HashMap::new(),
        )
        .unwrap();
        let query = AdhocQuery::from_kvp(&kvp).unwrap();
        let compiled = compile_query(&query, &ctx).unwrap();
        assert_eq!(compiled.orderings.len(), 2);
        assert_eq!(compiled.orderings[0].path, "rating");
        assert_eq!(compiled.orderings[0].direction, OrderDirection::Desc);
        assert_eq!(compiled.orderings[1].path, "id");
    }

    #[test]
    fn unknown_sort_field_fails() {
        let ft = feature_type();
        let functions = FunctionRegistry::with_defaults();
        let config = ServiceConfig::default();
        let ctx = CompilerContext {
            feature_type: &ft,
            functions: &functions,
            config: &config,
        };
        let kvp = KvpRequest::from_query_string(
            "TYPENAMES=restaurant&SORTBY=bogus",
            &HashMap::new(),
        )
        .unwrap();
        let query = AdhocQuery::from_kvp(&kvp).unwrap();
        assert!(compile_query(&query, &ctx).is_err());
    }

    #[test]
    fn temporal_operators_are_not_supported() {
        let err = compile(
            "<Filter><After>
               <ValueReference>name</ValueReference><Literal>2020-01-01T00:00:00Z</Literal>
             </After></Filter>",
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "OptionNotSupported");
    }

    #[test]
    fn function_arity_is_checked() {
        let err = compile(
            "<Filter><PropertyIsEqualTo>
               <Function name=\"abs\"><ValueReference>rating</ValueReference><Literal>2</Literal></Function>
               <Literal>4</Literal>
             </PropertyIsEqualTo></Filter>",
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "InvalidParameterValue");
    }
}
