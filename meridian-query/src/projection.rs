//! Feature projections: which elements to render, which CRS to emit.
//!
//! A projection narrows the schema tree to the subset a query asked for
//! (`PROPERTYNAME`), closed under ancestors. The geometry element and the
//! `gml:id` attribute are always part of the selection; renderers can
//! still drop elements that don't fit their format (CSV and unbounded
//! relations, for example).

use crate::predicate::CompiledQuery;
use meridian_core::error::{Result, WfsError};
use meridian_core::Crs;
use meridian_fes::ast::expr::ValueReference;
use meridian_schema::{FeatureType, NodeId, XsdNode};
use std::collections::HashMap;
use std::sync::Arc;

/// The render plan for one feature type in one request.
#[derive(Debug, Clone)]
pub struct FeatureProjection {
    pub feature_type: Arc<FeatureType>,
    /// The CRS geometries are emitted in.
    pub output_crs: Crs,
    /// Render the bare feature without collection wrappers
    /// (GetFeatureById).
    pub standalone: bool,
    root_elements: Vec<NodeId>,
    child_nodes: HashMap<NodeId, Vec<NodeId>>,
    /// For GetPropertyValue: the single node to render.
    value_node: Option<NodeId>,
}

impl FeatureProjection {
    pub fn new(
        feature_type: Arc<FeatureType>,
        property_names: Option<&[ValueReference]>,
        output_crs: Option<Crs>,
        supported_crs_only: bool,
    ) -> Result<FeatureProjection> {
        let output_crs = match output_crs {
            Some(crs) => feature_type.resolve_crs(crs, supported_crs_only)?,
            None => feature_type.crs.clone(),
        };

        let (mut root_elements, child_nodes) = match property_names {
            None => {
                // Render the whole tree.
                let root_elements = feature_type.root_elements().to_vec();
                let mut child_nodes = HashMap::new();
                collect_children(&feature_type, &root_elements, &mut child_nodes);
                (root_elements, child_nodes)
            }
            Some(names) => {
                let mut root_elements: Vec<NodeId> = Vec::new();
                let mut child_nodes: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
                for name in names {
                    let matched =
                        feature_type.resolve_element(&name.xpath, Some(&name.ns_aliases))?;
                    let mut parent: Option<NodeId> = None;
                    for node in matched.nodes {
                        let siblings = match parent {
                            None => &mut root_elements,
                            Some(parent) => child_nodes.entry(parent).or_default(),
                        };
                        if !siblings.contains(&node) {
                            siblings.push(node);
                        }
                        parent = Some(node);
                    }
                }
                (root_elements, child_nodes)
            }
        };

        // Geometry is always selected, even when the projection left it out.
        if let Some(geometry) = feature_type.main_geometry {
            if !root_elements.contains(&geometry) {
                root_elements.push(geometry);
            }
        }

        Ok(FeatureProjection {
            feature_type,
            output_crs,
            standalone: false,
            root_elements,
            child_nodes,
            value_node: None,
        })
    }

    /// The projection for GetPropertyValue: a single resolved element.
    pub fn for_value_reference(
        feature_type: Arc<FeatureType>,
        value_reference: &ValueReference,
        output_crs: Option<Crs>,
        supported_crs_only: bool,
    ) -> Result<FeatureProjection> {
        let matched = feature_type
            .resolve_element(&value_reference.xpath, Some(&value_reference.ns_aliases))?;
        let mut projection = FeatureProjection::new(
            feature_type,
            Some(std::slice::from_ref(value_reference)),
            output_crs,
            supported_crs_only,
        )?;
        projection.value_node = Some(matched.child);
        Ok(projection)
    }

    pub fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }

    /// Root-level elements, in render order.
    pub fn root_elements(&self) -> &[NodeId] {
        &self.root_elements
    }

    pub fn child_nodes(&self, parent: NodeId) -> &[NodeId] {
        self.child_nodes.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node(&self, id: NodeId) -> &XsdNode {
        self.feature_type.node(id)
    }

    /// The single node rendered by GetPropertyValue.
    pub fn value_node(&self) -> Option<NodeId> {
        self.value_node
    }

    /// Every selected element, all levels.
    pub fn all_elements(&self) -> Vec<NodeId> {
        let mut all = self.root_elements.clone();
        for children in self.child_nodes.values() {
            all.extend(children.iter().copied());
        }
        all
    }

    pub fn main_geometry_element(&self) -> Option<NodeId> {
        self.feature_type.main_geometry
    }

    /// Root-level geometry elements (excluding `gml:boundedBy`).
    pub fn geometry_elements(&self) -> Vec<NodeId> {
        self.root_elements
            .iter()
            .copied()
            .filter(|id| {
                let node = self.feature_type.node(*id);
                matches!(node.kind, meridian_schema::NodeKind::Geometry(_))
            })
            .collect()
    }

    pub fn has_bounded_by(&self) -> bool {
        self.root_elements.iter().any(|id| {
            matches!(
                self.feature_type.node(*id).kind,
                meridian_schema::NodeKind::GmlBoundedBy
            )
        })
    }

    /// Whether geometries need a per-row transform on output.
    pub fn needs_reprojection(&self) -> bool {
        self.output_crs.srid != self.feature_type.crs.srid
    }

    /// Drop elements matching the rule (and their subtrees). CSV output
    /// uses this to remove unbounded relations it can't represent.
    pub fn remove_elements(&mut self, predicate: impl Fn(&XsdNode) -> bool) {
        let feature_type = self.feature_type.clone();
        self.root_elements
            .retain(|id| !predicate(feature_type.node(*id)));
        for children in self.child_nodes.values_mut() {
            children.retain(|id| !predicate(feature_type.node(*id)));
        }
        // Drop subtrees whose parent element is no longer selected.
        let mut pending: Vec<NodeId> = self.root_elements.clone();
        let mut keep: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        while let Some(id) = pending.pop() {
            if let Some(children) = self.child_nodes.get(&id) {
                pending.extend(children.iter().copied());
                keep.insert(id, children.clone());
            }
        }
        self.child_nodes = keep;
    }

    /// Contribute the selection and prefetch plans to the compiled query.
    pub fn apply_to(&self, query: &mut CompiledQuery) {
        let mut select: Vec<String> = vec![self.feature_type.id_path().to_string()];
        let mut prefetch = Vec::new();
        for id in self.all_elements() {
            let node = self.feature_type.node(id);
            if let Some(path) = &node.source_path {
                if !select.contains(path) {
                    select.push(path.clone());
                }
                // Any unbounded element crossing a relation is prefetched
                // in batches aligned with the iteration chunk size.
                if node.is_many() && node.is_complex() && !prefetch.contains(path) {
                    prefetch.push(path.clone());
                }
            }
        }
        query.select_paths = select;
        query.prefetch_paths = prefetch;
    }
}

fn collect_children(
    feature_type: &FeatureType,
    elements: &[NodeId],
    child_nodes: &mut HashMap<NodeId, Vec<NodeId>>,
) {
    for id in elements {
        let node = feature_type.node(*id);
        if let Some(complex_id) = node.complex_id() {
            let children = feature_type.arena.complex(complex_id).elements.clone();
            collect_children(feature_type, &children, child_nodes);
            child_nodes.insert(*id, children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::GeometryType;
    use meridian_schema::XsdType;

    fn feature_type() -> Arc<FeatureType> {
        Arc::new(
            FeatureType::build("restaurant", "http://example.org/gisserver")
                .geometry("location", GeometryType::Point)
                .field("name", XsdType::String)
                .field("rating", XsdType::Double)
                .complex("city", false, |c| c.field("name", XsdType::String))
                .finish()
                .unwrap(),
        )
    }

    fn reference(xpath: &str) -> ValueReference {
        ValueReference::new(xpath, HashMap::new())
    }

    #[test]
    fn full_projection_renders_everything() {
        let ft = feature_type();
        let projection = FeatureProjection::new(ft.clone(), None, None, false).unwrap();
        assert_eq!(projection.root_elements().len(), ft.root_elements().len());
        assert!(projection.geometry_elements().len() == 1);
    }

    #[test]
    fn property_names_narrow_the_selection_but_keep_geometry() {
        let ft = feature_type();
        let names = [reference("name")];
        let projection = FeatureProjection::new(ft, Some(&names), None, false).unwrap();
        let names: Vec<&str> = projection
            .root_elements()
            .iter()
            .map(|id| projection.node(*id).name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "location"]);
    }

    #[test]
    fn nested_property_selects_ancestors() {
        let ft = feature_type();
        let names = [reference("city/name")];
        let projection = FeatureProjection::new(ft, Some(&names), None, false).unwrap();
        let city = projection
            .root_elements()
            .iter()
            .copied()
            .find(|id| projection.node(*id).name == "city")
            .expect("city selected");
        assert_eq!(projection.child_nodes(city).len(), 1);
    }

    #[test]
    fn unknown_property_fails_with_its_xpath() {
        let ft = feature_type();
        let names = [reference("bogus")];
        let err = FeatureProjection::new(ft, Some(&names), None, false).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("bogus"));
    }

    #[test]
    fn output_crs_defaults_to_the_feature_crs() {
        let ft = feature_type();
        let projection = FeatureProjection::new(ft.clone(), None, None, false).unwrap();
        assert_eq!(projection.output_crs, ft.crs);
        assert!(!projection.needs_reprojection());
    }

    #[test]
    fn selection_contributes_paths_to_the_query() {
        let ft = feature_type();
        let projection = FeatureProjection::new(ft, None, None, false).unwrap();
        let mut query = CompiledQuery::default();
        projection.apply_to(&mut query);
        assert!(query.select_paths.contains(&"id".to_string()));
        assert!(query.select_paths.contains(&"city.name".to_string()));
    }
}
