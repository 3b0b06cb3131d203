//! Feature type declarations.
//!
//! A feature type is a named exposure of a datastore collection. It owns the
//! schema arena describing its elements, knows its default and advertised
//! CRSes, and carries the GetCapabilities metadata.

use crate::arena::{
    ComplexId, NodeId, NodeKind, Occurs, SchemaArena, TypeRef, XsdComplexType, XsdNode,
};
use crate::types::XsdType;
use meridian_core::error::{Result, WfsError};
use meridian_core::{BoundingBox, Crs, GeometryType};

/// A feature type exposed by the service.
#[derive(Debug, Clone)]
pub struct FeatureType {
    /// Local XML name (also the datastore collection name).
    pub name: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    pub xml_namespace: String,
    /// Prefix used for the application namespace in output.
    pub xml_prefix: String,
    /// Default CRS; source data is stored in this system.
    pub crs: Crs,
    /// Additional advertised CRSes.
    pub other_crs: Vec<Crs>,
    pub arena: SchemaArena,
    pub root_type: ComplexId,
    /// The `gml:id` attribute node.
    pub id_node: NodeId,
    /// The element describing the feature's main geometry, if any.
    pub main_geometry: Option<NodeId>,
    pub show_gml_name: bool,
    pub show_bounded_by: bool,
    /// Static extent advertised in GetCapabilities (WGS84), when configured.
    pub wgs84_bounding_box: Option<BoundingBox>,
}

impl FeatureType {
    pub fn build(name: impl Into<String>, xml_namespace: impl Into<String>) -> FeatureTypeBuilder {
        FeatureTypeBuilder::new(name, xml_namespace)
    }

    /// The qualified name, e.g. `app:restaurant`.
    pub fn xml_name(&self) -> String {
        format!("{}:{}", self.xml_prefix, self.name)
    }

    /// Default CRS followed by the other advertised CRSes.
    pub fn supported_crs(&self) -> impl Iterator<Item = &Crs> {
        std::iter::once(&self.crs).chain(self.other_crs.iter())
    }

    /// Validate a requested output CRS against the advertised set.
    pub fn resolve_crs(&self, crs: Crs, supported_only: bool) -> Result<Crs> {
        if supported_only && !self.supported_crs().any(|c| c.matches(&crs, false)) {
            return Err(WfsError::invalid_parameter(
                format!("Feature '{}' does not support SRID {}.", self.name, crs.srid),
                "srsName",
            ));
        }
        Ok(crs)
    }

    /// Root-level element ids, in render order.
    pub fn root_elements(&self) -> &[NodeId] {
        &self.arena.complex(self.root_type).elements
    }

    pub fn node(&self, id: NodeId) -> &XsdNode {
        self.arena.node(id)
    }

    pub fn main_geometry_node(&self) -> Option<&XsdNode> {
        self.main_geometry.map(|id| self.arena.node(id))
    }

    /// Data-source path of the identity field.
    pub fn id_path(&self) -> &str {
        self.arena
            .node(self.id_node)
            .source_path
            .as_deref()
            .unwrap_or("id")
    }
}

/// Field declaration used by the builder.
#[derive(Debug, Clone)]
pub enum FieldDef {
    Scalar {
        name: String,
        xsd_type: XsdType,
        source: String,
        nillable: bool,
        many: bool,
    },
    Geometry {
        name: String,
        geometry_type: GeometryType,
        source: String,
        nillable: bool,
    },
    Complex {
        name: String,
        source: String,
        many: bool,
        fields: Vec<FieldDef>,
    },
}

/// Declarative construction of a feature type.
///
/// ```
/// use meridian_core::GeometryType;
/// use meridian_schema::{FeatureType, XsdType};
///
/// let restaurant = FeatureType::build("restaurant", "http://example.org/gisserver")
///     .title("Restaurants")
///     .geometry("location", GeometryType::Point)
///     .field("name", XsdType::String)
///     .field("rating", XsdType::Double)
///     .finish()
///     .unwrap();
/// assert_eq!(restaurant.xml_name(), "app:restaurant");
/// ```
pub struct FeatureTypeBuilder {
    name: String,
    xml_namespace: String,
    xml_prefix: String,
    title: Option<String>,
    abstract_text: Option<String>,
    keywords: Vec<String>,
    crs: Option<Crs>,
    other_crs: Vec<Crs>,
    id_name: String,
    id_type: XsdType,
    gml_name_source: Option<String>,
    show_bounded_by: bool,
    wgs84_bounding_box: Option<BoundingBox>,
    fields: Vec<FieldDef>,
}

impl FeatureTypeBuilder {
    pub fn new(name: impl Into<String>, xml_namespace: impl Into<String>) -> Self {
        FeatureTypeBuilder {
            name: name.into(),
            xml_namespace: xml_namespace.into(),
            xml_prefix: "app".to_string(),
            title: None,
            abstract_text: None,
            keywords: Vec::new(),
            crs: None,
            other_crs: Vec::new(),
            id_name: "id".to_string(),
            id_type: XsdType::Long,
            gml_name_source: None,
            show_bounded_by: false,
            wgs84_bounding_box: None,
            fields: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn other_crs(mut self, crs: Crs) -> Self {
        self.other_crs.push(crs);
        self
    }

    /// Override the identity field (default: `id` as `xs:long`).
    pub fn id_field(mut self, name: impl Into<String>, xsd_type: XsdType) -> Self {
        self.id_name = name.into();
        self.id_type = xsd_type;
        self
    }

    /// Render `<gml:name>` from the given source field.
    pub fn gml_name_from(mut self, source: impl Into<String>) -> Self {
        self.gml_name_source = Some(source.into());
        self
    }

    /// Render the computed `<gml:boundedBy>` extent on each feature.
    pub fn show_bounded_by(mut self) -> Self {
        self.show_bounded_by = true;
        self
    }

    /// Static WGS84 extent for GetCapabilities.
    pub fn wgs84_bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.wgs84_bounding_box = Some(bbox);
        self
    }

    /// A scalar field whose data-source path equals its name.
    pub fn field(self, name: &str, xsd_type: XsdType) -> Self {
        let source = name.to_string();
        self.field_at(name, xsd_type, &source)
    }

    /// A scalar field reading from an explicit (possibly dotted) path.
    pub fn field_at(mut self, name: &str, xsd_type: XsdType, source: &str) -> Self {
        self.fields.push(FieldDef::Scalar {
            name: name.to_string(),
            xsd_type,
            source: source.to_string(),
            nillable: true,
            many: false,
        });
        self
    }

    /// An unbounded scalar field (array or M2M values).
    pub fn array(mut self, name: &str, xsd_type: XsdType) -> Self {
        self.fields.push(FieldDef::Scalar {
            name: name.to_string(),
            xsd_type,
            source: name.to_string(),
            nillable: true,
            many: true,
        });
        self
    }

    /// A geometry field. The first one becomes the feature's main geometry.
    pub fn geometry(mut self, name: &str, geometry_type: GeometryType) -> Self {
        self.fields.push(FieldDef::Geometry {
            name: name.to_string(),
            geometry_type,
            source: name.to_string(),
            nillable: true,
        });
        self
    }

    /// A nested complex sub-tree reading through a relation.
    pub fn complex(
        mut self,
        name: &str,
        many: bool,
        build: impl FnOnce(ComplexFieldBuilder) -> ComplexFieldBuilder,
    ) -> Self {
        let inner = build(ComplexFieldBuilder { fields: Vec::new() });
        self.fields.push(FieldDef::Complex {
            name: name.to_string(),
            source: name.to_string(),
            many,
            fields: inner.fields,
        });
        self
    }

    pub fn finish(self) -> Result<FeatureType> {
        let crs = match self.crs {
            Some(crs) => crs,
            None => meridian_core::crs::WGS84.clone(),
        };
        let mut arena = SchemaArena::new();

        let id_node = arena.add_node(XsdNode {
            name: "id".to_string(),
            prefix: "gml",
            kind: NodeKind::GmlId,
            type_ref: TypeRef::Atomic(self.id_type),
            min_occurs: 1,
            max_occurs: Occurs::Bounded(1),
            nillable: false,
            source_path: Some(self.id_name.clone()),
            local_path: self.id_name.clone(),
            source_crs: None,
        });

        let mut elements = Vec::new();
        if let Some(source) = &self.gml_name_source {
            elements.push(arena.add_node(XsdNode {
                name: "name".to_string(),
                prefix: "gml",
                kind: NodeKind::GmlName,
                type_ref: TypeRef::Atomic(XsdType::String),
                min_occurs: 0,
                max_occurs: Occurs::Bounded(1),
                nillable: false,
                source_path: Some(source.clone()),
                local_path: source.clone(),
                source_crs: None,
            }));
        }
        if self.show_bounded_by {
            elements.push(arena.add_node(XsdNode {
                name: "boundedBy".to_string(),
                prefix: "gml",
                kind: NodeKind::GmlBoundedBy,
                type_ref: TypeRef::Atomic(XsdType::GmlBoundingShapeType),
                min_occurs: 0,
                max_occurs: Occurs::Bounded(1),
                nillable: false,
                source_path: None,
                local_path: String::new(),
                source_crs: None,
            }));
        }

        let mut main_geometry = None;
        for field in &self.fields {
            let id = add_field(&mut arena, field, None, &crs, &self.name)?;
            if main_geometry.is_none()
                && matches!(arena.node(id).kind, NodeKind::Geometry(_))
            {
                main_geometry = Some(id);
            }
            elements.push(id);
        }

        let root_type = arena.add_complex(XsdComplexType {
            name: format!("{}Type", self.name),
            elements,
            attributes: vec![id_node],
            base: XsdType::GmlAbstractFeatureType,
        });

        Ok(FeatureType {
            title: self.title.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            abstract_text: self.abstract_text,
            keywords: self.keywords,
            xml_namespace: self.xml_namespace,
            xml_prefix: self.xml_prefix,
            crs,
            other_crs: self.other_crs,
            arena,
            root_type,
            id_node,
            main_geometry,
            show_gml_name: self.gml_name_source.is_some(),
            show_bounded_by: self.show_bounded_by,
            wgs84_bounding_box: self.wgs84_bounding_box,
        })
    }
}

/// Builder for the fields of a nested complex element.
pub struct ComplexFieldBuilder {
    fields: Vec<FieldDef>,
}

impl ComplexFieldBuilder {
    pub fn field(mut self, name: &str, xsd_type: XsdType) -> Self {
        self.fields.push(FieldDef::Scalar {
            name: name.to_string(),
            xsd_type,
            source: name.to_string(),
            nillable: true,
            many: false,
        });
        self
    }

    pub fn geometry(mut self, name: &str, geometry_type: GeometryType) -> Self {
        self.fields.push(FieldDef::Geometry {
            name: name.to_string(),
            geometry_type,
            source: name.to_string(),
            nillable: true,
        });
        self
    }
}

fn add_field(
    arena: &mut SchemaArena,
    field: &FieldDef,
    parent_path: Option<&str>,
    crs: &Crs,
    type_name: &str,
) -> Result<NodeId> {
    let absolute = |source: &str| match parent_path {
        Some(parent) => format!("{parent}.{source}"),
        None => source.to_string(),
    };

    Ok(match field {
        FieldDef::Scalar {
            name,
            xsd_type,
            source,
            nillable,
            many,
        } => arena.add_node(XsdNode {
            name: name.clone(),
            prefix: "app",
            kind: NodeKind::Element,
            type_ref: TypeRef::Atomic(*xsd_type),
            min_occurs: 0,
            max_occurs: if *many {
                Occurs::Unbounded
            } else {
                Occurs::Bounded(1)
            },
            nillable: *nillable,
            source_path: Some(absolute(source)),
            local_path: source.clone(),
            source_crs: None,
        }),
        FieldDef::Geometry {
            name,
            geometry_type,
            source,
            nillable,
        } => {
            // Geometry elements never cross an unbounded relation; the
            // builder only allows them on the root or bounded sub-trees.
            arena.add_node(XsdNode {
                name: name.clone(),
                prefix: "app",
                kind: NodeKind::Geometry(*geometry_type),
                type_ref: TypeRef::Atomic(XsdType::for_geometry(*geometry_type)),
                min_occurs: 0,
                max_occurs: Occurs::Bounded(1),
                nillable: *nillable,
                source_path: Some(absolute(source)),
                local_path: source.clone(),
                source_crs: Some(crs.clone()),
            })
        }
        FieldDef::Complex {
            name,
            source,
            many,
            fields,
        } => {
            let abs = absolute(source);
            let mut child_ids = Vec::with_capacity(fields.len());
            for child in fields {
                if *many {
                    if let FieldDef::Geometry { name, .. } = child {
                        return Err(WfsError::internal(format!(
                            "geometry element '{name}' can't live inside the unbounded relation '{abs}'"
                        )));
                    }
                }
                child_ids.push(add_field(arena, child, Some(&abs), crs, type_name)?);
            }
            let complex_id = arena.add_complex(XsdComplexType {
                name: format!("{type_name}_{name}Type"),
                elements: child_ids,
                attributes: Vec::new(),
                base: XsdType::AnyType,
            });
            arena.add_node(XsdNode {
                name: name.clone(),
                prefix: "app",
                kind: NodeKind::Element,
                type_ref: TypeRef::Complex(complex_id),
                min_occurs: 0,
                max_occurs: if *many {
                    Occurs::Unbounded
                } else {
                    Occurs::Bounded(1)
                },
                nillable: true,
                source_path: Some(abs.clone()),
                local_path: source.clone(),
                source_crs: None,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureType {
        FeatureType::build("restaurant", "http://example.org/gisserver")
            .title("Restaurants")
            .geometry("location", GeometryType::Point)
            .field("name", XsdType::String)
            .field("rating", XsdType::Double)
            .complex("city", false, |c| {
                c.field("name", XsdType::String).field("region", XsdType::String)
            })
            .array("tags", XsdType::String)
            .finish()
            .unwrap()
    }

    #[test]
    fn builder_assigns_source_paths() {
        let ft = sample();
        let city = ft
            .root_elements()
            .iter()
            .map(|id| ft.node(*id))
            .find(|n| n.name == "city")
            .unwrap();
        let complex = ft.arena.complex(city.complex_id().unwrap());
        let region = ft.arena.node(complex.elements[1]);
        assert_eq!(region.source_path.as_deref(), Some("city.region"));
    }

    #[test]
    fn first_geometry_becomes_main() {
        let ft = sample();
        let geo = ft.main_geometry_node().unwrap();
        assert_eq!(geo.name, "location");
        assert!(geo.is_geometry());
        assert_eq!(geo.atomic_type(), Some(XsdType::GmlPointPropertyType));
    }

    #[test]
    fn arrays_are_unbounded() {
        let ft = sample();
        let tags = ft
            .root_elements()
            .iter()
            .map(|id| ft.node(*id))
            .find(|n| n.name == "tags")
            .unwrap();
        assert!(tags.is_many());
    }

    #[test]
    fn geometry_inside_unbounded_relation_is_rejected() {
        let result = FeatureType::build("bad", "http://example.org/gisserver")
            .complex("stops", true, |c| c.geometry("point", GeometryType::Point))
            .finish();
        assert!(result.is_err());
    }
}
