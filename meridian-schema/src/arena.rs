//! The flat element arena backing a feature type's schema graph.
//!
//! Elements and attributes are stored in one `Vec` and referenced by index.
//! Complex types hold ordered lists of node ids. Nothing owns anything else,
//! so back-references through relations can't form ownership cycles, and a
//! projection can carry around plain id sets.

use crate::types::XsdType;
use meridian_core::error::{Result, WfsError};
use meridian_core::values::ScalarValue;
use meridian_core::{Crs, GeometryType};

pub type NodeId = usize;
pub type ComplexId = usize;

/// Element cardinality. `Unbounded` marks arrays, M2M and reverse relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Bounded(u32),
    Unbounded,
}

/// What an element's content is typed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Atomic(XsdType),
    Complex(ComplexId),
}

/// Distinguishes the special GML members from plain application elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Attribute,
    /// The `gml:id` attribute carrying the feature identity.
    GmlId,
    /// The `<gml:name>` display name element.
    GmlName,
    /// The computed `<gml:boundedBy>` extent element.
    GmlBoundedBy,
    /// A geometry element with its preferred geometry type.
    Geometry(GeometryType),
}

/// One element or attribute in the schema graph.
#[derive(Debug, Clone)]
pub struct XsdNode {
    /// Local XML name.
    pub name: String,
    /// XML namespace prefix used when rendering ("app" or "gml").
    pub prefix: &'static str,
    pub kind: NodeKind,
    pub type_ref: TypeRef,
    pub min_occurs: u32,
    pub max_occurs: Occurs,
    pub nillable: bool,
    /// Absolute dotted data-source path from the feature root.
    /// `None` for computed members like `gml:boundedBy`.
    pub source_path: Option<String>,
    /// Data-source path relative to the parent element. Contains a dot for
    /// flattened relation fields.
    pub local_path: String,
    /// For geometry elements, the CRS the source data is stored in.
    pub source_crs: Option<Crs>,
}

impl XsdNode {
    pub fn is_many(&self) -> bool {
        self.max_occurs == Occurs::Unbounded
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, NodeKind::Attribute | NodeKind::GmlId)
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self.kind, NodeKind::Geometry(_) | NodeKind::GmlBoundedBy)
    }

    /// Whether the element reads through a relation with a dotted path.
    pub fn is_flattened(&self) -> bool {
        self.local_path.contains('.')
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.type_ref, TypeRef::Complex(_))
    }

    pub fn complex_id(&self) -> Option<ComplexId> {
        match self.type_ref {
            TypeRef::Complex(id) => Some(id),
            TypeRef::Atomic(_) => None,
        }
    }

    pub fn atomic_type(&self) -> Option<XsdType> {
        match self.type_ref {
            TypeRef::Atomic(t) => Some(t),
            TypeRef::Complex(_) => None,
        }
    }

    /// The qualified tag name, e.g. `app:rating` or `gml:name`.
    pub fn xml_qname(&self) -> String {
        match self.kind {
            NodeKind::GmlId => "gml:id".to_string(),
            _ => format!("{}:{}", self.prefix, self.name),
        }
    }

    /// Coerce a raw literal against this element's type.
    pub fn to_value(&self, raw: &str) -> Result<ScalarValue> {
        match self.type_ref {
            TypeRef::Atomic(t) => t.to_value(raw),
            TypeRef::Complex(_) => Err(WfsError::invalid_parameter(
                format!("Can't compare a literal against the complex element '{}'", self.name),
                "filter",
            )),
        }
    }
}

/// An `<xs:complexType>` definition: ordered elements plus attributes.
#[derive(Debug, Clone)]
pub struct XsdComplexType {
    pub name: String,
    pub elements: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    /// Base type; feature roots extend `gml:AbstractFeatureType`.
    pub base: XsdType,
}

/// Storage for all nodes and complex types of one feature type.
#[derive(Debug, Clone, Default)]
pub struct SchemaArena {
    nodes: Vec<XsdNode>,
    complex_types: Vec<XsdComplexType>,
}

impl SchemaArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: XsdNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_complex(&mut self, complex: XsdComplexType) -> ComplexId {
        self.complex_types.push(complex);
        self.complex_types.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &XsdNode {
        &self.nodes[id]
    }

    pub fn complex(&self, id: ComplexId) -> &XsdComplexType {
        &self.complex_types[id]
    }

    pub fn complex_mut(&mut self, id: ComplexId) -> &mut XsdComplexType {
        &mut self.complex_types[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &XsdNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn complex_types(&self) -> impl Iterator<Item = (ComplexId, &XsdComplexType)> {
        self.complex_types.iter().enumerate()
    }

    /// All element ids of a complex type whose content is itself complex.
    pub fn complex_children(&self, complex: ComplexId) -> Vec<NodeId> {
        self.complex(complex)
            .elements
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_complex())
            .collect()
    }
}
