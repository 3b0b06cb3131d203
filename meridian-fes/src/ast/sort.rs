//! The `<fes:SortBy>` clause and its KVP form.

use crate::ast::expr::ValueReference;
use crate::kvp::KvpRequest;
use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::error::{Result, WfsError};

/// Sort direction. The WFS 1 single-letter names are accepted for
/// clients that still send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_string(direction: &str) -> Result<SortOrder> {
        match direction {
            "ASC" | "A" => Ok(SortOrder::Asc),
            "DESC" | "D" => Ok(SortOrder::Desc),
            _ => Err(WfsError::invalid_parameter(
                "Expect ASC/DESC ordering direction",
                "sortBy",
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One `<fes:SortProperty>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortProperty {
    pub value_reference: ValueReference,
    pub sort_order: SortOrder,
}

impl SortProperty {
    fn validate(self) -> Result<SortProperty> {
        if self.value_reference.xpath.contains('[') {
            return Err(WfsError::invalid_parameter(
                "Sorting with XPath attribute selectors is not supported.",
                "sortBy",
            ));
        }
        Ok(self)
    }

    pub fn from_xml(element: &XmlElement) -> Result<SortProperty> {
        element.expect_tag(xmlns::FES, "SortProperty")?;
        element.expect_children(1)?;
        let sort_order = match element.find(xmlns::FES, "SortOrder") {
            Some(order) => SortOrder::from_string(order.text.trim())?,
            None => SortOrder::Asc,
        };
        SortProperty {
            value_reference: ValueReference::from_xml(&element.children[0])?,
            sort_order,
        }
        .validate()
    }

    /// Parse the `field [ASC|DESC]` notation from the SORTBY parameter.
    pub fn from_string(
        value: &str,
        ns_aliases: &std::collections::HashMap<String, String>,
    ) -> Result<SortProperty> {
        let (xpath, direction) = match value.split_once(' ') {
            Some((xpath, direction)) => (xpath, Some(direction.trim())),
            None => (value, None),
        };
        SortProperty {
            value_reference: ValueReference::new(xpath, ns_aliases.clone()),
            sort_order: match direction {
                Some(d) if !d.is_empty() => SortOrder::from_string(d)?,
                _ => SortOrder::Asc,
            },
        }
        .validate()
    }

    /// The KVP rendering, used for pagination links.
    pub fn as_kvp(&self) -> String {
        match self.sort_order {
            SortOrder::Asc => self.value_reference.xpath.clone(),
            SortOrder::Desc => format!("{} DESC", self.value_reference.xpath),
        }
    }
}

/// The `<fes:SortBy>` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub sort_properties: Vec<SortProperty>,
}

impl SortBy {
    pub fn from_xml(element: &XmlElement) -> Result<SortBy> {
        element.expect_tag(xmlns::FES, "SortBy")?;
        element.expect_children(1)?;
        Ok(SortBy {
            sort_properties: element
                .children
                .iter()
                .map(SortProperty::from_xml)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn from_kvp(kvp: &KvpRequest) -> Result<Option<SortBy>> {
        let Some(value) = kvp.get_opt("SORTBY", None) else {
            return Ok(None);
        };
        Ok(Some(SortBy {
            sort_properties: value
                .split(',')
                .map(|field| SortProperty::from_string(field.trim(), &kvp.ns_aliases))
                .collect::<Result<Vec<_>>>()?,
        }))
    }

    pub fn as_kvp(&self) -> String {
        self.sort_properties
            .iter()
            .map(SortProperty::as_kvp)
            .collect::<Vec<_>>()
            .join(",")
    }
}
