//! Properties, FITS keywords and the ordered property list

use crate::bytes::ByteArray;
use crate::error::{Error, Result};
use crate::variant::Variant;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    pub id: String,
    pub value: Variant,
    pub comment: String,
    /// Display hint, e.g. `"%.3f"`; carried through untouched.
    pub format: String,
}

impl Property {
    pub fn new(id: impl Into<String>, value: impl Into<Variant>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Build from a `<Property>` element. `payload` is the resolved data
    /// block content for elements that carry a `location`.
    pub(crate) fn from_element(element: &Element, payload: Option<&ByteArray>) -> Result<Self> {
        Ok(Self {
            id: element.required_attr("id")?.to_string(),
            value: Variant::deserialize(element, payload)?,
            comment: element.attr("comment").unwrap_or_default().to_string(),
            format: element.attr("format").unwrap_or_default().to_string(),
        })
    }

    pub(crate) fn to_element(&self) -> Element {
        let mut element = Element::new("Property").with_attr("id", self.id.as_str());
        self.value.serialize(&mut element);
        if !self.format.is_empty() {
            element.set_attr("format", self.format.as_str());
        }
        if !self.comment.is_empty() {
            element.set_attr("comment", self.comment.as_str());
        }
        element
    }
}

/// FITS header card kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FitsKeyword {
    pub name: String,
    pub value: String,
    pub comment: String,
}

impl FitsKeyword {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            comment: comment.into(),
        }
    }

    pub(crate) fn from_element(element: &Element) -> Result<Self> {
        Ok(Self {
            name: element.required_attr("name")?.to_string(),
            value: element.attr("value").unwrap_or_default().to_string(),
            comment: element.attr("comment").unwrap_or_default().to_string(),
        })
    }

    pub(crate) fn to_element(&self) -> Element {
        Element::new("FITSKeyword")
            .with_attr("name", self.name.as_str())
            .with_attr("value", self.value.as_str())
            .with_attr("comment", self.comment.as_str())
    }
}

/// Properties in insertion order, unique by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
    items: Vec<Property>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict insert; an existing id is an error.
    pub fn add(&mut self, property: Property) -> Result<()> {
        if self.get(&property.id).is_some() {
            return Err(Error::DuplicateProperty(property.id));
        }
        self.items.push(property);
        Ok(())
    }

    /// Insert, or replace in place keeping the original position.
    pub fn update(&mut self, property: Property) {
        match self.items.iter_mut().find(|p| p.id == property.id) {
            Some(slot) => *slot = property,
            None => self.items.push(property),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Property> {
        self.items.iter().find(|p| p.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Property> {
        let index = self.items.iter().position(|p| p.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_add_rejects_duplicates() {
        let mut props = Properties::new();
        props.add(Property::new("A", 1i32)).unwrap();
        let err = props.add(Property::new("A", 2i32)).unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty(id) if id == "A"));
        assert_eq!(props.get("A").unwrap().value, Variant::Int32(1));
    }

    #[test]
    fn update_keeps_position() {
        let mut props = Properties::new();
        props.add(Property::new("A", 1i32)).unwrap();
        props.add(Property::new("B", 2i32)).unwrap();
        props.update(Property::new("A", "x"));
        props.update(Property::new("C", 3.5f64));
        let ids: Vec<_> = props.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
        assert_eq!(props.get("A").unwrap().value.as_str(), Some("x"));

        assert!(props.remove("B").is_some());
        assert!(props.remove("B").is_none());
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn element_round_trip() {
        let p = Property::new("Observation:Object:Name", "M31")
            .with_comment("target")
            .with_format("%s");
        let e = p.to_element();
        assert_eq!(e.text, "M31");
        assert_eq!(Property::from_element(&e, None).unwrap(), p);

        let k = FitsKeyword::new("EXPTIME", "300.", "Exposure time in seconds");
        assert_eq!(FitsKeyword::from_element(&k.to_element()).unwrap(), k);
    }
}
