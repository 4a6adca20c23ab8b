//! Minimal in-memory XML element tree
//!
//! The header is small and read whole, so a DOM-style tree is all the
//! container code needs: children by tag, attribute lookup, attribute and
//! text setters, appending children. Parsing and serialization are delegated
//! to `quick-xml`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated character data directly inside this element.
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Mandatory attribute; missing is a format error naming the element.
    pub fn required_attr(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            Error::format(format!("<{}> is missing the {name} attribute", self.name))
        })
    }

    /// Set or replace an attribute, keeping first-insertion order.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(xml_err)?
        .to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?;
        element.attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

/// Parse a complete document and return its root element.
///
/// Comments, processing instructions and the declaration are dropped.
pub fn parse(bytes: &[u8]) -> Result<Element> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(std::str::from_utf8(&data.into_inner()).map_err(xml_err)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::Xml(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
    }
    root.ok_or_else(|| Error::Xml("document has no root element".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::Xml("more than one root element".into())),
    }
    Ok(())
}

/// Serialize `root` as a standalone document with an optional leading comment.
///
/// Output is compact (no indentation) so that element text round-trips
/// byte-for-byte.
pub fn write(root: &Element, comment: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = quick_xml::Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    if let Some(comment) = comment {
        writer
            .write_event(Event::Comment(BytesText::from_escaped(comment)))
            .map_err(xml_err)?;
    }
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut quick_xml::Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if element.children.is_empty() && element.text.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_err);
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(xml_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_document() {
        let doc = br#"<?xml version="1.0"?><!-- c --><root a="1"><x b="&lt;2&gt;"/><y>t&amp;u</y></root>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attr("a"), Some("1"));
        assert_eq!(root.child("x").unwrap().attr("b"), Some("<2>"));
        assert_eq!(root.child("y").unwrap().text, "t&u");
        assert_eq!(root.children_named("x").count(), 1);
    }

    #[test]
    fn write_then_parse() {
        let mut root = Element::new("xisf").with_attr("version", "1.0");
        let mut p = Element::new("Property").with_attr("id", "A&B");
        p.set_text("line1\nline2 <tag> ü");
        root.push_child(p);
        root.push_child(Element::new("Empty"));

        let bytes = write(&root, Some("\nhello\n")).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><!--\nhello\n-->"));
        assert_eq!(parse(&bytes).unwrap(), root);
    }

    #[test]
    fn set_attr_replaces() {
        let mut e = Element::new("e").with_attr("k", "1");
        e.set_attr("k", "2");
        assert_eq!(e.attributes().count(), 1);
        assert_eq!(e.attr("k"), Some("2"));
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(matches!(parse(b"<a><b></a>"), Err(Error::Xml(_))));
        assert!(matches!(parse(b"<a>"), Err(Error::Xml(_))));
        assert!(matches!(parse(b""), Err(Error::Xml(_))));
    }
}
