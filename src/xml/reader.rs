/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::{
    events::{BytesStart, Event},
    name::ResolveResult,
    NsReader,
};

use crate::{
    xml::{XmlNamespace, XmlValue},
    Error,
};

/// The kind of node an [`EwsXmlReader`] is positioned on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XmlNodeType {
    /// The reader has not been advanced yet.
    None,
    StartElement,
    EndElement,
    Text,
    EndOfDocument,
}

#[derive(Clone, Debug)]
struct Node {
    kind: XmlNodeType,
    namespace: Option<XmlNamespace>,
    local_name: String,
    attributes: Vec<(String, String)>,
    is_empty: bool,
    text: String,
}

impl Node {
    fn new(kind: XmlNodeType) -> Self {
        Self {
            kind,
            namespace: None,
            local_name: String::new(),
            attributes: Vec::new(),
            is_empty: false,
            text: String::new(),
        }
    }

    fn element(
        kind: XmlNodeType,
        namespace: Option<XmlNamespace>,
        local_name: String,
    ) -> Self {
        Self {
            namespace,
            local_name,
            ..Self::new(kind)
        }
    }

    fn text(text: String) -> Self {
        Self {
            text,
            ..Self::new(XmlNodeType::Text)
        }
    }

    fn describe(&self) -> String {
        let name = || {
            self.namespace
                .map(|ns| ns.qualify(&self.local_name))
                .unwrap_or_else(|| self.local_name.clone())
        };

        match self.kind {
            XmlNodeType::None => "start of document".to_owned(),
            XmlNodeType::StartElement => format!("start element `{}`", name()),
            XmlNodeType::EndElement => format!("end element `{}`", name()),
            XmlNodeType::Text => "text content".to_owned(),
            XmlNodeType::EndOfDocument => "end of document".to_owned(),
        }
    }
}

/// A forward-only pull reader over an EWS XML document.
///
/// Empty elements (`<t:Foo/>`) are reported as a start element for which
/// [`is_empty_element`](Self::is_empty_element) returns `true`, followed by a
/// matching end element on the next [`read`](Self::read). Whitespace-only
/// text between elements, comments and processing instructions are never
/// surfaced.
pub struct EwsXmlReader<'a> {
    inner: NsReader<&'a [u8]>,
    current: Node,
    pending_end: Option<Node>,
}

impl<'a> EwsXmlReader<'a> {
    /// Creates a reader over a complete XML document or fragment.
    pub fn new(document: &'a [u8]) -> Self {
        let mut inner = NsReader::from_reader(document);
        inner.config_mut().trim_text(false);

        Self {
            inner,
            current: Node::new(XmlNodeType::None),
            pending_end: None,
        }
    }

    /// The type of the current node.
    pub fn node_type(&self) -> XmlNodeType {
        self.current.kind
    }

    /// The local name of the current element, or an empty string if the reader
    /// is not positioned on an element.
    pub fn local_name(&self) -> &str {
        &self.current.local_name
    }

    /// The namespace of the current element, if it is one EWS knows about.
    pub fn namespace(&self) -> Option<XmlNamespace> {
        self.current.namespace
    }

    /// The content of the current text node.
    pub fn value(&self) -> &str {
        &self.current.text
    }

    /// Advances to the next node.
    pub fn read(&mut self) -> Result<(), Error> {
        if let Some(end) = self.pending_end.take() {
            self.current = end;
            return Ok(());
        }

        loop {
            let node = self.read_raw()?;
            if node.kind == XmlNodeType::Text && node.text.trim().is_empty() {
                continue;
            }

            self.current = node;
            return Ok(());
        }
    }

    /// Whether the reader is positioned on any start element.
    pub fn is_at_start_element(&self) -> bool {
        self.current.kind == XmlNodeType::StartElement
    }

    /// Whether the reader is positioned on the start of the named element.
    pub fn is_start_element(&self, namespace: XmlNamespace, local_name: &str) -> bool {
        self.is_at_start_element() && self.is_named(namespace, local_name)
    }

    /// Whether the reader is positioned on the end of the named element.
    pub fn is_end_element(&self, namespace: XmlNamespace, local_name: &str) -> bool {
        self.current.kind == XmlNodeType::EndElement && self.is_named(namespace, local_name)
    }

    /// Whether the current start element has no content (`<t:Foo/>`).
    pub fn is_empty_element(&self) -> bool {
        self.is_at_start_element() && self.current.is_empty
    }

    /// Whether the current start element carries any attributes.
    pub fn has_attributes(&self) -> bool {
        !self.current.attributes.is_empty()
    }

    /// Reads the raw value of an attribute on the current start element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.current
            .attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Reads and converts the value of an attribute on the current start
    /// element. Absent attributes produce `Ok(None)`.
    pub fn read_attribute_value<T: XmlValue>(&self, name: &str) -> Result<Option<T>, Error> {
        self.attribute(name).map(T::from_xml_str).transpose()
    }

    /// Fails unless the reader is on the start of the named element.
    pub fn ensure_current_node_is_start_element(
        &self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        if self.is_start_element(namespace, local_name) {
            Ok(())
        } else {
            Err(self.unexpected(format!(
                "start element `{}`",
                namespace.qualify(local_name)
            )))
        }
    }

    /// Fails unless the reader is on the end of the named element.
    pub fn ensure_current_node_is_end_element(
        &self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        if self.is_end_element(namespace, local_name) {
            Ok(())
        } else {
            Err(self.unexpected(format!(
                "end element `{}`",
                namespace.qualify(local_name)
            )))
        }
    }

    /// Advances and fails unless the new node is the start of the named
    /// element.
    pub fn read_start_element(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        self.read()?;
        self.ensure_current_node_is_start_element(namespace, local_name)
    }

    /// Reads the text content of the current element and converts it.
    ///
    /// Whitespace-only content is read as an empty string. On return, the
    /// reader is positioned on the element's end.
    pub fn read_element_value<T: XmlValue>(&mut self) -> Result<T, Error> {
        let text = self.read_element_text(false)?;
        T::from_xml_str(&text)
    }

    /// Reads the text content of the current element, keeping whitespace-only
    /// content intact.
    pub fn read_element_value_preserving_whitespace(&mut self) -> Result<String, Error> {
        self.read_element_text(true)
    }

    /// Decodes the base64 content of the current element into `sink`,
    /// returning the number of bytes written.
    pub fn read_base64_element_value_into<W: Write>(&mut self, sink: &mut W) -> Result<usize, Error> {
        let bytes = self.read_base64_element_value()?;
        sink.write_all(&bytes)?;

        Ok(bytes.len())
    }

    /// Decodes the base64 content of the current element.
    pub fn read_base64_element_value(&mut self) -> Result<Vec<u8>, Error> {
        let text = self.read_element_text(false)?;
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        Ok(STANDARD.decode(compact)?)
    }

    /// Skips the current element and all of its content, leaving the reader on
    /// its end.
    pub fn skip_current_element(&mut self) -> Result<(), Error> {
        if !self.is_at_start_element() {
            return Err(self.unexpected("a start element to skip".to_owned()));
        }

        if self.current.is_empty {
            return self.read();
        }

        let mut depth = 0usize;
        loop {
            let node = self.read_raw()?;
            match node.kind {
                // Empty elements are followed by a synthesized end, so they
                // nest like any other element.
                XmlNodeType::StartElement => depth += 1,
                XmlNodeType::EndElement if depth == 0 => {
                    self.current = node;
                    return Ok(());
                }
                XmlNodeType::EndElement => depth -= 1,
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {}
            }
        }
    }

    fn read_element_text(&mut self, preserve_whitespace: bool) -> Result<String, Error> {
        if !self.is_at_start_element() {
            return Err(self.unexpected("an element with text content".to_owned()));
        }

        if self.current.is_empty {
            self.read()?;
            return Ok(String::new());
        }

        let mut text = String::new();
        loop {
            let node = self.read_raw()?;
            match node.kind {
                XmlNodeType::Text => text.push_str(&node.text),
                XmlNodeType::EndElement => {
                    self.current = node;
                    break;
                }
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {
                    return Err(Error::UnexpectedElement {
                        expected: "text content".to_owned(),
                        found: node.describe(),
                    })
                }
            }
        }

        if !preserve_whitespace && text.trim().is_empty() {
            text.clear();
        }

        Ok(text)
    }

    /// Reads the next node from the underlying reader, including
    /// whitespace-only text.
    fn read_raw(&mut self) -> Result<Node, Error> {
        if let Some(end) = self.pending_end.take() {
            return Ok(end);
        }

        loop {
            let (resolved, event) = self.inner.read_resolved_event()?;
            let namespace = resolve_namespace(&resolved);

            match event {
                Event::Start(start) => {
                    let mut node = Node::element(
                        XmlNodeType::StartElement,
                        namespace,
                        local_name_of(&start)?,
                    );
                    node.attributes = attributes_of(&start)?;
                    return Ok(node);
                }
                Event::Empty(start) => {
                    let local_name = local_name_of(&start)?;
                    self.pending_end = Some(Node::element(
                        XmlNodeType::EndElement,
                        namespace,
                        local_name.clone(),
                    ));

                    let mut node =
                        Node::element(XmlNodeType::StartElement, namespace, local_name);
                    node.attributes = attributes_of(&start)?;
                    node.is_empty = true;
                    return Ok(node);
                }
                Event::End(end) => {
                    let local_name = std::str::from_utf8(end.local_name().as_ref())?.to_owned();
                    return Ok(Node::element(XmlNodeType::EndElement, namespace, local_name));
                }
                Event::Text(text) => return Ok(Node::text(text.unescape()?.into_owned())),
                Event::CData(cdata) => {
                    return Ok(Node::text(std::str::from_utf8(&cdata)?.to_owned()))
                }
                Event::Eof => return Ok(Node::new(XmlNodeType::EndOfDocument)),

                // Declarations, comments, processing instructions and doctypes
                // carry nothing EWS cares about.
                _ => continue,
            }
        }
    }

    fn is_named(&self, namespace: XmlNamespace, local_name: &str) -> bool {
        self.current.local_name == local_name && self.current.namespace == Some(namespace)
    }

    fn unexpected(&self, expected: String) -> Error {
        match self.current.kind {
            XmlNodeType::EndOfDocument => Error::UnexpectedEndOfDocument,
            _ => Error::UnexpectedElement {
                expected,
                found: self.current.describe(),
            },
        }
    }
}

/// Maps the resolved namespace of an element onto [`XmlNamespace`].
///
/// Undeclared prefixes fall back to the conventional EWS prefixes so that
/// fragments without `xmlns` declarations can still be read.
fn resolve_namespace(resolved: &ResolveResult) -> Option<XmlNamespace> {
    match resolved {
        ResolveResult::Bound(namespace) => std::str::from_utf8(namespace.as_ref())
            .ok()
            .and_then(XmlNamespace::from_uri),
        ResolveResult::Unknown(prefix) => std::str::from_utf8(prefix)
            .ok()
            .and_then(XmlNamespace::from_prefix),
        ResolveResult::Unbound => Some(XmlNamespace::NotSpecified),
    }
}

fn local_name_of(start: &BytesStart) -> Result<String, Error> {
    Ok(std::str::from_utf8(start.local_name().as_ref())?.to_owned())
}

fn attributes_of(start: &BytesStart) -> Result<Vec<(String, String)>, Error> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        if attribute.key.as_namespace_binding().is_some() {
            continue;
        }

        let name = std::str::from_utf8(attribute.key.local_name().as_ref())?.to_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((name, value));
    }

    Ok(attributes)
}
