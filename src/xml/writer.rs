/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use crate::{
    xml::{XmlNamespace, XmlValue},
    Error, ExchangeServerVersion,
};

/// A streaming writer for EWS XML.
///
/// Start tags are buffered until the first piece of content is written so
/// that attributes can still be attached, and elements which end up with no
/// content are written in their self-closing form.
pub struct EwsXmlWriter<W: Write> {
    inner: Writer<W>,
    pending_start: Option<BytesStart<'static>>,
    open_elements: Vec<String>,
    server_version: ExchangeServerVersion,
}

impl<W: Write> EwsXmlWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Writer::new(inner),
            pending_start: None,
            open_elements: Vec::new(),
            server_version: ExchangeServerVersion::default(),
        }
    }

    /// Sets the server version requests are being written for. Properties
    /// consult this to leave out content older servers reject.
    pub fn with_server_version(mut self, server_version: ExchangeServerVersion) -> Self {
        self.server_version = server_version;
        self
    }

    pub fn server_version(&self) -> ExchangeServerVersion {
        self.server_version
    }

    /// Opens a new element.
    pub fn write_start_element(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        self.flush_pending_start()?;

        let name = namespace.qualify(local_name);
        self.pending_start = Some(BytesStart::new(name.clone()));
        self.open_elements.push(name);

        Ok(())
    }

    /// Adds an attribute to the element most recently opened. Fails if any
    /// content has been written to that element already.
    pub fn write_attribute_value<T: XmlValue>(&mut self, name: &str, value: &T) -> Result<(), Error> {
        let value = value.to_xml_string()?;
        self.write_attribute(name, &value)
    }

    /// Adds an attribute with a plain string value.
    pub fn write_attribute(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let start = self.pending_start.as_mut().ok_or(Error::InvalidWriterState(
            "attributes must be written before element content",
        ))?;
        start.push_attribute((name, value));

        Ok(())
    }

    /// Adds an attribute if a value is present.
    pub fn write_optional_attribute_value<T: XmlValue>(
        &mut self,
        name: &str,
        value: Option<&T>,
    ) -> Result<(), Error> {
        match value {
            Some(value) => self.write_attribute_value(name, value),
            None => Ok(()),
        }
    }

    /// Writes text content into the current element.
    pub fn write_value<T: XmlValue>(&mut self, value: &T) -> Result<(), Error> {
        let text = value.to_xml_string()?;
        self.flush_pending_start()?;
        self.inner.write_event(Event::Text(BytesText::new(&text)))?;

        Ok(())
    }

    /// Writes a complete element with text content.
    pub fn write_element_value<T: XmlValue>(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
        value: &T,
    ) -> Result<(), Error> {
        self.write_start_element(namespace, local_name)?;
        self.write_value(value)?;
        self.write_end_element()
    }

    /// Writes a complete element if a value is present.
    pub fn write_optional_element_value<T: XmlValue>(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
        value: Option<&T>,
    ) -> Result<(), Error> {
        match value {
            Some(value) => self.write_element_value(namespace, local_name, value),
            None => Ok(()),
        }
    }

    /// Writes a complete element whose content is the base64 encoding of
    /// `bytes`.
    pub fn write_base64_element_value(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
        bytes: &[u8],
    ) -> Result<(), Error> {
        self.write_element_value(namespace, local_name, &STANDARD.encode(bytes))
    }

    /// Closes the element most recently opened.
    pub fn write_end_element(&mut self) -> Result<(), Error> {
        let name = self
            .open_elements
            .pop()
            .ok_or(Error::InvalidWriterState("no element is open"))?;

        match self.pending_start.take() {
            Some(start) => self.inner.write_event(Event::Empty(start))?,
            None => self.inner.write_event(Event::End(BytesEnd::new(name)))?,
        }

        Ok(())
    }

    /// Consumes the writer, returning the underlying sink. Fails if any
    /// element is still open.
    pub fn into_inner(self) -> Result<W, Error> {
        if !self.open_elements.is_empty() {
            return Err(Error::InvalidWriterState(
                "all elements must be closed before finishing",
            ));
        }

        Ok(self.inner.into_inner())
    }

    fn flush_pending_start(&mut self) -> Result<(), Error> {
        if let Some(start) = self.pending_start.take() {
            self.inner.write_event(Event::Start(start))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(writer: EwsXmlWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn empty_elements_are_self_closing() {
        let mut writer = EwsXmlWriter::new(Vec::new());
        writer
            .write_start_element(XmlNamespace::Types, "ItemId")
            .unwrap();
        writer
            .write_attribute_value("Id", &"AAMkAd".to_owned())
            .unwrap();
        writer.write_end_element().unwrap();

        assert_eq!(finish(writer), r#"<t:ItemId Id="AAMkAd"/>"#);
    }

    #[test]
    fn content_is_escaped_and_nested() {
        let mut writer = EwsXmlWriter::new(Vec::new());
        writer
            .write_start_element(XmlNamespace::Types, "Mailbox")
            .unwrap();
        writer
            .write_element_value(XmlNamespace::Types, "Name", &"Tom & Jerry".to_owned())
            .unwrap();
        writer
            .write_optional_element_value::<String>(XmlNamespace::Types, "RoutingType", None)
            .unwrap();
        writer.write_end_element().unwrap();

        assert_eq!(
            finish(writer),
            "<t:Mailbox><t:Name>Tom &amp; Jerry</t:Name></t:Mailbox>"
        );
    }

    #[test]
    fn base64_content_is_encoded() {
        let mut writer = EwsXmlWriter::new(Vec::new());
        writer
            .write_base64_element_value(XmlNamespace::Types, "Content", &[1, 2, 3, 4, 5])
            .unwrap();

        assert_eq!(finish(writer), "<t:Content>AQIDBAU=</t:Content>");
    }

    #[test]
    fn attributes_after_content_are_rejected() {
        let mut writer = EwsXmlWriter::new(Vec::new());
        writer
            .write_start_element(XmlNamespace::Types, "Entry")
            .unwrap();
        writer.write_value(&"value".to_owned()).unwrap();

        assert!(matches!(
            writer.write_attribute_value("Key", &"Home".to_owned()),
            Err(Error::InvalidWriterState(_))
        ));
    }

    #[test]
    fn unbalanced_documents_are_rejected() {
        let mut writer = EwsXmlWriter::new(Vec::new());
        assert!(writer.write_end_element().is_err());

        writer
            .write_start_element(XmlNamespace::Types, "Entry")
            .unwrap();
        assert!(writer.into_inner().is_err());
    }

    #[test]
    fn server_version_defaults_to_latest() {
        let writer = EwsXmlWriter::new(Vec::new());
        assert_eq!(
            writer.server_version(),
            ExchangeServerVersion::Exchange2013_SP1
        );

        let writer = writer.with_server_version(ExchangeServerVersion::Exchange2007_SP1);
        assert_eq!(
            writer.server_version(),
            ExchangeServerVersion::Exchange2007_SP1
        );
    }
}
