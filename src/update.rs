/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Addressing for incremental updates: which entity a change applies to and
//! which of its fields it touches.

use std::io::Write;

use crate::{
    xml::{EwsXmlWriter, XmlNamespace},
    Error,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceObjectKind {
    Item,
    Folder,
}

/// The entity an update is written for, e.g. a `Message` or a `Folder`.
///
/// Determines the element names of the change operations and the element the
/// new field values are wrapped in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceObject {
    kind: ServiceObjectKind,
    xml_element_name: String,
}

impl ServiceObject {
    pub fn item(xml_element_name: impl Into<String>) -> Self {
        Self {
            kind: ServiceObjectKind::Item,
            xml_element_name: xml_element_name.into(),
        }
    }

    pub fn folder(xml_element_name: impl Into<String>) -> Self {
        Self {
            kind: ServiceObjectKind::Folder,
            xml_element_name: xml_element_name.into(),
        }
    }

    pub fn kind(&self) -> ServiceObjectKind {
        self.kind
    }

    pub fn xml_element_name(&self) -> &str {
        &self.xml_element_name
    }

    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/setitemfield>
    pub fn set_field_xml_element_name(&self) -> &'static str {
        match self.kind {
            ServiceObjectKind::Item => "SetItemField",
            ServiceObjectKind::Folder => "SetFolderField",
        }
    }

    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/deleteitemfield>
    pub fn delete_field_xml_element_name(&self) -> &'static str {
        match self.kind {
            ServiceObjectKind::Item => "DeleteItemField",
            ServiceObjectKind::Folder => "DeleteFolderField",
        }
    }
}

/// A property of an EWS entity as addressed in updates: the element it is
/// written as and its field URI.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/fielduri>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyDefinition {
    xml_element_name: &'static str,
    uri: &'static str,
}

impl PropertyDefinition {
    pub const fn new(xml_element_name: &'static str, uri: &'static str) -> Self {
        Self {
            xml_element_name,
            uri,
        }
    }

    pub fn xml_element_name(&self) -> &'static str {
        self.xml_element_name
    }

    pub fn uri(&self) -> &'static str {
        self.uri
    }

    /// Writes the `FieldURI` element addressing this property.
    pub fn write_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_start_element(XmlNamespace::Types, "FieldURI")?;
        writer.write_attribute("FieldURI", self.uri)?;
        writer.write_end_element()
    }
}

/// Writes an `IndexedFieldURI` element addressing one entry of a dictionary
/// property.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/indexedfielduri>
pub fn write_indexed_field_uri<W: Write>(
    writer: &mut EwsXmlWriter<W>,
    field_uri: &str,
    field_index: &str,
) -> Result<(), Error> {
    writer.write_start_element(XmlNamespace::Types, "IndexedFieldURI")?;
    writer.write_attribute("FieldURI", field_uri)?;
    writer.write_attribute("FieldIndex", field_index)?;
    writer.write_end_element()
}

/// Properties with change-tracked collection or dictionary values.
pub mod schema {
    use super::PropertyDefinition;

    pub const ITEM_ATTACHMENTS: PropertyDefinition =
        PropertyDefinition::new("Attachments", "item:Attachments");

    pub const MESSAGE_TO_RECIPIENTS: PropertyDefinition =
        PropertyDefinition::new("ToRecipients", "message:ToRecipients");

    pub const MESSAGE_CC_RECIPIENTS: PropertyDefinition =
        PropertyDefinition::new("CcRecipients", "message:CcRecipients");

    pub const MESSAGE_BCC_RECIPIENTS: PropertyDefinition =
        PropertyDefinition::new("BccRecipients", "message:BccRecipients");

    pub const CONTACT_EMAIL_ADDRESSES: PropertyDefinition =
        PropertyDefinition::new("EmailAddresses", "contacts:EmailAddresses");

    pub const CONTACT_PHONE_NUMBERS: PropertyDefinition =
        PropertyDefinition::new("PhoneNumbers", "contacts:PhoneNumbers");

    pub const CONTACT_PHYSICAL_ADDRESSES: PropertyDefinition =
        PropertyDefinition::new("PhysicalAddresses", "contacts:PhysicalAddresses");

    pub const FOLDER_PERMISSION_SET: PropertyDefinition =
        PropertyDefinition::new("PermissionSet", "folder:PermissionSet");
}
