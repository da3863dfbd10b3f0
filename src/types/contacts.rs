/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The keyed address and phone number collections of a contact.

use std::io::Write;

use crate::{
    property::{DictionaryEntry, DictionaryProperty, DictionarySchema, SimplePropertyBag},
    types::MailboxType,
    update::{write_indexed_field_uri, PropertyDefinition, ServiceObject},
    xml::{xml_value_enum, EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlValue},
    ComplexProperty, Error, ExchangeServerVersion, PropertyCore,
};

xml_value_enum! {
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/entry-emailaddress>
    pub enum EmailAddressKey {
        EmailAddress1 => "EmailAddress1",
        EmailAddress2 => "EmailAddress2",
        EmailAddress3 => "EmailAddress3",
    }
}

xml_value_enum! {
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/entry-phonenumber>
    pub enum PhoneNumberKey {
        AssistantPhone => "AssistantPhone",
        BusinessFax => "BusinessFax",
        BusinessPhone => "BusinessPhone",
        BusinessPhone2 => "BusinessPhone2",
        Callback => "Callback",
        CarPhone => "CarPhone",
        CompanyMainPhone => "CompanyMainPhone",
        HomeFax => "HomeFax",
        HomePhone => "HomePhone",
        HomePhone2 => "HomePhone2",
        Isdn => "Isdn",
        MobilePhone => "MobilePhone",
        OtherFax => "OtherFax",
        OtherTelephone => "OtherTelephone",
        Pager => "Pager",
        PrimaryPhone => "PrimaryPhone",
        RadioPhone => "RadioPhone",
        Telex => "Telex",
        TtyTddPhone => "TtyTddPhone",
    }
}

xml_value_enum! {
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/entry-physicaladdress>
    pub enum PhysicalAddressKey {
        Home => "Home",
        Business => "Business",
        Other => "Other",
    }
}

xml_value_enum! {
    /// The individually updatable parts of a postal address.
    pub enum PhysicalAddressField {
        Street => "Street",
        City => "City",
        State => "State",
        CountryOrRegion => "CountryOrRegion",
        PostalCode => "PostalCode",
    }
}

impl PhysicalAddressField {
    /// Every field, in schema order.
    pub const ALL: [PhysicalAddressField; 5] = [
        PhysicalAddressField::Street,
        PhysicalAddressField::City,
        PhysicalAddressField::State,
        PhysicalAddressField::CountryOrRegion,
        PhysicalAddressField::PostalCode,
    ];

    fn field_uri(self) -> String {
        format!("contacts:PhysicalAddress:{self}")
    }
}

/// One of the email addresses of a contact.
#[derive(Clone, Debug)]
pub struct EmailAddressEntry {
    core: PropertyCore,
    key: EmailAddressKey,
    address: Option<String>,
    name: Option<String>,
    routing_type: Option<String>,
    mailbox_type: Option<MailboxType>,
}

impl EmailAddressEntry {
    pub fn new(key: EmailAddressKey, address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::empty(key)
        }
    }

    fn empty(key: EmailAddressKey) -> Self {
        Self {
            core: PropertyCore::default(),
            key,
            address: None,
            name: None,
            routing_type: None,
            mailbox_type: None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        self.core.set_field(&mut self.address, address);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.core.set_field(&mut self.name, name);
    }

    pub fn routing_type(&self) -> Option<&str> {
        self.routing_type.as_deref()
    }

    pub fn set_routing_type(&mut self, routing_type: Option<String>) {
        self.core.set_field(&mut self.routing_type, routing_type);
    }

    pub fn mailbox_type(&self) -> Option<MailboxType> {
        self.mailbox_type
    }

    pub fn set_mailbox_type(&mut self, mailbox_type: Option<MailboxType>) {
        self.core.set_field(&mut self.mailbox_type, mailbox_type);
    }
}

impl ComplexProperty for EmailAddressEntry {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.name = reader.read_attribute_value("Name")?;
        self.routing_type = reader.read_attribute_value("RoutingType")?;
        self.mailbox_type = reader.read_attribute_value("MailboxType")?;

        Ok(())
    }

    fn read_text_value_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.address = Some(reader.value().to_owned());
        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        self.write_key_attribute(writer)?;

        // Exchange 2007 rejects everything but the key.
        if writer.server_version() > ExchangeServerVersion::Exchange2007_SP1 {
            writer.write_optional_attribute_value("Name", self.name.as_ref())?;
            writer.write_optional_attribute_value("RoutingType", self.routing_type.as_ref())?;
            writer.write_optional_attribute_value("MailboxType", self.mailbox_type.as_ref())?;
        }

        Ok(())
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        match &self.address {
            Some(address) => writer.write_value(address),
            None => Ok(()),
        }
    }
}

impl DictionaryEntry for EmailAddressEntry {
    type Key = EmailAddressKey;

    fn key(&self) -> &EmailAddressKey {
        &self.key
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmailAddressDictionarySchema;

impl DictionarySchema for EmailAddressDictionarySchema {
    type Entry = EmailAddressEntry;

    fn field_uri(&self) -> &'static str {
        "contacts:EmailAddress"
    }

    fn create_entry_instance(&self, key: EmailAddressKey) -> EmailAddressEntry {
        EmailAddressEntry::empty(key)
    }
}

/// The email addresses of a contact.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/emailaddresses>
pub type EmailAddressDictionary = DictionaryProperty<EmailAddressDictionarySchema>;

impl DictionaryProperty<EmailAddressDictionarySchema> {
    /// Sets the address stored under `key`, adding an entry if there is none.
    pub fn set_address(&mut self, key: EmailAddressKey, address: impl Into<String>) -> Result<(), Error> {
        match self.entry_mut(&key) {
            Some(entry) => {
                entry.set_address(Some(address.into()));
                Ok(())
            }
            None => self.add(EmailAddressEntry::new(key, address)),
        }
    }
}

/// One of the phone numbers of a contact.
#[derive(Clone, Debug)]
pub struct PhoneNumberEntry {
    core: PropertyCore,
    key: PhoneNumberKey,
    number: Option<String>,
}

impl PhoneNumberEntry {
    pub fn new(key: PhoneNumberKey, number: impl Into<String>) -> Self {
        Self {
            core: PropertyCore::default(),
            key,
            number: Some(number.into()),
        }
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn set_number(&mut self, number: Option<String>) {
        self.core.set_field(&mut self.number, number);
    }
}

impl ComplexProperty for PhoneNumberEntry {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn read_text_value_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.number = Some(reader.value().to_owned());
        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        self.write_key_attribute(writer)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        match &self.number {
            Some(number) => writer.write_value(number),
            None => Ok(()),
        }
    }
}

impl DictionaryEntry for PhoneNumberEntry {
    type Key = PhoneNumberKey;

    fn key(&self) -> &PhoneNumberKey {
        &self.key
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PhoneNumberDictionarySchema;

impl DictionarySchema for PhoneNumberDictionarySchema {
    type Entry = PhoneNumberEntry;

    fn field_uri(&self) -> &'static str {
        "contacts:PhoneNumber"
    }

    fn create_entry_instance(&self, key: PhoneNumberKey) -> PhoneNumberEntry {
        PhoneNumberEntry {
            core: PropertyCore::default(),
            key,
            number: None,
        }
    }
}

/// The phone numbers of a contact.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/phonenumbers>
pub type PhoneNumberDictionary = DictionaryProperty<PhoneNumberDictionarySchema>;

/// One of the postal addresses of a contact.
///
/// Each part of the address is tracked on its own, so an update only touches
/// the parts that were edited.
#[derive(Clone, Debug)]
pub struct PhysicalAddressEntry {
    core: PropertyCore,
    key: PhysicalAddressKey,
    fields: SimplePropertyBag<PhysicalAddressField, String>,
}

impl PhysicalAddressEntry {
    pub fn new(key: PhysicalAddressKey) -> Self {
        Self {
            core: PropertyCore::default(),
            key,
            fields: SimplePropertyBag::new(),
        }
    }

    pub fn with_field(mut self, field: PhysicalAddressField, value: impl Into<String>) -> Self {
        self.fields.set(field, Some(value.into()));
        self
    }

    pub fn get(&self, field: PhysicalAddressField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Sets or clears one part of the address.
    pub fn set(&mut self, field: PhysicalAddressField, value: Option<String>) {
        if self.fields.set(field, value) {
            self.changed();
        }
    }

    fn write_field_set_update<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
        field: PhysicalAddressField,
        value: &String,
    ) -> Result<(), Error> {
        writer.write_start_element(XmlNamespace::Types, object.set_field_xml_element_name())?;
        write_indexed_field_uri(writer, &field.field_uri(), self.key.as_str())?;
        writer.write_start_element(XmlNamespace::Types, object.xml_element_name())?;
        writer.write_start_element(XmlNamespace::Types, property.xml_element_name())?;
        writer.write_start_element(XmlNamespace::Types, "Entry")?;
        self.write_key_attribute(writer)?;
        writer.write_element_value(XmlNamespace::Types, field.as_str(), value)?;
        writer.write_end_element()?;
        writer.write_end_element()?;
        writer.write_end_element()?;
        writer.write_end_element()
    }

    fn write_field_delete_update<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        field: PhysicalAddressField,
    ) -> Result<(), Error> {
        writer.write_start_element(XmlNamespace::Types, object.delete_field_xml_element_name())?;
        write_indexed_field_uri(writer, &field.field_uri(), self.key.as_str())?;
        writer.write_end_element()
    }
}

impl ComplexProperty for PhysicalAddressEntry {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        let Ok(field) = PhysicalAddressField::from_xml_str(reader.local_name()) else {
            return Ok(false);
        };

        let value = reader.read_element_value()?;
        self.fields.load(field, value);

        Ok(true)
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        self.write_key_attribute(writer)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        for field in PhysicalAddressField::ALL {
            writer.write_optional_element_value(
                XmlNamespace::Types,
                field.as_str(),
                self.fields.get(&field),
            )?;
        }

        Ok(())
    }

    /// Writes a `SetField` for each edited part and a `DeleteField` for each
    /// cleared part.
    fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<bool, Error> {
        let changed = self
            .fields
            .added_keys()
            .iter()
            .chain(self.fields.modified_keys());

        for &field in changed {
            if let Some(value) = self.fields.get(&field) {
                self.write_field_set_update(writer, object, property, field, value)?;
            }
        }

        for &field in self.fields.removed_keys() {
            self.write_field_delete_update(writer, object, field)?;
        }

        Ok(true)
    }

    /// Deletes every part of the address.
    fn write_delete_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
    ) -> Result<bool, Error> {
        for field in PhysicalAddressField::ALL {
            self.write_field_delete_update(writer, object, field)?;
        }

        Ok(true)
    }

    fn clear_change_log(&mut self) {
        self.fields.clear_change_log();
    }
}

impl DictionaryEntry for PhysicalAddressEntry {
    type Key = PhysicalAddressKey;

    fn key(&self) -> &PhysicalAddressKey {
        &self.key
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PhysicalAddressDictionarySchema;

impl DictionarySchema for PhysicalAddressDictionarySchema {
    type Entry = PhysicalAddressEntry;

    fn field_uri(&self) -> &'static str {
        "contacts:PhysicalAddress"
    }

    fn create_entry_instance(&self, key: PhysicalAddressKey) -> PhysicalAddressEntry {
        PhysicalAddressEntry::new(key)
    }
}

/// The postal addresses of a contact.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/physicaladdresses>
pub type PhysicalAddressDictionary = DictionaryProperty<PhysicalAddressDictionarySchema>;
