/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{io::Write, rc::Rc};

use crate::{
    property::{CollectionSchema, ComplexPropertyCollection},
    types::ItemId,
    xml::{xml_value_enum, EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ComplexProperty, Error, PropertyCore, Shared,
};

xml_value_enum! {
    /// The type of sender/recipient represented by a mailbox.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/mailboxtype>
    pub enum MailboxType {
        Mailbox => "Mailbox",
        PublicDL => "PublicDL",
        PrivateDL => "PrivateDL",
        Contact => "Contact",
        PublicFolder => "PublicFolder",
        Unknown => "Unknown",
        OneOff => "OneOff",
        GroupMailbox => "GroupMailbox",
    }
}

/// A mailbox whose folders are being addressed.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/mailbox>
#[derive(Clone, Debug, Default)]
pub struct Mailbox {
    core: PropertyCore,
    address: Option<String>,

    /// Free-form, as servers send values beyond the documented `SMTP` and
    /// `EX`.
    routing_type: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        self.core.set_field(&mut self.address, address);
    }

    pub fn routing_type(&self) -> Option<&str> {
        self.routing_type.as_deref()
    }

    pub fn set_routing_type(&mut self, routing_type: Option<String>) {
        self.core.set_field(&mut self.routing_type, routing_type);
    }

    pub fn is_valid(&self) -> bool {
        self.address.as_deref().is_some_and(|address| !address.is_empty())
    }
}

/// Addresses are compared case-insensitively, as Exchange does.
impl PartialEq for Mailbox {
    fn eq(&self, other: &Self) -> bool {
        let same_address = match (&self.address, &other.address) {
            (Some(address), Some(other_address)) => address.eq_ignore_ascii_case(other_address),
            (None, None) => true,
            _ => false,
        };

        same_address && self.routing_type == other.routing_type
    }
}

impl ComplexProperty for Mailbox {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "EmailAddress" => self.address = Some(reader.read_element_value()?),
            "RoutingType" => self.routing_type = Some(reader.read_element_value()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "EmailAddress", self.address.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "RoutingType", self.routing_type.as_ref())
    }
}

/// A reference to a user or address which can send or receive mail.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/mailbox>
#[derive(Clone, Debug, Default)]
pub struct EmailAddress {
    core: PropertyCore,

    /// The name of this mailbox's user.
    name: Option<String>,

    address: Option<String>,

    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/routingtype-emailaddress>
    routing_type: Option<String>,

    mailbox_type: Option<MailboxType>,

    /// An identifier for a contact or list of contacts corresponding to this
    /// mailbox.
    id: Option<ItemId>,
}

impl EmailAddress {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.core.set_field(&mut self.name, name);
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        self.core.set_field(&mut self.address, address);
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

    pub fn id(&self) -> Option<&ItemId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: Option<ItemId>) {
        self.core.set_field(&mut self.id, id);
    }
}

impl ComplexProperty for EmailAddress {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "Name" => self.name = Some(reader.read_element_value()?),
            "EmailAddress" => self.address = Some(reader.read_element_value()?),
            "RoutingType" => self.routing_type = Some(reader.read_element_value()?),
            "MailboxType" => self.mailbox_type = Some(reader.read_element_value()?),
            "ItemId" => {
                let mut id = ItemId::default();
                id.load_from_xml(reader, "ItemId")?;
                self.id = Some(id);
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "Name", self.name.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "EmailAddress", self.address.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "RoutingType", self.routing_type.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "MailboxType", self.mailbox_type.as_ref())?;

        match &self.id {
            Some(id) => id.write_to_xml(writer, id.xml_element_name()),
            None => Ok(()),
        }
    }
}

/// Recipient lists, such as the `ToRecipients` of a message.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmailAddressSchema;

impl CollectionSchema for EmailAddressSchema {
    type Item = EmailAddress;

    fn create_complex_property(&self, xml_element_name: &str) -> Option<EmailAddress> {
        (xml_element_name == "Mailbox").then(EmailAddress::default)
    }

    fn collection_item_xml_element_name(&self, _item: &EmailAddress) -> &'static str {
        "Mailbox"
    }

    /// An empty recipient list is meaningful: it clears the recipients.
    fn should_write_when_empty(&self) -> bool {
        true
    }
}

/// A change-tracked list of recipients.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/arrayofrecipientstype>
pub type EmailAddressCollection = ComplexPropertyCollection<EmailAddressSchema>;

impl ComplexPropertyCollection<EmailAddressSchema> {
    /// Adds a recipient by address.
    pub fn add_address(&mut self, name: Option<String>, address: impl Into<String>) -> Shared<EmailAddress> {
        self.add_new(EmailAddress::new(name, address))
    }

    /// Removes the first recipient with the given address, compared
    /// case-insensitively. Returns whether one was found.
    pub fn remove_address(&mut self, address: &str) -> bool {
        let found = self
            .iter()
            .find(|recipient| {
                recipient
                    .borrow()
                    .address()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(address))
            })
            .map(Rc::clone);

        match found {
            Some(recipient) => self.remove(&recipient),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{assert_serialized_content, load_from_str, serialize_with},
        update::{schema::MESSAGE_TO_RECIPIENTS, ServiceObject},
    };

    const RECIPIENTS: &str = concat!(
        r#"<t:ToRecipients>"#,
        r#"<t:Mailbox><t:Name>Ada Lovelace</t:Name><t:EmailAddress>ada@example.com</t:EmailAddress>"#,
        r#"<t:RoutingType>SMTP</t:RoutingType><t:MailboxType>Mailbox</t:MailboxType></t:Mailbox>"#,
        r#"<t:Mailbox><t:Name>Team</t:Name><t:EmailAddress>team@example.com</t:EmailAddress>"#,
        r#"<t:MailboxType>PublicDL</t:MailboxType><t:ItemId Id="AAMkDL" ChangeKey="EgAA"/></t:Mailbox>"#,
        r#"</t:ToRecipients>"#
    );

    #[test]
    fn recipients_round_trip() {
        let recipients: EmailAddressCollection = load_from_str(RECIPIENTS, "ToRecipients");

        assert_eq!(recipients.len(), 2);
        let team = recipients.get(1).unwrap().borrow();
        assert_eq!(team.mailbox_type(), Some(MailboxType::PublicDL));
        assert_eq!(team.id().and_then(|id| id.unique_id()), Some("AAMkDL"));
        drop(team);

        assert_serialized_content(&recipients, "ToRecipients", RECIPIENTS);
    }

    #[test]
    fn empty_recipient_lists_are_still_written() {
        let recipients = EmailAddressCollection::default();
        assert_serialized_content(&recipients, "ToRecipients", "<t:ToRecipients/>");
    }

    #[test]
    fn recipient_changes_become_set_fields() {
        let mut recipients: EmailAddressCollection = load_from_str(RECIPIENTS, "ToRecipients");

        assert!(recipients.remove_address("TEAM@example.com"));
        assert!(!recipients.remove_address("nobody@example.com"));
        recipients
            .get(0)
            .unwrap()
            .borrow_mut()
            .set_name(Some("Countess of Lovelace".to_owned()));
        recipients.add_address(None, "charles@example.com");

        let actual = serialize_with(|writer| {
            recipients.write_update_to_xml(
                writer,
                &ServiceObject::item("Message"),
                &MESSAGE_TO_RECIPIENTS,
            )
        });

        let expected = concat!(
            r#"<t:SetItemField><t:FieldURI FieldURI="message:ToRecipients"/><t:Message><t:ToRecipients>"#,
            r#"<t:Mailbox><t:EmailAddress>charles@example.com</t:EmailAddress></t:Mailbox>"#,
            r#"</t:ToRecipients></t:Message></t:SetItemField>"#,
            r#"<t:SetItemField><t:FieldURI FieldURI="message:ToRecipients"/><t:Message><t:ToRecipients>"#,
            r#"<t:Mailbox><t:Name>Countess of Lovelace</t:Name><t:EmailAddress>ada@example.com</t:EmailAddress>"#,
            r#"<t:RoutingType>SMTP</t:RoutingType><t:MailboxType>Mailbox</t:MailboxType></t:Mailbox>"#,
            r#"</t:ToRecipients></t:Message></t:SetItemField>"#,
            r#"<t:DeleteItemField><t:FieldURI FieldURI="message:ToRecipients"/></t:DeleteItemField>"#,
        );
        assert_eq!(actual, expected);
    }

    #[test]
    fn mailboxes_compare_addresses_case_insensitively() {
        let mut mailbox = Mailbox::new("Shared@Example.com");
        assert_eq!(mailbox, Mailbox::new("shared@example.com"));

        mailbox.set_routing_type(Some("SMTP".to_owned()));
        assert_ne!(mailbox, Mailbox::new("shared@example.com"));

        assert!(!Mailbox::default().is_valid());
    }

    #[test]
    fn mailbox_round_trips() {
        let xml = r#"<t:Mailbox><t:EmailAddress>shared@example.com</t:EmailAddress><t:RoutingType>SMTP</t:RoutingType></t:Mailbox>"#;
        let mailbox: Mailbox = load_from_str(xml, "Mailbox");

        assert_eq!(mailbox.address(), Some("shared@example.com"));
        assert_serialized_content(&mailbox, "Mailbox", xml);
    }

    #[test]
    fn unknown_elements_are_skipped_with_their_content() {
        let xml = concat!(
            r#"<t:Mailbox><t:Unknown><t:A><t:B/></t:A>"#,
            r#"<t:EmailAddress>inner@example.com</t:EmailAddress></t:Unknown></t:Mailbox>"#
        );
        let mailbox: Mailbox = load_from_str(xml, "Mailbox");
        assert_eq!(mailbox.address(), None);

        let xml = concat!(
            r#"<t:ToRecipients><t:Other><t:Flag><t:X/></t:Flag>"#,
            r#"<t:Mailbox><t:EmailAddress>inner@example.com</t:EmailAddress></t:Mailbox>"#,
            r#"</t:Other></t:ToRecipients>"#
        );
        let recipients: EmailAddressCollection = load_from_str(xml, "ToRecipients");
        assert_eq!(recipients.len(), 0);
    }
}
