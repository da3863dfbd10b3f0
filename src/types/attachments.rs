/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::{
    property::{CollectionSchema, ComplexPropertyCollection},
    xml::{xml_value_enum, EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlValue},
    ComplexProperty, Error, ExchangeServerVersion, PropertyCore, Shared, ValidationError,
};

/// Servers send attachment timestamps without an offset; they are in UTC.
const UNZONED_DATE_TIME: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

xml_value_enum! {
    /// The kind of an attachment, named after the element it is sent as.
    pub enum AttachmentKind {
        /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/fileattachment>
        File => "FileAttachment",

        /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/itemattachment>
        Item => "ItemAttachment",
    }
}

/// An attachment of an item.
///
/// The content of file attachments is held decoded. The item embedded in an
/// item attachment isn't modelled and is skipped when reading.
#[derive(Clone, Debug)]
pub struct Attachment {
    core: PropertyCore,
    kind: AttachmentKind,

    /// Assigned by the server once the attachment is created.
    id: Option<String>,
    name: Option<String>,
    content_type: Option<String>,
    content_id: Option<String>,
    content_location: Option<String>,

    /// Read-only, in bytes.
    size: Option<u32>,
    last_modified_time: Option<OffsetDateTime>,
    is_inline: Option<bool>,
    is_contact_photo: Option<bool>,
    content: Option<Vec<u8>>,
}

impl Attachment {
    pub fn new(kind: AttachmentKind) -> Self {
        Self {
            core: PropertyCore::default(),
            kind,
            id: None,
            name: None,
            content_type: None,
            content_id: None,
            content_location: None,
            size: None,
            last_modified_time: None,
            is_inline: None,
            is_contact_photo: None,
            content: None,
        }
    }

    pub fn file(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: Some(name.into()),
            content: Some(content),
            ..Self::new(AttachmentKind::File)
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether the attachment has yet to be created on the server.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.core.set_field(&mut self.name, name);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.core.set_field(&mut self.content_type, content_type);
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn set_content_id(&mut self, content_id: Option<String>) {
        self.core.set_field(&mut self.content_id, content_id);
    }

    pub fn content_location(&self) -> Option<&str> {
        self.content_location.as_deref()
    }

    pub fn set_content_location(&mut self, content_location: Option<String>) {
        self.core.set_field(&mut self.content_location, content_location);
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    pub fn last_modified_time(&self) -> Option<OffsetDateTime> {
        self.last_modified_time
    }

    pub fn is_inline(&self) -> bool {
        self.is_inline.unwrap_or(false)
    }

    pub fn set_is_inline(&mut self, is_inline: bool) {
        self.core.set_field(&mut self.is_inline, Some(is_inline));
    }

    pub fn is_contact_photo(&self) -> bool {
        self.is_contact_photo.unwrap_or(false)
    }

    pub fn set_is_contact_photo(&mut self, is_contact_photo: bool) {
        self.core.set_field(&mut self.is_contact_photo, Some(is_contact_photo));
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub fn set_content(&mut self, content: Option<Vec<u8>>) {
        self.core.set_field(&mut self.content, content);
    }
}

fn parse_last_modified_time(value: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_xml_str(value).or_else(|err| {
        PrimitiveDateTime::parse(value.trim(), UNZONED_DATE_TIME)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|_| err)
    })
}

impl ComplexProperty for Attachment {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "AttachmentId" => {
                self.id = reader.read_attribute_value("Id")?;
                reader.skip_current_element()?;
            }
            "Name" => self.name = Some(reader.read_element_value()?),
            "ContentType" => self.content_type = Some(reader.read_element_value()?),
            "ContentId" => self.content_id = Some(reader.read_element_value()?),
            "ContentLocation" => self.content_location = Some(reader.read_element_value()?),
            "Size" => self.size = Some(reader.read_element_value()?),
            "LastModifiedTime" => {
                let value: String = reader.read_element_value()?;
                self.last_modified_time = Some(parse_last_modified_time(&value)?);
            }
            "IsInline" => self.is_inline = Some(reader.read_element_value()?),
            "IsContactPhoto" => self.is_contact_photo = Some(reader.read_element_value()?),
            "Content" => self.content = Some(reader.read_base64_element_value()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    /// A create response only carries the id of the new attachment.
    fn try_read_element_from_xml_to_patch(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool, Error> {
        if reader.local_name() != "AttachmentId" {
            return Ok(false);
        }

        self.id = reader.read_attribute_value("Id")?;
        reader.skip_current_element()?;

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "Name", self.name.as_ref())?;
        writer.write_optional_element_value(
            XmlNamespace::Types,
            "ContentType",
            self.content_type.as_ref(),
        )?;
        writer.write_optional_element_value(XmlNamespace::Types, "ContentId", self.content_id.as_ref())?;
        writer.write_optional_element_value(
            XmlNamespace::Types,
            "ContentLocation",
            self.content_location.as_ref(),
        )?;

        let supports_flags = writer.server_version() >= ExchangeServerVersion::Exchange2010;
        if supports_flags {
            writer.write_optional_element_value(XmlNamespace::Types, "IsInline", self.is_inline.as_ref())?;
        }

        if self.kind == AttachmentKind::File {
            if supports_flags {
                writer.write_optional_element_value(
                    XmlNamespace::Types,
                    "IsContactPhoto",
                    self.is_contact_photo.as_ref(),
                )?;
            }

            if let Some(content) = &self.content {
                writer.write_base64_element_value(XmlNamespace::Types, "Content", content)?;
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AttachmentSchema;

impl CollectionSchema for AttachmentSchema {
    type Item = Attachment;

    fn create_complex_property(&self, xml_element_name: &str) -> Option<Attachment> {
        AttachmentKind::from_xml_str(xml_element_name)
            .ok()
            .map(Attachment::new)
    }

    fn collection_item_xml_element_name(&self, item: &Attachment) -> &'static str {
        item.kind.as_str()
    }

    fn validate(&self, items: &[Shared<Attachment>]) -> Result<(), Error> {
        let contact_photos = items
            .iter()
            .filter(|item| item.borrow().is_contact_photo())
            .count();
        if contact_photos > 1 {
            return Err(ValidationError::MultipleContactPhotos.into());
        }

        items.iter().try_for_each(|item| item.borrow().validate())
    }
}

/// The attachments of an item.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/attachments-ex15websvcsotherref>
pub type AttachmentCollection = ComplexPropertyCollection<AttachmentSchema>;

impl ComplexPropertyCollection<AttachmentSchema> {
    pub fn add_file_attachment(&mut self, name: impl Into<String>, content: Vec<u8>) -> Shared<Attachment> {
        self.add_new(Attachment::file(name, content))
    }

    /// Attachments added since the last save which the server hasn't created
    /// yet.
    pub fn pending_creations(&self) -> Vec<Shared<Attachment>> {
        self.added_items()
            .into_iter()
            .filter(|attachment| attachment.borrow().is_new())
            .collect()
    }

    /// Forgets the pending changes of the attachments the server accepted,
    /// leaving any others pending for a retry.
    pub fn complete_created(&mut self, created: &[Shared<Attachment>]) {
        for attachment in created {
            self.remove_from_change_log(attachment);
        }

        if self.has_changes() {
            log::warn!(
                "{} attachments were not created and remain pending",
                self.added_items().len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use time::macros::datetime;

    use super::*;
    use crate::test_utils::{assert_serialized_content, load_from_str, serialize_for_version};

    const ATTACHMENTS: &str = concat!(
        r#"<t:Attachments>"#,
        r#"<t:FileAttachment><t:AttachmentId Id="AAMk1"/><t:Name>notes.txt</t:Name>"#,
        r#"<t:ContentType>text/plain</t:ContentType><t:Size>5</t:Size>"#,
        r#"<t:LastModifiedTime>2024-03-01T10:30:00</t:LastModifiedTime>"#,
        r#"<t:IsInline>false</t:IsInline><t:IsContactPhoto>false</t:IsContactPhoto>"#,
        r#"<t:Content>aGVsbG8=</t:Content></t:FileAttachment>"#,
        r#"<t:ItemAttachment><t:AttachmentId Id="AAMk2"/><t:Name>Forwarded</t:Name>"#,
        r#"<t:Message><t:Subject>Hi</t:Subject></t:Message></t:ItemAttachment>"#,
        r#"</t:Attachments>"#
    );

    #[test]
    fn attachments_load_every_field() {
        let attachments: AttachmentCollection = load_from_str(ATTACHMENTS, "Attachments");
        assert_eq!(attachments.len(), 2);
        assert!(!attachments.has_changes());

        let file = attachments.get(0).unwrap().borrow();
        assert_eq!(file.kind(), AttachmentKind::File);
        assert_eq!(file.id(), Some("AAMk1"));
        assert_eq!(file.size(), Some(5));
        assert_eq!(file.last_modified_time(), Some(datetime!(2024-03-01 10:30:00 UTC)));
        assert_eq!(file.content(), Some(&b"hello"[..]));

        let item = attachments.get(1).unwrap().borrow();
        assert_eq!(item.kind(), AttachmentKind::Item);
        assert_eq!(item.name(), Some("Forwarded"));
    }

    #[test]
    fn new_file_attachments_write_their_content() {
        let mut attachments = AttachmentCollection::default();
        let attachment = attachments.add_file_attachment("notes.txt", b"hello".to_vec());
        attachment.borrow_mut().set_content_type(Some("text/plain".to_owned()));
        attachment.borrow_mut().set_is_inline(false);

        assert_serialized_content(
            &attachments,
            "Attachments",
            concat!(
                r#"<t:Attachments><t:FileAttachment><t:Name>notes.txt</t:Name>"#,
                r#"<t:ContentType>text/plain</t:ContentType><t:IsInline>false</t:IsInline>"#,
                r#"<t:Content>aGVsbG8=</t:Content></t:FileAttachment></t:Attachments>"#
            ),
        );
    }

    #[test]
    fn exchange_2007_gets_no_attachment_flags() {
        let mut attachments = AttachmentCollection::default();
        let attachment = attachments.add_file_attachment("me.jpg", vec![0xff, 0xd8]);
        attachment.borrow_mut().set_is_contact_photo(true);
        attachment.borrow_mut().set_is_inline(true);

        let actual = serialize_for_version(ExchangeServerVersion::Exchange2007_SP1, |writer| {
            attachments.write_to_xml(writer, "Attachments")
        });
        assert_eq!(
            actual,
            concat!(
                r#"<t:Attachments><t:FileAttachment><t:Name>me.jpg</t:Name>"#,
                r#"<t:Content>/9g=</t:Content></t:FileAttachment></t:Attachments>"#
            )
        );
    }

    #[test]
    fn create_responses_only_patch_ids() {
        let mut attachments = AttachmentCollection::default();
        let first = attachments.add_file_attachment("a.txt", b"a".to_vec());
        let second = attachments.add_file_attachment("b.txt", b"b".to_vec());

        let response = concat!(
            r#"<t:Attachments>"#,
            r#"<t:FileAttachment><t:AttachmentId Id="AAMk1"/><t:Name>ignored</t:Name></t:FileAttachment>"#,
            r#"<t:FileAttachment><t:AttachmentId Id="AAMk2"/></t:FileAttachment>"#,
            r#"</t:Attachments>"#
        );
        let mut reader = EwsXmlReader::new(response.as_bytes());
        reader.read().unwrap();
        attachments.update_from_xml(&mut reader, "Attachments").unwrap();

        assert_eq!(first.borrow().id(), Some("AAMk1"));
        assert_eq!(first.borrow().name(), Some("a.txt"));
        assert_eq!(first.borrow().content(), Some(&b"a"[..]));
        assert_eq!(second.borrow().id(), Some("AAMk2"));
        assert!(attachments.pending_creations().is_empty());
    }

    #[test]
    fn partially_created_attachments_stay_pending() {
        let mut attachments = AttachmentCollection::default();
        let created = attachments.add_file_attachment("a.txt", b"a".to_vec());
        let failed = attachments.add_file_attachment("b.txt", b"b".to_vec());

        attachments.complete_created(&[created]);

        let pending = attachments.added_items();
        assert_eq!(pending.len(), 1);
        assert!(Rc::ptr_eq(&pending[0], &failed));
        assert_eq!(attachments.len(), 2);
    }

    #[test]
    fn only_one_contact_photo_is_allowed() {
        let mut attachments = AttachmentCollection::default();
        attachments
            .add_file_attachment("me.jpg", vec![1])
            .borrow_mut()
            .set_is_contact_photo(true);
        let second = attachments.add_file_attachment("me-too.jpg", vec![2]);
        assert!(attachments.validate().is_ok());

        second.borrow_mut().set_is_contact_photo(true);
        assert!(matches!(
            attachments.validate(),
            Err(Error::Validation(ValidationError::MultipleContactPhotos))
        ));
    }

    #[test]
    fn item_attachments_are_told_apart_on_update() {
        let mut attachments: AttachmentCollection = load_from_str(ATTACHMENTS, "Attachments");

        let response = concat!(
            r#"<t:Attachments><t:ItemAttachment><t:AttachmentId Id="X"/></t:ItemAttachment>"#,
            r#"</t:Attachments>"#
        );
        let mut reader = EwsXmlReader::new(response.as_bytes());
        reader.read().unwrap();

        assert!(matches!(
            attachments.update_from_xml(&mut reader, "Attachments"),
            Err(Error::PropertyTypeIncompatible { .. })
        ));
    }
}
