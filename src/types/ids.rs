/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{
    hash::{Hash, Hasher},
    io::Write,
    ops::Deref,
};

use serde::Deserialize;

use crate::{
    types::Mailbox,
    xml::{xml_value_enum, EwsXmlReader, EwsXmlWriter},
    ComplexProperty, Error, ExchangeServerVersion, PropertyCore, ValidationError,
};

/// The server-assigned identity of an EWS object.
///
/// Ids compare equal when they refer to the same object, regardless of which
/// version of it they were taken from; use
/// [`same_id_and_change_key`](Self::same_id_and_change_key) to also compare
/// versions. An id which hasn't been assigned yet is never equal to anything,
/// itself included.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServiceId {
    #[serde(skip)]
    core: PropertyCore,

    #[serde(rename = "@Id")]
    unique_id: Option<String>,

    /// Identifies a specific version of the object.
    #[serde(rename = "@ChangeKey")]
    change_key: Option<String>,
}

impl ServiceId {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: Some(unique_id.into()),
            ..Default::default()
        }
    }

    pub fn with_change_key(mut self, change_key: impl Into<String>) -> Self {
        self.change_key = Some(change_key.into());
        self
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn change_key(&self) -> Option<&str> {
        self.change_key.as_deref()
    }

    /// Whether the id has been assigned by the server.
    pub fn is_valid(&self) -> bool {
        self.unique_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Whether both ids refer to the same version of the same object.
    pub fn same_id_and_change_key(&self, other: &ServiceId) -> bool {
        self == other && self.change_key == other.change_key
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        self.is_valid() && other.is_valid() && self.unique_id == other.unique_id
    }
}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl ComplexProperty for ServiceId {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.unique_id = reader.read_attribute_value("Id")?;
        self.change_key = reader.read_attribute_value("ChangeKey")?;

        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_attribute_value("Id", self.unique_id.as_ref())?;
        writer.write_optional_attribute_value("ChangeKey", self.change_key.as_ref())
    }
}

/// The identifier of an item.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/itemid>
#[derive(Clone, Debug, Default, PartialEq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ItemId(ServiceId);

impl ItemId {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self(ServiceId::new(unique_id))
    }

    pub fn with_change_key(self, change_key: impl Into<String>) -> Self {
        Self(self.0.with_change_key(change_key))
    }

    pub fn xml_element_name(&self) -> &'static str {
        "ItemId"
    }
}

impl Deref for ItemId {
    type Target = ServiceId;

    fn deref(&self) -> &ServiceId {
        &self.0
    }
}

impl From<ServiceId> for ItemId {
    fn from(value: ServiceId) -> Self {
        Self(value)
    }
}

impl ComplexProperty for ItemId {
    fn core(&self) -> &PropertyCore {
        self.0.core()
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.0.read_attributes_from_xml(reader)
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        self.0.write_attributes_to_xml(writer)
    }
}

xml_value_enum! {
    /// The folders every mailbox has, addressable without knowing their ids.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/distinguishedfolderid>
    pub enum WellKnownFolderName {
        Calendar => "calendar",
        Contacts => "contacts",
        DeletedItems => "deleteditems",
        Drafts => "drafts",
        Inbox => "inbox",
        Journal => "journal",
        Notes => "notes",
        Outbox => "outbox",
        SentItems => "sentitems",
        Tasks => "tasks",
        MsgFolderRoot => "msgfolderroot",
        PublicFoldersRoot => "publicfoldersroot",
        Root => "root",
        JunkEmail => "junkemail",
        SearchFolders => "searchfolders",
        VoiceMail => "voicemail",
        RecoverableItemsRoot => "recoverableitemsroot",
        RecoverableItemsDeletions => "recoverableitemsdeletions",
        RecoverableItemsVersions => "recoverableitemsversions",
        RecoverableItemsPurges => "recoverableitemspurges",
        ArchiveRoot => "archiveroot",
        ArchiveMsgFolderRoot => "archivemsgfolderroot",
        ArchiveDeletedItems => "archivedeleteditems",
        ArchiveRecoverableItemsRoot => "archiverecoverableitemsroot",
        SyncIssues => "syncissues",
        Conflicts => "conflicts",
        LocalFailures => "localfailures",
        ServerFailures => "serverfailures",
        RecipientCache => "recipientcache",
        QuickContacts => "quickcontacts",
        ConversationHistory => "conversationhistory",
        ToDoSearch => "todosearch",
    }
}

impl WellKnownFolderName {
    /// The earliest server version which knows about this folder.
    pub fn required_server_version(self) -> ExchangeServerVersion {
        use WellKnownFolderName::*;

        match self {
            RecoverableItemsRoot
            | RecoverableItemsDeletions
            | RecoverableItemsVersions
            | RecoverableItemsPurges
            | ArchiveRoot
            | ArchiveMsgFolderRoot
            | ArchiveDeletedItems
            | ArchiveRecoverableItemsRoot => ExchangeServerVersion::Exchange2010_SP1,

            SyncIssues | Conflicts | LocalFailures | ServerFailures | RecipientCache
            | QuickContacts | ConversationHistory | ToDoSearch => {
                ExchangeServerVersion::Exchange2013
            }

            _ => ExchangeServerVersion::Exchange2007_SP1,
        }
    }
}

/// The identifier of a folder, either by id or as one of the well-known
/// folders of a mailbox.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/folderid>
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FolderId {
    #[serde(flatten)]
    id: ServiceId,

    #[serde(skip)]
    folder_name: Option<WellKnownFolderName>,

    /// The mailbox a well-known folder belongs to, if not the caller's own.
    #[serde(skip)]
    mailbox: Option<Mailbox>,
}

impl FolderId {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            id: ServiceId::new(unique_id),
            ..Default::default()
        }
    }

    pub fn well_known(folder_name: WellKnownFolderName) -> Self {
        Self {
            folder_name: Some(folder_name),
            ..Default::default()
        }
    }

    pub fn well_known_in_mailbox(folder_name: WellKnownFolderName, mailbox: Mailbox) -> Self {
        Self {
            folder_name: Some(folder_name),
            mailbox: Some(mailbox),
            ..Default::default()
        }
    }

    pub fn with_change_key(mut self, change_key: impl Into<String>) -> Self {
        self.id = self.id.with_change_key(change_key);
        self
    }

    pub fn folder_name(&self) -> Option<WellKnownFolderName> {
        self.folder_name
    }

    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    pub fn xml_element_name(&self) -> &'static str {
        if self.folder_name.is_some() {
            "DistinguishedFolderId"
        } else {
            "FolderId"
        }
    }

    pub fn is_valid(&self) -> bool {
        match self.folder_name {
            Some(_) => self.mailbox.as_ref().is_none_or(Mailbox::is_valid),
            None => self.id.is_valid(),
        }
    }

    /// Fails if this id names a well-known folder `version` doesn't support.
    pub fn validate_for_version(&self, version: ExchangeServerVersion) -> Result<(), Error> {
        match self.folder_name {
            Some(name) if name.required_server_version() > version => {
                Err(ValidationError::FolderNameNotSupported {
                    folder: name.as_str().to_owned(),
                    required: name.required_server_version().as_str().to_owned(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

impl Deref for FolderId {
    type Target = ServiceId;

    fn deref(&self) -> &ServiceId {
        &self.id
    }
}

impl PartialEq for FolderId {
    fn eq(&self, other: &Self) -> bool {
        match (self.folder_name, other.folder_name) {
            (Some(name), Some(other_name)) => name == other_name && self.mailbox == other.mailbox,
            (None, None) => self.id == other.id,
            _ => false,
        }
    }
}

impl Hash for FolderId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.folder_name {
            Some(name) => name.hash(state),
            None => self.id.hash(state),
        }
    }
}

impl ComplexProperty for FolderId {
    fn core(&self) -> &PropertyCore {
        self.id.core()
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        if reader.local_name() == "DistinguishedFolderId" {
            self.folder_name = reader.read_attribute_value("Id")?;
            return Ok(());
        }

        self.id.read_attributes_from_xml(reader)
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        if self.folder_name.is_none() || reader.local_name() != "Mailbox" {
            return Ok(false);
        }

        let mut mailbox = Mailbox::default();
        mailbox.load_from_xml(reader, "Mailbox")?;
        self.mailbox = Some(mailbox);

        Ok(true)
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        match self.folder_name {
            Some(name) => {
                self.validate_for_version(writer.server_version())?;
                writer.write_attribute("Id", name.as_str())
            }
            None => self.id.write_attributes_to_xml(writer),
        }
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        match (&self.folder_name, &self.mailbox) {
            (Some(_), Some(mailbox)) => mailbox.write_to_xml(writer, "Mailbox"),
            _ => Ok(()),
        }
    }
}

/// Addresses a single occurrence of a recurring series by its position.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/occurrenceitemid>
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OccurrenceItemId {
    #[serde(skip)]
    core: PropertyCore,

    #[serde(rename = "@RecurringMasterId")]
    recurring_master_id: String,

    #[serde(rename = "@ChangeKey")]
    change_key: Option<String>,

    /// The one-based position of the occurrence in the series.
    #[serde(rename = "@InstanceIndex")]
    instance_index: u32,
}

impl OccurrenceItemId {
    pub fn new(recurring_master_id: impl Into<String>, instance_index: u32) -> Self {
        Self {
            recurring_master_id: recurring_master_id.into(),
            instance_index,
            ..Default::default()
        }
    }

    pub fn recurring_master_id(&self) -> &str {
        &self.recurring_master_id
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    pub fn xml_element_name(&self) -> &'static str {
        "OccurrenceItemId"
    }
}

impl PartialEq for OccurrenceItemId {
    fn eq(&self, other: &Self) -> bool {
        !self.recurring_master_id.is_empty()
            && self.recurring_master_id == other.recurring_master_id
            && self.instance_index == other.instance_index
    }
}

impl Hash for OccurrenceItemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.recurring_master_id.hash(state);
        self.instance_index.hash(state);
    }
}

impl ComplexProperty for OccurrenceItemId {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.recurring_master_id = reader
            .read_attribute_value("RecurringMasterId")?
            .unwrap_or_default();
        self.change_key = reader.read_attribute_value("ChangeKey")?;
        self.instance_index = reader
            .read_attribute_value("InstanceIndex")?
            .unwrap_or_default();

        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_attribute("RecurringMasterId", &self.recurring_master_id)?;
        writer.write_optional_attribute_value("ChangeKey", self.change_key.as_ref())?;
        writer.write_attribute_value("InstanceIndex", &self.instance_index)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.instance_index == 0 {
            return Err(ValidationError::InvalidOccurrenceIndex.into());
        }

        Ok(())
    }
}

/// Addresses the recurring master of a series through one of its
/// occurrences.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/recurringmasteritemid>
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecurringMasterItemId {
    #[serde(skip)]
    core: PropertyCore,

    #[serde(rename = "@OccurrenceId")]
    occurrence_id: String,

    #[serde(rename = "@ChangeKey")]
    change_key: Option<String>,
}

impl RecurringMasterItemId {
    pub fn new(occurrence_id: impl Into<String>) -> Self {
        Self {
            occurrence_id: occurrence_id.into(),
            ..Default::default()
        }
    }

    pub fn occurrence_id(&self) -> &str {
        &self.occurrence_id
    }

    pub fn xml_element_name(&self) -> &'static str {
        "RecurringMasterItemId"
    }
}

impl PartialEq for RecurringMasterItemId {
    fn eq(&self, other: &Self) -> bool {
        !self.occurrence_id.is_empty() && self.occurrence_id == other.occurrence_id
    }
}

impl Hash for RecurringMasterItemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.occurrence_id.hash(state);
    }
}

impl ComplexProperty for RecurringMasterItemId {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        self.occurrence_id = reader
            .read_attribute_value("OccurrenceId")?
            .unwrap_or_default();
        self.change_key = reader.read_attribute_value("ChangeKey")?;

        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_attribute("OccurrenceId", &self.occurrence_id)?;
        writer.write_optional_attribute_value("ChangeKey", self.change_key.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::hash::DefaultHasher;

    use super::*;
    use crate::test_utils::{
        assert_deserialized_content, assert_serialized_content, load_from_str,
        serialize_for_version,
    };

    #[test]
    fn equality_ignores_change_key() {
        let a = ItemId::new("AAMkAd").with_change_key("CQAAAB");
        let b = ItemId::new("AAMkAd").with_change_key("CQAAAC");

        assert_eq!(a, b);
        assert!(!a.same_id_and_change_key(&b));
        assert!(a.same_id_and_change_key(&a.clone()));

        let hash_of = |id: &ItemId| {
            let mut hasher = DefaultHasher::new();
            id.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn ids_without_change_keys_match() {
        assert!(ItemId::new("AAMkAd").same_id_and_change_key(&ItemId::new("AAMkAd")));
        assert!(!ItemId::new("AAMkAd").same_id_and_change_key(&ItemId::new("AAMkAe")));

        // An absent change key differs from a present one.
        let versioned = ItemId::new("AAMkAd").with_change_key("CQAAAB");
        assert!(!ItemId::new("AAMkAd").same_id_and_change_key(&versioned));
    }

    #[test]
    fn unassigned_ids_never_compare_equal() {
        let unassigned = ItemId::default();
        assert_ne!(unassigned, unassigned.clone());
        assert!(!unassigned.is_valid());

        assert_ne!(ItemId::new(""), ItemId::new(""));
    }

    #[test]
    fn ids_round_trip_through_attributes() {
        let id: ItemId = load_from_str(r#"<t:ItemId Id="AAMkAd" ChangeKey="CQAAAB"/>"#, "ItemId");

        assert_eq!(id.unique_id(), Some("AAMkAd"));
        assert_eq!(id.change_key(), Some("CQAAAB"));
        assert_serialized_content(&id, id.xml_element_name(), r#"<t:ItemId Id="AAMkAd" ChangeKey="CQAAAB"/>"#);
    }

    #[test]
    fn ids_deserialize_with_serde() {
        assert_deserialized_content(
            r#"<ItemId Id="AAMkAd" ChangeKey="CQAAAB"/>"#,
            ItemId::new("AAMkAd").with_change_key("CQAAAB"),
        );
    }

    #[test]
    fn well_known_folders_use_distinguished_ids() {
        let inbox = FolderId::well_known(WellKnownFolderName::Inbox);
        assert_serialized_content(&inbox, inbox.xml_element_name(), r#"<t:DistinguishedFolderId Id="inbox"/>"#);

        let shared = FolderId::well_known_in_mailbox(
            WellKnownFolderName::Calendar,
            Mailbox::new("shared@example.com"),
        );
        assert_serialized_content(
            &shared,
            shared.xml_element_name(),
            concat!(
                r#"<t:DistinguishedFolderId Id="calendar">"#,
                r#"<t:Mailbox><t:EmailAddress>shared@example.com</t:EmailAddress></t:Mailbox>"#,
                r#"</t:DistinguishedFolderId>"#
            ),
        );

        let plain = FolderId::new("AQMkAD").with_change_key("AQAAAA");
        assert_serialized_content(&plain, plain.xml_element_name(), r#"<t:FolderId Id="AQMkAD" ChangeKey="AQAAAA"/>"#);
    }

    #[test]
    fn distinguished_folder_ids_load_their_folder_name() {
        let inbox: FolderId = load_from_str(r#"<t:DistinguishedFolderId Id="inbox"/>"#, "DistinguishedFolderId");
        assert_eq!(inbox.folder_name(), Some(WellKnownFolderName::Inbox));
        assert_eq!(inbox.unique_id(), None);
        assert_eq!(inbox, FolderId::well_known(WellKnownFolderName::Inbox));

        let xml = concat!(
            r#"<t:DistinguishedFolderId Id="calendar">"#,
            r#"<t:Mailbox><t:EmailAddress>shared@example.com</t:EmailAddress></t:Mailbox>"#,
            r#"</t:DistinguishedFolderId>"#
        );
        let shared: FolderId = load_from_str(xml, "DistinguishedFolderId");
        assert_eq!(shared.folder_name(), Some(WellKnownFolderName::Calendar));
        assert_eq!(
            shared.mailbox().and_then(|mailbox| mailbox.address()),
            Some("shared@example.com")
        );
        assert_serialized_content(&shared, shared.xml_element_name(), xml);

        let plain: FolderId = load_from_str(r#"<t:FolderId Id="AQMkAD" ChangeKey="AQAAAA"/>"#, "FolderId");
        assert_eq!(plain.folder_name(), None);
        assert_eq!(plain.unique_id(), Some("AQMkAD"));
    }

    #[test]
    fn folder_equality_depends_on_addressing_mode() {
        let inbox = FolderId::well_known(WellKnownFolderName::Inbox);
        assert_eq!(inbox, FolderId::well_known(WellKnownFolderName::Inbox));
        assert_ne!(inbox, FolderId::well_known(WellKnownFolderName::Drafts));
        assert_ne!(
            inbox,
            FolderId::well_known_in_mailbox(
                WellKnownFolderName::Inbox,
                Mailbox::new("other@example.com")
            )
        );
        assert_ne!(inbox, FolderId::new("inbox"));
        assert_eq!(FolderId::new("AQMkAD"), FolderId::new("AQMkAD").with_change_key("x"));
    }

    #[test]
    fn newer_well_known_folders_are_rejected_for_older_servers() {
        let archive = FolderId::well_known(WellKnownFolderName::ArchiveRoot);
        assert!(archive
            .validate_for_version(ExchangeServerVersion::Exchange2010_SP1)
            .is_ok());
        assert!(matches!(
            archive.validate_for_version(ExchangeServerVersion::Exchange2010),
            Err(Error::Validation(ValidationError::FolderNameNotSupported { .. }))
        ));

        let mut writer =
            EwsXmlWriter::new(Vec::new()).with_server_version(ExchangeServerVersion::Exchange2007_SP1);
        assert!(archive.write_to_xml(&mut writer, "DistinguishedFolderId").is_err());

        let inbox = FolderId::well_known(WellKnownFolderName::Inbox);
        let actual = serialize_for_version(ExchangeServerVersion::Exchange2007_SP1, |writer| {
            inbox.write_to_xml(writer, inbox.xml_element_name())
        });
        assert_eq!(actual, r#"<t:DistinguishedFolderId Id="inbox"/>"#);
    }

    #[test]
    fn occurrence_ids_address_by_position() {
        let occurrence = OccurrenceItemId::new("AAMkMaster", 3);
        assert_serialized_content(
            &occurrence,
            occurrence.xml_element_name(),
            r#"<t:OccurrenceItemId RecurringMasterId="AAMkMaster" InstanceIndex="3"/>"#,
        );
        assert_eq!(occurrence, OccurrenceItemId::new("AAMkMaster", 3));
        assert_ne!(occurrence, OccurrenceItemId::new("AAMkMaster", 4));

        assert!(matches!(
            OccurrenceItemId::new("AAMkMaster", 0).validate(),
            Err(Error::Validation(ValidationError::InvalidOccurrenceIndex))
        ));

        let loaded: OccurrenceItemId = load_from_str(
            r#"<t:OccurrenceItemId RecurringMasterId="AAMkMaster" ChangeKey="DwAA" InstanceIndex="2"/>"#,
            "OccurrenceItemId",
        );
        assert_eq!(loaded.instance_index(), 2);
        assert_eq!(loaded.recurring_master_id(), "AAMkMaster");
    }

    #[test]
    fn recurring_master_ids_address_through_an_occurrence() {
        let master = RecurringMasterItemId::new("AAMkOccurrence");
        assert_serialized_content(
            &master,
            master.xml_element_name(),
            r#"<t:RecurringMasterItemId OccurrenceId="AAMkOccurrence"/>"#,
        );
        assert_eq!(master, RecurringMasterItemId::new("AAMkOccurrence"));
        assert_ne!(RecurringMasterItemId::default(), RecurringMasterItemId::default());
    }
}
