/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{collections::HashMap, io::Write, sync::LazyLock};

use crate::{
    property::{CollectionSchema, ComplexPropertyCollection},
    update::{schema::FOLDER_PERMISSION_SET, ServiceObject},
    xml::{xml_value_enum, EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNodeType},
    ComplexProperty, Error, PropertyCore, Shared, ValidationError,
};

xml_value_enum! {
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/distinguisheduser>
    pub enum StandardUser {
        Default => "Default",
        Anonymous => "Anonymous",
    }
}

/// The user a permission applies to.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/userid>
#[derive(Clone, Debug, Default)]
pub struct UserId {
    core: PropertyCore,
    sid: Option<String>,
    primary_smtp_address: Option<String>,
    display_name: Option<String>,
    standard_user: Option<StandardUser>,
}

impl UserId {
    pub fn from_smtp_address(address: impl Into<String>) -> Self {
        Self {
            primary_smtp_address: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn from_sid(sid: impl Into<String>) -> Self {
        Self {
            sid: Some(sid.into()),
            ..Default::default()
        }
    }

    pub fn standard(user: StandardUser) -> Self {
        Self {
            standard_user: Some(user),
            ..Default::default()
        }
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn set_sid(&mut self, sid: Option<String>) {
        self.core.set_field(&mut self.sid, sid);
    }

    pub fn primary_smtp_address(&self) -> Option<&str> {
        self.primary_smtp_address.as_deref()
    }

    pub fn set_primary_smtp_address(&mut self, address: Option<String>) {
        self.core.set_field(&mut self.primary_smtp_address, address);
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, display_name: Option<String>) {
        self.core.set_field(&mut self.display_name, display_name);
    }

    pub fn standard_user(&self) -> Option<StandardUser> {
        self.standard_user
    }

    pub fn set_standard_user(&mut self, user: Option<StandardUser>) {
        self.core.set_field(&mut self.standard_user, user);
    }

    /// Whether the id names a user at all. The display name alone doesn't.
    pub fn is_valid(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|value| !value.is_empty());

        self.standard_user.is_some() || present(&self.sid) || present(&self.primary_smtp_address)
    }
}

impl ComplexProperty for UserId {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "SID" => self.sid = Some(reader.read_element_value()?),
            "PrimarySmtpAddress" => self.primary_smtp_address = Some(reader.read_element_value()?),
            "DisplayName" => self.display_name = Some(reader.read_element_value()?),
            "DistinguishedUser" => self.standard_user = Some(reader.read_element_value()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "SID", self.sid.as_ref())?;
        writer.write_optional_element_value(
            XmlNamespace::Types,
            "PrimarySmtpAddress",
            self.primary_smtp_address.as_ref(),
        )?;
        writer.write_optional_element_value(
            XmlNamespace::Types,
            "DisplayName",
            self.display_name.as_ref(),
        )?;
        writer.write_optional_element_value(
            XmlNamespace::Types,
            "DistinguishedUser",
            self.standard_user.as_ref(),
        )
    }
}

xml_value_enum! {
    /// A named bundle of folder rights.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/permissionlevel>
    pub enum FolderPermissionLevel {
        None => "None",
        Owner => "Owner",
        PublishingEditor => "PublishingEditor",
        Editor => "Editor",
        PublishingAuthor => "PublishingAuthor",
        Author => "Author",
        NoneditingAuthor => "NoneditingAuthor",
        Reviewer => "Reviewer",
        Contributor => "Contributor",

        /// Only valid on calendar folders.
        FreeBusyTimeOnly => "FreeBusyTimeOnly",

        /// Only valid on calendar folders.
        FreeBusyTimeAndSubjectAndLocation => "FreeBusyTimeAndSubjectAndLocation",

        /// Rights which don't match any other level.
        Custom => "Custom",
    }
}

xml_value_enum! {
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/readitems>
    pub enum FolderPermissionReadAccess {
        None => "None",

        /// Only valid on calendar folders.
        TimeOnly => "TimeOnly",

        /// Only valid on calendar folders.
        TimeAndSubjectAndLocation => "TimeAndSubjectAndLocation",

        FullDetails => "FullDetails",
    }
}

xml_value_enum! {
    /// Which items an edit or delete right applies to.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/edititems>
    pub enum PermissionScope {
        None => "None",
        Owned => "Owned",
        All => "All",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PermissionRights {
    can_create_items: bool,
    can_create_subfolders: bool,
    is_folder_owner: bool,
    is_folder_visible: bool,
    is_folder_contact: bool,
    edit_items: PermissionScope,
    delete_items: PermissionScope,
    read_items: FolderPermissionReadAccess,
}

impl PermissionRights {
    const NONE: PermissionRights = PermissionRights {
        can_create_items: false,
        can_create_subfolders: false,
        is_folder_owner: false,
        is_folder_visible: false,
        is_folder_contact: false,
        edit_items: PermissionScope::None,
        delete_items: PermissionScope::None,
        read_items: FolderPermissionReadAccess::None,
    };

    const fn visible(
        can_create_items: bool,
        can_create_subfolders: bool,
        edit_items: PermissionScope,
        delete_items: PermissionScope,
        read_items: FolderPermissionReadAccess,
    ) -> Self {
        PermissionRights {
            can_create_items,
            can_create_subfolders,
            is_folder_visible: true,
            edit_items,
            delete_items,
            read_items,
            ..Self::NONE
        }
    }
}

/// The rights granted by every level except `Custom`.
static DEFAULT_PERMISSIONS: LazyLock<HashMap<FolderPermissionLevel, PermissionRights>> =
    LazyLock::new(|| {
        use FolderPermissionReadAccess as Read;
        use PermissionScope as Scope;

        HashMap::from([
            (FolderPermissionLevel::None, PermissionRights::NONE),
            (
                FolderPermissionLevel::Contributor,
                PermissionRights::visible(true, false, Scope::None, Scope::None, Read::None),
            ),
            (
                FolderPermissionLevel::Reviewer,
                PermissionRights::visible(false, false, Scope::None, Scope::None, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::NoneditingAuthor,
                PermissionRights::visible(true, false, Scope::None, Scope::Owned, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::Author,
                PermissionRights::visible(true, false, Scope::Owned, Scope::Owned, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::PublishingAuthor,
                PermissionRights::visible(true, true, Scope::Owned, Scope::Owned, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::Editor,
                PermissionRights::visible(true, false, Scope::All, Scope::All, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::PublishingEditor,
                PermissionRights::visible(true, true, Scope::All, Scope::All, Read::FullDetails),
            ),
            (
                FolderPermissionLevel::Owner,
                PermissionRights {
                    is_folder_owner: true,
                    is_folder_contact: true,
                    ..PermissionRights::visible(true, true, Scope::All, Scope::All, Read::FullDetails)
                },
            ),
            (
                FolderPermissionLevel::FreeBusyTimeOnly,
                PermissionRights {
                    read_items: Read::TimeOnly,
                    ..PermissionRights::NONE
                },
            ),
            (
                FolderPermissionLevel::FreeBusyTimeAndSubjectAndLocation,
                PermissionRights {
                    read_items: Read::TimeAndSubjectAndLocation,
                    ..PermissionRights::NONE
                },
            ),
        ])
    });

/// The rights of one user on a folder.
///
/// Rights are kept consistent with the permission level: choosing a level
/// applies its rights, and editing a right moves the permission to whichever
/// level now matches, or to [`FolderPermissionLevel::Custom`].
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/permission>
#[derive(Clone, Debug)]
pub struct FolderPermission {
    core: PropertyCore,
    user_id: Option<UserId>,
    level: FolderPermissionLevel,
    rights: PermissionRights,
}

impl FolderPermission {
    pub fn new(user_id: UserId, level: FolderPermissionLevel) -> Result<Self, Error> {
        let mut permission = Self {
            user_id: Some(user_id),
            ..Default::default()
        };
        permission.apply_level(level)?;

        Ok(permission)
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn set_user_id(&mut self, user_id: UserId) {
        self.core.set_field_unchecked(&mut self.user_id, Some(user_id));
    }

    pub fn permission_level(&self) -> FolderPermissionLevel {
        self.level
    }

    /// Applies the rights of `level`. `Custom` can't be chosen directly, it
    /// results from editing individual rights.
    pub fn set_permission_level(&mut self, level: FolderPermissionLevel) -> Result<(), Error> {
        if level == self.level {
            return Ok(());
        }

        self.apply_level(level)?;
        self.changed();

        Ok(())
    }

    pub fn can_create_items(&self) -> bool {
        self.rights.can_create_items
    }

    pub fn set_can_create_items(&mut self, value: bool) {
        self.update_rights(|rights| rights.can_create_items = value);
    }

    pub fn can_create_subfolders(&self) -> bool {
        self.rights.can_create_subfolders
    }

    pub fn set_can_create_subfolders(&mut self, value: bool) {
        self.update_rights(|rights| rights.can_create_subfolders = value);
    }

    pub fn is_folder_owner(&self) -> bool {
        self.rights.is_folder_owner
    }

    pub fn set_is_folder_owner(&mut self, value: bool) {
        self.update_rights(|rights| rights.is_folder_owner = value);
    }

    pub fn is_folder_visible(&self) -> bool {
        self.rights.is_folder_visible
    }

    pub fn set_is_folder_visible(&mut self, value: bool) {
        self.update_rights(|rights| rights.is_folder_visible = value);
    }

    pub fn is_folder_contact(&self) -> bool {
        self.rights.is_folder_contact
    }

    pub fn set_is_folder_contact(&mut self, value: bool) {
        self.update_rights(|rights| rights.is_folder_contact = value);
    }

    pub fn edit_items(&self) -> PermissionScope {
        self.rights.edit_items
    }

    pub fn set_edit_items(&mut self, scope: PermissionScope) {
        self.update_rights(|rights| rights.edit_items = scope);
    }

    pub fn delete_items(&self) -> PermissionScope {
        self.rights.delete_items
    }

    pub fn set_delete_items(&mut self, scope: PermissionScope) {
        self.update_rights(|rights| rights.delete_items = scope);
    }

    pub fn read_items(&self) -> FolderPermissionReadAccess {
        self.rights.read_items
    }

    pub fn set_read_items(&mut self, access: FolderPermissionReadAccess) {
        self.update_rights(|rights| rights.read_items = access);
    }

    /// Checks the permission can be sent as the `index`-th permission of a
    /// folder.
    pub fn validate_for_folder(&self, is_calendar_folder: bool, index: usize) -> Result<(), Error> {
        if !self.user_id.as_ref().is_some_and(UserId::is_valid) {
            return Err(ValidationError::InvalidUserId(index).into());
        }

        if is_calendar_folder {
            return Ok(());
        }

        if matches!(
            self.level,
            FolderPermissionLevel::FreeBusyTimeOnly
                | FolderPermissionLevel::FreeBusyTimeAndSubjectAndLocation
        ) {
            return Err(ValidationError::PermissionLevelInvalidForNonCalendarFolder {
                index,
                level: self.level.to_string(),
            }
            .into());
        }

        if matches!(
            self.rights.read_items,
            FolderPermissionReadAccess::TimeOnly
                | FolderPermissionReadAccess::TimeAndSubjectAndLocation
        ) {
            return Err(ValidationError::ReadAccessInvalidForNonCalendarFolder {
                index,
                access: self.rights.read_items.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Writes the permission's elements, naming the level element after the
    /// kind of folder it is sent for.
    pub fn write_elements_for_folder<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        is_calendar_folder: bool,
    ) -> Result<(), Error> {
        if let Some(user_id) = &self.user_id {
            user_id.write_to_xml(writer, "UserId")?;
        }

        // Servers derive the rights from any level but `Custom`.
        if self.level == FolderPermissionLevel::Custom {
            let rights = &self.rights;
            writer.write_element_value(XmlNamespace::Types, "CanCreateItems", &rights.can_create_items)?;
            writer.write_element_value(
                XmlNamespace::Types,
                "CanCreateSubFolders",
                &rights.can_create_subfolders,
            )?;
            writer.write_element_value(XmlNamespace::Types, "IsFolderOwner", &rights.is_folder_owner)?;
            writer.write_element_value(XmlNamespace::Types, "IsFolderVisible", &rights.is_folder_visible)?;
            writer.write_element_value(XmlNamespace::Types, "IsFolderContact", &rights.is_folder_contact)?;
            writer.write_element_value(XmlNamespace::Types, "EditItems", &rights.edit_items)?;
            writer.write_element_value(XmlNamespace::Types, "DeleteItems", &rights.delete_items)?;
            writer.write_element_value(XmlNamespace::Types, "ReadItems", &rights.read_items)?;
        }

        let level_element = if is_calendar_folder {
            "CalendarPermissionLevel"
        } else {
            "PermissionLevel"
        };
        writer.write_element_value(XmlNamespace::Types, level_element, &self.level)
    }

    fn apply_level(&mut self, level: FolderPermissionLevel) -> Result<(), Error> {
        let rights = DEFAULT_PERMISSIONS
            .get(&level)
            .copied()
            .ok_or(ValidationError::CustomPermissionLevel)?;

        self.level = level;
        self.rights = rights;

        Ok(())
    }

    fn update_rights(&mut self, update: impl FnOnce(&mut PermissionRights)) {
        let mut rights = self.rights;
        update(&mut rights);
        if rights == self.rights {
            return;
        }

        self.rights = rights;
        self.level = DEFAULT_PERMISSIONS
            .iter()
            .find_map(|(&level, defaults)| (*defaults == rights).then_some(level))
            .unwrap_or(FolderPermissionLevel::Custom);
        self.changed();
    }
}

impl Default for FolderPermission {
    fn default() -> Self {
        Self {
            core: PropertyCore::default(),
            user_id: None,
            level: FolderPermissionLevel::None,
            rights: PermissionRights::NONE,
        }
    }
}

impl ComplexProperty for FolderPermission {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "UserId" => {
                let mut user_id = UserId::default();
                user_id.load_from_xml(reader, "UserId")?;
                self.user_id = Some(user_id);
            }
            "CanCreateItems" => self.rights.can_create_items = reader.read_element_value()?,
            "CanCreateSubFolders" => self.rights.can_create_subfolders = reader.read_element_value()?,
            "IsFolderOwner" => self.rights.is_folder_owner = reader.read_element_value()?,
            "IsFolderVisible" => self.rights.is_folder_visible = reader.read_element_value()?,
            "IsFolderContact" => self.rights.is_folder_contact = reader.read_element_value()?,
            "EditItems" => self.rights.edit_items = reader.read_element_value()?,
            "DeleteItems" => self.rights.delete_items = reader.read_element_value()?,
            "ReadItems" => self.rights.read_items = reader.read_element_value()?,
            "PermissionLevel" | "CalendarPermissionLevel" => self.level = reader.read_element_value()?,
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        self.write_elements_for_folder(writer, false)
    }

    fn validate(&self) -> Result<(), Error> {
        self.validate_for_folder(false, 0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FolderPermissionSchema {
    pub is_calendar_folder: bool,
}

impl FolderPermissionSchema {
    /// The element the permissions are listed in inside a `PermissionSet`.
    pub fn permissions_xml_element_name(&self) -> &'static str {
        if self.is_calendar_folder {
            "CalendarPermissions"
        } else {
            "Permissions"
        }
    }
}

impl CollectionSchema for FolderPermissionSchema {
    type Item = FolderPermission;

    fn create_complex_property(&self, xml_element_name: &str) -> Option<FolderPermission> {
        matches!(xml_element_name, "Permission" | "CalendarPermission").then(FolderPermission::default)
    }

    fn collection_item_xml_element_name(&self, _item: &FolderPermission) -> &'static str {
        if self.is_calendar_folder {
            "CalendarPermission"
        } else {
            "Permission"
        }
    }

    /// Permission sets are always replaced whole, so an empty one revokes
    /// every permission.
    fn should_write_when_empty(&self) -> bool {
        true
    }

    fn write_item_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        item: &FolderPermission,
    ) -> Result<(), Error> {
        writer.write_start_element(item.namespace(), self.collection_item_xml_element_name(item))?;
        item.write_elements_for_folder(writer, self.is_calendar_folder)?;
        writer.write_end_element()
    }

    fn validate(&self, items: &[Shared<FolderPermission>]) -> Result<(), Error> {
        items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| item.borrow().validate_for_folder(self.is_calendar_folder, index))
    }
}

/// The permissions of a folder.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/permissionset-permissionsettype>
pub type FolderPermissionCollection = ComplexPropertyCollection<FolderPermissionSchema>;

impl ComplexPropertyCollection<FolderPermissionSchema> {
    pub fn for_folder(is_calendar_folder: bool) -> Self {
        Self::new(FolderPermissionSchema { is_calendar_folder })
    }

    /// Reads the permissions out of the `PermissionSet` element the reader is
    /// positioned on, ignoring the unresolvable entries listed beside them.
    pub fn load_permission_set_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<(), Error> {
        let set_name = FOLDER_PERMISSION_SET.xml_element_name();
        let permissions_name = self.schema().permissions_xml_element_name();

        reader.ensure_current_node_is_start_element(XmlNamespace::Types, set_name)?;
        if reader.is_empty_element() {
            return reader.read();
        }

        loop {
            reader.read()?;

            match reader.node_type() {
                XmlNodeType::StartElement if reader.local_name() == permissions_name => {
                    self.load_from_xml(reader, permissions_name)?;
                }
                XmlNodeType::StartElement => {
                    log::debug!(
                        "skipping element `{}` in `{set_name}`",
                        reader.local_name()
                    );
                    reader.skip_current_element()?;
                }
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {}
            }

            if reader.is_end_element(XmlNamespace::Types, set_name) {
                return Ok(());
            }
        }
    }

    /// Writes the permissions wrapped in a `PermissionSet` element.
    pub fn write_permission_set_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_start_element(XmlNamespace::Types, FOLDER_PERMISSION_SET.xml_element_name())?;
        self.write_to_xml(writer, self.schema().permissions_xml_element_name())?;
        writer.write_end_element()
    }

    /// Writes a single `SetFolderField` replacing the folder's whole
    /// permission set, or nothing if the permissions are unchanged.
    pub fn write_permission_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
    ) -> Result<(), Error> {
        if !self.has_changes() {
            return Ok(());
        }

        writer.write_start_element(XmlNamespace::Types, object.set_field_xml_element_name())?;
        FOLDER_PERMISSION_SET.write_to_xml(writer)?;
        writer.write_start_element(XmlNamespace::Types, object.xml_element_name())?;
        self.write_permission_set_to_xml(writer)?;
        writer.write_end_element()?;
        writer.write_end_element()
    }
}
