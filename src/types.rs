/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! EWS property types built on the change-tracking containers.

pub mod attachments;
pub mod contacts;
pub mod ids;
pub mod mailbox;
pub mod permissions;
pub mod rules;

pub use self::attachments::{Attachment, AttachmentCollection, AttachmentKind, AttachmentSchema};
pub use self::contacts::{
    EmailAddressDictionary, EmailAddressEntry, EmailAddressKey, PhoneNumberDictionary,
    PhoneNumberEntry, PhoneNumberKey, PhysicalAddressDictionary, PhysicalAddressEntry,
    PhysicalAddressField, PhysicalAddressKey,
};
pub use self::ids::{
    FolderId, ItemId, OccurrenceItemId, RecurringMasterItemId, ServiceId, WellKnownFolderName,
};
pub use self::mailbox::{EmailAddress, EmailAddressCollection, Mailbox, MailboxType};
pub use self::permissions::{
    FolderPermission, FolderPermissionCollection, FolderPermissionLevel,
    FolderPermissionReadAccess, PermissionScope, StandardUser, UserId,
};
pub use self::rules::{DateRange, SizeRange};
