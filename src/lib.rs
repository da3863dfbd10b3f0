/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Change-tracked complex properties for Exchange Web Services.
//!
//! Properties are loaded from EWS XML without being marked dirty, record local
//! edits as they happen, and can then be written back either in full or as the
//! minimal set of `SetField`/`DeleteField` operations describing those edits.

use thiserror::Error;

pub mod property;
mod server_version;
pub mod types;
pub mod update;
pub mod xml;

#[cfg(test)]
mod test_utils;

pub use property::{
    can_set_field_value, ChangeListener, ChangeNotifier, ComplexProperty, PropertyCore, Shared,
};
pub use server_version::ExchangeServerVersion;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to deserialize structure from XML")]
    Deserialize(#[from] quick_xml::DeError),

    #[error("error manipulating XML data")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to write XML")]
    Io(#[from] std::io::Error),

    #[error("XML content is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid base64 content")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to parse date-time value")]
    ParseDateTime(#[from] time::error::Parse),

    #[error("failed to format date-time value")]
    FormatDateTime(#[from] time::error::Format),

    #[error("expected {expected}, found {found}")]
    UnexpectedElement { expected: String, found: String },

    #[error("unexpected end of XML document")]
    UnexpectedEndOfDocument,

    #[error("invalid value `{value}` for {type_name}")]
    InvalidValue {
        type_name: &'static str,
        value: String,
    },

    #[error("unknown Exchange server version `{0}`")]
    UnknownServerVersion(String),

    #[error("element `{found}` cannot update collection item of kind `{expected}`")]
    PropertyTypeIncompatible { expected: String, found: String },

    #[error("update refers to item {index}, but the collection holds {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("the item is already in the collection")]
    DuplicateItem,

    #[error("an entry with key `{0}` already exists")]
    DuplicateKey(String),

    #[error("XML writer misuse: {0}")]
    InvalidWriterState(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A property holds values the server would reject.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the start of the date range is after its end")]
    DateRangeStartAfterEnd,

    #[error("the minimum size {minimum} exceeds the maximum size {maximum}")]
    SizeRangeMinimumExceedsMaximum { minimum: u32, maximum: u32 },

    #[error("the permission level cannot be set to Custom directly")]
    CustomPermissionLevel,

    #[error("the permission at index {0} does not identify a user")]
    InvalidUserId(usize),

    #[error("read access `{access}` of the permission at index {index} is only valid for calendar folders")]
    ReadAccessInvalidForNonCalendarFolder { index: usize, access: String },

    #[error("permission level `{level}` of the permission at index {index} is only valid for calendar folders")]
    PermissionLevelInvalidForNonCalendarFolder { index: usize, level: String },

    #[error("an item can have at most one contact photo attachment")]
    MultipleContactPhotos,

    #[error("occurrence indices start at 1")]
    InvalidOccurrenceIndex,

    #[error("well-known folder `{folder}` requires {required} or later")]
    FolderNameNotSupported { folder: String, required: String },
}
