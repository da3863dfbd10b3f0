/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Reading and writing the XML dialect spoken by EWS.

mod namespace;
mod reader;
mod value;
mod writer;

pub use self::namespace::XmlNamespace;
pub use self::reader::{EwsXmlReader, XmlNodeType};
pub use self::value::XmlValue;
pub use self::writer::EwsXmlWriter;

pub(crate) use self::value::xml_value_enum;
