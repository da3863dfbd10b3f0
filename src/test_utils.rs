/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use quick_xml::de::Deserializer;
use serde::Deserialize;

use crate::{
    xml::{EwsXmlReader, EwsXmlWriter},
    ComplexProperty, Error, ExchangeServerVersion,
};

/// Run `write` against a fresh writer and return what it produced.
pub fn serialize_with<F>(write: F) -> String
where
    F: FnOnce(&mut EwsXmlWriter<Vec<u8>>) -> Result<(), Error>,
{
    serialize_for_version(ExchangeServerVersion::default(), write)
}

/// Like [`serialize_with`], for a writer targeting a specific server version.
pub fn serialize_for_version<F>(version: ExchangeServerVersion, write: F) -> String
where
    F: FnOnce(&mut EwsXmlWriter<Vec<u8>>) -> Result<(), Error>,
{
    let mut writer = EwsXmlWriter::new(Vec::new()).with_server_version(version);
    write(&mut writer).unwrap();

    let buf = writer.into_inner().unwrap();
    String::from_utf8(buf).unwrap()
}

/// Assert the expected result of XML serialization.
pub fn assert_serialized_content<T: ComplexProperty>(
    data: &T,
    root_tag_name: &str,
    expected_xml_content: &str,
) {
    let actual_xml_content = serialize_with(|writer| data.write_to_xml(writer, root_tag_name));

    assert_eq!(actual_xml_content, expected_xml_content);
}

/// Load a property from a document whose root is `root_tag_name`.
pub fn load_from_str<T: ComplexProperty + Default>(content: &str, root_tag_name: &str) -> T {
    let mut property = T::default();
    load_into(&mut property, content, root_tag_name);

    property
}

/// Load an existing property from a document whose root is `root_tag_name`.
pub fn load_into<T: ComplexProperty>(property: &mut T, content: &str, root_tag_name: &str) {
    let mut reader = EwsXmlReader::new(content.as_bytes());
    reader.read().unwrap();
    property.load_from_xml(&mut reader, root_tag_name).unwrap();
}

/// Assert the expected result of XML deserialization.
pub fn assert_deserialized_content<T>(content: &str, expected: T)
where
    T: for<'a> Deserialize<'a> + PartialEq + std::fmt::Debug,
{
    let mut deserializer = Deserializer::from_reader(content.as_bytes());
    let deserialized_data: T = serde_path_to_error::deserialize(&mut deserializer).unwrap();
    assert_eq!(deserialized_data, expected);
}
