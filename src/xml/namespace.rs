/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

pub(crate) const MESSAGES_NS_URI: &str =
    "http://schemas.microsoft.com/exchange/services/2006/messages";
pub(crate) const SOAP_NS_URI: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub(crate) const TYPES_NS_URI: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
pub(crate) const ERRORS_NS_URI: &str =
    "http://schemas.microsoft.com/exchange/services/2006/errors";

/// The XML namespaces an EWS element can belong to.
///
/// Each namespace is written with a fixed prefix, matching the conventions
/// used throughout the EWS documentation (`t:` for types, `m:` for messages).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum XmlNamespace {
    /// No namespace; elements are written without a prefix.
    NotSpecified,

    /// The EWS types namespace.
    #[default]
    Types,

    /// The EWS messages namespace.
    Messages,

    /// The EWS errors namespace.
    Errors,

    /// The SOAP envelope namespace.
    Soap,
}

impl XmlNamespace {
    /// The prefix used when writing an element in this namespace.
    pub fn prefix(self) -> &'static str {
        match self {
            XmlNamespace::NotSpecified => "",
            XmlNamespace::Types => "t",
            XmlNamespace::Messages => "m",
            XmlNamespace::Errors => "e",
            XmlNamespace::Soap => "soap",
        }
    }

    /// The namespace URI.
    pub fn uri(self) -> &'static str {
        match self {
            XmlNamespace::NotSpecified => "",
            XmlNamespace::Types => TYPES_NS_URI,
            XmlNamespace::Messages => MESSAGES_NS_URI,
            XmlNamespace::Errors => ERRORS_NS_URI,
            XmlNamespace::Soap => SOAP_NS_URI,
        }
    }

    /// Looks up a namespace from its URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            TYPES_NS_URI => Some(XmlNamespace::Types),
            MESSAGES_NS_URI => Some(XmlNamespace::Messages),
            ERRORS_NS_URI => Some(XmlNamespace::Errors),
            SOAP_NS_URI => Some(XmlNamespace::Soap),
            _ => None,
        }
    }

    /// Looks up a namespace from the conventional prefix.
    ///
    /// Used when a document relies on prefixes without declaring them, as
    /// fragments produced by [`EwsXmlWriter`](super::EwsXmlWriter) do.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "" => Some(XmlNamespace::NotSpecified),
            "t" => Some(XmlNamespace::Types),
            "m" => Some(XmlNamespace::Messages),
            "e" => Some(XmlNamespace::Errors),
            "soap" | "s" => Some(XmlNamespace::Soap),
            _ => None,
        }
    }

    /// Builds the qualified name of an element in this namespace.
    pub fn qualify(self, local_name: &str) -> String {
        match self.prefix() {
            "" => local_name.to_owned(),
            prefix => format!("{prefix}:{local_name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_use_conventional_prefixes() {
        assert_eq!(XmlNamespace::Types.qualify("Mailbox"), "t:Mailbox");
        assert_eq!(XmlNamespace::Messages.qualify("Items"), "m:Items");
        assert_eq!(XmlNamespace::NotSpecified.qualify("Entry"), "Entry");
    }

    #[test]
    fn uri_and_prefix_lookups_agree() {
        for ns in [
            XmlNamespace::Types,
            XmlNamespace::Messages,
            XmlNamespace::Errors,
            XmlNamespace::Soap,
        ] {
            assert_eq!(XmlNamespace::from_uri(ns.uri()), Some(ns));
            assert_eq!(XmlNamespace::from_prefix(ns.prefix()), Some(ns));
        }

        assert_eq!(XmlNamespace::from_uri("urn:unknown"), None);
    }
}
