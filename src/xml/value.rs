/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Conversions between typed values and the text form used in EWS element
//! content and attribute values.

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::Error;

/// A value which can be written as, and parsed from, XML text.
pub trait XmlValue: Sized {
    /// Formats this value as XML text.
    fn to_xml_string(&self) -> Result<String, Error>;

    /// Parses a value from XML text.
    fn from_xml_str(value: &str) -> Result<Self, Error>;
}

impl XmlValue for String {
    fn to_xml_string(&self) -> Result<String, Error> {
        Ok(self.clone())
    }

    fn from_xml_str(value: &str) -> Result<Self, Error> {
        Ok(value.to_owned())
    }
}

/// Booleans use the `xs:boolean` lexical space, which also admits `1`/`0`.
impl XmlValue for bool {
    fn to_xml_string(&self) -> Result<String, Error> {
        Ok(if *self { "true" } else { "false" }.to_owned())
    }

    fn from_xml_str(value: &str) -> Result<Self, Error> {
        match value {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(Error::InvalidValue {
                type_name: "bool",
                value: value.to_owned(),
            }),
        }
    }
}

/// Date-times are exchanged as RFC 3339 strings, e.g. `2024-03-01T09:30:00Z`.
impl XmlValue for OffsetDateTime {
    fn to_xml_string(&self) -> Result<String, Error> {
        Ok(self.format(&Rfc3339)?)
    }

    fn from_xml_str(value: &str) -> Result<Self, Error> {
        Ok(OffsetDateTime::parse(value, &Rfc3339)?)
    }
}

/// Implements [`XmlValue`] for types whose `Display` and `FromStr` forms match
/// the XML schema's lexical form.
macro_rules! impl_xml_value_for {
    ($( $ty:ty ),*) => {
        $(
        impl XmlValue for $ty {
            fn to_xml_string(&self) -> Result<String, Error> {
                Ok(self.to_string())
            }

            fn from_xml_str(value: &str) -> Result<Self, Error> {
                value.trim().parse::<$ty>().map_err(|_| Error::InvalidValue {
                    type_name: stringify!($ty),
                    value: value.to_owned(),
                })
            }
        })*
    };
}

impl_xml_value_for!(i8, u8, i16, u16, i32, u32, i64, u64, usize);

/// Declares a unit-only enum whose variants map to fixed XML strings, along
/// with its [`XmlValue`] implementation and an `as_str()` accessor.
macro_rules! xml_value_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $text:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            /// The XML text form of this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )*
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::xml::XmlValue for $name {
            fn to_xml_string(&self) -> Result<String, $crate::Error> {
                Ok(self.as_str().to_owned())
            }

            fn from_xml_str(value: &str) -> Result<Self, $crate::Error> {
                match value {
                    $( $text => Ok($name::$variant), )*
                    _ => Err($crate::Error::InvalidValue {
                        type_name: stringify!($name),
                        value: value.to_owned(),
                    }),
                }
            }
        }
    };
}

pub(crate) use xml_value_enum;
