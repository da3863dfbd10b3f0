/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Ranges used by inbox rule conditions.

use std::io::Write;

use time::OffsetDateTime;

use crate::{
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ComplexProperty, Error, PropertyCore, ValidationError,
};

/// A span of time, open on either side.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/withindaterange>
#[derive(Clone, Debug, Default)]
pub struct DateRange {
    core: PropertyCore,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
}

impl DateRange {
    pub fn new(start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        Self {
            core: PropertyCore::default(),
            start,
            end,
        }
    }

    pub fn start(&self) -> Option<OffsetDateTime> {
        self.start
    }

    pub fn set_start(&mut self, start: Option<OffsetDateTime>) {
        self.core.set_field(&mut self.start, start);
    }

    pub fn end(&self) -> Option<OffsetDateTime> {
        self.end
    }

    pub fn set_end(&mut self, end: Option<OffsetDateTime>) {
        self.core.set_field(&mut self.end, end);
    }
}

impl ComplexProperty for DateRange {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "StartDateTime" => self.start = Some(reader.read_element_value()?),
            "EndDateTime" => self.end = Some(reader.read_element_value()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "StartDateTime", self.start.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "EndDateTime", self.end.as_ref())
    }

    fn validate(&self) -> Result<(), Error> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                Err(ValidationError::DateRangeStartAfterEnd.into())
            }
            _ => Ok(()),
        }
    }
}

/// A range of message sizes in kilobytes, open on either side.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/withinsizerange>
#[derive(Clone, Debug, Default)]
pub struct SizeRange {
    core: PropertyCore,
    minimum: Option<u32>,
    maximum: Option<u32>,
}

impl SizeRange {
    pub fn new(minimum: Option<u32>, maximum: Option<u32>) -> Self {
        Self {
            core: PropertyCore::default(),
            minimum,
            maximum,
        }
    }

    pub fn minimum(&self) -> Option<u32> {
        self.minimum
    }

    pub fn set_minimum(&mut self, minimum: Option<u32>) {
        self.core.set_field(&mut self.minimum, minimum);
    }

    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }

    pub fn set_maximum(&mut self, maximum: Option<u32>) {
        self.core.set_field(&mut self.maximum, maximum);
    }
}

impl ComplexProperty for SizeRange {
    fn core(&self) -> &PropertyCore {
        &self.core
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        match reader.local_name() {
            "MinimumSize" => self.minimum = Some(reader.read_element_value()?),
            "MaximumSize" => self.maximum = Some(reader.read_element_value()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_optional_element_value(XmlNamespace::Types, "MinimumSize", self.minimum.as_ref())?;
        writer.write_optional_element_value(XmlNamespace::Types, "MaximumSize", self.maximum.as_ref())
    }

    fn validate(&self) -> Result<(), Error> {
        match (self.minimum, self.maximum) {
            (Some(minimum), Some(maximum)) if minimum > maximum => {
                Err(ValidationError::SizeRangeMinimumExceedsMaximum { minimum, maximum }.into())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::test_utils::{assert_serialized_content, load_from_str};

    #[test]
    fn date_ranges_round_trip() {
        let xml = concat!(
            r#"<t:WithinDateRange><t:StartDateTime>2024-03-01T00:00:00Z</t:StartDateTime>"#,
            r#"<t:EndDateTime>2024-03-31T23:59:59Z</t:EndDateTime></t:WithinDateRange>"#
        );
        let range: DateRange = load_from_str(xml, "WithinDateRange");

        assert_eq!(range.start(), Some(datetime!(2024-03-01 00:00:00 UTC)));
        assert!(range.validate().is_ok());
        assert_serialized_content(&range, "WithinDateRange", xml);
    }

    #[test]
    fn inverted_date_ranges_are_invalid() {
        let range = DateRange::new(
            Some(datetime!(2024-04-01 00:00:00 UTC)),
            Some(datetime!(2024-03-01 00:00:00 UTC)),
        );

        assert!(matches!(
            range.validate(),
            Err(Error::Validation(ValidationError::DateRangeStartAfterEnd))
        ));

        // Open ranges are always valid.
        let open = DateRange::new(Some(datetime!(2024-04-01 00:00:00 UTC)), None);
        assert!(open.validate().is_ok());
    }

    #[test]
    fn size_ranges_check_their_bounds() {
        let mut range: SizeRange = load_from_str(
            "<t:WithinSizeRange><t:MinimumSize>10</t:MinimumSize><t:MaximumSize>500</t:MaximumSize></t:WithinSizeRange>",
            "WithinSizeRange",
        );
        assert!(range.validate().is_ok());

        range.set_minimum(Some(900));
        assert!(matches!(
            range.validate(),
            Err(Error::Validation(ValidationError::SizeRangeMinimumExceedsMaximum {
                minimum: 900,
                maximum: 500,
            }))
        ));

        // Equal bounds select a single size.
        range.set_maximum(Some(900));
        assert!(range.validate().is_ok());
    }
}
