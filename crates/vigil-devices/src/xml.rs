// crates/vigil-devices/src/xml.rs
// ============================================================================
// Module: XML Helpers
// Description: Namespace-agnostic element text extraction.
// Purpose: Pull fields out of SOAP and vendor XML without schema bindings.
// Dependencies: quick-xml
// ============================================================================

//! ## Overview
//! Device XML arrives with wildly inconsistent namespace prefixes, so these
//! helpers match on local element names only. They are deliberately small:
//! callers name the elements they care about and get their text content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::DeviceError;

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Returns the text of the first element with the given local name.
///
/// # Errors
///
/// Returns [`DeviceError::Protocol`] on malformed XML.
pub fn first_text(xml: &str, local_name: &str) -> Result<Option<String>, DeviceError> {
    let mut texts = all_texts(xml, local_name)?;
    Ok(if texts.is_empty() {
        None
    } else {
        Some(texts.remove(0))
    })
}

/// Returns the text of every element with the given local name, in order.
///
/// # Errors
///
/// Returns [`DeviceError::Protocol`] on malformed XML.
pub fn all_texts(xml: &str, local_name: &str) -> Result<Vec<String>, DeviceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut texts = Vec::new();
    let mut capture = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                capture = start.local_name().as_ref() == local_name.as_bytes();
            }
            Ok(Event::Text(text)) => {
                if capture {
                    let value = text
                        .unescape()
                        .map_err(|err| DeviceError::Protocol(err.to_string()))?;
                    texts.push(value.into_owned());
                    capture = false;
                }
            }
            Ok(Event::End(_)) => capture = false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(DeviceError::Protocol(err.to_string())),
        }
    }
    Ok(texts)
}

/// Returns the value of an attribute on the first element with the local
/// name, matching the attribute by local name as well.
///
/// # Errors
///
/// Returns [`DeviceError::Protocol`] on malformed XML.
pub fn first_attribute(
    xml: &str,
    local_name: &str,
    attribute: &str,
) -> Result<Option<String>, DeviceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start) | Event::Empty(start)) => {
                if start.local_name().as_ref() != local_name.as_bytes() {
                    continue;
                }
                for attr in start.attributes().flatten() {
                    if attr.key.local_name().as_ref() == attribute.as_bytes() {
                        let value = attr
                            .unescape_value()
                            .map_err(|err| DeviceError::Protocol(err.to_string()))?;
                        return Ok(Some(value.into_owned()));
                    }
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(DeviceError::Protocol(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn extracts_namespaced_element_text() {
        let xml = r#"<tds:GetDeviceInformationResponse xmlns:tds="http://example">
            <tds:Manufacturer>Axis</tds:Manufacturer>
            <tds:Model>P3265</tds:Model>
        </tds:GetDeviceInformationResponse>"#;
        assert_eq!(first_text(xml, "Manufacturer").unwrap().as_deref(), Some("Axis"));
        assert_eq!(first_text(xml, "Model").unwrap().as_deref(), Some("P3265"));
        assert_eq!(first_text(xml, "SerialNumber").unwrap(), None);
    }

    #[test]
    fn collects_repeated_elements_in_order() {
        let xml = "<r><item>a</item><item>b</item><other>x</other><item>c</item></r>";
        assert_eq!(all_texts(xml, "item").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reads_attributes_by_local_name() {
        let xml = r#"<trt:Profiles xmlns:trt="http://example" token="profile_1"/>"#;
        assert_eq!(
            first_attribute(xml, "Profiles", "token").unwrap().as_deref(),
            Some("profile_1")
        );
    }

    #[test]
    fn malformed_xml_is_a_protocol_error() {
        assert!(matches!(
            first_text("<unclosed", "x"),
            Err(DeviceError::Protocol(_))
        ));
    }
}
