use std::collections::HashMap;

use crate::records::{FieldDescriptor, PropertyValue};

/// Result of looking for a usable address on one record. `EmptyValue` and
/// `NoAddressField` are distinct so the driver can log the exact skip reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedAddress {
    Found(String),
    EmptyValue,
    NoAddressField,
}

/// Finds the first schema field (declaration order) whose name contains one
/// of the indicator substrings, case-insensitively, and pulls its value out
/// of the property bag. Matching is substring-based on purpose: users name
/// these fields freely ("Endereço do local", "Address", "Localização").
pub fn extract_address(
    schema: &[FieldDescriptor],
    properties: &HashMap<String, PropertyValue>,
    indicators: &[String],
) -> ExtractedAddress {
    let Some(field) = find_address_field(schema, indicators) else {
        return ExtractedAddress::NoAddressField;
    };

    let trimmed = properties
        .get(&field.id)
        .and_then(PropertyValue::as_text)
        .map(str::trim)
        .unwrap_or("");

    if trimmed.is_empty() {
        ExtractedAddress::EmptyValue
    } else {
        ExtractedAddress::Found(trimmed.to_string())
    }
}

fn find_address_field<'a>(
    schema: &'a [FieldDescriptor],
    indicators: &[String],
) -> Option<&'a FieldDescriptor> {
    schema.iter().find(|field| {
        let name = field.name.to_lowercase();
        indicators
            .iter()
            .any(|indicator| name.contains(&indicator.to_lowercase()))
    })
}
