//! Namespace prefix stripping.
//!
//! Every element written to a part is renamed to its local name while it
//! streams past. Namespace declarations below the envelope are dropped:
//! each part re-declares the source namespace as the default namespace on
//! its envelope, so no prefix is left to bind.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart};
use quick_xml::name::QName;

use crate::error::Result;

/// Get the local part of a tag name.
///
/// Accepts Clark notation (`{uri}local`) and prefixed names (`p:local`).
/// Idempotent: a local name is returned unchanged.
///
/// # Examples
/// ```
/// use onix_splitter::xml::local_name;
///
/// assert_eq!(local_name("{http://ns.editeur.org/onix/3.0/reference}Product"), "Product");
/// assert_eq!(local_name("onix:Product"), "Product");
/// assert_eq!(local_name("Product"), "Product");
/// ```
pub fn local_name(tag: &str) -> &str {
    let tag = tag.rfind('}').map_or(tag, |i| &tag[i + 1..]);
    tag.rfind(':').map_or(tag, |i| &tag[i + 1..])
}

/// Byte-level variant of [`local_name`] for raw tag names.
pub fn local_name_bytes(tag: &[u8]) -> &[u8] {
    let tag = tag
        .iter()
        .rposition(|b| *b == b'}')
        .map_or(tag, |i| &tag[i + 1..]);
    tag.iter()
        .rposition(|b| *b == b':')
        .map_or(tag, |i| &tag[i + 1..])
}

/// Whether an attribute key declares a namespace (`xmlns` or `xmlns:p`).
pub fn is_namespace_declaration(key: &[u8]) -> bool {
    key == b"xmlns" || key.starts_with(b"xmlns:")
}

/// Build an attribute from a key and an already escaped value.
///
/// The value is copied verbatim, except that double quotes (legal inside a
/// single-quoted source attribute) are escaped because the writer always
/// quotes with `"`.
pub fn raw_attribute<'a>(key: &'a [u8], value: &[u8]) -> Attribute<'a> {
    let value = if value.contains(&b'"') {
        let mut escaped = Vec::with_capacity(value.len() + 8);
        for &byte in value {
            if byte == b'"' {
                escaped.extend_from_slice(b"&quot;");
            } else {
                escaped.push(byte);
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Owned(value.to_vec())
    };
    Attribute {
        key: QName(key),
        value,
    }
}

/// Rename a start (or empty) tag to its local name.
///
/// Namespace declarations are dropped and the remaining attribute names
/// lose their prefixes. Attribute values keep their source escaping.
/// When two attributes share a local name, the unprefixed one wins and a
/// prefixed duplicate is dropped, so each name appears once.
pub fn normalize_start(start: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = local_name_bytes(start.name().into_inner());
    let mut normalized = BytesStart::new(String::from_utf8_lossy(name).into_owned());

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if !is_namespace_declaration(attr.key.into_inner()) {
            attributes.push(attr);
        }
    }

    let mut seen: Vec<&[u8]> = Vec::with_capacity(attributes.len());
    for attr in &attributes {
        let key = attr.key.into_inner();
        let local = local_name_bytes(key);
        let prefixed = local.len() != key.len();
        let shadowed = seen.contains(&local)
            || (prefixed
                && attributes
                    .iter()
                    .any(|other| other.key.into_inner() == local));
        if shadowed {
            tracing::debug!(
                element = %String::from_utf8_lossy(name),
                attribute = %String::from_utf8_lossy(key),
                "dropping attribute that collides after prefix stripping"
            );
            continue;
        }
        seen.push(local);
        normalized.push_attribute(raw_attribute(local, &attr.value));
    }

    Ok(normalized)
}

/// Rename an end tag to its local name.
pub fn normalize_end(end: &BytesEnd<'_>) -> BytesEnd<'static> {
    let name = local_name_bytes(end.name().into_inner());
    BytesEnd::new(String::from_utf8_lossy(name).into_owned())
}
