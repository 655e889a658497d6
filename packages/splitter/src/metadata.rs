//! Declaration and envelope metadata extraction.
//!
//! Reads the XML prolog and the `xmlns`/`release` attributes of the ONIX
//! envelope by scanning lines, without parsing the document. The scan is
//! literal on purpose: it touches only the first few lines of files that
//! may be gigabytes long. When the expected pattern is absent it fails
//! with [`SplitterError::MetadataNotFound`] rather than guessing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::config::DEFAULT_XML_DECLARATION;
use crate::error::{Result, SplitterError};
use crate::xml::local_name;

/// Local name of the ONIX root element, compared case-insensitively.
pub const ENVELOPE_LOCAL_NAME: &str = "ONIXMessage";

/// Maximum number of lines an envelope opening tag may span.
const MAX_ENVELOPE_TAG_LINES: usize = 64;

/// Metadata shared by every part produced from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeMetadata {
    /// The literal `<?xml ...?>` prolog, if the first line carries one.
    pub xml_declaration: Option<String>,

    /// Namespace URI bound on the envelope.
    pub xml_namespace: String,

    /// ONIX release version (e.g. "3.0").
    pub release_version: String,

    /// Local name of the envelope element as written in the source.
    pub envelope_tag: String,
}

impl EnvelopeMetadata {
    /// Declaration to write at the top of each part.
    #[must_use]
    pub fn declaration(&self) -> &str {
        self.xml_declaration
            .as_deref()
            .unwrap_or(DEFAULT_XML_DECLARATION)
    }
}

/// Extract declaration, namespace and release from a file.
pub fn extract_metadata(path: &Path) -> Result<EnvelopeMetadata> {
    let file = File::open(path)?;
    let metadata = extract_from_reader(BufReader::new(file), path)?;

    if metadata.xml_declaration.is_none() {
        tracing::warn!(
            path = %path.display(),
            "first line is not an XML declaration, parts get the default declaration"
        );
    }
    tracing::debug!(
        path = %path.display(),
        namespace = %metadata.xml_namespace,
        release = %metadata.release_version,
        envelope = %metadata.envelope_tag,
        "extracted envelope metadata"
    );

    Ok(metadata)
}

/// Extract metadata from any buffered reader.
///
/// `path` is only used for error context.
pub fn extract_from_reader<R: BufRead>(mut reader: R, path: &Path) -> Result<EnvelopeMetadata> {
    let not_found = |reason: &str| SplitterError::MetadataNotFound {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut xml_declaration = None;
    let mut line_number = 0usize;
    let mut raw = Vec::new();

    while let Some(line) = next_line(&mut reader, &mut raw)? {
        line_number += 1;
        let mut candidate = line.as_str();

        if line_number == 1 {
            let trimmed = candidate.trim_start_matches('\u{feff}').trim();
            if trimmed.starts_with("<?xml") {
                let end = trimmed.find("?>").map_or(trimmed.len(), |i| i + 2);
                xml_declaration = Some(trimmed[..end].to_string());
                candidate = &trimmed[end..];
            }
        }

        let Some(tag_name) = envelope_tag_name(candidate) else {
            continue;
        };
        let tag_name = tag_name.to_string();

        let mut tag_text = candidate.trim_start().to_string();
        let mut extra_lines = 0;
        while !tag_text.contains('>') {
            if extra_lines == MAX_ENVELOPE_TAG_LINES {
                return Err(not_found("envelope opening tag is not closed"));
            }
            match next_line(&mut reader, &mut raw)? {
                Some(more) => {
                    tag_text.push(' ');
                    tag_text.push_str(&more);
                    extra_lines += 1;
                }
                None => return Err(not_found("envelope opening tag is not closed")),
            }
        }
        if let Some(end) = tag_text.find('>') {
            tag_text.truncate(end);
        }

        let xml_namespace = attribute_value(&tag_text, "xmlns")
            .or_else(|| {
                let prefix = tag_name.split_once(':').map(|(p, _)| p)?;
                attribute_value(&tag_text, &format!("xmlns:{prefix}"))
            })
            .ok_or_else(|| not_found("envelope has no xmlns attribute"))?;
        let release_version = attribute_value(&tag_text, "release")
            .ok_or_else(|| not_found("envelope has no release attribute"))?;

        return Ok(EnvelopeMetadata {
            xml_declaration,
            xml_namespace: xml_namespace.to_string(),
            release_version: release_version.trim().to_string(),
            envelope_tag: local_name(&tag_name).to_string(),
        });
    }

    Err(not_found("no envelope opening tag before end of file"))
}

/// Read one line as lossily decoded text, without the line terminator.
fn next_line<R: BufRead>(reader: &mut R, raw: &mut Vec<u8>) -> Result<Option<String>> {
    raw.clear();
    if reader.read_until(b'\n', raw)? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(raw);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Return the qualified tag name if `line` starts with the envelope opening tag.
fn envelope_tag_name(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('<')?;
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    let name = &rest[..end];
    local_name(name)
        .eq_ignore_ascii_case(ENVELOPE_LOCAL_NAME)
        .then_some(name)
}

/// Find the value of attribute `name` in the text of an opening tag.
///
/// The attribute name must be preceded by whitespace so that `release`
/// does not match inside `prerelease`.
fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(pos) = tag[search_from..].find(name) {
        let start = search_from + pos;
        let after = start + name.len();
        search_from = after;

        let preceded_by_space = tag[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }

        let Some(rest) = tag[after..].trim_start().strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let body = &rest[1..];
        if let Some(end) = body.find(quote) {
            return Some(&body[..end]);
        }
    }
    None
}
