//! Keyword-aware help builder.
//!
//! Produces the `<keywords>` section of a Qt Help project (`.qhp`): the
//! generic entries from the renderer's alphabetical index, followed once per
//! build by the keywords declared with the keyword directive.
//!
//! ```text
//!             <keyword name="cos" ref="functions.html#cos"/>
//!             <keyword name="cos" id="cos-builtin" ref="functions.html#kw-0"/>
//! ```
//!
//! The renderer hands the index over one group (index letter) at a time, so
//! [`HelpBuilder::build_keyword_list`] is called repeatedly. The builder
//! moves from [`Phase::Collecting`] to [`Phase::Emitted`] the first time it
//! appends the declared keywords and never appends them again.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write;

use crate::error::HelpError;
use crate::keywords::KeywordRegistry;
use crate::models::IndexEntry;

/// Indentation of keyword lines inside the project manifest.
pub const KEYWORD_INDENT: &str = "            ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Declared keywords not yet written.
    Collecting,
    /// Declared keywords written; later calls emit generic entries only.
    Emitted,
}

pub struct HelpBuilder<'a> {
    registry: &'a KeywordRegistry,
    ignore_custom_keywords: bool,
    phase: Phase,
}

impl<'a> HelpBuilder<'a> {
    pub fn new(registry: &'a KeywordRegistry, ignore_custom_keywords: bool) -> Self {
        Self {
            registry,
            ignore_custom_keywords,
            phase: Phase::Collecting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Keyword lines for one index group.
    ///
    /// Generic entries come first, one line each. On the first call the
    /// resolved registry records follow; unresolved ones are skipped with a
    /// warning. With custom keywords ignored this is a pass-through of the
    /// generic entries.
    pub fn build_keyword_list(
        &mut self,
        title: &str,
        entries: &[IndexEntry],
    ) -> Result<Vec<String>, HelpError> {
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            lines.push(generic_keyword_line(title, entry)?);
        }

        if self.ignore_custom_keywords {
            return Ok(lines);
        }
        if self.phase == Phase::Emitted {
            tracing::debug!(
                group = title,
                "declared keywords already emitted, generic entries only"
            );
            return Ok(lines);
        }

        let mut skipped = 0;
        for record in self.registry.all_records() {
            match record.resolved_reference.as_deref() {
                Some(reference) if record.is_resolved() => {
                    lines.push(custom_keyword_line(&record.designation, reference));
                }
                _ => {
                    tracing::warn!(
                        document = %record.source_document,
                        line = record.source_line,
                        designation = %record.designation,
                        "skipping keyword without a resolved reference"
                    );
                    skipped += 1;
                }
            }
        }
        tracing::debug!(
            group = title,
            emitted = self.registry.len() - skipped,
            skipped,
            "declared keywords emitted"
        );
        self.phase = Phase::Emitted;
        Ok(lines)
    }
}

/// `<keyword name="TERM" ref="URI"/>`, indented.
fn generic_keyword_line(group: &str, entry: &IndexEntry) -> Result<String, HelpError> {
    if entry.term.trim().is_empty() {
        return Err(HelpError::MalformedIndexEntry {
            group: group.to_string(),
            reason: format!("entry with reference '{}' has no term", entry.reference),
        });
    }
    if entry.reference.trim().is_empty() {
        return Err(HelpError::MalformedIndexEntry {
            group: group.to_string(),
            reason: format!("term '{}' has no reference", entry.term),
        });
    }
    Ok(format!(
        "{}<keyword name=\"{}\" ref=\"{}\"/>",
        KEYWORD_INDENT,
        escape_attr(&entry.term),
        escape_attr(&entry.reference)
    ))
}

/// `<keyword DESIGNATION ref="URI"/>`, indented. The designation already
/// holds its own attributes and is copied as written.
fn custom_keyword_line(designation: &str, reference: &str) -> String {
    format!(
        "{}<keyword {} ref=\"{}\"/>",
        KEYWORD_INDENT,
        ascii_char_refs(designation),
        escape_attr(reference)
    )
}

fn escape_attr(value: &str) -> String {
    ascii_char_refs(&quick_xml::escape::escape(value)).into_owned()
}

/// Replace every non-ASCII character with a decimal character reference.
pub fn ascii_char_refs(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let _ = write!(out, "&#{};", c as u32);
        }
    }
    Cow::Owned(out)
}

/// Generic entries of a manifest's `<keywords>` section, in order.
///
/// Missing `name` or `ref` attributes come back as empty strings so the
/// builder reports them as malformed.
pub fn read_index_entries(section: &str) -> Result<Vec<IndexEntry>, HelpError> {
    let mut reader = Reader::from_str(section);
    let mut entries = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"keyword" => {
                let mut entry = IndexEntry::new("", "");
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    match attr.key.as_ref() {
                        b"name" => entry.term = attr.unescape_value()?.into_owned(),
                        b"ref" => entry.reference = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }
                entries.push(entry);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// `manifest` without the keyword lines pointing at declared keywords of
/// `registry`, i.e. a spliced manifest turned back into the generator's.
pub fn strip_declared_keywords(manifest: &str, registry: &KeywordRegistry) -> String {
    let declared: HashSet<&str> = registry
        .all_records()
        .iter()
        .filter_map(|r| r.resolved_reference.as_deref())
        .collect();

    manifest
        .split_inclusive('\n')
        .filter(|line| {
            if !line.trim_start().starts_with("<keyword ") {
                return true;
            }
            match read_index_entries(line).as_deref() {
                Ok([entry]) => !declared.contains(entry.reference.as_str()),
                _ => true,
            }
        })
        .collect()
}

/// Index letter of a term, as used for grouping.
fn index_group(term: &str) -> String {
    term.chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

/// Rebuild the `<keywords>` section of a help-project manifest.
///
/// The existing entries are treated as the generic index: they are grouped
/// by index letter and fed through `builder` group by group. The rest of the
/// manifest is left untouched.
pub fn splice_keywords(manifest: &str, builder: &mut HelpBuilder<'_>) -> Result<String, HelpError> {
    const OPEN: &str = "<keywords>";
    const CLOSE: &str = "</keywords>";

    let after_open = manifest
        .find(OPEN)
        .map(|pos| pos + OPEN.len())
        .ok_or(HelpError::MissingKeywordSection)?;
    let close = manifest[after_open..]
        .find(CLOSE)
        .map(|pos| pos + after_open)
        .ok_or(HelpError::MissingKeywordSection)?;
    // Keep the closing tag's own indentation.
    let close_line = manifest[..close]
        .rfind('\n')
        .map(|pos| pos + 1)
        .filter(|&pos| pos > after_open)
        .unwrap_or(close);

    let entries = read_index_entries(&manifest[after_open..close])?;

    let mut lines = Vec::new();
    let mut start = 0;
    while start < entries.len() {
        let group = index_group(&entries[start].term);
        let end = entries[start..]
            .iter()
            .position(|e| index_group(&e.term) != group)
            .map_or(entries.len(), |n| start + n);
        lines.extend(builder.build_keyword_list(&group, &entries[start..end])?);
        start = end;
    }
    if builder.phase() == Phase::Collecting {
        lines.extend(builder.build_keyword_list("", &[])?);
    }

    let mut out = String::with_capacity(manifest.len() + lines.len() * 64);
    out.push_str(&manifest[..after_open]);
    out.push('\n');
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&manifest[close_line..]);
    Ok(out)
}
