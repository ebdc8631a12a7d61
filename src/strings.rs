//! Translatable string extraction for the documentation extensions.
//!
//! Scans Python sources for `_("...")` and `l_("...")` calls and writes a
//! gettext template (`.pot`). A comment starting with `l10n:` on the lines
//! directly above a call becomes an extracted comment (`#.`) for
//! translators. Locations are written relative to the template's directory.
//!
//! Sources are tokenized, so calls may wrap across lines, and adjacent
//! literals (`"a " "b"`, triple-quoted ones included) are concatenated.
//! Calls whose first argument is not a plain literal are reported and
//! skipped.

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

const COMMENT_TAG: &str = "l10n:";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
          (?P<comment>\#[^\n]*)
        | (?P<string>(?P<prefix>[rRbBuUfF]{0,2})(?s:
              """(?:[^\\]|\\.)*?"""
            | '''(?:[^\\]|\\.)*?'''
            | "(?:[^"\\\n]|\\.)*"
            | '(?:[^'\\\n]|\\.)*'
          ))
        | (?P<name>[A-Za-z_][A-Za-z0-9_]*)
        | (?P<open>[(\[{])
        | (?P<close>[)\]}])
        | (?P<comma>,)
        | (?P<other>\S)
        "#,
    )
    .expect("valid regex")
});

const KEYWORDS: &[&str] = &["_", "l_"];

/// One extracted message with every place it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMessage {
    pub msgid: String,
    pub locations: Vec<(String, u32)>,
    pub comments: Vec<String>,
}

/// Messages in order of first occurrence.
#[derive(Debug, Default)]
pub struct Catalog {
    pub domain: Option<String>,
    messages: Vec<CatalogMessage>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(domain: Option<&str>) -> Self {
        Self {
            domain: domain.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn add(&mut self, msgid: String, location: (String, u32), comments: Vec<String>) {
        match self.index.get(&msgid) {
            Some(&i) => {
                let message = &mut self.messages[i];
                message.locations.push(location);
                for comment in comments {
                    if !message.comments.contains(&comment) {
                        message.comments.push(comment);
                    }
                }
            }
            None => {
                self.index.insert(msgid.clone(), self.messages.len());
                self.messages.push(CatalogMessage {
                    msgid,
                    locations: vec![location],
                    comments,
                });
            }
        }
    }

    pub fn messages(&self) -> &[CatalogMessage] {
        &self.messages
    }

    /// Render as a PO template.
    pub fn to_pot(&self) -> String {
        let mut out = String::new();
        out.push_str("# Translations template");
        if let Some(domain) = &self.domain {
            out.push_str(" for ");
            out.push_str(domain);
        }
        out.push_str(".\n#\n#, fuzzy\nmsgid \"\"\nmsgstr \"\"\n");
        out.push_str(&format!(
            "\"Project-Id-Version: {}\\n\"\n",
            self.domain.as_deref().unwrap_or("PROJECT")
        ));
        out.push_str(&format!(
            "\"POT-Creation-Date: {}\\n\"\n",
            Utc::now().format("%Y-%m-%d %H:%M%z")
        ));
        out.push_str("\"MIME-Version: 1.0\\n\"\n");
        out.push_str("\"Content-Type: text/plain; charset=utf-8\\n\"\n");
        out.push_str("\"Content-Transfer-Encoding: 8bit\\n\"\n");

        for message in &self.messages {
            out.push('\n');
            for comment in &message.comments {
                out.push_str(&format!("#. {}\n", comment));
            }
            for (file, line) in &message.locations {
                out.push_str(&format!("#: {}:{}\n", file, line));
            }
            out.push_str(&format!("msgid \"{}\"\n", po_escape(&message.msgid)));
            out.push_str("msgstr \"\"\n");
        }
        out
    }
}

/// A `_()` / `l_()` call found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCall {
    /// 1-based line of the opening parenthesis.
    pub line: u32,
    /// `None` when the first argument is not a plain string literal.
    pub msgid: Option<String>,
    pub comments: Vec<String>,
}

enum CallState {
    Idle,
    /// Saw a keyword name; a `(` must follow.
    Keyword,
    Arguments {
        line: u32,
        depth: usize,
        parts: Vec<String>,
        /// Still inside the first argument.
        first: bool,
        literal: bool,
    },
}

/// Every message call in `source`, in order.
pub fn scan_calls(source: &str) -> Vec<MessageCall> {
    let lines: Vec<&str> = source.lines().collect();
    let mut calls = Vec::new();
    let mut state = CallState::Idle;
    // Attribute access and definitions (`obj._`, `def _`) are not calls.
    let mut not_a_call = false;
    let mut line = 1u32;
    let mut offset = 0;

    for caps in TOKEN_RE.captures_iter(source) {
        let Some(token) = caps.get(0) else {
            continue;
        };
        line += source[offset..token.start()].matches('\n').count() as u32;
        offset = token.start();
        if caps.name("comment").is_some() {
            continue;
        }
        let text = token.as_str();

        state = match state {
            CallState::Keyword if text == "(" => CallState::Arguments {
                line,
                depth: 0,
                parts: Vec::new(),
                first: true,
                literal: true,
            },
            CallState::Idle | CallState::Keyword => {
                if !not_a_call && caps.name("name").is_some() && KEYWORDS.contains(&text) {
                    CallState::Keyword
                } else {
                    CallState::Idle
                }
            }
            CallState::Arguments {
                line: call_line,
                depth: 0,
                parts,
                literal,
                ..
            } if caps.name("close").is_some() => {
                let above = (call_line as usize - 1).min(lines.len());
                calls.push(MessageCall {
                    line: call_line,
                    msgid: (literal && !parts.is_empty()).then(|| parts.concat()),
                    comments: translator_comments(&lines[..above]),
                });
                CallState::Idle
            }
            CallState::Arguments {
                line: call_line,
                mut depth,
                mut parts,
                mut first,
                mut literal,
            } => {
                if first {
                    if depth == 0 && caps.name("comma").is_some() {
                        first = false;
                    } else if let Some(string) = caps.name("string") {
                        let prefix = caps.name("prefix").map_or("", |p| p.as_str());
                        match literal_value(string.as_str(), prefix) {
                            Some(value) => parts.push(value),
                            None => literal = false,
                        }
                    } else {
                        literal = false;
                    }
                }
                if caps.name("open").is_some() {
                    depth += 1;
                } else if caps.name("close").is_some() {
                    depth -= 1;
                }
                CallState::Arguments {
                    line: call_line,
                    depth,
                    parts,
                    first,
                    literal,
                }
            }
        };
        not_a_call = matches!(text, "." | "def" | "class");
    }
    calls
}

/// Messages of one source file: `(line, msgid, comments)`.
pub fn extract_from_source(source: &str) -> Vec<(u32, String, Vec<String>)> {
    scan_calls(source)
        .into_iter()
        .filter_map(|call| match call.msgid {
            Some(msgid) if !msgid.is_empty() => Some((call.line, msgid, call.comments)),
            _ => None,
        })
        .collect()
}

/// Value of a string token, `None` for f-strings.
fn literal_value(token: &str, prefix: &str) -> Option<String> {
    if prefix.contains(['f', 'F']) {
        return None;
    }
    let quoted = &token[prefix.len()..];
    let quote = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        3
    } else {
        1
    };
    let body = &quoted[quote..quoted.len() - quote];
    if prefix.contains(['r', 'R']) {
        Some(body.to_string())
    } else {
        Some(unescape_literal(body))
    }
}

/// Extract every `*.py` file under `dir` into a template at `outfile`.
///
/// Returns the number of distinct messages written.
pub fn extract_python_strings(dir: &Path, outfile: &Path, domain: Option<&str>) -> Result<usize> {
    let base_dir = absolute(outfile.parent().unwrap_or(Path::new(".")))?;
    let mut catalog = Catalog::new(domain);

    let mut files: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "py")
            {
                files.push(entry.into_path());
            }
        }
    } else {
        tracing::warn!(dir = %dir.display(), "no extension sources to extract strings from");
    }

    for path in &files {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let location = relative_to(&absolute(path)?, &base_dir);
        for call in scan_calls(&source) {
            match call.msgid {
                Some(msgid) if !msgid.is_empty() => {
                    catalog.add(msgid, (location.clone(), call.line), call.comments);
                }
                Some(_) => {
                    tracing::warn!(file = %location, line = call.line, "empty message id, skipped");
                }
                None => {
                    tracing::warn!(
                        file = %location,
                        line = call.line,
                        "message is not a string literal, skipped"
                    );
                }
            }
        }
    }

    if let Some(parent) = outfile.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(outfile, catalog.to_pot())
        .with_context(|| format!("Failed to write {}", outfile.display()))?;

    tracing::info!(
        messages = catalog.messages().len(),
        files = files.len(),
        output = %outfile.display(),
        "extracted translatable strings"
    );
    Ok(catalog.messages().len())
}

/// `l10n:` comments on the comment-only lines directly above a call.
fn translator_comments(above: &[&str]) -> Vec<String> {
    let mut block = Vec::new();
    for line in above.iter().rev() {
        let Some(comment) = line.trim_start().strip_prefix('#') else {
            break;
        };
        block.push(comment.trim());
    }
    block.reverse();

    let mut comments = Vec::new();
    let mut inside = false;
    for comment in block {
        if let Some(text) = comment.strip_prefix(COMMENT_TAG) {
            inside = true;
            comments.push(text.trim().to_string());
        } else if inside {
            comments.push(comment.to_string());
        }
    }
    comments
}

fn unescape_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') => {}
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn po_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// `path` relative to `base`, with `/` separators.
fn relative_to(path: &Path, base: &Path) -> String {
    let path: Vec<Component> = path.components().filter(|c| *c != Component::CurDir).collect();
    let base: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let common = path.iter().zip(&base).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .collect();
    parts.extend(
        path[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
