//! Recognition of keyword-declaring directives in reStructuredText sources.
//!
//! ```rst
//! .. qtkeyword:: name="cos" id="cos-builtin"
//! ```
//!
//! Only the directive itself is recognised; everything else in the document
//! belongs to the renderer. Arguments are whitespace separated and may
//! continue on following lines indented deeper than the `..` marker. They
//! are joined with single spaces into the keyword's designation.
//!
//! Markers the renderer never executes are skipped, so the n-th declaration
//! found is the n-th anchor placed on the page:
//!
//! - literal blocks introduced by a paragraph ending in `::`
//! - bodies of comments and of code-like directives ([`LITERAL_DIRECTIVES`])
//!
//! Bodies of every other directive (`note`, `only`, ...) are scanned.
//! `include` is not followed here; callers inline included files first.

use crate::error::DirectiveError;

/// One required argument plus up to ten optional ones.
pub const MAX_ARGUMENTS: usize = 11;

/// Directives whose body is shown verbatim instead of parsed.
pub const LITERAL_DIRECTIVES: &[&str] = &[
    "code",
    "code-block",
    "sourcecode",
    "literalinclude",
    "parsed-literal",
    "raw",
    "math",
    "productionlist",
    "doctest",
    "testcode",
    "testoutput",
    "testsetup",
    "testcleanup",
    "highlight",
];

/// A directive occurrence found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDeclaration {
    /// 1-based line of the `..` marker.
    pub line: u32,
    pub designation: String,
}

/// Scans a document for directives called `name`.
pub struct DirectiveScanner {
    marker: String,
}

impl DirectiveScanner {
    pub fn new(name: &str) -> Self {
        Self {
            marker: format!("{}::", name),
        }
    }

    /// Every occurrence of the directive in `source`, in document order.
    ///
    /// Malformed occurrences come back as errors alongside the valid ones so
    /// one bad directive does not hide the rest.
    pub fn scan(
        &self,
        document: &str,
        source: &str,
    ) -> Vec<Result<KeywordDeclaration, DirectiveError>> {
        let lines: Vec<&str> = source.lines().collect();
        let mut found = Vec::new();
        // Indent of the line that opened a verbatim block; deeper lines
        // belong to it.
        let mut verbatim: Option<usize> = None;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let indent = indent_of(line);

            if let Some(base) = verbatim {
                if line.trim().is_empty() || indent > base {
                    i += 1;
                    continue;
                }
                verbatim = None;
            }

            let Some((indent, first_args)) = self.match_marker(line) else {
                if opens_verbatim_block(line) {
                    verbatim = Some(indent);
                }
                i += 1;
                continue;
            };
            let line_no = (i + 1) as u32;
            let mut args: Vec<&str> = first_args.split_whitespace().collect();

            i += 1;
            while i < lines.len() && is_argument_continuation(lines[i], indent) {
                args.extend(lines[i].split_whitespace());
                i += 1;
            }

            found.push(self.declaration(document, line_no, args));
        }

        found
    }

    /// Column of the `..` marker and the rest of the line after `name::`.
    fn match_marker<'a>(&self, line: &'a str) -> Option<(usize, &'a str)> {
        let trimmed = line.trim_start();
        let indent = indent_of(line);
        let rest = trimmed.strip_prefix("..")?;
        let rest = rest.strip_prefix(|c: char| c.is_whitespace())?.trim_start();
        let args = rest.strip_prefix(self.marker.as_str())?;
        if !args.is_empty() && !args.starts_with(char::is_whitespace) {
            return None;
        }
        Some((indent, args))
    }

    fn declaration(
        &self,
        document: &str,
        line: u32,
        args: Vec<&str>,
    ) -> Result<KeywordDeclaration, DirectiveError> {
        let directive = self.marker.trim_end_matches(':').to_string();
        if args.is_empty() {
            return Err(DirectiveError::MissingArgument {
                directive,
                document: document.to_string(),
                line,
            });
        }
        if args.len() > MAX_ARGUMENTS {
            return Err(DirectiveError::TooManyArguments {
                directive,
                document: document.to_string(),
                line,
                max: MAX_ARGUMENTS,
                given: args.len(),
            });
        }
        Ok(KeywordDeclaration {
            line,
            designation: args.join(" "),
        })
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// True for lines whose indented continuation the renderer does not parse:
/// comments, code-like directives and paragraphs ending in `::`.
fn opens_verbatim_block(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(markup) = trimmed.strip_prefix("..") else {
        return trimmed.ends_with("::");
    };
    if markup.is_empty() {
        return true;
    }
    if !markup.starts_with(char::is_whitespace) {
        return trimmed.ends_with("::");
    }
    let markup = markup.trim_start();
    match markup.find("::") {
        Some(end) => {
            let name = &markup[..end];
            if name.starts_with('|') {
                // Substitution definition: `.. |x| image:: ...`.
                return false;
            }
            if name.contains(char::is_whitespace) {
                // `::` inside comment text.
                return true;
            }
            LITERAL_DIRECTIVES.contains(&name)
        }
        // Targets and footnotes have no body; anything else is a comment.
        None => !(markup.starts_with('_') || markup.starts_with('[')),
    }
}

fn is_argument_continuation(line: &str, marker_indent: usize) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return false;
    }
    indent_of(line) > marker_indent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Result<KeywordDeclaration, DirectiveError>> {
        DirectiveScanner::new("qtkeyword").scan("doc", source)
    }

    #[test]
    fn finds_single_line_directive() {
        let found = scan("Title\n=====\n\n.. qtkeyword:: name=\"cos\" id=\"cos-builtin\"\n\nText.\n");
        assert_eq!(
            found,
            vec![Ok(KeywordDeclaration {
                line: 4,
                designation: "name=\"cos\" id=\"cos-builtin\"".to_string(),
            })]
        );
    }

    #[test]
    fn joins_continuation_lines() {
        let found = scan("  .. qtkeyword:: name=\"sin\"\n      id=\"sin\"\n  next paragraph\n");
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].as_ref().unwrap().designation,
            "name=\"sin\" id=\"sin\""
        );
        assert_eq!(found[0].as_ref().unwrap().line, 1);
    }

    #[test]
    fn stops_at_option_and_blank_lines() {
        let found = scan(".. qtkeyword:: a\n   :class: x\n.. qtkeyword:: b\n\n   c\n");
        let designations: Vec<String> = found
            .into_iter()
            .map(|r| r.unwrap().designation)
            .collect();
        assert_eq!(designations, vec!["a", "b"]);
    }

    #[test]
    fn ignores_other_directives_and_prefixes() {
        let found = scan(".. note:: qtkeyword:: x\n.. qtkeywords:: y\n..qtkeyword:: z\n");
        assert!(found.is_empty());
    }

    #[test]
    fn missing_argument_is_reported() {
        let found = scan("text\n.. qtkeyword::\n");
        assert_eq!(
            found,
            vec![Err(DirectiveError::MissingArgument {
                directive: "qtkeyword".to_string(),
                document: "doc".to_string(),
                line: 2,
            })]
        );
    }

    #[test]
    fn too_many_arguments_is_reported_and_scan_continues() {
        let args = (0..12).map(|i| format!("a{}", i)).collect::<Vec<_>>().join(" ");
        let source = format!(".. qtkeyword:: {}\n.. qtkeyword:: ok\n", args);
        let found = scan(&source);
        assert!(matches!(
            found[0],
            Err(DirectiveError::TooManyArguments { given: 12, .. })
        ));
        assert_eq!(found[1].as_ref().unwrap().designation, "ok");
    }

    fn designations(source: &str) -> Vec<String> {
        scan(source)
            .into_iter()
            .filter_map(Result::ok)
            .map(|d| d.designation)
            .collect()
    }

    #[test]
    fn skips_literal_blocks_and_code_bodies() {
        let source = "Use it like this::\n\n    .. qtkeyword:: name=\"fake\"\n\n\
                      .. code-block:: rst\n\n   .. qtkeyword:: name=\"fake2\"\n\n\
                      .. qtkeyword:: name=\"real\"\n";
        assert_eq!(designations(source), vec!["name=\"real\""]);
    }

    #[test]
    fn expanded_literal_marker_and_comments() {
        let source = "Example:\n\n::\n\n  .. qtkeyword:: a\n\n\
                      ..\n   .. qtkeyword:: b\n\n\
                      .. disabled for now\n   .. qtkeyword:: c\n\n\
                      .. qtkeyword:: d\n";
        assert_eq!(designations(source), vec!["d"]);
    }

    #[test]
    fn scans_bodies_of_parsed_directives() {
        let source = ".. note::\n\n   .. qtkeyword:: in-note\n\n\
                      .. _target:\n\n.. qtkeyword:: after-target\n";
        assert_eq!(designations(source), vec!["in-note", "after-target"]);
    }

    #[test]
    fn literal_block_ends_at_dedent() {
        let source = "  Indented paragraph::\n\n      code\n\n  .. qtkeyword:: same-level\n";
        assert_eq!(designations(source), vec!["same-level"]);
    }

    #[test]
    fn custom_directive_name() {
        let found = DirectiveScanner::new("helpkw").scan("d", ".. helpkw:: name=\"x\"\n");
        assert_eq!(found.len(), 1);
    }
}
