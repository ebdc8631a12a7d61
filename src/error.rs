//! Error types for the library seams.
//!
//! Command-level code works in `anyhow::Result` and attaches file-path
//! context; the types here are the failures callers need to tell apart:
//!
//! - [`ToolError`] carries the exit status of an external tool so the CLI
//!   can exit with the same code.
//! - [`HelpError`] is raised while building the help-project keyword index.
//! - [`DirectiveError`] describes a malformed keyword directive. It is
//!   reported as a warning; the build goes on without that keyword.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to run an external documentation tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be started (not found, not executable, ...).
    #[error("failed to launch {tool} ({}): {source}", .binary.display())]
    Launch {
        tool: String,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("{tool} exited with status {code}")]
    Failed { tool: String, code: i32 },
}

impl ToolError {
    /// Exit status the CLI should terminate with for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolError::Launch { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => 127,
                std::io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            ToolError::Failed { code, .. } => *code,
        }
    }
}

/// Exit status for an error: the code of the first [`ToolError`] in the
/// chain, 1 otherwise.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ToolError>())
        .map_or(1, ToolError::exit_code)
}

/// Failure while producing the keyword list of a help project.
#[derive(Debug, Error)]
pub enum HelpError {
    /// A generic index entry handed over by the renderer lacks a term or a
    /// reference.
    #[error("malformed index entry in group '{group}': {reason}")]
    MalformedIndexEntry { group: String, reason: String },

    /// The help-project manifest has no `<keywords>` section to splice into.
    #[error("help project has no <keywords> section")]
    MissingKeywordSection,

    /// The manifest's keyword section is not well-formed XML.
    #[error("invalid keyword markup: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// A keyword directive that cannot be turned into a keyword record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("{document}:{line}: {directive} directive requires at least 1 argument")]
    MissingArgument {
        directive: String,
        document: String,
        line: u32,
    },

    #[error(
        "{document}:{line}: {directive} directive accepts at most {max} arguments, {given} given"
    )]
    TooManyArguments {
        directive: String,
        document: String,
        line: u32,
        max: usize,
        given: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_tool_keeps_exit_code() {
        let err = ToolError::Failed {
            tool: "sphinx-build".to_string(),
            code: 2,
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "sphinx-build exited with status 2");
    }

    #[test]
    fn missing_binary_maps_to_127() {
        let err = ToolError::Launch {
            tool: "qcollectiongenerator".to_string(),
            binary: PathBuf::from("/nonexistent/qcg"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn exit_code_is_found_behind_context() {
        let err = anyhow::Error::from(ToolError::Failed {
            tool: "sphinx-build".to_string(),
            code: 3,
        })
        .context("1 of 2 builds failed, first: html:de");
        assert_eq!(exit_code_of(&err), 3);
        assert_eq!(exit_code_of(&anyhow::anyhow!("plain")), 1);
    }
}
