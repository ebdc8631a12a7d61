//! Core data types shared by the keyword pass and the build driver.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Prefix of anchors created for keyword directives (`kw-0`, `kw-1`, ...).
pub const KEYWORD_ANCHOR_PREFIX: &str = "kw";

/// In-document marker created at declaration time.
///
/// It only names a fragment; the document part of the reference is known
/// once the renderer has placed the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTarget {
    pub id: String,
}

impl AnchorTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Anchor for the `serial`-th keyword directive of a document.
    pub fn keyword(serial: u32) -> Self {
        Self::new(format!("{}-{}", KEYWORD_ANCHOR_PREFIX, serial))
    }
}

/// One declared keyword entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRecord {
    /// Document (docname) that declared the keyword.
    pub source_document: String,
    /// 1-based source line; 0 when not declared in a source file.
    pub source_line: u32,
    pub anchor_target: Option<AnchorTarget>,
    /// Attribute text written by the author, e.g. `name="cos" id="cos-builtin"`.
    pub designation: String,
    /// Document location plus anchor fragment, set by `resolve`.
    pub resolved_reference: Option<String>,
}

impl KeywordRecord {
    /// A freshly declared record with its reference still unresolved.
    pub fn declared(
        document: impl Into<String>,
        line: u32,
        anchor: AnchorTarget,
        designation: impl Into<String>,
    ) -> Self {
        Self {
            source_document: document.into(),
            source_line: line,
            anchor_target: Some(anchor),
            designation: designation.into(),
            resolved_reference: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_reference
            .as_deref()
            .is_some_and(|r| !r.is_empty())
    }
}

/// One item of the renderer's generic index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub term: String,
    pub reference: String,
}

impl IndexEntry {
    pub fn new(term: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            reference: reference.into(),
        }
    }
}

/// One (language, output format) invocation of the documentation generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub language: Option<String>,
    pub builder: String,
    pub outdir: PathBuf,
    pub tags: Vec<String>,
    pub overrides: BTreeMap<String, String>,
}

impl BuildTarget {
    /// A target writing into `build_dir`, or `build_dir/<lang>` when a
    /// language is given.
    pub fn new(build_dir: &Path, language: Option<&str>, builder: &str) -> Self {
        let mut overrides = BTreeMap::new();
        let outdir = match language {
            Some(lang) => {
                overrides.insert("language".to_string(), lang.to_string());
                build_dir.join(lang)
            }
            None => build_dir.to_path_buf(),
        };
        Self {
            language: language.map(str::to_string),
            builder: builder.to_string(),
            outdir,
            tags: Vec::new(),
            overrides,
        }
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags.extend(tags.iter().cloned());
        self
    }

    pub fn with_override(mut self, key: &str, value: &str) -> Self {
        self.overrides.insert(key.to_string(), value.to_string());
        self
    }

    /// Generator arguments: `SOURCE OUTDIR -b BUILDER [-D k=v].. [-t tag]..`.
    pub fn generator_args(&self, source_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            source_dir.as_os_str().to_owned(),
            self.outdir.as_os_str().to_owned(),
            "-b".into(),
            self.builder.clone().into(),
        ];
        for (key, value) in &self.overrides {
            args.push("-D".into());
            args.push(format!("{}={}", key, value).into());
        }
        for tag in &self.tags {
            args.push("-t".into());
            args.push(tag.clone().into());
        }
        args
    }

    /// Short label for logs and progress, e.g. `qthelp:de`.
    pub fn label(&self) -> String {
        match &self.language {
            Some(lang) => format!("{}:{}", self.builder, lang),
            None => self.builder.clone(),
        }
    }
}
