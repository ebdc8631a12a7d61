//! Build environment: state that survives between incremental keyword
//! passes over the same output directory.
//!
//! The environment owns the [`KeywordRegistry`] together with a fingerprint
//! of every document it has parsed. It is stored as JSON next to the build
//! output, so each (language, format) output directory has its own and
//! nothing is shared between them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::directive::DirectiveScanner;
use crate::keywords::KeywordRegistry;
use crate::models::{AnchorTarget, KeywordRecord, KEYWORD_ANCHOR_PREFIX};

/// Bumped whenever the persisted layout changes; older files are discarded.
pub const ENV_VERSION: u32 = 1;

/// File name of the persisted environment inside an output directory.
pub const ENV_FILE_NAME: &str = ".doc-tool-env.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEnvironment {
    version: u32,
    /// docname -> SHA-256 of the source the records were parsed from.
    documents: BTreeMap<String, String>,
    registry: KeywordRegistry,
    /// Fingerprint of the keyword settings the documents were parsed with.
    #[serde(default)]
    settings: String,
    /// Fingerprint of the last manifest written by the keyword pass.
    #[serde(default)]
    spliced_manifest: Option<String>,
    #[serde(skip)]
    ignore_custom_keywords: bool,
    /// Per-document serial numbers; reset for every parse.
    #[serde(skip)]
    serials: HashMap<(String, String), u32>,
}

impl BuildEnvironment {
    pub fn new(ignore_custom_keywords: bool) -> Self {
        Self {
            version: ENV_VERSION,
            documents: BTreeMap::new(),
            registry: KeywordRegistry::new(),
            settings: String::new(),
            spliced_manifest: None,
            ignore_custom_keywords,
            serials: HashMap::new(),
        }
    }

    /// Load the environment stored at `path`.
    ///
    /// A missing, unreadable or outdated file yields a fresh environment,
    /// which makes the next pass a full one.
    pub fn load(path: &Path, ignore_custom_keywords: bool) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::new(ignore_custom_keywords);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read environment, starting fresh");
                return Self::new(ignore_custom_keywords);
            }
        };

        match serde_json::from_str::<BuildEnvironment>(&content) {
            Ok(mut env) if env.version == ENV_VERSION => {
                env.ignore_custom_keywords = ignore_custom_keywords;
                env
            }
            Ok(env) => {
                tracing::info!(
                    found = env.version,
                    expected = ENV_VERSION,
                    "environment version changed, starting fresh"
                );
                Self::new(ignore_custom_keywords)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt environment, starting fresh");
                Self::new(ignore_custom_keywords)
            }
        }
    }

    /// Write the environment to `path` through a temporary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write environment: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace environment: {}", path.display()))?;
        Ok(())
    }

    /// Forget every document if `settings` differs from the settings the
    /// environment was built with. Returns true when it did.
    pub fn check_settings(&mut self, settings: &str) -> bool {
        if self.settings == settings {
            return false;
        }
        if !self.documents.is_empty() {
            tracing::info!("keyword settings changed, re-reading all documents");
        }
        let spliced = self.spliced_manifest.take();
        *self = Self::new(self.ignore_custom_keywords);
        self.settings = settings.to_string();
        self.spliced_manifest = spliced;
        true
    }

    pub fn spliced_manifest(&self) -> Option<&str> {
        self.spliced_manifest.as_deref()
    }

    pub fn set_spliced_manifest(&mut self, fingerprint: String) {
        self.spliced_manifest = Some(fingerprint);
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    pub fn ignore_custom_keywords(&self) -> bool {
        self.ignore_custom_keywords
    }

    /// Documents known to the environment.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// True when `source` differs from what `document` was last parsed from.
    pub fn is_outdated(&self, document: &str, source: &str) -> bool {
        self.documents.get(document) != Some(&fingerprint(source))
    }

    /// Hook: `document` is about to be re-parsed or has been removed.
    pub fn on_document_purge(&mut self, document: &str) {
        let removed = self.registry.purge(document);
        self.documents.remove(document);
        self.serials.retain(|(doc, _), _| doc != document);
        if removed > 0 {
            tracing::debug!(document, removed, "purged keywords");
        }
    }

    /// Hook: a keyword directive was parsed in `document` at `line`.
    ///
    /// Creates the anchor the keyword will point at and returns it.
    pub fn on_document_parsed_keyword(
        &mut self,
        document: &str,
        line: u32,
        designation: &str,
    ) -> AnchorTarget {
        let serial = self.new_serial(document, KEYWORD_ANCHOR_PREFIX);
        let anchor = AnchorTarget::keyword(serial);
        self.registry.append(KeywordRecord::declared(
            document,
            line,
            anchor.clone(),
            designation,
        ));
        anchor
    }

    /// Add a keyword `id="<id>"` pointing at an anchor that already exists
    /// in `document`, whose rendered location is `target_uri`.
    pub fn add_id_keyword(&mut self, id: &str, document: &str, anchor: &str, target_uri: &str) {
        self.registry.append(KeywordRecord {
            source_document: document.to_string(),
            source_line: 0,
            anchor_target: Some(AnchorTarget::new(anchor)),
            designation: format!("id=\"{}\"", id),
            resolved_reference: Some(format!("{}#{}", target_uri, anchor)),
        });
    }

    /// Parse `document` for keyword directives and record the declarations.
    ///
    /// The caller purges the document first. Returns the number of keywords
    /// declared; malformed directives are reported and skipped.
    pub fn parse_document(
        &mut self,
        scanner: &DirectiveScanner,
        document: &str,
        source: &str,
    ) -> usize {
        self.documents
            .insert(document.to_string(), fingerprint(source));
        if self.ignore_custom_keywords {
            return 0;
        }

        let mut declared = 0;
        for found in scanner.scan(document, source) {
            match found {
                Ok(decl) => {
                    self.on_document_parsed_keyword(document, decl.line, &decl.designation);
                    declared += 1;
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
        declared
    }

    /// Resolve the references of every keyword of `document`.
    pub fn resolve<F>(&mut self, document: &str, target_uri: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        self.registry.resolve(document, target_uri)
    }

    fn new_serial(&mut self, document: &str, category: &str) -> u32 {
        let next = self
            .serials
            .entry((document.to_string(), category.to_string()))
            .or_insert(0);
        let serial = *next;
        *next += 1;
        serial
    }
}

/// Hex SHA-256 of a document's source text.
pub fn fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> DirectiveScanner {
        DirectiveScanner::new("qtkeyword")
    }

    #[test]
    fn anchors_are_numbered_per_document() {
        let mut env = BuildEnvironment::new(false);
        let a0 = env.on_document_parsed_keyword("a", 1, "x");
        let a1 = env.on_document_parsed_keyword("a", 2, "y");
        let b0 = env.on_document_parsed_keyword("b", 1, "z");
        assert_eq!(a0.id, "kw-0");
        assert_eq!(a1.id, "kw-1");
        assert_eq!(b0.id, "kw-0");

        env.on_document_purge("a");
        let again = env.on_document_parsed_keyword("a", 1, "x");
        assert_eq!(again.id, "kw-0");
    }

    #[test]
    fn parse_records_declarations() {
        let mut env = BuildEnvironment::new(false);
        let source = ".. qtkeyword:: name=\"cos\"\n\n.. qtkeyword:: name=\"sin\"\n";
        assert_eq!(env.parse_document(&scanner(), "math", source), 2);
        let records = env.registry().all_records();
        assert_eq!(records[0].source_line, 1);
        assert_eq!(records[1].source_line, 3);
        assert_eq!(records[1].anchor_target, Some(AnchorTarget::new("kw-1")));
        assert!(!env.is_outdated("math", source));
        assert!(env.is_outdated("math", "changed"));
    }

    #[test]
    fn ignored_keywords_declare_nothing() {
        let mut env = BuildEnvironment::new(true);
        assert_eq!(
            env.parse_document(&scanner(), "math", ".. qtkeyword:: name=\"cos\"\n"),
            0
        );
        assert!(env.registry().is_empty());
        assert_eq!(env.documents().collect::<Vec<_>>(), vec!["math"]);
    }

    #[test]
    fn malformed_directive_is_skipped() {
        let mut env = BuildEnvironment::new(false);
        let n = env.parse_document(&scanner(), "d", ".. qtkeyword::\n.. qtkeyword:: ok\n");
        assert_eq!(n, 1);
        assert_eq!(env.registry().all_records()[0].designation, "ok");
    }

    #[test]
    fn id_keywords_are_resolved_on_creation() {
        let mut env = BuildEnvironment::new(false);
        env.add_id_keyword("cos", "functions", "cos", "functions.html");
        let record = &env.registry().all_records()[0];
        assert_eq!(record.designation, "id=\"cos\"");
        assert_eq!(
            record.resolved_reference.as_deref(),
            Some("functions.html#cos")
        );
    }

    #[test]
    fn changed_settings_drop_all_documents() {
        let mut env = BuildEnvironment::new(false);
        assert!(env.check_settings("v1"));
        env.parse_document(&scanner(), "a", ".. qtkeyword:: x\n");
        assert!(!env.check_settings("v1"));
        assert_eq!(env.registry().len(), 1);

        assert!(env.check_settings("v2"));
        assert!(env.registry().is_empty());
        assert_eq!(env.documents().count(), 0);
        assert!(!env.ignore_custom_keywords());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(ENV_FILE_NAME);

        let mut env = BuildEnvironment::new(false);
        env.parse_document(&scanner(), "a", ".. qtkeyword:: name=\"a\"\n");
        env.resolve("a", |d| Some(format!("{}.html", d)));
        env.save(&path).unwrap();

        let loaded = BuildEnvironment::load(&path, true);
        assert_eq!(loaded.registry(), env.registry());
        assert!(loaded.ignore_custom_keywords());
        assert!(!loaded.is_outdated("a", ".. qtkeyword:: name=\"a\"\n"));
    }

    #[test]
    fn corrupt_or_outdated_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENV_FILE_NAME);

        std::fs::write(&path, "not json").unwrap();
        assert!(BuildEnvironment::load(&path, false).registry().is_empty());

        std::fs::write(
            &path,
            r#"{"version": 0, "documents": {"a": "x"}, "registry": {"records": []}}"#,
        )
        .unwrap();
        let env = BuildEnvironment::load(&path, false);
        assert_eq!(env.documents().count(), 0);
    }
}
