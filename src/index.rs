//! Incremental keyword pass over the documentation sources.
//!
//! One pass per output directory:
//!
//! 1. Load the build environment stored in the output directory.
//! 2. Walk the source tree and fingerprint every document.
//! 3. Purge removed documents; purge, re-parse and resolve changed ones.
//! 4. Save the environment and emit the keyword index: spliced into the
//!    help-project manifest when there is one, printed otherwise.
//!
//! Unchanged documents keep the references computed when they were last
//! parsed.
//!
//! `.. include::` directives are inlined before scanning, as the renderer
//! does, so keywords in an included file are numbered in the including
//! document's anchor sequence and editing the included file re-parses every
//! document that includes it. An included file matching the include globs
//! is also scanned as a document of its own; exclude such fragments in
//! `[keywords].exclude_globs` the same way the generator excludes them.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, KeywordsConfig};
use crate::directive::DirectiveScanner;
use crate::env::{fingerprint, BuildEnvironment, ENV_FILE_NAME};
use crate::help::{splice_keywords, strip_declared_keywords, HelpBuilder};

/// A source document found in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Relative path without suffix, `/`-separated (`howto/functions`).
    pub docname: String,
    pub path: PathBuf,
}

/// What a keyword pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub documents: usize,
    pub reparsed: usize,
    pub removed: usize,
    pub keywords: usize,
    pub unresolved: usize,
}

/// Documents under `source_dir` matching the configured globs, sorted by
/// docname.
pub fn scan_documents(source_dir: &Path, keywords: &KeywordsConfig) -> Result<Vec<SourceDocument>> {
    if !source_dir.is_dir() {
        bail!(
            "Documentation source directory does not exist: {}",
            source_dir.display()
        );
    }

    let include_set = build_globset(&keywords.include_globs)?;
    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "_build*/**".to_string(),
        "**/_build*/**".to_string(),
    ];
    default_excludes.extend(keywords.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(source_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(source_dir).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let docname = match rel_str.rfind('.') {
            Some(dot) if dot > rel_str.rfind('/').map_or(0, |s| s + 1) => rel_str[..dot].to_string(),
            _ => rel_str,
        };
        documents.push(SourceDocument {
            docname,
            path: path.to_path_buf(),
        });
    }

    documents.sort_by(|a, b| a.docname.cmp(&b.docname));
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Bring `env` up to date with `documents`.
pub fn update_environment(
    env: &mut BuildEnvironment,
    source_dir: &Path,
    documents: &[SourceDocument],
    keywords: &KeywordsConfig,
) -> Result<PassSummary> {
    let scanner = DirectiveScanner::new(&keywords.directive);
    let suffix = keywords.target_suffix.as_str();
    let settings = settings_fingerprint(keywords, env.ignore_custom_keywords());
    env.check_settings(&settings);
    let mut summary = PassSummary {
        documents: documents.len(),
        ..PassSummary::default()
    };

    let removed: Vec<String> = env
        .documents()
        .filter(|known| !documents.iter().any(|d| d.docname == *known))
        .map(str::to_string)
        .collect();
    for docname in &removed {
        env.on_document_purge(docname);
    }
    summary.removed = removed.len();

    for doc in documents {
        let source = std::fs::read_to_string(&doc.path)
            .with_context(|| format!("Failed to read {}", doc.path.display()))?;
        let source = expand_includes(source_dir, &doc.path, &source, 0);
        if !env.is_outdated(&doc.docname, &source) {
            continue;
        }

        env.on_document_purge(&doc.docname);
        env.parse_document(&scanner, &doc.docname, &source);
        if !env.ignore_custom_keywords() {
            for id in keywords.ids.iter().filter(|id| id.document == doc.docname) {
                env.add_id_keyword(&id.id, &id.document, &id.anchor, &target_uri(&id.document, suffix));
            }
        }
        env.resolve(&doc.docname, |d| Some(target_uri(d, suffix)));
        summary.reparsed += 1;
    }

    summary.keywords = env.registry().len();
    summary.unresolved = env.registry().unresolved().count();
    Ok(summary)
}

/// Nesting limit for `.. include::`; deeper includes are left in place.
const MAX_INCLUDE_DEPTH: usize = 8;

/// `source` with every `.. include:: FILE` replaced by the file's content,
/// indented like the directive.
///
/// Paths starting with `/` are relative to `source_dir`, others to the
/// including file. Includes marked `:literal:` or `:code:` are kept as they
/// are. A file that cannot be read is left to the renderer to report.
pub fn expand_includes(source_dir: &Path, path: &Path, source: &str, depth: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let trimmed = line.trim_start();
        let Some(target) = trimmed
            .strip_prefix(".. include::")
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let indent = &line[..line.len() - trimmed.len()];
        let options: Vec<&str> = lines[i..]
            .iter()
            .take_while(|l| {
                let t = l.trim_start();
                t.starts_with(':') && l.len() - t.len() > indent.len()
            })
            .map(|l| l.trim())
            .collect();
        let verbatim = options
            .iter()
            .any(|o| o.starts_with(":literal:") || o.starts_with(":code:"));
        if verbatim || depth >= MAX_INCLUDE_DEPTH || target.starts_with('<') {
            if depth >= MAX_INCLUDE_DEPTH {
                tracing::warn!(file = %path.display(), target, "include nesting too deep");
            }
            out.push_str(line);
            out.push('\n');
            continue;
        }
        i += options.len();

        let included = match target.strip_prefix('/') {
            Some(rooted) => source_dir.join(rooted),
            None => path.parent().unwrap_or(source_dir).join(target),
        };
        match std::fs::read_to_string(&included) {
            Ok(content) => {
                let expanded = expand_includes(source_dir, &included, &content, depth + 1);
                for included_line in expanded.lines() {
                    if !included_line.is_empty() {
                        out.push_str(indent);
                    }
                    out.push_str(included_line);
                    out.push('\n');
                }
            }
            Err(e) => {
                tracing::warn!(
                    file = %path.display(),
                    include = %included.display(),
                    error = %e,
                    "cannot read included file"
                );
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

/// Everything that changes what parsing a document produces.
fn settings_fingerprint(keywords: &KeywordsConfig, ignore_custom_keywords: bool) -> String {
    fingerprint(&format!(
        "{}|{}|{}|{:?}",
        ignore_custom_keywords, keywords.directive, keywords.target_suffix, keywords.ids
    ))
}

/// Rendered location of a document.
pub fn target_uri(docname: &str, suffix: &str) -> String {
    format!("{}{}", docname, suffix)
}

/// Where the keyword pass for one output directory reads and writes.
#[derive(Debug, Clone)]
pub struct KeywordPass {
    pub source_dir: PathBuf,
    pub outdir: PathBuf,
    /// Help-project manifest to splice, if it exists.
    pub manifest: Option<PathBuf>,
    pub ignore_custom_keywords: bool,
}

impl KeywordPass {
    pub fn env_path(&self) -> PathBuf {
        self.outdir.join(ENV_FILE_NAME)
    }

    /// Run the pass. Returns the summary and, when there was no manifest to
    /// splice, the keyword lines for the caller to print.
    pub fn run(&self, config: &Config) -> Result<(PassSummary, Option<Vec<String>>)> {
        let env_path = self.env_path();
        let mut env = BuildEnvironment::load(&env_path, self.ignore_custom_keywords);
        let documents = scan_documents(&self.source_dir, &config.keywords)?;
        let summary = update_environment(&mut env, &self.source_dir, &documents, &config.keywords)?;

        tracing::info!(
            outdir = %self.outdir.display(),
            documents = summary.documents,
            reparsed = summary.reparsed,
            removed = summary.removed,
            keywords = summary.keywords,
            "keyword pass"
        );
        if summary.unresolved > 0 {
            tracing::warn!(unresolved = summary.unresolved, "keywords without a reference");
        }

        let printed = match self.manifest.as_deref().filter(|p| p.exists()) {
            Some(manifest) => {
                let spliced = self.splice_manifest(&env, manifest)?;
                env.set_spliced_manifest(fingerprint(&spliced));
                None
            }
            None => {
                let mut builder = HelpBuilder::new(env.registry(), env.ignore_custom_keywords());
                Some(builder.build_keyword_list("", &[])?)
            }
        };

        env.save(&env_path)?;
        Ok((summary, printed))
    }

    /// Rewrite the manifest's keyword section and return the new content.
    ///
    /// The generator's own manifest is kept next to it (`.qhp.generic`) so a
    /// manifest this pass already rewrote is never read back as the generic
    /// index.
    fn splice_manifest(&self, env: &BuildEnvironment, manifest: &Path) -> Result<String> {
        let current = std::fs::read_to_string(manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        let generic_copy = manifest.with_extension("qhp.generic");

        let already_spliced = env.spliced_manifest() == Some(fingerprint(&current).as_str());
        let generic = if already_spliced && generic_copy.exists() {
            std::fs::read_to_string(&generic_copy)
                .with_context(|| format!("Failed to read {}", generic_copy.display()))?
        } else {
            let current = if already_spliced {
                tracing::warn!(
                    copy = %generic_copy.display(),
                    "generator manifest copy missing, rebuilding it from the manifest"
                );
                strip_declared_keywords(&current, env.registry())
            } else {
                current
            };
            std::fs::write(&generic_copy, &current)
                .with_context(|| format!("Failed to write {}", generic_copy.display()))?;
            current
        };

        let mut builder = HelpBuilder::new(env.registry(), env.ignore_custom_keywords());
        let spliced = splice_keywords(&generic, &mut builder)
            .with_context(|| format!("Failed to index {}", manifest.display()))?;
        std::fs::write(manifest, &spliced)
            .with_context(|| format!("Failed to write {}", manifest.display()))?;
        Ok(spliced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn keywords_config() -> KeywordsConfig {
        KeywordsConfig {
            ignore_custom_keywords: false,
            ..KeywordsConfig::default()
        }
    }

    #[test]
    fn scan_finds_sources_and_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("howto")).unwrap();
        fs::create_dir_all(root.join("_build-html/en")).unwrap();
        fs::write(root.join("index.rst"), "x").unwrap();
        fs::write(root.join("howto/functions.rst"), "x").unwrap();
        fs::write(root.join("_build-html/en/copy.rst"), "x").unwrap();
        fs::write(root.join("conf.py"), "x").unwrap();

        let docs = scan_documents(root, &keywords_config()).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.docname.as_str()).collect();
        assert_eq!(names, vec!["howto/functions", "index"]);
    }

    #[test]
    fn scan_requires_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_documents(&dir.path().join("missing"), &keywords_config()).is_err());
    }

    #[test]
    fn incremental_update_reparses_only_changed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.rst"), ".. qtkeyword:: name=\"a1\"\n").unwrap();
        fs::write(root.join("b.rst"), ".. qtkeyword:: name=\"b1\"\n").unwrap();
        let config = keywords_config();

        let mut env = BuildEnvironment::new(false);
        let docs = scan_documents(root, &config).unwrap();
        let first = update_environment(&mut env, root, &docs, &config).unwrap();
        assert_eq!(first.reparsed, 2);
        assert_eq!(first.keywords, 2);

        fs::write(
            root.join("a.rst"),
            ".. qtkeyword:: name=\"a2\"\n.. qtkeyword:: name=\"a3\"\n",
        )
        .unwrap();
        let docs = scan_documents(root, &config).unwrap();
        let second = update_environment(&mut env, root, &docs, &config).unwrap();
        assert_eq!(second.reparsed, 1);

        let designations: Vec<&str> = env
            .registry()
            .all_records()
            .iter()
            .map(|r| r.designation.as_str())
            .collect();
        assert_eq!(designations, vec!["name=\"b1\"", "name=\"a2\"", "name=\"a3\""]);
        assert!(env.registry().all_records().iter().all(|r| r.is_resolved()));
        assert_eq!(
            env.registry().all_records()[2].resolved_reference.as_deref(),
            Some("a.html#kw-1")
        );
    }

    #[test]
    fn removed_documents_are_purged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.rst"), ".. qtkeyword:: name=\"a\"\n").unwrap();
        fs::write(root.join("b.rst"), ".. qtkeyword:: name=\"b\"\n").unwrap();
        let config = keywords_config();

        let mut env = BuildEnvironment::new(false);
        update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();
        fs::remove_file(root.join("a.rst")).unwrap();
        let summary =
            update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();

        assert_eq!(summary.removed, 1);
        assert_eq!(env.registry().len(), 1);
        assert_eq!(env.registry().all_records()[0].source_document, "b");
    }

    #[test]
    fn enabling_custom_keywords_reparses_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.rst"), ".. qtkeyword:: name=\"a\"\n").unwrap();
        let config = keywords_config();
        let docs = scan_documents(root, &config).unwrap();

        let mut env = BuildEnvironment::new(true);
        update_environment(&mut env, root, &docs, &config).unwrap();
        assert!(env.registry().is_empty());

        let dir2 = tempfile::tempdir().unwrap();
        let path = dir2.path().join(ENV_FILE_NAME);
        env.save(&path).unwrap();
        let mut env = BuildEnvironment::load(&path, false);
        let summary = update_environment(&mut env, root, &docs, &config).unwrap();
        assert_eq!(summary.reparsed, 1);
        assert_eq!(summary.keywords, 1);
    }

    #[test]
    fn configured_id_keywords_follow_their_document() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("functions.rst"), "no directives\n").unwrap();
        let mut config = keywords_config();
        config.ids.push(crate::config::IdKeywordConfig {
            id: "cos".to_string(),
            document: "functions".to_string(),
            anchor: "cos".to_string(),
        });

        let mut env = BuildEnvironment::new(false);
        update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();
        fs::write(root.join("functions.rst"), "edited\n").unwrap();
        update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();

        let records = env.registry().all_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].designation, "id=\"cos\"");
        assert_eq!(
            records[0].resolved_reference.as_deref(),
            Some("functions.html#cos")
        );
    }

    #[test]
    fn includes_are_inlined_with_directive_indent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("ref")).unwrap();
        fs::write(root.join("ref/part.inc"), ".. qtkeyword:: b\n\nText\n").unwrap();
        fs::write(root.join("shared.inc"), "shared\n").unwrap();
        let source = "A\n\n.. note::\n\n   .. include:: part.inc\n\n\
                      .. include:: /shared.inc\n\
                      .. include:: listing.py\n   :literal:\n\
                      .. include:: missing.inc\n";

        let out = expand_includes(root, &root.join("ref/page.rst"), source, 0);
        assert_eq!(
            out,
            "A\n\n.. note::\n\n   .. qtkeyword:: b\n\n   Text\n\n\
             shared\n\
             .. include:: listing.py\n   :literal:\n\
             .. include:: missing.inc\n"
        );
    }

    #[test]
    fn included_keywords_share_the_including_anchor_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("part.inc"), ".. qtkeyword:: name=\"inner\"\n").unwrap();
        fs::write(
            root.join("page.rst"),
            ".. qtkeyword:: name=\"first\"\n\n.. include:: part.inc\n\n.. qtkeyword:: name=\"last\"\n",
        )
        .unwrap();
        let config = keywords_config();

        let mut env = BuildEnvironment::new(false);
        update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();
        let refs: Vec<&str> = env
            .registry()
            .all_records()
            .iter()
            .filter_map(|r| r.resolved_reference.as_deref())
            .collect();
        assert_eq!(refs, vec!["page.html#kw-0", "page.html#kw-1", "page.html#kw-2"]);

        // Editing only the included file re-parses the including document.
        fs::write(root.join("part.inc"), "no keywords\n").unwrap();
        let summary =
            update_environment(&mut env, root, &scan_documents(root, &config).unwrap(), &config).unwrap();
        assert_eq!(summary.reparsed, 1);
        assert_eq!(env.registry().len(), 2);
    }

    #[test]
    fn pass_splices_manifest_and_persists_environment() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&out).unwrap();
        fs::write(src.join("math.rst"), ".. qtkeyword:: name=\"cos\" id=\"cos\"\n").unwrap();
        let manifest = out.join("manual-en.qhp");
        fs::write(
            &manifest,
            "<keywords>\n    <keyword name=\"abs\" id=\"abs\" ref=\"math.html#abs\"/>\n</keywords>\n",
        )
        .unwrap();

        let mut config = Config::minimal();
        config.keywords.ignore_custom_keywords = false;
        let pass = KeywordPass {
            source_dir: src,
            outdir: out.clone(),
            manifest: Some(manifest.clone()),
            ignore_custom_keywords: false,
        };
        let (summary, printed) = pass.run(&config).unwrap();
        assert_eq!(summary.keywords, 1);
        assert!(printed.is_none());
        assert!(pass.env_path().exists());

        let spliced = fs::read_to_string(&manifest).unwrap();
        assert_eq!(
            spliced,
            "<keywords>\n\
             \x20           <keyword name=\"abs\" ref=\"math.html#abs\"/>\n\
             \x20           <keyword name=\"cos\" id=\"cos\" ref=\"math.html#kw-0\"/>\n\
             </keywords>\n"
        );

        // A second pass re-reads nothing and does not duplicate keywords.
        let (summary, _) = pass.run(&config).unwrap();
        assert_eq!(summary.reparsed, 0);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), spliced);

        // A freshly generated manifest is spliced again.
        fs::write(
            &manifest,
            "<keywords>\n    <keyword name=\"sin\" ref=\"math.html#sin\"/>\n</keywords>\n",
        )
        .unwrap();
        pass.run(&config).unwrap();
        let spliced = fs::read_to_string(&manifest).unwrap();
        assert!(spliced.contains("name=\"sin\""));
        assert!(!spliced.contains("name=\"abs\""));
        assert_eq!(spliced.matches("kw-0").count(), 1);

        // Losing the generator's copy does not fail or duplicate keywords.
        fs::remove_file(manifest.with_extension("qhp.generic")).unwrap();
        pass.run(&config).unwrap();
        assert_eq!(fs::read_to_string(&manifest).unwrap(), spliced);
        let copy = fs::read_to_string(manifest.with_extension("qhp.generic")).unwrap();
        assert!(copy.contains("name=\"sin\""));
        assert!(!copy.contains("kw-0"));
    }
}
