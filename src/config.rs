//! TOML configuration (`doc-tool.toml`).
//!
//! Every section is optional; a missing file at the default location means
//! "use the built-in defaults", which mirror the layout of the manual source
//! tree (four languages, `sphinx-build` and `qcollectiongenerator` on
//! `PATH`, custom keywords ignored).
//!
//! ```toml
//! [docs]
//! source_dir = "doc/manual"
//! languages = ["de", "en", "es", "fr"]
//!
//! [keywords]
//! ignore_custom_keywords = false
//!
//! [[keywords.ids]]
//! id = "cos"
//! document = "functions"
//! anchor = "cos"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Location probed when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./doc-tool.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            source_language: default_source_language(),
            languages: default_languages(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_source_language() -> String {
    "en".to_string()
}
fn default_languages() -> Vec<String> {
    ["de", "en", "es", "fr"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_sphinx_build")]
    pub sphinx_build: PathBuf,
    #[serde(default = "default_qcollectiongenerator")]
    pub qcollectiongenerator: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sphinx_build: default_sphinx_build(),
            qcollectiongenerator: default_qcollectiongenerator(),
        }
    }
}

fn default_sphinx_build() -> PathBuf {
    PathBuf::from("sphinx-build")
}
fn default_qcollectiongenerator() -> PathBuf {
    PathBuf::from("qcollectiongenerator")
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    /// When set, keyword directives declare nothing and the help builder
    /// passes the generic index through unchanged.
    #[serde(default = "default_true")]
    pub ignore_custom_keywords: bool,
    #[serde(default = "default_directive")]
    pub directive: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Appended to a document name to get its rendered location.
    #[serde(default = "default_target_suffix")]
    pub target_suffix: String,
    /// Keywords pointing at existing anchors, declared outside the sources.
    #[serde(default)]
    pub ids: Vec<IdKeywordConfig>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            ignore_custom_keywords: true,
            directive: default_directive(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            target_suffix: default_target_suffix(),
            ids: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IdKeywordConfig {
    pub id: String,
    pub document: String,
    pub anchor: String,
}

fn default_true() -> bool {
    true
}
fn default_directive() -> String {
    "qtkeyword".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.rst".to_string()]
}
fn default_target_suffix() -> String {
    ".html".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundleConfig {
    #[serde(default = "default_help_builder")]
    pub builder: String,
    #[serde(default = "default_bundle_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_basename_prefix")]
    pub basename_prefix: String,
    #[serde(default = "default_qrc_prefix")]
    pub qrc_prefix: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            builder: default_help_builder(),
            tags: default_bundle_tags(),
            basename_prefix: default_basename_prefix(),
            qrc_prefix: default_qrc_prefix(),
        }
    }
}

fn default_help_builder() -> String {
    "qthelp".to_string()
}
fn default_bundle_tags() -> Vec<String> {
    vec!["sc_bundled_docs".to_string()]
}
fn default_basename_prefix() -> String {
    "manual".to_string()
}
fn default_qrc_prefix() -> String {
    "/manual".to_string()
}

impl BundleConfig {
    /// Help-project basename for one language, e.g. `manual-de`.
    pub fn basename(&self, lang: &str) -> String {
        format!("{}-{}", self.basename_prefix, lang)
    }
}

impl Config {
    /// Built-in defaults, used when no configuration file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Validate a language selection against the configured languages.
    ///
    /// An empty selection means "all configured languages".
    pub fn select_languages(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.docs.languages.clone());
        }
        for lang in requested {
            if !self.docs.languages.contains(lang) {
                anyhow::bail!(
                    "Unknown language code: '{}'. Configured: {}",
                    lang,
                    self.docs.languages.join(", ")
                );
            }
        }
        // Keep configured order so the first failure is well defined.
        Ok(self
            .docs
            .languages
            .iter()
            .filter(|l| requested.contains(l))
            .cloned()
            .collect())
    }
}

/// Load the configuration file.
///
/// When `explicit` is false and the file does not exist, the defaults are
/// returned; an explicitly requested file must exist.
pub fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.docs.languages.is_empty() {
        anyhow::bail!("docs.languages must not be empty");
    }
    for lang in &config.docs.languages {
        if !is_language_code(lang) {
            anyhow::bail!(
                "Invalid language code in docs.languages: '{}'. Expected e.g. 'de' or 'pt_BR'.",
                lang
            );
        }
    }
    if !config
        .docs
        .languages
        .contains(&config.docs.source_language)
    {
        anyhow::bail!(
            "docs.source_language '{}' is not listed in docs.languages",
            config.docs.source_language
        );
    }

    if config.tools.sphinx_build.as_os_str().is_empty() {
        anyhow::bail!("tools.sphinx_build must not be empty");
    }
    if config.tools.qcollectiongenerator.as_os_str().is_empty() {
        anyhow::bail!("tools.qcollectiongenerator must not be empty");
    }

    if config.keywords.directive.is_empty()
        || config.keywords.directive.chars().any(char::is_whitespace)
    {
        anyhow::bail!("keywords.directive must be a single non-empty word");
    }
    if config.keywords.include_globs.is_empty() {
        anyhow::bail!("keywords.include_globs must not be empty");
    }
    for id in &config.keywords.ids {
        if id.id.is_empty() || id.document.is_empty() || id.anchor.is_empty() {
            anyhow::bail!("keywords.ids entries need non-empty id, document and anchor");
        }
    }

    if config.bundle.builder.is_empty() {
        anyhow::bail!("bundle.builder must not be empty");
    }

    Ok(())
}

/// `xx`, `xxx`, or either followed by `_YY` / `-YY`.
fn is_language_code(code: &str) -> bool {
    let (lang, region) = match code.find(['_', '-']) {
        Some(pos) => (&code[..pos], Some(&code[pos + 1..])),
        None => (code, None),
    };
    let lang_ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
    let region_ok = region.map_or(true, |r| {
        (2..=4).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric())
    });
    lang_ok && region_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.docs.languages, vec!["de", "en", "es", "fr"]);
        assert_eq!(config.docs.source_language, "en");
        assert!(config.keywords.ignore_custom_keywords);
        assert_eq!(config.keywords.directive, "qtkeyword");
        assert_eq!(config.bundle.builder, "qthelp");
        assert_eq!(config.bundle.basename("de"), "manual-de");
    }

    #[test]
    fn parses_id_keywords() {
        let config = parse(
            r#"
[keywords]
ignore_custom_keywords = false

[[keywords.ids]]
id = "cos"
document = "functions"
anchor = "cos"
"#,
        )
        .unwrap();
        assert!(!config.keywords.ignore_custom_keywords);
        assert_eq!(config.keywords.ids.len(), 1);
        assert_eq!(config.keywords.ids[0].document, "functions");
    }

    #[test]
    fn rejects_bad_language_code() {
        let err = parse("[docs]\nlanguages = [\"en\", \"English\"]\n").unwrap_err();
        assert!(err.to_string().contains("English"));
    }

    #[test]
    fn rejects_source_language_outside_list() {
        let err = parse("[docs]\nlanguages = [\"de\"]\n").unwrap_err();
        assert!(err.to_string().contains("source_language"));
    }

    #[test]
    fn accepts_regional_codes() {
        assert!(is_language_code("pt_BR"));
        assert!(is_language_code("zh-Hans"));
        assert!(!is_language_code("e"));
        assert!(!is_language_code("EN"));
    }

    #[test]
    fn select_languages_keeps_configured_order() {
        let config = Config::minimal();
        let picked = config
            .select_languages(&["fr".to_string(), "de".to_string()])
            .unwrap();
        assert_eq!(picked, vec!["de", "fr"]);
        assert!(config.select_languages(&["xx".to_string()]).is_err());
        assert_eq!(config.select_languages(&[]).unwrap().len(), 4);
    }

    #[test]
    fn missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc-tool.toml");
        let config = load_config(&path, false).unwrap();
        assert_eq!(config.docs.languages.len(), 4);
        assert!(load_config(&path, true).is_err());
    }
}
