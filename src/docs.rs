//! Documentation build orchestration.
//!
//! Composes generator invocations per language and output format:
//!
//! | Command | Builds |
//! |---------|--------|
//! | `extract-strings` | gettext templates plus `extra-doc-strings.pot` |
//! | `build-standalone-docs` | HTML per language in `<build>/<lang>` |
//! | `build-bundled-docs` | Qt Help per language, keyword pass, `.qch` collection, `manual.qrc` |
//! | `keywords` | the keyword pass alone |
//!
//! A failing language does not stop its siblings. The overall result is
//! the failure of the first failing language, in configured order.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{exit_code_of, ToolError};
use crate::index::KeywordPass;
use crate::models::BuildTarget;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::strings;
use crate::tools::Tools;

pub const EXTRA_STRINGS_DOMAIN: &str = "extra-doc-strings";
pub const QRC_FILE_NAME: &str = "manual.qrc";

/// Everything a build command needs.
#[derive(Clone)]
pub struct DocsContext {
    pub config: Config,
    pub tools: Tools,
    pub source_dir: PathBuf,
    pub ignore_custom_keywords: bool,
    pub progress: Arc<dyn BuildProgressReporter>,
}

impl DocsContext {
    fn keyword_pass(&self, outdir: &Path, manifest: Option<PathBuf>) -> KeywordPass {
        KeywordPass {
            source_dir: self.source_dir.clone(),
            outdir: outdir.to_path_buf(),
            manifest,
            ignore_custom_keywords: self.ignore_custom_keywords,
        }
    }
}

/// Run the generator for one target.
pub async fn build_docs(ctx: &DocsContext, target: &BuildTarget) -> Result<(), ToolError> {
    if let Some(lang) = &target.language {
        tracing::info!("Building docs for '{}'...", lang);
    }
    ctx.tools
        .sphinx_build(target.generator_args(&ctx.source_dir))
        .await
}

/// `extract-strings`: gettext templates for the manual plus the strings
/// used by the documentation extensions.
pub async fn extract_strings(ctx: &DocsContext, build_dir: &Path) -> Result<()> {
    let target = BuildTarget::new(build_dir, None, "gettext");
    ctx.progress.report(BuildProgressEvent::Building {
        target: target.label(),
        n: 1,
        total: 1,
    });
    build_docs(ctx, &target).await?;

    strings::extract_python_strings(
        &ctx.source_dir.join("extensions"),
        &build_dir.join(format!("{}.pot", EXTRA_STRINGS_DOMAIN)),
        Some(EXTRA_STRINGS_DOMAIN),
    )?;
    Ok(())
}

/// `build-standalone-docs`: HTML for every language.
///
/// With `parallel`, the per-language generator processes run concurrently.
pub async fn build_standalone_docs(
    ctx: &DocsContext,
    build_dir: &Path,
    languages: &[String],
    parallel: bool,
) -> Result<()> {
    let targets: Vec<BuildTarget> = languages
        .iter()
        .map(|lang| BuildTarget::new(build_dir, Some(lang), "html"))
        .collect();
    let total = targets.len() as u64;

    let mut results: Vec<Result<(), ToolError>> = Vec::with_capacity(targets.len());
    if parallel {
        let mut set = tokio::task::JoinSet::new();
        for (i, target) in targets.iter().enumerate() {
            ctx.progress.report(BuildProgressEvent::Building {
                target: target.label(),
                n: i as u64 + 1,
                total,
            });
            let ctx = ctx.clone();
            let target = target.clone();
            set.spawn(async move { (i, build_docs(&ctx, &target).await) });
        }
        let mut finished = Vec::with_capacity(targets.len());
        while let Some(joined) = set.join_next().await {
            finished.push(joined.context("build task panicked")?);
        }
        finished.sort_by_key(|(i, _)| *i);
        results.extend(finished.into_iter().map(|(_, result)| result));
    } else {
        for (i, target) in targets.iter().enumerate() {
            ctx.progress.report(BuildProgressEvent::Building {
                target: target.label(),
                n: i as u64 + 1,
                total,
            });
            results.push(build_docs(ctx, target).await);
        }
    }

    let outcomes = targets
        .iter()
        .zip(results)
        .map(|(target, result)| (target.label(), result.map_err(anyhow::Error::from)))
        .collect();
    first_failure(ctx, outcomes)
}

/// `build-bundled-docs`: Qt Help per language, then the resource file
/// bundling every language's help files.
pub async fn build_bundled_docs(
    ctx: &DocsContext,
    build_dir: &Path,
    languages: &[String],
) -> Result<()> {
    let bundle = &ctx.config.bundle;
    let total = languages.len() as u64;
    let mut outcomes = Vec::with_capacity(languages.len());
    let mut resources = Vec::new();

    for (i, lang) in languages.iter().enumerate() {
        let basename = bundle.basename(lang);
        let target = BuildTarget::new(build_dir, Some(lang), &bundle.builder)
            .with_tags(&bundle.tags)
            .with_override("qthelp_basename", &basename);
        ctx.progress.report(BuildProgressEvent::Building {
            target: target.label(),
            n: i as u64 + 1,
            total,
        });

        let result = build_bundled_language(ctx, &target, &basename).await;
        if result.is_ok() {
            resources.push((
                format!("{}.qch", basename),
                format!("{}/{}.qch", lang, basename),
            ));
            resources.push((
                format!("{}.qhp", basename),
                format!("{}/{}.qhp", lang, basename),
            ));
        }
        outcomes.push((target.label(), result));
    }

    first_failure(ctx, outcomes)?;

    let qrc_path = build_dir.join(QRC_FILE_NAME);
    std::fs::write(&qrc_path, generate_qrc(&resources, &bundle.qrc_prefix))
        .with_context(|| format!("Failed to write {}", qrc_path.display()))?;
    tracing::info!(path = %qrc_path.display(), files = resources.len(), "wrote resource file");
    Ok(())
}

async fn build_bundled_language(
    ctx: &DocsContext,
    target: &BuildTarget,
    basename: &str,
) -> Result<()> {
    build_docs(ctx, target).await?;

    let manifest = target.outdir.join(format!("{}.qhp", basename));
    let (summary, _) = ctx
        .keyword_pass(&target.outdir, Some(manifest))
        .run(&ctx.config)?;
    ctx.progress.report(BuildProgressEvent::Keywords {
        target: target.label(),
        reparsed: summary.reparsed as u64,
        keywords: summary.keywords as u64,
    });

    ctx.progress.report(BuildProgressEvent::Compiling {
        target: target.label(),
    });
    let project = target.outdir.join(format!("{}.qhcp", basename));
    ctx.tools
        .qcollectiongenerator(vec![project.into_os_string()])
        .await?;
    Ok(())
}

/// `keywords`: run the keyword pass for one output directory.
///
/// With a language, the pass works on `<build>/<lang>` and splices that
/// language's help project if it exists; otherwise the keyword lines are
/// printed.
pub fn run_keywords(ctx: &DocsContext, build_dir: &Path, lang: Option<&str>) -> Result<()> {
    let outdir = match lang {
        Some(lang) => build_dir.join(lang),
        None => build_dir.to_path_buf(),
    };
    let manifest = lang.map(|lang| outdir.join(format!("{}.qhp", ctx.config.bundle.basename(lang))));

    let (summary, printed) = ctx.keyword_pass(&outdir, manifest).run(&ctx.config)?;
    ctx.progress.report(BuildProgressEvent::Keywords {
        target: outdir.display().to_string(),
        reparsed: summary.reparsed as u64,
        keywords: summary.keywords as u64,
    });
    if let Some(lines) = printed {
        for line in lines {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Report every failure and return the first one.
fn first_failure(ctx: &DocsContext, outcomes: Vec<(String, Result<()>)>) -> Result<()> {
    let total = outcomes.len();
    let mut failures: Vec<(String, anyhow::Error)> = Vec::new();
    for (label, outcome) in outcomes {
        if let Err(e) = outcome {
            tracing::error!(build = %label, "build failed: {:#}", e);
            ctx.progress.report(BuildProgressEvent::Failed {
                target: label.clone(),
                code: exit_code_of(&e),
            });
            failures.push((label, e));
        }
    }

    let failed = failures.len();
    match failures.into_iter().next() {
        None => Ok(()),
        Some((label, first)) => {
            Err(first.context(format!("{} of {} builds failed, first: {}", failed, total, label)))
        }
    }
}

/// Qt resource collection listing `(alias, path)` pairs under `prefix`.
pub fn generate_qrc(files: &[(String, String)], prefix: &str) -> String {
    let mut out = String::from("<RCC>\n");
    out.push_str(&format!(
        "  <qresource prefix=\"{}\">\n",
        quick_xml::escape::escape(prefix)
    ));
    for (alias, path) in files {
        out.push_str(&format!(
            "    <file alias=\"{}\">{}</file>\n",
            quick_xml::escape::escape(alias.as_str()),
            quick_xml::escape::escape(path.as_str())
        ));
    }
    out.push_str("  </qresource>\n</RCC>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qrc_layout() {
        let files = vec![
            ("manual-de.qch".to_string(), "de/manual-de.qch".to_string()),
            ("manual-de.qhp".to_string(), "de/manual-de.qhp".to_string()),
        ];
        assert_eq!(
            generate_qrc(&files, "/manual"),
            "<RCC>\n  <qresource prefix=\"/manual\">\n    \
             <file alias=\"manual-de.qch\">de/manual-de.qch</file>\n    \
             <file alias=\"manual-de.qhp\">de/manual-de.qhp</file>\n  \
             </qresource>\n</RCC>\n"
        );
    }

    #[test]
    fn qrc_escapes_markup() {
        let files = vec![("a&b".to_string(), "x<y".to_string())];
        let qrc = generate_qrc(&files, "/");
        assert!(qrc.contains("<file alias=\"a&amp;b\">x&lt;y</file>"));
    }
}
