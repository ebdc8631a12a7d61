//! # doc-tool
//!
//! Builds the user manual: translation templates, stand-alone HTML and the
//! Qt Help bundle shipped with the application.
//!
//! ## Usage
//!
//! ```bash
//! doc-tool [--source-dir doc/manual] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `doc-tool extract-strings` | Extract translatable strings into POT files |
//! | `doc-tool build-standalone-docs` | Build HTML docs for all languages |
//! | `doc-tool build-bundled-docs` | Build Qt Help docs and `manual.qrc` |
//! | `doc-tool keywords` | Run the keyword index pass alone |
//!
//! ## Examples
//!
//! ```bash
//! # Translation templates into _build-pot/
//! doc-tool -s doc/manual extract-strings
//!
//! # German and French HTML, both generators at once
//! doc-tool build-standalone-docs --lang de --lang fr --parallel
//!
//! # Qt Help with a generator outside PATH
//! doc-tool --sphinx-build-binary ~/venv/bin/sphinx-build build-bundled-docs
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use doc_tool::config::{self, DEFAULT_CONFIG_PATH};
use doc_tool::docs::{self, DocsContext};
use doc_tool::error::exit_code_of;
use doc_tool::logger;
use doc_tool::progress::ProgressMode;
use doc_tool::tools::Tools;

/// Documentation build driver.
///
/// Runs the documentation generator once per language and output format,
/// adds custom keywords to the Qt Help index and bundles the compiled help
/// files into a Qt resource collection.
#[derive(Parser)]
#[command(name = "doc-tool", version, about = "Build the user manual in every language")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./doc-tool.toml`; the built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Documentation source directory (default: `[docs].source_dir`).
    #[arg(long, short = 's', global = true)]
    source_dir: Option<PathBuf>,

    /// sphinx-build command.
    #[arg(long, global = true)]
    sphinx_build_binary: Option<PathBuf>,

    /// qcollectiongenerator command.
    #[arg(long, global = true)]
    qcollectiongenerator_binary: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Only log errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable colored log output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Progress on stderr: `off`, `human` or `json`. Human on a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract translatable strings into POT files.
    ExtractStrings {
        /// Output directory.
        #[arg(long, short = 'b', default_value = "_build-pot")]
        build_dir: PathBuf,
    },

    /// Build stand-alone HTML docs for all languages.
    BuildStandaloneDocs {
        /// Output base directory.
        #[arg(long, short = 'b', default_value = "_build-html")]
        build_dir: PathBuf,

        /// Only build these languages (repeatable). Default: all.
        #[arg(long = "lang")]
        languages: Vec<String>,

        /// Run the per-language generators concurrently.
        #[arg(long)]
        parallel: bool,
    },

    /// Build Qt Help docs for all languages.
    ///
    /// Each language gets its own help project, keyword index and compiled
    /// collection; `manual.qrc` in the output base directory lists them all.
    BuildBundledDocs {
        /// Output base directory.
        #[arg(long, short = 'b', default_value = "_build-bundled")]
        build_dir: PathBuf,

        /// Only build these languages (repeatable). Default: all.
        #[arg(long = "lang")]
        languages: Vec<String>,
    },

    /// Run the keyword index pass for one output directory.
    ///
    /// With `--lang`, works on `<build-dir>/<lang>` and rewrites that
    /// language's help project if present. Otherwise prints the keyword
    /// lines to stdout.
    Keywords {
        /// Output base directory.
        #[arg(long, short = 'b', default_value = "_build-bundled")]
        build_dir: PathBuf,

        #[arg(long = "lang")]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose, cli.quiet, cli.no_color);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_of(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let cfg = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(&PathBuf::from(DEFAULT_CONFIG_PATH), false)?,
    };

    let ctx = DocsContext {
        tools: Tools::from_config(&cfg, cli.sphinx_build_binary, cli.qcollectiongenerator_binary),
        source_dir: cli.source_dir.unwrap_or_else(|| cfg.docs.source_dir.clone()),
        ignore_custom_keywords: cfg.keywords.ignore_custom_keywords,
        progress: cli
            .progress
            .unwrap_or_else(ProgressMode::default_for_tty)
            .reporter(),
        config: cfg,
    };

    match command {
        Commands::ExtractStrings { build_dir } => {
            docs::extract_strings(&ctx, &build_dir).await?;
        }
        Commands::BuildStandaloneDocs {
            build_dir,
            languages,
            parallel,
        } => {
            let languages = ctx.config.select_languages(&languages)?;
            docs::build_standalone_docs(&ctx, &build_dir, &languages, parallel).await?;
        }
        Commands::BuildBundledDocs {
            build_dir,
            languages,
        } => {
            let languages = ctx.config.select_languages(&languages)?;
            docs::build_bundled_docs(&ctx, &build_dir, &languages).await?;
        }
        Commands::Keywords {
            build_dir,
            language,
        } => {
            if let Some(lang) = &language {
                ctx.config.select_languages(std::slice::from_ref(lang))?;
            }
            docs::run_keywords(&ctx, &build_dir, language.as_deref())?;
        }
    }

    Ok(())
}
