//! # doc-tool
//!
//! Build driver for a multilingual Sphinx manual, plus the keyword index
//! pass that adds custom keywords to Qt Help projects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  .rst tree  │──▶│ keyword pass │──▶│ .qhp splice   │
//! │  directives │   │ env + registry│  │ HelpBuilder   │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!        sphinx-build ──▶ qcollectiongenerator ──▶ manual.qrc
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Keyword records, anchors, build targets |
//! | [`keywords`] | Keyword registry |
//! | [`directive`] | Keyword directive scanner |
//! | [`env`] | Persisted incremental build environment |
//! | [`help`] | Help-project keyword list builder |
//! | [`index`] | Incremental keyword pass |
//! | [`tools`] | External tool runner |
//! | [`strings`] | Translatable string extraction |
//! | [`docs`] | Build orchestration per language and format |
//! | [`progress`] | Progress reporting |
//! | [`logger`] | `tracing` subscriber setup |
//! | [`error`] | Error types |

pub mod config;
pub mod directive;
pub mod docs;
pub mod env;
pub mod error;
pub mod help;
pub mod index;
pub mod keywords;
pub mod logger;
pub mod models;
pub mod progress;
pub mod strings;
pub mod tools;
