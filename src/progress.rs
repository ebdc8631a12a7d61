//! Build progress reporting.
//!
//! Reports which (language, format) build is running so users can follow a
//! multi-language build. Progress is emitted on **stderr** so stdout stays
//! free for keyword listings.

use std::io::Write;
use std::sync::Arc;

/// A single progress event of a documentation build.
#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// The generator started for a target (`html:de`, `qthelp:fr`, ...).
    Building { target: String, n: u64, total: u64 },
    /// The keyword pass finished for an output directory.
    Keywords {
        target: String,
        reparsed: u64,
        keywords: u64,
    },
    /// The help collection is being compiled.
    Compiling { target: String },
    /// A target failed; the build goes on with its siblings.
    Failed { target: String, code: i32 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    /// Emit a progress event.
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build qthelp:de  2 / 4".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = human_line(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn human_line(event: &BuildProgressEvent) -> String {
    match event {
        BuildProgressEvent::Building { target, n, total } => {
            format!("build {}  {} / {}\n", target, n, total)
        }
        BuildProgressEvent::Keywords {
            target,
            reparsed,
            keywords,
        } => format!(
            "keywords {}  {} documents reparsed, {} keywords\n",
            target, reparsed, keywords
        ),
        BuildProgressEvent::Compiling { target } => {
            format!("compile {}  help collection\n", target)
        }
        BuildProgressEvent::Failed { target, code } => {
            format!("build {}  FAILED (exit status {})\n", target, code)
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Building { target, n, total } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "building",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Keywords {
                target,
                reparsed,
                keywords,
            } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "keywords",
                "reparsed": reparsed,
                "keywords": keywords
            }),
            BuildProgressEvent::Compiling { target } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "compiling"
            }),
            BuildProgressEvent::Failed { target, code } => serde_json::json!({
                "event": "failed",
                "target": target,
                "code": code
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Arc<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
