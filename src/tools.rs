//! External tool runner.
//!
//! The documentation generator and the help-collection compiler are plain
//! subprocesses. Their output goes straight to the terminal; a non-zero exit
//! becomes a [`ToolError::Failed`] carrying the exit code so the CLI can
//! exit with it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Config;
use crate::error::ToolError;

pub const SPHINX_BUILD: &str = "sphinx-build";
pub const QCOLLECTIONGENERATOR: &str = "qcollectiongenerator";

/// Binary paths of the external tools.
#[derive(Debug, Clone)]
pub struct Tools {
    pub sphinx_build: PathBuf,
    pub qcollectiongenerator: PathBuf,
}

impl Tools {
    /// Command-line overrides win over the configuration file.
    pub fn from_config(
        config: &Config,
        sphinx_build: Option<PathBuf>,
        qcollectiongenerator: Option<PathBuf>,
    ) -> Self {
        Self {
            sphinx_build: sphinx_build.unwrap_or_else(|| config.tools.sphinx_build.clone()),
            qcollectiongenerator: qcollectiongenerator
                .unwrap_or_else(|| config.tools.qcollectiongenerator.clone()),
        }
    }

    pub async fn sphinx_build(&self, args: Vec<OsString>) -> Result<(), ToolError> {
        run_tool(SPHINX_BUILD, &self.sphinx_build, args).await
    }

    pub async fn qcollectiongenerator(&self, args: Vec<OsString>) -> Result<(), ToolError> {
        run_tool(QCOLLECTIONGENERATOR, &self.qcollectiongenerator, args).await
    }
}

async fn run_tool(tool: &str, binary: &Path, args: Vec<OsString>) -> Result<(), ToolError> {
    tracing::debug!(
        tool,
        binary = %binary.display(),
        args = ?args,
        "running"
    );

    let status = Command::new(binary)
        .args(&args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|source| ToolError::Launch {
            tool: tool.to_string(),
            binary: binary.to_path_buf(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        // Killed by a signal: no code to pass on.
        let code = status.code().unwrap_or(1);
        tracing::error!(tool, code, "tool failed");
        Err(ToolError::Failed {
            tool: tool.to_string(),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let config = Config::minimal();
        let tools = Tools::from_config(&config, Some(PathBuf::from("/opt/sphinx")), None);
        assert_eq!(tools.sphinx_build, PathBuf::from("/opt/sphinx"));
        assert_eq!(tools.qcollectiongenerator, PathBuf::from("qcollectiongenerator"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let tools = Tools {
            sphinx_build: PathBuf::from("/nonexistent/doc-tool-test/sphinx-build"),
            qcollectiongenerator: PathBuf::from("qcollectiongenerator"),
        };
        let err = tools.sphinx_build(vec![]).await.unwrap_err();
        assert!(matches!(err, ToolError::Launch { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_kept() {
        let tools = Tools {
            sphinx_build: PathBuf::from("sh"),
            qcollectiongenerator: PathBuf::from("sh"),
        };
        let err = tools
            .qcollectiongenerator(vec!["-c".into(), "exit 3".into()])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(tools
            .sphinx_build(vec!["-c".into(), "exit 0".into()])
            .await
            .is_ok());
    }
}
