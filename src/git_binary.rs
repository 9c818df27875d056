use std::{
    path::Path,
    process::{Command, ExitStatus, Output, Stdio},
};

use tracing::debug;

/// Credential helper that reads the token from the environment so it never
/// appears on the command line or in the clone URL.
const GITHUB_CREDENTIAL_HELPER: &str = r#"credential.helper=!_ghcreds() {
    if [ -n "$HERON_GITHUB_TOKEN" ]; then
        echo username="x-access-token";
        echo password="$HERON_GITHUB_TOKEN";
    fi
}; _ghcreds"#;

/// Errors from driving the `git` CLI.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git execution failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("git exited with status {status}{summary}",
        status = format_exit_status(.status),
        summary = format_error_summary(.stderr.as_slice()))]
    Git { stderr: Vec<u8>, status: ExitStatus },
}

fn format_exit_status(status: &ExitStatus) -> String {
    status.code().map(|code| code.to_string()).unwrap_or_else(|| status.to_string())
}

fn format_error_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    match text.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => format!(": {line}"),
        None => String::new(),
    }
}

/// A helper for running `git` commands. The token, when present, is injected
/// into each child's environment where the credential helper reads it; it is
/// never placed in the process-global environment or on the command line.
pub struct Git {
    token: Option<String>,
}

impl Git {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.stdin(Stdio::null());
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(token) = &self.token {
            cmd.env("HERON_GITHUB_TOKEN", token);
            cmd.arg("-c").arg(GITHUB_CREDENTIAL_HELPER);
        }
        cmd
    }

    /// Clone a working tree into `output_dir`. `depth` of 0 clones the full
    /// history; anything else is passed to `--depth`.
    pub fn clone_repo(&self, url: &str, output_dir: &Path, depth: u32) -> Result<(), GitError> {
        let mut cmd = self.git();
        cmd.arg("clone").arg("--quiet").arg("--no-tags");
        if depth > 0 {
            cmd.arg(format!("--depth={depth}"));
        }
        cmd.arg(url).arg(output_dir);
        debug!("Cloning {url} into {}", output_dir.display());
        run(cmd)
    }
}

fn run(mut cmd: Command) -> Result<(), GitError> {
    let Output { status, stderr, .. } = cmd.output()?;
    if status.success() {
        Ok(())
    } else {
        Err(GitError::Git { stderr, status })
    }
}
