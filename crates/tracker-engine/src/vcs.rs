//! Thin typed wrapper over git.
//!
//! Every operation is scoped to a working directory, runs one git command,
//! and reports `(ok, stdout, stderr)`. No retries; callers decide policy.

use std::path::{Path, PathBuf};

use tracker_core::{Error, Result};

/// Result of a git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Convert a failure into [`Error::Vcs`] carrying stderr.
    pub fn require(self, command: &str) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(Error::Vcs {
                command: command.to_string(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: String,
    /// Branch ref short name; `None` for a detached worktree.
    pub branch: Option<String>,
}

/// Git adapter bound to one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    cwd: PathBuf,
}

impl Git {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.cwd)
            .output()
            .await?;
        Ok(GitOutput {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_ok(&self, args: &[&str]) -> Result<GitOutput> {
        self.run(args).await?.require(&args.join(" "))
    }

    /// Checkout an existing branch.
    pub async fn checkout(&self, branch: &str) -> Result<GitOutput> {
        self.run_ok(&["checkout", branch]).await
    }

    /// Create a branch at `start_point` without switching to it.
    pub async fn create_branch(&self, branch: &str, start_point: &str) -> Result<GitOutput> {
        self.run_ok(&["branch", branch, start_point]).await
    }

    /// Whether a local branch exists.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])
            .await?;
        Ok(out.ok)
    }

    /// Current branch name; errors on detached HEAD.
    pub async fn current_branch(&self) -> Result<String> {
        let out = self.run_ok(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let name = out.stdout.trim().to_string();
        if name == "HEAD" {
            return Err(Error::Vcs {
                command: "rev-parse --abbrev-ref HEAD".into(),
                stderr: "detached HEAD".into(),
            });
        }
        Ok(name)
    }

    /// `git status --porcelain` output.
    pub async fn status_porcelain(&self) -> Result<String> {
        Ok(self
            .run_ok(&["status", "--porcelain=v1", "-uall"])
            .await?
            .stdout)
    }

    /// Diff over a range, typically `main...HEAD`. Output can be large; the
    /// whole stream is buffered before returning.
    pub async fn diff_range(&self, range: &str) -> Result<String> {
        Ok(self.run_ok(&["diff", "--no-color", range]).await?.stdout)
    }

    /// Merge a ref into the current branch.
    pub async fn merge(&self, reference: &str) -> Result<GitOutput> {
        self.run_ok(&["merge", "--no-edit", reference]).await
    }

    /// Fetch from the default remote.
    pub async fn fetch(&self) -> Result<GitOutput> {
        self.run_ok(&["fetch"]).await
    }

    /// One-line log over a range.
    pub async fn log_range(&self, range: &str) -> Result<String> {
        Ok(self.run_ok(&["log", "--oneline", range]).await?.stdout)
    }

    /// Force-delete a local branch.
    pub async fn branch_delete(&self, branch: &str) -> Result<GitOutput> {
        self.run_ok(&["branch", "-D", branch]).await
    }

    /// `git worktree list --porcelain` parsed into entries.
    pub async fn worktree_list(&self) -> Result<Vec<WorktreeEntry>> {
        let out = self.run_ok(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&out.stdout))
    }

    /// `git --version` as (major, minor), if parseable.
    pub async fn version(&self) -> Result<Option<(u32, u32)>> {
        let out = self.run(&["--version"]).await?;
        if !out.ok {
            return Ok(None);
        }
        Ok(parse_version(&out.stdout))
    }
}

fn parse_version(stdout: &str) -> Option<(u32, u32)> {
    // "git version 2.43.0" (possibly with a platform suffix)
    let rest = stdout.trim().strip_prefix("git version ")?;
    let mut parts = rest.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

fn parse_worktree_list(stdout: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut head = String::new();
    let mut branch: Option<String> = None;

    for line in stdout.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if let Some(p) = path.take() {
                entries.push(WorktreeEntry {
                    path: p,
                    head: std::mem::take(&mut head),
                    branch: branch.take(),
                });
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            head = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(
                rest.strip_prefix("refs/heads/")
                    .unwrap_or(rest)
                    .to_string(),
            );
        }
        // "bare", "detached", and unknown attributes are skipped.
    }

    entries
}
