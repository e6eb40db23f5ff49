//! Git CLI adapter for [`RevisionHistory`].
//!
//! History is read by streaming `git log --topo-order` one line per commit,
//! so a walk that stops early never materialises the rest of the branch.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};

use crate::domain::{Commit, CommitHash, HistoryError};
use crate::history::{CommitWalk, RevisionHistory};

/// Remote branches are checked out from.
pub const DEFAULT_REMOTE: &str = "origin";

/// Revision walks start from unless a branch was selected.
const HEAD: &str = "HEAD";

/// Separates hash and subject in the log format.
const FIELD_SEP: char = '\u{1f}';

/// HTTP basic credentials for cloning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    /// `Authorization` header value for git's `http.extraHeader`.
    fn authorization_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.secret));
        format!("Authorization: Basic {token}")
    }
}

/// A local git work tree driven through the `git` binary.
///
/// Only clones made by [`GitRepository::clone_from`] are owned by the agent:
/// their checkouts are forced. Checkouts in an opened work tree never
/// discard local changes and fail instead when git would have to.
#[derive(Debug, Clone)]
pub struct GitRepository {
    work_tree: PathBuf,
    remote: Option<String>,
    owned: bool,
    walk_from: String,
}

impl GitRepository {
    /// Open an existing work tree. Branches are checked out from local refs.
    pub fn open(work_tree: &Path) -> Result<Self, HistoryError> {
        if !is_git_repo(work_tree) {
            return Err(HistoryError::NotARepository(
                work_tree.display().to_string(),
            ));
        }
        Ok(Self {
            work_tree: work_tree.to_path_buf(),
            remote: None,
            owned: false,
            walk_from: HEAD.to_string(),
        })
    }

    /// Clone `url` into `dest` (including submodules). Branches of the clone
    /// are checked out from `origin`.
    pub fn clone_from(
        url: &str,
        dest: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<Self, HistoryError> {
        info!(url = %url, dest = %dest.display(), "Cloning project");
        let mut cmd = Command::new("git");
        if let Some(credentials) = credentials {
            cmd.arg("-c")
                .arg(format!("http.extraHeader={}", credentials.authorization_header()));
        }
        cmd.args(["clone", "--recurse-submodules", "--quiet", "--", url])
            .arg(dest);
        // The header is only on this command line, so redact it from errors.
        run(cmd, "clone --recurse-submodules <url>")?;

        Ok(Self {
            work_tree: dest.to_path_buf(),
            remote: Some(DEFAULT_REMOTE.to_string()),
            owned: true,
            walk_from: HEAD.to_string(),
        })
    }

    /// Check branches out from `remote` instead of local refs.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// SHA of the commit currently checked out.
    pub fn head(&self) -> Result<CommitHash, HistoryError> {
        let out = self.git(&["rev-parse", "HEAD"])?;
        CommitHash::parse(&out)
    }

    /// Walk `name` from now on without touching the work tree or HEAD.
    /// A later checkout walks from HEAD again.
    pub fn select_branch(&mut self, name: &str) -> Result<(), HistoryError> {
        reject_option_like(name)?;
        let reference = match &self.remote {
            Some(remote) => format!("{remote}/{name}"),
            None => name.to_string(),
        };
        let spec = format!("{reference}^{{commit}}");
        let hash = self
            .git(&["rev-parse", "--verify", "--quiet", &spec])
            .map_err(|_| HistoryError::Command {
                args: format!("rev-parse --verify {reference}"),
                stderr: format!("unknown branch '{name}'"),
            })?;
        debug!(branch = %name, commit = %hash, "Selected branch without checkout");
        self.walk_from = CommitHash::parse(&hash)?.to_string();
        Ok(())
    }

    fn checkout(&mut self, args: &[&str]) -> Result<(), HistoryError> {
        let mut full = vec!["checkout"];
        if self.owned {
            full.push("--force");
        }
        full.extend_from_slice(args);
        self.git(&full)?;
        self.walk_from = HEAD.to_string();
        Ok(())
    }

    fn git(&self, args: &[&str]) -> Result<String, HistoryError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.work_tree);
        run(cmd, &args.join(" "))
    }
}

impl RevisionHistory for GitRepository {
    fn checkout_branch(&mut self, name: &str) -> Result<(), HistoryError> {
        reject_option_like(name)?;
        info!(branch = %name, "Checkout to branch");
        match self.remote.clone() {
            Some(remote) => {
                let upstream = format!("{remote}/{name}");
                self.checkout(&["-B", name, &upstream])
            }
            None => self.checkout(&[name, "--"]),
        }
    }

    fn checkout_commit(&mut self, hash: &CommitHash) -> Result<(), HistoryError> {
        debug!(commit = %hash, "Checkout to commit");
        self.checkout(&["--detach", hash.as_str()])
    }

    fn walk_commits(&self) -> Result<CommitWalk<'_>, HistoryError> {
        Ok(Box::new(GitLogWalk::spawn(&self.work_tree, &self.walk_from)?))
    }

    fn resolve_commit(&self, revision: &str) -> Result<Option<Commit>, HistoryError> {
        let revision = revision.trim();
        if revision.is_empty() || !revision.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        let spec = format!("{revision}^{{commit}}");
        let mut cmd = Command::new("git");
        cmd.args(["rev-parse", "--verify", "--quiet", &spec])
            .current_dir(&self.work_tree);
        let output = cmd.output()?;
        if !output.status.success() {
            return Ok(None);
        }
        let hash = CommitHash::parse(&String::from_utf8_lossy(&output.stdout))?;
        let subject = self.git(&["log", "-1", "--format=%s", hash.as_str()])?;
        Ok(Some(Commit::new(hash, subject)))
    }
}

fn reject_option_like(name: &str) -> Result<(), HistoryError> {
    if name.starts_with('-') {
        return Err(HistoryError::Command {
            args: format!("checkout {name}"),
            stderr: "branch names cannot start with '-'".to_string(),
        });
    }
    Ok(())
}

/// Streaming `git log` from one revision.
struct GitLogWalk {
    child: Child,
    lines: std::io::Split<BufReader<ChildStdout>>,
    finished: bool,
}

impl GitLogWalk {
    fn spawn(work_tree: &Path, from: &str) -> Result<Self, HistoryError> {
        let format = format!("--format=%H{FIELD_SEP}%s");
        let mut child = Command::new("git")
            .args(["log", "--topo-order", &format, from, "--"])
            .current_dir(work_tree)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HistoryError::Malformed("git log produced no stdout".to_string()))?;
        Ok(Self {
            child,
            lines: BufReader::new(stdout).split(b'\n'),
            finished: false,
        })
    }

    fn finish(&mut self) -> Option<Result<Commit, HistoryError>> {
        self.finished = true;
        // Drain stderr before waiting so a chatty failure cannot block on a
        // full pipe.
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr).ok();
        }
        let status = match self.child.wait() {
            Ok(status) => status,
            Err(e) => return Some(Err(e.into())),
        };
        if status.success() {
            return None;
        }
        Some(Err(HistoryError::Command {
            args: "log --topo-order".to_string(),
            stderr: stderr.trim().to_string(),
        }))
    }
}

impl Iterator for GitLogWalk {
    type Item = Result<Commit, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(parse_log_line(&String::from_utf8_lossy(&line))),
            Some(Err(e)) => {
                self.stop();
                Some(Err(e.into()))
            }
            None => self.finish(),
        }
    }
}

impl GitLogWalk {
    /// Kill and reap the child without reading the rest of its output.
    fn stop(&mut self) {
        self.finished = true;
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

impl Drop for GitLogWalk {
    fn drop(&mut self) {
        if !self.finished {
            self.stop();
        }
    }
}

fn parse_log_line(line: &str) -> Result<Commit, HistoryError> {
    let (hash, subject) = line.split_once(FIELD_SEP).unwrap_or((line, ""));
    Ok(Commit::new(CommitHash::parse(hash)?, subject))
}

/// Run a git command, returning trimmed stdout.
fn run(mut cmd: Command, label: &str) -> Result<String, HistoryError> {
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(HistoryError::Command {
            args: label.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
