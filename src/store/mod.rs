//! Claude Code's on-disk layout: transcripts, the prompt history, and the
//! per-session todo snapshots.
//!
//! ```text
//! <claude dir>/
//!   projects/
//!     -home-me-project/
//!       <session-id>.jsonl
//!   history.jsonl
//!   todos/
//!     <session-id>-agent-<session-id>.json
//! ```

use crate::error::{AvailableSession, CloneError, IoContext, Result};
use crate::ids::is_canonical_session_id;
use crate::metadata::{truncate, HistoryEntry};
use crate::transcript::ConversationRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How many sessions a not-found error lists.
const MAX_LISTED: usize = 20;
/// Lines read from the head of a transcript when looking for a preview.
const PREVIEW_SCAN_LINES: usize = 50;
const PREVIEW_CHARS: usize = 60;

/// Map a project path to its directory name under `projects/`: every
/// character that is not ASCII alphanumeric or `-` becomes `-`.
pub fn encode_project(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ClaudeDir {
    root: PathBuf,
}

impl ClaudeDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `explicit` if given, else `~/.claude`.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| CloneError::MissingBaseDir(PathBuf::from("~/.claude")))?;
        Ok(Self::new(home.join(".claude")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn project_dir(&self, project: &Path) -> PathBuf {
        self.projects_dir().join(encode_project(project))
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    pub fn todo_path(&self, session_id: &str) -> PathBuf {
        self.root
            .join("todos")
            .join(format!("{session_id}-agent-{session_id}.json"))
    }

    // ---------------------------------------------------------------
    // Locator
    // ---------------------------------------------------------------

    /// Find the transcript for `session_id`, first under `project`, then in
    /// every other project directory.
    pub fn locate(&self, session_id: &str, project: &Path) -> Result<PathBuf> {
        let projects = self.projects_dir();
        if !projects.is_dir() {
            return Err(CloneError::MissingBaseDir(projects));
        }

        let filename = format!("{session_id}.jsonl");
        let direct = self.project_dir(project).join(&filename);
        if direct.is_file() {
            return Ok(direct);
        }
        tracing::debug!(
            path = %direct.display(),
            "transcript not under project, searching all projects"
        );

        let entries = fs::read_dir(&projects)
            .io_context(|| format!("listing {}", projects.display()))?;
        for entry in entries {
            let entry = entry.io_context(|| format!("listing {}", projects.display()))?;
            let candidate = entry.path().join(&filename);
            if candidate.is_file() {
                tracing::info!(path = %candidate.display(), "found transcript in another project");
                return Ok(candidate);
            }
        }

        Err(CloneError::TranscriptNotFound {
            session_id: session_id.to_string(),
            project: project.to_path_buf(),
            available: self.list_sessions(project),
        })
    }

    /// Sessions recorded for `project`, most recently modified first.
    /// Best-effort: unreadable entries are skipped.
    pub fn list_sessions(&self, project: &Path) -> Vec<AvailableSession> {
        let Ok(entries) = fs::read_dir(self.project_dir(project)) else {
            return Vec::new();
        };
        let mut found: Vec<(SystemTime, PathBuf, String)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|x| x.to_str()) != Some("jsonl") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?.to_string();
                if !is_canonical_session_id(&stem) {
                    return None;
                }
                let modified = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                Some((modified, path, stem))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.cmp(&b.2)));
        found
            .into_iter()
            .take(MAX_LISTED)
            .map(|(_, path, session_id)| AvailableSession {
                preview: first_prompt_preview(&path),
                session_id,
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // History indexer
    // ---------------------------------------------------------------

    /// Append one entry to the history log as a single write. No locking:
    /// concurrent clones may interleave rows but never split one.
    pub fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let path = self.history_path();
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .io_context(|| format!("opening {}", path.display()))?;
        file.write_all(line.as_bytes())
            .io_context(|| format!("appending to {}", path.display()))
    }

    // ---------------------------------------------------------------
    // Task-list copier
    // ---------------------------------------------------------------

    /// Copy the todo snapshot of `old` to `new`, byte for byte. Returns
    /// `false` when `old` has none.
    pub fn copy_todos(&self, old: &str, new: &str) -> Result<bool> {
        let from = self.todo_path(old);
        let to = self.todo_path(new);
        match fs::copy(&from, &to) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !from.exists() => Ok(false),
            Err(e) => Err(e).io_context(|| {
                format!("copying {} to {}", from.display(), to.display())
            }),
        }
    }
}

/// First clean user prompt in the head of a transcript, shortened.
fn first_prompt_preview(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .take(PREVIEW_SCAN_LINES)
        .map_while(|l| l.ok())
        .filter_map(|l| ConversationRecord::parse_line(&l)?.ok())
        .filter(ConversationRecord::is_clean_user_message)
        .find_map(|r| {
            let text = r.payload()?.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then(|| truncate(&text, PREVIEW_CHARS))
        })
}

#[cfg(test)]
mod tests;
