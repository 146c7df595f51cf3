use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A session listed alongside a not-found error so the caller can pick the
/// right one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableSession {
    pub session_id: String,
    pub preview: Option<String>,
}

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("invalid session id {0:?} (expected a lowercase 8-4-4-4-12 hex UUID)")]
    InvalidSessionId(String),

    #[error("projects directory {} does not exist", .0.display())]
    MissingBaseDir(PathBuf),

    #[error("{}", not_found_message(.session_id, .project, .available))]
    TranscriptNotFound {
        session_id: String,
        project: PathBuf,
        available: Vec<AvailableSession>,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("encoding transcript record")]
    Json(#[from] serde_json::Error),

    #[error("identifier source exhausted after {attempts} attempts")]
    ExhaustedIds { attempts: usize },

    #[error("parsing {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("rendering clone tag template")]
    Template(#[from] minijinja::Error),

    #[error("invalid timestamp format {0:?}")]
    TimestampFormat(String),

    #[error("building trigger command pattern")]
    Pattern(#[from] regex::Error),
}

pub type Result<T, E = CloneError> = std::result::Result<T, E>;

/// Attach a context string to an `io::Result`, mirroring anyhow's
/// `with_context` for the typed error.
pub trait IoContext<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|source| CloneError::Io {
            context: f(),
            source,
        })
    }
}

fn not_found_message(session_id: &str, project: &Path, available: &[AvailableSession]) -> String {
    let mut msg = format!(
        "no transcript for session {session_id} in {} or any other project",
        project.display()
    );
    if available.is_empty() {
        msg.push_str("\n(no sessions recorded for this project)");
        return msg;
    }
    msg.push_str("\navailable sessions:");
    for s in available {
        match &s.preview {
            Some(p) => msg.push_str(&format!("\n  {}  {p}", s.session_id)),
            None => msg.push_str(&format!("\n  {}", s.session_id)),
        }
    }
    msg
}
