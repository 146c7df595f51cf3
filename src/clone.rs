use crate::error::{IoContext, Result};
use crate::ids::{fresh_id, validate_session_id, IdSource};
use crate::metadata::HistoryEntry;
use crate::preferences::Preferences;
use crate::remap::IdentifierMap;
use crate::rewrite::{rewrite, Rewriter, RewriteStats};
use crate::store::ClaudeDir;
use crate::transcript::{detect, Detection, TriggerMatcher};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// What to clone and which collaborators to run afterwards.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub session_id: String,
    /// Absolute project path the transcript is looked up under first.
    pub project: PathBuf,
    pub truncate: bool,
    pub record_history: bool,
    pub copy_todos: bool,
}

#[derive(Debug)]
pub struct CloneOutcome {
    pub source_session_id: String,
    pub new_session_id: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub tag: String,
    pub stats: RewriteStats,
    pub history_written: bool,
    pub todos_copied: bool,
}

/// One clone operation: Locate → Detect → Rewrite → Index/Copy.
pub struct Cloner<'a> {
    store: &'a ClaudeDir,
    prefs: &'a Preferences,
    ids: &'a mut dyn IdSource,
}

impl<'a> Cloner<'a> {
    pub fn new(store: &'a ClaudeDir, prefs: &'a Preferences, ids: &'a mut dyn IdSource) -> Self {
        Self { store, prefs, ids }
    }

    pub fn run(&mut self, request: &CloneRequest, now: DateTime<Local>) -> Result<CloneOutcome> {
        validate_session_id(&request.session_id)?;
        let source = self.store.locate(&request.session_id, &request.project)?;
        tracing::info!(source = %source.display(), "cloning transcript");

        let matcher = TriggerMatcher::new(&self.prefs.trigger_commands)?;
        let mut detection = detect(open_transcript(&source)?, &matcher)?;
        if !request.truncate && detection.cutoff.take().is_some() {
            tracing::info!("clone command found but truncation is disabled");
        }

        let new_session_id = fresh_id(&mut *self.ids)?;
        let tag = self.prefs.render_tag(&now, &request.session_id)?;
        let (target, stats) = self.write_clone(
            &source,
            &request.session_id,
            &new_session_id,
            &detection,
            &tag,
        )?;
        tracing::info!(
            target = %target.display(),
            emitted = stats.emitted,
            "wrote cloned transcript"
        );

        let mut history_written = false;
        if request.record_history {
            let entry = HistoryEntry::for_clone(
                &tag,
                detection.first_prompt.as_deref(),
                self.prefs.history_display_limit,
                now.timestamp_millis(),
                self.source_project(&source, &request.project, &detection)
                    .to_string_lossy()
                    .into_owned(),
                new_session_id.clone(),
            );
            self.store.append_history(&entry)?;
            history_written = true;
        }

        let todos_copied =
            request.copy_todos && self.store.copy_todos(&request.session_id, &new_session_id)?;
        if request.copy_todos && !todos_copied {
            tracing::debug!("source session has no todo snapshot");
        }

        Ok(CloneOutcome {
            source_session_id: request.session_id.clone(),
            new_session_id,
            source,
            target,
            tag,
            stats,
            history_written,
            todos_copied,
        })
    }

    /// The project the source transcript is recorded under. Differs from
    /// `requested` when the transcript was found in another project, in
    /// which case the recorded working directory names it.
    fn source_project(&self, source: &Path, requested: &Path, detection: &Detection) -> PathBuf {
        if source.parent() == Some(self.store.project_dir(requested).as_path()) {
            return requested.to_path_buf();
        }
        match &detection.cwd {
            Some(cwd) => PathBuf::from(cwd),
            None => {
                tracing::warn!(
                    source = %source.display(),
                    "transcript records no working directory, using requested project"
                );
                requested.to_path_buf()
            }
        }
    }

    /// Rewrite into a temp file beside the source, then move it into place.
    /// Any failure drops the temp file, so no partial target is left.
    fn write_clone(
        &mut self,
        source: &Path,
        old_session_id: &str,
        new_session_id: &str,
        detection: &Detection,
        tag: &str,
    ) -> Result<(PathBuf, RewriteStats)> {
        let dir = source.parent().unwrap_or(Path::new("."));
        let target = dir.join(format!("{new_session_id}.jsonl"));

        let mut tmp = tempfile::Builder::new()
            .prefix(".clone-")
            .suffix(".jsonl.tmp")
            .tempfile_in(dir)
            .io_context(|| format!("creating temp file in {}", dir.display()))?;

        let mut map = IdentifierMap::new(&mut *self.ids);
        map.reserve(old_session_id);
        map.reserve(new_session_id);
        let rewriter = Rewriter::new(&mut map, new_session_id, detection, tag);
        let stats = rewrite(
            open_transcript(source)?,
            BufWriter::new(tmp.as_file_mut()),
            rewriter,
        )?;

        tmp.persist_noclobber(&target)
            .map_err(|e| e.error)
            .io_context(|| format!("moving cloned transcript to {}", target.display()))?;
        Ok((target, stats))
    }
}

fn open_transcript(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).io_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}
