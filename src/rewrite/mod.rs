use crate::error::{CloneError, IoContext, Result};
use crate::ids::is_identifier;
use crate::remap::IdentifierMap;
use crate::transcript::{read_raw_line, ConversationRecord, Detection, IdField};
use std::collections::HashSet;
use std::io::{BufRead, Write};

/// Counters reported after a rewrite pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteStats {
    /// Source lines consumed, blank ones included, up to the cutoff.
    pub lines_read: usize,
    pub emitted: usize,
    /// Lines that were not UTF-8 JSON objects and could not be re-identified.
    pub dropped_malformed: usize,
    /// Distinct source identifiers given a fresh value.
    pub remapped_ids: usize,
    /// Identifier fields left alone because they did not look like one.
    pub skipped_fields: usize,
    /// Line index where the pass stopped, if it hit the cutoff.
    pub stopped_at: Option<usize>,
    pub tagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Emitting,
    Stopped,
}

/// What a single line turned into.
#[derive(Debug)]
pub enum LineOutcome {
    Emit(ConversationRecord),
    Skip,
    Stop,
}

/// Single forward pass that re-identifies every retained record.
///
/// Owns the one-shot "already tagged" flag; the identifier map is borrowed
/// so its lifetime stays bounded by the clone operation.
pub struct Rewriter<'m, 'src> {
    map: &'m mut IdentifierMap<'src>,
    session_id: &'m str,
    cutoff: Option<usize>,
    /// Message uuids present in the source; a `leafUuid` naming one of
    /// them is remapped along with it.
    known_messages: &'m HashSet<String>,
    tag: &'m str,
    state: State,
    tagged: bool,
    stats: RewriteStats,
}

impl<'m, 'src> Rewriter<'m, 'src> {
    pub fn new(
        map: &'m mut IdentifierMap<'src>,
        session_id: &'m str,
        detection: &'m Detection,
        tag: &'m str,
    ) -> Self {
        Self {
            map,
            session_id,
            cutoff: detection.cutoff,
            known_messages: &detection.message_uuids,
            tag,
            state: State::Emitting,
            tagged: false,
            stats: RewriteStats::default(),
        }
    }

    /// Transform one raw source line. `line_no` is the 0-based line index.
    pub fn rewrite_line(&mut self, line_no: usize, line: &[u8]) -> Result<LineOutcome> {
        if self.state == State::Stopped {
            return Ok(LineOutcome::Stop);
        }
        if self.cutoff.is_some_and(|c| line_no >= c) {
            self.state = State::Stopped;
            self.stats.stopped_at = Some(line_no);
            return Ok(LineOutcome::Stop);
        }
        self.stats.lines_read += 1;
        let parsed = match std::str::from_utf8(line) {
            Ok(text) => ConversationRecord::parse_line(text).map(|r| r.map_err(|e| e.to_string())),
            Err(e) => Some(Err(e.to_string())),
        };
        let mut record = match parsed {
            None => return Ok(LineOutcome::Skip),
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                tracing::warn!(
                    line = line_no + 1,
                    error = %e,
                    "dropping malformed transcript line"
                );
                self.stats.dropped_malformed += 1;
                return Ok(LineOutcome::Skip);
            }
        };
        self.rewrite_record(&mut record)?;
        self.stats.emitted += 1;
        Ok(LineOutcome::Emit(record))
    }

    /// Substitute session and linkage ids, and tag the first clean user
    /// message.
    pub fn rewrite_record(&mut self, record: &mut ConversationRecord) -> Result<()> {
        record.replace_session_id(self.session_id);

        for field in IdField::ALL {
            let Some(old) = record.id(field) else {
                continue;
            };
            if !is_identifier(old) {
                tracing::debug!(?field, value = old, "leaving non-identifier value in place");
                self.stats.skipped_fields += 1;
                continue;
            }
            let new = self.map.resolve(old)?;
            if let Some(slot) = record.id_mut(field) {
                *slot = new;
            }
        }

        if let Some(leaf) = record
            .id(IdField::LeafUuid)
            .filter(|l| self.known_messages.contains(*l))
        {
            let new = self.map.resolve(leaf)?;
            if let Some(slot) = record.id_mut(IdField::LeafUuid) {
                *slot = new;
            }
        }

        if !self.tagged && record.is_clean_user_message() && record.prefix_payload(self.tag) {
            self.tagged = true;
        }
        Ok(())
    }

    pub fn finish(mut self) -> RewriteStats {
        self.stats.remapped_ids = self.map.remapped_count();
        self.stats.tagged = self.tagged;
        self.stats
    }
}

/// Stream `reader` into `writer`, one re-encoded record per line.
pub fn rewrite<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    mut rewriter: Rewriter<'_, '_>,
) -> Result<RewriteStats> {
    let mut buf = Vec::new();
    let mut line_no = 0;
    while read_raw_line(&mut reader, &mut buf)
        .io_context(|| format!("reading transcript line {}", line_no + 1))?
    {
        match rewriter.rewrite_line(line_no, &buf)? {
            LineOutcome::Emit(record) => {
                serde_json::to_writer(&mut writer, &record).map_err(write_error)?;
                writer
                    .write_all(b"\n")
                    .io_context(|| "writing cloned transcript".to_string())?;
            }
            LineOutcome::Skip => {}
            LineOutcome::Stop => break,
        }
        line_no += 1;
    }
    writer
        .flush()
        .io_context(|| "flushing cloned transcript".to_string())?;
    let stats = rewriter.finish();
    tracing::debug!(?stats, "rewrite finished");
    Ok(stats)
}

/// Failures of the underlying writer are I/O errors, not encoding ones.
fn write_error(e: serde_json::Error) -> CloneError {
    if e.is_io() {
        CloneError::Io {
            context: "writing cloned transcript".to_string(),
            source: e.into(),
        }
    } else {
        CloneError::Json(e)
    }
}
