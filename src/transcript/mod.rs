use crate::error::{IoContext, Result};
use crate::ids::is_identifier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::{self, BufRead};

// ===================================================================
// ConversationRecord: one JSONL line, kept as an ordered JSON object
// ===================================================================

/// A single line in a Claude Code `.jsonl` transcript.
///
/// The object is held as-is (key order preserved) so every field this tool
/// does not own survives the round trip untouched. Typed accessors cover the
/// fields the clone reads or rewrites.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ConversationRecord(Map<String, Value>);

/// Role classification derived from `type` and the tool-result markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Assistant,
    /// A `user` record that only carries a tool response.
    ToolResult,
    Other,
}

/// Identifier-bearing fields. They share one namespace: together they
/// encode the message-linkage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    Uuid,
    ParentUuid,
    MessageId,
    /// Set on compaction boundaries, pointing across the summary gap.
    LogicalParentUuid,
    /// `snapshot.messageId` inside file-history snapshots.
    SnapshotMessageId,
    /// On tool results, the assistant message that issued the tool call.
    SourceToolAssistantUuid,
    /// The last message a `summary` record covers. Not part of [`IdField::ALL`]:
    /// it may name a message from another transcript.
    LeafUuid,
}

impl IdField {
    /// Fields remapped on every record.
    pub const ALL: [IdField; 6] = [
        IdField::Uuid,
        IdField::ParentUuid,
        IdField::MessageId,
        IdField::LogicalParentUuid,
        IdField::SnapshotMessageId,
        IdField::SourceToolAssistantUuid,
    ];
}

/// Where a record keeps its user-visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadSlot {
    /// `message.content` as a plain string.
    MessageContent,
    /// `message.content[i].text` of the first text block.
    MessageBlock(usize),
    /// Top-level `content`.
    Content,
    /// Top-level `text`.
    Text,
}

impl ConversationRecord {
    /// Parse one transcript line. Returns `None` for blank lines.
    pub fn parse_line(line: &str) -> Option<serde_json::Result<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(serde_json::from_str(line))
    }

    pub fn record_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn is_meta(&self) -> bool {
        self.0.get("isMeta").and_then(Value::as_bool) == Some(true)
    }

    /// Whether the record carries a tool response rather than typed input:
    /// a `tool_result` block in `message.content`, or a `toolUseResult`.
    pub fn is_tool_result(&self) -> bool {
        if self.0.contains_key("toolUseResult") {
            return true;
        }
        self.message_content()
            .and_then(Value::as_array)
            .is_some_and(|blocks| {
                blocks
                    .iter()
                    .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
            })
    }

    pub fn kind(&self) -> RecordKind {
        match self.record_type() {
            Some("user") if self.is_tool_result() => RecordKind::ToolResult,
            Some("user") => RecordKind::User,
            Some("assistant") => RecordKind::Assistant,
            _ => RecordKind::Other,
        }
    }

    /// A user-authored, user-visible message: not meta, not a tool result.
    pub fn is_clean_user_message(&self) -> bool {
        self.kind() == RecordKind::User && !self.is_meta()
    }

    // ---------------------------------------------------------------
    // Session and identifier fields
    // ---------------------------------------------------------------

    /// Overwrite `sessionId` if the record has one. Returns whether it did.
    pub fn replace_session_id(&mut self, new: &str) -> bool {
        match self.0.get_mut("sessionId") {
            Some(v) => {
                *v = Value::String(new.to_string());
                true
            }
            None => false,
        }
    }

    /// Read a string-valued identifier field. `null` and non-strings read
    /// as absent.
    pub fn id(&self, field: IdField) -> Option<&str> {
        let v = match field {
            IdField::Uuid => self.0.get("uuid"),
            IdField::ParentUuid => self.0.get("parentUuid"),
            IdField::MessageId => self.0.get("messageId"),
            IdField::LogicalParentUuid => self.0.get("logicalParentUuid"),
            IdField::SnapshotMessageId => {
                self.0.get("snapshot").and_then(|s| s.get("messageId"))
            }
            IdField::SourceToolAssistantUuid => self.0.get("sourceToolAssistantUuid"),
            IdField::LeafUuid => self.0.get("leafUuid"),
        };
        v.and_then(Value::as_str)
    }

    /// Mutable access to a string-valued identifier field.
    pub fn id_mut(&mut self, field: IdField) -> Option<&mut String> {
        let v = match field {
            IdField::Uuid => self.0.get_mut("uuid"),
            IdField::ParentUuid => self.0.get_mut("parentUuid"),
            IdField::MessageId => self.0.get_mut("messageId"),
            IdField::LogicalParentUuid => self.0.get_mut("logicalParentUuid"),
            IdField::SnapshotMessageId => self
                .0
                .get_mut("snapshot")
                .and_then(|s| s.get_mut("messageId")),
            IdField::SourceToolAssistantUuid => self.0.get_mut("sourceToolAssistantUuid"),
            IdField::LeafUuid => self.0.get_mut("leafUuid"),
        };
        match v {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Working directory Claude Code recorded for the record.
    pub fn cwd(&self) -> Option<&str> {
        self.0
            .get("cwd")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    // ---------------------------------------------------------------
    // Textual payload
    // ---------------------------------------------------------------

    fn message_content(&self) -> Option<&Value> {
        self.0.get("message").and_then(|m| m.get("content"))
    }

    fn payload_slot(&self) -> Option<PayloadSlot> {
        match self.message_content() {
            Some(Value::String(_)) => return Some(PayloadSlot::MessageContent),
            Some(Value::Array(blocks)) => {
                let idx = blocks.iter().position(|b| {
                    b.get("type").and_then(Value::as_str) == Some("text")
                        && b.get("text").is_some_and(Value::is_string)
                });
                if let Some(i) = idx {
                    return Some(PayloadSlot::MessageBlock(i));
                }
            }
            _ => {}
        }
        if self.0.get("content").is_some_and(Value::is_string) {
            return Some(PayloadSlot::Content);
        }
        if self.0.get("text").is_some_and(Value::is_string) {
            return Some(PayloadSlot::Text);
        }
        None
    }

    /// The record's user-visible text, if it has any.
    pub fn payload(&self) -> Option<&str> {
        let v = match self.payload_slot()? {
            PayloadSlot::MessageContent => self.message_content()?,
            PayloadSlot::MessageBlock(i) => self.message_content()?.get(i)?.get("text")?,
            PayloadSlot::Content => self.0.get("content")?,
            PayloadSlot::Text => self.0.get("text")?,
        };
        v.as_str()
    }

    fn slot_mut(&mut self, slot: PayloadSlot) -> Option<&mut String> {
        let v = match slot {
            PayloadSlot::MessageContent => self.0.get_mut("message")?.get_mut("content")?,
            PayloadSlot::MessageBlock(i) => self
                .0
                .get_mut("message")?
                .get_mut("content")?
                .get_mut(i)?
                .get_mut("text")?,
            PayloadSlot::Content => self.0.get_mut("content")?,
            PayloadSlot::Text => self.0.get_mut("text")?,
        };
        match v {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Prefix the payload with `tag` and a space. A record carrying both
    /// top-level `content` and `text` strings gets both prefixed. Returns
    /// `false` when the record has no text to tag.
    pub fn prefix_payload(&mut self, tag: &str) -> bool {
        let Some(slot) = self.payload_slot() else {
            return false;
        };
        let prefix = format!("{tag} ");
        if let Some(text) = self.slot_mut(slot) {
            text.insert_str(0, &prefix);
        }
        if slot == PayloadSlot::Content {
            if let Some(text) = self.slot_mut(PayloadSlot::Text) {
                text.insert_str(0, &prefix);
            }
        }
        true
    }
}

// ===================================================================
// Clone-trigger markers
// ===================================================================

/// Recognizes a slash command that asked for the clone, in any of the forms
/// Claude Code writes it into the transcript:
///
/// - `<command-name>/clone</command-name>` (optionally `/user:clone`)
/// - `<command-message>clone is running…</command-message>`
/// - a bare `/clone` prompt
///
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    pattern: Option<Regex>,
}

impl TriggerMatcher {
    pub fn new<S: AsRef<str>>(commands: &[S]) -> Result<Self, regex::Error> {
        if commands.is_empty() {
            return Ok(Self { pattern: None });
        }
        let names = commands
            .iter()
            .map(|c| regex::escape(c.as_ref().trim_start_matches('/')))
            .collect::<Vec<_>>()
            .join("|");
        let ns = r"(?:[a-z0-9_.-]+:)*";
        let pattern = format!(
            r"(?i)<command-name>\s*/?{ns}(?:{names})\s*</command-name>|<command-message>\s*{ns}(?:{names})(?:\s+is running[^<]*)?\s*</command-message>|\A\s*/{ns}(?:{names})\s*\z"
        );
        Ok(Self {
            pattern: Some(Regex::new(&pattern)?),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }
}

// ===================================================================
// Truncation detection
// ===================================================================

/// What a scan of the source transcript found.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Detection {
    /// 0-based line index of the trigger message; it and every later line
    /// are dropped from the clone.
    pub cutoff: Option<usize>,
    /// Text of the first clean user message, for the history display.
    pub first_prompt: Option<String>,
    pub clean_user_messages: usize,
    pub lines: usize,
    /// Every well-formed `uuid` in the transcript, before any cutoff.
    pub message_uuids: HashSet<String>,
    /// First recorded working directory.
    pub cwd: Option<String>,
}

/// Accumulates the detector's verdict one record at a time.
///
/// Only the *last* clean user message decides the cutoff: an earlier clone
/// command that was already acted upon never truncates.
#[derive(Debug, Default)]
pub struct Detector {
    last_clean: Option<(usize, bool)>,
    detection: Detection,
}

impl Detector {
    pub fn observe(
        &mut self,
        line_no: usize,
        record: &ConversationRecord,
        matcher: &TriggerMatcher,
    ) {
        if let Some(uuid) = record.id(IdField::Uuid).filter(|u| is_identifier(u)) {
            self.detection.message_uuids.insert(uuid.to_string());
        }
        if self.detection.cwd.is_none() {
            self.detection.cwd = record.cwd().map(str::to_string);
        }
        if !record.is_clean_user_message() {
            return;
        }
        let text = record.payload().unwrap_or_default();
        if self.detection.first_prompt.is_none() && !text.is_empty() {
            self.detection.first_prompt = Some(text.to_string());
        }
        self.detection.clean_user_messages += 1;
        self.last_clean = Some((line_no, matcher.is_match(text)));
    }

    pub fn finish(mut self, lines: usize) -> Detection {
        self.detection.lines = lines;
        self.detection.cutoff = match self.last_clean {
            Some((line_no, true)) => Some(line_no),
            _ => None,
        };
        self.detection
    }
}

/// Read one physical line into `buf`, without its terminator. Returns
/// `false` at end of input. The bytes need not be UTF-8.
pub fn read_raw_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Scan a whole transcript and decide where the clone stops.
///
/// Unparseable lines, including ones that are not UTF-8, are skipped here;
/// the rewriter reports them.
pub fn detect<R: BufRead>(mut reader: R, matcher: &TriggerMatcher) -> Result<Detection> {
    let mut detector = Detector::default();
    let mut buf = Vec::new();
    let mut lines = 0;
    while read_raw_line(&mut reader, &mut buf)
        .io_context(|| format!("reading transcript line {}", lines + 1))?
    {
        let line_no = lines;
        lines += 1;
        let Ok(text) = std::str::from_utf8(&buf) else {
            continue;
        };
        if let Some(Ok(record)) = ConversationRecord::parse_line(text) {
            detector.observe(line_no, &record, matcher);
        }
    }
    let detection = detector.finish(lines);
    tracing::debug!(
        lines = detection.lines,
        clean_user_messages = detection.clean_user_messages,
        cutoff = ?detection.cutoff,
        "scanned transcript"
    );
    Ok(detection)
}
