use crate::error::{CloneError, Result};
use uuid::Uuid;

/// Group lengths of a hyphenated UUID.
const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

fn matches_uuid_shape(s: &str, accept: impl Fn(u8) -> bool) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.bytes().all(&accept))
}

/// Whether `s` looks like an identifier the remapper may rewrite: a
/// hyphenated 8-4-4-4-12 hex UUID in either case.
pub fn is_identifier(s: &str) -> bool {
    matches_uuid_shape(s, |b| b.is_ascii_hexdigit())
}

/// Stricter check for session ids given on the command line: lowercase only,
/// matching the transcript filenames Claude Code writes.
pub fn is_canonical_session_id(s: &str) -> bool {
    matches_uuid_shape(s, |b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn validate_session_id(s: &str) -> Result<()> {
    if is_canonical_session_id(s) {
        Ok(())
    } else {
        Err(CloneError::InvalidSessionId(s.to_string()))
    }
}

/// A supply of fresh identifiers. Returns `None` once it can produce no more.
pub trait IdSource {
    fn next_id(&mut self) -> Option<String>;
}

/// Random v4 UUIDs from the OS RNG. Never runs dry.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&mut self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }
}

/// Draw one identifier or fail with `ExhaustedIds`.
pub fn fresh_id(source: &mut dyn IdSource) -> Result<String> {
    source
        .next_id()
        .ok_or(CloneError::ExhaustedIds { attempts: 1 })
}
