use crate::error::{CloneError, Result};
use crate::ids::IdSource;
use std::collections::{HashMap, HashSet};

/// How many times a colliding fresh identifier is redrawn before giving up.
const MAX_DRAWS: usize = 16;

/// Per-operation mapping from source identifiers to fresh ones.
///
/// `uuid`, `parentUuid`, `messageId` and the other linkage fields share one
/// namespace, so every field goes through the same map. A fresh value is
/// never handed out twice and never equals an identifier already seen as a
/// key.
pub struct IdentifierMap<'a> {
    source: &'a mut dyn IdSource,
    map: HashMap<String, String>,
    issued: HashSet<String>,
}

impl<'a> IdentifierMap<'a> {
    pub fn new(source: &'a mut dyn IdSource) -> Self {
        Self {
            source,
            map: HashMap::new(),
            issued: HashSet::new(),
        }
    }

    /// Reserve identifiers that must never be issued (e.g. the new session
    /// id, which is drawn before the map exists).
    pub fn reserve(&mut self, id: &str) {
        self.issued.insert(id.to_string());
    }

    /// Return the replacement for `old`, drawing a fresh one on first sight.
    pub fn resolve(&mut self, old: &str) -> Result<String> {
        if let Some(new) = self.map.get(old) {
            return Ok(new.clone());
        }
        let new = self.draw(old)?;
        self.issued.insert(new.clone());
        self.map.insert(old.to_string(), new.clone());
        Ok(new)
    }

    fn draw(&mut self, old: &str) -> Result<String> {
        for attempt in 1..=MAX_DRAWS {
            let Some(candidate) = self.source.next_id() else {
                return Err(CloneError::ExhaustedIds { attempts: attempt });
            };
            let collides = candidate == old
                || self.issued.contains(&candidate)
                || self.map.contains_key(&candidate);
            if !collides {
                return Ok(candidate);
            }
            tracing::debug!(%candidate, "fresh identifier collided, redrawing");
        }
        Err(CloneError::ExhaustedIds {
            attempts: MAX_DRAWS,
        })
    }

    /// Number of distinct source identifiers remapped so far.
    pub fn remapped_count(&self) -> usize {
        self.map.len()
    }
}
