use crate::error::{CloneError, IoContext, Result};
use chrono::{DateTime, TimeZone};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Write};
use std::fs;
use std::io;
use std::path::Path;

const FILENAME: &str = "claude-clone.toml";

const DEFAULT_TRIGGER_COMMANDS: &[&str] = &["clone"];

/// User-facing preferences stored in `<claude dir>/claude-clone.toml`.
///
/// ```toml
/// tag_template = "[CLONED {{ timestamp }}]"
/// timestamp_format = "%b %d %H:%M"
/// trigger_commands = ["clone"]
/// history_display_limit = 200
/// record_history = true
/// copy_todos = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    /// Jinja template for the clone tag. Variables: `timestamp`,
    /// `source_session`.
    #[serde(default = "default_tag_template")]
    pub tag_template: String,

    /// strftime format used to render `timestamp`.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    /// Slash commands whose invocation marks the truncation point.
    #[serde(default = "default_trigger_commands")]
    pub trigger_commands: Vec<String>,

    /// Maximum characters of the history display text.
    #[serde(default = "default_history_display_limit")]
    pub history_display_limit: usize,

    #[serde(default = "default_true")]
    pub record_history: bool,

    #[serde(default = "default_true")]
    pub copy_todos: bool,
}

fn default_tag_template() -> String {
    "[CLONED {{ timestamp }}]".into()
}

fn default_timestamp_format() -> String {
    "%b %d %H:%M".into()
}

fn default_trigger_commands() -> Vec<String> {
    DEFAULT_TRIGGER_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_history_display_limit() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tag_template: default_tag_template(),
            timestamp_format: default_timestamp_format(),
            trigger_commands: default_trigger_commands(),
            history_display_limit: default_history_display_limit(),
            record_history: true,
            copy_todos: true,
        }
    }
}

impl Preferences {
    /// Load preferences from `<dir>/claude-clone.toml`.
    ///
    /// A missing file yields defaults; nothing is written into the Claude
    /// directory. Missing keys are filled in via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|source| CloneError::Config { path, source })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no preferences file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).io_context(|| format!("reading {}", path.display())),
        }
    }

    /// Render the clone tag for a clone taken at `now`.
    pub fn render_tag<Tz>(&self, now: &DateTime<Tz>, source_session: &str) -> Result<String>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut timestamp = String::new();
        write!(timestamp, "{}", now.format(&self.timestamp_format))
            .map_err(|_| CloneError::TimestampFormat(self.timestamp_format.clone()))?;

        let env = Environment::new();
        let tmpl = env.template_from_str(&self.tag_template)?;
        let tag = tmpl.render(context! { timestamp, source_session })?;
        Ok(tag.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 0).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(!dir.path().join(FILENAME).exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(FILENAME),
            "trigger_commands = [\"clone\", \"fork\"]\nrecord_history = false\n",
        )
        .unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs.trigger_commands, vec!["clone", "fork"]);
        assert!(!prefs.record_history);
        assert!(prefs.copy_todos);
        assert_eq!(prefs.history_display_limit, 200);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FILENAME), "trigger_commands = 3").unwrap();
        assert!(matches!(
            Preferences::load(dir.path()),
            Err(CloneError::Config { .. })
        ));
    }

    #[test]
    fn default_tag_includes_timestamp() {
        let tag = Preferences::default()
            .render_tag(&fixed_time(), "abc")
            .unwrap();
        assert_eq!(tag, "[CLONED Oct 18 14:05]");
    }

    #[test]
    fn custom_template_sees_source_session() {
        let prefs = Preferences {
            tag_template: "[fork of {{ source_session }} @ {{ timestamp }}]".into(),
            timestamp_format: "%Y-%m-%d".into(),
            ..Default::default()
        };
        let tag = prefs.render_tag(&fixed_time(), "abc").unwrap();
        assert_eq!(tag, "[fork of abc @ 2026-10-18]");
    }

    #[test]
    fn bad_template_is_reported() {
        let prefs = Preferences {
            tag_template: "{{ unclosed".into(),
            ..Default::default()
        };
        assert!(matches!(
            prefs.render_tag(&fixed_time(), "abc"),
            Err(CloneError::Template(_))
        ));
    }
}
