#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const PROJECT: &str = "/home/me/proj";
pub const PROJECT_DIR: &str = "-home-me-proj";

pub fn run_cli(claude_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_claude-clone"))
        .args(args)
        .env("CLAUDE_CONFIG_DIR", claude_dir)
        .env_remove("CLAUDE_CLONE_LOG")
        .output()
        .expect("failed to spawn binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// A temp Claude directory with an empty `projects/`.
/// The `TempDir` must be kept alive for the duration of the test.
pub fn claude_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("projects")).unwrap();
    dir
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Write `records` as the transcript of `session` under [`PROJECT`].
pub fn write_transcript(claude: &Path, session: &str, records: &[Value]) -> PathBuf {
    let dir = claude.join("projects").join(PROJECT_DIR);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{session}.jsonl"));
    let body: String = records.iter().map(|r| format!("{r}\n")).collect();
    fs::write(&path, body).unwrap();
    path
}

pub fn user(session: &str, uuid: &str, parent: Option<&str>, text: &str) -> Value {
    json!({
        "parentUuid": parent,
        "isSidechain": false,
        "userType": "external",
        "cwd": PROJECT,
        "sessionId": session,
        "version": "1.0.0",
        "type": "user",
        "message": { "role": "user", "content": text },
        "uuid": uuid,
        "timestamp": "2025-01-01T00:00:00Z"
    })
}

pub fn assistant(session: &str, uuid: &str, parent: &str) -> Value {
    json!({
        "parentUuid": parent,
        "isSidechain": false,
        "cwd": PROJECT,
        "sessionId": session,
        "type": "assistant",
        "message": {
            "id": "msg_01ABC",
            "role": "assistant",
            "content": [{ "type": "text", "text": "Sure." }]
        },
        "requestId": "req_01",
        "uuid": uuid,
        "timestamp": "2025-01-01T00:00:01Z"
    })
}

pub fn read_jsonl(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Pull the new session id out of the "Cloned session a -> b" line.
pub fn new_session_from_stdout(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Cloned session "))
        .and_then(|l| l.split(" -> ").nth(1))
        .expect("summary line in stdout")
        .trim()
        .to_string()
}
