use super::*;
use serde_json::json;

const SESSION: &str = "0b6d2f4e-1c3a-4f5e-9a7b-123456789abc";
const OTHER: &str = "1c7e3a5f-2d4b-4a6f-8b8c-234567890bcd";

fn setup() -> (tempfile::TempDir, ClaudeDir) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("projects")).unwrap();
    let store = ClaudeDir::new(dir.path());
    (dir, store)
}

fn write_transcript(store: &ClaudeDir, project: &Path, session: &str, prompt: &str) -> PathBuf {
    let dir = store.project_dir(project);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{session}.jsonl"));
    let lines = [
        json!({ "type": "summary", "summary": "s" }),
        json!({ "type": "user", "isMeta": true, "message": { "content": "caveat" } }),
        json!({ "type": "user", "message": { "content": prompt } }),
    ];
    let body: Vec<String> = lines.iter().map(|v| v.to_string()).collect();
    fs::write(&path, body.join("\n")).unwrap();
    path
}

#[test]
fn encodes_project_paths() {
    assert_eq!(encode_project(Path::new("/home/me/my.proj")), "-home-me-my-proj");
    assert_eq!(encode_project(Path::new("/a_b/c-d")), "-a-b-c-d");
}

#[test]
fn layout_paths() {
    let store = ClaudeDir::new("/c");
    assert_eq!(store.history_path(), Path::new("/c/history.jsonl"));
    assert_eq!(
        store.todo_path("x"),
        Path::new("/c/todos/x-agent-x.json")
    );
    assert_eq!(
        store.project_dir(Path::new("/p/q")),
        Path::new("/c/projects/-p-q")
    );
}

#[test]
fn resolve_prefers_explicit_dir() {
    let store = ClaudeDir::resolve(Some(PathBuf::from("/elsewhere"))).unwrap();
    assert_eq!(store.root(), Path::new("/elsewhere"));
}

#[test]
fn locate_in_project_dir() {
    let (_dir, store) = setup();
    let project = Path::new("/home/me/proj");
    let path = write_transcript(&store, project, SESSION, "hello");
    assert_eq!(store.locate(SESSION, project).unwrap(), path);
}

#[test]
fn locate_falls_back_to_other_projects() {
    let (_dir, store) = setup();
    let path = write_transcript(&store, Path::new("/elsewhere"), SESSION, "hello");
    assert_eq!(store.locate(SESSION, Path::new("/home/me/proj")).unwrap(), path);
}

#[test]
fn locate_without_projects_dir_is_missing_base() {
    let dir = tempfile::tempdir().unwrap();
    let store = ClaudeDir::new(dir.path());
    assert!(matches!(
        store.locate(SESSION, Path::new("/p")),
        Err(CloneError::MissingBaseDir(_))
    ));
}

#[test]
fn not_found_lists_available_sessions() {
    let (_dir, store) = setup();
    let project = Path::new("/home/me/proj");
    write_transcript(&store, project, OTHER, "  refactor\n the   parser ");
    fs::write(store.project_dir(project).join("notes.txt"), "x").unwrap();

    match store.locate(SESSION, project) {
        Err(CloneError::TranscriptNotFound { session_id, available, .. }) => {
            assert_eq!(session_id, SESSION);
            assert_eq!(
                available,
                vec![AvailableSession {
                    session_id: OTHER.to_string(),
                    preview: Some("refactor the parser".to_string()),
                }]
            );
        }
        other => panic!("expected TranscriptNotFound, got {other:?}"),
    }
}

#[test]
fn not_found_message_mentions_sessions() {
    let (_dir, store) = setup();
    let project = Path::new("/home/me/proj");
    write_transcript(&store, project, OTHER, "hi");
    let err = store.locate(SESSION, project).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains(SESSION), "{msg}");
    assert!(msg.contains(OTHER), "{msg}");
    assert!(msg.contains("hi"), "{msg}");
}

#[test]
fn append_history_adds_one_line_per_call() {
    let (_dir, store) = setup();
    fs::write(store.history_path(), "{\"display\":\"old\"}\n").unwrap();
    for n in 0..2 {
        let entry = HistoryEntry::for_clone("[T]", Some("p"), 200, n, "/p".into(), format!("s{n}"));
        store.append_history(&entry).unwrap();
    }
    let contents = fs::read_to_string(store.history_path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "{\"display\":\"old\"}");
    let last: HistoryEntry = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(last.session_id, "s1");
    assert!(contents.ends_with('\n'));
}

#[test]
fn copy_todos_is_byte_for_byte() {
    let (_dir, store) = setup();
    fs::create_dir_all(store.root().join("todos")).unwrap();
    let blob = b"[{\"content\":\"x\",\"status\":\"pending\"}]  \n";
    fs::write(store.todo_path(SESSION), blob).unwrap();
    assert!(store.copy_todos(SESSION, OTHER).unwrap());
    assert_eq!(fs::read(store.todo_path(OTHER)).unwrap(), blob);
}

#[test]
fn copy_todos_without_source_is_a_no_op() {
    let (_dir, store) = setup();
    assert!(!store.copy_todos(SESSION, OTHER).unwrap());
    assert!(!store.todo_path(OTHER).exists());
}
