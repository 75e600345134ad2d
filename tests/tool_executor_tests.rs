use parlance::sandbox::PathSandbox;
use parlance::tools::ToolExecutor;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn executor_in(temp: &TempDir) -> ToolExecutor {
    ToolExecutor::new(PathSandbox::new(vec![temp.path().to_path_buf()]))
}

#[test]
fn test_path_traversal_blocked() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);

    for path in ["../../etc/passwd", "/etc/passwd", "sub/../../outside"] {
        let output = executor.view(path, None);
        assert!(output.is_error, "{path} should be rejected");
    }
}

#[test]
fn test_filename_with_double_dots_allowed() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);

    let output = executor.create(
        &temp.path().join("my..file.txt").display().to_string(),
        "content",
    );
    assert!(!output.is_error, "legitimate '..' filename: {}", output.content);

    let output = executor.view("my..file.txt", None);
    assert!(!output.is_error);
    assert_eq!(output.content, "1: content");
}

#[test]
fn test_str_replace_unique_match_vectors() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);

    let ambiguous = temp.path().join("ambiguous.txt");
    fs::write(&ambiguous, "ab ab").expect("fixture");
    let output = executor.str_replace(&ambiguous.display().to_string(), "ab", "xy");
    assert!(output.is_error);
    assert!(output.content.contains("2 matches"));
    assert_eq!(
        fs::read_to_string(&ambiguous).expect("read back"),
        "ab ab",
        "failed replace must not write"
    );

    let unique = temp.path().join("unique.txt");
    fs::write(&unique, "a unique b").expect("fixture");
    let output = executor.str_replace(&unique.display().to_string(), "unique", "special");
    assert!(!output.is_error);
    assert_eq!(
        fs::read_to_string(&unique).expect("read back"),
        "a special b"
    );
}

#[test]
fn test_view_range_slicing() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);
    let path = temp.path().join("lines.txt");
    fs::write(&path, "alpha\nbeta\ngamma\ndelta\n").expect("fixture");
    let path = path.display().to_string();

    let output = executor.view(&path, Some((2, 3)));
    assert_eq!(output.content, "2: beta\n3: gamma");

    let output = executor.view(&path, Some((4, -1)));
    assert_eq!(output.content, "4: delta");
}

#[test]
fn test_create_through_dispatch_builds_parent_dirs() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);
    let target = temp.path().join("nested/deeper/file.txt");

    let output = executor.execute(&json!({
        "command": "create",
        "path": target.display().to_string(),
        "file_text": "payload",
    }));
    assert!(!output.is_error, "{}", output.content);
    assert_eq!(fs::read_to_string(&target).expect("read back"), "payload");

    // A second create against the same path must refuse.
    let output = executor.execute(&json!({
        "command": "create",
        "path": target.display().to_string(),
        "file_text": "other",
    }));
    assert!(output.is_error);
    assert_eq!(fs::read_to_string(&target).expect("read back"), "payload");
}

#[test]
fn test_insert_preserves_surrounding_newlines() {
    let temp = TempDir::new().expect("temp dir");
    let executor = executor_in(&temp);
    let path = temp.path().join("notes.txt");
    fs::write(&path, "first\nsecond\n").expect("fixture");
    let path = path.display().to_string();

    let output = executor.insert(&path, 1, "inserted");
    assert!(!output.is_error);
    assert_eq!(
        fs::read_to_string(temp.path().join("notes.txt")).expect("read back"),
        "first\ninserted\nsecond\n"
    );
}
