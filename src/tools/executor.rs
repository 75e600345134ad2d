//! Client-side text editor tool.
//!
//! Every failure is reported to the model as an error tool_result rather
//! than an `Err`: the model is expected to read the message and retry with
//! corrected input, so a bad path or missing file must not abort the loop.

use crate::sandbox::PathSandbox;
use crate::types::ContentBlock;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

pub struct ToolExecutor {
    sandbox: PathSandbox,
    /// View output above this length is cut and marked truncated.
    max_characters: Option<usize>,
}

impl ToolExecutor {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self {
            sandbox,
            max_characters: None,
        }
    }

    pub fn with_max_characters(mut self, max_characters: usize) -> Self {
        self.max_characters = Some(max_characters);
        self
    }

    pub fn max_characters(&self) -> Option<usize> {
        self.max_characters
    }

    /// Execute one tool call and wrap the output as a tool_result block
    /// correlated by `tool_use_id`.
    pub fn run(&self, tool_use_id: &str, input: &Value) -> ContentBlock {
        let output = self.execute(input);
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: output.content,
            is_error: output.is_error,
        }
    }

    pub fn execute(&self, input: &Value) -> ToolOutput {
        let command = input.get("command").and_then(Value::as_str).unwrap_or("");
        if command.is_empty() {
            return ToolOutput::err("Error: Missing command.");
        }
        let path = input.get("path").and_then(Value::as_str).unwrap_or("");

        match command {
            "view" => self.view(path, parse_view_range(input)),
            "str_replace" => {
                let old_str = input.get("old_str").and_then(Value::as_str).unwrap_or("");
                let new_str = input.get("new_str").and_then(Value::as_str).unwrap_or("");
                self.str_replace(path, old_str, new_str)
            }
            "create" => {
                let file_text = input.get("file_text").and_then(Value::as_str).unwrap_or("");
                self.create(path, file_text)
            }
            "insert" => {
                let insert_line = input
                    .get("insert_line")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let insert_text = input
                    .get("insert_text")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                self.insert(path, insert_line, insert_text)
            }
            other => ToolOutput::err(format!("Error: Unknown command '{other}'.")),
        }
    }

    /// `view`: numbered file content, or a numbered directory listing.
    pub fn view(&self, path: &str, view_range: Option<(i64, i64)>) -> ToolOutput {
        let resolved = match self.sandbox.resolve(path) {
            Ok(resolved) => resolved,
            Err(error) => return rejection(error),
        };

        if resolved.is_dir() {
            return match list_directory(&resolved) {
                Ok(listing) => ToolOutput::ok(listing),
                Err(error) => ToolOutput::err(format!("Error: Could not list directory: {error}")),
            };
        }
        if !resolved.is_file() {
            return ToolOutput::err("Error: File not found");
        }

        let content = match fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(error) => return ToolOutput::err(format!("Error: Could not read file: {error}")),
        };
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len() as i64;

        let numbered = match view_range {
            Some((start, end)) => {
                let start = start.max(1);
                let end = if end == -1 { total } else { end.min(total).max(1) };
                if start > end || start > total {
                    return ToolOutput::err("Error: Invalid view_range");
                }
                number_lines(&lines[(start - 1) as usize..end as usize], start)
            }
            None => number_lines(&lines, 1),
        };

        ToolOutput::ok(self.truncate(numbered))
    }

    /// `str_replace`: replace `old_str` with `new_str` exactly once.
    pub fn str_replace(&self, path: &str, old_str: &str, new_str: &str) -> ToolOutput {
        if old_str.is_empty() {
            return ToolOutput::err(
                "Error: No match found for replacement. Please check your text and try again.",
            );
        }
        let resolved = match self.sandbox.resolve(path) {
            Ok(resolved) => resolved,
            Err(error) => return rejection(error),
        };
        if !resolved.is_file() {
            return ToolOutput::err("Error: File not found");
        }

        let content = match fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(error) => return ToolOutput::err(format!("Error: Could not read file: {error}")),
        };

        let count = content.matches(old_str).count();
        if count == 0 {
            return ToolOutput::err(
                "Error: No match found for replacement. Please check your text and try again.",
            );
        }
        if count > 1 {
            return ToolOutput::err(format!(
                "Error: Found {count} matches for replacement text. Please provide more context to make a unique match."
            ));
        }

        let updated = content.replacen(old_str, new_str, 1);
        if let Err(error) = fs::write(&resolved, updated) {
            return ToolOutput::err(format!(
                "Error: Permission denied. Cannot write to file. {error}"
            ));
        }
        ToolOutput::ok("Successfully replaced text at exactly one location.")
    }

    /// `create`: write a new file, creating parent directories. Existing
    /// files are never overwritten.
    pub fn create(&self, path: &str, file_text: &str) -> ToolOutput {
        let resolved = match self.sandbox.resolve(path) {
            Ok(resolved) => resolved,
            Err(error) => return rejection(error),
        };
        if resolved.exists() {
            return ToolOutput::err("Error: File already exists.");
        }

        if let Some(parent) = resolved.parent() {
            if !parent.is_dir() {
                if let Err(error) = fs::create_dir_all(parent) {
                    return ToolOutput::err(format!(
                        "Error: Could not create directory: {error}"
                    ));
                }
            }
        }

        // Real-path check after directory creation catches symlinked parents.
        if let Err(error) = self.sandbox.verify_real_path(&resolved) {
            return rejection(error);
        }

        if let Err(error) = fs::write(&resolved, file_text) {
            return ToolOutput::err(format!(
                "Error: Permission denied. Cannot write to file. {error}"
            ));
        }
        ToolOutput::ok("Successfully created file.")
    }

    /// `insert`: insert text after line `insert_line` (0 = start of file).
    pub fn insert(&self, path: &str, insert_line: i64, insert_text: &str) -> ToolOutput {
        let resolved = match self.sandbox.resolve(path) {
            Ok(resolved) => resolved,
            Err(error) => return rejection(error),
        };
        if !resolved.is_file() {
            return ToolOutput::err("Error: File not found");
        }

        let content = match fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(error) => return ToolOutput::err(format!("Error: Could not read file: {error}")),
        };
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let insert_at = insert_line.max(0).min(lines.len() as i64) as usize;

        let mut updated = String::with_capacity(content.len() + insert_text.len() + 1);
        if insert_at == 0 {
            updated.push_str(insert_text);
            if !lines.is_empty() && !insert_text.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&content);
        } else {
            for line in &lines[..insert_at] {
                updated.push_str(line);
            }
            // A final line without a trailing newline needs one before the
            // inserted text starts.
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(insert_text);
            if insert_at < lines.len() && !insert_text.ends_with('\n') {
                updated.push('\n');
            }
            for line in &lines[insert_at..] {
                updated.push_str(line);
            }
        }

        if let Err(error) = fs::write(&resolved, updated) {
            return ToolOutput::err(format!(
                "Error: Permission denied. Cannot write to file. {error}"
            ));
        }
        ToolOutput::ok("Successfully inserted text.")
    }

    fn truncate(&self, content: String) -> String {
        match self.max_characters {
            Some(limit) if limit > 0 && content.len() > limit => {
                let mut cut = limit;
                while !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}\n... (truncated)", &content[..cut])
            }
            _ => content,
        }
    }
}

fn rejection(error: crate::error::Error) -> ToolOutput {
    ToolOutput::err(format!("Error: {error}"))
}

fn parse_view_range(input: &Value) -> Option<(i64, i64)> {
    let range = input.get("view_range")?.as_array()?;
    let start = range.first()?.as_i64()?;
    let end = range.get(1)?.as_i64()?;
    Some((start, end))
}

fn number_lines(lines: &[&str], start: i64) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{}: {}", start + offset as i64, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_directory(path: &Path) -> std::io::Result<String> {
    let mut names: Vec<String> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{}: {}", index + 1, name))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::PathSandbox;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor_in(temp: &TempDir) -> ToolExecutor {
        ToolExecutor::new(PathSandbox::new(vec![temp.path().to_path_buf()]))
    }

    fn write(temp: &TempDir, name: &str, content: &str) -> String {
        let path = temp.path().join(name);
        std::fs::write(&path, content).expect("write fixture");
        path.display().to_string()
    }

    #[test]
    fn test_view_numbers_lines_from_one() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "alpha\nbeta\ngamma\n");

        let output = executor.view(&path, None);
        assert!(!output.is_error);
        assert_eq!(output.content, "1: alpha\n2: beta\n3: gamma");
    }

    #[test]
    fn test_view_range_with_open_end() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "one\ntwo\nthree\nfour\n");

        let output = executor.view(&path, Some((2, -1)));
        assert_eq!(output.content, "2: two\n3: three\n4: four");

        let output = executor.view(&path, Some((3, 2)));
        assert!(output.is_error);
        assert_eq!(output.content, "Error: Invalid view_range");
    }

    #[test]
    fn test_view_lists_directories_sorted() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        write(&temp, "zeta.txt", "");
        write(&temp, "alpha.txt", "");

        let output = executor.view(&temp.path().display().to_string(), None);
        assert!(!output.is_error);
        assert_eq!(output.content, "1: alpha.txt\n2: zeta.txt");
    }

    #[test]
    fn test_view_truncates_at_max_characters() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp).with_max_characters(8);
        let path = write(&temp, "a.txt", "abcdefghijklmnop\n");

        let output = executor.view(&path, None);
        assert!(output.content.ends_with("\n... (truncated)"));
        assert!(output.content.len() <= 8 + "\n... (truncated)".len());
    }

    #[test]
    fn test_str_replace_requires_unique_match() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "ab ab");

        let output = executor.str_replace(&path, "ab", "xy");
        assert!(output.is_error);
        assert_eq!(
            output.content,
            "Error: Found 2 matches for replacement text. Please provide more context to make a unique match."
        );

        let output = executor.str_replace(&path, "zz", "xy");
        assert!(output.is_error);
        assert!(output.content.starts_with("Error: No match found"));

        let output = executor.str_replace(&path, "ab ab", "done");
        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.txt")).expect("read back"),
            "done"
        );
    }

    #[test]
    fn test_str_replace_rejects_empty_old_str() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "content");

        let output = executor.str_replace(&path, "", "xy");
        assert!(output.is_error);
    }

    #[test]
    fn test_create_refuses_to_overwrite() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let existing = write(&temp, "a.txt", "old");

        let output = executor.create(&existing, "new");
        assert!(output.is_error);
        assert_eq!(output.content, "Error: File already exists.");

        let nested = temp.path().join("deep/dir/new.txt");
        let output = executor.create(&nested.display().to_string(), "hello");
        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(&nested).expect("read back"),
            "hello"
        );
    }

    #[test]
    fn test_insert_at_start_middle_and_past_end() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "one\ntwo\n");

        let output = executor.insert(&path, 0, "zero");
        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "zero\none\ntwo\n"
        );

        let output = executor.insert(&path, 2, "middle");
        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "zero\none\nmiddle\ntwo\n"
        );

        // Past-the-end clamps to append.
        let output = executor.insert(&path, 99, "tail\n");
        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "zero\none\nmiddle\ntwo\ntail\n"
        );
    }

    #[test]
    fn test_execute_dispatch_and_unknown_command() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);
        let path = write(&temp, "a.txt", "hello\n");

        let output = executor.execute(&json!({ "command": "view", "path": path }));
        assert_eq!(output.content, "1: hello");

        let output = executor.execute(&json!({ "path": path }));
        assert_eq!(output.content, "Error: Missing command.");

        let output = executor.execute(&json!({ "command": "explode", "path": path }));
        assert_eq!(output.content, "Error: Unknown command 'explode'.");
    }

    #[test]
    fn test_run_wraps_output_as_tool_result() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);

        let block = executor.run("toolu_7", &json!({ "command": "view", "path": "../nope" }));
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "toolu_7");
                assert!(is_error);
                assert!(content.starts_with("Error:"));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn test_path_outside_root_is_an_error_result_not_a_panic() {
        let temp = TempDir::new().expect("temp dir");
        let executor = executor_in(&temp);

        let output = executor.view("/etc/passwd", None);
        assert!(output.is_error);
        assert!(output.content.starts_with("Error:"));
    }
}
