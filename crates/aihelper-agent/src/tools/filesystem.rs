//! Filesystem tools: read, write, append, list and search.
//!
//! Relative paths resolve against the workspace. With `restrict` set, every
//! resolved path must stay inside it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use aihelper_core::utils::{expand_home, truncate_string};
use aihelper_core::{Capability, ToolError};

use super::base::{optional_bool, optional_i64, optional_string, require_string, Tool};

/// Default cap on returned file content (characters).
const DEFAULT_MAX_CHARS: usize = 50_000;

/// Cap on `search_files` matches.
const MAX_SEARCH_RESULTS: usize = 50;

/// Files larger than this are skipped by content search.
const MAX_CONTENT_SCAN_BYTES: u64 = 1024 * 1024;

// ─────────────────────────────────────────────
// Shared path helper
// ─────────────────────────────────────────────

/// Where file tools may look.
#[derive(Clone, Debug)]
pub struct FsAccess {
    workspace: PathBuf,
    restrict: bool,
}

impl FsAccess {
    pub fn new(workspace: PathBuf, restrict: bool) -> Self {
        Self { workspace, restrict }
    }

    /// Resolve a user-supplied path, enforcing the workspace restriction.
    ///
    /// `.` and `..` are folded before the check, so a path through a
    /// directory that does not exist yet cannot climb out of the workspace.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let expanded = expand_home(path.trim());
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        };
        let resolved = canonicalize_lenient(&normalize_lexically(&joined));

        if self.restrict {
            let root = self.root();
            if !resolved.starts_with(&root) {
                return Err(ToolError::failed(format!(
                    "Access denied: path '{}' is outside the workspace '{}'",
                    resolved.display(),
                    root.display()
                )));
            }
        }
        Ok(resolved)
    }

    /// The workspace with symlinks resolved.
    pub fn root(&self) -> PathBuf {
        canonicalize_lenient(&normalize_lexically(&self.workspace))
    }

    /// Whether an absolute path lands inside the workspace.
    pub fn contains(&self, path: &Path) -> bool {
        canonicalize_lenient(&normalize_lexically(path)).starts_with(self.root())
    }

    pub fn is_restricted(&self) -> bool {
        self.restrict
    }
}

/// Drop `.` and fold `..` without touching the filesystem. `..` at the root
/// stays at the root; leading `..` of a relative path is kept.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-attach the rest.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(canon) = existing.canonicalize() {
            return tail.iter().rev().fold(canon, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

// ─────────────────────────────────────────────
// ReadFileTool
// ─────────────────────────────────────────────

/// Reads a text file, truncating very large content.
pub struct ReadFileTool {
    access: FsAccess,
}

impl ReadFileTool {
    pub fn new(access: FsAccess) -> Self {
        Self { access }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1, "description": "File path to read" },
                "max_chars": { "type": "integer", "minimum": 1, "description": "Truncate after this many characters" }
            },
            "required": ["path"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({ "type": "string" }))
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn category(&self) -> &str {
        "files"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let path = self.access.resolve(&require_string(&args, "path")?)?;
        let max_chars = optional_i64(&args, "max_chars")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_CHARS);

        if !path.is_file() {
            return Err(ToolError::failed(format!("File not found: {}", path.display())));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Value::String(truncate_string(&content, max_chars)))
    }
}

// ─────────────────────────────────────────────
// WriteFileTool
// ─────────────────────────────────────────────

/// Writes content to a file, creating parent directories. Rewriting the same
/// content leaves the same file, so the tool is idempotent.
pub struct WriteFileTool {
    access: FsAccess,
}

impl WriteFileTool {
    pub fn new(access: FsAccess) -> Self {
        Self { access }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file, replacing any existing content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1, "description": "File path to write" },
                "content": { "type": "string", "description": "Text to write" }
            },
            "required": ["path", "content"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::Mutating
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn category(&self) -> &str {
        "files"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let path = self.access.resolve(&require_string(&args, "path")?)?;
        let content = require_string(&args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content.as_bytes()).await?;
        Ok(Value::String(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

// ─────────────────────────────────────────────
// AppendFileTool
// ─────────────────────────────────────────────

/// Appends to a file, creating it if needed. Not idempotent: a repeat
/// appends twice.
pub struct AppendFileTool {
    access: FsAccess,
}

impl AppendFileTool {
    pub fn new(access: FsAccess) -> Self {
        Self { access }
    }
}

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }

    fn description(&self) -> &str {
        "Append text to the end of a file without overwriting it"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1, "description": "File path to append to" },
                "content": { "type": "string", "description": "Text to append" }
            },
            "required": ["path", "content"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::Mutating
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn category(&self) -> &str {
        "files"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let path = self.access.resolve(&require_string(&args, "path")?)?;
        let content = require_string(&args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(Value::String(format!(
            "Appended {} characters to {}",
            content.chars().count(),
            path.display()
        )))
    }
}

// ─────────────────────────────────────────────
// ListDirTool
// ─────────────────────────────────────────────

/// Lists a directory, directories first.
pub struct ListDirTool {
    access: FsAccess,
}

impl ListDirTool {
    pub fn new(access: FsAccess) -> Self {
        Self { access }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (defaults to the workspace)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" }
            }
        })
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn category(&self) -> &str {
        "files"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let raw = optional_string(&args, "path").unwrap_or_default();
        let path = self
            .access
            .resolve(if raw.trim().is_empty() { "." } else { &raw })?;

        if !path.is_dir() {
            return Err(ToolError::failed(format!("Not a directory: {}", path.display())));
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(format!("{name}/"));
            } else {
                files.push(name);
            }
        }

        if dirs.is_empty() && files.is_empty() {
            return Ok(Value::String(format!("{} is empty", path.display())));
        }
        dirs.sort();
        files.sort();
        dirs.extend(files);
        Ok(Value::String(dirs.join("\n")))
    }
}

// ─────────────────────────────────────────────
// SearchFilesTool
// ─────────────────────────────────────────────

/// Finds files under a directory by name glob, extension and content keyword.
/// Hidden directories and symlinks are not followed.
pub struct SearchFilesTool {
    access: FsAccess,
}

impl SearchFilesTool {
    pub fn new(access: FsAccess) -> Self {
        Self { access }
    }
}

struct SearchFilter {
    name: Regex,
    extensions: Vec<String>,
    keyword: Option<String>,
    case_sensitive: bool,
}

impl SearchFilter {
    fn from_args(args: &Value) -> Result<Self, ToolError> {
        let case_sensitive = optional_bool(args, "case_sensitive");
        let query = optional_string(args, "query")
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| "*".into());
        let extensions = optional_string(args, "extensions")
            .unwrap_or_default()
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let keyword = optional_string(args, "content")
            .filter(|k| !k.is_empty())
            .map(|k| if case_sensitive { k } else { k.to_lowercase() });

        Ok(Self {
            name: glob_to_regex(query.trim(), case_sensitive)?,
            extensions,
            keyword,
            case_sensitive,
        })
    }

    fn matches_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if !self.name.is_match(&name) {
            return false;
        }
        self.extensions.is_empty()
            || path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .is_some_and(|e| self.extensions.contains(&e))
    }

    async fn matches_content(&self, path: &Path) -> bool {
        let Some(keyword) = &self.keyword else {
            return true;
        };
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() <= MAX_CONTENT_SCAN_BYTES => {}
            _ => return false,
        }
        match tokio::fs::read_to_string(path).await {
            Ok(text) if self.case_sensitive => text.contains(keyword.as_str()),
            Ok(text) => text.to_lowercase().contains(keyword.as_str()),
            Err(_) => false,
        }
    }
}

/// Translate a filename glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, ToolError> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| ToolError::invalid_arguments(format!("bad query pattern '{pattern}': {e}")))
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search for files by name pattern, extension or text content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Filename glob, e.g. '*.py' or 'report*' (default '*')" },
                "root": { "type": "string", "description": "Directory to search (defaults to the workspace)" },
                "extensions": { "type": "string", "description": "Comma-separated extensions, e.g. '.py,.txt'" },
                "content": { "type": "string", "description": "Keyword that must appear inside the file" },
                "case_sensitive": { "type": "boolean", "description": "Match name and keyword case-sensitively" }
            }
        })
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn category(&self) -> &str {
        "files"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let raw = optional_string(&args, "root").unwrap_or_default();
        let root = self
            .access
            .resolve(if raw.trim().is_empty() { "." } else { &raw })?;
        if !root.is_dir() {
            return Err(ToolError::failed(format!("Not a directory: {}", root.display())));
        }
        let filter = SearchFilter::from_args(&args)?;

        let mut found = Vec::new();
        let mut pending = vec![root.clone()];
        'walk: while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Some(entry) = entries.next_entry().await? {
                let Ok(kind) = entry.file_type().await else {
                    continue;
                };
                let path = entry.path();
                if kind.is_dir() {
                    if !entry.file_name().to_string_lossy().starts_with('.') {
                        pending.push(path);
                    }
                } else if kind.is_file()
                    && filter.matches_name(&path)
                    && filter.matches_content(&path).await
                {
                    found.push(path);
                    if found.len() >= MAX_SEARCH_RESULTS {
                        break 'walk;
                    }
                }
            }
        }

        if found.is_empty() {
            return Ok(Value::String("No files found matching the criteria.".into()));
        }
        found.sort();
        let mut lines: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap_or(p).display().to_string())
            .collect();
        if lines.len() >= MAX_SEARCH_RESULTS {
            lines.push(format!("... (stopped at {MAX_SEARCH_RESULTS} matches)"));
        }
        Ok(Value::String(lines.join("\n")))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    fn access(dir: &Path, restrict: bool) -> FsAccess {
        FsAccess::new(dir.to_path_buf(), restrict)
    }

    #[tokio::test]
    async fn test_read_file_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello world").unwrap();

        let tool = ReadFileTool::new(access(dir.path(), false));
        let out = tool.invoke(json!({"path": "notes.txt"}), T).await.unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[tokio::test]
    async fn test_read_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "abcdefghij").unwrap();

        let tool = ReadFileTool::new(access(dir.path(), false));
        let out = tool
            .invoke(json!({"path": "big.txt", "max_chars": 6}), T)
            .await
            .unwrap();
        assert_eq!(out, json!("abc..."));
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(access(dir.path(), false));
        let err = tool.invoke(json!({"path": "missing.txt"}), T).await.unwrap_err();
        assert!(err.to_string().contains("File not found"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_read_file_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();
        let tool = ReadFileTool::new(access(dir.path(), true));
        let err = tool
            .invoke(json!({"path": outside.path().to_string_lossy()}), T)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Access denied"));
    }

    #[tokio::test]
    async fn test_write_file_creates_dirs_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(access(dir.path(), true));
        let args = json!({"path": "a/b/out.txt", "content": "data"});

        tool.invoke(args.clone(), T).await.unwrap();
        tool.invoke(args, T).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/out.txt")).unwrap(),
            "data"
        );
        assert!(tool.to_spec().idempotent);
    }

    #[tokio::test]
    async fn test_write_file_rejects_escape_through_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("ws");
        std::fs::create_dir(&ws).unwrap();

        let tool = WriteFileTool::new(access(&ws, true));
        let err = tool
            .invoke(json!({"path": "nope/../../escaped.txt", "content": "x"}), T)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Access denied"));
        assert!(!root.path().join("escaped.txt").exists());
        assert!(!ws.join("nope").exists());
    }

    #[tokio::test]
    async fn test_dot_dot_inside_workspace_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(access(dir.path(), true));
        tool.invoke(json!({"path": "new/../kept.txt", "content": "x"}), T)
            .await
            .unwrap();
        assert!(dir.path().join("kept.txt").exists());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/ws/nope/../../escaped.txt")),
            PathBuf::from("/escaped.txt")
        );
        assert_eq!(normalize_lexically(Path::new("/ws/./a/../b")), PathBuf::from("/ws/b"));
        assert_eq!(normalize_lexically(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(normalize_lexically(Path::new("../a/./b")), PathBuf::from("../a/b"));
    }

    #[tokio::test]
    async fn test_append_file_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let tool = AppendFileTool::new(access(dir.path(), true));
        tool.invoke(json!({"path": "log/today.txt", "content": "line1\n"}), T)
            .await
            .unwrap();
        tool.invoke(json!({"path": "log/today.txt", "content": "line2\n"}), T)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log/today.txt")).unwrap(),
            "line1\nline2\n"
        );
        let spec = tool.to_spec();
        assert!(spec.is_mutating());
        assert!(!spec.idempotent);
    }

    fn search_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("README.md"), "Project Needle").unwrap();
        std::fs::write(dir.path().join("src/main.py"), "print('hi')").unwrap();
        std::fs::write(dir.path().join("src/nested/needle.py"), "x = 1").unwrap();
        std::fs::write(dir.path().join(".git/hidden.py"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_search_files_by_glob() {
        let dir = search_tree();
        let tool = SearchFilesTool::new(access(dir.path(), true));
        let out = tool.invoke(json!({"query": "*.py"}), T).await.unwrap();
        assert_eq!(out, json!("src/main.py\nsrc/nested/needle.py"));

        let out = tool.invoke(json!({"query": "needle.py"}), T).await.unwrap();
        assert_eq!(out, json!("src/nested/needle.py"));
    }

    #[tokio::test]
    async fn test_search_files_by_content_and_extension() {
        let dir = search_tree();
        let tool = SearchFilesTool::new(access(dir.path(), true));
        let out = tool.invoke(json!({"content": "needle"}), T).await.unwrap();
        assert_eq!(out, json!("README.md"));

        let out = tool
            .invoke(json!({"content": "needle", "case_sensitive": true}), T)
            .await
            .unwrap();
        assert_eq!(out, json!("No files found matching the criteria."));

        let out = tool
            .invoke(json!({"extensions": ".MD, txt"}), T)
            .await
            .unwrap();
        assert_eq!(out, json!("README.md"));
    }

    #[tokio::test]
    async fn test_search_files_root_restricted() {
        let dir = search_tree();
        let tool = SearchFilesTool::new(access(&dir.path().join("src"), true));
        let err = tool.invoke(json!({"root": ".."}), T).await.unwrap_err();
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("report?.*", false).unwrap();
        assert!(re.is_match("Report1.txt"));
        assert!(!re.is_match("report10.txt"));
        assert!(!glob_to_regex("a.b", true).unwrap().is_match("axb"));
    }

    #[tokio::test]
    async fn test_list_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let tool = ListDirTool::new(access(dir.path(), false));
        let out = tool.invoke(json!({}), T).await.unwrap();
        assert_eq!(out, json!("sub/\na.txt\nb.txt"));
    }

    #[tokio::test]
    async fn test_list_dir_not_a_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), "").unwrap();
        let tool = ListDirTool::new(access(dir.path(), false));
        assert!(tool.invoke(json!({"path": "f"}), T).await.is_err());
    }
}
