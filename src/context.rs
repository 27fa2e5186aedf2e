use std::path::{Component, Path, PathBuf};

use tokio::task::JoinSet;

use crate::error::OuvertError;

/// Header placed in front of injected file contents.
pub const CONTEXT_HEADER: &str = "Code developed so far:";

/// Maximum bytes of file content to inject into a prompt.
pub const MAX_FILE_CONTEXT_BYTES: usize = 2 * 1024 * 1024;

/// Maximum number of file paths allowed per request.
pub const MAX_FILE_PATHS: usize = 100;

/// Path fragments hidden from the file picker: build output, VCS and IDE
/// folders, dependency trees, lock files, migrations.
pub const EXCLUDED_FRAGMENTS: &[&str] = &[
    "/obj/",
    "/Migrations/",
    "/migrations/",
    "GlobalUsings",
    "design",
    "/.git/",
    "/.vs/",
    "node_modules",
    "lock.json",
    ".next",
    "/debug/",
];

/// True when a relative path should be offered for selection. The check runs
/// against `/<path>` so directory fragments also match at the top level.
pub fn is_displayed(rel_path: &str) -> bool {
    let rooted = format!("/{}", rel_path.trim_start_matches('/'));
    !EXCLUDED_FRAGMENTS.iter().any(|frag| rooted.contains(frag))
}

/// Build the effective prompt: header, the concatenated file blocks, then
/// the user's prompt.
pub fn inject_context(file_contents: &str, prompt: &str) -> String {
    format!("{CONTEXT_HEADER}\n\n{file_contents}\n\n{prompt}")
}

/// One file's contribution: its content (optionally preceded by its path on
/// its own line) followed by a blank line.
pub fn format_file_block(rel_path: &str, content: &str, label_paths: bool) -> String {
    if label_paths {
        format!("{rel_path}\n{content}\n\n")
    } else {
        format!("{content}\n\n")
    }
}

/// Validate that a path is safe: relative, no `..` components.
fn validate_path(path: &str) -> Result<(), OuvertError> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(OuvertError::FileContext(format!(
            "absolute path not allowed: {path}"
        )));
    }
    for component in p.components() {
        if matches!(component, Component::ParentDir) {
            return Err(OuvertError::FileContext(format!(
                "path traversal not allowed: {path}"
            )));
        }
    }
    Ok(())
}

/// Validate working directory exists, is a directory, and canonicalize it.
pub async fn validate_working_directory(path: &str) -> Result<PathBuf, OuvertError> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
        OuvertError::FileContext(format!("working directory not found: {path}: {e}"))
    })?;

    let meta = tokio::fs::metadata(&canonical).await.map_err(|e| {
        OuvertError::FileContext(format!("cannot stat working directory: {path}: {e}"))
    })?;

    if !meta.is_dir() {
        return Err(OuvertError::FileContext(format!(
            "{path} is not a directory"
        )));
    }

    Ok(canonical)
}

enum ReadOutcome {
    Read(String),
    /// Raw size exceeds the whole budget; never read.
    TooLarge(usize),
    Failed(String),
    /// Resolves outside the base directory (symlink).
    Escaped,
}

async fn read_one(base_dir: PathBuf, rel_path: String, budget: usize) -> ReadOutcome {
    let canonical = match tokio::fs::canonicalize(base_dir.join(&rel_path)).await {
        Ok(c) => c,
        Err(e) => return ReadOutcome::Failed(format!("{rel_path}: {e}")),
    };
    if !canonical.starts_with(&base_dir) {
        return ReadOutcome::Escaped;
    }

    // Size check before reading; never pull a file larger than the budget.
    match tokio::fs::metadata(&canonical).await {
        Ok(m) if m.len() as usize > budget => return ReadOutcome::TooLarge(m.len() as usize),
        Ok(_) => {}
        Err(e) => return ReadOutcome::Failed(format!("{rel_path}: {e}")),
    }

    match tokio::fs::read_to_string(&canonical).await {
        Ok(content) => ReadOutcome::Read(content),
        Err(e) => ReadOutcome::Failed(format!("{rel_path}: {e}")),
    }
}

/// Selected files read and concatenated in selection order.
#[derive(Debug, Default)]
pub struct FileContext {
    /// Concatenated file blocks (empty when nothing was included).
    pub contents: String,
    pub included: Vec<String>,
    /// Files left out for budget (path, size in bytes).
    pub skipped: Vec<(String, usize)>,
    /// Files that could not be read, or were excluded by the picker filter.
    pub errors: Vec<String>,
}

impl FileContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// Budget-skipped files as `name (sizeB)`.
    pub fn skipped_labels(&self) -> Vec<String> {
        self.skipped
            .iter()
            .map(|(name, size)| format!("{name} ({size}B)"))
            .collect()
    }
}

/// Read the selected files concurrently and join them in selection order.
///
/// Reads are independent; assembly starts only once the number of finished
/// reads equals the number of selected files. Traversal or symlink escape
/// rejects the whole request; unreadable files are noted and skipped unless
/// every file fails.
pub async fn read_selected(
    paths: &[String],
    base_dir: &Path,
    budget: usize,
    label_paths: bool,
) -> Result<FileContext, OuvertError> {
    if paths.is_empty() {
        return Ok(FileContext::default());
    }

    if paths.len() > MAX_FILE_PATHS {
        return Err(OuvertError::FileContext(format!(
            "too many file paths: {} (max {})",
            paths.len(),
            MAX_FILE_PATHS
        )));
    }

    // Validate all paths first; traversal rejects the entire request.
    for p in paths {
        validate_path(p)?;
    }

    let base_dir = tokio::fs::canonicalize(base_dir)
        .await
        .map_err(|e| OuvertError::FileContext(format!("cannot resolve base directory: {e}")))?;

    let mut result = FileContext::default();
    let mut outcomes: Vec<Option<ReadOutcome>> = Vec::with_capacity(paths.len());
    let mut set = JoinSet::new();
    let mut selected = 0usize;

    for (idx, rel_path) in paths.iter().enumerate() {
        outcomes.push(None);
        if !is_displayed(rel_path) {
            result.errors.push(format!("{rel_path}: excluded"));
            continue;
        }
        selected += 1;
        let base = base_dir.clone();
        let rel = rel_path.clone();
        set.spawn(async move { (idx, read_one(base, rel, budget).await) });
    }

    let mut completed = 0usize;
    while let Some(joined) = set.join_next().await {
        let (idx, outcome) = joined.map_err(|e| OuvertError::FileContext(format!("read task failed: {e}")))?;
        outcomes[idx] = Some(outcome);
        completed += 1;
    }
    debug_assert_eq!(completed, selected);

    let mut used = 0usize;
    for (rel_path, outcome) in paths.iter().zip(outcomes) {
        match outcome {
            None => {}
            Some(ReadOutcome::Escaped) => {
                return Err(OuvertError::FileContext(format!(
                    "path escapes base directory: {rel_path}"
                )));
            }
            Some(ReadOutcome::Failed(msg)) => result.errors.push(msg),
            Some(ReadOutcome::TooLarge(size)) => result.skipped.push((rel_path.clone(), size)),
            Some(ReadOutcome::Read(content)) => {
                let block = format_file_block(rel_path, &content, label_paths);
                if used + block.len() > budget {
                    result.skipped.push((rel_path.clone(), content.len()));
                    continue;
                }
                used += block.len();
                result.contents.push_str(&block);
                result.included.push(rel_path.clone());
            }
        }
    }

    if result.included.is_empty() && result.skipped.is_empty() && !result.errors.is_empty() {
        return Err(OuvertError::FileContext(format!(
            "all files unreadable: {}",
            result.errors.join("; ")
        )));
    }

    tracing::debug!(
        selected,
        included = result.included.len(),
        bytes = used,
        "file context assembled"
    );
    Ok(result)
}

/// Recursively list files under `base_dir` that pass the picker filter,
/// as sorted `/`-separated relative paths. Stops after `limit` entries.
pub async fn list_files(base_dir: &Path, limit: usize) -> Result<Vec<String>, OuvertError> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(rel_dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(base_dir.join(&rel_dir))
            .await
            .map_err(|e| OuvertError::FileContext(format!("{}: {e}", rel_dir.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OuvertError::FileContext(e.to_string()))?
        {
            let rel = rel_dir.join(entry.file_name());
            let rel_str = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                // Directory fragments only match with a trailing slash.
                if is_displayed(&format!("{rel_str}/")) {
                    stack.push(rel);
                }
            } else if file_type.is_file() && is_displayed(&rel_str) {
                out.push(rel_str);
                if out.len() >= limit {
                    out.sort();
                    return Ok(out);
                }
            }
        }
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_files_then_prompt() {
        let contents = format_file_block("a.txt", "A", false) + &format_file_block("b.txt", "B", false);
        assert_eq!(
            inject_context(&contents, "Q"),
            "Code developed so far:\n\nA\n\nB\n\n\n\nQ"
        );
    }

    #[test]
    fn labelled_block_carries_path() {
        assert_eq!(format_file_block("src/a.rs", "fn a() {}", true), "src/a.rs\nfn a() {}\n\n");
    }

    #[test]
    fn picker_filter() {
        assert!(is_displayed("src/main.rs"));
        assert!(!is_displayed("node_modules/react/index.js"));
        assert!(!is_displayed("obj/Debug/app.dll"));
        assert!(!is_displayed("web/.git/HEAD"));
        assert!(!is_displayed("package-lock.json"));
        assert!(!is_displayed("Data/Migrations/001.cs"));
        assert!(!is_displayed("docs/design.md"));
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("src/lib.rs").is_ok());
    }
}
