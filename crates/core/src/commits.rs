//! Git history ingestor (§4.11).
//!
//! Indexes commit lineage and per-file diffs so other components can answer
//! "what changed here and why" without re-shelling to git at query time.
//! Two `git log` invocations back this: one for commit metadata and
//! numstat, one for full patches, joined on commit hash.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{IndexError, IndexResult};
use crate::index::StorageEngine;
use crate::types::{Change, ChangeKind, Commit};

const RECORD_SEP: &str = "\x1f";
const COMMIT_MARKER: &str = "@@COMMIT@@";

/// Ingests git history into the storage engine.
pub struct CommitIngestor {
    max_commits: usize,
}

impl CommitIngestor {
    #[must_use]
    pub fn new(max_commits: usize) -> Self {
        Self { max_commits }
    }

    /// Walk recent git history and persist commits plus per-file changes.
    pub fn ingest(&self, repo_path: &Path, storage: &StorageEngine) -> IndexResult<usize> {
        let metadata_out = run_git(
            repo_path,
            &[
                "log",
                &format!("--format={COMMIT_MARKER}%H{RECORD_SEP}%P{RECORD_SEP}%an{RECORD_SEP}%aI{RECORD_SEP}%s"),
                "--numstat",
                &format!("-{}", self.max_commits),
            ],
        )?;
        let mut commits = parse_commit_log(&metadata_out);

        let patch_out = run_git(
            repo_path,
            &[
                "log",
                &format!("--format={COMMIT_MARKER}%H"),
                "-p",
                &format!("-{}", self.max_commits),
            ],
        )?;
        let patches_by_hash = split_patches(&patch_out);

        let mut stored = 0;
        for commit in &commits {
            if let Err(e) = storage_insert_commit(storage, commit) {
                tracing::warn!(hash = %commit.hash, error = %e, "failed to store commit");
                continue;
            }
            if let Some(patch) = patches_by_hash.get(&commit.hash) {
                for change in parse_changes(&commit.hash, patch) {
                    if let Err(e) = storage.insert_change(&change) {
                        tracing::warn!(hash = %commit.hash, file = %change.file_path, error = %e, "failed to store change");
                    }
                }
            }
            stored += 1;
        }

        commits.clear();
        tracing::info!(commits = stored, "ingested git history");
        Ok(stored)
    }

    /// Most active authors for a file, derived from its commit history.
    pub fn top_authors(
        storage: &StorageEngine,
        file_path: &str,
        limit: usize,
    ) -> IndexResult<Vec<(String, usize)>> {
        let commits = storage.find_commits_for_file(file_path, 200)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for commit in &commits {
            *counts.entry(commit.author.clone()).or_default() += 1;
        }
        let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.truncate(limit);
        Ok(sorted)
    }
}

fn storage_insert_commit(storage: &StorageEngine, commit: &Commit) -> IndexResult<()> {
    storage.insert_commit(commit)
}

fn run_git(repo_path: &Path, args: &[&str]) -> IndexResult<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .map_err(|e| IndexError::Internal(format!("git invocation failed: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IndexError::Internal(format!("git error: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `git log --numstat` output with `@@COMMIT@@`-prefixed header lines
/// into [`Commit`] records.
fn parse_commit_log(output: &str) -> Vec<Commit> {
    let mut commits = Vec::new();
    let mut lines = output.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix(COMMIT_MARKER) else {
            continue;
        };
        let fields: Vec<&str> = header.split(RECORD_SEP).collect();
        if fields.len() < 5 {
            continue;
        }
        let hash = fields[0].to_string();
        let parent = fields[1].split_whitespace().next().map(str::to_string);
        let author = fields[2].to_string();
        let date = fields[3].to_string();
        let message = fields[4].to_string();

        let mut numstat = Vec::new();
        while let Some(next) = lines.peek() {
            if next.is_empty() {
                lines.next();
                continue;
            }
            if next.starts_with(COMMIT_MARKER) {
                break;
            }
            let parts: Vec<&str> = next.splitn(3, '\t').collect();
            if parts.len() == 3 {
                let added = parts[0].parse().unwrap_or(0);
                let deleted = parts[1].parse().unwrap_or(0);
                numstat.push((parts[2].to_string(), added, deleted));
            }
            lines.next();
        }

        commits.push(Commit {
            hash,
            parent,
            author,
            date,
            message,
            numstat,
        });
    }

    commits
}

/// Split `git log -p` output into per-commit patch text, keyed by hash.
fn split_patches(output: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut current_hash: Option<String> = None;
    let mut current_text = String::new();

    for line in output.lines() {
        if let Some(hash) = line.strip_prefix(COMMIT_MARKER) {
            if let Some(prev) = current_hash.take() {
                out.insert(prev, std::mem::take(&mut current_text));
            }
            current_hash = Some(hash.to_string());
            continue;
        }
        current_text.push_str(line);
        current_text.push('\n');
    }
    if let Some(prev) = current_hash {
        out.insert(prev, current_text);
    }
    out
}

/// Split a commit's combined patch into per-file [`Change`] records.
fn parse_changes(commit_hash: &str, patch: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut blocks: Vec<&str> = Vec::new();
    let mut start = None;
    let lines: Vec<&str> = patch.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("diff --git ") {
            if let Some(s) = start {
                blocks.push(&patch[byte_offset(&lines, s)..byte_offset(&lines, i)]);
            }
            start = Some(i);
        }
    }
    if let Some(s) = start {
        blocks.push(&patch[byte_offset(&lines, s)..]);
    }

    for block in blocks {
        if let Some(change) = parse_one_change(commit_hash, block) {
            changes.push(change);
        }
    }
    changes
}

fn byte_offset(lines: &[&str], line_index: usize) -> usize {
    lines[..line_index].iter().map(|l| l.len() + 1).sum()
}

fn parse_one_change(commit_hash: &str, block: &str) -> Option<Change> {
    let header_line = block.lines().next()?;
    let (a_path, b_path) = parse_diff_git_header(header_line)?;

    let mut kind = ChangeKind::Modified;
    let mut old_path = None;
    for line in block.lines() {
        if line.starts_with("new file mode") {
            kind = ChangeKind::Added;
        } else if line.starts_with("deleted file mode") {
            kind = ChangeKind::Deleted;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            kind = ChangeKind::Renamed;
            old_path = Some(from.to_string());
        }
    }

    let file_path = if kind == ChangeKind::Deleted { a_path } else { b_path };
    let affected_functions = extract_hunk_contexts(block);

    Some(Change {
        commit_hash: commit_hash.to_string(),
        kind,
        file_path,
        old_path,
        diff_text: block.to_string(),
        affected_functions,
        affected_chunk_ids: Vec::new(),
    })
}

/// Parse `diff --git a/path b/path`, accounting for quoted paths with spaces.
fn parse_diff_git_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;
    let b_marker = rest.rfind(" b/")?;
    let a_part = &rest[..b_marker];
    let b_part = &rest[b_marker + 3..];
    let a_path = a_part.strip_prefix("a/").unwrap_or(a_part);
    Some((a_path.trim_matches('"').to_string(), b_part.trim_matches('"').to_string()))
}

/// Collect the distinct function-context strings git attaches to `@@` hunk
/// headers (the text after the second `@@`).
fn extract_hunk_contexts(block: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for line in block.lines() {
        if !line.starts_with("@@ ") {
            continue;
        }
        if let Some(second) = line[3..].find("@@") {
            let context = line[3 + second + 2..].trim();
            if !context.is_empty() && !seen.contains(&context.to_string()) {
                seen.push(context.to_string());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commit_log_extracts_hash_author_and_numstat() {
        let log = format!(
            "{COMMIT_MARKER}abc123{RECORD_SEP}{RECORD_SEP}John Doe{RECORD_SEP}2024-01-15T10:30:00+00:00{RECORD_SEP}feat: add login\n\
             3\t1\tsrc/auth.rs\n\
             0\t0\tsrc/main.rs\n\
             {COMMIT_MARKER}def456{RECORD_SEP}abc123{RECORD_SEP}Jane Smith{RECORD_SEP}2024-01-14T09:00:00+00:00{RECORD_SEP}fix: typo\n\
             1\t1\tREADME.md\n"
        );
        let commits = parse_commit_log(&log);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].parent, None);
        assert_eq!(commits[0].numstat, vec![("src/auth.rs".to_string(), 3, 1), ("src/main.rs".to_string(), 0, 0)]);
        assert_eq!(commits[1].parent, Some("abc123".to_string()));
    }

    #[test]
    fn parse_commit_log_handles_empty_input() {
        assert!(parse_commit_log("").is_empty());
    }

    #[test]
    fn split_patches_separates_by_commit_marker() {
        let output = format!("{COMMIT_MARKER}aaa\nhello\n{COMMIT_MARKER}bbb\nworld\n");
        let patches = split_patches(&output);
        assert_eq!(patches.get("aaa").map(String::as_str), Some("hello\n"));
        assert_eq!(patches.get("bbb").map(String::as_str), Some("world\n"));
    }

    #[test]
    fn parse_changes_detects_added_modified_and_renamed() {
        let patch = "diff --git a/new.rs b/new.rs\n\
new file mode 100644\n\
index 0000000..e69de29\n\
@@ -0,0 +1,3 @@ fn new_fn()\n\
+line one\n\
diff --git a/old.rs b/renamed.rs\n\
similarity index 90%\n\
rename from old.rs\n\
rename to renamed.rs\n";
        let changes = parse_changes("c1", patch);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert_eq!(changes[0].file_path, "new.rs");
        assert_eq!(changes[0].affected_functions, vec!["fn new_fn()".to_string()]);
        assert_eq!(changes[1].kind, ChangeKind::Renamed);
        assert_eq!(changes[1].old_path, Some("old.rs".to_string()));
        assert_eq!(changes[1].file_path, "renamed.rs");
    }

    #[test]
    fn extract_hunk_contexts_deduplicates() {
        let block = "@@ -1,2 +1,2 @@ fn foo()\n-a\n+b\n@@ -10,2 +10,2 @@ fn foo()\n-c\n+d\n";
        assert_eq!(extract_hunk_contexts(block), vec!["fn foo()".to_string()]);
    }
}
