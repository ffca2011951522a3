//! Blame analyzer (peripheral, reduced depth per the overview).
//!
//! Shells out to `git blame --line-porcelain` and parses the header lines
//! into per-line `(commit_hash, author)` pairs, aggregated into an
//! ownership summary. No incremental invalidation beyond overwrite-on-upsert
//! in `blame_cache`, keyed by `(file_path, line_range_hash)`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::index::StorageEngine;
use crate::types::sha256_hex;

/// A single blamed line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameEntry {
    pub line: u32,
    pub commit_hash: String,
    pub author: String,
}

/// Computes and caches blame results for line ranges.
pub struct BlameAnalyzer;

impl BlameAnalyzer {
    /// Blame `file_path` over `[start_line, end_line]` (1-based, inclusive).
    /// Serves from `blame_cache` when present.
    pub fn blame(
        repo_path: &Path,
        file_path: &str,
        start_line: u32,
        end_line: u32,
        storage: &StorageEngine,
    ) -> IndexResult<Vec<BlameEntry>> {
        let range_hash = sha256_hex(format!("{start_line}-{end_line}").as_bytes());

        if let Some(cached) = storage.get_blame_cache(file_path, &range_hash)? {
            if let Ok(entries) = serde_json::from_str::<Vec<BlameEntry>>(&cached) {
                return Ok(entries);
            }
        }

        let output = run_git_blame(repo_path, file_path, start_line, end_line)?;
        let entries = parse_porcelain(&output);

        let json = serde_json::to_string(&entries).map_err(|e| IndexError::Serialization(e.to_string()))?;
        storage.set_blame_cache(file_path, &range_hash, start_line, end_line, &json)?;

        Ok(entries)
    }

    /// Aggregate blamed lines into `{ author -> line_count }`, sorted by
    /// descending line count.
    pub fn ownership_summary(entries: &[BlameEntry]) -> Vec<(String, u32)> {
        let mut counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for entry in entries {
            *counts.entry(entry.author.clone()).or_default() += 1;
        }
        let mut sorted: Vec<(String, u32)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted
    }
}

fn run_git_blame(repo_path: &Path, file_path: &str, start_line: u32, end_line: u32) -> IndexResult<String> {
    let output = std::process::Command::new("git")
        .args([
            "blame",
            "--line-porcelain",
            "-L",
            &format!("{start_line},{end_line}"),
            "--",
            file_path,
        ])
        .current_dir(repo_path)
        .output()
        .map_err(|e| IndexError::Internal(format!("git blame invocation failed: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IndexError::Internal(format!("git blame error: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `git blame --line-porcelain` output into [`BlameEntry`] records.
fn parse_porcelain(output: &str) -> Vec<BlameEntry> {
    let mut hash_to_author: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    let mut current_hash = String::new();
    let mut current_final_line: u32 = 0;
    let mut entries = Vec::new();

    for line in output.lines() {
        if line.starts_with('\t') {
            entries.push(BlameEntry {
                line: current_final_line,
                commit_hash: current_hash.clone(),
                author: hash_to_author.get(&current_hash).cloned().unwrap_or_default(),
            });
            continue;
        }
        if let Some(author) = line.strip_prefix("author ") {
            hash_to_author.insert(current_hash.clone(), author.to_string());
            continue;
        }
        if let Some(header) = parse_header(line) {
            current_hash = header.0;
            current_final_line = header.1;
        }
    }

    entries
}

/// Parse a porcelain header line (`<sha> <orig_line> <final_line> [<count>]`)
/// into `(commit_hash, final_line)`.
fn parse_header(line: &str) -> Option<(String, u32)> {
    let mut parts = line.split_whitespace();
    let hash = parts.next()?;
    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    parts.next()?; // original line number, unused
    let final_line: u32 = parts.next()?.parse().ok()?;
    Some((hash.to_string(), final_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2 1 1 1
author Jane Doe
author-mail <jane@example.com>
author-time 1700000000
author-tz +0000
committer Jane Doe
committer-mail <jane@example.com>
committer-time 1700000000
committer-tz +0000
summary initial commit
filename src/lib.rs
\tfn main() {}
c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4 2 2 1
author Bob Smith
author-mail <bob@example.com>
author-time 1700001000
author-tz +0000
committer Bob Smith
committer-mail <bob@example.com>
committer-time 1700001000
committer-tz +0000
summary add helper
filename src/lib.rs
\tfn helper() {}
a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2 3 3 1
\tfn main_again() {}
";

    #[test]
    fn parse_porcelain_extracts_line_author_and_commit() {
        let entries = parse_porcelain(SAMPLE);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].line, 1);
        assert_eq!(entries[0].author, "Jane Doe");
        assert_eq!(entries[1].author, "Bob Smith");
        // third line reuses the first commit without repeating `author`
        assert_eq!(entries[2].commit_hash, entries[0].commit_hash);
        assert_eq!(entries[2].author, "Jane Doe");
    }

    #[test]
    fn ownership_summary_aggregates_and_sorts_descending() {
        let entries = parse_porcelain(SAMPLE);
        let summary = BlameAnalyzer::ownership_summary(&entries);
        assert_eq!(summary[0], ("Jane Doe".to_string(), 2));
        assert_eq!(summary[1], ("Bob Smith".to_string(), 1));
    }

    #[test]
    fn blame_cache_round_trips_through_storage() {
        let storage = StorageEngine::open_in_memory().expect("open");
        let entries = parse_porcelain(SAMPLE);
        let json = serde_json::to_string(&entries).expect("serialize");
        storage
            .set_blame_cache("src/lib.rs", "rangehash", 1, 3, &json)
            .expect("set cache");

        let cached = storage
            .get_blame_cache("src/lib.rs", "rangehash")
            .expect("get cache")
            .expect("present");
        let roundtripped: Vec<BlameEntry> = serde_json::from_str(&cached).expect("deserialize");
        assert_eq!(roundtripped.len(), entries.len());
        assert_eq!(roundtripped[0].author, "Jane Doe");
    }

    #[test]
    fn missing_cache_entry_returns_none() {
        let storage = StorageEngine::open_in_memory().expect("open");
        assert!(storage.get_blame_cache("nope.rs", "x").expect("query").is_none());
    }
}
