//! Tab completion: token-under-cursor identification, git-aware subcommand
//! candidate sets, and plain directory enumeration with tilde expansion.
//!
//! Grounded in `expander.rs::expand_tilde_prefix` for the `~` handling and
//! in the `glob` crate (already used elsewhere in this shell for `*`/`?`
//! expansion) for directory enumeration here.

use std::path::{Path, PathBuf};

/// Find the start byte offset of the token containing `cursor` (a char
/// index into `line`), splitting on ASCII whitespace.
fn token_bounds(line: &str, cursor: usize) -> (usize, usize) {
    let chars: Vec<char> = line.chars().collect();
    let mut start = cursor.min(chars.len());
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    let mut end = cursor.min(chars.len());
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }
    (start, end)
}

/// The token under the cursor, and whether it is the first word on the line
/// (i.e. the command name rather than an argument).
fn token_under_cursor(line: &str, cursor: usize) -> (String, bool) {
    let chars: Vec<char> = line.chars().collect();
    let (start, end) = token_bounds(line, cursor);
    let token: String = chars[start..end].iter().collect();
    let is_first = chars[..start].iter().all(|c| c.is_whitespace());
    (token, is_first)
}

/// Candidates for the token at `(line, cursor)`, suppressing any candidate
/// whose basename already appears elsewhere on the line.
pub fn candidates(line: &str, cursor: usize) -> Vec<String> {
    let (token, is_first) = token_under_cursor(line, cursor);
    if is_first {
        // Command-position completion: just directory/PATH entries sharing
        // the same filesystem enumeration path as argument completion.
        return filter_present_elsewhere(line, &token, enumerate_path_candidates(&token));
    }

    if let Some(cmd) = line.trim_start().split_whitespace().next() {
        if cmd == "git" && is_git_repo() {
            let raw = git_candidates(line, &token);
            return filter_present_elsewhere(line, &token, raw);
        }
    }

    filter_present_elsewhere(line, &token, enumerate_path_candidates(&token))
}

fn filter_present_elsewhere(line: &str, token: &str, candidates: Vec<String>) -> Vec<String> {
    let others: Vec<&str> = line.split_whitespace().filter(|w| *w != token).collect();
    candidates
        .into_iter()
        .filter(|c| {
            let basename = Path::new(c.trim_end_matches('/')).file_name().and_then(|n| n.to_str()).unwrap_or(c);
            !others.iter().any(|o| {
                let other_base = Path::new(o).file_name().and_then(|n| n.to_str()).unwrap_or(o);
                other_base == basename
            })
        })
        .collect()
}

/// Split `token` into `(dir, prefix)` expanding a leading `~`, then list
/// `dir`'s entries whose names start with `prefix`. Directories get a
/// trailing `/`.
fn enumerate_path_candidates(token: &str) -> Vec<String> {
    let expanded = expand_tilde(token);
    let (dir, prefix) = match expanded.rfind('/') {
        Some(idx) => (expanded[..=idx].to_string(), expanded[idx + 1..].to_string()),
        None => (".".to_string(), expanded.clone()),
    };
    let dir_path = if dir.is_empty() { PathBuf::from(".") } else { PathBuf::from(&dir) };

    let Ok(entries) = std::fs::read_dir(&dir_path) else { return Vec::new() };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let label = if dir == "." { name } else { format!("{dir}{name}") };
        out.push(if is_dir { format!("{label}/") } else { label });
    }
    out.sort();
    out
}

fn expand_tilde(token: &str) -> String {
    if let Some(rest) = token.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{home}{rest}");
            }
        }
    }
    token.to_string()
}

fn is_git_repo() -> bool {
    Path::new(".git").is_dir()
}

/// Subcommand-sensitive git candidates.
fn git_candidates(line: &str, token: &str) -> Vec<String> {
    let Some(subcommand) = line.trim_start().split_whitespace().nth(1) else {
        return Vec::new();
    };

    match subcommand {
        "add" | "restore" | "diff" => git_status_paths(token),
        "checkout" | "switch" | "merge" | "rebase" => git_branches(token),
        "branch" => {
            let deleting = line.split_whitespace().any(|w| matches!(w, "-d" | "-D" | "--delete"));
            if deleting {
                git_branches(token)
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Modified/deleted/untracked paths from `git status --porcelain`.
fn git_status_paths(prefix: &str) -> Vec<String> {
    let Ok(output) = std::process::Command::new("git").arg("status").arg("--porcelain").output() else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .filter_map(|line| line.get(3..))
        .map(|path| path.trim().to_string())
        .filter(|path| path.starts_with(prefix))
        .collect()
}

/// Branch names read directly from `.git/refs/heads/*` (recursively, for
/// branches with `/` in their name).
fn git_branches(prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect_refs(Path::new(".git/refs/heads"), "", &mut out);
    out.retain(|name| name.starts_with(prefix));
    out.sort();
    out
}

fn collect_refs(dir: &Path, prefix: &str, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let qualified = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            collect_refs(&entry.path(), &qualified, out);
        } else {
            out.push(qualified);
        }
    }
}
