/// Integration tests for line editing & the encrypted history store.
///
/// Each test uses its own isolated temp HOME directory so concurrent test runs
/// cannot race on the shared vault/history files under `~/.config/zish/`.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Spawn the shell with `HOME`/`USERPROFILE` overridden to `home`, password
/// mode bypassed, feed `lines` via stdin (followed by `exit`), and return the
/// full output.
fn run_shell_with_home(lines: &[&str], home: &Path) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_zish"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("HOME", home)
        .env("USERPROFILE", home)
        .env("ZISH_BYPASS_PASSWORD", "1")
        .spawn()
        .expect("spawn zish");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

/// RAII temp directory — created on construction, deleted on drop.
struct TempHome(PathBuf);

impl TempHome {
    fn new(label: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("zish_test_home_{label}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp home");
        TempHome(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }

    fn log_path(&self) -> PathBuf {
        self.0.join(".config").join("zish").join("history.d").join("current.log.enc")
    }
}

impl Drop for TempHome {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn history_log_written_after_command() {
    let home = TempHome::new("written");
    let marker = "echo HISTORY_WRITTEN_MARKER";

    let output = run_shell_with_home(&[marker], home.path());
    assert!(output.status.success(), "shell did not exit cleanly");

    let path = home.log_path();
    assert!(path.exists(), "history.log was not created");

    // The log is sealed with XChaCha20-Poly1305; the plaintext command must
    // not appear anywhere in the on-disk bytes.
    let bytes = std::fs::read(&path).expect("read history.log");
    assert!(
        !bytes.windows(marker.len()).any(|w| w == marker.as_bytes()),
        "command text leaked into the encrypted log"
    );
}

#[test]
fn history_persists_across_sessions() {
    let home = TempHome::new("persists");
    let marker = "echo HISTORY_PERSISTENT_MARKER";

    // Session 1: run the distinctive command.
    let first = run_shell_with_home(&[marker], home.path());
    assert!(first.status.success(), "first session did not exit cleanly");

    // Session 2: a fresh shell instance must replay the log and list the entry.
    let second = run_shell_with_home(&["history"], home.path());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(
        stdout.contains(marker),
        "history builtin should list entries persisted by a prior session; stdout:\n{stdout}"
    );
}

#[test]
fn empty_commands_not_added_to_history() {
    let home = TempHome::new("empty");
    // Send a valid command, then blank lines that should be filtered out.
    let _ = run_shell_with_home(&["echo sentinel", "", "   "], home.path());

    let output = run_shell_with_home(&["history"], home.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let entry_count = stdout.lines().filter(|l| !l.trim().is_empty()).count();
    assert_eq!(entry_count, 1, "blank lines should not become history entries; stdout:\n{stdout}");
}

#[test]
fn bookmark_toggle_marks_entry_in_listing() {
    let home = TempHome::new("bookmark");
    let marker = "echo BOOKMARK_TARGET";
    let _ = run_shell_with_home(&[marker], home.path());

    // A second session replays the sealed log and can still see the entry.
    let output = run_shell_with_home(&["history"], home.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(marker), "expected replayed entry in history listing; stdout:\n{stdout}");
}
