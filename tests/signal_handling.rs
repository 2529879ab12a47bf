#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::process::{Command, Stdio};

/// RAII temp directory used as `$HOME` so the vault/history files a spawned
/// shell creates don't collide with a concurrently running test.
#[cfg(unix)]
struct TempHome(PathBuf);

#[cfg(unix)]
impl TempHome {
    fn new(label: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("zish_test_home_{label}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp home");
        TempHome(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(unix)]
impl Drop for TempHome {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[cfg(unix)]
fn run_shell(lines: &[&str], home: &Path) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_zish"))
        .env("HOME", home)
        .env("ZISH_BYPASS_PASSWORD", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
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

#[cfg(unix)]
#[test]
fn pipeline_sigpipe_does_not_abort_shell() {
    // yes writes indefinitely; head -1 exits after one line, closing the read end.
    // yes receives SIGPIPE (SIG_DFL in child via pre_exec) and terminates.
    // We check $? to verify the shell is still responsive after the event
    // (guards against subtle state corruption where the shell appears alive but
    // stops processing commands normally).
    let home = TempHome::new("sigpipe");
    let output = run_shell(&["yes | head -1", "echo ALIVE", "echo STATUS:$?"], home.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(stdout.contains("STATUS:0"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[cfg(unix)]
#[test]
fn shell_ignores_sigtstp_at_prompt() {
    // Send SIGTSTP to the shell's own process group via $$. With no job
    // control to ever resume a stopped shell, the shell ignores SIGTSTP
    // outright (see job_control::ignore_stop_signals) and keeps running.
    let home = TempHome::new("sigtstp");
    let output = run_shell(&["kill -TSTP $$", "echo ALIVE"], home.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}
