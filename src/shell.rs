//! `ShellState`: owns the long-lived interpreter, line editor, and encrypted
//! history, and drives the read-eval-print loop.
//!
//! A top-level read-execute-persist-redraw loop, generalized into a struct
//! so `main.rs` itself can stay a thin entry point, the same split
//! `cli.rs`/`config.rs` already draw between flag parsing and rc loading.
//! `history`/`chpw` run as
//! ordinary builtins through `eval_ast` like everything else — `HistoryContext`
//! is the vault/history handle the evaluator borrows to run them (see
//! `builtins::HistoryHandle`).

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::builtins::HistoryHandle;
use crate::completion;
use crate::config;
use crate::crypto::{self, Vault, VaultPaths, VaultPolicy};
use crate::editor::{EditorOutcome, LineEditor};
use crate::error::{ZishError, ZishResult};
use crate::eval::{Evaluator, IoHandles};
use crate::history::{HistoryLog, HistoryStore};
use crate::parser;

pub struct ShellState {
    editor: LineEditor,
    eval: Evaluator,
    history_ctx: Arc<Mutex<HistoryContext>>,
    vim_synced: bool,
}

/// The vault/history state `history`/`chpw` need, shared with the evaluator
/// through an `Arc<Mutex<_>>` so a pipeline stage running on its own thread
/// (see `eval.rs::snapshot_for_concurrent_exec`) can reach it too.
struct HistoryContext {
    history: HistoryStore,
    log: HistoryLog,
    vault: Vault,
    paths: VaultPaths,
}

impl HistoryContext {
    fn record(&mut self, command: &str, exit_code: i32) {
        let now = now_secs();
        if self.history.add(command, now as u32, exit_code).is_err() {
            return;
        }
        if let Err(e) = self.log.append_submit(&self.vault, command, (exit_code & 0xff) as u8, now) {
            log::warn!("zish: failed to persist history record: {e}");
        }
    }

    fn toggle_bookmark(&mut self, command: &str) {
        let Ok(bookmarked) = self.history.toggle_bookmark(command) else { return };
        if let Err(e) = self.log.append_bookmark_toggle(&self.vault, command, bookmarked, now_secs()) {
            log::warn!("zish: failed to persist bookmark toggle: {e}");
        }
    }

    fn enable_password_mode(&mut self, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
        let Ok(first) = crypto::prompt_password("zish: new password: ") else { return 1 };
        let Ok(confirm) = crypto::prompt_password("zish: confirm password: ") else { return 1 };
        if first != confirm {
            let _ = writeln!(stderr, "zish: chpw: passwords did not match");
            return 1;
        }

        let mut salt = [0u8; crypto::SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        if let Err(e) = crypto::write_secret_file(&self.paths.salt_file, &salt) {
            let _ = writeln!(stderr, "zish: chpw: failed to persist salt: {e}");
            return 1;
        }

        let key = match crypto::derive_from_password(first.as_bytes(), &salt) {
            Ok(key) => key,
            Err(e) => {
                let _ = writeln!(stderr, "zish: chpw: {e}");
                return 1;
            }
        };
        let new_vault = Vault::from_key(key);

        if let Err(e) = HistoryLog::rekey(&self.paths.current_log, &self.vault, &new_vault) {
            let _ = writeln!(stderr, "zish: chpw: re-encryption failed: {e}");
            return 1;
        }
        if let Err(e) = crypto::write_secret_file(&self.paths.password_mode_file, b"1") {
            let _ = writeln!(stderr, "zish: chpw: failed to enable password mode: {e}");
            return 1;
        }

        self.vault = new_vault;
        let _ = writeln!(stdout, "zish: password mode enabled");
        0
    }

    fn disable_password_mode(&mut self, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
        let mut key = [0u8; crypto::KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        if let Err(e) = crypto::write_secret_file(&self.paths.key_file, &key) {
            let _ = writeln!(stderr, "zish: chpw: failed to persist key file: {e}");
            return 1;
        }
        let new_vault = Vault::from_key(key);

        if let Err(e) = HistoryLog::rekey(&self.paths.current_log, &self.vault, &new_vault) {
            let _ = writeln!(stderr, "zish: chpw: re-encryption failed: {e}");
            return 1;
        }
        let _ = std::fs::remove_file(&self.paths.password_mode_file);

        self.vault = new_vault;
        let _ = writeln!(stdout, "zish: password mode disabled");
        0
    }
}

impl HistoryHandle for HistoryContext {
    fn list(&mut self, stdout: &mut dyn Write) -> i32 {
        let commands: Vec<&str> = self.history.iter_commands().collect();
        for (idx, (command, entry)) in commands.into_iter().zip(self.history.entries()).enumerate() {
            let marker = if entry.bookmarked() { "*" } else { " " };
            let _ = writeln!(stdout, "{:5} {marker} {command}", idx + 1);
        }
        0
    }

    fn chpw(&mut self, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
        match args {
            [] => self.enable_password_mode(stdout, stderr),
            [opt] if opt == "-s" => {
                let status =
                    if self.paths.password_mode_file.exists() { "password mode: on" } else { "password mode: off" };
                let _ = writeln!(stdout, "{status}");
                0
            }
            [opt] if opt == "-r" => self.disable_password_mode(stdout, stderr),
            [other] => {
                let _ = writeln!(stderr, "zish: chpw: unrecognized option '{other}'");
                1
            }
            _ => {
                let _ = writeln!(stderr, "zish: chpw: usage: chpw [-s|-r]");
                1
            }
        }
    }
}

impl ShellState {
    pub fn new(no_rc: bool, no_password: bool) -> ZishResult<Self> {
        let config_dir = crypto::default_config_dir()
            .ok_or_else(|| ZishError::Other("cannot determine a home directory".into()))?;
        let paths = VaultPaths::under(&config_dir);

        let mut policy = VaultPolicy::from_env();
        policy.bypass_password = policy.bypass_password || no_password;

        let first_record = HistoryLog::peek_first_record(&paths.current_log);
        let vault = Vault::open(&policy, &paths, first_record)?;
        let log = HistoryLog::open(&paths.current_log)?;
        let history = HistoryLog::replay(&paths.current_log, &vault)?;

        let history_ctx = Arc::new(Mutex::new(HistoryContext { history, log, vault, paths }));

        let mut eval = Evaluator::new();
        eval.set_option("vim", true);
        eval.set_option("git_prompt", false);
        eval.history = Some(history_ctx.clone());

        let mut editor = LineEditor::new();
        editor.set_vim_enabled(true);

        crate::terminal::install_resize_notifier();
        #[cfg(unix)]
        crate::job_control::ignore_stop_signals();

        if !no_rc {
            if let Some(rc) = config::rc_path() {
                config::load(&rc, &mut eval)?;
            }
        }

        Ok(ShellState { editor, eval, history_ctx, vim_synced: true })
    }

    /// Run the interactive loop until EOF, `exit`, or Ctrl-D at an empty
    /// line. Returns the process exit code.
    pub fn run(&mut self) -> i32 {
        loop {
            self.sync_vim_option();
            let prompt = self.render_prompt();
            let history_snapshot: Vec<String> =
                self.history_ctx.lock().unwrap().history.iter_commands().map(str::to_string).collect();
            let mut complete = |line: &str, cursor: usize| completion::candidates(line, cursor);

            let outcome = match self.editor.read_line(&prompt, &history_snapshot, &mut complete) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("zish: line editor error: {e}");
                    break;
                }
            };

            match outcome {
                EditorOutcome::Eof | EditorOutcome::ExitShell => break,
                EditorOutcome::ToggleBookmark(line) => {
                    let trimmed = line.trim().to_string();
                    if !trimmed.is_empty() {
                        self.history_ctx.lock().unwrap().toggle_bookmark(&trimmed);
                    }
                }
                EditorOutcome::Submit(line) => self.run_line(&line),
            }
        }
        self.eval.last_exit_code
    }

    fn sync_vim_option(&mut self) {
        let want_vim = self.eval.options.get("vim").copied().unwrap_or(true);
        if want_vim != self.vim_synced {
            self.editor.set_vim_enabled(want_vim);
            self.vim_synced = want_vim;
        }
    }

    fn render_prompt(&self) -> String {
        let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "host".to_string());
        let home = std::env::var("HOME").unwrap_or_default();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("?")).to_string_lossy().into_owned();
        let cwd = if !home.is_empty() && cwd.starts_with(&home) {
            format!("~{}", &cwd[home.len()..])
        } else {
            cwd
        };

        let git_suffix = if self.eval.options.get("git_prompt").copied().unwrap_or(false) {
            current_branch().map(|b| format!(" ({b})")).unwrap_or_default()
        } else {
            String::new()
        };

        format!("{user}@{hostname} {cwd}{git_suffix} $ ")
    }

    /// Hand the line to the lexer/parser/evaluator pipeline and persist the
    /// result, per the ordering guarantee that a command is offered to the
    /// History Store and written to the on-disk log before the next prompt
    /// is drawn. `history`/`chpw` run inside that same pipeline as ordinary
    /// builtins, not ahead of it.
    fn run_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let code = match parser::parse(line) {
            Ok((arena, root)) => match self.eval.eval_ast(&arena, root, IoHandles::inherit()) {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("zish: {e}");
                    1
                }
            },
            Err(e) => {
                eprintln!("zish: {e}");
                1
            }
        };
        self.eval.last_exit_code = code;
        self.history_ctx.lock().unwrap().record(trimmed, code);
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn current_branch() -> Option<String> {
    let head = std::fs::read_to_string(".git/HEAD").ok()?;
    head.trim().strip_prefix("ref: refs/heads/").map(str::to_string)
}
