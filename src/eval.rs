//! Walks the [`crate::ast`] tree and actually runs things: builtins, external
//! processes, pipelines, control flow, functions.
//!
//! Generalizes a flat executor (one that only ever executed one flat
//! [`parser::Command`] or a flat `Vec<PipelineCommand>`) into a full AST
//! walker, while keeping its pipe-plumbing and process-group/signal handling
//! almost verbatim — that part already matches what a tree-shaped evaluator
//! needs, it just needed a tree to walk instead of a flat list.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::process::{Command as OsCommand, Stdio};

use os_pipe::{PipeReader, PipeWriter, pipe};

use crate::ast::{Arena, AstNode, NodeId};
#[cfg(unix)]
use crate::job_control;
use crate::builtins;
use crate::error::{ZishError, ZishResult};
use crate::expander::{self, ExpansionContext};
use crate::parser;
use crate::redirect::{RedirectTarget, Redirection, is_null_device};
use crate::status;

/// Loops bounded at this many iterations (`while`/`until`/`for`), so a
/// runaway condition can't hang the shell forever.
pub const MAX_LOOP_ITERATIONS: u32 = 10_000;

/// Function calls bounded at this much nesting before `CallDepthExceeded`.
pub const MAX_CALL_DEPTH: usize = 64;

/// `$(...)`/backtick capture is truncated past this many bytes rather than
/// growing an unbounded buffer for a runaway child.
pub const MAX_CAPTURE_BYTES: usize = 4 * 1024;

/// The long-lived interpreter state: shell variables, user functions, `set`
/// options, the exit status of the last command, and the current function
/// call depth (for the recursion bound above).
///
/// A flat one-shot command executor had no need of a struct like this (its
/// functions just took everything as parameters); a tree walker with
/// variables, functions, and control flow does.
pub struct Evaluator {
    pub vars: HashMap<String, String>,
    pub functions: HashMap<String, String>,
    pub aliases: HashMap<String, String>,
    pub options: HashMap<String, bool>,
    pub last_exit_code: i32,
    call_depth: usize,
    /// Vault/history access for the `history`/`chpw` builtins, supplied by
    /// `ShellState`. `None` outside an interactive shell (e.g. in tests that
    /// exercise `Evaluator` directly), where those two builtins just fail.
    pub history: Option<builtins::SharedHistoryHandle>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator {
            vars: HashMap::new(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            options: HashMap::new(),
            last_exit_code: 0,
            call_depth: 0,
            history: None,
        }
    }

    /// A cheap, in-process clone of the interpreter's tables, for execution
    /// contexts that must not mutate `self` directly: non-last pipeline
    /// stages (run on their own thread, so they can't safely share `&mut
    /// self` with the stage still running here) and `$(...)`/backtick
    /// command substitution (which, like a real shell's, runs isolated from
    /// the caller — unlike the bare `( … )` subshell, which evaluates
    /// against `self` directly and so leaks its assignments).
    fn snapshot_for_concurrent_exec(&self) -> Evaluator {
        Evaluator {
            vars: self.vars.clone(),
            functions: self.functions.clone(),
            aliases: self.aliases.clone(),
            options: self.options.clone(),
            last_exit_code: self.last_exit_code,
            call_depth: self.call_depth,
            history: self.history.clone(),
        }
    }

    fn option(&self, name: &str) -> bool {
        self.options.get(name).copied().unwrap_or(false)
    }

    pub fn set_option(&mut self, name: &str, value: bool) {
        self.options.insert(name.to_string(), value);
    }

    /// Evaluate one AST node with the given I/O handles, returning its exit
    /// code. A flat one-shot executor never needed a dispatch table like
    /// this because it only ever ran one command or one pipeline; here
    /// every node kind in `ast.rs` gets a case.
    pub fn eval_ast(&mut self, arena: &Arena, id: NodeId, io: IoHandles) -> ZishResult<i32> {
        match arena.get(id) {
            AstNode::List { children } => {
                let children = children.clone();
                let mut io = Some(io);
                let mut code = 0;
                for (i, child) in children.iter().enumerate() {
                    let child_io = if i + 1 == children.len() {
                        io.take().expect("io consumed once per list")
                    } else {
                        io.as_ref().expect("io consumed once per list").try_clone()?
                    };
                    code = self.eval_ast(arena, *child, child_io)?;
                }
                Ok(code)
            }
            AstNode::LogicalAnd { left, right } => {
                let (left, right) = (*left, *right);
                let code = self.eval_ast(arena, left, io.try_clone()?)?;
                if code == 0 { self.eval_ast(arena, right, io) } else { Ok(code) }
            }
            AstNode::LogicalOr { left, right } => {
                let (left, right) = (*left, *right);
                let code = self.eval_ast(arena, left, io.try_clone()?)?;
                if code != 0 { self.eval_ast(arena, right, io) } else { Ok(code) }
            }
            AstNode::Assignment { name, value } => {
                let (name, value) = (name.clone(), *value);
                let text = self.expand_one(arena, value)?;
                self.vars.insert(name, text);
                Ok(0)
            }
            AstNode::Command { .. } => self.eval_command(arena, id, io),
            AstNode::Redirect { .. } => self.eval_redirect(arena, id, io),
            AstNode::Pipeline { children } => self.eval_pipeline(arena, &children.clone(), io),
            AstNode::If { condition, then_branch, else_branch } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                let cond_io = IoHandles::inherit();
                let code = self.eval_ast(arena, condition, cond_io)?;
                if code == 0 {
                    self.eval_ast(arena, then_branch, io)
                } else if let Some(branch) = else_branch {
                    self.eval_ast(arena, branch, io)
                } else {
                    Ok(0)
                }
            }
            AstNode::While { condition, body } => self.eval_loop(arena, *condition, *body, io, true),
            AstNode::Until { condition, body } => self.eval_loop(arena, *condition, *body, io, false),
            AstNode::For { variable, words, body } => {
                let (variable, words, body) = (variable.clone(), words.clone(), *body);
                self.eval_for(arena, &variable, &words, body, io)
            }
            AstNode::Subshell { body } => {
                let body = *body;
                self.eval_ast(arena, body, io)
            }
            AstNode::Test { children } => self.eval_test(arena, &children.clone()),
            AstNode::FunctionDef { name, body_source } => {
                self.functions.insert(name.clone(), body_source.clone());
                Ok(0)
            }
            AstNode::Word { .. } | AstNode::String { .. } => {
                Err(ZishError::Other("not executable at statement position".into()))
            }
        }
    }

    fn expand_one(&mut self, arena: &Arena, id: NodeId) -> ZishResult<String> {
        let vars = self.vars.clone();
        let last_exit_code = self.last_exit_code;
        let this = &mut *self;
        let mut capture = |cmd: &str| -> ZishResult<String> { this.capture_output(cmd) };
        let mut ctx = ExpansionContext { vars: &vars, last_exit_code, capture: &mut capture };
        expander::expand_one(arena, id, &mut ctx)
    }

    fn expand_words(&mut self, arena: &Arena, ids: &[NodeId]) -> ZishResult<Vec<String>> {
        let vars = self.vars.clone();
        let last_exit_code = self.last_exit_code;
        let this = &mut *self;
        let mut capture = |cmd: &str| -> ZishResult<String> { this.capture_output(cmd) };
        let mut ctx = ExpansionContext { vars: &vars, last_exit_code, capture: &mut capture };
        expander::expand_words(arena, ids, &mut ctx)
    }

    /// Run `command` (re-lexed/re-parsed from scratch) with its stdout
    /// captured in-process, for `$(...)`/backtick expansion. Uses a pipe plus
    /// a bounded reader thread rather than a temp file, same pattern as the
    /// teacher's pipeline plumbing in `executor.rs`.
    fn capture_output(&mut self, command: &str) -> ZishResult<String> {
        let (arena, root) = parser::parse(command)?;
        let (reader, writer) = pipe().map_err(ZishError::Io)?;
        let reader_thread = std::thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let mut reader = reader;
            loop {
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                if buf.len() < MAX_CAPTURE_BYTES {
                    let take = n.min(MAX_CAPTURE_BYTES - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
            }
            Ok(buf)
        });

        let io = IoHandles {
            input: InputHandle::Inherit,
            output: OutputHandle::Pipe(writer),
            error: OutputHandle::Inherit,
        };

        let mut child = self.snapshot_for_concurrent_exec();
        let code = child.eval_ast(&arena, root, io)?;
        self.last_exit_code = code;

        let bytes = reader_thread.join().map_err(|_| ZishError::Other("capture reader thread panicked".into()))?.map_err(ZishError::Io)?;
        String::from_utf8(bytes).map_err(|_| ZishError::Utf8)
    }

    fn eval_command(&mut self, arena: &Arena, id: NodeId, io: IoHandles) -> ZishResult<i32> {
        let AstNode::Command { children } = arena.get(id) else { unreachable!() };
        let children = children.clone();
        let words = self.expand_words(arena, &children)?;
        if words.is_empty() {
            return Ok(0);
        }
        let words = self.apply_alias(words);
        let (program, args) = (words[0].clone(), words[1..].to_vec());

        let code = if let Some(body) = self.functions.get(&program).cloned() {
            self.call_function(&body, &args, io)?
        } else if builtins::is_builtin(&program) {
            self.run_builtin(&program, &args, io)?
        } else {
            self.run_external(&program, &args, io)?
        };
        self.last_exit_code = code;
        Ok(code)
    }

    fn apply_alias(&self, mut words: Vec<String>) -> Vec<String> {
        if let Some(expansion) = self.aliases.get(&words[0]) {
            let mut replaced: Vec<String> = expansion.split_whitespace().map(str::to_string).collect();
            replaced.extend(words.drain(1..));
            return replaced;
        }
        words
    }

    fn run_builtin(&mut self, program: &str, args: &[String], io: IoHandles) -> ZishResult<i32> {
        let mut stdin_reader = io.input.into_reader()?;
        let mut stdout_writer = io.output.into_writer("stdout")?;
        let mut stderr_writer = io.error.into_writer("stderr")?;
        let action = builtins::execute(self, program, args, stdin_reader.as_mut(), stdout_writer.as_mut(), stderr_writer.as_mut());
        let _ = stdout_writer.flush();
        let _ = stderr_writer.flush();
        match action {
            builtins::BuiltinAction::Continue(code) => Ok(code),
            builtins::BuiltinAction::Exit(code) => std::process::exit(code),
        }
    }

    /// Re-lex and re-parse a function body at call time rather than caching
    /// a parsed tree, matching the grammar note that function bodies are
    /// "stored source text, re-parsed via the driver's top-level execute".
    /// Positional parameters aren't modeled — `args` only affects `$@`-style
    /// builtins indirectly through whatever the body itself expands; this is
    /// a deliberate simplification, not an oversight (see DESIGN.md).
    fn call_function(&mut self, body: &str, _args: &[String], io: IoHandles) -> ZishResult<i32> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(ZishError::CallDepthExceeded);
        }
        let (arena, root) = parser::parse(body)?;
        self.call_depth += 1;
        let result = self.eval_ast(&arena, root, io);
        self.call_depth -= 1;
        result
    }

    fn run_external(&mut self, program: &str, args: &[String], io: IoHandles) -> ZishResult<i32> {
        let mut process = OsCommand::new(program);
        process.args(args);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                process.pre_exec(|| {
                    let signals = [libc::SIGINT, libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE];
                    for &sig in &signals {
                        if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                            return Err(io::Error::last_os_error());
                        }
                    }
                    if libc::setpgid(0, 0) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let (stdin_stdio, here_string) = io.input.into_stdio()?;
        let stdout_stdio = io.output.into_stdio()?;
        let stderr_stdio = io.error.into_stdio()?;
        process.stdin(stdin_stdio).stdout(stdout_stdio).stderr(stderr_stdio);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) => return Ok(command_error(program, &e)),
        };

        if let Some(text) = here_string {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = writeln!(stdin, "{text}");
            }
        }

        #[cfg(unix)]
        {
            let pid = child.id() as libc::pid_t;
            let _ = job_control::set_process_group(pid, pid);
            let pgid = job_control::process_group_id(pid).unwrap_or(pid);
            let terminal_guard = job_control::ForegroundTerminalGuard::new(pgid).ok();
            let outcome = job_control::wait_for_pid(pid);
            drop(terminal_guard);
            return Ok(match outcome {
                Ok(job_control::WaitOutcome::Exited(code)) => code,
                Ok(job_control::WaitOutcome::Stopped) => 0,
                Err(_) => 1,
            });
        }

        #[cfg(not(unix))]
        {
            match child.wait() {
                Ok(status) => Ok(status::exit_code(status)),
                Err(e) => {
                    eprintln!("zish: {program}: {e}");
                    Ok(1)
                }
            }
        }
    }

    fn eval_redirect(&mut self, arena: &Arena, id: NodeId, io: IoHandles) -> ZishResult<i32> {
        let (inner, redirections) = self.collect_redirects(arena, id)?;
        let resolved = resolve_redirections(&redirections, io)?;
        self.eval_ast(arena, inner, resolved)
    }

    /// Walk a chain of nested `Redirect` nodes (built by wrapping, so the
    /// outermost node is the last redirect written) down to the underlying
    /// command, collecting the redirections in left-to-right source order.
    fn collect_redirects(&mut self, arena: &Arena, id: NodeId) -> ZishResult<(NodeId, Vec<Redirection>)> {
        let mut chain = Vec::new();
        let mut cursor = id;
        loop {
            match arena.get(cursor) {
                AstNode::Redirect { target, redirect, word } => {
                    chain.push((redirect.clone(), *word));
                    cursor = *target;
                }
                _ => break,
            }
        }
        chain.reverse();

        let mut redirections = Vec::with_capacity(chain.len());
        for (redirect, word) in chain {
            let fd = redirect.fd as i32;
            let target = match redirect.op {
                crate::lexer::RedirectOp::In => RedirectTarget::FileRead(self.expand_one(arena, word)?),
                crate::lexer::RedirectOp::Out => RedirectTarget::File(self.expand_one(arena, word)?),
                crate::lexer::RedirectOp::Append => RedirectTarget::FileAppend(self.expand_one(arena, word)?),
                crate::lexer::RedirectOp::HereString => RedirectTarget::HereString(self.expand_one(arena, word)?),
                crate::lexer::RedirectOp::HereDoc => {
                    return Err(ZishError::Other("heredoc bodies are not supported".into()));
                }
                crate::lexer::RedirectOp::DupTo(target_fd) => RedirectTarget::Fd(target_fd as i32),
            };
            redirections.push(Redirection { fd, target });
        }

        Ok((cursor, redirections))
    }

    fn eval_loop(&mut self, arena: &Arena, condition: NodeId, body: NodeId, io: IoHandles, while_true: bool) -> ZishResult<i32> {
        let mut code = 0;
        let mut iterations = 0u32;
        loop {
            if iterations >= MAX_LOOP_ITERATIONS {
                return Err(ZishError::IterationLimit);
            }
            let cond_code = self.eval_ast(arena, condition, IoHandles::inherit())?;
            let should_continue = if while_true { cond_code == 0 } else { cond_code != 0 };
            if !should_continue {
                break;
            }
            code = self.eval_ast(arena, body, io.try_clone()?)?;
            iterations += 1;
        }
        Ok(code)
    }

    fn eval_for(&mut self, arena: &Arena, variable: &str, words: &[NodeId], body: NodeId, io: IoHandles) -> ZishResult<i32> {
        let values = self.expand_words(arena, words)?;
        if values.len() as u32 > MAX_LOOP_ITERATIONS {
            return Err(ZishError::IterationLimit);
        }
        let mut code = 0;
        for value in values {
            self.vars.insert(variable.to_string(), value);
            code = self.eval_ast(arena, body, io.try_clone()?)?;
        }
        Ok(code)
    }

    /// A small `[[ ]]` predicate subset: file tests, string tests, numeric
    /// comparisons, and `!` negation. The grammar only ever hands this a flat
    /// word list (no nested boolean operators), matching spec's "simplified"
    /// note on `Test`.
    fn eval_test(&mut self, arena: &Arena, children: &[NodeId]) -> ZishResult<i32> {
        let words = self.expand_words(arena, children)?;
        let negate = words.first().map(|w| w == "!").unwrap_or(false);
        let words: Vec<&str> = if negate { words[1..].iter().map(String::as_str).collect() } else { words.iter().map(String::as_str).collect() };

        let result = match words.as_slice() {
            ["-f", path] => std::path::Path::new(path).is_file(),
            ["-d", path] => std::path::Path::new(path).is_dir(),
            ["-e", path] => std::path::Path::new(path).exists(),
            ["-z", s] => s.is_empty(),
            ["-n", s] => !s.is_empty(),
            [a, "==", b] | [a, "=", b] => a == b,
            [a, "!=", b] => a != b,
            [a, "-eq", b] => parse_num(a) == parse_num(b),
            [a, "-ne", b] => parse_num(a) != parse_num(b),
            [a, "-lt", b] => parse_num(a) < parse_num(b),
            [a, "-le", b] => parse_num(a) <= parse_num(b),
            [a, "-gt", b] => parse_num(a) > parse_num(b),
            [a, "-ge", b] => parse_num(a) >= parse_num(b),
            [s] => !s.is_empty(),
            [] => false,
            _ => return Err(ZishError::Other("unsupported '[[' expression".into())),
        };

        Ok(if result != negate { 0 } else { 1 })
    }

    /// Only `Command` segments (after redirect-unwrapping) can appear as
    /// pipeline stages — a flat `PipelineCommand` never modeled anything
    /// richer than a flat command either, so this keeps the generalization
    /// honest rather than inventing pipeline-of-`if` support nothing in the
    /// grammar needs.
    fn eval_pipeline(&mut self, arena: &Arena, segments: &[NodeId], io: IoHandles) -> ZishResult<i32> {
        if segments.is_empty() {
            return Ok(0);
        }
        if segments.len() == 1 {
            return self.eval_ast(arena, segments[0], io);
        }

        let mut prev_pipe: Option<PipeReader> = None;
        let mut last_code = 0;
        let mut pipeline_pgid: Option<u32> = None;
        #[cfg(unix)]
        let mut child_pids: Vec<u32> = Vec::new();
        let mut builtin_threads: Vec<std::thread::JoinHandle<ZishResult<()>>> = Vec::new();

        for (idx, &segment) in segments.iter().enumerate() {
            let is_last = idx + 1 == segments.len();
            let stdin = prev_pipe.take().map(InputHandle::Pipe).unwrap_or(InputHandle::Inherit);
            let (stdout, next_reader) = if is_last {
                (io.output.try_clone()?, None)
            } else {
                let (reader, writer) = pipe().map_err(ZishError::Io)?;
                (OutputHandle::Pipe(writer), Some(reader))
            };
            let stderr = io.error.try_clone()?;
            let stage_io = IoHandles { input: stdin, output: stdout, error: stderr };

            let (inner, redirections) = self.collect_redirects(arena, segment)?;
            let AstNode::Command { children } = arena.get(inner) else {
                return Err(ZishError::Other("pipeline stage must be a simple command".into()));
            };
            let words = self.expand_words(arena, &children.clone())?;
            if words.is_empty() {
                continue;
            }
            let words = self.apply_alias(words);
            let (program, args) = (words[0].clone(), words[1..].to_vec());
            let stage_io = resolve_redirections(&redirections, stage_io)?;

            if let Some(body) = self.functions.get(&program).cloned() {
                if is_last {
                    last_code = self.call_function(&body, &args, stage_io)?;
                } else {
                    let mut child = self.snapshot_for_concurrent_exec();
                    builtin_threads.push(std::thread::spawn(move || -> ZishResult<()> {
                        child.call_function(&body, &args, stage_io).map(|_| ())
                    }));
                }
            } else if builtins::is_builtin(&program) {
                if is_last {
                    last_code = self.run_builtin(&program, &args, stage_io)?;
                } else {
                    let mut child = self.snapshot_for_concurrent_exec();
                    builtin_threads.push(std::thread::spawn(move || -> ZishResult<()> {
                        child.run_builtin(&program, &args, stage_io).map(|_| ())
                    }));
                }
            } else {
                let (child_pid, code) = self.spawn_pipeline_stage(&program, &args, stage_io, pipeline_pgid)?;
                if pipeline_pgid.is_none() {
                    pipeline_pgid = Some(child_pid);
                }
                #[cfg(unix)]
                child_pids.push(child_pid);
                if is_last {
                    last_code = code;
                }
            }

            prev_pipe = next_reader;
        }

        for handle in builtin_threads {
            let _ = handle.join();
        }

        Ok(last_code)
    }

    /// Spawn one external pipeline stage, joining `leader_pgid`'s process
    /// group (or becoming the leader if this is the first external stage),
    /// and wait for it immediately — mirrors `executor.rs::execute_pipeline`'s
    /// per-stage spawn shape but waits stage-by-stage rather than batching
    /// all waits at the end, since `eval_pipeline` doesn't keep every `Child`
    /// alive across the loop.
    fn spawn_pipeline_stage(
        &self,
        program: &str,
        args: &[String],
        io: IoHandles,
        leader_pgid: Option<u32>,
    ) -> ZishResult<(u32, i32)> {
        let mut process = OsCommand::new(program);
        process.args(args);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let target_pgid = leader_pgid;
            unsafe {
                process.pre_exec(move || {
                    let signals = [libc::SIGINT, libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE];
                    for &sig in &signals {
                        if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                            return Err(io::Error::last_os_error());
                        }
                    }
                    let pgid = target_pgid.map(|p| p as libc::pid_t).unwrap_or(0);
                    if libc::setpgid(0, pgid) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let (stdin_stdio, here_string) = io.input.into_stdio()?;
        let stdout_stdio = io.output.into_stdio()?;
        let stderr_stdio = io.error.into_stdio()?;
        process.stdin(stdin_stdio).stdout(stdout_stdio).stderr(stderr_stdio);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) => return Ok((0, command_error(program, &e))),
        };

        if let Some(text) = here_string {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = writeln!(stdin, "{text}");
            }
        }

        let pid = child.id();

        #[cfg(unix)]
        {
            let child_pid = pid as libc::pid_t;
            let target_pgid = leader_pgid.map(|p| p as libc::pid_t).unwrap_or(child_pid);
            unsafe { libc::setpgid(child_pid, target_pgid) };

            let fg_pgid = if leader_pgid.is_none() { child_pid } else { target_pgid };
            let terminal_guard = job_control::ForegroundTerminalGuard::new(fg_pgid).ok();
            let outcome = job_control::wait_for_pid(child_pid);
            drop(terminal_guard);
            let code = match outcome {
                Ok(job_control::WaitOutcome::Exited(code)) => code,
                Ok(job_control::WaitOutcome::Stopped) => 0,
                Err(_) => 1,
            };
            return Ok((pid, code));
        }

        #[cfg(not(unix))]
        {
            let code = match child.wait() {
                Ok(status) => status::exit_code(status),
                Err(_) => 1,
            };
            Ok((pid, code))
        }
    }
}

fn parse_num(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

fn command_error(program: &str, e: &io::Error) -> i32 {
    if e.kind() == io::ErrorKind::NotFound {
        eprintln!("zish: {program}: command not found");
        127
    } else {
        eprintln!("zish: {program}: {e}");
        126
    }
}

// ── I/O handles ──
//
// Shaped identically to `executor.rs`'s private `InputHandle`/`OutputHandle`,
// generalized to be consumed by value through `eval_ast` (rather than held
// behind a mutable borrow of one `PipelineCommand` loop) and to carry a
// `try_clone` for the `List`/`LogicalAnd`/`LogicalOr`/loop nodes that need to
// hand the *same* destination to more than one child evaluation in sequence.

pub enum InputHandle {
    Inherit,
    Pipe(PipeReader),
    File(File),
    HereString(String),
}

pub enum OutputHandle {
    Inherit,
    Null,
    File(File),
    Pipe(PipeWriter),
}

pub struct IoHandles {
    pub input: InputHandle,
    pub output: OutputHandle,
    pub error: OutputHandle,
}

impl IoHandles {
    pub fn inherit() -> Self {
        IoHandles { input: InputHandle::Inherit, output: OutputHandle::Inherit, error: OutputHandle::Inherit }
    }

    fn try_clone(&self) -> ZishResult<IoHandles> {
        Ok(IoHandles {
            input: self.input.try_clone()?,
            output: self.output.try_clone()?,
            error: self.error.try_clone()?,
        })
    }
}

impl InputHandle {
    fn try_clone(&self) -> ZishResult<InputHandle> {
        Ok(match self {
            InputHandle::Inherit => InputHandle::Inherit,
            InputHandle::HereString(s) => InputHandle::HereString(s.clone()),
            InputHandle::File(f) => InputHandle::File(f.try_clone().map_err(ZishError::Io)?),
            InputHandle::Pipe(reader) => InputHandle::Pipe(reader.try_clone().map_err(ZishError::Io)?),
        })
    }

    fn into_stdio(self) -> ZishResult<(Stdio, Option<String>)> {
        Ok(match self {
            InputHandle::Inherit => (Stdio::inherit(), None),
            InputHandle::Pipe(reader) => (Stdio::from(reader), None),
            InputHandle::File(file) => (Stdio::from(file), None),
            InputHandle::HereString(text) => (Stdio::piped(), Some(text)),
        })
    }

    fn into_reader(self) -> ZishResult<Box<dyn Read + Send>> {
        Ok(match self {
            InputHandle::Inherit => Box::new(io::stdin()),
            InputHandle::Pipe(reader) => Box::new(reader),
            InputHandle::File(file) => Box::new(file),
            InputHandle::HereString(text) => Box::new(Cursor::new(format!("{text}\n"))),
        })
    }
}

impl OutputHandle {
    fn try_clone(&self) -> ZishResult<OutputHandle> {
        Ok(match self {
            OutputHandle::Inherit => OutputHandle::Inherit,
            OutputHandle::Null => OutputHandle::Null,
            OutputHandle::File(file) => OutputHandle::File(file.try_clone().map_err(ZishError::Io)?),
            OutputHandle::Pipe(writer) => OutputHandle::Pipe(writer.try_clone().map_err(ZishError::Io)?),
        })
    }

    fn into_stdio(self) -> ZishResult<Stdio> {
        Ok(match self {
            OutputHandle::Inherit => Stdio::inherit(),
            OutputHandle::Null => Stdio::null(),
            OutputHandle::File(file) => Stdio::from(file),
            OutputHandle::Pipe(writer) => Stdio::from(writer),
        })
    }

    fn into_writer(self, label: &str) -> ZishResult<Box<dyn Write + Send>> {
        Ok(match self {
            OutputHandle::Inherit => {
                if label == "stderr" { Box::new(io::stderr()) } else { Box::new(io::stdout()) }
            }
            OutputHandle::Null => Box::new(io::sink()),
            OutputHandle::File(file) => Box::new(file),
            OutputHandle::Pipe(writer) => Box::new(writer),
        })
    }
}

/// Apply a flat list of redirections to a starting set of handles, same
/// match shape as `executor.rs::resolve_redirections` generalized from
/// "defaults plus overrides for one pipeline stage" to "defaults plus
/// overrides coming from an arbitrary nested `Redirect` chain".
fn resolve_redirections(redirections: &[Redirection], defaults: IoHandles) -> ZishResult<IoHandles> {
    let mut stdin = defaults.input;
    let mut stdout = defaults.output;
    let mut stderr = defaults.error;

    for redir in redirections {
        match (&redir.target, redir.fd) {
            (RedirectTarget::Fd(target), fd) if *target == fd => {}
            (RedirectTarget::File(path), 1) => stdout = open_output_file(path, false)?,
            (RedirectTarget::FileAppend(path), 1) => stdout = open_output_file(path, true)?,
            (RedirectTarget::FileRead(path), 0) => stdin = open_input_file(path)?,
            (RedirectTarget::File(path), 2) => stderr = open_output_file(path, false)?,
            (RedirectTarget::FileAppend(path), 2) => stderr = open_output_file(path, true)?,
            (RedirectTarget::Fd(1), 2) => stderr = stdout.try_clone()?,
            (RedirectTarget::Fd(2), 1) => stdout = stderr.try_clone()?,
            (RedirectTarget::HereString(text), 0) => stdin = InputHandle::HereString(text.clone()),
            _ => {
                return Err(ZishError::Other(format!("unsupported redirection: fd {} -> {:?}", redir.fd, redir.target)));
            }
        }
    }

    Ok(IoHandles { input: stdin, output: stdout, error: stderr })
}

fn open_output_file(path: &str, append: bool) -> ZishResult<OutputHandle> {
    if is_null_device(path) {
        return Ok(OutputHandle::Null);
    }
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    };
    file.map(OutputHandle::File).map_err(ZishError::Io)
}

fn open_input_file(path: &str) -> ZishResult<InputHandle> {
    File::open(path).map(InputHandle::File).map_err(ZishError::Io)
}
