//! The vi-modal line editor: key decoding into a tagged `Action`, an
//! `apply_action` step that mutates editor state, and a redraw routine built
//! on [`crate::terminal::AnsiWriter`].
//!
//! A `Vec<char>` buffer with a cursor index, a `RawModeGuard` entered for
//! the duration of `read_line`, a crossterm `event::read()` loop, and a
//! `KeyAction`-style return enum — generalized from an Emacs-only,
//! single-line editor built on that same skeleton (buffer/cursor state,
//! raw-mode guard, blocking read loop) into the vi `Insert`/`Normal`/`Search`
//! modes and the richer `Action`/`Motion` taxonomy this shell needs,
//! splitting what had been one flat `handle_key` match into a `decode_key`
//! step (key → `Action`) feeding a separate `apply_action` step, so the two
//! concerns (what was pressed vs. what it does) aren't tangled together.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::terminal::{AnsiWriter, CursorStyle, RawModeGuard, RESIZE_PENDING};

const MAX_MENU_ROWS: usize = 8;

// ── Modes, actions, motions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Insert,
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordBoundary {
    /// `word`: alphanumeric + `_` runs.
    Word,
    /// `WORD`: non-whitespace runs.
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    LineStart,
    LineEnd,
    WordForward(WordBoundary),
    WordBackward(WordBoundary),
    WordEnd(WordBoundary),
    /// Try moving within a multi-line buffer first; falls back to history
    /// navigation at the buffer's vertical boundary (Normal mode only — in
    /// Insert mode up/down always go straight to history).
    LineUp,
    LineDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    CharUnderCursor,
    ToLineEnd,
}

/// A pending operator, waiting for the motion that gives it a span. `dw`
/// deletes cursor..motion-target; a second `d` while one is already pending
/// (`dd`) deletes the whole line instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Cursor,
    AfterCursor,
    LineStart,
    LineEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YankTarget {
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteTarget {
    AfterCursor,
    BeforeCursor,
}

/// One decoded key-read. Mirrors the taxonomy spelled out for the line
/// editor, trimmed to the subset this crate actually implements (e.g. a
/// single unnamed yank register rather than `Selection(start, end)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Cancel,
    ExitShell,
    ExecuteCommand,
    ClearScreen,
    ToggleBookmark,
    ToggleVimEnabled,
    TapComplete,
    CycleComplete(CycleDirection),
    InputChar(char),
    Backspace,
    Delete(DeleteTarget),
    Operator(Operator),
    MoveCursor(Motion),
    HistoryNav(HistoryDirection),
    EnterSearchMode(SearchDirection),
    ExitSearchMode { execute: bool },
    Yank(YankTarget),
    Paste(PasteTarget),
    InsertAt(InsertPosition),
    SetMode(Mode),
    EnterPasteMode,
    ExitPasteMode,
    Undo,
    RedrawLine,
}

/// What `read_line` handed back to the caller.
pub enum EditorOutcome {
    Submit(String),
    Eof,
    ExitShell,
    ToggleBookmark(String),
}

// ── Line editor state ───────────────────────────────────────────────────────

pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    mode: Mode,
    vim_enabled: bool,
    paste_mode: bool,
    displayed_lines: u16,
    yank: String,
    undo_snapshot: Option<(Vec<char>, usize)>,
    history_index: Option<usize>,
    prefix_len: usize,
    saved_buffer: String,
    last_resize_check: Instant,
    menu: Option<CompletionMenu>,
    pending_operator: Option<Operator>,
}

struct CompletionMenu {
    candidates: Vec<String>,
    selected: Option<usize>,
    pattern_start: usize,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        LineEditor {
            buffer: Vec::new(),
            cursor: 0,
            mode: Mode::Insert,
            vim_enabled: true,
            paste_mode: false,
            displayed_lines: 1,
            yank: String::new(),
            undo_snapshot: None,
            history_index: None,
            prefix_len: 0,
            saved_buffer: String::new(),
            last_resize_check: Instant::now(),
            menu: None,
            pending_operator: None,
        }
    }

    pub fn set_vim_enabled(&mut self, enabled: bool) {
        self.vim_enabled = enabled;
        if !enabled {
            self.mode = Mode::Insert;
        }
    }

    /// Read one line. `history` is the caller's command list (oldest →
    /// newest); `complete` returns completion candidates for the token at
    /// `(line, cursor)`, injected the same way `eval.rs` injects a capture
    /// closure rather than this module reaching into `completion.rs`'s
    /// filesystem/git concerns directly.
    pub fn read_line(
        &mut self,
        prompt: &str,
        history: &[String],
        complete: &mut dyn FnMut(&str, usize) -> Vec<String>,
    ) -> io::Result<EditorOutcome> {
        if !crossterm::tty::IsTty::is_tty(&io::stdin()) {
            return self.read_line_fallback(prompt);
        }

        self.reset_for_new_line();
        let _guard = RawModeGuard::enter()?;
        let mut out = AnsiWriter::new();
        out.cursor_style(CursorStyle::Bar)?;
        out.write_str(prompt)?;
        out.flush()?;

        loop {
            if RESIZE_PENDING.swap(false, std::sync::atomic::Ordering::Relaxed)
                && self.last_resize_check.elapsed() >= Duration::from_millis(50)
            {
                self.last_resize_check = Instant::now();
                self.redraw(prompt, &mut out)?;
            }

            let ev = match event::read() {
                Ok(ev) => ev,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            // crossterm decodes the bracketed-paste envelope itself and
            // hands back the pasted text in one shot — every printable byte
            // (CR/LF mapped to `\n`) is inserted regardless of vi mode.
            if let Event::Paste(text) = ev {
                self.snapshot_for_undo();
                for c in text.chars() {
                    let c = if c == '\r' { '\n' } else { c };
                    self.buffer.insert(self.cursor, c);
                    self.cursor += 1;
                }
                self.redraw(prompt, &mut out)?;
                continue;
            }

            let Event::Key(key) = ev else { continue };
            if key.kind != KeyEventKind::Press && key.kind != KeyEventKind::Repeat {
                continue;
            }

            let action = self.decode_key(key);
            match self.apply_action(action, history, complete) {
                Step::Continue => self.redraw(prompt, &mut out)?,
                Step::Quiet => {}
                Step::Submit => {
                    out.write_str("\r\n")?;
                    out.flush()?;
                    let line: String = self.buffer.iter().collect();
                    return Ok(EditorOutcome::Submit(line));
                }
                Step::Eof => {
                    out.write_str("\r\n")?;
                    out.flush()?;
                    return Ok(EditorOutcome::Eof);
                }
                Step::ExitShell => {
                    out.write_str("\r\n")?;
                    out.flush()?;
                    return Ok(EditorOutcome::ExitShell);
                }
                Step::ToggleBookmark => {
                    let line: String = self.buffer.iter().collect();
                    return Ok(EditorOutcome::ToggleBookmark(line));
                }
                Step::ClearScreen => {
                    out.clear_screen()?;
                    self.displayed_lines = 0;
                    self.redraw(prompt, &mut out)?;
                }
            }
        }
    }

    fn reset_for_new_line(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.mode = Mode::Insert;
        self.paste_mode = false;
        self.displayed_lines = 1;
        self.history_index = None;
        self.prefix_len = 0;
        self.saved_buffer.clear();
        self.menu = None;
        self.pending_operator = None;
    }

    fn read_line_fallback(&mut self, prompt: &str) -> io::Result<EditorOutcome> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => Ok(EditorOutcome::Eof),
            Ok(_) => Ok(EditorOutcome::Submit(line)),
            Err(e) => Err(e),
        }
    }

    // ── Key decoding ────────────────────────────────────────────────────────

    fn decode_key(&mut self, key: KeyEvent) -> Action {
        use KeyCode::*;
        use KeyModifiers as Mod;

        if self.paste_mode {
            return match key.code {
                Char(c) => Action::InputChar(c),
                Enter => Action::InputChar('\n'),
                _ => Action::None,
            };
        }

        match (key.code, key.modifiers) {
            (Char('c'), Mod::CONTROL) => Action::Cancel,
            (Char('t'), Mod::CONTROL) => Action::ToggleVimEnabled,
            (Char('l'), Mod::CONTROL) => Action::ClearScreen,
            (Char('d'), Mod::CONTROL) if self.mode == Mode::Insert && self.buffer.is_empty() => {
                Action::ExitShell
            }
            (Char('d'), Mod::CONTROL) => Action::Delete(DeleteTarget::CharUnderCursor),
            (Char('b'), Mod::CONTROL) => Action::ToggleBookmark,
            (Tab, Mod::NONE) => Action::TapComplete,
            (BackTab, _) => Action::CycleComplete(CycleDirection::Backward),
            (Backspace, _) => Action::Backspace,
            (Enter, _) if self.mode != Mode::Search => Action::ExecuteCommand,
            (Enter, _) => Action::ExitSearchMode { execute: true },
            (Esc, _) if self.mode == Mode::Search => Action::ExitSearchMode { execute: false },
            (Esc, _) => Action::SetMode(Mode::Normal),
            (Up, _) => Action::HistoryNav(HistoryDirection::Up),
            (Down, _) => Action::HistoryNav(HistoryDirection::Down),
            (Left, _) => Action::MoveCursor(Motion::Left),
            (Right, _) => Action::MoveCursor(Motion::Right),
            (Home, _) => Action::MoveCursor(Motion::LineStart),
            (End, _) => Action::MoveCursor(Motion::LineEnd),
            (Delete, _) => Action::Delete(DeleteTarget::CharUnderCursor),
            (Char(c), Mod::NONE) | (Char(c), Mod::SHIFT) => self.decode_printable(c),
            _ => Action::None,
        }
    }

    fn decode_printable(&self, c: char) -> Action {
        if self.mode != Mode::Normal {
            return Action::InputChar(c);
        }
        match c {
            'h' => Action::MoveCursor(Motion::Left),
            'l' => Action::MoveCursor(Motion::Right),
            '0' => Action::MoveCursor(Motion::LineStart),
            '$' => Action::MoveCursor(Motion::LineEnd),
            'w' => Action::MoveCursor(Motion::WordForward(WordBoundary::Word)),
            'W' => Action::MoveCursor(Motion::WordForward(WordBoundary::Big)),
            'b' => Action::MoveCursor(Motion::WordBackward(WordBoundary::Word)),
            'B' => Action::MoveCursor(Motion::WordBackward(WordBoundary::Big)),
            'e' => Action::MoveCursor(Motion::WordEnd(WordBoundary::Word)),
            'E' => Action::MoveCursor(Motion::WordEnd(WordBoundary::Big)),
            'j' => Action::MoveCursor(Motion::LineDown),
            'k' => Action::MoveCursor(Motion::LineUp),
            'i' => Action::InsertAt(InsertPosition::Cursor),
            'a' => Action::InsertAt(InsertPosition::AfterCursor),
            'A' => Action::InsertAt(InsertPosition::LineEnd),
            'I' => Action::InsertAt(InsertPosition::LineStart),
            'x' => Action::Delete(DeleteTarget::CharUnderCursor),
            'D' => Action::Delete(DeleteTarget::ToLineEnd),
            'd' => Action::Operator(Operator::Delete),
            'p' => Action::Paste(PasteTarget::AfterCursor),
            'P' => Action::Paste(PasteTarget::BeforeCursor),
            'y' => Action::Yank(YankTarget::Line),
            'u' => Action::Undo,
            '/' => Action::EnterSearchMode(SearchDirection::Forward),
            '?' => Action::EnterSearchMode(SearchDirection::Backward),
            _ => Action::None,
        }
    }

    // ── Action application ──────────────────────────────────────────────────

    fn apply_action(
        &mut self,
        action: Action,
        history: &[String],
        complete: &mut dyn FnMut(&str, usize) -> Vec<String>,
    ) -> Step {
        if !matches!(action, Action::MoveCursor(_) | Action::Operator(_)) {
            self.pending_operator = None;
        }
        match action {
            Action::None => Step::Quiet,
            Action::Cancel => {
                self.buffer.clear();
                self.cursor = 0;
                self.mode = Mode::Insert;
                self.paste_mode = false;
                Step::Continue
            }
            Action::ExitShell => Step::ExitShell,
            Action::ExecuteCommand => Step::Submit,
            Action::ClearScreen => Step::ClearScreen,
            Action::ToggleBookmark => Step::ToggleBookmark,
            Action::ToggleVimEnabled => {
                self.vim_enabled = !self.vim_enabled;
                if !self.vim_enabled {
                    self.mode = Mode::Insert;
                }
                Step::Continue
            }
            Action::TapComplete => {
                self.apply_completion(CycleDirection::Forward, true, complete);
                Step::Continue
            }
            Action::CycleComplete(dir) => {
                self.apply_completion(dir, false, complete);
                Step::Continue
            }
            Action::InputChar(c) => {
                self.snapshot_for_undo();
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
                Step::Continue
            }
            Action::Backspace => {
                if self.cursor > 0 {
                    self.snapshot_for_undo();
                    self.cursor -= 1;
                    self.buffer.remove(self.cursor);
                }
                Step::Continue
            }
            Action::Delete(target) => {
                self.snapshot_for_undo();
                match target {
                    DeleteTarget::CharUnderCursor => {
                        if self.cursor < self.buffer.len() {
                            self.buffer.remove(self.cursor);
                        }
                    }
                    DeleteTarget::ToLineEnd => {
                        self.buffer.truncate(self.cursor);
                    }
                }
                Step::Continue
            }
            Action::Operator(op) => {
                match self.pending_operator.take() {
                    Some(pending) if pending == op => {
                        self.snapshot_for_undo();
                        match op {
                            Operator::Delete => {
                                self.buffer.clear();
                                self.cursor = 0;
                            }
                        }
                    }
                    _ => self.pending_operator = Some(op),
                }
                Step::Continue
            }
            Action::MoveCursor(motion) => {
                if let Some(op) = self.pending_operator.take() {
                    self.apply_operator(op, motion, history);
                } else {
                    self.apply_motion(motion, history);
                }
                Step::Continue
            }
            Action::HistoryNav(dir) => {
                self.navigate_history(dir, history);
                Step::Continue
            }
            Action::EnterSearchMode(_dir) => {
                self.mode = Mode::Search;
                Step::Continue
            }
            Action::ExitSearchMode { execute } => {
                self.mode = Mode::Normal;
                if execute {
                    return Step::Submit;
                }
                Step::Continue
            }
            Action::Yank(YankTarget::Line) => {
                self.yank = self.buffer.iter().collect();
                Step::Continue
            }
            Action::Paste(target) => {
                let chars: Vec<char> = self.yank.chars().collect();
                let at = match target {
                    PasteTarget::AfterCursor => (self.cursor + 1).min(self.buffer.len()),
                    PasteTarget::BeforeCursor => self.cursor,
                };
                self.snapshot_for_undo();
                for (i, c) in chars.into_iter().enumerate() {
                    self.buffer.insert(at + i, c);
                }
                Step::Continue
            }
            Action::InsertAt(pos) => {
                match pos {
                    InsertPosition::Cursor => {}
                    InsertPosition::AfterCursor => self.cursor = (self.cursor + 1).min(self.buffer.len()),
                    InsertPosition::LineStart => self.cursor = 0,
                    InsertPosition::LineEnd => self.cursor = self.buffer.len(),
                }
                self.mode = Mode::Insert;
                Step::Continue
            }
            Action::SetMode(mode) => {
                self.mode = mode;
                self.paste_mode = false;
                if mode == Mode::Normal && self.cursor > 0 && self.cursor == self.buffer.len() {
                    self.cursor -= 1;
                }
                Step::Continue
            }
            Action::EnterPasteMode => {
                self.paste_mode = true;
                Step::Quiet
            }
            Action::ExitPasteMode => {
                self.paste_mode = false;
                Step::Continue
            }
            Action::Undo => {
                if let Some((buffer, cursor)) = self.undo_snapshot.take() {
                    self.buffer = buffer;
                    self.cursor = cursor.min(self.buffer.len());
                }
                Step::Continue
            }
            Action::RedrawLine => Step::Continue,
        }
    }

    fn snapshot_for_undo(&mut self) {
        self.undo_snapshot = Some((self.buffer.clone(), self.cursor));
    }

    fn apply_motion(&mut self, motion: Motion, history: &[String]) {
        match motion {
            Motion::Left => self.cursor = self.cursor.saturating_sub(1),
            Motion::Right => self.cursor = (self.cursor + 1).min(self.buffer.len()),
            Motion::LineStart => self.cursor = 0,
            Motion::LineEnd => self.cursor = self.buffer.len(),
            Motion::WordForward(boundary) => self.cursor = word_forward(&self.buffer, self.cursor, boundary),
            Motion::WordBackward(boundary) => self.cursor = word_backward(&self.buffer, self.cursor, boundary),
            Motion::WordEnd(boundary) => self.cursor = word_end(&self.buffer, self.cursor, boundary),
            Motion::LineUp => {
                if self.mode != Mode::Insert && self.move_within_buffer(-1) {
                    return;
                }
                self.navigate_history(HistoryDirection::Up, history);
            }
            Motion::LineDown => {
                if self.mode != Mode::Insert && self.move_within_buffer(1) {
                    return;
                }
                self.navigate_history(HistoryDirection::Down, history);
            }
        }
    }

    /// Resolve `motion`'s target against the current buffer without moving
    /// the cursor, then apply `op` to the span between the cursor and that
    /// target. `LineUp`/`LineDown` have no span to delete in a single-line
    /// buffer, so a pending operator there is dropped and the motion just
    /// navigates.
    fn apply_operator(&mut self, op: Operator, motion: Motion, history: &[String]) {
        let target = match motion {
            Motion::Left => self.cursor.saturating_sub(1),
            Motion::Right => (self.cursor + 1).min(self.buffer.len()),
            Motion::LineStart => 0,
            Motion::LineEnd => self.buffer.len(),
            Motion::WordForward(boundary) => word_forward(&self.buffer, self.cursor, boundary),
            Motion::WordBackward(boundary) => word_backward(&self.buffer, self.cursor, boundary),
            Motion::WordEnd(boundary) => (word_end(&self.buffer, self.cursor, boundary) + 1).min(self.buffer.len()),
            Motion::LineUp | Motion::LineDown => {
                self.apply_motion(motion, history);
                return;
            }
        };
        match op {
            Operator::Delete => {
                self.snapshot_for_undo();
                let (start, end) = if target < self.cursor { (target, self.cursor) } else { (self.cursor, target) };
                self.buffer.drain(start..end);
                self.cursor = start;
            }
        }
    }

    /// Move the cursor to the same column on the physical line above/below,
    /// if the buffer has one. Returns `false` at a buffer boundary, telling
    /// the caller to fall through to history navigation instead.
    fn move_within_buffer(&mut self, delta: i32) -> bool {
        let lines: Vec<&[char]> = split_lines(&self.buffer);
        let (line_idx, col) = position_in_lines(&lines, self.cursor);
        let target = line_idx as i32 + delta;
        if target < 0 || target as usize >= lines.len() {
            return false;
        }
        let target = target as usize;
        let target_col = col.min(lines[target].len());
        let mut offset = 0;
        for line in &lines[..target] {
            offset += line.len() + 1;
        }
        self.cursor = offset + target_col;
        true
    }

    fn navigate_history(&mut self, dir: HistoryDirection, history: &[String]) {
        if history.is_empty() {
            return;
        }
        match dir {
            HistoryDirection::Up => {
                if self.history_index.is_none() {
                    self.prefix_len = self.cursor.min(self.buffer.len());
                    self.saved_buffer = self.buffer.iter().collect();
                }
                let prefix: String = self.buffer.iter().take(self.prefix_len).collect();
                let start = self.history_index.unwrap_or(history.len());
                if let Some(idx) = (0..start).rev().find(|&i| history[i].starts_with(&prefix)) {
                    self.history_index = Some(idx);
                    self.buffer = history[idx].chars().collect();
                    self.cursor = self.buffer.len();
                }
            }
            HistoryDirection::Down => {
                let Some(start) = self.history_index else { return };
                let prefix: String = self.saved_buffer.chars().take(self.prefix_len).collect();
                let found = (start + 1..history.len()).find(|&i| history[i].starts_with(&prefix));
                match found {
                    Some(idx) => {
                        self.history_index = Some(idx);
                        self.buffer = history[idx].chars().collect();
                    }
                    None => {
                        self.history_index = None;
                        self.buffer = self.saved_buffer.chars().collect();
                    }
                }
                self.cursor = self.buffer.len();
            }
        }
    }

    fn apply_completion(
        &mut self,
        dir: CycleDirection,
        first_tab: bool,
        complete: &mut dyn FnMut(&str, usize) -> Vec<String>,
    ) {
        if first_tab || self.menu.is_none() {
            let line: String = self.buffer.iter().collect();
            let start = self.token_start();
            let candidates = complete(&line, self.cursor);
            if candidates.is_empty() {
                return;
            }
            if candidates.len() == 1 {
                self.buffer.truncate(start);
                self.cursor = start;
                self.insert_candidate(&candidates[0]);
                return;
            }
            if let Some(prefix) = common_prefix(&candidates) {
                if !prefix.is_empty() {
                    self.buffer.truncate(start);
                    self.cursor = start;
                    self.insert_candidate(&prefix);
                    return;
                }
            }
            self.menu = Some(CompletionMenu { candidates, selected: None, pattern_start: start });
        }

        let Some(menu) = &mut self.menu else { return };
        let len = menu.candidates.len();
        if len == 0 {
            return;
        }
        menu.selected = Some(match (menu.selected, dir) {
            (None, CycleDirection::Forward) => 0,
            (None, CycleDirection::Backward) => len - 1,
            (Some(i), CycleDirection::Forward) => (i + 1) % len,
            (Some(i), CycleDirection::Backward) => (i + len - 1) % len,
        });
        let candidate = menu.candidates[menu.selected.unwrap()].clone();
        let start = menu.pattern_start;
        self.buffer.truncate(start);
        self.cursor = start;
        self.insert_candidate(&candidate);
    }

    /// Start of the whitespace-delimited token under the cursor, mirroring
    /// `completion.rs`'s token splitting so the inserted candidate replaces
    /// exactly the partial word rather than appending after it.
    fn token_start(&self) -> usize {
        let mut start = self.cursor.min(self.buffer.len());
        while start > 0 && !self.buffer[start - 1].is_whitespace() {
            start -= 1;
        }
        start
    }

    fn insert_candidate(&mut self, text: &str) {
        for c in text.chars() {
            self.buffer.insert(self.cursor, c);
            self.cursor += 1;
        }
    }

    // ── Redraw ───────────────────────────────────────────────────────────────

    fn redraw(&mut self, prompt: &str, out: &mut AnsiWriter) -> io::Result<()> {
        let (width, _) = crate::terminal::query_size();
        let width = width.max(1);

        let rendered: String = self.buffer.iter().collect::<String>().replace('\n', "\n│ ");
        let new_lines = count_display_lines(&rendered, prompt.chars().count(), width);

        out.move_up(self.displayed_lines.saturating_sub(1))?;
        out.move_to_column(0)?;
        for i in 0..self.displayed_lines.max(new_lines) {
            if i > 0 {
                out.move_down(1)?;
            }
            out.clear_line()?;
        }
        out.move_up(self.displayed_lines.max(new_lines).saturating_sub(1))?;
        out.move_to_column(0)?;

        out.write_str(prompt)?;
        out.write_str(&rendered)?;

        let (cur_row, cur_col) = cursor_position(&self.buffer, self.cursor, prompt.chars().count(), width);
        let content_rows = new_lines.saturating_sub(1);
        out.move_up(content_rows.saturating_sub(cur_row))?;
        out.move_to_column(cur_col)?;

        out.cursor_style(if self.mode == Mode::Normal { CursorStyle::Block } else { CursorStyle::Bar })?;
        out.flush()?;
        self.displayed_lines = new_lines;
        Ok(())
    }
}

// ── Word motions ─────────────────────────────────────────────────────────────

fn is_word_char(c: char, boundary: WordBoundary) -> bool {
    match boundary {
        WordBoundary::Word => c.is_alphanumeric() || c == '_',
        WordBoundary::Big => !c.is_whitespace(),
    }
}

fn word_forward(buffer: &[char], cursor: usize, boundary: WordBoundary) -> usize {
    let len = buffer.len();
    let mut pos = cursor;
    if pos < len && is_word_char(buffer[pos], boundary) {
        while pos < len && is_word_char(buffer[pos], boundary) {
            pos += 1;
        }
    }
    while pos < len && buffer[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

fn word_backward(buffer: &[char], cursor: usize, boundary: WordBoundary) -> usize {
    let mut pos = cursor;
    while pos > 0 && buffer[pos - 1].is_whitespace() {
        pos -= 1;
    }
    while pos > 0 && is_word_char(buffer[pos - 1], boundary) {
        pos -= 1;
    }
    pos
}

fn word_end(buffer: &[char], cursor: usize, boundary: WordBoundary) -> usize {
    let len = buffer.len();
    let mut pos = (cursor + 1).min(len);
    while pos < len && buffer[pos].is_whitespace() {
        pos += 1;
    }
    while pos < len && is_word_char(buffer[pos], boundary) {
        pos += 1;
    }
    pos.saturating_sub(1).max(cursor)
}

// ── Multi-line layout helpers ────────────────────────────────────────────────

fn split_lines(buffer: &[char]) -> Vec<&[char]> {
    buffer.split(|&c| c == '\n').collect()
}

fn position_in_lines(lines: &[&[char]], cursor: usize) -> (usize, usize) {
    let mut remaining = cursor;
    for (idx, line) in lines.iter().enumerate() {
        if remaining <= line.len() {
            return (idx, remaining);
        }
        remaining -= line.len() + 1;
    }
    (lines.len().saturating_sub(1), 0)
}

/// Count how many terminal rows `rendered` (prompt-prefixed content, with
/// `\n` already substituted for the `│ ` continuation marker) occupies,
/// accounting for soft-wrap at `width`.
fn count_display_lines(rendered: &str, prompt_len: usize, width: u16) -> u16 {
    let width = width as usize;
    let mut rows: u16 = 1;
    let mut col = prompt_len;
    for c in rendered.chars() {
        if c == '\n' {
            rows += 1;
            col = 0;
            continue;
        }
        col += 1;
        if col >= width {
            rows += 1;
            col = 0;
        }
    }
    rows
}

fn cursor_position(buffer: &[char], cursor: usize, prompt_len: usize, width: u16) -> (u16, u16) {
    let width = width as usize;
    let mut row: u16 = 0;
    let mut col = prompt_len;
    for &c in buffer.iter().take(cursor) {
        if c == '\n' {
            row += 1;
            col = 0;
            continue;
        }
        col += 1;
        if col >= width {
            row += 1;
            col = 0;
        }
    }
    (row, col as u16)
}

fn common_prefix(candidates: &[String]) -> Option<String> {
    let first = candidates.first()?;
    let mut prefix_len = first.chars().count();
    for candidate in &candidates[1..] {
        let shared = first.chars().zip(candidate.chars()).take_while(|(a, b)| a == b).count();
        prefix_len = prefix_len.min(shared);
    }
    Some(first.chars().take(prefix_len).collect())
}

/// Render a bounded column grid for the completion menu, single-column below
/// 80 terminal columns.
pub fn render_menu(candidates: &[String], width: u16) -> Vec<String> {
    let shown: Vec<&String> = candidates.iter().take(MAX_MENU_ROWS * 4).collect();
    if width < 80 || shown.is_empty() {
        return shown.into_iter().take(MAX_MENU_ROWS).cloned().collect();
    }
    let col_width = shown.iter().map(|c| c.len()).max().unwrap_or(0) + 2;
    let cols = (width as usize / col_width).max(1);
    let rows = shown.len().div_ceil(cols).min(MAX_MENU_ROWS);
    let mut lines = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut line = String::new();
        for col in 0..cols {
            if let Some(candidate) = shown.get(row * cols + col) {
                line.push_str(&format!("{candidate:<width$}", width = col_width));
            }
        }
        lines.push(line);
    }
    lines
}

// ── Internal control flow ────────────────────────────────────────────────────

enum Step {
    Continue,
    Quiet,
    Submit,
    Eof,
    ExitShell,
    ToggleBookmark,
    ClearScreen,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn editor() -> LineEditor {
        LineEditor::new()
    }

    #[test]
    fn insert_mode_types_characters() {
        let mut e = editor();
        let mut complete = |_: &str, _: usize| Vec::new();
        let history: Vec<String> = Vec::new();
        for c in "hi".chars() {
            e.apply_action(Action::InputChar(c), &history, &mut complete);
        }
        assert_eq!(e.buffer.iter().collect::<String>(), "hi");
        assert_eq!(e.cursor, 2);
    }

    #[test]
    fn escape_enters_normal_mode_and_moves_cursor_back() {
        let mut e = editor();
        let mut complete = |_: &str, _: usize| Vec::new();
        let history: Vec<String> = Vec::new();
        e.buffer = "hi".chars().collect();
        e.cursor = 2;
        e.apply_action(Action::SetMode(Mode::Normal), &history, &mut complete);
        assert_eq!(e.mode, Mode::Normal);
        assert_eq!(e.cursor, 1);
    }

    #[test]
    fn normal_mode_hl_moves_cursor() {
        let mut e = editor();
        e.mode = Mode::Normal;
        e.buffer = "abc".chars().collect();
        e.cursor = 0;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::MoveCursor(Motion::Right), &history, &mut complete);
        assert_eq!(e.cursor, 1);
        e.apply_action(Action::MoveCursor(Motion::Left), &history, &mut complete);
        assert_eq!(e.cursor, 0);
    }

    #[test]
    fn word_forward_skips_word_then_whitespace() {
        let buffer: Vec<char> = "echo  hello world".chars().collect();
        assert_eq!(word_forward(&buffer, 0, WordBoundary::Word), 6);
    }

    #[test]
    fn word_backward_from_end() {
        let buffer: Vec<char> = "echo hello".chars().collect();
        assert_eq!(word_backward(&buffer, buffer.len(), WordBoundary::Word), 5);
    }

    #[test]
    fn history_prefix_filter_only_matches_prefix() {
        let mut e = editor();
        let history = vec!["git commit".to_string(), "echo hi".to_string(), "git status".to_string()];
        e.buffer = "git".chars().collect();
        e.cursor = 3;
        e.navigate_history(HistoryDirection::Up, &history);
        assert_eq!(e.buffer.iter().collect::<String>(), "git status");
        e.navigate_history(HistoryDirection::Up, &history);
        assert_eq!(e.buffer.iter().collect::<String>(), "git commit");
        e.navigate_history(HistoryDirection::Down, &history);
        assert_eq!(e.buffer.iter().collect::<String>(), "git status");
        e.navigate_history(HistoryDirection::Down, &history);
        assert_eq!(e.buffer.iter().collect::<String>(), "git");
    }

    #[test]
    fn delete_to_line_end() {
        let mut e = editor();
        e.buffer = "echo hi".chars().collect();
        e.cursor = 4;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::Delete(DeleteTarget::ToLineEnd), &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "echo");
    }

    #[test]
    fn normal_mode_dw_deletes_from_cursor_to_next_word() {
        let mut e = editor();
        e.mode = Mode::Normal;
        e.buffer = "echo hello world".chars().collect();
        e.cursor = 0;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::MoveCursor(Motion::WordForward(WordBoundary::Word)), &history, &mut complete);
        e.apply_action(Action::MoveCursor(Motion::WordForward(WordBoundary::Word)), &history, &mut complete);
        e.apply_action(Action::Operator(Operator::Delete), &history, &mut complete);
        e.apply_action(Action::MoveCursor(Motion::WordForward(WordBoundary::Word)), &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "echo hello ");
        assert_eq!(e.cursor, 11);
    }

    #[test]
    fn normal_mode_dd_clears_the_whole_buffer() {
        let mut e = editor();
        e.mode = Mode::Normal;
        e.buffer = "echo hi".chars().collect();
        e.cursor = 2;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::Operator(Operator::Delete), &history, &mut complete);
        e.apply_action(Action::Operator(Operator::Delete), &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "");
        assert_eq!(e.cursor, 0);
    }

    #[test]
    fn pending_delete_operator_is_cancelled_by_an_unrelated_action() {
        let mut e = editor();
        e.mode = Mode::Normal;
        e.buffer = "echo hi".chars().collect();
        e.cursor = 0;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::Operator(Operator::Delete), &history, &mut complete);
        e.apply_action(Action::Undo, &history, &mut complete);
        assert!(e.pending_operator.is_none());
        e.apply_action(Action::MoveCursor(Motion::Right), &history, &mut complete);
        assert_eq!(e.cursor, 1);
        assert_eq!(e.buffer.iter().collect::<String>(), "echo hi");
    }

    #[test]
    fn yank_then_paste_after_cursor() {
        let mut e = editor();
        e.buffer = "ab".chars().collect();
        e.cursor = 0;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::Yank(YankTarget::Line), &history, &mut complete);
        e.apply_action(Action::Paste(PasteTarget::AfterCursor), &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "aabb");
    }

    #[test]
    fn undo_restores_previous_buffer() {
        let mut e = editor();
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::InputChar('a'), &history, &mut complete);
        e.apply_action(Action::InputChar('b'), &history, &mut complete);
        e.apply_action(Action::Undo, &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "a");
    }

    #[test]
    fn common_prefix_of_candidates() {
        let candidates = vec!["foobar".to_string(), "foobaz".to_string(), "foocat".to_string()];
        assert_eq!(common_prefix(&candidates), Some("foo".to_string()));
    }

    #[test]
    fn tap_complete_replaces_the_partial_token_not_just_appends() {
        let mut e = editor();
        e.buffer = "cd ~/pr".chars().collect();
        e.cursor = e.buffer.len();
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| vec!["~/proj/".to_string()];
        e.apply_action(Action::TapComplete, &history, &mut complete);
        assert_eq!(e.buffer.iter().collect::<String>(), "cd ~/proj/");
    }

    #[test]
    fn paste_mode_buffers_printable_bytes_regardless_of_vi_mode() {
        let mut e = editor();
        e.mode = Mode::Normal;
        e.paste_mode = true;
        let action = e.decode_key(key(KeyCode::Char('x'), KeyModifiers::NONE));
        assert_eq!(action, Action::InputChar('x'));
    }

    #[test]
    fn exiting_normal_mode_clears_stuck_paste_flag() {
        let mut e = editor();
        e.paste_mode = true;
        let history: Vec<String> = Vec::new();
        let mut complete = |_: &str, _: usize| Vec::new();
        e.apply_action(Action::SetMode(Mode::Insert), &history, &mut complete);
        assert!(!e.paste_mode);
    }

    #[test]
    fn count_display_lines_accounts_for_soft_wrap() {
        assert_eq!(count_display_lines("abcdefghij", 0, 5), 2);
        assert_eq!(count_display_lines("abc\ndef", 0, 80), 2);
    }
}
