//! Raw-mode entry/exit, buffered ANSI emission, window-size query, and the
//! SIGWINCH resize flag.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::terminal::{self, ClearType};
use crossterm::tty::IsTty;
use crossterm::{cursor, execute, queue};

/// Cursor shape emitted via DECSCUSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `ESC[2 q` — normal (vi command) mode.
    Block,
    /// `ESC[6 q` — insert mode.
    Bar,
    /// `ESC[0 q` — terminal default, restored on shutdown.
    Default,
}

impl CursorStyle {
    fn sequence(self) -> &'static str {
        match self {
            CursorStyle::Block => "\x1b[2 q",
            CursorStyle::Bar => "\x1b[6 q",
            CursorStyle::Default => "\x1b[0 q",
        }
    }
}

/// RAII guard: enables raw mode and the bracketed-paste protocol on
/// construction, restores both on drop (even on panic) so the terminal is
/// never left in a broken state. Idempotent with respect to the saved
/// attributes crossterm itself tracks; a no-op when stdin isn't a tty.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        if !io::stdin().is_tty() {
            return Ok(RawModeGuard { active: false });
        }
        terminal::enable_raw_mode()?;
        let mut out = io::stdout();
        write!(out, "\x1b[?2004h")?;
        out.flush()?;
        Ok(RawModeGuard { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let mut out = io::stdout();
        let _ = write!(out, "\x1b[?2004l");
        let _ = out.flush();
        let _ = terminal::disable_raw_mode();
    }
}

/// Query the terminal's current size, falling back to 80x24 on any failure
/// (not a tty, ioctl error, …).
pub fn query_size() -> (u16, u16) {
    terminal::size().unwrap_or((80, 24))
}

/// Process-wide flag flipped by the SIGWINCH handler; checked at the top of
/// the main loop and by the editor's redraw path. The handler needs to
/// name the running shell without taking arguments, so a minimal
/// interior-mutable flag with process lifetime is the only thing leaked to
/// the signal context.
pub static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);

/// Install the SIGWINCH → `RESIZE_PENDING` notifier. Unix-only; there is no
/// window-resize signal on other platforms, so `RESIZE_PENDING` simply never
/// flips there.
#[cfg(unix)]
pub fn install_resize_notifier() {
    extern "C" fn handle_sigwinch(_: libc::c_int) {
        RESIZE_PENDING.store(true, Ordering::Relaxed);
    }
    unsafe {
        libc::signal(libc::SIGWINCH, handle_sigwinch as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
pub fn install_resize_notifier() {}

/// A user-space ANSI writer. Every emission is queued; nothing reaches the
/// tty until `flush` is called once at the end of an action handler — the
/// teacher's `editor.rs::redraw` already does this for its one `execute!`
/// call per redraw, generalized here to every ANSI sequence in the crate.
pub struct AnsiWriter {
    out: io::Stdout,
}

impl Default for AnsiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiWriter {
    pub fn new() -> Self {
        AnsiWriter { out: io::stdout() }
    }

    pub fn move_to_column(&mut self, col: u16) -> io::Result<()> {
        queue!(self.out, cursor::MoveToColumn(col))
    }

    pub fn move_up(&mut self, n: u16) -> io::Result<()> {
        if n > 0 {
            queue!(self.out, cursor::MoveUp(n))?;
        }
        Ok(())
    }

    pub fn move_down(&mut self, n: u16) -> io::Result<()> {
        if n > 0 {
            queue!(self.out, cursor::MoveDown(n))?;
        }
        Ok(())
    }

    pub fn clear_line(&mut self) -> io::Result<()> {
        queue!(self.out, terminal::Clear(ClearType::CurrentLine))
    }

    pub fn clear_to_end_of_screen(&mut self) -> io::Result<()> {
        queue!(self.out, terminal::Clear(ClearType::FromCursorDown))
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        execute!(self.out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))
    }

    pub fn cursor_style(&mut self, style: CursorStyle) -> io::Result<()> {
        write!(self.out, "{}", style.sequence())
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        write!(self.out, "{s}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_size_never_panics() {
        let (cols, rows) = query_size();
        assert!(cols > 0 || rows > 0 || true); // smoke: just exercising the call
    }

    #[test]
    fn cursor_style_sequences() {
        assert_eq!(CursorStyle::Block.sequence(), "\x1b[2 q");
        assert_eq!(CursorStyle::Bar.sequence(), "\x1b[6 q");
        assert_eq!(CursorStyle::Default.sequence(), "\x1b[0 q");
    }

    #[test]
    fn resize_flag_round_trips() {
        RESIZE_PENDING.store(false, Ordering::Relaxed);
        assert!(!RESIZE_PENDING.load(Ordering::Relaxed));
        RESIZE_PENDING.store(true, Ordering::Relaxed);
        assert!(RESIZE_PENDING.load(Ordering::Relaxed));
        RESIZE_PENDING.store(false, Ordering::Relaxed);
    }
}
