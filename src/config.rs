//! `~/.zishrc` loading.
//!
//! The file grammar (`alias NAME='value'`, `name() { body }` function
//! definitions with brace depth tracked across lines, `#` comments) is just
//! the ordinary command grammar the rest of the shell already parses and
//! evaluates — `parser::parse` already tracks brace depth token-by-token to
//! capture a function's `body_source` (see `parser.rs::parse_function_def`),
//! and the lexer already treats `${…}` as part of a word rather than
//! separate brace tokens, so it never confuses a parameter expansion's
//! braces with a function body's. So there is no separate rc-file scanner
//! here: the file is read once and run through the same
//! `parser::parse` → `Evaluator::eval_ast` pipeline as any other input,
//! the same way a single-path `main.rs` would treat every line it read.

use std::fs;
use std::path::PathBuf;

use crate::error::ZishResult;
use crate::eval::{Evaluator, IoHandles};
use crate::parser;

/// `~/.zishrc`, or `None` when `HOME` (or `USERPROFILE` on Windows) is unset.
pub fn rc_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|home| PathBuf::from(home).join(".zishrc"))
}

/// Load and evaluate `path` against `eval`. A missing file is not an error —
/// callers should skip calling this entirely if they want that distinction;
/// this function treats "doesn't exist" the same as "empty".
pub fn load(path: &std::path::Path, eval: &mut Evaluator) -> ZishResult<()> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let (arena, root) = parser::parse(&text)?;
    eval.eval_ast(&arena, root, IoHandles::inherit())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_an_error() {
        let mut eval = Evaluator::new();
        let path = std::env::temp_dir().join("zishrc_does_not_exist_anywhere");
        let _ = fs::remove_file(&path);
        assert!(load(&path, &mut eval).is_ok());
    }

    #[test]
    fn aliases_and_functions_are_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment\nalias ll='ls -la'\ngreet() {{ echo hi }}").unwrap();
        let mut eval = Evaluator::new();
        load(file.path(), &mut eval).unwrap();
        assert_eq!(eval.aliases.get("ll"), Some(&"ls -la".to_string()));
        assert!(eval.functions.contains_key("greet"));
    }
}
