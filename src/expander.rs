//! Word expansion: turns the raw text a [`crate::lexer::Lexer`] and
//! [`crate::parser::Parser`] preserved on `Word`/`String` nodes into the
//! final argv strings a command actually runs with.
//!
//! Generalizes a flat `expand_tilde`/`expand_variables`/`expand_globs` chain
//! (environment-only lookup, no arithmetic, no command substitution, no
//! `${...}` forms) into the full set this shell needs, while keeping that
//! "small free functions chained by the caller" shape and the `glob` crate
//! for pathname expansion.

use std::collections::HashMap;

use crate::ast::{Arena, AstNode, NodeId};
use crate::error::{ZishError, ZishResult};

/// Everything expansion needs to know about the surrounding shell state.
/// `capture` runs a command and returns its captured stdout (already
/// length-bounded by the caller) for `$(...)`/backtick substitution — it is
/// a callback rather than a direct dependency so this module never needs to
/// know how commands are actually run.
pub struct ExpansionContext<'a> {
    pub vars: &'a HashMap<String, String>,
    pub last_exit_code: i32,
    pub capture: &'a mut dyn FnMut(&str) -> ZishResult<String>,
}

impl<'a> ExpansionContext<'a> {
    /// Shell variables win over environment variables.
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned().or_else(|| std::env::var(name).ok())
    }

    fn run_capture(&mut self, command: &str) -> ZishResult<String> {
        let mut output = (self.capture)(command)?;
        while output.ends_with('\n') {
            output.pop();
        }
        Ok(output)
    }
}

/// Expand every word node in `word_ids` into zero or more final strings
/// (a single unquoted word containing glob metacharacters can expand to
/// several matches).
pub fn expand_words(
    arena: &Arena,
    word_ids: &[NodeId],
    ctx: &mut ExpansionContext,
) -> ZishResult<Vec<String>> {
    let mut out = Vec::new();
    for &id in word_ids {
        match arena.get(id) {
            AstNode::String { value, quoted: true } => out.push(value.clone()),
            AstNode::String { value, quoted: false } => out.push(expand_dollar_constructs(value, ctx)?),
            AstNode::Word { value } => out.extend(expand_word(value, ctx)?),
            other => return Err(ZishError::Other(format!("not a word node: {other:?}"))),
        }
    }
    Ok(out)
}

/// Expand a single word node to exactly one string. Used where the grammar
/// only ever wants one value (redirect targets, assignment right-hand
/// sides, `for` loop words, test operands) — a glob that matches more than
/// one path just contributes its first match, the same ambiguous-redirect
/// simplification a flat command model already made.
pub fn expand_one(arena: &Arena, id: NodeId, ctx: &mut ExpansionContext) -> ZishResult<String> {
    let mut values = expand_words(arena, &[id], ctx)?;
    Ok(if values.is_empty() { String::new() } else { values.remove(0) })
}

/// A raw word's text re-scanned into the quote runs the lexer folded back
/// into one string (see the `Word` token's documented contract).
enum Segment {
    Unquoted(String),
    SingleQuoted(String),
    DoubleQuoted(String),
}

fn split_segments(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut cur = String::new();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                if !cur.is_empty() {
                    segments.push(Segment::Unquoted(std::mem::take(&mut cur)));
                }
                let mut s = String::new();
                for d in chars.by_ref() {
                    if d == '\'' {
                        break;
                    }
                    s.push(d);
                }
                segments.push(Segment::SingleQuoted(s));
            }
            '"' => {
                if !cur.is_empty() {
                    segments.push(Segment::Unquoted(std::mem::take(&mut cur)));
                }
                let mut s = String::new();
                while let Some(d) = chars.next() {
                    if d == '"' {
                        break;
                    }
                    if d == '\\' {
                        match chars.peek().copied() {
                            Some(next @ ('"' | '\\' | '$' | '`')) => {
                                s.push(next);
                                chars.next();
                            }
                            Some('n') => {
                                s.push('\n');
                                chars.next();
                            }
                            Some('t') => {
                                s.push('\t');
                                chars.next();
                            }
                            _ => s.push('\\'),
                        }
                    } else {
                        s.push(d);
                    }
                }
                segments.push(Segment::DoubleQuoted(s));
            }
            other => cur.push(other),
        }
    }

    if !cur.is_empty() || segments.is_empty() {
        segments.push(Segment::Unquoted(cur));
    }
    segments
}

/// Expand one raw `Word` token's text: tilde (leading segment only),
/// `$`/backtick constructs in unquoted and double-quoted segments, and
/// finally glob expansion if no part of the word was quoted.
fn expand_word(raw: &str, ctx: &mut ExpansionContext) -> ZishResult<Vec<String>> {
    let mut segments = split_segments(raw);
    let single_unquoted = segments.len() == 1 && matches!(segments[0], Segment::Unquoted(_));

    if let Some(Segment::Unquoted(s)) = segments.first_mut() {
        *s = expand_tilde_prefix(s);
    }

    let mut result = String::new();
    let mut glob_eligible = false;
    for seg in &segments {
        match seg {
            Segment::SingleQuoted(s) => result.push_str(s),
            Segment::DoubleQuoted(s) => result.push_str(&expand_dollar_constructs(s, ctx)?),
            Segment::Unquoted(s) => {
                let expanded = expand_dollar_constructs(s, ctx)?;
                if contains_glob_chars(&expanded) {
                    glob_eligible = true;
                }
                result.push_str(&expanded);
            }
        }
    }

    if single_unquoted && glob_eligible {
        Ok(expand_glob(&result))
    } else {
        Ok(vec![result])
    }
}

fn home_dir() -> Option<String> {
    std::env::var("HOME").ok().or_else(|| std::env::var("USERPROFILE").ok())
}

fn expand_tilde_prefix(s: &str) -> String {
    if s == "~" {
        home_dir().unwrap_or_else(|| s.to_string())
    } else if let Some(rest) = s.strip_prefix("~/") {
        match home_dir() {
            Some(home) => format!("{home}/{rest}"),
            None => s.to_string(),
        }
    } else {
        s.to_string()
    }
}

fn contains_glob_chars(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '*' | '?' | '['))
}

fn expand_glob(pattern: &str) -> Vec<String> {
    match glob::glob(pattern) {
        Ok(paths) => {
            let mut matches: Vec<String> =
                paths.filter_map(|p| p.ok()).map(|p| p.to_string_lossy().into_owned()).collect();
            if matches.is_empty() {
                vec![pattern.to_string()]
            } else {
                matches.sort();
                matches
            }
        }
        Err(_) => vec![pattern.to_string()],
    }
}

/// Scan `s` for `$`/backtick constructs and substitute their expansions.
/// Runs on both unquoted and double-quoted segment text (the two contexts
/// in which variable/command/arithmetic expansion applies).
fn expand_dollar_constructs(s: &str, ctx: &mut ExpansionContext) -> ZishResult<String> {
    let mut out = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '`' {
            let mut cmd = String::new();
            let mut closed = false;
            while let Some(d) = chars.next() {
                if d == '`' {
                    closed = true;
                    break;
                }
                if d == '\\' {
                    if let Some(next) = chars.next() {
                        cmd.push(next);
                    }
                } else {
                    cmd.push(d);
                }
            }
            if !closed {
                return Err(ZishError::UnterminatedCommandSubstitution);
            }
            out.push_str(&ctx.run_capture(&cmd)?);
            continue;
        }

        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('(') => {
                chars.next();
                if chars.peek() == Some(&'(') {
                    chars.next();
                    let expr = take_balanced_arith(&mut chars)?;
                    out.push_str(&eval_arithmetic(&expr, ctx)?.to_string());
                } else {
                    let cmd = take_balanced_parens(&mut chars)?;
                    out.push_str(&ctx.run_capture(&cmd)?);
                }
            }
            Some('{') => {
                chars.next();
                let body = take_balanced_braces(&mut chars)?;
                out.push_str(&expand_parameter(&body, ctx)?);
            }
            Some('?') => {
                chars.next();
                out.push_str(&ctx.last_exit_code.to_string());
            }
            Some('$') => {
                chars.next();
                out.push_str(&std::process::id().to_string());
            }
            Some('0') => {
                chars.next();
                out.push_str("zish");
            }
            Some(d) if d.is_alphabetic() || d == '_' => {
                let mut name = String::new();
                while let Some(d2) = chars.peek().copied() {
                    if d2.is_alphanumeric() || d2 == '_' {
                        name.push(d2);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&ctx.lookup(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

fn take_balanced_parens(chars: &mut std::iter::Peekable<std::str::Chars>) -> ZishResult<String> {
    let mut depth = 0usize;
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('(') => {
                depth += 1;
                out.push('(');
            }
            Some(')') if depth == 0 => return Ok(out),
            Some(')') => {
                depth -= 1;
                out.push(')');
            }
            Some(c) => out.push(c),
            None => return Err(ZishError::UnterminatedCommandSubstitution),
        }
    }
}

fn take_balanced_arith(chars: &mut std::iter::Peekable<std::str::Chars>) -> ZishResult<String> {
    let mut depth = 0i32;
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('(') => {
                depth += 1;
                out.push('(');
            }
            Some(')') if depth == 0 => {
                if chars.peek() == Some(&')') {
                    chars.next();
                    return Ok(out);
                }
                out.push(')');
            }
            Some(')') => {
                depth -= 1;
                out.push(')');
            }
            Some(c) => out.push(c),
            None => return Err(ZishError::UnterminatedCommandSubstitution),
        }
    }
}

fn take_balanced_braces(chars: &mut std::iter::Peekable<std::str::Chars>) -> ZishResult<String> {
    let mut depth = 0usize;
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('{') => {
                depth += 1;
                out.push('{');
            }
            Some('}') if depth == 0 => return Ok(out),
            Some('}') => {
                depth -= 1;
                out.push('}');
            }
            Some(c) => out.push(c),
            None => return Err(ZishError::UnterminatedParameterExpansion),
        }
    }
}

/// The six `${NAME...}` forms, distinguished by the separator immediately
/// following the name: `:-`/`-`, `:+`/`+`, `:?`/`?`.
/// The `:`-prefixed form treats an empty value the same as unset; the bare
/// form only triggers on unset.
fn expand_parameter(body: &str, ctx: &mut ExpansionContext) -> ZishResult<String> {
    let name_end = body.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(body.len());
    let name = &body[..name_end];
    let rest = &body[name_end..];
    let current = ctx.lookup(name);

    if rest.is_empty() {
        return Ok(current.unwrap_or_default());
    }

    let unset_or_empty = current.as_deref().map(str::is_empty).unwrap_or(true);
    let unset = current.is_none();

    if let Some(word) = rest.strip_prefix(":-") {
        return if unset_or_empty { expand_dollar_constructs(word, ctx) } else { Ok(current.unwrap()) };
    }
    if let Some(word) = rest.strip_prefix('-') {
        return if unset { expand_dollar_constructs(word, ctx) } else { Ok(current.unwrap_or_default()) };
    }
    if let Some(word) = rest.strip_prefix(":+") {
        return if unset_or_empty { Ok(String::new()) } else { expand_dollar_constructs(word, ctx) };
    }
    if let Some(word) = rest.strip_prefix('+') {
        return if unset { Ok(String::new()) } else { expand_dollar_constructs(word, ctx) };
    }
    if let Some(word) = rest.strip_prefix(":?") {
        return if unset_or_empty {
            let message = expand_dollar_constructs(word, ctx)?;
            Err(ZishError::ParameterNotSet {
                message: if message.is_empty() { format!("{name}: parameter null or not set") } else { message },
            })
        } else {
            Ok(current.unwrap())
        };
    }
    if let Some(word) = rest.strip_prefix('?') {
        return if unset {
            let message = expand_dollar_constructs(word, ctx)?;
            Err(ZishError::ParameterNotSet {
                message: if message.is_empty() { format!("{name}: parameter not set") } else { message },
            })
        } else {
            Ok(current.unwrap_or_default())
        };
    }

    Ok(current.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
enum ArithTok {
    Num(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize_arith(s: &str) -> Vec<ArithTok> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' => {
                let mut n = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        n.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(ArithTok::Num(n.parse().unwrap_or(0)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut id = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        id.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(ArithTok::Ident(id));
            }
            '+' => {
                out.push(ArithTok::Plus);
                chars.next();
            }
            '-' => {
                out.push(ArithTok::Minus);
                chars.next();
            }
            '*' => {
                out.push(ArithTok::Star);
                chars.next();
            }
            '/' => {
                out.push(ArithTok::Slash);
                chars.next();
            }
            '%' => {
                out.push(ArithTok::Percent);
                chars.next();
            }
            '(' => {
                out.push(ArithTok::LParen);
                chars.next();
            }
            ')' => {
                out.push(ArithTok::RParen);
                chars.next();
            }
            _ => {
                chars.next();
            }
        }
    }
    out
}

/// `$((expr))` arithmetic: precedence climbing so `*`/`/`/`%` bind tighter
/// than `+`/`-` and same-precedence operators associate left-to-right.
/// Division and modulo by zero yield 0 rather than erroring.
fn eval_arithmetic(expr: &str, ctx: &ExpansionContext) -> ZishResult<i64> {
    let tokens = tokenize_arith(expr);
    let mut pos = 0;
    Ok(parse_arith_expr(&tokens, &mut pos, 0, ctx))
}

fn parse_arith_expr(tokens: &[ArithTok], pos: &mut usize, min_bp: u8, ctx: &ExpansionContext) -> i64 {
    let mut lhs = parse_arith_atom(tokens, pos, ctx);
    loop {
        let bp = match tokens.get(*pos) {
            Some(ArithTok::Plus) | Some(ArithTok::Minus) => 1,
            Some(ArithTok::Star) | Some(ArithTok::Slash) | Some(ArithTok::Percent) => 2,
            _ => break,
        };
        if bp < min_bp {
            break;
        }
        let op = tokens[*pos].clone();
        *pos += 1;
        let rhs = parse_arith_expr(tokens, pos, bp + 1, ctx);
        lhs = match op {
            ArithTok::Plus => lhs.wrapping_add(rhs),
            ArithTok::Minus => lhs.wrapping_sub(rhs),
            ArithTok::Star => lhs.wrapping_mul(rhs),
            ArithTok::Slash => if rhs == 0 { 0 } else { lhs.wrapping_div(rhs) },
            ArithTok::Percent => if rhs == 0 { 0 } else { lhs.wrapping_rem(rhs) },
            _ => unreachable!(),
        };
    }
    lhs
}

fn parse_arith_atom(tokens: &[ArithTok], pos: &mut usize, ctx: &ExpansionContext) -> i64 {
    match tokens.get(*pos) {
        Some(ArithTok::Num(n)) => {
            *pos += 1;
            *n
        }
        Some(ArithTok::Ident(name)) => {
            *pos += 1;
            ctx.lookup(name).and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0)
        }
        Some(ArithTok::Minus) => {
            *pos += 1;
            -parse_arith_atom(tokens, pos, ctx)
        }
        Some(ArithTok::Plus) => {
            *pos += 1;
            parse_arith_atom(tokens, pos, ctx)
        }
        Some(ArithTok::LParen) => {
            *pos += 1;
            let v = parse_arith_expr(tokens, pos, 0, ctx);
            if tokens.get(*pos) == Some(&ArithTok::RParen) {
                *pos += 1;
            }
            v
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        vars: &'a HashMap<String, String>,
        capture: &'a mut dyn FnMut(&str) -> ZishResult<String>,
    ) -> ExpansionContext<'a> {
        ExpansionContext { vars, last_exit_code: 0, capture }
    }

    fn no_capture(_: &str) -> ZishResult<String> {
        Err(ZishError::Other("command substitution not expected in this test".into()))
    }

    #[test]
    fn tilde_alone_expands_to_home() {
        std::env::set_var("HOME", "/home/zish");
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("~", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["/home/zish".to_string()]);
    }

    #[test]
    fn tilde_in_middle_not_expanded() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("a~b", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["a~b".to_string()]);
    }

    #[test]
    fn bare_variable_shell_wins_over_environment() {
        std::env::set_var("ZISH_TEST_VAR", "from-env");
        let mut vars = HashMap::new();
        vars.insert("ZISH_TEST_VAR".to_string(), "from-shell".to_string());
        let mut cap = no_capture;
        let result = expand_word("$ZISH_TEST_VAR", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["from-shell".to_string()]);
    }

    #[test]
    fn missing_variable_expands_to_empty() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("$NO_SUCH_ZISH_VAR", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec![String::new()]);
    }

    #[test]
    fn exit_code_variable() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let mut context = ctx(&vars, &mut cap);
        context.last_exit_code = 17;
        let result = expand_word("$?", &mut context).unwrap();
        assert_eq!(result, vec!["17".to_string()]);
    }

    #[test]
    fn single_quoted_segment_is_not_expanded() {
        let mut vars = HashMap::new();
        vars.insert("X".to_string(), "expanded".to_string());
        let mut cap = no_capture;
        let result = expand_word("'$X'", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["$X".to_string()]);
    }

    #[test]
    fn double_quoted_segment_expands_but_does_not_glob() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("\"*\"", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["*".to_string()]);
    }

    #[test]
    fn no_glob_matches_keeps_literal_pattern() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("no_such_file_zish_test_*.xyz", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["no_such_file_zish_test_*.xyz".to_string()]);
    }

    #[test]
    fn parameter_default_if_unset_or_empty() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("${UNSET_ZISH_VAR:-fallback}", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["fallback".to_string()]);
    }

    #[test]
    fn parameter_default_unset_only_keeps_empty_value() {
        let mut vars = HashMap::new();
        vars.insert("E".to_string(), String::new());
        let mut cap = no_capture;
        let result = expand_word("${E-fallback}", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec![String::new()]);
    }

    #[test]
    fn parameter_alternate_if_set_and_non_empty() {
        let mut vars = HashMap::new();
        vars.insert("SET".to_string(), "anything".to_string());
        let mut cap = no_capture;
        let result = expand_word("${SET:+alt}", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["alt".to_string()]);
    }

    #[test]
    fn parameter_error_if_unset_or_empty() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let err = expand_word("${NEEDED:?must be set}", &mut ctx(&vars, &mut cap)).unwrap_err();
        assert!(matches!(err, ZishError::ParameterNotSet { .. }));
    }

    #[test]
    fn arithmetic_precedence_multiplication_before_addition() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("$((2 + 3 * 4))", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["14".to_string()]);
    }

    #[test]
    fn arithmetic_left_to_right_associativity() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("$((20 - 5 - 5))", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["10".to_string()]);
    }

    #[test]
    fn arithmetic_division_by_zero_yields_zero() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let result = expand_word("$((5 / 0))", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["0".to_string()]);
    }

    #[test]
    fn arithmetic_with_parens_and_variable() {
        let mut vars = HashMap::new();
        vars.insert("N".to_string(), "3".to_string());
        let mut cap = no_capture;
        let result = expand_word("$(( (N + 1) * 2 ))", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["8".to_string()]);
    }

    #[test]
    fn command_substitution_calls_capture_and_strips_trailing_newlines() {
        let vars = HashMap::new();
        let mut cap = |cmd: &str| -> ZishResult<String> {
            assert_eq!(cmd, "echo hi");
            Ok("hi\n".to_string())
        };
        let result = expand_word("$(echo hi)", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["hi".to_string()]);
    }

    #[test]
    fn backtick_substitution_is_equivalent_to_dollar_paren() {
        let vars = HashMap::new();
        let mut cap = |cmd: &str| -> ZishResult<String> {
            assert_eq!(cmd, "pwd");
            Ok("/tmp\n".to_string())
        };
        let result = expand_word("`pwd`", &mut ctx(&vars, &mut cap)).unwrap();
        assert_eq!(result, vec!["/tmp".to_string()]);
    }

    #[test]
    fn unterminated_command_substitution_errors() {
        let vars = HashMap::new();
        let mut cap = no_capture;
        let err = expand_word("$(echo hi", &mut ctx(&vars, &mut cap)).unwrap_err();
        assert!(matches!(err, ZishError::UnterminatedCommandSubstitution));
    }
}
