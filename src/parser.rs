//! Recursive-descent parser building the [`crate::ast`] tree from a token
//! stream. Generalizes a flat `parse_chain` (a flat word list split on
//! `;`/`&&`/`||`) into the full `list`/`and_or`/`pipeline`/`command`
//! grammar, with real control-flow and redirect nodes instead of a flat
//! chain.

use crate::ast::{Arena, AstNode, NodeId};
use crate::error::{ZishError, ZishResult};
use crate::lexer::{Keyword, Lexer, RedirectOp, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: Arena,
}

/// Parse a full command string into an arena and its root [`NodeId`] (a
/// `List` node, even for a single statement).
pub fn parse(input: &str) -> ZishResult<(Arena, NodeId)> {
    let tokens = Lexer::tokenize_all(input)?;
    let mut parser = Parser { tokens, pos: 0, arena: Arena::new() };
    let root = parser.parse_program()?;
    Ok((parser.arena, root))
}

type Stop = dyn Fn(&TokenKind) -> bool;

fn is_word_like(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Word(_) | TokenKind::Integer(_) | TokenKind::SingleQuotedString(_) | TokenKind::DoubleQuotedString(_))
}

fn parse_assignment(word: &str) -> Option<(String, String)> {
    let eq = word.find('=')?;
    let (name, rest) = word.split_at(eq);
    let value = &rest[1..];
    if name.is_empty() {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

impl Parser {
    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn error(&self, kind: &str) -> ZishError {
        let tok = self.current();
        ZishError::ParseError { line: tok.line, col: tok.col, kind: kind.to_string() }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> ZishResult<()> {
        if *self.peek_kind() == TokenKind::Keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected keyword {kw:?}")))
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Semicolon | TokenKind::NewLine | TokenKind::Background) {
            self.advance();
        }
    }

    fn parse_program(&mut self) -> ZishResult<NodeId> {
        self.parse_list(&|k| matches!(k, TokenKind::Eof))
    }

    fn parse_list(&mut self, stop: &Stop) -> ZishResult<NodeId> {
        let mut children = Vec::new();
        self.skip_separators();
        while !self.at_eof() && !stop(self.peek_kind()) {
            let node = self.parse_and_or()?;
            children.push(node);
            if matches!(self.peek_kind(), TokenKind::Semicolon | TokenKind::NewLine | TokenKind::Background) {
                self.skip_separators();
            } else {
                break;
            }
        }
        Ok(self.arena.alloc(AstNode::List { children }))
    }

    fn parse_and_or(&mut self) -> ZishResult<NodeId> {
        let mut left = self.parse_pipeline()?;
        loop {
            match self.peek_kind() {
                TokenKind::And => {
                    self.advance();
                    let right = self.parse_pipeline()?;
                    left = self.arena.alloc(AstNode::LogicalAnd { left, right });
                }
                TokenKind::Or => {
                    self.advance();
                    let right = self.parse_pipeline()?;
                    left = self.arena.alloc(AstNode::LogicalOr { left, right });
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_pipeline(&mut self) -> ZishResult<NodeId> {
        let first = self.parse_command()?;
        if !matches!(self.peek_kind(), TokenKind::Pipe) {
            return Ok(first);
        }
        let mut children = vec![first];
        while matches!(self.peek_kind(), TokenKind::Pipe) {
            self.advance();
            children.push(self.parse_command()?);
        }
        Ok(self.arena.alloc(AstNode::Pipeline { children }))
    }

    fn parse_command(&mut self) -> ZishResult<NodeId> {
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_until(true),
            TokenKind::Keyword(Keyword::Until) => self.parse_while_until(false),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::LParen => {
                self.advance();
                let body = self.parse_list(&|k| matches!(k, TokenKind::RParen))?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(self.arena.alloc(AstNode::Subshell { body }))
            }
            TokenKind::LBrace => {
                self.advance();
                let body = self.parse_list(&|k| matches!(k, TokenKind::RBrace))?;
                self.expect(TokenKind::RBrace, "expected '}'")?;
                Ok(self.arena.alloc(AstNode::Subshell { body }))
            }
            TokenKind::DLBracket => self.parse_test_expr(),
            TokenKind::Word(name)
                if *self.peek_at(1) == TokenKind::LParen && *self.peek_at(2) == TokenKind::RParen =>
            {
                self.parse_function_def(name)
            }
            TokenKind::Word(word) if self.is_bare_assignment(&word) => self.parse_assignment_stmt(),
            _ => self.parse_simple_command(),
        }
    }

    fn is_bare_assignment(&self, word: &str) -> bool {
        if parse_assignment(word).is_none() {
            return false;
        }
        matches!(
            self.peek_at(1),
            TokenKind::Semicolon
                | TokenKind::NewLine
                | TokenKind::Background
                | TokenKind::Pipe
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::DRBracket
                | TokenKind::Keyword(_)
        )
    }

    fn parse_assignment_stmt(&mut self) -> ZishResult<NodeId> {
        let tok = self.advance();
        let TokenKind::Word(word) = tok.kind else { unreachable!() };
        let (name, rhs) = parse_assignment(&word).expect("checked by is_bare_assignment");
        let value = self.arena.alloc(AstNode::Word { value: rhs });
        Ok(self.arena.alloc(AstNode::Assignment { name, value }))
    }

    fn parse_function_def(&mut self, name: String) -> ZishResult<NodeId> {
        self.advance(); // name
        self.expect(TokenKind::LParen, "expected '('")?;
        self.expect(TokenKind::RParen, "expected ')'")?;
        self.expect(TokenKind::LBrace, "expected '{'")?;

        let mut parts = Vec::new();
        let mut depth = 1usize;
        while depth > 0 {
            if self.at_eof() {
                return Err(self.error("unterminated function body"));
            }
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                }
                _ => {}
            }
            parts.push(self.advance().text);
        }

        Ok(self.arena.alloc(AstNode::FunctionDef { name, body_source: parts.join(" ") }))
    }

    fn parse_if(&mut self) -> ZishResult<NodeId> {
        self.advance();
        let condition = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Then)))?;
        self.expect_keyword(Keyword::Then)?;
        let then_branch = self.parse_list(&|k| {
            matches!(k, TokenKind::Keyword(Keyword::Elif) | TokenKind::Keyword(Keyword::Else) | TokenKind::Keyword(Keyword::Fi))
        })?;
        let else_branch = self.parse_if_tail()?;
        self.expect_keyword(Keyword::Fi)?;
        Ok(self.arena.alloc(AstNode::If { condition, then_branch, else_branch }))
    }

    fn parse_if_tail(&mut self) -> ZishResult<Option<NodeId>> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Elif) => {
                self.advance();
                let condition = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Then)))?;
                self.expect_keyword(Keyword::Then)?;
                let then_branch = self.parse_list(&|k| {
                    matches!(k, TokenKind::Keyword(Keyword::Elif) | TokenKind::Keyword(Keyword::Else) | TokenKind::Keyword(Keyword::Fi))
                })?;
                let else_branch = self.parse_if_tail()?;
                Ok(Some(self.arena.alloc(AstNode::If { condition, then_branch, else_branch })))
            }
            TokenKind::Keyword(Keyword::Else) => {
                self.advance();
                let body = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Fi)))?;
                Ok(Some(body))
            }
            _ => Ok(None),
        }
    }

    fn parse_while_until(&mut self, is_while: bool) -> ZishResult<NodeId> {
        self.advance();
        let condition = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Do)))?;
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Done)))?;
        self.expect_keyword(Keyword::Done)?;
        let node = if is_while { AstNode::While { condition, body } } else { AstNode::Until { condition, body } };
        Ok(self.arena.alloc(node))
    }

    fn parse_for(&mut self) -> ZishResult<NodeId> {
        self.advance();
        let TokenKind::Word(variable) = self.peek_kind().clone() else {
            return Err(self.error("expected loop variable name after 'for'"));
        };
        self.advance();

        let mut words = Vec::new();
        if *self.peek_kind() == TokenKind::Keyword(Keyword::In) {
            self.advance();
            while is_word_like(self.peek_kind()) {
                words.push(self.parse_word_like()?);
            }
        }

        self.skip_separators();
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_list(&|k| matches!(k, TokenKind::Keyword(Keyword::Done)))?;
        self.expect_keyword(Keyword::Done)?;
        Ok(self.arena.alloc(AstNode::For { variable, words, body }))
    }

    fn parse_test_expr(&mut self) -> ZishResult<NodeId> {
        self.advance(); // [[
        let mut children = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::DRBracket) {
            if self.at_eof() {
                return Err(self.error("unterminated '[[' test expression"));
            }
            // Operators like `!`, `=`, `-eq` lex as ordinary words (no
            // dedicated test-operator tokens), so this is just word collection.
            children.push(self.parse_word_like()?);
        }
        self.advance(); // ]]
        Ok(self.arena.alloc(AstNode::Test { children }))
    }

    fn parse_word_like(&mut self) -> ZishResult<NodeId> {
        let tok = self.advance();
        let node = match tok.kind {
            TokenKind::Word(value) => AstNode::Word { value },
            TokenKind::Integer(n) => AstNode::Word { value: n.to_string() },
            TokenKind::SingleQuotedString(value) => AstNode::String { value, quoted: true },
            TokenKind::DoubleQuotedString(value) => AstNode::String { value, quoted: false },
            _ => return Err(self.error("expected a word")),
        };
        Ok(self.arena.alloc(node))
    }

    fn parse_simple_command(&mut self) -> ZishResult<NodeId> {
        let mut words = Vec::new();
        while is_word_like(self.peek_kind()) {
            words.push(self.parse_word_like()?);
        }
        if words.is_empty() {
            return Err(self.error("expected a command"));
        }

        let mut node = self.arena.alloc(AstNode::Command { children: words });

        while let TokenKind::Redirect(redirect) = self.peek_kind().clone() {
            self.advance();
            // `2>&1`/`1>&2` carry their dup target inside `redirect.op`
            // itself (the lexer folds `&1` into the token) — there is no
            // separate target word to consume for those. Every other form
            // (`>`, `>>`, `<`, `<<`, `<<<`) is followed by a real word.
            let word = if matches!(redirect.op, RedirectOp::DupTo(_)) {
                self.arena.alloc(AstNode::Word { value: String::new() })
            } else {
                self.parse_word_like()?
            };
            node = self.arena.alloc(AstNode::Redirect { target: node, redirect, word });
        }

        Ok(node)
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> ZishResult<()> {
        if *self.peek_kind() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }
}
