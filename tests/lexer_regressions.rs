use zish::error::ZishError;
use zish::lexer::{Keyword, Lexer, RedirectOp, TokenKind};

fn kinds(input: &str) -> Vec<TokenKind> {
    Lexer::tokenize_all(input).expect("tokenize").into_iter().map(|t| t.kind).collect()
}

#[test]
fn splits_words_on_unquoted_whitespace() {
    let kinds = kinds("echo hello world");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Word("echo".into()),
            TokenKind::Word("hello".into()),
            TokenKind::Word("world".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn single_quotes_produce_opaque_string_token() {
    let kinds = kinds("'a b $c'");
    assert_eq!(kinds[0], TokenKind::SingleQuotedString("a b $c".into()));
}

#[test]
fn double_quotes_preserve_expansion_markers() {
    let kinds = kinds("\"hi $name\"");
    assert_eq!(kinds[0], TokenKind::DoubleQuotedString("hi $name".into()));
}

#[test]
fn recognizes_pipe_and_logical_operators() {
    let kinds = kinds("a | b && c || d");
    assert!(kinds.contains(&TokenKind::Pipe));
    assert!(kinds.contains(&TokenKind::And));
    assert!(kinds.contains(&TokenKind::Or));
}

#[test]
fn recognizes_background_operator() {
    assert!(kinds("sleep 1 &").contains(&TokenKind::Background));
}

#[test]
fn recognizes_redirection_operators_with_explicit_fd() {
    let found = kinds("cmd 2>&1").into_iter().find_map(|k| match k {
        TokenKind::Redirect(r) => Some(r),
        _ => None,
    });
    let redirect = found.expect("expected a redirect token");
    assert_eq!(redirect.fd, 2);
    assert_eq!(redirect.op, RedirectOp::DupTo(1));
}

#[test]
fn recognizes_keywords() {
    let kinds = kinds("if true then false fi");
    assert_eq!(kinds[0], TokenKind::Keyword(Keyword::If));
    assert_eq!(kinds[2], TokenKind::Keyword(Keyword::Then));
    assert!(kinds.contains(&TokenKind::Keyword(Keyword::Fi)));
}

#[test]
fn integer_literals_are_tokenized_as_integers() {
    assert_eq!(kinds("42")[0], TokenKind::Integer(42));
}

#[test]
fn unterminated_single_quote_is_an_error() {
    let err = Lexer::tokenize_all("'unterminated").unwrap_err();
    assert!(matches!(err, ZishError::UnterminatedString));
}

#[test]
fn oversized_token_is_rejected() {
    let huge = "a".repeat(zish::lexer::MAX_TOKEN_LENGTH + 1);
    let err = Lexer::tokenize_all(&huge).unwrap_err();
    assert!(matches!(err, ZishError::TokenTooLong));
}

#[test]
fn token_text_round_trips_source_slice_for_words() {
    let tokens = Lexer::tokenize_all("hello").expect("tokenize");
    assert_eq!(tokens[0].text, "hello");
}
