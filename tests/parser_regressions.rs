use zish::ast::AstNode;
use zish::parser::parse;

#[test]
fn parses_simple_command_directly_without_pipeline_wrapper() {
    let (arena, root) = parse("echo hi").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    assert_eq!(children.len(), 1);
    let AstNode::Command { children: words } = arena.get(children[0]) else { panic!("expected Command") };
    assert_eq!(words.len(), 2);
}

#[test]
fn parses_pipeline_into_multiple_command_stages() {
    let (arena, root) = parse("a | b | c").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    let AstNode::Pipeline { children: stages } = arena.get(children[0]) else { panic!("expected Pipeline") };
    assert_eq!(stages.len(), 3);
}

#[test]
fn parses_logical_and_or_left_associatively() {
    let (arena, root) = parse("a && b || c").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    // `&&`/`||` fold left to right: (a && b) || c
    assert!(matches!(arena.get(children[0]), AstNode::LogicalOr { .. }));
}

#[test]
fn semicolons_separate_list_entries() {
    let (arena, root) = parse("a; b; c").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    assert_eq!(children.len(), 3);
}

#[test]
fn bare_assignment_is_its_own_node_not_wrapped_in_command() {
    let (arena, root) = parse("FOO=bar").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    assert!(matches!(arena.get(children[0]), AstNode::Assignment { name, .. } if name == "FOO"));
}

#[test]
fn if_then_fi_parses_into_if_node() {
    let (arena, root) = parse("if true; then echo yes; fi").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    assert!(matches!(arena.get(children[0]), AstNode::If { else_branch: None, .. }));
}

#[test]
fn if_then_else_fi_carries_an_else_branch() {
    let (arena, root) = parse("if false; then echo a; else echo b; fi").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    assert!(matches!(arena.get(children[0]), AstNode::If { else_branch: Some(_), .. }));
}

#[test]
fn for_loop_collects_its_word_list() {
    let (arena, root) = parse("for x in a b c; do echo $x; done").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    let AstNode::For { variable, words, .. } = arena.get(children[0]) else { panic!("expected For") };
    assert_eq!(variable, "x");
    assert_eq!(words.len(), 3);
}

#[test]
fn subshell_parens_wrap_an_inner_list() {
    let (arena, root) = parse("(echo a; echo b)").expect("parse");
    let AstNode::List { children } = arena.get(root) else { panic!("expected List root") };
    let AstNode::Subshell { body } = arena.get(children[0]) else { panic!("expected Subshell") };
    let AstNode::List { children: inner } = arena.get(*body) else { panic!("expected inner List") };
    assert_eq!(inner.len(), 2);
}

#[test]
fn unterminated_if_is_a_parse_error() {
    assert!(parse("if true; then echo a").is_err());
}

#[test]
fn empty_input_still_produces_a_list_root() {
    let (arena, root) = parse("").expect("parse");
    assert!(matches!(arena.get(root), AstNode::List { children } if children.is_empty()));
}
