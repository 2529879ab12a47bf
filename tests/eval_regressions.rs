use std::fs::File;

use zish::eval::{Evaluator, IoHandles, OutputHandle};
use zish::parser::parse;

fn run_captured(eval: &mut Evaluator, command: &str) -> (i32, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out");
    let file = File::create(&path).expect("create capture file");

    let (arena, root) = parse(command).expect("parse");
    let io = IoHandles { input: zish::eval::InputHandle::Inherit, output: OutputHandle::File(file), error: OutputHandle::Inherit };
    let code = eval.eval_ast(&arena, root, io).expect("eval");

    let stdout = std::fs::read_to_string(&path).expect("read capture file");
    (code, stdout)
}

#[test]
fn echo_writes_its_arguments() {
    let mut eval = Evaluator::new();
    let (code, stdout) = run_captured(&mut eval, "echo hello world");
    assert_eq!(code, 0);
    assert_eq!(stdout, "hello world\n");
}

#[test]
fn assignment_then_expansion_round_trips_through_vars() {
    let mut eval = Evaluator::new();
    let (code, stdout) = run_captured(&mut eval, "FOO=bar; echo $FOO");
    assert_eq!(code, 0);
    assert_eq!(stdout, "bar\n");
}

#[test]
fn export_persists_into_the_evaluator_environment() {
    let mut eval = Evaluator::new();
    let (_, _) = run_captured(&mut eval, "export GREETING=hi");
    assert_eq!(eval.vars.get("GREETING").map(String::as_str), Some("hi"));
}

#[test]
fn logical_and_short_circuits_on_failure() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "false && echo SHOULD_NOT_RUN");
    assert!(!stdout.contains("SHOULD_NOT_RUN"));
}

#[test]
fn logical_or_runs_the_fallback_on_failure() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "false || echo FALLBACK");
    assert!(stdout.contains("FALLBACK"));
}

#[test]
fn if_else_picks_the_matching_branch() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "if false; then echo A; else echo B; fi");
    assert_eq!(stdout, "B\n");
}

#[test]
fn for_loop_iterates_over_every_word() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "for x in a b c; do echo $x; done");
    assert_eq!(stdout, "a\nb\nc\n");
}

#[test]
fn while_loop_runs_until_condition_fails() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "i=0; while [[ $i != 3 ]]; do echo $i; i=$((i+1)); done");
    assert_eq!(stdout, "0\n1\n2\n");
}

#[test]
fn command_substitution_captures_external_output() {
    let mut eval = Evaluator::new();
    let (_, stdout) = run_captured(&mut eval, "echo $(echo nested)");
    assert_eq!(stdout, "nested\n");
}

#[test]
fn pipeline_feeds_stdout_into_the_next_stage() {
    let mut eval = Evaluator::new();
    let (code, stdout) = run_captured(&mut eval, "echo banana | sort");
    assert_eq!(code, 0);
    assert_eq!(stdout, "banana\n");
}

#[test]
fn alias_expands_before_the_command_runs() {
    let mut eval = Evaluator::new();
    let (_, _) = run_captured(&mut eval, "alias ll='echo aliased'");
    assert_eq!(eval.aliases.get("ll").map(String::as_str), Some("echo aliased"));
}

#[test]
fn exit_code_of_a_failing_command_is_nonzero() {
    let mut eval = Evaluator::new();
    let (code, _) = run_captured(&mut eval, "false");
    assert_ne!(code, 0);
}

#[test]
fn set_option_toggles_tracked_options() {
    let mut eval = Evaluator::new();
    eval.set_option("vim", false);
    assert_eq!(eval.options.get("vim"), Some(&false));
}

#[test]
fn unset_removes_a_variable() {
    let mut eval = Evaluator::new();
    let _ = run_captured(&mut eval, "FOO=bar");
    let _ = run_captured(&mut eval, "unset FOO");
    assert!(eval.vars.get("FOO").is_none());
}
