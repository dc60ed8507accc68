//! End-to-end scenarios (spec.md §8): compile a program and check the
//! exact lines `!!` writes to stdout.

use opo_compiler::{compile, CompilerConfig};
use opo_runtime::run_to_string;

fn run_source(src: &str) -> String {
    let chunk = compile(src, "<test>", &CompilerConfig::default()).expect("program should compile");
    run_to_string(chunk, Vec::new()).expect("program should run to completion")
}

#[test]
fn arithmetic_and_print() {
    let out = run_source("<> -> void: main [ (1 + 2 * 3)!! ]");
    assert_eq!(out, "7\n");
}

#[test]
fn conditional() {
    let out = run_source("<> -> void: main [ 5 => x : int; (x > 3) ? (\"big\"!!) : (\"small\"!!) ]");
    assert_eq!(out, "big\n");
}

#[test]
fn while_loop_with_break() {
    let out = run_source(
        "<> -> void: main [ 0 => i : int; (i < 10) @ [ (i == 5) ? (.); i!!; i + 1 => i ] ]",
    );
    assert_eq!(out, "0\n1\n2\n3\n4\n");
}

#[test]
fn option_narrowing() {
    let out = run_source(
        "<> -> int: f [ ^ 42 ]; <> -> void: main [ some(f()) => o : int?; o ? (o.some!!) : (\"none\"!!) ]",
    );
    assert_eq!(out, "42\n");
}

#[test]
fn struct_and_mutation() {
    let out = run_source(
        "struct[x:int,y:int] => P : type; <> -> void: main [ P(3,4) => p : P; =>p.x 10; p.x!! ]",
    );
    assert_eq!(out, "10\n");
}

#[test]
fn channel_round_trip() {
    let out = run_source(
        "<ch: chan<int>> -> void: prod [ ch <- 7 ]; <> -> void: main [ chan<int>(1) => c : chan<int>; go prod(c); (<-c)!! ]",
    );
    assert_eq!(out, "7\n");
}

#[test]
fn division_by_zero_caught() {
    let out = run_source(
        "<> -> void: main [ try [ 1 / 0 !! ] catch e [ (\"caught: \" + str(e))!! ] ]",
    );
    assert_eq!(out, "caught: Division by zero\n");
}

#[test]
fn uncaught_division_by_zero_fails_the_run() {
    let chunk = compile("<> -> void: main [ 1 / 0 !! ]", "<test>", &CompilerConfig::default())
        .expect("program should compile");
    let err = run_to_string(chunk, Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "Runtime Error: Division by zero");
}
