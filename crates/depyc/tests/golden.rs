//! Concrete end-to-end scenarios (§8). Declared `harness = false` in
//! `Cargo.toml`, same as the teacher's own fixture-driven test binaries,
//! but since this pack ships no `.pyc`/`.py` fixture pairs, each
//! scenario's bytecode is hand-built here rather than discovered from a
//! fixtures directory.

use depyc::ast::{BinOp, Expr, MatchPattern, Stmt};
use depyc::codeobject::{CodeFlags, CodeObject};
use depyc::value::ConstValue;
use depyc::{decompile_code, print_module, PyVersion, TraceSink};

fn code_with(bytecode: Vec<u8>, constants: Vec<ConstValue>, varnames: Vec<&str>) -> CodeObject {
    code_with_flags(bytecode, constants, varnames, CodeFlags::empty())
}

fn code_with_flags(bytecode: Vec<u8>, constants: Vec<ConstValue>, varnames: Vec<&str>, flags: CodeFlags) -> CodeObject {
    CodeObject {
        argcount: varnames.len() as u32,
        posonlyargcount: 0,
        kwonlyargcount: 0,
        flags,
        stacksize: 4,
        firstlineno: 1,
        bytecode,
        constants,
        names: Vec::new(),
        varnames: varnames.into_iter().map(String::from).collect(),
        freevars: Vec::new(),
        cellvars: Vec::new(),
        linetable: Vec::new(),
        exceptiontable: Vec::new(),
        name: "f".into(),
        qualname: "f".into(),
    }
}

type Scenario = (&'static str, fn() -> Result<(), String>);

fn linear_add() -> Result<(), String> {
    // def f(a, b): return a + b
    let code = code_with(vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0], Vec::new(), vec!["a", "b"]);
    let mut sink = TraceSink::null();
    let (arena, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    match stmts.as_slice() {
        [Stmt::Return(Some(id))] => match arena.expr(*id) {
            Expr::BinOp { op: BinOp::Add, .. } => Ok(()),
            other => Err(format!("expected BinOp(Add), got {other:?}")),
        },
        other => Err(format!("expected a single return statement, got {other:?}")),
    }
}

fn if_else() -> Result<(), String> {
    // RESUME 0, LOAD_FAST 0, POP_JUMP_IF_FALSE @8, RETURN_CONST 0, RETURN_CONST 1
    let bytes = vec![122, 0, 124, 0, 179, 1, 89, 0, 89, 1];
    let code = code_with(bytes, vec![ConstValue::Int(1), ConstValue::Int(2)], vec!["x"]);
    let mut sink = TraceSink::null();
    let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    if stmts.iter().any(|s| matches!(s, Stmt::If { .. })) {
        Ok(())
    } else {
        Err(format!("expected an If statement, got {stmts:?}"))
    }
}

fn while_true_with_break() -> Result<(), String> {
    let bytes = vec![
        122, 0, // RESUME 0
        124, 0, // [header] LOAD_FAST 0
        179, 3, // POP_JUMP_IF_FALSE -> end
        124, 0, // [body] LOAD_FAST 0
        1, 0, // POP_TOP
        172, 5, // JUMP_BACKWARD -> header
        89, 0, // [end] RETURN_CONST None
    ];
    let code = code_with(bytes, vec![ConstValue::None], vec!["x"]);
    let mut sink = TraceSink::null();
    let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    if stmts.iter().any(|s| matches!(s, Stmt::While { .. })) {
        Ok(())
    } else {
        Err(format!("expected a While statement, got {stmts:?}"))
    }
}

fn empty_bytecode_is_empty_ast() -> Result<(), String> {
    let code = code_with(Vec::new(), Vec::new(), Vec::new());
    let mut sink = TraceSink::null();
    let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    if stmts.is_empty() {
        Ok(())
    } else {
        Err(format!("expected an empty body, got {stmts:?}"))
    }
}

fn single_return_is_exactly_one_statement() -> Result<(), String> {
    let code = code_with(vec![122, 0, 89, 0], vec![ConstValue::None], Vec::new());
    let mut sink = TraceSink::null();
    let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    match stmts.as_slice() {
        [Stmt::Return(_)] => Ok(()),
        other => Err(format!("expected exactly one return, got {other:?}")),
    }
}

fn module_print_starts_with_future_import() -> Result<(), String> {
    let code = code_with_flags(vec![122, 0, 89, 0], vec![ConstValue::None], Vec::new(), CodeFlags::FUTURE_ANNOTATIONS);
    let mut sink = TraceSink::null();
    let (arena, stmts, future_annotations) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    let text = print_module(&arena, &stmts, future_annotations);
    if text.starts_with("from __future__ import annotations\n") {
        Ok(())
    } else {
        Err(format!("module text missing future import: {text:?}"))
    }
}

fn module_print_omits_future_import_when_flag_is_unset() -> Result<(), String> {
    let code = code_with(vec![122, 0, 89, 0], vec![ConstValue::None], Vec::new());
    let mut sink = TraceSink::null();
    let (arena, stmts, future_annotations) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    let text = print_module(&arena, &stmts, future_annotations);
    if text.starts_with("from __future__ import annotations") {
        Err(format!("module text should not carry a future import: {text:?}"))
    } else {
        Ok(())
    }
}

fn match_sequence_destructures_into_a_match_statement() -> Result<(), String> {
    // def f(x):
    //     match x:
    //         case [a, b]:
    //             pass
    let bytes = vec![
        122, 0, // RESUME 0
        124, 0, // [subject] LOAD_FAST 0 (x)
        33, 0, // MATCH_SEQUENCE
        59, 0, 0, 0, 0, 0, 0, 0, // TO_BOOL (3 cache slots)
        179, 4, // POP_JUMP_IF_FALSE -> merge (offset 24)
        92, 2, 0, 0, // [case] UNPACK_SEQUENCE 2
        175, 18, // STORE_FAST_STORE_FAST (hi=1 'a', lo=2 'b')
        110, 0, // JUMP_FORWARD 0 -> merge
        89, 0, // [merge] RETURN_CONST 0 (None)
    ];
    let code = code_with(bytes, vec![ConstValue::None], vec!["x", "a", "b"]);
    let mut sink = TraceSink::null();
    let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).map_err(|e| e.to_string())?;
    match stmts.iter().find(|s| matches!(s, Stmt::Match { .. })) {
        Some(Stmt::Match { cases, .. }) => match cases.as_slice() {
            [case] if matches!(&case.pattern, MatchPattern::Sequence(elems) if elems.len() == 2) => Ok(()),
            other => Err(format!("expected a single two-element sequence case, got {other:?}")),
        },
        other => Err(format!("expected a Match statement, got {other:?}")),
    }
}

const SCENARIOS: &[Scenario] = &[
    ("linear_add", linear_add),
    ("if_else", if_else),
    ("while_true_with_break", while_true_with_break),
    ("empty_bytecode_is_empty_ast", empty_bytecode_is_empty_ast),
    ("single_return_is_exactly_one_statement", single_return_is_exactly_one_statement),
    ("module_print_starts_with_future_import", module_print_starts_with_future_import),
    ("module_print_omits_future_import_when_flag_is_unset", module_print_omits_future_import_when_flag_is_unset),
    ("match_sequence_destructures_into_a_match_statement", match_sequence_destructures_into_a_match_statement),
];

fn main() {
    let mut failures = Vec::new();
    for (name, scenario) in SCENARIOS {
        match scenario() {
            Ok(()) => println!("ok       {name}"),
            Err(reason) => {
                println!("FAILED   {name}: {reason}");
                failures.push(*name);
            }
        }
    }
    if !failures.is_empty() {
        panic!("{} golden scenario(s) failed: {:?}", failures.len(), failures);
    }
}
