//! Component G: the structural decompiler driver.
//!
//! Walks the CFG in reverse-postorder from a region's entry, asking
//! `recognize::classify` what construct each unconsumed block heads,
//! consuming the blocks that construct owns, and recursing into its
//! sub-regions. What's left over after a block is consumed (or after
//! straight-line simulation advances past it) is queued and visited next,
//! same as the teacher's frame dispatch loop walks one bytecode block at a
//! time.

use std::collections::HashSet;

use crate::arena::{Arena, ExprId};
use crate::ast::{BoolOp as AstBoolOp, Expr, FunctionDef, Literal, MatchCase, MatchPattern, Stmt, Target};
use crate::cfg::Cfg;
use crate::codeobject::CodeObject;
use crate::decode::decode;
use crate::dominators::Dominators;
use crate::error::{DecompileError, Result};
use crate::exctable::ExceptionEntry;
use crate::recognize::{self, Pattern};
use crate::simulate::{simulate_straight_line, SimFailure};
use crate::stack::{Stack, StackValue};
use crate::trace::{trace_decisions, trace_loop_guards, trace_sim_block, TraceSink};
use crate::value::ConstValue;
use crate::version::PyVersion;

const MAX_BLOCK_VISITS: usize = 10_000;

/// Everything the driver threads through the recursive walk.
struct Ctx<'a> {
    cfg: &'a Cfg,
    dominators: &'a Dominators,
    exceptions: &'a [ExceptionEntry],
    code: &'a CodeObject,
    version: PyVersion,
    arena: &'a mut Arena,
    trace: &'a mut TraceSink,
}

/// Decompiles one code object's body into a statement list plus the arena
/// backing its expressions. `focus` optionally narrows to a dotted path of
/// nested code-object names (`outer.inner`), matching §6's `--focus`.
pub fn decompile_code(code: &CodeObject, version: PyVersion, trace: &mut TraceSink, focus: Option<&str>) -> Result<(Arena, Vec<Stmt>, bool)> {
    let target = match focus {
        Some(path) => resolve_focus(code, path)?,
        None => code,
    };
    let mut arena = Arena::new();
    let stmts = decompile_one(target, version, &mut arena, trace)?;
    Ok((arena, stmts, target.has_future_annotations()))
}

fn resolve_focus<'a>(root: &'a CodeObject, path: &str) -> Result<&'a CodeObject> {
    let mut current = root;
    for segment in path.split('.') {
        let found = current.nested_code_objects().find(|c| c.name == segment);
        current = found.ok_or_else(|| DecompileError::Unsupported { offset: 0, reason: format!("no nested code object named `{segment}`") })?;
    }
    Ok(current)
}

fn decompile_one(code: &CodeObject, version: PyVersion, arena: &mut Arena, trace: &mut TraceSink) -> Result<Vec<Stmt>> {
    tracing::debug!(name = %code.name, bytes = code.bytecode.len(), ?version, "decompiling code object");
    let decoded = decode(&code.bytecode, version);
    if let Some(err) = decoded.error {
        tracing::warn!(name = %code.name, %err, "decoding stopped early");
        return Ok(vec![Stmt::FailedComment(format!("decompilation failed at offset {}: {}", err.offset().unwrap_or(0), err.kind_tag()))]);
    }
    let exceptions = code.decode_exception_table()?;
    let cfg = crate::cfg::build(decoded.instructions, &exceptions, version)?;
    let dominators = crate::dominators::analyze(&cfg)?;

    let Some(entry) = cfg.entry() else { return Ok(Vec::new()) };

    let mut ctx = Ctx { cfg: &cfg, dominators: &dominators, exceptions: &exceptions, code, version, arena, trace };
    let mut consumed = HashSet::new();
    match decompile_region(&mut ctx, entry, None, Stack::new(), &mut consumed) {
        Ok(stmts) => synthesize_functions(stmts, code, version, ctx.arena, ctx.trace),
        Err(err) => Ok(vec![Stmt::FailedComment(format!("decompilation failed at offset {}: {}", err.offset().unwrap_or(0), err.kind_tag()))]),
    }
}

/// A region is the blocks reachable from `start` without passing through
/// `stop` (exclusive boundary shared by every enclosing construct: a
/// merge block, a loop exit, a handler's join point). Returns the
/// statements produced, in source order.
fn decompile_region(ctx: &mut Ctx, start: usize, stop: Option<usize>, mut stack: Stack, consumed: &mut HashSet<usize>) -> Result<Vec<Stmt>> {
    let mut stmts = Vec::new();
    let mut cursor = Some(start);
    let mut visits = 0usize;

    while let Some(block_id) = cursor {
        if Some(block_id) == stop || !consumed.insert(block_id) {
            break;
        }
        visits += 1;
        if visits > MAX_BLOCK_VISITS {
            trace_loop_guards(ctx.trace, start, visits, "aborted: exceeded block-visit bound");
            return Err(DecompileError::CfgMalformed { reason: "driver exceeded its block-visit bound".into() });
        }

        let Some(block) = ctx.cfg.block(block_id) else {
            return Err(DecompileError::InvalidBlock { block_id });
        };

        let pattern = recognize::classify(ctx.cfg, ctx.dominators, ctx.exceptions, block_id);
        trace_decisions(ctx.trace, block_id, pattern_name(&pattern), "recognizer classification");

        match pattern {
            Pattern::Straight => {
                let instrs = ctx.cfg.block_instructions(block).to_vec();
                let depth_in = stack.len();
                let mut block_stmts = Vec::new();
                let outcome = simulate_straight_line(&instrs, ctx.code, ctx.version, ctx.arena, &mut stack, &mut block_stmts);
                match outcome {
                    Ok(()) => {
                        trace_sim_block(ctx.trace, block_id, block.start_offset, block.end_offset, depth_in, stack.len(), "ok");
                        stmts.extend(block_stmts);
                        cursor = single_successor(block);
                    }
                    Err(SimFailure::Hard(err)) => {
                        trace_sim_block(ctx.trace, block_id, block.start_offset, block.end_offset, depth_in, stack.len(), "hard_failure");
                        return Err(err.into());
                    }
                    Err(SimFailure::Soft(_)) => {
                        trace_sim_block(ctx.trace, block_id, block.start_offset, block.end_offset, depth_in, stack.len(), "soft_failure");
                        stmts.push(Stmt::FailedComment(format!("decompilation failed at offset {}: PatternNoMatch", block.start_offset)));
                        cursor = single_successor(block);
                    }
                }
            }
            Pattern::If { cond_block, then_block, else_block, merge } => {
                let test = simulate_condition(ctx, cond_block, &mut stack)?;
                consumed.insert(cond_block);
                let then_stmts = decompile_region(ctx, then_block, merge, stack.clone(), consumed)?;
                let else_stmts = match else_block {
                    Some(eb) if !consumed.contains(&eb) => decompile_region(ctx, eb, merge, stack.clone(), consumed)?,
                    _ => Vec::new(),
                };
                stmts.push(Stmt::If { test, body: non_empty_or_pass(then_stmts), orelse: else_stmts });
                cursor = merge;
            }
            Pattern::Ternary { cond_block, true_arm, false_arm, merge } => {
                let test = simulate_condition(ctx, cond_block, &mut stack)?;
                consumed.insert(cond_block);
                consumed.insert(true_arm);
                consumed.insert(false_arm);
                let true_val = simulate_single_expr(ctx, true_arm)?;
                let false_val = simulate_single_expr(ctx, false_arm)?;
                let id = ctx.arena.alloc_expr(Expr::IfExp { test, body: true_val, orelse: false_val });
                stack.push(StackValue::Expr(id));
                cursor = Some(merge);
            }
            Pattern::ShortCircuit { op, left: _, right_arm, merge } => {
                // `left` contributed its operand to `stack` via the straight-line
                // pass that preceded this classification; the right arm's
                // operand is simulated independently and joined with `BoolOp`.
                let left_val = stack.pop().and_then(|v| v.as_expr());
                consumed.insert(right_arm);
                let right_val = simulate_single_expr(ctx, right_arm)?;
                if let Some(left_val) = left_val {
                    let ast_op = match op {
                        AstBoolOp::And => AstBoolOp::And,
                        AstBoolOp::Or => AstBoolOp::Or,
                    };
                    let id = ctx.arena.alloc_expr(Expr::BoolOp { op: ast_op, values: vec![left_val, right_val] });
                    stack.push(StackValue::Expr(id));
                }
                cursor = Some(merge);
            }
            Pattern::While { header, body_entry, exit } => {
                let test = simulate_condition(ctx, header, &mut stack)?;
                consumed.insert(header);
                let body = decompile_region(ctx, body_entry, Some(header), Stack::new(), consumed)?;
                stmts.push(Stmt::While { test, body: non_empty_or_pass(body), orelse: Vec::new() });
                cursor = Some(exit);
            }
            Pattern::For { header, body_entry, exit } => {
                // The iterator expression was pushed onto `stack` by the block
                // preceding this header (`GET_ITER`); the loop variable comes
                // from the body's leading `STORE_*`, reconstructed from its
                // first statement if simulation produced one.
                let iter = stack.pop().and_then(|v| v.as_expr()).unwrap_or_else(|| ctx.arena.alloc_expr(Expr::Literal(Literal::None)));
                consumed.insert(header);
                let mut body = decompile_region(ctx, body_entry, Some(header), Stack::new(), consumed)?;
                let target = extract_loop_target(&mut body);
                stmts.push(Stmt::For { target, iter, body: non_empty_or_pass(body), orelse: Vec::new() });
                cursor = Some(exit);
            }
            Pattern::TryExcept { body_entry, handlers, merge } => {
                consumed.insert(block_id);
                let body = decompile_region(ctx, body_entry, merge, Stack::new(), consumed)?;
                let mut ast_handlers = Vec::new();
                for handler_block in handlers {
                    if consumed.contains(&handler_block) {
                        continue;
                    }
                    let handler_body = decompile_region(ctx, handler_block, merge, Stack::new(), consumed)?;
                    ast_handlers.push(crate::ast::ExceptHandler { exc_type: None, name: None, body: non_empty_or_pass(handler_body) });
                }
                stmts.push(Stmt::Try { body: non_empty_or_pass(body), handlers: ast_handlers, orelse: Vec::new(), finalbody: Vec::new() });
                cursor = merge;
            }
            Pattern::With { body_entry, merge } => {
                let context_expr = stack.pop().and_then(|v| v.as_expr()).unwrap_or_else(|| ctx.arena.alloc_expr(Expr::Literal(Literal::None)));
                let mut body = decompile_region(ctx, body_entry, merge, Stack::new(), consumed)?;
                let optional_vars = extract_with_target(&mut body);
                stmts.push(Stmt::With {
                    items: vec![crate::ast::WithItem { context_expr, optional_vars }],
                    body: non_empty_or_pass(body),
                    is_async: false,
                });
                cursor = merge;
            }
            Pattern::ChainedCompare { head: _, right_arm, merge } => {
                // `head`'s straight-line pass already ran, leaving
                // `[carried_operand, first_compare]` on `stack` (§4.F). Pull
                // both apart, re-simulate `right_arm` seeded with the carried
                // operand, and splice the two single-pair `Compare`s into one.
                consumed.insert(right_arm);
                let first = stack.pop().and_then(|v| v.as_expr());
                let carried = stack.pop().and_then(|v| v.as_expr());
                match (first, carried) {
                    (Some(first_id), Some(carried_id)) => {
                        let combined = match ctx.arena.expr(first_id).clone() {
                            Expr::Compare { left, rest } if rest.len() == 1 => {
                                let (op1, _) = rest[0];
                                let mut seeded = Stack::new();
                                seeded.push(StackValue::Expr(carried_id));
                                let second = simulate_block_expr(ctx, right_arm, seeded)?;
                                match ctx.arena.expr(second).clone() {
                                    Expr::Compare { rest: rest2, .. } if rest2.len() == 1 => {
                                        let (op2, right) = rest2[0];
                                        ctx.arena.alloc_expr(Expr::Compare { left, rest: vec![(op1, carried_id), (op2, right)] })
                                    }
                                    _ => second,
                                }
                            }
                            _ => first_id,
                        };
                        stack.push(StackValue::Expr(combined));
                    }
                    (Some(first_id), None) => stack.push(StackValue::Expr(first_id)),
                    _ => {}
                }
                cursor = Some(merge);
            }
            Pattern::Match { subject_block, case_body, wildcard_body, merge } => {
                let subject = simulate_match_subject(ctx, subject_block, &mut stack)?;
                consumed.insert(subject_block);
                let mut case_stack = Stack::new();
                case_stack.push(StackValue::Expr(subject));
                let mut case_stmts = decompile_region(ctx, case_body, merge, case_stack, consumed)?;
                let pattern = extract_sequence_pattern(&mut case_stmts, ctx.arena).unwrap_or(MatchPattern::Wildcard);
                let mut cases = vec![MatchCase { pattern, guard: None, body: non_empty_or_pass(case_stmts) }];
                if let Some(wb) = wildcard_body {
                    if !consumed.contains(&wb) {
                        let wildcard_stmts = decompile_region(ctx, wb, merge, Stack::new(), consumed)?;
                        cases.push(MatchCase { pattern: MatchPattern::Wildcard, guard: None, body: non_empty_or_pass(wildcard_stmts) });
                    }
                }
                stmts.push(Stmt::Match { subject, cases });
                cursor = merge;
            }
        }
    }

    Ok(stmts)
}

fn pattern_name(pattern: &Pattern) -> &'static str {
    match pattern {
        Pattern::Straight => "Straight",
        Pattern::If { .. } => "If",
        Pattern::Ternary { .. } => "Ternary",
        Pattern::ShortCircuit { .. } => "ShortCircuit",
        Pattern::ChainedCompare { .. } => "ChainedCompare",
        Pattern::Match { .. } => "Match",
        Pattern::While { .. } => "While",
        Pattern::For { .. } => "For",
        Pattern::TryExcept { .. } => "TryExcept",
        Pattern::With { .. } => "With",
    }
}

fn single_successor(block: &crate::cfg::BasicBlock) -> Option<usize> {
    block.successors.iter().find(|e| e.kind != crate::cfg::EdgeKind::Exception).map(|e| e.target_block_id)
}

/// Simulates a condition-testing block in place, leaving the test
/// expression popped off rather than left on `stack`.
fn simulate_condition(ctx: &mut Ctx, block_id: usize, stack: &mut Stack) -> Result<crate::arena::ExprId> {
    let Some(block) = ctx.cfg.block(block_id) else { return Err(DecompileError::InvalidBlock { block_id }) };
    let instrs = ctx.cfg.block_instructions(block).to_vec();
    let mut trailing = Vec::new();
    simulate_straight_line(&instrs, ctx.code, ctx.version, ctx.arena, stack, &mut trailing).map_err(simfailure_to_error)?;
    stack.pop().and_then(|v| v.as_expr()).ok_or(DecompileError::NotAnExpression { offset: block.start_offset })
}

/// Simulates a block known (by the recognizer) to push exactly one
/// expression and fall straight through, for ternary/short-circuit arms.
fn simulate_single_expr(ctx: &mut Ctx, block_id: usize) -> Result<ExprId> {
    simulate_block_expr(ctx, block_id, Stack::new())
}

/// As [`simulate_single_expr`], but starting from a caller-supplied `stack`
/// instead of an empty one — for arms that pick up a value left behind by
/// an idiom spanning two blocks (the chained-comparison carry, a `match`
/// subject).
fn simulate_block_expr(ctx: &mut Ctx, block_id: usize, mut stack: Stack) -> Result<ExprId> {
    let Some(block) = ctx.cfg.block(block_id) else { return Err(DecompileError::InvalidBlock { block_id }) };
    let instrs = ctx.cfg.block_instructions(block).to_vec();
    let mut trailing = Vec::new();
    simulate_straight_line(&instrs, ctx.code, ctx.version, ctx.arena, &mut stack, &mut trailing).map_err(simfailure_to_error)?;
    stack.pop().and_then(|v| v.as_expr()).ok_or(DecompileError::NotAnExpression { offset: block.start_offset })
}

/// Simulates a `match` subject block, which ends in a `MATCH_*` opcode that
/// peeks its subject (leaving it under the bool-ish result the following
/// `TO_BOOL`/conditional jump consumes) rather than popping it. Pops both
/// off `stack`, discards the placeholder, and returns the subject.
fn simulate_match_subject(ctx: &mut Ctx, block_id: usize, stack: &mut Stack) -> Result<ExprId> {
    let Some(block) = ctx.cfg.block(block_id) else { return Err(DecompileError::InvalidBlock { block_id }) };
    let instrs = ctx.cfg.block_instructions(block).to_vec();
    let mut trailing = Vec::new();
    simulate_straight_line(&instrs, ctx.code, ctx.version, ctx.arena, stack, &mut trailing).map_err(simfailure_to_error)?;
    stack.pop();
    stack.pop().and_then(|v| v.as_expr()).ok_or(DecompileError::NotAnExpression { offset: block.start_offset })
}

/// Pulls the leading `Subscript(subject, Literal::Int(i))`-valued captures
/// that `UNPACK_SEQUENCE` produces out of a `match` arm's body, in the order
/// CPython destructures them, and turns them into a `Sequence` pattern.
/// Returns `None` (letting the caller fall back to a wildcard) when the arm
/// doesn't open with that shape.
fn extract_sequence_pattern(body: &mut Vec<Stmt>, arena: &Arena) -> Option<MatchPattern> {
    let mut captures: Vec<(i64, String)> = Vec::new();
    for stmt in body.iter() {
        let Stmt::Assign { targets, value } = stmt else { break };
        let [Target::Name(name)] = targets.as_slice() else { break };
        let Expr::Subscript { index, .. } = arena.expr(*value) else { break };
        let Expr::Literal(Literal::Int(i)) = arena.expr(*index) else { break };
        captures.push((*i, name.clone()));
    }
    if captures.is_empty() {
        return None;
    }
    captures.sort_by_key(|(i, _)| *i);
    body.drain(0..captures.len());
    Some(MatchPattern::Sequence(captures.into_iter().map(|(_, name)| MatchPattern::Capture(name)).collect()))
}

fn simfailure_to_error(failure: SimFailure) -> DecompileError {
    match failure {
        SimFailure::Hard(err) => err.into(),
        SimFailure::Soft(_) => DecompileError::Unsupported { offset: 0, reason: "pattern hypothesis failed to simulate".into() },
    }
}

fn non_empty_or_pass(stmts: Vec<Stmt>) -> Vec<Stmt> {
    if stmts.is_empty() {
        vec![Stmt::Pass]
    } else {
        stmts
    }
}

/// A `for` body's first statement is the loop-variable assignment produced
/// by the body's leading `STORE_*` after `FOR_ITER`; pull its target out
/// and drop the statement so it isn't duplicated in the printed body.
fn extract_loop_target(body: &mut Vec<Stmt>) -> Target {
    if let Some(Stmt::Assign { targets, .. }) = body.first() {
        if let Some(target) = targets.first().cloned() {
            body.remove(0);
            return target;
        }
    }
    Target::Name("_".into())
}

fn extract_with_target(body: &mut Vec<Stmt>) -> Option<Target> {
    if let Some(Stmt::Assign { targets, .. }) = body.first() {
        let target = targets.first().cloned();
        if target.is_some() {
            body.remove(0);
        }
        return target;
    }
    None
}

/// Accepts a debugstring-shaped leading `RESUME; LOAD_CONST 0; POP_TOP`, or
/// a `consts[0]` that's a string never loaded anywhere else in the
/// bytecode (§9 docstring-vs-debugstring heuristic). The printer uses this
/// to decide whether a code object's leading `Stmt::Expr(Literal::Str(_))`
/// (already emitted naturally by `POP_TOP`'s discard-statement rule) should
/// render as a docstring or as an ordinary bare-string expression statement.
#[must_use]
pub fn extract_docstring(code: &CodeObject, cfg: &Cfg) -> Option<String> {
    let first_const = code.constants.first()?.as_str()?;
    let Some(entry) = cfg.entry() else { return None };
    let block = cfg.block(entry)?;
    let instrs = cfg.block_instructions(block);
    let leading_load_pop = instrs.windows(2).any(|pair| {
        pair[0].opcode.meta.mnemonic == "LOAD_CONST" && pair[0].arg == 0 && pair[1].opcode.meta.mnemonic == "POP_TOP"
    });
    let loaded_elsewhere = cfg
        .instructions()
        .iter()
        .any(|i| i.opcode.meta.mnemonic == "LOAD_CONST" && i.arg == 0 && i.offset != instrs.first().map(|f| f.offset).unwrap_or(usize::MAX));
    if leading_load_pop || !loaded_elsewhere {
        Some(first_const.to_string())
    } else {
        None
    }
}

/// Parses the `<code:{index}:{qualname}>` sentinel a nested-code-object
/// `LOAD_CONST` pushes in place of a literal (`simulate::step`'s `LOAD_CONST`
/// arm), returning the constant-table index.
fn parse_code_sentinel(name: &str) -> Option<usize> {
    let rest = name.strip_prefix("<code:")?;
    let (index, _) = rest.split_once(':')?;
    index.parse().ok()
}

/// Splits a code object's `varnames` into the parameter lists its arg
/// counts and `CO_VARARGS`/`CO_VARKEYWORDS` flags describe, in the
/// positional / keyword-only / `*args` / `**kwargs` order CPython lays
/// `varnames` out in.
fn function_signature(code: &CodeObject) -> (Vec<String>, Option<String>, Vec<String>, Option<String>) {
    let argcount = code.argcount as usize;
    let kwonly = code.kwonlyargcount as usize;
    let params: Vec<String> = (0..argcount).filter_map(|i| code.varname(i).map(str::to_string)).collect();
    let kwonly_names: Vec<String> = (argcount..argcount + kwonly).filter_map(|i| code.varname(i).map(str::to_string)).collect();
    let mut cursor = argcount + kwonly;
    let vararg = if code.has_varargs() {
        let name = code.varname(cursor).map(str::to_string);
        cursor += 1;
        name
    } else {
        None
    };
    let kwarg = if code.has_varkeywords() { code.varname(cursor).map(str::to_string) } else { None };
    (params, vararg, kwonly_names, kwarg)
}

/// Re-decodes a nested code object just far enough to ask
/// [`extract_docstring`] whether its body opens with one.
fn nested_docstring(code: &CodeObject, version: PyVersion) -> Option<String> {
    let decoded = decode(&code.bytecode, version);
    if decoded.error.is_some() {
        return None;
    }
    let exceptions = code.decode_exception_table().ok()?;
    let cfg = crate::cfg::build(decoded.instructions, &exceptions, version).ok()?;
    extract_docstring(code, &cfg)
}

/// Walks `stmts` looking for the `Stmt::Assign` shape a `LOAD_CONST <nested
/// code>; MAKE_FUNCTION; STORE_*` sequence leaves behind — a single name
/// bound to the code-sentinel `simulate::step` emits — and replaces it with
/// a fully decompiled `Stmt::FunctionDef`. Recurses into every nested body
/// (`if`/`while`/`for`/`try`/`with`/`match`) so a function defined inside a
/// conditional is still found.
fn synthesize_functions(stmts: Vec<Stmt>, code: &CodeObject, version: PyVersion, arena: &mut Arena, trace: &mut TraceSink) -> Result<Vec<Stmt>> {
    stmts.into_iter().map(|stmt| synthesize_functions_stmt(stmt, code, version, arena, trace)).collect()
}

fn synthesize_functions_stmt(stmt: Stmt, code: &CodeObject, version: PyVersion, arena: &mut Arena, trace: &mut TraceSink) -> Result<Stmt> {
    match stmt {
        Stmt::Assign { targets, value } => {
            if let [Target::Name(fn_name)] = targets.as_slice() {
                if let Expr::Name(sentinel) = arena.expr(value).clone() {
                    if let Some(nested) = parse_code_sentinel(&sentinel).and_then(|i| code.constants.get(i)).and_then(ConstValue::as_code) {
                        let nested = nested.clone();
                        let body = decompile_one(&nested, version, arena, trace)?;
                        let (params, vararg, kwonly, kwarg) = function_signature(&nested);
                        let docstring = nested_docstring(&nested, version);
                        return Ok(Stmt::FunctionDef(Box::new(FunctionDef {
                            name: fn_name.clone(),
                            params,
                            vararg,
                            kwonly,
                            kwarg,
                            defaults: Vec::new(),
                            body,
                            is_async: nested.is_coroutine(),
                            is_generator: nested.is_generator(),
                            docstring,
                        })));
                    }
                }
            }
            Ok(Stmt::Assign { targets, value })
        }
        Stmt::If { test, body, orelse } => Ok(Stmt::If {
            test,
            body: synthesize_functions(body, code, version, arena, trace)?,
            orelse: synthesize_functions(orelse, code, version, arena, trace)?,
        }),
        Stmt::While { test, body, orelse } => Ok(Stmt::While {
            test,
            body: synthesize_functions(body, code, version, arena, trace)?,
            orelse: synthesize_functions(orelse, code, version, arena, trace)?,
        }),
        Stmt::For { target, iter, body, orelse } => Ok(Stmt::For {
            target,
            iter,
            body: synthesize_functions(body, code, version, arena, trace)?,
            orelse: synthesize_functions(orelse, code, version, arena, trace)?,
        }),
        Stmt::Try { body, handlers, orelse, finalbody } => {
            let body = synthesize_functions(body, code, version, arena, trace)?;
            let mut new_handlers = Vec::with_capacity(handlers.len());
            for handler in handlers {
                new_handlers.push(crate::ast::ExceptHandler {
                    exc_type: handler.exc_type,
                    name: handler.name,
                    body: synthesize_functions(handler.body, code, version, arena, trace)?,
                });
            }
            let orelse = synthesize_functions(orelse, code, version, arena, trace)?;
            let finalbody = synthesize_functions(finalbody, code, version, arena, trace)?;
            Ok(Stmt::Try { body, handlers: new_handlers, orelse, finalbody })
        }
        Stmt::With { items, body, is_async } => {
            Ok(Stmt::With { items, body: synthesize_functions(body, code, version, arena, trace)?, is_async })
        }
        Stmt::Match { subject, cases } => {
            let mut new_cases = Vec::with_capacity(cases.len());
            for case in cases {
                new_cases.push(MatchCase {
                    pattern: case.pattern,
                    guard: case.guard,
                    body: synthesize_functions(case.body, code, version, arena, trace)?,
                });
            }
            Ok(Stmt::Match { subject, cases: new_cases })
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeobject::CodeFlags;
    use crate::value::ConstValue;

    fn code_with(bytecode: Vec<u8>, constants: Vec<ConstValue>) -> CodeObject {
        CodeObject {
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            stacksize: 4,
            firstlineno: 1,
            bytecode,
            constants,
            names: Vec::new(),
            varnames: vec!["a".into(), "b".into()],
            freevars: Vec::new(),
            cellvars: Vec::new(),
            linetable: Vec::new(),
            exceptiontable: Vec::new(),
            name: "<module>".into(),
            qualname: "<module>".into(),
        }
    }

    #[test]
    fn linear_add_decompiles_to_a_single_return() {
        let code = code_with(vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0], Vec::new());
        let mut sink = TraceSink::null();
        let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Stmt::Return(Some(_))));
    }

    #[test]
    fn if_else_decompiles_to_an_if_statement() {
        // RESUME 0, LOAD_FAST 0, POP_JUMP_IF_FALSE 1 -> RETURN_CONST 1,
        // RETURN_CONST 0, RETURN_CONST 1
        let bytes = vec![122, 0, 124, 0, 179, 1, 89, 0, 89, 1];
        let code = code_with(bytes, vec![ConstValue::Int(0), ConstValue::Int(1)]);
        let mut sink = TraceSink::null();
        let (_, stmts, _) = decompile_code(&code, PyVersion::new(3, 12), &mut sink, None).unwrap();
        assert!(stmts.iter().any(|s| matches!(s, Stmt::If { .. })));
    }

    #[test]
    fn unsupported_focus_path_is_reported() {
        let code = code_with(Vec::new(), Vec::new());
        let err = resolve_focus(&code, "missing").unwrap_err();
        assert!(matches!(err, DecompileError::Unsupported { .. }));
    }

    #[test]
    fn make_function_and_store_name_synthesize_a_function_def() {
        use pretty_assertions::assert_eq;

        // def g(): return None
        let nested = CodeObject {
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            stacksize: 2,
            firstlineno: 2,
            bytecode: vec![122, 0, 89, 0],
            constants: vec![ConstValue::None],
            names: Vec::new(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            linetable: Vec::new(),
            exceptiontable: Vec::new(),
            name: "g".into(),
            qualname: "f.<locals>.g".into(),
        };
        let outer = CodeObject {
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            stacksize: 2,
            firstlineno: 1,
            // RESUME 0, LOAD_CONST 0 (nested), MAKE_FUNCTION 0, STORE_NAME 0 (g), RETURN_CONST 1 (None)
            bytecode: vec![122, 0, 100, 0, 132, 0, 90, 0, 89, 1],
            constants: vec![ConstValue::Code(Box::new(nested)), ConstValue::None],
            names: vec!["g".into()],
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            linetable: Vec::new(),
            exceptiontable: Vec::new(),
            name: "<module>".into(),
            qualname: "<module>".into(),
        };
        let mut sink = TraceSink::null();
        let (_, stmts, _) = decompile_code(&outer, PyVersion::new(3, 12), &mut sink, None).unwrap();
        let func = stmts.iter().find_map(|s| match s {
            Stmt::FunctionDef(f) => Some(f.as_ref()),
            _ => None,
        });
        let func = func.expect("STORE_NAME of a MAKE_FUNCTION result should synthesize a FunctionDef");
        assert_eq!(func.name, "g");
        assert!(func.params.is_empty());
        assert!(!func.is_generator);
    }
}
