//! Component F: the symbolic stack simulator.
//!
//! A per-opcode micro-interpreter over a [`Stack`] of [`StackValue`]s. Each
//! handler is an explicit rule keyed on mnemonic (never on raw byte), per
//! the opcode-table design note in §9. Produces AST expression fragments in
//! the shared [`Arena`] and, for opcodes with a statement-level effect
//! (stores, bare calls), appends to the caller's pending-statement list.

use crate::arena::{Arena, ExprId};
use crate::ast::{BinOp, CmpOp, Expr, Keyword, Literal, Stmt, Target, UnaryOp};
use crate::codeobject::CodeObject;
use crate::decode::Instruction;
use crate::error::DecompileError;
use crate::stack::{MarkerKind, Stack, StackValue};
use crate::value::ConstValue;
use crate::version::PyVersion;

/// Soft failure: the simulator was evaluating a speculative hypothesis
/// (ternary/bool-op/chained-compare arm) and the caller should abandon it.
/// Deliberately not part of [`DecompileError`] — §7 says it must never
/// surface past the recognizer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternNoMatch;

pub type SimResult<T> = std::result::Result<T, SimFailure>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimFailure {
    Hard(HardSimError),
    Soft(PatternNoMatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardSimError {
    StackUnderflow { offset: usize, what: &'static str },
    NotAnExpression { offset: usize },
}

impl From<HardSimError> for DecompileError {
    fn from(err: HardSimError) -> Self {
        match err {
            HardSimError::StackUnderflow { offset, what } => DecompileError::StackUnderflow { offset, what },
            HardSimError::NotAnExpression { offset } => DecompileError::NotAnExpression { offset },
        }
    }
}

/// Holds side-channel state that spans more than one instruction within a
/// block (pending keyword-argument names, a frozen docstring slot, …).
#[derive(Debug, Default)]
pub struct SimState {
    pending_kw_names: Option<Vec<String>>,
}

/// Simulates every instruction in `instructions` in order, mutating `stack`
/// and appending any statements produced (assignments, bare-call
/// expression statements) to `stmts`. Branching opcodes are no-ops here;
/// the driver in `decompile.rs` splits at block boundaries.
pub fn simulate_straight_line(
    instructions: &[Instruction],
    code: &CodeObject,
    version: PyVersion,
    arena: &mut Arena,
    stack: &mut Stack,
    stmts: &mut Vec<Stmt>,
) -> SimResult<()> {
    let mut state = SimState::default();
    for instr in instructions {
        step(instr, code, version, arena, stack, stmts, &mut state)?;
    }
    Ok(())
}

fn pop_expr(stack: &mut Stack, offset: usize, what: &'static str) -> SimResult<ExprId> {
    match stack.pop() {
        Some(StackValue::Expr(id)) => Ok(id),
        Some(StackValue::Marker(_)) | Some(StackValue::Unknown) => {
            Err(SimFailure::Hard(HardSimError::NotAnExpression { offset }))
        }
        None => Err(SimFailure::Hard(HardSimError::StackUnderflow { offset, what })),
    }
}

fn const_to_expr(arena: &mut Arena, value: &ConstValue) -> ExprId {
    let literal = match value {
        ConstValue::None => Literal::None,
        ConstValue::Ellipsis => Literal::Ellipsis,
        ConstValue::Bool(b) => Literal::Bool(*b),
        ConstValue::Int(i) => Literal::Int(*i),
        ConstValue::Float(f) => Literal::Float(f.to_bits()),
        ConstValue::Str(s) => Literal::Str(s.clone()),
        ConstValue::Bytes(b) => Literal::Bytes(b.clone()),
        ConstValue::Tuple(items) => {
            let ids: Vec<ExprId> = items.iter().map(|v| const_to_expr(arena, v)).collect();
            return arena.alloc_expr(Expr::Tuple(ids));
        }
        ConstValue::Code(_) => Literal::Str("<code object>".to_string()),
    };
    arena.alloc_expr(Expr::Literal(literal))
}

fn binop_for(mnemonic_arg: u32) -> Option<BinOp> {
    // BINARY_OP's argument selects the operator; table mirrors CPython's
    // `_PyEval_BinaryOps` ordering closely enough for decompilation purposes.
    Some(match mnemonic_arg {
        0 => BinOp::Add,
        1 => BinOp::BitAnd,
        2 => BinOp::FloorDiv,
        3 => BinOp::LShift,
        4 => BinOp::Mod,
        5 => BinOp::Mul,
        6 => BinOp::BitOr,
        7 => BinOp::Pow,
        8 => BinOp::RShift,
        9 => BinOp::Sub,
        10 => BinOp::Div,
        11 => BinOp::BitXor,
        12 => BinOp::MatMul,
        _ => return None,
    })
}

fn legacy_binop_for(mnemonic: &str) -> Option<BinOp> {
    Some(match mnemonic {
        "BINARY_ADD" | "INPLACE_ADD" => BinOp::Add,
        "BINARY_SUBTRACT" => BinOp::Sub,
        "BINARY_MULTIPLY" => BinOp::Mul,
        "BINARY_MODULO" => BinOp::Mod,
        "BINARY_POWER" => BinOp::Pow,
        _ => return None,
    })
}

fn cmpop_for(arg: u32) -> Option<CmpOp> {
    Some(match arg {
        0 => CmpOp::Lt,
        1 => CmpOp::LtE,
        2 => CmpOp::Eq,
        3 => CmpOp::NotEq,
        4 => CmpOp::Gt,
        5 => CmpOp::GtE,
        _ => return None,
    })
}

#[allow(clippy::too_many_lines)]
fn step(
    instr: &Instruction,
    code: &CodeObject,
    version: PyVersion,
    arena: &mut Arena,
    stack: &mut Stack,
    stmts: &mut Vec<Stmt>,
    state: &mut SimState,
) -> SimResult<()> {
    let offset = instr.offset;
    let arg = instr.arg;
    match instr.opcode.meta.mnemonic {
        "NOP" | "RESUME" | "CACHE" | "EXTENDED_ARG" | "COPY_FREE_VARS" | "PUSH_NULL" => {
            if instr.opcode.meta.mnemonic == "PUSH_NULL" {
                stack.push(StackValue::Marker(MarkerKind::Null));
            }
        }
        "LOAD_CONST" => {
            let value = code.constants.get(arg as usize).ok_or(SimFailure::Hard(HardSimError::NotAnExpression { offset }))?;
            let id = match value {
                // A nested code object never prints as a literal; stash its
                // constant index and qualname in a sentinel `Name` so
                // `synthesize_functions` can recover it after `MAKE_FUNCTION`
                // turns it into a `def`. `<`/`:` never appear in a real
                // Python identifier, so this can't collide.
                ConstValue::Code(nested) => arena.alloc_expr(Expr::Name(format!("<code:{arg}:{}>", nested.qualname))),
                other => const_to_expr(arena, other),
            };
            stack.push(StackValue::Expr(id));
        }
        "LOAD_FAST" | "LOAD_FAST_LOAD_FAST" => {
            let name = code.varname(arg as usize).unwrap_or("<local>").to_string();
            let id = arena.alloc_expr(Expr::Name(name));
            stack.push(StackValue::Expr(id));
        }
        "LOAD_GLOBAL" | "LOAD_NAME" => {
            // 3.11+ LOAD_GLOBAL's low bit selects whether a NULL is pushed
            // ahead of the name for a following CALL; approximate by
            // pushing the marker only when the bit is set.
            let raw_index = if version.has_inline_caches() { (arg >> 1) as usize } else { arg as usize };
            if version.has_inline_caches() && arg & 1 != 0 {
                stack.push(StackValue::Marker(MarkerKind::Null));
            }
            let name = code.name(raw_index).unwrap_or("<global>").to_string();
            let id = arena.alloc_expr(Expr::Name(name));
            stack.push(StackValue::Expr(id));
        }
        "LOAD_DEREF" | "LOAD_CLOSURE" => {
            let name = code.freevar_or_cellvar(arg as usize).unwrap_or("<cell>").to_string();
            let id = arena.alloc_expr(Expr::Name(name));
            stack.push(StackValue::Expr(id));
        }
        "LOAD_ATTR" => {
            let index = if version.has_inline_caches() { (arg >> 1) as usize } else { arg as usize };
            let value = pop_expr(stack, offset, "attribute base")?;
            let attr = code.name(index).unwrap_or("<attr>").to_string();
            let id = arena.alloc_expr(Expr::Attribute { value, attr });
            stack.push(StackValue::Expr(id));
        }
        "STORE_FAST" => {
            let value = pop_expr(stack, offset, "store value")?;
            let name = code.varname(arg as usize).unwrap_or("<local>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Name(name)], value });
        }
        "STORE_FAST_STORE_FAST" => {
            // Fuses two sequential `STORE_FAST`s; TOS (pushed last, by the
            // textually *second* store's value) belongs to the high nibble,
            // the value underneath it to the low nibble.
            let top = pop_expr(stack, offset, "store value")?;
            let deep = pop_expr(stack, offset, "store value")?;
            let hi = (arg >> 4) as usize;
            let lo = (arg & 0xf) as usize;
            let name_hi = code.varname(hi).unwrap_or("<local>").to_string();
            let name_lo = code.varname(lo).unwrap_or("<local>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Name(name_hi)], value: top });
            stmts.push(Stmt::Assign { targets: vec![Target::Name(name_lo)], value: deep });
        }
        "STORE_FAST_LOAD_FAST" => {
            let value = pop_expr(stack, offset, "store value")?;
            let hi = (arg >> 4) as usize;
            let lo = (arg & 0xf) as usize;
            let store_name = code.varname(hi).unwrap_or("<local>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Name(store_name)], value });
            let load_name = code.varname(lo).unwrap_or("<local>").to_string();
            let id = arena.alloc_expr(Expr::Name(load_name));
            stack.push(StackValue::Expr(id));
        }
        "STORE_NAME" | "STORE_GLOBAL" => {
            let value = pop_expr(stack, offset, "store value")?;
            let name = code.name(arg as usize).unwrap_or("<name>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Name(name)], value });
        }
        "STORE_DEREF" => {
            let value = pop_expr(stack, offset, "store value")?;
            let name = code.freevar_or_cellvar(arg as usize).unwrap_or("<cell>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Name(name)], value });
        }
        "STORE_ATTR" => {
            let index = if version.has_inline_caches() { (arg >> 4) as usize } else { arg as usize };
            let base = pop_expr(stack, offset, "attribute base")?;
            let value = pop_expr(stack, offset, "store value")?;
            let attr = code.name(index).unwrap_or("<attr>").to_string();
            stmts.push(Stmt::Assign { targets: vec![Target::Attribute { value: base, attr }], value });
        }
        "STORE_SUBSCR" => {
            let index = pop_expr(stack, offset, "subscript index")?;
            let base = pop_expr(stack, offset, "subscript base")?;
            let value = pop_expr(stack, offset, "store value")?;
            stmts.push(Stmt::Assign { targets: vec![Target::Subscript { value: base, index }], value });
        }
        "MATCH_SEQUENCE" | "MATCH_MAPPING" => {
            // Peeks the subject (leaves it on the stack) and pushes a
            // bool-ish result the following `TO_BOOL`/conditional jump
            // consumes; the real subject is recovered by the driver once it
            // knows which arm won.
            stack.peek(0).ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "match subject" }))?;
            let id = arena.alloc_expr(Expr::Literal(Literal::Bool(true)));
            stack.push(StackValue::Expr(id));
        }
        "MATCH_KEYS" => {
            pop_expr(stack, offset, "match keys tuple")?;
            stack.peek(0).ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "match subject" }))?;
            let id = arena.alloc_expr(Expr::Literal(Literal::None));
            stack.push(StackValue::Expr(id));
        }
        "MATCH_CLASS" => {
            pop_expr(stack, offset, "match keyword-attr names")?;
            pop_expr(stack, offset, "match class")?;
            stack.peek(0).ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "match subject" }))?;
            let id = arena.alloc_expr(Expr::Literal(Literal::None));
            stack.push(StackValue::Expr(id));
        }
        "UNPACK_SEQUENCE" => {
            // CPython pushes the elements so the first one ends up on TOS;
            // pushing index `n-1` first and `0` last reproduces that order.
            let seq = pop_expr(stack, offset, "unpack sequence")?;
            let n = arg as usize;
            for i in (0..n).rev() {
                let index = arena.alloc_expr(Expr::Literal(Literal::Int(i as i64)));
                let id = arena.alloc_expr(Expr::Subscript { value: seq, index });
                stack.push(StackValue::Expr(id));
            }
        }
        "MAKE_FUNCTION" => {
            // `arg`'s low four bits each gate one extra TOS item (defaults,
            // kwdefaults, annotations, closure); decompilation doesn't need
            // their values, only that they're popped in step with the code
            // object sentinel underneath.
            let code_expr = pop_expr(stack, offset, "function code")?;
            for _ in 0..(arg & 0b1111).count_ones() {
                pop_expr(stack, offset, "function default/annotation/closure")?;
            }
            stack.push(StackValue::Expr(code_expr));
        }
        "UNARY_NOT" | "UNARY_NEGATIVE" | "UNARY_POSITIVE" | "UNARY_INVERT" => {
            let operand = pop_expr(stack, offset, "unary operand")?;
            let op = match instr.opcode.meta.mnemonic {
                "UNARY_NOT" => UnaryOp::Not,
                "UNARY_NEGATIVE" => UnaryOp::Neg,
                "UNARY_POSITIVE" => UnaryOp::Pos,
                _ => UnaryOp::Invert,
            };
            let id = arena.alloc_expr(Expr::UnaryOp { op, operand });
            stack.push(StackValue::Expr(id));
        }
        "BINARY_OP" | "BINARY_ADD" | "BINARY_SUBTRACT" | "BINARY_MULTIPLY" | "BINARY_MODULO" | "BINARY_POWER"
        | "INPLACE_ADD" | "BINARY_SUBSCR" => {
            if instr.opcode.meta.mnemonic == "BINARY_SUBSCR" {
                let index = pop_expr(stack, offset, "subscript index")?;
                let value = pop_expr(stack, offset, "subscript base")?;
                let id = arena.alloc_expr(Expr::Subscript { value, index });
                stack.push(StackValue::Expr(id));
            } else {
                let right = pop_expr(stack, offset, "right operand")?;
                let left = pop_expr(stack, offset, "left operand")?;
                let op = if instr.opcode.meta.mnemonic == "BINARY_OP" {
                    binop_for(arg).ok_or(SimFailure::Soft(PatternNoMatch))?
                } else {
                    legacy_binop_for(instr.opcode.meta.mnemonic).ok_or(SimFailure::Soft(PatternNoMatch))?
                };
                let id = arena.alloc_expr(Expr::BinOp { left, op, right });
                stack.push(StackValue::Expr(id));
            }
        }
        "COMPARE_OP" => {
            let index = if version.has_inline_caches() { (arg >> 4) as usize } else { arg as usize };
            let right = pop_expr(stack, offset, "comparison right")?;
            let left = pop_expr(stack, offset, "comparison left")?;
            let op = cmpop_for(index as u32).unwrap_or(CmpOp::Eq);
            let id = arena.alloc_expr(Expr::Compare { left, rest: vec![(op, right)] });
            stack.push(StackValue::Expr(id));
        }
        "IS_OP" => {
            let right = pop_expr(stack, offset, "comparison right")?;
            let left = pop_expr(stack, offset, "comparison left")?;
            let op = if arg == 0 { CmpOp::Is } else { CmpOp::IsNot };
            let id = arena.alloc_expr(Expr::Compare { left, rest: vec![(op, right)] });
            stack.push(StackValue::Expr(id));
        }
        "CONTAINS_OP" => {
            let right = pop_expr(stack, offset, "comparison right")?;
            let left = pop_expr(stack, offset, "comparison left")?;
            let op = if arg == 0 { CmpOp::In } else { CmpOp::NotIn };
            let id = arena.alloc_expr(Expr::Compare { left, rest: vec![(op, right)] });
            stack.push(StackValue::Expr(id));
        }
        "BUILD_LIST" | "BUILD_TUPLE" | "BUILD_SET" => {
            let n = arg as usize;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(pop_expr(stack, offset, "build item")?);
            }
            items.reverse();
            let expr = match instr.opcode.meta.mnemonic {
                "BUILD_LIST" => Expr::List(items),
                "BUILD_TUPLE" => Expr::Tuple(items),
                _ => Expr::Set(items),
            };
            let id = arena.alloc_expr(expr);
            stack.push(StackValue::Expr(id));
        }
        "BUILD_MAP" => {
            let n = arg as usize;
            let mut keys = Vec::with_capacity(n);
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(pop_expr(stack, offset, "map value")?);
                keys.push(Some(pop_expr(stack, offset, "map key")?));
            }
            keys.reverse();
            values.reverse();
            let id = arena.alloc_expr(Expr::Dict { keys, values });
            stack.push(StackValue::Expr(id));
        }
        "BUILD_CONST_KEY_MAP" => {
            let n = arg as usize;
            let keys_tuple = pop_expr(stack, offset, "map keys tuple")?;
            let keys: Vec<Option<ExprId>> = match arena.expr(keys_tuple) {
                Expr::Tuple(items) => items.iter().copied().map(Some).collect(),
                _ => vec![None; n],
            };
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(pop_expr(stack, offset, "map value")?);
            }
            values.reverse();
            let id = arena.alloc_expr(Expr::Dict { keys, values });
            stack.push(StackValue::Expr(id));
        }
        "BUILD_STRING" => {
            let n = arg as usize;
            let mut parts = Vec::with_capacity(n);
            for _ in 0..n {
                parts.push(pop_expr(stack, offset, "fstring part")?);
            }
            parts.reverse();
            let parts = parts
                .into_iter()
                .map(|value| crate::ast::FStringPart::Expr { value, conversion: None, format_spec: None })
                .collect();
            let id = arena.alloc_expr(Expr::FString(parts));
            stack.push(StackValue::Expr(id));
        }
        "LIST_EXTEND" | "SET_UPDATE" | "DICT_MERGE" | "DICT_UPDATE" => {
            let addend = pop_expr(stack, offset, "extend source")?;
            let container = pop_expr(stack, offset, "extend target")?;
            let merged = match (arena.expr(container).clone(), instr.opcode.meta.mnemonic) {
                (Expr::List(mut items), _) => {
                    items.push(arena.alloc_expr(Expr::Starred(addend)));
                    Expr::List(items)
                }
                (Expr::Set(mut items), _) => {
                    items.push(arena.alloc_expr(Expr::Starred(addend)));
                    Expr::Set(items)
                }
                (Expr::Dict { mut keys, mut values }, _) => {
                    keys.push(None);
                    values.push(addend);
                    Expr::Dict { keys, values }
                }
                (other, _) => other,
            };
            let id = arena.alloc_expr(merged);
            stack.push(StackValue::Expr(id));
        }
        "KW_NAMES" => {
            let names = code.constants.get(arg as usize).and_then(ConstValue::as_str_tuple).unwrap_or_default();
            state.pending_kw_names = Some(names);
        }
        "CALL" | "CALL_FUNCTION" | "PRECALL" => {
            if instr.opcode.meta.mnemonic == "PRECALL" {
                return Ok(());
            }
            let argc = arg as usize;
            let kw_names = state.pending_kw_names.take().unwrap_or_default();
            let positional_count = argc - kw_names.len();
            let mut all_args = Vec::with_capacity(argc);
            for _ in 0..argc {
                all_args.push(pop_expr(stack, offset, "call argument")?);
            }
            all_args.reverse();
            let keywords = all_args
                .split_off(positional_count)
                .into_iter()
                .zip(kw_names)
                .map(|(value, name)| Keyword { name: Some(name), value })
                .collect();
            let func = pop_expr(stack, offset, "callable")?;
            // Drop a PUSH_NULL marker sitting below the callable, if present.
            if let Some(StackValue::Marker(MarkerKind::Null)) = stack.peek(0) {
                stack.pop();
            }
            let id = arena.alloc_expr(Expr::Call { func, args: all_args, keywords });
            stack.push(StackValue::Expr(id));
        }
        "CALL_FUNCTION_KW" => {
            let kw_names = pop_expr(stack, offset, "kwnames tuple")?;
            let names = match arena.expr(kw_names).clone() {
                Expr::Tuple(items) => items
                    .into_iter()
                    .filter_map(|id| match arena.expr(id) {
                        Expr::Literal(Literal::Str(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let argc = arg as usize;
            let positional_count = argc - names.len();
            let mut all_args = Vec::with_capacity(argc);
            for _ in 0..argc {
                all_args.push(pop_expr(stack, offset, "call argument")?);
            }
            all_args.reverse();
            let keywords = all_args
                .split_off(positional_count)
                .into_iter()
                .zip(names)
                .map(|(value, name)| Keyword { name: Some(name), value })
                .collect();
            let func = pop_expr(stack, offset, "callable")?;
            let id = arena.alloc_expr(Expr::Call { func, args: all_args, keywords });
            stack.push(StackValue::Expr(id));
        }
        "CALL_FUNCTION_EX" => {
            let has_kwargs = arg & 1 != 0;
            let kwargs = if has_kwargs { Some(pop_expr(stack, offset, "kwargs dict")?) } else { None };
            let args_iterable = pop_expr(stack, offset, "args iterable")?;
            let func = pop_expr(stack, offset, "callable")?;
            let starred_args = arena.alloc_expr(Expr::Starred(args_iterable));
            let mut keywords = Vec::new();
            if let Some(kwargs) = kwargs {
                keywords.push(Keyword { name: None, value: kwargs });
            }
            let id = arena.alloc_expr(Expr::Call { func, args: vec![starred_args], keywords });
            stack.push(StackValue::Expr(id));
        }
        "COPY" => {
            let depth = arg as usize;
            if let Some(value) = stack.peek(depth.saturating_sub(1)).cloned() {
                stack.push(value);
            } else {
                return Err(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "COPY source" }));
            }
        }
        "SWAP" => {
            let depth = arg as usize;
            if depth == 0 || depth > stack.len() {
                return Err(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "SWAP operand" }));
            }
            let mut buffer = Vec::with_capacity(depth);
            for _ in 0..depth {
                buffer.push(stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "SWAP" }))?);
            }
            let last = depth - 1;
            buffer.swap(0, last);
            for v in buffer.into_iter().rev() {
                stack.push(v);
            }
        }
        "POP_TOP" => {
            let value = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "POP_TOP" }))?;
            if let StackValue::Expr(id) = value {
                stmts.push(Stmt::Expr(id));
            }
        }
        "DUP_TOP" => {
            if let Some(top) = stack.peek(0).cloned() {
                stack.push(top);
            } else {
                return Err(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "DUP_TOP" }));
            }
        }
        "DUP_TOP_TWO" => {
            let a = stack.peek(1).cloned().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "DUP_TOP_TWO" }))?;
            let b = stack.peek(0).cloned().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "DUP_TOP_TWO" }))?;
            stack.push(a);
            stack.push(b);
        }
        "ROT_TWO" => {
            let a = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_TWO" }))?;
            let b = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_TWO" }))?;
            stack.push(a);
            stack.push(b);
        }
        "ROT_THREE" => {
            let a = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_THREE" }))?;
            let b = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_THREE" }))?;
            let c = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_THREE" }))?;
            stack.push(a);
            stack.push(c);
            stack.push(b);
        }
        "ROT_FOUR" => {
            let a = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_FOUR" }))?;
            let b = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_FOUR" }))?;
            let c = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_FOUR" }))?;
            let d = stack.pop().ok_or(SimFailure::Hard(HardSimError::StackUnderflow { offset, what: "ROT_FOUR" }))?;
            stack.push(a);
            stack.push(d);
            stack.push(c);
            stack.push(b);
        }
        "GET_ITER" | "GET_AITER" => {
            let _iterable = pop_expr(stack, offset, "iterable")?;
            stack.push(StackValue::Marker(MarkerKind::Iterator));
        }
        "BEFORE_WITH" | "SETUP_WITH" => {
            let _ctx = pop_expr(stack, offset, "context manager")?;
            stack.push(StackValue::Marker(MarkerKind::WithBlock));
        }
        "RETURN_VALUE" => {
            let value = pop_expr(stack, offset, "return value")?;
            stmts.push(Stmt::Return(Some(value)));
        }
        "RETURN_CONST" => {
            let value = code.constants.get(arg as usize).ok_or(SimFailure::Hard(HardSimError::NotAnExpression { offset }))?;
            let id = const_to_expr(arena, value);
            stmts.push(Stmt::Return(Some(id)));
        }
        "TO_BOOL" => {
            // Peeks the condition without consuming it; no stack effect for our purposes.
        }
        "FOR_ITER" | "JUMP_FORWARD" | "JUMP_BACKWARD" | "JUMP_ABSOLUTE" | "POP_JUMP_IF_TRUE" | "POP_JUMP_IF_FALSE"
        | "POP_JUMP_FORWARD_IF_TRUE" | "POP_JUMP_FORWARD_IF_FALSE" | "JUMP_IF_TRUE_OR_POP" | "JUMP_IF_FALSE_OR_POP" => {
            // Branching opcodes never mutate the stack within simulation (§4.F);
            // the driver re-seeds each successor's stack_in.
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeobject::{CodeFlags, CodeObject};
    use crate::decode::decode;

    fn code_with_consts(consts: Vec<ConstValue>) -> CodeObject {
        CodeObject {
            argcount: 2,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            stacksize: 4,
            firstlineno: 1,
            bytecode: Vec::new(),
            constants: consts,
            names: Vec::new(),
            varnames: vec!["a".into(), "b".into()],
            freevars: Vec::new(),
            cellvars: Vec::new(),
            linetable: Vec::new(),
            exceptiontable: Vec::new(),
            name: "f".into(),
            qualname: "f".into(),
        }
    }

    #[test]
    fn linear_add_produces_binop_return() {
        let code = code_with_consts(Vec::new());
        let bytes = vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0];
        let version = PyVersion::new(3, 12);
        let out = decode(&bytes, version);
        assert!(out.error.is_none());
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let mut stmts = Vec::new();
        simulate_straight_line(&out.instructions, &code, version, &mut arena, &mut stack, &mut stmts).unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Return(Some(id)) => {
                assert!(matches!(arena.expr(*id), Expr::BinOp { op: BinOp::Add, .. }));
            }
            other => panic!("expected a return statement, got {other:?}"),
        }
    }

    #[test]
    fn store_fast_emits_assignment() {
        let code = code_with_consts(vec![ConstValue::Int(41)]);
        // LOAD_CONST 0, STORE_FAST 0
        let bytes = vec![100, 0, 125, 0];
        let version = PyVersion::new(3, 8);
        let out = decode(&bytes, version);
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let mut stmts = Vec::new();
        simulate_straight_line(&out.instructions, &code, version, &mut arena, &mut stack, &mut stmts).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Stmt::Assign { .. }));
    }

    #[test]
    fn unpack_sequence_then_store_fast_store_fast_assigns_in_source_order() {
        let mut code = code_with_consts(Vec::new());
        code.varnames = vec!["x".into(), "a".into(), "b".into()];
        // LOAD_FAST 0 (x), UNPACK_SEQUENCE 2, STORE_FAST_STORE_FAST (a=hi=1, b=lo=2)
        let bytes = vec![124, 0, 92, 2, 0, 0, 175, 18];
        let version = PyVersion::new(3, 12);
        let out = decode(&bytes, version);
        assert!(out.error.is_none(), "{:?}", out.error);
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let mut stmts = Vec::new();
        simulate_straight_line(&out.instructions, &code, version, &mut arena, &mut stack, &mut stmts).unwrap();
        assert_eq!(stmts.len(), 2);
        match (&stmts[0], &stmts[1]) {
            (Stmt::Assign { targets: t0, value: v0 }, Stmt::Assign { targets: t1, value: v1 }) => {
                assert_eq!(t0, &vec![Target::Name("a".into())]);
                assert_eq!(t1, &vec![Target::Name("b".into())]);
                assert!(matches!(arena.expr(*v0), Expr::Subscript { .. }));
                match arena.expr(*v0) {
                    Expr::Subscript { index, .. } => assert!(matches!(arena.expr(*index), Expr::Literal(Literal::Int(0)))),
                    _ => unreachable!(),
                }
                match arena.expr(*v1) {
                    Expr::Subscript { index, .. } => assert!(matches!(arena.expr(*index), Expr::Literal(Literal::Int(1)))),
                    _ => unreachable!(),
                }
            }
            other => panic!("expected two assignments, got {other:?}"),
        }
    }

    #[test]
    fn match_sequence_peeks_subject_without_popping_it() {
        let code = code_with_consts(Vec::new());
        // LOAD_FAST 0, MATCH_SEQUENCE
        let bytes = vec![124, 0, 33, 0];
        let version = PyVersion::new(3, 12);
        let out = decode(&bytes, version);
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let mut stmts = Vec::new();
        simulate_straight_line(&out.instructions, &code, version, &mut arena, &mut stack, &mut stmts).unwrap();
        assert_eq!(stack.len(), 2, "subject stays under the match result");
    }
}
