//! Component H (printer half): renders an [`Arena`] + statement list back
//! to Python source text.
//!
//! One `match` per node kind, each arm a single `write!`/`push_str` — no
//! node kind is ever handled in more than one place (§9 design note).
//! A module only opens with `from __future__ import annotations` when the
//! code object it was decompiled from actually carries `CO_FUTURE_ANNOTATIONS`
//! (§6); the decompiler never injects syntax the source didn't have.

use std::fmt::Write as _;

use crate::arena::{Arena, ExprId};
use crate::ast::{BinOp, BoolOp, CmpOp, Expr, FStringPart, Literal, MatchPattern, Stmt, Target, UnaryOp};

const INDENT: &str = "    ";

/// Prints a full module: the `__future__` import, if `future_annotations` is
/// set, followed by `stmts`.
#[must_use]
pub fn print_module(arena: &Arena, stmts: &[Stmt], future_annotations: bool) -> String {
    let mut out = String::new();
    if future_annotations {
        out.push_str("from __future__ import annotations\n");
    }
    if stmts.is_empty() {
        return out;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    print_block(arena, stmts, 0, &mut out);
    out
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn print_block(arena: &Arena, stmts: &[Stmt], level: usize, out: &mut String) {
    for stmt in stmts {
        print_stmt(arena, stmt, level, out);
    }
}

fn print_stmt(arena: &Arena, stmt: &Stmt, level: usize, out: &mut String) {
    indent(level, out);
    match stmt {
        Stmt::Pass => out.push_str("pass\n"),
        Stmt::Expr(id) => {
            print_expr(arena, *id, out, 0);
            out.push('\n');
        }
        Stmt::Return(value) => {
            out.push_str("return");
            if let Some(id) = value {
                out.push(' ');
                print_expr(arena, *id, out, 0);
            }
            out.push('\n');
        }
        Stmt::Assign { targets, value } => {
            for target in targets {
                print_target(arena, target, out);
                out.push_str(" = ");
            }
            print_expr(arena, *value, out, 0);
            out.push('\n');
        }
        Stmt::AugAssign { target, op, value } => {
            print_target(arena, target, out);
            let _ = write!(out, " {}= ", binop_symbol(*op));
            print_expr(arena, *value, out, 0);
            out.push('\n');
        }
        Stmt::If { test, body, orelse } => {
            out.push_str("if ");
            print_expr(arena, *test, out, 0);
            out.push_str(":\n");
            print_block(arena, body, level + 1, out);
            print_orelse(arena, orelse, level, out);
        }
        Stmt::While { test, body, orelse } => {
            out.push_str("while ");
            print_expr(arena, *test, out, 0);
            out.push_str(":\n");
            print_block(arena, body, level + 1, out);
            print_orelse(arena, orelse, level, out);
        }
        Stmt::For { target, iter, body, orelse } => {
            out.push_str("for ");
            print_target(arena, target, out);
            out.push_str(" in ");
            print_expr(arena, *iter, out, 0);
            out.push_str(":\n");
            print_block(arena, body, level + 1, out);
            print_orelse(arena, orelse, level, out);
        }
        Stmt::Try { body, handlers, orelse, finalbody } => {
            out.push_str("try:\n");
            print_block(arena, body, level + 1, out);
            for handler in handlers {
                indent(level, out);
                out.push_str("except");
                if let Some(exc_type) = handler.exc_type {
                    out.push(' ');
                    print_expr(arena, exc_type, out, 0);
                    if let Some(name) = &handler.name {
                        let _ = write!(out, " as {name}");
                    }
                }
                out.push_str(":\n");
                print_block(arena, &handler.body, level + 1, out);
            }
            if !orelse.is_empty() {
                indent(level, out);
                out.push_str("else:\n");
                print_block(arena, orelse, level + 1, out);
            }
            if !finalbody.is_empty() {
                indent(level, out);
                out.push_str("finally:\n");
                print_block(arena, finalbody, level + 1, out);
            }
        }
        Stmt::With { items, body, is_async } => {
            out.push_str(if *is_async { "async with " } else { "with " });
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(arena, item.context_expr, out, 0);
                if let Some(target) = &item.optional_vars {
                    out.push_str(" as ");
                    print_target(arena, target, out);
                }
            }
            out.push_str(":\n");
            print_block(arena, body, level + 1, out);
        }
        Stmt::Match { subject, cases } => {
            out.push_str("match ");
            print_expr(arena, *subject, out, 0);
            out.push_str(":\n");
            for case in cases {
                indent(level + 1, out);
                out.push_str("case ");
                print_pattern(arena, &case.pattern, out);
                if let Some(guard) = case.guard {
                    out.push_str(" if ");
                    print_expr(arena, guard, out, 0);
                }
                out.push_str(":\n");
                print_block(arena, &case.body, level + 2, out);
            }
        }
        Stmt::Break => out.push_str("break\n"),
        Stmt::Continue => out.push_str("continue\n"),
        Stmt::Raise { exc, cause } => {
            out.push_str("raise");
            if let Some(exc) = exc {
                out.push(' ');
                print_expr(arena, *exc, out, 0);
                if let Some(cause) = cause {
                    out.push_str(" from ");
                    print_expr(arena, *cause, out, 0);
                }
            }
            out.push('\n');
        }
        Stmt::Assert { test, msg } => {
            out.push_str("assert ");
            print_expr(arena, *test, out, 0);
            if let Some(msg) = msg {
                out.push_str(", ");
                print_expr(arena, *msg, out, 0);
            }
            out.push('\n');
        }
        Stmt::Global(names) => {
            let _ = write!(out, "global {}\n", names.join(", "));
        }
        Stmt::Nonlocal(names) => {
            let _ = write!(out, "nonlocal {}\n", names.join(", "));
        }
        Stmt::Delete(targets) => {
            out.push_str("del ");
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_target(arena, target, out);
            }
            out.push('\n');
        }
        Stmt::FunctionDef(def) => {
            if def.is_async {
                out.push_str("async ");
            }
            let _ = write!(out, "def {}(", def.name);
            let mut first = true;
            for param in &def.params {
                if !first {
                    out.push_str(", ");
                }
                out.push_str(param);
                first = false;
            }
            if let Some(vararg) = &def.vararg {
                if !first {
                    out.push_str(", ");
                }
                let _ = write!(out, "*{vararg}");
                first = false;
            }
            for kwonly in &def.kwonly {
                if !first {
                    out.push_str(", ");
                }
                out.push_str(kwonly);
                first = false;
            }
            if let Some(kwarg) = &def.kwarg {
                if !first {
                    out.push_str(", ");
                }
                let _ = write!(out, "**{kwarg}");
            }
            out.push_str("):\n");
            if let Some(doc) = &def.docstring {
                indent(level + 1, out);
                let _ = write!(out, "{:?}\n", doc);
            }
            print_block(arena, &def.body, level + 1, out);
        }
        Stmt::ClassDef { name, bases, body } => {
            let _ = write!(out, "class {name}");
            if !bases.is_empty() {
                out.push('(');
                for (i, base) in bases.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    print_expr(arena, *base, out, 0);
                }
                out.push(')');
            }
            out.push_str(":\n");
            print_block(arena, body, level + 1, out);
        }
        Stmt::FailedComment(reason) => {
            let _ = write!(out, "# {reason}\n");
        }
    }
}

fn print_orelse(arena: &Arena, orelse: &[Stmt], level: usize, out: &mut String) {
    if orelse.is_empty() {
        return;
    }
    // An `elif` chain is just a single nested `If` inside `orelse`; print
    // it as `elif` rather than nesting an `else: if ...` block.
    if let [Stmt::If { test, body, orelse: inner_orelse }] = orelse {
        indent(level, out);
        out.push_str("elif ");
        print_expr(arena, *test, out, 0);
        out.push_str(":\n");
        print_block(arena, body, level + 1, out);
        print_orelse(arena, inner_orelse, level, out);
        return;
    }
    indent(level, out);
    out.push_str("else:\n");
    print_block(arena, orelse, level + 1, out);
}

fn print_target(arena: &Arena, target: &Target, out: &mut String) {
    match target {
        Target::Name(name) => out.push_str(name),
        Target::Attribute { value, attr } => {
            print_expr(arena, *value, out, 0);
            let _ = write!(out, ".{attr}");
        }
        Target::Subscript { value, index } => {
            print_expr(arena, *value, out, 0);
            out.push('[');
            print_expr(arena, *index, out, 0);
            out.push(']');
        }
        Target::Tuple(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_target(arena, item, out);
            }
        }
        Target::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_target(arena, item, out);
            }
            out.push(']');
        }
        Target::Starred(inner) => {
            out.push('*');
            print_target(arena, inner, out);
        }
    }
}

fn print_pattern(arena: &Arena, pattern: &MatchPattern, out: &mut String) {
    match pattern {
        MatchPattern::Wildcard => out.push('_'),
        MatchPattern::Value(id) => print_expr(arena, *id, out, 0),
        MatchPattern::Capture(name) => out.push_str(name),
        MatchPattern::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_pattern(arena, item, out);
            }
            out.push(']');
        }
        MatchPattern::Mapping { keys, patterns, rest } => {
            out.push('{');
            for (i, (key, pat)) in keys.iter().zip(patterns).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(arena, *key, out, 0);
                out.push_str(": ");
                print_pattern(arena, pat, out);
            }
            if let Some(rest) = rest {
                if !keys.is_empty() {
                    out.push_str(", ");
                }
                let _ = write!(out, "**{rest}");
            }
            out.push('}');
        }
        MatchPattern::Class { ty, patterns, kwd_patterns } => {
            print_expr(arena, *ty, out, 0);
            out.push('(');
            let mut first = true;
            for pat in patterns {
                if !first {
                    out.push_str(", ");
                }
                print_pattern(arena, pat, out);
                first = false;
            }
            for (name, pat) in kwd_patterns {
                if !first {
                    out.push_str(", ");
                }
                let _ = write!(out, "{name}=");
                print_pattern(arena, pat, out);
                first = false;
            }
            out.push(')');
        }
        MatchPattern::Or(alts) => {
            for (i, alt) in alts.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                print_pattern(arena, alt, out);
            }
        }
    }
}

fn binop_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::LShift => "<<",
        BinOp::RShift => ">>",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::MatMul => "@",
    }
}

fn cmpop_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::NotEq => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        CmpOp::Is => "is",
        CmpOp::IsNot => "is not",
        CmpOp::In => "in",
        CmpOp::NotIn => "not in",
    }
}

/// Prints `id`, wrapping in parens when `parent_precedence` requires it
/// (only `BinOp` carries meaningful precedence; every other expression
/// kind binds tighter than any operator and never needs parens here).
fn print_expr(arena: &Arena, id: ExprId, out: &mut String, parent_precedence: u8) {
    match arena.expr(id) {
        Expr::Literal(lit) => print_literal(lit, out),
        Expr::Name(name) => out.push_str(name),
        Expr::Attribute { value, attr } => {
            print_expr(arena, *value, out, 0);
            let _ = write!(out, ".{attr}");
        }
        Expr::Subscript { value, index } => {
            print_expr(arena, *value, out, 0);
            out.push('[');
            print_expr(arena, *index, out, 0);
            out.push(']');
        }
        Expr::Call { func, args, keywords } => {
            print_expr(arena, *func, out, 0);
            out.push('(');
            let mut first = true;
            for arg in args {
                if !first {
                    out.push_str(", ");
                }
                print_expr(arena, *arg, out, 0);
                first = false;
            }
            for kw in keywords {
                if !first {
                    out.push_str(", ");
                }
                match &kw.name {
                    Some(name) => {
                        let _ = write!(out, "{name}=");
                        print_expr(arena, kw.value, out, 0);
                    }
                    None => {
                        out.push_str("**");
                        print_expr(arena, kw.value, out, 0);
                    }
                }
                first = false;
            }
            out.push(')');
        }
        Expr::BinOp { left, op, right } => {
            let prec = op.precedence();
            let needs_parens = prec < parent_precedence;
            if needs_parens {
                out.push('(');
            }
            print_expr(arena, *left, out, prec);
            let _ = write!(out, " {} ", binop_symbol(*op));
            print_expr(arena, *right, out, prec + 1);
            if needs_parens {
                out.push(')');
            }
        }
        Expr::UnaryOp { op, operand } => {
            out.push_str(match op {
                UnaryOp::Not => "not ",
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
            });
            print_expr(arena, *operand, out, 7);
        }
        Expr::Compare { left, rest } => {
            print_expr(arena, *left, out, 0);
            for (op, expr) in rest {
                let _ = write!(out, " {} ", cmpop_symbol(*op));
                print_expr(arena, *expr, out, 0);
            }
        }
        Expr::BoolOp { op, values } => {
            let sep = match op {
                BoolOp::And => " and ",
                BoolOp::Or => " or ",
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(sep);
                }
                print_expr(arena, *value, out, 0);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            print_expr(arena, *body, out, 0);
            out.push_str(" if ");
            print_expr(arena, *test, out, 0);
            out.push_str(" else ");
            print_expr(arena, *orelse, out, 0);
        }
        Expr::List(items) => print_sequence(arena, items, '[', ']', out),
        Expr::Tuple(items) => {
            if items.len() == 1 {
                out.push('(');
                print_expr(arena, items[0], out, 0);
                out.push_str(",)");
            } else {
                print_sequence(arena, items, '(', ')', out);
            }
        }
        Expr::Set(items) => {
            if items.is_empty() {
                out.push_str("set()");
            } else {
                print_sequence(arena, items, '{', '}', out);
            }
        }
        Expr::Dict { keys, values } => {
            out.push('{');
            for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match key {
                    Some(key) => {
                        print_expr(arena, *key, out, 0);
                        out.push_str(": ");
                        print_expr(arena, *value, out, 0);
                    }
                    None => {
                        out.push_str("**");
                        print_expr(arena, *value, out, 0);
                    }
                }
            }
            out.push('}');
        }
        Expr::FString(parts) => {
            out.push('f');
            out.push('"');
            for part in parts {
                match part {
                    FStringPart::Literal(text) => out.push_str(&text.replace('{', "{{").replace('}', "}}")),
                    FStringPart::Expr { value, conversion, format_spec } => {
                        out.push('{');
                        print_expr(arena, *value, out, 0);
                        if let Some(conv) = conversion {
                            let _ = write!(out, "!{conv}");
                        }
                        if let Some(spec) = format_spec {
                            let _ = write!(out, ":{spec}");
                        }
                        out.push('}');
                    }
                }
            }
            out.push('"');
        }
        Expr::Lambda { params, body } => {
            let _ = write!(out, "lambda {}: ", params.join(", "));
            print_expr(arena, *body, out, 0);
        }
        Expr::Yield(value) => {
            out.push_str("yield");
            if let Some(value) = value {
                out.push(' ');
                print_expr(arena, *value, out, 0);
            }
        }
        Expr::YieldFrom(value) => {
            out.push_str("yield from ");
            print_expr(arena, *value, out, 0);
        }
        Expr::Await(value) => {
            out.push_str("await ");
            print_expr(arena, *value, out, 0);
        }
        Expr::Starred(value) => {
            out.push('*');
            print_expr(arena, *value, out, 0);
        }
        Expr::NamedExpr { target, value } => {
            let _ = write!(out, "({target} := ");
            print_expr(arena, *value, out, 0);
            out.push(')');
        }
        Expr::ListComp { element, generators } => print_comprehension(arena, *element, generators, '[', ']', out),
        Expr::SetComp { element, generators } => print_comprehension(arena, *element, generators, '{', '}', out),
        Expr::GeneratorExp { element, generators } => print_comprehension(arena, *element, generators, '(', ')', out),
        Expr::DictComp { key, value, generators } => {
            out.push('{');
            print_expr(arena, *key, out, 0);
            out.push_str(": ");
            print_expr(arena, *value, out, 0);
            print_generator_clauses(arena, generators, out);
            out.push('}');
        }
        Expr::Slice { lower, upper, step } => {
            if let Some(lower) = lower {
                print_expr(arena, *lower, out, 0);
            }
            out.push(':');
            if let Some(upper) = upper {
                print_expr(arena, *upper, out, 0);
            }
            if let Some(step) = step {
                out.push(':');
                print_expr(arena, *step, out, 0);
            }
        }
    }
}

fn print_sequence(arena: &Arena, items: &[ExprId], open: char, close: char, out: &mut String) {
    out.push(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_expr(arena, *item, out, 0);
    }
    out.push(close);
}

fn print_comprehension(arena: &Arena, element: ExprId, generators: &[crate::ast::Comprehension], open: char, close: char, out: &mut String) {
    out.push(open);
    print_expr(arena, element, out, 0);
    print_generator_clauses(arena, generators, out);
    out.push(close);
}

fn print_generator_clauses(arena: &Arena, generators: &[crate::ast::Comprehension], out: &mut String) {
    for comp in generators {
        out.push_str(if comp.is_async { " async for " } else { " for " });
        print_target(arena, &comp.target, out);
        out.push_str(" in ");
        print_expr(arena, comp.iter, out, 0);
        for cond in &comp.ifs {
            out.push_str(" if ");
            print_expr(arena, *cond, out, 0);
        }
    }
}

fn print_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::None => out.push_str("None"),
        Literal::Ellipsis => out.push_str("..."),
        Literal::Bool(true) => out.push_str("True"),
        Literal::Bool(false) => out.push_str("False"),
        Literal::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Literal::Float(bits) => {
            let value = f64::from_bits(*bits);
            let _ = write!(out, "{value}");
        }
        Literal::Str(s) => {
            let _ = write!(out, "{s:?}");
        }
        Literal::Bytes(bytes) => {
            out.push('b');
            let as_str: String = bytes.iter().map(|&b| b as char).collect();
            let _ = write!(out, "{as_str:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn return_statement_prints_its_expression() {
        let mut arena = Arena::new();
        let id = arena.alloc_expr(Expr::Literal(Literal::Int(42)));
        let module = print_module(&arena, &[Stmt::Return(Some(id))], false);
        assert!(module.contains("return 42"));
    }

    #[test]
    fn if_else_prints_elif_for_single_nested_if() {
        let mut arena = Arena::new();
        let cond = arena.alloc_expr(Expr::Name("x".into()));
        let inner_cond = arena.alloc_expr(Expr::Name("y".into()));
        let stmt = Stmt::If {
            test: cond,
            body: vec![Stmt::Pass],
            orelse: vec![Stmt::If { test: inner_cond, body: vec![Stmt::Pass], orelse: Vec::new() }],
        };
        let module = print_module(&arena, &[stmt], false);
        assert!(module.contains("elif y:"));
        assert!(!module.contains("else:\n    if"));
    }

    #[test]
    fn binop_parenthesizes_lower_precedence_subexpression() {
        let mut arena = Arena::new();
        let a = arena.alloc_expr(Expr::Name("a".into()));
        let b = arena.alloc_expr(Expr::Name("b".into()));
        let c = arena.alloc_expr(Expr::Name("c".into()));
        let inner = arena.alloc_expr(Expr::BinOp { left: a, op: BinOp::Add, right: b });
        let outer = arena.alloc_expr(Expr::BinOp { left: inner, op: BinOp::Mul, right: c });
        let mut out = String::new();
        print_expr(&arena, outer, &mut out, 0);
        assert_eq!(out, "(a + b) * c");
    }
}
