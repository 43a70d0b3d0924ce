//! Arena allocation for AST nodes (§9 Design Notes).
//!
//! All expression/statement nodes live in one arena released at the end of
//! a decompilation; stack values hold ids into the arena rather than
//! pointers, so there is no ownership cycle and no borrow-checker fight
//! between the CFG, the stack simulator, and the tree they build.

use crate::ast::{Expr, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

/// Owns every expression and statement node produced while decompiling one
/// code object. Dropped as a unit when the decompilation completes.
#[derive(Debug, Default)]
pub struct Arena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    #[must_use]
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn allocated_ids_round_trip() {
        let mut arena = Arena::new();
        let id = arena.alloc_expr(Expr::Literal(Literal::Int(7)));
        assert!(matches!(arena.expr(id), Expr::Literal(Literal::Int(7))));
    }

    #[test]
    fn ids_are_stable_across_further_allocations() {
        let mut arena = Arena::new();
        let first = arena.alloc_expr(Expr::Literal(Literal::Bool(true)));
        let _second = arena.alloc_expr(Expr::Literal(Literal::Bool(false)));
        assert!(matches!(arena.expr(first), Expr::Literal(Literal::Bool(true))));
    }
}
