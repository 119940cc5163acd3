//! Constant expression evaluator (SPEC_FULL.md §4.4): array sizes, case
//! labels, enum values, initializer values, and bit-field widths all funnel
//! through this one evaluator rather than the parser's narrower
//! `fold_const_i64` (which only ever sees array dimensions and the like,
//! before enum constants exist).

use crate::ast::{Ast, BinaryOp, Expr, ExprId, UnaryOp};
use crate::diagnostics::{DiagnosticSink, Kind};
use std::collections::HashMap;
use std::path::Path;

pub struct ConstCtx<'a> {
    pub word_size: u32,
    pub enum_values: &'a HashMap<String, i64>,
}

/// Evaluates `id` as an integer constant expression, diagnosing (and
/// substituting 0) at the first non-constant subexpression or division by
/// zero rather than aborting the whole evaluation.
pub fn eval_const(
    ast: &Ast,
    id: ExprId,
    ctx: &ConstCtx,
    diag: &mut DiagnosticSink,
    file: &Path,
    line: usize,
    column: usize,
) -> i64 {
    match ast.expr(id) {
        Expr::IntLiteral { value, .. } => *value,
        Expr::CharLiteral(c) => *c as i64,
        Expr::FloatLiteral { value, .. } => *value as i64,
        Expr::Ident(name) => match ctx.enum_values.get(name) {
            Some(v) => *v,
            None => {
                diag.error(Kind::Semantic, file, line, column, format!("'{name}' is not a constant expression"));
                0
            }
        },
        Expr::Unary { op, operand } => {
            let v = eval_const(ast, *operand, ctx, diag, file, line, column);
            match op {
                UnaryOp::Neg => v.wrapping_neg(),
                UnaryOp::BitNot => !v,
                UnaryOp::Not => (v == 0) as i64,
                UnaryOp::Plus => v,
                _ => {
                    diag.error(Kind::Semantic, file, line, column, "operator is not valid in a constant expression");
                    0
                }
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_const(ast, *lhs, ctx, diag, file, line, column);
            let r = eval_const(ast, *rhs, ctx, diag, file, line, column);
            match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        diag.error(Kind::Semantic, file, line, column, "division by zero in constant expression");
                        0
                    } else {
                        l.wrapping_div(r)
                    }
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        diag.error(Kind::Semantic, file, line, column, "division by zero in constant expression");
                        0
                    } else {
                        l.wrapping_rem(r)
                    }
                }
                BinaryOp::Shl => l.wrapping_shl(r as u32),
                BinaryOp::Shr => l.wrapping_shr(r as u32),
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                BinaryOp::BitXor => l ^ r,
                BinaryOp::Lt => (l < r) as i64,
                BinaryOp::Gt => (l > r) as i64,
                BinaryOp::Le => (l <= r) as i64,
                BinaryOp::Ge => (l >= r) as i64,
                BinaryOp::Eq => (l == r) as i64,
                BinaryOp::Ne => (l != r) as i64,
                BinaryOp::LogAnd => ((l != 0) && (r != 0)) as i64,
                BinaryOp::LogOr => ((l != 0) || (r != 0)) as i64,
                BinaryOp::Comma => r,
            }
        }
        Expr::Ternary { cond, then_branch, else_branch } => {
            if eval_const(ast, *cond, ctx, diag, file, line, column) != 0 {
                eval_const(ast, *then_branch, ctx, diag, file, line, column)
            } else {
                eval_const(ast, *else_branch, ctx, diag, file, line, column)
            }
        }
        Expr::SizeofType(ty) => ty.size_of(ctx.word_size) as i64,
        Expr::SizeofExpr(_) => {
            diag.error(Kind::Semantic, file, line, column, "sizeof of an expression cannot appear in this constant context");
            0
        }
        Expr::Cast { operand, .. } => eval_const(ast, *operand, ctx, diag, file, line, column),
        _ => {
            diag.error(Kind::Semantic, file, line, column, "expression is not a compile-time constant");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crate::types::Type;
    use std::path::PathBuf;

    fn ctx<'a>(enum_values: &'a HashMap<String, i64>) -> ConstCtx<'a> {
        ConstCtx { word_size: 8, enum_values }
    }

    #[test]
    fn arithmetic_folds_without_diagnostics() {
        let mut ast = Ast::new();
        let two = ast.alloc_expr(Expr::IntLiteral { value: 2, ty: Type::Int { unsigned: false } });
        let three = ast.alloc_expr(Expr::IntLiteral { value: 3, ty: Type::Int { unsigned: false } });
        let mul = ast.alloc_expr(Expr::Binary { op: BinaryOp::Mul, lhs: two, rhs: three });
        let enum_values = HashMap::new();
        let mut diag = DiagnosticSink::new();
        let v = eval_const(&ast, mul, &ctx(&enum_values), &mut diag, &PathBuf::from("t.c"), 0, 0);
        assert_eq!(v, 6);
        assert!(diag.is_empty());
    }

    #[test]
    fn division_by_zero_diagnoses_and_yields_zero() {
        let mut ast = Ast::new();
        let one = ast.alloc_expr(Expr::IntLiteral { value: 1, ty: Type::Int { unsigned: false } });
        let zero = ast.alloc_expr(Expr::IntLiteral { value: 0, ty: Type::Int { unsigned: false } });
        let div = ast.alloc_expr(Expr::Binary { op: BinaryOp::Div, lhs: one, rhs: zero });
        let enum_values = HashMap::new();
        let mut diag = DiagnosticSink::new();
        let v = eval_const(&ast, div, &ctx(&enum_values), &mut diag, &PathBuf::from("t.c"), 0, 0);
        assert_eq!(v, 0);
        assert!(diag.has_errors());
    }

    #[test]
    fn enum_constant_resolves_through_table() {
        let mut ast = Ast::new();
        let id = ast.alloc_expr(Expr::Ident("RED".to_string()));
        let mut enum_values = HashMap::new();
        enum_values.insert("RED".to_string(), 2);
        let mut diag = DiagnosticSink::new();
        let v = eval_const(&ast, id, &ctx(&enum_values), &mut diag, &PathBuf::from("t.c"), 0, 0);
        assert_eq!(v, 2);
        assert!(diag.is_empty());
    }
}
