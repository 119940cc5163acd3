//! Arena-indexed abstract syntax tree (SPEC_FULL.md §3 Data Model).
//!
//! Every node is addressed by a dense `Id<T>` rather than a boxed pointer,
//! generalizing the reference implementation's manual tree ownership; see
//! `arena.rs`.

use crate::arena::{Arena, Id};
use crate::types::Type;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: usize,
    pub column: usize,
}

pub type ExprId = Id<Expr>;
pub type StmtId = Id<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Plus,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod,
    Shl, Shr, BitAnd, BitOr, BitXor,
    Lt, Gt, Le, Ge, Eq, Ne,
    LogAnd, LogOr,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign, Add, Sub, Mul, Div, Mod, Shl, Shr, BitAnd, BitOr, BitXor,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral { value: i64, ty: Type },
    FloatLiteral { value: f64, ty: Type },
    /// A number with an `i`/`j` imaginary suffix: `2i`, `3.0j`. `value` is
    /// the imaginary component; the real component is always zero, as for
    /// any purely-imaginary C constant.
    ComplexLiteral { value: f64, ty: Type },
    StringLiteral(String),
    WideStringLiteral(Vec<u32>),
    CharLiteral(char),
    WideCharLiteral(u32),
    Ident(String),
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    Ternary { cond: ExprId, then_branch: ExprId, else_branch: ExprId },
    Assign { op: AssignOp, target: ExprId, value: ExprId },
    Index { base: ExprId, index: ExprId },
    Member { base: ExprId, field: String, arrow: bool },
    SizeofExpr(ExprId),
    SizeofType(Type),
    Call { callee: ExprId, args: Vec<ExprId> },
    Cast { ty: Type, operand: ExprId },
}

#[derive(Debug, Clone)]
pub enum Initializer {
    Expr(ExprId),
    List(Vec<Initializer>),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(ExprId),
    Return(Option<ExprId>),
    VarDecl {
        name: String,
        ty: Type,
        init: Option<Initializer>,
        storage: Storage,
    },
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    DoWhile {
        body: StmtId,
        cond: ExprId,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        body: StmtId,
    },
    Switch {
        cond: ExprId,
        body: StmtId,
    },
    Case {
        value: i64,
        body: StmtId,
    },
    Default(StmtId),
    Break,
    Continue,
    Label {
        name: String,
        body: StmtId,
    },
    Goto(String),
    Typedef {
        name: String,
        ty: Type,
    },
    Block(Vec<StmtId>),
    StaticAssert {
        cond: ExprId,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Auto,
    Static,
    Register,
    Extern,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Func {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub is_inline: bool,
    pub is_static: bool,
    pub body: Option<StmtId>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub enum Glob {
    Func(Func),
    Typedef { name: String, ty: Type },
    StructDecl(Rc<crate::types::Aggregate>),
    UnionDecl(Rc<crate::types::Aggregate>),
    EnumDecl { tag: String, variants: Vec<(String, Option<ExprId>)> },
    GlobalVar {
        name: String,
        ty: Type,
        init: Option<Initializer>,
        storage: Storage,
    },
    StaticAssert {
        cond: ExprId,
        message: String,
    },
}

/// Owns every expression and statement node allocated while parsing one
/// translation unit, plus the top-level declaration list.
#[derive(Debug, Default)]
pub struct Ast {
    pub exprs: Arena<Expr>,
    pub stmts: Arena<Stmt>,
    pub globals: Vec<Glob>,
    pub locs: std::collections::HashMap<u32, (Rc<PathBuf>, SourceLoc)>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.alloc(stmt)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        self.exprs.get(id)
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        self.stmts.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_allocation_round_trips() {
        let mut ast = Ast::new();
        let lit = ast.alloc_expr(Expr::IntLiteral { value: 42, ty: Type::Int { unsigned: false } });
        match ast.expr(lit) {
            Expr::IntLiteral { value, .. } => assert_eq!(*value, 42),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn statements_reference_expressions_by_id() {
        let mut ast = Ast::new();
        let cond = ast.alloc_expr(Expr::IntLiteral { value: 1, ty: Type::Int { unsigned: false } });
        let then_block = ast.alloc_stmt(Stmt::Block(vec![]));
        let if_stmt = ast.alloc_stmt(Stmt::If { cond, then_branch: then_block, else_branch: None });
        match ast.stmt(if_stmt) {
            Stmt::If { cond: c, .. } => assert_eq!(*c, cond),
            other => panic!("unexpected node {other:?}"),
        }
    }
}
