//! AST to IR lowering (SPEC_FULL.md §4.4).
//!
//! Walks the AST once, maintaining the variable/typedef scope table and the
//! function/tag scope table described by `SymbolTable`, plus a per-function
//! label table mapping user labels to generated IR labels and a stack of
//! enclosing loop/switch break-continue targets threaded explicitly through
//! the recursion (never recovered from control-flow context after the fact).

use crate::ast::{Ast, AssignOp, BinaryOp, Expr, ExprId, Func, Glob, Initializer, Stmt, StmtId, Storage, UnaryOp};
use crate::diagnostics::Kind;
use crate::ir::{IrBuilder, Op, ValueId};
use crate::sema::constexpr::{eval_const, ConstCtx};
use crate::session::Session;
use crate::symbol::{Symbol, SymbolKind, SymbolTable};
use crate::types::{Field, Type};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

struct LoopLabels {
    break_label: String,
    continue_label: Option<String>,
}

pub struct Lowerer<'s> {
    session: &'s mut Session,
    ast: Ast,
    ir: IrBuilder,
    symbols: SymbolTable,
    enum_values: HashMap<String, i64>,
    word_size: u32,
    file: PathBuf,
    loop_labels: Vec<LoopLabels>,
    switch_labels: Vec<HashMap<u32, String>>,
    label_scope: HashMap<String, String>,
}

/// Lowers one fully parsed translation unit into its IR form.
pub fn lower_translation_unit(session: &mut Session, ast: Ast) -> IrBuilder {
    Lowerer::new(session, ast).lower()
}

impl<'s> Lowerer<'s> {
    pub fn new(session: &'s mut Session, ast: Ast) -> Self {
        let word_size = session.config.target.word_size();
        let file = session.base_file.clone().unwrap_or_default();
        Lowerer {
            session,
            ast,
            ir: IrBuilder::new(),
            symbols: SymbolTable::new(),
            enum_values: HashMap::new(),
            word_size,
            file,
            loop_labels: Vec::new(),
            switch_labels: Vec::new(),
            label_scope: HashMap::new(),
        }
    }

    pub fn lower(mut self) -> IrBuilder {
        self.resolve_enums();
        self.register_globals();
        let globals = self.ast.globals.clone();
        for g in &globals {
            self.lower_global(g);
        }
        self.ir
    }

    fn fresh_label(&mut self) -> String {
        format!("L{}", self.session.counters.fresh_label())
    }

    fn const_index(&mut self, n: i64) -> ValueId {
        self.ir.emit_const(n, Type::Long { unsigned: true }, 0, 0)
    }

    fn convert(&mut self, value: ValueId, from: &Type, to: &Type) -> ValueId {
        if from == to {
            value
        } else {
            self.ir.emit_cast(value, to.clone(), 0, 0)
        }
    }

    // -- enum constant resolution (must run before any expression lowering,
    //    since enum constants can appear anywhere, including earlier in the
    //    same translation unit) -------------------------------------------

    fn resolve_enums(&mut self) {
        let globals = self.ast.globals.clone();
        for g in &globals {
            if let Glob::EnumDecl { variants, .. } = g {
                let mut next = 0i64;
                for (name, expr) in variants {
                    let value = match expr {
                        Some(e) => {
                            let ctx = ConstCtx { word_size: self.word_size, enum_values: &self.enum_values };
                            eval_const(&self.ast, *e, &ctx, &mut self.session.diagnostics, &self.file, 0, 0)
                        }
                        None => next,
                    };
                    self.enum_values.insert(name.clone(), value);
                    next = value.wrapping_add(1);
                    self.symbols.declare_global(Symbol {
                        name: name.clone(),
                        ir_name: name.clone(),
                        kind: SymbolKind::EnumConst,
                        ty: Type::Int { unsigned: false },
                        storage: Storage::Extern,
                        is_const: true,
                        is_volatile: false,
                        is_restrict: false,
                        param_index: None,
                        enum_value: Some(value),
                        is_inline: false,
                    });
                }
            }
        }
    }

    fn register_globals(&mut self) {
        let globals = self.ast.globals.clone();
        for g in &globals {
            match g {
                Glob::Func(f) => {
                    let ty = Type::Func {
                        ret: Rc::new(f.ret.clone()),
                        params: f.params.iter().map(|p| p.ty.clone()).collect(),
                        variadic: f.variadic,
                    };
                    self.symbols.declare_global(Symbol {
                        name: f.name.clone(),
                        ir_name: f.name.clone(),
                        kind: SymbolKind::Function,
                        ty,
                        storage: if f.is_static { Storage::Static } else { Storage::Extern },
                        is_const: false,
                        is_volatile: false,
                        is_restrict: false,
                        param_index: None,
                        enum_value: None,
                        is_inline: f.is_inline,
                    });
                    if f.is_inline {
                        self.session.inline_candidates.insert(f.name.clone());
                    }
                }
                Glob::GlobalVar { name, ty, storage, .. } => {
                    self.symbols.declare_global(Symbol::variable(name.clone(), ty.clone(), *storage));
                }
                Glob::Typedef { .. } | Glob::StructDecl(_) | Glob::UnionDecl(_) | Glob::EnumDecl { .. } | Glob::StaticAssert { .. } => {}
            }
        }
    }

    // -- top-level declarations ---------------------------------------------

    fn lower_global(&mut self, g: &Glob) {
        match g {
            Glob::Func(f) => self.lower_func(f),
            Glob::GlobalVar { name, ty, init, .. } => self.lower_global_var(name, ty, init),
            Glob::StaticAssert { cond, message } => {
                let ctx = ConstCtx { word_size: self.word_size, enum_values: &self.enum_values };
                let v = eval_const(&self.ast, *cond, &ctx, &mut self.session.diagnostics, &self.file, 0, 0);
                if v == 0 {
                    self.session
                        .diagnostics
                        .error(Kind::Semantic, &self.file, 0, 0, format!("static assertion failed: {message}"));
                }
            }
            Glob::Typedef { .. } | Glob::StructDecl(_) | Glob::UnionDecl(_) | Glob::EnumDecl { .. } => {}
        }
    }

    fn lower_func(&mut self, f: &Func) {
        let Some(body) = f.body else { return };
        let (line, column) = (f.loc.line, f.loc.column);
        self.ir.emit_func_begin(f.name.clone(), f.is_inline, line, column);
        self.symbols.push_scope();
        self.label_scope.clear();
        for (i, p) in f.params.iter().enumerate() {
            let v = self.ir.emit_load_param(i as i64, p.name.clone(), p.ty.clone(), line, column);
            self.ir.emit_store(p.name.clone(), v, p.ty.clone(), line, column);
            self.symbols.declare(Symbol::variable(p.name.clone(), p.ty.clone(), Storage::Auto));
        }
        self.lower_stmt(body);
        self.symbols.pop_scope();
        self.ir.emit_func_end(line, column);
    }

    fn lower_global_var(&mut self, name: &str, ty: &Type, init: &Option<Initializer>) {
        match ty {
            Type::Array(elem, n) => {
                let count = n.unwrap_or(0);
                let elem_size = elem.size_of(self.word_size) as usize;
                let mut data = vec![0u8; elem_size * count as usize];
                match init {
                    Some(Initializer::List(items)) => {
                        for (i, item) in items.iter().enumerate() {
                            if i as u32 >= count {
                                break;
                            }
                            let bytes = self.encode_initializer_scalar(elem, item);
                            let off = i * elem_size;
                            let n = bytes.len().min(data.len().saturating_sub(off));
                            data[off..off + n].copy_from_slice(&bytes[..n]);
                        }
                    }
                    Some(Initializer::Expr(e)) if matches!(elem.as_ref(), Type::Char { .. }) => {
                        if let Expr::StringLiteral(s) = self.ast.expr(*e).clone() {
                            let mut bytes = s.into_bytes();
                            bytes.push(0);
                            let n = bytes.len().min(data.len());
                            data[..n].copy_from_slice(&bytes[..n]);
                        }
                    }
                    _ => {}
                }
                self.ir.emit_glob_data(Op::GlobArray, name, data, ty.clone(), 0, 0);
            }
            Type::Struct(agg) | Type::Union(agg) => {
                let mut data = vec![0u8; agg.size as usize];
                if let Some(Initializer::List(items)) = init {
                    for (field, item) in agg.fields.iter().zip(items.iter()) {
                        let bytes = self.encode_initializer_scalar(&field.ty, item);
                        let off = field.offset as usize;
                        let n = bytes.len().min(data.len().saturating_sub(off));
                        data[off..off + n].copy_from_slice(&bytes[..n]);
                    }
                }
                let op = if matches!(ty, Type::Struct(_)) { Op::GlobStruct } else { Op::GlobUnion };
                self.ir.emit_glob_data(op, name, data, ty.clone(), 0, 0);
            }
            _ => {
                let data = match init {
                    Some(init) => self.encode_initializer_scalar(ty, init),
                    None => vec![0u8; ty.size_of(self.word_size) as usize],
                };
                self.ir.emit_glob_data(Op::GlobVar, name, data, ty.clone(), 0, 0);
            }
        }
    }

    fn encode_initializer_scalar(&mut self, ty: &Type, init: &Initializer) -> Vec<u8> {
        let e = match init {
            Initializer::Expr(e) => *e,
            Initializer::List(items) => {
                return items
                    .first()
                    .map(|i| self.encode_initializer_scalar(ty, i))
                    .unwrap_or_else(|| vec![0u8; ty.size_of(self.word_size) as usize]);
            }
        };
        if ty.is_float() {
            let v = self.eval_const_float(e);
            encode_float(v, ty)
        } else {
            let ctx = ConstCtx { word_size: self.word_size, enum_values: &self.enum_values };
            let v = eval_const(&self.ast, e, &ctx, &mut self.session.diagnostics, &self.file, 0, 0);
            encode_int(v, ty.size_of(self.word_size))
        }
    }

    fn eval_const_float(&mut self, e: ExprId) -> f64 {
        match self.ast.expr(e).clone() {
            Expr::FloatLiteral { value, .. } => value,
            Expr::IntLiteral { value, .. } => value as f64,
            Expr::Unary { op: UnaryOp::Neg, operand } => -self.eval_const_float(operand),
            _ => {
                let ctx = ConstCtx { word_size: self.word_size, enum_values: &self.enum_values };
                eval_const(&self.ast, e, &ctx, &mut self.session.diagnostics, &self.file, 0, 0) as f64
            }
        }
    }

    // -- statements -----------------------------------------------------------

    fn lower_stmt(&mut self, id: StmtId) {
        let s = self.ast.stmt(id).clone();
        match s {
            Stmt::Expr(e) => {
                self.lower_expr(e);
            }
            Stmt::Return(value) => match value {
                Some(e) => {
                    let (v, ty) = self.lower_expr(e);
                    self.ir.emit_return(Some(v), ty, 0, 0);
                }
                None => self.ir.emit_return(None, Type::Void, 0, 0),
            },
            Stmt::VarDecl { name, ty, init, .. } => self.lower_var_decl(&name, &ty, &init),
            Stmt::If { cond, then_branch, else_branch } => self.lower_if(cond, then_branch, else_branch),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::DoWhile { body, cond } => self.lower_do_while(body, cond),
            Stmt::For { init, cond, step, body } => self.lower_for(init, cond, step, body),
            Stmt::Switch { cond, body } => self.lower_switch(cond, body),
            Stmt::Case { body, .. } => {
                if let Some(map) = self.switch_labels.last() {
                    if let Some(label) = map.get(&id.index()).cloned() {
                        self.ir.emit_label(label, 0, 0);
                    }
                }
                self.lower_stmt(body);
            }
            Stmt::Default(body) => {
                if let Some(map) = self.switch_labels.last() {
                    if let Some(label) = map.get(&id.index()).cloned() {
                        self.ir.emit_label(label, 0, 0);
                    }
                }
                self.lower_stmt(body);
            }
            Stmt::Break => match self.loop_labels.last() {
                Some(l) => {
                    let target = l.break_label.clone();
                    self.ir.emit_br(target, 0, 0);
                }
                None => self.session.diagnostics.error(Kind::Semantic, &self.file, 0, 0, "'break' outside a loop or switch"),
            },
            Stmt::Continue => {
                let target = self.loop_labels.iter().rev().find_map(|l| l.continue_label.clone());
                match target {
                    Some(t) => self.ir.emit_br(t, 0, 0),
                    None => self.session.diagnostics.error(Kind::Semantic, &self.file, 0, 0, "'continue' outside a loop"),
                }
            }
            Stmt::Label { name, body } => {
                let label = self.label_for(&name);
                self.ir.emit_label(label, 0, 0);
                self.lower_stmt(body);
            }
            Stmt::Goto(name) => {
                let label = self.label_for(&name);
                self.ir.emit_br(label, 0, 0);
            }
            Stmt::Typedef { .. } => {}
            Stmt::Block(items) => {
                self.symbols.push_scope();
                for item in items {
                    self.lower_stmt(item);
                }
                self.symbols.pop_scope();
            }
            Stmt::StaticAssert { cond, message } => {
                let ctx = ConstCtx { word_size: self.word_size, enum_values: &self.enum_values };
                let v = eval_const(&self.ast, cond, &ctx, &mut self.session.diagnostics, &self.file, 0, 0);
                if v == 0 {
                    self.session
                        .diagnostics
                        .error(Kind::Semantic, &self.file, 0, 0, format!("static assertion failed: {message}"));
                }
            }
        }
    }

    fn label_for(&mut self, name: &str) -> String {
        if let Some(l) = self.label_scope.get(name) {
            return l.clone();
        }
        let l = format!("U{}_{}", name, self.session.counters.fresh_label());
        self.label_scope.insert(name.to_string(), l.clone());
        l
    }

    fn lower_var_decl(&mut self, name: &str, ty: &Type, init: &Option<Initializer>) {
        self.symbols.declare(Symbol::variable(name.to_string(), ty.clone(), Storage::Auto));
        match ty {
            Type::Array(_, _) | Type::Struct(_) | Type::Union(_) => {
                self.ir.emit_alloca(name.to_string(), ty.size_of(self.word_size) as i64, ty.clone(), 0, 0);
                if let Some(init) = init {
                    self.lower_aggregate_init(name, ty, init);
                }
            }
            _ => {
                if let Some(Initializer::Expr(e)) = init {
                    let (v, vt) = self.lower_expr(*e);
                    let cast = self.convert(v, &vt, ty);
                    self.ir.emit_store(name.to_string(), cast, ty.clone(), 0, 0);
                }
            }
        }
    }

    fn lower_aggregate_init(&mut self, name: &str, ty: &Type, init: &Initializer) {
        match (ty, init) {
            (Type::Array(elem, _), Initializer::Expr(e)) if matches!(elem.as_ref(), Type::Char { .. }) => {
                if let Expr::StringLiteral(s) = self.ast.expr(*e).clone() {
                    let base = self.ir.emit_addr(name.to_string(), Type::Ptr(elem.clone()), 0, 0);
                    let mut bytes = s.into_bytes();
                    bytes.push(0);
                    for (i, b) in bytes.into_iter().enumerate() {
                        let idx = self.const_index(i as i64);
                        let addr = self.ir.emit_ptr_add(base, idx, 1, Type::Ptr(elem.clone()), 0, 0);
                        let v = self.ir.emit_const(b as i64, (**elem).clone(), 0, 0);
                        self.ir.emit_store_ptr(addr, v, (**elem).clone(), false, 0, 0);
                    }
                }
            }
            (Type::Array(elem, _), Initializer::List(items)) => {
                let base = self.ir.emit_addr(name.to_string(), Type::Ptr(elem.clone()), 0, 0);
                let size = elem.size_of(self.word_size) as i64;
                for (i, item) in items.iter().enumerate() {
                    if let Initializer::Expr(e) = item {
                        let (v, vt) = self.lower_expr(*e);
                        let cast = self.convert(v, &vt, elem);
                        let idx = self.const_index(i as i64);
                        let addr = self.ir.emit_ptr_add(base, idx, size, Type::Ptr(elem.clone()), 0, 0);
                        self.ir.emit_store_ptr(addr, cast, (**elem).clone(), false, 0, 0);
                    }
                    // Nested initializer lists (multi-dimensional arrays) are
                    // not flattened here; see DESIGN.md.
                }
            }
            (Type::Struct(agg), Initializer::List(items)) | (Type::Union(agg), Initializer::List(items)) => {
                let base = self.ir.emit_addr(name.to_string(), Type::Ptr(Rc::new(ty.clone())), 0, 0);
                for (field, item) in agg.clone().fields.iter().zip(items.iter()) {
                    if let Initializer::Expr(e) = item {
                        let (v, vt) = self.lower_expr(*e);
                        let cast = self.convert(v, &vt, &field.ty);
                        let off = self.const_index(field.offset as i64);
                        let addr = self.ir.emit_ptr_add(base, off, 1, Type::Ptr(Rc::new(field.ty.clone())), 0, 0);
                        if let Some(width) = field.bit_width {
                            self.ir.emit_bf_store(addr, cast, field.bit_offset, width, field.ty.clone(), 0, 0);
                        } else {
                            self.ir.emit_store_ptr(addr, cast, field.ty.clone(), false, 0, 0);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn lower_if(&mut self, cond: ExprId, then_branch: StmtId, else_branch: Option<StmtId>) {
        let then_l = self.fresh_label();
        let end_l = self.fresh_label();
        let (cond_val, _) = self.lower_expr(cond);
        self.ir.emit_bcond(cond_val, then_l.clone(), 0, 0);
        if let Some(else_branch) = else_branch {
            self.lower_stmt(else_branch);
        }
        self.ir.emit_br(end_l.clone(), 0, 0);
        self.ir.emit_label(then_l, 0, 0);
        self.lower_stmt(then_branch);
        self.ir.emit_label(end_l, 0, 0);
    }

    fn lower_while(&mut self, cond: ExprId, body: StmtId) {
        let head = self.fresh_label();
        let body_l = self.fresh_label();
        let end = self.fresh_label();
        self.ir.emit_label(head.clone(), 0, 0);
        let (cond_val, _) = self.lower_expr(cond);
        self.ir.emit_bcond(cond_val, body_l.clone(), 0, 0);
        self.ir.emit_br(end.clone(), 0, 0);
        self.ir.emit_label(body_l, 0, 0);
        self.loop_labels.push(LoopLabels { break_label: end.clone(), continue_label: Some(head.clone()) });
        self.lower_stmt(body);
        self.loop_labels.pop();
        self.ir.emit_br(head, 0, 0);
        self.ir.emit_label(end, 0, 0);
    }

    fn lower_do_while(&mut self, body: StmtId, cond: ExprId) {
        let head = self.fresh_label();
        let cont = self.fresh_label();
        let end = self.fresh_label();
        self.ir.emit_label(head.clone(), 0, 0);
        self.loop_labels.push(LoopLabels { break_label: end.clone(), continue_label: Some(cont.clone()) });
        self.lower_stmt(body);
        self.loop_labels.pop();
        self.ir.emit_label(cont, 0, 0);
        let (cond_val, _) = self.lower_expr(cond);
        self.ir.emit_bcond(cond_val, head, 0, 0);
        self.ir.emit_label(end, 0, 0);
    }

    fn lower_for(&mut self, init: Option<StmtId>, cond: Option<ExprId>, step: Option<ExprId>, body: StmtId) {
        self.symbols.push_scope();
        if let Some(init) = init {
            self.lower_stmt(init);
        }
        let head = self.fresh_label();
        let body_l = self.fresh_label();
        let cont = self.fresh_label();
        let end = self.fresh_label();
        self.ir.emit_label(head.clone(), 0, 0);
        match cond {
            Some(c) => {
                let (v, _) = self.lower_expr(c);
                self.ir.emit_bcond(v, body_l.clone(), 0, 0);
                self.ir.emit_br(end.clone(), 0, 0);
            }
            None => self.ir.emit_br(body_l.clone(), 0, 0),
        }
        self.ir.emit_label(body_l, 0, 0);
        self.loop_labels.push(LoopLabels { break_label: end.clone(), continue_label: Some(cont.clone()) });
        self.lower_stmt(body);
        self.loop_labels.pop();
        self.ir.emit_label(cont, 0, 0);
        if let Some(s) = step {
            self.lower_expr(s);
        }
        self.ir.emit_br(head, 0, 0);
        self.ir.emit_label(end, 0, 0);
        self.symbols.pop_scope();
    }

    fn collect_switch_cases(&mut self, id: StmtId, cases: &mut Vec<(i64, StmtId)>, default: &mut Option<StmtId>) {
        let s = self.ast.stmt(id).clone();
        match s {
            Stmt::Block(items) => {
                for item in items {
                    self.collect_switch_cases(item, cases, default);
                }
            }
            Stmt::Case { value, body } => {
                cases.push((value, id));
                self.collect_switch_cases(body, cases, default);
            }
            Stmt::Default(body) => {
                *default = Some(id);
                self.collect_switch_cases(body, cases, default);
            }
            _ => {}
        }
    }

    fn lower_switch(&mut self, cond: ExprId, body: StmtId) {
        let (cond_val, cond_ty) = self.lower_expr(cond);
        let mut cases = Vec::new();
        let mut default = None;
        self.collect_switch_cases(body, &mut cases, &mut default);

        let mut seen = std::collections::HashSet::new();
        let mut label_map: HashMap<u32, String> = HashMap::new();
        for (value, id) in &cases {
            if !seen.insert(*value) {
                self.session
                    .diagnostics
                    .error(Kind::Semantic, &self.file, 0, 0, format!("duplicate case value {value}"));
            }
            let label = self.fresh_label();
            label_map.insert(id.index(), label);
        }
        let default_label = default.map(|id| {
            let label = self.fresh_label();
            label_map.insert(id.index(), label.clone());
            label
        });
        let end_label = self.fresh_label();

        for (value, id) in &cases {
            let const_val = self.ir.emit_const(*value, cond_ty.clone(), 0, 0);
            let cmp = self.ir.emit_binary(Op::CmpEq, cond_val, const_val, Type::Int { unsigned: false }, 0, 0);
            self.ir.emit_bcond(cmp, label_map[&id.index()].clone(), 0, 0);
        }
        match &default_label {
            Some(l) => self.ir.emit_br(l.clone(), 0, 0),
            None => self.ir.emit_br(end_label.clone(), 0, 0),
        }

        let outer_continue = self.loop_labels.last().and_then(|l| l.continue_label.clone());
        self.loop_labels.push(LoopLabels { break_label: end_label.clone(), continue_label: outer_continue });
        self.switch_labels.push(label_map);
        self.lower_stmt(body);
        self.switch_labels.pop();
        self.loop_labels.pop();

        self.ir.emit_label(end_label, 0, 0);
    }

    // -- expressions ------------------------------------------------------

    fn lower_expr(&mut self, id: ExprId) -> (ValueId, Type) {
        let e = self.ast.expr(id).clone();
        match e {
            Expr::IntLiteral { value, ty } => (self.ir.emit_const(value, ty.clone(), 0, 0), ty),
            Expr::FloatLiteral { value, ty } => {
                let bits = match ty {
                    Type::Float => (value as f32).to_bits() as i64,
                    _ => value.to_bits() as i64,
                };
                (self.ir.emit_const(bits, ty.clone(), 0, 0), ty)
            }
            Expr::ComplexLiteral { value, ty } => {
                let mut data = Vec::with_capacity(16);
                data.extend_from_slice(&0.0f64.to_le_bytes());
                data.extend_from_slice(&value.to_le_bytes());
                (self.ir.emit_cplx_const(data, ty.clone(), 0, 0), ty)
            }
            Expr::CharLiteral(c) => {
                let ty = Type::Char { unsigned: false };
                (self.ir.emit_const(c as i64, ty.clone(), 0, 0), ty)
            }
            Expr::WideCharLiteral(c) => {
                let ty = Type::Int { unsigned: false };
                (self.ir.emit_const(c as i64, ty.clone(), 0, 0), ty)
            }
            Expr::StringLiteral(s) => {
                let label = format!("Lstr{}", self.session.counters.fresh_string_label());
                let mut bytes = s.into_bytes();
                bytes.push(0);
                let str_ty = Type::Array(Rc::new(Type::Char { unsigned: false }), Some(bytes.len() as u32));
                self.ir.emit_glob_data(Op::GlobString, label.clone(), bytes, str_ty, 0, 0);
                let ptr_ty = Type::Char { unsigned: false }.ptr_to();
                let v = self.ir.emit_addr(label, ptr_ty.clone(), 0, 0);
                (v, ptr_ty)
            }
            Expr::WideStringLiteral(chars) => {
                let label = format!("Lwstr{}", self.session.counters.fresh_string_label());
                let mut bytes = Vec::with_capacity(chars.len() * 4 + 4);
                for c in &chars {
                    bytes.extend_from_slice(&c.to_le_bytes());
                }
                bytes.extend_from_slice(&0u32.to_le_bytes());
                let str_ty = Type::Array(Rc::new(Type::Int { unsigned: false }), Some((chars.len() + 1) as u32));
                self.ir.emit_glob_data(Op::GlobWString, label.clone(), bytes, str_ty, 0, 0);
                let ptr_ty = Type::Int { unsigned: false }.ptr_to();
                let v = self.ir.emit_addr(label, ptr_ty.clone(), 0, 0);
                (v, ptr_ty)
            }
            Expr::Ident(name) => self.lower_ident_rvalue(&name),
            Expr::Unary { op, operand } => self.lower_unary(op, operand),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(op, lhs, rhs),
            Expr::Ternary { cond, then_branch, else_branch } => self.lower_ternary(cond, then_branch, else_branch),
            Expr::Assign { op, target, value } => self.lower_assign(op, target, value),
            Expr::Index { base, index } => {
                let (addr, elem_ty) = self.lower_index_addr(base, index);
                let v = self.ir.emit_load_ptr(addr, elem_ty.clone(), false, 0, 0);
                (v, elem_ty)
            }
            Expr::Member { base, field, arrow } => self.lower_member_load(base, &field, arrow),
            Expr::SizeofExpr(inner) => {
                let ty = self.infer_type(inner);
                let size = ty.size_of(self.word_size) as i64;
                let rty = Type::Long { unsigned: true };
                (self.ir.emit_const(size, rty.clone(), 0, 0), rty)
            }
            Expr::SizeofType(ty) => {
                let size = ty.size_of(self.word_size) as i64;
                let rty = Type::Long { unsigned: true };
                (self.ir.emit_const(size, rty.clone(), 0, 0), rty)
            }
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::Cast { ty, operand } => {
                let (v, from) = self.lower_expr(operand);
                let cast = self.convert(v, &from, &ty);
                (cast, ty)
            }
        }
    }

    fn infer_type(&mut self, id: ExprId) -> Type {
        let e = self.ast.expr(id).clone();
        match e {
            Expr::IntLiteral { ty, .. } => ty,
            Expr::FloatLiteral { ty, .. } => ty,
            Expr::ComplexLiteral { ty, .. } => ty,
            Expr::CharLiteral(_) => Type::Char { unsigned: false },
            Expr::WideCharLiteral(_) => Type::Int { unsigned: false },
            Expr::StringLiteral(_) => Type::Char { unsigned: false }.ptr_to(),
            Expr::WideStringLiteral(_) => Type::Int { unsigned: false }.ptr_to(),
            Expr::Ident(name) => self.symbols.lookup(&name).map(|s| s.ty.clone()).unwrap_or(Type::Int { unsigned: false }),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Deref => self.infer_type(operand).pointee().cloned().unwrap_or(Type::Int { unsigned: false }),
                UnaryOp::AddrOf => self.infer_type(operand).ptr_to(),
                UnaryOp::Not => Type::Int { unsigned: false },
                _ => self.infer_type(operand),
            },
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::LogAnd | BinaryOp::LogOr => {
                    Type::Int { unsigned: false }
                }
                BinaryOp::Comma => self.infer_type(rhs),
                _ => {
                    let lt = self.infer_type(lhs);
                    let rt = self.infer_type(rhs);
                    if lt.is_pointer() {
                        lt
                    } else if rt.is_pointer() {
                        rt
                    } else {
                        common_type(&lt, &rt)
                    }
                }
            },
            Expr::Ternary { then_branch, .. } => self.infer_type(then_branch),
            Expr::Assign { target, .. } => self.infer_type(target),
            Expr::Index { base, .. } => self.infer_type(base).pointee().cloned().unwrap_or(Type::Int { unsigned: false }),
            Expr::Member { base, field, arrow } => {
                let base_ty = self.infer_type(base);
                let agg_ty = if arrow { base_ty.pointee().cloned().unwrap_or(base_ty) } else { base_ty };
                field_of(&agg_ty, &field).map(|f| f.ty).unwrap_or(Type::Int { unsigned: false })
            }
            Expr::SizeofExpr(_) | Expr::SizeofType(_) => Type::Long { unsigned: true },
            Expr::Call { callee, .. } => match self.infer_type(callee) {
                Type::Func { ret, .. } => (*ret).clone(),
                Type::Ptr(inner) => match &*inner {
                    Type::Func { ret, .. } => (**ret).clone(),
                    _ => Type::Int { unsigned: false },
                },
                _ => Type::Int { unsigned: false },
            },
            Expr::Cast { ty, .. } => ty,
        }
    }

    fn lower_ident_rvalue(&mut self, name: &str) -> (ValueId, Type) {
        let sym = match self.symbols.lookup(name) {
            Some(s) => s.clone(),
            None => {
                self.session
                    .diagnostics
                    .error(Kind::Semantic, &self.file, 0, 0, format!("use of undeclared identifier '{name}'"));
                let ty = Type::Int { unsigned: false };
                return (self.ir.emit_const(0, ty.clone(), 0, 0), ty);
            }
        };
        match sym.kind {
            SymbolKind::EnumConst => {
                let ty = Type::Int { unsigned: false };
                (self.ir.emit_const(sym.enum_value.unwrap_or(0), ty.clone(), 0, 0), ty)
            }
            SymbolKind::Function => {
                let ptr_ty = sym.ty.clone().ptr_to();
                let v = self.ir.emit_addr(sym.ir_name.clone(), ptr_ty.clone(), 0, 0);
                (v, sym.ty.clone())
            }
            _ => match &sym.ty {
                Type::Array(elem, _) => {
                    let ptr_ty = Type::Ptr(elem.clone());
                    let v = self.ir.emit_addr(sym.ir_name.clone(), ptr_ty.clone(), 0, 0);
                    (v, ptr_ty)
                }
                _ => {
                    let v = self.ir.emit_load(sym.ir_name.clone(), sym.ty.clone(), 0, 0);
                    (v, sym.ty.clone())
                }
            },
        }
    }

    fn lower_lvalue(&mut self, id: ExprId) -> (ValueId, Type) {
        let e = self.ast.expr(id).clone();
        match e {
            Expr::Ident(name) => {
                let sym = match self.symbols.lookup(&name) {
                    Some(s) => s.clone(),
                    None => {
                        self.session
                            .diagnostics
                            .error(Kind::Semantic, &self.file, 0, 0, format!("use of undeclared identifier '{name}'"));
                        let ty = Type::Int { unsigned: false };
                        return (self.ir.emit_const(0, ty.clone().ptr_to(), 0, 0), ty);
                    }
                };
                let ptr_ty = sym.ty.clone().ptr_to();
                let v = self.ir.emit_addr(sym.ir_name.clone(), ptr_ty, 0, 0);
                (v, sym.ty.clone())
            }
            Expr::Unary { op: UnaryOp::Deref, operand } => {
                let (v, ty) = self.lower_expr(operand);
                let pointee = ty.pointee().cloned().unwrap_or(Type::Int { unsigned: false });
                (v, pointee)
            }
            Expr::Index { base, index } => self.lower_index_addr(base, index),
            Expr::Member { base, field, arrow } => self.lower_member_addr(base, &field, arrow),
            _ => {
                self.session.diagnostics.error(Kind::Semantic, &self.file, 0, 0, "expression is not assignable");
                let ty = Type::Int { unsigned: false };
                (self.ir.emit_const(0, ty.clone().ptr_to(), 0, 0), ty)
            }
        }
    }

    fn lower_index_addr(&mut self, base: ExprId, index: ExprId) -> (ValueId, Type) {
        let (base_val, base_ty) = self.lower_expr(base);
        let elem_ty = base_ty.pointee().cloned().unwrap_or(Type::Int { unsigned: false });
        let (idx_val, _) = self.lower_expr(index);
        let elem_size = elem_ty.size_of(self.word_size) as i64;
        let addr = self.ir.emit_ptr_add(base_val, idx_val, elem_size, elem_ty.clone().ptr_to(), 0, 0);
        (addr, elem_ty)
    }

    fn lower_member_field(&mut self, base: ExprId, field_name: &str, arrow: bool) -> (ValueId, Field) {
        let (base_addr, agg_ty) = if arrow { self.lower_expr(base) } else { self.lower_lvalue(base) };
        let field = field_of(&agg_ty, field_name).unwrap_or_else(|| {
            self.session
                .diagnostics
                .error(Kind::Semantic, &self.file, 0, 0, format!("no member named '{field_name}'"));
            Field { name: field_name.to_string(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 }
        });
        (base_addr, field)
    }

    fn lower_member_addr(&mut self, base: ExprId, field_name: &str, arrow: bool) -> (ValueId, Type) {
        let (base_addr, field) = self.lower_member_field(base, field_name, arrow);
        let off = self.const_index(field.offset as i64);
        let addr = self.ir.emit_ptr_add(base_addr, off, 1, Type::Ptr(Rc::new(field.ty.clone())), 0, 0);
        (addr, field.ty)
    }

    fn lower_member_load(&mut self, base: ExprId, field_name: &str, arrow: bool) -> (ValueId, Type) {
        let (base_addr, field) = self.lower_member_field(base, field_name, arrow);
        let off = self.const_index(field.offset as i64);
        let addr = self.ir.emit_ptr_add(base_addr, off, 1, Type::Ptr(Rc::new(field.ty.clone())), 0, 0);
        match field.bit_width {
            Some(width) => (self.ir.emit_bf_load(addr, field.bit_offset, width, field.ty.clone(), 0, 0), field.ty),
            None => (self.ir.emit_load_ptr(addr, field.ty.clone(), false, 0, 0), field.ty),
        }
    }

    fn store_to(&mut self, target: ExprId, value: ValueId, value_ty: Type) -> (ValueId, Type) {
        let e = self.ast.expr(target).clone();
        match e {
            Expr::Ident(name) => {
                let sym = match self.symbols.lookup(&name) {
                    Some(s) => s.clone(),
                    None => {
                        self.session
                            .diagnostics
                            .error(Kind::Semantic, &self.file, 0, 0, format!("use of undeclared identifier '{name}'"));
                        return (value, value_ty);
                    }
                };
                let cast = self.convert(value, &value_ty, &sym.ty);
                self.ir.emit_store(sym.ir_name.clone(), cast, sym.ty.clone(), 0, 0);
                (cast, sym.ty.clone())
            }
            Expr::Unary { op: UnaryOp::Deref, operand } => {
                let (ptr, ty) = self.lower_expr(operand);
                let pointee = ty.pointee().cloned().unwrap_or(Type::Int { unsigned: false });
                let cast = self.convert(value, &value_ty, &pointee);
                self.ir.emit_store_ptr(ptr, cast, pointee.clone(), false, 0, 0);
                (cast, pointee)
            }
            Expr::Index { base, index } => {
                let (addr, elem_ty) = self.lower_index_addr(base, index);
                let cast = self.convert(value, &value_ty, &elem_ty);
                self.ir.emit_store_ptr(addr, cast, elem_ty.clone(), false, 0, 0);
                (cast, elem_ty)
            }
            Expr::Member { base, field, arrow } => {
                let (base_addr, f) = self.lower_member_field(base, &field, arrow);
                let off = self.const_index(f.offset as i64);
                let addr = self.ir.emit_ptr_add(base_addr, off, 1, Type::Ptr(Rc::new(f.ty.clone())), 0, 0);
                let cast = self.convert(value, &value_ty, &f.ty);
                match f.bit_width {
                    Some(width) => self.ir.emit_bf_store(addr, cast, f.bit_offset, width, f.ty.clone(), 0, 0),
                    None => self.ir.emit_store_ptr(addr, cast, f.ty.clone(), false, 0, 0),
                }
                (cast, f.ty)
            }
            _ => {
                self.session.diagnostics.error(Kind::Semantic, &self.file, 0, 0, "expression is not assignable");
                (value, value_ty)
            }
        }
    }

    fn lower_assign(&mut self, op: AssignOp, target: ExprId, value: ExprId) -> (ValueId, Type) {
        if op == AssignOp::Assign {
            let (v, vt) = self.lower_expr(value);
            self.store_to(target, v, vt)
        } else {
            let (cur, cur_ty) = self.lower_expr(target);
            let (rhs, rhs_ty) = self.lower_expr(value);
            let bop = match op {
                AssignOp::Add => BinaryOp::Add,
                AssignOp::Sub => BinaryOp::Sub,
                AssignOp::Mul => BinaryOp::Mul,
                AssignOp::Div => BinaryOp::Div,
                AssignOp::Mod => BinaryOp::Mod,
                AssignOp::Shl => BinaryOp::Shl,
                AssignOp::Shr => BinaryOp::Shr,
                AssignOp::BitAnd => BinaryOp::BitAnd,
                AssignOp::BitOr => BinaryOp::BitOr,
                AssignOp::BitXor => BinaryOp::BitXor,
                AssignOp::Assign => unreachable!(),
            };
            let (result, result_ty) = self.apply_binary(bop, cur, cur_ty, rhs, rhs_ty);
            self.store_to(target, result, result_ty)
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> (ValueId, Type) {
        match op {
            BinaryOp::LogAnd | BinaryOp::LogOr => self.lower_short_circuit(op, lhs, rhs),
            BinaryOp::Comma => {
                self.lower_expr(lhs);
                self.lower_expr(rhs)
            }
            _ => {
                let (lv, lt) = self.lower_expr(lhs);
                let (rv, rt) = self.lower_expr(rhs);
                self.apply_binary(op, lv, lt, rv, rt)
            }
        }
    }

    fn apply_binary(&mut self, op: BinaryOp, lv: ValueId, lt: Type, rv: ValueId, rt: Type) -> (ValueId, Type) {
        match op {
            BinaryOp::Add if lt.is_pointer() && rt.is_integer() => {
                let elem = lt.pointee().cloned().unwrap_or(Type::Char { unsigned: false });
                let size = elem.size_of(self.word_size) as i64;
                (self.ir.emit_ptr_add(lv, rv, size, lt.clone(), 0, 0), lt)
            }
            BinaryOp::Add if rt.is_pointer() && lt.is_integer() => {
                let elem = rt.pointee().cloned().unwrap_or(Type::Char { unsigned: false });
                let size = elem.size_of(self.word_size) as i64;
                (self.ir.emit_ptr_add(rv, lv, size, rt.clone(), 0, 0), rt)
            }
            BinaryOp::Sub if lt.is_pointer() && rt.is_pointer() => {
                let elem = lt.pointee().cloned().unwrap_or(Type::Char { unsigned: false });
                let size = elem.size_of(self.word_size).max(1) as i64;
                let ty = Type::Long { unsigned: false };
                (self.ir.emit_ptr_diff(lv, rv, size, ty.clone(), 0, 0), ty)
            }
            BinaryOp::Sub if lt.is_pointer() && rt.is_integer() => {
                let elem = lt.pointee().cloned().unwrap_or(Type::Char { unsigned: false });
                let size = elem.size_of(self.word_size) as i64;
                let zero = self.ir.emit_const(0, rt.clone(), 0, 0);
                let neg = self.ir.emit_binary(Op::Sub, zero, rv, rt.clone(), 0, 0);
                (self.ir.emit_ptr_add(lv, neg, size, lt.clone(), 0, 0), lt)
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
                let target = if lt.is_pointer() || rt.is_pointer() { if lt.is_pointer() { lt.clone() } else { rt.clone() } } else { common_type(&lt, &rt) };
                let l = self.convert(lv, &lt, &target);
                let r = self.convert(rv, &rt, &target);
                let cmp_op = match op {
                    BinaryOp::Lt => Op::CmpLt,
                    BinaryOp::Gt => Op::CmpGt,
                    BinaryOp::Le => Op::CmpLe,
                    BinaryOp::Ge => Op::CmpGe,
                    BinaryOp::Eq => Op::CmpEq,
                    BinaryOp::Ne => Op::CmpNe,
                    _ => unreachable!(),
                };
                let rty = Type::Int { unsigned: false };
                (self.ir.emit_binary(cmp_op, l, r, rty.clone(), 0, 0), rty)
            }
            _ => {
                let target = common_type(&lt, &rt);
                let l = self.convert(lv, &lt, &target);
                let r = self.convert(rv, &rt, &target);
                let ir_op = arith_op(op, &target);
                (self.ir.emit_binary(ir_op, l, r, target.clone(), 0, 0), target)
            }
        }
    }

    fn lower_short_circuit(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> (ValueId, Type) {
        let result_slot = format!("__sc{}", self.session.counters.fresh_label());
        let rhs_label = self.fresh_label();
        let short_label = self.fresh_label();
        let end_label = self.fresh_label();
        let rty = Type::Int { unsigned: false };

        let (lv, lt) = self.lower_expr(lhs);
        let lzero = self.ir.emit_const(0, lt.clone(), 0, 0);
        let ltest = self.ir.emit_binary(Op::CmpNe, lv, lzero, rty.clone(), 0, 0);

        match op {
            BinaryOp::LogAnd => {
                self.ir.emit_bcond(ltest, rhs_label.clone(), 0, 0);
                self.ir.emit_br(short_label.clone(), 0, 0);
            }
            BinaryOp::LogOr => {
                self.ir.emit_bcond(ltest, short_label.clone(), 0, 0);
                self.ir.emit_br(rhs_label.clone(), 0, 0);
            }
            _ => unreachable!(),
        }

        self.ir.emit_label(rhs_label, 0, 0);
        let (rv, rt) = self.lower_expr(rhs);
        let rzero = self.ir.emit_const(0, rt.clone(), 0, 0);
        let rtest = self.ir.emit_binary(Op::CmpNe, rv, rzero, rty.clone(), 0, 0);
        self.ir.emit_store(result_slot.clone(), rtest, rty.clone(), 0, 0);
        self.ir.emit_br(end_label.clone(), 0, 0);

        self.ir.emit_label(short_label, 0, 0);
        let shortcut = match op {
            BinaryOp::LogAnd => 0,
            BinaryOp::LogOr => 1,
            _ => unreachable!(),
        };
        let sv = self.ir.emit_const(shortcut, rty.clone(), 0, 0);
        self.ir.emit_store(result_slot.clone(), sv, rty.clone(), 0, 0);
        self.ir.emit_br(end_label.clone(), 0, 0);

        self.ir.emit_label(end_label, 0, 0);
        let v = self.ir.emit_load(result_slot, rty.clone(), 0, 0);
        (v, rty)
    }

    fn lower_ternary(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> (ValueId, Type) {
        let tt = self.infer_type(then_branch);
        let et = self.infer_type(else_branch);
        let result_ty = if tt.is_pointer() {
            tt.clone()
        } else if et.is_pointer() {
            et.clone()
        } else {
            common_type(&tt, &et)
        };
        let result_slot = format!("__t{}", self.session.counters.fresh_label());
        let then_l = self.fresh_label();
        let end_l = self.fresh_label();

        let (cv, _) = self.lower_expr(cond);
        self.ir.emit_bcond(cv, then_l.clone(), 0, 0);

        let (ev, ety) = self.lower_expr(else_branch);
        let ev_cast = self.convert(ev, &ety, &result_ty);
        self.ir.emit_store(result_slot.clone(), ev_cast, result_ty.clone(), 0, 0);
        self.ir.emit_br(end_l.clone(), 0, 0);

        self.ir.emit_label(then_l, 0, 0);
        let (tv, tty) = self.lower_expr(then_branch);
        let tv_cast = self.convert(tv, &tty, &result_ty);
        self.ir.emit_store(result_slot.clone(), tv_cast, result_ty.clone(), 0, 0);
        self.ir.emit_br(end_l.clone(), 0, 0);

        self.ir.emit_label(end_l, 0, 0);
        let v = self.ir.emit_load(result_slot, result_ty.clone(), 0, 0);
        (v, result_ty)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: ExprId) -> (ValueId, Type) {
        match op {
            UnaryOp::AddrOf => {
                let (addr, ty) = self.lower_lvalue(operand);
                (addr, Type::Ptr(Rc::new(ty)))
            }
            UnaryOp::Deref => {
                let (v, ty) = self.lower_expr(operand);
                let pointee = ty.pointee().cloned().unwrap_or(Type::Int { unsigned: false });
                let loaded = self.ir.emit_load_ptr(v, pointee.clone(), false, 0, 0);
                (loaded, pointee)
            }
            UnaryOp::Neg => {
                let (v, ty) = self.lower_expr(operand);
                let zero = self.ir.emit_const(0, ty.clone(), 0, 0);
                let ir_op = arith_op(BinaryOp::Sub, &ty);
                (self.ir.emit_binary(ir_op, zero, v, ty.clone(), 0, 0), ty)
            }
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::BitNot => {
                let (v, ty) = self.lower_expr(operand);
                let neg1 = self.ir.emit_const(-1, ty.clone(), 0, 0);
                (self.ir.emit_binary(Op::Xor, v, neg1, ty.clone(), 0, 0), ty)
            }
            UnaryOp::Not => {
                let (v, ty) = self.lower_expr(operand);
                let zero = self.ir.emit_const(0, ty.clone(), 0, 0);
                let rty = Type::Int { unsigned: false };
                (self.ir.emit_binary(Op::CmpEq, v, zero, rty.clone(), 0, 0), rty)
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let delta = if op == UnaryOp::PreInc { 1 } else { -1 };
                let (cur, ty) = self.lower_expr(operand);
                let next = self.add_delta(cur, &ty, delta);
                self.store_to(operand, next, ty)
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                let delta = if op == UnaryOp::PostInc { 1 } else { -1 };
                let (cur, ty) = self.lower_expr(operand);
                let next = self.add_delta(cur, &ty, delta);
                self.store_to(operand, next, ty.clone());
                (cur, ty)
            }
        }
    }

    fn add_delta(&mut self, v: ValueId, ty: &Type, delta: i64) -> ValueId {
        if ty.is_pointer() {
            let elem = ty.pointee().cloned().unwrap_or(Type::Char { unsigned: false });
            let size = elem.size_of(self.word_size) as i64;
            let idx = self.ir.emit_const(delta, Type::Long { unsigned: false }, 0, 0);
            self.ir.emit_ptr_add(v, idx, size, ty.clone(), 0, 0)
        } else if ty.is_float() {
            let bits = match ty {
                Type::Float => (delta as f32).to_bits() as i64,
                _ => (delta as f64).to_bits() as i64,
            };
            let d = self.ir.emit_const(bits, ty.clone(), 0, 0);
            self.ir.emit_binary(arith_op(BinaryOp::Add, ty), v, d, ty.clone(), 0, 0)
        } else {
            let d = self.ir.emit_const(delta, ty.clone(), 0, 0);
            self.ir.emit_binary(Op::Add, v, d, ty.clone(), 0, 0)
        }
    }

    fn lower_call(&mut self, callee: ExprId, args: Vec<ExprId>) -> (ValueId, Type) {
        let arg_vals: Vec<(ValueId, Type)> = args.iter().map(|a| self.lower_expr(*a)).collect();

        if let Expr::Ident(name) = self.ast.expr(callee).clone() {
            if let Some(sym) = self.symbols.lookup(&name).cloned() {
                if sym.kind == SymbolKind::Function {
                    let ret = match &sym.ty {
                        Type::Func { ret, .. } => (**ret).clone(),
                        other => other.clone(),
                    };
                    for (v, ty) in &arg_vals {
                        self.ir.emit_arg(*v, ty.clone(), 0, 0);
                    }
                    let nr = matches!(ret, Type::Void);
                    let dest = self.ir.emit_call(sym.ir_name.clone(), nr, ret.clone(), 0, 0);
                    return (dest, ret);
                }
            }
            self.session
                .diagnostics
                .error(Kind::Semantic, &self.file, 0, 0, format!("call to undeclared function '{name}'"));
            let ty = Type::Int { unsigned: false };
            return (self.ir.emit_const(0, ty.clone(), 0, 0), ty);
        }

        let (callee_val, callee_ty) = self.lower_expr(callee);
        let ret = match callee_ty.pointee() {
            Some(Type::Func { ret, .. }) => (**ret).clone(),
            _ => Type::Int { unsigned: false },
        };
        for (v, ty) in &arg_vals {
            self.ir.emit_arg(*v, ty.clone(), 0, 0);
        }
        let nr = matches!(ret, Type::Void);
        let dest = self.ir.emit_call_ptr(callee_val, nr, ret.clone(), 0, 0);
        (dest, ret)
    }
}

fn common_type(a: &Type, b: &Type) -> Type {
    if a.rank() >= b.rank() {
        a.clone()
    } else {
        b.clone()
    }
}

fn field_of(ty: &Type, name: &str) -> Option<Field> {
    match ty {
        Type::Struct(agg) | Type::Union(agg) => agg.fields.iter().find(|f| f.name == name).cloned(),
        _ => None,
    }
}

fn int_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Shl => Op::Shl,
        BinaryOp::Shr => Op::Shr,
        BinaryOp::BitAnd => Op::And,
        BinaryOp::BitOr => Op::Or,
        BinaryOp::BitXor => Op::Xor,
        _ => Op::Add,
    }
}

fn arith_op(op: BinaryOp, ty: &Type) -> Op {
    match ty {
        Type::Float => match op {
            BinaryOp::Add => Op::FAdd,
            BinaryOp::Sub => Op::FSub,
            BinaryOp::Mul => Op::FMul,
            BinaryOp::Div => Op::FDiv,
            _ => int_op(op),
        },
        Type::Double | Type::LongDouble => match op {
            BinaryOp::Add => Op::LfAdd,
            BinaryOp::Sub => Op::LfSub,
            BinaryOp::Mul => Op::LfMul,
            BinaryOp::Div => Op::LfDiv,
            _ => int_op(op),
        },
        Type::FloatComplex | Type::DoubleComplex => match op {
            BinaryOp::Add => Op::CplxAdd,
            BinaryOp::Sub => Op::CplxSub,
            BinaryOp::Mul => Op::CplxMul,
            BinaryOp::Div => Op::CplxDiv,
            _ => int_op(op),
        },
        _ => int_op(op),
    }
}

fn encode_int(value: i64, size: u32) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    bytes[..(size as usize).min(8)].to_vec()
}

fn encode_float(value: f64, ty: &Type) -> Vec<u8> {
    match ty {
        Type::Float => (value as f32).to_le_bytes().to_vec(),
        Type::LongDouble => {
            let mut v = value.to_le_bytes().to_vec();
            v.resize(16, 0);
            v
        }
        _ => value.to_le_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::path::PathBuf;

    fn lower_source(src: &str) -> (IrBuilder, bool) {
        let mut session = Session::new(CompilerConfig::new());
        let tokens = Lexer::new(&mut session, src, PathBuf::from("test.c")).tokenize();
        let ast = Parser::new(&mut session, tokens).parse();
        let ir = lower_translation_unit(&mut session, ast);
        (ir, session.has_errors())
    }

    fn op_count(ir: &IrBuilder, op: Op) -> usize {
        ir.instructions.iter().filter(|i| i.op == op).count()
    }

    #[test]
    fn constant_folded_arithmetic_lowers_to_a_single_computation_chain() {
        let (ir, errors) = lower_source("int main(void){return 1+2*3;}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::Add), 1);
        assert_eq!(op_count(&ir, Op::Mul), 1);
        assert_eq!(op_count(&ir, Op::Return), 1);
    }

    #[test]
    fn enum_constant_with_gap_resolves_to_expected_value() {
        let (ir, errors) = lower_source("enum{A=1,B,C=5,D}; int x=D;");
        assert!(!errors);
        let store = ir.instructions.iter().find(|i| i.op == Op::GlobVar && i.name.as_deref() == Some("x")).unwrap();
        assert_eq!(store.data.as_ref().unwrap(), &6i64.to_le_bytes()[..4]);
    }

    #[test]
    fn switch_emits_one_compare_branch_pair_per_case() {
        let (ir, errors) = lower_source("int f(int x){switch(x){case 1:return 1;case 2:return 2;default:return 0;}}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::CmpEq), 2);
        assert_eq!(op_count(&ir, Op::BCond), 2);
    }

    #[test]
    fn inline_function_is_recorded_as_an_inline_candidate() {
        let mut session = Session::new(CompilerConfig::new());
        let src = "inline int add(int a,int b){return a+b;}";
        let tokens = Lexer::new(&mut session, src, PathBuf::from("test.c")).tokenize();
        let ast = Parser::new(&mut session, tokens).parse();
        let _ir = lower_translation_unit(&mut session, ast);
        assert!(session.inline_candidates.contains("add"));
    }

    #[test]
    fn undeclared_identifier_is_diagnosed() {
        let (_ir, errors) = lower_source("int f(void){return y;}");
        assert!(errors);
    }

    #[test]
    fn pointer_arithmetic_scales_by_element_size() {
        let (ir, errors) = lower_source("int f(int *p){return *(p+1);}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::PtrAdd), 1);
    }

    #[test]
    fn short_circuit_and_never_touches_generic_logand_opcode() {
        let (ir, errors) = lower_source("int f(int a,int b){return a && b;}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::LogAnd), 0);
        assert_eq!(op_count(&ir, Op::BCond), 2);
    }

    #[test]
    fn imaginary_literal_lowers_to_a_complex_constant() {
        let (ir, errors) = lower_source("double _Complex f(void){return 2.0i;}");
        assert!(!errors);
        let konst = ir.instructions.iter().find(|i| i.op == Op::CplxConst).unwrap();
        let data = konst.data.as_ref().unwrap();
        assert_eq!(f64::from_le_bytes(data[0..8].try_into().unwrap()), 0.0);
        assert_eq!(f64::from_le_bytes(data[8..16].try_into().unwrap()), 2.0);
    }

    #[test]
    fn complex_addition_lowers_to_the_dedicated_opcode_not_plain_add() {
        let (ir, errors) = lower_source("double _Complex f(double _Complex a,double _Complex b){return a+b;}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::CplxAdd), 1);
        assert_eq!(op_count(&ir, Op::Add), 0);
    }

    #[test]
    fn complex_multiplication_lowers_to_the_dedicated_opcode() {
        let (ir, errors) = lower_source("double _Complex f(double _Complex a,double _Complex b){return a*b;}");
        assert!(!errors);
        assert_eq!(op_count(&ir, Op::CplxMul), 1);
        assert_eq!(op_count(&ir, Op::Mul), 0);
    }
}
