//! Recursive-descent parser (SPEC_FULL.md §4.3).
//!
//! Builds declarator types the way a hand-written C parser must: a leading
//! pointer run wraps the type built by the direct declarator, and a
//! parenthesized declarator is parsed against a placeholder
//! (`Type::Unknown`) that gets spliced for the real base type once the
//! enclosing suffix chain is known. This is what lets `int (*fp)(int)` and
//! `int *a[3]` resolve to different types from the same grammar.

use crate::ast::*;
use crate::diagnostics::Kind;
use crate::session::Session;
use crate::token::{Keyword, Punct, Token, TokenKind};
use crate::types::{layout_struct, layout_union, Aggregate, Field, Type};
use std::collections::HashMap;
use std::rc::Rc;

struct DeclSpec {
    ty: Type,
    storage: Option<Storage>,
    is_typedef: bool,
    is_inline: bool,
}

pub struct Parser<'s> {
    session: &'s mut Session,
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    typedefs: HashMap<String, Type>,
    tags: HashMap<String, Type>,
    word_size: u32,
    /// Names captured by the most recently parsed function-suffix parameter
    /// list; consumed immediately by the declarator that owns that suffix.
    last_params: Vec<(String, Type)>,
}

impl<'s> Parser<'s> {
    pub fn new(session: &'s mut Session, tokens: Vec<Token>) -> Self {
        let word_size = session.config.target.word_size();
        Parser {
            session,
            tokens,
            pos: 0,
            ast: Ast::new(),
            typedefs: HashMap::new(),
            tags: HashMap::new(),
            word_size,
            last_params: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Ast {
        while !self.at_eof() {
            self.parse_external_declaration();
        }
        self.ast
    }

    // -- token stream helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check_punct(&self, p: Punct) -> bool {
        self.peek().is_punct(p)
    }

    fn check_keyword(&self, k: Keyword) -> bool {
        self.peek().is_keyword(k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if self.check_keyword(k) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let tok = self.peek().clone();
        self.session
            .diagnostics
            .error(Kind::Parse, tok.file.as_path(), tok.line, tok.column, message);
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> bool {
        if self.eat_punct(p) {
            true
        } else {
            self.error_here(format!("expected {what}, found '{}'", self.peek().lexeme));
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> String {
        if let Some(name) = self.peek().ident_name() {
            let name = name.to_string();
            self.advance();
            name
        } else {
            self.error_here(format!("expected {what}, found '{}'", self.peek().lexeme));
            String::new()
        }
    }

    /// Skips to the next `;` (consuming it) or the token before a `}`, so one
    /// malformed declaration doesn't cascade into spurious follow-on errors.
    fn synchronize(&mut self) {
        loop {
            if self.at_eof() || self.check_punct(Punct::RBrace) {
                return;
            }
            if self.eat_punct(Punct::Semi) {
                return;
            }
            self.advance();
        }
    }

    fn loc(&self) -> SourceLoc {
        let tok = self.peek();
        SourceLoc { line: tok.line, column: tok.column }
    }

    // -- constant folding (array sizes, case labels, bit-field widths) -------

    fn fold_const_i64(&self, id: ExprId) -> i64 {
        match self.ast.expr(id) {
            Expr::IntLiteral { value, .. } => *value,
            Expr::CharLiteral(c) => *c as i64,
            Expr::Unary { op: UnaryOp::Neg, operand } => self.fold_const_i64(*operand).wrapping_neg(),
            Expr::Unary { op: UnaryOp::BitNot, operand } => !self.fold_const_i64(*operand),
            Expr::Unary { op: UnaryOp::Not, operand } => (self.fold_const_i64(*operand) == 0) as i64,
            Expr::Unary { op: UnaryOp::Plus, operand } => self.fold_const_i64(*operand),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.fold_const_i64(*lhs);
                let r = self.fold_const_i64(*rhs);
                match op {
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::Mul => l.wrapping_mul(r),
                    BinaryOp::Div => if r == 0 { 0 } else { l.wrapping_div(r) },
                    BinaryOp::Mod => if r == 0 { 0 } else { l.wrapping_rem(r) },
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
                if self.fold_const_i64(*cond) != 0 {
                    self.fold_const_i64(*then_branch)
                } else {
                    self.fold_const_i64(*else_branch)
                }
            }
            Expr::SizeofType(ty) => ty.size_of(self.word_size) as i64,
            Expr::SizeofExpr(_) => 0,
            _ => 0,
        }
    }

    // -- declaration specifiers ----------------------------------------------

    fn is_type_start(&self, tok: &Token) -> bool {
        use Keyword::*;
        matches!(
            &tok.kind,
            TokenKind::Keyword(
                Void | Bool | Char | Short | Int | Long | Float | Double | Signed | Unsigned
                    | Struct | Union | Enum | Const | Volatile | Restrict | Complex
            )
        ) || matches!(&tok.kind, TokenKind::Ident(name) if self.typedefs.contains_key(name))
    }

    fn starts_declaration(&self) -> bool {
        self.check_keyword(Keyword::Typedef)
            || self.check_keyword(Keyword::Static)
            || self.check_keyword(Keyword::Extern)
            || self.check_keyword(Keyword::Auto)
            || self.check_keyword(Keyword::Register)
            || self.check_keyword(Keyword::Inline)
            || self.is_type_start(self.peek())
    }

    fn parse_decl_specifiers(&mut self) -> DeclSpec {
        let mut storage = None;
        let mut is_typedef = false;
        let mut is_inline = false;

        let mut void_ = false;
        let mut bool_ = false;
        let mut char_ = false;
        let mut short_ = false;
        let mut int_ = false;
        let mut long_count = 0u8;
        let mut float_ = false;
        let mut double_ = false;
        let mut complex_ = false;
        let mut signed_seen = false;
        let mut unsigned_seen = false;
        let mut aggregate_ty: Option<Type> = None;

        loop {
            if self.eat_keyword(Keyword::Typedef) {
                is_typedef = true;
            } else if self.eat_keyword(Keyword::Static) {
                storage = Some(Storage::Static);
            } else if self.eat_keyword(Keyword::Extern) {
                storage = Some(Storage::Extern);
            } else if self.eat_keyword(Keyword::Auto) {
                storage = Some(Storage::Auto);
            } else if self.eat_keyword(Keyword::Register) {
                storage = Some(Storage::Register);
            } else if self.eat_keyword(Keyword::Inline) {
                is_inline = true;
            } else if self.eat_keyword(Keyword::Const)
                || self.eat_keyword(Keyword::Volatile)
                || self.eat_keyword(Keyword::Restrict)
            {
                // qualifiers are tracked on the symbol by sema, not the bare type
            } else if self.eat_keyword(Keyword::Void) {
                void_ = true;
            } else if self.eat_keyword(Keyword::Bool) {
                bool_ = true;
            } else if self.eat_keyword(Keyword::Char) {
                char_ = true;
            } else if self.eat_keyword(Keyword::Short) {
                short_ = true;
            } else if self.eat_keyword(Keyword::Int) {
                int_ = true;
            } else if self.eat_keyword(Keyword::Long) {
                long_count += 1;
            } else if self.eat_keyword(Keyword::Float) {
                float_ = true;
            } else if self.eat_keyword(Keyword::Double) {
                double_ = true;
            } else if self.eat_keyword(Keyword::Complex) {
                complex_ = true;
            } else if self.eat_keyword(Keyword::Signed) {
                signed_seen = true;
            } else if self.eat_keyword(Keyword::Unsigned) {
                unsigned_seen = true;
            } else if self.check_keyword(Keyword::Struct) || self.check_keyword(Keyword::Union) {
                let is_union = self.check_keyword(Keyword::Union);
                self.advance();
                aggregate_ty = Some(self.parse_aggregate_body(is_union));
            } else if self.check_keyword(Keyword::Enum) {
                self.advance();
                aggregate_ty = Some(self.parse_enum_body());
            } else if aggregate_ty.is_none()
                && !void_ && !bool_ && !char_ && !short_ && !int_ && long_count == 0
                && !float_ && !double_ && !signed_seen && !unsigned_seen
            {
                if let Some(name) = self.peek().ident_name() {
                    if let Some(ty) = self.typedefs.get(name).cloned() {
                        aggregate_ty = Some(ty);
                        self.advance();
                        continue;
                    }
                }
                break;
            } else {
                break;
            }
        }

        let ty = if let Some(ty) = aggregate_ty {
            ty
        } else if void_ {
            Type::Void
        } else if bool_ {
            Type::Bool
        } else if char_ {
            Type::Char { unsigned: unsigned_seen }
        } else if short_ {
            Type::Short { unsigned: unsigned_seen }
        } else if long_count >= 1 && double_ {
            Type::LongDouble
        } else if double_ {
            if complex_ { Type::DoubleComplex } else { Type::Double }
        } else if float_ {
            if complex_ { Type::FloatComplex } else { Type::Float }
        } else if long_count >= 2 {
            Type::LLong { unsigned: unsigned_seen }
        } else if long_count == 1 {
            Type::Long { unsigned: unsigned_seen }
        } else {
            Type::Int { unsigned: unsigned_seen }
        };

        DeclSpec { ty, storage, is_typedef, is_inline }
    }

    /// Parses a bare type name for casts, `sizeof`, and abstract parameter
    /// declarators: decl-specifiers followed by an optional abstract
    /// declarator (no identifier).
    fn parse_type_name(&mut self) -> Type {
        let spec = self.parse_decl_specifiers();
        let (_, ty) = self.parse_declarator(spec.ty);
        ty
    }

    // -- struct/union/enum bodies ---------------------------------------------

    fn parse_aggregate_body(&mut self, is_union: bool) -> Type {
        let tag = if let Some(name) = self.peek().ident_name() {
            let name = name.to_string();
            self.advance();
            name
        } else {
            format!("<anon@{}:{}>", self.loc().line, self.loc().column)
        };
        let key = format!("{}{}", if is_union { "union " } else { "struct " }, tag);

        if !self.eat_punct(Punct::LBrace) {
            return self.tags.get(&key).cloned().unwrap_or_else(|| {
                let empty = Rc::new(Aggregate { tag: tag.clone(), fields: vec![], size: 0, align: 1 });
                if is_union { Type::Union(empty) } else { Type::Struct(empty) }
            });
        }

        let mut fields = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.at_eof() {
            let field_spec = self.parse_decl_specifiers();
            loop {
                let (name, ty) = self.parse_declarator(field_spec.ty.clone());
                let bit_width = if self.eat_punct(Punct::Colon) {
                    let e = self.parse_assignment_expr();
                    Some(self.fold_const_i64(e).max(0) as u32)
                } else {
                    None
                };
                fields.push(Field { name, ty, offset: 0, bit_width, bit_offset: 0 });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, "';' after struct/union member");
        }
        self.expect_punct(Punct::RBrace, "'}' after struct/union body");

        let pack = self.session.pack_alignment;
        let agg = if is_union {
            layout_union(&tag, fields, self.word_size)
        } else {
            layout_struct(&tag, fields, self.word_size, pack)
        };
        let rc = Rc::new(agg);
        let ty = if is_union { Type::Union(rc.clone()) } else { Type::Struct(rc.clone()) };
        self.tags.insert(key, ty.clone());
        self.ast.globals.push(if is_union { Glob::UnionDecl(rc) } else { Glob::StructDecl(rc) });
        ty
    }

    fn parse_enum_body(&mut self) -> Type {
        let tag = if let Some(name) = self.peek().ident_name() {
            let name = name.to_string();
            self.advance();
            name
        } else {
            format!("<anon@{}:{}>", self.loc().line, self.loc().column)
        };

        if !self.eat_punct(Punct::LBrace) {
            return Type::Enum(tag);
        }

        let mut variants = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.at_eof() {
            let name = self.expect_ident("enumerator name");
            let value = if self.eat_punct(Punct::Assign) {
                Some(self.parse_assignment_expr())
            } else {
                None
            };
            variants.push((name, value));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace, "'}' after enum body");
        self.tags.insert(format!("enum {tag}"), Type::Enum(tag.clone()));
        self.ast.globals.push(Glob::EnumDecl { tag: tag.clone(), variants });
        Type::Enum(tag)
    }

    // -- declarators -----------------------------------------------------------

    fn parse_pointer(&mut self, mut base: Type) -> Type {
        while self.eat_punct(Punct::Star) {
            loop {
                if self.eat_keyword(Keyword::Const) || self.eat_keyword(Keyword::Volatile) || self.eat_keyword(Keyword::Restrict) {
                    continue;
                }
                break;
            }
            base = base.ptr_to();
        }
        base
    }

    fn parse_declarator(&mut self, base: Type) -> (String, Type) {
        let ty = self.parse_pointer(base);
        self.parse_direct_declarator(ty)
    }

    fn parse_direct_declarator(&mut self, base: Type) -> (String, Type) {
        if self.check_punct(Punct::LParen) && !self.next_starts_param_list_only() {
            self.advance();
            let (name, inner_ty) = self.parse_declarator(Type::Unknown);
            self.expect_punct(Punct::RParen, "')' after parenthesized declarator");
            let real = self.parse_type_suffix(base);
            return (name, splice_unknown(inner_ty, real));
        }

        let name = if let Some(n) = self.peek().ident_name() {
            let n = n.to_string();
            self.advance();
            n
        } else {
            String::new()
        };
        let ty = self.parse_type_suffix(base);
        (name, ty)
    }

    /// `(` immediately followed by `)` or a type-specifier means this is a
    /// function's parameter list, not a grouping paren around a declarator.
    fn next_starts_param_list_only(&self) -> bool {
        self.check_punct(Punct::LParen)
            && (self.peek_at(1).is_punct(Punct::RParen) || self.is_type_start(self.peek_at(1)))
    }

    fn parse_type_suffix(&mut self, base: Type) -> Type {
        if self.eat_punct(Punct::LBracket) {
            let dim = if self.check_punct(Punct::RBracket) {
                None
            } else {
                let e = self.parse_assignment_expr();
                Some(self.fold_const_i64(e).max(0) as u32)
            };
            self.expect_punct(Punct::RBracket, "']' after array dimension");
            let elem = self.parse_type_suffix(base);
            return Type::Array(Rc::new(elem), dim);
        }
        if self.eat_punct(Punct::LParen) {
            let (params, variadic) = self.parse_param_list();
            self.expect_punct(Punct::RParen, "')' after parameter list");
            self.last_params = params.clone();
            return Type::Func {
                ret: Rc::new(base),
                params: params.into_iter().map(|(_, t)| t).collect(),
                variadic,
            };
        }
        base
    }

    fn parse_param_list(&mut self) -> (Vec<(String, Type)>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.check_punct(Punct::RParen) {
            return (params, false);
        }
        loop {
            if self.eat_punct(Punct::Ellipsis) {
                variadic = true;
                break;
            }
            let spec = self.parse_decl_specifiers();
            let (name, ty) = self.parse_declarator(spec.ty);
            params.push((name, ty));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        if params.len() == 1 && params[0].0.is_empty() && matches!(params[0].1, Type::Void) {
            params.clear();
        }
        (params, variadic)
    }

    // -- top level ---------------------------------------------------------

    fn parse_external_declaration(&mut self) {
        if self.check_keyword(Keyword::StaticAssert) {
            self.parse_static_assert_global();
            return;
        }

        let loc = self.loc();
        let spec = self.parse_decl_specifiers();

        if self.eat_punct(Punct::Semi) {
            // bare `struct Foo { ... };` / `enum E { ... };` — body already
            // registered as a Glob by parse_decl_specifiers.
            return;
        }

        if spec.is_typedef {
            loop {
                let (name, ty) = self.parse_declarator(spec.ty.clone());
                if !name.is_empty() {
                    self.typedefs.insert(name.clone(), ty.clone());
                    self.ast.globals.push(Glob::Typedef { name, ty });
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, "';' after typedef");
            return;
        }

        loop {
            let (name, ty) = self.parse_declarator(spec.ty.clone());

            if let Type::Func { ret, variadic, .. } = &ty {
                let ast_params: Vec<Param> = self
                    .last_params
                    .drain(..)
                    .map(|(n, t)| Param { name: n, ty: t })
                    .collect();

                if self.check_punct(Punct::LBrace) {
                    let body = self.parse_block_stmt();
                    self.ast.globals.push(Glob::Func(Func {
                        name,
                        ret: (**ret).clone(),
                        params: ast_params,
                        variadic: *variadic,
                        is_inline: spec.is_inline,
                        is_static: spec.storage == Some(Storage::Static),
                        body: Some(body),
                        loc,
                    }));
                    return;
                }

                self.ast.globals.push(Glob::Func(Func {
                    name,
                    ret: (**ret).clone(),
                    params: ast_params,
                    variadic: *variadic,
                    is_inline: spec.is_inline,
                    is_static: spec.storage == Some(Storage::Static),
                    body: None,
                    loc,
                }));
            } else {
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_initializer())
                } else {
                    None
                };
                self.ast.globals.push(Glob::GlobalVar {
                    name,
                    ty,
                    init,
                    storage: spec.storage.unwrap_or(Storage::Extern),
                });
            }

            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        if !self.check_punct(Punct::RBrace) {
            self.expect_punct(Punct::Semi, "';' after declaration");
        }
    }

    fn parse_static_assert_global(&mut self) {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after _Static_assert");
        let cond = self.parse_assignment_expr();
        let message = if self.eat_punct(Punct::Comma) {
            match self.peek().kind.clone() {
                TokenKind::StringLiteral(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.error_here("expected string literal in _Static_assert");
                    String::new()
                }
            }
        } else {
            String::new()
        };
        self.expect_punct(Punct::RParen, "')' after _Static_assert");
        self.expect_punct(Punct::Semi, "';' after _Static_assert");
        self.ast.globals.push(Glob::StaticAssert { cond, message });
    }

    // -- statements -----------------------------------------------------------

    fn parse_block_stmt(&mut self) -> StmtId {
        self.expect_punct(Punct::LBrace, "'{'");
        let mut items = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.at_eof() {
            self.parse_block_item(&mut items);
        }
        self.expect_punct(Punct::RBrace, "'}'");
        self.ast.alloc_stmt(Stmt::Block(items))
    }

    fn parse_block_item(&mut self, items: &mut Vec<StmtId>) {
        if self.check_keyword(Keyword::Typedef) || (self.starts_declaration() && !self.check_keyword(Keyword::Inline)) {
            self.parse_local_declaration(items);
            return;
        }
        if self.check_keyword(Keyword::Inline) && self.is_type_start(self.peek_at(1)) {
            self.parse_local_declaration(items);
            return;
        }
        items.push(self.parse_statement());
    }

    fn parse_local_declaration(&mut self, items: &mut Vec<StmtId>) {
        let spec = self.parse_decl_specifiers();

        if self.eat_punct(Punct::Semi) {
            return; // struct/union/enum tag declaration with no variable
        }

        if spec.is_typedef {
            loop {
                let (name, ty) = self.parse_declarator(spec.ty.clone());
                if !name.is_empty() {
                    self.typedefs.insert(name.clone(), ty.clone());
                    items.push(self.ast.alloc_stmt(Stmt::Typedef { name, ty }));
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, "';' after typedef");
            return;
        }

        loop {
            let (name, ty) = self.parse_declarator(spec.ty.clone());
            let init = if self.eat_punct(Punct::Assign) {
                Some(self.parse_initializer())
            } else {
                None
            };
            items.push(self.ast.alloc_stmt(Stmt::VarDecl {
                name,
                ty,
                init,
                storage: spec.storage.unwrap_or(Storage::Auto),
            }));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi, "';' after declaration");
    }

    fn parse_initializer(&mut self) -> Initializer {
        if self.eat_punct(Punct::LBrace) {
            let mut items = Vec::new();
            while !self.check_punct(Punct::RBrace) && !self.at_eof() {
                items.push(self.parse_initializer());
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace, "'}' after initializer list");
            Initializer::List(items)
        } else {
            Initializer::Expr(self.parse_assignment_expr())
        }
    }

    fn parse_statement(&mut self) -> StmtId {
        if self.check_punct(Punct::LBrace) {
            return self.parse_block_stmt();
        }
        if self.check_keyword(Keyword::If) {
            return self.parse_if();
        }
        if self.check_keyword(Keyword::While) {
            return self.parse_while();
        }
        if self.check_keyword(Keyword::Do) {
            return self.parse_do_while();
        }
        if self.check_keyword(Keyword::For) {
            return self.parse_for();
        }
        if self.check_keyword(Keyword::Switch) {
            return self.parse_switch();
        }
        if self.check_keyword(Keyword::Case) {
            return self.parse_case();
        }
        if self.check_keyword(Keyword::Default) {
            return self.parse_default();
        }
        if self.check_keyword(Keyword::Break) {
            self.advance();
            self.expect_punct(Punct::Semi, "';' after break");
            return self.ast.alloc_stmt(Stmt::Break);
        }
        if self.check_keyword(Keyword::Continue) {
            self.advance();
            self.expect_punct(Punct::Semi, "';' after continue");
            return self.ast.alloc_stmt(Stmt::Continue);
        }
        if self.check_keyword(Keyword::Goto) {
            self.advance();
            let name = self.expect_ident("label name");
            self.expect_punct(Punct::Semi, "';' after goto");
            return self.ast.alloc_stmt(Stmt::Goto(name));
        }
        if self.check_keyword(Keyword::Return) {
            self.advance();
            let value = if self.check_punct(Punct::Semi) { None } else { Some(self.parse_expr()) };
            self.expect_punct(Punct::Semi, "';' after return");
            return self.ast.alloc_stmt(Stmt::Return(value));
        }
        if self.check_keyword(Keyword::StaticAssert) {
            return self.parse_static_assert_stmt();
        }
        if matches!(&self.peek().kind, TokenKind::Ident(_)) && self.peek_at(1).is_punct(Punct::Colon) {
            let name = self.expect_ident("label name");
            self.expect_punct(Punct::Colon, "':' after label");
            let body = self.parse_statement();
            return self.ast.alloc_stmt(Stmt::Label { name, body });
        }
        self.parse_expr_statement()
    }

    fn parse_if(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after if");
        let cond = self.parse_expr();
        self.expect_punct(Punct::RParen, "')' after if condition");
        let then_branch = self.parse_statement();
        let else_branch = if self.eat_keyword(Keyword::Else) { Some(self.parse_statement()) } else { None };
        self.ast.alloc_stmt(Stmt::If { cond, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after while");
        let cond = self.parse_expr();
        self.expect_punct(Punct::RParen, "')' after while condition");
        let body = self.parse_statement();
        self.ast.alloc_stmt(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> StmtId {
        self.advance();
        let body = self.parse_statement();
        if !self.eat_keyword(Keyword::While) {
            self.error_here("expected 'while' after do block");
        }
        self.expect_punct(Punct::LParen, "'(' after do/while");
        let cond = self.parse_expr();
        self.expect_punct(Punct::RParen, "')' after do/while condition");
        self.expect_punct(Punct::Semi, "';' after do/while");
        self.ast.alloc_stmt(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after for");

        let init = if self.check_punct(Punct::Semi) {
            self.advance();
            None
        } else if self.starts_declaration() {
            let mut items = Vec::new();
            self.parse_local_declaration(&mut items);
            Some(self.ast.alloc_stmt(Stmt::Block(items)))
        } else {
            let e = self.parse_expr();
            self.expect_punct(Punct::Semi, "';' after for-init");
            Some(self.ast.alloc_stmt(Stmt::Expr(e)))
        };

        let cond = if self.check_punct(Punct::Semi) { None } else { Some(self.parse_expr()) };
        self.expect_punct(Punct::Semi, "';' after for-condition");

        let step = if self.check_punct(Punct::RParen) { None } else { Some(self.parse_expr()) };
        self.expect_punct(Punct::RParen, "')' after for-clauses");

        let body = self.parse_statement();
        self.ast.alloc_stmt(Stmt::For { init, cond, step, body })
    }

    fn parse_switch(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after switch");
        let cond = self.parse_expr();
        self.expect_punct(Punct::RParen, "')' after switch condition");
        let body = self.parse_statement();
        self.ast.alloc_stmt(Stmt::Switch { cond, body })
    }

    fn parse_case(&mut self) -> StmtId {
        self.advance();
        let value_expr = self.parse_assignment_expr();
        let value = self.fold_const_i64(value_expr);
        self.expect_punct(Punct::Colon, "':' after case label");
        let body = self.parse_statement();
        self.ast.alloc_stmt(Stmt::Case { value, body })
    }

    fn parse_default(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::Colon, "':' after default label");
        let body = self.parse_statement();
        self.ast.alloc_stmt(Stmt::Default(body))
    }

    fn parse_static_assert_stmt(&mut self) -> StmtId {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after _Static_assert");
        let cond = self.parse_assignment_expr();
        let message = if self.eat_punct(Punct::Comma) {
            match self.peek().kind.clone() {
                TokenKind::StringLiteral(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.error_here("expected string literal in _Static_assert");
                    String::new()
                }
            }
        } else {
            String::new()
        };
        self.expect_punct(Punct::RParen, "')' after _Static_assert");
        self.expect_punct(Punct::Semi, "';' after _Static_assert");
        self.ast.alloc_stmt(Stmt::StaticAssert { cond, message })
    }

    fn parse_expr_statement(&mut self) -> StmtId {
        if self.eat_punct(Punct::Semi) {
            return self.ast.alloc_stmt(Stmt::Block(vec![]));
        }
        let e = self.parse_expr();
        if !self.check_punct(Punct::RBrace) {
            self.expect_punct(Punct::Semi, "';' after expression");
        } else {
            self.eat_punct(Punct::Semi);
        }
        self.ast.alloc_stmt(Stmt::Expr(e))
    }

    // -- expressions ------------------------------------------------------

    fn parse_expr(&mut self) -> ExprId {
        let mut lhs = self.parse_assignment_expr();
        while self.eat_punct(Punct::Comma) {
            let rhs = self.parse_assignment_expr();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::Comma, lhs, rhs });
        }
        lhs
    }

    fn parse_assignment_expr(&mut self) -> ExprId {
        let lhs = self.parse_ternary();
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Assign) => Some(AssignOp::Assign),
            TokenKind::Punct(Punct::PlusEq) => Some(AssignOp::Add),
            TokenKind::Punct(Punct::MinusEq) => Some(AssignOp::Sub),
            TokenKind::Punct(Punct::StarEq) => Some(AssignOp::Mul),
            TokenKind::Punct(Punct::SlashEq) => Some(AssignOp::Div),
            TokenKind::Punct(Punct::PercentEq) => Some(AssignOp::Mod),
            TokenKind::Punct(Punct::ShlEq) => Some(AssignOp::Shl),
            TokenKind::Punct(Punct::ShrEq) => Some(AssignOp::Shr),
            TokenKind::Punct(Punct::AmpEq) => Some(AssignOp::BitAnd),
            TokenKind::Punct(Punct::PipeEq) => Some(AssignOp::BitOr),
            TokenKind::Punct(Punct::CaretEq) => Some(AssignOp::BitXor),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let value = self.parse_assignment_expr();
            return self.ast.alloc_expr(Expr::Assign { op, target: lhs, value });
        }
        lhs
    }

    fn parse_ternary(&mut self) -> ExprId {
        let cond = self.parse_logor();
        if self.eat_punct(Punct::Question) {
            let then_branch = self.parse_expr();
            self.expect_punct(Punct::Colon, "':' in ternary expression");
            let else_branch = self.parse_assignment_expr();
            return self.ast.alloc_expr(Expr::Ternary { cond, then_branch, else_branch });
        }
        cond
    }

    fn parse_logor(&mut self) -> ExprId {
        let mut lhs = self.parse_logand();
        while self.eat_punct(Punct::PipePipe) {
            let rhs = self.parse_logand();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::LogOr, lhs, rhs });
        }
        lhs
    }

    fn parse_logand(&mut self) -> ExprId {
        let mut lhs = self.parse_bitor();
        while self.eat_punct(Punct::AmpAmp) {
            let rhs = self.parse_bitor();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::LogAnd, lhs, rhs });
        }
        lhs
    }

    fn parse_bitor(&mut self) -> ExprId {
        let mut lhs = self.parse_bitxor();
        while self.eat_punct(Punct::Pipe) {
            let rhs = self.parse_bitxor();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::BitOr, lhs, rhs });
        }
        lhs
    }

    fn parse_bitxor(&mut self) -> ExprId {
        let mut lhs = self.parse_bitand();
        while self.eat_punct(Punct::Caret) {
            let rhs = self.parse_bitand();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::BitXor, lhs, rhs });
        }
        lhs
    }

    fn parse_bitand(&mut self) -> ExprId {
        let mut lhs = self.parse_equality();
        while self.eat_punct(Punct::Amp) {
            let rhs = self.parse_equality();
            lhs = self.ast.alloc_expr(Expr::Binary { op: BinaryOp::BitAnd, lhs, rhs });
        }
        lhs
    }

    fn parse_equality(&mut self) -> ExprId {
        let mut lhs = self.parse_relational();
        loop {
            let op = if self.eat_punct(Punct::EqEq) {
                BinaryOp::Eq
            } else if self.eat_punct(Punct::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational();
            lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs });
        }
        lhs
    }

    fn parse_relational(&mut self) -> ExprId {
        let mut lhs = self.parse_shift();
        loop {
            let op = if self.eat_punct(Punct::Lt) {
                BinaryOp::Lt
            } else if self.eat_punct(Punct::Gt) {
                BinaryOp::Gt
            } else if self.eat_punct(Punct::Le) {
                BinaryOp::Le
            } else if self.eat_punct(Punct::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_shift();
            lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs });
        }
        lhs
    }

    fn parse_shift(&mut self) -> ExprId {
        let mut lhs = self.parse_additive();
        loop {
            let op = if self.eat_punct(Punct::Shl) {
                BinaryOp::Shl
            } else if self.eat_punct(Punct::Shr) {
                BinaryOp::Shr
            } else {
                break;
            };
            let rhs = self.parse_additive();
            lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs });
        }
        lhs
    }

    fn parse_additive(&mut self) -> ExprId {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = if self.eat_punct(Punct::Plus) {
                BinaryOp::Add
            } else if self.eat_punct(Punct::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative();
            lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs });
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> ExprId {
        let mut lhs = self.parse_cast();
        loop {
            let op = if self.eat_punct(Punct::Star) {
                BinaryOp::Mul
            } else if self.eat_punct(Punct::Slash) {
                BinaryOp::Div
            } else if self.eat_punct(Punct::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_cast();
            lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs });
        }
        lhs
    }

    fn parse_cast(&mut self) -> ExprId {
        if self.check_punct(Punct::LParen) && self.is_type_start(self.peek_at(1)) {
            let save = self.pos;
            self.advance();
            let ty = self.parse_type_name();
            if self.eat_punct(Punct::RParen) {
                let operand = self.parse_cast();
                return self.ast.alloc_expr(Expr::Cast { ty, operand });
            }
            self.pos = save;
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> ExprId {
        if self.eat_punct(Punct::PlusPlus) {
            let operand = self.parse_unary();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::PreInc, operand });
        }
        if self.eat_punct(Punct::MinusMinus) {
            let operand = self.parse_unary();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::PreDec, operand });
        }
        if self.eat_punct(Punct::Plus) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::Plus, operand });
        }
        if self.eat_punct(Punct::Minus) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::Neg, operand });
        }
        if self.eat_punct(Punct::Bang) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::Not, operand });
        }
        if self.eat_punct(Punct::Tilde) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::BitNot, operand });
        }
        if self.eat_punct(Punct::Star) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::Deref, operand });
        }
        if self.eat_punct(Punct::Amp) {
            let operand = self.parse_cast();
            return self.ast.alloc_expr(Expr::Unary { op: UnaryOp::AddrOf, operand });
        }
        if self.check_keyword(Keyword::Sizeof) {
            self.advance();
            if self.check_punct(Punct::LParen) && self.is_type_start(self.peek_at(1)) {
                self.advance();
                let ty = self.parse_type_name();
                self.expect_punct(Punct::RParen, "')' after sizeof type");
                return self.ast.alloc_expr(Expr::SizeofType(ty));
            }
            let operand = self.parse_unary();
            return self.ast.alloc_expr(Expr::SizeofExpr(operand));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ExprId {
        let mut e = self.parse_primary();
        loop {
            if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expr();
                self.expect_punct(Punct::RBracket, "']' after subscript");
                e = self.ast.alloc_expr(Expr::Index { base: e, index });
            } else if self.eat_punct(Punct::LParen) {
                let mut args = Vec::new();
                if !self.check_punct(Punct::RParen) {
                    loop {
                        args.push(self.parse_assignment_expr());
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RParen, "')' after call arguments");
                e = self.ast.alloc_expr(Expr::Call { callee: e, args });
            } else if self.eat_punct(Punct::Dot) {
                let field = self.expect_ident("field name");
                e = self.ast.alloc_expr(Expr::Member { base: e, field, arrow: false });
            } else if self.eat_punct(Punct::Arrow) {
                let field = self.expect_ident("field name");
                e = self.ast.alloc_expr(Expr::Member { base: e, field, arrow: true });
            } else if self.eat_punct(Punct::PlusPlus) {
                e = self.ast.alloc_expr(Expr::Unary { op: UnaryOp::PostInc, operand: e });
            } else if self.eat_punct(Punct::MinusMinus) {
                e = self.ast.alloc_expr(Expr::Unary { op: UnaryOp::PostDec, operand: e });
            } else {
                break;
            }
        }
        e
    }

    fn parse_primary(&mut self) -> ExprId {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLiteral { text, radix, suffix } => {
                self.advance();
                let raw = text.trim_end_matches(['u', 'U', 'l', 'L', 'i', 'I', 'j', 'J']);
                let digits = match radix {
                    crate::token::Radix::Decimal => raw,
                    crate::token::Radix::Octal => raw,
                    crate::token::Radix::Hex => raw.trim_start_matches("0x").trim_start_matches("0X"),
                };
                let radix_n = match radix {
                    crate::token::Radix::Decimal => 10,
                    crate::token::Radix::Octal => 8,
                    crate::token::Radix::Hex => 16,
                };
                let value = i64::from_str_radix(digits, radix_n).unwrap_or(0);
                if suffix.imaginary {
                    return self.ast.alloc_expr(Expr::ComplexLiteral { value: value as f64, ty: Type::DoubleComplex });
                }
                let ty = if suffix.long_count >= 2 {
                    Type::LLong { unsigned: suffix.unsigned }
                } else if suffix.long_count == 1 {
                    Type::Long { unsigned: suffix.unsigned }
                } else {
                    Type::Int { unsigned: suffix.unsigned }
                };
                self.ast.alloc_expr(Expr::IntLiteral { value, ty })
            }
            TokenKind::FloatLiteral { text, suffix } => {
                self.advance();
                let raw = text.trim_end_matches(['f', 'F', 'l', 'L', 'i', 'I', 'j', 'J']);
                let value: f64 = raw.parse().unwrap_or(0.0);
                if suffix.imaginary {
                    let ty = if suffix.is_float { Type::FloatComplex } else { Type::DoubleComplex };
                    return self.ast.alloc_expr(Expr::ComplexLiteral { value, ty });
                }
                let ty = if suffix.is_long_double {
                    Type::LongDouble
                } else if suffix.is_float {
                    Type::Float
                } else {
                    Type::Double
                };
                self.ast.alloc_expr(Expr::FloatLiteral { value, ty })
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                self.ast.alloc_expr(Expr::CharLiteral(c))
            }
            TokenKind::WideCharLiteral(c) => {
                self.advance();
                self.ast.alloc_expr(Expr::WideCharLiteral(c))
            }
            TokenKind::StringLiteral(mut s) => {
                self.advance();
                while let TokenKind::StringLiteral(more) = self.peek().kind.clone() {
                    self.advance();
                    s.push_str(&more);
                }
                self.ast.alloc_expr(Expr::StringLiteral(s))
            }
            TokenKind::WideStringLiteral(mut v) => {
                self.advance();
                while let TokenKind::WideStringLiteral(more) = self.peek().kind.clone() {
                    self.advance();
                    v.extend(more);
                }
                self.ast.alloc_expr(Expr::WideStringLiteral(v))
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.ast.alloc_expr(Expr::Ident(name))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let e = self.parse_expr();
                self.expect_punct(Punct::RParen, "')' after expression");
                e
            }
            _ => {
                self.error_here(format!("expected expression, found '{}'", tok.lexeme));
                self.advance();
                self.ast.alloc_expr(Expr::IntLiteral { value: 0, ty: Type::Int { unsigned: false } })
            }
        }
    }
}

/// Replaces every `Type::Unknown` leaf with `real`, used to splice the base
/// type into a parenthesized declarator parsed against a placeholder.
fn splice_unknown(ty: Type, real: Type) -> Type {
    match ty {
        Type::Unknown => real,
        Type::Ptr(inner) => Type::Ptr(Rc::new(splice_unknown((*inner).clone(), real))),
        Type::Array(inner, n) => Type::Array(Rc::new(splice_unknown((*inner).clone(), real)), n),
        Type::Func { ret, params, variadic } => Type::Func {
            ret: Rc::new(splice_unknown((*ret).clone(), real)),
            params,
            variadic,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::lexer::Lexer;
    use crate::session::Session;
    use std::path::PathBuf;

    fn parse_source(src: &str) -> (Ast, bool) {
        let mut session = Session::new(CompilerConfig::new());
        let tokens = Lexer::new(&mut session, src, PathBuf::from("test.c")).tokenize();
        let ast = Parser::new(&mut session, tokens).parse();
        (ast, session.has_errors())
    }

    #[test]
    fn simple_function_definition_parses() {
        let (ast, errors) = parse_source("int add(int a, int b) { return a + b; }");
        assert!(!errors);
        assert_eq!(ast.globals.len(), 1);
        match &ast.globals[0] {
            Glob::Func(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params.len(), 2);
                assert!(f.body.is_some());
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn pointer_to_array_and_array_of_pointers_differ() {
        let (ast, errors) = parse_source("int *a[3]; int (*b)[3];");
        assert!(!errors);
        let ty_of = |g: &Glob| match g {
            Glob::GlobalVar { ty, .. } => ty.clone(),
            other => panic!("expected global var, got {other:?}"),
        };
        match ty_of(&ast.globals[0]) {
            Type::Array(elem, Some(3)) => assert!(matches!(*elem, Type::Ptr(_))),
            other => panic!("expected array of pointers, got {other:?}"),
        }
        match ty_of(&ast.globals[1]) {
            Type::Ptr(inner) => assert!(matches!(*inner, Type::Array(_, Some(3)))),
            other => panic!("expected pointer to array, got {other:?}"),
        }
    }

    #[test]
    fn enum_with_gap_keeps_explicit_and_implicit_values() {
        let (ast, errors) = parse_source("enum Flags { A = 1, B, C = 5, D };");
        assert!(!errors);
        match &ast.globals[0] {
            Glob::EnumDecl { variants, .. } => {
                assert_eq!(variants.len(), 4);
                assert!(variants[0].1.is_some());
                assert!(variants[1].1.is_none());
            }
            other => panic!("expected enum decl, got {other:?}"),
        }
    }

    #[test]
    fn struct_with_bitfields_records_widths() {
        let (ast, errors) = parse_source("struct S { unsigned a : 3; unsigned b : 5; };");
        assert!(!errors);
        match &ast.globals[0] {
            Glob::StructDecl(agg) => {
                assert_eq!(agg.fields[0].bit_width, Some(3));
                assert_eq!(agg.fields[1].bit_offset, 3);
            }
            other => panic!("expected struct decl, got {other:?}"),
        }
    }

    #[test]
    fn if_else_and_while_nest_correctly() {
        let (ast, errors) = parse_source(
            "int f(int x) { if (x > 0) { x = x - 1; } else { while (x < 0) { x = x + 1; } } return x; }",
        );
        assert!(!errors);
        assert_eq!(ast.globals.len(), 1);
    }

    #[test]
    fn for_loop_with_declaration_init_parses() {
        let (_ast, errors) = parse_source("int f(void) { int s = 0; for (int i = 0; i < 10; i = i + 1) { s = s + i; } return s; }");
        assert!(!errors);
    }

    #[test]
    fn switch_with_case_and_default_parses() {
        let (_ast, errors) = parse_source(
            "int f(int x) { switch (x) { case 1: return 1; case 2: return 2; default: return 0; } }",
        );
        assert!(!errors);
    }

    #[test]
    fn ternary_and_comma_bind_looser_than_assignment() {
        let (ast, errors) = parse_source("int f(int a, int b) { int x; x = a > b ? a : b, a; return x; }");
        assert!(!errors);
        let _ = ast;
    }

    #[test]
    fn cast_expression_disambiguated_from_parenthesized_call() {
        let (_ast, errors) = parse_source("int f(void) { long x; x = (long)(1 + 2); return (int)x; }");
        assert!(!errors);
    }

    #[test]
    fn malformed_declaration_recovers_on_next_statement() {
        let (_ast, errors) = parse_source("int f(void) { int = ; return 0; }");
        assert!(errors);
    }

    #[test]
    fn function_pointer_declarator_parses() {
        let (ast, errors) = parse_source("int (*handler)(int, int);");
        assert!(!errors);
        match &ast.globals[0] {
            Glob::GlobalVar { ty, .. } => match ty {
                Type::Ptr(inner) => assert!(matches!(**inner, Type::Func { .. })),
                other => panic!("expected pointer to function, got {other:?}"),
            },
            other => panic!("expected global var, got {other:?}"),
        }
    }
}
