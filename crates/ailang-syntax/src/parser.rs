//! Recursive-descent parser for AILANG.
//!
//! Consumes the token stream and produces the surface AST. Binary
//! expressions use precedence climbing; everything else is straight
//! recursive descent. Parse errors are collected as diagnostics and the
//! parser recovers where it cheaply can, so one pass reports as much as
//! possible.

use ailang_common::{Code, Diagnostic, Span};

use crate::ast::*;
use crate::lexer::{lex, LexOutput};
use crate::token::{Token, TokenKind};

/// Result of parsing one source file.
pub struct ParseOutput {
    /// The module, present whenever the file had a `module` header and the
    /// parser could make sense of the top level. Errors may still be
    /// non-empty; callers must check both.
    pub module: Option<Module>,
    pub errors: Vec<Diagnostic>,
}

/// Parse a module file.
pub fn parse_module(source: &str) -> ParseOutput {
    let LexOutput { tokens, errors } = lex(source);
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        errors,
        next_id: 0,
    };
    let module = parser.parse_module();
    ParseOutput {
        module,
        errors: parser.errors,
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
    next_id: u32,
}

impl<'src> Parser<'src> {
    // ── Token plumbing ──────────────────────────────────────────────────

    fn peek(&self) -> TokenKind {
        self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek2(&self) -> TokenKind {
        self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn current(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.current();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            let found = self.current();
            self.error_at(
                found.span,
                format!("expected {}, found {}", kind.describe(), found.kind.describe()),
            );
            None
        }
    }

    fn text(&self, token: Token) -> &'src str {
        &self.source[token.span.start as usize..token.span.end as usize]
    }

    fn error_at(&mut self, span: Span, message: String) {
        self.errors
            .push(Diagnostic::new(Code::ParUnexpected, message).with_span(span));
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.fresh_id(),
            kind,
            span,
        }
    }

    /// A placeholder expression emitted after a parse error so the walk can
    /// continue; never survives to later phases because errors are checked
    /// at the phase boundary.
    fn error_expr(&mut self, span: Span) -> Expr {
        self.expr(ExprKind::Lit(Lit::Unit), span)
    }

    // ── Module structure ────────────────────────────────────────────────

    fn parse_module(&mut self) -> Option<Module> {
        let start = self.current().span;
        self.expect(TokenKind::KwModule)?;
        let path = self.parse_module_path()?;

        let mut imports = Vec::new();
        while self.at(TokenKind::KwImport) {
            if let Some(import) = self.parse_import() {
                imports.push(import);
            }
        }

        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            let before = self.pos;
            match self.peek() {
                TokenKind::KwType => {
                    if let Some(decl) = self.parse_type_decl() {
                        decls.push(Decl::Type(decl));
                    }
                }
                TokenKind::KwExport | TokenKind::KwFunc => {
                    if let Some(decl) = self.parse_func_decl() {
                        decls.push(Decl::Func(decl));
                    }
                }
                _ => {
                    let tok = self.current();
                    self.error_at(
                        tok.span,
                        format!(
                            "expected a declaration, found {}",
                            tok.kind.describe()
                        ),
                    );
                }
            }
            // Guarantee progress even when a declaration failed to parse.
            if self.pos == before {
                self.bump();
            }
        }

        let end = self.current().span;
        Some(Module {
            path,
            imports,
            decls,
            span: start.merge(end),
        })
    }

    /// `ident ("/" ident)*`
    fn parse_module_path(&mut self) -> Option<String> {
        let first = self.expect(TokenKind::Ident)?;
        let mut path = self.text(first).to_string();
        while self.eat(TokenKind::Slash) {
            let seg = self.expect(TokenKind::Ident)?;
            path.push('/');
            path.push_str(self.text(seg));
        }
        Some(path)
    }

    fn parse_import(&mut self) -> Option<Import> {
        let start = self.current().span;
        self.expect(TokenKind::KwImport)?;
        let module = self.parse_module_path()?;
        self.expect(TokenKind::LParen)?;
        let mut names = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                names.push((self.text(tok).to_string(), tok.span));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen)?;
        Some(Import {
            module,
            names,
            span: start.merge(close.span),
        })
    }

    fn parse_type_decl(&mut self) -> Option<TypeDecl> {
        let start = self.current().span;
        self.expect(TokenKind::KwType)?;
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text(name_tok).to_string();

        let mut params = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                params.push(self.text(tok).to_string());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }

        self.expect(TokenKind::Assign)?;
        let mut ctors = vec![self.parse_ctor_decl()?];
        while self.eat(TokenKind::Pipe) {
            ctors.push(self.parse_ctor_decl()?);
        }

        let end = ctors.last().map(|c| c.span).unwrap_or(start);
        Some(TypeDecl {
            name,
            params,
            ctors,
            span: start.merge(end),
        })
    }

    fn parse_ctor_decl(&mut self) -> Option<CtorDecl> {
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text(name_tok).to_string();
        let mut args = Vec::new();
        let mut end = name_tok.span;
        if self.eat(TokenKind::LParen) {
            loop {
                args.push(self.parse_type_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            end = self.expect(TokenKind::RParen)?.span;
        }
        Some(CtorDecl {
            name,
            args,
            span: name_tok.span.merge(end),
        })
    }

    fn parse_func_decl(&mut self) -> Option<FuncDecl> {
        let start = self.current().span;
        let exported = self.eat(TokenKind::KwExport);
        self.expect(TokenKind::KwFunc)?;
        let name_tok = self.expect(TokenKind::Ident)?;
        let name = self.text(name_tok).to_string();

        let mut generics = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                generics.push(self.text(tok).to_string());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let p_tok = self.expect(TokenKind::Ident)?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type_expr()?;
                params.push(Param {
                    name: self.text(p_tok).to_string(),
                    span: p_tok.span.merge(ty.span()),
                    ty,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Arrow)?;
        let ret = self.parse_type_expr()?;
        let effects = if self.eat(TokenKind::Bang) {
            Some(self.parse_effect_labels()?)
        } else {
            None
        };

        let body = if self.eat(TokenKind::Assign) {
            self.parse_expr()
        } else if self.at(TokenKind::LBrace) {
            self.parse_brace_expr()
        } else {
            let tok = self.current();
            self.error_at(
                tok.span,
                format!("expected `=` or `{{` to begin function body, found {}", tok.kind.describe()),
            );
            self.error_expr(tok.span)
        };

        let span = start.merge(body.span);
        Some(FuncDecl {
            name,
            exported,
            generics,
            params,
            ret,
            effects,
            body,
            span,
        })
    }

    /// `{IO, FS}` after a `!`.
    fn parse_effect_labels(&mut self) -> Option<Vec<String>> {
        self.expect(TokenKind::LBrace)?;
        let mut labels = Vec::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                labels.push(self.text(tok).to_string());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Some(labels)
    }

    // ── Types ───────────────────────────────────────────────────────────

    fn parse_type_expr(&mut self) -> Option<TypeExpr> {
        let start = self.current().span;
        match self.peek() {
            TokenKind::LParen => {
                self.bump();
                if self.eat(TokenKind::RParen) {
                    // `()` or `() -> R`.
                    if self.eat(TokenKind::Arrow) {
                        return self.finish_func_type(Vec::new(), start);
                    }
                    return Some(TypeExpr::Unit(start.merge(self.tokens[self.pos - 1].span)));
                }
                let mut params = vec![self.parse_type_expr()?];
                while self.eat(TokenKind::Comma) {
                    params.push(self.parse_type_expr()?);
                }
                self.expect(TokenKind::RParen)?;
                if self.eat(TokenKind::Arrow) {
                    return self.finish_func_type(params, start);
                }
                if params.len() == 1 {
                    // Plain grouping.
                    return params.pop();
                }
                self.error_at(start, "tuple types are not supported".into());
                None
            }
            TokenKind::LBrace => self.parse_record_type(),
            TokenKind::Ident => {
                let tok = self.bump();
                let name = self.text(tok).to_string();
                if self.eat(TokenKind::LBracket) {
                    let mut args = vec![self.parse_type_expr()?];
                    while self.eat(TokenKind::Comma) {
                        args.push(self.parse_type_expr()?);
                    }
                    let close = self.expect(TokenKind::RBracket)?;
                    Some(TypeExpr::App(name, args, tok.span.merge(close.span)))
                } else {
                    Some(TypeExpr::Name(name, tok.span))
                }
            }
            _ => {
                let tok = self.current();
                self.error_at(
                    tok.span,
                    format!("expected a type, found {}", tok.kind.describe()),
                );
                None
            }
        }
    }

    fn finish_func_type(&mut self, params: Vec<TypeExpr>, start: Span) -> Option<TypeExpr> {
        let ret = self.parse_type_expr()?;
        let effects = if self.eat(TokenKind::Bang) {
            Some(self.parse_effect_labels()?)
        } else {
            None
        };
        let span = start.merge(ret.span());
        Some(TypeExpr::Func(params, Box::new(ret), effects, span))
    }

    /// `{l: T, m: U | r}`
    fn parse_record_type(&mut self) -> Option<TypeExpr> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut fields = Vec::new();
        let mut tail = None;
        if !self.at(TokenKind::RBrace) {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type_expr()?;
                fields.push((self.text(tok).to_string(), ty, tok.span));
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                if self.eat(TokenKind::Pipe) {
                    let var = self.expect(TokenKind::Ident)?;
                    tail = Some(self.text(var).to_string());
                }
                break;
            }
        }
        let close = self.expect(TokenKind::RBrace)?;
        Some(TypeExpr::Record(fields, tail, start.merge(close.span)))
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Expr {
        match self.peek() {
            TokenKind::Backslash => self.parse_lambda(),
            TokenKind::KwLet | TokenKind::KwLetRec => self.parse_let_expr(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwMatch => self.parse_match(),
            _ => self.parse_binary(0),
        }
    }

    fn parse_lambda(&mut self) -> Expr {
        let start = self.bump().span; // `\`
        let mut params = Vec::new();
        loop {
            match self.expect(TokenKind::Ident) {
                Some(tok) => params.push(self.text(tok).to_string()),
                None => return self.error_expr(start),
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if self.expect(TokenKind::Dot).is_none() {
            return self.error_expr(start);
        }
        let body = self.parse_expr();
        let span = start.merge(body.span);
        self.expr(ExprKind::Lambda(params, Box::new(body)), span)
    }

    fn parse_let_expr(&mut self) -> Expr {
        let start = self.current().span;
        let recursive = self.peek() == TokenKind::KwLetRec;
        self.bump();
        let Some(name_tok) = self.expect(TokenKind::Ident) else {
            return self.error_expr(start);
        };
        let name = self.text(name_tok).to_string();
        let ann = if self.eat(TokenKind::Colon) {
            self.parse_type_expr()
        } else {
            None
        };
        if self.expect(TokenKind::Assign).is_none() {
            return self.error_expr(start);
        }
        let value = self.parse_expr();
        if self.expect(TokenKind::KwIn).is_none() {
            return self.error_expr(start);
        }
        let body = self.parse_expr();
        let span = start.merge(body.span);
        self.expr(
            ExprKind::Let {
                name,
                ann,
                value: Box::new(value),
                body: Box::new(body),
                recursive,
            },
            span,
        )
    }

    fn parse_if(&mut self) -> Expr {
        let start = self.bump().span; // `if`
        let cond = self.parse_expr();
        if self.expect(TokenKind::KwThen).is_none() {
            return self.error_expr(start);
        }
        let then_e = self.parse_expr();
        if self.expect(TokenKind::KwElse).is_none() {
            return self.error_expr(start);
        }
        let else_e = self.parse_expr();
        let span = start.merge(else_e.span);
        self.expr(
            ExprKind::If(Box::new(cond), Box::new(then_e), Box::new(else_e)),
            span,
        )
    }

    fn parse_match(&mut self) -> Expr {
        let start = self.bump().span; // `match`
        let scrutinee = self.parse_expr();
        if self.expect(TokenKind::LBrace).is_none() {
            return self.error_expr(start);
        }
        let mut arms = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let arm_start = self.current().span;
            let Some(pattern) = self.parse_pattern() else {
                break;
            };
            let guard = if self.eat(TokenKind::KwIf) {
                Some(self.parse_expr())
            } else {
                None
            };
            if self.expect(TokenKind::FatArrow).is_none() {
                break;
            }
            let body = self.parse_expr();
            let span = arm_start.merge(body.span);
            arms.push(Arm {
                pattern,
                guard,
                body,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self
            .expect(TokenKind::RBrace)
            .map(|t| t.span)
            .unwrap_or(start);
        let span = start.merge(end);
        self.expr(ExprKind::Match(Box::new(scrutinee), arms), span)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let Some((op, prec)) = binop_for(self.peek()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1);
            let span = lhs.span.merge(rhs.span);
            lhs = self.expr(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span);
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        match self.peek() {
            TokenKind::Minus => {
                let start = self.bump().span;
                let operand = self.parse_unary();
                let span = start.merge(operand.span);
                self.expr(ExprKind::Unary(UnOp::Neg, Box::new(operand)), span)
            }
            TokenKind::Bang => {
                let start = self.bump().span;
                let operand = self.parse_unary();
                let span = start.merge(operand.span);
                self.expr(ExprKind::Unary(UnOp::Not, Box::new(operand)), span)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr());
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let close = self
                        .expect(TokenKind::RParen)
                        .map(|t| t.span)
                        .unwrap_or(expr.span);
                    let span = expr.span.merge(close);
                    expr = self.expr(ExprKind::Call(Box::new(expr), args), span);
                }
                TokenKind::Dot => {
                    self.bump();
                    let Some(label_tok) = self.expect(TokenKind::Ident) else {
                        return expr;
                    };
                    let label = self.text(label_tok).to_string();
                    let span = expr.span.merge(label_tok.span);
                    expr = self.expr(ExprKind::RecordAccess(Box::new(expr), label), span);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let tok = self.current();
        match tok.kind {
            TokenKind::Int => {
                self.bump();
                let text = self.text(tok);
                let value = text.parse::<i64>().unwrap_or_else(|_| {
                    self.errors.push(
                        Diagnostic::new(
                            Code::ParUnexpected,
                            format!("integer literal `{}` out of range", text),
                        )
                        .with_span(tok.span),
                    );
                    0
                });
                self.expr(ExprKind::Lit(Lit::Int(value)), tok.span)
            }
            TokenKind::Float => {
                self.bump();
                let text = self.text(tok);
                let value = text.parse::<f64>().unwrap_or(0.0);
                self.expr(ExprKind::Lit(Lit::Float(value)), tok.span)
            }
            TokenKind::Str => {
                self.bump();
                let raw = self.text(tok);
                let value = unescape(&raw[1..raw.len() - 1]);
                self.expr(ExprKind::Lit(Lit::Str(value)), tok.span)
            }
            TokenKind::KwTrue => {
                self.bump();
                self.expr(ExprKind::Lit(Lit::Bool(true)), tok.span)
            }
            TokenKind::KwFalse => {
                self.bump();
                self.expr(ExprKind::Lit(Lit::Bool(false)), tok.span)
            }
            TokenKind::Ident => {
                self.bump();
                let name = self.text(tok).to_string();
                if is_upper(&name) {
                    // Constructor, possibly applied.
                    let mut args = Vec::new();
                    let mut end = tok.span;
                    if self.at(TokenKind::LParen) {
                        self.bump();
                        if !self.at(TokenKind::RParen) {
                            loop {
                                args.push(self.parse_expr());
                                if !self.eat(TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        end = self
                            .expect(TokenKind::RParen)
                            .map(|t| t.span)
                            .unwrap_or(end);
                    }
                    let span = tok.span.merge(end);
                    self.expr(ExprKind::Ctor(name, args), span)
                } else {
                    self.expr(ExprKind::Var(name), tok.span)
                }
            }
            TokenKind::LParen => {
                self.bump();
                if self.at(TokenKind::RParen) {
                    let close = self.bump();
                    return self.expr(ExprKind::Lit(Lit::Unit), tok.span.merge(close.span));
                }
                let inner = self.parse_expr();
                if self.eat(TokenKind::Colon) {
                    let ty = match self.parse_type_expr() {
                        Some(ty) => ty,
                        None => return self.error_expr(tok.span),
                    };
                    let close = self
                        .expect(TokenKind::RParen)
                        .map(|t| t.span)
                        .unwrap_or(tok.span);
                    let span = tok.span.merge(close);
                    return self.expr(ExprKind::Annot(Box::new(inner), ty), span);
                }
                self.expect(TokenKind::RParen);
                inner
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr());
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let close = self
                    .expect(TokenKind::RBracket)
                    .map(|t| t.span)
                    .unwrap_or(tok.span);
                let span = tok.span.merge(close);
                self.expr(ExprKind::List(items), span)
            }
            TokenKind::LBrace => self.parse_brace_expr(),
            _ => {
                self.bump();
                self.error_at(
                    tok.span,
                    format!("expected an expression, found {}", tok.kind.describe()),
                );
                self.error_expr(tok.span)
            }
        }
    }

    /// Disambiguate `{...}`: record literal, record update, or block.
    ///
    /// - `{}`              → empty record
    /// - `{ label: ... }`  → record literal (two-token lookahead)
    /// - `{ let ... }`     → block
    /// - `{ e | ... }`     → record update over `e`
    /// - anything else     → block
    fn parse_brace_expr(&mut self) -> Expr {
        let start = match self.expect(TokenKind::LBrace) {
            Some(t) => t.span,
            None => self.current().span,
        };
        if self.at(TokenKind::RBrace) {
            let close = self.bump();
            return self.expr(ExprKind::Record(Vec::new()), start.merge(close.span));
        }
        if self.at(TokenKind::Ident) && self.peek2() == TokenKind::Colon && is_lower_tok(self) {
            return self.parse_record_literal(start);
        }
        if self.at(TokenKind::KwLet) || self.at(TokenKind::KwLetRec) {
            return self.parse_block(start, None);
        }
        let first = self.parse_expr();
        if self.eat(TokenKind::Pipe) {
            return self.parse_record_update(start, first);
        }
        self.parse_block(start, Some(first))
    }

    fn parse_record_literal(&mut self, start: Span) -> Expr {
        let mut fields = Vec::new();
        loop {
            let Some(tok) = self.expect(TokenKind::Ident) else {
                break;
            };
            let label = self.text(tok).to_string();
            if self.expect(TokenKind::Colon).is_none() {
                break;
            }
            let value = self.parse_expr();
            fields.push((label, value, tok.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self
            .expect(TokenKind::RBrace)
            .map(|t| t.span)
            .unwrap_or(start);
        let span = start.merge(close);
        self.expr(ExprKind::Record(fields), span)
    }

    fn parse_record_update(&mut self, start: Span, base: Expr) -> Expr {
        let mut fields = Vec::new();
        loop {
            let Some(tok) = self.expect(TokenKind::Ident) else {
                break;
            };
            let label = self.text(tok).to_string();
            if self.expect(TokenKind::Colon).is_none() {
                break;
            }
            let value = self.parse_expr();
            fields.push((label, value, tok.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self
            .expect(TokenKind::RBrace)
            .map(|t| t.span)
            .unwrap_or(start);
        let span = start.merge(close);
        self.expr(ExprKind::RecordUpdate(Box::new(base), fields), span)
    }

    /// Parse block statements after `{`, with an optional already-parsed
    /// first expression statement.
    fn parse_block(&mut self, start: Span, first: Option<Expr>) -> Expr {
        let mut stmts = Vec::new();
        if let Some(first) = first {
            stmts.push(Stmt::Expr(first));
            if !self.eat(TokenKind::Semi) {
                let close = self
                    .expect(TokenKind::RBrace)
                    .map(|t| t.span)
                    .unwrap_or(start);
                let span = start.merge(close);
                return self.expr(ExprKind::Block(stmts), span);
            }
        }
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::KwLet) && !let_is_expression(self) {
                let let_start = self.bump().span;
                let Some(name_tok) = self.expect(TokenKind::Ident) else {
                    break;
                };
                let name = self.text(name_tok).to_string();
                let ann = if self.eat(TokenKind::Colon) {
                    self.parse_type_expr()
                } else {
                    None
                };
                if self.expect(TokenKind::Assign).is_none() {
                    break;
                }
                let value = self.parse_expr();
                let span = let_start.merge(value.span);
                stmts.push(Stmt::Let {
                    name,
                    ann,
                    value,
                    span,
                });
            } else {
                stmts.push(Stmt::Expr(self.parse_expr()));
            }
            if !self.eat(TokenKind::Semi) {
                break;
            }
        }
        let close = self
            .expect(TokenKind::RBrace)
            .map(|t| t.span)
            .unwrap_or(start);
        let span = start.merge(close);
        self.expr(ExprKind::Block(stmts), span)
    }

    // ── Patterns ────────────────────────────────────────────────────────

    fn parse_pattern(&mut self) -> Option<Pattern> {
        let tok = self.current();
        let pattern = match tok.kind {
            TokenKind::Underscore => {
                self.bump();
                self.pattern(PatKind::Wildcard, tok.span)
            }
            TokenKind::Int => {
                self.bump();
                let value = self.text(tok).parse::<i64>().unwrap_or(0);
                self.pattern(PatKind::Lit(Lit::Int(value)), tok.span)
            }
            TokenKind::Float => {
                self.bump();
                let value = self.text(tok).parse::<f64>().unwrap_or(0.0);
                self.pattern(PatKind::Lit(Lit::Float(value)), tok.span)
            }
            TokenKind::Minus => {
                self.bump();
                let lit_tok = self.current();
                match lit_tok.kind {
                    TokenKind::Int => {
                        self.bump();
                        let value = self.text(lit_tok).parse::<i64>().unwrap_or(0);
                        self.pattern(PatKind::Lit(Lit::Int(-value)), tok.span.merge(lit_tok.span))
                    }
                    TokenKind::Float => {
                        self.bump();
                        let value = self.text(lit_tok).parse::<f64>().unwrap_or(0.0);
                        self.pattern(PatKind::Lit(Lit::Float(-value)), tok.span.merge(lit_tok.span))
                    }
                    _ => {
                        self.error_at(tok.span, "expected a numeric literal after `-`".into());
                        return None;
                    }
                }
            }
            TokenKind::Str => {
                self.bump();
                let raw = self.text(tok);
                let value = unescape(&raw[1..raw.len() - 1]);
                self.pattern(PatKind::Lit(Lit::Str(value)), tok.span)
            }
            TokenKind::KwTrue => {
                self.bump();
                self.pattern(PatKind::Lit(Lit::Bool(true)), tok.span)
            }
            TokenKind::KwFalse => {
                self.bump();
                self.pattern(PatKind::Lit(Lit::Bool(false)), tok.span)
            }
            TokenKind::Ident => {
                self.bump();
                let name = self.text(tok).to_string();
                if is_upper(&name) {
                    let mut args = Vec::new();
                    let mut end = tok.span;
                    if self.eat(TokenKind::LParen) {
                        if !self.at(TokenKind::RParen) {
                            loop {
                                args.push(self.parse_pattern()?);
                                if !self.eat(TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        end = self.expect(TokenKind::RParen)?.span;
                    }
                    self.pattern(PatKind::Ctor(name, args), tok.span.merge(end))
                } else {
                    self.pattern(PatKind::Var(name), tok.span)
                }
            }
            TokenKind::LParen => {
                self.bump();
                if self.at(TokenKind::RParen) {
                    let close = self.bump();
                    self.pattern(PatKind::Lit(Lit::Unit), tok.span.merge(close.span))
                } else {
                    let inner = self.parse_pattern()?;
                    self.expect(TokenKind::RParen)?;
                    inner
                }
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                let mut rest = None;
                if !self.at(TokenKind::RBracket) {
                    loop {
                        if self.eat(TokenKind::Ellipsis) {
                            let rest_tok = self.expect(TokenKind::Ident)?;
                            rest = Some(self.text(rest_tok).to_string());
                            break;
                        }
                        items.push(self.parse_pattern()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let close = self.expect(TokenKind::RBracket)?;
                self.pattern(PatKind::List(items, rest), tok.span.merge(close.span))
            }
            TokenKind::LBrace => {
                self.bump();
                let mut fields = Vec::new();
                let mut rest = None;
                if !self.at(TokenKind::RBrace) {
                    loop {
                        let label_tok = self.expect(TokenKind::Ident)?;
                        let label = self.text(label_tok).to_string();
                        let sub = if self.eat(TokenKind::Colon) {
                            Some(self.parse_pattern()?)
                        } else {
                            None
                        };
                        fields.push((label, sub));
                        if self.eat(TokenKind::Comma) {
                            continue;
                        }
                        if self.eat(TokenKind::Pipe) {
                            let rest_tok = self.expect(TokenKind::Ident)?;
                            rest = Some(self.text(rest_tok).to_string());
                        }
                        break;
                    }
                }
                let close = self.expect(TokenKind::RBrace)?;
                self.pattern(PatKind::Record(fields, rest), tok.span.merge(close.span))
            }
            _ => {
                self.bump();
                self.error_at(
                    tok.span,
                    format!("expected a pattern, found {}", tok.kind.describe()),
                );
                return None;
            }
        };
        Some(pattern)
    }

    fn pattern(&mut self, kind: PatKind, span: Span) -> Pattern {
        Pattern {
            id: self.fresh_id(),
            kind,
            span,
        }
    }
}

/// Binary operator and precedence for a token, if it is one.
fn binop_for(kind: TokenKind) -> Option<(BinOp, u8)> {
    Some(match kind {
        TokenKind::PipePipe => (BinOp::Or, 1),
        TokenKind::AmpAmp => (BinOp::And, 2),
        TokenKind::EqEq => (BinOp::Eq, 3),
        TokenKind::NotEq => (BinOp::Ne, 3),
        TokenKind::Lt => (BinOp::Lt, 4),
        TokenKind::LtEq => (BinOp::Le, 4),
        TokenKind::Gt => (BinOp::Gt, 4),
        TokenKind::GtEq => (BinOp::Ge, 4),
        TokenKind::PlusPlus => (BinOp::Concat, 5),
        TokenKind::Plus => (BinOp::Add, 6),
        TokenKind::Minus => (BinOp::Sub, 6),
        TokenKind::Star => (BinOp::Mul, 7),
        TokenKind::Slash => (BinOp::Div, 7),
        TokenKind::Percent => (BinOp::Mod, 7),
        _ => return None,
    })
}

fn is_upper(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Inside `parse_brace_expr`: true when the `{ ident : ... }` lookahead
/// sees a lowercase label (an uppercase name there would be a constructor
/// in an expression statement, which cannot be a record label).
fn is_lower_tok(parser: &Parser<'_>) -> bool {
    let tok = parser.current();
    !is_upper(parser.text(tok))
}

/// Inside a block, `let x = e in body` is an expression while `let x = e;`
/// is a statement. Scanning ahead for `in` before the next `;`/`}` at depth
/// zero tells them apart.
fn let_is_expression(parser: &Parser<'_>) -> bool {
    let mut depth = 0i32;
    for tok in &parser.tokens[parser.pos..] {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth -= 1,
            TokenKind::RBrace => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            TokenKind::KwIn if depth == 0 => return true,
            TokenKind::Semi if depth == 0 => return false,
            TokenKind::Eof => return false,
            _ => {}
        }
    }
    false
}

/// Process the escape sequences the lexer validated.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => out.push(other), // already reported by the lexer
            None => {}
        }
    }
    out
}
