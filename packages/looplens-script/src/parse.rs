use crate::ast::*;
use crate::error::ScriptError;
use crate::lexer::{TemplateChunk, Token, TokenKind, tokenize_with_limit};
use std::rc::Rc;

type Result<T> = std::result::Result<T, ScriptError>;

/// Default bound on how deeply statements, expressions, operator chains and
/// template literals may nest. Parsing and evaluation both recurse per level.
pub const MAX_NESTING: usize = 64;

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Program> {
    parse_with_limit(source, MAX_NESTING)
}

/// Parse a whole script, rejecting code nested deeper than `max_nesting`.
pub fn parse_with_limit(source: &str, max_nesting: usize) -> Result<Program> {
    let tokens = tokenize_with_limit(source, max_nesting)?;
    let mut parser = Parser::new(tokens, max_nesting);
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

const RESERVED: &[&str] = &[
    "let", "const", "var", "function", "return", "if", "else", "while", "for", "break",
    "continue", "true", "false", "null", "undefined", "typeof",
];

/// Keywords of the host language this subset deliberately leaves out.
const UNSUPPORTED: &[&str] = &[
    "new", "class", "async", "await", "yield", "try", "catch", "throw", "switch", "do",
    "import", "export", "this", "delete", "in", "of", "instanceof",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    fn_depth: usize,
    loop_depth: usize,
    nesting: usize,
    max_nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_nesting: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            fn_depth: 0,
            loop_depth: 0,
            nesting: 0,
            max_nesting,
        }
    }

    fn too_deep(&self, extra: usize) -> Result<()> {
        if self.nesting + extra > self.max_nesting {
            return Err(ScriptError::syntax(self.line(), "code nested too deeply"));
        }
        Ok(())
    }

    /// Runs one level of recursive descent under the nesting bound.
    fn nested<T>(&mut self, level: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.too_deep(1)?;
        self.nesting += 1;
        let result = level(self);
        self.nesting -= 1;
        result
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {kind}")))
        }
    }

    fn unexpected(&self, hint: &str) -> ScriptError {
        ScriptError::syntax(
            self.line(),
            format!("unexpected {}, {hint}", self.peek()),
        )
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn binding_name(&mut self) -> Result<Rc<str>> {
        match self.peek().clone() {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.check_supported(&name)?;
                self.pos += 1;
                Ok(Rc::from(name))
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn check_supported(&self, name: &str) -> Result<()> {
        if UNSUPPORTED.contains(&name) {
            return Err(ScriptError::syntax(
                self.line(),
                format!("`{name}` is not supported"),
            ));
        }
        Ok(())
    }

    /// Optional statement terminator; newlines are not significant.
    fn terminator(&mut self) {
        self.eat(&TokenKind::Semi);
    }

    // Statements

    fn statement(&mut self) -> Result<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt> {
        let line = self.line();
        if let TokenKind::Ident(word) = self.peek().clone() {
            match word.as_str() {
                "let" | "const" | "var" => return self.declaration(),
                "function" if matches!(self.peek_at(1), TokenKind::Ident(_)) => {
                    self.pos += 1;
                    let def = self.function_rest(true, line)?;
                    return Ok(Stmt::Function(def));
                }
                "if" => return self.if_statement(),
                "while" => return self.while_statement(),
                "for" => return self.for_statement(),
                "return" => {
                    self.pos += 1;
                    if self.fn_depth == 0 {
                        return Err(ScriptError::syntax(line, "illegal return statement"));
                    }
                    let ends = matches!(
                        self.peek(),
                        TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
                    );
                    let value = if ends {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.terminator();
                    return Ok(Stmt::Return(value));
                }
                "break" | "continue" => {
                    self.pos += 1;
                    if self.loop_depth == 0 {
                        return Err(ScriptError::syntax(line, format!("illegal {word} statement")));
                    }
                    self.terminator();
                    return Ok(if word == "break" { Stmt::Break } else { Stmt::Continue });
                }
                _ => {}
            }
        }

        match self.peek() {
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Semi => {
                self.pos += 1;
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.expression()?;
                self.terminator();
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> Result<Stmt> {
        let line = self.line();
        let kind = match self.advance() {
            TokenKind::Ident(word) if word == "const" => DeclKind::Const,
            TokenKind::Ident(word) if word == "var" => DeclKind::Var,
            _ => DeclKind::Let,
        };
        let name = self.binding_name()?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        if kind == DeclKind::Const && init.is_none() {
            return Err(ScriptError::syntax(line, "missing initializer in const declaration"));
        }
        if self.check(&TokenKind::Comma) {
            return Err(ScriptError::syntax(line, "declare one variable per statement"));
        }
        self.terminator();
        Ok(Stmt::Declare {
            kind,
            name,
            init,
            line,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("expected `}`"));
            }
            body.push(self.statement()?);
        }
        self.pos += 1;
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn loop_body(&mut self) -> Result<Box<Stmt>> {
        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;
        Ok(Box::new(body?))
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.loop_body()?;
        Ok(Stmt::While { cond, body })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect(&TokenKind::LParen)?;

        let init = if self.eat(&TokenKind::Semi) {
            None
        } else if self.is_keyword("let") || self.is_keyword("const") || self.is_keyword("var") {
            // `declaration` consumes the `;`.
            let decl = self.declaration()?;
            Some(Box::new(decl))
        } else {
            let expr = self.expression()?;
            self.expect(&TokenKind::Semi)?;
            Some(Box::new(Stmt::Expr(expr)))
        };

        let cond = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semi)?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = self.loop_body()?;
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    /// Parses `name? (params) { body }` after the `function` keyword.
    fn function_rest(&mut self, named: bool, line: usize) -> Result<Rc<FunctionDef>> {
        let name = if named || matches!(self.peek(), TokenKind::Ident(_)) {
            Some(self.binding_name()?)
        } else {
            None
        };
        let params = self.params()?;
        let body = self.function_block()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            line,
        }))
    }

    fn params(&mut self) -> Result<Vec<Rc<str>>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            params.push(self.binding_name()?);
            if !self.check(&TokenKind::RParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        Ok(params)
    }

    fn function_block(&mut self) -> Result<Vec<Stmt>> {
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.fn_depth += 1;
        let body = self.block();
        self.fn_depth -= 1;
        self.loop_depth = saved_loops;
        body
    }

    // Expressions

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    /// True when the `(` at the cursor opens an arrow parameter list.
    fn arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.peek_at(offset) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_at(offset + 1), TokenKind::Arrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn assignment(&mut self) -> Result<Expr> {
        self.nested(Self::assignment_inner)
    }

    fn assignment_inner(&mut self) -> Result<Expr> {
        let line = self.line();

        if let TokenKind::Ident(name) = self.peek().clone() {
            if matches!(self.peek_at(1), TokenKind::Arrow) {
                let param = self.binding_name()?;
                self.pos += 1;
                return self.arrow_body(vec![param], line);
            }
            let op = match self.peek_at(1) {
                TokenKind::Assign => Some(AssignOp::Set),
                TokenKind::PlusAssign => Some(AssignOp::Add),
                TokenKind::MinusAssign => Some(AssignOp::Sub),
                _ => None,
            };
            if let Some(op) = op {
                if RESERVED.contains(&name.as_str()) {
                    return Err(ScriptError::syntax(line, "invalid assignment target"));
                }
                self.pos += 2;
                let value = self.assignment()?;
                return Ok(Expr::new(
                    ExprKind::Assign {
                        target: Rc::from(name),
                        op,
                        value: Box::new(value),
                    },
                    line,
                ));
            }
        }

        if self.check(&TokenKind::LParen) && self.arrow_ahead() {
            let params = self.params()?;
            self.expect(&TokenKind::Arrow)?;
            return self.arrow_body(params, line);
        }

        let expr = self.conditional()?;
        if matches!(
            self.peek(),
            TokenKind::Assign | TokenKind::PlusAssign | TokenKind::MinusAssign
        ) {
            return Err(ScriptError::syntax(line, "invalid assignment target"));
        }
        Ok(expr)
    }

    fn arrow_body(&mut self, params: Vec<Rc<str>>, line: usize) -> Result<Expr> {
        let body = if self.check(&TokenKind::LBrace) {
            FunctionBody::Block(self.function_block()?)
        } else {
            let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
            self.fn_depth += 1;
            let expr = self.assignment();
            self.fn_depth -= 1;
            self.loop_depth = saved_loops;
            FunctionBody::Expr(Box::new(expr?))
        };
        Ok(Expr::new(
            ExprKind::Function(Rc::new(FunctionDef {
                name: None,
                params,
                body,
                line,
            })),
            line,
        ))
    }

    fn conditional(&mut self) -> Result<Expr> {
        let cond = self.logical_or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let line = cond.line;
        let then_expr = self.assignment()?;
        self.expect(&TokenKind::Colon)?;
        let else_expr = self.assignment()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            line,
        ))
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut left = self.logical_and()?;
        let mut chain = 0;
        while self.eat(&TokenKind::OrOr) {
            chain += 1;
            self.too_deep(chain)?;
            let right = self.logical_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        let mut chain = 0;
        while self.eat(&TokenKind::AndAnd) {
            chain += 1;
            self.too_deep(chain)?;
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::StrictEq => BinaryOp::StrictEq,
                TokenKind::StrictNotEq => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            chain += 1;
            self.too_deep(chain)?;
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            chain += 1;
            self.too_deep(chain)?;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            chain += 1;
            self.too_deep(chain)?;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            chain += 1;
            self.too_deep(chain)?;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let line = self.line();
        let op = match self.peek() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = matches!(self.advance(), TokenKind::PlusPlus);
                let target = self.binding_name()?;
                return Ok(Expr::new(
                    ExprKind::Update {
                        target,
                        increment,
                        prefix: true,
                    },
                    line,
                ));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let operand = self.nested(Self::unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    line,
                ))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            let line = self.line();
            if matches!(self.peek(), TokenKind::LParen | TokenKind::Dot) {
                chain += 1;
                self.too_deep(chain)?;
            }
            match self.peek() {
                TokenKind::LParen => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    while !self.eat(&TokenKind::RParen) {
                        args.push(self.assignment()?);
                        if !self.check(&TokenKind::RParen) {
                            self.expect(&TokenKind::Comma)?;
                        }
                    }
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        line,
                    );
                }
                TokenKind::Dot => {
                    self.pos += 1;
                    let property = match self.advance() {
                        TokenKind::Ident(name) => Rc::from(name),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("expected property name"));
                        }
                    };
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        line,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let ExprKind::Ident(target) = &expr.kind else {
                        return Err(ScriptError::syntax(line, "invalid update target"));
                    };
                    let target = target.clone();
                    let increment = matches!(self.advance(), TokenKind::PlusPlus);
                    return Ok(Expr::new(
                        ExprKind::Update {
                            target,
                            increment,
                            prefix: false,
                        },
                        expr.line,
                    ));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        let kind = match self.advance() {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::Str(text) => ExprKind::Str(Rc::from(text)),
            TokenKind::Template(chunks) => ExprKind::Template(self.template(chunks, line)?),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                "undefined" => ExprKind::Undefined,
                "function" => ExprKind::Function(self.function_rest(false, line)?),
                _ if RESERVED.contains(&word.as_str()) => {
                    self.pos -= 1;
                    return Err(self.unexpected("expected expression"));
                }
                _ => {
                    self.pos -= 1;
                    self.check_supported(&word)?;
                    self.pos += 1;
                    ExprKind::Ident(Rc::from(word))
                }
            },
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("expected expression"));
            }
        };
        Ok(Expr::new(kind, line))
    }

    fn template(&mut self, chunks: Vec<TemplateChunk>, line: usize) -> Result<Vec<TemplatePart>> {
        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => parts.push(TemplatePart::Text(Rc::from(text))),
                TemplateChunk::Code(mut tokens) => {
                    let end_line = tokens.last().map(|t| t.line).unwrap_or(line);
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        line: end_line,
                    });
                    let mut inner = Parser::new(tokens, self.max_nesting);
                    inner.fn_depth = self.fn_depth;
                    inner.nesting = self.nesting;
                    let expr = inner.expression()?;
                    if !inner.at_end() {
                        return Err(inner.unexpected("expected `}` in template literal"));
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
            }
        }
        Ok(parts)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr::new(
        ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}
