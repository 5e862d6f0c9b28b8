// File: src/parser.rs
//
// Recursive-descent parser producing the AST in `ast.rs`. Precedence
// climbs: assignment < or < and < equality < comparison < shovel < bitor
// < bitxor < bitand < term < factor < unary < call/postfix < primary.

use crate::ast::*;
use crate::errors::{CompileError, SourceLocation};
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lexer: Lexer<'a>,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    /// Builds a parser directly over a pre-tokenized stream (teacher's
    /// `Parser::new(tokenize(src))` calling convention).
    pub fn new(tokens: Vec<Token>) -> Parser<'static> {
        Parser { tokens, pos: 0, lexer: Lexer::new("") }
    }

    /// Builds a parser that can fall back to the lexer to rescan `/` as a
    /// regex literal when one is expected in primary-expression position.
    pub fn from_source(source: &'a str) -> Self {
        let tokens = crate::lexer::tokenize(source);
        Parser { tokens, pos: 0, lexer: Lexer::new(source) }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn loc(&self) -> SourceLocation {
        self.tokens.get(self.pos).map(|t| t.location.clone()).unwrap_or_else(SourceLocation::unknown)
    }

    fn line(&self) -> usize {
        self.loc().line
    }

    fn advance(&mut self) -> TokenKind {
        let tok = self.tokens.get(self.pos).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::new(format!("expected {what}"), self.loc()))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> PResult<String> {
        if let TokenKind::Identifier(name) = self.peek().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(CompileError::new(format!("expected {what}"), self.loc()))
        }
    }

    pub fn parse(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    // ---- statements ----

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(stmts)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        match self.peek().clone() {
            TokenKind::Var => self.var_decl(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Foreach => self.foreach_stmt(),
            TokenKind::Fun => {
                self.advance();
                Ok(Stmt::FunctionDecl(self.function_tail(true)?))
            }
            TokenKind::Class => self.class_decl(),
            TokenKind::Module => self.module_decl(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Throw => {
                let line = self.line();
                self.advance();
                let e = self.expression()?;
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Throw(e, line))
            }
            TokenKind::Return => {
                let line = self.line();
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RightBrace) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Return(value, line))
            }
            TokenKind::Break => {
                self.advance();
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Continue)
            }
            TokenKind::Print => {
                self.advance();
                let e = self.expression()?;
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Print(e))
            }
            TokenKind::LeftBrace => Ok(Stmt::Block(self.block()?)),
            _ => {
                let e = self.expression()?;
                self.matches(&TokenKind::Semicolon);
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn var_decl(&mut self) -> PResult<Stmt> {
        self.advance(); // 'var'
        let name = self.expect_identifier("variable name")?;
        let init = if self.matches(&TokenKind::Equal) { Some(self.expression()?) } else { None };
        self.matches(&TokenKind::Semicolon);
        Ok(Stmt::VarDecl { name, init })
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "')' after condition")?;
        let then_branch = self.block()?;
        let else_branch =
            if self.matches(&TokenKind::Else) {
                if self.check(&TokenKind::If) {
                    Some(vec![self.if_stmt()?])
                } else {
                    Some(self.block()?)
                }
            } else {
                None
            };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "')' after condition")?;
        let body = self.block()?;
        Ok(Stmt::While { condition, body })
    }

    fn foreach_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        self.expect(TokenKind::LeftParen, "'(' after 'foreach'")?;
        let mut vars = vec![self.expect_identifier("loop variable")?];
        while self.matches(&TokenKind::Comma) {
            vars.push(self.expect_identifier("loop variable")?);
        }
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let body = self.block()?;
        Ok(Stmt::Foreach { vars, iterable, body, line })
    }

    fn param_list(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LeftParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.matches(&TokenKind::Star) {
                    let name = self.expect_identifier("rest parameter name")?;
                    params.push(Param { name, kind: ParamKind::Splat });
                } else if self.matches(&TokenKind::Amp) {
                    let name = self.expect_identifier("block parameter name")?;
                    params.push(Param { name, kind: ParamKind::Block });
                } else {
                    let name = self.expect_identifier("parameter name")?;
                    if self.matches(&TokenKind::Colon) {
                        let default = if self.check(&TokenKind::Comma) || self.check(&TokenKind::RightParen) {
                            None
                        } else {
                            Some(self.expression()?)
                        };
                        params.push(Param { name, kind: ParamKind::Keyword(default) });
                    } else if self.matches(&TokenKind::Equal) {
                        let default = self.expression()?;
                        params.push(Param { name, kind: ParamKind::Default(default) });
                    } else {
                        params.push(Param { name, kind: ParamKind::Required });
                    }
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')' after parameters")?;
        Ok(params)
    }

    fn function_tail(&mut self, named: bool) -> PResult<FunctionNode> {
        let line = self.line();
        let name = if named { Some(self.expect_identifier("function name")?) } else { None };
        let params = self.param_list()?;
        let body = self.block()?;
        Ok(FunctionNode { name, params, body, is_initializer: false, line })
    }

    fn method_decl(&mut self) -> PResult<MethodDecl> {
        let kind = if self.matches(&TokenKind::Class) {
            MethodKind::StaticMethod
        } else {
            MethodKind::Method
        };
        let kind = if let TokenKind::Identifier(id) = self.peek().clone() {
            if id == "get" && kind == MethodKind::Method {
                self.advance();
                MethodKind::Getter
            } else if id == "set" && kind == MethodKind::Method {
                self.advance();
                MethodKind::Setter
            } else {
                kind
            }
        } else {
            kind
        };
        let line = self.line();
        let name = self.expect_identifier("method name")?;
        let is_initializer = name == "init";
        let params = self.param_list()?;
        let body = self.block()?;
        Ok(MethodDecl {
            kind,
            function: FunctionNode { name: Some(name), params, body, is_initializer, line },
        })
    }

    fn class_decl(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("class name")?;
        let superclass =
            if self.matches(&TokenKind::Less) { Some(self.expect_identifier("superclass name")?) } else { None };
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            methods.push(self.method_decl()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::ClassDecl { name, superclass, methods, line })
    }

    fn module_decl(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("module name")?;
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            methods.push(self.method_decl()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::ModuleDecl { name, methods, line })
    }

    fn try_stmt(&mut self) -> PResult<Stmt> {
        self.advance();
        let body = self.block()?;
        let mut catches = Vec::new();
        while self.check(&TokenKind::Catch) {
            let line = self.line();
            self.advance();
            self.expect(TokenKind::LeftParen, "'(' after 'catch'")?;
            let class_name = self.expect_identifier("exception class name")?;
            let binding = if let TokenKind::Identifier(n) = self.peek().clone() {
                self.advance();
                Some(n)
            } else {
                None
            };
            self.expect(TokenKind::RightParen, "')'")?;
            let catch_body = self.block()?;
            catches.push(CatchClause { class_name, binding, body: catch_body, line });
        }
        let ensure = if self.matches(&TokenKind::Ensure) { Some(self.block()?) } else { None };
        Ok(Stmt::Try { body, catches, ensure })
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or_expr()?;
        if self.matches(&TokenKind::Equal) {
            let value = self.assignment()?;
            return match &expr {
                Expr::Identifier(_) | Expr::Index { .. } | Expr::FieldGet { .. } => {
                    Ok(Expr::Assign { target: Box::new(expr), value: Box::new(value) })
                }
                _ => Err(CompileError::new("invalid assignment target", self.loc())),
            };
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.matches(&TokenKind::Or) {
            let right = self.and_expr()?;
            expr = Expr::Logical { op: LogicalOp::Or, left: Box::new(expr), right: Box::new(right) };
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&TokenKind::And) {
            let right = self.equality()?;
            expr = Expr::Logical { op: LogicalOp::And, left: Box::new(expr), right: Box::new(right) };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let line = self.line();
            let op = match self.peek() {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::BangEqual => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.shovel()?;
        loop {
            let line = self.line();
            let op = match self.peek() {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::LessEqual => BinaryOp::LessEq,
                TokenKind::GreaterEqual => BinaryOp::GreaterEq,
                _ => break,
            };
            self.advance();
            let right = self.shovel()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn shovel(&mut self) -> PResult<Expr> {
        let mut expr = self.bitor()?;
        loop {
            let line = self.line();
            let op = match self.peek() {
                TokenKind::ShovelLeft => BinaryOp::ShovelLeft,
                TokenKind::ShovelRight => BinaryOp::ShovelRight,
                _ => break,
            };
            self.advance();
            let right = self.bitor()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn bitor(&mut self) -> PResult<Expr> {
        let mut expr = self.bitxor()?;
        while self.check(&TokenKind::Pipe) {
            let line = self.line();
            self.advance();
            let right = self.bitxor()?;
            expr = Expr::Binary { op: BinaryOp::BitOr, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn bitxor(&mut self) -> PResult<Expr> {
        let mut expr = self.bitand()?;
        while self.check(&TokenKind::Caret) {
            let line = self.line();
            self.advance();
            let right = self.bitand()?;
            expr = Expr::Binary { op: BinaryOp::BitXor, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn bitand(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        while self.check(&TokenKind::Amp) {
            let line = self.line();
            self.advance();
            let right = self.term()?;
            expr = Expr::Binary { op: BinaryOp::BitAnd, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        loop {
            let line = self.line();
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;
        loop {
            let line = self.line();
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let line = self.line();
        let op = match self.peek() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Negate),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::Unary { op, expr: Box::new(expr), line });
        }
        self.call()
    }

    fn arg_list(&mut self) -> PResult<Vec<Arg>> {
        self.expect(TokenKind::LeftParen, "'(' to start argument list")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.matches(&TokenKind::Star) {
                    args.push(Arg::Splat(self.expression()?));
                } else if self.matches(&TokenKind::Amp) {
                    args.push(Arg::Block(self.expression()?));
                } else if let TokenKind::Identifier(name) = self.peek().clone() {
                    if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon) {
                        self.advance();
                        self.advance();
                        args.push(Arg::Keyword(name, self.expression()?));
                    } else {
                        args.push(Arg::Positional(self.expression()?));
                    }
                } else {
                    args.push(Arg::Positional(self.expression()?));
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')' to close argument list")?;
        Ok(args)
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let line = self.line();
            if self.matches(&TokenKind::Dot) {
                let name = self.expect_identifier("property name after '.'")?;
                if self.check(&TokenKind::LeftParen) {
                    let args = self.arg_list()?;
                    expr = Expr::Invoke { receiver: Box::new(expr), method: name, args, line };
                } else {
                    expr = Expr::FieldGet { object: Box::new(expr), name };
                }
            } else if self.check(&TokenKind::LeftBracket) {
                self.advance();
                let index = self.expression()?;
                self.expect(TokenKind::RightBracket, "']' after index expression")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index), line };
            } else if self.check(&TokenKind::LeftParen) {
                let args = self.arg_list()?;
                expr = Expr::Call { callee: Box::new(expr), args, line };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::False => {
                self.advance();
                Ok(Expr::False)
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::True)
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::String(s, kind) => {
                self.advance();
                Ok(Expr::StringLit { value: s, kind })
            }
            TokenKind::Regex(p, f) => {
                self.advance();
                Ok(Expr::RegexLit { pattern: p, flags: f })
            }
            TokenKind::Slash => {
                // Regex literal in value position: reparse from the
                // current source offset via the lexer's dedicated scanner.
                let tok = self.lexer.scan_regex_literal();
                self.pos += 1;
                if let TokenKind::Regex(p, f) = tok.kind {
                    Ok(Expr::RegexLit { pattern: p, flags: f })
                } else {
                    Err(CompileError::new("malformed regex literal", self.loc()))
                }
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This)
            }
            TokenKind::Super => {
                self.advance();
                self.expect(TokenKind::Dot, "'.' after 'super'")?;
                let name = self.expect_identifier("method name after 'super.'")?;
                if self.check(&TokenKind::LeftParen) {
                    let args = self.arg_list()?;
                    Ok(Expr::SuperCall { method: name, args, line })
                } else {
                    Ok(Expr::SuperGet(name))
                }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RightParen, "')' after expression")?;
                Ok(Expr::Grouping(Box::new(expr)))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        if self.matches(&TokenKind::Star) {
                            elements.push(ArrayElement::Spread(self.expression()?));
                        } else {
                            elements.push(ArrayElement::Single(self.expression()?));
                        }
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RightBracket, "']' to close array literal")?;
                Ok(Expr::ArrayLit(elements))
            }
            TokenKind::Fun => {
                self.advance();
                let named = matches!(self.peek(), TokenKind::Identifier(_));
                Ok(Expr::Function(Box::new(self.function_tail(named)?)))
            }
            _ => Err(CompileError::new("expected expression", self.loc())),
        }
    }
}

/// Convenience entry point matching the teacher's `tokenize` + `Parser::new`
/// call convention, but threading a file-backed lexer through so regex
/// literals in value position can be rescanned.
pub fn parse_source(source: &str) -> PResult<Vec<Stmt>> {
    Parser::from_source(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_and_var() {
        let stmts = parse_source("var a; a = 1; a + 2;").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::VarDecl { .. }));
    }

    #[test]
    fn parses_class_with_superclass() {
        let stmts = parse_source("class B < A { greet() { return 1; } }").unwrap();
        match &stmts[0] {
            Stmt::ClassDecl { name, superclass, methods, .. } => {
                assert_eq!(name, "B");
                assert_eq!(superclass.as_deref(), Some("A"));
                assert_eq!(methods.len(), 1);
            }
            _ => panic!("expected class decl"),
        }
    }

    #[test]
    fn parses_try_catch_ensure() {
        let stmts = parse_source(
            "try { doThrow(); } catch (MyError e) { e; } ensure { cleanup(); }",
        )
        .unwrap();
        match &stmts[0] {
            Stmt::Try { catches, ensure, .. } => {
                assert_eq!(catches.len(), 1);
                assert!(ensure.is_some());
            }
            _ => panic!("expected try stmt"),
        }
    }

    #[test]
    fn parses_foreach() {
        let stmts = parse_source("foreach (x in items) { print x; }").unwrap();
        assert!(matches!(stmts[0], Stmt::Foreach { .. }));
    }
}
