//! A small recursive-descent parser over the token stream, sufficient to
//! recognize operand position (paths, placeholders, literals, function
//! calls) without modeling the full semantics of every underlying
//! function. Per the Design Notes, this is deliberately not a complete
//! grammar for the underlying expression language.

use super::ast::*;
use super::tokenizer::Token;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(Token),
    #[error("trailing tokens after a complete expression: {0:?}")]
    TrailingTokens(Vec<Token>),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
}

type PResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token) -> PResult<()> {
        match self.advance() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(ParseError::UnexpectedToken(t.clone())),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn finish(&self) -> PResult<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(ParseError::TrailingTokens(self.tokens[self.pos..].to_vec()))
        }
    }

    /// condition / filter / key-condition grammar entry point.
    pub fn parse_bool_expr(&mut self) -> PResult<Node> {
        let node = self.parse_or()?;
        self.finish()?;
        Ok(node)
    }

    fn parse_or(&mut self) -> PResult<Node> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Node> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Node> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary_bool()
    }

    fn parse_primary_bool(&mut self) -> PResult<Node> {
        if matches!(self.peek(), Some(Token::LParen)) {
            // Ambiguous with a parenthesized operand; try boolean first,
            // since a bare operand never stands alone as a condition.
            self.advance();
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        if let Some(Token::Ident(name)) = self.peek().cloned() {
            if let Some(func) = Function::from_ident(&name) {
                let call = self.parse_func_call(func)?;
                // A function call is a complete boolean predicate on its own
                // (`attribute_exists(#f)`), but a value-returning function
                // like `size(#a)` may also be the left operand of a
                // comparison (`size(#a) > :v`, §4.E's function set); only
                // treat it as standalone once no compare operator follows.
                if self.peek_compare_op().is_some() {
                    let op = self.parse_compare_op()?;
                    let rhs = self.parse_operand()?;
                    return Ok(Node::Compare(Box::new(call), op, Box::new(rhs)));
                }
                return Ok(call);
            }
        }

        // Otherwise this must be `operand compare_op operand`.
        let lhs = self.parse_operand()?;
        let op = self.parse_compare_op()?;
        let rhs = self.parse_operand()?;
        Ok(Node::Compare(Box::new(lhs), op, Box::new(rhs)))
    }

    fn peek_compare_op(&self) -> Option<CompareOp> {
        match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn parse_compare_op(&mut self) -> PResult<CompareOp> {
        match self.advance() {
            Some(Token::Eq) => Ok(CompareOp::Eq),
            Some(Token::Ne) => Ok(CompareOp::Ne),
            Some(Token::Lt) => Ok(CompareOp::Lt),
            Some(Token::Le) => Ok(CompareOp::Le),
            Some(Token::Gt) => Ok(CompareOp::Gt),
            Some(Token::Ge) => Ok(CompareOp::Ge),
            Some(t) => Err(ParseError::UnexpectedToken(t.clone())),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn parse_func_call(&mut self, func: Function) -> PResult<Node> {
        self.advance(); // the function-name identifier
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            args.push(self.parse_operand()?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                args.push(self.parse_operand()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Node::FuncCall(func, args))
    }

    /// Parses one value-position operand: a path, a placeholder, a
    /// literal, a function call, or (SET-clause only) an arithmetic
    /// expression over two operands.
    pub fn parse_operand(&mut self) -> PResult<Node> {
        let base = self.parse_operand_atom()?;
        if matches!(self.peek(), Some(Token::Plus) | Some(Token::Minus)) {
            let op = match self.advance() {
                Some(Token::Plus) => ArithOp::Plus,
                Some(Token::Minus) => ArithOp::Minus,
                _ => unreachable!(),
            };
            let rhs = self.parse_operand_atom()?;
            return Ok(Node::Arith(Box::new(base), op, Box::new(rhs)));
        }
        Ok(base)
    }

    fn parse_operand_atom(&mut self) -> PResult<Node> {
        match self.peek().cloned() {
            Some(Token::Value(v)) => {
                self.advance();
                Ok(Node::ValuePlaceholder(v))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Node::StrLiteral(s))
            }
            Some(Token::Num(n)) => {
                self.advance();
                Ok(Node::NumLiteral(n))
            }
            Some(Token::Ident(name)) if Function::from_ident(&name).is_some() => {
                let func = Function::from_ident(&name).unwrap();
                self.parse_func_call(func)
            }
            Some(Token::Ident(_)) | Some(Token::Name(_)) => Ok(Node::Path(self.parse_path()?)),
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_operand()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(ParseError::UnexpectedToken(t)),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    pub fn parse_path(&mut self) -> PResult<Path> {
        let (root_is_placeholder, root_text) = match self.advance() {
            Some(Token::Name(n)) => (true, n.clone()),
            Some(Token::Ident(n)) => (false, n.clone()),
            Some(t) => return Err(ParseError::UnexpectedToken(t.clone())),
            None => return Err(ParseError::UnexpectedEof),
        };
        let mut path = Path {
            root_is_placeholder,
            root_text,
            segments: Vec::new(),
        };
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(n)) => path.segments.push(PathSegment::Field(n.clone())),
                        Some(Token::Name(n)) => path.segments.push(PathSegment::Field(n.clone())),
                        Some(t) => return Err(ParseError::UnexpectedToken(t.clone())),
                        None => return Err(ParseError::UnexpectedEof),
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Num(n)) => {
                            let idx: u64 = n.parse().map_err(|_| {
                                ParseError::UnexpectedToken(Token::Num(n.clone()))
                            })?;
                            path.segments.push(PathSegment::Index(idx));
                        }
                        Some(t) => return Err(ParseError::UnexpectedToken(t.clone())),
                        None => return Err(ParseError::UnexpectedEof),
                    }
                    self.expect(&Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(path)
    }

    /// Projection expression grammar: a comma-separated list of paths.
    pub fn parse_projection(&mut self) -> PResult<Vec<Path>> {
        let mut paths = vec![self.parse_path()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            paths.push(self.parse_path()?);
        }
        self.finish()?;
        Ok(paths)
    }

    /// Update expression grammar: one or more `SET`/`REMOVE`/`ADD`/`DELETE`
    /// clauses, each holding a comma-separated list of actions.
    pub fn parse_update(&mut self) -> PResult<UpdateExpr> {
        let mut expr = UpdateExpr::default();
        loop {
            match self.peek() {
                Some(Token::Set) => {
                    self.advance();
                    loop {
                        let path = self.parse_path()?;
                        self.expect(&Token::Eq)?;
                        let value = self.parse_operand()?;
                        expr.actions.push(UpdateAction::Set(path, value));
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                Some(Token::Remove) => {
                    self.advance();
                    loop {
                        let path = self.parse_path()?;
                        expr.actions.push(UpdateAction::Remove(path));
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                Some(Token::Add) => {
                    self.advance();
                    loop {
                        let path = self.parse_path()?;
                        let value = self.parse_operand()?;
                        expr.actions.push(UpdateAction::Add(path, value));
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                Some(Token::Delete) => {
                    self.advance();
                    loop {
                        let path = self.parse_path()?;
                        let value = self.parse_operand()?;
                        expr.actions.push(UpdateAction::Delete(path, value));
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                Some(t) => return Err(ParseError::UnexpectedToken(t.clone())),
                None => break,
            }
        }
        self.finish()?;
        Ok(expr)
    }
}
