//! Formula parser
//!
//! Converts a sequence of tokens into an expression tree.
//! Uses recursive descent parsing with operator precedence. Function names
//! are resolved against a [`FunctionTable`] while parsing, so an unknown
//! function never reaches evaluation.

use super::functions::{Constant, Function, FunctionTable, NameStyle};
use super::tokenizer::{tokenize, Spanned, Token, TokenizeError};
use crate::error::PanelError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn from_symbol(s: &str) -> Option<BinaryOp> {
        let op = match s {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "^" => BinaryOp::Pow,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Constant(Constant),
    /// A field name
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Field names referenced anywhere in the tree.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Variable(name) => {
                out.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_variables(out),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_variables(out)),
            Expr::Number(_) | Expr::Constant(_) => {}
        }
    }

    /// Fully parenthesised text with function names in `style`.
    pub fn render(&self, style: NameStyle) -> String {
        match self {
            Expr::Number(n) => format!("{}", n),
            Expr::Constant(c) => c.name().to_string(),
            Expr::Variable(name) => name.clone(),
            Expr::Unary { op: UnaryOp::Neg, operand } => format!("-{}", operand.render(style)),
            Expr::Unary { op: UnaryOp::Not, operand } => format!("!{}", operand.render(style)),
            Expr::Binary { op, left, right } => format!(
                "({} {} {})",
                left.render(style),
                op.symbol(),
                right.render(style)
            ),
            Expr::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| a.render(style)).collect();
                format!("{}({})", style.apply(function.name()), args.join(", "))
            }
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Syntax { message: String, position: usize },
    UnknownFunction { name: String, position: usize },
}

impl ParseError {
    fn syntax(message: impl Into<String>, position: usize) -> Self {
        ParseError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            ParseError::Syntax { position, .. } | ParseError::UnknownFunction { position, .. } => {
                *position
            }
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Syntax { message, position } => {
                write!(f, "Parse error at position {}: {}", position, message)
            }
            ParseError::UnknownFunction { name, position } => {
                write!(f, "Unknown function '{}' at position {}", name, position)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<TokenizeError> for ParseError {
    fn from(e: TokenizeError) -> Self {
        ParseError::syntax(e.message, e.position)
    }
}

impl From<ParseError> for PanelError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Syntax { .. } => PanelError::Parse(e.to_string()),
            ParseError::UnknownFunction { .. } => PanelError::Resolution(e.to_string()),
        }
    }
}

/// Parser for formula tokens
pub struct Parser<'t> {
    tokens: Vec<Spanned>,
    position: usize,
    end: usize,
    functions: &'t FunctionTable,
}

impl<'t> Parser<'t> {
    /// `source_len` is the character length of the formula, used to report
    /// errors at end of input.
    pub fn new(tokens: Vec<Spanned>, source_len: usize, functions: &'t FunctionTable) -> Self {
        Self {
            tokens,
            position: 0,
            end: source_len,
            functions,
        }
    }

    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::syntax("Empty expression", 0));
        }
        let expr = self.expression()?;

        if let Some(spanned) = self.tokens.get(self.position) {
            return Err(ParseError::syntax(
                format!("Unexpected token '{}' after expression", spanned.token),
                spanned.position,
            ));
        }

        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    /// Character offset of the current token.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.end, |s| s.position)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, op: &str) -> bool {
        if let Some(Token::Operator(s)) = self.peek() {
            if s == op {
                self.advance();
                return true;
            }
        }
        false
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<BinaryOp> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = BinaryOp::from_symbol(s);
                self.advance();
                return op;
            }
        }
        None
    }

    /// Left-associative binary level over `ops`.
    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        while let Some(op) = self.match_any_operator(ops) {
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["&&"], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["==", "!=", "<", ">", "<=", ">="], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    /// Unary: ( "-" | "!" ) unary | power
    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.match_operator("-") {
            UnaryOp::Neg
        } else if self.match_operator("!") {
            UnaryOp::Not
        } else {
            return self.power();
        };
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Power: primary ( "^" unary )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.primary()?;

        if self.match_operator("^") {
            let right = self.unary()?;
            Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            })
        } else {
            Ok(left)
        }
    }

    /// Primary: NUMBER | IDENTIFIER | IDENTIFIER "(" arguments ")" | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.offset();
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                if self.match_token(&Token::OpenParen) {
                    self.call(name, start)
                } else if let Some(constant) = Constant::lookup(&name) {
                    Ok(Expr::Constant(constant))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::syntax(
                        "Expected ')' after expression",
                        self.offset(),
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::syntax(
                format!("Unexpected token '{}'", token),
                start,
            )),
            None => Err(ParseError::syntax("Unexpected end of expression", start)),
        }
    }

    fn call(&mut self, name: String, start: usize) -> Result<Expr, ParseError> {
        let function = self
            .functions
            .resolve(&name)
            .ok_or_else(|| ParseError::UnknownFunction {
                name: name.clone(),
                position: start,
            })?;

        let args = self.arguments()?;
        if !self.match_token(&Token::CloseParen) {
            return Err(ParseError::syntax(
                "Expected ')' after function arguments",
                self.offset(),
            ));
        }

        if let Some(arity) = function.arity() {
            if args.len() != arity {
                return Err(ParseError::syntax(
                    format!(
                        "Function '{}' expects {} arguments, got {}",
                        function.name(),
                        arity,
                        args.len()
                    ),
                    start,
                ));
            }
        }
        Ok(Expr::Call { function, args })
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);
        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }
}

/// Tokenize and parse a formula string.
pub fn parse(formula: &str, functions: &FunctionTable) -> Result<Expr, ParseError> {
    let tokens = tokenize(formula)?;
    Parser::new(tokens, formula.chars().count(), functions).parse()
}
