//! Formula tokenizer
//!
//! Converts formula strings like "Rank(close / Delay(close, 5))" into a
//! sequence of positioned tokens that can be parsed into an expression tree.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A field name, function name or constant
    Identifier(String),
    /// + - * / ^ % == != < > <= >= && || !
    Operator(String),
    OpenParen,
    CloseParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Identifier(s) | Token::Operator(s) => write!(f, "{}", s),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// A token with the character offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, TokenizeError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let position = self.position;
            match self.next_token()? {
                Some(token) => tokens.push(Spanned { token, position }),
                None => break,
            }
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        let c = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };
        let token = match c {
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }

            // Minus is always an operator, the parser handles unary minus
            '+' | '-' | '*' | '/' | '^' | '%' => {
                self.advance();
                Token::Operator(c.to_string())
            }

            '<' | '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator(format!("{}=", c))
                } else {
                    Token::Operator(c.to_string())
                }
            }
            '=' => self.read_pair('=', "==")?,
            '&' => self.read_pair('&', "&&")?,
            '|' => self.read_pair('|', "||")?,
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator("!=".to_string())
                } else {
                    Token::Operator("!".to_string())
                }
            }

            c if c.is_ascii_digit() || c == '.' => self.read_number()?,

            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };
        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Two-character operators whose first character is not an operator on
    /// its own (`==`, `&&`, `||`).
    fn read_pair(&mut self, second: char, op: &str) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        self.advance();
        if self.peek() == Some(second) {
            self.advance();
            Ok(Token::Operator(op.to_string()))
        } else {
            Err(TokenizeError::new(
                format!("Expected '{}'", op),
                start_pos,
            ))
        }
    }

    fn push_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.push_digits(&mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.push_digits(&mut num_str);
        }

        // Exponent part (e.g., 1.5e10, 2E-5)
        if let Some(c @ ('e' | 'E')) = self.peek() {
            num_str.push(c);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.push_digits(&mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<Spanned>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
