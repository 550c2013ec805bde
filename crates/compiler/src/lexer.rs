//! Lexer for Opal source text
//!
//! Consumes characters one at a time with one-character lookahead and
//! produces tokens on demand. Whitespace is skipped (newlines advance the
//! line counter and reset the column); `//` comments become `Comment`
//! tokens, which the parser suppresses. End of input yields the `Eos`
//! sentinel.

use crate::error::LexerError;
use crate::token::{Token, TokenType, keyword_type};
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    /// 1-indexed line of the character last read.
    line: usize,
    /// 1-indexed column of the character last read; 0 before the first read
    /// of a line.
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 0,
        }
    }

    /// Returns and removes one character from the input stream.
    fn read(&mut self) -> Option<char> {
        self.column += 1;
        self.chars.next()
    }

    /// Returns but doesn't remove one character from the input stream.
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> LexerError {
        LexerError::new(message, line, column)
    }

    /// Return the next token in the input stream.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        let ch = loop {
            match self.read() {
                None => {
                    return Ok(Token::new(TokenType::Eos, "", self.line, self.column));
                }
                Some('\n') => {
                    self.line += 1;
                    self.column = 0;
                }
                Some(' ') | Some('\t') | Some('\r') => {}
                Some(ch) => break ch,
            }
        };
        let line = self.line;
        let col = self.column;

        // Keywords and identifiers
        if ch.is_ascii_alphabetic() {
            let mut lexeme = String::from(ch);
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                lexeme.push(self.read().expect("peeked character"));
            }
            let token_type = keyword_type(&lexeme).unwrap_or(TokenType::Id);
            return Ok(Token::new(token_type, lexeme, line, col));
        }

        // Integer and double literals
        if ch.is_ascii_digit() {
            if ch == '0' && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.error("leading zero in number", line, col));
            }
            let mut lexeme = String::from(ch);
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                lexeme.push(self.read().expect("peeked character"));
            }
            if self.peek() == Some('.') {
                lexeme.push(self.read().expect("peeked character"));
                if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    return Err(self.error("missing digit after decimal point", line, col));
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    lexeme.push(self.read().expect("peeked character"));
                }
                return Ok(Token::new(TokenType::DoubleVal, lexeme, line, col));
            }
            return Ok(Token::new(TokenType::IntVal, lexeme, line, col));
        }

        // String literals: delimited by '"', no raw newlines
        if ch == '"' {
            let mut lexeme = String::new();
            loop {
                match self.peek() {
                    None | Some('\n') => {
                        return Err(self.error("unterminated string literal", line, col));
                    }
                    Some('"') => {
                        self.read();
                        return Ok(Token::new(TokenType::StringVal, lexeme, line, col));
                    }
                    Some(_) => lexeme.push(self.read().expect("peeked character")),
                }
            }
        }

        // Comments: '//' to end of line
        if ch == '/' && self.peek() == Some('/') {
            self.read();
            let mut lexeme = String::new();
            while matches!(self.peek(), Some(c) if c != '\n') {
                lexeme.push(self.read().expect("peeked character"));
            }
            return Ok(Token::new(TokenType::Comment, lexeme, line, col));
        }

        // Punctuation and operators; multi-character operators are greedy
        let token = match ch {
            '+' => Token::new(TokenType::Plus, "+", line, col),
            '-' => Token::new(TokenType::Minus, "-", line, col),
            '*' => Token::new(TokenType::Times, "*", line, col),
            '/' => Token::new(TokenType::Divide, "/", line, col),
            '.' => Token::new(TokenType::Dot, ".", line, col),
            ',' => Token::new(TokenType::Comma, ",", line, col),
            '(' => Token::new(TokenType::LParen, "(", line, col),
            ')' => Token::new(TokenType::RParen, ")", line, col),
            '[' => Token::new(TokenType::LBracket, "[", line, col),
            ']' => Token::new(TokenType::RBracket, "]", line, col),
            ';' => Token::new(TokenType::Semicolon, ";", line, col),
            '{' => Token::new(TokenType::LBrace, "{", line, col),
            '}' => Token::new(TokenType::RBrace, "}", line, col),
            '=' => {
                if self.peek() == Some('=') {
                    self.read();
                    Token::new(TokenType::Equal, "==", line, col)
                } else {
                    Token::new(TokenType::Assign, "=", line, col)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.read();
                    Token::new(TokenType::NotEqual, "!=", line, col)
                } else {
                    return Err(self.error("bare '!' is not an operator", line, col));
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.read();
                    Token::new(TokenType::LessEq, "<=", line, col)
                } else {
                    Token::new(TokenType::Less, "<", line, col)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.read();
                    Token::new(TokenType::GreaterEq, ">=", line, col)
                } else {
                    Token::new(TokenType::Greater, ">", line, col)
                }
            }
            other => {
                return Err(self.error(format!("invalid symbol '{}'", other), line, col));
            }
        };
        Ok(token)
    }
}

/// Lex an entire source string, including the trailing `Eos` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.token_type == TokenType::Eos;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
