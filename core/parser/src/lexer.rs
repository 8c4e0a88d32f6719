//! FILENAME: core/parser/src/lexer.rs
//! PURPOSE: Scans a grouping specification string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace skipping, bare names, and quoted names.
//!
//! SUPPORTED DELIMITERS:
//! - Single char: , |
//! - Quoted identifiers: 'Order Date'

use crate::token::Token;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    /// Characters consumed so far.
    position: usize,
    /// Character offset where the last returned token starts.
    token_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            position: 0,
            token_start: 0,
        }
    }

    /// Character offset of the last token returned by `next_token`.
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.input.next();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.token_start = self.position;

        match self.bump() {
            Some(',') => Token::Comma,
            Some('|') => Token::Pipe,

            // Handle single quotes for names with spaces
            Some('\'') => self.read_quoted_identifier(),

            Some(ch) if is_name_char(ch) => self.read_identifier(ch),

            // End of input
            None => Token::EOF,

            // Unknown character
            Some(ch) => Token::Illegal(ch),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump();
        }
    }

    /// Reads a quoted identifier: 'Order Date'. A doubled quote is an escaped quote.
    fn read_quoted_identifier(&mut self) -> Token {
        let mut result = String::new();
        while let Some(&ch) = self.input.peek() {
            if ch == '\'' {
                self.bump();
                if self.input.peek() == Some(&'\'') {
                    result.push('\'');
                    self.bump();
                } else {
                    return Token::QuotedIdentifier(result);
                }
            } else {
                result.push(ch);
                self.bump();
            }
        }
        // Unterminated quote
        Token::Illegal('\'')
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            if is_name_char(ch) {
                ident.push(ch);
                self.bump();
            } else {
                break;
            }
        }

        // Names are case-sensitive; only the direction keywords are not,
        // and the parser decides that.
        Token::Identifier(ident)
    }
}

/// Returns true if `ch` can appear in a bare dimension name.
/// Supports letters, digits, and `_ . $ -` (for names like `value2`,
/// `sales.q1` or `data-part`).
pub fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '$' | '-')
}
