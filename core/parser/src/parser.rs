//! FILENAME: core/parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into a GroupingAst.
//! CONTEXT: This is the second stage of the parsing pipeline. It takes tokens
//! from the Lexer and builds the level/dimension tree the grouping compiler
//! validates against a schema.
//!
//! GRAMMAR:
//!   spec       --> level ( "," level )*
//!   level      --> ( dimension ( "|" dimension )* )?
//!   dimension  --> name direction?
//!   name       --> IDENTIFIER | QUOTED_IDENTIFIER
//!   direction  --> "asc" | "desc"            // case-insensitive
//!
//! An empty level (`a,,b`) is accepted and left empty; the compiler drops it.
//! An empty input is the null grouping (no levels).

use crate::ast::{DimensionAst, Direction, GroupingAst, LevelAst};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
    /// Character offset of the offending token.
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the AST.
    pub fn parse(&mut self) -> ParseResult<GroupingAst> {
        let mut levels = Vec::new();

        if self.current_token == Token::EOF {
            return Ok(GroupingAst { levels });
        }

        loop {
            levels.push(self.parse_level()?);

            match self.current_token {
                Token::Comma => self.advance(),
                Token::EOF => break,
                Token::Illegal(ch) => {
                    return Err(self.error(format!("Unexpected character '{}'", ch)));
                }
                ref other => {
                    return Err(self.error(format!(
                        "Expected ',' or '|' after dimension, found '{}'",
                        other
                    )));
                }
            }
        }

        Ok(GroupingAst { levels })
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.lexer.token_start())
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    fn parse_level(&mut self) -> ParseResult<LevelAst> {
        let mut dimensions = Vec::new();

        // Empty level
        if matches!(self.current_token, Token::Comma | Token::EOF) {
            return Ok(LevelAst { dimensions });
        }

        dimensions.push(self.parse_dimension()?);
        while self.current_token == Token::Pipe {
            self.advance();
            dimensions.push(self.parse_dimension()?);
        }

        Ok(LevelAst { dimensions })
    }

    fn parse_dimension(&mut self) -> ParseResult<DimensionAst> {
        let name = match &self.current_token {
            Token::Identifier(name) | Token::QuotedIdentifier(name) => name.clone(),
            Token::Illegal('\'') => {
                return Err(self.error("Unterminated quoted name"));
            }
            Token::Illegal(ch) => {
                return Err(self.error(format!("Unexpected character '{}'", ch)));
            }
            other => {
                return Err(self.error(format!(
                    "Expected dimension name, found '{}'",
                    other
                )));
            }
        };
        if name.is_empty() {
            return Err(self.error("Dimension name cannot be empty"));
        }
        self.advance();

        let direction = match &self.current_token {
            Token::Identifier(word) => Some(Direction::from_keyword(word).ok_or_else(|| {
                self.error(format!(
                    "Expected 'asc' or 'desc' after '{}', found '{}'",
                    name, word
                ))
            })?),
            _ => None,
        };
        if direction.is_some() {
            self.advance();
        }
        let direction = direction.unwrap_or_default();

        Ok(DimensionAst { name, direction })
    }
}

/// Convenience function to parse a grouping specification.
pub fn parse(input: &str) -> ParseResult<GroupingAst> {
    let mut parser = Parser::new(input);
    parser.parse()
}
