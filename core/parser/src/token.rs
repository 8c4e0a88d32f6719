//! FILENAME: core/parser/src/token.rs
//! PURPOSE: Token definitions for the grouping lexer.
//! CONTEXT: Tokens are the atomic units produced by the lexer and consumed by the parser.

/// Tokens recognized by the grouping lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// A bare dimension name or a direction keyword (`asc`, `desc`).
    Identifier(String),
    /// Quoted dimension name, for names with spaces: 'Order Date'
    QuotedIdentifier(String),

    // Delimiters
    /// Level separator: ,
    Comma,
    /// Dimension separator within a level: |
    Pipe,

    // Special
    EOF,
    Illegal(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "{}", s),
            Token::QuotedIdentifier(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Token::Comma => write!(f, ","),
            Token::Pipe => write!(f, "|"),
            Token::EOF => write!(f, "end of input"),
            Token::Illegal(ch) => write!(f, "{}", ch),
        }
    }
}
