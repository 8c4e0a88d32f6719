//! FILENAME: core/parser/src/lib.rs
//! PURPOSE: Library root for the grouping specification parser.
//! CONTEXT: This module exposes the lexer, parser, and AST components
//! needed to convert grouping text into a level/dimension tree.
//!
//! PIPELINE: Grouping String --> Lexer --> Tokens --> Parser --> AST --> Grouping compiler
//!
//! SUPPORTED FEATURES:
//! - Levels separated by commas: city, date
//! - Composite levels with pipes: series|category
//! - Per-dimension direction: date desc (asc is the default)
//! - Quoted names for names with spaces: 'Order Date'

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

// Register the separate tests module
#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use ast::{DimensionAst, Direction, GroupingAst, LevelAst};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::Token;
