//! FILENAME: core/parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the grouping parser crate.

use crate::ast::{DimensionAst, Direction, GroupingAst, LevelAst};
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::Token;

fn names(ast: &GroupingAst) -> Vec<Vec<&str>> {
    ast.levels
        .iter()
        .map(|level| level.dimensions.iter().map(|d| d.name.as_str()).collect())
        .collect()
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn test_lexer_delimiters() {
    let mut lexer = Lexer::new("city|date , qty");
    assert_eq!(lexer.next_token(), Token::Identifier("city".to_string()));
    assert_eq!(lexer.next_token(), Token::Pipe);
    assert_eq!(lexer.next_token(), Token::Identifier("date".to_string()));
    assert_eq!(lexer.next_token(), Token::Comma);
    assert_eq!(lexer.next_token(), Token::Identifier("qty".to_string()));
    assert_eq!(lexer.next_token(), Token::EOF);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn test_lexer_keeps_name_case() {
    let mut lexer = Lexer::new("Category DESC");
    assert_eq!(lexer.next_token(), Token::Identifier("Category".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("DESC".to_string()));
}

#[test]
fn test_lexer_name_characters() {
    let mut lexer = Lexer::new("value2 sales.q1 data-part $x");
    assert_eq!(lexer.next_token(), Token::Identifier("value2".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("sales.q1".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("data-part".to_string()));
    assert_eq!(lexer.next_token(), Token::Identifier("$x".to_string()));
}

#[test]
fn test_lexer_quoted_identifier() {
    let mut lexer = Lexer::new("'Order Date'|'John''s'");
    assert_eq!(lexer.next_token(), Token::QuotedIdentifier("Order Date".to_string()));
    assert_eq!(lexer.next_token(), Token::Pipe);
    assert_eq!(lexer.next_token(), Token::QuotedIdentifier("John's".to_string()));
}

#[test]
fn test_lexer_illegal_and_unterminated() {
    let mut lexer = Lexer::new("a;b");
    assert_eq!(lexer.next_token(), Token::Identifier("a".to_string()));
    assert_eq!(lexer.next_token(), Token::Illegal(';'));

    let mut lexer = Lexer::new("'open");
    assert_eq!(lexer.next_token(), Token::Illegal('\''));
}

// ========================================
// PARSER TESTS
// ========================================

#[test]
fn test_parse_levels_and_dimensions() {
    let ast = parse("city, date").unwrap();
    assert_eq!(names(&ast), vec![vec!["city"], vec!["date"]]);

    let ast = parse("series|category, value").unwrap();
    assert_eq!(names(&ast), vec![vec!["series", "category"], vec!["value"]]);
}

#[test]
fn test_parse_directions_case_insensitive() {
    let ast = parse("city DESC|date asc, qty Desc").unwrap();
    assert_eq!(
        ast,
        GroupingAst {
            levels: vec![
                LevelAst {
                    dimensions: vec![
                        DimensionAst::new("city", Direction::Descending),
                        DimensionAst::new("date", Direction::Ascending),
                    ],
                },
                LevelAst {
                    dimensions: vec![DimensionAst::new("qty", Direction::Descending)],
                },
            ],
        }
    );
}

#[test]
fn test_parse_empty_input_is_null_grouping() {
    assert_eq!(parse("").unwrap(), GroupingAst::default());
    assert_eq!(parse("   ").unwrap().levels.len(), 0);
}

#[test]
fn test_parse_keeps_empty_levels() {
    let ast = parse("a,,b,").unwrap();
    assert_eq!(names(&ast), vec![vec!["a"], vec![], vec!["b"], vec![]]);
    assert_eq!(ast.non_empty_levels().count(), 2);
}

#[test]
fn test_parse_keyword_as_first_token_is_a_name() {
    let ast = parse("desc asc").unwrap();
    assert_eq!(ast.levels[0].dimensions[0], DimensionAst::new("desc", Direction::Ascending));
}

#[test]
fn test_parse_quoted_names() {
    let ast = parse("'Order Date' desc").unwrap();
    assert_eq!(
        ast.levels[0].dimensions[0],
        DimensionAst::new("Order Date", Direction::Descending)
    );
}

// ========================================
// ERROR TESTS
// ========================================

#[test]
fn test_error_dangling_pipe() {
    let err = parse("city|").unwrap_err();
    assert!(err.message.contains("Expected dimension name"));
    assert_eq!(err.position, 5);
    assert!(parse("city|, date").is_err());
}

#[test]
fn test_error_unknown_direction() {
    let err = parse("city date").unwrap_err();
    assert!(err.message.contains("'asc' or 'desc'"));
    assert_eq!(err.position, 5);
}

#[test]
fn test_error_trailing_token_after_direction() {
    assert!(parse("city desc date").is_err());
}

#[test]
fn test_error_illegal_character() {
    let err = parse("city;date").unwrap_err();
    assert_eq!(err.message, "Unexpected character ';'");
    assert_eq!(err.position, 4);
    assert_eq!(err.to_string(), "Parse error at 4: Unexpected character ';'");
}

#[test]
fn test_error_empty_or_unterminated_quote() {
    assert!(parse("''").is_err());
    let err = parse("  'city").unwrap_err();
    assert_eq!(err.message, "Unterminated quoted name");
    assert_eq!(err.position, 2);
}

// ========================================
// CANONICAL TEXT
// ========================================

#[test]
fn test_display_is_canonical() {
    let ast = parse("  city DESC |date,, qty asc ").unwrap();
    assert_eq!(ast.to_string(), "city desc|date, qty");
}

#[test]
fn test_display_round_trips_odd_names() {
    let text = "'Order Date' desc|'asc', 'it''s'";
    let ast = parse(text).unwrap();
    assert_eq!(ast.to_string(), text);
    assert_eq!(parse(&ast.to_string()).unwrap(), ast);
}
