//! FILENAME: core/parser/src/ast.rs
//! PURPOSE: Abstract syntax tree of a grouping specification.
//! CONTEXT: The parser produces a `GroupingAst`. Its `Display` output is the
//! canonical text form, which parses back to an equal tree.

use std::fmt;

use crate::lexer::is_name_char;

/// Sort direction of one dimension within a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn is_descending(&self) -> bool {
        matches!(self, Direction::Descending)
    }

    /// Parses a direction keyword, ignoring case.
    pub fn from_keyword(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("asc") {
            Some(Direction::Ascending)
        } else if word.eq_ignore_ascii_case("desc") {
            Some(Direction::Descending)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionAst {
    pub name: String,
    pub direction: Direction,
}

impl DimensionAst {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        DimensionAst {
            name: name.into(),
            direction,
        }
    }
}

/// One level: dimensions evaluated together. May be empty (`a,,b`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LevelAst {
    pub dimensions: Vec<DimensionAst>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupingAst {
    pub levels: Vec<LevelAst>,
}

impl GroupingAst {
    /// Levels that name at least one dimension.
    pub fn non_empty_levels(&self) -> impl Iterator<Item = &LevelAst> {
        self.levels.iter().filter(|level| !level.dimensions.is_empty())
    }
}

/// Writes a name bare when the lexer would read it back as one identifier
/// that is not a direction keyword, otherwise quoted.
fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let bare = !name.is_empty()
        && name.chars().all(is_name_char)
        && Direction::from_keyword(name).is_none();
    if bare {
        write!(f, "{}", name)
    } else {
        write!(f, "'{}'", name.replace('\'', "''"))
    }
}

impl fmt::Display for DimensionAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_name(f, &self.name)?;
        if self.direction.is_descending() {
            write!(f, " desc")?;
        }
        Ok(())
    }
}

impl fmt::Display for LevelAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dim) in self.dimensions.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{}", dim)?;
        }
        Ok(())
    }
}

impl fmt::Display for GroupingAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.non_empty_levels().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", level)?;
        }
        Ok(())
    }
}
