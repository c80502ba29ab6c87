use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TreeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SourceId(pub u32);

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(id: SourceId, path: PathBuf) -> Self {
        Self { id, path }
    }
}

/// A range of source text. Lines count from one and columns from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    pub source: SourceId,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Position {
    pub fn new(source: SourceId, line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            source,
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn point(source: SourceId, line: u32, column: u32) -> Self {
        Self::new(source, line, column, line, column)
    }

    pub fn on_line(source: SourceId, line: u32, column: u32, end_column: u32) -> Self {
        Self::new(source, line, column, line, end_column)
    }

    pub fn is_point(&self) -> bool {
        self.line == self.end_line && self.column == self.end_column
    }

    pub fn union(a: &Self, b: &Self) -> Self {
        if a.line == 0 {
            return *b;
        }
        if b.line == 0 {
            return *a;
        }

        let (line, column) = if (a.line, a.column) <= (b.line, b.column) {
            (a.line, a.column)
        } else {
            (b.line, b.column)
        };
        let (end_line, end_column) = if (a.end_line, a.end_column) >= (b.end_line, b.end_column) {
            (a.end_line, a.end_column)
        } else {
            (b.end_line, b.end_column)
        };

        Self::new(a.source, line, column, end_line, end_column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}+{}", self.line, self.column)
        } else if self.line == self.end_line {
            write!(f, "{}+{}-{}", self.line, self.column, self.end_column)
        } else {
            write!(
                f,
                "{}+{} - {}+{}",
                self.line, self.column, self.end_line, self.end_column
            )
        }
    }
}

/// Parses the rendered forms `3+8`, `3+8-9` and `3+8 - 4+2`.
impl FromStr for Position {
    type Err = TreeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = || TreeError::BadPosition(text.to_string());
        let parse_point = |part: &str| -> Result<(u32, u32), TreeError> {
            let (line, column) = part.trim().split_once('+').ok_or_else(bad)?;
            let line = line.parse::<u32>().map_err(|_| bad())?;
            let column = column.parse::<u32>().map_err(|_| bad())?;
            Ok((line, column))
        };

        if let Some((start, end)) = text.split_once(" - ") {
            let (line, column) = parse_point(start)?;
            let (end_line, end_column) = parse_point(end)?;
            return Ok(Self::new(SourceId::default(), line, column, end_line, end_column));
        }

        let (line, rest) = text.trim().split_once('+').ok_or_else(bad)?;
        let line = line.parse::<u32>().map_err(|_| bad())?;
        let (column, end_column) = match rest.split_once('-') {
            Some((column, end_column)) => (
                column.parse::<u32>().map_err(|_| bad())?,
                end_column.parse::<u32>().map_err(|_| bad())?,
            ),
            None => {
                let column = rest.parse::<u32>().map_err(|_| bad())?;
                (column, column)
            }
        };
        Ok(Self::on_line(SourceId::default(), line, column, end_column))
    }
}
