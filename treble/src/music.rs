//! Patterns for matching musical rows.

use std::fmt::{Display, Formatter, Write};

use itertools::Itertools;

use crate::{Bell, Row, Stage};

/// An error created when a string can't be parsed into a [`Pattern`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PatternError {
    /// A character which is neither a bell name nor a wildcard
    UnknownChar(char),
    /// The pattern has a different length to the stage it's for
    WrongLength { expected: usize, found: usize },
}

impl Display for PatternError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::UnknownChar(c) => {
                write!(f, "character {:?} is not a bell name or 'X'", c)
            }
            PatternError::WrongLength { expected, found } => {
                write!(f, "pattern has {} places but the stage has {}", found, expected)
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// A pattern over the rows of one stage, e.g. `XXXX5678`.  Each place either requires a specific
/// [`Bell`] or is a wildcard (written `X` or `x`).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Pattern {
    elems: Vec<Option<Bell>>,
}

impl Pattern {
    /// Parses a `Pattern`, requiring it to cover every place of `stage`.
    ///
    /// # Example
    /// ```
    /// use treble::{music::Pattern, RowBuf, Stage};
    ///
    /// let queens = Pattern::parse("xxxx5678", Stage::MAJOR).unwrap();
    /// assert!(queens.matches(&RowBuf::parse("12345678").unwrap()));
    /// assert!(!queens.matches(&RowBuf::parse("13527486").unwrap()));
    /// ```
    pub fn parse(s: &str, stage: Stage) -> Result<Self, PatternError> {
        let elems = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                'x' | 'X' | '*' | '?' => Ok(None),
                c => Bell::from_name(c).map(Some).ok_or(PatternError::UnknownChar(c)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if elems.len() != stage.num_bells() {
            return Err(PatternError::WrongLength {
                expected: stage.num_bells(),
                found: elems.len(),
            });
        }
        Ok(Pattern { elems })
    }

    /// The [`Stage`] this `Pattern` matches rows of.
    pub fn stage(&self) -> Stage {
        Stage::new(self.elems.len() as u8)
    }

    /// `true` if every non-wildcard place of this `Pattern` agrees with `row`.
    pub fn matches(&self, row: &Row) -> bool {
        self.elems.len() == row.stage().num_bells()
            && self
                .elems
                .iter()
                .zip_eq(row.bell_iter())
                .all(|(elem, bell)| elem.map_or(true, |required| required == bell))
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for elem in &self.elems {
            match elem {
                Some(bell) => write!(f, "{}", bell)?,
                None => f.write_char('x')?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RowBuf;

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            Pattern::parse("xxxx567", Stage::MAJOR),
            Err(PatternError::WrongLength { expected: 8, found: 7 })
        );
        assert_eq!(
            Pattern::parse("xxxx567!", Stage::MAJOR),
            Err(PatternError::UnknownChar('!'))
        );
    }

    #[test]
    fn wildcards_match_anything(){
        let any = Pattern::parse("xxxxxxxx", Stage::MAJOR).unwrap();
        assert!(any.matches(&RowBuf::parse("86421357").unwrap()));
    }

    #[test]
    fn back_bells() {
        let tittums = Pattern::parse("xxxxx678", Stage::MAJOR).unwrap();
        assert!(tittums.matches(&RowBuf::parse("15243678").unwrap()));
        assert!(!tittums.matches(&RowBuf::parse("15243687").unwrap()));
    }
}
