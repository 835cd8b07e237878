//! Music scoring: a class of musical rows with an integer score.

use treble::{music::Pattern, Row, Stage};

use crate::{parameters::MusicSpec, Error, Score};

/// A class of music the engine should care about, with its patterns parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicType {
    pub name: String,
    pub patterns: Vec<Pattern>,
    pub score: Score,
}

impl MusicType {
    pub fn from_spec(spec: &MusicSpec) -> crate::Result<Self> {
        let patterns = spec
            .patterns
            .iter()
            .map(|p| {
                Pattern::parse(p, Stage::MAJOR).map_err(|error| Error::MusicPattern {
                    music: spec.name.clone(),
                    error,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(MusicType {
            name: spec.name.clone(),
            patterns,
            score: spec.score,
        })
    }

    /// The score this `MusicType` gives to a single [`Row`].
    pub fn row_score(&self, row: &Row) -> Score {
        let matches = self.patterns.iter().filter(|p| p.matches(row)).count();
        matches as Score * self.score
    }
}

/// The total music score of one [`Row`] across every [`MusicType`].
pub(crate) fn row_score(types: &[MusicType], row: &Row) -> Score {
    types.iter().map(|ty| ty.row_score(row)).sum()
}

#[cfg(test)]
mod tests {
    use treble::RowBuf;

    use super::*;

    fn music_type(score: Score, patterns: &[&str]) -> MusicType {
        MusicType::from_spec(&MusicSpec {
            name: "test".to_owned(),
            score,
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn scores_add_over_patterns() {
        let ty = music_type(4, &["xxxx5678", "5678xxxx"]);
        // Rounds matches only the back-bell pattern
        assert_eq!(ty.row_score(&RowBuf::rounds(Stage::MAJOR)), 4);
        // 56781234 matches only the front-bell pattern
        assert_eq!(ty.row_score(&RowBuf::parse("56781234").unwrap()), 4);
        assert_eq!(ty.row_score(&RowBuf::parse("13527486").unwrap()), 0);
    }

    #[test]
    fn scores_add_over_types(){
        let types = vec![music_type(4, &["xxxx5678"]), music_type(1, &["xxxxxx78"])];
        assert_eq!(row_score(&types, &RowBuf::rounds(Stage::MAJOR)), 5);
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let result = MusicType::from_spec(&MusicSpec {
            name: "bad".to_owned(),
            score: 1,
            patterns: vec!["xxxx567".to_owned()],
        });
        assert!(matches!(result, Err(Error::MusicPattern { .. })));
    }
}
