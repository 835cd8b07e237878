//! The TOML search file.  This is parsed as an AST-like [`SearchFile`] and then validated and
//! lowered into engine [`Parameters`].

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use campanile::{CallSet, MethodSpec, MusicSpec, Parameters};
use itertools::Itertools;
use serde::Deserialize;
use treble::MethodLibrary;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchFile {
    /* Structure */
    #[serde(default = "get_one")]
    leads_per_part: usize,
    #[serde(default = "get_one")]
    parts: usize,
    #[serde(default)]
    tenors_together: bool,
    #[serde(default)]
    nice_part_ends: bool,
    #[serde(default)]
    tenors_home_part_ends: bool,
    #[serde(default)]
    optimum_balance: bool,
    #[serde(default)]
    leadhead_only: bool,
    #[serde(default)]
    calls: CallsSpec,

    /* Thresholds and weights */
    #[serde(default)]
    min_score: i32,
    #[serde(default)]
    min_com: i32,
    #[serde(default)]
    min_balance: i32,
    #[serde(default = "get_two")]
    com_score_weight: i32,
    #[serde(default = "get_one_i32")]
    balance_score_weight: i32,
    min_part_length: Option<usize>,
    max_part_length: Option<usize>,
    #[serde(default = "get_ten")]
    num_comps: usize,
    start_composition: Option<String>,

    /// A zipped text method library to resolve method names against
    library: Option<PathBuf>,

    #[serde(default)]
    methods: Vec<MethodFile>,
    #[serde(default)]
    music: Vec<MusicFile>,
}

/// The contents of one `[[methods]]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodFile {
    name: String,
    /// Defaults to the first character of `name`
    abbreviation: Option<char>,
    /// If absent, the method is looked up by name in the library
    place_notation: Option<String>,
}

/// The contents of one `[[music]]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MusicFile {
    name: Option<String>,
    #[serde(default = "get_one_i32")]
    score: i32,
    patterns: Vec<String>,
}

/// The `calls = "..."` values.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum CallsSpec {
    None,
    #[default]
    Bobs,
    BobsAndSingles,
}

impl From<CallsSpec> for CallSet {
    fn from(spec: CallsSpec) -> CallSet {
        match spec {
            CallsSpec::None => CallSet::None,
            CallsSpec::Bobs => CallSet::Bobs,
            CallsSpec::BobsAndSingles => CallSet::BobsAndSingles,
        }
    }
}

impl SearchFile {
    /// Reads a `SearchFile` from a TOML file.
    pub fn read_from_file(path: &Path) -> anyhow::Result<Self> {
        let toml_string = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read {}", path.display()))?;
        toml::from_str(&toml_string)
            .with_context(|| format!("couldn't parse {}", path.display()))
    }

    /// Lowers this file into engine [`Parameters`], resolving library lookups.
    pub fn to_parameters(&self, library_override: Option<&Path>) -> anyhow::Result<Parameters> {
        let library_path = library_override.or(self.library.as_deref());
        let library = match library_path {
            Some(path) => Some(
                MethodLibrary::from_zip_path(path)
                    .map_err(|e| anyhow!("couldn't load library {}: {}", path.display(), e))?,
            ),
            None => None,
        };

        let methods = self
            .methods
            .iter()
            .map(|m| {
                let place_notation = match (&m.place_notation, &library) {
                    (Some(pn), _) => pn.clone(),
                    (None, Some(lib)) => match lib.get(&m.name) {
                        Some(entry) => entry.place_notation.clone(),
                        None => {
                            return Err(match lib.nearest_name(&m.name) {
                                Some(suggestion) => anyhow!(
                                    "method {:?} isn't in the library; did you mean {:?}?",
                                    m.name,
                                    suggestion
                                ),
                                None => anyhow!("method {:?} isn't in the library", m.name),
                            })
                        }
                    },
                    (None, None) => {
                        return Err(anyhow!(
                            "method {:?} has no place notation and no library is loaded",
                            m.name
                        ))
                    }
                };
                let abbreviation = m
                    .abbreviation
                    .or_else(|| m.name.chars().next())
                    .ok_or_else(|| anyhow!("method with an empty name"))?;
                Ok(MethodSpec {
                    name: m.name.clone(),
                    abbreviation,
                    place_notation,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let music = self
            .music
            .iter()
            .map(|m| MusicSpec {
                name: m
                    .name
                    .clone()
                    .unwrap_or_else(|| m.patterns.iter().join(", ")),
                score: m.score,
                patterns: m.patterns.clone(),
            })
            .collect();

        Ok(Parameters {
            methods,
            music,
            leads_per_part: self.leads_per_part,
            parts: self.parts,
            tenors_together: self.tenors_together,
            nice_part_ends: self.nice_part_ends,
            tenors_home_part_ends: self.tenors_home_part_ends,
            optimum_balance: self.optimum_balance,
            leadhead_only: self.leadhead_only,
            calls: self.calls.into(),
            min_score: self.min_score,
            min_com: self.min_com,
            min_balance: self.min_balance,
            com_score_weight: self.com_score_weight,
            balance_score_weight: self.balance_score_weight,
            min_part_length: self.min_part_length,
            max_part_length: self.max_part_length,
            num_comps: self.num_comps,
            start_composition: self.start_composition.clone(),
        })
    }
}

/* Deserialization helpers */

fn get_one() -> usize {
    1
}

fn get_one_i32() -> i32 {
    1
}

fn get_two() -> i32 {
    2
}

fn get_ten() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        leads_per_part = 8
        parts = 5
        tenors_together = true
        calls = "bobs-and-singles"
        min_com = 5

        [[methods]]
        name = "Cambridge"
        abbreviation = "C"
        place_notation = "x38x14x1258x36x14x58x16x78 12"

        [[methods]]
        name = "Yorkshire"
        abbreviation = "Y"
        place_notation = "x38x14x58x16x12x38x14x78 12"

        [[music]]
        name = "56 rollups"
        score = 4
        patterns = ["xxxx5678", "xxxx6578"]
    "#;

    #[test]
    fn parse_and_lower() {
        let file: SearchFile = toml::from_str(EXAMPLE).unwrap();
        let params = file.to_parameters(None).unwrap();
        assert_eq!(params.leads_per_part, 8);
        assert_eq!(params.parts, 5);
        assert_eq!(params.calls, CallSet::BobsAndSingles);
        assert_eq!(params.min_com, 5);
        assert_eq!(params.methods.len(), 2);
        assert_eq!(params.methods[0].abbreviation, 'C');
        assert_eq!(params.music[0].patterns.len(), 2);
        // Defaults fill in everything else
        assert_eq!(params.num_comps, 10);
        assert_eq!(params.com_score_weight, 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<SearchFile>("leads_per_prat = 8").is_err());
    }
}
