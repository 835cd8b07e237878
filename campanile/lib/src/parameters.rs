//! The user-facing description of a search.

use index_vec::IndexVec;

use crate::Score;

index_vec::define_index_type! {
    /// The index of a method within [`Parameters::methods`]
    pub struct MethodIdx = usize;
}

pub type MethodVec<T> = IndexVec<MethodIdx, T>;

/// Which calls the search is allowed to use.  Only fourths-place bobs and `1234` singles exist.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum CallSet {
    /// Every lead ends with its plain leadhead change
    #[default]
    None,
    /// Plain leads and bobs
    Bobs,
    /// Plain leads, bobs and singles
    BobsAndSingles,
}

/// One method given to the search.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MethodSpec {
    pub name: String,
    /// The one-letter abbreviation used in composition strings and seeds
    pub abbreviation: char,
    pub place_notation: String,
}

/// One class of music the search should score.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MusicSpec {
    pub name: String,
    /// The score awarded to each row matching any of `patterns`
    pub score: Score,
    /// Patterns like `xxxx5678`, one per row shape
    pub patterns: Vec<String>,
}

/// Everything which determines the set of compositions a [`Search`](crate::Search) generates.
///
/// The field defaults (via [`Parameters::default`]) describe a 1-part, 1-lead, no-call search
/// with no methods; realistic searches are built with struct update syntax:
///
/// ```
/// use campanile::{MethodSpec, Parameters};
///
/// let params = Parameters {
///     methods: vec![MethodSpec {
///         name: "Plain Bob".to_owned(),
///         abbreviation: 'P',
///         place_notation: "x18x18x18x18 12".to_owned(),
///     }],
///     leads_per_part: 1,
///     parts: 7,
///     tenors_together: true,
///     ..Parameters::default()
/// };
/// assert_eq!(params.num_comps, 10);
/// ```
#[derive(Debug, Clone)]
pub struct Parameters {
    /// The methods to splice.  Order matters: it fixes the enumeration order and the naming of
    /// composite methods.
    pub methods: Vec<MethodSpec>,
    pub music: Vec<MusicSpec>,

    /* Structure */
    pub leads_per_part: usize,
    pub parts: usize,
    pub tenors_together: bool,
    /// Restrict part ends (of every admissible rotation) to 'nice' rows
    pub nice_part_ends: bool,
    /// Require the tenors to stand in their home places at every admissible part end
    pub tenors_home_part_ends: bool,
    /// Enforce perfect half-lead method balance from the start of the search
    pub optimum_balance: bool,
    /// Splice only at leadheads, using whole leads of single methods
    pub leadhead_only: bool,
    pub calls: CallSet,

    /* Score thresholds and weights */
    pub min_score: Score,
    pub min_com: i32,
    pub min_balance: i32,
    pub com_score_weight: Score,
    pub balance_score_weight: Score,

    /* Optional length window for one part, in rows */
    pub min_part_length: Option<usize>,
    pub max_part_length: Option<usize>,

    /// How many compositions to keep (the size of the top-K output set)
    pub num_comps: usize,

    /// A whitespace-separated list of leads to restart the search from.  Each lead is
    /// `XY[-|s]` for half-lead splicing or `X[-|s]` for leadhead-only splicing.  The seed is
    /// assumed to already be a lowest rotation; it is not re-sorted.
    pub start_composition: Option<String>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
            music: Vec::new(),
            leads_per_part: 1,
            parts: 1,
            tenors_together: false,
            nice_part_ends: false,
            tenors_home_part_ends: false,
            optimum_balance: false,
            leadhead_only: false,
            calls: CallSet::None,
            min_score: 0,
            min_com: 0,
            min_balance: 0,
            com_score_weight: 2,
            balance_score_weight: 1,
            min_part_length: None,
            max_part_length: None,
            num_comps: 10,
            start_composition: None,
        }
    }
}

impl Parameters {
    /// The number of methods.
    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    /// `true` if a given [`crate::Call`] is available under `self.calls`.
    pub fn is_call_allowed(&self, call: crate::Call) -> bool {
        match call {
            crate::Call::Plain => true,
            crate::Call::Bob => self.calls != CallSet::None,
            crate::Call::Single => self.calls == CallSet::BobsAndSingles,
        }
    }
}
