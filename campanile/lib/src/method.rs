//! The engine's view of a method: a symmetric lead split into two halves, and the composite
//! methods formed by crossing every first half with every second half.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use index_vec::IndexVec;
use treble::{place_not::Change, PlaceNotation, Row, RowBuf, Stage};

use crate::{
    parameters::{MethodIdx, MethodSpec, MethodVec},
    Error,
};

index_vec::define_index_type! {
    /// The index of a [`CompositeMethod`] within the engine's composite table
    pub struct CompositeIdx = usize;
}

index_vec::define_index_type! {
    /// The index of a permutation in the engine's flat permutation table
    pub struct PermIdx = u32;
}

pub type CompositeVec<T> = IndexVec<CompositeIdx, T>;

/// The number of call kinds.
pub const NUM_CALLS: usize = 3;

/// How a lead can end.  Calls are fixed: a fourths-place bob and a `1234` single.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Call {
    Plain,
    Bob,
    Single,
}

impl Call {
    pub const ALL: [Call; NUM_CALLS] = [Call::Plain, Call::Bob, Call::Single];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The marker used in composition strings and seeds: nothing for plain, `-` for a bob, `s`
    /// for a single.
    pub fn marker(self) -> Option<char> {
        match self {
            Call::Plain => None,
            Call::Bob => Some('-'),
            Call::Single => Some('s'),
        }
    }

    pub fn from_marker(marker: char) -> Option<Call> {
        match marker {
            '-' => Some(Call::Bob),
            's' | 'S' => Some(Call::Single),
            _ => None,
        }
    }

    /// The place notation rung instead of the plain leadhead change, for the two real calls.
    fn change(self) -> Option<Change> {
        match self {
            Call::Plain => None,
            Call::Bob => Some(Change::from_places(vec![1, 4])),
            Call::Single => Some(Change::from_places(vec![1, 2, 3, 4])),
        }
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.marker() {
            Some(c) => write!(f, "{}", c),
            None => Ok(()),
        }
    }
}

/// A symmetric Major method, as used by the search.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Method {
    pub name: String,
    pub abbreviation: char,
    /// The changes up to and including the half-lead change
    pub first_half: Vec<Change>,
    /// The mirrored changes from the half-lead back to the lead end
    pub second_half: Vec<Change>,
    /// The plain leadhead change
    pub lead_end: Change,
    /// The row at the half-lead of a lead starting from rounds
    pub half_lead_row: RowBuf,
    /// The rows reached one whole lead after rounds, for each of plain/bob/single endings
    pub call_end_rows: [RowBuf; NUM_CALLS],
}

impl Method {
    pub fn from_spec(spec: &MethodSpec) -> crate::Result<Self> {
        let pn = PlaceNotation::parse(&spec.place_notation).map_err(|error| Error::PnParse {
            method: spec.name.clone(),
            error,
        })?;
        let guessed = pn.stage_guess();
        if guessed != Stage::MAJOR {
            return Err(Error::WrongStage {
                method: spec.name.clone(),
                stage: guessed,
            });
        }
        let halves = pn.halves(Stage::MAJOR).ok_or(Error::AsymmetricMethod {
            method: spec.name.clone(),
        })?;

        let half_lead_row = apply_changes(&RowBuf::rounds(Stage::MAJOR), &halves.first);
        let lead_end_row = apply_changes(&half_lead_row, &halves.second);
        let call_end_rows = Call::ALL.map(|call| {
            let ending = call.change().unwrap_or_else(|| halves.lead_end.clone());
            ending.permute(&lead_end_row)
        });

        // The treble must hunt: in 8ths place at the half-lead and leading again at the leadhead
        if half_lead_row.place_of(treble::Bell::TREBLE) != Some(7) {
            return Err(Error::TrebleAwayFromHalfLead {
                method: spec.name.clone(),
            });
        }
        if !call_end_rows[Call::Plain.index()].bell_at(0).is_treble() {
            return Err(Error::WrongHuntBell {
                method: spec.name.clone(),
            });
        }

        Ok(Method {
            name: spec.name.clone(),
            abbreviation: spec.abbreviation,
            first_half: halves.first,
            second_half: halves.second,
            lead_end: halves.lead_end,
            half_lead_row,
            call_end_rows,
        })
    }

    /// The plain leadhead row of this method.
    pub fn lead_head_row(&self) -> &Row {
        &self.call_end_rows[Call::Plain.index()]
    }

    /// The number of rows in one lead (leadhead up to, but excluding, the next leadhead).
    pub fn num_rows(&self) -> usize {
        self.first_half.len() + self.second_half.len() + 1
    }
}

/// The cross product entry (i, j): method `i`'s first half followed by method `j`'s second half.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompositeMethod {
    pub first: MethodIdx,
    pub second: MethodIdx,
    /// One permutation per change of the lead, indexing into the engine's flat table
    pub pn_perms: Vec<PermIdx>,
    /// The whole-lead permutation (leadhead to next leadhead) for each call ending
    pub end_perms: [PermIdx; NUM_CALLS],
    /// The number of rows this lead contributes to a composition
    pub num_rows: u32,
    /// `true` when the two halves come from different methods
    pub changes_method: bool,
}

/// The engine's flat permutation table: place-notation permutations first, then the deduplicated
/// whole-lead call endings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PermTable {
    pub perms: Vec<RowBuf>,
    /// The number of leading entries which are place-notation permutations
    pub num_pn: usize,
}

impl PermTable {
    #[inline]
    pub fn get(&self, idx: PermIdx) -> &Row {
        &self.perms[idx.index()]
    }

    pub fn len(&self) -> usize {
        self.perms.len()
    }
}

/// Builds the composite-method table and the shared permutation table.  For half-lead splicing
/// this is the full N x N cross product (entry `(i, j)` at index `i * N + j`); for leadhead-only
/// splicing only the N diagonal entries exist, one per method.
pub(crate) fn build_composites(
    methods: &MethodVec<Method>,
    leadhead_only: bool,
) -> (PermTable, CompositeVec<CompositeMethod>) {
    let rounds = RowBuf::rounds(Stage::MAJOR);

    let mut pn_perms: Vec<RowBuf> = Vec::new();
    let mut pn_ids: HashMap<RowBuf, usize> = HashMap::new();
    let mut intern_pn = |change: &Change| -> usize {
        let perm = change.perm_row(Stage::MAJOR);
        *pn_ids.entry(perm.clone()).or_insert_with(|| {
            pn_perms.push(perm);
            pn_perms.len() - 1
        })
    };

    // First pass: intern every change and record each composite's ending rows
    struct ProtoComposite {
        first: MethodIdx,
        second: MethodIdx,
        pn_ids: Vec<usize>,
        end_rows: [RowBuf; NUM_CALLS],
        num_rows: u32,
    }
    let pairs: Vec<(MethodIdx, MethodIdx)> = if leadhead_only {
        methods.iter_enumerated().map(|(idx, _)| (idx, idx)).collect()
    } else {
        methods
            .iter_enumerated()
            .flat_map(|(f, _)| methods.iter_enumerated().map(move |(s, _)| (f, s)))
            .collect()
    };
    let protos = pairs
        .into_iter()
        .map(|(f, s)| {
            let first = &methods[f];
            let second = &methods[s];
            let changes = first
                .first_half
                .iter()
                .chain(&second.second_half)
                .cloned()
                .collect::<Vec<_>>();
            let lead_end_row = apply_changes(&rounds, &changes);
            let end_rows = Call::ALL.map(|call| {
                let ending = call.change().unwrap_or_else(|| second.lead_end.clone());
                ending.permute(&lead_end_row)
            });
            ProtoComposite {
                first: f,
                second: s,
                pn_ids: changes.iter().map(&mut intern_pn).collect(),
                end_rows,
                num_rows: changes.len() as u32 + 1,
            }
        })
        .collect::<Vec<_>>();

    // Second pass: dedup the ending permutations and rebase their ids past the PN permutations
    let num_pn = pn_perms.len();
    let mut end_perms: Vec<RowBuf> = Vec::new();
    let mut end_ids: HashMap<RowBuf, usize> = HashMap::new();
    let composites = protos
        .into_iter()
        .map(|proto| {
            let end_perm_ids = proto.end_rows.map(|row| {
                let id = *end_ids.entry(row.clone()).or_insert_with(|| {
                    end_perms.push(row);
                    end_perms.len() - 1
                });
                PermIdx::new(num_pn + id)
            });
            CompositeMethod {
                first: proto.first,
                second: proto.second,
                pn_perms: proto.pn_ids.into_iter().map(PermIdx::new).collect(),
                end_perms: end_perm_ids,
                num_rows: proto.num_rows,
                changes_method: proto.first != proto.second,
            }
        })
        .collect::<CompositeVec<_>>();

    let mut perms = pn_perms;
    perms.extend(end_perms);
    log::debug!(
        "Built {} composites over {} PN + {} leadhead permutations",
        composites.len(),
        num_pn,
        perms.len() - num_pn
    );
    (PermTable { perms, num_pn }, composites)
}

/// Applies a sequence of changes to a row.
pub(crate) fn apply_changes(start: &Row, changes: &[Change]) -> RowBuf {
    let mut row = start.to_buf();
    for change in changes {
        row = change.permute(&row);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::MethodSpec;

    pub(crate) fn plain_bob() -> MethodSpec {
        MethodSpec {
            name: "Plain Bob".to_owned(),
            abbreviation: 'P',
            place_notation: "x18x18x18x18 12".to_owned(),
        }
    }

    #[test]
    fn plain_bob_rows() {
        let method = Method::from_spec(&plain_bob()).unwrap();
        assert_eq!(method.num_rows(), 16);
        assert_eq!(method.half_lead_row, RowBuf::parse("87654321").unwrap());
        assert_eq!(
            method.call_end_rows[Call::Plain.index()],
            RowBuf::parse("13527486").unwrap()
        );
        assert_eq!(
            method.call_end_rows[Call::Bob.index()],
            RowBuf::parse("12357486").unwrap()
        );
        assert_eq!(
            method.call_end_rows[Call::Single.index()],
            RowBuf::parse("13257486").unwrap()
        );
    }

    #[test]
    fn validation_rejects_wrong_stage() {
        let spec = MethodSpec {
            name: "Little".to_owned(),
            abbreviation: 'L',
            place_notation: "x16x16x16 12".to_owned(),
            // Guessed stage is Minor, not Major
        };
        assert!(matches!(
            Method::from_spec(&spec),
            Err(Error::WrongStage { .. })
        ));
    }

    #[test]
    fn validation_rejects_asymmetric() {
        let spec = MethodSpec {
            name: "Lumps".to_owned(),
            abbreviation: 'L',
            place_notation: "+x.18.x.38.x.18".to_owned(),
        };
        assert!(matches!(
            Method::from_spec(&spec),
            Err(Error::AsymmetricMethod { .. })
        ));
    }

    #[test]
    fn composite_perm_table() {
        let methods: MethodVec<Method> = [
            plain_bob(),
            MethodSpec {
                name: "Fifths Place".to_owned(),
                abbreviation: 'F',
                place_notation: "x18x18x18x58 12".to_owned(),
            },
        ]
        .iter()
        .map(|spec| Method::from_spec(spec).unwrap())
        .collect();

        let (perms, composites) = build_composites(&methods, false);
        assert_eq!(composites.len(), 4);
        // Distinct changes across both methods: x, 18 and 58
        assert_eq!(perms.num_pn, 3);
        // Every end perm id sits after the PN ids
        for comp in &composites {
            assert_eq!(comp.num_rows, 16);
            for &e in &comp.end_perms {
                assert!(e.index() >= perms.num_pn);
            }
        }

        // The PN sequence followed by the plain leadhead change reproduces the whole-lead perm
        let rounds = RowBuf::rounds(Stage::MAJOR);
        for comp in &composites {
            let mut row = rounds.to_buf();
            for &p in &comp.pn_perms {
                row = row.mul(perms.get(p));
            }
            let plain_ending = methods[comp.second].lead_end.permute(&row);
            assert_eq!(
                &plain_ending,
                perms.get(comp.end_perms[Call::Plain.index()])
            );
        }

        // Diagonal entries don't change method, off-diagonal ones do
        assert!(!composites[CompositeIdx::new(0)].changes_method);
        assert!(composites[CompositeIdx::new(1)].changes_method);
    }

    #[test]
    fn leadhead_only_uses_diagonal() {
        let methods: MethodVec<Method> =
            [plain_bob()].iter().map(|s| Method::from_spec(s).unwrap()).collect();
        let (_, composites) = build_composites(&methods, true);
        assert_eq!(composites.len(), 1);
        assert_eq!(composites[CompositeIdx::new(0)].first, MethodIdx::new(0));
    }
}
