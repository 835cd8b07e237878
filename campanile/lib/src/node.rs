//! The node graph: one canonical node per row of Major, with flat permutation links so that the
//! search's inner loop is nothing but array lookups.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use gcd::Gcd;
use index_vec::IndexVec;
use itertools::Itertools;
use treble::{Bell, Row, RowBuf, Stage};

use crate::{
    method::{build_composites, CompositeMethod, CompositeVec, PermIdx, PermTable},
    music::{self, MusicType},
    parameters::{MethodVec, Parameters},
    Error, Score,
};

index_vec::define_index_type! {
    /// The dense id of a node (row) in the node table
    pub struct NodeIdx = u32;
}

/* Node flags */
pub(crate) const FLAG_LEADHEAD: u8 = 1;
pub(crate) const FLAG_TENORS_TOGETHER: u8 = 1 << 1;
pub(crate) const FLAG_TENORS_HOME: u8 = 1 << 2;
pub(crate) const FLAG_NICE_PART_END: u8 = 1 << 3;

/// The immutable, method-independent part of the node table: every row of Major, its flags, its
/// part multiplicity and its leadhead numbering.  Built once per process and shared.
#[derive(Debug)]
pub(crate) struct RowSpace {
    pub rows: IndexVec<NodeIdx, RowBuf>,
    pub flags: IndexVec<NodeIdx, u8>,
    /// The multiplicative order of each row: how many parts a composition with this part end has
    pub n_parts: IndexVec<NodeIdx, u8>,
    /// Leadhead number of each node, or `u16::MAX` for non-leadhead rows
    pub lh_num: IndexVec<NodeIdx, u16>,
    /// The leadhead nodes, indexed by leadhead number
    pub leadheads: Vec<NodeIdx>,
    /// The leadhead nodes whose tenors stand in a coursing position, in creation order
    pub tenors_together_leadheads: Vec<NodeIdx>,
    /// Per leadhead number: how many plain leads since the tenors last stood home, judged by the
    /// coursing position of the tenors (0 for tenors-home rows and for split-tenors rows)
    pub regen_offset: Vec<u8>,
    /// Row -> node lookup, used only while tables are built
    pub index: HashMap<RowBuf, NodeIdx>,
    pub rounds: NodeIdx,
}

/// The leadhead number marking a non-leadhead node.
pub(crate) const NO_LEADHEAD: u16 = u16::MAX;

static ROW_SPACE: OnceLock<Arc<RowSpace>> = OnceLock::new();

/// The shared [`RowSpace`] for this process.
pub(crate) fn shared_row_space() -> Arc<RowSpace> {
    ROW_SPACE
        .get_or_init(|| Arc::new(RowSpace::build()))
        .clone()
}

impl RowSpace {
    fn build() -> Self {
        log::info!("Building node table");

        // Exhaustive depth-first generation of every row, numbering nodes in creation order.
        // Bells are chosen smallest-first, so the 5040 leadhead rows (treble leading) come first
        // and leadhead numbers are a contiguous prefix of the node ids.
        let mut rows = IndexVec::<NodeIdx, RowBuf>::with_capacity(40320);
        let mut prefix = Vec::with_capacity(8);
        let mut used = [false; 8];
        generate_rows(&mut prefix, &mut used, &mut rows);
        assert_eq!(rows.len() as u64, Stage::MAJOR.num_rows());

        let mut flags = IndexVec::with_capacity(rows.len());
        let mut n_parts = IndexVec::with_capacity(rows.len());
        let mut lh_num = IndexVec::with_capacity(rows.len());
        let mut leadheads = Vec::new();
        let mut tenors_together_leadheads = Vec::new();
        let mut regen_offset = Vec::new();
        let mut index = HashMap::with_capacity(rows.len());

        for (node, row) in rows.iter_enumerated() {
            let coursing = coursing_class(row);
            let mut f = 0u8;
            if row.bell_at(0).is_treble() {
                f |= FLAG_LEADHEAD;
            }
            if coursing.is_some() {
                f |= FLAG_TENORS_TOGETHER;
            }
            if coursing == Some(0) {
                f |= FLAG_TENORS_HOME;
            }
            if f & FLAG_LEADHEAD != 0 && f & FLAG_TENORS_TOGETHER != 0 {
                f |= FLAG_NICE_PART_END;
            }

            if f & FLAG_LEADHEAD != 0 {
                lh_num.push(leadheads.len() as u16);
                leadheads.push(node);
                regen_offset.push(coursing.unwrap_or(0));
                if coursing.is_some() {
                    tenors_together_leadheads.push(node);
                }
            } else {
                lh_num.push(NO_LEADHEAD);
            }

            flags.push(f);
            n_parts.push(row_order(row) as u8);
            index.insert(row.clone(), node);
        }

        assert_eq!(leadheads.len(), 5040);
        // Leadhead numbering is a contiguous prefix of the node ids
        assert!(leadheads
            .iter()
            .enumerate()
            .all(|(num, node)| node.index() == num));

        let rounds = index[&RowBuf::rounds(Stage::MAJOR)];
        RowSpace {
            rows,
            flags,
            n_parts,
            lh_num,
            leadheads,
            tenors_together_leadheads,
            regen_offset,
            index,
            rounds,
        }
    }

    #[inline(always)]
    pub fn flag(&self, node: NodeIdx, flag: u8) -> bool {
        self.flags[node] & flag != 0
    }
}

fn generate_rows(
    prefix: &mut Vec<Bell>,
    used: &mut [bool; 8],
    out: &mut IndexVec<NodeIdx, RowBuf>,
) {
    if prefix.len() == 8 {
        // SAFETY: `prefix` holds each bell exactly once by construction
        out.push(unsafe { RowBuf::from_vec_unchecked(prefix.clone()) });
        return;
    }
    for i in 0..8 {
        if !used[i] {
            used[i] = true;
            prefix.push(Bell::from_index(i).unwrap());
            generate_rows(prefix, used, out);
            prefix.pop();
            used[i] = false;
        }
    }
}

/// The multiplicative order of a row: the lowest common multiple of its cycle lengths.
fn row_order(row: &Row) -> usize {
    row.cycle_lengths()
        .into_iter()
        .fold(1usize, |l, c| l / l.gcd(c) * c)
}

/// Which coursing position the tenors hold: 0 when they stand home, `k` when they stand where
/// `k` plain leads would carry them from home, or `None` when they're split.
pub(crate) fn coursing_class(row: &Row) -> Option<u8> {
    let p7 = row.place_of(Bell::from_number(7).unwrap())? + 1;
    let p8 = row.place_of(Bell::from_number(8).unwrap())? + 1;
    match (p7, p8) {
        (7, 8) => Some(0),
        (5, 7) => Some(1),
        (3, 5) => Some(2),
        (2, 3) => Some(3),
        (4, 2) => Some(4),
        (6, 4) => Some(5),
        (8, 6) => Some(6),
        _ => None,
    }
}

/// Everything the search needs, built per method-and-music set: the composite methods, the flat
/// permutation table, the permutation links, and the music caches.
#[derive(Debug)]
pub(crate) struct Tables {
    pub space: Arc<RowSpace>,
    pub methods: MethodVec<crate::method::Method>,
    pub music_types: Vec<MusicType>,
    pub perms: PermTable,
    pub composites: CompositeVec<CompositeMethod>,
    /// `links[node * perms.len() + perm]` is the node reached by applying that permutation
    pub links: Vec<NodeIdx>,
    /// Music score of each node's row
    pub music: Vec<Score>,
    /// `lead_music[leadhead_number * composites.len() + composite]` is the music of one lead of
    /// that composite rung from that leadhead (excluding the next leadhead)
    pub lead_music: Vec<Score>,
}

impl Tables {
    /// Builds every table for a search.  Deterministic: preparing twice from equal [`Parameters`]
    /// yields identical tables.
    pub fn prepare(params: &Parameters) -> crate::Result<Tables> {
        validate(params)?;

        let methods = params
            .methods
            .iter()
            .map(crate::method::Method::from_spec)
            .collect::<crate::Result<MethodVec<_>>>()?;
        let music_types = params
            .music
            .iter()
            .map(MusicType::from_spec)
            .collect::<crate::Result<Vec<_>>>()?;

        let space = shared_row_space();
        let (perms, composites) = build_composites(&methods, params.leadhead_only);

        log::debug!("Scoring rows against {} music types", music_types.len());
        let music: Vec<Score> = space
            .rows
            .iter()
            .map(|row| music::row_score(&music_types, row))
            .collect();

        log::debug!("Filling permutation links");
        let num_perms = perms.len();
        let mut links = Vec::with_capacity(space.rows.len() * num_perms);
        for row in &space.rows {
            for perm in &perms.perms {
                let dest = row.mul(perm);
                let dest_node = *space.index.get(&dest).ok_or_else(|| {
                    Error::Internal(format!("row {} missing from permutation closure", dest))
                })?;
                links.push(dest_node);
            }
        }

        log::debug!("Caching per-lead music");
        let mut lead_music = Vec::with_capacity(space.leadheads.len() * composites.len());
        for &lh_node in &space.leadheads {
            for composite in &composites {
                let mut node = lh_node;
                let mut acc = music[node.index()];
                for &p in &composite.pn_perms {
                    node = links[node.index() * num_perms + p.index()];
                    acc += music[node.index()];
                }
                lead_music.push(acc);
            }
        }

        log::info!(
            "Prepared {} methods, {} composites, {} permutations",
            methods.len(),
            composites.len(),
            num_perms
        );
        Ok(Tables {
            space,
            methods,
            music_types,
            perms,
            composites,
            links,
            music,
            lead_music,
        })
    }

    /// Follows a permutation link.  This is the search's innermost operation.
    #[inline(always)]
    pub fn permute(&self, node: NodeIdx, perm: PermIdx) -> NodeIdx {
        self.links[node.index() * self.perms.len() + perm.index()]
    }

    /// The cached music of one lead of `composite` rung from the leadhead `node`.
    #[inline(always)]
    pub fn lead_music(&self, node: NodeIdx, composite: crate::method::CompositeIdx) -> Score {
        let lh = self.space.lh_num[node] as usize;
        debug_assert_ne!(self.space.lh_num[node], NO_LEADHEAD);
        self.lead_music[lh * self.composites.len() + composite.index()]
    }

    #[inline(always)]
    pub fn rounds(&self) -> NodeIdx {
        self.space.rounds
    }
}

fn validate(params: &Parameters) -> crate::Result<()> {
    if params.methods.is_empty() {
        return Err(Error::NoMethods);
    }
    if params.leads_per_part == 0 || params.parts == 0 || params.num_comps == 0 {
        return Err(Error::EmptyStructure);
    }
    if params.leadhead_only && params.calls == crate::CallSet::None {
        return Err(Error::CallsRequired);
    }
    for (m1, m2) in params.methods.iter().tuple_combinations() {
        if m1.abbreviation.eq_ignore_ascii_case(&m2.abbreviation) {
            return Err(Error::DuplicateAbbreviation {
                abbreviation: m1.abbreviation,
                method1: m1.name.clone(),
                method2: m2.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use treble::{place_not::Change, RowBuf};

    use super::*;
    use crate::parameters::MethodSpec;

    fn plain_bob_params() -> Parameters {
        Parameters {
            methods: vec![MethodSpec {
                name: "Plain Bob".to_owned(),
                abbreviation: 'P',
                place_notation: "x18x18x18x18 12".to_owned(),
            }],
            music: vec![crate::MusicSpec {
                name: "78s".to_owned(),
                score: 1,
                patterns: vec!["xxxxxx78".to_owned()],
            }],
            ..Parameters::default()
        }
    }

    #[test]
    fn row_space_invariants() {
        let space = shared_row_space();
        assert_eq!(space.rows.len(), 40320);
        assert_eq!(space.leadheads.len(), 5040);
        // 7 coursing positions for the tenors times 5! arrangements of the working bells
        assert_eq!(space.tenors_together_leadheads.len(), 840);
        // Rounds is node 0 (lexicographically first), is a leadhead, and has order 1
        assert_eq!(space.rounds.index(), 0);
        assert!(space.flag(space.rounds, FLAG_LEADHEAD));
        assert!(space.flag(space.rounds, FLAG_TENORS_HOME));
        assert_eq!(space.n_parts[space.rounds], 1);
    }

    #[test]
    fn n_parts_matches_repeated_application() {
        let space = shared_row_space();
        for (step, node) in (0..space.rows.len()).step_by(7919).map(NodeIdx::new).enumerate() {
            let row = &space.rows[node];
            let expected = space.n_parts[node] as usize;
            let mut acc = RowBuf::rounds(Stage::MAJOR);
            for applications in 1..=expected {
                acc = acc.mul(row);
                if applications < expected {
                    assert!(!acc.is_rounds(), "node {} returned early", step);
                }
            }
            assert!(acc.is_rounds());
        }
    }

    #[test]
    fn plain_bob_leadhead_has_seven_parts() {
        let space = shared_row_space();
        let lh = space.index[&RowBuf::parse("13527486").unwrap()];
        assert_eq!(space.n_parts[lh], 7);
        assert!(space.flag(lh, FLAG_TENORS_TOGETHER));
        assert!(space.flag(lh, FLAG_NICE_PART_END));
        assert!(!space.flag(lh, FLAG_TENORS_HOME));
        assert_eq!(space.regen_offset[space.lh_num[lh] as usize], 1);
    }

    #[test]
    fn permutation_links_are_bijective() {
        let tables = Tables::prepare(&plain_bob_params()).unwrap();
        let num_perms = tables.perms.len();
        for p in 0..num_perms {
            let perm = PermIdx::new(p);
            let mut seen = vec![false; tables.space.rows.len()];
            for node in (0..tables.space.rows.len()).map(NodeIdx::new) {
                let dest = tables.permute(node, perm);
                assert!(!seen[dest.index()]);
                seen[dest.index()] = true;
                // The link agrees with row algebra, so `permute` then the inverse permutation
                // always returns to the original node
                assert_eq!(
                    tables.space.rows[dest],
                    tables.space.rows[node].mul(tables.perms.get(perm))
                );
            }
        }
    }

    #[test]
    fn lead_music_matches_direct_evaluation() {
        let tables = Tables::prepare(&plain_bob_params()).unwrap();
        let composite = crate::method::CompositeIdx::new(0);
        let pb = &tables.methods[crate::parameters::MethodIdx::new(0)];
        for &lh_node in tables.space.leadheads.iter().step_by(997) {
            let mut row = tables.space.rows[lh_node].to_buf();
            let mut expected = music::row_score(&tables.music_types, &row);
            for change in pb.first_half.iter().chain(&pb.second_half) {
                row = change.permute(&row);
                expected += music::row_score(&tables.music_types, &row);
            }
            assert_eq!(tables.lead_music(lh_node, composite), expected);
        }
    }

    #[test]
    fn prepare_is_idempotent() {
        let params = plain_bob_params();
        let t1 = Tables::prepare(&params).unwrap();
        let t2 = Tables::prepare(&params).unwrap();
        assert_eq!(t1.links, t2.links);
        assert_eq!(t1.music, t2.music);
        assert_eq!(t1.lead_music, t2.lead_music);
        assert_eq!(t1.perms, t2.perms);
        assert_eq!(t1.composites, t2.composites);
    }

    #[test]
    fn whole_lead_permutation_matches_call_end_row() {
        let tables = Tables::prepare(&plain_bob_params()).unwrap();
        let composite = &tables.composites[crate::method::CompositeIdx::new(0)];
        // From rounds, the whole-lead permutation lands exactly on the method's call-end rows
        for call in crate::method::Call::ALL {
            let dest = tables.permute(tables.rounds(), composite.end_perms[call.index()]);
            assert_eq!(
                tables.space.rows[dest],
                tables.methods[crate::parameters::MethodIdx::new(0)].call_end_rows[call.index()]
            );
        }
        // A bob is fourths place: from rounds it produces 12357486
        let bob = Change::from_places(vec![1, 4]);
        let lead_end = RowBuf::parse("13254768").unwrap();
        assert_eq!(bob.permute(&lead_end), RowBuf::parse("12357486").unwrap());
    }
}
