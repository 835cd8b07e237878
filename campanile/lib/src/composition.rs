//! The composition buffer mutated by the search, and the immutable [`Composition`] snapshots
//! emitted from it.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Write},
    sync::Arc,
};

use bit_vec::BitVec;

use crate::{
    method::{Call, CompositeIdx},
    node::{NodeIdx, Tables, FLAG_NICE_PART_END, FLAG_TENORS_HOME},
    parameters::{MethodIdx, Parameters},
    Score,
};

/// One lead of the composition under construction: a starting node, a composite method, a call,
/// and the node reached by the whole-lead call permutation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct Lead {
    pub start: NodeIdx,
    pub composite: CompositeIdx,
    pub call: Call,
    pub end: NodeIdx,
}

/// The result of a truth check.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Truth {
    True,
    /// A row repeats.  If the repeat happened inside the first part, the 0-indexed lead where it
    /// was detected is recorded so the driver can jump-backtrack straight past it.
    False { first_part_lead: Option<usize> },
}

/// The current partial composition: one part's worth of leads with running changes-of-method and
/// length tallies, plus the truth bitmap over all 40320 nodes.
///
/// The buffer is built once per search and mutated in place; output [`Composition`]s are
/// immutable snapshots taken at emission time.
pub(crate) struct CompBuffer<'t> {
    t: &'t Tables,
    parts: usize,
    leads_per_part: usize,
    tenors_together: bool,
    require_tenors_home_part_ends: bool,
    require_nice_part_ends: bool,

    pub leads: Vec<Lead>,
    /// `com[i]`: changes of method over leads `0..=i` (the closing boundary back to lead 0 is
    /// only known once the part is complete; see [`Self::closing_com`])
    pub com: Vec<i32>,
    /// `length[i]`: rows in leads `0..=i`
    pub length: Vec<u32>,

    truth: BitVec,
    first_false_lead: Option<usize>,
}

impl<'t> CompBuffer<'t> {
    pub fn new(t: &'t Tables, params: &Parameters) -> Self {
        CompBuffer {
            t,
            parts: params.parts,
            leads_per_part: params.leads_per_part,
            tenors_together: params.tenors_together,
            require_tenors_home_part_ends: params.tenors_home_part_ends,
            require_nice_part_ends: params.nice_part_ends,
            leads: Vec::with_capacity(params.leads_per_part),
            com: Vec::with_capacity(params.leads_per_part),
            length: Vec::with_capacity(params.leads_per_part),
            truth: BitVec::from_elem(t.space.rows.len(), false),
            first_false_lead: None,
        }
    }

    /// How many leads are currently in the buffer.
    #[inline]
    pub fn depth(&self) -> usize {
        self.leads.len()
    }

    /// The node the next lead would start from.
    #[inline]
    pub fn next_start(&self) -> NodeIdx {
        self.leads.last().map_or(self.t.rounds(), |lead| lead.end)
    }

    /// The changes-of-method tally after appending one lead of `composite`.
    pub fn com_after(&self, composite: CompositeIdx) -> i32 {
        let c = &self.t.composites[composite];
        let mut com = c.changes_method as i32;
        if let Some(prev) = self.leads.last() {
            com += self.com[self.leads.len() - 1];
            com += (self.t.composites[prev.composite].second != c.first) as i32;
        }
        com
    }

    /// The length tally after appending one lead of `composite`.
    pub fn length_after(&self, composite: CompositeIdx) -> u32 {
        self.length.last().copied().unwrap_or(0) + self.t.composites[composite].num_rows
    }

    /// Appends a lead, returning its end node (the next lead's starting node).
    pub fn push(&mut self, composite: CompositeIdx, call: Call) -> NodeIdx {
        let start = self.next_start();
        let end = self
            .t
            .permute(start, self.t.composites[composite].end_perms[call.index()]);
        let com = self.com_after(composite);
        let length = self.length_after(composite);
        self.com.push(com);
        self.length.push(length);
        self.leads.push(Lead {
            start,
            composite,
            call,
            end,
        });
        end
    }

    /// Removes the most recently appended lead.
    pub fn pop(&mut self) {
        self.leads.pop();
        self.com.pop();
        self.length.pop();
    }

    /// The unrotated part end: the end node of the final lead.
    pub fn part_end(&self) -> NodeIdx {
        debug_assert_eq!(self.depth(), self.leads_per_part);
        self.leads[self.leads_per_part - 1].end
    }

    /// The full per-part changes of method, including the cyclic boundary from the final lead
    /// back to the first.
    pub fn closing_com(&self) -> i32 {
        let first = &self.t.composites[self.leads[0].composite];
        let last = &self.t.composites[self.leads[self.leads_per_part - 1].composite];
        self.com[self.leads_per_part - 1] + (last.second != first.first) as i32
    }

    /// The part end of the rotation starting at lead `r`: the node reached from rounds by
    /// applying every lead's whole-lead permutation in cyclic order starting at `r`.
    pub fn rotation_part_end(&self, r: usize) -> NodeIdx {
        if r == 0 {
            return self.part_end();
        }
        let l = self.leads_per_part;
        let mut node = self.t.rounds();
        for k in 0..l {
            let lead = &self.leads[(r + k) % l];
            node = self
                .t
                .permute(node, self.t.composites[lead.composite].end_perms[lead.call.index()]);
        }
        node
    }

    /// Whether the rotation starting at lead `r` satisfies the configured part-end policy, and
    /// (for tenors-together searches) stays inside the search space at all.
    pub fn rotation_admissible(&self, r: usize) -> bool {
        // Rotating a tenors-together composition relabels every row by the inverse of the
        // rotation's starting row.  Only a tenors-home start leaves the tenors' positions (and
        // hence the tenors-together property of every lead) intact, so rotations from anywhere
        // else don't exist in a tenors-together search.
        if self.tenors_together
            && r > 0
            && !self.t.space.flag(self.leads[r].start, FLAG_TENORS_HOME)
        {
            return false;
        }
        if self.require_tenors_home_part_ends {
            let admissible = if r == 0 {
                self.t.space.flag(self.part_end(), FLAG_TENORS_HOME)
            } else {
                // Fast pre-check: the bells standing in the tenors' home places at the
                // rotation's starting row must both be fixed by the unrotated part end
                let start_row = &self.t.space.rows[self.leads[r].start];
                let part_end_row = &self.t.space.rows[self.part_end()];
                part_end_row.is_fixed(start_row.bell_at(6))
                    && part_end_row.is_fixed(start_row.bell_at(7))
            };
            if !admissible {
                return false;
            }
        }
        if self.require_nice_part_ends
            && !self
                .t
                .space
                .flag(self.rotation_part_end(r), FLAG_NICE_PART_END)
        {
            return false;
        }
        true
    }

    /// Lexicographically compares the (composite, call) sequence of the rotation starting at
    /// lead `r` with the stored sequence.
    pub fn rotation_cmp(&self, r: usize) -> Ordering {
        let l = self.leads_per_part;
        for k in 0..l {
            let rotated = &self.leads[(r + k) % l];
            let base = &self.leads[k];
            let ord = (rotated.composite, rotated.call).cmp(&(base.composite, base.call));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// The total music of the whole composition rung from the rotation starting at lead `r`,
    /// summed from the per-lead music cache.
    pub fn calc_music(&self, r: usize) -> Score {
        let l = self.leads_per_part;
        let mut node = self.t.rounds();
        let mut acc = 0;
        for _ in 0..self.parts {
            for k in 0..l {
                let lead = &self.leads[(r + k) % l];
                acc += self.t.lead_music(node, lead.composite);
                node = self
                    .t
                    .permute(node, self.t.composites[lead.composite].end_perms[lead.call.index()]);
            }
        }
        debug_assert_eq!(node, self.t.rounds());
        acc
    }

    /// Proves the composition true or false by marking every row of every lead in the truth
    /// bitmap.  Only the first `ceil(parts / 2) + 1` parts need checking: a repeat between two
    /// later parts recurs, shifted by the part-end multiplier, between two parts in that prefix.
    pub fn is_true(&mut self) -> Truth {
        self.truth.clear();
        self.first_false_lead = None;
        let parts_to_check = ((self.parts + 1) / 2 + 1).min(self.parts);

        let mut lead_start = self.t.rounds();
        for part in 0..parts_to_check {
            for (li, lead) in self.leads.iter().enumerate() {
                let composite = &self.t.composites[lead.composite];
                let mut node = lead_start;
                let mut mark = |node: NodeIdx, truth: &mut BitVec| -> bool {
                    if truth.get(node.index()) == Some(true) {
                        return false;
                    }
                    truth.set(node.index(), true);
                    true
                };
                if !mark(node, &mut self.truth) {
                    if part == 0 {
                        self.first_false_lead = Some(li);
                    }
                    return Truth::False {
                        first_part_lead: self.first_false_lead,
                    };
                }
                for &p in &composite.pn_perms {
                    node = self.t.permute(node, p);
                    if !mark(node, &mut self.truth) {
                        if part == 0 {
                            self.first_false_lead = Some(li);
                        }
                        return Truth::False {
                            first_part_lead: self.first_false_lead,
                        };
                    }
                }
                lead_start = self
                    .t
                    .permute(lead_start, composite.end_perms[lead.call.index()]);
            }
        }
        Truth::True
    }

    /// The lead index recorded by the last [`is_true`](Self::is_true) which found a repeat in
    /// the first part.
    pub fn first_part_false_lead(&self) -> Option<usize> {
        self.first_false_lead
    }
}

/// A finished composition, snapshotted at emission time.
#[derive(Debug, Clone)]
pub struct Composition {
    pub(crate) generation_number: usize,
    pub(crate) params: Arc<Parameters>,
    pub(crate) leads: Vec<CompLead>,
    pub(crate) part_length: usize,
    pub(crate) parts: usize,
    /// Music of the best admissible rotation
    pub(crate) music: Score,
    pub(crate) best_rotation: usize,
    pub(crate) com_per_part: i32,
    /// Half-lead slots inside the balance quota
    pub(crate) balance: i32,
    /// Total half-lead slots per part
    pub(crate) max_balance: i32,
    pub(crate) score: Score,
}

/// One lead of an emitted [`Composition`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CompLead {
    pub first: MethodIdx,
    pub second: MethodIdx,
    pub call: Call,
}

impl Composition {
    /// The number of rows in the whole composition.
    pub fn length(&self) -> usize {
        self.part_length * self.parts
    }

    /// The composition's title, e.g. `5600 4-spliced`.
    pub fn title(&self) -> String {
        format!("{} {}-spliced", self.length(), self.params.methods.len())
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Music of the best admissible rotation.
    pub fn music(&self) -> Score {
        self.music
    }

    pub fn best_rotation(&self) -> usize {
        self.best_rotation
    }

    /// Changes of method in one part.
    pub fn com_per_part(&self) -> i32 {
        self.com_per_part
    }

    /// Changes of method across the whole composition.
    pub fn com_total(&self) -> i32 {
        self.com_per_part * self.parts as i32
    }

    /// Method balance as a percentage: 100% when every method fills exactly its share of the
    /// half-lead slots.
    pub fn balance_percent(&self) -> f32 {
        100.0 * self.balance as f32 / self.max_balance as f32
    }

    pub(crate) fn unbalance(&self) -> i32 {
        self.max_balance - self.balance
    }

    pub fn total_score(&self) -> Score {
        self.score
    }

    pub fn generation_number(&self) -> usize {
        self.generation_number
    }

    /// The [`Parameters`] which generated this composition.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// One lead per element, in canonical (unrotated) order.
    pub fn leads(&self) -> &[CompLead] {
        &self.leads
    }

    /// The lead-by-lead string, e.g. `CY- YC YY s` markers included: `CY- YCs YY`.
    pub fn lead_string(&self) -> String {
        let mut s = String::new();
        for (i, lead) in self.leads.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push(self.params.methods[lead.first.index()].abbreviation);
            if !self.params.leadhead_only {
                s.push(self.params.methods[lead.second.index()].abbreviation);
            }
            if let Some(marker) = lead.call.marker() {
                s.push(marker);
            }
        }
        s
    }
}

impl Display for Composition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "len: {}, parts: {}, score: {:>4}, music: {:>4}, com: {} ({}/part), \
             balance: {:>3.0}%, str: {}",
            self.length(),
            self.parts,
            self.score,
            self.music,
            self.com_total(),
            self.com_per_part,
            self.balance_percent(),
            self.lead_string()
        )?;
        if self.best_rotation != 0 {
            f.write_char(' ')?;
            write!(f, "(best music from lead {})", self.best_rotation + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use treble::{RowBuf, Stage};

    use super::*;
    use crate::{
        music,
        node::Tables,
        parameters::{MethodSpec, Parameters},
    };

    fn params_with(methods: &[(&str, char, &str)], leads_per_part: usize, parts: usize) -> Parameters {
        Parameters {
            methods: methods
                .iter()
                .map(|&(name, abbreviation, pn)| MethodSpec {
                    name: name.to_owned(),
                    abbreviation,
                    place_notation: pn.to_owned(),
                })
                .collect(),
            music: vec![crate::MusicSpec {
                name: "little-bell runs".to_owned(),
                score: 1,
                patterns: vec!["xxxx1234".to_owned(), "xxxx4321".to_owned()],
            }],
            leads_per_part,
            parts,
            ..Parameters::default()
        }
    }

    const PLAIN_BOB: (&str, char, &str) = ("Plain Bob", 'P', "x18x18x18x18 12");
    /// Plain hunt rung as a method: its plain leadhead is rounds
    const ORIGINAL: (&str, char, &str) = ("Original", 'O', "x18x18x18x18 18");

    #[test]
    fn com_and_length_tallies() {
        let params = params_with(&[PLAIN_BOB, ("Fifths", 'F', "x18x18x18x58 12")], 4, 1);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);

        // PP FF FP PF: composites 0, 3, 2, 1
        buf.push(CompositeIdx::new(0), Call::Plain);
        buf.push(CompositeIdx::new(3), Call::Plain);
        buf.push(CompositeIdx::new(2), Call::Plain);
        buf.push(CompositeIdx::new(1), Call::Plain);

        // Lead COM: 0; boundary P->F (1); boundary F->F (0) + internal FP (1); boundary P->P (0)
        // + internal PF (1)
        assert_eq!(buf.com, vec![0, 1, 2, 3]);
        // Closing boundary: last second half (F) vs first first half (P)
        assert_eq!(buf.closing_com(), 4);
        assert_eq!(buf.length, vec![16, 32, 48, 64]);
    }

    #[test]
    fn plain_course_music_matches_direct_expansion() {
        let params = params_with(&[PLAIN_BOB], 7, 1);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);
        for _ in 0..7 {
            buf.push(CompositeIdx::new(0), Call::Plain);
        }
        assert_eq!(buf.part_end(), tables.rounds());

        // Expand the plain course directly through row algebra
        let method = &tables.methods[MethodIdx::new(0)];
        let mut row = RowBuf::rounds(Stage::MAJOR);
        let mut expected = 0;
        for _ in 0..7 {
            for change in method
                .first_half
                .iter()
                .chain(&method.second_half)
                .chain(std::iter::once(&method.lead_end))
            {
                expected += music::row_score(&tables.music_types, &row);
                row = change.permute(&row);
            }
        }
        assert!(row.is_rounds());
        assert_eq!(buf.calc_music(0), expected);
    }

    #[test]
    fn repeated_rounds_lead_is_false() {
        let params = params_with(&[ORIGINAL], 2, 2);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);

        // Original's plain lead returns to rounds, so the second lead repeats the first
        buf.push(CompositeIdx::new(0), Call::Plain);
        assert_eq!(buf.next_start(), tables.rounds());
        buf.push(CompositeIdx::new(0), Call::Plain);

        assert_eq!(
            buf.is_true(),
            Truth::False {
                first_part_lead: Some(1)
            }
        );
        assert_eq!(buf.first_part_false_lead(), Some(1));
    }

    #[test]
    fn plain_course_is_true() {
        let params = params_with(&[PLAIN_BOB], 7, 1);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);
        for _ in 0..7 {
            buf.push(CompositeIdx::new(0), Call::Plain);
        }
        assert_eq!(buf.is_true(), Truth::True);
        assert_eq!(buf.first_part_false_lead(), None);
    }

    #[test]
    fn rotation_ordering() {
        let params = params_with(&[PLAIN_BOB, ("Fifths", 'F', "x18x18x18x58 12")], 2, 1);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);
        buf.push(CompositeIdx::new(0), Call::Plain); // PP
        buf.push(CompositeIdx::new(3), Call::Plain); // FF
        // The rotation starting at FF is lexicographically greater, so the stored order is
        // canonical
        assert_eq!(buf.rotation_cmp(1), Ordering::Greater);
        assert_eq!(buf.rotation_cmp(0), Ordering::Equal);
    }

    #[test]
    fn pop_restores_tallies() {
        let params = params_with(&[PLAIN_BOB, ("Fifths", 'F', "x18x18x18x58 12")], 4, 1);
        let tables = Tables::prepare(&params).unwrap();
        let mut buf = CompBuffer::new(&tables, &params);
        buf.push(CompositeIdx::new(0), Call::Plain);
        let com = buf.com.clone();
        let length = buf.length.clone();
        buf.push(CompositeIdx::new(1), Call::Bob);
        buf.pop();
        assert_eq!(buf.com, com);
        assert_eq!(buf.length, length);
        assert_eq!(buf.depth(), 1);
    }
}
