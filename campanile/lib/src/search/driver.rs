//! The rotationally sorted depth-first search.
//!
//! The driver enumerates (composite method, call) choices slot by slot, descending whenever a
//! lead survives the gates and backtracking (calls first, then methods, carrying upward) when a
//! slot's choices run out.  Rotational sorting keeps the search from generating all cyclic
//! rotations of the same composition: whenever the composition crosses a tenors-home node, the
//! rotation starting there ties with the start of the composition, so subsequent choices are
//! copied forward from the start until the tie breaks.  Choices below the copied value would
//! hand the tie to the rotation, so they are never enumerated.  The candidate check settles
//! canonicity exactly, so the copy-forward pointer is purely an accelerator.

use std::{
    cmp::Ordering,
    sync::atomic::{AtomicBool, Ordering as MemOrdering},
    time::Instant,
};

use bit_vec::BitVec;

use crate::{
    composition::{CompBuffer, CompLead, Composition, Truth},
    method::{Call, CompositeIdx},
    node::FLAG_TENORS_TOGETHER,
    Score, Update,
};

use super::{output::Bounds, progress::ProgressTable, Search};

/// `regen_start` value meaning "not copying; re-arm at the next tenors-home crossing".
const REGEN_UNSET: isize = -1;

/// One of the three search variants.  The hot loop is monomorphised per variant; nothing in it
/// dispatches through a pointer.
pub(super) trait Mode {
    /// `true` when splicing composite methods at the half-lead, `false` for whole leads of
    /// single methods
    const HALF_LEAD: bool;
    /// `true` when the call dimension is live
    const WITH_CALLS: bool;
}

/// Half-lead splicing with every lead plain.
pub(super) struct PlainHalfLead;
/// Half-lead splicing with bobs (and possibly singles).
pub(super) struct CallsHalfLead;
/// Leadhead-only splicing, which always has calls enabled.
pub(super) struct LeadheadOnly;

impl Mode for PlainHalfLead {
    const HALF_LEAD: bool = true;
    const WITH_CALLS: bool = false;
}
impl Mode for CallsHalfLead {
    const HALF_LEAD: bool = true;
    const WITH_CALLS: bool = true;
}
impl Mode for LeadheadOnly {
    const HALF_LEAD: bool = false;
    const WITH_CALLS: bool = true;
}

/// What happened when the driver tried to append the current choice.
enum Step {
    /// The lead was appended; descend
    Descend,
    /// Rejected; advance to the next (method, call) choice
    SkipOne,
    /// Rejected by a first-half gate; advance past every second-half choice of this first half
    SkipBlock,
}

pub(super) struct Driver<'s> {
    search: &'s Search,

    /* Choice state, one entry per slot */
    choice_m: Vec<usize>,
    choice_c: Vec<usize>,

    buf: CompBuffer<'s>,

    /* Method-count gates */
    first_half_counts: Vec<u32>,
    second_half_counts: Vec<u32>,
    at_limit: u32,

    /// One bit per leadhead number: which leadheads the current composition already uses
    lh_used: BitVec,

    /// Rotational sort state: the lead index where the active copy-forward tie started, or
    /// [`REGEN_UNSET`]
    regen_start: isize,
    /// Copy-forward is only sound when rotation admissibility is policy-free
    regen_enabled: bool,

    bounds: Bounds,
    allowed_calls: Vec<Call>,

    generation_number: usize,
    iters: u64,
    last_stats: Instant,
    progress_table: ProgressTable,
}

impl<'s> Driver<'s> {
    pub fn new(search: &'s Search) -> Self {
        let params = search.parameters();
        let allowed_calls = Call::ALL
            .into_iter()
            .filter(|&c| params.is_call_allowed(c))
            .collect::<Vec<_>>();
        let n_choices = search.tables.composites.len();
        let l = params.leads_per_part;

        let mut driver = Driver {
            search,
            choice_m: vec![0; l],
            choice_c: vec![0; l],
            buf: CompBuffer::new(&search.tables, params),
            first_half_counts: vec![0; params.num_methods()],
            second_half_counts: vec![0; params.num_methods()],
            at_limit: 0,
            lh_used: BitVec::from_elem(search.tables.space.leadheads.len(), false),
            regen_start: REGEN_UNSET,
            regen_enabled: !params.nice_part_ends && !params.tenors_home_part_ends,
            bounds: Bounds::new(params),
            allowed_calls: allowed_calls.clone(),
            generation_number: 0,
            iters: 0,
            last_stats: Instant::now(),
            progress_table: ProgressTable::new(n_choices * allowed_calls.len()),
        };
        // Rounds is the leadhead of the first lead
        let rounds_lh = driver.search.tables.space.lh_num[driver.search.tables.rounds()];
        driver.lh_used.set(rounds_lh as usize, true);
        driver
    }

    /// Runs the search to exhaustion (or abort).
    pub fn run<M: Mode>(
        &mut self,
        update_fn: &mut dyn FnMut(Update),
        abort_flag: &AtomicBool,
    ) {
        let l = self.search.parameters().leads_per_part;
        let check_freq = (self.search.config.check_freq as u64).max(1);

        let mut i = self.apply_seed::<M>();
        if i < l {
            self.init_choice(i);
        }

        loop {
            self.iters += 1;
            if self.iters % check_freq == 0 && self.checkpoint(update_fn, abort_flag) {
                return;
            }

            if i == l {
                // A full candidate part: check it, then backtrack (jumping straight past the
                // offending lead if the first part was false)
                let jump_target = self.candidate::<M>(update_fn);
                let target = jump_target.unwrap_or(l - 1);
                while i > target {
                    i -= 1;
                    self.pop_slot::<M>(i);
                }
                if !self.advance(i) && !self.retreat::<M>(&mut i) {
                    return;
                }
                continue;
            }

            match self.try_append::<M>(i) {
                Step::Descend => {
                    i += 1;
                    if i < l {
                        self.init_choice(i);
                    }
                }
                Step::SkipOne => {
                    if !self.advance(i) && !self.retreat::<M>(&mut i) {
                        return;
                    }
                }
                Step::SkipBlock => {
                    if !self.advance_block(i) && !self.retreat::<M>(&mut i) {
                        return;
                    }
                }
            }
        }
    }

    /// Appends the seed leads (already validated by [`Search::new`]) and returns the first free
    /// slot.
    fn apply_seed<M: Mode>(&mut self) -> usize {
        let l = self.search.parameters().leads_per_part;
        let seed: Vec<(usize, Call)> = self.search.seed.clone();
        for (slot, (m, call)) in seed.into_iter().enumerate() {
            self.choice_m[slot] = m;
            self.choice_c[slot] = self
                .allowed_calls
                .iter()
                .position(|&c| c == call)
                .unwrap_or(0);
            let composite = CompositeIdx::new(m);
            self.commit_counts::<M>(composite);
            let dest = self.buf.push(composite, call);
            if slot < l - 1 {
                let lh = self.search.tables.space.lh_num[dest] as usize;
                self.lh_used.set(lh, true);
            }
        }
        self.buf.depth()
    }

    ////////////////////
    // CHOICE WALKING //
    ////////////////////

    /// Sets up the choice for a freshly entered slot: copied forward from the composition start
    /// while a rotational-sort tie is active, the first choice otherwise.
    fn init_choice(&mut self, i: usize) {
        if self.regen_enabled && self.regen_start == REGEN_UNSET && i > 0 {
            let space = &self.search.tables.space;
            let start = self.buf.next_start();
            let lh = space.lh_num[start];
            // Crossing a node whose tenors stand home (regen offset 0): the rotation starting
            // here ties with the start of the composition
            if space.flag(start, FLAG_TENORS_TOGETHER) && space.regen_offset[lh as usize] == 0 {
                self.regen_start = i as isize;
            }
        }
        if self.regen_start >= 0 {
            let src = i - self.regen_start as usize;
            self.choice_m[i] = self.choice_m[src];
            self.choice_c[i] = self.choice_c[src];
        } else {
            self.choice_m[i] = 0;
            self.choice_c[i] = 0;
        }
    }

    /// Advances slot `i` to its next (call first, then method) choice.  Returns `false` when the
    /// slot is exhausted.
    fn advance(&mut self, i: usize) -> bool {
        if self.regen_start >= 0 {
            // Whatever tie was active, this slot now exceeds its copied value (or a lower slot
            // changed), so the tie is broken until the next crossing
            self.regen_start = REGEN_UNSET;
        }
        self.choice_c[i] += 1;
        if self.choice_c[i] < self.allowed_calls.len() {
            return true;
        }
        self.choice_c[i] = 0;
        self.choice_m[i] += 1;
        self.choice_m[i] < self.search.tables.composites.len()
    }

    /// Advances slot `i` past every remaining second-half choice of its current first half.
    fn advance_block(&mut self, i: usize) -> bool {
        if self.regen_start >= 0 {
            self.regen_start = REGEN_UNSET;
        }
        let n = self.search.parameters().num_methods();
        let first = self.search.tables.composites[CompositeIdx::new(self.choice_m[i])]
            .first
            .index();
        self.choice_c[i] = 0;
        self.choice_m[i] = (first + 1) * n;
        self.choice_m[i] < self.search.tables.composites.len()
    }

    /// Pops slots and advances until some slot has another choice.  Returns `false` when slot 0
    /// is exhausted (the search is complete).
    fn retreat<M: Mode>(&mut self, i: &mut usize) -> bool {
        while *i > 0 {
            *i -= 1;
            self.pop_slot::<M>(*i);
            if self.advance(*i) {
                return true;
            }
        }
        false
    }

    //////////////////////
    // APPEND / RETRACT //
    //////////////////////

    fn try_append<M: Mode>(&mut self, i: usize) -> Step {
        let tables = &self.search.tables;
        let params = self.search.parameters();
        let l = params.leads_per_part;
        let m = CompositeIdx::new(self.choice_m[i]);
        let composite = &tables.composites[m];
        let limit = self.bounds.repeat_limit;
        let fh_count = self.first_half_counts[composite.first.index()];
        let sh_count = self.second_half_counts[composite.second.index()];

        // Gate: the first-half method is already at its repeat limit
        if fh_count >= limit {
            return if M::HALF_LEAD { Step::SkipBlock } else { Step::SkipOne };
        }
        // Gate: appending would put too many methods at the repeat limit
        let at_limit_delta =
            (fh_count + 1 == limit) as u32 + (M::HALF_LEAD && sh_count + 1 == limit) as u32;
        if at_limit_delta > 0 && self.at_limit + at_limit_delta > self.bounds.max_at_limit {
            return if M::HALF_LEAD && fh_count + 1 == limit {
                Step::SkipBlock
            } else {
                Step::SkipOne
            };
        }
        // Gate: the second-half method is already at its repeat limit
        if M::HALF_LEAD && sh_count >= limit {
            return Step::SkipOne;
        }

        let call = if M::WITH_CALLS {
            self.allowed_calls[self.choice_c[i]]
        } else {
            Call::Plain
        };
        let dest = tables.permute(self.buf.next_start(), composite.end_perms[call.index()]);

        // Each leadhead at most once per part.  The one exception is the final lead closing
        // back onto rounds, which is what a 1-part composition must do.
        let lh = tables.space.lh_num[dest] as usize;
        if self.lh_used.get(lh) == Some(true) && !(i == l - 1 && dest == tables.rounds()) {
            return Step::SkipOne;
        }
        // Tenors together, if required
        if params.tenors_together && !tables.space.flag(dest, FLAG_TENORS_TOGETHER) {
            return Step::SkipOne;
        }
        // The minimum changes of method must still be reachable from here
        let com = self.buf.com_after(m);
        let com_floor = if M::HALF_LEAD {
            2 * i as i32 + (self.bounds.min_com + 1 - 2 * l as i32)
        } else {
            i as i32 + (self.bounds.min_com - l as i32)
        };
        if com < com_floor {
            return Step::SkipOne;
        }
        // The part mustn't outgrow its length window
        if self.buf.length_after(m) > self.bounds.max_part_len {
            return Step::SkipOne;
        }

        self.commit_counts::<M>(m);
        if i < l - 1 {
            self.lh_used.set(lh, true);
        }
        self.buf.push(m, call);
        Step::Descend
    }

    fn commit_counts<M: Mode>(&mut self, m: CompositeIdx) {
        let composite = &self.search.tables.composites[m];
        let limit = self.bounds.repeat_limit;
        inc_count(
            &mut self.first_half_counts[composite.first.index()],
            limit,
            &mut self.at_limit,
        );
        if M::HALF_LEAD {
            inc_count(
                &mut self.second_half_counts[composite.second.index()],
                limit,
                &mut self.at_limit,
            );
        }
    }

    fn pop_slot<M: Mode>(&mut self, i: usize) {
        debug_assert_eq!(self.buf.depth(), i + 1);
        let l = self.search.parameters().leads_per_part;
        let lead = self.buf.leads[i];
        let composite = &self.search.tables.composites[lead.composite];
        let limit = self.bounds.repeat_limit;
        dec_count(
            &mut self.first_half_counts[composite.first.index()],
            limit,
            &mut self.at_limit,
        );
        if M::HALF_LEAD {
            dec_count(
                &mut self.second_half_counts[composite.second.index()],
                limit,
                &mut self.at_limit,
            );
        }
        if i < l - 1 {
            let lh = self.search.tables.space.lh_num[lead.end] as usize;
            self.lh_used.set(lh, false);
        }
        if self.regen_start >= 0 {
            self.regen_start = REGEN_UNSET;
        }
        self.buf.pop();
    }

    /// Recounts the methods-at-limit tally after the repeat limit tightens.
    fn refresh_at_limit<M: Mode>(&mut self) {
        let limit = self.bounds.repeat_limit;
        let mut n = self
            .first_half_counts
            .iter()
            .filter(|&&c| c == limit)
            .count();
        if M::HALF_LEAD {
            n += self
                .second_half_counts
                .iter()
                .filter(|&&c| c == limit)
                .count();
        }
        self.at_limit = n as u32;
    }

    ///////////////
    // CANDIDATE //
    ///////////////

    /// Checks a complete candidate part.  Returns the lead index to jump-backtrack to if the
    /// first part proved false, `None` for a normal backtrack.
    fn candidate<M: Mode>(&mut self, update_fn: &mut dyn FnMut(Update)) -> Option<usize> {
        let params = self.search.parameters();
        let l = params.leads_per_part;

        let part_length = self.buf.length[l - 1];
        if part_length < self.bounds.min_part_len || part_length > self.bounds.max_part_len {
            return None;
        }
        // The part end must come back to rounds in exactly `parts` parts
        let part_end = self.buf.part_end();
        if self.search.tables.space.n_parts[part_end] as usize != params.parts {
            return None;
        }

        let (balance, max_balance) = self.balance::<M>();
        if balance < self.bounds.min_balance {
            return None;
        }
        let com = self.buf.closing_com();
        if com < self.bounds.min_com {
            return None;
        }
        // The composition's own part end must satisfy the part-end policy...
        if !self.buf.rotation_admissible(0) {
            return None;
        }
        // ...and the composition must be the lowest admissible rotation of its cyclic class
        for r in 1..l {
            if self.buf.rotation_admissible(r) && self.buf.rotation_cmp(r) == Ordering::Less {
                return None;
            }
        }

        // Music over the admissible rotations.  The truth check runs lazily, the first time a
        // rotation's music clears the threshold; a composition no rotation can carry over the
        // threshold is never proved at all.
        let needed_music = self.bounds.min_score
            - com * params.com_score_weight
            - balance * params.balance_score_weight;
        let mut best: Option<(Score, usize)> = None;
        let mut proven_true = false;
        for r in 0..l {
            if !self.buf.rotation_admissible(r) {
                continue;
            }
            let music = self.buf.calc_music(r);
            if best.map_or(true, |(b, _)| music > b) {
                best = Some((music, r));
            }
            if !proven_true && music >= needed_music {
                match self.buf.is_true() {
                    Truth::True => proven_true = true,
                    Truth::False { first_part_lead } => return first_part_lead,
                }
            }
        }
        if !proven_true {
            return None;
        }

        let (music, best_rotation) = best.expect("rotation 0 is always admissible here");
        let score =
            music + com * params.com_score_weight + balance * params.balance_score_weight;
        let comp = Composition {
            generation_number: self.generation_number,
            params: self.search.params.clone(),
            leads: self
                .buf
                .leads
                .iter()
                .map(|lead| {
                    let c = &self.search.tables.composites[lead.composite];
                    CompLead {
                        first: c.first,
                        second: c.second,
                        call: lead.call,
                    }
                })
                .collect(),
            part_length: part_length as usize,
            parts: params.parts,
            music,
            best_rotation,
            com_per_part: com,
            balance,
            max_balance,
            score,
        };

        let accepted = {
            let mut topk = self.search.topk.lock().unwrap();
            let accepted = topk.push(&comp);
            if accepted {
                self.bounds.tighten(&topk);
            }
            accepted
        };
        if accepted {
            self.generation_number += 1;
            self.refresh_at_limit::<M>();
            self.search
                .shared
                .num_comps
                .fetch_add(1, MemOrdering::Relaxed);
            update_fn(Update::Comp(comp));
        }
        None
    }

    /// Method balance of the current full part: `(slots inside the balance quota, total slots)`.
    fn balance<M: Mode>(&self) -> (i32, i32) {
        let l = self.search.parameters().leads_per_part as i32;
        let n = self.search.parameters().num_methods() as i32;
        let mut unbalance = unbalance_of(&self.first_half_counts, l, n);
        let max = if M::HALF_LEAD {
            unbalance += unbalance_of(&self.second_half_counts, l, n);
            2 * l
        } else {
            l
        };
        (max - unbalance, max)
    }

    ///////////////////////
    // SUSPENSION POINTS //
    ///////////////////////

    /// Inspects the pause and abort flags and publishes statistics.  Returns `true` when the
    /// search should unwind.
    fn checkpoint(
        &mut self,
        update_fn: &mut dyn FnMut(Update),
        abort_flag: &AtomicBool,
    ) -> bool {
        self.search.wait_if_paused(abort_flag);
        if abort_flag.load(MemOrdering::Relaxed) {
            self.search.shared.aborted.store(true, MemOrdering::SeqCst);
            self.publish_progress();
            update_fn(Update::Aborting);
            return true;
        }
        if self.last_stats.elapsed() >= self.search.config.response_time {
            self.last_stats = Instant::now();
            self.publish_progress();
            update_fn(Update::Progress(self.search.progress()));
        }
        false
    }

    fn publish_progress(&self) {
        let n_calls = self.allowed_calls.len();
        let slot_choices: Vec<usize> = (0..self.buf.depth())
            .map(|slot| self.choice_m[slot] * n_calls + self.choice_c[slot])
            .collect();
        let fraction = self.progress_table.fraction(
            &slot_choices,
            self.search.tables.composites.len() * n_calls,
        );
        self.search
            .shared
            .iter_count
            .store(self.iters, MemOrdering::Relaxed);
        self.search
            .shared
            .fraction
            .store(fraction.to_bits(), MemOrdering::Relaxed);
    }
}

/// Dispatches `Driver::run` to the right monomorphised variant.
pub(super) fn run_search(search: &Search, update_fn: &mut dyn FnMut(Update), abort: &AtomicBool) {
    let params = search.parameters();
    let mut driver = Driver::new(search);
    match (params.leadhead_only, params.calls == crate::CallSet::None) {
        (false, true) => driver.run::<PlainHalfLead>(update_fn, abort),
        (false, false) => driver.run::<CallsHalfLead>(update_fn, abort),
        // Validation guarantees calls are enabled for leadhead-only searches
        (true, _) => driver.run::<LeadheadOnly>(update_fn, abort),
    }
    driver.publish_progress();
}

fn inc_count(count: &mut u32, limit: u32, at_limit: &mut u32) {
    *count += 1;
    if *count == limit {
        *at_limit += 1;
    } else if *count == limit + 1 {
        *at_limit -= 1;
    }
}

fn dec_count(count: &mut u32, limit: u32, at_limit: &mut u32) {
    if *count == limit {
        *at_limit -= 1;
    } else if *count == limit + 1 {
        *at_limit += 1;
    }
    *count -= 1;
}

/// How far a side's method counts fall outside the balanced quota `floor(L/N)..=ceil(L/N)`.
fn unbalance_of(counts: &[u32], leads_per_part: i32, num_methods: i32) -> i32 {
    let lo = leads_per_part / num_methods;
    let hi = (leads_per_part + num_methods - 1) / num_methods;
    counts
        .iter()
        .map(|&c| {
            let c = c as i32;
            if c > hi {
                c - hi
            } else if c < lo {
                lo - c
            } else {
                0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbalance_measures_quota_misses() {
        // 8 leads over 2 methods: quota is exactly 4 each
        assert_eq!(unbalance_of(&[4, 4], 8, 2), 0);
        assert_eq!(unbalance_of(&[6, 2], 8, 2), 4);
        // 7 leads over 2 methods: 4 + 3 is balanced
        assert_eq!(unbalance_of(&[4, 3], 7, 2), 0);
        assert_eq!(unbalance_of(&[7, 0], 7, 2), 6);
    }

    #[test]
    fn at_limit_tracking_survives_limit_shifts() {
        let mut count = 3;
        let mut at_limit = 0;
        // Limit 4: pushing to 4 enters the at-limit set
        inc_count(&mut count, 4, &mut at_limit);
        assert_eq!((count, at_limit), (4, 1));
        dec_count(&mut count, 4, &mut at_limit);
        assert_eq!((count, at_limit), (3, 0));
        // A count stranded above a tightened limit re-enters the set as it falls through it
        let mut count = 5;
        let mut at_limit = 0;
        dec_count(&mut count, 4, &mut at_limit);
        assert_eq!((count, at_limit), (4, 1));
    }
}
