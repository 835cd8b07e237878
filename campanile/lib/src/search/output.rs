//! The bounded top-K output set, and the bounds it feeds back into the driver.

use shortlist::Shortlist;

use crate::{Composition, Parameters, Score};

/// A [`Composition`] ordered by total score (generation number breaks ties).
#[derive(Debug, Clone)]
pub(crate) struct RankedComp(pub Composition);

impl RankedComp {
    fn key(&self) -> (Score, usize) {
        (self.0.total_score(), self.0.generation_number())
    }
}

impl PartialEq for RankedComp {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RankedComp {}

impl PartialOrd for RankedComp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedComp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// The best `capacity` compositions seen so far.
pub(crate) struct TopK {
    shortlist: Shortlist<RankedComp>,
    capacity: usize,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        TopK {
            shortlist: Shortlist::new(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.shortlist.len() >= self.capacity
    }

    /// Offers a composition to the set.  Returns `true` if it was kept (i.e. the set had room,
    /// or the composition beat the worst kept one).
    pub fn push(&mut self, comp: &Composition) -> bool {
        let ranked = RankedComp(comp.clone());
        let accepted = !self.is_full() || self.shortlist.iter().min().map_or(true, |w| ranked > *w);
        self.shortlist.push(ranked);
        accepted
    }

    /// The kept compositions, best first.
    pub fn comps_sorted_desc(&self) -> Vec<Composition> {
        let mut ranked: Vec<&RankedComp> = self.shortlist.iter().collect();
        ranked.sort_by(|a, b| b.cmp(a));
        ranked.into_iter().map(|r| r.0.clone()).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &Composition> {
        self.shortlist.iter().map(|r| &r.0)
    }
}

/// The thresholds the driver prunes against.  They start from the configured minima and tighten
/// monotonically as the top-K set fills: a composition which can't beat the worst kept one on
/// score, changes of method, balance or repeat limits isn't worth finishing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bounds {
    pub min_score: Score,
    pub min_com: i32,
    pub min_balance: i32,
    /// No method may fill more than this many half-lead slots per side
    pub repeat_limit: u32,
    /// At most this many (method, side) pairs may sit at `repeat_limit`
    pub max_at_limit: u32,
    pub min_part_len: u32,
    pub max_part_len: u32,

    /* Fixed quantities the repeat-limit rule is derived from */
    leads_per_part: u32,
    num_methods: u32,
    sides: u32,
}

impl Bounds {
    pub fn new(params: &Parameters) -> Self {
        let l = params.leads_per_part as u32;
        let n = params.num_methods() as u32;
        let sides = if params.leadhead_only { 1 } else { 2 };
        let mut bounds = Bounds {
            min_score: params.min_score,
            min_com: params.min_com,
            min_balance: params.min_balance,
            repeat_limit: l,
            max_at_limit: sides * n,
            min_part_len: params.min_part_length.unwrap_or(0) as u32,
            max_part_len: params.max_part_length.unwrap_or(u32::MAX as usize) as u32,
            leads_per_part: l,
            num_methods: n,
            sides,
        };
        if params.optimum_balance {
            bounds.set_repeat_limits(0);
        }
        bounds
    }

    /// The perfectly balanced repeat limit: `ceil(L / N)`.
    fn base_limit(&self) -> u32 {
        (self.leads_per_part + self.num_methods - 1) / self.num_methods
    }

    /// Re-derives the repeat-limit pair from the worst unbalance the output set still keeps.
    /// With `worst_unbalance = 0` the pair forces perfect balance; larger values loosen the
    /// limit by exactly that many slots.  Limits only ever tighten.
    pub fn set_repeat_limits(&mut self, worst_unbalance: i32) {
        let new_limit = (self.base_limit() + worst_unbalance.max(0) as u32).min(self.leads_per_part);
        self.repeat_limit = self.repeat_limit.min(new_limit.max(1));
        let new_max_at_limit = if worst_unbalance <= 0 {
            let rem = self.leads_per_part % self.num_methods;
            self.sides * if rem == 0 { self.num_methods } else { rem }
        } else {
            self.sides * self.num_methods
        };
        self.max_at_limit = self.max_at_limit.min(new_max_at_limit);
    }

    /// Pulls every threshold up to the worst composition the (full) top-K set keeps.
    pub fn tighten(&mut self, topk: &TopK) {
        if !topk.is_full() {
            return;
        }
        let mut worst_score = Score::MAX;
        let mut worst_com = i32::MAX;
        let mut worst_balance = i32::MAX;
        let mut worst_unbalance = 0;
        for comp in topk.iter() {
            worst_score = worst_score.min(comp.total_score());
            worst_com = worst_com.min(comp.com_per_part());
            worst_balance = worst_balance.min(comp.balance);
            worst_unbalance = worst_unbalance.max(comp.unbalance());
        }
        // A new composition now has to beat the worst kept score to be worth emitting
        self.min_score = self.min_score.max(worst_score + 1);
        self.min_com = self.min_com.max(worst_com);
        self.min_balance = self.min_balance.max(worst_balance);
        self.set_repeat_limits(worst_unbalance);
        log::debug!(
            "Tightened bounds: score >= {}, com >= {}, balance >= {}, repeat limit {} (max {} at limit)",
            self.min_score,
            self.min_com,
            self.min_balance,
            self.repeat_limit,
            self.max_at_limit
        );
    }
}
