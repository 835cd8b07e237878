//! The search handle, along with the code for interacting with in-progress searches.

mod driver;
mod output;
mod progress;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use bit_vec::BitVec;

use crate::{
    composition::Composition,
    method::Call,
    node::Tables,
    parameters::Parameters,
    Config, Error,
};

use self::output::TopK;

/// Handle to a composition search.
///
/// Building a `Search` validates the [`Parameters`] and prepares every table; **the search
/// doesn't start until [`run`](Self::run) is called**, blocking the calling thread.  A monitor
/// thread may concurrently poll [`progress`](Self::progress), read
/// [`compositions`](Self::compositions), [`pause`](Self::pause)/[`resume`](Self::resume) the
/// worker, or abort it through the flag passed to `run`.
pub struct Search {
    pub(crate) params: Arc<Parameters>,
    pub(crate) config: Config,
    pub(crate) tables: Tables,
    /// The validated start-composition seed, as (composite index, call) pairs
    pub(crate) seed: Vec<(usize, Call)>,
    pub(crate) topk: Mutex<TopK>,
    pub(crate) shared: Shared,
    pause: Mutex<bool>,
    unpaused: Condvar,
}

/// Word-sized state shared between the composer and monitor threads.  Reads between checkpoints
/// may be stale but are never torn.
pub(crate) struct Shared {
    pub iter_count: AtomicU64,
    pub num_comps: AtomicUsize,
    /// Bits of an `f32` in `0.0..=1.0`
    pub fraction: AtomicU32,
    /// Sticky: set once an abort has been observed, so an aborted search is distinguishable
    /// from a completed one
    pub aborted: AtomicBool,
}

impl Search {
    /// Creates a new `Search`, validating the [`Parameters`] and building every table.  All
    /// recoverable conditions are checked here; [`run`](Self::run) itself cannot fail.
    pub fn new(params: Parameters, config: Config) -> crate::Result<Self> {
        let tables = Tables::prepare(&params)?;
        let seed = parse_seed(&params, &tables)?;
        let topk = Mutex::new(TopK::new(params.num_comps));
        Ok(Search {
            params: Arc::new(params),
            config,
            tables,
            seed,
            topk,
            shared: Shared {
                iter_count: AtomicU64::new(0),
                num_comps: AtomicUsize::new(0),
                fraction: AtomicU32::new(0f32.to_bits()),
                aborted: AtomicBool::new(false),
            },
            pause: Mutex::new(false),
            unpaused: Condvar::new(),
        })
    }

    /// Runs the search, **blocking the current thread** until it either exhausts the
    /// composition space or observes an abort through `abort_flag`.  Compositions and progress
    /// updates are streamed through `update_fn` as they happen.
    pub fn run(&self, mut update_fn: impl FnMut(Update), abort_flag: &AtomicBool) {
        // Make sure a stale abort from a previous run doesn't kill this one immediately
        abort_flag.store(false, Ordering::SeqCst);
        log::info!("Starting search");
        driver::run_search(self, &mut update_fn, abort_flag);
        update_fn(Update::Complete);
        log::info!(
            "Search {} after {} iterations, {} compositions",
            if self.aborted() { "aborted" } else { "complete" },
            self.shared.iter_count.load(Ordering::Relaxed),
            self.shared.num_comps.load(Ordering::Relaxed),
        );
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// `true` once the search has unwound in response to an abort.
    pub fn aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Parks the worker at its next suspension point until [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        *self.pause.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        *self.pause.lock().unwrap() = false;
        self.unpaused.notify_all();
    }

    /// A snapshot of how much of the search has happened so far.
    pub fn progress(&self) -> Progress {
        Progress {
            iter_count: self.shared.iter_count.load(Ordering::Relaxed),
            num_comps: self.shared.num_comps.load(Ordering::Relaxed),
            fraction: f32::from_bits(self.shared.fraction.load(Ordering::Relaxed)),
            aborting: self.aborted(),
        }
    }

    /// The best compositions found so far, best first.
    pub fn compositions(&self) -> Vec<Composition> {
        self.topk.lock().unwrap().comps_sorted_desc()
    }

    /// Blocks while the search is paused.  Re-checks the abort flag so an aborted search can't
    /// be left parked forever.
    pub(crate) fn wait_if_paused(&self, abort_flag: &AtomicBool) {
        let mut paused = self.pause.lock().unwrap();
        while *paused && !abort_flag.load(Ordering::Relaxed) {
            let (guard, _) = self
                .unpaused
                .wait_timeout(paused, Duration::from_millis(100))
                .unwrap();
            paused = guard;
        }
    }
}

/// Update message from an in-progress search.
#[derive(Debug)]
pub enum Update {
    /// A new composition entered the top-K set
    Comp(Composition),
    /// A periodic status update
    Progress(Progress),
    /// The search observed the abort flag and is unwinding
    Aborting,
    /// The search has finished (exhausted or aborted)
    Complete,
}

/// How much of a search has been completed so far.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// How many times the core composing loop has run
    pub iter_count: u64,
    /// How many compositions have entered the top-K set
    pub num_comps: usize,
    /// Estimated fraction of the composition space exhausted, in `0.0..=1.0`
    pub fraction: f32,
    /// `true` if the search is unwinding after an abort
    pub aborting: bool,
}

impl Progress {
    /// The progress of a search which hasn't started yet.
    pub const START: Self = Self {
        iter_count: 0,
        num_comps: 0,
        fraction: 0.0,
        aborting: false,
    };
}

/// Parses and structurally validates the start-composition seed.
fn parse_seed(params: &Parameters, tables: &Tables) -> crate::Result<Vec<(usize, Call)>> {
    let seed_str = match &params.start_composition {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };
    let n = params.num_methods();
    let method_by_abbrev = |c: char| {
        params
            .methods
            .iter()
            .position(|m| m.abbreviation.eq_ignore_ascii_case(&c))
    };

    let mut leads = Vec::new();
    for token in seed_str.split_whitespace() {
        let bad = |message: &str| Error::BadSeed {
            token: token.to_owned(),
            message: message.to_owned(),
        };
        let expected = if params.leadhead_only { 1 } else { 2 };
        let mut chars: Vec<char> = token.chars().collect();
        // Only read a trailing `-`/`s` as a call marker if the abbreviations are all present
        // without it, so a method abbreviated 'S' still parses
        let call = match chars.last().and_then(|&c| Call::from_marker(c)) {
            Some(call) if chars.len() > expected => {
                chars.pop();
                call
            }
            _ => Call::Plain,
        };
        if !params.is_call_allowed(call) {
            return Err(bad("that call isn't enabled"));
        }
        if chars.len() != expected {
            return Err(bad("wrong number of method abbreviations"));
        }
        let first = method_by_abbrev(chars[0]).ok_or_else(|| bad("unknown abbreviation"))?;
        let composite = if params.leadhead_only {
            first
        } else {
            let second = method_by_abbrev(chars[1]).ok_or_else(|| bad("unknown abbreviation"))?;
            first * n + second
        };
        leads.push((composite, call));
    }

    if leads.len() > params.leads_per_part {
        return Err(Error::BadSeed {
            token: seed_str.clone(),
            message: "seed is longer than one part".to_owned(),
        });
    }
    // Walk the seed through the node table to make sure it doesn't repeat a leadhead
    let mut lh_used = BitVec::from_elem(tables.space.leadheads.len(), false);
    lh_used.set(tables.space.lh_num[tables.rounds()] as usize, true);
    let mut node = tables.rounds();
    for (slot, &(m, call)) in leads.iter().enumerate() {
        node = tables.permute(
            node,
            tables.composites[crate::method::CompositeIdx::new(m)].end_perms[call.index()],
        );
        let lh = tables.space.lh_num[node] as usize;
        if slot < params.leads_per_part - 1 {
            if lh_used.get(lh) == Some(true) {
                return Err(Error::BadSeed {
                    token: seed_str.clone(),
                    message: "seed repeats a leadhead".to_owned(),
                });
            }
            lh_used.set(lh, true);
        }
    }
    Ok(leads)
}
